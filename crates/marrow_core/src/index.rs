//! Sorted multi-key document indexes.

use crate::error::CoreResult;
use crate::query::QueryEngine;
use crate::set::doc_addr;
use marrow_bson::{Doc, Document, List, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

/// A single indexed column: a dotted path and a direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// The dotted path whose value is extracted from each document.
    pub path: String,
    /// Whether the column orders descending.
    pub reverse: bool,
}

impl Column {
    /// Creates an ascending column.
    pub fn ascending(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reverse: false,
        }
    }

    /// Creates a descending column.
    pub fn descending(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reverse: true,
        }
    }
}

/// One component of an index key.
///
/// The column's reverse flag is baked into the ordering so the backing
/// tree stores keys directly in scan order.
#[derive(Debug, Clone)]
struct KeyPart {
    value: Value,
    reverse: bool,
}

impl PartialEq for KeyPart {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for KeyPart {}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        let ord = self.value.compare(&other.value);
        if self.reverse {
            ord.reverse()
        } else {
            ord
        }
    }
}

/// The tuple of values extracted at each column of an index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct IndexKey(Vec<KeyPart>);

/// A sorted multi-key index over the documents of a namespace.
///
/// Keys are the tuples of values extracted at each column's path. Multiple
/// documents may share a key unless the index is unique. Documents under
/// the same key keep insertion order, and removing one leaves the relative
/// order of the others unchanged.
///
/// A partial filter restricts the index to documents matching a filter
/// document; evaluation is delegated to the [`QueryEngine`] passed into
/// [`Index::add`].
#[derive(Debug, Clone, Default)]
pub struct Index {
    columns: Vec<Column>,
    unique: bool,
    partial: Option<Document>,
    entries: BTreeMap<IndexKey, List>,
    count: usize,
}

impl Index {
    /// Creates an empty index.
    #[must_use]
    pub fn new(columns: Vec<Column>, unique: bool, partial: Option<Document>) -> Self {
        Self {
            columns,
            unique,
            partial,
            entries: BTreeMap::new(),
            count: 0,
        }
    }

    /// Returns the indexed columns.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns true if the index enforces uniqueness.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Returns the partial filter document, if any.
    #[must_use]
    pub fn partial_filter(&self) -> Option<&Document> {
        self.partial.as_ref()
    }

    /// Returns the number of indexed documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns true if no documents are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Extracts the index key for a document.
    fn key_for(&self, doc: &Document) -> IndexKey {
        IndexKey(
            self.columns
                .iter()
                .map(|column| KeyPart {
                    value: doc.get(&column.path),
                    reverse: column.reverse,
                })
                .collect(),
        )
    }

    /// Adds a document.
    ///
    /// Returns `Ok(true)` on success and also when the document is skipped
    /// by the partial filter or already present. Returns `Ok(false)` when
    /// a unique constraint holds the key for a different document.
    ///
    /// # Errors
    ///
    /// Propagates partial filter evaluation errors from the query engine.
    pub fn add(&mut self, doc: &Doc, queries: &dyn QueryEngine) -> CoreResult<bool> {
        if let Some(filter) = &self.partial {
            if !queries.matches(doc, filter)? {
                return Ok(true);
            }
        }

        let key = self.key_for(doc);
        if let Some(occupants) = self.entries.get(&key) {
            if occupants.iter().any(|d| Arc::ptr_eq(d, doc)) {
                return Ok(true);
            }
            if self.unique && !occupants.is_empty() {
                return Ok(false);
            }
        }

        self.entries.entry(key).or_default().push(Arc::clone(doc));
        self.count += 1;
        Ok(true)
    }

    /// Removes a document. A document that was never added, for example
    /// because the partial filter excluded it, is ignored.
    pub fn remove(&mut self, doc: &Doc) {
        let key = self.key_for(doc);
        if let Some(occupants) = self.entries.get_mut(&key) {
            let before = occupants.len();
            occupants.retain(|d| !Arc::ptr_eq(d, doc));
            self.count -= before - occupants.len();
            if occupants.is_empty() {
                self.entries.remove(&key);
            }
        }
    }

    /// Returns true if the document is indexed.
    #[must_use]
    pub fn contains(&self, doc: &Doc) -> bool {
        self.entries
            .get(&self.key_for(doc))
            .is_some_and(|occupants| occupants.iter().any(|d| Arc::ptr_eq(d, doc)))
    }

    /// Counts how often the document appears anywhere in the index.
    #[must_use]
    pub fn occurrences(&self, doc: &Doc) -> usize {
        let addr = doc_addr(doc);
        self.entries
            .values()
            .flatten()
            .filter(|d| doc_addr(d) == addr)
            .count()
    }

    /// Returns every indexed document in key order.
    #[must_use]
    pub fn scan(&self) -> List {
        self.entries.values().flatten().map(Arc::clone).collect()
    }

    /// Returns the documents whose keys fall between the bounds, in key
    /// order, or in reverse key order when `reverse_scan` is set.
    ///
    /// Bounds are inclusive and compare element-wise against the extracted
    /// key tuples, honoring each column's direction: bounds may be given
    /// in value order even for descending columns. Documents under the
    /// same key keep their insertion order in both scan directions.
    #[must_use]
    pub fn range(&self, lo: Option<&[Value]>, hi: Option<&[Value]>, reverse_scan: bool) -> List {
        let mut lower = lo.map(|values| self.bound_key(values));
        let mut upper = hi.map(|values| self.bound_key(values));

        // Descending columns invert the key order, so value-ordered
        // bounds can arrive swapped.
        if let (Some(a), Some(b)) = (&lower, &upper) {
            if a > b {
                std::mem::swap(&mut lower, &mut upper);
            }
        }

        let lower = match lower {
            Some(key) => Bound::Included(key),
            None => Bound::Unbounded,
        };
        let upper = match upper {
            Some(key) => Bound::Included(key),
            None => Bound::Unbounded,
        };

        let mut result = List::new();
        let matched = self.entries.range((lower, upper));
        if reverse_scan {
            for (_, occupants) in matched.rev() {
                result.extend(occupants.iter().map(Arc::clone));
            }
        } else {
            for (_, occupants) in matched {
                result.extend(occupants.iter().map(Arc::clone));
            }
        }
        result
    }

    /// Builds a bound key from raw values, pairing them with the columns'
    /// directions.
    fn bound_key(&self, values: &[Value]) -> IndexKey {
        IndexKey(
            values
                .iter()
                .zip(self.columns.iter())
                .map(|(value, column)| KeyPart {
                    value: value.clone(),
                    reverse: column.reverse,
                })
                .collect(),
        )
    }
}
