//! Ordered document sets with identity-keyed membership.

use marrow_bson::{Doc, List};
use std::collections::HashMap;
use std::sync::Arc;

/// Returns the identity of a document handle.
///
/// Identity is the allocation address, so two handles are the same
/// document iff they were cloned from the same `Arc`.
#[must_use]
pub(crate) fn doc_addr(doc: &Doc) -> usize {
    Arc::as_ptr(doc) as usize
}

/// An ordered list of documents with an identity-keyed position index.
///
/// The set preserves insertion order through [`DocumentSet::add`] and
/// [`DocumentSet::replace`]; [`DocumentSet::remove`] swaps the last
/// element into the vacated position to stay O(1).
///
/// # Invariants
///
/// - Every document appears at most once
/// - `list[index[d]]` is `d` for every member `d`
#[derive(Debug, Clone, Default)]
pub struct DocumentSet {
    list: List,
    index: HashMap<usize, usize>,
}

impl DocumentSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set from a list of documents, dropping duplicates.
    #[must_use]
    pub fn from_list(list: List) -> Self {
        let mut set = Self::new();
        for doc in list {
            set.add(&doc);
        }
        set
    }

    /// Returns the documents in order.
    #[must_use]
    pub fn list(&self) -> &List {
        &self.list
    }

    /// Returns the number of documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Returns true if the document is a member.
    #[must_use]
    pub fn contains(&self, doc: &Doc) -> bool {
        self.index.contains_key(&doc_addr(doc))
    }

    /// Returns the position of a member document.
    #[must_use]
    pub fn position(&self, doc: &Doc) -> Option<usize> {
        self.index.get(&doc_addr(doc)).copied()
    }

    /// Appends a document.
    ///
    /// Returns false if the document is already a member.
    pub fn add(&mut self, doc: &Doc) -> bool {
        let addr = doc_addr(doc);
        if self.index.contains_key(&addr) {
            return false;
        }
        self.index.insert(addr, self.list.len());
        self.list.push(Arc::clone(doc));
        true
    }

    /// Removes a document in O(1) by swapping the last element into its
    /// position. A non-member is ignored.
    pub fn remove(&mut self, doc: &Doc) {
        let Some(pos) = self.index.remove(&doc_addr(doc)) else {
            return;
        };
        self.list.swap_remove(pos);
        if let Some(moved) = self.list.get(pos) {
            self.index.insert(doc_addr(moved), pos);
        }
    }

    /// Replaces a member document with another, keeping its position.
    ///
    /// Returns false if the old document is not a member.
    pub fn replace(&mut self, old: &Doc, new: &Doc) -> bool {
        let Some(pos) = self.index.remove(&doc_addr(old)) else {
            return false;
        };
        self.index.insert(doc_addr(new), pos);
        self.list[pos] = Arc::clone(new);
        true
    }
}
