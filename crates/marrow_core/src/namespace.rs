//! Namespaces and dataset snapshots.

use crate::handle::Handle;
use crate::index::{Column, Index};
use crate::set::DocumentSet;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Name of the implicit unique index on `_id`.
///
/// Every namespace carries this index from creation; it cannot be dropped
/// individually.
pub const ID_INDEX: &str = "_id_";

/// A document set paired with its named indexes.
///
/// Every index contains exactly the documents of the set, restricted by
/// its partial filter. Cloning a namespace copies the set and every index,
/// so mutating a clone never affects the original.
#[derive(Debug, Clone)]
pub struct Namespace {
    /// The documents of the namespace in insertion order.
    pub documents: DocumentSet,
    /// The indexes of the namespace by name.
    pub indexes: BTreeMap<String, Index>,
}

impl Namespace {
    /// Creates an empty namespace with the implicit `_id_` index.
    #[must_use]
    pub fn new() -> Self {
        let mut indexes = BTreeMap::new();
        indexes.insert(
            ID_INDEX.to_string(),
            Index::new(vec![Column::ascending("_id")], true, None),
        );
        Self {
            documents: DocumentSet::new(),
            indexes,
        }
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of all namespaces.
///
/// A dataset is immutable once published: mutations clone the dataset,
/// clone only the touched namespaces, and atomically publish the result.
/// Cloning a dataset copies just the namespace map; the namespaces behind
/// it stay shared until [`Dataset::namespace_mut`] detaches them.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    /// The namespaces of the dataset by handle.
    pub namespaces: HashMap<Handle, Arc<Namespace>>,
}

impl Dataset {
    /// Creates an empty dataset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the namespace for a handle.
    #[must_use]
    pub fn namespace(&self, handle: &Handle) -> Option<&Arc<Namespace>> {
        self.namespaces.get(handle)
    }

    /// Returns a mutable namespace for a handle, creating it if absent.
    ///
    /// A namespace still shared with another snapshot is detached by
    /// cloning before it is returned, so the other snapshot is never
    /// observably affected.
    pub fn namespace_mut(&mut self, handle: &Handle) -> &mut Namespace {
        let slot = self.namespaces.entry(handle.clone()).or_default();
        Arc::make_mut(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{BasicQueryEngine, QueryEngine};
    use marrow_bson::doc;

    fn add_doc(ns: &mut Namespace, id: i32) {
        let qe = BasicQueryEngine::new();
        let doc = Arc::new(doc! { "_id" => id });
        for index in ns.indexes.values_mut() {
            index.add(&doc, &qe as &dyn QueryEngine).unwrap();
        }
        ns.documents.add(&doc);
    }

    #[test]
    fn new_namespace_has_id_index() {
        let ns = Namespace::new();
        let index = ns.indexes.get(ID_INDEX).unwrap();
        assert!(index.is_unique());
        assert_eq!(index.columns(), &[Column::ascending("_id")]);
    }

    #[test]
    fn namespace_mut_creates_missing_namespace() {
        let mut dataset = Dataset::new();
        let handle = Handle::new("db", "coll");
        assert!(dataset.namespace(&handle).is_none());
        dataset.namespace_mut(&handle);
        assert!(dataset.namespace(&handle).is_some());
    }

    #[test]
    fn namespace_mut_detaches_shared_namespaces() {
        let mut dataset = Dataset::new();
        let handle = Handle::new("db", "coll");
        add_doc(dataset.namespace_mut(&handle), 1);

        // Simulate a published snapshot holding the same namespace.
        let snapshot = dataset.clone();

        add_doc(dataset.namespace_mut(&handle), 2);

        let published = snapshot.namespace(&handle).unwrap();
        let current = dataset.namespace(&handle).unwrap();
        assert_eq!(published.documents.len(), 1);
        assert_eq!(current.documents.len(), 2);
    }

    #[test]
    fn dataset_clone_shares_untouched_namespaces() {
        let mut dataset = Dataset::new();
        let a = Handle::new("db", "a");
        let b = Handle::new("db", "b");
        dataset.namespace_mut(&a);
        dataset.namespace_mut(&b);

        let mut clone = dataset.clone();
        clone.namespace_mut(&a);

        // The untouched namespace is still the same allocation.
        assert!(Arc::ptr_eq(
            dataset.namespace(&b).unwrap(),
            clone.namespace(&b).unwrap()
        ));
        assert!(!Arc::ptr_eq(
            dataset.namespace(&a).unwrap(),
            clone.namespace(&a).unwrap()
        ));
    }
}
