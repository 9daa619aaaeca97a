//! Snapshot stores.

use crate::error::StoreError;
use crate::handle::Handle;
use crate::index::{Column, Index};
use crate::namespace::{Dataset, Namespace};
use crate::query::{BasicQueryEngine, QueryEngine};
use crate::set::DocumentSet;
use marrow_bson::Document;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A snapshot store for the engine.
///
/// The engine calls [`Store::load`] once at creation and [`Store::store`]
/// at the end of every successful mutation, before the new snapshot is
/// published. A store error from `store` prevents publication: the engine
/// keeps serving the previous snapshot.
pub trait Store: Send + Sync {
    /// Loads the initial dataset.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted snapshot cannot be read.
    fn load(&self) -> Result<Dataset, StoreError>;

    /// Persists a snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    fn store(&self, dataset: &Dataset) -> Result<(), StoreError>;
}

/// A store that keeps nothing.
///
/// `load` returns an empty dataset and `store` succeeds without writing
/// anywhere. The number of `store` calls is counted, which tests use to
/// assert how often an engine publishes.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    stores: Arc<AtomicUsize>,
}

impl MemoryStore {
    /// Creates a new memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many times `store` has been called.
    #[must_use]
    pub fn store_count(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }
}

impl Store for MemoryStore {
    fn load(&self) -> Result<Dataset, StoreError> {
        Ok(Dataset::new())
    }

    fn store(&self, _dataset: &Dataset) -> Result<(), StoreError> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Serialized form of a dataset snapshot.
#[derive(Serialize, Deserialize)]
struct DatasetRepr {
    namespaces: Vec<NamespaceRepr>,
}

#[derive(Serialize, Deserialize)]
struct NamespaceRepr {
    db: String,
    coll: String,
    documents: Vec<Document>,
    indexes: Vec<IndexRepr>,
}

#[derive(Serialize, Deserialize)]
struct IndexRepr {
    name: String,
    columns: Vec<Column>,
    unique: bool,
    partial: Option<Document>,
}

/// A store persisting the whole dataset to a single JSON file.
///
/// Writes go to a temporary file in the same directory followed by a
/// rename, so a crash mid-write never leaves a torn snapshot behind.
/// Loading a missing file yields an empty dataset. Indexes are persisted
/// as their specifications and rebuilt from the documents on load.
pub struct FileStore {
    path: PathBuf,
    queries: Arc<dyn QueryEngine>,
}

impl FileStore {
    /// Creates a file store using the basic query engine for index
    /// rebuilds.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_queries(path, Arc::new(BasicQueryEngine::new()))
    }

    /// Creates a file store with a specific query engine.
    ///
    /// The engine must evaluate partial index filters the same way the
    /// engine that produced the snapshot did.
    #[must_use]
    pub fn with_queries(path: impl Into<PathBuf>, queries: Arc<dyn QueryEngine>) -> Self {
        Self {
            path: path.into(),
            queries,
        }
    }

    fn decode(&self, repr: DatasetRepr) -> Result<Dataset, StoreError> {
        let mut dataset = Dataset::new();
        for ns in repr.namespaces {
            let handle = Handle::new(ns.db, ns.coll);

            let mut documents = DocumentSet::new();
            for doc in ns.documents {
                documents.add(&Arc::new(doc));
            }

            let mut indexes = BTreeMap::new();
            for spec in ns.indexes {
                let mut index = Index::new(spec.columns, spec.unique, spec.partial);
                for doc in documents.list() {
                    let added = index
                        .add(doc, self.queries.as_ref())
                        .map_err(|err| StoreError::invalid_snapshot(err.to_string()))?;
                    if !added {
                        return Err(StoreError::invalid_snapshot(format!(
                            "unique index {:?} violated in namespace {handle}",
                            spec.name
                        )));
                    }
                }
                indexes.insert(spec.name, index);
            }

            dataset
                .namespaces
                .insert(handle, Arc::new(Namespace { documents, indexes }));
        }
        Ok(dataset)
    }

    fn encode(dataset: &Dataset) -> DatasetRepr {
        let mut handles: Vec<&Handle> = dataset.namespaces.keys().collect();
        handles.sort();

        let namespaces = handles
            .into_iter()
            .filter_map(|handle| {
                dataset.namespace(handle).map(|ns| NamespaceRepr {
                    db: handle.db.clone(),
                    coll: handle.coll.clone(),
                    documents: ns
                        .documents
                        .list()
                        .iter()
                        .map(|doc| Document::clone(doc))
                        .collect(),
                    indexes: ns
                        .indexes
                        .iter()
                        .map(|(name, index)| IndexRepr {
                            name: name.clone(),
                            columns: index.columns().to_vec(),
                            unique: index.is_unique(),
                            partial: index.partial_filter().cloned(),
                        })
                        .collect(),
                })
            })
            .collect();

        DatasetRepr { namespaces }
    }
}

impl Store for FileStore {
    fn load(&self) -> Result<Dataset, StoreError> {
        if !self.path.exists() {
            return Ok(Dataset::new());
        }
        let data = fs::read(&self.path)?;
        let repr: DatasetRepr = serde_json::from_slice(&data)?;
        self.decode(repr)
    }

    fn store(&self, dataset: &Dataset) -> Result<(), StoreError> {
        let data = serde_json::to_vec(&Self::encode(dataset))?;

        let mut tmp = self.path.clone();
        tmp.set_extension("tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
