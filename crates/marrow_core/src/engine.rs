//! The database engine.

use crate::error::{CoreResult, EngineError};
use crate::handle::Handle;
use crate::index::Index;
use crate::namespace::{Dataset, ID_INDEX};
use crate::query::{BasicQueryEngine, QueryEngine};
use crate::store::Store;
use marrow_bson::{clone_list, doc, Doc, Document, List, ObjectId, Value};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// The outcome of an engine operation.
#[derive(Debug, Default)]
pub struct OpResult {
    /// The matched documents. They alias the snapshot they were read from
    /// and must be treated as immutable.
    pub matched: List,
    /// The inserted, replaced, or updated documents.
    pub modified: List,
    /// The document created by an upsert.
    pub upserted: Option<Doc>,
    /// Per-document errors collected by unordered inserts.
    pub errors: Vec<EngineError>,
}

/// The in-memory document database engine.
///
/// The engine owns the current [`Dataset`] snapshot and provides document
/// store style CRUD operations over it. Every operation holds one
/// process-wide exclusive lock for its whole duration, so operations
/// appear to execute in a total order.
///
/// Mutations never touch the current snapshot. They clone the dataset,
/// clone only the namespaces they modify, hand the new snapshot to the
/// [`Store`], and publish it atomically on success. A failure anywhere
/// before publication leaves the current snapshot untouched, and
/// documents returned from earlier reads stay valid and unchanged.
///
/// # Example
///
/// ```rust
/// use marrow_bson::doc;
/// use marrow_core::{Engine, Handle, MemoryStore};
/// use std::sync::Arc;
///
/// let engine = Engine::new(MemoryStore::new()).unwrap();
/// let handle = Handle::new("shop", "orders");
///
/// let order = Arc::new(doc! { "item" => "book", "qty" => 2 });
/// let result = engine.insert(&handle, &[order], true).unwrap();
/// assert_eq!(result.modified.len(), 1);
/// assert_eq!(engine.num_documents(&handle), 1);
/// ```
pub struct Engine {
    store: Box<dyn Store>,
    queries: Arc<dyn QueryEngine>,
    dataset: Mutex<Arc<Dataset>>,
}

impl Engine {
    /// Creates an engine with the dataset loaded from the store, using
    /// the basic query engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails to load.
    pub fn new(store: impl Store + 'static) -> CoreResult<Self> {
        Self::with_queries(store, Arc::new(BasicQueryEngine::new()))
    }

    /// Creates an engine with a specific query engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails to load.
    pub fn with_queries(
        store: impl Store + 'static,
        queries: Arc<dyn QueryEngine>,
    ) -> CoreResult<Self> {
        let dataset = store.load()?;
        debug!(namespaces = dataset.namespaces.len(), "loaded dataset");
        Ok(Self {
            store: Box::new(store),
            queries,
            dataset: Mutex::new(Arc::new(dataset)),
        })
    }

    /// Matches documents in a namespace: sort, skip, then filter.
    fn match_documents(
        &self,
        dataset: &Dataset,
        handle: &Handle,
        query: &Document,
        sort: Option<&Document>,
        skip: usize,
        limit: usize,
    ) -> CoreResult<List> {
        let Some(namespace) = dataset.namespace(handle) else {
            return Ok(List::new());
        };
        let list = namespace.documents.list();

        let sorted = match sort {
            Some(spec) if !spec.is_empty() => self.queries.sort(list, spec)?,
            _ => list.clone(),
        };

        let remaining = if skip > sorted.len() {
            &[]
        } else {
            &sorted[skip..]
        };

        self.queries.filter(remaining, query, limit)
    }

    /// Queries documents from a namespace.
    ///
    /// Sort, skip, and limit modify the result; a limit of zero means
    /// unlimited. The matched documents alias the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the query engine rejects the query or sort.
    pub fn find(
        &self,
        handle: &Handle,
        query: &Document,
        sort: Option<&Document>,
        skip: usize,
        limit: usize,
    ) -> CoreResult<OpResult> {
        let guard = self.dataset.lock();
        let matched = self.match_documents(&guard, handle, query, sort, skip, limit)?;
        Ok(OpResult {
            matched,
            ..OpResult::default()
        })
    }

    /// Inserts documents into a namespace.
    ///
    /// The input documents are deep-copied, so later caller mutations
    /// never alias engine state, and every document missing an `_id` gets
    /// a freshly generated object ID.
    ///
    /// Duplicate documents and unique index violations are collected in
    /// `OpResult::errors` per document. With `ordered` set, the first
    /// error aborts the remaining inserts; otherwise the engine keeps
    /// going. The snapshot is stored and published only if at least one
    /// document was inserted.
    ///
    /// # Errors
    ///
    /// Returns an error if a partial filter fails to evaluate or the
    /// store rejects the snapshot; per-document duplicates are reported
    /// through the result, not as errors.
    pub fn insert(&self, handle: &Handle, list: &[Doc], ordered: bool) -> CoreResult<OpResult> {
        let mut guard = self.dataset.lock();

        let mut list = clone_list(list);
        for doc in &mut list {
            if doc.get("_id").is_missing() {
                Arc::make_mut(doc).put("_id", Value::ObjectId(ObjectId::new()), true)?;
            }
        }

        let mut clone = (**guard).clone();
        let namespace = clone.namespace_mut(handle);

        let mut result = OpResult::default();
        'docs: for doc in list {
            if namespace.documents.contains(&doc) {
                result
                    .errors
                    .push(EngineError::duplicate_document(handle.clone()));
                if ordered {
                    break;
                }
                continue;
            }

            let mut added = Vec::new();
            let mut conflict = None;
            for (name, index) in namespace.indexes.iter_mut() {
                if index.add(&doc, self.queries.as_ref())? {
                    added.push(name.clone());
                } else {
                    conflict = Some(name.clone());
                    break;
                }
            }
            if let Some(conflict) = conflict {
                // Roll back this document's partial index additions.
                for added_name in &added {
                    if let Some(index) = namespace.indexes.get_mut(added_name) {
                        index.remove(&doc);
                    }
                }
                result
                    .errors
                    .push(EngineError::duplicate_for_index(conflict));
                if ordered {
                    break 'docs;
                }
                continue 'docs;
            }

            namespace.documents.add(&doc);
            result.modified.push(doc);
        }

        if !result.modified.is_empty() {
            self.store.store(&clone)?;
            *guard = Arc::new(clone);
            debug!(handle = %handle, inserted = result.modified.len(), "published snapshot");
        }

        Ok(result)
    }

    /// Replaces the first matching document.
    ///
    /// The replacement either carries no `_id`, in which case it adopts
    /// the matched document's, or it must carry an equal one. With
    /// `upsert` set and no match, the replacement is inserted instead,
    /// completed from the query's equality skeleton `_id` if present.
    /// The replaced document keeps its position in the namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the `_id` differs (`ImmutableId`), a unique
    /// index rejects the replacement, or the store fails.
    pub fn replace(
        &self,
        handle: &Handle,
        query: &Document,
        sort: Option<&Document>,
        repl: &Document,
        upsert: bool,
    ) -> CoreResult<OpResult> {
        let mut guard = self.dataset.lock();

        let mut repl = Document::clone(repl);
        let matched = self.match_documents(&guard, handle, query, sort, 0, 1)?;

        let Some(old) = matched.first() else {
            if upsert {
                return self.upsert_locked(&mut guard, handle, query, Some(repl), None);
            }
            return Ok(OpResult::default());
        };

        let old_id = old.get("_id");
        let repl_id = repl.get("_id");
        if repl_id.is_missing() {
            repl.put("_id", old_id, true)?;
        } else if repl_id != old_id {
            return Err(EngineError::ImmutableId);
        }
        let repl = Arc::new(repl);

        let mut clone = (**guard).clone();
        let namespace = clone.namespace_mut(handle);

        for (name, index) in namespace.indexes.iter_mut() {
            index.remove(old);
            if !index.add(&repl, self.queries.as_ref())? {
                return Err(EngineError::duplicate_for_index(name.clone()));
            }
        }

        namespace.documents.replace(old, &repl);

        self.store.store(&clone)?;
        *guard = Arc::new(clone);
        debug!(handle = %handle, "published snapshot");

        Ok(OpResult {
            matched,
            modified: vec![repl],
            ..OpResult::default()
        })
    }

    /// Applies an update to the matching documents.
    ///
    /// Up to `limit` documents are updated; a limit of zero means all.
    /// With `upsert` set and no match, a document synthesized from the
    /// query's equality skeleton and the update is inserted instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the update changes an `_id` (`ImmutableId`),
    /// a unique index rejects an updated document, the update engine
    /// rejects the expression, or the store fails.
    pub fn update(
        &self,
        handle: &Handle,
        query: &Document,
        sort: Option<&Document>,
        update: &Document,
        limit: usize,
        upsert: bool,
    ) -> CoreResult<OpResult> {
        let mut guard = self.dataset.lock();

        let matched = self.match_documents(&guard, handle, query, sort, 0, limit)?;
        if matched.is_empty() {
            if upsert {
                return self.upsert_locked(&mut guard, handle, query, None, Some(update));
            }
            return Ok(OpResult::default());
        }

        let mut updated = clone_list(&matched);
        self.queries.update(&mut updated, update, false)?;

        for (old, new) in matched.iter().zip(updated.iter()) {
            if old.get("_id") != new.get("_id") {
                return Err(EngineError::ImmutableId);
            }
        }

        let mut clone = (**guard).clone();
        let namespace = clone.namespace_mut(handle);

        for old in &matched {
            for index in namespace.indexes.values_mut() {
                index.remove(old);
            }
        }
        for new in &updated {
            for (name, index) in namespace.indexes.iter_mut() {
                if !index.add(new, self.queries.as_ref())? {
                    return Err(EngineError::duplicate_for_index(name.clone()));
                }
            }
        }

        for (old, new) in matched.iter().zip(updated.iter()) {
            namespace.documents.replace(old, new);
        }

        self.store.store(&clone)?;
        *guard = Arc::new(clone);
        debug!(handle = %handle, updated = updated.len(), "published snapshot");

        Ok(OpResult {
            matched,
            modified: updated,
            ..OpResult::default()
        })
    }

    /// Inserts a document synthesized for an upsert.
    fn upsert_locked(
        &self,
        current: &mut Arc<Dataset>,
        handle: &Handle,
        query: &Document,
        repl: Option<Document>,
        update: Option<&Document>,
    ) -> CoreResult<OpResult> {
        let mut doc = self.queries.extract(query)?;

        if let Some(repl) = repl {
            let query_id = doc.get("_id");
            let repl_id = repl.get("_id");
            if !query_id.is_missing() && !repl_id.is_missing() && query_id != repl_id {
                return Err(EngineError::MismatchedIds);
            }

            doc = repl;
            if repl_id.is_missing() && !query_id.is_missing() {
                doc.put("_id", query_id, true)?;
            }
        }

        if let Some(update) = update {
            self.queries.apply(&mut doc, update, true)?;
        }

        if doc.get("_id").is_missing() {
            doc.put("_id", Value::ObjectId(ObjectId::new()), true)?;
        }
        let doc = Arc::new(doc);

        let mut clone = (**current).clone();
        let namespace = clone.namespace_mut(handle);

        for (name, index) in namespace.indexes.iter_mut() {
            if !index.add(&doc, self.queries.as_ref())? {
                return Err(EngineError::duplicate_for_index(name.clone()));
            }
        }
        namespace.documents.add(&doc);

        self.store.store(&clone)?;
        *current = Arc::new(clone);
        debug!(handle = %handle, "published snapshot");

        Ok(OpResult {
            upserted: Some(doc),
            ..OpResult::default()
        })
    }

    /// Deletes the matching documents.
    ///
    /// Up to `limit` documents are deleted; a limit of zero means all.
    /// The matched documents are returned; they stay reachable through
    /// the snapshot they were part of.
    ///
    /// # Errors
    ///
    /// Returns an error if the query engine rejects the query or the
    /// store fails.
    pub fn delete(
        &self,
        handle: &Handle,
        query: &Document,
        sort: Option<&Document>,
        limit: usize,
    ) -> CoreResult<OpResult> {
        let mut guard = self.dataset.lock();

        let matched = self.match_documents(&guard, handle, query, sort, 0, limit)?;
        if matched.is_empty() {
            return Ok(OpResult::default());
        }

        let mut clone = (**guard).clone();
        let namespace = clone.namespace_mut(handle);

        for doc in &matched {
            namespace.documents.remove(doc);
        }
        for doc in &matched {
            for index in namespace.indexes.values_mut() {
                index.remove(doc);
            }
        }

        self.store.store(&clone)?;
        *guard = Arc::new(clone);
        debug!(handle = %handle, deleted = matched.len(), "published snapshot");

        Ok(OpResult {
            matched,
            ..OpResult::default()
        })
    }

    /// Drops a namespace, or a whole database.
    ///
    /// A handle with an empty collection part drops every namespace of
    /// its database. Dropping is idempotent: absent namespaces are not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn drop_namespace(&self, handle: &Handle) -> CoreResult<()> {
        let mut guard = self.dataset.lock();

        let mut clone = (**guard).clone();
        clone
            .namespaces
            .retain(|ns, _| !(ns == handle || (handle.is_database() && ns.db == handle.db)));

        self.store.store(&clone)?;
        *guard = Arc::new(clone);
        debug!(handle = %handle, "dropped namespaces");

        Ok(())
    }

    /// Lists the databases of the dataset as metadata documents with the
    /// keys `name`, `sizeOnDisk`, and `empty`, ordered by name and
    /// filtered by the query.
    ///
    /// # Errors
    ///
    /// Returns an error if the query engine rejects the query.
    pub fn list_databases(&self, query: &Document) -> CoreResult<List> {
        let guard = self.dataset.lock();

        let mut databases: BTreeMap<&str, bool> = BTreeMap::new();
        for (handle, namespace) in &guard.namespaces {
            let empty = databases.entry(handle.db.as_str()).or_insert(true);
            if !namespace.documents.is_empty() {
                *empty = false;
            }
        }

        let list: List = databases
            .iter()
            .map(|(name, empty)| {
                Arc::new(doc! {
                    "name" => *name,
                    "sizeOnDisk" => 0i64,
                    "empty" => *empty,
                })
            })
            .collect();

        self.queries.filter(&list, query, 0)
    }

    /// Lists the collections of a database as metadata documents, ordered
    /// by name and filtered by the query.
    ///
    /// # Errors
    ///
    /// Returns an error if the query engine rejects the query.
    pub fn list_collections(&self, db: &str, query: &Document) -> CoreResult<List> {
        let guard = self.dataset.lock();

        let mut handles: Vec<&Handle> = guard
            .namespaces
            .keys()
            .filter(|handle| handle.db == db)
            .collect();
        handles.sort();

        let list: List = handles
            .into_iter()
            .map(|handle| {
                Arc::new(doc! {
                    "name" => handle.coll.clone(),
                    "type" => "collection",
                    "options" => doc! {},
                    "info" => doc! {
                        "uuid" => handle.to_string(),
                        "readOnly" => false,
                    },
                    "idIndex" => doc! {
                        "v" => 2,
                        "key" => doc! { "_id" => 1 },
                        "name" => ID_INDEX,
                        "namespace" => handle.to_string(),
                    },
                })
            })
            .collect();

        self.queries.filter(&list, query, 0)
    }

    /// Returns the number of documents in a namespace.
    #[must_use]
    pub fn num_documents(&self, handle: &Handle) -> usize {
        let guard = self.dataset.lock();
        guard
            .namespace(handle)
            .map_or(0, |namespace| namespace.documents.len())
    }

    /// Lists the indexes of a namespace as specification documents with
    /// the keys `v`, `key`, `name`, and `ns`, sorted by name. Explicitly
    /// unique indexes also carry `unique`.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace does not exist.
    pub fn list_indexes(&self, handle: &Handle) -> CoreResult<List> {
        let guard = self.dataset.lock();
        let Some(namespace) = guard.namespace(handle) else {
            return Err(EngineError::missing_namespace(handle.clone()));
        };

        // The index map iterates in name order already.
        let list = namespace
            .indexes
            .iter()
            .map(|(name, index)| {
                let mut key = Document::new();
                for column in index.columns() {
                    key.put_key(column.path.clone(), if column.reverse { -1 } else { 1 });
                }

                let mut spec = doc! {
                    "v" => 2,
                    "key" => key,
                    "name" => name.clone(),
                    "ns" => handle.to_string(),
                };
                if index.is_unique() && name != ID_INDEX {
                    spec.put_key("unique", true);
                }
                Arc::new(spec)
            })
            .collect();

        Ok(list)
    }

    /// Creates an index in a namespace, creating the namespace if it does
    /// not exist yet.
    ///
    /// `keys` is an ordered document of `(path, ±1)` pairs. An empty name
    /// derives one by joining path and direction segments, like
    /// `age_-1_name_1`. Existing documents are indexed immediately.
    ///
    /// Returns the index name.
    ///
    /// # Errors
    ///
    /// Returns an error if the key specification is invalid, a unique
    /// constraint is violated by existing documents, or the store fails.
    pub fn create_index(
        &self,
        handle: &Handle,
        keys: &Document,
        name: Option<&str>,
        unique: bool,
        partial: Option<&Document>,
    ) -> CoreResult<String> {
        let columns = self.queries.columns(keys)?;

        let name = match name {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                let mut segments = Vec::with_capacity(columns.len() * 2);
                for column in &columns {
                    segments.push(column.path.clone());
                    segments.push(if column.reverse { "-1" } else { "1" }.to_string());
                }
                segments.join("_")
            }
        };

        let mut guard = self.dataset.lock();

        let mut clone = (**guard).clone();
        let namespace = clone.namespace_mut(handle);

        let mut index = Index::new(columns, unique, partial.cloned());
        for doc in namespace.documents.list() {
            if !index.add(doc, self.queries.as_ref())? {
                return Err(EngineError::duplicate_for_index(name.clone()));
            }
        }
        namespace.indexes.insert(name.clone(), index);

        self.store.store(&clone)?;
        *guard = Arc::new(clone);
        debug!(handle = %handle, index = %name, "created index");

        Ok(name)
    }

    /// Drops an index from a namespace.
    ///
    /// The name `"*"` drops every index except the implicit `_id_`
    /// index. An empty name is invalid, the `_id_` index cannot be
    /// dropped individually, and any other name must exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace or index does not exist, the
    /// name is not acceptable, or the store fails.
    pub fn drop_index(&self, handle: &Handle, name: &str) -> CoreResult<()> {
        if name.is_empty() {
            return Err(EngineError::invalid_index_name(name));
        }

        let mut guard = self.dataset.lock();
        if guard.namespace(handle).is_none() {
            return Err(EngineError::missing_namespace(handle.clone()));
        }

        let mut clone = (**guard).clone();
        let namespace = clone.namespace_mut(handle);

        if name == "*" {
            namespace.indexes.retain(|name, _| name == ID_INDEX);
        } else {
            if name == ID_INDEX {
                return Err(EngineError::invalid_index_name(name));
            }
            if namespace.indexes.remove(name).is_none() {
                return Err(EngineError::missing_index(name));
            }
        }

        self.store.store(&clone)?;
        *guard = Arc::new(clone);
        debug!(handle = %handle, index = %name, "dropped indexes");

        Ok(())
    }
}
