//! Insertion-ordered documents.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A shared handle to a document.
///
/// Document identity is the allocation address: two handles refer to the
/// same document iff they point at the same allocation. Cloning a `Doc`
/// shares the document; [`clone_doc`] copies it into a fresh identity.
pub type Doc = Arc<Document>;

/// A list of shared document handles.
pub type List = Vec<Doc>;

/// Deep-copies a document into a fresh identity.
#[must_use]
pub fn clone_doc(doc: &Doc) -> Doc {
    Arc::new(Document::clone(doc))
}

/// Deep-copies every document in a list into fresh identities.
#[must_use]
pub fn clone_list(list: &[Doc]) -> List {
    list.iter().map(clone_doc).collect()
}

/// An ordered sequence of key-value pairs.
///
/// Key order is preserved through all mutations, except that
/// [`Document::put_key`] appends keys that are not yet present at the end.
/// Duplicate keys are not created by this API; lookups return the first
/// occurrence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    entries: Vec<(String, Value)>,
}

impl Document {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a document from a list of pairs, keeping their order.
    #[must_use]
    pub fn from_pairs(pairs: Vec<(String, Value)>) -> Self {
        Self { entries: pairs }
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the document has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a key and returns its value.
    #[must_use]
    pub fn get_key(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Looks up a key and returns a mutable reference to its value.
    pub fn get_key_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Sets a key to a value.
    ///
    /// An existing key is replaced in place, keeping its position; a new
    /// key is appended at the end.
    pub fn put_key(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Removes a key and returns its value.
    pub fn remove_key(&mut self, key: &str) -> Option<Value> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Returns true if the key is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Iterates over `(key, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates over keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|((ak, av), (bk, bv))| ak == bk && av == bv)
    }
}

impl Eq for Document {}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (key, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{key}: {value:?}")?;
        }
        write!(f, "}}")
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Builds a [`Document`] from `key => value` pairs, preserving order.
///
/// ```
/// use marrow_bson::{doc, Value};
///
/// let d = doc! { "name" => "Ada", "age" => 36 };
/// assert_eq!(d.get_key("age"), Some(&Value::Int32(36)));
/// ```
#[macro_export]
macro_rules! doc {
    () => { $crate::Document::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut doc = $crate::Document::new();
        $( doc.put_key($key, $crate::Value::from($value)); )+
        doc
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_key_appends_new_keys() {
        let mut doc = Document::new();
        doc.put_key("b", Value::Int32(1));
        doc.put_key("a", Value::Int32(2));
        let keys: Vec<_> = doc.keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn put_key_replaces_in_place() {
        let mut doc = doc! { "a" => 1, "b" => 2 };
        doc.put_key("a", Value::Int32(9));
        let keys: Vec<_> = doc.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(doc.get_key("a"), Some(&Value::Int32(9)));
    }

    #[test]
    fn remove_key_preserves_order() {
        let mut doc = doc! { "a" => 1, "b" => 2, "c" => 3 };
        assert_eq!(doc.remove_key("b"), Some(Value::Int32(2)));
        let keys: Vec<_> = doc.keys().collect();
        assert_eq!(keys, vec!["a", "c"]);
        assert_eq!(doc.remove_key("b"), None);
    }

    #[test]
    fn equality_is_order_sensitive() {
        let a = doc! { "x" => 1, "y" => 2 };
        let b = doc! { "y" => 2, "x" => 1 };
        assert_ne!(a, b);
        assert_eq!(a, doc! { "x" => 1, "y" => 2 });
    }

    #[test]
    fn clone_doc_creates_fresh_identity() {
        let doc = Arc::new(doc! { "a" => 1 });
        let copy = clone_doc(&doc);
        assert_eq!(*doc, *copy);
        assert!(!Arc::ptr_eq(&doc, &copy));
    }

    #[test]
    fn clone_list_copies_every_document() {
        let list: List = vec![Arc::new(doc! { "a" => 1 }), Arc::new(doc! { "b" => 2 })];
        let copy = clone_list(&list);
        assert_eq!(copy.len(), 2);
        for (orig, fresh) in list.iter().zip(copy.iter()) {
            assert_eq!(**orig, **fresh);
            assert!(!Arc::ptr_eq(orig, fresh));
        }
    }
}
