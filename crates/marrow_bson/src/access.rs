//! Dotted-path access to document values.
//!
//! Paths address nested values with dot-separated segments. Documents
//! consume segments as keys. Arrays consume segments that parse as
//! non-negative integers as indexes; any other segment applied to an array
//! is broadcast over its elements and the resolutions are collected into a
//! new array.

use crate::document::Document;
use crate::error::PathError;
use crate::path::{parse_index, split_path};
use crate::value::Value;

impl Document {
    /// Resolves a dotted path and returns the addressed value.
    ///
    /// Returns [`Value::Missing`] if any segment fails to resolve and the
    /// root document itself for the empty path.
    #[must_use]
    pub fn get(&self, path: &str) -> Value {
        if path.is_empty() {
            return Value::Document(self.clone());
        }
        get_from_document(self, path)
    }

    /// Writes a value at a dotted path.
    ///
    /// With `create` set, missing intermediate segments are fabricated:
    /// document keys create embedded documents, array indexes extend the
    /// array with nulls up to the required length. Without `create`, any
    /// missing segment is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the path traverses a value that is neither a
    /// document nor an array, if an array is addressed with a non-numeric
    /// segment, or if a segment is missing and `create` is not set.
    pub fn put(&mut self, path: &str, value: Value, create: bool) -> Result<(), PathError> {
        if path.is_empty() {
            return Err(PathError::not_found(path));
        }
        put_into_document(self, path, path, value, create)
    }

    /// Removes the value at a dotted path.
    ///
    /// Document keys are removed; array slots are set to null so that the
    /// array keeps its length. Paths that do not resolve are ignored.
    pub fn unset(&mut self, path: &str) {
        if path.is_empty() {
            return;
        }
        unset_in_document(self, path);
    }
}

fn get_from_document(doc: &Document, path: &str) -> Value {
    let (segment, rest) = split_path(path);
    let value = match doc.get_key(segment) {
        Some(value) => value,
        None => return Value::Missing,
    };
    match rest {
        None => value.clone(),
        Some(rest) => get_from_value(value, rest),
    }
}

fn get_from_value(value: &Value, path: &str) -> Value {
    match value {
        Value::Document(doc) => get_from_document(doc, path),
        Value::Array(items) => {
            let (segment, rest) = split_path(path);
            if let Some(index) = parse_index(segment) {
                match items.get(index) {
                    Some(item) => match rest {
                        None => item.clone(),
                        Some(rest) => get_from_value(item, rest),
                    },
                    None => Value::Missing,
                }
            } else {
                // Broadcast the whole remaining path over the elements.
                let mut results = Vec::new();
                for item in items {
                    let resolved = get_from_value(item, path);
                    if !resolved.is_missing() {
                        results.push(resolved);
                    }
                }
                Value::Array(results)
            }
        }
        _ => Value::Missing,
    }
}

fn put_into_document(
    doc: &mut Document,
    full: &str,
    path: &str,
    value: Value,
    create: bool,
) -> Result<(), PathError> {
    let (segment, rest) = split_path(path);
    let rest = match rest {
        None => {
            doc.put_key(segment, value);
            return Ok(());
        }
        Some(rest) => rest,
    };

    if doc.get_key(segment).is_none() {
        if !create {
            return Err(PathError::not_found(full));
        }
        doc.put_key(segment, empty_container(rest));
    }
    let Some(inner) = doc.get_key_mut(segment) else {
        return Err(PathError::not_found(full));
    };
    put_into_value(inner, full, rest, value, create)
}

fn put_into_value(
    current: &mut Value,
    full: &str,
    path: &str,
    value: Value,
    create: bool,
) -> Result<(), PathError> {
    match current {
        Value::Document(doc) => put_into_document(doc, full, path, value, create),
        Value::Array(items) => {
            let (segment, rest) = split_path(path);
            let Some(index) = parse_index(segment) else {
                return Err(PathError::invalid_index(full, segment));
            };
            match rest {
                None => {
                    if index >= items.len() {
                        if !create {
                            return Err(PathError::not_found(full));
                        }
                        items.resize(index + 1, Value::Null);
                    }
                    items[index] = value;
                    Ok(())
                }
                Some(rest) => {
                    if index >= items.len() {
                        if !create {
                            return Err(PathError::not_found(full));
                        }
                        items.resize(index + 1, Value::Null);
                        items[index] = empty_container(rest);
                    }
                    put_into_value(&mut items[index], full, rest, value, create)
                }
            }
        }
        other => {
            let (segment, _) = split_path(path);
            Err(PathError::incompatible(full, segment, other.type_name()))
        }
    }
}

/// Picks the container to fabricate for the next path segment.
fn empty_container(path: &str) -> Value {
    let (segment, _) = split_path(path);
    if parse_index(segment).is_some() {
        Value::Array(Vec::new())
    } else {
        Value::Document(Document::new())
    }
}

fn unset_in_document(doc: &mut Document, path: &str) {
    let (segment, rest) = split_path(path);
    match rest {
        None => {
            doc.remove_key(segment);
        }
        Some(rest) => {
            if let Some(inner) = doc.get_key_mut(segment) {
                unset_in_value(inner, rest);
            }
        }
    }
}

fn unset_in_value(value: &mut Value, path: &str) {
    match value {
        Value::Document(doc) => unset_in_document(doc, path),
        Value::Array(items) => {
            let (segment, rest) = split_path(path);
            if let Some(index) = parse_index(segment) {
                if index < items.len() {
                    match rest {
                        None => items[index] = Value::Null,
                        Some(rest) => unset_in_value(&mut items[index], rest),
                    }
                }
            }
        }
        _ => {}
    }
}
