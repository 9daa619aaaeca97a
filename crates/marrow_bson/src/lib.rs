//! # Marrow BSON
//!
//! Dynamic document value model for Marrow.
//!
//! This crate provides:
//! - A polymorphic [`Value`] type with a canonical total ordering
//! - An insertion-ordered [`Document`] of key-value pairs
//! - 12-byte [`ObjectId`] identifiers
//! - Dotted-path access (get/put/unset) with array-index semantics
//! - A [`PathTree`] trie for accumulating per-path state

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod access;
mod document;
mod error;
mod objectid;
mod path;
mod value;

pub use document::{clone_doc, clone_list, Doc, Document, List};
pub use error::PathError;
pub use objectid::ObjectId;
pub use path::{parse_index, split_path, PathTree};
pub use value::Value;
