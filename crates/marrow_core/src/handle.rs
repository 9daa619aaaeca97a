//! Namespace handles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of a namespace: a database name and a collection name.
///
/// Collection-level operations require both parts. Database-level
/// operations, such as dropping a whole database, use a handle whose
/// collection part is empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Handle {
    /// The database name.
    pub db: String,
    /// The collection name; empty for database-level handles.
    pub coll: String,
}

impl Handle {
    /// Creates a collection handle.
    pub fn new(db: impl Into<String>, coll: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            coll: coll.into(),
        }
    }

    /// Creates a database-level handle with an empty collection part.
    pub fn database(db: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            coll: String::new(),
        }
    }

    /// Returns true if the handle addresses a whole database.
    #[must_use]
    pub fn is_database(&self) -> bool {
        self.coll.is_empty()
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.db, self.coll)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_renders_db_dot_coll() {
        let handle = Handle::new("shop", "orders");
        assert_eq!(handle.to_string(), "shop.orders");
    }

    #[test]
    fn database_handle_has_empty_collection() {
        let handle = Handle::database("shop");
        assert!(handle.is_database());
        assert!(!Handle::new("shop", "orders").is_database());
    }

    #[test]
    fn handles_are_map_keys() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(Handle::new("a", "b"), 1);
        assert_eq!(map.get(&Handle::new("a", "b")), Some(&1));
        assert_eq!(map.get(&Handle::new("a", "c")), None);
    }
}
