//! The match/update engine contract and a basic implementation.
//!
//! The engine core does not interpret queries or update expressions
//! itself; it delegates to a [`QueryEngine`]. The contract is small:
//! matching, stable sorting, in-place updates, extracting the equality
//! skeleton of a query, and validating index key specifications.
//!
//! [`BasicQueryEngine`] implements the contract for a practical subset of
//! the operator language. Unsupported operators fail with a recognizable
//! error rather than silently not matching.

use crate::error::{CoreResult, EngineError};
use crate::index::Column;
use marrow_bson::{Doc, Document, List, PathTree, Value};
use std::cmp::Ordering;
use std::sync::Arc;

/// Compares two documents over a sequence of sort columns.
#[must_use]
pub fn order(left: &Document, right: &Document, columns: &[Column]) -> Ordering {
    for column in columns {
        let a = left.get(&column.path);
        let b = right.get(&column.path);
        let ord = a.compare(&b);
        if ord == Ordering::Equal {
            continue;
        }
        return if column.reverse { ord.reverse() } else { ord };
    }
    Ordering::Equal
}

/// The match/update operations the engine core depends on.
///
/// Implementations must be deterministic: the same inputs always produce
/// the same outputs, and `filter` visits documents in list order.
pub trait QueryEngine: Send + Sync {
    /// Evaluates a query against a single document.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed or unsupported queries.
    fn matches(&self, doc: &Document, query: &Document) -> CoreResult<bool>;

    /// Returns the documents matching a query, in list order.
    ///
    /// A `limit` of zero means unlimited.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed or unsupported queries.
    fn filter(&self, list: &[Doc], query: &Document, limit: usize) -> CoreResult<List> {
        let mut result = List::new();
        for doc in list {
            if self.matches(doc, query)? {
                result.push(Arc::clone(doc));
                if limit > 0 && result.len() >= limit {
                    break;
                }
            }
        }
        Ok(result)
    }

    /// Returns a sorted copy of the list.
    ///
    /// `spec` is an ordered document of `(path, ±1)` pairs. The sort is
    /// stable: documents with equal keys keep their relative order.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid sort specifications.
    fn sort(&self, list: &[Doc], spec: &Document) -> CoreResult<List> {
        let columns = self.columns(spec)?;
        let mut sorted: List = list.to_vec();
        sorted.sort_by(|a, b| order(a, b, &columns));
        Ok(sorted)
    }

    /// Applies an update expression to every document in the list.
    ///
    /// Documents are mutated in place; callers pass freshly cloned
    /// documents that are not shared with any snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed or unsupported updates.
    fn update(&self, list: &mut List, update: &Document, upsert: bool) -> CoreResult<()> {
        for doc in list.iter_mut() {
            self.apply(Arc::make_mut(doc), update, upsert)?;
        }
        Ok(())
    }

    /// Returns the equality-constrained skeleton of a query.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed queries.
    fn extract(&self, query: &Document) -> CoreResult<Document>;

    /// Applies an update expression to a single document.
    ///
    /// The `upsert` flag enables insert-only operators.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed or unsupported updates.
    fn apply(&self, doc: &mut Document, update: &Document, upsert: bool) -> CoreResult<()>;

    /// Validates an index key specification and returns its columns.
    ///
    /// Only directions `1` and `-1` are supported.
    ///
    /// # Errors
    ///
    /// Returns an error for empty specifications or unknown directions.
    fn columns(&self, keys: &Document) -> CoreResult<Vec<Column>>;
}

/// A query engine covering a practical operator subset.
///
/// Supported query operators: equality, `$eq`, `$ne`, `$gt`, `$gte`,
/// `$lt`, `$lte`, `$in`, `$nin`, `$exists`, `$not`, and the logical
/// `$and`, `$or`, `$nor`. Supported update operators: `$set`,
/// `$setOnInsert`, `$unset`, `$inc`, `$mul`, `$rename`.
#[derive(Debug, Clone, Default)]
pub struct BasicQueryEngine;

impl BasicQueryEngine {
    /// Creates a basic query engine.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl QueryEngine for BasicQueryEngine {
    fn matches(&self, doc: &Document, query: &Document) -> CoreResult<bool> {
        for (key, cond) in query.iter() {
            let matched = match key {
                "$and" => logical_list(doc, cond, key, self)?
                    .iter()
                    .all(|m| *m),
                "$or" => logical_list(doc, cond, key, self)?
                    .iter()
                    .any(|m| *m),
                "$nor" => !logical_list(doc, cond, key, self)?
                    .iter()
                    .any(|m| *m),
                _ if key.starts_with('$') => {
                    return Err(EngineError::match_engine(format!(
                        "unsupported query operator {key:?}"
                    )));
                }
                path => match_condition(&doc.get(path), cond)?,
            };
            if !matched {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn extract(&self, query: &Document) -> CoreResult<Document> {
        let mut doc = Document::new();
        extract_into(&mut doc, query)?;
        Ok(doc)
    }

    fn apply(&self, doc: &mut Document, update: &Document, upsert: bool) -> CoreResult<()> {
        // First pass: reject unknown operators and conflicting paths, so a
        // failing update leaves the document untouched.
        let mut paths: PathTree<()> = PathTree::new();
        for (op, arg) in update.iter() {
            let arg = expect_operator_argument(op, arg)?;
            for (path, value) in arg.iter() {
                mark_path(&mut paths, path)?;
                if op == "$rename" {
                    let target = rename_target(path, value)?;
                    mark_path(&mut paths, target)?;
                }
            }
            if !matches!(
                op,
                "$set" | "$setOnInsert" | "$unset" | "$inc" | "$mul" | "$rename"
            ) {
                return Err(EngineError::update_engine(format!(
                    "unsupported update operator {op:?}"
                )));
            }
        }

        for (op, arg) in update.iter() {
            let arg = expect_operator_argument(op, arg)?;
            for (path, value) in arg.iter() {
                match op {
                    "$set" => doc.put(path, value.clone(), true)?,
                    "$setOnInsert" => {
                        if upsert {
                            doc.put(path, value.clone(), true)?;
                        }
                    }
                    "$unset" => doc.unset(path),
                    "$inc" => apply_arithmetic(doc, path, value, ArithOp::Add)?,
                    "$mul" => apply_arithmetic(doc, path, value, ArithOp::Mul)?,
                    "$rename" => {
                        let target = rename_target(path, value)?;
                        let moved = doc.get(path);
                        if !moved.is_missing() {
                            doc.unset(path);
                            doc.put(target, moved, true)?;
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn columns(&self, keys: &Document) -> CoreResult<Vec<Column>> {
        if keys.is_empty() {
            return Err(EngineError::match_engine("empty index key specification"));
        }
        let mut columns = Vec::with_capacity(keys.len());
        for (path, direction) in keys.iter() {
            let reverse = match direction.as_f64() {
                Some(d) if d == 1.0 => false,
                Some(d) if d == -1.0 => true,
                _ => {
                    return Err(EngineError::match_engine(format!(
                        "unsupported index direction {direction:?} for {path:?}"
                    )));
                }
            };
            columns.push(Column {
                path: path.to_string(),
                reverse,
            });
        }
        Ok(columns)
    }
}

/// Evaluates the sub-queries of a logical operator.
fn logical_list(
    doc: &Document,
    cond: &Value,
    op: &str,
    engine: &BasicQueryEngine,
) -> CoreResult<Vec<bool>> {
    let Some(items) = cond.as_array() else {
        return Err(EngineError::match_engine(format!(
            "{op:?} requires an array of queries"
        )));
    };
    let mut results = Vec::with_capacity(items.len());
    for item in items {
        let Some(query) = item.as_document() else {
            return Err(EngineError::match_engine(format!(
                "{op:?} requires an array of queries"
            )));
        };
        results.push(engine.matches(doc, query)?);
    }
    Ok(results)
}

/// Evaluates a single field condition against a resolved value.
fn match_condition(actual: &Value, cond: &Value) -> CoreResult<bool> {
    if let Value::Document(ops) = cond {
        if is_operator_document(ops) {
            for (op, arg) in ops.iter() {
                if !match_operator(actual, op, arg)? {
                    return Ok(false);
                }
            }
            return Ok(true);
        }
    }
    Ok(values_equal(actual, cond))
}

fn match_operator(actual: &Value, op: &str, arg: &Value) -> CoreResult<bool> {
    match op {
        "$eq" => Ok(values_equal(actual, arg)),
        "$ne" => Ok(!values_equal(actual, arg)),
        "$gt" => Ok(ordered_match(actual, arg, Ordering::Greater, false)),
        "$gte" => Ok(ordered_match(actual, arg, Ordering::Greater, true)),
        "$lt" => Ok(ordered_match(actual, arg, Ordering::Less, false)),
        "$lte" => Ok(ordered_match(actual, arg, Ordering::Less, true)),
        "$in" => {
            let Some(choices) = arg.as_array() else {
                return Err(EngineError::match_engine("$in requires an array"));
            };
            Ok(choices.iter().any(|choice| values_equal(actual, choice)))
        }
        "$nin" => {
            let Some(choices) = arg.as_array() else {
                return Err(EngineError::match_engine("$nin requires an array"));
            };
            Ok(!choices.iter().any(|choice| values_equal(actual, choice)))
        }
        "$exists" => {
            let expected = arg.as_bool().unwrap_or(true);
            Ok(actual.is_missing() != expected)
        }
        "$not" => match arg {
            Value::Document(inner) if is_operator_document(inner) => {
                Ok(!match_condition(actual, arg)?)
            }
            _ => Err(EngineError::match_engine("$not requires an operator document")),
        },
        _ => Err(EngineError::match_engine(format!(
            "unsupported query operator {op:?}"
        ))),
    }
}

/// Equality with array membership: an array field matches a non-array
/// operand if any element equals it.
fn values_equal(actual: &Value, expected: &Value) -> bool {
    if actual.compare(expected) == Ordering::Equal {
        return true;
    }
    match (actual, expected) {
        (Value::Array(items), other) if !matches!(other, Value::Array(_)) => items
            .iter()
            .any(|item| item.compare(other) == Ordering::Equal),
        _ => false,
    }
}

/// Ordered comparison with array broadcast; missing values never match.
fn ordered_match(actual: &Value, arg: &Value, wanted: Ordering, or_equal: bool) -> bool {
    let satisfies = |value: &Value| {
        if value.is_missing() {
            return false;
        }
        let ord = value.compare(arg);
        ord == wanted || (or_equal && ord == Ordering::Equal)
    };
    if satisfies(actual) {
        return true;
    }
    match actual {
        Value::Array(items) => items.iter().any(satisfies),
        _ => false,
    }
}

fn is_operator_document(doc: &Document) -> bool {
    !doc.is_empty() && doc.keys().all(|key| key.starts_with('$'))
}

/// Collects equality constraints of a query into a document skeleton.
fn extract_into(target: &mut Document, query: &Document) -> CoreResult<()> {
    for (key, cond) in query.iter() {
        if key == "$and" {
            let Some(items) = cond.as_array() else {
                return Err(EngineError::match_engine("$and requires an array of queries"));
            };
            for item in items {
                if let Some(sub) = item.as_document() {
                    extract_into(target, sub)?;
                }
            }
            continue;
        }
        if key.starts_with('$') {
            continue;
        }
        match cond {
            Value::Document(ops) if is_operator_document(ops) => {
                if let Some(value) = ops.get_key("$eq") {
                    target.put(key, value.clone(), true)?;
                }
            }
            other => target.put(key, other.clone(), true)?,
        }
    }
    Ok(())
}

/// Marks a path in the update path set, rejecting overlaps.
fn mark_path(paths: &mut PathTree<()>, path: &str) -> CoreResult<()> {
    let conflicting = {
        let (node, rest) = paths.lookup(path);
        match rest {
            // A marked ancestor already owns this subtree.
            Some(_) => node.load().is_some(),
            None => node.load().is_some() || node.has_children(),
        }
    };
    if conflicting {
        return Err(EngineError::update_engine(format!(
            "conflicting update paths at {path:?}"
        )));
    }
    paths.append(path).store(());
    Ok(())
}

fn expect_operator_argument<'a>(op: &str, arg: &'a Value) -> CoreResult<&'a Document> {
    arg.as_document().ok_or_else(|| {
        EngineError::update_engine(format!("{op:?} requires a document argument"))
    })
}

fn rename_target<'a>(path: &str, value: &'a Value) -> CoreResult<&'a str> {
    value.as_str().ok_or_else(|| {
        EngineError::update_engine(format!("$rename target for {path:?} must be a string"))
    })
}

enum ArithOp {
    Add,
    Mul,
}

use ArithOp::{Add, Mul};

fn apply_arithmetic(
    doc: &mut Document,
    path: &str,
    operand: &Value,
    op: ArithOp,
) -> CoreResult<()> {
    if !operand.is_number() {
        return Err(EngineError::update_engine(format!(
            "cannot apply numeric operator with {} operand",
            operand.type_name()
        )));
    }

    let current = doc.get(path);
    let next = if current.is_missing() {
        match op {
            Add => operand.clone(),
            Mul => zero_like(operand),
        }
    } else if current.is_number() {
        combine_numbers(&current, operand, op)
    } else {
        return Err(EngineError::update_engine(format!(
            "cannot apply numeric operator to {} at {path:?}",
            current.type_name()
        )));
    };

    doc.put(path, next, true)?;
    Ok(())
}

fn zero_like(operand: &Value) -> Value {
    match operand {
        Value::Double(_) => Value::Double(0.0),
        Value::Int64(_) => Value::Int64(0),
        _ => Value::Int32(0),
    }
}

/// Combines two numbers, promoting to double when either side is one and
/// widening `Int32` results that overflow.
fn combine_numbers(a: &Value, b: &Value, op: ArithOp) -> Value {
    if matches!(a, Value::Double(_)) || matches!(b, Value::Double(_)) {
        let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
        return Value::Double(match op {
            Add => x + y,
            Mul => x * y,
        });
    }

    let (x, y) = (a.as_i64().unwrap_or(0), b.as_i64().unwrap_or(0));
    let result = match op {
        Add => x.wrapping_add(y),
        Mul => x.wrapping_mul(y),
    };
    if matches!((a, b), (Value::Int32(_), Value::Int32(_))) {
        if let Ok(narrow) = i32::try_from(result) {
            return Value::Int32(narrow);
        }
    }
    Value::Int64(result)
}
