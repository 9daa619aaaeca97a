//! Dynamic document value type and canonical ordering.

use crate::document::Document;
use crate::objectid::ObjectId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A dynamic document value.
///
/// `Value` represents any value that can appear in a document. Values of
/// different variants are mutually comparable: every variant belongs to a
/// canonical type rank, and comparison orders by rank first, then within
/// the rank.
///
/// # Missing vs Null
///
/// `Missing` is the result of resolving a path that does not exist; `Null`
/// is an explicit null stored in a document. Both occupy the same type rank
/// and compare equal, but `Value::is_missing` tells them apart, which is
/// what predicates like existence checks rely on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// The result of an unresolvable path. Never stored in a document.
    Missing,
    /// Explicit null.
    Null,
    /// Deprecated undefined value, kept for order-compatibility.
    Undefined,
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit floating point number.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Embedded document.
    Document(Document),
    /// Array of values.
    Array(Vec<Value>),
    /// Binary data with a subtype tag.
    Binary {
        /// Binary subtype tag.
        subtype: u8,
        /// Raw bytes.
        bytes: Vec<u8>,
    },
    /// 12-byte object identifier.
    ObjectId(ObjectId),
    /// Boolean value.
    Boolean(bool),
    /// Point in time as milliseconds since the Unix epoch.
    DateTime(i64),
    /// Internal timestamp with seconds and an ordinal counter.
    Timestamp {
        /// Seconds since the Unix epoch.
        time: u32,
        /// Ordinal within the second.
        ordinal: u32,
    },
    /// Regular expression with lexically compared fields.
    Regex {
        /// The expression pattern.
        pattern: String,
        /// The expression options.
        options: String,
    },
}

impl Value {
    /// Returns the canonical type rank used as the primary comparison key.
    #[must_use]
    pub fn type_rank(&self) -> u8 {
        match self {
            Value::Missing | Value::Null | Value::Undefined => 1,
            Value::Int32(_) | Value::Int64(_) | Value::Double(_) => 2,
            Value::String(_) => 3,
            Value::Document(_) => 4,
            Value::Array(_) => 5,
            Value::Binary { .. } => 6,
            Value::ObjectId(_) => 7,
            Value::Boolean(_) => 8,
            Value::DateTime(_) | Value::Timestamp { .. } => 9,
            Value::Regex { .. } => 10,
        }
    }

    /// Returns a short name for the variant, used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Missing => "missing",
            Value::Null => "null",
            Value::Undefined => "undefined",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Document(_) => "document",
            Value::Array(_) => "array",
            Value::Binary { .. } => "binary",
            Value::ObjectId(_) => "objectId",
            Value::Boolean(_) => "boolean",
            Value::DateTime(_) => "dateTime",
            Value::Timestamp { .. } => "timestamp",
            Value::Regex { .. } => "regex",
        }
    }

    /// Check if this value is the missing sentinel.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Check if this value is an explicit null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value is numeric.
    #[must_use]
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int32(_) | Value::Int64(_) | Value::Double(_))
    }

    /// Get this value as an `i64`, widening `Int32` if necessary.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(n) => Some(i64::from(*n)),
            Value::Int64(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as an `f64`, converting from integers if necessary.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(n) => Some(f64::from(*n)),
            #[allow(clippy::cast_precision_loss)]
            Value::Int64(n) => Some(*n as f64),
            Value::Double(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a boolean, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as a string slice, if it is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as an array, if it is one.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get this value as a document, if it is one.
    #[must_use]
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    /// Get this value as an object ID, if it is one.
    #[must_use]
    pub fn as_object_id(&self) -> Option<ObjectId> {
        match self {
            Value::ObjectId(id) => Some(*id),
            _ => None,
        }
    }

    /// Compare two values in the canonical total order.
    ///
    /// Values compare by type rank first, then within the rank. Numbers
    /// compare exactly across integer and floating point variants. NaN
    /// compares equal to NaN and below every real number.
    #[must_use]
    pub fn compare(&self, other: &Value) -> Ordering {
        let lr = self.type_rank();
        let rr = other.type_rank();
        if lr != rr {
            return lr.cmp(&rr);
        }

        match (self, other) {
            // Rank 1 values are all equal among themselves.
            (
                Value::Missing | Value::Null | Value::Undefined,
                Value::Missing | Value::Null | Value::Undefined,
            ) => Ordering::Equal,

            // Numbers compare exactly across variants.
            (a, b) if a.is_number() && b.is_number() => compare_numbers(a, b),

            (Value::String(a), Value::String(b)) => a.as_bytes().cmp(b.as_bytes()),

            (Value::Document(a), Value::Document(b)) => compare_documents(a, b),

            (Value::Array(a), Value::Array(b)) => compare_arrays(a, b),

            (
                Value::Binary {
                    subtype: at,
                    bytes: ab,
                },
                Value::Binary {
                    subtype: bt,
                    bytes: bb,
                },
            ) => at.cmp(bt).then_with(|| ab.cmp(bb)),

            (Value::ObjectId(a), Value::ObjectId(b)) => a.cmp(b),

            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),

            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (
                Value::Timestamp {
                    time: at,
                    ordinal: ai,
                },
                Value::Timestamp {
                    time: bt,
                    ordinal: bi,
                },
            ) => at.cmp(bt).then_with(|| ai.cmp(bi)),
            // Cross comparison of the time rank uses whole seconds.
            (Value::DateTime(ms), Value::Timestamp { time, .. }) => {
                ms.div_euclid(1000).cmp(&i64::from(*time))
            }
            (Value::Timestamp { time, .. }, Value::DateTime(ms)) => {
                i64::from(*time).cmp(&ms.div_euclid(1000))
            }

            (
                Value::Regex {
                    pattern: ap,
                    options: ao,
                },
                Value::Regex {
                    pattern: bp,
                    options: bo,
                },
            ) => ap.cmp(bp).then_with(|| ao.cmp(bo)),

            // Unreachable with equal ranks.
            _ => Ordering::Equal,
        }
    }
}

/// Compare two numeric values exactly.
fn compare_numbers(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Double(x), Value::Double(y)) => compare_doubles(*x, *y),
        (Value::Double(x), _) => match b.as_i64() {
            Some(y) => compare_i64_f64(y, *x).reverse(),
            None => Ordering::Equal,
        },
        (_, Value::Double(y)) => match a.as_i64() {
            Some(x) => compare_i64_f64(x, *y),
            None => Ordering::Equal,
        },
        _ => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => Ordering::Equal,
        },
    }
}

/// Compare two doubles with NaN ordered below every real and equal to itself.
fn compare_doubles(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => {
            if a < b {
                Ordering::Less
            } else if a > b {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        }
    }
}

/// Compare an `i64` with an `f64` without precision loss.
///
/// Converting a large `i64` to `f64` can round by up to 1024, so the double
/// is decomposed into integral and fractional parts instead.
fn compare_i64_f64(a: i64, b: f64) -> Ordering {
    const I64_BOUND: f64 = 9_223_372_036_854_775_808.0; // 2^63

    if b.is_nan() {
        return Ordering::Greater;
    }
    if b >= I64_BOUND {
        return Ordering::Less;
    }
    if b < -I64_BOUND {
        return Ordering::Greater;
    }

    // |trunc(b)| < 2^63, so the cast is exact.
    let whole = b.trunc();
    #[allow(clippy::cast_possible_truncation)]
    let whole_int = whole as i64;
    match a.cmp(&whole_int) {
        Ordering::Equal => {
            let frac = b - whole;
            if frac > 0.0 {
                Ordering::Less
            } else if frac < 0.0 {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        }
        ord => ord,
    }
}

/// Compare documents element-wise by key, then value; shorter prefix first.
fn compare_documents(a: &Document, b: &Document) -> Ordering {
    for ((ak, av), (bk, bv)) in a.iter().zip(b.iter()) {
        let key_ord = ak.as_bytes().cmp(bk.as_bytes());
        if key_ord != Ordering::Equal {
            return key_ord;
        }
        let val_ord = av.compare(bv);
        if val_ord != Ordering::Equal {
            return val_ord;
        }
    }
    a.len().cmp(&b.len())
}

/// Compare arrays element-wise; shorter prefix first.
fn compare_arrays(a: &[Value], b: &[Value]) -> Ordering {
    for (av, bv) in a.iter().zip(b.iter()) {
        let ord = av.compare(bv);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

// The canonical ordering is a total order: NaN equals NaN and numeric
// equality across variants is an equivalence relation.
impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int32(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int64(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::ObjectId(id)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::Document(doc)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::Array(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn rank_ordering() {
        let values = vec![
            Value::Regex {
                pattern: "a".into(),
                options: String::new(),
            },
            Value::Boolean(false),
            Value::String("x".into()),
            Value::Null,
            Value::Int64(3),
            Value::Array(vec![]),
        ];

        let mut sorted = values;
        sorted.sort();

        assert!(sorted[0].is_null());
        assert_eq!(sorted[1], Value::Int64(3));
        assert_eq!(sorted[2], Value::String("x".into()));
        assert_eq!(sorted[3], Value::Array(vec![]));
        assert_eq!(sorted[4], Value::Boolean(false));
        assert!(matches!(sorted[5], Value::Regex { .. }));
    }

    #[test]
    fn null_missing_undefined_equal() {
        assert_eq!(Value::Null, Value::Missing);
        assert_eq!(Value::Null, Value::Undefined);
        assert!(Value::Missing.is_missing());
        assert!(!Value::Null.is_missing());
    }

    #[test]
    fn cross_type_numeric_equality() {
        assert_eq!(Value::Int32(5), Value::Int64(5));
        assert_eq!(Value::Int64(5), Value::Double(5.0));
        assert!(Value::Int32(5) < Value::Double(5.5));
        assert!(Value::Double(4.5) < Value::Int64(5));
    }

    #[test]
    fn large_integer_double_comparison_is_exact() {
        // 2^53 + 1 is not representable as f64; a lossy comparison through
        // f64 would see these as equal.
        let big = (1i64 << 53) + 1;
        assert!(Value::Int64(big) > Value::Double(9_007_199_254_740_992.0));
        assert!(Value::Int64(i64::MAX) < Value::Double(f64::INFINITY));
        assert!(Value::Int64(i64::MIN) > Value::Double(f64::NEG_INFINITY));
    }

    #[test]
    fn nan_orders_below_reals_and_equals_itself() {
        assert_eq!(Value::Double(f64::NAN), Value::Double(f64::NAN));
        assert!(Value::Double(f64::NAN) < Value::Double(f64::NEG_INFINITY));
        assert!(Value::Double(f64::NAN) < Value::Int64(i64::MIN));
    }

    #[test]
    fn string_order_is_bytewise() {
        assert!(Value::String("a".into()) < Value::String("b".into()));
        assert!(Value::String("a".into()) < Value::String("aa".into()));
    }

    #[test]
    fn document_order_by_key_then_value() {
        let a = doc! { "a" => 1 };
        let b = doc! { "b" => 1 };
        let c = doc! { "a" => 2 };
        assert!(Value::Document(a.clone()) < Value::Document(b));
        assert!(Value::Document(a.clone()) < Value::Document(c));

        // Shorter prefix sorts first.
        let long = doc! { "a" => 1, "b" => 2 };
        assert!(Value::Document(a) < Value::Document(long));
    }

    #[test]
    fn array_prefix_order() {
        let short = Value::Array(vec![Value::Int32(1)]);
        let long = Value::Array(vec![Value::Int32(1), Value::Int32(2)]);
        assert!(short < long);
    }

    #[test]
    fn binary_order() {
        let a = Value::Binary {
            subtype: 0,
            bytes: vec![9],
        };
        let b = Value::Binary {
            subtype: 1,
            bytes: vec![0],
        };
        assert!(a < b);
    }

    #[test]
    fn datetime_timestamp_cross_order() {
        let dt = Value::DateTime(2000);
        let ts = Value::Timestamp {
            time: 2,
            ordinal: 0,
        };
        assert_eq!(dt.compare(&ts), Ordering::Equal);
        assert!(Value::DateTime(1999) < ts);
        assert!(Value::DateTime(3000) > ts);
    }

    #[test]
    fn ordering_is_transitive_over_sample() {
        let values = vec![
            Value::Null,
            Value::Double(f64::NAN),
            Value::Int32(-1),
            Value::Int64(0),
            Value::Double(0.5),
            Value::String("a".into()),
            Value::Boolean(true),
        ];

        for a in &values {
            assert_eq!(a.compare(a), Ordering::Equal);
            for b in &values {
                assert_eq!(a.compare(b), b.compare(a).reverse());
                for c in &values {
                    if a.compare(b) != Ordering::Greater && b.compare(c) != Ordering::Greater {
                        assert_ne!(a.compare(c), Ordering::Greater);
                    }
                }
            }
        }
    }
}
