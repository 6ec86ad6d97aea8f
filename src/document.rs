//! Extracted values and the per-record documents handed to the indexing engine.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;

/// Represents a value produced by an extractor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<FieldValue>),
    Object(Map<String, Value>),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "null"),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(fl) => write!(f, "{}", fl),
            FieldValue::String(s) => write!(f, "{}", s),
            FieldValue::List(l) => write!(f, "{:?}", l),
            FieldValue::Object(o) => write!(f, "{}", Value::Object(o.clone())),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(items: Vec<FieldValue>) -> Self {
        FieldValue::List(items)
    }
}

impl FieldValue {
    /// Build a list of strings.
    pub fn strings<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldValue::List(items.into_iter().map(|s| FieldValue::String(s.into())).collect())
    }

    /// Convert a JSON value, keeping nested objects intact.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Int(i)
                } else if let Some(f) = n.as_f64() {
                    FieldValue::Float(f)
                } else {
                    FieldValue::Null
                }
            }
            Value::String(s) => FieldValue::String(s.clone()),
            Value::Array(items) => FieldValue::List(items.iter().map(FieldValue::from_json).collect()),
            Value::Object(obj) => FieldValue::Object(obj.clone()),
        }
    }

    /// Convert back to JSON for output.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Int(i) => Value::from(*i),
            FieldValue::Float(f) => Value::from(*f),
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::List(items) => Value::Array(items.iter().map(FieldValue::to_json).collect()),
            FieldValue::Object(obj) => Value::Object(obj.clone()),
        }
    }

    /// `Null`, the empty string, and the empty list all mean "no data".
    pub fn is_absent(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::String(s) => s.is_empty(),
            FieldValue::List(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Truthiness used by badge activators.
    pub fn is_truthy(&self) -> bool {
        match self {
            FieldValue::Bool(b) => *b,
            FieldValue::Int(i) => *i != 0,
            FieldValue::Float(f) => *f != 0.0,
            FieldValue::Object(obj) => !obj.is_empty(),
            other => !other.is_absent(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Variant name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "bool",
            FieldValue::Int(_) => "int",
            FieldValue::Float(_) => "float",
            FieldValue::String(_) => "string",
            FieldValue::List(_) => "list",
            FieldValue::Object(_) => "object",
        }
    }

    /// Append this value to `out`, splicing lists and dropping absent values.
    pub fn flatten_into(self, out: &mut Vec<FieldValue>) {
        match self {
            FieldValue::List(items) => out.extend(items.into_iter().filter(|v| !v.is_absent())),
            value if value.is_absent() => {}
            value => out.push(value),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            FieldValue::Null => 0,
            FieldValue::Bool(_) => 1,
            FieldValue::Int(_) | FieldValue::Float(_) => 2,
            FieldValue::String(_) => 3,
            FieldValue::List(_) => 4,
            FieldValue::Object(_) => 5,
        }
    }

    /// Total order used by sort definitions.
    pub fn sort_cmp(&self, other: &FieldValue) -> Ordering {
        match (self, other) {
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a.cmp(b),
            (FieldValue::Int(a), FieldValue::Int(b)) => a.cmp(b),
            (FieldValue::Int(_) | FieldValue::Float(_), FieldValue::Int(_) | FieldValue::Float(_)) => {
                let a = self.as_f64().unwrap_or_default();
                let b = other.as_f64().unwrap_or_default();
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            }
            (FieldValue::String(a), FieldValue::String(b)) => a.cmp(b),
            (FieldValue::List(a), FieldValue::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.sort_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (FieldValue::Object(a), FieldValue::Object(b)) => {
                Value::Object(a.clone()).to_string().cmp(&Value::Object(b.clone()).to_string())
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

/// A field that could not be extracted for one record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionFailure {
    pub record: String,
    pub field: String,
    pub reason: String,
}

impl fmt::Display for ExtractionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Failed to extract field '{}' for record '{}': {}",
            self.field, self.record, self.reason
        )
    }
}

/// The derived, encoded values of one record, keyed by field or facet key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    pub values: IndexMap<String, FieldValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ExtractionFailure>,
}

impl Document {
    /// An empty document for record `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            values: IndexMap::new(),
            failures: Vec::new(),
        }
    }

    /// Set a value, replacing any previous one.
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.values.get(key)
    }

    /// Value for `key`, treating a missing field as `Null`.
    pub fn value_or_null(&self, key: &str) -> &FieldValue {
        const NULL: &FieldValue = &FieldValue::Null;
        self.values.get(key).unwrap_or(NULL)
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_values() {
        assert!(FieldValue::Null.is_absent());
        assert!(FieldValue::from("").is_absent());
        assert!(FieldValue::List(vec![]).is_absent());
        assert!(!FieldValue::Bool(false).is_absent());
        assert!(!FieldValue::from("x").is_absent());
    }

    #[test]
    fn test_flatten_into_drops_absent() {
        let mut out = Vec::new();
        FieldValue::strings(["a", "", "b"]).flatten_into(&mut out);
        FieldValue::Null.flatten_into(&mut out);
        FieldValue::from("c").flatten_into(&mut out);

        assert_eq!(out, vec!["a".into(), "b".into(), "c".into()]);
    }

    #[test]
    fn test_sort_cmp_orders_kinds_and_lists() {
        assert_eq!(FieldValue::Null.sort_cmp(&FieldValue::Bool(false)), Ordering::Less);
        assert_eq!(FieldValue::Bool(false).sort_cmp(&FieldValue::Bool(true)), Ordering::Less);
        assert_eq!(FieldValue::Int(2).sort_cmp(&FieldValue::Float(1.5)), Ordering::Greater);
        assert_eq!(FieldValue::from("abc").sort_cmp(&FieldValue::from("abd")), Ordering::Less);
        assert_eq!(
            FieldValue::strings(["a"]).sort_cmp(&FieldValue::strings(["a", "b"])),
            Ordering::Less
        );
    }

    #[test]
    fn test_json_conversion_keeps_objects() {
        let value = json!({"title": "T", "creators": [{"lastName": "Smith"}]});
        let field = FieldValue::from_json(&value);

        assert!(matches!(field, FieldValue::Object(_)));
        assert_eq!(field.to_json(), value);
    }

    #[test]
    fn test_document_serializes_without_empty_failures() {
        let doc = Document::new("K").with_value("internal", true);
        let json = serde_json::to_value(&doc).unwrap();

        assert_eq!(json, json!({"id": "K", "values": {"internal": true}}));
        assert_eq!(doc.value_or_null("missing"), &FieldValue::Null);
    }
}
