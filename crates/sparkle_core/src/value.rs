//! Field values, state parts and primary keys.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// One state part of a row: a mapping of field name to value.
pub type Part = serde_json::Map<String, Value>;

/// A hashable field value.
///
/// Rows store arbitrary JSON, but index buckets and primary keys need
/// `Eq + Hash + Ord`. Integral numbers become [`Scalar::Int`] whether they
/// were written as `1` or `1.0`, so both land in the same bucket. Values
/// without a natural scalar form (fractional floats, arrays, objects) are
/// kept as their canonical JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scalar {
    /// JSON `null`.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer that fits in `i64`.
    Int(i64),
    /// Text value.
    Text(String),
    /// Any other JSON value, as canonical JSON text.
    Json(String),
}

impl Scalar {
    /// Converts a JSON value to its scalar form.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Scalar::Null,
            Value::Bool(b) => Scalar::Bool(*b),
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => Scalar::Int(i),
                (None, Some(f))
                    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 =>
                {
                    Scalar::Int(f as i64)
                }
                _ => Scalar::Json(n.to_string()),
            },
            Value::String(s) => Scalar::Text(s.clone()),
            // serde_json maps are sorted, so this text is canonical.
            other => Scalar::Json(other.to_string()),
        }
    }

    /// Converts back to a JSON value.
    pub fn to_value(&self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(i) => Value::from(*i),
            Scalar::Text(s) => Value::String(s.clone()),
            Scalar::Json(text) => {
                serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone()))
            }
        }
    }

    /// Returns the text if this is a text scalar.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<&Value> for Scalar {
    fn from(value: &Value) -> Self {
        Scalar::from_value(value)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Text(s) => f.write_str(s),
            Scalar::Json(text) => f.write_str(text),
        }
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(|v| Scalar::from_value(&v))
    }
}

/// Primary key of a row.
///
/// Single-column tables use [`PrimaryKey::Scalar`]; join tables with a
/// composite key use [`PrimaryKey::Composite`], whose components follow the
/// column order of the table descriptor. On the wire a composite key is a
/// JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimaryKey {
    /// Single-column key.
    Scalar(Scalar),
    /// Ordered multi-column key.
    Composite(Vec<Scalar>),
}

impl PrimaryKey {
    /// Builds a composite key.
    pub fn composite<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Scalar>,
    {
        PrimaryKey::Composite(parts.into_iter().map(Into::into).collect())
    }

    /// Converts a JSON value to a key. Arrays become composite keys.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Array(items) => {
                PrimaryKey::Composite(items.iter().map(Scalar::from_value).collect())
            }
            other => PrimaryKey::Scalar(Scalar::from_value(other)),
        }
    }

    /// Converts the key to its wire form.
    pub fn to_value(&self) -> Value {
        match self {
            PrimaryKey::Scalar(s) => s.to_value(),
            PrimaryKey::Composite(parts) => {
                Value::Array(parts.iter().map(Scalar::to_value).collect())
            }
        }
    }

    /// Returns true for composite keys.
    pub fn is_composite(&self) -> bool {
        matches!(self, PrimaryKey::Composite(_))
    }
}

impl From<&str> for PrimaryKey {
    fn from(value: &str) -> Self {
        PrimaryKey::Scalar(Scalar::from(value))
    }
}

impl From<String> for PrimaryKey {
    fn from(value: String) -> Self {
        PrimaryKey::Scalar(Scalar::from(value))
    }
}

impl From<i64> for PrimaryKey {
    fn from(value: i64) -> Self {
        PrimaryKey::Scalar(Scalar::Int(value))
    }
}

impl From<Scalar> for PrimaryKey {
    fn from(value: Scalar) -> Self {
        PrimaryKey::Scalar(value)
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimaryKey::Scalar(s) => write!(f, "{s}"),
            PrimaryKey::Composite(parts) => {
                f.write_str("(")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{part}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl Serialize for PrimaryKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PrimaryKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(|v| PrimaryKey::from_value(&v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_from_json() {
        assert_eq!(Scalar::from_value(&json!(null)), Scalar::Null);
        assert_eq!(Scalar::from_value(&json!(true)), Scalar::Bool(true));
        assert_eq!(Scalar::from_value(&json!(42)), Scalar::Int(42));
        assert_eq!(Scalar::from_value(&json!("eth0")), Scalar::Text("eth0".into()));
        assert!(matches!(Scalar::from_value(&json!(1.5)), Scalar::Json(_)));
        assert_eq!(Scalar::from_value(&json!(1.0)), Scalar::Int(1));
        assert_eq!(Scalar::from_value(&json!(-3.0)), Scalar::Int(-3));
        assert!(matches!(Scalar::from_value(&json!(1e300)), Scalar::Json(_)));
    }

    #[test]
    fn object_scalar_is_canonical() {
        let a = Scalar::from_value(&json!({"b": 1, "a": 2}));
        let b = Scalar::from_value(&json!({"a": 2, "b": 1}));
        assert_eq!(a, b);
        assert_eq!(a.to_value(), json!({"a": 2, "b": 1}));
    }

    #[test]
    fn text_and_json_text_stay_distinct() {
        let text = Scalar::from_value(&json!("[1]"));
        let array = Scalar::from_value(&json!([1]));
        assert_ne!(text, array);
    }

    #[test]
    fn list_keys_become_composite() {
        let key = PrimaryKey::from_value(&json!(["h1", "d1"]));
        assert_eq!(key, PrimaryKey::composite(["h1", "d1"]));
        assert!(key.is_composite());
        assert_eq!(key.to_value(), json!(["h1", "d1"]));
    }

    #[test]
    fn key_display() {
        assert_eq!(PrimaryKey::from("h1").to_string(), "h1");
        assert_eq!(PrimaryKey::composite(["h1", "d1"]).to_string(), "(h1, d1)");
    }

    #[test]
    fn key_serde() {
        let key: PrimaryKey = serde_json::from_str(r#"["t1", "s1"]"#).unwrap();
        assert_eq!(key, PrimaryKey::composite(["t1", "s1"]));
        assert_eq!(serde_json::to_string(&key).unwrap(), r#"["t1","s1"]"#);
    }
}
