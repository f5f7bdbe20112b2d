use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::{Result, SqlRepoError};

/// Represents a SQL parameter value in a driver-agnostic way.
/// Drivers are responsible for converting these to their native types.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Text(String),
    Int32(i32),
    Int64(i64),
    Bool(bool),
}

impl SqlValue {
    /// Returns true for the values treated as "no id": null, zero, false,
    /// the empty string and the string `"0"`.
    pub fn is_empty_sentinel(&self) -> bool {
        match self {
            SqlValue::Null => true,
            SqlValue::Text(s) => s.is_empty() || s == "0",
            SqlValue::Int32(i) => *i == 0,
            SqlValue::Int64(i) => *i == 0,
            SqlValue::Bool(b) => !b,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Integer view of the value, if it has one.
    /// Booleans map to 0/1 and text must parse as a whole integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int32(i) => Some(i64::from(*i)),
            SqlValue::Int64(i) => Some(*i),
            SqlValue::Bool(b) => Some(i64::from(*b)),
            SqlValue::Text(s) => s.parse::<i64>().ok(),
            SqlValue::Null => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Text(s) => f.write_str(s),
            SqlValue::Int32(i) => write!(f, "{i}"),
            SqlValue::Int64(i) => write!(f, "{i}"),
            SqlValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            SqlValue::Null => serializer.serialize_none(),
            SqlValue::Text(s) => serializer.serialize_str(s),
            SqlValue::Int32(i) => serializer.serialize_i32(*i),
            SqlValue::Int64(i) => serializer.serialize_i64(*i),
            SqlValue::Bool(b) => serializer.serialize_bool(*b),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int32(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int64(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => SqlValue::Null,
        }
    }
}

impl TryFrom<&serde_json::Value> for SqlValue {
    type Error = SqlRepoError;

    fn try_from(value: &serde_json::Value) -> Result<Self> {
        use serde_json::Value;

        match value {
            Value::Null => Ok(SqlValue::Null),
            Value::Bool(b) => Ok(SqlValue::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(SqlValue::Int64(i)),
                None => Ok(SqlValue::Text(n.to_string())),
            },
            Value::String(s) => Ok(SqlValue::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => Err(SqlRepoError::TypeMismatch(format!(
                "expected a scalar value, got {value}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_sentinels() {
        assert!(SqlValue::Int64(0).is_empty_sentinel());
        assert!(SqlValue::Int32(0).is_empty_sentinel());
        assert!(SqlValue::from("").is_empty_sentinel());
        assert!(SqlValue::from("0").is_empty_sentinel());
        assert!(SqlValue::Null.is_empty_sentinel());
        assert!(!SqlValue::Int64(7).is_empty_sentinel());
        assert!(!SqlValue::from("abc").is_empty_sentinel());
    }

    #[test]
    fn test_as_i64() {
        assert_eq!(SqlValue::Bool(true).as_i64(), Some(1));
        assert_eq!(SqlValue::from("42").as_i64(), Some(42));
        assert_eq!(SqlValue::from("4x2").as_i64(), None);
        assert_eq!(SqlValue::Null.as_i64(), None);
    }

    #[test]
    fn test_from_json_scalar() {
        assert_eq!(SqlValue::try_from(&json!(3)).unwrap(), SqlValue::Int64(3));
        assert_eq!(SqlValue::try_from(&json!(1.5)).unwrap(), SqlValue::from("1.5"));
        assert_eq!(SqlValue::try_from(&json!(null)).unwrap(), SqlValue::Null);
        assert!(matches!(
            SqlValue::try_from(&json!([1, 2])),
            Err(SqlRepoError::TypeMismatch(_))
        ));
    }
}
