use std::borrow::Cow;

use super::SqlValue;

/// Storage type a value is bound with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Integer,
    String,
    Null,
}

impl ParamType {
    /// Infers the storage type for a value.
    ///
    /// Booleans and anything that parses as an integer bind as integers,
    /// null binds as null and everything else as a string.
    pub fn infer(value: &SqlValue) -> Self {
        match value {
            SqlValue::Null => ParamType::Null,
            SqlValue::Bool(_) | SqlValue::Int32(_) | SqlValue::Int64(_) => ParamType::Integer,
            SqlValue::Text(s) if s.parse::<i64>().is_ok() => ParamType::Integer,
            SqlValue::Text(_) => ParamType::String,
        }
    }
}

/// A value bound to a named placeholder of a prepared statement.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParameter {
    /// Placeholder name without the leading colon
    pub name: String,
    pub value: SqlValue,
    pub param_type: ParamType,
}

/// What a driver should hand to the engine for a bound parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageValue<'a> {
    Integer(i64),
    Text(Cow<'a, str>),
    Null,
}

impl BoundParameter {
    /// Binds `value` with its inferred storage type.
    pub fn new(name: impl Into<String>, value: SqlValue) -> Self {
        let param_type = ParamType::infer(&value);
        Self {
            name: name.into(),
            value,
            param_type,
        }
    }

    /// The placeholder as it appears in SQL text, e.g. `:first_name`.
    pub fn placeholder(&self) -> String {
        format!(":{}", self.name)
    }

    /// Converts the value to the representation its storage type requires.
    pub fn storage_value(&self) -> StorageValue<'_> {
        match self.param_type {
            ParamType::Null => StorageValue::Null,
            ParamType::Integer => match self.value.as_i64() {
                Some(i) => StorageValue::Integer(i),
                None => StorageValue::Null,
            },
            ParamType::String => match &self.value {
                SqlValue::Text(s) => StorageValue::Text(Cow::Borrowed(s)),
                other => StorageValue::Text(Cow::Owned(other.to_string())),
            },
        }
    }
}
