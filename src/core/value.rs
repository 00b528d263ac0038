use super::ColumnType;
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Text(String),
    Json(JsonValue),
}

impl Value {
    /// Convert a JSON value for storage in a column of the given type.
    ///
    /// The column type is the already-unified type, so every value fits it:
    /// text columns take the rendering of whatever scalar they widened from,
    /// json columns take any value.
    pub fn from_json(value: &JsonValue, column_type: ColumnType) -> Value {
        match (value, column_type) {
            (JsonValue::Null, _) => Value::Null,
            (JsonValue::Bool(b), ColumnType::Boolean) => Value::Boolean(*b),
            (JsonValue::Number(n), ColumnType::Integer) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Real(n.as_f64().unwrap_or(f64::NAN)),
            },
            (JsonValue::Number(n), ColumnType::Real) => {
                Value::Real(n.as_f64().unwrap_or(f64::NAN))
            }
            (JsonValue::String(s), ColumnType::Text) => Value::Text(s.clone()),
            (v, ColumnType::Json) => Value::Json(v.clone()),
            (v, _) => Value::Text(v.to_string()),
        }
    }

    /// Read a stored value back, using the declared column type when known.
    pub fn from_sql(value: ValueRef<'_>, declared: Option<ColumnType>) -> Value {
        match (value, declared) {
            (ValueRef::Null, _) => Value::Null,
            (ValueRef::Integer(i), Some(ColumnType::Boolean)) => Value::Boolean(i != 0),
            (ValueRef::Integer(i), Some(ColumnType::Json)) => Value::Json(JsonValue::from(i)),
            (ValueRef::Integer(i), _) => Value::Integer(i),
            (ValueRef::Real(f), Some(ColumnType::Json)) => serde_json::Number::from_f64(f)
                .map(|n| Value::Json(JsonValue::Number(n)))
                .unwrap_or(Value::Real(f)),
            (ValueRef::Real(f), _) => Value::Real(f),
            (ValueRef::Text(bytes), Some(ColumnType::Json)) => {
                let text = String::from_utf8_lossy(bytes);
                serde_json::from_str(&text)
                    .map(Value::Json)
                    .unwrap_or_else(|_| Value::Text(text.into_owned()))
            }
            (ValueRef::Text(bytes), _) | (ValueRef::Blob(bytes), _) => {
                Value::Text(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Integer(i) => JsonValue::from(*i),
            Value::Real(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Boolean(b) => JsonValue::Bool(*b),
            Value::Text(s) => JsonValue::String(s.clone()),
            Value::Json(v) => v.clone(),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Value::Null => Ok(ToSqlOutput::Owned(SqlValue::Null)),
            Value::Integer(i) => Ok(ToSqlOutput::Owned(SqlValue::Integer(*i))),
            Value::Real(f) => Ok(ToSqlOutput::Owned(SqlValue::Real(*f))),
            Value::Boolean(b) => Ok(ToSqlOutput::Owned(SqlValue::Integer(*b as i64))),
            Value::Text(s) => Ok(ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes()))),
            Value::Json(v) => Ok(ToSqlOutput::Owned(SqlValue::Text(v.to_string()))),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(v) => write!(f, "{}", v),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Text(s) => write!(f, "{}", s),
            Value::Json(v) => write!(f, "{}", v),
        }
    }
}
