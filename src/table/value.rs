//! # Cell values
//!
//! [`Value`] is a dynamically typed table cell. Text sources are parsed cell by cell
//! (integer, then float, then text) so that the same token always produces the same
//! value, whether it is read from the flat file or round-tripped through SQLite.
//!
//! ## Null tokens
//! -----------------
//! Empty cells and the tokens `nan`, `NaN`, `NAN`, `null`, `NULL`, `None` are read as
//! [`Value::Null`].
//!
//! ## SQLite mapping
//! -----------------
//! [`Value`] implements [`ToSql`] and [`FromSql`] one-to-one with the SQLite storage
//! classes (`NULL`, `INTEGER`, `REAL`, `TEXT`). Blobs are rejected.
use std::{borrow::Cow, cmp::Ordering, fmt};

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

const NULL_TOKENS: [&str; 7] = ["", "nan", "NaN", "NAN", "null", "NULL", "None"];

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Infer a value from a raw text token.
    pub fn parse(raw: &str) -> Self {
        let token = raw.trim();
        if NULL_TOKENS.contains(&token) {
            return Value::Null;
        }
        if let Ok(i) = token.parse::<i64>() {
            return Value::Int(i);
        }
        match token.parse::<f64>() {
            Ok(f) if f.is_nan() => Value::Null,
            Ok(f) => Value::Float(f),
            Err(_) => Value::Text(token.to_string()),
        }
    }

    /// Read a token as an identifier: never numeric, null only when absent.
    pub fn parse_id(raw: &str) -> Self {
        let token = raw.trim();
        if NULL_TOKENS.contains(&token) {
            Value::Null
        } else {
            Value::Text(token.to_string())
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Canonical string used to compare identifiers across sources.
    ///
    /// An integer pointing id read from text (`Int(7)`), from SQLite (`Int(7)`) or
    /// stored as a whole float (`Float(7.0)`) all map to `"7"`.
    pub fn key(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(Cow::Borrowed(s.as_str())),
            Value::Int(i) => Some(Cow::Owned(i.to_string())),
            Value::Float(f) => Some(Cow::Owned(f.to_string())),
        }
    }

    /// Total order over values: `Null < numbers < text`, numbers by value.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Int(_) | Value::Float(_) => 1,
                Value::Text(_) => 2,
            }
        }
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (a, b) if rank(a) == 1 && rank(b) == 1 => {
                // Both numeric, at least one float.
                let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                x.total_cmp(&y)
            }
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Int(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(Value::Null),
            ValueRef::Integer(i) => Ok(Value::Int(i)),
            ValueRef::Real(f) => Ok(Value::Float(f)),
            ValueRef::Text(bytes) => std::str::from_utf8(bytes)
                .map(|s| Value::Text(s.to_string()))
                .map_err(|e| FromSqlError::Other(Box::new(e))),
            ValueRef::Blob(_) => Err(FromSqlError::InvalidType),
        }
    }
}

#[cfg(test)]
mod value_test {
    use super::*;

    #[test]
    fn test_parse_infers_types() {
        assert_eq!(Value::parse("42"), Value::Int(42));
        assert_eq!(Value::parse(" -3 "), Value::Int(-3));
        assert_eq!(Value::parse("60220.0123"), Value::Float(60220.0123));
        assert_eq!(Value::parse("1e3"), Value::Float(1000.0));
        assert_eq!(Value::parse("S1000000a"), Value::Text("S1000000a".into()));
        assert_eq!(Value::parse(""), Value::Null);
        assert_eq!(Value::parse("NaN"), Value::Null);
        assert_eq!(Value::parse("null"), Value::Null);
    }

    #[test]
    fn test_ids_are_always_text() {
        assert_eq!(Value::parse_id("7"), Value::Text("7".into()));
        assert_eq!(Value::parse_id("7.0"), Value::Text("7.0".into()));
        assert_eq!(Value::parse_id(""), Value::Null);
    }

    #[test]
    fn test_key_is_canonical_across_numeric_types() {
        assert_eq!(Value::Int(894816).key().as_deref(), Some("894816"));
        assert_eq!(Value::Float(894816.0).key().as_deref(), Some("894816"));
        assert_eq!(Value::Text("894816".into()).key().as_deref(), Some("894816"));
        assert_eq!(Value::Null.key(), None);
    }

    #[test]
    fn test_display_round_trips_floats() {
        let v = Value::Float(0.1 + 0.2);
        assert_eq!(Value::parse(&v.to_string()), v);
        assert_eq!(Value::Null.to_string(), "");
    }

    #[test]
    fn test_total_cmp_orders_mixed_values() {
        let mut values = vec![
            Value::Text("b".into()),
            Value::Float(2.5),
            Value::Null,
            Value::Int(2),
            Value::Text("a".into()),
        ];
        values.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Int(2),
                Value::Float(2.5),
                Value::Text("a".into()),
                Value::Text("b".into()),
            ]
        );
    }
}
