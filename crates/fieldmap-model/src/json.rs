//! JSON bridge
//!
//! JSON objects become open records; whole numbers become integers.

use serde_json::{Map, Number};

use crate::record::Record;
use crate::value::Value;

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map_or(Value::Null, Value::Decimal),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(fields) => {
                let mut record = Record::open();
                for (name, field) in fields {
                    record = record.with(name, Value::from(field));
                }
                Value::Record(record)
            }
        }
    }
}

impl Value {
    /// Render the value tree as JSON. Type names are not carried over.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::Number((*i).into()),
            Value::Decimal(d) => {
                Number::from_f64(*d).map_or(serde_json::Value::Null, serde_json::Value::Number)
            }
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Record(record) => {
                let mut fields = Map::new();
                for (name, value) in record.iter() {
                    fields.insert(name.to_string(), value.to_json());
                }
                serde_json::Value::Object(fields)
            }
        }
    }
}
