// XML-RPC value model.
//
// `XmlRpcValue` covers the types the host actually sends and expects back:
// strings, integers (`int`/`i4`/`i8`), booleans, doubles, structs, arrays and
// `nil`. Values convert to and from `serde_json::Value` so structured
// arguments (the song snapshot, option dictionaries) can go through serde.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};

#[derive(Clone, Debug, PartialEq)]
pub enum XmlRpcValue {
    String(String),
    Int(i64),
    Bool(bool),
    Double(f64),
    Struct(BTreeMap<String, XmlRpcValue>),
    Array(Vec<XmlRpcValue>),
    Nil,
}

impl XmlRpcValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            XmlRpcValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integers, and doubles with no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            XmlRpcValue::Int(i) => Some(i),
            XmlRpcValue::Double(d) if d.fract() == 0.0 && d.is_finite() => Some(d as i64),
            XmlRpcValue::String(ref s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            XmlRpcValue::Double(d) => Some(d),
            XmlRpcValue::Int(i) => Some(i as f64),
            XmlRpcValue::String(ref s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Booleans, integers (non-zero is true), and the strings
    /// `true`/`false`/`1`/`0`/`yes`/`no`/`none` in any case.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            XmlRpcValue::Bool(b) => Some(*b),
            XmlRpcValue::Int(i) => Some(*i != 0),
            XmlRpcValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" | "none" | "" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, XmlRpcValue::Nil)
    }

    pub fn get(&self, key: &str) -> Option<&XmlRpcValue> {
        match self {
            XmlRpcValue::Struct(members) => members.get(key),
            _ => None,
        }
    }
}

impl From<&str> for XmlRpcValue {
    fn from(s: &str) -> Self {
        XmlRpcValue::String(s.to_string())
    }
}

impl From<String> for XmlRpcValue {
    fn from(s: String) -> Self {
        XmlRpcValue::String(s)
    }
}

impl From<bool> for XmlRpcValue {
    fn from(b: bool) -> Self {
        XmlRpcValue::Bool(b)
    }
}

impl From<i64> for XmlRpcValue {
    fn from(i: i64) -> Self {
        XmlRpcValue::Int(i)
    }
}

impl From<f64> for XmlRpcValue {
    fn from(d: f64) -> Self {
        XmlRpcValue::Double(d)
    }
}

impl From<&Value> for XmlRpcValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => XmlRpcValue::Nil,
            Value::Bool(b) => XmlRpcValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => XmlRpcValue::Int(i),
                None => XmlRpcValue::Double(n.as_f64().unwrap_or(0.0)),
            },
            Value::String(s) => XmlRpcValue::String(s.clone()),
            Value::Array(items) => XmlRpcValue::Array(items.iter().map(XmlRpcValue::from).collect()),
            Value::Object(members) => XmlRpcValue::Struct(
                members
                    .iter()
                    .map(|(k, v)| (k.clone(), XmlRpcValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<XmlRpcValue> for Value {
    fn from(value: XmlRpcValue) -> Self {
        match value {
            XmlRpcValue::Nil => Value::Null,
            XmlRpcValue::Bool(b) => Value::Bool(b),
            XmlRpcValue::Int(i) => Value::Number(i.into()),
            // NaN and infinities have no JSON form.
            XmlRpcValue::Double(d) => Number::from_f64(d).map_or(Value::Null, Value::Number),
            XmlRpcValue::String(s) => Value::String(s),
            XmlRpcValue::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            XmlRpcValue::Struct(members) => {
                Value::Object(members.into_iter().map(|(k, v)| (k, Value::from(v))).collect::<Map<_, _>>())
            }
        }
    }
}
