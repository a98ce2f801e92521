//! The tagged-union attribute value carried by spans, DSL literals, and
//! violation context maps.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A span attribute value, or a DSL literal once parsed. `Regex` only
/// appears on the DSL-literal side; it is never produced by ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Str(String),
    Number(f64),
    Bool(bool),
    List(Vec<Value>),
    Map(std::collections::BTreeMap<String, Value>),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Number(_) => "number",
            Value::Bool(_) => "bool",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Stringifies a value for the `matches` operator. Non-string kinds
    /// other than numbers/bools never match a regex (§4.D), but the
    /// stringification is still well-defined for diagnostics.
    pub fn as_match_str(&self) -> Option<String> {
        match self {
            Value::Str(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Equality under the primitive-kind rules of §4.D: cross-type
    /// comparisons are always false, NaN never equals anything (including
    /// itself), string equality is byte-exact.
    pub fn eq_primitive(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => {
                if a.is_nan() || b.is_nan() {
                    false
                } else {
                    a == b
                }
            }
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.eq_primitive(y))
            }
            _ => false,
        }
    }

    /// Ordering under §4.D: numbers via IEEE-754 (NaN compares false for
    /// every op), strings byte-lexicographic, everything else unordered.
    pub fn partial_cmp_primitive(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => {
                if a.is_nan() || b.is_nan() {
                    None
                } else {
                    a.partial_cmp(b)
                }
            }
            (Value::Str(a), Value::Str(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.eq_primitive(other)
    }
}

/// Canonical length-prefixed encoding used for HMAC input (§3) and for
/// deterministic serialization of violation `context` maps — BTreeMap
/// already iterates keys in lexicographic order, which is what `canonical`
/// requires.
pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_canonical(value, &mut buf);
    buf
}

fn encode_canonical(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::Str(s) => {
            buf.push(b's');
            buf.extend_from_slice(&(s.len() as u64).to_be_bytes());
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Number(n) => {
            buf.push(b'n');
            buf.extend_from_slice(&n.to_bits().to_be_bytes());
        }
        Value::Bool(b) => {
            buf.push(b'b');
            buf.push(*b as u8);
        }
        Value::List(items) => {
            buf.push(b'l');
            buf.extend_from_slice(&(items.len() as u64).to_be_bytes());
            for item in items {
                encode_canonical(item, buf);
            }
        }
        Value::Map(map) => {
            buf.push(b'm');
            buf.extend_from_slice(&(map.len() as u64).to_be_bytes());
            for (k, v) in map {
                buf.extend_from_slice(&(k.len() as u64).to_be_bytes());
                buf.extend_from_slice(k.as_bytes());
                encode_canonical(v, buf);
            }
        }
    }
}
