//! Immutable parameter bag captured when a collection proxy is constructed.
//!
//! Parameters typically come straight from a request (`page`, `per_page`,
//! caller-defined filter keys). They are never mutated in place: deriving a
//! proxy for another page produces a new merged map via [`Parameters::with`].

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Symbolic-key to value mapping seeding a collection proxy.
///
/// Uses `BTreeMap` so iteration and query-string rendering are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(BTreeMap<String, Value>);

impl Parameters {
    /// Creates an empty parameter bag.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether `key` is present, even with a null value.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Returns a copy of these parameters with `key` set to `value`.
    #[must_use]
    pub fn with(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut merged = self.0.clone();
        merged.insert(key.into(), value.into());
        Self(merged)
    }

    /// Returns a copy of these parameters with every entry of `other` applied on top.
    #[must_use]
    pub fn merge(&self, other: &Parameters) -> Self {
        let mut merged = self.0.clone();
        merged.extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self(merged)
    }

    /// Interprets `key` as a page number.
    ///
    /// Returns `None` when the key is absent. A present key always yields a
    /// page: null means page 1, numeric strings are parsed by their leading
    /// digits, and anything non-numeric or non-positive becomes 0 (which the
    /// pagination layer treats as unpaginated).
    #[must_use]
    pub fn page_number(&self, key: &str) -> Option<u64> {
        self.0.get(key).map(coerce_page)
    }

    /// Interprets `key` as a strictly positive page size.
    #[must_use]
    pub fn positive_u32(&self, key: &str) -> Option<u32> {
        let raw = match self.0.get(key)? {
            Value::Number(n) => n.as_i64()?,
            Value::String(s) => leading_integer(s),
            _ => return None,
        };
        u32::try_from(raw).ok().filter(|n| *n > 0)
    }

    /// Renders the parameters as a URL query string, suitable for building a
    /// link back to the same collection.
    ///
    /// Returns `None` when there are no parameters. Arrays render as
    /// `key[]=a&key[]=b` and objects as `key[sub]=v`.
    #[must_use]
    pub fn to_query_string(&self) -> Option<String> {
        if self.0.is_empty() {
            return None;
        }
        let mut pairs = Vec::with_capacity(self.0.len());
        for (key, value) in &self.0 {
            push_pairs(&mut pairs, key, value);
        }
        Some(pairs.join("&"))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<BTreeMap<String, Value>> for Parameters {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

fn coerce_page(value: &Value) -> u64 {
    // Float pages are truncated toward zero.
    #[allow(clippy::cast_possible_truncation)]
    let raw = match value {
        Value::Null | Value::Bool(false) => 1,
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => leading_integer(s),
        _ => 0,
    };
    u64::try_from(raw).unwrap_or(0)
}

/// Parses the optionally-signed run of digits at the start of `s`; 0 if none.
fn leading_integer(s: &str) -> i64 {
    let s = s.trim_start();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().map_or(0, |n| sign * n)
}

fn push_pairs(pairs: &mut Vec<String>, key: &str, value: &Value) {
    match value {
        Value::Array(items) => {
            let key = format!("{key}[]");
            for item in items {
                push_pairs(pairs, &key, item);
            }
        }
        Value::Object(map) => {
            for (sub, item) in map {
                push_pairs(pairs, &format!("{key}[{sub}]"), item);
            }
        }
        Value::Null => pairs.push(format!("{}=", encode_component(key))),
        Value::Bool(b) => pairs.push(format!("{}={b}", encode_component(key))),
        Value::Number(n) => pairs.push(format!("{}={n}", encode_component(key))),
        Value::String(s) => pairs.push(format!(
            "{}={}",
            encode_component(key),
            encode_component(s)
        )),
    }
}

/// Form-encodes a query component: unreserved bytes pass, space becomes `+`.
fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(char::from(byte));
            }
            b' ' => out.push('+'),
            other => {
                let _ = write!(out, "%{other:02X}");
            }
        }
    }
    out
}
