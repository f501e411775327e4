use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{BuildHasher, Hash};

use serde::{Deserialize, Serialize};

/// Generic runtime value type for entity fields.
///
/// Supports all JSON-compatible types plus binary data. Used as the field
/// type of [`Fields`] rows held by local collections and carried in mutation
/// `changes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// JSON null. Also marks a field removed by an update.
    Null,
    /// JSON boolean.
    Bool(bool),
    /// JSON integer (signed 64-bit).
    Int(i64),
    /// JSON floating-point (64-bit IEEE 754).
    Float(f64),
    /// JSON string (UTF-8).
    String(String),
    /// Binary data (not directly representable in JSON).
    Bytes(Vec<u8>),
    /// JSON array (ordered sequence of values).
    Array(Vec<Value>),
    /// JSON object. Uses `BTreeMap` for deterministic serialization order.
    Map(BTreeMap<String, Value>),
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// A single entity row: field name to value, in deterministic order.
pub type Fields = BTreeMap<String, Value>;

/// Builds a [`Fields`] row from `(name, value)` pairs.
///
/// ```
/// use pacer_core::{fields, Value};
///
/// let row = fields([("id", Value::Int(1)), ("body", Value::from("hi"))]);
/// assert_eq!(row.get("body"), Some(&Value::from("hi")));
/// ```
pub fn fields<I, N>(pairs: I) -> Fields
where
    I: IntoIterator<Item = (N, Value)>,
    N: Into<String>,
{
    pairs.into_iter().map(|(n, v)| (n.into(), v)).collect()
}

/// Key identifying one entity inside a collection.
///
/// Blanket-implemented for every type with the required bounds, so `u64`,
/// `String`, and tuple keys all work out of the box.
pub trait EntityKey: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T> EntityKey for T where T: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

/// Payload of a mutation that can absorb a later payload for the same entity.
///
/// `merge_from` must be a field-wise union where `incoming` wins on conflicts.
pub trait Changes: Clone + fmt::Debug + Send + Sync + 'static {
    /// Folds `incoming` into `self`, overwriting overlapping fields.
    fn merge_from(&mut self, incoming: &Self);
}

impl<K, V> Changes for BTreeMap<K, V>
where
    K: Ord + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + fmt::Debug + Send + Sync + 'static,
{
    fn merge_from(&mut self, incoming: &Self) {
        for (k, v) in incoming {
            self.insert(k.clone(), v.clone());
        }
    }
}

impl<K, V, S> Changes for HashMap<K, V, S>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + fmt::Debug + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    fn merge_from(&mut self, incoming: &Self) {
        for (k, v) in incoming {
            self.insert(k.clone(), v.clone());
        }
    }
}
