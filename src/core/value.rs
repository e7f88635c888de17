use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A 12-byte document identifier, mirroring the classic Mongo-style ObjectId.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub [u8; 12]);

impl ObjectId {
    pub fn new(bytes: [u8; 12]) -> Self {
        ObjectId(bytes)
    }

    /// Generates an id seeded by a counter plus the process-wide random salt
    /// baked into a uuid. Not a full Mongo ObjectId algorithm (timestamp +
    /// machine id + pid + counter) — good enough for a single-node kernel.
    pub fn generate() -> Self {
        let uuid = uuid::Uuid::new_v4();
        let mut bytes = [0u8; 12];
        bytes.copy_from_slice(&uuid.as_bytes()[0..12]);
        ObjectId(bytes)
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 24 {
            return None;
        }
        let mut bytes = [0u8; 12];
        for i in 0..12 {
            bytes[i] = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(ObjectId(bytes))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl PartialOrd for ObjectId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

/// Dynamically-typed document value. Every public API keyed by an untyped
/// value in the source dispatches on this tag instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Str(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    ObjectId(ObjectId),
    List(Vec<Value>),
    Map(OrderedMap),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::I64(i) => Some(*i as f64),
            Value::F64(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Total order used by sort, range scans and composite-key comparison.
    /// Numeric values widen to f64 for cross-type comparison; strings compare
    /// lexicographically on code units; otherwise values of different tags
    /// are considered equal (the caller is responsible for type-homogeneous
    /// use, matching the source's dynamic-typing contract).
    pub fn compare(&self, other: &Value) -> Ordering {
        use Value::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Str(a), Str(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Bytes(a), Bytes(b)) => a.cmp(b),
            (Timestamp(a), Timestamp(b)) => a.cmp(b),
            (ObjectId(a), ObjectId(b)) => a.cmp(b),
            (List(a), List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let c = x.compare(y);
                    if c != Ordering::Equal {
                        return c;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            },
        }
    }

    /// Equality coerces integer/float through widening per the data model;
    /// other cross-type comparisons are never equal.
    pub fn values_equal(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (Timestamp(a), Timestamp(b)) => a == b,
            (ObjectId(a), ObjectId(b)) => a == b,
            (List(a), List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.values_equal(y))
            }
            (I64(_) | F64(_), I64(_) | F64(_)) => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
            _ => false,
        }
    }

    /// Converts a `serde_json::Value` into the kernel's own dynamic value
    /// type. Query filters and CLI input arrive as JSON; storage and
    /// comparison operate on this type instead.
    pub fn from_json(v: serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::I64(i)
                } else {
                    Value::F64(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(a) => Value::List(a.into_iter().map(Value::from_json).collect()),
            serde_json::Value::Object(o) => {
                let mut map = OrderedMap::new();
                for (k, v) in o {
                    map.insert(k, Value::from_json(v));
                }
                Value::Map(map)
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::I64(i) => serde_json::Value::from(*i),
            Value::F64(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::Array(
                b.iter().map(|byte| serde_json::Value::from(*byte)).collect(),
            ),
            Value::Timestamp(t) => serde_json::Value::String(t.to_rfc3339()),
            Value::ObjectId(o) => serde_json::Value::String(o.to_hex()),
            Value::List(l) => serde_json::Value::Array(l.iter().map(Value::to_json).collect()),
            Value::Map(m) => {
                let mut obj = serde_json::Map::new();
                for (k, v) in m.iter() {
                    obj.insert(k.to_string(), v.to_json());
                }
                serde_json::Value::Object(obj)
            }
        }
    }
}

/// Order-preserving string-keyed map. A standard hash map does not guarantee
/// iteration order, so Documents (and nested Value::Map) use an explicit
/// entries vector plus an auxiliary name index for O(1) lookup. Only the
/// entries vector is carried on the wire; the index is rebuilt on load.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct OrderedMap {
    entries: Vec<(String, Value)>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl<'de> Deserialize<'de> for OrderedMap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let entries = Vec::<(String, Value)>::deserialize(deserializer)?;
        let index = rebuild_index(&entries);
        Ok(OrderedMap { entries, index })
    }
}

impl OrderedMap {
    pub fn new() -> Self {
        OrderedMap { entries: Vec::new(), index: HashMap::new() }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if let Some(&i) = self.index.get(&key) {
            self.entries[i].1 = value;
        } else {
            self.index.insert(key.clone(), self.entries.len());
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let i = self.index.remove(key)?;
        let (_, value) = self.entries.remove(i);
        for idx in self.index.values_mut() {
            if *idx > i {
                *idx -= 1;
            }
        }
        Some(value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Rebuild the name index after deserialization, since it is not carried
/// over the wire.
fn rebuild_index(entries: &[(String, Value)]) -> HashMap<String, usize> {
    entries.iter().enumerate().map(|(i, (k, _))| (k.clone(), i)).collect()
}

/// A document: an ordered mapping from field name to Value with a mandatory
/// `_id` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    fields: OrderedMap,
}

impl Document {
    pub fn new() -> Self {
        Document { fields: OrderedMap::new() }
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field, value);
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter()
    }

    pub fn id(&self) -> Option<&Value> {
        self.fields.get("_id")
    }

    pub fn id_string(&self) -> Option<String> {
        match self.fields.get("_id") {
            Some(Value::Str(s)) => Some(s.clone()),
            Some(Value::ObjectId(oid)) => Some(oid.to_hex()),
            _ => None,
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Document::new()
    }
}

/// Ordered tuple of Values used as a single key for compound indexes.
/// Compared lexicographically, element-wise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeKey(pub Vec<Value>);

impl CompositeKey {
    pub fn new(values: Vec<Value>) -> Self {
        CompositeKey(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True iff the first |p| elements equal p element-wise.
    pub fn matches_prefix(&self, p: &[Value]) -> bool {
        if p.len() > self.0.len() {
            return false;
        }
        self.0.iter().zip(p.iter()).all(|(a, b)| a.values_equal(b))
    }

    pub fn compare(&self, other: &CompositeKey) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            let c = a.compare(b);
            if c != Ordering::Equal {
                return c;
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_map_preserves_insertion_order() {
        let mut doc = Document::new();
        doc.set("_id", Value::Str("1".into()));
        doc.set("zeta", Value::I64(1));
        doc.set("alpha", Value::I64(2));
        let names: Vec<&str> = doc.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["_id", "zeta", "alpha"]);
    }

    #[test]
    fn numeric_equality_coerces_int_float() {
        assert!(Value::I64(3).values_equal(&Value::F64(3.0)));
        assert!(!Value::I64(3).values_equal(&Value::F64(3.1)));
    }

    #[test]
    fn composite_key_prefix_match() {
        let k = CompositeKey::new(vec![Value::Str("NYC".into()), Value::I64(25)]);
        assert!(k.matches_prefix(&[Value::Str("NYC".into())]));
        assert!(!k.matches_prefix(&[Value::Str("LA".into())]));
    }

    #[test]
    fn overwrite_preserves_original_position() {
        let mut doc = Document::new();
        doc.set("a", Value::I64(1));
        doc.set("b", Value::I64(2));
        doc.set("a", Value::I64(99));
        let names: Vec<&str> = doc.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(matches!(doc.get("a"), Some(Value::I64(99))));
    }
}
