//! Tagged value tree
//!
//! HTSP messages are trees of typed values: maps with named fields, ordered
//! lists, 64-bit integers, UTF-8 strings, and opaque binary buffers. The
//! integer carries a 64-bit bit pattern; signed or unsigned interpretation is
//! left to the caller ([`Map::get_u32`] vs [`Map::get_s64`]).

use bytes::Bytes;
use std::collections::HashMap;

/// A single HTSP value.
///
/// The wire type tag for each variant is fixed by the protocol: map = 1,
/// integer = 2, string = 3, binary = 4, list = 5.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Map(Map),
    S64(i64),
    Str(String),
    Bin(Bytes),
    List(List),
}

impl Value {
    /// Wire type tag for this variant
    pub fn tag(&self) -> u8 {
        match self {
            Value::Map(_) => 1,
            Value::S64(_) => 2,
            Value::Str(_) => 3,
            Value::Bin(_) => 4,
            Value::List(_) => 5,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::S64(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::S64(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::S64(v as i64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::S64(v as i64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Bin(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bin(Bytes::from(v))
    }
}

impl From<Map> for Value {
    fn from(v: Map) -> Self {
        Value::Map(v)
    }
}

impl From<List> for Value {
    fn from(v: List) -> Self {
        Value::List(v)
    }
}

/// A mapping from field name to value.
///
/// Key uniqueness is enforced on insertion with last-write-wins semantics;
/// field order on the wire is not significant. The typed getters are
/// lenient: a missing field or a field of the wrong type reads as zero /
/// empty rather than an error, so message handlers only check the fields
/// they care about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Map {
    fields: HashMap<String, Value>,
}

impl Map {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Insert a field, replacing any previous value under the same name
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Integer field as u32; 0 when missing or not an integer
    pub fn get_u32(&self, name: &str) -> u32 {
        self.get_s64(name) as u32
    }

    /// Integer field as i64; 0 when missing or not an integer
    pub fn get_s64(&self, name: &str) -> i64 {
        match self.fields.get(name) {
            Some(Value::S64(v)) => *v,
            _ => 0,
        }
    }

    /// String field; empty when missing or not a string
    pub fn get_str(&self, name: &str) -> &str {
        match self.fields.get(name) {
            Some(Value::Str(s)) => s.as_str(),
            _ => "",
        }
    }

    /// Binary field, if present and binary
    pub fn get_bin(&self, name: &str) -> Option<&Bytes> {
        match self.fields.get(name) {
            Some(Value::Bin(b)) => Some(b),
            _ => None,
        }
    }

    /// List field, if present and a list
    pub fn get_list(&self, name: &str) -> Option<&List> {
        match self.fields.get(name) {
            Some(Value::List(l)) => Some(l),
            _ => None,
        }
    }

    /// Map field, if present and a map
    pub fn get_map(&self, name: &str) -> Option<&Map> {
        match self.fields.get(name) {
            Some(Value::Map(m)) => Some(m),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }
}

/// An ordered sequence of values. Element names are ignored on the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct List {
    items: Vec<Value>,
}

impl List {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, value: impl Into<Value>) {
        self.items.push(value.into());
    }

    pub fn get(&self, n: usize) -> Option<&Value> {
        self.items.get(n)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.items.iter()
    }

    /// Iterate over the elements that are maps, skipping everything else.
    /// Most list-carrying messages (`streams`, `events`) hold one map per
    /// entry.
    pub fn maps(&self) -> impl Iterator<Item = &Map> {
        self.items.iter().filter_map(|v| match v {
            Value::Map(m) => Some(m),
            _ => None,
        })
    }
}

impl FromIterator<Value> for List {
    fn from_iter<T: IntoIterator<Item = Value>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_last_write_wins() {
        let mut map = Map::new();
        map.set("seq", 1u32);
        map.set("seq", 2u32);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get_u32("seq"), 2);
    }

    #[test]
    fn test_lenient_getters() {
        let mut map = Map::new();
        map.set("name", "live");
        assert_eq!(map.get_str("name"), "live");
        assert_eq!(map.get_str("missing"), "");
        assert_eq!(map.get_u32("name"), 0);
        assert_eq!(map.get_s64("missing"), 0);
        assert!(map.get_bin("name").is_none());
    }

    #[test]
    fn test_u32_view_of_negative() {
        let mut map = Map::new();
        map.set("noaccess", -1i64);
        assert_eq!(map.get_u32("noaccess"), u32::MAX);
        assert_eq!(map.get_s64("noaccess"), -1);
    }

    #[test]
    fn test_list_maps_filters_non_maps() {
        let mut list = List::new();
        list.push(Map::new());
        list.push(7i64);
        list.push(Map::new());
        assert_eq!(list.len(), 3);
        assert_eq!(list.maps().count(), 2);
    }
}
