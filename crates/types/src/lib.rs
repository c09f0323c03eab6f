use std::cmp::Ordering;
use std::fmt;

use xxhash_rust::xxh3::xxh3_64;

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Int(i64),
    Text(String),
    Bool(bool),
    Null,
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn cmp_same_type(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Stable ordinal of the variant; orders values of different types.
    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Text(_) => 3,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "'{s}'"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => f.write_str("NULL"),
        }
    }
}

/// Key stored in a hash index.
///
/// Keys are totally ordered (type rank first, then value) and hash to a
/// bucket number that is stable across processes, so it can address
/// persisted directory slots.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SearchKey(pub Value);

impl SearchKey {
    pub fn new(value: impl Into<Value>) -> Self {
        Self(value.into())
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Hash this key into `[0, 2^depth)`.
    ///
    /// # Panics
    ///
    /// Panics if `depth` is not in `1..=32`.
    pub fn hash(&self, depth: u32) -> u32 {
        assert!((1..=32).contains(&depth), "hash depth must be in 1..=32");
        let mask = if depth == 32 {
            u32::MAX as u64
        } else {
            (1u64 << depth) - 1
        };
        (xxh3_64(&self.canonical_bytes()) & mask) as u32
    }

    /// Type-tagged byte encoding fed to the hash function.
    fn canonical_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![self.0.type_rank()];
        match &self.0 {
            Value::Int(i) => bytes.extend_from_slice(&i.to_le_bytes()),
            Value::Text(s) => bytes.extend_from_slice(s.as_bytes()),
            Value::Bool(b) => bytes.push(u8::from(*b)),
            Value::Null => {}
        }
        bytes
    }
}

impl PartialOrd for SearchKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SearchKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .cmp_same_type(&other.0)
            .unwrap_or_else(|| self.0.type_rank().cmp(&other.0.type_rank()))
    }
}

impl fmt::Display for SearchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cmp::Ordering::{Greater, Less};

    #[test]
    fn cmp_same_type_works() {
        assert_eq!(Value::Int(1).cmp_same_type(&Value::Int(2)), Some(Less));
        assert_eq!(Value::Int(1).cmp_same_type(&Value::Text("1".into())), None);
    }

    #[test]
    fn keys_of_different_types_order_by_rank() {
        assert_eq!(SearchKey::new(5).cmp(&SearchKey::new("a")), Less);
        assert_eq!(SearchKey(Value::Null).cmp(&SearchKey::new(false)), Less);
        assert_eq!(SearchKey::new("b").cmp(&SearchKey::new("a")), Greater);
    }

    #[test]
    fn int_and_text_with_same_digits_hash_differently() {
        let a = SearchKey::new(1).hash(32);
        let b = SearchKey::new("1").hash(32);
        assert_ne!(a, b);
    }

    #[test]
    fn hash_is_stable_across_calls() {
        let key = SearchKey::new("customer-17");
        assert_eq!(key.hash(7), key.clone().hash(7));
    }

    #[test]
    #[should_panic(expected = "hash depth")]
    fn zero_depth_panics() {
        SearchKey::new(1).hash(0);
    }

    #[test]
    fn keys_spread_over_all_buckets() {
        let mut seen = [false; 128];
        for i in 0..4096 {
            seen[SearchKey::new(i).hash(7) as usize] = true;
        }
        assert!(seen.iter().all(|&b| b));
    }

    proptest! {
        #[test]
        fn hash_stays_in_range(v in any::<i64>(), depth in 1u32..=16) {
            let h = SearchKey::new(v).hash(depth);
            prop_assert!(h < (1u32 << depth));
        }

        #[test]
        fn shallower_hash_is_a_prefix_of_deeper(s in "[a-z]{0,12}") {
            let key = SearchKey::new(s);
            prop_assert_eq!(key.hash(7), key.hash(10) & 0x7f);
        }
    }
}
