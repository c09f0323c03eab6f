use bincode::config::{self, Config};
use bincode::serde::{decode_from_slice, encode_to_vec};
use common::{DbError, DbResult, RecordId};
use serde::{Deserialize, Serialize};
use storage::MAX_RECORD_SIZE;
use types::SearchKey;

fn bincode_config() -> impl Config {
    config::legacy()
}

/// A (key, record id) pair stored in a bucket page.
///
/// Two entries are the same entry only if both key and record id match;
/// duplicate keys with different record ids are distinct entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataEntry {
    pub key: SearchKey,
    pub rid: RecordId,
}

impl DataEntry {
    pub fn new(key: SearchKey, rid: RecordId) -> Self {
        Self { key, rid }
    }

    /// Encode for storage on a page.
    pub fn encode(&self) -> DbResult<Vec<u8>> {
        encode_to_vec(self, bincode_config())
            .map_err(|e| DbError::Storage(format!("encode entry failed: {e}")))
    }

    /// Encode, rejecting entries no page could ever hold.
    pub fn encode_checked(&self) -> DbResult<Vec<u8>> {
        let bytes = self.encode()?;
        if bytes.len() > MAX_RECORD_SIZE {
            return Err(DbError::EntryTooLarge {
                size: bytes.len(),
                max: MAX_RECORD_SIZE,
            });
        }
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> DbResult<Self> {
        let (entry, read) = decode_from_slice(bytes, bincode_config())
            .map_err(|e| DbError::Storage(format!("decode entry failed: {e}")))?;
        if read != bytes.len() {
            return Err(DbError::Storage(format!(
                "entry record has {} trailing bytes",
                bytes.len() - read
            )));
        }
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::PageId;
    use types::Value;

    fn rid(slot: u16) -> RecordId {
        RecordId::new(PageId(1), slot)
    }

    #[test]
    fn decode_inverts_encode() {
        let entry = DataEntry::new(SearchKey::new("bob"), rid(3));
        let bytes = entry.encode().unwrap();
        assert_eq!(DataEntry::decode(&bytes).unwrap(), entry);
    }

    #[test]
    fn encoding_is_deterministic() {
        let a = DataEntry::new(SearchKey::new(7), rid(1));
        assert_eq!(a.encode().unwrap(), a.clone().encode().unwrap());
    }

    #[test]
    fn same_key_different_rid_encode_differently() {
        let a = DataEntry::new(SearchKey::new(7), rid(1)).encode().unwrap();
        let b = DataEntry::new(SearchKey::new(7), rid(2)).encode().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn oversized_key_is_rejected() {
        let key = SearchKey(Value::Text("x".repeat(MAX_RECORD_SIZE)));
        let err = DataEntry::new(key, rid(0)).encode_checked().unwrap_err();
        assert!(matches!(err, DbError::EntryTooLarge { max, .. } if max == MAX_RECORD_SIZE));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = DataEntry::new(SearchKey::new(true), rid(0)).encode().unwrap();
        bytes.push(0);
        assert!(matches!(DataEntry::decode(&bytes), Err(DbError::Storage(_))));
    }
}
