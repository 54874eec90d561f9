use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Length of a raw object identifier in bytes.
pub const OBJECT_ID_LEN: usize = 20;

/// Length of the canonical hex form of an object identifier.
pub const OBJECT_ID_HEX_LEN: usize = OBJECT_ID_LEN * 2;

/// Content identity of an object in the backing store.
///
/// An `ObjectId` is the 20-byte hash the store uses to name an object.
/// Equality, ordering and hashing are defined over the raw bytes; the
/// canonical text form is 40 lowercase hex characters. Parsing accepts
/// either case, so every text form maps back to exactly one id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId([u8; OBJECT_ID_LEN]);

impl ObjectId {
    /// Create an `ObjectId` from its raw bytes.
    pub const fn from_raw(bytes: [u8; OBJECT_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Create an `ObjectId` from a binary slice that must be exactly 20 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; OBJECT_ID_LEN] =
            bytes.try_into().map_err(|_| TypeError::InvalidLength {
                expected: OBJECT_ID_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Parse from a 40-character hex string (or its raw ASCII bytes).
    pub fn from_hex(s: impl AsRef<[u8]>) -> Result<Self, TypeError> {
        let s = s.as_ref();
        if s.len() != OBJECT_ID_HEX_LEN {
            return Err(TypeError::InvalidLength {
                expected: OBJECT_ID_HEX_LEN,
                actual: s.len(),
            });
        }
        let mut arr = [0u8; OBJECT_ID_LEN];
        hex::decode_to_slice(s, &mut arr).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Ok(Self(arr))
    }

    /// The null object ID (all zeros).
    pub const fn null() -> Self {
        Self([0u8; OBJECT_ID_LEN])
    }

    /// Returns `true` if this is the null object ID.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; OBJECT_ID_LEN]
    }

    /// The raw 20-byte identity.
    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_LEN] {
        &self.0
    }

    /// Canonical lowercase hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(s)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.to_hex()
    }
}

impl From<[u8; OBJECT_ID_LEN]> for ObjectId {
    fn from(bytes: [u8; OBJECT_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<ObjectId> for [u8; OBJECT_ID_LEN] {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLE: &str = "7a1e8b5b31087018f993cfd39e104d33344fe86b";

    #[test]
    fn hex_roundtrip() {
        let id = ObjectId::from_hex(SAMPLE).unwrap();
        assert_eq!(id.to_hex(), SAMPLE);
        assert_eq!(id.as_bytes()[0], 0x7a);
        assert_eq!(id.as_bytes()[19], 0x6b);
    }

    #[test]
    fn uppercase_input_normalizes_to_lowercase() {
        let id = ObjectId::from_hex(SAMPLE.to_uppercase()).unwrap();
        assert_eq!(id.to_hex(), SAMPLE);
        assert_eq!(id, ObjectId::from_hex(SAMPLE).unwrap());
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        let err = ObjectId::from_hex("abcd").unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 40,
                actual: 4
            }
        );
    }

    #[test]
    fn from_hex_rejects_non_hex() {
        let bad = "zz1e8b5b31087018f993cfd39e104d33344fe86b";
        assert!(matches!(
            ObjectId::from_hex(bad),
            Err(TypeError::InvalidHex(_))
        ));
    }

    #[test]
    fn from_slice_requires_twenty_bytes() {
        assert!(ObjectId::from_slice(&[1u8; 20]).is_ok());
        assert!(matches!(
            ObjectId::from_slice(&[1u8; 19]),
            Err(TypeError::InvalidLength { expected: 20, actual: 19 })
        ));
    }

    #[test]
    fn null_is_all_zeros() {
        let null = ObjectId::null();
        assert!(null.is_null());
        assert_eq!(null.to_hex(), "0".repeat(40));
    }

    #[test]
    fn display_and_short_hex() {
        let id: ObjectId = SAMPLE.parse().unwrap();
        assert_eq!(format!("{id}"), SAMPLE);
        assert_eq!(id.short_hex(), "7a1e8b5b");
        assert_eq!(format!("{id:?}"), "ObjectId(7a1e8b5b)");
    }

    #[test]
    fn serde_uses_hex_string() {
        let id: ObjectId = SAMPLE.parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{SAMPLE}\""));
        let parsed: ObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn ordering_follows_bytes() {
        let id1 = ObjectId::from_raw([0; 20]);
        let id2 = ObjectId::from_raw([1; 20]);
        assert!(id1 < id2);
    }

    proptest! {
        #[test]
        fn binary_and_text_forms_roundtrip(bytes in any::<[u8; 20]>()) {
            let id = ObjectId::from_raw(bytes);
            let text = id.to_hex();
            prop_assert_eq!(text.len(), OBJECT_ID_HEX_LEN);
            let reparsed = ObjectId::from_hex(&text).unwrap();
            prop_assert_eq!(reparsed, id);
            prop_assert_eq!(ObjectId::from_slice(reparsed.as_bytes()).unwrap().to_hex(), text);
        }

        #[test]
        fn text_equality_matches_byte_equality(a in any::<[u8; 20]>(), b in any::<[u8; 20]>()) {
            let (ia, ib) = (ObjectId::from_raw(a), ObjectId::from_raw(b));
            prop_assert_eq!(ia == ib, ia.to_hex() == ib.to_hex());
        }
    }
}
