//! Object identifiers
//!
//! A [`Zuid`] is an opaque 128-bit identifier. Ordering is unsigned 128-bit
//! comparison, which is the same as comparing the big-endian bytes.

use std::fmt;
use std::str::FromStr;

use crate::error::ParcelError;

/// Size of an identifier on disk
pub const ZUID_SIZE: usize = 16;

/// A 128-bit object identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Zuid([u8; ZUID_SIZE]);

impl Zuid {
    /// The all-zero identifier
    pub const NIL: Zuid = Zuid([0; ZUID_SIZE]);

    pub const fn from_bytes(bytes: [u8; ZUID_SIZE]) -> Self {
        Zuid(bytes)
    }

    pub const fn from_u128(value: u128) -> Self {
        Zuid(value.to_be_bytes())
    }

    /// Generate a random (version 4 layout) identifier
    pub fn random() -> Self {
        let mut bytes: [u8; ZUID_SIZE] = rand::random();
        bytes[6] = (bytes[6] & 0x0f) | 0x40;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;
        Zuid(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ZUID_SIZE] {
        &self.0
    }

    pub fn as_u128(&self) -> u128 {
        u128::from_be_bytes(self.0)
    }

    pub fn is_nil(&self) -> bool {
        self.0 == [0; ZUID_SIZE]
    }
}

impl From<u128> for Zuid {
    fn from(value: u128) -> Self {
        Zuid::from_u128(value)
    }
}

impl From<[u8; ZUID_SIZE]> for Zuid {
    fn from(bytes: [u8; ZUID_SIZE]) -> Self {
        Zuid(bytes)
    }
}

/// Formats as a dashed UUID string: `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`
impl fmt::Display for Zuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = hex::encode(self.0);
        write!(
            f,
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        )
    }
}

impl fmt::Debug for Zuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Zuid({})", self)
    }
}

/// Parses 32 hex digits, with or without UUID dashes
impl FromStr for Zuid {
    type Err = ParcelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s.chars().filter(|c| *c != '-').collect();
        if digits.len() != ZUID_SIZE * 2 {
            return Err(ParcelError::Encoding(format!(
                "identifier must have {} hex digits, got {}",
                ZUID_SIZE * 2,
                digits.len()
            )));
        }

        let mut bytes = [0u8; ZUID_SIZE];
        hex::decode_to_slice(&digits, &mut bytes)
            .map_err(|e| ParcelError::Encoding(format!("bad identifier {:?}: {}", s, e)))?;
        Ok(Zuid(bytes))
    }
}
