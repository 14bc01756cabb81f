//! Fixed-length identifier types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::cb58::{decode_cb58, encode_cb58, Cb58Error};
use crate::{ID_LEN, NODE_ID_LEN};

/// The prefix for NodeID string representations.
pub const NODE_ID_PREFIX: &str = "NodeID-";

/// Errors that can occur when parsing an identifier.
#[derive(Debug, Error)]
pub enum IdError {
    #[error("cb58 decoding failed: {0}")]
    Cb58(#[from] Cb58Error),

    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("missing NodeID- prefix")]
    MissingPrefix,
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $len:expr, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
        pub struct $name([u8; $len]);

        impl $name {
            /// The all-zero identifier.
            pub const EMPTY: Self = Self([0u8; $len]);

            /// Creates an identifier from a fixed-size array.
            #[must_use]
            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Creates an identifier from a slice.
            ///
            /// # Errors
            ///
            /// Returns [`IdError::InvalidLength`] if the slice has the wrong length.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, IdError> {
                let arr: [u8; $len] = bytes.try_into().map_err(|_| IdError::InvalidLength {
                    expected: $len,
                    actual: bytes.len(),
                })?;
                Ok(Self(arr))
            }

            /// Returns the raw bytes.
            #[must_use]
            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Returns true for the all-zero identifier.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0 == [0u8; $len]
            }

            /// Returns the hex encoding of the raw bytes.
            #[must_use]
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, encode_cb58(&self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let encoded = s.strip_prefix($prefix).ok_or(IdError::MissingPrefix)?;
                Self::from_slice(&decode_cb58(encoded)?)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.collect_str(self)
                } else {
                    serializer.serialize_bytes(&self.0)
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                if deserializer.is_human_readable() {
                    let s = String::deserialize(deserializer)?;
                    s.parse().map_err(serde::de::Error::custom)
                } else {
                    let bytes = <Vec<u8>>::deserialize(deserializer)?;
                    Self::from_slice(&bytes).map_err(serde::de::Error::custom)
                }
            }
        }
    };
}

define_id!(
    /// A 32-byte identifier for vertices, transactions, blocks and chains.
    ///
    /// IDs are content addressed: [`Id::from_hash`] derives one from the
    /// SHA-256 of the serialized entity.
    ///
    /// ```
    /// use avalanche_ids::Id;
    ///
    /// let id = Id::from_hash(b"vertex");
    /// let parsed: Id = id.to_string().parse().unwrap();
    /// assert_eq!(id, parsed);
    /// ```
    Id,
    ID_LEN,
    ""
);

define_id!(
    /// A 20-byte identifier for a peer or validator.
    ///
    /// ```
    /// use avalanche_ids::NodeId;
    ///
    /// let id = NodeId::from_bytes([0u8; 20]);
    /// assert!(id.to_string().starts_with("NodeID-"));
    /// ```
    NodeId,
    NODE_ID_LEN,
    NODE_ID_PREFIX
);

impl Id {
    /// Derives an ID from the SHA-256 hash of `bytes`.
    #[must_use]
    pub fn from_hash(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    /// Derives a new ID by hashing `prefixes` in front of this one.
    #[must_use]
    pub fn prefix(&self, prefixes: &[u64]) -> Self {
        let mut buf = Vec::with_capacity(prefixes.len() * 8 + ID_LEN);
        for p in prefixes {
            buf.extend_from_slice(&p.to_be_bytes());
        }
        buf.extend_from_slice(&self.0);
        Self::from_hash(&buf)
    }
}
