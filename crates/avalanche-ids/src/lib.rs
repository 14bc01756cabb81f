//! Avalanche identifier types.
//!
//! - [`Id`]: 32-byte content-addressed identifier for vertices, transactions and chains
//! - [`NodeId`]: 20-byte identifier for peers and validators
//!
//! Both render as CB58 (Base58 with a 4-byte SHA-256 checksum). Node IDs carry
//! the `NodeID-` prefix.

mod cb58;
mod id;

pub use cb58::{decode_cb58, encode_cb58, Cb58Error};
pub use id::{Id, IdError, NodeId, NODE_ID_PREFIX};

/// Length of an ID in bytes.
pub const ID_LEN: usize = 32;

/// Length of a NodeID in bytes.
pub const NODE_ID_LEN: usize = 20;
