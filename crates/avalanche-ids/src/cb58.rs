//! CB58 encoding: Base58 with a trailing 4-byte SHA-256 checksum.

use sha2::{Digest, Sha256};
use thiserror::Error;

const CHECKSUM_LEN: usize = 4;

/// Errors that can occur while decoding CB58.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Cb58Error {
    #[error("base58 decoding error: {0}")]
    Base58Decoding(String),

    #[error("input string is smaller than the checksum size")]
    MissingChecksum,

    #[error("invalid checksum")]
    BadChecksum,
}

fn checksum(bytes: &[u8]) -> [u8; CHECKSUM_LEN] {
    let hash = Sha256::digest(bytes);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&hash[hash.len() - CHECKSUM_LEN..]);
    out
}

/// Encodes bytes as a CB58 string.
#[must_use]
pub fn encode_cb58(bytes: &[u8]) -> String {
    let mut checked = Vec::with_capacity(bytes.len() + CHECKSUM_LEN);
    checked.extend_from_slice(bytes);
    checked.extend_from_slice(&checksum(bytes));
    bs58::encode(checked).into_string()
}

/// Decodes a CB58 string, verifying its checksum.
///
/// # Errors
///
/// Fails on invalid Base58, on input shorter than the checksum, and on a
/// checksum mismatch.
pub fn decode_cb58(s: &str) -> Result<Vec<u8>, Cb58Error> {
    let decoded = bs58::decode(s)
        .into_vec()
        .map_err(|e| Cb58Error::Base58Decoding(e.to_string()))?;

    if decoded.len() < CHECKSUM_LEN {
        return Err(Cb58Error::MissingChecksum);
    }

    let (raw, provided) = decoded.split_at(decoded.len() - CHECKSUM_LEN);
    if provided != checksum(raw) {
        return Err(Cb58Error::BadChecksum);
    }
    Ok(raw.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rejects_bad_checksum() {
        let encoded = encode_cb58(&[1, 2, 3, 4]);
        let mut raw = bs58::decode(&encoded).into_vec().unwrap();
        if let Some(last) = raw.last_mut() {
            *last ^= 0xff;
        }
        let corrupted = bs58::encode(raw).into_string();
        assert_eq!(decode_cb58(&corrupted), Err(Cb58Error::BadChecksum));
    }

    #[test]
    fn test_decode_too_short() {
        assert_eq!(decode_cb58("1"), Err(Cb58Error::MissingChecksum));
    }

    #[test]
    fn test_decode_invalid_alphabet() {
        assert!(matches!(decode_cb58("0OIl"), Err(Cb58Error::Base58Decoding(_))));
    }

    #[test]
    fn test_empty_payload() {
        let encoded = encode_cb58(&[]);
        assert!(decode_cb58(&encoded).unwrap().is_empty());
    }
}
