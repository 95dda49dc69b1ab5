//! # SS58 Addresses
//!
//! Substrate's address format: base58 over
//! `prefix || public_key || checksum`, where the checksum is the first two
//! bytes of `BLAKE2b-512("SS58PRE" || prefix || public_key)`.
//!
//! ```text
//! public_key (32 bytes)
//!     -> [42] || public_key                       (33 bytes)
//!     -> || BLAKE2b-512("SS58PRE" || ...)[..2]    (35 bytes)
//!     -> base58                                   5Grw...utQY (48 chars)
//! ```
//!
//! Prefixes below 64 take one byte; 64..16383 take two. Every borg lives on
//! the generic prefix 42, which is why a well-formed borg address is always
//! 48 characters long and starts with `5`.

use thiserror::Error;

use super::hash::blake2b_512_multi;
use crate::config::{PUBLIC_KEY_LENGTH, SS58_ADDRESS_LEAD, SS58_ADDRESS_LENGTH, SS58_GENERIC_PREFIX};

const SS58_PREAMBLE: &[u8] = b"SS58PRE";

/// Checksum length for 32-byte account ids.
const CHECKSUM_LENGTH: usize = 2;

/// Highest prefix representable in the two-byte encoding.
const MAX_PREFIX: u16 = 16_383;

/// Errors raised while encoding or decoding SS58 strings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Ss58Error {
    #[error("invalid base58: {0}")]
    Base58(String),

    #[error("invalid address length: {0} decoded bytes")]
    InvalidLength(usize),

    #[error("unsupported network prefix {0}")]
    InvalidPrefix(u16),

    #[error("network prefix mismatch: expected {expected}, got {got}")]
    PrefixMismatch { expected: u16, got: u16 },

    #[error("checksum mismatch")]
    BadChecksum,
}

/// Encode a 32-byte public key as an SS58 address under `prefix`.
pub fn encode(public_key: &[u8; PUBLIC_KEY_LENGTH], prefix: u16) -> Result<String, Ss58Error> {
    let mut payload = encode_prefix(prefix)?;
    payload.extend_from_slice(public_key);
    let checksum = blake2b_512_multi(&[SS58_PREAMBLE, &payload]);
    payload.extend_from_slice(&checksum[..CHECKSUM_LENGTH]);
    Ok(bs58::encode(payload).into_string())
}

/// Decode an SS58 address, returning its network prefix and public key.
///
/// Validates the base58 alphabet, total length, prefix encoding and checksum.
pub fn decode(address: &str) -> Result<(u16, [u8; PUBLIC_KEY_LENGTH]), Ss58Error> {
    let data = bs58::decode(address)
        .into_vec()
        .map_err(|e| Ss58Error::Base58(e.to_string()))?;

    let (prefix, prefix_len) = match data.first() {
        Some(&b) if b < 64 => (u16::from(b), 1),
        Some(&b) if b < 128 => {
            let second = *data.get(1).ok_or(Ss58Error::InvalidLength(data.len()))?;
            let lower = (b << 2) | (second >> 6);
            let upper = second & 0b0011_1111;
            (u16::from(lower) | (u16::from(upper) << 8), 2)
        }
        Some(&b) => return Err(Ss58Error::InvalidPrefix(u16::from(b))),
        None => return Err(Ss58Error::InvalidLength(0)),
    };

    if data.len() != prefix_len + PUBLIC_KEY_LENGTH + CHECKSUM_LENGTH {
        return Err(Ss58Error::InvalidLength(data.len()));
    }

    let body_len = prefix_len + PUBLIC_KEY_LENGTH;
    let checksum = blake2b_512_multi(&[SS58_PREAMBLE, &data[..body_len]]);
    if checksum[..CHECKSUM_LENGTH] != data[body_len..] {
        return Err(Ss58Error::BadChecksum);
    }

    let mut public_key = [0u8; PUBLIC_KEY_LENGTH];
    public_key.copy_from_slice(&data[prefix_len..body_len]);
    Ok((prefix, public_key))
}

/// Decode and additionally require a specific network prefix.
pub fn decode_with_prefix(
    address: &str,
    expected: u16,
) -> Result<[u8; PUBLIC_KEY_LENGTH], Ss58Error> {
    let (got, public_key) = decode(address)?;
    if got != expected {
        return Err(Ss58Error::PrefixMismatch { expected, got });
    }
    Ok(public_key)
}

/// Cheap shape check for generic-prefix addresses: 48 characters with a
/// leading `5`. Does not verify the checksum.
pub fn looks_like_address(s: &str) -> bool {
    s.len() == SS58_ADDRESS_LENGTH && s.starts_with(SS58_ADDRESS_LEAD)
}

/// Whether `s` should be treated as an address literal on a network with
/// `prefix`. Generic-prefix networks use the shape check; anything else
/// requires a full decode.
pub fn is_address_literal(s: &str, prefix: u16) -> bool {
    if prefix == SS58_GENERIC_PREFIX {
        looks_like_address(s)
    } else {
        decode_with_prefix(s, prefix).is_ok()
    }
}

fn encode_prefix(prefix: u16) -> Result<Vec<u8>, Ss58Error> {
    match prefix {
        0..=63 => Ok(vec![prefix as u8]),
        64..=MAX_PREFIX => {
            let first = (((prefix & 0b0000_0000_1111_1100) >> 2) as u8) | 0b0100_0000;
            let second = ((prefix >> 8) as u8) | (((prefix & 0b0000_0000_0000_0011) as u8) << 6);
            Ok(vec![first, second])
        }
        _ => Err(Ss58Error::InvalidPrefix(prefix)),
    }
}
