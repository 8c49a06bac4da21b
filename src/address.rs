//! Ledger address, seed and tag formats
//!
//! Addresses are 81 trytes. Users post them with a 9 tryte checksum appended
//! (90 trytes total); the checksum is the tail of the Kerl hash of the address.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::kerl;

pub const TRYTE_ALPHABET: &str = "9ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const ADDRESS_LENGTH: usize = 81;
pub const CHECKSUM_LENGTH: usize = 9;
pub const ADDRESS_WITH_CHECKSUM_LENGTH: usize = ADDRESS_LENGTH + CHECKSUM_LENGTH;
pub const SEED_LENGTH: usize = 81;
pub const TAG_LENGTH: usize = 27;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address must be 81 trytes")]
    InvalidAddress,
    #[error("checksum must be 9 trytes")]
    InvalidChecksumFormat,
    #[error("checksum doesn't match address")]
    ChecksumMismatch,
}

pub fn is_trytes(s: &str) -> bool {
    s.bytes().all(|b| b == b'9' || b.is_ascii_uppercase())
}

/// Format check only: 90 trytes. Use [`verify_address_with_checksum`] for the checksum itself.
pub fn is_address_with_checksum(s: &str) -> bool {
    s.len() == ADDRESS_WITH_CHECKSUM_LENGTH && is_trytes(s)
}

/// Splits a 90 tryte address into its 81 tryte address and 9 tryte checksum.
pub fn split_checksum(s: &str) -> Option<(&str, &str)> {
    if !is_address_with_checksum(s) {
        return None;
    }
    Some(s.split_at(ADDRESS_LENGTH))
}

/// Computes the 9 tryte checksum of an 81 tryte address.
pub fn checksum(address: &str) -> Result<String, AddressError> {
    if address.len() != ADDRESS_LENGTH {
        return Err(AddressError::InvalidAddress);
    }
    let trits = kerl::trytes_to_trits(address).ok_or(AddressError::InvalidAddress)?;

    let mut chunk = [0i8; kerl::HASH_TRITS];
    chunk.copy_from_slice(&trits);
    let hash = kerl::trits_to_trytes(&kerl::hash(&chunk));

    Ok(hash[ADDRESS_LENGTH - CHECKSUM_LENGTH..].to_string())
}

pub fn with_checksum(address: &str) -> Result<String, AddressError> {
    Ok(format!("{}{}", address, checksum(address)?))
}

pub fn validate_checksum(address: &str, checksum_trytes: &str) -> Result<(), AddressError> {
    if checksum_trytes.len() != CHECKSUM_LENGTH || !is_trytes(checksum_trytes) {
        return Err(AddressError::InvalidChecksumFormat);
    }
    if checksum(address)? != checksum_trytes {
        return Err(AddressError::ChecksumMismatch);
    }
    Ok(())
}

pub fn verify_address_with_checksum(s: &str) -> Result<(), AddressError> {
    let (address, checksum_trytes) = split_checksum(s).ok_or(AddressError::InvalidAddress)?;
    validate_checksum(address, checksum_trytes)
}

/// Right-pads a tag with `9` to the full tag length, truncating longer tags.
pub fn pad_tag(tag: &str) -> String {
    let mut padded: String = tag.chars().take(TAG_LENGTH).collect();
    while padded.len() < TAG_LENGTH {
        padded.push('9');
    }
    padded
}

/// Secret seed of a bounty's ledger account.
///
/// `Debug` never prints the value and there is no `Display`; use
/// [`Seed::expose`] at the ledger boundary only.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Seed(String);

impl Seed {
    pub fn generate() -> Self {
        let alphabet = TRYTE_ALPHABET.as_bytes();
        let mut rng = rand::thread_rng();
        let seed = (0..SEED_LENGTH)
            .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
            .collect();
        Seed(seed)
    }

    pub fn from_trytes(trytes: impl Into<String>) -> Option<Self> {
        let trytes = trytes.into();
        (trytes.len() == SEED_LENGTH && is_trytes(&trytes)).then_some(Seed(trytes))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Seed(***)")
    }
}
