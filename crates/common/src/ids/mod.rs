//! Short document identifiers
//!
//! An id is the first [`ID_LENGTH`] hex characters of the SHA-256 of a
//! random number. Candidates are redrawn until one is free. Retired ids are
//! not remembered and can be issued again.

use rand::Rng;
use sha2::{Digest, Sha256};

use crate::errors::{AppError, Result};

/// Hex characters kept from the digest
pub const ID_LENGTH: usize = 5;

/// Attempts before giving up on finding a free id
pub const MAX_ATTEMPTS: usize = 100_000;

/// Draw ids until `is_taken` rejects none of them
pub fn generate_id<F>(is_taken: F) -> Result<String>
where
    F: Fn(&str) -> bool,
{
    let mut rng = rand::thread_rng();

    for attempt in 1..=MAX_ATTEMPTS {
        let seed: u64 = rng.gen();
        let candidate = digest_prefix(&seed.to_string());
        if !is_taken(&candidate) {
            if attempt > 1 {
                tracing::debug!(attempt, id = %candidate, "Id found after collisions");
            }
            return Ok(candidate);
        }
    }

    tracing::error!(attempts = MAX_ATTEMPTS, "Identifier space exhausted");
    Err(AppError::IdSpaceExhausted {
        attempts: MAX_ATTEMPTS,
    })
}

/// Hex SHA-256 of arbitrary bytes
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn digest_prefix(seed: &str) -> String {
    let mut hex = sha256_hex(seed.as_bytes());
    hex.truncate(ID_LENGTH);
    hex
}
