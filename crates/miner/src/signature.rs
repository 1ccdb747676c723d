//! Combo signature hashing.
//!
//! A combination's identity is the SHA-256 digest of its canonically sorted
//! signature string, so the same member set always maps to the same row no
//! matter the enumeration order that produced it.

use sha2::{Digest, Sha256};

/// Joins canonically sorted signal names with `+`.
#[must_use]
pub fn join_names(sorted_names: &[String]) -> String {
    sorted_names.join("+")
}

/// Digest for a same-timeframe combo: sorted names plus the timeframe.
#[must_use]
pub fn tf_combo_hash(sorted_names: &[String], timeframe: &str) -> String {
    digest(&format!("{}|{timeframe}", join_names(sorted_names)))
}

/// Digest for a cross-timeframe combo: sorted `name@timeframe` tokens.
#[must_use]
pub fn cross_combo_hash(sorted_tokens: &[String]) -> String {
    digest(&sorted_tokens.join("+"))
}

fn digest(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}
