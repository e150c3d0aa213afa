//! Content-derived dedup keys for ledger rows.
//!
//! A fingerprint is the SHA3-224 digest of `"<_id>_<date>"`, hex encoded and
//! truncated to [`FINGERPRINT_HEX_LEN`] characters. Eighty bits keeps the
//! ledger compact; collisions stay out of reach for a dataset of a few million
//! rows, and the length must not shrink without rewriting existing ledgers.

use sha3::{Digest, Sha3_224};

use crate::domain::Fingerprint;

pub const FINGERPRINT_HEX_LEN: usize = 20;

pub fn fingerprint(id: &str, date: &str) -> Fingerprint {
    Fingerprint::new_unchecked(digest_hex(&format!("{id}_{date}")))
}

pub fn digest_hex(key: &str) -> String {
    let mut hasher = Sha3_224::new();
    hasher.update(key.as_bytes());
    let mut encoded = hex::encode(hasher.finalize());
    encoded.truncate(FINGERPRINT_HEX_LEN);
    encoded
}
