//! # Hashing Utilities
//!
//! Two hash functions, each with a job:
//!
//! - **BLAKE3** for everything the bridge derives for itself: identity keys,
//!   init-code hashes, predicted contract addresses. Domain separation uses
//!   BLAKE3's `derive_key` mode rather than hand-rolled tag prefixes.
//!
//! - **SHA-256** for transport-facing message ids, where the ids may be
//!   compared against systems that only speak SHA-256.
//!
//! All functions are pure. Identity keys and addresses must be
//! reproducible bit-for-bit by any caller, in any order, on any machine.

use sha2::{Digest, Sha256};

/// SHA-256 over several slices fed in sequence.
///
/// # Example
///
/// ```
/// use hubbridge_protocol::crypto::sha256_multi;
///
/// let id = sha256_multi(&[b"hub", b"bridge"]);
/// assert_eq!(id.len(), 32);
/// ```
pub fn sha256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut output = [0u8; 32];
    output.copy_from_slice(&hasher.finalize());
    output
}

/// Domain-separated BLAKE3 over several slices, without concatenating.
///
/// Two different contexts never collide: BLAKE3's `derive_key` mode derives
/// a distinct IV from the context string.
pub fn domain_separated_hash_multi(context: &str, parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Plain BLAKE3 over several slices.
pub fn blake3_hash_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}
