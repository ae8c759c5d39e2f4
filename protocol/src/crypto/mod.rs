//! # Cryptographic Primitives
//!
//! The bridge signs nothing and encrypts nothing: authenticity of
//! cross-chain messages is the adapter's job. What the core does need is
//! hashing, and it needs it to be boring and reproducible.

pub mod hash;

pub use hash::{blake3_hash_multi, domain_separated_hash_multi, sha256_multi};
