//! # Identity Keys & Deterministic Addresses
//!
//! A wrapped asset's address is known before the asset exists. Two pure
//! functions make that work:
//!
//! ```text
//! identity_key   = H_id(remote_chain_id ‖ remote_asset ‖ adapter)
//! init_code_hash = H_init(creation_code ‖ remote_chain_id ‖ remote_asset)
//! address        = last20(BLAKE3(0xff ‖ deployer ‖ identity_key ‖ init_code_hash))
//! ```
//!
//! `H_id` and `H_init` are BLAKE3 in derive-key mode with the contexts from
//! [`crate::config`]. The factory creates assets through
//! [`predict_address`] and nothing else, so prediction and creation cannot
//! drift apart.
//!
//! The adapter is part of the key. The same remote asset bridged through
//! two transports yields two unrelated wrapped assets: each transport is
//! its own trust domain and a compromise of one cannot inflate the other.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{
    CREATE2_PREFIX, IDENTITY_KEY_DOMAIN, INIT_CODE_DOMAIN, WRAPPED_ASSET_CREATION_CODE,
};
use crate::crypto::{blake3_hash_multi, domain_separated_hash_multi};
use crate::types::{Address, ChainId};

/// Primary key of the wrapped-asset registry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityKey(pub [u8; 32]);

impl IdentityKey {
    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex with a `0x` prefix.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityKey({})", self.to_hex())
    }
}

/// Derives the identity key for `(remote_chain_id, remote_asset, adapter)`.
pub fn compute_identity_key(
    remote_chain_id: ChainId,
    remote_asset: Address,
    adapter: Address,
) -> IdentityKey {
    IdentityKey(domain_separated_hash_multi(
        IDENTITY_KEY_DOMAIN,
        &[
            &remote_chain_id.to_be_bytes(),
            remote_asset.as_bytes(),
            adapter.as_bytes(),
        ],
    ))
}

/// Hash of the wrapped-asset creation code plus its constructor arguments.
pub fn init_code_hash(remote_chain_id: ChainId, remote_asset: Address) -> [u8; 32] {
    domain_separated_hash_multi(
        INIT_CODE_DOMAIN,
        &[
            WRAPPED_ASSET_CREATION_CODE,
            &remote_chain_id.to_be_bytes(),
            remote_asset.as_bytes(),
        ],
    )
}

/// Address of a contract deployed by `deployer` with `salt` and the given
/// init-code hash.
pub fn predict_address(deployer: Address, salt: &IdentityKey, init_code_hash: &[u8; 32]) -> Address {
    let digest = blake3_hash_multi(&[
        &[CREATE2_PREFIX],
        deployer.as_bytes(),
        salt.as_bytes(),
        init_code_hash,
    ]);
    Address::from_digest(&digest)
}

/// Everything needed to create (or locate) one wrapped asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedAssetPlan {
    /// Registry key.
    pub identity_key: IdentityKey,
    /// Address the asset occupies once created.
    pub address: Address,
}

/// Identity key and predicted address for a wrapped asset created by
/// `factory` for `(remote_chain_id, remote_asset, adapter)`.
pub fn plan_wrapped_asset(
    factory: Address,
    remote_chain_id: ChainId,
    remote_asset: Address,
    adapter: Address,
) -> WrappedAssetPlan {
    let identity_key = compute_identity_key(remote_chain_id, remote_asset, adapter);
    let address = predict_address(
        factory,
        &identity_key,
        &init_code_hash(remote_chain_id, remote_asset),
    );
    WrappedAssetPlan {
        identity_key,
        address,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::new([b; 20])
    }

    #[test]
    fn identity_key_is_deterministic() {
        let a = compute_identity_key(ChainId(1), addr(2), addr(3));
        let b = compute_identity_key(ChainId(1), addr(2), addr(3));
        assert_eq!(a, b);
    }

    #[test]
    fn identity_key_changes_with_each_component() {
        let base = compute_identity_key(ChainId(1), addr(2), addr(3));
        assert_ne!(base, compute_identity_key(ChainId(9), addr(2), addr(3)));
        assert_ne!(base, compute_identity_key(ChainId(1), addr(9), addr(3)));
        assert_ne!(base, compute_identity_key(ChainId(1), addr(2), addr(9)));
    }

    #[test]
    fn swapped_fields_do_not_collide() {
        let a = compute_identity_key(ChainId(1), addr(2), addr(3));
        let b = compute_identity_key(ChainId(1), addr(3), addr(2));
        assert_ne!(a, b);
    }

    #[test]
    fn address_depends_on_deployer() {
        let p1 = plan_wrapped_asset(addr(10), ChainId(1), addr(2), addr(3));
        let p2 = plan_wrapped_asset(addr(11), ChainId(1), addr(2), addr(3));
        assert_eq!(p1.identity_key, p2.identity_key);
        assert_ne!(p1.address, p2.address);
    }

    #[test]
    fn plan_matches_manual_derivation() {
        let plan = plan_wrapped_asset(addr(10), ChainId(7), addr(2), addr(3));
        let key = compute_identity_key(ChainId(7), addr(2), addr(3));
        let manual = predict_address(addr(10), &key, &init_code_hash(ChainId(7), addr(2)));
        assert_eq!(plan.address, manual);
        assert!(!plan.address.is_zero());
    }
}
