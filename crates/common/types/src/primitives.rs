// Re-export SSZ traits to avoid users having to depend on these directly
pub use ssz::{Decode, Encode};

pub use ethereum_types::H256;

/// Epoch number, as used for attestation source and target.
pub type Epoch = u64;

/// Length in bytes of a compressed BLS validator public key.
pub const PUBKEY_LENGTH: usize = 48;

/// Raw validator public key, used as the key of every per-validator table.
pub type ValidatorPubkeyBytes = [u8; PUBKEY_LENGTH];
