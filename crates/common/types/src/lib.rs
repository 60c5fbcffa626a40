pub mod attestation_history;
pub mod config;
pub mod primitives;

use primitives::ValidatorPubkeyBytes;

/// Display helper for truncated validator public keys (8 hex chars)
pub struct ShortPubkey<'a>(pub &'a ValidatorPubkeyBytes);

impl std::fmt::Display for ShortPubkey<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x")?;
        for byte in &self.0[..4] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_pubkey_shows_first_four_bytes() {
        let mut pubkey = [0u8; 48];
        pubkey[..5].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef, 0xff]);
        assert_eq!(ShortPubkey(&pubkey).to_string(), "0xdeadbeef");
    }
}
