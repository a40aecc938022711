use std::fmt;
use async_trait::async_trait;

use crate::core::{Result, VaultError};

/// Raw signature bytes produced by a wallet
#[derive(Clone, PartialEq, Eq)]
pub struct Signature(Vec<u8>);

impl Signature {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Parse the `0x`-prefixed hex form wallets hand back
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let raw = encoded.strip_prefix("0x").unwrap_or(encoded);
        hex::decode(raw)
            .map(Self)
            .map_err(|e| VaultError::InvalidArgument(format!("Invalid signature encoding: {}", e)))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Provider-agnostic signing capability bound to one account
#[async_trait]
pub trait MessageSigner: Send + Sync {
    /// Address of the account the signatures are made for
    fn address(&self) -> &str;

    /// Sign a UTF-8 message on behalf of the account
    async fn sign_message(&self, message: &str) -> Result<Signature>;
}

/// Generic trait for verifying signatures
pub trait Verifier {
    /// Verify the signature on the given data
    fn verify(&self, data: &[u8], signature: &Signature) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_form_is_prefixed() {
        let sig = Signature::from_bytes(vec![0xde, 0xad]);
        assert_eq!(sig.to_string(), "0xdead");
        assert_eq!(Signature::from_hex("0xdead").unwrap(), sig);
        assert_eq!(Signature::from_hex("dead").unwrap(), sig);
    }
}
