use std::fmt;
use std::path::Path;
use rand::rngs::OsRng;
use ed25519_dalek::{Keypair, PublicKey as DalekPublicKey, SecretKey, Signature as DalekSignature, Signer as DalekSigner, Verifier as DalekVerifier};

use crate::core::{Result, VaultError};
use super::signing::{Signature, Verifier};

/// Ed25519 public key, rendered as a `0x`-prefixed hex account address
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(DalekPublicKey);

impl PublicKey {
    /// Create a new public key from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key = DalekPublicKey::from_bytes(bytes)
            .map_err(|e| VaultError::InvalidArgument(format!("Invalid public key: {}", e)))?;
        Ok(Self(key))
    }

    /// Parse an account address produced by [`PublicKey::to_address`]
    pub fn from_address(address: &str) -> Result<Self> {
        let raw = address.strip_prefix("0x").unwrap_or(address);
        let bytes = hex::decode(raw)
            .map_err(|e| VaultError::InvalidArgument(format!("Invalid address {}: {}", address, e)))?;
        Self::from_bytes(&bytes)
    }

    /// Get the raw bytes of the public key
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn to_address(&self) -> String {
        format!("0x{}", hex::encode(self.0.as_bytes()))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_address())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_address())
    }
}

impl Verifier for PublicKey {
    fn verify(&self, data: &[u8], signature: &Signature) -> Result<bool> {
        let sig = DalekSignature::try_from(signature.as_bytes())
            .map_err(|e| VaultError::InvalidArgument(format!("Invalid signature format: {}", e)))?;

        Ok(self.0.verify(data, &sig).is_ok())
    }
}

/// Ed25519 keypair backing one keystore account
pub struct KeyPair {
    keypair: Keypair,
}

impl KeyPair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        let keypair = Keypair::generate(&mut csprng);
        Self { keypair }
    }

    /// Create a keypair from a 32-byte seed
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        if seed.len() != 32 {
            return Err(VaultError::InvalidArgument("Seed must be 32 bytes".to_string()));
        }

        let secret = SecretKey::from_bytes(seed)
            .map_err(|e| VaultError::InvalidArgument(format!("Invalid seed: {}", e)))?;
        let public = DalekPublicKey::from(&secret);

        Ok(Self { keypair: Keypair { secret, public } })
    }

    /// Read a hex-encoded seed from a key file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| VaultError::Io(format!("Failed to read key file {}: {}", path.display(), e)))?;
        let seed = hex::decode(content.trim())
            .map_err(|e| VaultError::InvalidArgument(format!("Invalid key file {}: {}", path.display(), e)))?;
        Self::from_seed(&seed)
    }

    /// Write the seed as hex so that [`KeyPair::from_file`] can restore it
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, hex::encode(self.keypair.secret.as_bytes()))
            .map_err(|e| VaultError::Io(format!("Failed to write key file {}: {}", path.display(), e)))?;
        Ok(())
    }

    /// Get the public key from this keypair
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.keypair.public)
    }

    pub fn address(&self) -> String {
        self.public_key().to_address()
    }

    pub fn sign(&self, data: &[u8]) -> Signature {
        let signature = self.keypair.sign(data);
        Signature::from_bytes(signature.to_bytes().to_vec())
    }
}

impl Verifier for KeyPair {
    fn verify(&self, data: &[u8], signature: &Signature) -> Result<bool> {
        self.public_key().verify(data, signature)
    }
}
