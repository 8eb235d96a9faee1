//! Ed25519 Transaction Signer
//!
//! Signing identity of the relay. The address is derived from the public
//! key and is the account the submitter sends from.

use crate::domain::{RelayError, Signature};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

/// Signing identity built from a hex-encoded 32-byte Ed25519 seed.
pub struct TransactionSigner {
    signing_key: SigningKey,
    public_key_hex: String,
    address: String,
}

impl TransactionSigner {
    /// Decode the seed; fails for anything that is not 32 bytes of hex.
    pub fn from_hex(private_key: &str) -> Result<Self, RelayError> {
        let trimmed = private_key.trim();
        let mut bytes = hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
            .map_err(|e| RelayError::InvalidPrivateKey(e.to_string()))?;

        let len = bytes.len();
        let mut seed: [u8; 32] = match bytes.as_slice().try_into() {
            Ok(seed) => seed,
            Err(_) => {
                bytes.zeroize();
                return Err(RelayError::InvalidPrivateKey(format!(
                    "expected 32 bytes, got {}",
                    len
                )));
            }
        };
        bytes.zeroize();

        let signing_key = SigningKey::from_bytes(&seed);
        seed.zeroize();

        let public_key = signing_key.verifying_key().to_bytes();
        Ok(Self {
            signing_key,
            public_key_hex: hex::encode(public_key),
            address: address_from_public_key(&public_key),
        })
    }

    /// Account address of this identity.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Hex public key.
    pub fn public_key_hex(&self) -> &str {
        &self.public_key_hex
    }

    /// Sign a message (deterministic).
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature {
            public_key: self.public_key_hex.clone(),
            sign_data: self.signing_key.sign(message).to_bytes().to_vec(),
        }
    }
}

/// `0x` + last 20 bytes of SHA-256(public key), hex.
pub fn address_from_public_key(public_key: &[u8; 32]) -> String {
    let digest = Sha256::digest(public_key);
    format!("0x{}", hex::encode(&digest[12..]))
}

/// Check a signature against its embedded public key.
pub fn verify_signature(signature: &Signature, message: &[u8]) -> bool {
    let Ok(key_bytes) = hex::decode(&signature.public_key) else {
        return false;
    };
    let Ok(key_bytes) = <[u8; 32]>::try_from(key_bytes.as_slice()) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    let Ok(sig) = ed25519_dalek::Signature::from_slice(&signature.sign_data) else {
        return false;
    };
    verifying_key.verify(message, &sig).is_ok()
}

impl std::fmt::Debug for TransactionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
