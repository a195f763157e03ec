//! secp256k1 keypairs, recoverable signatures and agent derivation.

use crate::address::{Address, keccak256};
use crate::error::TokenError;
use hmac::{Hmac, Mac};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::PrimeField;
use k256::elliptic_curve::ops::Reduce;
use k256::{FieldBytes, Scalar, U256};
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Length of a recoverable signature on the wire: `r‖s‖v`.
pub const SIGNATURE_LEN: usize = 65;

/// Domain separator mixed into every agent derivation.
pub const AGENT_DERIVATION_DOMAIN: &[u8] = b"osk-agent-v1";

/// Offset added to the recovery id in the trailing signature byte.
const RECOVERY_BYTE_OFFSET: u8 = 27;

/// A secp256k1 keypair used to sign tokens.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    address: Address,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Generate a new random keypair.
    pub fn generate() -> Result<Self, TokenError> {
        let mut rng = rand::rng();
        let mut bytes = [0u8; 32];

        // A uniformly random 32-byte string is out of range with probability ~2^-128.
        for _ in 0..8 {
            rng.fill_bytes(&mut bytes);
            if let Ok(signing_key) = SigningKey::from_slice(&bytes) {
                return Ok(Self::from_signing_key(signing_key));
            }
        }

        Err(TokenError::KeyGenerationFailed(
            "random source did not produce a valid scalar".to_string(),
        ))
    }

    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = Address::from_verifying_key(signing_key.verifying_key());
        Self {
            signing_key,
            address,
        }
    }

    /// Load a keypair from 32 big-endian private key bytes.
    pub fn from_private_key_bytes(bytes: &[u8]) -> Result<Self, TokenError> {
        let signing_key = SigningKey::from_slice(bytes)
            .map_err(|e| TokenError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self::from_signing_key(signing_key))
    }

    /// Load a keypair from a hex-encoded private key string.
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, TokenError> {
        let hex_key = hex_key.trim();
        let hex_key = hex_key.strip_prefix("0x").unwrap_or(hex_key);
        let bytes =
            hex::decode(hex_key).map_err(|e| TokenError::InvalidPrivateKey(e.to_string()))?;
        Self::from_private_key_bytes(&bytes)
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Get the private key as hex string.
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Sign a payload: ECDSA over Keccak-256 of the bytes.
    pub fn sign(&self, payload: &[u8]) -> Result<RecoverableSignature, TokenError> {
        sign_recoverable(&self.signing_key, payload)
    }

    /// Derive the agent keypair at `index`. See [`derive_agent_key`].
    pub fn derive_agent(&self, index: u32) -> Result<Self, TokenError> {
        derive_agent_key(&self.signing_key, index).map(Self::from_signing_key)
    }

    /// Save the private key to a file.
    ///
    /// On unix the file is created with mode 0600 and tightened to 0600 if it
    /// already existed, before any key material is written.
    pub fn save_to_file(&self, path: &Path) -> Result<(), TokenError> {
        let mut file = open_private(path)?;
        file.write_all(self.private_key_hex().as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// Load a keypair from a private key file.
    pub fn load_from_file(path: &Path) -> Result<Self, TokenError> {
        let hex_key = std::fs::read_to_string(path)?;
        Self::from_private_key_hex(hex_key.trim())
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

/// Deterministically derive an agent signing key from a master key.
///
/// ```text
/// t     = HMAC-SHA256(key = master_be32, msg = "osk-agent-v1" ‖ index_be32 ‖ attempt)
/// child = master + (t mod n)  (mod n)
/// ```
///
/// `attempt` starts at 0 and is only bumped in the negligible case where the
/// sum is zero. The tweak is keyed by the master secret, so a child key (or
/// many of them) does not reveal the master scalar.
pub fn derive_agent_key(master: &SigningKey, index: u32) -> Result<SigningKey, TokenError> {
    let master_scalar: Scalar = *master.as_nonzero_scalar().as_ref();
    let master_bytes = master.to_bytes();

    for attempt in 0..=u8::MAX {
        let mut mac = Hmac::<Sha256>::new_from_slice(&master_bytes)
            .map_err(|e| TokenError::KeyGenerationFailed(e.to_string()))?;
        mac.update(AGENT_DERIVATION_DOMAIN);
        mac.update(&index.to_be_bytes());
        mac.update(&[attempt]);
        let tweak_bytes = mac.finalize().into_bytes();

        let tweak = <Scalar as Reduce<U256>>::reduce_bytes(FieldBytes::from_slice(&tweak_bytes));
        let child = master_scalar + tweak;

        if let Ok(key) = SigningKey::from_bytes(&child.to_repr()) {
            return Ok(key);
        }
    }

    Err(TokenError::KeyGenerationFailed(format!(
        "agent derivation exhausted retries for index {index}"
    )))
}

/// Sign a payload with any signing key, producing a 65-byte recoverable signature.
pub fn sign_recoverable(key: &SigningKey, payload: &[u8]) -> Result<RecoverableSignature, TokenError> {
    let digest = keccak256(payload);
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(&digest)
        .map_err(|e| TokenError::SigningFailed(e.to_string()))?;

    let mut bytes = [0u8; SIGNATURE_LEN];
    bytes[..64].copy_from_slice(&signature.to_bytes());
    bytes[64] = recovery_id.to_byte() + RECOVERY_BYTE_OFFSET;
    Ok(RecoverableSignature(bytes))
}

/// A 65-byte `r‖s‖v` signature from which the signer's public key can be recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature([u8; SIGNATURE_LEN]);

impl RecoverableSignature {
    /// Wrap raw bytes. Returns `None` unless exactly 65 bytes are given.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; SIGNATURE_LEN] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    /// Lowercase hex, as carried in tokens.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Whether `s` uses only the lowercase hex alphabet `to_hex` emits.
    ///
    /// Token signatures have exactly one accepted spelling.
    pub fn is_canonical_hex(s: &str) -> bool {
        s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }

    /// Recover the address that signed `payload`.
    ///
    /// Returns `None` for any signature that does not recover to a valid key:
    /// an unknown recovery byte, out-of-range `r`/`s`, or high-S form.
    pub fn recover_address(&self, payload: &[u8]) -> Option<Address> {
        let v = self.0[64];
        let recid = if v >= RECOVERY_BYTE_OFFSET {
            v - RECOVERY_BYTE_OFFSET
        } else {
            v
        };
        if recid > 1 {
            return None;
        }
        let recovery_id = RecoveryId::from_byte(recid)?;
        let signature = Signature::from_slice(&self.0[..64]).ok()?;

        let digest = keccak256(payload);
        let key = VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id).ok()?;
        Some(Address::from_verifying_key(&key))
    }
}
