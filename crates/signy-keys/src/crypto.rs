//! Ed25519 key material and key identifiers.
//!
//! This is the signing capability the rest of the workspace consumes: it
//! generates keys, derives key ids, signs, and verifies. Nothing outside this
//! module touches `ed25519_dalek` types directly.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::Zeroizing;

use crate::error::{KeyError, KeyResult};

/// Key type identifier
pub const KEY_TYPE: &str = "ed25519";

/// Signature scheme identifier
pub const SIGNATURE_SCHEME: &str = "ed25519";

/// Hash algorithms a verifier may use to recompute key ids
pub const KEYID_HASH_ALGORITHMS: &[&str] = &["sha256", "sha512"];

/// Hex-encoded SHA-256 key identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    /// Parse a key id (64 lower-case hex characters)
    pub fn parse(s: &str) -> Option<Self> {
        let valid = s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        valid.then(|| KeyId(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Public half of the key value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyValue {
    /// Hex-encoded Ed25519 public key
    pub public: String,
}

/// Fields hashed into the key id.
#[derive(Serialize)]
struct KeyIdInput<'a> {
    keytype: &'a str,
    scheme: &'a str,
    keyid_hash_algorithms: &'a [String],
    keyval: &'a PublicKeyValue,
}

/// Public verification key as embedded in a layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    pub keyid: KeyId,
    pub keytype: String,
    pub scheme: String,
    pub keyid_hash_algorithms: Vec<String>,
    pub keyval: PublicKeyValue,
}

impl PublicKey {
    /// Build the public key object for an Ed25519 verifying key
    pub fn from_verifying_key(key: &VerifyingKey) -> KeyResult<Self> {
        let keytype = KEY_TYPE.to_string();
        let scheme = SIGNATURE_SCHEME.to_string();
        let keyid_hash_algorithms: Vec<String> =
            KEYID_HASH_ALGORITHMS.iter().map(|s| s.to_string()).collect();
        let keyval = PublicKeyValue {
            public: hex::encode(key.as_bytes()),
        };

        let keyid = compute_key_id(&keytype, &scheme, &keyid_hash_algorithms, &keyval)?;

        Ok(Self {
            keyid,
            keytype,
            scheme,
            keyid_hash_algorithms,
            keyval,
        })
    }

    pub fn key_id(&self) -> &KeyId {
        &self.keyid
    }

    /// Decode the Ed25519 verifying key
    pub fn verifying_key(&self) -> KeyResult<VerifyingKey> {
        if self.keytype != KEY_TYPE || self.scheme != SIGNATURE_SCHEME {
            return Err(KeyError::InvariantViolation(format!(
                "key {} has unsupported type {}/{}",
                self.keyid, self.keytype, self.scheme
            )));
        }
        decode_verifying_key(&self.keyval.public)
            .map_err(|e| KeyError::InvariantViolation(format!("key {}: {e}", self.keyid)))
    }

    /// Recompute the key id and compare it with the embedded one
    pub fn check_key_id(&self) -> KeyResult<()> {
        let derived = compute_key_id(
            &self.keytype,
            &self.scheme,
            &self.keyid_hash_algorithms,
            &self.keyval,
        )?;
        if derived != self.keyid {
            return Err(KeyError::InvariantViolation(format!(
                "embedded key id {} does not match key material ({})",
                self.keyid, derived
            )));
        }
        Ok(())
    }

    /// Verify a hex-encoded signature over `message`
    pub fn verify(&self, message: &[u8], signature_hex: &str) -> bool {
        let Ok(key) = self.verifying_key() else {
            return false;
        };
        let Ok(bytes) = hex::decode(signature_hex) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(&bytes) else {
            return false;
        };
        key.verify(message, &signature).is_ok()
    }
}

/// Private signing key together with its public key object.
pub struct PrivateKey {
    signing_key: SigningKey,
    public: PublicKey,
}

impl PrivateKey {
    /// Generate a fresh Ed25519 key
    pub fn generate() -> KeyResult<Self> {
        Self::from_signing_key(SigningKey::generate(&mut rand::thread_rng()))
    }

    /// Wrap a signing key
    pub fn from_signing_key(signing_key: SigningKey) -> KeyResult<Self> {
        let public = PublicKey::from_verifying_key(&signing_key.verifying_key())?;
        Ok(Self {
            signing_key,
            public,
        })
    }

    /// Rebuild a signing key from its 32 secret bytes
    pub fn from_secret_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; 32] = bytes.try_into().ok()?;
        let bytes = Zeroizing::new(bytes);
        Self::from_signing_key(SigningKey::from_bytes(&bytes)).ok()
    }

    pub fn key_id(&self) -> &KeyId {
        &self.public.keyid
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Secret key bytes, zeroized on drop
    pub fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }

    /// Sign `message`, returning the hex-encoded signature
    pub fn sign(&self, message: &[u8]) -> String {
        hex::encode(self.signing_key.sign(message).to_bytes())
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("keyid", &self.public.keyid)
            .finish_non_exhaustive()
    }
}

/// Decode a hex-encoded Ed25519 public key.
pub(crate) fn decode_verifying_key(public_hex: &str) -> Result<VerifyingKey, String> {
    let bytes = hex::decode(public_hex).map_err(|e| format!("public key is not valid hex: {e}"))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| "public key must be 32 bytes".to_string())?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| e.to_string())
}

/// SHA-256 over the JCS (RFC 8785) form of the public key fields.
fn compute_key_id(
    keytype: &str,
    scheme: &str,
    keyid_hash_algorithms: &[String],
    keyval: &PublicKeyValue,
) -> KeyResult<KeyId> {
    let input = KeyIdInput {
        keytype,
        scheme,
        keyid_hash_algorithms,
        keyval,
    };
    let jcs_bytes = serde_json_canonicalizer::to_vec(&input)
        .map_err(|e| KeyError::InvariantViolation(format!("cannot canonicalize key: {e}")))?;

    let mut hasher = Sha256::new();
    hasher.update(&jcs_bytes);
    Ok(KeyId(hex::encode(hasher.finalize())))
}
