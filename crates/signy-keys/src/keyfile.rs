//! On-disk key file formats and permission-aware file access.
//!
//! A private key file holds the public key value in the clear and the secret
//! key either hex-encoded (`"encoding": "plain"`) or sealed with
//! ChaCha20-Poly1305 under an Argon2id-derived key
//! (`"encoding": "argon2id-chacha20poly1305"`). The public key value is bound
//! to the ciphertext as associated data.
//!
//! Private key files are created with mode 0600 and the keystore directory
//! with mode 0700 on Unix.

use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use zeroize::Zeroizing;

use crate::crypto::{
    decode_verifying_key, PrivateKey, PublicKey, PublicKeyValue, KEY_TYPE, SIGNATURE_SCHEME,
};
use crate::error::{KeyError, KeyResult};
use crate::passphrase::Passphrase;

/// Mode for private key files (owner read/write only)
#[cfg(unix)]
pub const PRIVATE_FILE_MODE: u32 = 0o600;

/// Mode for public key files
#[cfg(unix)]
pub const PUBLIC_FILE_MODE: u32 = 0o644;

/// Mode for the keystore directory (owner only)
#[cfg(unix)]
pub const KEYSTORE_DIR_MODE: u32 = 0o700;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// Largest Argon2 memory cost accepted from a key file, in KiB (1 GiB)
pub const MAX_M_COST: u32 = 1 << 20;

/// Largest Argon2 iteration count accepted from a key file
pub const MAX_T_COST: u32 = 64;

/// Largest Argon2 lane count accepted from a key file
pub const MAX_P_COST: u32 = 16;

/// Argon2id cost parameters, recorded in every encrypted key file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub m_cost: u32,
    /// Iterations
    pub t_cost: u32,
    /// Lanes
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: Params::DEFAULT_M_COST,
            t_cost: Params::DEFAULT_T_COST,
            p_cost: Params::DEFAULT_P_COST,
        }
    }
}

impl KdfParams {
    /// Cheapest parameters argon2 accepts; for tests only.
    pub fn insecure_fast() -> Self {
        Self {
            m_cost: Params::MIN_M_COST,
            t_cost: Params::MIN_T_COST,
            p_cost: Params::MIN_P_COST,
        }
    }

    /// Reject costs above the `MAX_*` limits before anything is allocated.
    fn check_limits(&self) -> Result<(), String> {
        if self.m_cost > MAX_M_COST || self.t_cost > MAX_T_COST || self.p_cost > MAX_P_COST {
            return Err(format!(
                "KDF costs m={} t={} p={} exceed {MAX_M_COST}/{MAX_T_COST}/{MAX_P_COST}",
                self.m_cost, self.t_cost, self.p_cost
            ));
        }
        Ok(())
    }

    fn derive_key(
        &self,
        passphrase: &Passphrase,
        salt: &[u8],
    ) -> Result<Zeroizing<[u8; 32]>, String> {
        let params = Params::new(self.m_cost, self.t_cost, self.p_cost, Some(32))
            .map_err(|e| format!("invalid KDF parameters: {e}"))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = Zeroizing::new([0u8; 32]);
        argon2
            .hash_password_into(passphrase.expose().as_bytes(), salt, &mut key[..])
            .map_err(|e| format!("key derivation failed: {e}"))?;
        Ok(key)
    }
}

/// Secret key encoding inside a private key file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "encoding", rename_all = "kebab-case")]
enum SecretMaterial {
    Plain {
        private: String,
    },
    #[serde(rename = "argon2id-chacha20poly1305")]
    Encrypted {
        kdf: KdfParams,
        salt: String,
        nonce: String,
        ciphertext: String,
    },
}

/// Private key file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PrivateKeyFile {
    keytype: String,
    scheme: String,
    keyid_hash_algorithms: Vec<String>,
    keyval: PublicKeyValue,
    secret: SecretMaterial,
}

/// Public key file contents (the key id is derived on load, never stored)
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PublicKeyFile {
    keytype: String,
    scheme: String,
    keyid_hash_algorithms: Vec<String>,
    keyval: PublicKeyValue,
}

fn b64() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

/// Serialize a private key, encrypting it when a passphrase is given.
pub(crate) fn encode_private_key(
    key: &PrivateKey,
    passphrase: Option<&Passphrase>,
    kdf: KdfParams,
    path: &Path,
) -> KeyResult<Zeroizing<Vec<u8>>> {
    let public = key.public_key();
    let secret_bytes = key.secret_bytes();

    let secret = match passphrase {
        None => SecretMaterial::Plain {
            private: hex::encode(&secret_bytes[..]),
        },
        Some(passphrase) => {
            let mut salt = [0u8; SALT_LEN];
            let mut nonce = [0u8; NONCE_LEN];
            rand::thread_rng().fill_bytes(&mut salt);
            rand::thread_rng().fill_bytes(&mut nonce);

            let kek = kdf.derive_key(passphrase, &salt).map_err(|reason| KeyError::InvalidKey {
                path: path.to_path_buf(),
                reason,
            })?;
            let cipher = ChaCha20Poly1305::new(Key::from_slice(&kek[..]));
            let ciphertext = cipher
                .encrypt(
                    Nonce::from_slice(&nonce),
                    Payload {
                        msg: &secret_bytes[..],
                        aad: public.keyval.public.as_bytes(),
                    },
                )
                .map_err(|_| KeyError::InvalidKey {
                    path: path.to_path_buf(),
                    reason: "encryption failed".to_string(),
                })?;

            SecretMaterial::Encrypted {
                kdf,
                salt: b64().encode(salt),
                nonce: b64().encode(nonce),
                ciphertext: b64().encode(ciphertext),
            }
        }
    };

    let file = PrivateKeyFile {
        keytype: public.keytype.clone(),
        scheme: public.scheme.clone(),
        keyid_hash_algorithms: public.keyid_hash_algorithms.clone(),
        keyval: public.keyval.clone(),
        secret,
    };
    let json = serde_json::to_vec_pretty(&file).map_err(|e| KeyError::InvalidKey {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(Zeroizing::new(json))
}

/// Parse and, if needed, decrypt a private key file.
pub(crate) fn decode_private_key(
    bytes: &[u8],
    passphrase: Option<&Passphrase>,
    path: &Path,
) -> KeyResult<PrivateKey> {
    let invalid = |reason: String| KeyError::InvalidKey {
        path: path.to_path_buf(),
        reason,
    };
    let decryption = |reason: &str| KeyError::Decryption {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let file: PrivateKeyFile = serde_json::from_slice(bytes).map_err(|e| invalid(e.to_string()))?;
    check_key_type(&file.keytype, &file.scheme).map_err(invalid)?;

    let secret: Zeroizing<Vec<u8>> = match file.secret {
        SecretMaterial::Plain { ref private } => {
            if passphrase.is_some() {
                tracing::warn!(
                    path = %path.display(),
                    "private key is not encrypted; ignoring passphrase"
                );
            }
            Zeroizing::new(hex::decode(private).map_err(|e| invalid(e.to_string()))?)
        }
        SecretMaterial::Encrypted {
            kdf,
            ref salt,
            ref nonce,
            ref ciphertext,
        } => {
            kdf.check_limits().map_err(invalid)?;
            let passphrase = passphrase
                .ok_or_else(|| decryption("key is encrypted and no passphrase was given"))?;
            let salt = b64().decode(salt).map_err(|e| invalid(e.to_string()))?;
            let nonce = b64().decode(nonce).map_err(|e| invalid(e.to_string()))?;
            let ciphertext = b64().decode(ciphertext).map_err(|e| invalid(e.to_string()))?;
            if nonce.len() != NONCE_LEN {
                return Err(invalid(format!("nonce must be {NONCE_LEN} bytes")));
            }

            let kek = kdf.derive_key(passphrase, &salt).map_err(invalid)?;
            let cipher = ChaCha20Poly1305::new(Key::from_slice(&kek[..]));
            let plaintext = cipher
                .decrypt(
                    Nonce::from_slice(&nonce),
                    Payload {
                        msg: &ciphertext,
                        aad: file.keyval.public.as_bytes(),
                    },
                )
                .map_err(|_| decryption("wrong passphrase or corrupted key file"))?;
            Zeroizing::new(plaintext)
        }
    };

    let key = PrivateKey::from_secret_bytes(&secret)
        .ok_or_else(|| invalid("secret key must be 32 bytes".to_string()))?;

    if key.public_key().keyval != file.keyval {
        return Err(KeyError::InvariantViolation(format!(
            "private key file {} records a public key that does not belong to its secret key",
            path.display()
        )));
    }
    Ok(key)
}

/// Serialize the public key file.
pub(crate) fn encode_public_key(key: &PublicKey, path: &Path) -> KeyResult<Vec<u8>> {
    let file = PublicKeyFile {
        keytype: key.keytype.clone(),
        scheme: key.scheme.clone(),
        keyid_hash_algorithms: key.keyid_hash_algorithms.clone(),
        keyval: key.keyval.clone(),
    };
    serde_json::to_vec_pretty(&file).map_err(|e| KeyError::InvalidKey {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Parse a public key file and derive its key id.
pub(crate) fn decode_public_key(bytes: &[u8], path: &Path) -> KeyResult<PublicKey> {
    let invalid = |reason: String| KeyError::InvalidKey {
        path: path.to_path_buf(),
        reason,
    };

    let file: PublicKeyFile = serde_json::from_slice(bytes).map_err(|e| invalid(e.to_string()))?;
    check_key_type(&file.keytype, &file.scheme).map_err(invalid)?;

    let verifying_key = decode_verifying_key(&file.keyval.public).map_err(invalid)?;
    PublicKey::from_verifying_key(&verifying_key)
}

fn check_key_type(keytype: &str, scheme: &str) -> Result<(), String> {
    if keytype != KEY_TYPE || scheme != SIGNATURE_SCHEME {
        return Err(format!("unsupported key type {keytype}/{scheme}"));
    }
    Ok(())
}

/// Create `dir` (and parents) with owner-only permissions if absent.
pub(crate) fn ensure_keystore_dir(dir: &Path) -> KeyResult<()> {
    if dir.is_dir() {
        return Ok(());
    }

    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(KEYSTORE_DIR_MODE);
    }
    builder.create(dir).map_err(|source| KeyError::Storage {
        path: dir.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %dir.display(), "created keystore directory");
    Ok(())
}

/// Write `data` to a file that must not exist yet.
///
/// An existing file (including one created by a concurrent writer between
/// the caller's existence check and this call) is a `PathCollision`.
pub(crate) fn write_new_file(path: &Path, data: &[u8], private: bool) -> KeyResult<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(if private { PRIVATE_FILE_MODE } else { PUBLIC_FILE_MODE });
    }
    #[cfg(not(unix))]
    let _ = private;

    let mut file = options.open(path).map_err(|e| KeyError::from_io(path, e))?;
    file.write_all(data).map_err(|e| KeyError::from_io(path, e))?;
    file.sync_all().map_err(|e| KeyError::from_io(path, e))?;
    Ok(())
}

/// Read a private key file, warning if group or others can access it.
pub(crate) fn read_private_file(path: &Path) -> KeyResult<Zeroizing<Vec<u8>>> {
    check_permissions(path)?;
    let bytes = fs::read(path).map_err(|e| KeyError::from_io(path, e))?;
    Ok(Zeroizing::new(bytes))
}

/// Read a public key file.
pub(crate) fn read_public_file(path: &Path) -> KeyResult<Vec<u8>> {
    fs::read(path).map_err(|e| KeyError::from_io(path, e))
}

#[cfg(unix)]
fn check_permissions(path: &Path) -> KeyResult<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path).map_err(|e| KeyError::from_io(path, e))?;
    let perm_bits = metadata.permissions().mode() & 0o777;
    if perm_bits & 0o077 != 0 {
        tracing::warn!(
            path = %path.display(),
            mode = %format!("{perm_bits:o}"),
            "private key file is accessible by group or others; consider chmod 600"
        );
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_permissions(path: &Path) -> KeyResult<()> {
    tracing::debug!(path = %path.display(), "permission check skipped on this platform");
    Ok(())
}
