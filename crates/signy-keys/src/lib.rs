//! Threshold keyrings backed by a filesystem keystore.
//!
//! Keys are Ed25519, identified by the SHA-256 of their canonical (JCS) public
//! key object, and stored as JSON files whose private half is encrypted with
//! an Argon2id-derived key under ChaCha20-Poly1305.
//!
//! ```no_run
//! use signy_keys::{build_keyring, FixedPassphrase, KeyStore, Threshold};
//!
//! # fn main() -> Result<(), signy_keys::KeyError> {
//! let store = KeyStore::new("keys");
//! let mut passphrases = FixedPassphrase::new("correct horse")?;
//! let ring = build_keyring(&store, "developer", Threshold::new(2, 3)?, &mut passphrases)?;
//! assert_eq!(ring.len(), 3);
//! # Ok(())
//! # }
//! ```

pub mod crypto;
pub mod error;
pub mod keyfile;
pub mod keyring;
pub mod passphrase;
pub mod store;
pub mod threshold;

pub use crypto::{KeyId, PrivateKey, PublicKey, PublicKeyValue, KEY_TYPE, SIGNATURE_SCHEME};
pub use error::{ErrorKind, KeyError, KeyResult};
pub use keyfile::KdfParams;
pub use keyring::{build_keyring, sorted_key_ids, KeyHandle, KeyMaterial, Keypair, Keyring};
pub use passphrase::{FixedPassphrase, Passphrase, PassphraseProvider, PassphraseRequest};
pub use store::{load_public_key, validate_functionary, KeyStore, Keypath, PUBLIC_KEY_SUFFIX};
pub use threshold::Threshold;
