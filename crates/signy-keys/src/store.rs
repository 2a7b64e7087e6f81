//! Filesystem keystore.
//!
//! Keys are first written under index-based names
//! (`<root>/<functionary>_key_<i>` plus a `.pub` sibling), loaded back to
//! prove they decrypt, then renamed to `<root>/<keyid>` and
//! `<root>/<keyid>.pub` so that tooling which only knows key ids can find
//! them.
//!
//! The keystore does no locking: one process is expected to own a root at a
//! time. A concurrent writer shows up as a `PathCollision`.

use regex_lite::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

use crate::crypto::{KeyId, PrivateKey, PublicKey};
use crate::error::{KeyError, KeyResult};
use crate::keyfile::{self, KdfParams};
use crate::keyring::{KeyHandle, Keypair};
use crate::passphrase::Passphrase;

/// Suffix appended to a private key path to name its public key
pub const PUBLIC_KEY_SUFFIX: &str = "pub";

fn functionary_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap())
}

/// Check that a functionary name is safe to use as a file name.
pub fn validate_functionary(functionary: &str) -> KeyResult<()> {
    if functionary_pattern().is_match(functionary) {
        Ok(())
    } else {
        Err(KeyError::InvalidName(functionary.to_string()))
    }
}

/// Read a public key file from anywhere on disk.
pub fn load_public_key(path: &Path) -> KeyResult<PublicKey> {
    let bytes = keyfile::read_public_file(path)?;
    keyfile::decode_public_key(&bytes, path)
}

/// Paths of a freshly generated keypair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keypath {
    pub private: PathBuf,
    pub public: PathBuf,
}

/// A keystore rooted at one directory.
#[derive(Debug, Clone)]
pub struct KeyStore {
    root: PathBuf,
    kdf: KdfParams,
}

impl KeyStore {
    /// Create a keystore handle. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            kdf: KdfParams::default(),
        }
    }

    /// Use different Argon2id costs for newly encrypted keys
    pub fn with_kdf_params(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<functionary>_key_<index>`
    pub fn private_key_path(&self, functionary: &str, index: u32) -> KeyResult<PathBuf> {
        validate_functionary(functionary)?;
        Ok(self.root.join(format!("{functionary}_key_{index}")))
    }

    /// `<private>.pub`
    pub fn public_key_path(private: &Path) -> PathBuf {
        let mut name = private.as_os_str().to_owned();
        name.push(".");
        name.push(PUBLIC_KEY_SUFFIX);
        PathBuf::from(name)
    }

    /// `<root>/<keyid>`
    pub fn key_id_path(&self, key_id: &KeyId) -> PathBuf {
        self.root.join(key_id.as_str())
    }

    /// Generate a keypair and write it under its index-based names.
    ///
    /// The private half is encrypted when a passphrase is given. Fails with
    /// `PathCollision` if either file already exists. Files written before a
    /// failure are left in place.
    pub fn generate_keypair(
        &self,
        functionary: &str,
        index: u32,
        passphrase: Option<&Passphrase>,
    ) -> KeyResult<Keypath> {
        let private = self.private_key_path(functionary, index)?;
        let public = Self::public_key_path(&private);

        for path in [&private, &public] {
            if path.exists() {
                return Err(KeyError::PathCollision(path.clone()));
            }
        }

        keyfile::ensure_keystore_dir(&self.root)?;

        let key = PrivateKey::generate()?;
        let private_bytes = keyfile::encode_private_key(&key, passphrase, self.kdf, &private)?;
        let public_bytes = keyfile::encode_public_key(key.public_key(), &public)?;

        keyfile::write_new_file(&private, &private_bytes, true)?;
        keyfile::write_new_file(&public, &public_bytes, false)?;

        tracing::debug!(
            private = %private.display(),
            public = %public.display(),
            encrypted = passphrase.is_some(),
            "wrote keypair"
        );
        Ok(Keypath { private, public })
    }

    /// Read a keypair back, decrypting the private half.
    pub fn load_keypair(
        &self,
        keypath: &Keypath,
        passphrase: Option<&Passphrase>,
    ) -> KeyResult<Keypair> {
        let private_bytes = keyfile::read_private_file(&keypath.private)?;
        let public_bytes = keyfile::read_public_file(&keypath.public)?;

        let private = keyfile::decode_private_key(&private_bytes, passphrase, &keypath.private)?;
        let public = keyfile::decode_public_key(&public_bytes, &keypath.public)?;

        Keypair::new(
            KeyHandle::new(keypath.private.clone(), private),
            KeyHandle::new(keypath.public.clone(), public),
        )
    }

    /// Move both files of `keypair` to names derived from its key id.
    ///
    /// Both files are linked at their new names before either old name is
    /// removed, and an existing destination is never replaced. A keypair
    /// that already sits at its key-id paths fails with `PathCollision`.
    pub fn rename_to_key_id(&self, keypair: Keypair) -> KeyResult<Keypair> {
        if !self.root.is_dir() {
            return Err(KeyError::Storage {
                path: self.root.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "keystore root does not exist"),
            });
        }

        let new_private = self.key_id_path(keypair.key_id());
        let new_public = Self::public_key_path(&new_private);

        for path in [&new_private, &new_public] {
            if path.exists() {
                return Err(KeyError::PathCollision(path.clone()));
            }
        }

        let (private, public) = keypair.into_parts();

        link_no_clobber(private.path(), &new_private)?;
        if let Err(e) = link_no_clobber(public.path(), &new_public) {
            discard_link(&new_private);
            return Err(e);
        }
        fs::remove_file(private.path()).map_err(|e| KeyError::from_io(private.path(), e))?;
        fs::remove_file(public.path()).map_err(|e| KeyError::from_io(public.path(), e))?;

        tracing::debug!(key_id = %private.key_id(), "renamed keypair to key id");

        Keypair::new(private.relocate(new_private), public.relocate(new_public))
    }

    /// Load the public key stored under `key_id`.
    pub fn find_public_key(&self, key_id: &KeyId) -> KeyResult<PublicKey> {
        let path = Self::public_key_path(&self.key_id_path(key_id));
        let key = load_public_key(&path)?;
        if key.key_id() != key_id {
            return Err(KeyError::InvariantViolation(format!(
                "{} holds key {}, not {}",
                path.display(),
                key.key_id(),
                key_id
            )));
        }
        Ok(key)
    }

    /// Key ids of every renamed public key in the keystore, sorted.
    pub fn list_key_ids(&self) -> KeyResult<Vec<KeyId>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&self.root).to_path_buf();
                KeyError::Storage {
                    path,
                    source: e.into(),
                }
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(PUBLIC_KEY_SUFFIX) {
                continue;
            }
            if let Some(id) = path.file_stem().and_then(|s| s.to_str()).and_then(KeyId::parse) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Hard-link `from` at `to`, failing with `PathCollision` if `to` exists.
fn link_no_clobber(from: &Path, to: &Path) -> KeyResult<()> {
    fs::hard_link(from, to).map_err(|e| match e.kind() {
        io::ErrorKind::AlreadyExists => KeyError::PathCollision(to.to_path_buf()),
        _ => KeyError::from_io(from, e),
    })
}

fn discard_link(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove partial rename");
    }
}
