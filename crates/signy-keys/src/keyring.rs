//! Threshold keyrings.
//!
//! A keyring is the `n` keypairs generated for one functionary together with
//! the threshold `m` of them that must sign.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::crypto::{KeyId, PrivateKey, PublicKey};
use crate::error::{KeyError, KeyResult};
use crate::passphrase::{PassphraseProvider, PassphraseRequest};
use crate::store::KeyStore;
use crate::threshold::Threshold;

/// Anything carrying a key id.
pub trait KeyMaterial {
    fn key_id(&self) -> &KeyId;
}

impl KeyMaterial for PrivateKey {
    fn key_id(&self) -> &KeyId {
        PrivateKey::key_id(self)
    }
}

impl KeyMaterial for PublicKey {
    fn key_id(&self) -> &KeyId {
        PublicKey::key_id(self)
    }
}

/// A key together with the file it was read from.
#[derive(Debug)]
pub struct KeyHandle<K> {
    path: PathBuf,
    key: K,
}

impl<K: KeyMaterial> KeyHandle<K> {
    pub fn new(path: impl Into<PathBuf>, key: K) -> Self {
        Self {
            path: path.into(),
            key,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn key_id(&self) -> &KeyId {
        self.key.key_id()
    }

    /// Same key, new location
    pub(crate) fn relocate(self, path: PathBuf) -> Self {
        Self {
            path,
            key: self.key,
        }
    }
}

/// Matching private and public halves of one key.
#[derive(Debug)]
pub struct Keypair {
    pub(crate) private: KeyHandle<PrivateKey>,
    pub(crate) public: KeyHandle<PublicKey>,
}

impl Keypair {
    /// Pair two handles, failing if they hold different keys.
    pub fn new(private: KeyHandle<PrivateKey>, public: KeyHandle<PublicKey>) -> KeyResult<Self> {
        if private.key_id() != public.key_id() || private.key().public_key() != public.key() {
            return Err(KeyError::InvariantViolation(format!(
                "private key {} ({}) does not match public key {} ({})",
                private.key_id(),
                private.path().display(),
                public.key_id(),
                public.path().display()
            )));
        }
        Ok(Self { private, public })
    }

    pub fn key_id(&self) -> &KeyId {
        self.public.key_id()
    }

    pub fn private(&self) -> &KeyHandle<PrivateKey> {
        &self.private
    }

    pub fn public(&self) -> &KeyHandle<PublicKey> {
        &self.public
    }

    pub(crate) fn into_parts(self) -> (KeyHandle<PrivateKey>, KeyHandle<PublicKey>) {
        (self.private, self.public)
    }
}

/// `n` keypairs with an `m`-of-`n` signing threshold.
#[derive(Debug)]
pub struct Keyring {
    threshold: Threshold,
    keypairs: Vec<Keypair>,
}

impl Keyring {
    /// Wrap existing keypairs. Requires exactly `n` keypairs with distinct ids.
    pub fn new(threshold: Threshold, keypairs: Vec<Keypair>) -> KeyResult<Self> {
        if keypairs.len() != threshold.n() as usize {
            return Err(KeyError::InvariantViolation(format!(
                "keyring for threshold {} holds {} keypairs",
                threshold,
                keypairs.len()
            )));
        }
        let keyring = Self {
            threshold,
            keypairs,
        };
        keyring.public_keys_by_id()?;
        Ok(keyring)
    }

    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    /// Keypairs in generation order
    pub fn keypairs(&self) -> &[Keypair] {
        &self.keypairs
    }

    pub fn is_empty(&self) -> bool {
        self.keypairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keypairs.len()
    }

    /// Private keys indexed by key id.
    pub fn private_keys_by_id(&self) -> KeyResult<BTreeMap<KeyId, &PrivateKey>> {
        index_by_id(self.keypairs.iter().map(|kp| kp.private.key()))
    }

    /// Public keys indexed by key id.
    pub fn public_keys_by_id(&self) -> KeyResult<BTreeMap<KeyId, PublicKey>> {
        index_by_id(self.keypairs.iter().map(|kp| kp.public.key().clone()))
    }
}

fn index_by_id<K: KeyMaterial>(keys: impl Iterator<Item = K>) -> KeyResult<BTreeMap<KeyId, K>> {
    let mut map = BTreeMap::new();
    for key in keys {
        let id = key.key_id().clone();
        if map.insert(id.clone(), key).is_some() {
            return Err(KeyError::InvariantViolation(format!("duplicate key id {id}")));
        }
    }
    Ok(map)
}

impl<K: KeyMaterial + ?Sized> KeyMaterial for &K {
    fn key_id(&self) -> &KeyId {
        (**self).key_id()
    }
}

/// Key ids in ascending order.
pub fn sorted_key_ids<'a, I>(ids: I) -> Vec<KeyId>
where
    I: IntoIterator<Item = &'a KeyId>,
{
    let mut ids: Vec<KeyId> = ids.into_iter().cloned().collect();
    ids.sort();
    ids
}

/// Generate, verify, and rename `threshold.n()` keypairs for `functionary`.
///
/// Each key is encrypted with a passphrase obtained from `passphrases` before
/// generation; passphrases are requested one at a time in key order. Any
/// failure aborts the whole keyring. Files already written stay on disk.
pub fn build_keyring(
    store: &KeyStore,
    functionary: &str,
    threshold: Threshold,
    passphrases: &mut dyn PassphraseProvider,
) -> KeyResult<Keyring> {
    let total = threshold.n();
    let mut keypairs: Vec<Keypair> = Vec::with_capacity(total as usize);

    for index in 1..=total {
        tracing::info!("generating key {index}/{total} for {functionary}");

        let passphrase = passphrases.passphrase(&PassphraseRequest {
            functionary,
            index,
            total,
        })?;

        let keypath = store.generate_keypair(functionary, index, Some(&passphrase))?;
        let keypair = store.load_keypair(&keypath, Some(&passphrase))?;

        if keypairs.iter().any(|kp| kp.key_id() == keypair.key_id()) {
            return Err(KeyError::InvariantViolation(format!(
                "key {} generated twice for {functionary}",
                keypair.key_id()
            )));
        }

        let keypair = store.rename_to_key_id(keypair)?;
        tracing::debug!(key_id = %keypair.key_id(), "key {index}/{total} ready");
        keypairs.push(keypair);
    }

    Keyring::new(threshold, keypairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyfile::KdfParams;
    use crate::passphrase::{FixedPassphrase, Passphrase};
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> KeyStore {
        KeyStore::new(dir.path()).with_kdf_params(KdfParams::insecure_fast())
    }

    fn loose_keypair() -> Keypair {
        let key = PrivateKey::generate().unwrap();
        let public = key.public_key().clone();
        Keypair::new(KeyHandle::new("k", key), KeyHandle::new("k.pub", public)).unwrap()
    }

    #[test]
    fn test_keypair_mismatch() {
        let a = PrivateKey::generate().unwrap();
        let b = PrivateKey::generate().unwrap();
        let err = Keypair::new(
            KeyHandle::new("a", a),
            KeyHandle::new("b.pub", b.public_key().clone()),
        )
        .unwrap_err();
        assert!(matches!(err, KeyError::InvariantViolation(_)));
    }

    #[test]
    fn test_keyring_size_must_match_n() {
        let threshold = Threshold::new(1, 2).unwrap();
        let err = Keyring::new(threshold, vec![loose_keypair()]).unwrap_err();
        assert!(matches!(err, KeyError::InvariantViolation(_)));
    }

    #[test]
    fn test_keyring_rejects_duplicate_ids() {
        let key = PrivateKey::generate().unwrap();
        let again = PrivateKey::from_secret_bytes(&key.secret_bytes()[..]).unwrap();
        let pair = |k: PrivateKey| {
            let public = k.public_key().clone();
            Keypair::new(KeyHandle::new("k", k), KeyHandle::new("k.pub", public)).unwrap()
        };
        let err = Keyring::new(Threshold::new(1, 2).unwrap(), vec![pair(key), pair(again)])
            .unwrap_err();
        assert!(matches!(err, KeyError::InvariantViolation(_)));
    }

    #[test]
    fn test_sorted_key_ids() {
        let ring = Keyring::new(
            Threshold::new(2, 3).unwrap(),
            vec![loose_keypair(), loose_keypair(), loose_keypair()],
        )
        .unwrap();
        let by_id = ring.public_keys_by_id().unwrap();
        let ids = sorted_key_ids(by_id.keys());
        assert_eq!(ids.len(), 3);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(ring.private_keys_by_id().unwrap().len(), 3);
    }

    #[test]
    fn test_build_keyring_default_threshold() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let mut provider = FixedPassphrase::new("pw").unwrap();

        let ring = build_keyring(&store, "developer", Threshold::default(), &mut provider).unwrap();
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.threshold(), Threshold::default());

        let keypair = &ring.keypairs()[0];
        let id = keypair.key_id().as_str();
        assert_eq!(keypair.private().path(), dir.path().join(id));
        assert_eq!(keypair.public().path(), dir.path().join(format!("{id}.pub")));
        assert!(!dir.path().join("developer_key_1").exists());
        assert!(!dir.path().join("developer_key_1.pub").exists());
    }

    #[test]
    fn test_build_keyring_asks_in_order() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let mut asked = Vec::new();
        let mut provider = |req: &PassphraseRequest<'_>| {
            asked.push((req.functionary.to_string(), req.index, req.total));
            Passphrase::new(format!("pw-{}", req.index))
        };

        let ring = build_keyring(
            &store,
            "machine",
            Threshold::new(2, 3).unwrap(),
            &mut provider,
        )
        .unwrap();
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.threshold().m(), 2);
        assert_eq!(
            asked,
            vec![
                ("machine".to_string(), 1, 3),
                ("machine".to_string(), 2, 3),
                ("machine".to_string(), 3, 3),
            ]
        );
        assert_eq!(store.list_key_ids().unwrap().len(), 3);
    }

    #[test]
    fn test_provider_failure_aborts() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let mut provider = |req: &PassphraseRequest<'_>| {
            if req.index == 2 {
                Err(KeyError::Passphrase("cancelled".to_string()))
            } else {
                Passphrase::new("pw")
            }
        };

        let err = build_keyring(
            &store,
            "developer",
            Threshold::new(1, 2).unwrap(),
            &mut provider,
        )
        .unwrap_err();
        assert!(matches!(err, KeyError::Passphrase(_)));
        // the first key was already finished and stays on disk
        assert_eq!(store.list_key_ids().unwrap().len(), 1);
    }

    #[test]
    fn test_build_keyring_collides_with_leftovers() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.generate_keypair("developer", 1, None).unwrap();

        let mut provider = FixedPassphrase::new("pw").unwrap();
        let err =
            build_keyring(&store, "developer", Threshold::default(), &mut provider).unwrap_err();
        assert!(matches!(err, KeyError::PathCollision(_)));
    }
}
