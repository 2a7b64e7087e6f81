//! Signed layout envelope.
//!
//! The layout-authority keyring signs the canonical (JCS) bytes of the
//! layout with every one of its keys. Signatures are hex-encoded Ed25519.

use serde::{Deserialize, Serialize};
use signy_keys::{KeyId, Keyring, PublicKey};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::Layout;
use crate::error::{LayoutError, LayoutResult};

/// One signature over the layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub keyid: KeyId,
    /// Hex-encoded Ed25519 signature
    pub sig: String,
}

/// A layout together with its signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedLayout {
    pub signed: Layout,
    pub signatures: Vec<Signature>,
}

/// Sign `layout` with every key of `keyring`, in keyring order.
///
/// An empty keyring is an `InvalidThreshold` error; nothing is produced on
/// failure.
pub fn sign_layout(layout: Layout, keyring: &Keyring) -> LayoutResult<SignedLayout> {
    if keyring.is_empty() {
        return Err(LayoutError::InvalidThreshold(
            "a layout needs at least one signing key".to_string(),
        ));
    }

    let message = layout.canonical_bytes()?;
    let signatures = keyring
        .keypairs()
        .iter()
        .map(|keypair| {
            let key = keypair.private().key();
            tracing::debug!(key_id = %key.key_id(), "signing layout");
            Signature {
                keyid: key.key_id().clone(),
                sig: key.sign(&message),
            }
        })
        .collect();

    Ok(SignedLayout {
        signed: layout,
        signatures,
    })
}

impl SignedLayout {
    /// Count the distinct keys among `keys` with a valid signature.
    ///
    /// Signatures by keys not in `keys`, and repeated signatures by the same
    /// key, do not count.
    pub fn verify_signatures(&self, keys: &[PublicKey]) -> LayoutResult<usize> {
        let message = self.signed.canonical_bytes()?;
        let mut valid: BTreeSet<&KeyId> = BTreeSet::new();

        for signature in &self.signatures {
            let Some(key) = keys.iter().find(|k| k.key_id() == &signature.keyid) else {
                tracing::debug!(key_id = %signature.keyid, "no key for signature");
                continue;
            };
            if key.verify(&message, &signature.sig) {
                valid.insert(&signature.keyid);
            } else {
                tracing::warn!(key_id = %signature.keyid, "signature does not verify");
            }
        }
        Ok(valid.len())
    }

    pub fn key_ids(&self) -> Vec<&KeyId> {
        self.signatures.iter().map(|s| &s.keyid).collect()
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> LayoutResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> LayoutResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write to `path`, which must not exist yet.
    ///
    /// The document is written to a temporary sibling first and linked into
    /// place, so a reader never sees a partial file and an existing file is
    /// never replaced.
    pub fn write_to_file(&self, path: &Path) -> LayoutResult<()> {
        if path.exists() {
            return Err(LayoutError::PathCollision(path.to_path_buf()));
        }

        let json = self.to_json()?;
        let temp_path = temp_sibling(path);
        fs::write(&temp_path, json).map_err(|e| LayoutError::io(&temp_path, e))?;

        let linked = fs::hard_link(&temp_path, path);
        if let Err(e) = fs::remove_file(&temp_path) {
            tracing::warn!(
                path = %temp_path.display(),
                error = %e,
                "failed to remove temporary layout file"
            );
        }
        match linked {
            Ok(()) => {
                tracing::info!(path = %path.display(), "wrote signed layout");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(LayoutError::PathCollision(path.to_path_buf()))
            }
            Err(e) => Err(LayoutError::io(path, e)),
        }
    }

    pub fn from_file(path: &Path) -> LayoutResult<Self> {
        let json = fs::read_to_string(path).map_err(|e| LayoutError::io(path, e))?;
        Self::from_json(&json)
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "layout".to_string());
    path.with_file_name(format!(".{name}.{}.tmp", std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{assemble_layout, RelativeExpiration};
    use signy_keys::{KeyHandle, Keypair, PrivateKey, Threshold};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn keyring(n: u32) -> Keyring {
        let keypairs = (0..n)
            .map(|_| {
                let key = PrivateKey::generate().unwrap();
                let public = key.public_key().clone();
                Keypair::new(KeyHandle::new("k", key), KeyHandle::new("k.pub", public)).unwrap()
            })
            .collect();
        Keyring::new(Threshold::new(1, n).unwrap(), keypairs).unwrap()
    }

    fn public_keys(ring: &Keyring) -> Vec<PublicKey> {
        ring.public_keys_by_id().unwrap().into_values().collect()
    }

    fn empty_layout() -> Layout {
        assemble_layout(vec![], vec![], BTreeMap::new(), RelativeExpiration::years(1)).unwrap()
    }

    #[test]
    fn test_one_signature_per_key_in_order() {
        let ring = keyring(3);
        let signed = sign_layout(empty_layout(), &ring).unwrap();

        let expected: Vec<&KeyId> = ring.keypairs().iter().map(|kp| kp.key_id()).collect();
        assert_eq!(signed.key_ids(), expected);
        assert_eq!(signed.verify_signatures(&public_keys(&ring)).unwrap(), 3);
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let ring = keyring(1);
        let mut signed = sign_layout(empty_layout(), &ring).unwrap();
        signed.signed.readme = "changed after signing".to_string();
        assert_eq!(signed.verify_signatures(&public_keys(&ring)).unwrap(), 0);
    }

    #[test]
    fn test_verify_ignores_unknown_and_repeated() {
        let ring = keyring(1);
        let other = keyring(1);
        let mut signed = sign_layout(empty_layout(), &ring).unwrap();
        signed.signatures.push(signed.signatures[0].clone());

        assert_eq!(signed.verify_signatures(&public_keys(&ring)).unwrap(), 1);
        assert_eq!(signed.verify_signatures(&public_keys(&other)).unwrap(), 0);
    }

    #[test]
    fn test_envelope_shape() {
        let ring = keyring(1);
        let signed = sign_layout(empty_layout(), &ring).unwrap();
        let json: serde_json::Value = serde_json::from_str(&signed.to_json().unwrap()).unwrap();

        assert_eq!(json["signed"]["_type"], "layout");
        let sig = &json["signatures"][0];
        assert_eq!(sig["keyid"], ring.keypairs()[0].key_id().as_str());
        assert_eq!(sig["sig"].as_str().unwrap().len(), 128);
    }

    #[test]
    fn test_write_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("root.layout");
        let signed = sign_layout(empty_layout(), &keyring(1)).unwrap();

        signed.write_to_file(&path).unwrap();
        let loaded = SignedLayout::from_file(&path).unwrap();
        assert_eq!(loaded, signed);

        let err = signed.write_to_file(&path).unwrap_err();
        assert!(matches!(err, LayoutError::PathCollision(_)));
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_write_removes_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("root.layout");
        let temp = temp_sibling(&path);
        sign_layout(empty_layout(), &keyring(1))
            .unwrap()
            .write_to_file(&path)
            .unwrap();

        assert!(path.exists());
        assert!(!temp.exists());
    }
}
