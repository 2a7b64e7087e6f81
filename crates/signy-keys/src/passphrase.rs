//! Passphrase capability.
//!
//! Keyring construction asks a [`PassphraseProvider`] for one passphrase per
//! key, strictly in key order. Interactive prompting, confirmation, and
//! environment lookups live in providers outside this crate; tests inject a
//! [`FixedPassphrase`] or a closure.

use std::fmt;
use zeroize::Zeroizing;

use crate::error::{KeyError, KeyResult};

/// A non-empty passphrase, zeroized on drop.
#[derive(Clone)]
pub struct Passphrase(Zeroizing<String>);

impl Passphrase {
    /// Wrap a passphrase, rejecting the empty string.
    pub fn new(value: impl Into<String>) -> KeyResult<Self> {
        let value = Zeroizing::new(value.into());
        if value.is_empty() {
            return Err(KeyError::Passphrase("empty passphrase rejected".to_string()));
        }
        Ok(Self(value))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(***)")
    }
}

/// What a passphrase is being requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassphraseRequest<'a> {
    /// Functionary whose keyring is being built
    pub functionary: &'a str,
    /// 1-based key index
    pub index: u32,
    /// Keys in the keyring
    pub total: u32,
}

impl PassphraseRequest<'_> {
    /// Prompt text shown to a human.
    pub fn prompt(&self) -> String {
        format!(
            "Enter a passphrase to encrypt {} key {}/{}: ",
            self.functionary, self.index, self.total
        )
    }
}

/// Source of already-confirmed passphrases.
pub trait PassphraseProvider {
    fn passphrase(&mut self, request: &PassphraseRequest<'_>) -> KeyResult<Passphrase>;
}

impl<F> PassphraseProvider for F
where
    F: FnMut(&PassphraseRequest<'_>) -> KeyResult<Passphrase>,
{
    fn passphrase(&mut self, request: &PassphraseRequest<'_>) -> KeyResult<Passphrase> {
        self(request)
    }
}

/// Provider answering every request with the same passphrase.
#[derive(Debug, Clone)]
pub struct FixedPassphrase(Passphrase);

impl FixedPassphrase {
    pub fn new(value: impl Into<String>) -> KeyResult<Self> {
        Ok(Self(Passphrase::new(value)?))
    }
}

impl PassphraseProvider for FixedPassphrase {
    fn passphrase(&mut self, _request: &PassphraseRequest<'_>) -> KeyResult<Passphrase> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PassphraseRequest<'static> {
        PassphraseRequest {
            functionary: "developer",
            index: 1,
            total: 2,
        }
    }

    #[test]
    fn test_empty_passphrase_rejected() {
        assert!(matches!(Passphrase::new(""), Err(KeyError::Passphrase(_))));
        assert!(FixedPassphrase::new("").is_err());
    }

    #[test]
    fn test_debug_redacts() {
        let p = Passphrase::new("hunter2").unwrap();
        assert!(!format!("{:?}", p).contains("hunter2"));
    }

    #[test]
    fn test_prompt_text() {
        assert_eq!(
            request().prompt(),
            "Enter a passphrase to encrypt developer key 1/2: "
        );
    }

    #[test]
    fn test_closure_provider() {
        let mut seen = Vec::new();
        let mut provider = |req: &PassphraseRequest<'_>| {
            seen.push(req.index);
            Passphrase::new(format!("pw-{}", req.index))
        };
        let p = provider.passphrase(&request()).unwrap();
        assert_eq!(p.expose(), "pw-1");
        drop(provider);
        assert_eq!(seen, vec![1]);
    }

    #[test]
    fn test_fixed_provider() {
        let mut provider = FixedPassphrase::new("secret").unwrap();
        assert_eq!(provider.passphrase(&request()).unwrap().expose(), "secret");
        assert_eq!(provider.passphrase(&request()).unwrap().expose(), "secret");
    }
}
