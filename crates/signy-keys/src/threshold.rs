//! m-of-n signing thresholds.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{KeyError, KeyResult};

/// An m-of-n signing requirement.
///
/// Always satisfies `1 <= m <= n`; the only way to obtain one is through
/// [`Threshold::new`] (deserialization goes through the same check).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawThreshold")]
pub struct Threshold {
    m: u32,
    n: u32,
}

impl Threshold {
    /// Create a threshold, failing unless `1 <= m <= n`.
    pub fn new(m: u32, n: u32) -> KeyResult<Self> {
        if m == 0 {
            return Err(KeyError::InvalidThreshold(format!("m must be positive (m={m}, n={n})")));
        }
        if n == 0 {
            return Err(KeyError::InvalidThreshold(format!("n must be positive (m={m}, n={n})")));
        }
        if m > n {
            return Err(KeyError::InvalidThreshold(format!("m must not exceed n (m={m}, n={n})")));
        }
        Ok(Self { m, n })
    }

    /// Signatures required.
    pub fn m(&self) -> u32 {
        self.m
    }

    /// Keys in the keyring.
    pub fn n(&self) -> u32 {
        self.n
    }
}

impl Default for Threshold {
    /// 1-of-1
    fn default() -> Self {
        Self { m: 1, n: 1 }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-of-{}", self.m, self.n)
    }
}

/// Unchecked wire form; signed so that negative values are reported as
/// threshold errors rather than type errors.
#[derive(Deserialize)]
struct RawThreshold {
    m: i64,
    n: i64,
}

impl TryFrom<RawThreshold> for Threshold {
    type Error = KeyError;

    fn try_from(raw: RawThreshold) -> Result<Self, Self::Error> {
        let convert = |v: i64| {
            u32::try_from(v).map_err(|_| {
                KeyError::InvalidThreshold(format!("value out of range (m={}, n={})", raw.m, raw.n))
            })
        };
        Threshold::new(convert(raw.m)?, convert(raw.n)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_thresholds() {
        for n in 1..=5 {
            for m in 1..=n {
                let t = Threshold::new(m, n).unwrap();
                assert_eq!((t.m(), t.n()), (m, n));
            }
        }
    }

    #[test]
    fn test_invalid_thresholds() {
        assert!(matches!(Threshold::new(0, 1), Err(KeyError::InvalidThreshold(_))));
        assert!(matches!(Threshold::new(1, 0), Err(KeyError::InvalidThreshold(_))));
        assert!(matches!(Threshold::new(0, 0), Err(KeyError::InvalidThreshold(_))));
        assert!(matches!(Threshold::new(2, 1), Err(KeyError::InvalidThreshold(_))));
    }

    #[test]
    fn test_default_is_one_of_one() {
        assert_eq!(Threshold::default(), Threshold::new(1, 1).unwrap());
        assert_eq!(Threshold::default().to_string(), "1-of-1");
    }

    #[test]
    fn test_deserialize_validates() {
        let t: Threshold = serde_json::from_str(r#"{"m":2,"n":3}"#).unwrap();
        assert_eq!(t, Threshold::new(2, 3).unwrap());

        assert!(serde_json::from_str::<Threshold>(r#"{"m":3,"n":2}"#).is_err());
        assert!(serde_json::from_str::<Threshold>(r#"{"m":-1,"n":2}"#).is_err());
        assert!(serde_json::from_str::<Threshold>(r#"{"m":0,"n":0}"#).is_err());
    }

    #[test]
    fn test_serialize_shape() {
        let json = serde_json::to_value(Threshold::new(1, 2).unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({"m": 1, "n": 2}));
    }
}
