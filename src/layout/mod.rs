//! Layout assembly.
//!
//! A layout lists the steps of a supply chain, the inspections a verifier
//! runs, and the public keys of every functionary, and expires at a fixed
//! instant. `assemble_layout` checks that the pieces fit together;
//! [`signed::sign_layout`] produces the signed envelope.

pub mod expiration;
pub mod signed;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use signy_keys::{KeyId, PublicKey};
use signy_rules::referenced_steps;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{LayoutError, LayoutResult};
use crate::step::{Inspection, Step};

pub use expiration::{format_expires, parse_expires, RelativeExpiration, EXPIRES_FORMAT};
pub use signed::{sign_layout, Signature, SignedLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum LayoutType {
    #[serde(rename = "layout")]
    Layout,
}

/// The unsigned layout document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    #[serde(rename = "_type")]
    layout_type: LayoutType,

    /// Expiry instant, `YYYY-MM-DDTHH:MM:SSZ`
    pub expires: String,

    #[serde(default)]
    pub readme: String,

    /// Public keys of every step functionary, by key id
    pub keys: BTreeMap<KeyId, PublicKey>,

    pub steps: Vec<Step>,

    pub inspect: Vec<Inspection>,
}

impl Layout {
    pub fn with_readme(mut self, readme: impl Into<String>) -> Self {
        self.readme = readme.into();
        self
    }

    pub fn expires_at(&self) -> LayoutResult<DateTime<Utc>> {
        parse_expires(&self.expires)
    }

    /// RFC 8785 canonical JSON; these are the bytes that get signed.
    pub fn canonical_bytes(&self) -> LayoutResult<Vec<u8>> {
        serde_json_canonicalizer::to_vec(self).map_err(|e| LayoutError::Canonicalize(e.to_string()))
    }

    /// Re-run the consistency checks `assemble_layout` performs.
    pub fn check(&self) -> LayoutResult<()> {
        check_keys(&self.keys)?;
        check_names(&self.steps, &self.inspect)?;
        check_step_keys(&self.steps, &self.keys)?;
        check_match_references(&self.steps, &self.inspect)?;
        parse_expires(&self.expires)?;
        Ok(())
    }
}

/// Assemble a layout expiring `expiration` from now.
pub fn assemble_layout(
    steps: Vec<Step>,
    inspections: Vec<Inspection>,
    keys: BTreeMap<KeyId, PublicKey>,
    expiration: RelativeExpiration,
) -> LayoutResult<Layout> {
    assemble_layout_at(steps, inspections, keys, expiration, Utc::now())
}

/// Assemble a layout as if the current time were `now`.
///
/// Fails with `InvariantViolation` if a step names a key missing from `keys`
/// or a `keys` entry is filed under the wrong key id, and with
/// `InvalidInput` on duplicate step/inspection names or a MATCH rule naming
/// an unknown step.
pub fn assemble_layout_at(
    steps: Vec<Step>,
    inspections: Vec<Inspection>,
    keys: BTreeMap<KeyId, PublicKey>,
    expiration: RelativeExpiration,
    now: DateTime<Utc>,
) -> LayoutResult<Layout> {
    let expires = format_expires(expiration.expires_at(now)?);

    let layout = Layout {
        layout_type: LayoutType::Layout,
        expires,
        readme: String::new(),
        keys,
        steps,
        inspect: inspections,
    };
    layout.check()?;

    tracing::debug!(
        steps = layout.steps.len(),
        inspections = layout.inspect.len(),
        keys = layout.keys.len(),
        expires = %layout.expires,
        "assembled layout"
    );
    Ok(layout)
}

fn check_keys(keys: &BTreeMap<KeyId, PublicKey>) -> LayoutResult<()> {
    for (id, key) in keys {
        if key.key_id() != id {
            return Err(LayoutError::InvariantViolation(format!(
                "key filed under {id} has key id {}",
                key.key_id()
            )));
        }
        key.check_key_id()?;
    }
    Ok(())
}

fn check_names(steps: &[Step], inspections: &[Inspection]) -> LayoutResult<()> {
    let mut seen = BTreeSet::new();
    let names = steps
        .iter()
        .map(|s| s.name.as_str())
        .chain(inspections.iter().map(|i| i.name.as_str()));
    for name in names {
        if !seen.insert(name) {
            return Err(LayoutError::InvalidInput(format!(
                "duplicate step or inspection name '{name}'"
            )));
        }
    }
    Ok(())
}

fn check_step_keys(steps: &[Step], keys: &BTreeMap<KeyId, PublicKey>) -> LayoutResult<()> {
    for step in steps {
        if step.threshold == 0 || step.threshold as usize > step.pubkeys.len() {
            return Err(LayoutError::InvalidThreshold(format!(
                "step '{}' requires {} of {} keys",
                step.name,
                step.threshold,
                step.pubkeys.len()
            )));
        }
        if let Some(missing) = step.pubkeys.iter().find(|id| !keys.contains_key(*id)) {
            return Err(LayoutError::InvariantViolation(format!(
                "step '{}' authorizes key {missing}, which the layout does not carry",
                step.name
            )));
        }
    }
    Ok(())
}

/// MATCH rules may point at any step or inspection of the layout.
fn check_match_references(steps: &[Step], inspections: &[Inspection]) -> LayoutResult<()> {
    let known: BTreeSet<&str> = steps
        .iter()
        .map(|s| s.name.as_str())
        .chain(inspections.iter().map(|i| i.name.as_str()))
        .collect();

    let rule_sets = steps
        .iter()
        .flat_map(|s| [(&s.name, &s.expected_materials), (&s.name, &s.expected_products)])
        .chain(
            inspections
                .iter()
                .flat_map(|i| [(&i.name, &i.expected_materials), (&i.name, &i.expected_products)]),
        );

    for (owner, rules) in rule_sets {
        if let Some(unknown) = referenced_steps(rules).find(|name| !known.contains(name)) {
            return Err(LayoutError::InvalidInput(format!(
                "'{owner}' matches against unknown step '{unknown}'"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::InspectionBuilder;
    use chrono::TimeZone;
    use signy_keys::PrivateKey;
    use signy_rules::{allow, disallow_all, match_products};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn key() -> PublicKey {
        PrivateKey::generate().unwrap().public_key().clone()
    }

    fn keys(list: &[&PublicKey]) -> BTreeMap<KeyId, PublicKey> {
        list.iter().map(|k| (k.key_id().clone(), (*k).clone())).collect()
    }

    fn step(name: &str, key: &PublicKey) -> Step {
        Step::from_parts(name, vec![], vec![allow("*")], vec![key.key_id().clone()], 1, vec![])
            .unwrap()
    }

    #[test]
    fn test_assemble_two_steps() {
        let (a, b) = (key(), key());
        let layout = assemble_layout_at(
            vec![step("developer", &a), step("machine", &b)],
            vec![],
            keys(&[&a, &b]),
            RelativeExpiration::years(1),
            now(),
        )
        .unwrap();

        assert_eq!(layout.expires, "2025-06-01T00:00:00Z");
        assert_eq!(layout.keys.len(), 2);
        assert!(layout.readme.is_empty());

        let json = serde_json::to_value(&layout).unwrap();
        assert_eq!(json["_type"], "layout");
        assert_eq!(json["inspect"], serde_json::json!([]));
    }

    #[test]
    fn test_missing_step_key_is_invariant_violation() {
        let (a, b) = (key(), key());
        let err = assemble_layout_at(
            vec![step("developer", &a), step("machine", &b)],
            vec![],
            keys(&[&a]),
            RelativeExpiration::default(),
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, LayoutError::InvariantViolation(_)));
    }

    #[test]
    fn test_misfiled_key_is_invariant_violation() {
        let (a, b) = (key(), key());
        let mut map = keys(&[&a]);
        map.insert(b.key_id().clone(), a.clone());

        let err = assemble_layout_at(vec![], vec![], map, RelativeExpiration::default(), now())
            .unwrap_err();
        assert!(matches!(err, LayoutError::InvariantViolation(_)));
    }

    #[test]
    fn test_duplicate_names_are_invalid_input() {
        let a = key();
        let err = assemble_layout_at(
            vec![step("build", &a)],
            vec![InspectionBuilder::new("build").build().unwrap()],
            keys(&[&a]),
            RelativeExpiration::default(),
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, LayoutError::InvalidInput(_)));
    }

    #[test]
    fn test_unknown_match_target() {
        let a = key();
        let inspection = InspectionBuilder::new("check")
            .materials([match_products("*", "nowhere"), disallow_all()])
            .build()
            .unwrap();
        let err = assemble_layout_at(
            vec![step("build", &a)],
            vec![inspection],
            keys(&[&a]),
            RelativeExpiration::default(),
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, LayoutError::InvalidInput(_)));
    }

    #[test]
    fn test_self_match_is_allowed() {
        let a = key();
        let step = Step::from_parts(
            "machine",
            vec![],
            vec![match_products("*", "machine")],
            vec![a.key_id().clone()],
            1,
            vec![],
        )
        .unwrap();
        assert!(assemble_layout_at(
            vec![step],
            vec![],
            keys(&[&a]),
            RelativeExpiration::default(),
            now()
        )
        .is_ok());
    }

    #[test]
    fn test_extra_keys_are_allowed() {
        let (a, b) = (key(), key());
        let layout = assemble_layout_at(
            vec![step("build", &a)],
            vec![],
            keys(&[&a, &b]),
            RelativeExpiration::default(),
            now(),
        )
        .unwrap();
        assert_eq!(layout.keys.len(), 2);
    }

    #[test]
    fn test_canonical_bytes_are_stable() {
        let a = key();
        let layout = assemble_layout_at(
            vec![step("build", &a)],
            vec![],
            keys(&[&a]),
            RelativeExpiration::days(7),
            now(),
        )
        .unwrap()
        .with_readme("demo");

        let first = layout.canonical_bytes().unwrap();
        let reparsed: Layout = serde_json::from_slice(&first).unwrap();
        assert_eq!(reparsed, layout);
        assert_eq!(reparsed.canonical_bytes().unwrap(), first);
        assert_eq!(layout.expires_at().unwrap(), now() + chrono::Duration::days(7));
    }
}
