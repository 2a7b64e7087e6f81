//! Steps and inspections.
//!
//! A step is an operation performed by a functionary, who must attest to it
//! with `threshold` of the keys listed in `pubkeys`. An inspection is a check
//! run by the verifier itself and carries no keys.

use serde::{Deserialize, Serialize};
use signy_keys::{sorted_key_ids, KeyId, Keyring};
use signy_rules::{validate_rules, ArtifactRule};
use std::collections::BTreeSet;

use crate::error::{LayoutError, LayoutResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum StepType {
    #[serde(rename = "step")]
    Step,
}

/// A step of the supply chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    #[serde(rename = "_type")]
    step_type: StepType,

    /// Unique name within the layout
    pub name: String,

    /// Rules over the artifacts the step consumes
    pub expected_materials: Vec<ArtifactRule>,

    /// Rules over the artifacts the step produces
    pub expected_products: Vec<ArtifactRule>,

    /// Key ids authorized to attest to this step, ascending
    pub pubkeys: Vec<KeyId>,

    /// Command the functionary is expected to run; may be empty
    pub expected_command: Vec<String>,

    /// Number of distinct authorized keys that must attest
    pub threshold: u32,
}

impl Step {
    /// Build a step from explicit parts.
    ///
    /// Fails with `InvalidThreshold` unless `1 <= threshold <= pubkeys.len()`
    /// and with `InvariantViolation` if a key id is listed twice. The key
    /// ids are stored sorted.
    pub fn from_parts(
        name: impl Into<String>,
        expected_materials: Vec<ArtifactRule>,
        expected_products: Vec<ArtifactRule>,
        pubkeys: Vec<KeyId>,
        threshold: u32,
        expected_command: Vec<String>,
    ) -> LayoutResult<Self> {
        let name = name.into();
        check_name("step", &name)?;
        validate_rules(&expected_materials)?;
        validate_rules(&expected_products)?;

        let unique: BTreeSet<&KeyId> = pubkeys.iter().collect();
        if unique.len() != pubkeys.len() {
            return Err(LayoutError::InvariantViolation(format!(
                "step '{name}' lists a key id more than once"
            )));
        }

        if threshold == 0 || threshold as usize > pubkeys.len() {
            return Err(LayoutError::InvalidThreshold(format!(
                "step '{name}' requires {threshold} of {} keys",
                pubkeys.len()
            )));
        }

        Ok(Self {
            step_type: StepType::Step,
            name,
            expected_materials,
            expected_products,
            pubkeys: sorted_key_ids(&pubkeys),
            expected_command,
            threshold,
        })
    }
}

/// An inspection the verifier runs itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inspection {
    /// Unique name within the layout
    #[serde(rename = "_name")]
    pub name: String,

    pub expected_materials: Vec<ArtifactRule>,

    pub expected_products: Vec<ArtifactRule>,

    /// Command the verifier runs; may be empty
    pub run: Vec<String>,
}

/// Builder for a step whose keys come from a keyring
#[derive(Debug, Clone)]
pub struct StepBuilder {
    name: String,
    materials: Vec<ArtifactRule>,
    products: Vec<ArtifactRule>,
    expected_command: Vec<String>,
}

impl StepBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            materials: Vec::new(),
            products: Vec::new(),
            expected_command: Vec::new(),
        }
    }

    /// Set the material rules, in evaluation order
    pub fn materials(mut self, rules: impl IntoIterator<Item = ArtifactRule>) -> Self {
        self.materials = rules.into_iter().collect();
        self
    }

    /// Set the product rules, in evaluation order
    pub fn products(mut self, rules: impl IntoIterator<Item = ArtifactRule>) -> Self {
        self.products = rules.into_iter().collect();
        self
    }

    pub fn expected_command<S: Into<String>>(mut self, argv: impl IntoIterator<Item = S>) -> Self {
        self.expected_command = argv.into_iter().map(Into::into).collect();
        self
    }

    /// Authorize every key of `keyring`, requiring its threshold `m`.
    pub fn build(self, keyring: &Keyring) -> LayoutResult<Step> {
        let keys = keyring.public_keys_by_id()?;
        Step::from_parts(
            self.name,
            self.materials,
            self.products,
            sorted_key_ids(keys.keys()),
            keyring.threshold().m(),
            self.expected_command,
        )
    }
}

/// Builder for an inspection
#[derive(Debug, Clone)]
pub struct InspectionBuilder {
    name: String,
    materials: Vec<ArtifactRule>,
    products: Vec<ArtifactRule>,
    run: Vec<String>,
}

impl InspectionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            materials: Vec::new(),
            products: Vec::new(),
            run: Vec::new(),
        }
    }

    pub fn materials(mut self, rules: impl IntoIterator<Item = ArtifactRule>) -> Self {
        self.materials = rules.into_iter().collect();
        self
    }

    pub fn products(mut self, rules: impl IntoIterator<Item = ArtifactRule>) -> Self {
        self.products = rules.into_iter().collect();
        self
    }

    pub fn run<S: Into<String>>(mut self, argv: impl IntoIterator<Item = S>) -> Self {
        self.run = argv.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> LayoutResult<Inspection> {
        check_name("inspection", &self.name)?;
        validate_rules(&self.materials)?;
        validate_rules(&self.products)?;
        Ok(Inspection {
            name: self.name,
            expected_materials: self.materials,
            expected_products: self.products,
            run: self.run,
        })
    }
}

fn check_name(what: &str, name: &str) -> LayoutResult<()> {
    if name.trim().is_empty() {
        return Err(LayoutError::InvalidInput(format!("{what} name must not be empty")));
    }
    Ok(())
}
