//! Layout plan files (TOML).
//!
//! A plan names the layout authority, the steps and inspections, and the
//! thresholds for every keyring the build generates:
//!
//! ```toml
//! name = "layout"
//! keystore = "keys"
//!
//! [threshold]
//! m = 1
//! n = 1
//!
//! [expires]
//! years = 1
//!
//! [[steps]]
//! name = "developer"
//! products = ["ALLOW file://bundle.json$..*", "DISALLOW *"]
//! ```
//!
//! Rules use the textual grammar understood by [`signy_rules::parse_rule`].

use serde::{Deserialize, Serialize};
use signy_keys::{validate_functionary, Threshold};
use signy_rules::{parse_rule, referenced_steps, validate_rules, ArtifactRule};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ConfigError;
use crate::layout::RelativeExpiration;

/// Default name of the layout-authority functionary
pub const DEFAULT_LAYOUT_NAME: &str = "layout";

/// Root selector of the bundle document in artifact patterns
pub const BUNDLE_ROOT: &str = "file://bundle.json$";

/// Every element below the bundle root
pub const BUNDLE_ALL: &str = "file://bundle.json$..*";

fn default_layout_name() -> String {
    DEFAULT_LAYOUT_NAME.to_string()
}

/// m-of-n as written in a plan file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThresholdConfig {
    pub m: u32,
    pub n: u32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self { m: 1, n: 1 }
    }
}

impl ThresholdConfig {
    pub fn to_threshold(&self) -> Result<Threshold, ConfigError> {
        Ok(Threshold::new(self.m, self.n)?)
    }
}

/// A step of the plan. Its name is also the functionary whose keyring is
/// generated for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepConfig {
    pub name: String,

    #[serde(default)]
    pub threshold: ThresholdConfig,

    #[serde(default)]
    pub materials: Vec<String>,

    #[serde(default)]
    pub products: Vec<String>,

    #[serde(default)]
    pub expected_command: Vec<String>,
}

impl StepConfig {
    pub fn material_rules(&self) -> Result<Vec<ArtifactRule>, ConfigError> {
        parse_rules(&format!("step '{}' materials", self.name), &self.materials)
    }

    pub fn product_rules(&self) -> Result<Vec<ArtifactRule>, ConfigError> {
        parse_rules(&format!("step '{}' products", self.name), &self.products)
    }
}

/// An inspection of the plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InspectionConfig {
    pub name: String,

    #[serde(default)]
    pub materials: Vec<String>,

    #[serde(default)]
    pub products: Vec<String>,

    #[serde(default)]
    pub run: Vec<String>,
}

impl InspectionConfig {
    pub fn material_rules(&self) -> Result<Vec<ArtifactRule>, ConfigError> {
        parse_rules(&format!("inspection '{}' materials", self.name), &self.materials)
    }

    pub fn product_rules(&self) -> Result<Vec<ArtifactRule>, ConfigError> {
        parse_rules(&format!("inspection '{}' products", self.name), &self.products)
    }
}

/// Layout plan loaded from TOML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayoutConfig {
    /// Layout-authority functionary; its keyring signs the layout
    #[serde(default = "default_layout_name")]
    pub name: String,

    /// Keystore root; relative paths are resolved against the plan file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keystore: Option<PathBuf>,

    #[serde(default)]
    pub readme: String,

    /// Layout-authority threshold
    #[serde(default)]
    pub threshold: ThresholdConfig,

    #[serde(default)]
    pub expires: RelativeExpiration,

    #[serde(default)]
    pub steps: Vec<StepConfig>,

    #[serde(default)]
    pub inspections: Vec<InspectionConfig>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            name: default_layout_name(),
            keystore: None,
            readme: String::new(),
            threshold: ThresholdConfig::default(),
            expires: RelativeExpiration::default(),
            steps: Vec::new(),
            inspections: Vec::new(),
        }
    }
}

impl FromStr for LayoutConfig {
    type Err = ConfigError;

    /// Parse and validate a plan
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: LayoutConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

impl LayoutConfig {
    /// Load a plan from a file, resolving a relative keystore against the
    /// file's directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: LayoutConfig = content.parse()?;

        if let Some(keystore) = config.keystore.as_mut() {
            if keystore.is_relative() {
                if let Some(dir) = path.parent() {
                    *keystore = dir.join(&*keystore);
                }
            }
        }
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// The two-step bundle layout: a developer writes `bundle.json`, a
    /// machine fills in image digests and sizes, and nothing else changes.
    pub fn bundle_template() -> Self {
        let developer = StepConfig {
            name: "developer".to_string(),
            threshold: ThresholdConfig::default(),
            materials: Vec::new(),
            products: vec![format!("ALLOW {BUNDLE_ALL}"), "DISALLOW *".to_string()],
            expected_command: Vec::new(),
        };
        let machine = StepConfig {
            name: "machine".to_string(),
            threshold: ThresholdConfig::default(),
            materials: vec![
                format!("MATCH {BUNDLE_ALL} WITH PRODUCTS FROM developer"),
                "DISALLOW *".to_string(),
            ],
            products: vec![
                format!("MATCH {BUNDLE_ALL} WITH MATERIALS FROM machine"),
                format!("MODIFY {BUNDLE_ROOT}.images.*"),
                "DISALLOW *".to_string(),
            ],
            expected_command: Vec::new(),
        };

        Self {
            expires: RelativeExpiration::years(1),
            steps: vec![developer, machine],
            ..Self::default()
        }
    }

    /// Check names, thresholds, and rules without touching the keystore.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_functionary(&self.name)?;
        self.threshold.to_threshold()?;

        let mut names = BTreeSet::new();
        for step in &self.steps {
            validate_functionary(&step.name)?;
            step.threshold.to_threshold()?;
            if !names.insert(step.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate step name '{}'",
                    step.name
                )));
            }
        }
        for inspection in &self.inspections {
            if inspection.name.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "inspection name must not be empty".to_string(),
                ));
            }
            if !names.insert(inspection.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate step or inspection name '{}'",
                    inspection.name
                )));
            }
        }

        let mut rule_sets = Vec::new();
        for step in &self.steps {
            rule_sets.push(step.material_rules()?);
            rule_sets.push(step.product_rules()?);
        }
        for inspection in &self.inspections {
            rule_sets.push(inspection.material_rules()?);
            rule_sets.push(inspection.product_rules()?);
        }
        for rules in &rule_sets {
            if let Some(unknown) = referenced_steps(rules).find(|s| !names.contains(s)) {
                return Err(ConfigError::Validation(format!(
                    "MATCH rule references unknown step '{unknown}'"
                )));
            }
        }
        Ok(())
    }
}

fn parse_rules(location: &str, rules: &[String]) -> Result<Vec<ArtifactRule>, ConfigError> {
    let parsed = rules
        .iter()
        .map(|rule| {
            parse_rule(rule).map_err(|source| ConfigError::Rule {
                location: location.to_string(),
                rule: rule.clone(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    validate_rules(&parsed).map_err(|source| ConfigError::Rule {
        location: location.to_string(),
        rule: rules.join(", "),
        source,
    })?;
    Ok(parsed)
}
