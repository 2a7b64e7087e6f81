//! End-to-end layout build.
//!
//! Turns a [`LayoutConfig`] into a [`SignedLayout`]:
//! - Validate the plan (no key is generated for an invalid plan)
//! - Generate one keyring per step, in plan order
//! - Build steps and inspections
//! - Assemble the layout from every step's public keys
//! - Generate the layout-authority keyring and sign
//! - Verify the fresh signatures
//!
//! Only key files are written. Persisting the signed layout is up to the
//! caller.

use signy_keys::{build_keyring, KeyId, KeyStore, PassphraseProvider, PublicKey};
use std::collections::BTreeMap;

use crate::config::LayoutConfig;
use crate::error::{LayoutError, LayoutResult};
use crate::layout::{assemble_layout, sign_layout, SignedLayout};
use crate::step::{Inspection, InspectionBuilder, Step, StepBuilder};

/// Builds and signs layouts against one keystore
pub struct LayoutBuilder<'a> {
    store: &'a KeyStore,
    passphrases: &'a mut dyn PassphraseProvider,
}

impl<'a> LayoutBuilder<'a> {
    pub fn new(store: &'a KeyStore, passphrases: &'a mut dyn PassphraseProvider) -> Self {
        Self { store, passphrases }
    }

    /// Build and sign the layout described by `config`.
    pub fn build(&mut self, config: &LayoutConfig) -> LayoutResult<SignedLayout> {
        config.validate()?;
        tracing::info!(
            layout = %config.name,
            steps = config.steps.len(),
            inspections = config.inspections.len(),
            keystore = %self.store.root().display(),
            "building layout"
        );

        let mut keys: BTreeMap<KeyId, PublicKey> = BTreeMap::new();
        let mut steps: Vec<Step> = Vec::with_capacity(config.steps.len());

        for step_config in &config.steps {
            let threshold = step_config.threshold.to_threshold()?;
            let keyring =
                build_keyring(self.store, &step_config.name, threshold, self.passphrases)?;

            for (id, key) in keyring.public_keys_by_id()? {
                if keys.contains_key(&id) {
                    return Err(LayoutError::InvariantViolation(format!(
                        "key {id} of step '{}' already belongs to another step",
                        step_config.name
                    )));
                }
                keys.insert(id, key);
            }

            let step = StepBuilder::new(&step_config.name)
                .materials(step_config.material_rules()?)
                .products(step_config.product_rules()?)
                .expected_command(step_config.expected_command.iter().cloned())
                .build(&keyring)?;
            tracing::debug!(step = %step.name, threshold = step.threshold, "built step");
            steps.push(step);
        }

        let inspections = config
            .inspections
            .iter()
            .map(|inspection| {
                InspectionBuilder::new(&inspection.name)
                    .materials(inspection.material_rules()?)
                    .products(inspection.product_rules()?)
                    .run(inspection.run.iter().cloned())
                    .build()
            })
            .collect::<LayoutResult<Vec<Inspection>>>()?;

        let layout = assemble_layout(steps, inspections, keys, config.expires)?
            .with_readme(config.readme.clone());

        let threshold = config.threshold.to_threshold()?;
        let authority = build_keyring(self.store, &config.name, threshold, self.passphrases)?;
        let signed = sign_layout(layout, &authority)?;

        let authority_keys: Vec<PublicKey> =
            authority.public_keys_by_id()?.into_values().collect();
        let verified = signed.verify_signatures(&authority_keys)?;
        if verified != authority.len() {
            return Err(LayoutError::InvariantViolation(format!(
                "only {verified} of {} fresh layout signatures verify",
                authority.len()
            )));
        }

        tracing::info!(
            layout = %config.name,
            expires = %signed.signed.expires,
            signatures = signed.signatures.len(),
            "signed layout"
        );
        Ok(signed)
    }
}
