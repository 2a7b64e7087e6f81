//! signy-layout - supply-chain layout builder
//!
//! Generates threshold keyrings for each functionary of a supply chain,
//! describes the chain as steps and inspections with artifact rules, and
//! signs the resulting layout with the layout authority's keys.

pub mod config;
pub mod error;
pub mod layout;
pub mod pipeline;
pub mod prompt;
pub mod step;

pub use config::{InspectionConfig, LayoutConfig, StepConfig, ThresholdConfig};
pub use error::{ConfigError, LayoutError, LayoutResult};
pub use layout::{
    assemble_layout, assemble_layout_at, sign_layout, Layout, RelativeExpiration, Signature,
    SignedLayout,
};
pub use pipeline::LayoutBuilder;
pub use prompt::PromptPassphrase;
pub use step::{Inspection, InspectionBuilder, Step, StepBuilder};

pub use signy_keys as keys;
pub use signy_rules as rules;
