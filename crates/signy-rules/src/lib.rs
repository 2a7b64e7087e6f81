//! Artifact rule DSL for supply-chain layouts.
//!
//! Artifact rules describe which files a step or inspection may consume
//! (materials) and produce (products). A verifier evaluates the rules of a
//! rule set in order, so the order in which rules are built is part of the
//! contract.
//!
//! ```
//! use signy_rules::{disallow_all, match_products, modify};
//!
//! let materials = vec![match_products("bundle/*", "developer"), disallow_all()];
//! let products = vec![modify("file://bundle.json$.images.*"), disallow_all()];
//!
//! assert_eq!(materials[0].to_string(), "MATCH bundle/* WITH PRODUCTS FROM developer");
//! assert_eq!(products.last().map(|r| r.to_string()), Some("DISALLOW *".to_string()));
//! ```

mod parser;
mod rule;
mod ruleset;

pub use parser::{parse_rule, parse_tokens};
pub use rule::{ArtifactRule, ArtifactScope, MatchRule, RuleError};
pub use ruleset::{
    check_disallow_all_last, ends_with_disallow_all, referenced_steps, validate_rules,
};

/// Pattern matching every artifact.
pub const MATCH_ALL: &str = "*";

/// `ALLOW <pattern>`
pub fn allow(pattern: impl Into<String>) -> ArtifactRule {
    ArtifactRule::Allow(pattern.into())
}

/// `DISALLOW <pattern>`
pub fn disallow(pattern: impl Into<String>) -> ArtifactRule {
    ArtifactRule::Disallow(pattern.into())
}

/// `CREATE <pattern>`
pub fn create(pattern: impl Into<String>) -> ArtifactRule {
    ArtifactRule::Create(pattern.into())
}

/// `DELETE <pattern>`
pub fn delete(pattern: impl Into<String>) -> ArtifactRule {
    ArtifactRule::Delete(pattern.into())
}

/// `MODIFY <pattern>`
pub fn modify(pattern: impl Into<String>) -> ArtifactRule {
    ArtifactRule::Modify(pattern.into())
}

/// `REQUIRE <pattern>`
pub fn require(pattern: impl Into<String>) -> ArtifactRule {
    ArtifactRule::Require(pattern.into())
}

/// `MATCH <pattern> WITH MATERIALS FROM <step>`
///
/// Use [`MatchRule`] directly to add path prefixes.
pub fn match_materials(pattern: impl Into<String>, step_name: impl Into<String>) -> ArtifactRule {
    MatchRule::new(pattern, ArtifactScope::Materials, step_name).into()
}

/// `MATCH <pattern> WITH PRODUCTS FROM <step>`
///
/// Use [`MatchRule`] directly to add path prefixes.
pub fn match_products(pattern: impl Into<String>, step_name: impl Into<String>) -> ArtifactRule {
    MatchRule::new(pattern, ArtifactScope::Products, step_name).into()
}

/// `DISALLOW *`
///
/// Appending this as the last rule of a rule set turns it into a
/// deny-by-default policy. It must stay last: placed earlier it shadows
/// every rule after it.
pub fn disallow_all() -> ArtifactRule {
    disallow(MATCH_ALL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_constructors() {
        assert_eq!(allow("a").tokens(), vec!["ALLOW", "a"]);
        assert_eq!(disallow("a").tokens(), vec!["DISALLOW", "a"]);
        assert_eq!(create("a").tokens(), vec!["CREATE", "a"]);
        assert_eq!(delete("a").tokens(), vec!["DELETE", "a"]);
        assert_eq!(modify("a").tokens(), vec!["MODIFY", "a"]);
        assert_eq!(require("a").tokens(), vec!["REQUIRE", "a"]);
    }

    #[test]
    fn test_match_shorthands() {
        assert_eq!(
            match_materials("*.tar", "build").tokens(),
            vec!["MATCH", "*.tar", "WITH", "MATERIALS", "FROM", "build"]
        );
        assert_eq!(
            match_products("*.tar", "build").tokens(),
            vec!["MATCH", "*.tar", "WITH", "PRODUCTS", "FROM", "build"]
        );
    }

    #[test]
    fn test_disallow_all() {
        assert_eq!(disallow_all(), ArtifactRule::Disallow("*".to_string()));
    }
}
