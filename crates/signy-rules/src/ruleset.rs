//! Checks over an ordered rule set.

use crate::rule::{ArtifactRule, RuleError};

/// Whether the rule set ends in `DISALLOW *`.
pub fn ends_with_disallow_all(rules: &[ArtifactRule]) -> bool {
    rules.last().is_some_and(ArtifactRule::is_disallow_all)
}

/// Reject a `DISALLOW *` anywhere but the last position.
///
/// Rules are evaluated in order, so an early `DISALLOW *` consumes every
/// artifact and the rules after it never apply.
pub fn check_disallow_all_last(rules: &[ArtifactRule]) -> Result<(), RuleError> {
    let len = rules.len();
    match rules.iter().position(ArtifactRule::is_disallow_all) {
        Some(position) if position + 1 < len => Err(RuleError::ShadowedRules { position, len }),
        _ => Ok(()),
    }
}

/// Validate every rule's pattern and the position of `DISALLOW *`.
pub fn validate_rules(rules: &[ArtifactRule]) -> Result<(), RuleError> {
    for rule in rules {
        rule.validate()?;
    }
    check_disallow_all_last(rules)
}

/// Step names referenced by MATCH rules, in rule order.
pub fn referenced_steps(rules: &[ArtifactRule]) -> impl Iterator<Item = &str> {
    rules.iter().filter_map(ArtifactRule::referenced_step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{allow, disallow, disallow_all, match_products, modify};

    #[test]
    fn test_ends_with_disallow_all() {
        assert!(ends_with_disallow_all(&[allow("a"), disallow_all()]));
        assert!(!ends_with_disallow_all(&[disallow_all(), allow("a")]));
        assert!(!ends_with_disallow_all(&[]));
    }

    #[test]
    fn test_disallow_all_last_is_accepted() {
        let rules = vec![match_products("*", "dev"), modify("x"), disallow_all()];
        assert!(check_disallow_all_last(&rules).is_ok());
        assert!(check_disallow_all_last(&[]).is_ok());
        assert!(check_disallow_all_last(&[allow("*")]).is_ok());
    }

    #[test]
    fn test_early_disallow_all_is_rejected() {
        let rules = vec![allow("a"), disallow_all(), modify("x")];
        assert_eq!(
            check_disallow_all_last(&rules),
            Err(RuleError::ShadowedRules {
                position: 1,
                len: 3
            })
        );
    }

    #[test]
    fn test_narrow_disallow_does_not_shadow() {
        let rules = vec![disallow("*.key"), allow("*")];
        assert!(check_disallow_all_last(&rules).is_ok());
    }

    #[test]
    fn test_validate_rules_reports_bad_pattern() {
        let rules = vec![allow("ok/*"), allow(""), disallow_all()];
        assert!(matches!(
            validate_rules(&rules),
            Err(RuleError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_referenced_steps() {
        let rules = vec![
            match_products("*", "developer"),
            modify("x"),
            crate::match_materials("*", "machine"),
        ];
        let steps: Vec<&str> = referenced_steps(&rules).collect();
        assert_eq!(steps, vec!["developer", "machine"]);
    }
}
