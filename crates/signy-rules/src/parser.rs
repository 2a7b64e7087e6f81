//! Artifact rule parser.
//!
//! Turns grammar tokens (or a whitespace-separated rule string) back into an
//! [`ArtifactRule`]. Keywords are case-insensitive; patterns, prefixes and
//! step names are taken verbatim.

use crate::rule::{ArtifactRule, ArtifactScope, MatchRule, RuleError};

/// Parse a rule written as one line, e.g. `MATCH * WITH PRODUCTS FROM build`.
///
/// Tokens are separated by whitespace, so patterns containing spaces can
/// only be expressed through [`parse_tokens`].
pub fn parse_rule(s: &str) -> Result<ArtifactRule, RuleError> {
    let tokens: Vec<&str> = s.split_whitespace().collect();
    parse_tokens(&tokens)
}

/// Parse a rule from its grammar tokens.
pub fn parse_tokens<T: AsRef<str>>(tokens: &[T]) -> Result<ArtifactRule, RuleError> {
    let tokens: Vec<&str> = tokens.iter().map(|t| t.as_ref()).collect();
    let (keyword, rest) = tokens.split_first().ok_or(RuleError::Empty)?;
    let upper = keyword.to_ascii_uppercase();

    if upper == "MATCH" {
        return parse_match(rest);
    }

    let build: fn(String) -> ArtifactRule = match upper.as_str() {
        "ALLOW" => ArtifactRule::Allow,
        "DISALLOW" => ArtifactRule::Disallow,
        "CREATE" => ArtifactRule::Create,
        "DELETE" => ArtifactRule::Delete,
        "MODIFY" => ArtifactRule::Modify,
        "REQUIRE" => ArtifactRule::Require,
        _ => return Err(RuleError::UnknownKeyword(keyword.to_string())),
    };

    match rest {
        [pattern] => Ok(build(pattern.to_string())),
        _ => Err(RuleError::Malformed {
            keyword: upper,
            detail: format!("expected exactly one pattern, got {} token(s)", rest.len()),
        }),
    }
}

fn parse_match(rest: &[&str]) -> Result<ArtifactRule, RuleError> {
    let malformed = |detail: &str| RuleError::Malformed {
        keyword: "MATCH".to_string(),
        detail: detail.to_string(),
    };

    let (pattern, mut rest) = rest.split_first().ok_or_else(|| malformed("missing pattern"))?;

    let source_prefix = take_prefix(&mut rest);

    match rest.first() {
        Some(t) if t.eq_ignore_ascii_case("WITH") => rest = &rest[1..],
        _ => return Err(malformed("expected WITH")),
    }

    let scope = rest
        .first()
        .and_then(|t| ArtifactScope::from_keyword(t))
        .ok_or_else(|| malformed("expected MATERIALS or PRODUCTS after WITH"))?;
    rest = &rest[1..];

    let destination_prefix = take_prefix(&mut rest);

    let step_name = match rest {
        [from, step] if from.eq_ignore_ascii_case("FROM") => step.to_string(),
        _ => return Err(malformed("expected FROM <step> at end of rule")),
    };

    Ok(ArtifactRule::Match(MatchRule {
        pattern: pattern.to_string(),
        source_prefix,
        scope,
        destination_prefix,
        step_name,
    }))
}

/// Consume an optional `IN <prefix>` pair.
fn take_prefix(rest: &mut &[&str]) -> Option<String> {
    let current: &[&str] = *rest;
    match current {
        [kw, prefix, tail @ ..] if kw.eq_ignore_ascii_case("IN") => {
            *rest = tail;
            Some(prefix.to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_rules() {
        assert_eq!(parse_rule("ALLOW *.md").unwrap(), crate::allow("*.md"));
        assert_eq!(parse_rule("disallow *").unwrap(), crate::disallow_all());
        assert_eq!(parse_rule("Create foo").unwrap(), crate::create("foo"));
        assert_eq!(parse_rule("DELETE foo").unwrap(), crate::delete("foo"));
        assert_eq!(parse_rule("MODIFY foo").unwrap(), crate::modify("foo"));
        assert_eq!(parse_rule("REQUIRE foo").unwrap(), crate::require("foo"));
    }

    #[test]
    fn test_parse_match_without_prefixes() {
        let rule = parse_rule("MATCH file://bundle.json$..* WITH PRODUCTS FROM developer").unwrap();
        assert_eq!(rule, crate::match_products("file://bundle.json$..*", "developer"));
    }

    #[test]
    fn test_parse_match_with_both_prefixes() {
        let rule = parse_rule("match foo IN src with materials IN dst from build").unwrap();
        let expected: ArtifactRule = MatchRule::new("foo", ArtifactScope::Materials, "build")
            .with_source_prefix("src")
            .with_destination_prefix("dst")
            .into();
        assert_eq!(rule, expected);
    }

    #[test]
    fn test_parse_match_only_source_prefix() {
        let rule = parse_rule("MATCH foo IN src WITH PRODUCTS FROM build").unwrap();
        match rule {
            ArtifactRule::Match(m) => {
                assert_eq!(m.source_prefix.as_deref(), Some("src"));
                assert_eq!(m.destination_prefix, None);
            }
            other => panic!("expected MATCH, got {:?}", other),
        }
    }

    #[test]
    fn test_tokens_round_trip_through_parser() {
        let rule: ArtifactRule = MatchRule::new("a/*", ArtifactScope::Products, "s")
            .with_destination_prefix("b")
            .into();
        assert_eq!(parse_tokens(&rule.tokens()).unwrap(), rule);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_rule(""), Err(RuleError::Empty));
        assert!(matches!(
            parse_rule("PERMIT foo"),
            Err(RuleError::UnknownKeyword(_))
        ));
        assert!(matches!(parse_rule("ALLOW"), Err(RuleError::Malformed { .. })));
        assert!(matches!(
            parse_rule("ALLOW a b"),
            Err(RuleError::Malformed { .. })
        ));
        assert!(matches!(
            parse_rule("MATCH foo WITH ARTIFACTS FROM x"),
            Err(RuleError::Malformed { .. })
        ));
        assert!(matches!(
            parse_rule("MATCH foo WITH PRODUCTS"),
            Err(RuleError::Malformed { .. })
        ));
        assert!(matches!(
            parse_rule("MATCH foo FROM x"),
            Err(RuleError::Malformed { .. })
        ));
        assert!(matches!(
            parse_rule("MATCH foo WITH PRODUCTS FROM x extra"),
            Err(RuleError::Malformed { .. })
        ));
    }
}
