//! Artifact rule types.

use serde::de::{self, Deserializer};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors from building, parsing, or checking artifact rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("empty artifact rule")]
    Empty,

    #[error("unknown rule keyword: {0}")]
    UnknownKeyword(String),

    #[error("malformed {keyword} rule: {detail}")]
    Malformed { keyword: String, detail: String },

    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("'DISALLOW *' at position {position} of {len} shadows every rule after it")]
    ShadowedRules { position: usize, len: usize },
}

/// Which artifact set of the referenced step a MATCH rule compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactScope {
    Materials,
    Products,
}

impl ArtifactScope {
    /// Keyword emitted in the rule grammar.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactScope::Materials => "MATERIALS",
            ArtifactScope::Products => "PRODUCTS",
        }
    }

    /// Parse the scope keyword (case-insensitive).
    pub fn from_keyword(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("MATERIALS") {
            Some(ArtifactScope::Materials)
        } else if s.eq_ignore_ascii_case("PRODUCTS") {
            Some(ArtifactScope::Products)
        } else {
            None
        }
    }
}

impl fmt::Display for ArtifactScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `MATCH <pattern> [IN <src>] WITH (MATERIALS|PRODUCTS) [IN <dst>] FROM <step>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchRule {
    pub pattern: String,
    pub source_prefix: Option<String>,
    pub scope: ArtifactScope,
    pub destination_prefix: Option<String>,
    pub step_name: String,
}

impl MatchRule {
    /// Create a MATCH rule without path prefixes
    pub fn new(
        pattern: impl Into<String>,
        scope: ArtifactScope,
        step_name: impl Into<String>,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            source_prefix: None,
            scope,
            destination_prefix: None,
            step_name: step_name.into(),
        }
    }

    /// Set the prefix stripped from this step's artifact paths.
    ///
    /// An empty prefix means no prefix.
    pub fn with_source_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.source_prefix = non_empty(prefix.into());
        self
    }

    /// Set the prefix stripped from the referenced step's artifact paths.
    ///
    /// An empty prefix means no prefix.
    pub fn with_destination_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.destination_prefix = non_empty(prefix.into());
        self
    }

    fn push_tokens(&self, out: &mut Vec<String>) {
        out.push("MATCH".to_string());
        out.push(self.pattern.clone());
        if let Some(ref src) = self.source_prefix {
            out.push("IN".to_string());
            out.push(src.clone());
        }
        out.push("WITH".to_string());
        out.push(self.scope.as_str().to_string());
        if let Some(ref dst) = self.destination_prefix {
            out.push("IN".to_string());
            out.push(dst.clone());
        }
        out.push("FROM".to_string());
        out.push(self.step_name.clone());
    }
}

impl From<MatchRule> for ArtifactRule {
    fn from(rule: MatchRule) -> Self {
        ArtifactRule::Match(rule)
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// One artifact rule.
///
/// Rules are compared structurally. On the wire a rule is the JSON array
/// of its grammar tokens, e.g. `["CREATE", "foo.tar"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtifactRule {
    Allow(String),
    Disallow(String),
    Create(String),
    Delete(String),
    Modify(String),
    Require(String),
    Match(MatchRule),
}

impl ArtifactRule {
    /// Leading keyword of the rule.
    pub fn keyword(&self) -> &'static str {
        match self {
            ArtifactRule::Allow(_) => "ALLOW",
            ArtifactRule::Disallow(_) => "DISALLOW",
            ArtifactRule::Create(_) => "CREATE",
            ArtifactRule::Delete(_) => "DELETE",
            ArtifactRule::Modify(_) => "MODIFY",
            ArtifactRule::Require(_) => "REQUIRE",
            ArtifactRule::Match(_) => "MATCH",
        }
    }

    /// Artifact path pattern the rule applies to.
    pub fn pattern(&self) -> &str {
        match self {
            ArtifactRule::Allow(p)
            | ArtifactRule::Disallow(p)
            | ArtifactRule::Create(p)
            | ArtifactRule::Delete(p)
            | ArtifactRule::Modify(p)
            | ArtifactRule::Require(p) => p,
            ArtifactRule::Match(m) => &m.pattern,
        }
    }

    /// Grammar tokens in emission order.
    pub fn tokens(&self) -> Vec<String> {
        match self {
            ArtifactRule::Match(m) => {
                let mut out = Vec::with_capacity(10);
                m.push_tokens(&mut out);
                out
            }
            other => vec![other.keyword().to_string(), other.pattern().to_string()],
        }
    }

    /// Whether this is `DISALLOW *`.
    pub fn is_disallow_all(&self) -> bool {
        matches!(self, ArtifactRule::Disallow(p) if p == crate::MATCH_ALL)
    }

    /// Step referenced by a MATCH rule.
    pub fn referenced_step(&self) -> Option<&str> {
        match self {
            ArtifactRule::Match(m) => Some(&m.step_name),
            _ => None,
        }
    }

    /// Check that the pattern is non-empty.
    ///
    /// Patterns are fnmatch-style and matched by the verifier, where every
    /// character is legal, so nothing beyond emptiness is rejected here.
    pub fn validate(&self) -> Result<(), RuleError> {
        let pattern = self.pattern();
        if pattern.is_empty() {
            return Err(RuleError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "pattern is empty".to_string(),
            });
        }

        if let ArtifactRule::Match(m) = self {
            if m.step_name.is_empty() {
                return Err(RuleError::Malformed {
                    keyword: "MATCH".to_string(),
                    detail: "step name is empty".to_string(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for ArtifactRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tokens().join(" "))
    }
}

impl std::str::FromStr for ArtifactRule {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::parse_rule(s)
    }
}

impl Serialize for ArtifactRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let tokens = self.tokens();
        let mut seq = serializer.serialize_seq(Some(tokens.len()))?;
        for token in &tokens {
            seq.serialize_element(token)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for ArtifactRule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tokens = Vec::<String>::deserialize(deserializer)?;
        crate::parse_tokens(&tokens).map_err(de::Error::custom)
    }
}
