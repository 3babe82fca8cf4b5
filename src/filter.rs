//! Wildcard filter expansion.
//!
//! A filter pattern is a dotted path where a `*` segment stands for every
//! child at that level. Expansion turns a pattern into the concrete paths it
//! covers in one particular tree.
//!
//! Expansion is monotonic and never fails:
//! - `*` against a missing branch or a leaf contributes no paths
//! - a literal segment is appended without checking the tree; a literal
//!   that names nothing is resolved (to nothing) during projection
//!
//! Arrays are the only non-object containers in a JSON tree, so they are the
//! only branches whose children are rendered as bracketed indices (`[0]`).
//! Expanded paths stay as segment lists until they are rendered, so keys
//! containing `.` or brackets survive the trip into projection. A literal
//! `*` inside a key is written `\*`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PathError;
use crate::path::{self, Segment};

/// The pattern matching every top-level branch; projects the whole tree.
pub const CATCH_ALL: &str = "*";

const WILDCARD: char = '*';

/// A parsed filter pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct FilterPattern {
    raw: String,
    /// Literal fragments; a wildcard sits between each consecutive pair.
    literals: Vec<Vec<Segment>>,
}

impl FilterPattern {
    /// Parse a pattern. Any string is accepted.
    #[must_use]
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let literals = path::split_unescaped(&raw, WILDCARD)
            .into_iter()
            .map(path::parse_lossy)
            .collect();
        Self { raw, literals }
    }

    /// Parse a pattern, rejecting malformed bracket syntax in any literal.
    pub fn parse_strict(raw: impl Into<String>) -> Result<Self, PathError> {
        let raw = raw.into();
        let literals = path::split_unescaped(&raw, WILDCARD)
            .into_iter()
            .map(path::parse)
            .collect::<Result<_, _>>()?;
        Ok(Self { raw, literals })
    }

    /// The pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns true if the pattern contains at least one `*`.
    #[must_use]
    pub fn has_wildcard(&self) -> bool {
        self.literals.len() > 1
    }

    /// Returns true for the bare catch-all pattern `*`.
    #[must_use]
    pub fn is_catch_all(&self) -> bool {
        self.raw.trim() == CATCH_ALL
    }

    /// Concrete paths this pattern covers in `tree`, as segment lists.
    ///
    /// A pattern with no literal and no wildcard yields the single empty
    /// path.
    #[must_use]
    pub fn expand_segments(&self, tree: &Value) -> Vec<Vec<Segment>> {
        // `None` until the first literal or wildcard seeds the prefix set.
        let mut prefixes: Option<Vec<Vec<Segment>>> = None;

        for (i, literal) in self.literals.iter().enumerate() {
            if !literal.is_empty() {
                prefixes = Some(match prefixes {
                    None => vec![literal.clone()],
                    Some(existing) => existing
                        .into_iter()
                        .map(|mut prefix| {
                            prefix.extend(literal.iter().cloned());
                            prefix
                        })
                        .collect(),
                });
            }

            let followed_by_wildcard = i + 1 < self.literals.len();
            if followed_by_wildcard {
                let existing = prefixes.unwrap_or_else(|| vec![Vec::new()]);
                prefixes = Some(expand_children(&existing, tree));
            }
        }

        prefixes.unwrap_or_else(|| vec![Vec::new()])
    }

    /// Concrete paths this pattern covers in `tree`, rendered as strings.
    #[must_use]
    pub fn expand(&self, tree: &Value) -> Vec<String> {
        self.expand_segments(tree)
            .iter()
            .map(|segments| path::render(segments))
            .collect()
    }
}

fn expand_children(prefixes: &[Vec<Segment>], tree: &Value) -> Vec<Vec<Segment>> {
    let mut out = Vec::new();
    for prefix in prefixes {
        let Some(branch) = path::get(tree, prefix) else {
            continue;
        };
        for child in path::child_segments(branch) {
            let mut next = prefix.clone();
            next.push(child);
            out.push(next);
        }
    }
    out
}

/// Expand `pattern` against `tree`.
#[must_use]
pub fn expand(pattern: &str, tree: &Value) -> Vec<String> {
    FilterPattern::parse(pattern).expand(tree)
}

impl fmt::Display for FilterPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<String> for FilterPattern {
    fn from(raw: String) -> Self {
        Self::parse(raw)
    }
}

impl From<&str> for FilterPattern {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<FilterPattern> for String {
    fn from(pattern: FilterPattern) -> Self {
        pattern.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scenario_tree() -> Value {
        json!({"c1": {"stores": {"s1": {"count": 1}}, "componentName": "Counter"}})
    }

    #[test]
    fn literal_pattern_is_returned_trimmed() {
        let tree = scenario_tree();
        assert_eq!(expand("c1.stores", &tree), vec!["c1.stores"]);
        assert_eq!(expand(".c1.stores.", &tree), vec!["c1.stores"]);
        // No existence check for literals.
        assert_eq!(expand("nope.nothing", &tree), vec!["nope.nothing"]);
        assert_eq!(expand("nope", &json!(null)), vec!["nope"]);
    }

    #[test]
    fn catch_all_lists_top_level_keys() {
        let tree = json!({"a": 1, "b": {"c": 2}});
        assert_eq!(expand("*", &tree), vec!["a", "b"]);
        assert!(expand("*", &json!({})).is_empty());
        assert!(expand("*", &json!(42)).is_empty());
    }

    #[test]
    fn leading_wildcard_then_literal_then_wildcard() {
        assert_eq!(expand("*.stores.*", &scenario_tree()), vec!["c1.stores.s1"]);
    }

    #[test]
    fn literal_then_wildcard() {
        let tree = json!({"c1": {"stores": {"s1": {}, "s2": {}}}});
        assert_eq!(
            expand("c1.stores.*", &tree),
            vec!["c1.stores.s1", "c1.stores.s2"]
        );
    }

    #[test]
    fn wildcard_over_leaf_or_missing_branch_yields_nothing() {
        let tree = scenario_tree();
        assert!(expand("c1.componentName.*", &tree).is_empty());
        assert!(expand("missing.*", &tree).is_empty());
        // An emptied prefix set stays empty for later literals.
        assert!(expand("missing.*.stores", &tree).is_empty());
    }

    #[test]
    fn arrays_expand_to_bracketed_indices() {
        let tree = json!({"list": [{"x": 1}, {"x": 2}]});
        assert_eq!(expand("list.*", &tree), vec!["list.[0]", "list.[1]"]);
        assert_eq!(expand("list.*.x", &tree), vec!["list.[0].x", "list.[1].x"]);
        assert_eq!(expand("*", &json!([1, 2])), vec!["[0]", "[1]"]);
    }

    #[test]
    fn consecutive_wildcards_descend_two_levels() {
        let tree = json!({"a": {"x": 1, "y": 2}, "b": {"z": 3}});
        assert_eq!(expand("**", &tree), vec!["a.x", "a.y", "b.z"]);
        assert_eq!(expand("*.*", &tree), vec!["a.x", "a.y", "b.z"]);
    }

    #[test]
    fn pattern_metadata() {
        let p = FilterPattern::parse("*");
        assert!(p.is_catch_all());
        assert!(p.has_wildcard());

        let p = FilterPattern::parse("c1.stores");
        assert!(!p.is_catch_all());
        assert!(!p.has_wildcard());
        assert_eq!(p.to_string(), "c1.stores");
    }

    #[test]
    fn keys_with_separators_stay_whole() {
        let tree = json!({"c1": {"stores": {"user.profile": {"name": "a"}, "a[0]": {}}}});
        let pattern = FilterPattern::parse("*.stores.*");
        assert_eq!(
            pattern.expand_segments(&tree)[0],
            vec![
                Segment::Key("c1".into()),
                Segment::Key("stores".into()),
                Segment::Key("user.profile".into()),
            ]
        );
        assert_eq!(
            pattern.expand(&tree),
            vec![r"c1.stores.user\.profile", r"c1.stores.a\[0\]"]
        );
        // The rendered form is itself a valid literal filter.
        assert_eq!(
            expand(r"c1.stores.user\.profile", &tree),
            vec![r"c1.stores.user\.profile"]
        );
    }

    #[test]
    fn escaped_star_is_a_literal() {
        let tree = json!({"*": {"x": 1}, "b": {"y": 2}});
        let pattern = FilterPattern::parse(r"\*.*");
        assert!(pattern.has_wildcard());
        assert_eq!(pattern.expand(&tree), vec![r"\*.x"]);
    }

    #[test]
    fn strict_parse_rejects_bad_brackets() {
        assert!(matches!(
            FilterPattern::parse_strict("*.items[x]"),
            Err(PathError::InvalidIndex { .. })
        ));
        assert!(FilterPattern::parse_strict("*.stores.*").unwrap().has_wildcard());
        // The lossy parse keeps the bad segment as a key.
        assert_eq!(expand("items[x]", &json!({})), vec![r"items\[x\]"]);
    }

    #[test]
    fn serializes_as_plain_string() {
        let p: FilterPattern = serde_json::from_value(json!("*.stores.*")).unwrap();
        assert!(p.has_wildcard());
        assert_eq!(serde_json::to_value(&p).unwrap(), json!("*.stores.*"));
    }
}
