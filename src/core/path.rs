//! Suffix path resolution over the state tree.
//!
//! Patterns are dotted paths, possibly partial: `"idle"`, `"b.idle"` or the
//! fully-qualified `".root.b.idle"`. A pattern is anchored to path segments by
//! prefixing it with the separator, so `"idle"` matches `.root.a.idle` but not
//! `.root.sidle`.
//!
//! Resolution is purely structural. It walks every declared node whether or
//! not it is active, and it never fails: no match is an empty result.

use super::node::StateNode;
use std::borrow::Cow;

/// Separator between path segments.
pub const SEPARATOR: char = '.';

/// Prefix `pattern` with the separator if it does not start with one.
pub fn normalize_pattern(pattern: &str) -> Cow<'_, str> {
    if pattern.starts_with(SEPARATOR) {
        Cow::Borrowed(pattern)
    } else {
        Cow::Owned(format!("{SEPARATOR}{pattern}"))
    }
}

/// Whether `path` ends with the normalized form of `pattern`.
///
/// # Example
///
/// ```rust
/// use statecraft::core::path::matches_path;
///
/// assert!(matches_path(".root.a.idle", "idle"));
/// assert!(matches_path(".root.a.idle", "a.idle"));
/// assert!(!matches_path(".root.a.sidle", "idle"));
/// ```
pub fn matches_path(path: &str, pattern: &str) -> bool {
    path.ends_with(normalize_pattern(pattern).as_ref())
}

/// Find every node under `root` whose path ends with `pattern`.
///
/// Results are in pre-order with siblings in declaration order. The search
/// includes `root` itself and ignores activity.
///
/// # Example
///
/// ```rust
/// use statecraft::builder::{Config, StateConfig};
/// use statecraft::core::path::find_matches;
/// use statecraft::engine::create_machine;
///
/// let config = Config::new(())
///     .state("a", StateConfig::new().state("idle", StateConfig::new()))
///     .state("b", StateConfig::new().state("idle", StateConfig::new()));
/// let machine = create_machine(config).unwrap();
/// let tree = machine.snapshot().state_tree().clone();
///
/// let paths: Vec<&str> = find_matches(&tree, "idle")
///     .into_iter()
///     .map(|node| node.path.as_str())
///     .collect();
/// assert_eq!(paths, vec![".root.a.idle", ".root.b.idle"]);
/// ```
pub fn find_matches<'a>(root: &'a StateNode, pattern: &str) -> Vec<&'a StateNode> {
    let pattern = normalize_pattern(pattern);
    let mut acc = Vec::new();
    collect_matches(root, &pattern, &mut acc);
    acc
}

fn collect_matches<'a>(node: &'a StateNode, pattern: &str, acc: &mut Vec<&'a StateNode>) {
    if node.path.ends_with(pattern) {
        acc.push(node);
    }
    for child in node.states.values() {
        collect_matches(child, pattern, acc);
    }
}

/// The effective target for `pattern` when several nodes match.
///
/// Ambiguous patterns resolve to the last depth-first match. Transition
/// targets in a machine's configuration are resolved with the same rule.
pub fn last_match<'a>(root: &'a StateNode, pattern: &str) -> Option<&'a StateNode> {
    find_matches(root, pattern).pop()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn node(path: &str, children: Vec<StateNode>) -> StateNode {
        let name = path.rsplit(SEPARATOR).next().unwrap_or_default().to_string();
        StateNode {
            name,
            path: path.to_string(),
            active: false,
            parallel: false,
            initial: None,
            states: children
                .into_iter()
                .map(|c| (c.name.clone(), c))
                .collect::<IndexMap<_, _>>(),
            on: IndexMap::new(),
        }
    }

    fn sample() -> StateNode {
        node(
            ".root",
            vec![
                node(".root.a", vec![node(".root.a.idle", vec![])]),
                node(".root.b", vec![node(".root.b.idle", vec![])]),
                node(".root.idle", vec![]),
            ],
        )
    }

    fn paths<'a>(nodes: &[&'a StateNode]) -> Vec<&'a str> {
        nodes.iter().map(|n| n.path.as_str()).collect()
    }

    #[test]
    fn normalize_prepends_separator_once() {
        assert_eq!(normalize_pattern("idle"), ".idle");
        assert_eq!(normalize_pattern(".idle"), ".idle");
    }

    #[test]
    fn unqualified_pattern_matches_at_any_depth_in_pre_order() {
        let root = sample();
        assert_eq!(
            paths(&find_matches(&root, "idle")),
            vec![".root.a.idle", ".root.b.idle", ".root.idle"]
        );
    }

    #[test]
    fn qualified_pattern_narrows_matches() {
        let root = sample();
        assert_eq!(paths(&find_matches(&root, "b.idle")), vec![".root.b.idle"]);
        assert_eq!(paths(&find_matches(&root, ".root.idle")), vec![".root.idle"]);
    }

    #[test]
    fn match_is_segment_anchored() {
        let root = node(".root", vec![node(".root.sidle", vec![])]);
        assert!(find_matches(&root, "idle").is_empty());
    }

    #[test]
    fn no_match_is_empty_not_error() {
        assert!(find_matches(&sample(), "missing").is_empty());
        assert!(last_match(&sample(), "missing").is_none());
    }

    #[test]
    fn last_match_picks_last_depth_first_result() {
        let root = sample();
        assert_eq!(last_match(&root, "idle").map(|n| n.path.as_str()), Some(".root.idle"));
    }

    #[test]
    fn root_matches_its_own_name() {
        let root = sample();
        assert_eq!(paths(&find_matches(&root, "root")), vec![".root"]);
    }
}
