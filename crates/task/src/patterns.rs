//! Symbolic group patterns
//!
//! Grammar of a token:
//!
//! - `*` every group
//! - `!name` exclude one literal group
//! - `/scope/` every group equal to `scope` or ending in `-scope`
//! - `!/scope/` exclude that scope
//! - anything else is a literal group name
//!
//! Literal names are passed through by [`GroupPatternMatcher::all_matches`]
//! even when the universe does not know them, since plugins may define
//! groups the catalog has not seen yet. Such names are reported with a warning.

use indexmap::IndexSet;
use tracing::warn;

/// One parsed pattern token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupToken {
    All,
    Literal(String),
    Exclude(String),
    Scope(String),
    ExcludeScope(String),
}

impl GroupToken {
    pub fn parse(token: &str) -> Self {
        if token == "*" {
            return GroupToken::All;
        }
        match token.strip_prefix('!') {
            Some(rest) => match scope_of(rest) {
                Some(scope) => GroupToken::ExcludeScope(scope.to_string()),
                None => GroupToken::Exclude(rest.to_string()),
            },
            None => match scope_of(token) {
                Some(scope) => GroupToken::Scope(scope.to_string()),
                None => GroupToken::Literal(token.to_string()),
            },
        }
    }
}

fn scope_of(token: &str) -> Option<&str> {
    token
        .strip_prefix('/')
        .and_then(|rest| rest.strip_suffix('/'))
        .filter(|scope| !scope.is_empty())
}

/// Whether `group` belongs to `scope`
pub fn in_scope(group: &str, scope: &str) -> bool {
    group == scope
        || group
            .strip_suffix(scope)
            .is_some_and(|prefix| prefix.ends_with('-'))
}

/// Outcome of expanding tokens against a universe of group names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Matched group names, first-seen order
    pub groups: IndexSet<String>,
    /// Literal names that are not part of the universe
    pub unresolved: Vec<String>,
}

/// A compiled list of group pattern tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPatternMatcher {
    tokens: Vec<GroupToken>,
}

impl GroupPatternMatcher {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(|t| GroupToken::parse(t.as_ref()))
                .collect(),
        }
    }

    pub fn tokens(&self) -> &[GroupToken] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// True when an exclusion token hits one of `groups`
    pub fn excludes<S: AsRef<str>>(&self, groups: &[S]) -> bool {
        self.tokens.iter().any(|token| match token {
            GroupToken::Exclude(name) => groups.iter().any(|g| g.as_ref() == name),
            GroupToken::ExcludeScope(scope) => groups.iter().any(|g| in_scope(g.as_ref(), scope)),
            _ => false,
        })
    }

    /// Pattern match against the active groups.
    ///
    /// Exclusions win over everything. Only `*` and scope tokens can
    /// produce a positive result; literal tokens are ignored here.
    pub fn matches<S: AsRef<str>>(&self, active: &[S]) -> bool {
        if self.excludes(active) {
            return false;
        }
        self.tokens.iter().any(|token| match token {
            GroupToken::All => !active.is_empty(),
            GroupToken::Scope(scope) => active.iter().any(|g| in_scope(g.as_ref(), scope)),
            _ => false,
        })
    }

    /// Pattern match that also accepts a literal token naming an active group
    pub fn applies<S: AsRef<str>>(&self, active: &[S]) -> bool {
        if self.excludes(active) {
            return false;
        }
        let literal_hit = self.tokens.iter().any(|token| match token {
            GroupToken::Literal(name) => active.iter().any(|g| g.as_ref() == name),
            _ => false,
        });
        literal_hit || self.matches(active)
    }

    /// Expand the tokens against `universe`
    pub fn resolve<S: AsRef<str>>(&self, universe: &[S]) -> Resolution {
        let mut resolution = Resolution::default();

        for token in &self.tokens {
            match token {
                GroupToken::All => {
                    for group in universe {
                        resolution.groups.insert(group.as_ref().to_string());
                    }
                }
                GroupToken::Scope(scope) => {
                    for group in universe.iter().filter(|g| in_scope(g.as_ref(), scope)) {
                        resolution.groups.insert(group.as_ref().to_string());
                    }
                }
                GroupToken::Literal(name) => {
                    if !universe.iter().any(|g| g.as_ref() == name) {
                        resolution.unresolved.push(name.clone());
                    }
                    resolution.groups.insert(name.clone());
                }
                GroupToken::Exclude(_) | GroupToken::ExcludeScope(_) => {}
            }
        }

        resolution.groups.retain(|group| {
            !self.tokens.iter().any(|token| match token {
                GroupToken::Exclude(name) => group == name,
                GroupToken::ExcludeScope(scope) => in_scope(group, scope),
                _ => false,
            })
        });
        resolution
    }

    /// Ordered, de-duplicated set of group names selected by the tokens
    pub fn all_matches<S: AsRef<str>>(&self, universe: &[S]) -> IndexSet<String> {
        let resolution = self.resolve(universe);
        for name in &resolution.unresolved {
            warn!(group = %name, "group name is not known to the catalog, passing it through");
        }
        resolution.groups
    }
}

/// `match(tokens, activeGroups)`
pub fn matches<T, S>(tokens: &[T], active: &[S]) -> bool
where
    T: AsRef<str>,
    S: AsRef<str>,
{
    GroupPatternMatcher::new(tokens).matches(active)
}

/// `allMatches(tokens, universe)`
pub fn all_matches<T, S>(tokens: &[T], universe: &[S]) -> IndexSet<String>
where
    T: AsRef<str>,
    S: AsRef<str>,
{
    GroupPatternMatcher::new(tokens).all_matches(universe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn names(set: IndexSet<String>) -> Vec<String> {
        set.into_iter().collect()
    }

    #[rstest]
    #[case("*", GroupToken::All)]
    #[case("!compute", GroupToken::Exclude("compute".into()))]
    #[case("/controller/", GroupToken::Scope("controller".into()))]
    #[case("!/mongo/", GroupToken::ExcludeScope("mongo".into()))]
    #[case("cinder", GroupToken::Literal("cinder".into()))]
    #[case("//", GroupToken::Literal("//".into()))]
    fn test_parse(#[case] raw: &str, #[case] expected: GroupToken) {
        assert_eq!(GroupToken::parse(raw), expected);
    }

    #[rstest]
    #[case("controller", "controller", true)]
    #[case("primary-controller", "controller", true)]
    #[case("leader-scope", "scope", true)]
    #[case("controllers", "controller", false)]
    #[case("primarycontroller", "controller", false)]
    #[case("controller-primary", "controller", false)]
    fn test_in_scope(#[case] group: &str, #[case] scope: &str, #[case] expected: bool) {
        assert_eq!(in_scope(group, scope), expected);
    }

    #[rstest]
    #[case(&["*"], &["a"], true)]
    #[case(&["*", "!x"], &["x"], false)]
    #[case(&["*", "!x"], &["x", "y"], false)]
    #[case(&["/scope/"], &["leader-scope"], true)]
    #[case(&["/scope/", "!/scope/"], &["leader-scope"], false)]
    #[case(&["controller"], &["controller"], false)]
    #[case(&["/compute/"], &["controller"], false)]
    fn test_matches(#[case] tokens: &[&str], #[case] active: &[&str], #[case] expected: bool) {
        assert_eq!(matches(tokens, active), expected);
    }

    #[test]
    fn test_all_on_empty_active_set() {
        let active: [&str; 0] = [];
        assert!(!matches(&["*"], &active));
    }

    #[test]
    fn test_applies_accepts_literals() {
        let matcher = GroupPatternMatcher::new(["controller"]);
        assert!(matcher.applies(&["controller"]));
        assert!(!matcher.applies(&["compute"]));

        let matcher = GroupPatternMatcher::new(["controller", "!controller"]);
        assert!(!matcher.applies(&["controller"]));
    }

    #[test]
    fn test_all_matches_excludes_literal() {
        assert_eq!(names(all_matches(&["*", "!b"], &["a", "b"])), vec!["a"]);
    }

    #[test]
    fn test_all_matches_excludes_compute() {
        assert_eq!(
            names(all_matches(&["*", "!compute"], &["primary-mongo", "mongo", "compute"])),
            vec!["primary-mongo", "mongo"]
        );
    }

    #[test]
    fn test_all_matches_scope_and_exclude_scope() {
        let universe = ["primary-controller", "controller", "compute", "primary-mongo"];
        assert_eq!(
            names(all_matches(&["/controller/"], &universe)),
            vec!["primary-controller", "controller"]
        );
        assert_eq!(
            names(all_matches(&["*", "!/controller/"], &universe)),
            vec!["compute", "primary-mongo"]
        );
    }

    #[test]
    fn test_literal_passes_through_and_is_reported() {
        let matcher = GroupPatternMatcher::new(["plugin-role", "compute"]);
        let resolution = matcher.resolve(&["compute"]);

        assert_eq!(names(resolution.groups), vec!["plugin-role", "compute"]);
        assert_eq!(resolution.unresolved, vec!["plugin-role"]);
    }

    #[test]
    fn test_all_matches_deduplicates_in_first_seen_order() {
        let universe = ["b", "a-x", "x"];
        assert_eq!(
            names(all_matches(&["x", "*", "/x/"], &universe)),
            vec!["x", "b", "a-x"]
        );
    }

    proptest! {
        #[test]
        fn prop_wildcard_matches_any_non_empty_set(groups in prop::collection::vec("[a-z]{1,8}", 1..6)) {
            prop_assert!(matches(&["*"], &groups));
        }

        #[test]
        fn prop_excluded_name_never_returned(
            groups in prop::collection::vec("[a-z]{1,6}", 1..8),
            pick in 0usize..8,
        ) {
            let excluded = groups[pick % groups.len()].clone();
            let tokens = vec!["*".to_string(), format!("!{excluded}")];
            let result = all_matches(&tokens, &groups);
            prop_assert!(!result.contains(&excluded));
            prop_assert!(result.iter().all(|g| groups.contains(g)));
        }
    }
}
