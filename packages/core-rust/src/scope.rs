//! Scope rules, scope sets, and the options builder.
//!
//! A [`ScopeRule`] is a named contributor to query options. Rules are declared
//! on a [`CollectionType`](crate::CollectionType) and gathered into a
//! [`ScopeSet`] once, when the type is built: inherited rules first, then the
//! type's own rules, each in declaration order. Redeclaring a rule (same kind
//! and name) replaces its body but keeps its position, so a derived type can
//! override an inherited rule. Built-in rules live in their own namespace and
//! are never replaced by declared ones. The set is immutable afterwards and
//! shared by every proxy of the type.
//!
//! Building options for a query evaluates the effective rules against a
//! [`ScopeContext`] (a read-only view of one proxy), folds the fragments with
//! the per-key policy in [`crate::options`], and finally applies the proxy's
//! instance overrides so they always have the last word.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::collection::CollectionType;
use crate::options::{Condition, OptionsFragment, QueryOptions};
use crate::pagination::PaginationState;
use crate::params::Parameters;

/// Which queries a rule contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// Both fetch and count.
    Shared,
    /// Fetch only.
    Find,
    /// Count only.
    Count,
}

impl ScopeKind {
    fn applies_to(self, query: QueryKind) -> bool {
        match self {
            Self::Shared => true,
            Self::Find => query == QueryKind::Find,
            Self::Count => query == QueryKind::Count,
        }
    }
}

/// The two queries a proxy can issue against its record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Find,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleOrigin {
    Declared,
    Builtin,
    Pagination,
}

impl RuleOrigin {
    fn is_builtin(self) -> bool {
        self != Self::Declared
    }
}

/// Signature of a scope rule body.
pub type ScopeFn = dyn Fn(&ScopeContext<'_>) -> Option<OptionsFragment> + Send + Sync;

// ---------------------------------------------------------------------------
// ScopeRule
// ---------------------------------------------------------------------------

/// Immutable named modifier that contributes an options fragment, or declines.
#[derive(Clone)]
pub struct ScopeRule {
    kind: ScopeKind,
    name: Cow<'static, str>,
    origin: RuleOrigin,
    body: Arc<ScopeFn>,
}

impl ScopeRule {
    /// Creates a rule. `name` is the rule's identity within its kind.
    pub fn new<F>(kind: ScopeKind, name: impl Into<Cow<'static, str>>, body: F) -> Self
    where
        F: Fn(&ScopeContext<'_>) -> Option<OptionsFragment> + Send + Sync + 'static,
    {
        Self {
            kind,
            name: name.into(),
            origin: RuleOrigin::Declared,
            body: Arc::new(body),
        }
    }

    /// A built-in rule; shares no identity with declared rules of the same name.
    pub(crate) fn builtin<F>(kind: ScopeKind, name: &'static str, body: F) -> Self
    where
        F: Fn(&ScopeContext<'_>) -> Option<OptionsFragment> + Send + Sync + 'static,
    {
        Self {
            kind,
            name: Cow::Borrowed(name),
            origin: RuleOrigin::Builtin,
            body: Arc::new(body),
        }
    }

    /// The built-in rule supplying `offset`/`limit` for paginated fetches.
    pub(crate) fn pagination() -> Self {
        Self {
            kind: ScopeKind::Find,
            name: Cow::Borrowed("pagination"),
            origin: RuleOrigin::Pagination,
            body: Arc::new(|ctx: &ScopeContext<'_>| ctx.pagination().find_fragment()),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluates the rule; empty fragments count as declining.
    #[must_use]
    pub fn evaluate(&self, ctx: &ScopeContext<'_>) -> Option<OptionsFragment> {
        (self.body)(ctx).filter(|fragment| !fragment.is_empty())
    }

    /// Whether the rule is one of the built-ins every root type carries.
    #[must_use]
    pub fn is_builtin(&self) -> bool {
        self.origin.is_builtin()
    }

    fn same_identity(&self, other: &Self) -> bool {
        self.origin.is_builtin() == other.origin.is_builtin()
            && self.kind == other.kind
            && self.name == other.name
    }
}

impl fmt::Debug for ScopeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeRule")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("builtin", &self.is_builtin())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ScopeSet
// ---------------------------------------------------------------------------

/// Accumulator used while a collection type is being declared.
#[derive(Debug, Clone, Default)]
pub struct ScopeSetBuilder {
    rules: Vec<ScopeRule>,
}

impl ScopeSetBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from a parent's rules so they precede any rule registered here.
    #[must_use]
    pub fn inherit(parent: &ScopeSet) -> Self {
        Self {
            rules: parent.rules.to_vec(),
        }
    }

    /// Appends a rule, or replaces the body of an earlier rule with the same
    /// kind and name in place. Returns `true` if the rule was new.
    pub fn register(&mut self, rule: ScopeRule) -> bool {
        match self.rules.iter().position(|existing| existing.same_identity(&rule)) {
            Some(index) => {
                tracing::warn!(
                    rule = %rule.name,
                    kind = ?rule.kind,
                    "scope rule redeclared; replacing earlier body"
                );
                self.rules[index] = rule;
                false
            }
            None => {
                self.rules.push(rule);
                true
            }
        }
    }

    /// Freezes the rules and precomputes the effective list per query kind.
    #[must_use]
    pub fn build(self) -> ScopeSet {
        let effective = |query: QueryKind| -> Arc<[ScopeRule]> {
            // Shared rules come first, then the kind-specific ones.
            self.rules
                .iter()
                .filter(|rule| rule.kind == ScopeKind::Shared)
                .chain(
                    self.rules
                        .iter()
                        .filter(|rule| rule.kind != ScopeKind::Shared && rule.kind.applies_to(query)),
                )
                .cloned()
                .collect()
        };
        let find = effective(QueryKind::Find);
        let count = effective(QueryKind::Count);
        ScopeSet {
            rules: self.rules.into(),
            find,
            count,
        }
    }
}

/// Immutable, ordered rule registry of one collection type.
#[derive(Debug, Clone)]
pub struct ScopeSet {
    rules: Arc<[ScopeRule]>,
    find: Arc<[ScopeRule]>,
    count: Arc<[ScopeRule]>,
}

impl ScopeSet {
    /// All rules in declaration order (inherited first).
    #[must_use]
    pub fn rules(&self) -> &[ScopeRule] {
        &self.rules
    }

    /// Rules evaluated for `kind`: shared rules, then kind-specific rules.
    #[must_use]
    pub fn effective_rules(&self, kind: QueryKind) -> &[ScopeRule] {
        match kind {
            QueryKind::Find => &self.find,
            QueryKind::Count => &self.count,
        }
    }

    /// Builds the options bundle for `kind`. Pure for a fixed context.
    #[must_use]
    pub fn build_options(&self, kind: QueryKind, ctx: &ScopeContext<'_>) -> QueryOptions {
        let mut options = QueryOptions::default();
        for rule in self.effective_rules(kind) {
            let Some(fragment) = rule.evaluate(ctx) else {
                continue;
            };
            if options.absorb(fragment, rule.origin == RuleOrigin::Pagination) {
                tracing::warn!(
                    collection = %ctx.collection_name(),
                    rule = %rule.name,
                    "offset/limit supplied outside the pagination rule; ignored"
                );
            }
        }
        ctx.overrides().apply(kind, &mut options);
        options
    }
}

// ---------------------------------------------------------------------------
// ScopeOverrides
// ---------------------------------------------------------------------------

/// Instance-level scope changes applied to one proxy before it loads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeOverrides {
    order: Option<String>,
    includes: Vec<String>,
    conditions: Vec<Condition>,
}

impl ScopeOverrides {
    #[must_use]
    pub fn order(&self) -> Option<&str> {
        self.order.as_deref()
    }

    #[must_use]
    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub(crate) fn set_order(&mut self, order: String) {
        self.order = Some(order);
    }

    pub(crate) fn add_includes<I: IntoIterator<Item = String>>(&mut self, includes: I) {
        for hint in includes {
            if !self.includes.contains(&hint) {
                self.includes.push(hint);
            }
        }
    }

    pub(crate) fn add_conditions<I: IntoIterator<Item = Condition>>(&mut self, conditions: I) {
        for condition in conditions {
            if !self.conditions.contains(&condition) {
                self.conditions.push(condition);
            }
        }
    }

    /// Conditions narrow both queries so counts stay consistent with fetches;
    /// order and eager-load hints only matter when fetching.
    fn apply(&self, kind: QueryKind, options: &mut QueryOptions) {
        if kind == QueryKind::Find {
            options.merge_order(self.order.clone());
            options.merge_include(self.includes.iter().cloned());
        }
        options.merge_conditions(self.conditions.iter().cloned());
    }
}

// ---------------------------------------------------------------------------
// ScopeContext
// ---------------------------------------------------------------------------

/// Read-only view of a proxy handed to scope rules.
#[derive(Debug, Clone, Copy)]
pub struct ScopeContext<'a> {
    collection: &'a CollectionType,
    params: &'a Parameters,
    pagination: &'a PaginationState,
    overrides: &'a ScopeOverrides,
}

impl<'a> ScopeContext<'a> {
    pub(crate) fn new(
        collection: &'a CollectionType,
        params: &'a Parameters,
        pagination: &'a PaginationState,
        overrides: &'a ScopeOverrides,
    ) -> Self {
        Self {
            collection,
            params,
            pagination,
            overrides,
        }
    }

    #[must_use]
    pub fn collection(&self) -> &'a CollectionType {
        self.collection
    }

    #[must_use]
    pub fn collection_name(&self) -> &'a str {
        self.collection.name()
    }

    #[must_use]
    pub fn params(&self) -> &'a Parameters {
        self.params
    }

    #[must_use]
    pub fn pagination(&self) -> &'a PaginationState {
        self.pagination
    }

    #[must_use]
    pub fn overrides(&self) -> &'a ScopeOverrides {
        self.overrides
    }

    /// Effective order: the instance override, else the type default.
    #[must_use]
    pub fn order(&self) -> Option<&'a str> {
        self.overrides
            .order()
            .or_else(|| self.collection.default_order())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::collection::CollectionType;

    fn options_for(
        collection: &CollectionType,
        params: &Parameters,
        pagination: PaginationState,
        overrides: &ScopeOverrides,
        kind: QueryKind,
    ) -> QueryOptions {
        let ctx = ScopeContext::new(collection, params, &pagination, overrides);
        collection.scopes().build_options(kind, &ctx)
    }

    #[test]
    fn root_type_contributes_nothing_by_default() {
        let beers = CollectionType::builder("BeerCollection").build();
        let options = options_for(
            &beers,
            &Parameters::new(),
            PaginationState::new(None, 30),
            &ScopeOverrides::default(),
            QueryKind::Find,
        );
        assert!(options.is_empty());
    }

    #[test]
    fn inherited_rules_precede_own_rules() {
        let parent = CollectionType::builder("BeerCollection")
            .find_scope("parent_rule", |_| None)
            .build();
        let child = parent
            .extend("StoutCollection")
            .find_scope("child_rule", |_| None)
            .build();
        let names: Vec<&str> = child.scopes().rules().iter().map(ScopeRule::name).collect();
        let parent_pos = names.iter().position(|n| *n == "parent_rule").unwrap();
        let child_pos = names.iter().position(|n| *n == "child_rule").unwrap();
        assert!(parent_pos < child_pos);
    }

    fn find_order(collection: &CollectionType) -> Option<String> {
        options_for(
            collection,
            &Parameters::new(),
            PaginationState::new(None, 30),
            &ScopeOverrides::default(),
            QueryKind::Find,
        )
        .order
    }

    #[test]
    fn redeclared_rule_replaces_body_by_identity() {
        let mut builder = ScopeSetBuilder::new();
        assert!(builder.register(ScopeRule::new(ScopeKind::Find, "awesome", |_| None)));
        assert!(!builder.register(ScopeRule::new(ScopeKind::Find, "awesome", |_| {
            Some(OptionsFragment::new().order("abv DESC"))
        })));
        assert!(builder.register(ScopeRule::new(ScopeKind::Count, "awesome", |_| None)));
        let set = builder.build();
        assert_eq!(set.rules().len(), 2);
        assert_eq!(set.rules()[0].kind(), ScopeKind::Find);
    }

    #[test]
    fn derived_declaration_overrides_inherited_rule() {
        let parent = CollectionType::builder("BeerCollection")
            .find_scope("awesome", |_| Some(OptionsFragment::new().order("parent")))
            .find_scope("later", |_| None)
            .build();
        let child = parent
            .extend("StoutCollection")
            .find_scope("awesome", |_| Some(OptionsFragment::new().order("child")))
            .build();

        assert_eq!(find_order(&parent).as_deref(), Some("parent"));
        assert_eq!(find_order(&child).as_deref(), Some("child"));

        let names: Vec<&str> = child.scopes().rules().iter().map(ScopeRule::name).collect();
        assert_eq!(names.iter().filter(|n| **n == "awesome").count(), 1);
        let awesome = names.iter().position(|n| *n == "awesome").unwrap();
        let later = names.iter().position(|n| *n == "later").unwrap();
        assert!(awesome < later);
    }

    #[test]
    fn declared_rules_cannot_displace_builtins() {
        let beers = CollectionType::builder("BeerCollection")
            .order_by("name")
            .find_scope("pagination", |_| Some(OptionsFragment::new().include(["brewery"])))
            .find_scope("default_order", |_| Some(OptionsFragment::new().order("abv")))
            .build();
        let builtins = beers.scopes().rules().iter().filter(|r| r.is_builtin()).count();
        assert_eq!(builtins, 4);

        let options = options_for(
            &beers,
            &Parameters::new(),
            PaginationState::new(Some(2), 5),
            &ScopeOverrides::default(),
            QueryKind::Find,
        );
        assert_eq!((options.offset, options.limit), (Some(5), Some(5)));
        assert_eq!(options.include, vec!["brewery"]);
        assert_eq!(options.order.as_deref(), Some("abv"));
    }

    #[test]
    fn shared_rules_apply_to_both_queries_first() {
        let mut builder = ScopeSetBuilder::new();
        builder.register(ScopeRule::new(ScopeKind::Find, "f", |_| None));
        builder.register(ScopeRule::new(ScopeKind::Shared, "s", |_| None));
        builder.register(ScopeRule::new(ScopeKind::Count, "c", |_| None));
        let set = builder.build();
        let find: Vec<&str> = set.effective_rules(QueryKind::Find).iter().map(ScopeRule::name).collect();
        let count: Vec<&str> = set.effective_rules(QueryKind::Count).iter().map(ScopeRule::name).collect();
        assert_eq!(find, vec!["s", "f"]);
        assert_eq!(count, vec!["s", "c"]);
    }

    #[test]
    fn declared_includes_then_instance_includes() {
        let beers = CollectionType::builder("BeerCollection").includes(["brewery"]).build();
        let mut overrides = ScopeOverrides::default();
        overrides.add_includes(["tags".to_string(), "brewery".to_string()]);
        let options = options_for(
            &beers,
            &Parameters::new(),
            PaginationState::new(None, 30),
            &overrides,
            QueryKind::Find,
        );
        assert_eq!(options.include, vec!["brewery", "tags"]);
    }

    #[test]
    fn instance_order_replaces_declared_order() {
        let beers = CollectionType::builder("BeerCollection")
            .order_by("name")
            .find_scope("late_order", |_| Some(OptionsFragment::new().order("abv")))
            .build();
        let mut overrides = ScopeOverrides::default();
        let declared = options_for(
            &beers,
            &Parameters::new(),
            PaginationState::new(None, 30),
            &overrides,
            QueryKind::Find,
        );
        assert_eq!(declared.order.as_deref(), Some("abv"));

        overrides.set_order("id DESC".to_string());
        let options = options_for(
            &beers,
            &Parameters::new(),
            PaginationState::new(None, 30),
            &overrides,
            QueryKind::Find,
        );
        assert_eq!(options.order.as_deref(), Some("id DESC"));
    }

    #[test]
    fn count_options_skip_order_includes_and_window() {
        let beers = CollectionType::builder("BeerCollection")
            .order_by("name")
            .includes(["brewery"])
            .condition(Condition::eq("style", "stout"))
            .build();
        let options = options_for(
            &beers,
            &Parameters::new(),
            PaginationState::new(Some(2), 10),
            &ScopeOverrides::default(),
            QueryKind::Count,
        );
        assert_eq!(options.order, None);
        assert!(options.include.is_empty());
        assert_eq!((options.offset, options.limit), (None, None));
        assert_eq!(options.conditions, vec![Condition::eq("style", "stout")]);
    }

    #[test]
    fn only_pagination_rule_sets_window() {
        let beers = CollectionType::builder("BeerCollection")
            .find_scope("sneaky", |_| Some(OptionsFragment::new().window(100, 1).order("x")))
            .build();
        let unpaginated = options_for(
            &beers,
            &Parameters::new(),
            PaginationState::new(None, 30),
            &ScopeOverrides::default(),
            QueryKind::Find,
        );
        assert_eq!((unpaginated.offset, unpaginated.limit), (None, None));
        assert_eq!(unpaginated.order.as_deref(), Some("x"));

        let paged = options_for(
            &beers,
            &Parameters::new(),
            PaginationState::new(Some(3), 2),
            &ScopeOverrides::default(),
            QueryKind::Find,
        );
        assert_eq!((paged.offset, paged.limit), (Some(4), Some(2)));
    }

    #[test]
    fn rules_see_the_instance_parameters() {
        let beers = CollectionType::builder("BeerCollection")
            .scope("search", |ctx| {
                let query = ctx.params().get("q")?.as_str()?;
                Some(OptionsFragment::new().condition(Condition::eq("name", query)))
            })
            .build();
        let params = Parameters::new().with("q", "Porter");
        let options = options_for(
            &beers,
            &params,
            PaginationState::new(None, 30),
            &ScopeOverrides::default(),
            QueryKind::Count,
        );
        assert_eq!(options.conditions, vec![Condition::eq("name", json!("Porter"))]);
    }

    #[test]
    fn build_options_is_repeatable() {
        let beers = CollectionType::builder("BeerCollection")
            .order_by("name")
            .includes(["brewery"])
            .build();
        let params = Parameters::new();
        let pagination = PaginationState::new(Some(1), 5);
        let overrides = ScopeOverrides::default();
        let first = options_for(&beers, &params, pagination, &overrides, QueryKind::Find);
        let second = options_for(&beers, &params, pagination, &overrides, QueryKind::Find);
        assert_eq!(first, second);
    }

    mod merge_laws {
        use proptest::prelude::*;

        use super::options_for;
        use crate::collection::CollectionType;
        use crate::options::OptionsFragment;
        use crate::pagination::PaginationState;
        use crate::params::Parameters;
        use crate::scope::{QueryKind, ScopeOverrides};

        fn hint_batches() -> impl Strategy<Value = Vec<Vec<String>>> {
            prop::collection::vec(prop::collection::vec("[a-e]", 0..4), 0..4)
        }

        fn first_seen_union(batches: &[Vec<String>]) -> Vec<String> {
            let mut union: Vec<String> = Vec::new();
            for hint in batches.iter().flatten() {
                if !union.contains(hint) {
                    union.push(hint.clone());
                }
            }
            union
        }

        proptest! {
            #[test]
            fn include_is_first_seen_union(
                parent in hint_batches(),
                child in hint_batches(),
                instance in hint_batches()
            ) {
                let mut builder = CollectionType::builder("BeerCollection");
                for batch in &parent {
                    builder = builder.includes(batch.clone());
                }
                let mut derived = builder.build().extend("StoutCollection");
                for batch in &child {
                    derived = derived.includes(batch.clone());
                }
                let stouts = derived.build();

                let mut overrides = ScopeOverrides::default();
                for batch in &instance {
                    overrides.add_includes(batch.clone());
                }
                let options = options_for(
                    &stouts,
                    &Parameters::new(),
                    PaginationState::new(None, 30),
                    &overrides,
                    QueryKind::Find,
                );

                let all: Vec<Vec<String>> = parent.into_iter().chain(child).chain(instance).collect();
                prop_assert_eq!(options.include, first_seen_union(&all));
            }

            #[test]
            fn last_non_blank_order_wins(
                default in prop::option::of("[a-c]"),
                declared in prop::collection::vec(prop::option::of("[a-c]( DESC)?| *"), 0..6),
                instance in prop::option::of("[x-z]")
            ) {
                let mut builder = CollectionType::builder("BeerCollection");
                if let Some(order) = &default {
                    builder = builder.order_by(order.clone());
                }
                for (i, order) in declared.iter().enumerate() {
                    let order = order.clone();
                    builder = builder.find_scope(format!("order_{i}"), move |_| {
                        order.clone().map(|o| OptionsFragment::new().order(o))
                    });
                }
                let beers = builder.build();

                let mut overrides = ScopeOverrides::default();
                if let Some(order) = &instance {
                    overrides.set_order(order.clone());
                }
                let options = options_for(
                    &beers,
                    &Parameters::new(),
                    PaginationState::new(None, 30),
                    &overrides,
                    QueryKind::Find,
                );

                let expected = instance.or_else(|| {
                    std::iter::once(default)
                        .chain(declared)
                        .flatten()
                        .filter(|o| !o.trim().is_empty())
                        .last()
                });
                prop_assert_eq!(options.order, expected);
            }
        }
    }
}
