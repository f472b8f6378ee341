//! Collection type descriptors.
//!
//! A [`CollectionType`] is the static description of a kind of collection:
//! its name, the member type it holds, class-level defaults (order, eager-load
//! hints, conditions, page size) and its [`ScopeSet`]. It is declared once
//! through [`CollectionTypeBuilder`], frozen into an `Arc`, and shared by
//! every proxy of that type.
//!
//! Inheritance is resolved at declaration time: [`CollectionType::extend`]
//! seeds a builder with the parent's defaults and rules, so nothing is looked
//! up along a type chain when a query is built.

use std::borrow::Cow;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::config::CollectionConfig;
use crate::error::{CollectionError, Result};
use crate::options::{Condition, OptionsFragment};
use crate::scope::{ScopeContext, ScopeKind, ScopeRule, ScopeSet, ScopeSetBuilder};
use crate::traits::{MemberResolver, SharedStore};

/// Human-readable form of the member naming convention.
pub const MEMBER_CONVENTION: &str = "<Member>Collection";

static MEMBER_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<member>(?:[A-Za-z_][A-Za-z0-9_]*::)*[A-Za-z_][A-Za-z0-9_]*?)Collection$")
        .expect("member naming regex is valid")
});

/// Static description of a collection type.
#[derive(Debug)]
pub struct CollectionType {
    name: String,
    model: Option<String>,
    default_order: Option<String>,
    default_includes: Vec<String>,
    default_conditions: Vec<Condition>,
    per_page: Option<u32>,
    config: CollectionConfig,
    scopes: ScopeSet,
}

impl CollectionType {
    /// Starts declaring a root collection type.
    ///
    /// Root types carry the built-in rules for class-level conditions,
    /// order, eager-load hints and pagination.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> CollectionTypeBuilder {
        let mut scopes = ScopeSetBuilder::new();
        scopes.register(ScopeRule::builtin(
            ScopeKind::Shared,
            "default_conditions",
            |ctx: &ScopeContext<'_>| {
                let conditions = ctx.collection().default_conditions();
                (!conditions.is_empty()).then(|| OptionsFragment {
                    conditions: conditions.to_vec(),
                    ..OptionsFragment::default()
                })
            },
        ));
        scopes.register(ScopeRule::builtin(
            ScopeKind::Find,
            "default_order",
            |ctx: &ScopeContext<'_>| {
                ctx.collection()
                    .default_order()
                    .map(|order| OptionsFragment::new().order(order))
            },
        ));
        scopes.register(ScopeRule::builtin(
            ScopeKind::Find,
            "default_includes",
            |ctx: &ScopeContext<'_>| {
                let includes = ctx.collection().default_includes();
                (!includes.is_empty())
                    .then(|| OptionsFragment::new().include(includes.iter().cloned()))
            },
        ));
        scopes.register(ScopeRule::pagination());

        CollectionTypeBuilder {
            name: name.into(),
            model: None,
            default_order: None,
            default_includes: Vec::new(),
            default_conditions: Vec::new(),
            per_page: None,
            config: CollectionConfig::default(),
            scopes,
        }
    }

    /// Starts declaring a type derived from this one.
    ///
    /// The derived type inherits the member type, defaults, configuration and
    /// every scope rule; anything declared on the returned builder is layered
    /// on top.
    #[must_use]
    pub fn extend(&self, name: impl Into<String>) -> CollectionTypeBuilder {
        CollectionTypeBuilder {
            name: name.into(),
            model: self.model.clone(),
            default_order: self.default_order.clone(),
            default_includes: self.default_includes.clone(),
            default_conditions: self.default_conditions.clone(),
            per_page: self.per_page,
            config: self.config.clone(),
            scopes: ScopeSetBuilder::inherit(&self.scopes),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Explicitly declared member type, if any.
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    #[must_use]
    pub fn default_order(&self) -> Option<&str> {
        self.default_order.as_deref()
    }

    #[must_use]
    pub fn default_includes(&self) -> &[String] {
        &self.default_includes
    }

    #[must_use]
    pub fn default_conditions(&self) -> &[Condition] {
        &self.default_conditions
    }

    /// Type-level page size, if declared.
    #[must_use]
    pub fn per_page(&self) -> Option<u32> {
        self.per_page
    }

    #[must_use]
    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    #[must_use]
    pub fn scopes(&self) -> &ScopeSet {
        &self.scopes
    }

    /// Name of the member type this collection holds.
    ///
    /// The declared model wins; otherwise the type name must follow
    /// `<Member>Collection`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::Configuration`] when no model is declared
    /// and the type name does not follow the convention.
    pub fn member_type_name(&self) -> Result<String> {
        if let Some(model) = &self.model {
            return Ok(model.clone());
        }
        MEMBER_NAME
            .captures(&self.name)
            .and_then(|caps| caps.name("member"))
            .map(|member| member.as_str().to_string())
            .ok_or_else(|| CollectionError::Configuration {
                convention: MEMBER_CONVENTION.to_string(),
                identifier: self.name.clone(),
                source: anyhow::anyhow!(
                    "collection type name `{}` does not end in `Collection`",
                    self.name
                ),
            })
    }

    /// Locates the record store for this type's member type.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::Configuration`] carrying the convention that
    /// was attempted and the resolver's failure.
    pub fn resolve_store<R>(&self, resolver: &dyn MemberResolver<R>) -> Result<SharedStore<R>> {
        let member = self.member_type_name()?;
        resolver
            .resolve_member_type(&member)
            .map_err(|source| CollectionError::Configuration {
                convention: self.convention(),
                identifier: member,
                source,
            })
    }

    fn convention(&self) -> String {
        match &self.model {
            Some(model) => format!("model(\"{model}\") declared on {}", self.name),
            None => format!("{MEMBER_CONVENTION} derived from {}", self.name),
        }
    }
}

/// Declaration-time builder for a [`CollectionType`].
#[derive(Debug)]
pub struct CollectionTypeBuilder {
    name: String,
    model: Option<String>,
    default_order: Option<String>,
    default_includes: Vec<String>,
    default_conditions: Vec<Condition>,
    per_page: Option<u32>,
    config: CollectionConfig,
    scopes: ScopeSetBuilder,
}

impl CollectionTypeBuilder {
    /// Declares the member type when it cannot be derived from the type name.
    #[must_use]
    pub fn model(mut self, member: impl Into<String>) -> Self {
        self.model = Some(member.into());
        self
    }

    /// Default fetch order; replaces any inherited default.
    #[must_use]
    pub fn order_by(mut self, order: impl Into<String>) -> Self {
        self.default_order = Some(order.into());
        self
    }

    /// Adds eager-load hints after the inherited ones, skipping duplicates.
    #[must_use]
    pub fn includes<I, S>(mut self, includes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for hint in includes.into_iter().map(Into::into) {
            if !self.default_includes.contains(&hint) {
                self.default_includes.push(hint);
            }
        }
        self
    }

    /// Adds a class-level condition, ANDed into both fetch and count.
    #[must_use]
    pub fn condition(mut self, condition: Condition) -> Self {
        if !self.default_conditions.contains(&condition) {
            self.default_conditions.push(condition);
        }
        self
    }

    #[must_use]
    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = Some(per_page.max(1));
        self
    }

    #[must_use]
    pub fn config(mut self, config: CollectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Declares a rule contributing to both fetch and count.
    #[must_use]
    pub fn scope<F>(self, name: impl Into<Cow<'static, str>>, body: F) -> Self
    where
        F: Fn(&ScopeContext<'_>) -> Option<OptionsFragment> + Send + Sync + 'static,
    {
        self.rule(ScopeRule::new(ScopeKind::Shared, name, body))
    }

    /// Declares a fetch-only rule.
    #[must_use]
    pub fn find_scope<F>(self, name: impl Into<Cow<'static, str>>, body: F) -> Self
    where
        F: Fn(&ScopeContext<'_>) -> Option<OptionsFragment> + Send + Sync + 'static,
    {
        self.rule(ScopeRule::new(ScopeKind::Find, name, body))
    }

    /// Declares a count-only rule.
    ///
    /// A count rule must keep the count consistent with what a fetch returns,
    /// otherwise `size` and `is_empty` disagree with the loaded rows.
    #[must_use]
    pub fn count_scope<F>(self, name: impl Into<Cow<'static, str>>, body: F) -> Self
    where
        F: Fn(&ScopeContext<'_>) -> Option<OptionsFragment> + Send + Sync + 'static,
    {
        self.rule(ScopeRule::new(ScopeKind::Count, name, body))
    }

    /// Registers a prepared rule.
    #[must_use]
    pub fn rule(mut self, rule: ScopeRule) -> Self {
        self.scopes.register(rule);
        self
    }

    /// Freezes the declaration.
    #[must_use]
    pub fn build(self) -> Arc<CollectionType> {
        Arc::new(CollectionType {
            name: self.name,
            model: self.model,
            default_order: self.default_order,
            default_includes: self.default_includes,
            default_conditions: self.default_conditions,
            per_page: self.per_page,
            config: self.config,
            scopes: self.scopes.build(),
        })
    }
}
