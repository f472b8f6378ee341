use std::sync::Arc;

use dashmap::DashMap;
use folio_core::{
    CollectionProxy, CollectionType, MemberResolver, Parameters, RecordStore, SharedStore,
};
use parking_lot::RwLock;

use crate::error::StoreError;

// ---------------------------------------------------------------------------
// StoreRegistry
// ---------------------------------------------------------------------------

/// Maps member type names to their record stores.
///
/// Implements [`MemberResolver`], so a collection type named
/// `BeerCollection` finds the store registered as `"Beer"`. Registration
/// order is remembered for [`members`](Self::members).
pub struct StoreRegistry<R> {
    by_member: DashMap<String, SharedStore<R>>,
    order: RwLock<Vec<String>>,
}

impl<R> StoreRegistry<R> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_member: DashMap::new(),
            order: RwLock::new(Vec::new()),
        }
    }

    /// Registers `store` for `member`, returning the store it replaced.
    pub fn register(&self, member: impl Into<String>, store: SharedStore<R>) -> Option<SharedStore<R>> {
        let member = member.into();
        let previous = self.by_member.insert(member.clone(), store);
        if previous.is_none() {
            self.order.write().push(member);
        } else {
            tracing::debug!(member = %member, "record store replaced");
        }
        previous
    }

    /// Registers a concrete store under `member`.
    pub fn register_store<S>(&self, member: impl Into<String>, store: Arc<S>) -> Option<SharedStore<R>>
    where
        S: RecordStore<Record = R> + 'static,
    {
        let shared: SharedStore<R> = store;
        self.register(member, shared)
    }

    #[must_use]
    pub fn get(&self, member: &str) -> Option<SharedStore<R>> {
        self.by_member.get(member).map(|entry| Arc::clone(entry.value()))
    }

    #[must_use]
    pub fn contains(&self, member: &str) -> bool {
        self.by_member.contains_key(member)
    }

    /// Registered member names in registration order.
    #[must_use]
    pub fn members(&self) -> Vec<String> {
        self.order.read().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_member.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_member.is_empty()
    }

    /// Builds an unloaded proxy for `collection`, resolving its store here.
    ///
    /// # Errors
    ///
    /// Returns `CollectionError::Configuration` if the member type is not
    /// registered or the collection type name breaks the naming convention.
    pub fn proxy(
        &self,
        collection: Arc<CollectionType>,
        params: Parameters,
    ) -> folio_core::Result<CollectionProxy<R>> {
        CollectionProxy::resolve(collection, self, params)
    }
}

impl<R> Default for StoreRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> MemberResolver<R> for StoreRegistry<R> {
    fn resolve_member_type(&self, member: &str) -> anyhow::Result<SharedStore<R>> {
        self.get(member).ok_or_else(|| {
            StoreError::UnknownMember {
                member: member.to_string(),
            }
            .into()
        })
    }
}
