//! The lazy collection proxy.
//!
//! A [`CollectionProxy`] starts `Unloaded`: it holds parameters, pagination
//! state and instance scope overrides, and has asked the record store nothing.
//! The first operation that needs rows (`load`, `length`, iteration, the
//! sequence capabilities) issues one fetch and moves the proxy to `Loaded`.
//! Operations that only need a count (`size`, `is_empty`, `total_entries`)
//! issue at most one count, and skip it entirely when the total can be read
//! off an already-loaded page.
//!
//! Once loaded, every scope mutator fails with
//! [`CollectionError::AlreadyLoaded`]. The non-mutating variants (`order_by`,
//! `include`, `condition`, `page`) always succeed because they derive a fresh,
//! unloaded proxy that shares no cache with its origin.
//!
//! # Threading
//!
//! Caches live in [`OnceCell`]s: a proxy may move between threads but is not
//! `Sync`. Independent proxies never share mutable state.

use std::cell::OnceCell;
use std::fmt;
use std::sync::Arc;

use crate::collection::CollectionType;
use crate::error::{CollectionError, Result};
use crate::options::{Condition, QueryOptions};
use crate::pagination::PaginationState;
use crate::params::Parameters;
use crate::scope::{QueryKind, ScopeContext, ScopeOverrides};
use crate::traits::{MemberResolver, SharedStore};

/// Lazy, memoizing handle over the records of one collection query.
pub struct CollectionProxy<R> {
    collection: Arc<CollectionType>,
    store: SharedStore<R>,
    params: Parameters,
    pagination: PaginationState,
    overrides: ScopeOverrides,
    rows: OnceCell<Vec<R>>,
    total_entries: OnceCell<u64>,
}

impl<R> CollectionProxy<R> {
    /// Creates an unloaded proxy.
    ///
    /// The presence of the page key makes the proxy paginated (a null page
    /// means page 1). The page size is taken from the parameters, then the
    /// store's model-level page size, then the collection type, then the
    /// configured default.
    #[must_use]
    pub fn new(collection: Arc<CollectionType>, store: SharedStore<R>, params: Parameters) -> Self {
        let config = collection.config();
        let current_page = params.page_number(&config.page_key);
        let per_page = params
            .positive_u32(&config.per_page_key)
            .or_else(|| store.per_page())
            .or_else(|| collection.per_page())
            .unwrap_or(config.default_per_page);
        Self {
            pagination: PaginationState::new(current_page, per_page),
            collection,
            store,
            params,
            overrides: ScopeOverrides::default(),
            rows: OnceCell::new(),
            total_entries: OnceCell::new(),
        }
    }

    /// Creates an unloaded proxy whose store is located through `resolver`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::Configuration`] if the member type cannot
    /// be resolved.
    pub fn resolve(
        collection: Arc<CollectionType>,
        resolver: &dyn MemberResolver<R>,
        params: Parameters,
    ) -> Result<Self> {
        let store = collection.resolve_store(resolver)?;
        Ok(Self::new(collection, store, params))
    }

    // --- Accessors ---

    #[must_use]
    pub fn collection(&self) -> &Arc<CollectionType> {
        &self.collection
    }

    #[must_use]
    pub fn store(&self) -> &SharedStore<R> {
        &self.store
    }

    #[must_use]
    pub fn params(&self) -> &Parameters {
        &self.params
    }

    #[must_use]
    pub fn pagination(&self) -> &PaginationState {
        &self.pagination
    }

    #[must_use]
    pub fn overrides(&self) -> &ScopeOverrides {
        &self.overrides
    }

    #[must_use]
    pub fn current_page(&self) -> Option<u64> {
        self.pagination.current_page()
    }

    #[must_use]
    pub fn per_page(&self) -> u32 {
        self.pagination.per_page()
    }

    #[must_use]
    pub fn is_paginated(&self) -> bool {
        self.pagination.is_paginated()
    }

    /// Offset of the first record on the current page; `None` when unpaginated.
    #[must_use]
    pub fn offset(&self) -> Option<u64> {
        self.pagination.offset()
    }

    /// Effective order: the instance override, else the type default.
    #[must_use]
    pub fn order(&self) -> Option<&str> {
        self.context().order()
    }

    fn context(&self) -> ScopeContext<'_> {
        ScopeContext::new(&self.collection, &self.params, &self.pagination, &self.overrides)
    }

    /// Options the next fetch would be issued with.
    #[must_use]
    pub fn find_options(&self) -> QueryOptions {
        self.collection
            .scopes()
            .build_options(QueryKind::Find, &self.context())
    }

    /// Options the next count would be issued with.
    #[must_use]
    pub fn count_options(&self) -> QueryOptions {
        self.collection
            .scopes()
            .build_options(QueryKind::Count, &self.context())
    }

    // --- Load state ---

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.rows.get().is_some()
    }

    fn ensure_unloaded(&self) -> Result<()> {
        if self.is_loaded() {
            return Err(CollectionError::AlreadyLoaded);
        }
        Ok(())
    }

    /// Drops cached rows and count, returning the proxy to `Unloaded`.
    pub fn unload(&mut self) {
        self.rows.take();
        self.total_entries.take();
    }

    /// A new unloaded proxy with the same parameters, pagination and
    /// overrides, and none of this proxy's cached rows or count.
    #[must_use]
    pub fn unload_copy(&self) -> Self {
        Self {
            collection: Arc::clone(&self.collection),
            store: Arc::clone(&self.store),
            params: self.params.clone(),
            pagination: self.pagination,
            overrides: self.overrides.clone(),
            rows: OnceCell::new(),
            total_entries: OnceCell::new(),
        }
    }

    // --- Scope modifiers ---

    /// Derived proxy ordered by `order`.
    #[must_use]
    pub fn order_by(&self, order: impl Into<String>) -> Self {
        let mut derived = self.unload_copy();
        derived.overrides.set_order(order.into());
        derived
    }

    /// Replaces the fetch order of this proxy.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::AlreadyLoaded`] once rows are materialized.
    pub fn order_by_in_place(&mut self, order: impl Into<String>) -> Result<()> {
        self.ensure_unloaded()?;
        self.overrides.set_order(order.into());
        Ok(())
    }

    /// Derived proxy with extra eager-load hints.
    #[must_use]
    pub fn include<I, S>(&self, includes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut derived = self.unload_copy();
        derived
            .overrides
            .add_includes(includes.into_iter().map(Into::into));
        derived
    }

    /// Adds eager-load hints to this proxy.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::AlreadyLoaded`] once rows are materialized.
    pub fn include_in_place<I, S>(&mut self, includes: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_unloaded()?;
        self.overrides
            .add_includes(includes.into_iter().map(Into::into));
        Ok(())
    }

    /// Derived proxy narrowed by `condition`.
    #[must_use]
    pub fn condition(&self, condition: Condition) -> Self {
        let mut derived = self.unload_copy();
        derived.overrides.add_conditions([condition]);
        derived
    }

    /// Narrows this proxy by `condition`. A count memoized earlier is
    /// discarded since it no longer matches.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::AlreadyLoaded`] once rows are materialized.
    pub fn condition_in_place(&mut self, condition: Condition) -> Result<()> {
        self.ensure_unloaded()?;
        self.overrides.add_conditions([condition]);
        self.total_entries.take();
        Ok(())
    }

    /// Changes the page size of this proxy.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::AlreadyLoaded`] once rows are materialized.
    pub fn set_per_page(&mut self, per_page: u32) -> Result<()> {
        self.ensure_unloaded()?;
        self.pagination.set_per_page(per_page);
        Ok(())
    }

    // --- Pagination navigation ---

    /// Derived proxy for `page`, optionally with a different page size.
    ///
    /// The derived proxy keeps this proxy's overrides; its parameters get the
    /// new page (and page size, when given).
    #[must_use]
    pub fn page(&self, page: u64, per_page: Option<u32>) -> Self {
        let config = self.collection.config();
        let mut derived = self.unload_copy();
        derived.params = self.params.with(config.page_key.as_str(), page);
        if let Some(per_page) = per_page {
            derived.params = derived.params.with(config.per_page_key.as_str(), per_page);
            derived.pagination.set_per_page(per_page);
        }
        derived.pagination.set_current_page(Some(page));
        derived
    }

    /// Moves this proxy to `page`, optionally changing the page size.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::AlreadyLoaded`] once rows are materialized.
    pub fn page_in_place(&mut self, page: u64, per_page: Option<u32>) -> Result<()> {
        self.ensure_unloaded()?;
        if let Some(per_page) = per_page {
            self.pagination.set_per_page(per_page);
        }
        self.pagination.set_current_page(Some(page));
        Ok(())
    }

    /// This proxy if it is paginated, otherwise a derived proxy for page 1.
    #[must_use]
    pub fn paginate(self) -> Self {
        if self.is_paginated() {
            self
        } else {
            self.page(1, None)
        }
    }

    /// Forces pagination onto this proxy.
    ///
    /// Returns `Some(1)` when the proxy became paginated and `None` when it
    /// already was.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::AlreadyLoaded`] if pagination had to be
    /// forced onto a loaded proxy.
    pub fn paginate_in_place(&mut self) -> Result<Option<u64>> {
        if self.is_paginated() {
            return Ok(None);
        }
        self.page_in_place(1, None)?;
        Ok(Some(1))
    }

    #[must_use]
    pub fn previous_page(&self) -> Option<u64> {
        self.pagination.previous_page()
    }

    /// Next page number, if there is one. May issue a count.
    ///
    /// # Errors
    ///
    /// Propagates record store failures.
    pub fn next_page(&self) -> Result<Option<u64>> {
        if !self.is_paginated() {
            return Ok(None);
        }
        Ok(self.pagination.next_page(self.total_entries()?))
    }

    /// Derived proxy for the previous page, keeping the page size.
    #[must_use]
    pub fn previous_page_proxy(&self) -> Option<Self> {
        self.previous_page()
            .map(|page| self.page(page, Some(self.per_page())))
    }

    /// Derived proxy for the next page, keeping the page size. May issue a count.
    ///
    /// # Errors
    ///
    /// Propagates record store failures.
    pub fn next_page_proxy(&self) -> Result<Option<Self>> {
        Ok(self
            .next_page()?
            .map(|page| self.page(page, Some(self.per_page()))))
    }

    /// Number of pages across the whole matching set. May issue a count.
    ///
    /// # Errors
    ///
    /// Propagates record store failures.
    pub fn total_pages(&self) -> Result<u64> {
        Ok(self.pagination.total_pages(self.total_entries()?))
    }

    /// Whether the requested page lies past the last page. May issue a count.
    ///
    /// # Errors
    ///
    /// Propagates record store failures.
    pub fn is_out_of_bounds(&self) -> Result<bool> {
        if !self.is_paginated() {
            return Ok(false);
        }
        Ok(self.pagination.is_out_of_bounds(self.total_entries()?))
    }

    /// Whether this is the last page. May issue a count.
    ///
    /// # Errors
    ///
    /// Propagates record store failures.
    pub fn is_last_page(&self) -> Result<bool> {
        if !self.is_paginated() {
            return Ok(true);
        }
        Ok(self.pagination.is_last_page(self.total_entries()?))
    }

    // --- Inspection ---

    /// Number of records across all pages. Memoized.
    ///
    /// A loaded page that is provably the final one yields the total without
    /// a count query; anything else issues exactly one count.
    ///
    /// # Errors
    ///
    /// Propagates record store failures.
    pub fn total_entries(&self) -> Result<u64> {
        if let Some(total) = self.total_entries.get() {
            return Ok(*total);
        }
        let derived = self
            .rows
            .get()
            .and_then(|rows| self.pagination.total_from_loaded_page(rows.len()));
        let total = if let Some(total) = derived {
            tracing::trace!(
                collection = %self.collection.name(),
                total,
                "total entries derived from loaded page"
            );
            total
        } else {
            self.load_count()?
        };
        Ok(*self.total_entries.get_or_init(|| total))
    }

    fn load_count(&self) -> Result<u64> {
        let options = self.count_options();
        tracing::debug!(
            collection = %self.collection.name(),
            ?options,
            "issuing count query"
        );
        Ok(self.store.count(&options)?)
    }

    /// Number of records in this collection as limited by pagination.
    ///
    /// Loaded proxies report their measured length. Unloaded proxies compute
    /// it from the total, which costs at most one count and never a fetch.
    ///
    /// # Errors
    ///
    /// Propagates record store failures.
    pub fn size(&self) -> Result<u64> {
        if let Some(rows) = self.rows.get() {
            return Ok(rows.len() as u64);
        }
        Ok(self.pagination.expected_size(self.total_entries()?))
    }

    /// Whether [`size`](Self::size) is zero. Does not force a fetch.
    ///
    /// # Errors
    ///
    /// Propagates record store failures.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.size()? == 0)
    }

    /// Number of loaded records. Always materializes.
    ///
    /// # Errors
    ///
    /// Propagates record store failures.
    pub fn length(&self) -> Result<usize> {
        Ok(self.load()?.len())
    }

    // --- Materialization ---

    /// Fetches the rows on first call; later calls return the cached rows.
    ///
    /// # Errors
    ///
    /// Propagates record store failures. A failed fetch leaves the proxy unloaded.
    pub fn load(&self) -> Result<&[R]> {
        if let Some(rows) = self.rows.get() {
            return Ok(rows);
        }
        let options = self.find_options();
        tracing::debug!(
            collection = %self.collection.name(),
            ?options,
            "issuing fetch query"
        );
        let rows = self.store.fetch(&options)?;
        Ok(self.rows.get_or_init(|| rows))
    }

    /// Forces the fetch. Alias of [`load`](Self::load).
    ///
    /// # Errors
    ///
    /// Propagates record store failures.
    pub fn materialize(&self) -> Result<&[R]> {
        self.load()
    }

    /// The materialized rows.
    ///
    /// # Errors
    ///
    /// Propagates record store failures.
    pub fn rows(&self) -> Result<&[R]> {
        self.load()
    }

    /// The materialized rows.
    ///
    /// # Errors
    ///
    /// Propagates record store failures.
    pub fn all(&self) -> Result<&[R]> {
        self.load()
    }

    /// Iterates the rows, materializing them first. Restartable: every call
    /// walks the same cached rows.
    ///
    /// # Errors
    ///
    /// Propagates record store failures.
    pub fn iter(&self) -> Result<std::slice::Iter<'_, R>> {
        Ok(self.load()?.iter())
    }

    /// Consumes the proxy, returning its rows.
    ///
    /// # Errors
    ///
    /// Propagates record store failures.
    pub fn into_rows(self) -> Result<Vec<R>> {
        self.load()?;
        Ok(self.rows.into_inner().unwrap_or_default())
    }
}

impl<R> fmt::Debug for CollectionProxy<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionProxy")
            .field("collection", &self.collection.name())
            .field("params", &self.params)
            .field("pagination", &self.pagination)
            .field("overrides", &self.overrides)
            .field("loaded_rows", &self.rows.get().map(Vec::len))
            .field("total_entries", &self.total_entries.get())
            .finish_non_exhaustive()
    }
}
