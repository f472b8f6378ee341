use std::sync::Arc;

use crate::options::QueryOptions;

/// Record store collaborator: executes count and fetch queries.
///
/// Proxies call each operation at most once per distinct need and memoize the
/// result. Failures are passed through to the caller unmodified; timeouts and
/// retries are the store's business.
///
/// Used as `Arc<dyn RecordStore<Record = R>>` (see [`SharedStore`]).
pub trait RecordStore: Send + Sync {
    /// Entity produced by the store. Opaque to the proxy.
    type Record;

    /// Table (or collection) name of the member type, used when rendering.
    fn table_name(&self) -> &str;

    /// Number of records matching `options`, ignoring `offset`/`limit`.
    fn count(&self, options: &QueryOptions) -> anyhow::Result<u64>;

    /// Records matching `options`, honoring `offset`/`limit` when present.
    fn fetch(&self, options: &QueryOptions) -> anyhow::Result<Vec<Self::Record>>;

    /// Model-level page size, consulted when the parameters do not set one.
    fn per_page(&self) -> Option<u32> {
        None
    }
}

/// Shared handle to a record store.
pub type SharedStore<R> = Arc<dyn RecordStore<Record = R>>;

/// Naming collaborator: maps a member type name to its record store.
pub trait MemberResolver<R>: Send + Sync {
    /// Resolves `member` (e.g. `"Beer"` for `BeerCollection`).
    fn resolve_member_type(&self, member: &str) -> anyhow::Result<SharedStore<R>>;
}
