//! Folio Core: lazy collection proxies, scope composition, and pagination.

pub mod collection;
pub mod config;
pub mod error;
pub mod options;
pub mod pagination;
pub mod params;
pub mod proxy;
pub mod scope;
pub mod sequence;
pub mod serialize;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use collection::{CollectionType, CollectionTypeBuilder, MEMBER_CONVENTION};
pub use config::{CollectionConfig, DEFAULT_PER_PAGE};
pub use error::{CollectionError, Result};
pub use options::{Condition, OptionsFragment, QueryOptions};
pub use pagination::PaginationState;
pub use params::Parameters;
pub use proxy::CollectionProxy;
pub use scope::{QueryKind, ScopeContext, ScopeKind, ScopeOverrides, ScopeRule, ScopeSet};
pub use sequence::{Capability, Reply, RowSequence};
pub use serialize::{CollectionData, PageSummary};
pub use traits::{MemberResolver, RecordStore, SharedStore};
