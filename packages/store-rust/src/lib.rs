//! Folio Store: concrete collaborators for `folio-core` collection proxies.

pub mod config;
pub mod error;
pub mod memory;
pub mod registry;
pub mod telemetry;

pub use config::StoreConfig;
pub use error::StoreError;
pub use memory::InMemoryRecordStore;
pub use registry::StoreRegistry;
pub use telemetry::init_tracing;
