//! Rendering adapters layered over `size`, `total_entries` and the rows.
//!
//! The rendered shape is keyed by the member table name:
//!
//! ```text
//! { "beers": { "collection": [...], "total_entries": 5,
//!              "page": 1, "per_page": 2, "total_pages": 3 } }
//! ```
//!
//! The page keys appear only for paginated proxies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CollectionError, Result};
use crate::proxy::CollectionProxy;

/// Totals and page position of a collection, ready for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSummary {
    pub total_entries: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u64>,
}

/// Serializable view of a loaded collection.
#[derive(Debug, Serialize)]
pub struct CollectionData<'a, R> {
    pub collection: &'a [R],
    #[serde(flatten)]
    pub summary: PageSummary,
}

impl<R> CollectionProxy<R> {
    /// Totals for rendering. May issue a count; never fetches.
    ///
    /// # Errors
    ///
    /// Propagates record store failures.
    pub fn summary(&self) -> Result<PageSummary> {
        let total_entries = self.total_entries()?;
        let summary = if self.is_paginated() {
            PageSummary {
                total_entries,
                page: self.current_page(),
                per_page: Some(self.per_page()),
                total_pages: Some(self.pagination().total_pages(total_entries)),
            }
        } else {
            PageSummary {
                total_entries,
                page: None,
                per_page: None,
                total_pages: None,
            }
        };
        Ok(summary)
    }

    /// Loads the rows and pairs them with the summary.
    ///
    /// The rows are loaded before counting so a provably final page can
    /// supply the total itself.
    ///
    /// # Errors
    ///
    /// Propagates record store failures.
    pub fn to_data(&self) -> Result<CollectionData<'_, R>> {
        let collection = self.load()?;
        Ok(CollectionData {
            collection,
            summary: self.summary()?,
        })
    }

    /// The parameters as a query string, `None` when there are none.
    #[must_use]
    pub fn to_param(&self) -> Option<String> {
        self.params().to_query_string()
    }
}

impl<R: Serialize> CollectionProxy<R> {
    /// Renders the collection as JSON keyed by the member table name.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::Encode`] if a row fails to serialize and
    /// propagates record store failures.
    pub fn to_json_value(&self) -> Result<Value> {
        let data = self.to_data()?;
        let body = serde_json::to_value(&data).map_err(|err| CollectionError::Encode {
            format: "json",
            message: err.to_string(),
        })?;
        let mut root = serde_json::Map::new();
        root.insert(self.store().table_name().to_string(), body);
        Ok(Value::Object(root))
    }

    /// Renders the collection as `MessagePack` with named fields.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::Encode`] if a row fails to serialize and
    /// propagates record store failures.
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        let data = self.to_data()?;
        let mut root = std::collections::BTreeMap::new();
        root.insert(self.store().table_name(), data);
        rmp_serde::to_vec_named(&root).map_err(|err| CollectionError::Encode {
            format: "msgpack",
            message: err.to_string(),
        })
    }
}
