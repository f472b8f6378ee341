/// Per-page size used when neither the parameters, the record store, nor the
/// collection type declare one.
pub const DEFAULT_PER_PAGE: u32 = 30;

/// Collection-level configuration shared by every proxy of a collection type.
///
/// Controls which parameter keys drive pagination and the fallback page size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionConfig {
    /// Parameter key holding the requested page number.
    pub page_key: String,
    /// Parameter key holding the requested page size.
    pub per_page_key: String,
    /// Page size used when nothing more specific is declared.
    pub default_per_page: u32,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            page_key: "page".to_string(),
            per_page_key: "per_page".to_string(),
            default_per_page: DEFAULT_PER_PAGE,
        }
    }
}
