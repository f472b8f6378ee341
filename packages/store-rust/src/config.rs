use serde::{Deserialize, Serialize};

/// Configuration of one in-memory record store.
///
/// Deserializable so stores can be declared in a config file; missing fields
/// take their [`Default`] values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Member type name the store is registered under (e.g. `"Beer"`).
    pub member: String,
    /// Table name used when rendering collections of this member.
    pub table_name: String,
    /// Model-level page size, consulted when the parameters set none.
    pub per_page: Option<u32>,
    /// Fail queries carrying SQL conditions instead of ignoring them.
    pub reject_sql_conditions: bool,
}

impl StoreConfig {
    /// Config for `member` with its conventional table name.
    #[must_use]
    pub fn new(member: impl Into<String>) -> Self {
        let member = member.into();
        Self {
            table_name: table_name_for(&member),
            member,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    #[must_use]
    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = Some(per_page.max(1));
        self
    }

    #[must_use]
    pub fn with_reject_sql_conditions(mut self, reject: bool) -> Self {
        self.reject_sql_conditions = reject;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            member: String::new(),
            table_name: String::new(),
            per_page: None,
            reject_sql_conditions: true,
        }
    }
}

/// `Cellar::CaskAle` -> `cask_ales`.
fn table_name_for(member: &str) -> String {
    let base = member.rsplit("::").next().unwrap_or(member);
    let mut table = String::with_capacity(base.len() + 4);
    for (i, ch) in base.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                table.push('_');
            }
            table.push(ch.to_ascii_lowercase());
        } else {
            table.push(ch);
        }
    }
    if !table.is_empty() {
        table.push('s');
    }
    table
}
