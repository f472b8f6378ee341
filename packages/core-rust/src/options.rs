//! Query option fragments and the merged options bundle handed to a record store.
//!
//! A scope rule produces an [`OptionsFragment`]; the scope set folds fragments
//! into one [`QueryOptions`] per query kind. Each recognized key carries its
//! own merge policy:
//!
//! | key          | policy                                              |
//! |--------------|-----------------------------------------------------|
//! | `order`      | last non-empty value wins                           |
//! | `include`    | union, first-seen order, duplicates removed         |
//! | `conditions` | logical AND, each fragment sanitized independently  |
//! | `offset`     | pagination rule only                                |
//! | `limit`      | pagination rule only                                |

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::{CollectionError, Result};

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
enum ConditionKind {
    Sql { clause: String, binds: Vec<Value> },
    Fields(BTreeMap<String, Value>),
}

/// A single filter condition contributed by a scope rule or an instance override.
///
/// Either a SQL fragment with positional `?` binds, or a set of field
/// equalities. Conditions are sanitized one by one and joined with `AND`
/// when rendered (see [`QueryOptions::conditions_sql`]).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Condition(ConditionKind);

impl Condition {
    /// A raw SQL fragment. `?` characters are kept as written.
    #[must_use]
    pub fn sql(clause: impl Into<String>) -> Self {
        Self(ConditionKind::Sql {
            clause: clause.into(),
            binds: Vec::new(),
        })
    }

    /// A SQL fragment whose `?` placeholders are replaced, in order, by quoted `binds`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::InvalidCondition`] if the number of
    /// placeholders differs from the number of binds.
    pub fn bind(clause: impl Into<String>, binds: Vec<Value>) -> Result<Self> {
        let clause = clause.into();
        let expected = clause.matches('?').count();
        if expected != binds.len() {
            return Err(CollectionError::InvalidCondition {
                clause,
                expected,
                given: binds.len(),
            });
        }
        Ok(Self(ConditionKind::Sql { clause, binds }))
    }

    /// A single `field = value` equality.
    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(field.into(), value.into());
        Self(ConditionKind::Fields(fields))
    }

    /// A conjunction of field equalities.
    #[must_use]
    pub fn fields(fields: BTreeMap<String, Value>) -> Self {
        Self(ConditionKind::Fields(fields))
    }

    /// Field equalities, if this condition is expressed as such.
    ///
    /// Stores that cannot interpret SQL evaluate conditions through this.
    #[must_use]
    pub fn field_equalities(&self) -> Option<&BTreeMap<String, Value>> {
        match &self.0 {
            ConditionKind::Fields(fields) => Some(fields),
            ConditionKind::Sql { .. } => None,
        }
    }

    /// Whether the condition sanitizes to nothing.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match &self.0 {
            ConditionKind::Sql { clause, .. } => clause.trim().is_empty(),
            ConditionKind::Fields(fields) => fields.is_empty(),
        }
    }

    /// Sanitized SQL for this condition alone, `None` when blank.
    #[must_use]
    pub fn to_sql(&self) -> Option<String> {
        if self.is_blank() {
            return None;
        }
        match &self.0 {
            ConditionKind::Sql { clause, binds } => {
                let clause = clause.trim();
                if binds.is_empty() {
                    return Some(clause.to_string());
                }
                let mut binds = binds.iter();
                let mut out = String::with_capacity(clause.len());
                for ch in clause.chars() {
                    if ch != '?' {
                        out.push(ch);
                        continue;
                    }
                    match binds.next() {
                        Some(bind) => out.push_str(&quote_literal(bind)),
                        None => out.push('?'),
                    }
                }
                Some(out)
            }
            ConditionKind::Fields(fields) => Some(
                fields
                    .iter()
                    .map(|(field, value)| field_clause(field, value))
                    .collect::<Vec<_>>()
                    .join(" AND "),
            ),
        }
    }
}

fn quote_column(field: &str) -> String {
    field
        .split('.')
        .map(|part| format!("`{}`", part.replace('`', "``")))
        .collect::<Vec<_>>()
        .join(".")
}

fn field_clause(field: &str, value: &Value) -> String {
    let column = quote_column(field);
    match value {
        Value::Null => format!("{column} IS NULL"),
        Value::Array(_) => format!("{column} IN ({})", quote_literal(value)),
        other => format!("{column} = {}", quote_literal(other)),
    }
}

fn quote_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Array(items) => items
            .iter()
            .map(quote_literal)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => format!("'{}'", value.to_string().replace('\'', "''")),
    }
}

// ---------------------------------------------------------------------------
// OptionsFragment
// ---------------------------------------------------------------------------

/// Partial options produced by one scope rule for one query kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionsFragment {
    pub order: Option<String>,
    pub include: Vec<String>,
    pub conditions: Vec<Condition>,
    /// Honored only when produced by the pagination rule.
    pub offset: Option<u64>,
    /// Honored only when produced by the pagination rule.
    pub limit: Option<u32>,
}

impl OptionsFragment {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    #[must_use]
    pub fn include<I, S>(mut self, include: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include.extend(include.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    #[must_use]
    pub fn window(mut self, offset: u64, limit: u32) -> Self {
        self.offset = Some(offset);
        self.limit = Some(limit);
        self
    }

    /// Whether the fragment contributes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_none()
            && self.include.is_empty()
            && self.conditions.iter().all(Condition::is_blank)
            && self.offset.is_none()
            && self.limit.is_none()
    }
}

// ---------------------------------------------------------------------------
// QueryOptions
// ---------------------------------------------------------------------------

/// The merged options bundle passed to the record store's `count` or `fetch`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl QueryOptions {
    /// Whether no key is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_none()
            && self.include.is_empty()
            && self.conditions.is_empty()
            && self.offset.is_none()
            && self.limit.is_none()
    }

    /// All conditions sanitized and joined: `(a) AND (b)`.
    #[must_use]
    pub fn conditions_sql(&self) -> Option<String> {
        let segments: Vec<String> = self.conditions.iter().filter_map(Condition::to_sql).collect();
        if segments.is_empty() {
            None
        } else {
            Some(format!("({})", segments.join(") AND (")))
        }
    }

    /// Folds a fragment into these options. `offset`/`limit` are taken only
    /// when `accept_window` is set; returns `true` if a window was offered
    /// but dropped.
    pub(crate) fn absorb(&mut self, fragment: OptionsFragment, accept_window: bool) -> bool {
        self.merge_order(fragment.order);
        self.merge_include(fragment.include);
        self.merge_conditions(fragment.conditions);
        let offered = fragment.offset.is_some() || fragment.limit.is_some();
        if accept_window {
            if let (Some(offset), Some(limit)) = (fragment.offset, fragment.limit) {
                self.offset = Some(offset);
                self.limit = Some(limit);
            }
            false
        } else {
            offered
        }
    }

    pub(crate) fn merge_order(&mut self, order: Option<String>) {
        if let Some(order) = order.filter(|o| !o.trim().is_empty()) {
            self.order = Some(order);
        }
    }

    pub(crate) fn merge_include<I: IntoIterator<Item = String>>(&mut self, include: I) {
        for hint in include {
            if !self.include.contains(&hint) {
                self.include.push(hint);
            }
        }
    }

    pub(crate) fn merge_conditions<I: IntoIterator<Item = Condition>>(&mut self, conditions: I) {
        for condition in conditions {
            if !condition.is_blank() && !self.conditions.contains(&condition) {
                self.conditions.push(condition);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn bind_rejects_placeholder_mismatch() {
        let err = Condition::bind("abv > ? AND style = ?", vec![json!(5)]).unwrap_err();
        assert!(matches!(
            err,
            CollectionError::InvalidCondition { expected: 2, given: 1, .. }
        ));
    }

    #[test]
    fn bind_quotes_values() {
        let cond = Condition::bind("name = ? AND abv > ?", vec![json!("O'Hara"), json!(4.5)]).unwrap();
        assert_eq!(cond.to_sql().as_deref(), Some("name = 'O''Hara' AND abv > 4.5"));
    }

    #[test]
    fn field_conditions_render_per_value_shape() {
        let mut fields = BTreeMap::new();
        fields.insert("beers.style".to_string(), json!("stout"));
        fields.insert("brewery_id".to_string(), Value::Null);
        fields.insert("id".to_string(), json!([1, 2]));
        let sql = Condition::fields(fields).to_sql().unwrap();
        assert_eq!(
            sql,
            "`beers`.`style` = 'stout' AND `brewery_id` IS NULL AND `id` IN (1, 2)"
        );
    }

    #[test]
    fn blank_conditions_are_skipped() {
        assert!(Condition::sql("  ").is_blank());
        assert!(Condition::fields(BTreeMap::new()).is_blank());
        let mut options = QueryOptions::default();
        options.merge_conditions([Condition::sql(""), Condition::sql("a = 1")]);
        assert_eq!(options.conditions.len(), 1);
    }

    #[test]
    fn conditions_are_anded_in_order() {
        let mut options = QueryOptions::default();
        options.merge_conditions([Condition::sql("a = 1"), Condition::eq("b", 2)]);
        assert_eq!(options.conditions_sql().as_deref(), Some("(a = 1) AND (`b` = 2)"));
    }

    #[test]
    fn duplicate_conditions_collapse() {
        let mut options = QueryOptions::default();
        options.merge_conditions([Condition::eq("b", 2), Condition::eq("b", 2)]);
        assert_eq!(options.conditions.len(), 1);
    }

    #[test]
    fn last_non_empty_order_wins() {
        let mut options = QueryOptions::default();
        options.merge_order(Some("name".to_string()));
        options.merge_order(None);
        options.merge_order(Some(" ".to_string()));
        assert_eq!(options.order.as_deref(), Some("name"));
        options.merge_order(Some("id DESC".to_string()));
        assert_eq!(options.order.as_deref(), Some("id DESC"));
    }

    #[test]
    fn includes_union_preserving_first_seen_order() {
        let mut options = QueryOptions::default();
        options.merge_include(["brewery".to_string(), "tags".to_string()]);
        options.merge_include(["tags".to_string(), "imbibes".to_string()]);
        assert_eq!(options.include, vec!["brewery", "tags", "imbibes"]);
    }

    #[test]
    fn window_only_from_accepting_fold() {
        let mut options = QueryOptions::default();
        let dropped = options.absorb(OptionsFragment::new().window(10, 5), false);
        assert!(dropped);
        assert_eq!(options.offset, None);
        let dropped = options.absorb(OptionsFragment::new().window(4, 2), true);
        assert!(!dropped);
        assert_eq!((options.offset, options.limit), (Some(4), Some(2)));
    }

    #[test]
    fn empty_options_serialize_to_empty_object() {
        let value = serde_json::to_value(QueryOptions::default()).unwrap();
        assert_eq!(value, json!({}));
    }
}
