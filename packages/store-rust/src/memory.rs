//! In-memory [`RecordStore`] backed by [`DashMap`].
//!
//! Records are JSON objects keyed by id. Queries are evaluated directly over
//! a snapshot of the map:
//!
//! - field-equality conditions match top-level or dotted paths; an array
//!   value means "any of", a null value means "missing or null",
//! - SQL conditions cannot be evaluated and are rejected or ignored per
//!   [`StoreConfig::reject_sql_conditions`],
//! - `order` accepts `col [ASC|DESC], ...` with optional backticks and table
//!   prefix; ties and unordered queries fall back to insertion order,
//! - `offset`/`limit` window the sorted result; `count` ignores them.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use folio_core::{QueryOptions, RecordStore};
use parking_lot::Mutex;
use serde_json::Value;

use crate::config::StoreConfig;
use crate::error::StoreError;

struct StoredRow {
    seq: u64,
    value: Value,
}

/// Concurrent in-memory record store over JSON documents.
pub struct InMemoryRecordStore {
    config: StoreConfig,
    rows: DashMap<String, StoredRow>,
    next_seq: AtomicU64,
    count_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    last_count: Mutex<Option<QueryOptions>>,
    last_fetch: Mutex<Option<QueryOptions>>,
}

impl InMemoryRecordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            rows: DashMap::new(),
            next_seq: AtomicU64::new(0),
            count_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            last_count: Mutex::new(None),
            last_fetch: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Inserts or replaces the record stored under `id`. A replaced record
    /// keeps its first insertion position.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotAnObject`] unless `value` is a JSON object.
    pub fn insert(&self, id: impl Into<String>, value: Value) -> Result<Option<Value>, StoreError> {
        let id = id.into();
        if !value.is_object() {
            return Err(StoreError::NotAnObject { id });
        }
        match self.rows.entry(id) {
            Entry::Occupied(mut entry) => Ok(Some(std::mem::replace(&mut entry.get_mut().value, value))),
            Entry::Vacant(entry) => {
                let seq = self.next_seq.fetch_add(1, AtomicOrdering::Relaxed);
                entry.insert(StoredRow { seq, value });
                Ok(None)
            }
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Value> {
        self.rows.get(id).map(|row| row.value.clone())
    }

    pub fn remove(&self, id: &str) -> Option<Value> {
        self.rows.remove(id).map(|(_, row)| row.value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clear(&self) {
        self.rows.clear();
    }

    /// Number of count queries served so far.
    #[must_use]
    pub fn count_calls(&self) -> usize {
        self.count_calls.load(AtomicOrdering::SeqCst)
    }

    /// Number of fetch queries served so far.
    #[must_use]
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(AtomicOrdering::SeqCst)
    }

    /// Options of the most recent count query.
    #[must_use]
    pub fn last_count_options(&self) -> Option<QueryOptions> {
        self.last_count.lock().clone()
    }

    /// Options of the most recent fetch query.
    #[must_use]
    pub fn last_fetch_options(&self) -> Option<QueryOptions> {
        self.last_fetch.lock().clone()
    }

    fn matching(&self, options: &QueryOptions) -> anyhow::Result<Vec<(u64, Value)>> {
        let mut filters: Vec<&BTreeMap<String, Value>> = Vec::with_capacity(options.conditions.len());
        for condition in &options.conditions {
            if let Some(fields) = condition.field_equalities() {
                filters.push(fields);
                continue;
            }
            let clause = condition.to_sql().unwrap_or_default();
            if self.config.reject_sql_conditions {
                return Err(StoreError::UnsupportedCondition { clause }.into());
            }
            tracing::warn!(
                table = %self.config.table_name,
                clause = %clause,
                "ignoring SQL condition"
            );
        }

        let table = self.config.table_name.as_str();
        Ok(self
            .rows
            .iter()
            .filter(|row| {
                filters
                    .iter()
                    .all(|fields| matches_fields(&row.value().value, fields, table))
            })
            .map(|row| (row.value().seq, row.value().value.clone()))
            .collect())
    }
}

impl RecordStore for InMemoryRecordStore {
    type Record = Value;

    fn table_name(&self) -> &str {
        &self.config.table_name
    }

    fn count(&self, options: &QueryOptions) -> anyhow::Result<u64> {
        self.count_calls.fetch_add(1, AtomicOrdering::SeqCst);
        *self.last_count.lock() = Some(options.clone());
        Ok(u64::try_from(self.matching(options)?.len())?)
    }

    fn fetch(&self, options: &QueryOptions) -> anyhow::Result<Vec<Value>> {
        self.fetch_calls.fetch_add(1, AtomicOrdering::SeqCst);
        *self.last_fetch.lock() = Some(options.clone());
        if !options.include.is_empty() {
            tracing::trace!(
                table = %self.config.table_name,
                include = ?options.include,
                "eager-load hints have no effect in memory"
            );
        }

        let mut rows = self.matching(options)?;
        let keys = options
            .order
            .as_deref()
            .map(|order| parse_order(order, &self.config.table_name))
            .unwrap_or_default();
        rows.sort_by(|(seq_a, a), (seq_b, b)| {
            keys.iter()
                .map(|key| key.compare(a, b))
                .find(|ordering| ordering.is_ne())
                .unwrap_or_else(|| seq_a.cmp(seq_b))
        });

        let offset = usize::try_from(options.offset.unwrap_or(0))?;
        let limit = match options.limit {
            Some(limit) => usize::try_from(limit)?,
            None => usize::MAX,
        };
        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(_, value)| value)
            .collect())
    }

    fn per_page(&self) -> Option<u32> {
        self.config.per_page
    }
}

// ---------------------------------------------------------------------------
// Evaluation helpers
// ---------------------------------------------------------------------------

/// Splits `beers.brewery.name` into `[brewery, name]` for table `beers`.
fn column_path(column: &str, table: &str) -> Vec<String> {
    let cleaned = column.replace(['`', '"'], "");
    let mut segments: Vec<String> = cleaned.split('.').map(str::to_string).collect();
    if segments.len() > 1 && segments[0] == table {
        segments.remove(0);
    }
    segments
}

fn lookup<'a>(record: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter()
        .try_fold(record, |current, segment| current.get(segment.as_str()))
}

fn matches_fields(record: &Value, fields: &BTreeMap<String, Value>, table: &str) -> bool {
    fields.iter().all(|(column, expected)| {
        let actual = lookup(record, &column_path(column, table));
        match expected {
            Value::Null => actual.is_none_or(Value::is_null),
            Value::Array(choices) => choices
                .iter()
                .any(|choice| actual.unwrap_or(&Value::Null) == choice),
            other => actual == Some(other),
        }
    })
}

#[derive(Debug, PartialEq)]
struct SortKey {
    path: Vec<String>,
    descending: bool,
}

impl SortKey {
    fn compare(&self, a: &Value, b: &Value) -> Ordering {
        let ordering = compare_values(lookup(a, &self.path), lookup(b, &self.path));
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

fn parse_order(order: &str, table: &str) -> Vec<SortKey> {
    order
        .split(',')
        .filter_map(|term| {
            let mut tokens = term.split_whitespace();
            let column = tokens.next()?;
            let descending = tokens
                .next()
                .is_some_and(|direction| direction.eq_ignore_ascii_case("desc"));
            Some(SortKey {
                path: column_path(column, table),
                descending,
            })
        })
        .collect()
}

/// Nulls sort first, then booleans, numbers, strings, arrays, objects.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Object(_)) => 5,
        }
    }
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
