//! Row-sequence capabilities and the name-based dispatch adapter.
//!
//! [`RowSequence`] is the fixed set of read operations a collection exposes
//! over its materialized rows. Every capability materializes first.
//!
//! [`CollectionProxy::send`] maps an operation name onto either a proxy
//! inspection (answered without fetching rows) or a sequence capability
//! (which loads first). Names outside [`Capability`] are rejected with
//! [`CollectionError::UnsupportedOperation`].

use std::ops::Range;

use serde_json::Value;

use crate::error::{CollectionError, Result};
use crate::proxy::CollectionProxy;

/// Enumerated read capabilities over materialized rows.
pub trait RowSequence {
    type Row;

    /// The materialized rows.
    ///
    /// # Errors
    ///
    /// Propagates record store failures.
    fn row_slice(&self) -> Result<&[Self::Row]>;

    /// # Errors
    ///
    /// Propagates record store failures.
    fn first(&self) -> Result<Option<&Self::Row>> {
        Ok(self.row_slice()?.first())
    }

    /// # Errors
    ///
    /// Propagates record store failures.
    fn last(&self) -> Result<Option<&Self::Row>> {
        Ok(self.row_slice()?.last())
    }

    /// # Errors
    ///
    /// Propagates record store failures.
    fn get(&self, index: usize) -> Result<Option<&Self::Row>> {
        Ok(self.row_slice()?.get(index))
    }

    /// Rows in `range`, clamped to the loaded length.
    ///
    /// # Errors
    ///
    /// Propagates record store failures.
    fn slice(&self, range: Range<usize>) -> Result<&[Self::Row]> {
        let rows = self.row_slice()?;
        let end = range.end.min(rows.len());
        let start = range.start.min(end);
        Ok(&rows[start..end])
    }

    /// # Errors
    ///
    /// Propagates record store failures.
    fn map_rows<T, F>(&self, f: F) -> Result<Vec<T>>
    where
        F: FnMut(&Self::Row) -> T,
    {
        Ok(self.row_slice()?.iter().map(f).collect())
    }

    /// # Errors
    ///
    /// Propagates record store failures.
    fn filter_rows<F>(&self, mut predicate: F) -> Result<Vec<&Self::Row>>
    where
        F: FnMut(&Self::Row) -> bool,
    {
        Ok(self
            .row_slice()?
            .iter()
            .filter(|row| predicate(row))
            .collect())
    }

    /// # Errors
    ///
    /// Propagates record store failures.
    fn find_row<F>(&self, mut predicate: F) -> Result<Option<&Self::Row>>
    where
        F: FnMut(&Self::Row) -> bool,
    {
        Ok(self.row_slice()?.iter().find(|row| predicate(row)))
    }
}

impl<R> RowSequence for CollectionProxy<R> {
    type Row = R;

    fn row_slice(&self) -> Result<&[R]> {
        self.load()
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Every operation name [`CollectionProxy::send`] understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    // Proxy inspection: may count, never fetches.
    Size,
    IsEmpty,
    TotalEntries,
    TotalPages,
    CurrentPage,
    PerPage,
    Offset,
    PreviousPage,
    NextPage,
    IsPaginated,
    IsLoaded,
    IsOutOfBounds,
    IsLastPage,
    // Sequence: materializes first.
    Length,
    All,
    First,
    Last,
    Get,
    Slice,
}

impl Capability {
    /// Maps an operation name to its capability, `None` if unsupported.
    #[must_use]
    pub fn classify(name: &str) -> Option<Self> {
        let capability = match name {
            "size" => Self::Size,
            "is_empty" => Self::IsEmpty,
            "total_entries" => Self::TotalEntries,
            "total_pages" => Self::TotalPages,
            "current_page" => Self::CurrentPage,
            "per_page" => Self::PerPage,
            "offset" => Self::Offset,
            "previous_page" => Self::PreviousPage,
            "next_page" => Self::NextPage,
            "is_paginated" => Self::IsPaginated,
            "is_loaded" => Self::IsLoaded,
            "is_out_of_bounds" => Self::IsOutOfBounds,
            "is_last_page" => Self::IsLastPage,
            "length" | "len" => Self::Length,
            "all" | "rows" => Self::All,
            "first" => Self::First,
            "last" => Self::Last,
            "get" => Self::Get,
            "slice" => Self::Slice,
            _ => return None,
        };
        Some(capability)
    }

    /// Whether answering requires the rows to be materialized.
    #[must_use]
    pub fn loads_rows(self) -> bool {
        matches!(
            self,
            Self::Length | Self::All | Self::First | Self::Last | Self::Get | Self::Slice
        )
    }
}

/// Answer to a dispatched operation.
#[derive(Debug, PartialEq)]
pub enum Reply<'a, R> {
    Count(u64),
    Flag(bool),
    Page(Option<u64>),
    Row(Option<&'a R>),
    Rows(&'a [R]),
}

impl<R> CollectionProxy<R> {
    /// Whether [`send`](Self::send) accepts `operation`.
    #[must_use]
    pub fn responds_to(&self, operation: &str) -> bool {
        Capability::classify(operation).is_some()
    }

    /// Runs `operation` by name.
    ///
    /// `get` takes one integer index (negative counts from the end); `slice`
    /// takes a start index and a length. Every other operation takes no
    /// arguments.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::UnsupportedOperation`] for unknown names,
    /// [`CollectionError::InvalidArgument`] for unusable arguments, and
    /// propagates record store failures.
    pub fn send(&self, operation: &str, args: &[Value]) -> Result<Reply<'_, R>> {
        let Some(capability) = Capability::classify(operation) else {
            tracing::debug!(
                collection = %self.collection().name(),
                operation,
                "unsupported operation"
            );
            return Err(CollectionError::UnsupportedOperation {
                operation: operation.to_string(),
                sequence: std::any::type_name::<Vec<R>>(),
            });
        };

        let reply = match capability {
            Capability::Size => Reply::Count(self.size()?),
            Capability::IsEmpty => Reply::Flag(self.is_empty()?),
            Capability::TotalEntries => Reply::Count(self.total_entries()?),
            Capability::TotalPages => Reply::Count(self.total_pages()?),
            Capability::CurrentPage => Reply::Page(self.current_page()),
            Capability::PerPage => Reply::Count(u64::from(self.per_page())),
            Capability::Offset => Reply::Page(self.offset()),
            Capability::PreviousPage => Reply::Page(self.previous_page()),
            Capability::NextPage => Reply::Page(self.next_page()?),
            Capability::IsPaginated => Reply::Flag(self.is_paginated()),
            Capability::IsLoaded => Reply::Flag(self.is_loaded()),
            Capability::IsOutOfBounds => Reply::Flag(self.is_out_of_bounds()?),
            Capability::IsLastPage => Reply::Flag(self.is_last_page()?),
            Capability::Length => Reply::Count(self.load()?.len() as u64),
            Capability::All => Reply::Rows(self.load()?),
            Capability::First => Reply::Row(RowSequence::first(self)?),
            Capability::Last => Reply::Row(RowSequence::last(self)?),
            Capability::Get => {
                let index = int_arg("get", args, 0)?;
                let rows = self.load()?;
                Reply::Row(resolve_index(index, rows.len()).and_then(|i| rows.get(i)))
            }
            Capability::Slice => {
                let start = int_arg("slice", args, 0)?;
                let len = int_arg("slice", args, 1)?;
                let len = usize::try_from(len).map_err(|_| CollectionError::InvalidArgument {
                    operation: "slice",
                    message: format!("negative length {len}"),
                })?;
                let rows = self.load()?;
                let slice = match resolve_index(start, rows.len()) {
                    Some(start) => {
                        let end = start.saturating_add(len).min(rows.len());
                        &rows[start.min(end)..end]
                    }
                    None => &rows[..0],
                };
                Reply::Rows(slice)
            }
        };
        Ok(reply)
    }
}

fn int_arg(operation: &'static str, args: &[Value], position: usize) -> Result<i64> {
    args.get(position)
        .and_then(Value::as_i64)
        .ok_or_else(|| CollectionError::InvalidArgument {
            operation,
            message: format!("expected an integer at position {position}"),
        })
}

/// Translates a possibly negative index against `len`.
fn resolve_index(index: i64, len: usize) -> Option<usize> {
    if index >= 0 {
        usize::try_from(index).ok()
    } else {
        let back = usize::try_from(index.unsigned_abs()).ok()?;
        len.checked_sub(back)
    }
}
