//! Page arithmetic for collection proxies.
//!
//! A [`PaginationState`] is a pure value: current page plus page size. Every
//! derived quantity (offset, total pages, boundaries) is a function of that
//! state and, where noted, of the total entry count supplied by the caller.
//!
//! `current_page == None` is the unpaginated state, which is distinct from
//! page 1: an unpaginated collection fetches every matching record and
//! contributes no `offset`/`limit` to its fetch options. A page of 0 behaves
//! as unpaginated as well.

use serde::{Deserialize, Serialize};

use crate::options::OptionsFragment;

/// Current page and page size of a collection proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationState {
    current_page: Option<u64>,
    per_page: u32,
}

impl PaginationState {
    /// Creates a pagination state. A zero `per_page` is raised to 1.
    #[must_use]
    pub fn new(current_page: Option<u64>, per_page: u32) -> Self {
        Self {
            current_page,
            per_page: per_page.max(1),
        }
    }

    /// The requested page as given, including a non-positive page.
    #[must_use]
    pub fn current_page(&self) -> Option<u64> {
        self.current_page
    }

    #[must_use]
    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub(crate) fn set_per_page(&mut self, per_page: u32) {
        self.per_page = per_page.max(1);
    }

    pub(crate) fn set_current_page(&mut self, page: Option<u64>) {
        self.current_page = page;
    }

    /// True iff a page is set and it is positive.
    #[must_use]
    pub fn is_paginated(&self) -> bool {
        self.page().is_some()
    }

    fn page(&self) -> Option<u64> {
        self.current_page.filter(|page| *page > 0)
    }

    /// Zero-based index of the first record on the current page.
    ///
    /// `None` when unpaginated.
    #[must_use]
    pub fn offset(&self) -> Option<u64> {
        self.page()
            .map(|page| (page - 1).saturating_mul(u64::from(self.per_page)))
    }

    /// Number of pages needed for `total_entries`; 0 when there are no entries.
    #[must_use]
    pub fn total_pages(&self, total_entries: u64) -> u64 {
        total_entries.div_ceil(u64::from(self.per_page))
    }

    /// Whether the current page lies past the last page.
    #[must_use]
    pub fn is_out_of_bounds(&self, total_entries: u64) -> bool {
        self.page()
            .is_some_and(|page| page > self.total_pages(total_entries))
    }

    #[must_use]
    pub fn previous_page(&self) -> Option<u64> {
        self.page().filter(|page| *page > 1).map(|page| page - 1)
    }

    #[must_use]
    pub fn next_page(&self, total_entries: u64) -> Option<u64> {
        self.page()
            .filter(|page| *page < self.total_pages(total_entries))
            .map(|page| page + 1)
    }

    /// True iff the current page is in bounds and has no successor.
    #[must_use]
    pub fn is_last_page(&self, total_entries: u64) -> bool {
        !self.is_out_of_bounds(total_entries) && self.next_page(total_entries).is_none()
    }

    /// Number of records the current page holds, computed from the total
    /// without fetching the page.
    ///
    /// Out-of-bounds pages hold nothing, interior pages exactly `per_page`,
    /// and the last page whatever remains after the offset. Once a page is
    /// materialized its measured length supersedes this value.
    #[must_use]
    pub fn expected_size(&self, total_entries: u64) -> u64 {
        let Some(offset) = self.offset() else {
            return total_entries;
        };
        if self.is_out_of_bounds(total_entries) {
            0
        } else if self.is_last_page(total_entries) {
            total_entries.saturating_sub(offset)
        } else {
            u64::from(self.per_page)
        }
    }

    /// Total entry count derivable from a materialized page of `loaded_len`
    /// records, without asking the record store.
    ///
    /// Unpaginated collections load every record, so the length is the total.
    /// A paginated page only gives the total away when it is provably the
    /// final one: shorter than `per_page`, and either the first page or
    /// non-empty (an empty later page may simply be out of bounds). A full
    /// page is ambiguous and yields `None`.
    #[must_use]
    pub fn total_from_loaded_page(&self, loaded_len: usize) -> Option<u64> {
        let loaded = u64::try_from(loaded_len).ok()?;
        let Some(page) = self.page() else {
            return Some(loaded);
        };
        let partial = loaded < u64::from(self.per_page);
        if partial && (page == 1 || loaded > 0) {
            self.offset().map(|offset| offset + loaded)
        } else {
            None
        }
    }

    /// Fetch-option fragment for the current window, `None` when unpaginated.
    #[must_use]
    pub fn find_fragment(&self) -> Option<OptionsFragment> {
        self.offset()
            .map(|offset| OptionsFragment::new().window(offset, self.per_page))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn page(n: u64, per: u32) -> PaginationState {
        PaginationState::new(Some(n), per)
    }

    #[test]
    fn unpaginated_states() {
        for state in [PaginationState::new(None, 30), page(0, 30)] {
            assert!(!state.is_paginated());
            assert_eq!(state.offset(), None);
            assert_eq!(state.previous_page(), None);
            assert_eq!(state.next_page(100), None);
            assert!(!state.is_out_of_bounds(0));
            assert_eq!(state.find_fragment(), None);
            assert_eq!(state.expected_size(42), 42);
        }
    }

    #[test]
    fn zero_per_page_is_raised_to_one() {
        assert_eq!(PaginationState::new(Some(1), 0).per_page(), 1);
    }

    #[test]
    fn five_records_two_per_page_first_page() {
        let state = page(1, 2);
        assert_eq!(state.total_pages(5), 3);
        assert_eq!(state.next_page(5), Some(2));
        assert_eq!(state.previous_page(), None);
        assert_eq!(state.offset(), Some(0));
        assert!(!state.is_last_page(5));
        assert_eq!(state.expected_size(5), 2);
    }

    #[test]
    fn five_records_two_per_page_last_page() {
        let state = page(3, 2);
        assert_eq!(state.offset(), Some(4));
        assert_eq!(state.expected_size(5), 1);
        assert!(state.is_last_page(5));
        assert_eq!(state.next_page(5), None);
        assert_eq!(state.previous_page(), Some(2));
    }

    #[test]
    fn full_size_last_page_reports_full_length() {
        let state = page(2, 2);
        assert!(state.is_last_page(4));
        assert_eq!(state.expected_size(4), 2);
    }

    #[test]
    fn empty_collection_has_zero_pages() {
        let first = page(1, 30);
        assert_eq!(first.total_pages(0), 0);
        assert!(first.is_out_of_bounds(0));
        assert_eq!(first.expected_size(0), 0);
        assert!(page(2, 30).is_out_of_bounds(0));
    }

    #[test]
    fn find_fragment_carries_window() {
        let fragment = page(3, 2).find_fragment().unwrap();
        assert_eq!((fragment.offset, fragment.limit), (Some(4), Some(2)));
    }

    #[test]
    fn loaded_page_total_rules() {
        // partial last page
        assert_eq!(page(3, 2).total_from_loaded_page(1), Some(5));
        // partial first page, including empty
        assert_eq!(page(1, 30).total_from_loaded_page(5), Some(5));
        assert_eq!(page(1, 30).total_from_loaded_page(0), Some(0));
        // full page is ambiguous
        assert_eq!(page(1, 2).total_from_loaded_page(2), None);
        // empty later page may be out of bounds
        assert_eq!(page(2, 30).total_from_loaded_page(0), None);
        // unpaginated loads everything
        assert_eq!(PaginationState::new(None, 30).total_from_loaded_page(7), Some(7));
    }

    fn materialized_len(state: PaginationState, total: u64) -> usize {
        let offset = state.offset().unwrap_or(0);
        let remaining = total.saturating_sub(offset);
        usize::try_from(remaining.min(u64::from(state.per_page()))).unwrap()
    }

    proptest! {
        #[test]
        fn expected_sizes_sum_to_total(total in 0u64..500, per in 1u32..40) {
            let pages = PaginationState::new(Some(1), per).total_pages(total);
            let sum: u64 = (1..=pages).map(|n| page(n, per).expected_size(total)).sum();
            prop_assert_eq!(sum, total);
        }

        #[test]
        fn out_of_bounds_iff_past_last_page(total in 0u64..500, per in 1u32..40, n in 1u64..40) {
            let state = page(n, per);
            prop_assert_eq!(state.is_out_of_bounds(total), n > state.total_pages(total));
            if state.is_out_of_bounds(total) {
                prop_assert_eq!(state.expected_size(total), 0);
            }
        }

        #[test]
        fn derived_total_is_never_wrong(total in 0u64..500, per in 1u32..40, n in 1u64..40) {
            let state = page(n, per);
            let loaded = materialized_len(state, total);
            if let Some(derived) = state.total_from_loaded_page(loaded) {
                prop_assert_eq!(derived, total);
            }
            if loaded == per as usize {
                prop_assert_eq!(state.total_from_loaded_page(loaded), None);
            }
        }

        #[test]
        fn expected_size_matches_materialized_length(total in 0u64..500, per in 1u32..40, n in 1u64..40) {
            let state = page(n, per);
            prop_assert_eq!(state.expected_size(total), materialized_len(state, total) as u64);
        }
    }
}
