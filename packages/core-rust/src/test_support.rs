//! Mock record store shared by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::collection::CollectionType;
use crate::options::QueryOptions;
use crate::params::Parameters;
use crate::proxy::CollectionProxy;
use crate::traits::{RecordStore, SharedStore};

/// Serves `records` and remembers every query it receives.
#[derive(Default)]
pub(crate) struct MockStore {
    records: Vec<u32>,
    per_page: Option<u32>,
    forbid_count: AtomicBool,
    count_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    last_find: Mutex<Option<QueryOptions>>,
    last_count: Mutex<Option<QueryOptions>>,
}

impl MockStore {
    pub(crate) fn with_records(n: u32) -> Arc<Self> {
        Arc::new(Self {
            records: (1..=n).collect(),
            ..Self::default()
        })
    }

    pub(crate) fn with_model_per_page(n: u32, per_page: u32) -> Arc<Self> {
        Arc::new(Self {
            records: (1..=n).collect(),
            per_page: Some(per_page),
            ..Self::default()
        })
    }

    /// Any later count query panics, failing the test.
    pub(crate) fn forbid_count(&self) {
        self.forbid_count.store(true, Ordering::SeqCst);
    }

    pub(crate) fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_find(&self) -> Option<QueryOptions> {
        self.last_find.lock().unwrap().clone()
    }

    pub(crate) fn last_count(&self) -> Option<QueryOptions> {
        self.last_count.lock().unwrap().clone()
    }
}

impl RecordStore for MockStore {
    type Record = u32;

    fn table_name(&self) -> &str {
        "beers"
    }

    fn count(&self, options: &QueryOptions) -> anyhow::Result<u64> {
        assert!(
            !self.forbid_count.load(Ordering::SeqCst),
            "count issued although the total was derivable"
        );
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_count.lock().unwrap() = Some(options.clone());
        Ok(self.records.len() as u64)
    }

    fn fetch(&self, options: &QueryOptions) -> anyhow::Result<Vec<u32>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_find.lock().unwrap() = Some(options.clone());
        let offset = usize::try_from(options.offset.unwrap_or(0))?;
        let limit = options.limit.map_or(usize::MAX, |l| l as usize);
        Ok(self.records.iter().copied().skip(offset).take(limit).collect())
    }

    fn per_page(&self) -> Option<u32> {
        self.per_page
    }
}

/// Store whose every query fails.
pub(crate) struct FailingStore;

impl RecordStore for FailingStore {
    type Record = u32;

    fn table_name(&self) -> &str {
        "beers"
    }

    fn count(&self, _options: &QueryOptions) -> anyhow::Result<u64> {
        anyhow::bail!("connection reset by peer")
    }

    fn fetch(&self, _options: &QueryOptions) -> anyhow::Result<Vec<u32>> {
        anyhow::bail!("connection reset by peer")
    }
}

pub(crate) fn beers() -> Arc<CollectionType> {
    CollectionType::builder("BeerCollection").build()
}

pub(crate) fn proxy(
    store: &Arc<MockStore>,
    collection: Arc<CollectionType>,
    params: Parameters,
) -> CollectionProxy<u32> {
    let store: SharedStore<u32> = store.clone();
    CollectionProxy::new(collection, store, params)
}

pub(crate) fn paged(store: &Arc<MockStore>, page: u64, per_page: u32) -> CollectionProxy<u32> {
    proxy(
        store,
        beers(),
        Parameters::new().with("page", page).with("per_page", per_page),
    )
}
