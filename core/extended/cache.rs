use std::sync::Arc;
use std::time::Duration;

/// Identity of one extended cell: the storage it lives in, its row and the
/// column ordinal inside the row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtendedKey {
    pub storage: Arc<str>,
    pub row_id: u32,
    pub column: usize,
}

impl ExtendedKey {
    pub fn new(storage: &str, row_id: u32, column: usize) -> Self {
        Self {
            storage: Arc::from(storage),
            row_id,
            column,
        }
    }
}

/// Bounded cache of materialized postponed payloads.
///
/// Entries are weighted by their byte length and expire after sitting idle,
/// after which a postponed cell has to go back to the storage.
#[derive(Clone)]
pub struct PostponedCache {
    inner: moka::sync::Cache<ExtendedKey, Arc<Vec<u8>>>,
}

impl PostponedCache {
    pub fn new(capacity_bytes: u64, time_to_idle: Duration) -> Self {
        let inner = moka::sync::Cache::builder()
            .max_capacity(capacity_bytes)
            .weigher(|_key: &ExtendedKey, payload: &Arc<Vec<u8>>| {
                u32::try_from(payload.len()).unwrap_or(u32::MAX)
            })
            .time_to_idle(time_to_idle)
            .build();
        Self { inner }
    }

    pub fn get(&self, key: &ExtendedKey) -> Option<Arc<Vec<u8>>> {
        self.inner.get(key)
    }

    pub fn insert(&self, key: ExtendedKey, payload: Arc<Vec<u8>>) {
        self.inner.insert(key, payload);
    }

    pub fn invalidate(&self, key: &ExtendedKey) {
        self.inner.invalidate(key);
    }

    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }
}

impl std::fmt::Debug for PostponedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostponedCache")
            .field("entries", &self.inner.entry_count())
            .finish()
    }
}
