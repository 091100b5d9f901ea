use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bail_corrupt_error;
use crate::error::RowStoreError;
use crate::extended::{payload_bytes, ExtendedStore};
use crate::row::{FormatScope, Row};
use crate::storage::{DataStorage, Encryption, PageSize};
use crate::Result;

#[derive(Default)]
struct MemoryState {
    pages: BTreeMap<u64, Box<[u8]>>,
    rows: HashMap<u64, Vec<u8>>,
    rows_by_id: HashMap<u32, u64>,
    /// Live clusters by first page position.
    clusters: HashMap<u64, u16>,
    /// Released clusters, reused first fit.
    free: Vec<(u64, u16)>,
    /// Next never used page number. Page 0 is reserved for the header.
    next_page: u64,
}

/// In-memory [`DataStorage`]: pages in a `BTreeMap`, row slots by position
/// and a bump allocator that prefers released clusters.
pub struct MemoryStorage {
    name: String,
    page_size: PageSize,
    encryption: Option<Arc<dyn Encryption>>,
    store: ExtendedStore,
    state: Mutex<MemoryState>,
}

impl MemoryStorage {
    pub fn new(name: impl Into<String>, page_size: PageSize) -> Self {
        Self {
            name: name.into(),
            page_size,
            encryption: None,
            store: ExtendedStore::default(),
            state: Mutex::new(MemoryState {
                next_page: 1,
                ..Default::default()
            }),
        }
    }

    pub fn with_encryption(mut self, encryption: Arc<dyn Encryption>) -> Self {
        self.encryption = Some(encryption);
        self
    }

    /// Extended store used when a postponed payload is re-read by row key.
    pub fn with_extended_store(mut self, store: ExtendedStore) -> Self {
        self.store = store;
        self
    }

    pub fn extended_store(&self) -> &ExtendedStore {
        &self.store
    }

    /// Pages held by live clusters.
    pub fn allocated_pages(&self) -> usize {
        let state = self.state.lock();
        state.clusters.values().map(|&p| p as usize).sum()
    }

    fn page_size_u64(&self) -> u64 {
        self.page_size.get() as u64
    }

    fn check_page(&self, position: u64, len: usize) -> Result<()> {
        if position % self.page_size_u64() != 0 {
            bail_corrupt_error!("position {position} is not page aligned");
        }
        if len != self.page_size.bytes() {
            bail_corrupt_error!(
                "page buffer of {len} bytes, page size is {}",
                self.page_size.bytes()
            );
        }
        Ok(())
    }
}

impl DataStorage for MemoryStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn page_size(&self) -> PageSize {
        self.page_size
    }

    fn encryption(&self) -> Option<Arc<dyn Encryption>> {
        self.encryption.clone()
    }

    fn read_page(&self, position: u64, page: &mut [u8]) -> Result<()> {
        self.check_page(position, page.len())?;
        let state = self.state.lock();
        match state.pages.get(&position) {
            Some(stored) => page.copy_from_slice(stored),
            None => page.fill(0),
        }
        Ok(())
    }

    fn write_page(&self, position: u64, page: &[u8]) -> Result<()> {
        self.check_page(position, page.len())?;
        let mut state = self.state.lock();
        state.pages.insert(position, page.into());
        Ok(())
    }

    fn read_row(&self, position: u64) -> Result<Vec<u8>> {
        let state = self.state.lock();
        match state.rows.get(&position) {
            Some(buffer) => Ok(buffer.clone()),
            None => bail_corrupt_error!("no row stored at position {position}"),
        }
    }

    fn write_row(&self, position: u64, buffer: &[u8]) -> Result<()> {
        let row_id = Row::peek_row_id(buffer)?;
        let mut state = self.state.lock();
        state.rows.insert(position, buffer.to_vec());
        state.rows_by_id.insert(row_id, position);
        Ok(())
    }

    fn get_free_cluster(&self, pages: u16) -> Result<u64> {
        let page_size = self.page_size_u64();
        let mut state = self.state.lock();
        let position = match state.free.iter().position(|&(_, free)| free >= pages) {
            Some(slot) => {
                let (position, free) = state.free[slot];
                if free == pages {
                    state.free.swap_remove(slot);
                } else {
                    state.free[slot] = (position + pages as u64 * page_size, free - pages);
                }
                position
            }
            None => {
                let position = state.next_page * page_size;
                state.next_page += pages as u64;
                position
            }
        };
        state.clusters.insert(position, pages);
        tracing::trace!(storage = %self.name, position, pages, "cluster allocated");
        Ok(position)
    }

    fn set_free_cluster(&self, position: u64, pages: u16) -> Result<()> {
        let page_size = self.page_size_u64();
        let mut state = self.state.lock();
        match state.clusters.get(&position) {
            Some(&live) if live == pages => {}
            Some(&live) => {
                bail_corrupt_error!("cluster at {position} holds {live} pages, {pages} released")
            }
            None => bail_corrupt_error!("cluster at {position} is not allocated"),
        }
        state.clusters.remove(&position);
        for i in 0..pages as u64 {
            state.pages.remove(&(position + i * page_size));
        }
        state.free.push((position, pages));
        Ok(())
    }

    fn reread_extended_column(&self, column: usize, row_key: &Row) -> Result<Option<Vec<u8>>> {
        let position = {
            let state = self.state.lock();
            state.rows_by_id.get(&row_key.row_id()).copied()
        };
        let Some(position) = position else {
            return Ok(None);
        };
        let buffer = self.read_row(position)?;
        let mut row = row_key.key_copy();
        row.unformat_row_buffer(&buffer, None, FormatScope::Full)?;
        let Some(cell) = row.column_mut(column) else {
            return Err(RowStoreError::ColumnIndex(column));
        };
        cell.read_extension(self, &self.store)?;
        Ok(cell.value().map(|v| payload_bytes(cell.kind(), v)))
    }
}
