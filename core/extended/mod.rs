/* Extended values:

Text, NText and Image cells may hold payloads far larger than a page. Their
row payload is a small inline descriptor instead of the value itself:

    ┌──────────────┬───────────┬───────────┬──────────────────┐
    │ u32 external │ u8 pad    │ u8        │ i32 packed       │
    │ length       │ count     │ optimized │ difference       │
    └──────────────┴───────────┴───────────┴──────────────────┘

followed by either the stored bytes themselves (optimized, when they fit in a
quarter of a page) or the cluster chain:

    ┌──────────────┬──────────────┬─────────────────────────────┐
    │ u16 pages    │ u16 cluster  │ cluster count × u64 cluster │
    │ per cluster  │ count        │ position                    │
    └──────────────┴──────────────┴─────────────────────────────┘

The external length counts the bytes actually stored: after compression and
after the encryption padding. The logical length is recovered as
`external - pad + packed difference`.

Formatting runs compression first, then padding and encryption, then splits
the stored bytes into at most four clusters of at most 65535 pages. Every
cluster but the last holds `pages per cluster` pages, the last one holds the
remainder.
*/

pub mod cache;
pub mod compress;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

pub use self::cache::{ExtendedKey, PostponedCache};
pub use self::compress::{CompressionError, Compressor, Lz4Compressor};
use crate::bail_corrupt_error;
use crate::error::RowStoreError;
use crate::row::Row;
use crate::storage::{round_up, DataStorage};
use crate::types::ColumnType;
use crate::value::{decode_text, encode_text, Value};
use crate::Result;

pub const MAX_CLUSTERS: usize = 4;
pub const MAX_PAGES_PER_CLUSTER: usize = u16::MAX as usize;

const DESCRIPTOR_LEN: usize = 4 + 1 + 1 + 4;
const CHAIN_HEADER_LEN: usize = 2 + 2;
const CLUSTER_ID_LEN: usize = 8;

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExtendedOptions {
    /// Compress payloads of cells flagged as packed.
    pub compression: bool,
    /// Byte budget of the postponed read cache.
    pub cache_capacity: u64,
    /// Idle time after which a cached postponed payload is dropped.
    pub cache_time_to_idle: Duration,
}

impl Default for ExtendedOptions {
    fn default() -> Self {
        Self {
            compression: true,
            cache_capacity: 64 << 20,
            cache_time_to_idle: Duration::from_secs(60),
        }
    }
}

/// Shared context of the extended layer: options, the compressor and the
/// postponed read cache.
#[derive(Clone)]
pub struct ExtendedStore {
    options: ExtendedOptions,
    compressor: Arc<dyn Compressor>,
    cache: PostponedCache,
}

impl ExtendedStore {
    pub fn new(options: ExtendedOptions) -> Self {
        let cache = PostponedCache::new(options.cache_capacity, options.cache_time_to_idle);
        Self {
            options,
            compressor: Arc::new(Lz4Compressor),
            cache,
        }
    }

    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = compressor;
        self
    }

    pub fn options(&self) -> &ExtendedOptions {
        &self.options
    }

    pub fn cache(&self) -> &PostponedCache {
        &self.cache
    }
}

impl Default for ExtendedStore {
    fn default() -> Self {
        Self::new(ExtendedOptions::default())
    }
}

impl fmt::Debug for ExtendedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedStore")
            .field("options", &self.options)
            .field("cache", &self.cache)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterChain {
    pub pages_per_cluster: u16,
    pub clusters: Vec<u64>,
}

/// Where the persisted form of an extended value lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadLocation {
    /// Nothing persisted; the value only exists in the owning cell.
    Inline,
    /// Stored bytes embedded in the row payload.
    Optimized(Vec<u8>),
    Clustered(ClusterChain),
}

struct PostponedRead {
    key: ExtendedKey,
    row_key: Arc<Row>,
    cache: PostponedCache,
    compressor: Arc<dyn Compressor>,
    loaded: bool,
}

impl fmt::Debug for PostponedRead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostponedRead")
            .field("key", &self.key)
            .field("loaded", &self.loaded)
            .finish()
    }
}

/// Fixed part of the inline descriptor.
#[derive(Debug, Clone, Copy, Default)]
struct Descriptor {
    external_length: u32,
    pad_count: u8,
    packed_difference: i32,
}

#[derive(Debug)]
struct ExtendedState {
    location: PayloadLocation,
    descriptor: Descriptor,
    dirty: bool,
    freed: bool,
    monitor: Option<PostponedRead>,
}

impl ExtendedState {
    fn empty() -> Self {
        Self {
            location: PayloadLocation::Inline,
            descriptor: Descriptor::default(),
            dirty: false,
            freed: false,
            monitor: None,
        }
    }
}

/// Splits `pages` into clusters, returning the pages per cluster and the
/// cluster count.
pub fn cluster_geometry(pages: usize, bytes: usize) -> Result<(u16, usize)> {
    let clusters = pages.div_ceil(MAX_PAGES_PER_CLUSTER).max(1);
    if clusters > MAX_CLUSTERS {
        return Err(RowStoreError::FieldTooLarge {
            bytes,
            max_clusters: MAX_CLUSTERS,
        });
    }
    let per_cluster = pages.div_ceil(clusters) as u16;
    Ok((per_cluster, clusters))
}

/// Page count of cluster `index` in a chain storing `total_pages` pages.
fn pages_in_cluster(index: usize, count: usize, per_cluster: u16, total_pages: usize) -> Result<u16> {
    if index + 1 < count {
        return Ok(per_cluster);
    }
    // the last cluster takes the remainder and must hold at least one page
    let last = (per_cluster as usize)
        .checked_mul(count.saturating_sub(1))
        .and_then(|full| total_pages.checked_sub(full))
        .filter(|&last| last >= 1 && last <= per_cluster as usize)
        .and_then(|last| u16::try_from(last).ok());
    match last {
        Some(last) => Ok(last),
        None => bail_corrupt_error!(
            "cluster chain of {count} x {per_cluster} pages cannot hold {total_pages} pages"
        ),
    }
}

/// Transfers page sized chunks between a byte buffer and consecutive pages
/// of the storage, keeping a running count of transferred bytes.
struct PageCursor<'a> {
    storage: &'a dyn DataStorage,
    page: Vec<u8>,
    transferred: usize,
}

impl<'a> PageCursor<'a> {
    fn new(storage: &'a dyn DataStorage) -> Self {
        let page = vec![0; storage.page_size().bytes()];
        Self {
            storage,
            page,
            transferred: 0,
        }
    }

    fn write_cluster(&mut self, position: u64, pages: u16, data: &[u8]) -> Result<()> {
        let page_size = self.page.len();
        for i in 0..pages as usize {
            let start = self.transferred.min(data.len());
            let end = (start + page_size).min(data.len());
            let chunk = &data[start..end];
            self.page[..chunk.len()].copy_from_slice(chunk);
            self.page[chunk.len()..].fill(0);
            self.storage
                .write_page(position + (i * page_size) as u64, &self.page)?;
            self.transferred += chunk.len();
        }
        Ok(())
    }

    fn read_cluster(&mut self, position: u64, pages: u16, out: &mut Vec<u8>, total: usize) -> Result<()> {
        let page_size = self.page.len();
        for i in 0..pages as usize {
            if self.transferred >= total {
                break;
            }
            self.storage
                .read_page(position + (i * page_size) as u64, &mut self.page)?;
            let take = (total - self.transferred).min(page_size);
            out.extend_from_slice(&self.page[..take]);
            self.transferred += take;
        }
        Ok(())
    }
}

/// Extended state of one Text, NText or Image cell.
pub struct ExtendedValue {
    state: Mutex<ExtendedState>,
}

impl ExtendedValue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ExtendedState::empty()),
        }
    }

    pub fn mark_dirty(&self) {
        let mut state = self.state.lock();
        state.dirty = true;
        state.monitor = None;
    }

    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    pub fn is_postponed(&self) -> bool {
        self.state.lock().monitor.is_some()
    }

    /// Whether the descriptor points at stored bytes that the owning cell
    /// has not overwritten.
    pub fn is_persisted(&self) -> bool {
        let state = self.state.lock();
        !state.dirty && state.location != PayloadLocation::Inline
    }

    pub fn is_optimized(&self) -> bool {
        matches!(self.state.lock().location, PayloadLocation::Optimized(_))
    }

    pub fn location(&self) -> PayloadLocation {
        self.state.lock().location.clone()
    }

    pub fn duplicate(&self) -> Self {
        let state = self.state.lock();
        let monitor = state.monitor.as_ref().map(|m| PostponedRead {
            key: m.key.clone(),
            row_key: m.row_key.clone(),
            cache: m.cache.clone(),
            compressor: m.compressor.clone(),
            loaded: m.loaded,
        });
        Self {
            state: Mutex::new(ExtendedState {
                location: state.location.clone(),
                descriptor: state.descriptor,
                dirty: state.dirty,
                freed: state.freed,
                monitor,
            }),
        }
    }

    // None when nothing goes to clusters
    fn format_buffer(
        state: &mut ExtendedState,
        storage: &dyn DataStorage,
        store: &ExtendedStore,
        payload: Option<&[u8]>,
        packed: bool,
    ) -> Result<Option<(Vec<u8>, u16, usize)>> {
        state.location = PayloadLocation::Inline;
        state.descriptor = Descriptor::default();
        let Some(payload) = payload else {
            return Ok(None);
        };
        let page_size = storage.page_size().bytes();

        let mut stored = None;
        if packed && store.options.compression && payload.len() > page_size {
            match store.compressor.compress(payload) {
                Ok(compressed)
                    if compressed.len().div_ceil(page_size) < payload.len().div_ceil(page_size) =>
                {
                    state.descriptor.packed_difference = (payload.len() - compressed.len()) as i32;
                    stored = Some(compressed);
                }
                Ok(_) => {}
                Err(err) => tracing::debug!(error = %err, "compression failed, storing raw payload"),
            }
        }
        let mut stored = stored.unwrap_or_else(|| payload.to_vec());

        if stored.len() <= page_size / 4 {
            tracing::debug!(
                bytes = stored.len(),
                packed_difference = state.descriptor.packed_difference,
                "extended value stored optimized"
            );
            state.descriptor.external_length = stored.len() as u32;
            state.location = PayloadLocation::Optimized(stored);
            return Ok(None);
        }

        if let Some(encryption) = storage.encryption() {
            let padded = round_up(stored.len(), encryption.step());
            let Ok(pad_count) = u8::try_from(padded - stored.len()) else {
                return Err(RowStoreError::Encryption(format!(
                    "cipher step {} is too large for extended padding",
                    encryption.step()
                )));
            };
            stored.resize(padded, 0);
            encryption.encrypt(&mut stored)?;
            state.descriptor.pad_count = pad_count;
        }

        let Ok(external_length) = u32::try_from(stored.len()) else {
            return Err(RowStoreError::FieldTooLarge {
                bytes: payload.len(),
                max_clusters: MAX_CLUSTERS,
            });
        };
        let pages = stored.len().div_ceil(page_size);
        let (per_cluster, clusters) = cluster_geometry(pages, payload.len())?;
        state.descriptor.external_length = external_length;
        tracing::debug!(
            bytes = stored.len(),
            pages,
            per_cluster,
            clusters,
            pad_count = state.descriptor.pad_count,
            packed_difference = state.descriptor.packed_difference,
            "extended value stored in clusters"
        );
        Ok(Some((stored, per_cluster, clusters)))
    }

    /// Formats `payload` and writes it to newly allocated clusters. A cell
    /// that has not changed since its last write is left alone.
    pub fn write(
        &self,
        storage: &dyn DataStorage,
        store: &ExtendedStore,
        payload: Option<&[u8]>,
        packed: bool,
    ) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if !state.dirty {
            return Ok(());
        }
        let formatted = Self::format_buffer(state, storage, store, payload, packed)?;
        if let Some((stored, per_cluster, count)) = formatted {
            let total_pages = stored.len().div_ceil(storage.page_size().bytes());
            let mut cursor = PageCursor::new(storage);
            let mut clusters = Vec::with_capacity(count);
            for index in 0..count {
                let pages = pages_in_cluster(index, count, per_cluster, total_pages)?;
                let position = storage.get_free_cluster(pages)?;
                tracing::trace!(position, pages, "allocated extended cluster");
                cursor.write_cluster(position, pages, &stored)?;
                clusters.push(position);
            }
            state.location = PayloadLocation::Clustered(ClusterChain {
                pages_per_cluster: per_cluster,
                clusters,
            });
        }
        state.dirty = false;
        state.freed = false;
        state.monitor = None;
        Ok(())
    }

    fn unpack(stored: Vec<u8>, packed_difference: i32, compressor: &dyn Compressor) -> Vec<u8> {
        if packed_difference == 0 {
            return stored;
        }
        let logical = (stored.len() as i64 + packed_difference as i64).max(0) as usize;
        match compressor.decompress(&stored, logical) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = %err, "failed to unpack extended value, using stored bytes");
                stored
            }
        }
    }

    fn load_clusters(
        descriptor: Descriptor,
        chain: &ClusterChain,
        storage: &dyn DataStorage,
        compressor: &dyn Compressor,
    ) -> Result<Vec<u8>> {
        let total = descriptor.external_length as usize;
        let total_pages = total.div_ceil(storage.page_size().bytes());
        let count = chain.clusters.len();
        let mut stored = Vec::with_capacity(total);
        let sizes = (0..count)
            .map(|index| pages_in_cluster(index, count, chain.pages_per_cluster, total_pages))
            .collect::<Result<Vec<_>>>()?;
        let mut cursor = PageCursor::new(storage);
        for (&position, pages) in chain.clusters.iter().zip(sizes) {
            cursor.read_cluster(position, pages, &mut stored, total)?;
        }
        if stored.len() != total {
            bail_corrupt_error!(
                "extended clusters hold {} bytes, descriptor announces {total}",
                stored.len()
            );
        }
        if let Some(encryption) = storage.encryption() {
            encryption.decrypt(&mut stored)?;
            let logical = stored.len().saturating_sub(descriptor.pad_count as usize);
            stored.truncate(logical);
        }
        Ok(Self::unpack(stored, descriptor.packed_difference, compressor))
    }

    /// Materializes the payload described by the descriptor.
    pub fn read(&self, storage: &dyn DataStorage, store: &ExtendedStore) -> Result<Option<Vec<u8>>> {
        let mut state = self.state.lock();
        let payload = match &state.location {
            PayloadLocation::Inline => None,
            PayloadLocation::Optimized(bytes) => Some(Self::unpack(
                bytes.clone(),
                state.descriptor.packed_difference,
                store.compressor.as_ref(),
            )),
            PayloadLocation::Clustered(chain) => Some(Self::load_clusters(
                state.descriptor,
                chain,
                storage,
                store.compressor.as_ref(),
            )?),
        };
        state.monitor = None;
        Ok(payload)
    }

    /// Defers the read of a clustered payload until first access by
    /// installing a monitor keyed by `key`. Returns `false`, leaving the
    /// cell untouched, when the payload is not clustered.
    pub fn postpone(&self, store: &ExtendedStore, key: ExtendedKey, row_key: Arc<Row>) -> bool {
        let mut state = self.state.lock();
        if !matches!(state.location, PayloadLocation::Clustered(_)) {
            return false;
        }
        store.cache.invalidate(&key);
        state.monitor = Some(PostponedRead {
            key,
            row_key,
            cache: store.cache.clone(),
            compressor: store.compressor.clone(),
            loaded: false,
        });
        true
    }

    /// Resolves a postponed read. The cache is consulted under the cell lock;
    /// the first miss reads the clusters, later misses ask the storage to
    /// re-read the value by row key.
    pub fn load_postponed(&self, storage: &dyn DataStorage) -> Result<Option<Vec<u8>>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(monitor) = state.monitor.as_mut() else {
            return Ok(None);
        };
        if let Some(hit) = monitor.cache.get(&monitor.key) {
            return Ok(Some(hit.as_ref().clone()));
        }
        let payload = match &state.location {
            PayloadLocation::Clustered(chain) if !monitor.loaded => Some(Self::load_clusters(
                state.descriptor,
                chain,
                storage,
                monitor.compressor.as_ref(),
            )?),
            _ => {
                tracing::warn!(
                    storage = %monitor.key.storage,
                    row_id = monitor.key.row_id,
                    column = monitor.key.column,
                    "postponed payload evicted, re-reading by row key"
                );
                storage
                    .reread_extended_column(monitor.key.column, &monitor.row_key)
                    .map_err(|err| err.in_storage(storage.name(), monitor.key.row_id))?
            }
        };
        monitor.loaded = true;
        if let Some(bytes) = &payload {
            monitor
                .cache
                .insert(monitor.key.clone(), Arc::new(bytes.clone()));
        }
        Ok(payload)
    }

    /// Releases the clusters of the last written payload. Calling it again
    /// before the next write is a no-op.
    pub fn free_space(&self, storage: &dyn DataStorage) -> Result<()> {
        let mut state = self.state.lock();
        if state.freed {
            tracing::warn!("extended clusters already released");
            return Ok(());
        }
        if let PayloadLocation::Clustered(chain) = &state.location {
            let total_pages = (state.descriptor.external_length as usize).div_ceil(storage.page_size().bytes());
            let count = chain.clusters.len();
            // check the whole chain before releasing anything
            let sizes = (0..count)
                .map(|index| pages_in_cluster(index, count, chain.pages_per_cluster, total_pages))
                .collect::<Result<Vec<_>>>()?;
            for (&position, pages) in chain.clusters.iter().zip(sizes) {
                storage.set_free_cluster(position, pages)?;
                tracing::trace!(position, pages, "released extended cluster");
            }
        }
        state.freed = true;
        Ok(())
    }

    pub fn inline_len(&self) -> usize {
        let state = self.state.lock();
        DESCRIPTOR_LEN
            + match &state.location {
                PayloadLocation::Optimized(bytes) => bytes.len(),
                PayloadLocation::Clustered(chain) => {
                    CHAIN_HEADER_LEN + chain.clusters.len() * CLUSTER_ID_LEN
                }
                PayloadLocation::Inline => CHAIN_HEADER_LEN,
            }
    }

    pub fn encode_inline(&self, out: &mut Vec<u8>) {
        let state = self.state.lock();
        out.extend_from_slice(&state.descriptor.external_length.to_le_bytes());
        out.push(state.descriptor.pad_count);
        out.push(matches!(state.location, PayloadLocation::Optimized(_)) as u8);
        out.extend_from_slice(&state.descriptor.packed_difference.to_le_bytes());
        match &state.location {
            PayloadLocation::Optimized(bytes) => out.extend_from_slice(bytes),
            PayloadLocation::Clustered(chain) => {
                out.extend_from_slice(&chain.pages_per_cluster.to_le_bytes());
                out.extend_from_slice(&(chain.clusters.len() as u16).to_le_bytes());
                for id in &chain.clusters {
                    out.extend_from_slice(&id.to_le_bytes());
                }
            }
            PayloadLocation::Inline => out.extend_from_slice(&[0; CHAIN_HEADER_LEN]),
        }
    }

    pub fn decode_inline(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < DESCRIPTOR_LEN {
            bail_corrupt_error!("extended descriptor needs {DESCRIPTOR_LEN} bytes, got {}", bytes.len());
        }
        let external_length = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let pad_count = bytes[4];
        let optimized = bytes[5];
        let packed_difference = i32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
        let body = &bytes[DESCRIPTOR_LEN..];

        let location = match optimized {
            1 => {
                if body.len() != external_length as usize {
                    bail_corrupt_error!(
                        "optimized extended value has {} bytes, descriptor announces {external_length}",
                        body.len()
                    );
                }
                PayloadLocation::Optimized(body.to_vec())
            }
            0 => {
                if body.len() < CHAIN_HEADER_LEN {
                    bail_corrupt_error!("extended cluster chain header truncated");
                }
                let pages_per_cluster = u16::from_le_bytes([body[0], body[1]]);
                let count = u16::from_le_bytes([body[2], body[3]]) as usize;
                if count > MAX_CLUSTERS {
                    bail_corrupt_error!("extended value spans {count} clusters");
                }
                let ids = &body[CHAIN_HEADER_LEN..];
                if ids.len() != count * CLUSTER_ID_LEN {
                    bail_corrupt_error!("extended cluster chain expects {count} ids");
                }
                if count == 0 {
                    PayloadLocation::Inline
                } else {
                    let clusters = ids
                        .chunks_exact(CLUSTER_ID_LEN)
                        .map(|c| u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                        .collect();
                    PayloadLocation::Clustered(ClusterChain {
                        pages_per_cluster,
                        clusters,
                    })
                }
            }
            flag => bail_corrupt_error!("invalid optimized flag {flag}"),
        };
        Ok(Self {
            state: Mutex::new(ExtendedState {
                location,
                descriptor: Descriptor {
                    external_length,
                    pad_count,
                    packed_difference,
                },
                dirty: false,
                freed: false,
                monitor: None,
            }),
        })
    }
}

impl Default for ExtendedValue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExtendedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ExtendedValue")
            .field("location", &state.location)
            .field("external_length", &state.descriptor.external_length)
            .field("dirty", &state.dirty)
            .field("postponed", &state.monitor.is_some())
            .finish()
    }
}

/// Logical payload bytes of an extended cell value.
pub fn payload_bytes(kind: ColumnType, value: &Value) -> Vec<u8> {
    match value {
        Value::Bytes(b) => b.clone(),
        Value::Text(s) => encode_text(kind, s),
        other => encode_text(kind, &other.to_string()),
    }
}

pub fn payload_value(kind: ColumnType, bytes: Vec<u8>) -> Result<Value> {
    if kind.is_binary() {
        return Ok(Value::Bytes(bytes));
    }
    decode_text(kind, &bytes).map(Value::Text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::tests::XorCipher;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::PageSize;
    use rstest::rstest;

    fn dummy_row() -> Row {
        Row::new(1, Default::default(), true)
    }

    fn key() -> ExtendedKey {
        ExtendedKey::new("test", 1, 0)
    }

    fn write(storage: &MemoryStorage, store: &ExtendedStore, payload: &[u8], packed: bool) -> ExtendedValue {
        let ext = ExtendedValue::new();
        ext.mark_dirty();
        ext.write(storage, store, Some(payload), packed).unwrap();
        ext
    }

    fn read_back(ext: &ExtendedValue, storage: &MemoryStorage, store: &ExtendedStore) -> Option<Vec<u8>> {
        let mut inline = Vec::new();
        ext.encode_inline(&mut inline);
        assert_eq!(inline.len(), ext.inline_len());
        let decoded = ExtendedValue::decode_inline(&inline).unwrap();
        decoded.read(storage, store).unwrap()
    }

    #[rstest]
    #[case(1024, 256, true)]
    #[case(1024, 257, false)]
    #[case(4096, 1024, true)]
    #[case(4096, 1025, false)]
    fn test_optimized_threshold(#[case] page_size: u32, #[case] len: usize, #[case] optimized: bool) {
        let storage = MemoryStorage::new("t", PageSize::try_new(page_size).unwrap());
        let store = ExtendedStore::default();
        let payload: Vec<u8> = (0..len).map(|i| (i * 7 % 251) as u8).collect();

        let ext = write(&storage, &store, &payload, false);
        assert_eq!(ext.is_optimized(), optimized);
        assert_eq!(storage.allocated_pages() > 0, !optimized);
        assert_eq!(read_back(&ext, &storage, &store), Some(payload));
    }

    #[test]
    fn test_compression_must_save_a_page() {
        let storage = MemoryStorage::new("t", PageSize::try_new(1024).unwrap());
        let store = ExtendedStore::default();
        let payload = vec![b'a'; 10 * 1024];

        let ext = write(&storage, &store, &payload, true);
        // compresses down to a handful of bytes, small enough to inline
        assert!(ext.is_optimized());
        assert_eq!(storage.allocated_pages(), 0);
        assert_eq!(read_back(&ext, &storage, &store), Some(payload.clone()));

        let unpacked = write(&storage, &store, &payload, false);
        assert!(!unpacked.is_optimized());
        assert_eq!(storage.allocated_pages(), 10);
    }

    #[test]
    fn test_compression_disabled_by_options() {
        let storage = MemoryStorage::new("t", PageSize::try_new(1024).unwrap());
        let store = ExtendedStore::new(ExtendedOptions {
            compression: false,
            ..Default::default()
        });
        let ext = write(&storage, &store, &vec![0; 4096], true);
        assert!(!ext.is_optimized());
        assert_eq!(storage.allocated_pages(), 4);
    }

    #[test]
    fn test_encrypted_payload_is_padded() {
        let storage = MemoryStorage::new("t", PageSize::try_new(1024).unwrap())
            .with_encryption(Arc::new(XorCipher::new(16)));
        let store = ExtendedStore::default();
        let payload: Vec<u8> = (0..1500u32).map(|i| i as u8).collect();

        let ext = write(&storage, &store, &payload, false);
        let mut inline = Vec::new();
        ext.encode_inline(&mut inline);
        let external = u32::from_le_bytes(inline[..4].try_into().unwrap());
        assert_eq!(external, 1504);
        assert_eq!(inline[4], 4);
        assert_eq!(read_back(&ext, &storage, &store), Some(payload));
    }

    #[rstest]
    #[case(1, 1, 1)]
    #[case(65_535, 65_535, 1)]
    #[case(65_536, 32_768, 2)]
    #[case(200_000, 50_000, 4)]
    #[case(262_140, 65_535, 4)]
    fn test_cluster_geometry(#[case] pages: usize, #[case] per: u16, #[case] clusters: usize) {
        assert_eq!(cluster_geometry(pages, 0).unwrap(), (per, clusters));
        let last = pages_in_cluster(clusters - 1, clusters, per, pages).unwrap() as usize;
        assert!(last >= 1 && last <= per as usize);
        assert_eq!(per as usize * (clusters - 1) + last, pages);
    }

    #[test]
    fn test_too_many_clusters() {
        let err = cluster_geometry(4 * 65_535 + 1, 123).unwrap_err();
        assert!(matches!(err, RowStoreError::FieldTooLarge { bytes: 123, max_clusters: 4 }));
    }

    #[test]
    fn test_free_space_is_idempotent() {
        let storage = MemoryStorage::new("t", PageSize::try_new(1024).unwrap());
        let store = ExtendedStore::default();
        let ext = write(&storage, &store, &vec![9; 3000], false);
        assert_eq!(storage.allocated_pages(), 3);

        ext.free_space(&storage).unwrap();
        assert_eq!(storage.allocated_pages(), 0);
        ext.free_space(&storage).unwrap();
        assert_eq!(storage.allocated_pages(), 0);
    }

    #[test]
    fn test_null_payload_clears_descriptor() {
        let storage = MemoryStorage::new("t", PageSize::default());
        let store = ExtendedStore::default();
        let ext = ExtendedValue::new();
        ext.mark_dirty();
        ext.write(&storage, &store, None, false).unwrap();
        assert!(!ext.is_dirty());
        assert_eq!(ext.location(), PayloadLocation::Inline);
        assert_eq!(read_back(&ext, &storage, &store), None);
    }

    #[test]
    fn test_postponed_read_uses_cache() {
        let storage = MemoryStorage::new("t", PageSize::try_new(1024).unwrap());
        let store = ExtendedStore::default();
        let payload = vec![5; 2000];
        let ext = write(&storage, &store, &payload, false);

        let mut inline = Vec::new();
        ext.encode_inline(&mut inline);
        let decoded = ExtendedValue::decode_inline(&inline).unwrap();
        assert!(decoded.postpone(&store, key(), Arc::new(dummy_row())));
        assert!(decoded.is_postponed());

        assert_eq!(decoded.load_postponed(&storage).unwrap(), Some(payload.clone()));
        assert!(store.cache().get(&key()).is_some());
        assert_eq!(decoded.load_postponed(&storage).unwrap(), Some(payload));
    }

    #[test]
    fn test_optimized_value_is_not_postponed() {
        let storage = MemoryStorage::new("t", PageSize::default());
        let store = ExtendedStore::default();
        let ext = write(&storage, &store, b"short", false);
        assert!(!ext.postpone(&store, key(), Arc::new(dummy_row())));
        assert!(!ext.is_postponed());
        assert_eq!(ext.read(&storage, &store).unwrap(), Some(b"short".to_vec()));
    }

    #[test]
    fn test_corrupt_descriptor() {
        assert!(ExtendedValue::decode_inline(&[0; 5]).is_err());
        let mut bad_flag = vec![0; DESCRIPTOR_LEN + CHAIN_HEADER_LEN];
        bad_flag[5] = 7;
        assert!(ExtendedValue::decode_inline(&bad_flag).is_err());
    }

    #[rstest]
    #[case(10, 100, &[1024, 2048])]
    #[case(5000, 1, &[1024, 2048])]
    #[case(3000, 0, &[1024, 2048])]
    fn test_chain_geometry_mismatch_is_corrupt(
        #[case] external_length: u32,
        #[case] pages_per_cluster: u16,
        #[case] ids: &[u64],
    ) {
        let storage = MemoryStorage::new("t", PageSize::try_new(1024).unwrap());
        let store = ExtendedStore::default();
        let mut inline = Vec::new();
        inline.extend_from_slice(&external_length.to_le_bytes());
        inline.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
        inline.extend_from_slice(&pages_per_cluster.to_le_bytes());
        inline.extend_from_slice(&(ids.len() as u16).to_le_bytes());
        for id in ids {
            inline.extend_from_slice(&id.to_le_bytes());
        }

        let ext = ExtendedValue::decode_inline(&inline).unwrap();
        assert!(matches!(ext.read(&storage, &store), Err(RowStoreError::Corrupt(_))));
        assert!(matches!(ext.free_space(&storage), Err(RowStoreError::Corrupt(_))));
    }
}
