//! Storage collaborator contracts.
//!
//! The row core never touches files. Everything it persists goes through a
//! [`DataStorage`]: fixed size page I/O for extended clusters, raw row buffers
//! addressed by position, and a cluster allocator.

pub mod memory;

use std::fmt;
use std::sync::Arc;

use pack1::U16LE;

use crate::error::RowStoreError;
use crate::row::Row;
use crate::Result;

/// Page size of a storage. Stored little endian, the way it appears in the
/// header row.
#[derive(Clone, Copy)]
pub struct PageSize(U16LE);

impl PageSize {
    pub const MIN: u32 = 1024;
    pub const MAX: u32 = 16384;
    pub const DEFAULT: u16 = 4096;

    pub const fn new(size: u32) -> Option<Self> {
        if size < PageSize::MIN || size > PageSize::MAX {
            return None;
        }
        // whole kilobytes only
        if size % 1024 != 0 {
            return None;
        }
        Some(Self(U16LE::new(size as u16)))
    }

    pub fn try_new(size: u32) -> Result<Self> {
        Self::new(size).ok_or(RowStoreError::InvalidPageSize(size))
    }

    pub const fn get(self) -> u32 {
        self.0.get() as u32
    }

    pub const fn bytes(self) -> usize {
        self.0.get() as usize
    }
}

impl Default for PageSize {
    fn default() -> Self {
        Self(U16LE::new(Self::DEFAULT))
    }
}

impl PartialEq for PageSize {
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

impl Eq for PageSize {}

impl fmt::Debug for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PageSize").field(&self.get()).finish()
    }
}

/// Block cipher context of a storage.
///
/// Buffers passed in are always a whole number of `step` sized blocks and
/// every block is transformed on its own, so a prefix of a run can be
/// decrypted before the rest of it has been read.
pub trait Encryption: Send + Sync {
    fn step(&self) -> usize;
    fn encrypt(&self, data: &mut [u8]) -> Result<()>;
    fn decrypt(&self, data: &mut [u8]) -> Result<()>;
}

/// Rounds `len` up to the next multiple of `step`.
#[inline]
pub const fn round_up(len: usize, step: usize) -> usize {
    if step <= 1 {
        return len;
    }
    len.div_ceil(step) * step
}

pub trait DataStorage: Send + Sync {
    fn name(&self) -> &str;

    fn page_size(&self) -> PageSize;

    fn encryption(&self) -> Option<Arc<dyn Encryption>>;

    /// Copies exactly one page stored at the page aligned `position` into
    /// `page`.
    fn read_page(&self, position: u64, page: &mut [u8]) -> Result<()>;

    fn write_page(&self, position: u64, page: &[u8]) -> Result<()>;

    /// Raw row buffer stored at `position`.
    fn read_row(&self, position: u64) -> Result<Vec<u8>>;

    fn write_row(&self, position: u64, buffer: &[u8]) -> Result<()>;

    /// Reserves `pages` contiguous pages and returns the position of the
    /// first one.
    fn get_free_cluster(&self, pages: u16) -> Result<u64>;

    fn set_free_cluster(&self, position: u64, pages: u16) -> Result<()>;

    /// Looks the row up by the key columns of `row_key` and materializes the
    /// payload of its extended `column`.
    fn reread_extended_column(&self, column: usize, row_key: &Row) -> Result<Option<Vec<u8>>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1024, true)]
    #[case(4096, true)]
    #[case(5120, true)]
    #[case(16384, true)]
    #[case(512, false)]
    #[case(1500, false)]
    #[case(17408, false)]
    #[case(32768, false)]
    fn test_page_size_validation(#[case] size: u32, #[case] valid: bool) {
        assert_eq!(PageSize::new(size).is_some(), valid);
        match PageSize::try_new(size) {
            Ok(ps) => assert_eq!(ps.get(), size),
            Err(err) => assert!(matches!(err, RowStoreError::InvalidPageSize(s) if s == size)),
        }
    }

    #[test]
    fn test_default_page_size() {
        assert_eq!(PageSize::default().bytes(), 4096);
    }

    #[rstest]
    #[case(0, 16, 0)]
    #[case(1, 16, 16)]
    #[case(16, 16, 16)]
    #[case(17, 16, 32)]
    #[case(5, 1, 5)]
    fn test_round_up(#[case] len: usize, #[case] step: usize, #[case] expected: usize) {
        assert_eq!(round_up(len, step), expected);
    }
}
