//! Storage header: a fixed schema row kept in row slot 0 of every storage.

use crate::bail_corrupt_error;
use crate::column::Column;
use crate::error::RowStoreError;
use crate::row::{FormatScope, Row, RowVersion};
use crate::storage::{DataStorage, PageSize};
use crate::types::ColumnType;
use crate::value::Value;
use crate::Result;

/// Position of the header row inside a storage.
pub const HEADER_POSITION: u64 = 0;

const PAGE_SIZE: usize = 0;
const SIGNATURE: usize = 1;
const LOCALE: usize = 2;
const ROW_COUNTER: usize = 3;
const EXTENSION_COUNTER: usize = 4;
const SCHEMA_VERSION: usize = 5;

#[derive(Debug)]
pub struct Header {
    row: Row,
}

impl Header {
    pub const SIGNATURE: &'static str = "RowStore data storage";

    fn schema() -> Row {
        Row::new(0, RowVersion::default(), true)
            .with_column(Column::new(ColumnType::Int))
            .with_column(Column::new(ColumnType::VarChar))
            .with_column(Column::new(ColumnType::NVarChar))
            .with_column(Column::new(ColumnType::BigInt))
            .with_column(Column::new(ColumnType::BigInt))
            .with_column(Column::new(ColumnType::Int))
    }

    pub fn new(page_size: u32, locale: &str, schema_version: u32) -> Result<Self> {
        let page_size = PageSize::try_new(page_size)?;
        let mut row = Self::schema();
        row.set_value(PAGE_SIZE, Value::I32(page_size.get() as i32))?;
        row.set_value(SIGNATURE, Value::Text(Self::SIGNATURE.into()))?;
        row.set_value(LOCALE, Value::Text(locale.into()))?;
        row.set_value(ROW_COUNTER, Value::I64(0))?;
        row.set_value(EXTENSION_COUNTER, Value::I64(0))?;
        row.set_value(SCHEMA_VERSION, Value::I32(schema_version as i32))?;
        Ok(Self { row })
    }

    fn int(&self, index: usize) -> i64 {
        match self.row.value(index) {
            Some(Value::I32(n)) => *n as i64,
            Some(Value::I64(n)) => *n,
            _ => 0,
        }
    }

    fn text(&self, index: usize) -> Option<&str> {
        match self.row.value(index) {
            Some(Value::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn page_size(&self) -> Result<PageSize> {
        let raw = self.int(PAGE_SIZE);
        let size = u32::try_from(raw).map_err(|_| RowStoreError::InvalidPageSize(0))?;
        PageSize::try_new(size)
    }

    pub fn signature(&self) -> Option<&str> {
        self.text(SIGNATURE)
    }

    pub fn locale(&self) -> Option<&str> {
        self.text(LOCALE)
    }

    pub fn schema_version(&self) -> u32 {
        self.int(SCHEMA_VERSION) as u32
    }

    pub fn row_counter(&self) -> u64 {
        self.int(ROW_COUNTER) as u64
    }

    pub fn extension_counter(&self) -> u64 {
        self.int(EXTENSION_COUNTER) as u64
    }

    fn bump(&mut self, index: usize) -> Result<u64> {
        let next = self.int(index) + 1;
        self.row.set_value(index, Value::I64(next))?;
        Ok(next as u64)
    }

    /// Reserves the next row id.
    pub fn next_row_id(&mut self) -> Result<u32> {
        let next = self.bump(ROW_COUNTER)?;
        u32::try_from(next).map_err(|_| RowStoreError::range(ColumnType::Int, next))
    }

    pub fn next_extension_id(&mut self) -> Result<u64> {
        self.bump(EXTENSION_COUNTER)
    }

    pub fn row(&self) -> &Row {
        &self.row
    }

    pub fn write(&mut self, storage: &dyn DataStorage) -> Result<()> {
        let buffer = self.row.format_row_buffer(None, FormatScope::Full)?;
        storage
            .write_row(HEADER_POSITION, buffer)
            .map_err(|err| err.in_storage(storage.name(), 0))?;
        tracing::debug!(storage = storage.name(), "header written");
        Ok(())
    }

    /// Reads the header back and checks it against the storage it came from
    /// and the schema version the caller understands.
    pub fn read(storage: &dyn DataStorage, expected_version: u32) -> Result<Self> {
        Self::read_checked(storage, expected_version).map_err(|err| err.in_storage(storage.name(), 0))
    }

    fn read_checked(storage: &dyn DataStorage, expected_version: u32) -> Result<Self> {
        let buffer = storage.read_row(HEADER_POSITION)?;
        let mut row = Self::schema();
        row.unformat_row_buffer(&buffer, None, FormatScope::Full)?;
        let header = Self { row };

        if header.signature() != Some(Self::SIGNATURE) {
            bail_corrupt_error!("storage signature {:?} not recognized", header.signature());
        }
        let page_size = header.page_size()?;
        if page_size != storage.page_size() {
            return Err(RowStoreError::InvalidPageSize(page_size.get()));
        }
        let found = header.schema_version();
        if found != expected_version {
            return Err(RowStoreError::SchemaVersion {
                expected: expected_version,
                found,
            });
        }
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::storage::memory::MemoryStorage;

    fn storage() -> MemoryStorage {
        MemoryStorage::new("hdr", PageSize::try_new(2048).unwrap())
    }

    #[test]
    fn test_write_then_read() {
        let storage = storage();
        let mut header = Header::new(2048, "en-US", 3).unwrap();
        header.next_row_id().unwrap();
        assert_eq!(header.next_row_id().unwrap(), 2);
        assert_eq!(header.next_extension_id().unwrap(), 1);
        header.write(&storage).unwrap();

        let read = Header::read(&storage, 3).unwrap();
        assert_eq!(read.page_size().unwrap().get(), 2048);
        assert_eq!(read.signature(), Some(Header::SIGNATURE));
        assert_eq!(read.locale(), Some("en-US"));
        assert_eq!(read.row_counter(), 2);
        assert_eq!(read.extension_counter(), 1);
        assert_eq!(read.schema_version(), 3);
    }

    #[rstest]
    #[case(1000)]
    #[case(20480)]
    fn test_invalid_page_size(#[case] size: u32) {
        assert!(matches!(
            Header::new(size, "", 1).unwrap_err(),
            RowStoreError::InvalidPageSize(s) if s == size
        ));
    }

    #[test]
    fn test_schema_version_mismatch_is_wrapped() {
        let storage = storage();
        Header::new(2048, "de-DE", 4).unwrap().write(&storage).unwrap();
        let err = Header::read(&storage, 5).unwrap_err();
        let RowStoreError::Storage { storage: name, row_id, source } = err else {
            panic!("expected a storage error");
        };
        assert_eq!(name, "hdr");
        assert_eq!(row_id, 0);
        assert!(matches!(*source, RowStoreError::SchemaVersion { expected: 5, found: 4 }));
    }

    #[test]
    fn test_page_size_must_match_storage() {
        let storage = storage();
        Header::new(4096, "", 1).unwrap().write(&storage).unwrap();
        let err = Header::read(&storage, 1).unwrap_err();
        assert!(matches!(
            err,
            RowStoreError::Storage { source, .. } if matches!(*source, RowStoreError::InvalidPageSize(4096))
        ));
    }

    #[test]
    fn test_foreign_signature_is_corrupt() {
        let storage = storage();
        let mut header = Header::new(2048, "", 1).unwrap();
        header.row.set_value(SIGNATURE, Value::Text("other".into())).unwrap();
        header.write(&storage).unwrap();
        assert!(matches!(
            Header::read(&storage, 1).unwrap_err(),
            RowStoreError::Storage { source, .. } if matches!(*source, RowStoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_missing_header() {
        assert!(Header::read(&storage(), 1).is_err());
    }
}
