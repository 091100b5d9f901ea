//! Rows: ordered cells plus identity and version metadata.

pub mod compare;
pub mod format;
pub mod version;

use std::fmt;
use std::sync::Arc;

pub use self::format::FormatScope;
pub use self::version::RowVersion;
use crate::bail_corrupt_error;
use crate::column::Column;
use crate::error::RowStoreError;
use crate::extended::{ExtendedKey, ExtendedStore};
use crate::storage::{DataStorage, Encryption};
use crate::types::ColumnType;
use crate::value::Value;
use crate::Result;

const ROW_ID_OFFSET: usize = 4;

pub struct Row {
    row_id: u32,
    version: RowVersion,
    ref_position: Option<u64>,
    position: u64,
    ascending: bool,
    comparing_mask: Option<Vec<i16>>,
    columns: Vec<Column>,
    extensions: Option<Vec<usize>>,
    timestamp_index: Option<usize>,
    encryption: Option<Arc<dyn Encryption>>,
    buffer: Vec<u8>,
    format_length: usize,
}

impl Row {
    pub fn new(row_id: u32, version: RowVersion, ascending: bool) -> Self {
        Self {
            row_id,
            version,
            ref_position: None,
            position: 0,
            ascending,
            comparing_mask: None,
            columns: Vec::new(),
            extensions: None,
            timestamp_index: None,
            encryption: None,
            buffer: Vec::new(),
            format_length: 0,
        }
    }

    pub fn with_encryption(mut self, encryption: Arc<dyn Encryption>) -> Self {
        self.encryption = Some(encryption);
        self
    }

    pub fn with_mask(mut self, mask: Vec<i16>) -> Self {
        self.comparing_mask = Some(mask);
        self
    }

    /// Attaches a cell at the next ordinal.
    pub fn append_column(&mut self, mut column: Column) {
        let index = self.columns.len();
        column.set_row_index(index);
        if column.kind().is_extended() {
            self.extensions.get_or_insert_with(Vec::new).push(index);
        }
        if column.kind() == ColumnType::Timestamp
            && !column.is_system()
            && self.timestamp_index.is_none()
        {
            self.timestamp_index = Some(index);
        }
        self.columns.push(column);
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.append_column(column);
        self
    }

    #[inline]
    pub fn row_id(&self) -> u32 {
        self.row_id
    }

    pub fn set_row_id(&mut self, row_id: u32) {
        self.row_id = row_id;
    }

    #[inline]
    pub fn version(&self) -> RowVersion {
        self.version
    }

    pub fn set_version(&mut self, version: RowVersion) {
        self.version = version;
    }

    /// Back reference to the previous version of this row, if any.
    pub fn ref_position(&self) -> Option<u64> {
        self.ref_position
    }

    pub fn set_ref_position(&mut self, position: Option<u64>) {
        self.ref_position = position;
    }

    /// Physical location the row was read from or is written to.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn set_position(&mut self, position: u64) {
        self.position = position;
    }

    pub fn ascending(&self) -> bool {
        self.ascending
    }

    pub fn comparing_mask(&self) -> Option<&[i16]> {
        self.comparing_mask.as_deref()
    }

    /// Restricts comparisons (and serialization) to the columns with a non
    /// zero mask entry. Entries order the key components by magnitude, the
    /// sign gives the direction.
    pub fn set_comparing_mask(&mut self, mask: Option<Vec<i16>>) {
        self.comparing_mask = mask;
    }

    pub fn encryption(&self) -> Option<&Arc<dyn Encryption>> {
        self.encryption.as_ref()
    }

    pub fn timestamp_index(&self) -> Option<usize> {
        self.timestamp_index
    }

    pub fn has_timestamp(&self) -> bool {
        self.timestamp_index.is_some()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn column_mut(&mut self, index: usize) -> Option<&mut Column> {
        self.columns.get_mut(index)
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.columns.get(index).and_then(Column::value)
    }

    /// Assigns a value to the cell at `index`. Length violations report this
    /// row's id.
    pub fn set_value(&mut self, index: usize, value: impl Into<Option<Value>>) -> Result<()> {
        let row_id = self.row_id;
        let Some(column) = self.columns.get_mut(index) else {
            return Err(RowStoreError::ColumnIndex(index));
        };
        column.assign(value.into(), row_id)
    }

    /// Length of the last formatted buffer.
    pub fn format_length(&self) -> usize {
        self.format_length
    }

    /// Whether the column at `index` takes part in comparisons and
    /// serialization under the current mask.
    pub(crate) fn participates(&self, index: usize) -> bool {
        match &self.comparing_mask {
            Some(mask) => mask.get(index).is_some_and(|&m| m != 0),
            None => true,
        }
    }

    /// Deep copy used for snapshots.
    pub fn copy_instance(&self) -> Row {
        Row {
            row_id: self.row_id,
            version: self.version,
            ref_position: self.ref_position,
            position: self.position,
            ascending: self.ascending,
            comparing_mask: self.comparing_mask.clone(),
            columns: self.columns.iter().map(|c| c.duplicate(false)).collect(),
            extensions: self.extensions.clone(),
            timestamp_index: self.timestamp_index,
            encryption: self.encryption.clone(),
            buffer: Vec::new(),
            format_length: 0,
        }
    }

    /// Copy of the row identity and key values. Extended payloads are not
    /// carried over.
    pub fn key_copy(&self) -> Row {
        let mut copy = self.copy_instance();
        for &index in self.extensions.iter().flatten() {
            copy.columns[index] = self.columns[index].blank();
        }
        copy
    }

    /// Turns the row into an upper boundary sentinel: every cell takes the
    /// largest value of its kind in the cell's sort direction.
    pub fn init_top(&mut self) {
        self.init_boundary(true);
        self.row_id = u32::MAX;
    }

    /// Turns the row into a lower boundary sentinel.
    pub fn init_bottom(&mut self) {
        self.init_boundary(false);
        self.row_id = 0;
    }

    fn init_boundary(&mut self, top: bool) {
        let ascending = self.ascending;
        for column in &mut self.columns {
            let reversed = column.descending() == ascending;
            let value = if top != reversed {
                column.max_value()
            } else {
                column.min_value()
            };
            column.set_internal(value);
        }
    }

    fn extension_indices(&self) -> Vec<usize> {
        self.extensions.clone().unwrap_or_default()
    }

    /// Writes every changed extended cell to the storage.
    pub fn write_extensions(&self, storage: &dyn DataStorage, store: &ExtendedStore) -> Result<()> {
        for index in self.extension_indices() {
            self.columns[index]
                .write_extension(storage, store)
                .map_err(|err| err.in_storage(storage.name(), self.row_id))?;
        }
        Ok(())
    }

    /// Materializes the extended cells of a freshly decoded row. With
    /// `postpone` clustered payloads are loaded on first access.
    pub fn read_extensions(
        &mut self,
        storage: &dyn DataStorage,
        store: &ExtendedStore,
        postpone: bool,
    ) -> Result<()> {
        let indices = self.extension_indices();
        if indices.is_empty() {
            return Ok(());
        }
        let row_key = postpone.then(|| Arc::new(self.key_copy()));
        for index in indices {
            let column = &mut self.columns[index];
            let result = match &row_key {
                Some(row_key) => column.postpone_extension(
                    storage,
                    store,
                    ExtendedKey::new(storage.name(), self.row_id, index),
                    row_key.clone(),
                ),
                None => column.read_extension(storage, store),
            };
            result.map_err(|err| err.in_storage(storage.name(), self.row_id))?;
        }
        Ok(())
    }

    pub fn free_extension_space(&self, storage: &dyn DataStorage) -> Result<()> {
        for index in self.extension_indices() {
            self.columns[index]
                .free_extension(storage)
                .map_err(|err| err.in_storage(storage.name(), self.row_id))?;
        }
        Ok(())
    }

    /// Reads the raw row id of a buffer formatted without a precedence row.
    pub fn peek_row_id(buffer: &[u8]) -> Result<u32> {
        let Some(raw) = buffer.get(ROW_ID_OFFSET..ROW_ID_OFFSET + 4) else {
            bail_corrupt_error!("row buffer of {} bytes has no row id", buffer.len());
        };
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Row")
            .field("row_id", &self.row_id)
            .field("version", &self.version)
            .field("ref_position", &self.ref_position)
            .field("ascending", &self.ascending)
            .field("columns", &self.columns)
            .finish()
    }
}
