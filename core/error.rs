use thiserror::Error;

use crate::types::ColumnType;

#[derive(Error, Debug)]
pub enum RowStoreError {
    #[error("value {value} is out of range for {kind:?}")]
    Range { kind: ColumnType, value: String },
    #[error("value '{value}' is too long for column '{column}' (max {max_length}) in row {row_id}")]
    LengthViolation {
        column: String,
        value: String,
        max_length: usize,
        row_id: u32,
    },
    #[error("column '{column}' does not accept null in row {row_id}")]
    NullViolation { column: String, row_id: u32 },
    #[error("extended value of {bytes} bytes does not fit into {max_clusters} clusters")]
    FieldTooLarge { bytes: usize, max_clusters: usize },
    #[error("column index {0} is out of range")]
    ColumnIndex(usize),
    #[error("extended column {0} has not been written to storage")]
    ExtensionPending(usize),
    #[error("invalid page size {0}: must be a multiple of 1024 and at most 16384")]
    InvalidPageSize(u32),
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersion { expected: u32, found: u32 },
    #[error("cannot convert {value} from {from:?} to {to:?}")]
    Conversion {
        from: ColumnType,
        to: ColumnType,
        value: String,
    },
    #[error("operator {op} is not defined for {kind:?}")]
    UnsupportedOperator { op: &'static str, kind: ColumnType },
    #[error("division by zero")]
    DivideByZero,
    #[error("constraint '{0}' violated")]
    ConstraintViolation(String),
    #[error("column '{0}' is read only")]
    ReadOnlyViolation(String),
    #[error("expression error: {0}")]
    Expression(String),
    #[error("encryption error: {0}")]
    Encryption(String),
    #[error("Corrupt row buffer: {0}")]
    Corrupt(String),
    #[error("storage '{storage}' failed on row {row_id}: {source}")]
    Storage {
        storage: String,
        row_id: u32,
        #[source]
        source: Box<RowStoreError>,
    },
}

impl RowStoreError {
    /// Attach the storage name and row id to an error raised while reading or
    /// writing persisted state.
    pub fn in_storage(self, storage: &str, row_id: u32) -> Self {
        match self {
            err @ Self::Storage { .. } => err,
            err => Self::Storage {
                storage: storage.to_string(),
                row_id,
                source: Box::new(err),
            },
        }
    }

    pub fn range(kind: ColumnType, value: impl std::fmt::Display) -> Self {
        Self::Range {
            kind,
            value: value.to_string(),
        }
    }
}

#[macro_export]
macro_rules! bail_corrupt_error {
    ($($arg:tt)*) => {
        return Err($crate::error::RowStoreError::Corrupt(format!($($arg)*)))
    }
}
