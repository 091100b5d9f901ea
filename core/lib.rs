use crate::error::RowStoreError;

pub mod column;
pub mod delta;
pub mod error;
pub mod extended;
pub mod filter;
pub mod header;
pub mod row;
pub mod storage;
pub mod types;
pub mod value;

pub use column::{Column, ColumnAttributes, ColumnFlags};
pub use extended::{ExtendedOptions, ExtendedStore};
pub use header::Header;
pub use row::{FormatScope, Row, RowVersion};
pub use storage::{DataStorage, Encryption, PageSize};
pub use types::ColumnType;
pub use value::Value;

pub type Result<T, E = RowStoreError> = std::result::Result<T, E>;
