use std::sync::Arc;

use bitflags::bitflags;
use uuid::Uuid;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct ColumnFlags: u8 {
        const NULLABLE = 0b0000_0001;
        const READ_ONLY = 0b0000_0010;
        const ENCRYPTED = 0b0000_0100;
        /// Extended values of this column may be compressed.
        const PACKED = 0b0000_1000;
        const CASE_SENSITIVE = 0b0001_0000;
        /// Engine maintained column, e.g. the system row version timestamp.
        const SYSTEM = 0b0010_0000;
    }
}

/// Schema level description of a column, bound to cells when a row is built.
///
/// Attributes are shared between a cell and all of its duplicates through an
/// `Arc`; [`Column::attributes_mut`](super::Column::attributes_mut) detaches
/// a private copy on first write.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColumnAttributes {
    pub name: String,
    pub flags: ColumnFlags,
    /// Declared length: characters for strings, bytes for binary kinds.
    pub max_length: Option<usize>,
    pub caption: Option<String>,
    pub description: Option<String>,
    pub unique_id: Option<Uuid>,
}

impl ColumnAttributes {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: ColumnFlags::NULLABLE,
            ..Default::default()
        }
    }

    pub fn with_flags(mut self, flags: ColumnFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_unique_id(mut self, id: Uuid) -> Self {
        self.unique_id = Some(id);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    #[inline]
    pub fn has(&self, flag: ColumnFlags) -> bool {
        self.flags.contains(flag)
    }
}
