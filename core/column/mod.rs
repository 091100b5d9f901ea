//! Typed value cells.
//!
//! A [`Column`] is one typed value inside a row: a fixed [`ColumnType`], an
//! optional native [`Value`], its ordinal inside the owning row and optional
//! shared [`ColumnAttributes`]. Cells of the extended kinds (Text, NText,
//! Image) additionally own an [`ExtendedValue`] describing where their payload
//! lives on the storage.

pub mod arith;
pub mod attributes;
pub mod collate;
pub mod convert;

use std::sync::Arc;

use chrono::{Datelike, Timelike};

pub use self::attributes::{ColumnAttributes, ColumnFlags};
use self::collate::collate_values;
use self::convert::convert;
use crate::delta;
use crate::error::RowStoreError;
use crate::extended::{self, ExtendedKey, ExtendedStore, ExtendedValue};
use crate::row::Row;
use crate::storage::DataStorage;
use crate::types::ColumnType;
use crate::value::{self, read_length_counter, Value, LENGTH_COUNTER_SIZE};
use crate::Result;

#[derive(Debug)]
pub struct Column {
    kind: ColumnType,
    value: Option<Value>,
    row_index: usize,
    attributes: Option<Arc<ColumnAttributes>>,
    descending: bool,
    edited: bool,
    extended: Option<ExtendedValue>,
}

impl Column {
    /// Creates a null cell of the given kind.
    pub fn new(kind: ColumnType) -> Self {
        Self {
            kind,
            value: None,
            row_index: 0,
            attributes: None,
            descending: false,
            edited: false,
            extended: kind.is_extended().then(ExtendedValue::new),
        }
    }

    /// Creates a cell holding `value`, converted and validated for `kind`.
    pub fn with_value(kind: ColumnType, value: Value) -> Result<Self> {
        let mut column = Self::new(kind);
        column.assign(Some(value), 0)?;
        column.edited = false;
        Ok(column)
    }

    pub fn with_attributes(mut self, attributes: Arc<ColumnAttributes>) -> Self {
        self.attributes = Some(attributes);
        self
    }

    pub fn with_descending(mut self, descending: bool) -> Self {
        self.descending = descending;
        self
    }

    #[inline]
    pub fn kind(&self) -> ColumnType {
        self.kind
    }

    #[inline]
    pub fn row_index(&self) -> usize {
        self.row_index
    }

    pub(crate) fn set_row_index(&mut self, index: usize) {
        self.row_index = index;
    }

    pub fn attributes(&self) -> Option<&Arc<ColumnAttributes>> {
        self.attributes.as_ref()
    }

    /// Detaches a private copy of the shared attributes for modification.
    pub fn attributes_mut(&mut self) -> &mut ColumnAttributes {
        Arc::make_mut(self.attributes.get_or_insert_with(Default::default))
    }

    pub fn name(&self) -> &str {
        self.attributes.as_deref().map_or("", |a| a.name.as_str())
    }

    fn has_flag(&self, flag: ColumnFlags) -> bool {
        self.attributes.as_deref().is_some_and(|a| a.has(flag))
    }

    pub fn is_nullable(&self) -> bool {
        self.attributes.is_none() || self.has_flag(ColumnFlags::NULLABLE)
    }

    pub fn is_read_only(&self) -> bool {
        self.has_flag(ColumnFlags::READ_ONLY)
    }

    pub fn is_encrypted(&self) -> bool {
        self.has_flag(ColumnFlags::ENCRYPTED)
    }

    pub fn is_packed(&self) -> bool {
        self.has_flag(ColumnFlags::PACKED)
    }

    pub fn is_system(&self) -> bool {
        self.has_flag(ColumnFlags::SYSTEM)
    }

    pub fn case_sensitive(&self) -> bool {
        self.has_flag(ColumnFlags::CASE_SENSITIVE)
    }

    pub fn max_length(&self) -> Option<usize> {
        self.attributes.as_deref().and_then(|a| a.max_length)
    }

    #[inline]
    pub fn descending(&self) -> bool {
        self.descending
    }

    pub fn set_descending(&mut self, descending: bool) {
        self.descending = descending;
    }

    #[inline]
    pub fn is_edited(&self) -> bool {
        self.edited
    }

    pub(crate) fn clear_edited(&mut self) {
        self.edited = false;
    }

    /// A cell is null when it holds no value. Extended cells that were
    /// decoded but not yet read, or wait on a postponed read, are never null:
    /// there is persisted data to load.
    pub fn is_null(&self) -> bool {
        if self.extended.as_ref().is_some_and(ExtendedValue::is_persisted) {
            return false;
        }
        self.value.is_none()
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn extended(&self) -> Option<&ExtendedValue> {
        self.extended.as_ref()
    }

    /// Assigns a value, converting it to the cell's kind and validating the
    /// kind's range, the declared length and nullability. `row_id` is
    /// reported on length and null violations.
    pub fn assign(&mut self, value: Option<Value>, row_id: u32) -> Result<()> {
        let value = match value {
            Some(v) => Some(self.coerce(v, row_id)?),
            None if !self.is_nullable() => {
                return Err(RowStoreError::NullViolation {
                    column: self.name().to_string(),
                    row_id,
                });
            }
            None => None,
        };
        self.value = value;
        self.edited = true;
        if let Some(ext) = &self.extended {
            ext.mark_dirty();
        }
        Ok(())
    }

    pub fn set_value(&mut self, value: impl Into<Option<Value>>) -> Result<()> {
        self.assign(value.into(), 0)
    }

    /// Stores a value without range or length validation. Used for sentinel
    /// rows and values produced by decoding.
    pub(crate) fn set_internal(&mut self, value: Option<Value>) {
        self.value = value;
        self.edited = true;
        if let Some(ext) = &self.extended {
            ext.mark_dirty();
        }
    }

    fn coerce(&self, value: Value, row_id: u32) -> Result<Value> {
        let value = convert(&value, self.kind)?;
        let value = match (self.kind, value) {
            (ColumnType::Money, Value::Decimal(d)) => {
                let d = d.round_dp(4);
                if d < value::money_min() || d > value::money_max() {
                    return Err(RowStoreError::range(self.kind, d));
                }
                Value::Decimal(d)
            }
            (ColumnType::SmallMoney, Value::Decimal(d)) => {
                let d = d.round_dp(4);
                if d < value::small_money_min() || d > value::small_money_max() {
                    return Err(RowStoreError::range(self.kind, d));
                }
                Value::Decimal(d)
            }
            (ColumnType::SmallDateTime, Value::DateTime(dt)) => {
                if dt < value::small_datetime_min() || dt > value::small_datetime_max() {
                    return Err(RowStoreError::range(self.kind, dt));
                }
                // minute precision
                let dt = dt.with_second(0).and_then(|d| d.with_nanosecond(0)).unwrap_or(dt);
                Value::DateTime(dt)
            }
            (ColumnType::DateTime, Value::DateTime(dt)) => {
                if dt < value::datetime_min() || dt > value::datetime_max() {
                    return Err(RowStoreError::range(self.kind, dt));
                }
                let micros = dt.nanosecond() / 1_000 * 1_000;
                Value::DateTime(dt.with_nanosecond(micros).unwrap_or(dt))
            }
            (ColumnType::Date, Value::Date(d)) => {
                if !(1..=9999).contains(&d.year()) {
                    return Err(RowStoreError::range(self.kind, d));
                }
                Value::Date(d)
            }
            (_, value) => value,
        };
        self.check_length(&value, row_id)?;
        Ok(value)
    }

    fn check_length(&self, value: &Value, row_id: u32) -> Result<()> {
        let Some(max_length) = self.max_length() else {
            return Ok(());
        };
        let length = match value {
            Value::Text(s) => s.chars().count(),
            Value::Bytes(b) => b.len(),
            _ => return Ok(()),
        };
        if length > max_length {
            return Err(RowStoreError::LengthViolation {
                column: self.name().to_string(),
                value: value.to_string(),
                max_length,
                row_id,
            });
        }
        Ok(())
    }

    /// Explicitly shortens a string or binary value to `length` characters
    /// (bytes for binary kinds).
    pub fn truncate(&mut self, length: usize) {
        let changed = match &mut self.value {
            Some(Value::Text(s)) if s.chars().count() > length => {
                let cut = s.char_indices().nth(length).map_or(s.len(), |(i, _)| i);
                s.truncate(cut);
                true
            }
            Some(Value::Bytes(b)) if b.len() > length => {
                b.truncate(length);
                true
            }
            _ => false,
        };
        if changed {
            self.edited = true;
            if let Some(ext) = &self.extended {
                ext.mark_dirty();
            }
        }
    }

    pub fn max_value(&self) -> Option<Value> {
        Value::max_value(self.kind)
    }

    pub fn min_value(&self) -> Option<Value> {
        Value::min_value(self.kind)
    }

    pub fn dummy_null(&self) -> Option<Value> {
        Value::dummy_null(self.kind)
    }

    /// Independent copy of the cell. With `pad_right` fixed width strings are
    /// padded with blanks up to their declared length.
    pub fn duplicate(&self, pad_right: bool) -> Column {
        let mut value = self.value.clone();
        if pad_right && self.kind.is_padded() {
            if let (Some(Value::Text(s)), Some(max)) = (&mut value, self.max_length()) {
                let len = s.chars().count();
                if len < max {
                    s.extend(std::iter::repeat(' ').take(max - len));
                }
            }
        }
        Column {
            kind: self.kind,
            value,
            row_index: self.row_index,
            attributes: self.attributes.clone(),
            descending: self.descending,
            edited: self.edited,
            extended: self.extended.as_ref().map(ExtendedValue::duplicate),
        }
    }

    pub(crate) fn blank(&self) -> Column {
        Column {
            kind: self.kind,
            value: None,
            row_index: self.row_index,
            attributes: self.attributes.clone(),
            descending: self.descending,
            edited: false,
            extended: self.kind.is_extended().then(ExtendedValue::new),
        }
    }

    fn delta_base(&self, precedence: Option<&Column>) -> Option<i64> {
        if !self.kind.supports_delta() {
            return None;
        }
        let precedence = precedence.filter(|p| p.kind == self.kind)?;
        match precedence.value.as_ref()? {
            Value::I32(n) => Some(*n as i64),
            Value::I64(n) => Some(*n),
            Value::U64(n) => Some(*n as i64),
            _ => None,
        }
    }

    /// Predicts the serialized size of the cell without writing it.
    pub fn buffer_length(&self, precedence: Option<&Column>) -> usize {
        if self.is_null() {
            return 0;
        }
        if let Some(ext) = &self.extended {
            return LENGTH_COUNTER_SIZE + ext.inline_len();
        }
        let Some(value) = &self.value else {
            return 0;
        };
        match (value, self.delta_base(precedence)) {
            (Value::I32(n), Some(base)) => delta::encoded_len_i32(*n, base as i32),
            (Value::I64(n), Some(base)) => delta::encoded_len_i64(*n, base),
            (Value::U64(n), Some(base)) => delta::encoded_len_i64(*n as i64, base),
            (value, _) => value.encoded_len(self.kind),
        }
    }

    /// Appends the cell payload, delta packed against `precedence` when the
    /// kind supports it and the precedence cell holds a value. Null cells
    /// write nothing.
    pub fn to_bytes(&self, out: &mut Vec<u8>, precedence: Option<&Column>) -> Result<()> {
        if self.is_null() {
            return Ok(());
        }
        if let Some(ext) = &self.extended {
            if ext.is_dirty() {
                return Err(RowStoreError::ExtensionPending(self.row_index));
            }
            let len = ext.inline_len();
            let Ok(counter) = u16::try_from(len) else {
                return Err(RowStoreError::FieldTooLarge {
                    bytes: len,
                    max_clusters: extended::MAX_CLUSTERS,
                });
            };
            out.extend_from_slice(&counter.to_le_bytes());
            ext.encode_inline(out);
            return Ok(());
        }
        let Some(value) = &self.value else {
            return Ok(());
        };
        match (value, self.delta_base(precedence)) {
            (Value::I32(n), Some(base)) => delta::encode_i32(*n, base as i32, out),
            (Value::I64(n), Some(base)) => delta::encode_i64(*n, base, out),
            (Value::U64(n), Some(base)) => delta::encode_i64(*n as i64, base, out),
            (value, _) => value.encode(self.kind, out)?,
        }
        Ok(())
    }

    /// Reads the cell payload from the start of `buf`, returning the number
    /// of consumed bytes.
    pub fn from_bytes(&mut self, buf: &[u8], precedence: Option<&Column>) -> Result<usize> {
        self.edited = false;
        if self.kind.is_extended() {
            let len = read_length_counter(buf)?;
            let end = LENGTH_COUNTER_SIZE + len;
            if buf.len() < end {
                crate::bail_corrupt_error!("extended payload needs {end} bytes");
            }
            self.extended = Some(ExtendedValue::decode_inline(&buf[LENGTH_COUNTER_SIZE..end])?);
            self.value = None;
            return Ok(end);
        }
        let (value, consumed) = match self.delta_base(precedence) {
            Some(base) => match self.kind {
                ColumnType::Int => {
                    let (n, used) = delta::decode_i32(buf, base as i32)?;
                    (Value::I32(n), used)
                }
                ColumnType::Timestamp => {
                    let (n, used) = delta::decode_i64(buf, base)?;
                    (Value::U64(n as u64), used)
                }
                _ => {
                    let (n, used) = delta::decode_i64(buf, base)?;
                    (Value::I64(n), used)
                }
            },
            None => Value::decode(self.kind, buf)?,
        };
        self.value = Some(value);
        Ok(consumed)
    }

    /// Bytes that must be readable before [`Self::encoded_len_from_prefix`]
    /// can size the payload.
    pub(crate) fn prefix_len(&self, precedence: Option<&Column>) -> usize {
        if self.delta_base(precedence).is_some() {
            1
        } else {
            self.kind.fixed_size().unwrap_or(LENGTH_COUNTER_SIZE)
        }
    }

    pub(crate) fn encoded_len_from_prefix(
        &self,
        prefix: &[u8],
        precedence: Option<&Column>,
    ) -> Result<usize> {
        if self.delta_base(precedence).is_some() {
            let Some(&first) = prefix.first() else {
                crate::bail_corrupt_error!("packed integer prefix missing");
            };
            return Ok(match self.kind {
                ColumnType::Int => delta::packed_len_from_control_i32(first),
                _ => delta::packed_len_from_control_i64(first),
            });
        }
        match self.kind.fixed_size() {
            Some(size) => Ok(size),
            None => Ok(LENGTH_COUNTER_SIZE + read_length_counter(prefix)?),
        }
    }

    /// Signed ordering of two cells. Nulls order before every value.
    ///
    /// Only materialized values take part: an extended cell whose payload is
    /// still postponed orders like a null until it is read with
    /// [`Self::read_extension`].
    pub fn collate(&self, other: &Column) -> i64 {
        self.collate_inner(other, false)
    }

    /// Like [`Self::collate`] with trailing blanks of strings ignored.
    pub fn collate_trimmed(&self, other: &Column) -> i64 {
        self.collate_inner(other, true)
    }

    /// Ordering with the cell's sort direction applied.
    pub fn collate_directed(&self, other: &Column) -> i64 {
        let ordering = self.collate(other);
        if self.descending {
            -ordering
        } else {
            ordering
        }
    }

    fn collate_inner(&self, other: &Column, trimmed: bool) -> i64 {
        match (&self.value, &other.value) {
            (None, None) => 0,
            (None, Some(_)) => -1,
            (Some(_), None) => 1,
            (Some(a), Some(b)) => {
                let case_sensitive = self.case_sensitive() || other.case_sensitive();
                collate_values(a, b, case_sensitive, trimmed) as i64
            }
        }
    }

    /// Writes the extended payload to newly allocated clusters when the cell
    /// changed since it was last written.
    pub fn write_extension(&self, storage: &dyn DataStorage, store: &ExtendedStore) -> Result<()> {
        let Some(ext) = &self.extended else {
            return Ok(());
        };
        let payload = self
            .value
            .as_ref()
            .map(|v| extended::payload_bytes(self.kind, v));
        ext.write(storage, store, payload.as_deref(), self.is_packed())
    }

    /// Materializes the extended payload described by the inline descriptor.
    pub fn read_extension(&mut self, storage: &dyn DataStorage, store: &ExtendedStore) -> Result<()> {
        let Some(ext) = &self.extended else {
            return Ok(());
        };
        self.value = match ext.read(storage, store)? {
            Some(bytes) => Some(extended::payload_value(self.kind, bytes)?),
            None => None,
        };
        Ok(())
    }

    /// Like [`Self::read_extension`] but a clustered payload is only loaded
    /// on first [`Self::resolve`].
    pub fn postpone_extension(
        &mut self,
        storage: &dyn DataStorage,
        store: &ExtendedStore,
        key: ExtendedKey,
        row_key: Arc<Row>,
    ) -> Result<()> {
        let postponed = match &self.extended {
            Some(ext) => ext.postpone(store, key, row_key),
            None => return Ok(()),
        };
        if postponed {
            self.value = None;
            return Ok(());
        }
        self.read_extension(storage, store)
    }

    pub fn free_extension(&self, storage: &dyn DataStorage) -> Result<()> {
        match &self.extended {
            Some(ext) => ext.free_space(storage),
            None => Ok(()),
        }
    }

    /// The cell's value, loading a postponed extended payload on demand.
    pub fn resolve(&self, storage: &dyn DataStorage) -> Result<Option<Value>> {
        if let Some(value) = &self.value {
            return Ok(Some(value.clone()));
        }
        match &self.extended {
            Some(ext) if ext.is_postponed() => ext
                .load_postponed(storage)?
                .map(|b| extended::payload_value(self.kind, b))
                .transpose(),
            _ => Ok(None),
        }
    }
}

impl Clone for Column {
    fn clone(&self) -> Self {
        self.duplicate(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn money(s: &str) -> Value {
        Value::Decimal(Decimal::from_str(s).unwrap())
    }

    #[test]
    fn test_money_range_violation() {
        let mut cell = Column::new(ColumnType::Money);
        cell.set_value(money("922337203685477.5807")).unwrap();
        assert_eq!(cell.value(), Some(&money("922337203685477.5807")));

        let err = cell.set_value(money("922337203685477.5808")).unwrap_err();
        assert!(matches!(err, RowStoreError::Range { kind: ColumnType::Money, .. }));
        assert!(err.to_string().contains("922337203685477.5808"));

        cell.set_value(money("-922337203685477.5808")).unwrap();
        assert!(cell.set_value(money("-922337203685477.5809")).is_err());
    }

    #[test]
    fn test_small_money_range_violation() {
        let mut cell = Column::new(ColumnType::SmallMoney);
        cell.set_value(money("214748.3647")).unwrap();
        assert!(cell.set_value(money("214748.3648")).is_err());
    }

    #[test]
    fn test_string_overflow_names_column() {
        let attrs = ColumnAttributes::new("code").with_max_length(5).shared();
        let mut cell = Column::new(ColumnType::Char).with_attributes(attrs);
        cell.assign(Some(Value::Text("abcde".into())), 7).unwrap();

        let err = cell
            .assign(Some(Value::Text("abcdef".into())), 7)
            .unwrap_err();
        match err {
            RowStoreError::LengthViolation {
                column,
                value,
                max_length,
                row_id,
            } => {
                assert_eq!(column, "code");
                assert_eq!(value, "abcdef");
                assert_eq!(max_length, 5);
                assert_eq!(row_id, 7);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_not_null_column_rejects_null() {
        let attrs = ColumnAttributes::new("id").with_flags(ColumnFlags::empty()).shared();
        let mut cell = Column::new(ColumnType::Int).with_attributes(attrs);
        assert!(!cell.is_nullable());
        cell.assign(Some(Value::I32(1)), 3).unwrap();

        let err = cell.assign(None, 3).unwrap_err();
        assert!(matches!(
            err,
            RowStoreError::NullViolation { ref column, row_id: 3 } if column == "id"
        ));
        assert_eq!(cell.value(), Some(&Value::I32(1)));

        // cells without attributes stay nullable
        let mut free = Column::new(ColumnType::Int);
        free.set_value(None::<Value>).unwrap();
        assert!(free.is_null());
    }

    #[test]
    fn test_small_datetime_window() {
        let mut cell = Column::new(ColumnType::SmallDateTime);
        cell.set_value(Value::Text("2079-06-06 23:59:00".into()))
            .unwrap();
        assert!(cell
            .set_value(Value::Text("2079-06-07 00:00:00".into()))
            .is_err());
        assert!(cell
            .set_value(Value::Text("1899-12-31 23:59:00".into()))
            .is_err());

        cell.set_value(Value::Text("2000-01-01 10:20:45".into()))
            .unwrap();
        assert_eq!(
            cell.value().unwrap().to_string(),
            "2000-01-01 10:20:00"
        );
    }

    #[test]
    fn test_assignment_converts_to_kind() {
        let mut cell = Column::new(ColumnType::BigInt);
        cell.set_value(Value::I32(12)).unwrap();
        assert_eq!(cell.value(), Some(&Value::I64(12)));
        assert!(cell.is_edited());

        let err = cell.set_value(Value::Text("twelve".into())).unwrap_err();
        assert!(matches!(err, RowStoreError::Conversion { .. }));
    }

    #[test]
    fn test_duplicate_pads_fixed_strings() {
        let attrs = ColumnAttributes::new("c").with_max_length(5).shared();
        let mut cell = Column::new(ColumnType::Char).with_attributes(attrs.clone());
        cell.set_value(Value::Text("ab".into())).unwrap();

        let padded = cell.duplicate(true);
        assert_eq!(padded.value(), Some(&Value::Text("ab   ".into())));
        assert_eq!(cell.duplicate(false).value(), Some(&Value::Text("ab".into())));
        assert!(Arc::ptr_eq(padded.attributes().unwrap(), &attrs));
        assert_eq!(padded.collate_trimmed(&cell), 0);
    }

    #[test]
    fn test_attributes_copy_on_write() {
        let attrs = ColumnAttributes::new("a").shared();
        let mut cell = Column::new(ColumnType::Int).with_attributes(attrs.clone());
        let copy = cell.duplicate(false);
        cell.attributes_mut().caption = Some("renamed".into());
        assert_eq!(attrs.caption, None);
        assert_eq!(copy.attributes().unwrap().caption, None);
        assert_eq!(cell.attributes().unwrap().caption.as_deref(), Some("renamed"));
    }

    #[test]
    fn test_truncate_is_explicit() {
        let mut cell = Column::new(ColumnType::NVarChar);
        cell.set_value(Value::Text("héllo".into())).unwrap();
        cell.truncate(2);
        assert_eq!(cell.value(), Some(&Value::Text("hé".into())));
    }

    #[rstest]
    #[case(ColumnType::Int, Value::I32(1_000), Value::I32(1_003), 1)]
    #[case(ColumnType::Int, Value::I32(1_000), Value::I32(i32::MIN), 5)]
    #[case(ColumnType::BigInt, Value::I64(-7), Value::I64(-12), 1)]
    #[case(ColumnType::Timestamp, Value::U64(90_000), Value::U64(90_001), 1)]
    fn test_delta_against_precedence(
        #[case] kind: ColumnType,
        #[case] base: Value,
        #[case] value: Value,
        #[case] expected_len: usize,
    ) {
        let precedence = Column::with_value(kind, base).unwrap();
        let cell = Column::with_value(kind, value.clone()).unwrap();

        let mut buf = Vec::new();
        cell.to_bytes(&mut buf, Some(&precedence)).unwrap();
        assert_eq!(buf.len(), expected_len);
        assert_eq!(cell.buffer_length(Some(&precedence)), expected_len);
        assert_eq!(cell.encoded_len_from_prefix(&buf, Some(&precedence)).unwrap(), expected_len);

        let mut decoded = Column::new(kind);
        assert_eq!(decoded.from_bytes(&buf, Some(&precedence)).unwrap(), expected_len);
        assert_eq!(decoded.value(), Some(&value));
    }

    #[test]
    fn test_null_precedence_falls_back_to_plain() {
        let precedence = Column::new(ColumnType::Int);
        let cell = Column::with_value(ColumnType::Int, Value::I32(5)).unwrap();
        let mut buf = Vec::new();
        cell.to_bytes(&mut buf, Some(&precedence)).unwrap();
        assert_eq!(buf, 5i32.to_le_bytes().to_vec());
    }

    #[test]
    fn test_null_writes_nothing() {
        let cell = Column::new(ColumnType::VarChar);
        let mut buf = Vec::new();
        cell.to_bytes(&mut buf, None).unwrap();
        assert!(buf.is_empty());
        assert_eq!(cell.buffer_length(None), 0);
    }

    #[test]
    fn test_collate_nulls_first_and_direction() {
        let null = Column::new(ColumnType::Int);
        let one = Column::with_value(ColumnType::Int, Value::I32(1)).unwrap();
        let two = Column::with_value(ColumnType::Int, Value::I32(2)).unwrap();

        assert_eq!(null.collate(&one), -1);
        assert_eq!(one.collate(&null), 1);
        assert_eq!(null.collate(&null), 0);
        assert_eq!(one.collate(&two), -1);

        let desc = one.duplicate(false).with_descending(true);
        assert_eq!(desc.collate_directed(&two), 1);
    }

    #[test]
    fn test_top_sentinel_char_column() {
        let top = Column::with_value(ColumnType::Char, Value::max_value(ColumnType::Char).unwrap())
            .unwrap();
        let mut other = Column::new(ColumnType::Char);
        for s in ["zzz", "\u{FFFE}\u{FFFE}", "ÿ"] {
            other.set_value(Value::Text(s.into())).unwrap();
            assert_eq!(top.collate(&other), 1);
            assert_eq!(other.collate(&top), -1);
        }
    }

    #[test]
    fn test_sentinels() {
        let cell = Column::new(ColumnType::SmallInt);
        assert_eq!(cell.max_value(), Some(Value::I16(i16::MAX)));
        assert_eq!(cell.min_value(), Some(Value::I16(i16::MIN)));
        assert_eq!(cell.dummy_null(), Some(Value::I16(0)));
        assert_eq!(Column::new(ColumnType::Unknown).max_value(), None);
    }
}
