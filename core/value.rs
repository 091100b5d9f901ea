//! Native value representations backing the typed cells.
//!
//! A [`Value`] is the representation type of a cell; the owning column keeps
//! the [`ColumnType`] which decides range limits and the byte encoding. Money
//! and Decimal share the `Decimal` representation, every string kind shares
//! `Text`, every binary kind shares `Bytes`.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::bail_corrupt_error;
use crate::error::RowStoreError;
use crate::types::ColumnType;
use crate::Result;

/// Reserved character that collates above every real string value.
pub const TOP_CHAR: char = '\u{FFFF}';

/// Size of the length counter written before variable width payloads.
pub const LENGTH_COUNTER_SIZE: usize = 2;

const BINARY_TOP_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    U8(u8),
    I16(i16),
    I32(i32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
    Text(String),
    Bytes(Vec<u8>),
    Guid(Uuid),
}

pub fn money_max() -> Decimal {
    Decimal::new(i64::MAX, 4)
}

pub fn money_min() -> Decimal {
    Decimal::new(i64::MIN, 4)
}

pub fn small_money_max() -> Decimal {
    Decimal::new(i32::MAX as i64, 4)
}

pub fn small_money_min() -> Decimal {
    Decimal::new(i32::MIN as i64, 4)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN)
}

/// First day representable by a SmallDateTime.
pub fn small_datetime_epoch() -> NaiveDate {
    date(1900, 1, 1)
}

/// Last minute representable by a SmallDateTime: the 16-bit day counter
/// reaches 2079-06-06.
pub fn small_datetime_max() -> NaiveDateTime {
    let last_day = small_datetime_epoch() + chrono::Duration::days(u16::MAX as i64);
    last_day.and_hms_opt(23, 59, 0).unwrap_or(NaiveDateTime::MAX)
}

pub fn small_datetime_min() -> NaiveDateTime {
    small_datetime_epoch().and_time(NaiveTime::MIN)
}

pub fn datetime_min() -> NaiveDateTime {
    date(1, 1, 1).and_time(NaiveTime::MIN)
}

pub fn datetime_max() -> NaiveDateTime {
    date(9999, 12, 31)
        .and_hms_micro_opt(23, 59, 59, 999_999)
        .unwrap_or(NaiveDateTime::MAX)
}

fn time_max() -> NaiveTime {
    NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap_or(NaiveTime::MIN)
}

impl Value {
    /// Whether this representation may be stored in a cell of `kind`.
    pub fn fits_kind(&self, kind: ColumnType) -> bool {
        use ColumnType as K;
        matches!(
            (self, kind),
            (Value::Bool(_), K::Bit)
                | (Value::U8(_), K::TinyInt)
                | (Value::I16(_), K::SmallInt)
                | (Value::I32(_), K::Int)
                | (Value::I64(_), K::BigInt)
                | (Value::U64(_), K::Timestamp)
                | (Value::F32(_), K::Real)
                | (Value::F64(_), K::Float)
                | (Value::Decimal(_), K::Decimal | K::Money | K::SmallMoney)
                | (Value::DateTime(_), K::DateTime | K::SmallDateTime)
                | (Value::Date(_), K::Date)
                | (Value::Time(_), K::Time)
                | (
                    Value::Text(_),
                    K::Char | K::VarChar | K::NChar | K::NVarChar | K::Text | K::NText
                )
                | (Value::Bytes(_), K::Binary | K::VarBinary | K::Image)
                | (Value::Guid(_), K::UniqueIdentifier)
        )
    }

    /// The kind a free standing value is naturally typed as.
    pub fn natural_kind(&self) -> ColumnType {
        match self {
            Value::Bool(_) => ColumnType::Bit,
            Value::U8(_) => ColumnType::TinyInt,
            Value::I16(_) => ColumnType::SmallInt,
            Value::I32(_) => ColumnType::Int,
            Value::I64(_) => ColumnType::BigInt,
            Value::U64(_) => ColumnType::Timestamp,
            Value::F32(_) => ColumnType::Real,
            Value::F64(_) => ColumnType::Float,
            Value::Decimal(_) => ColumnType::Decimal,
            Value::DateTime(_) => ColumnType::DateTime,
            Value::Date(_) => ColumnType::Date,
            Value::Time(_) => ColumnType::Time,
            Value::Text(_) => ColumnType::NVarChar,
            Value::Bytes(_) => ColumnType::VarBinary,
            Value::Guid(_) => ColumnType::UniqueIdentifier,
        }
    }

    pub fn max_value(kind: ColumnType) -> Option<Value> {
        use ColumnType as K;
        let v = match kind {
            K::Bit => Value::Bool(true),
            K::TinyInt => Value::U8(u8::MAX),
            K::SmallInt => Value::I16(i16::MAX),
            K::Int => Value::I32(i32::MAX),
            K::BigInt => Value::I64(i64::MAX),
            K::Timestamp => Value::U64(u64::MAX),
            K::Real => Value::F32(f32::MAX),
            K::Float => Value::F64(f64::MAX),
            K::Decimal => Value::Decimal(Decimal::MAX),
            K::Money => Value::Decimal(money_max()),
            K::SmallMoney => Value::Decimal(small_money_max()),
            K::DateTime => Value::DateTime(datetime_max()),
            K::SmallDateTime => Value::DateTime(small_datetime_max()),
            K::Date => Value::Date(date(9999, 12, 31)),
            K::Time => Value::Time(time_max()),
            K::Char | K::VarChar | K::NChar | K::NVarChar | K::Text | K::NText => {
                Value::Text(TOP_CHAR.to_string())
            }
            K::Binary | K::VarBinary | K::Image => Value::Bytes(vec![u8::MAX; BINARY_TOP_LEN]),
            K::UniqueIdentifier => Value::Guid(Uuid::from_bytes([u8::MAX; 16])),
            K::Unknown => return None,
        };
        Some(v)
    }

    pub fn min_value(kind: ColumnType) -> Option<Value> {
        use ColumnType as K;
        let v = match kind {
            K::Bit => Value::Bool(false),
            K::TinyInt => Value::U8(0),
            K::SmallInt => Value::I16(i16::MIN),
            K::Int => Value::I32(i32::MIN),
            K::BigInt => Value::I64(i64::MIN),
            K::Timestamp => Value::U64(0),
            K::Real => Value::F32(f32::MIN),
            K::Float => Value::F64(f64::MIN),
            K::Decimal => Value::Decimal(Decimal::MIN),
            K::Money => Value::Decimal(money_min()),
            K::SmallMoney => Value::Decimal(small_money_min()),
            K::DateTime => Value::DateTime(datetime_min()),
            K::SmallDateTime => Value::DateTime(small_datetime_min()),
            K::Date => Value::Date(date(1, 1, 1)),
            K::Time => Value::Time(NaiveTime::MIN),
            K::Char | K::VarChar | K::NChar | K::NVarChar | K::Text | K::NText => {
                Value::Text(String::new())
            }
            K::Binary | K::VarBinary | K::Image => Value::Bytes(Vec::new()),
            K::UniqueIdentifier => Value::Guid(Uuid::nil()),
            K::Unknown => return None,
        };
        Some(v)
    }

    /// Placeholder for a null cell that still has to take part in a
    /// comparison or a fixed layout.
    pub fn dummy_null(kind: ColumnType) -> Option<Value> {
        use ColumnType as K;
        let v = match kind {
            K::Bit => Value::Bool(false),
            K::TinyInt => Value::U8(0),
            K::SmallInt => Value::I16(0),
            K::Int => Value::I32(0),
            K::BigInt => Value::I64(0),
            K::Timestamp => Value::U64(0),
            K::Real => Value::F32(0.0),
            K::Float => Value::F64(0.0),
            K::Decimal | K::Money | K::SmallMoney => Value::Decimal(Decimal::ZERO),
            K::DateTime | K::SmallDateTime => Value::DateTime(small_datetime_min()),
            K::Date => Value::Date(small_datetime_epoch()),
            K::Time => Value::Time(NaiveTime::MIN),
            K::Char | K::VarChar | K::NChar | K::NVarChar | K::Text | K::NText => {
                Value::Text(String::new())
            }
            K::Binary | K::VarBinary | K::Image => Value::Bytes(Vec::new()),
            K::UniqueIdentifier => Value::Guid(Uuid::nil()),
            K::Unknown => return None,
        };
        Some(v)
    }

    /// Serialized length of the plain (non delta) encoding.
    pub fn encoded_len(&self, kind: ColumnType) -> usize {
        if let Some(size) = kind.fixed_size() {
            return size;
        }
        LENGTH_COUNTER_SIZE + self.variable_bytes_len(kind)
    }

    fn variable_bytes_len(&self, kind: ColumnType) -> usize {
        match self {
            Value::Text(s) if kind.is_unicode() => s.encode_utf16().count() * 2,
            Value::Text(s) => s.len(),
            Value::Bytes(b) => b.len(),
            _ => 0,
        }
    }

    /// Appends the plain encoding of the value for a cell of `kind`.
    pub fn encode(&self, kind: ColumnType, out: &mut Vec<u8>) -> Result<()> {
        use ColumnType as K;
        match (self, kind.storage_kind()) {
            (Value::Bool(b), K::Bit) => out.push(*b as u8),
            (Value::U8(n), K::TinyInt) => out.push(*n),
            (Value::I16(n), K::SmallInt) => out.extend_from_slice(&n.to_le_bytes()),
            (Value::I32(n), K::Int) => out.extend_from_slice(&n.to_le_bytes()),
            (Value::I64(n), K::BigInt) => out.extend_from_slice(&n.to_le_bytes()),
            (Value::U64(n), K::BigInt) => out.extend_from_slice(&n.to_le_bytes()),
            (Value::F32(n), K::Real) => out.extend_from_slice(&n.to_le_bytes()),
            (Value::F64(n), K::Float) => out.extend_from_slice(&n.to_le_bytes()),
            (Value::Decimal(d), K::Decimal) => out.extend_from_slice(&d.serialize()),
            (Value::Decimal(d), K::Money) => {
                out.extend_from_slice(&(scaled_money(*d) as i64).to_le_bytes())
            }
            (Value::Decimal(d), K::SmallMoney) => {
                out.extend_from_slice(&(scaled_money(*d) as i32).to_le_bytes())
            }
            (Value::DateTime(dt), K::DateTime) => {
                out.extend_from_slice(&dt.and_utc().timestamp_micros().to_le_bytes())
            }
            (Value::DateTime(dt), K::SmallDateTime) => {
                let days = (dt.date() - small_datetime_epoch()).num_days() as u16;
                let minutes = (dt.time().num_seconds_from_midnight() / 60) as u16;
                out.extend_from_slice(&days.to_le_bytes());
                out.extend_from_slice(&minutes.to_le_bytes());
            }
            (Value::Date(d), K::Date) => out.extend_from_slice(&d.num_days_from_ce().to_le_bytes()),
            (Value::Time(t), K::Time) => {
                let nanos =
                    t.num_seconds_from_midnight() as u64 * 1_000_000_000 + t.nanosecond() as u64;
                out.extend_from_slice(&nanos.to_le_bytes());
            }
            (Value::Guid(g), K::UniqueIdentifier) => out.extend_from_slice(g.as_bytes()),
            (Value::Text(_) | Value::Bytes(_), _) if !kind.is_fixed() => {
                let len = self.variable_bytes_len(kind);
                let Ok(counter) = u16::try_from(len) else {
                    return Err(RowStoreError::FieldTooLarge {
                        bytes: len,
                        max_clusters: 0,
                    });
                };
                out.extend_from_slice(&counter.to_le_bytes());
                match self {
                    Value::Text(s) if kind.is_unicode() => {
                        for unit in s.encode_utf16() {
                            out.extend_from_slice(&unit.to_le_bytes());
                        }
                    }
                    Value::Text(s) => out.extend_from_slice(s.as_bytes()),
                    Value::Bytes(b) => out.extend_from_slice(b),
                    _ => unreachable!("guarded by the match arm"),
                }
            }
            (value, kind) => {
                return Err(RowStoreError::Conversion {
                    from: value.natural_kind(),
                    to: kind,
                    value: value.to_string(),
                })
            }
        }
        Ok(())
    }

    /// Decodes a plain encoded value of `kind`, returning it with the number
    /// of consumed bytes.
    pub fn decode(kind: ColumnType, buf: &[u8]) -> Result<(Value, usize)> {
        use ColumnType as K;
        if let Some(size) = kind.fixed_size() {
            if buf.len() < size {
                bail_corrupt_error!("{kind:?} needs {size} bytes, {} available", buf.len());
            }
        }
        let value = match kind {
            K::Bit => Value::Bool(buf[0] != 0),
            K::TinyInt => Value::U8(buf[0]),
            K::SmallInt => Value::I16(i16::from_le_bytes(array(buf))),
            K::Int => Value::I32(i32::from_le_bytes(array(buf))),
            K::BigInt => Value::I64(i64::from_le_bytes(array(buf))),
            K::Timestamp => Value::U64(u64::from_le_bytes(array(buf))),
            K::Real => Value::F32(f32::from_le_bytes(array(buf))),
            K::Float => Value::F64(f64::from_le_bytes(array(buf))),
            K::Decimal => Value::Decimal(Decimal::deserialize(array(buf))),
            K::Money => Value::Decimal(Decimal::new(i64::from_le_bytes(array(buf)), 4)),
            K::SmallMoney => {
                Value::Decimal(Decimal::new(i32::from_le_bytes(array(buf)) as i64, 4))
            }
            K::DateTime => {
                let micros = i64::from_le_bytes(array(buf));
                let Some(dt) = DateTime::from_timestamp_micros(micros) else {
                    bail_corrupt_error!("invalid datetime payload: {micros}");
                };
                Value::DateTime(dt.naive_utc())
            }
            K::SmallDateTime => {
                let days = u16::from_le_bytes(array(buf)) as i64;
                let minutes = u16::from_le_bytes(array(&buf[2..])) as u32;
                let day = small_datetime_epoch() + chrono::Duration::days(days);
                let Some(time) = NaiveTime::from_num_seconds_from_midnight_opt(minutes * 60, 0)
                else {
                    bail_corrupt_error!("invalid smalldatetime minutes: {minutes}");
                };
                Value::DateTime(day.and_time(time))
            }
            K::Date => {
                let days = i32::from_le_bytes(array(buf));
                let Some(d) = NaiveDate::from_num_days_from_ce_opt(days) else {
                    bail_corrupt_error!("invalid date payload: {days}");
                };
                Value::Date(d)
            }
            K::Time => {
                let nanos = u64::from_le_bytes(array(buf));
                let secs = (nanos / 1_000_000_000) as u32;
                let frac = (nanos % 1_000_000_000) as u32;
                let Some(t) = NaiveTime::from_num_seconds_from_midnight_opt(secs, frac) else {
                    bail_corrupt_error!("invalid time payload: {nanos}");
                };
                Value::Time(t)
            }
            K::UniqueIdentifier => Value::Guid(Uuid::from_bytes(array(buf))),
            K::Unknown => bail_corrupt_error!("cannot decode a value of unknown type"),
            _ => {
                let len = read_length_counter(buf)?;
                let end = LENGTH_COUNTER_SIZE + len;
                if buf.len() < end {
                    bail_corrupt_error!("{kind:?} needs {end} bytes, {} available", buf.len());
                }
                let bytes = &buf[LENGTH_COUNTER_SIZE..end];
                let value = if kind.is_binary() {
                    Value::Bytes(bytes.to_vec())
                } else {
                    Value::Text(decode_text(kind, bytes)?)
                };
                return Ok((value, end));
            }
        };
        Ok((value, kind.fixed_size().unwrap_or(0)))
    }
}

// 10^4 scaled
fn scaled_money(d: Decimal) -> i128 {
    let mut scaled = d;
    scaled.rescale(4);
    scaled.mantissa()
}

pub(crate) fn read_length_counter(buf: &[u8]) -> Result<usize> {
    if buf.len() < LENGTH_COUNTER_SIZE {
        bail_corrupt_error!("length counter truncated");
    }
    Ok(u16::from_le_bytes([buf[0], buf[1]]) as usize)
}

pub(crate) fn decode_text(kind: ColumnType, bytes: &[u8]) -> Result<String> {
    if kind.is_unicode() {
        if bytes.len() % 2 != 0 {
            bail_corrupt_error!("odd utf-16 payload length {}", bytes.len());
        }
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        match String::from_utf16(&units) {
            Ok(s) => Ok(s),
            Err(e) => bail_corrupt_error!("invalid utf-16 payload: {e}"),
        }
    } else {
        match std::str::from_utf8(bytes) {
            Ok(s) => Ok(s.to_string()),
            Err(e) => bail_corrupt_error!("invalid utf-8 payload: {e}"),
        }
    }
}

pub(crate) fn encode_text(kind: ColumnType, s: &str) -> Vec<u8> {
    if kind.is_unicode() {
        s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    } else {
        s.as_bytes().to_vec()
    }
}

// Callers check the length before slicing.
fn array<const N: usize>(buf: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[..N]);
    out
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", *b as u8),
            Value::U8(n) => write!(f, "{n}"),
            Value::I16(n) => write!(f, "{n}"),
            Value::I32(n) => write!(f, "{n}"),
            Value::I64(n) => write!(f, "{n}"),
            Value::U64(n) => write!(f, "{n}"),
            Value::F32(n) => write!(f, "{n}"),
            Value::F64(n) => write!(f, "{n}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::DateTime(dt) => write!(f, "{dt}"),
            Value::Date(d) => write!(f, "{d}"),
            Value::Time(t) => write!(f, "{t}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Bytes(b) => {
                write!(f, "0x")?;
                for byte in b {
                    write!(f, "{byte:02X}")?;
                }
                Ok(())
            }
            Value::Guid(g) => write!(f, "{g}"),
        }
    }
}
