//! Implicit and explicit conversions between cell representations.
//!
//! Cells never convert on their own; assignment and arithmetic route through
//! [`convert`] which either produces a value representable by the target kind
//! or reports a conversion (or range) error.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::RowStoreError;
use crate::types::ColumnType;
use crate::value::{decode_text, encode_text, Value};
use crate::Result;

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y%m%d %H:%M:%S",
];

fn conversion_error(value: &Value, to: ColumnType) -> RowStoreError {
    RowStoreError::Conversion {
        from: value.natural_kind(),
        to,
        value: value.to_string(),
    }
}

/// Converts `value` into the representation used by cells of kind `to`.
pub fn convert(value: &Value, to: ColumnType) -> Result<Value> {
    if value.fits_kind(to) {
        return Ok(value.clone());
    }
    use ColumnType as K;
    match to {
        K::Bit => to_bool(value).map(Value::Bool),
        K::TinyInt => {
            let n = to_i128(value, to)?;
            u8::try_from(n)
                .map(Value::U8)
                .map_err(|_| RowStoreError::range(to, n))
        }
        K::SmallInt => {
            let n = to_i128(value, to)?;
            i16::try_from(n)
                .map(Value::I16)
                .map_err(|_| RowStoreError::range(to, n))
        }
        K::Int => {
            let n = to_i128(value, to)?;
            i32::try_from(n)
                .map(Value::I32)
                .map_err(|_| RowStoreError::range(to, n))
        }
        K::BigInt => {
            let n = to_i128(value, to)?;
            i64::try_from(n)
                .map(Value::I64)
                .map_err(|_| RowStoreError::range(to, n))
        }
        K::Timestamp => match value {
            Value::Bytes(b) if b.len() == 8 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(b);
                Ok(Value::U64(u64::from_be_bytes(raw)))
            }
            _ => {
                let n = to_i128(value, to)?;
                u64::try_from(n)
                    .map(Value::U64)
                    .map_err(|_| RowStoreError::range(to, n))
            }
        },
        K::Real => {
            let f = to_f64(value, to)?;
            if f.is_finite() && f.abs() > f32::MAX as f64 {
                return Err(RowStoreError::range(to, f));
            }
            Ok(Value::F32(f as f32))
        }
        K::Float => to_f64(value, to).map(Value::F64),
        K::Decimal | K::Money | K::SmallMoney => to_decimal(value, to).map(Value::Decimal),
        K::DateTime | K::SmallDateTime => match value {
            Value::Date(d) => Ok(Value::DateTime(d.and_time(NaiveTime::MIN))),
            Value::Text(s) => parse_datetime(s.trim())
                .map(Value::DateTime)
                .ok_or_else(|| conversion_error(value, to)),
            _ => Err(conversion_error(value, to)),
        },
        K::Date => match value {
            Value::DateTime(dt) => Ok(Value::Date(dt.date())),
            Value::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|_| conversion_error(value, to)),
            _ => Err(conversion_error(value, to)),
        },
        K::Time => match value {
            Value::DateTime(dt) => Ok(Value::Time(dt.time())),
            Value::Text(s) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")
                .map(Value::Time)
                .map_err(|_| conversion_error(value, to)),
            _ => Err(conversion_error(value, to)),
        },
        K::Char | K::VarChar | K::NChar | K::NVarChar | K::Text | K::NText => match value {
            Value::Bytes(b) => decode_text(to, b).map(Value::Text),
            other => Ok(Value::Text(other.to_string())),
        },
        K::Binary | K::VarBinary | K::Image => match value {
            Value::Text(s) => Ok(Value::Bytes(encode_text(ColumnType::VarChar, s))),
            Value::Guid(g) => Ok(Value::Bytes(g.as_bytes().to_vec())),
            Value::U64(n) => Ok(Value::Bytes(n.to_be_bytes().to_vec())),
            Value::I32(n) => Ok(Value::Bytes(n.to_be_bytes().to_vec())),
            Value::I64(n) => Ok(Value::Bytes(n.to_be_bytes().to_vec())),
            _ => Err(conversion_error(value, to)),
        },
        K::UniqueIdentifier => match value {
            Value::Text(s) => Uuid::parse_str(s.trim())
                .map(Value::Guid)
                .map_err(|_| conversion_error(value, to)),
            Value::Bytes(b) => Uuid::from_slice(b)
                .map(Value::Guid)
                .map_err(|_| conversion_error(value, to)),
            _ => Err(conversion_error(value, to)),
        },
        K::Unknown => Err(conversion_error(value, to)),
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

fn to_bool(value: &Value) -> Result<bool> {
    let b = match value {
        Value::Bool(b) => *b,
        Value::U8(n) => *n != 0,
        Value::I16(n) => *n != 0,
        Value::I32(n) => *n != 0,
        Value::I64(n) => *n != 0,
        Value::U64(n) => *n != 0,
        Value::F32(n) => *n != 0.0,
        Value::F64(n) => *n != 0.0,
        Value::Decimal(d) => !d.is_zero(),
        Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" => true,
            "0" | "false" => false,
            _ => return Err(conversion_error(value, ColumnType::Bit)),
        },
        _ => return Err(conversion_error(value, ColumnType::Bit)),
    };
    Ok(b)
}

// fractions truncate toward zero
pub(crate) fn to_i128(value: &Value, to: ColumnType) -> Result<i128> {
    let n = match value {
        Value::Bool(b) => *b as i128,
        Value::U8(n) => *n as i128,
        Value::I16(n) => *n as i128,
        Value::I32(n) => *n as i128,
        Value::I64(n) => *n as i128,
        Value::U64(n) => *n as i128,
        Value::F32(f) => float_to_i128(*f as f64, to)?,
        Value::F64(f) => float_to_i128(*f, to)?,
        Value::Decimal(d) => d
            .trunc()
            .to_i128()
            .ok_or_else(|| RowStoreError::range(to, d))?,
        Value::Text(s) => {
            let trimmed = s.trim();
            match trimmed.parse::<i128>() {
                Ok(n) => n,
                Err(_) => trimmed
                    .parse::<Decimal>()
                    .ok()
                    .and_then(|d| d.trunc().to_i128())
                    .ok_or_else(|| conversion_error(value, to))?,
            }
        }
        _ => return Err(conversion_error(value, to)),
    };
    Ok(n)
}

fn float_to_i128(f: f64, to: ColumnType) -> Result<i128> {
    if !f.is_finite() || f.abs() >= 1.7e38 {
        return Err(RowStoreError::range(to, f));
    }
    Ok(f.trunc() as i128)
}

pub(crate) fn to_f64(value: &Value, to: ColumnType) -> Result<f64> {
    let f = match value {
        Value::Bool(b) => *b as u8 as f64,
        Value::U8(n) => *n as f64,
        Value::I16(n) => *n as f64,
        Value::I32(n) => *n as f64,
        Value::I64(n) => *n as f64,
        Value::U64(n) => *n as f64,
        Value::F32(n) => *n as f64,
        Value::F64(n) => *n,
        Value::Decimal(d) => d.to_f64().ok_or_else(|| conversion_error(value, to))?,
        Value::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| conversion_error(value, to))?,
        _ => return Err(conversion_error(value, to)),
    };
    Ok(f)
}

pub(crate) fn to_decimal(value: &Value, to: ColumnType) -> Result<Decimal> {
    let d = match value {
        Value::Bool(b) => Decimal::from(*b as u8),
        Value::U8(n) => Decimal::from(*n),
        Value::I16(n) => Decimal::from(*n),
        Value::I32(n) => Decimal::from(*n),
        Value::I64(n) => Decimal::from(*n),
        Value::U64(n) => Decimal::from(*n),
        Value::F32(f) => Decimal::from_f32(*f).ok_or_else(|| RowStoreError::range(to, f))?,
        Value::F64(f) => Decimal::from_f64(*f).ok_or_else(|| RowStoreError::range(to, f))?,
        Value::Decimal(d) => *d,
        Value::Text(s) => s
            .trim()
            .parse::<Decimal>()
            .map_err(|_| conversion_error(value, to))?,
        _ => return Err(conversion_error(value, to)),
    };
    Ok(d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Value::U8(7), ColumnType::BigInt, Value::I64(7))]
    #[case(Value::I32(-3), ColumnType::Float, Value::F64(-3.0))]
    #[case(Value::Text(" 42 ".into()), ColumnType::Int, Value::I32(42))]
    #[case(Value::Text("12.5".into()), ColumnType::SmallInt, Value::I16(12))]
    #[case(Value::Text("true".into()), ColumnType::Bit, Value::Bool(true))]
    #[case(Value::I64(5), ColumnType::VarChar, Value::Text("5".into()))]
    #[case(Value::F64(2.5), ColumnType::Money, Value::Decimal(Decimal::new(25, 1)))]
    fn test_supported_conversions(
        #[case] input: Value,
        #[case] to: ColumnType,
        #[case] expected: Value,
    ) {
        assert_eq!(convert(&input, to).unwrap(), expected);
    }

    #[test]
    fn test_string_to_datetime() {
        let converted = convert(&Value::Text("2020-05-17 10:30:00".into()), ColumnType::DateTime)
            .unwrap();
        let expected = NaiveDate::from_ymd_opt(2020, 5, 17)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!(converted, Value::DateTime(expected));

        let date_only = convert(&Value::Text("2020-05-17".into()), ColumnType::DateTime).unwrap();
        assert_eq!(
            date_only,
            Value::DateTime(expected.date().and_time(NaiveTime::MIN))
        );
    }

    #[test]
    fn test_unparsable_string_is_conversion_error() {
        let err = convert(&Value::Text("forty".into()), ColumnType::Int).unwrap_err();
        assert!(matches!(err, RowStoreError::Conversion { to: ColumnType::Int, .. }));

        let err = convert(&Value::Text("not-a-guid".into()), ColumnType::UniqueIdentifier)
            .unwrap_err();
        assert!(matches!(err, RowStoreError::Conversion { .. }));
    }

    #[test]
    fn test_narrowing_out_of_range() {
        let err = convert(&Value::I32(300), ColumnType::TinyInt).unwrap_err();
        assert!(matches!(err, RowStoreError::Range { kind: ColumnType::TinyInt, .. }));
    }

    #[test]
    fn test_unregistered_pair_fails() {
        let guid = Value::Guid(Uuid::nil());
        assert!(convert(&guid, ColumnType::Int).is_err());
        assert!(convert(&Value::Date(NaiveDate::MIN), ColumnType::Decimal).is_err());
    }
}
