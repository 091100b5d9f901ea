//! Arithmetic over cells.
//!
//! Operands are widened to the higher ranked kind of the two before the
//! operation runs. Integer kinds wrap at their natural width, decimal kinds
//! are checked and then validated against the result kind's range. A null
//! operand yields a null cell of the result kind.

use std::ops::{Add, BitAnd, BitOr, BitXor, Div, Mul, Neg, Not, Rem, Sub};

use rust_decimal::Decimal;

use super::convert::convert;
use super::Column;
use crate::error::RowStoreError;
use crate::types::ColumnType;
use crate::value::Value;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
        }
    }

    fn is_bitwise(self) -> bool {
        matches!(self, BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor)
    }
}

fn unsupported(op: BinaryOp, kind: ColumnType) -> RowStoreError {
    RowStoreError::UnsupportedOperator {
        op: op.symbol(),
        kind,
    }
}

fn result_template<'a>(op: BinaryOp, lhs: &'a Column, rhs: &'a Column) -> Result<&'a Column> {
    if op == BinaryOp::Add && lhs.kind().is_string() && rhs.kind().is_string() {
        return Ok(lhs);
    }
    let Some(l) = lhs.kind().arithmetic_rank() else {
        return Err(unsupported(op, lhs.kind()));
    };
    let Some(r) = rhs.kind().arithmetic_rank() else {
        return Err(unsupported(op, rhs.kind()));
    };
    Ok(if l >= r { lhs } else { rhs })
}

/// Applies `op` to two cells, producing a new cell of the higher ranked kind.
pub fn binary_op(op: BinaryOp, lhs: &Column, rhs: &Column) -> Result<Column> {
    let template = result_template(op, lhs, rhs)?;
    let kind = template.kind();
    let mut result = template.blank();
    let (Some(a), Some(b)) = (lhs.value(), rhs.value()) else {
        return Ok(result);
    };
    let a = convert(a, kind)?;
    let b = convert(b, kind)?;
    let value = apply(op, kind, a, b)?;
    result.assign(Some(value), 0)?;
    Ok(result)
}

macro_rules! wrapping_int {
    ($op:expr, $kind:expr, $x:expr, $y:expr, $variant:path) => {{
        let (x, y) = ($x, $y);
        let v = match $op {
            BinaryOp::Add => x.wrapping_add(y),
            BinaryOp::Sub => x.wrapping_sub(y),
            BinaryOp::Mul => x.wrapping_mul(y),
            BinaryOp::Div | BinaryOp::Rem if y == 0 => return Err(RowStoreError::DivideByZero),
            BinaryOp::Div => x.wrapping_div(y),
            BinaryOp::Rem => x.wrapping_rem(y),
            BinaryOp::BitAnd => x & y,
            BinaryOp::BitOr => x | y,
            BinaryOp::BitXor => x ^ y,
        };
        $variant(v)
    }};
}

macro_rules! float {
    ($op:expr, $kind:expr, $x:expr, $y:expr, $variant:path) => {{
        let (x, y) = ($x, $y);
        let v = match $op {
            BinaryOp::Add => x + y,
            BinaryOp::Sub => x - y,
            BinaryOp::Mul => x * y,
            BinaryOp::Div | BinaryOp::Rem if y == 0.0 => return Err(RowStoreError::DivideByZero),
            BinaryOp::Div => x / y,
            BinaryOp::Rem => x % y,
            op => return Err(unsupported(op, $kind)),
        };
        $variant(v)
    }};
}

fn apply(op: BinaryOp, kind: ColumnType, a: Value, b: Value) -> Result<Value> {
    let value = match (a, b) {
        (Value::Text(mut x), Value::Text(y)) if op == BinaryOp::Add => {
            x.push_str(&y);
            Value::Text(x)
        }
        (Value::Bool(x), Value::Bool(y)) if op.is_bitwise() => Value::Bool(match op {
            BinaryOp::BitAnd => x & y,
            BinaryOp::BitOr => x | y,
            _ => x ^ y,
        }),
        (Value::U8(x), Value::U8(y)) => wrapping_int!(op, kind, x, y, Value::U8),
        (Value::I16(x), Value::I16(y)) => wrapping_int!(op, kind, x, y, Value::I16),
        (Value::I32(x), Value::I32(y)) => wrapping_int!(op, kind, x, y, Value::I32),
        (Value::I64(x), Value::I64(y)) => wrapping_int!(op, kind, x, y, Value::I64),
        (Value::U64(x), Value::U64(y)) => wrapping_int!(op, kind, x, y, Value::U64),
        (Value::F32(x), Value::F32(y)) => float!(op, kind, x, y, Value::F32),
        (Value::F64(x), Value::F64(y)) => float!(op, kind, x, y, Value::F64),
        (Value::Decimal(x), Value::Decimal(y)) => Value::Decimal(decimal_op(op, kind, x, y)?),
        _ => return Err(unsupported(op, kind)),
    };
    Ok(value)
}

fn decimal_op(op: BinaryOp, kind: ColumnType, x: Decimal, y: Decimal) -> Result<Decimal> {
    if matches!(op, BinaryOp::Div | BinaryOp::Rem) && y.is_zero() {
        return Err(RowStoreError::DivideByZero);
    }
    let v = match op {
        BinaryOp::Add => x.checked_add(y),
        BinaryOp::Sub => x.checked_sub(y),
        BinaryOp::Mul => x.checked_mul(y),
        BinaryOp::Div => x.checked_div(y),
        BinaryOp::Rem => x.checked_rem(y),
        op => return Err(unsupported(op, kind)),
    };
    v.ok_or_else(|| RowStoreError::range(kind, format!("{x} {} {y}", op.symbol())))
}

/// Arithmetic negation. Unsigned kinds do not negate.
pub fn negate(cell: &Column) -> Result<Column> {
    let mut result = cell.blank();
    let Some(value) = cell.value() else {
        return Ok(result);
    };
    let negated = match value {
        Value::I16(n) => Value::I16(n.wrapping_neg()),
        Value::I32(n) => Value::I32(n.wrapping_neg()),
        Value::I64(n) => Value::I64(n.wrapping_neg()),
        Value::F32(n) => Value::F32(-n),
        Value::F64(n) => Value::F64(-n),
        Value::Decimal(d) => Value::Decimal(-*d),
        _ => {
            return Err(RowStoreError::UnsupportedOperator {
                op: "-",
                kind: cell.kind(),
            })
        }
    };
    result.assign(Some(negated), 0)?;
    Ok(result)
}

/// Bitwise complement of integer and Bit cells.
pub fn bit_not(cell: &Column) -> Result<Column> {
    let mut result = cell.blank();
    let Some(value) = cell.value() else {
        return Ok(result);
    };
    let inverted = match value {
        Value::Bool(b) => Value::Bool(!b),
        Value::U8(n) => Value::U8(!n),
        Value::I16(n) => Value::I16(!n),
        Value::I32(n) => Value::I32(!n),
        Value::I64(n) => Value::I64(!n),
        Value::U64(n) => Value::U64(!n),
        _ => {
            return Err(RowStoreError::UnsupportedOperator {
                op: "~",
                kind: cell.kind(),
            })
        }
    };
    result.assign(Some(inverted), 0)?;
    Ok(result)
}

macro_rules! impl_binary_ops {
    ($($trait:ident :: $method:ident => $op:ident),* $(,)?) => {
        $(
            impl $trait for &Column {
                type Output = Result<Column>;

                fn $method(self, rhs: &Column) -> Self::Output {
                    binary_op(BinaryOp::$op, self, rhs)
                }
            }
        )*
    };
}

impl_binary_ops! {
    Add::add => Add,
    Sub::sub => Sub,
    Mul::mul => Mul,
    Div::div => Div,
    Rem::rem => Rem,
    BitAnd::bitand => BitAnd,
    BitOr::bitor => BitOr,
    BitXor::bitxor => BitXor,
}

impl Neg for &Column {
    type Output = Result<Column>;

    fn neg(self) -> Self::Output {
        negate(self)
    }
}

impl Not for &Column {
    type Output = Result<Column>;

    fn not(self) -> Self::Output {
        bit_not(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn cell(kind: ColumnType, value: Value) -> Column {
        Column::with_value(kind, value).unwrap()
    }

    #[rstest]
    #[case(BinaryOp::Add, 7, 5, 12)]
    #[case(BinaryOp::Sub, 7, 5, 2)]
    #[case(BinaryOp::Mul, 7, 5, 35)]
    #[case(BinaryOp::Div, 7, 5, 1)]
    #[case(BinaryOp::Rem, 7, 5, 2)]
    #[case(BinaryOp::BitAnd, 6, 3, 2)]
    #[case(BinaryOp::BitOr, 6, 3, 7)]
    #[case(BinaryOp::BitXor, 6, 3, 5)]
    fn test_int_ops(#[case] op: BinaryOp, #[case] a: i32, #[case] b: i32, #[case] expected: i32) {
        let lhs = cell(ColumnType::Int, Value::I32(a));
        let rhs = cell(ColumnType::Int, Value::I32(b));
        let result = binary_op(op, &lhs, &rhs).unwrap();
        assert_eq!(result.value(), Some(&Value::I32(expected)));
    }

    #[test]
    fn test_integer_overflow_wraps() {
        let max = cell(ColumnType::Int, Value::I32(i32::MAX));
        let one = cell(ColumnType::Int, Value::I32(1));
        let sum = (&max + &one).unwrap();
        assert_eq!(sum.value(), Some(&Value::I32(i32::MIN)));
    }

    #[test]
    fn test_widening_to_higher_rank() {
        let small = cell(ColumnType::SmallInt, Value::I16(2));
        let big = cell(ColumnType::BigInt, Value::I64(40));
        let result = (&small * &big).unwrap();
        assert_eq!(result.kind(), ColumnType::BigInt);
        assert_eq!(result.value(), Some(&Value::I64(80)));

        let float = cell(ColumnType::Float, Value::F64(0.5));
        let result = (&big + &float).unwrap();
        assert_eq!(result.kind(), ColumnType::Float);
        assert_eq!(result.value(), Some(&Value::F64(40.5)));
    }

    #[test]
    fn test_money_overflow_is_range_error() {
        let max = cell(ColumnType::Money, Value::max_value(ColumnType::Money).unwrap());
        let one = cell(ColumnType::Int, Value::I32(1));
        let err = (&max + &one).unwrap_err();
        assert!(matches!(err, RowStoreError::Range { kind: ColumnType::Money, .. }));
    }

    #[test]
    fn test_divide_by_zero() {
        let a = cell(ColumnType::Int, Value::I32(1));
        let zero = cell(ColumnType::Int, Value::I32(0));
        assert!(matches!((&a / &zero).unwrap_err(), RowStoreError::DivideByZero));

        let d = cell(ColumnType::Decimal, Value::Decimal(Decimal::ONE));
        assert!(matches!((&d % &zero).unwrap_err(), RowStoreError::DivideByZero));
    }

    #[test]
    fn test_null_propagates() {
        let null = Column::new(ColumnType::BigInt);
        let one = cell(ColumnType::Int, Value::I32(1));
        let result = (&one - &null).unwrap();
        assert!(result.is_null());
        assert_eq!(result.kind(), ColumnType::BigInt);
    }

    #[test]
    fn test_string_concatenation() {
        let a = cell(ColumnType::VarChar, Value::Text("foo".into()));
        let b = cell(ColumnType::NVarChar, Value::Text("bar".into()));
        assert_eq!((&a + &b).unwrap().value(), Some(&Value::Text("foobar".into())));
        assert!((&a - &b).is_err());
    }

    #[test]
    fn test_unary_ops() {
        let n = cell(ColumnType::SmallInt, Value::I16(5));
        assert_eq!((-&n).unwrap().value(), Some(&Value::I16(-5)));
        assert_eq!((!&n).unwrap().value(), Some(&Value::I16(!5)));

        let byte = cell(ColumnType::TinyInt, Value::U8(1));
        assert!((-&byte).is_err());
        let text = cell(ColumnType::VarChar, Value::Text("x".into()));
        assert!((!&text).is_err());
    }

    #[test]
    fn test_unsupported_kind() {
        let guid = cell(ColumnType::UniqueIdentifier, Value::Guid(uuid::Uuid::nil()));
        let one = cell(ColumnType::Int, Value::I32(1));
        let err = (&guid + &one).unwrap_err();
        assert!(matches!(
            err,
            RowStoreError::UnsupportedOperator {
                kind: ColumnType::UniqueIdentifier,
                ..
            }
        ));
    }
}
