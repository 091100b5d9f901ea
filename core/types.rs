/* Column Kinds:

Every cell carries one closed column kind. The kind decides the on-disk shape
of the cell payload inside a row buffer:

┌──────────────────┬──────────────┬──────────────────────────────────────┐
│ kind             │ payload      │ notes                                │
├──────────────────┼──────────────┼──────────────────────────────────────┤
│ Bit / TinyInt    │ 1 byte       │                                      │
│ SmallInt         │ 2 bytes      │                                      │
│ Int              │ 4 bytes      │ delta packed against precedence cell │
│ BigInt           │ 8 bytes      │ delta packed against precedence cell │
│ Real / Float     │ 4 / 8 bytes  │ IEEE-754                             │
│ Decimal          │ 16 bytes     │                                      │
│ SmallMoney/Money │ 4 / 8 bytes  │ scaled by 10^4                       │
│ date family      │ 4 / 8 bytes  │                                      │
│ UniqueIdentifier │ 16 bytes     │                                      │
│ Timestamp        │ 8 bytes      │ stored as BigInt                     │
│ strings / binary │ u16 + bytes  │ N* kinds are UTF-16LE                │
│ Text/NText/Image │ u16 + bytes  │ inline extended payload              │
└──────────────────┴──────────────┴──────────────────────────────────────┘
*/

use crate::error::RowStoreError;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ColumnType {
    Unknown = 0,
    Bit = 1,
    TinyInt = 2,
    SmallInt = 3,
    Int = 4,
    BigInt = 5,
    Real = 6,
    Float = 7,
    Decimal = 8,
    SmallMoney = 9,
    Money = 10,
    DateTime = 11,
    SmallDateTime = 12,
    Date = 13,
    Time = 14,
    Char = 15,
    VarChar = 16,
    NChar = 17,
    NVarChar = 18,
    Text = 19,
    NText = 20,
    Binary = 21,
    VarBinary = 22,
    Image = 23,
    UniqueIdentifier = 24,
    Timestamp = 25,
}

impl ColumnType {
    /// Size of the payload for fixed width kinds.
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            Self::Bit | Self::TinyInt => Some(1),
            Self::SmallInt => Some(2),
            Self::Int | Self::Real | Self::SmallMoney | Self::SmallDateTime | Self::Date => {
                Some(4)
            }
            Self::BigInt
            | Self::Float
            | Self::Money
            | Self::DateTime
            | Self::Time
            | Self::Timestamp => Some(8),
            Self::Decimal | Self::UniqueIdentifier => Some(16),
            Self::Unknown
            | Self::Char
            | Self::VarChar
            | Self::NChar
            | Self::NVarChar
            | Self::Text
            | Self::NText
            | Self::Binary
            | Self::VarBinary
            | Self::Image => None,
        }
    }

    #[inline(always)]
    pub const fn is_fixed(self) -> bool {
        self.fixed_size().is_some()
    }

    /// Kinds whose values may overflow a page and go through the extended store.
    pub const fn is_extended(self) -> bool {
        matches!(self, Self::Text | Self::NText | Self::Image)
    }

    pub const fn is_string(self) -> bool {
        matches!(
            self,
            Self::Char | Self::VarChar | Self::NChar | Self::NVarChar | Self::Text | Self::NText
        )
    }

    pub const fn is_unicode(self) -> bool {
        matches!(self, Self::NChar | Self::NVarChar | Self::NText)
    }

    pub const fn is_binary(self) -> bool {
        matches!(self, Self::Binary | Self::VarBinary | Self::Image)
    }

    /// Fixed width strings are space padded on duplication.
    pub const fn is_padded(self) -> bool {
        matches!(self, Self::Char | Self::NChar)
    }

    pub const fn is_integer_family(self) -> bool {
        matches!(
            self,
            Self::Bit | Self::TinyInt | Self::SmallInt | Self::Int | Self::BigInt | Self::Timestamp
        )
    }

    pub const fn is_date_family(self) -> bool {
        matches!(
            self,
            Self::DateTime | Self::SmallDateTime | Self::Date | Self::Time
        )
    }

    /// The kind whose encoding is used on disk. Timestamp cells reinterpret
    /// their bits as BigInt.
    pub const fn storage_kind(self) -> ColumnType {
        match self {
            Self::Timestamp => Self::BigInt,
            kind => kind,
        }
    }

    /// Kinds that are delta packed against a precedence cell.
    pub const fn supports_delta(self) -> bool {
        matches!(self.storage_kind(), Self::Int | Self::BigInt)
    }

    /// Implicit ranking used by binary arithmetic: the operand with the
    /// higher rank performs the operation and the other one is widened.
    pub const fn arithmetic_rank(self) -> Option<u8> {
        match self {
            Self::Bit => Some(1),
            Self::TinyInt => Some(2),
            Self::SmallInt => Some(3),
            Self::Int => Some(4),
            Self::BigInt | Self::Timestamp => Some(5),
            Self::SmallMoney => Some(6),
            Self::Money => Some(7),
            Self::Decimal => Some(8),
            Self::Real => Some(9),
            Self::Float => Some(10),
            _ => None,
        }
    }

    pub const fn type_id(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ColumnType {
    type Error = RowStoreError;

    fn try_from(value: u8) -> Result<Self> {
        let kind = match value {
            0 => Self::Unknown,
            1 => Self::Bit,
            2 => Self::TinyInt,
            3 => Self::SmallInt,
            4 => Self::Int,
            5 => Self::BigInt,
            6 => Self::Real,
            7 => Self::Float,
            8 => Self::Decimal,
            9 => Self::SmallMoney,
            10 => Self::Money,
            11 => Self::DateTime,
            12 => Self::SmallDateTime,
            13 => Self::Date,
            14 => Self::Time,
            15 => Self::Char,
            16 => Self::VarChar,
            17 => Self::NChar,
            18 => Self::NVarChar,
            19 => Self::Text,
            20 => Self::NText,
            21 => Self::Binary,
            22 => Self::VarBinary,
            23 => Self::Image,
            24 => Self::UniqueIdentifier,
            25 => Self::Timestamp,
            _ => return Err(RowStoreError::Corrupt(format!("invalid column type: {value}"))),
        };
        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::ColumnType;

    #[test]
    fn test_type_id_round_trip() {
        for id in 0..=25u8 {
            let kind = ColumnType::try_from(id).unwrap();
            assert_eq!(kind.type_id(), id);
        }
        assert!(ColumnType::try_from(26).is_err());
    }

    #[test]
    fn test_fixed_and_variable() {
        assert_eq!(ColumnType::Int.fixed_size(), Some(4));
        assert_eq!(ColumnType::Money.fixed_size(), Some(8));
        assert!(!ColumnType::VarChar.is_fixed());
        assert!(ColumnType::NText.is_extended());
        assert!(ColumnType::NText.is_unicode());
        assert!(!ColumnType::VarBinary.is_extended());
    }

    #[test]
    fn test_timestamp_aliases_bigint() {
        assert_eq!(ColumnType::Timestamp.storage_kind(), ColumnType::BigInt);
        assert!(ColumnType::Timestamp.supports_delta());
        assert!(!ColumnType::SmallInt.supports_delta());
    }

    #[test]
    fn test_arithmetic_rank_order() {
        let ranked = [
            ColumnType::Bit,
            ColumnType::TinyInt,
            ColumnType::SmallInt,
            ColumnType::Int,
            ColumnType::BigInt,
            ColumnType::SmallMoney,
            ColumnType::Money,
            ColumnType::Decimal,
            ColumnType::Real,
            ColumnType::Float,
        ];
        for pair in ranked.windows(2) {
            assert!(pair[0].arithmetic_rank() < pair[1].arithmetic_rank());
        }
        assert_eq!(ColumnType::VarChar.arithmetic_rank(), None);
    }
}
