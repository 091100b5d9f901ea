/// Row version word: the top bit marks an outdated row, the low 31 bits hold
/// the id of the transaction that produced it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RowVersion(u32);

impl RowVersion {
    pub const OUTDATED: u32 = 0x8000_0000;
    pub const TRANSACTION_MASK: u32 = 0x7FFF_FFFF;

    pub const fn new(transaction_id: u32, outdated: bool) -> Self {
        let flag = if outdated { Self::OUTDATED } else { 0 };
        Self((transaction_id & Self::TRANSACTION_MASK) | flag)
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn transaction_id(self) -> u32 {
        self.0 & Self::TRANSACTION_MASK
    }

    pub const fn is_outdated(self) -> bool {
        self.0 & Self::OUTDATED != 0
    }

    pub fn set_outdated(&mut self, outdated: bool) {
        *self = Self::new(self.transaction_id(), outdated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_bits() {
        let mut version = RowVersion::new(42, false);
        assert_eq!(version.raw(), 42);
        assert!(!version.is_outdated());

        version.set_outdated(true);
        assert_eq!(version.raw(), 0x8000_002A);
        assert_eq!(version.transaction_id(), 42);
        assert!(version.is_outdated());

        let masked = RowVersion::new(u32::MAX, false);
        assert_eq!(masked.transaction_id(), RowVersion::TRANSACTION_MASK);
        assert!(!masked.is_outdated());
        assert_eq!(RowVersion::from_raw(masked.raw()), masked);
    }
}
