/* Delta Packing:

Integer cells that have a precedence cell (the same column of the previous
row on a page) store `value - precedence` instead of the raw value, using the
fewest bytes that can hold the difference.

A negative difference is folded: its bits are complemented and the inverted
flag is raised, so small negative and small positive deltas both pack small.

32-bit layout, the control nibble lives in the low 4 bits of the first byte:

    bit   7..4         3          2..0
        ┌───────────┬──────────┬─────────┐
        │ magnitude │ inverted │ length  │   followed by length-1 bytes
        └───────────┴──────────┴─────────┘

    length 1..4 holds 4, 12, 20, 28 magnitude bits
    (thresholds 15, 4095, 1048575, 268435455).
    length 5 is the escape: the raw 4 byte difference follows.

64-bit layout, the control field is the low 5 bits of the first byte:

    bit   7..5         4          3..0
        ┌───────────┬──────────┬─────────┐
        │ magnitude │ inverted │ length  │
        └───────────┴──────────┴─────────┘

    length 1..8 holds 3, 11, ..., 59 magnitude bits
    (thresholds 7, 2047, ..., 576460752303423487).
    length 9 is the escape: the raw 8 byte difference follows.

All multi byte words are little endian.
*/

use crate::bail_corrupt_error;
use crate::Result;

const I32_CONTROL_BITS: u32 = 4;
const I32_LENGTH_MASK: u8 = 0x07;
const I32_INVERTED: u8 = 0x08;
pub const I32_ESCAPE: u8 = 5;

const I64_CONTROL_BITS: u32 = 5;
const I64_LENGTH_MASK: u8 = 0x0F;
const I64_INVERTED: u8 = 0x10;
pub const I64_ESCAPE: u8 = 9;

pub const I32_THRESHOLDS: [u32; 4] = [15, 4095, 1_048_575, 268_435_455];

pub const I64_THRESHOLDS: [u64; 8] = [
    7,
    2047,
    524_287,
    134_217_727,
    34_359_738_367,
    8_796_093_022_207,
    2_251_799_813_685_247,
    576_460_752_303_423_487,
];

#[inline]
fn fold_i32(diff: i32) -> (bool, u32) {
    if diff < 0 {
        (true, !diff as u32)
    } else {
        (false, diff as u32)
    }
}

#[inline]
fn fold_i64(diff: i64) -> (bool, u64) {
    if diff < 0 {
        (true, !diff as u64)
    } else {
        (false, diff as u64)
    }
}

fn packed_len_i32(magnitude: u32) -> Option<usize> {
    I32_THRESHOLDS
        .iter()
        .position(|&limit| magnitude <= limit)
        .map(|i| i + 1)
}

fn packed_len_i64(magnitude: u64) -> Option<usize> {
    I64_THRESHOLDS
        .iter()
        .position(|&limit| magnitude <= limit)
        .map(|i| i + 1)
}

/// Number of bytes [`encode_i32`] writes for `value` against `base`.
pub fn encoded_len_i32(value: i32, base: i32) -> usize {
    let (_, magnitude) = fold_i32(value.wrapping_sub(base));
    packed_len_i32(magnitude).unwrap_or(1 + 4)
}

pub fn encode_i32(value: i32, base: i32, out: &mut Vec<u8>) {
    let diff = value.wrapping_sub(base);
    let (inverted, magnitude) = fold_i32(diff);
    match packed_len_i32(magnitude) {
        Some(len) => {
            let word = (magnitude << I32_CONTROL_BITS)
                | (if inverted { I32_INVERTED as u32 } else { 0 })
                | len as u32;
            out.extend_from_slice(&word.to_le_bytes()[..len]);
        }
        None => {
            out.push(I32_ESCAPE);
            out.extend_from_slice(&diff.to_le_bytes());
        }
    }
}

/// Total packed length announced by the first byte of an int32 delta.
pub fn packed_len_from_control_i32(first: u8) -> usize {
    let control = first & 0x0F;
    if control == I32_ESCAPE {
        5
    } else {
        (control & I32_LENGTH_MASK) as usize
    }
}

/// Total packed length announced by the first byte of an int64 delta.
pub fn packed_len_from_control_i64(first: u8) -> usize {
    let control = first & 0x1F;
    if control == I64_ESCAPE {
        9
    } else {
        (control & I64_LENGTH_MASK) as usize
    }
}

/// Decodes a packed difference and adds it back onto `base`. Returns the
/// value and the number of consumed bytes.
pub fn decode_i32(buf: &[u8], base: i32) -> Result<(i32, usize)> {
    let Some(&first) = buf.first() else {
        bail_corrupt_error!("packed int32 is empty");
    };
    let control = first & 0x0F;
    let len = (control & I32_LENGTH_MASK) as usize;
    if control == I32_ESCAPE {
        if buf.len() < 5 {
            bail_corrupt_error!("packed int32 escape truncated");
        }
        let diff = i32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]);
        return Ok((base.wrapping_add(diff), 5));
    }
    if !(1..=4).contains(&len) {
        bail_corrupt_error!("invalid packed int32 control {control:#x}");
    }
    if buf.len() < len {
        bail_corrupt_error!("packed int32 needs {len} bytes, {} available", buf.len());
    }
    let mut word = [0u8; 4];
    word[..len].copy_from_slice(&buf[..len]);
    let magnitude = u32::from_le_bytes(word) >> I32_CONTROL_BITS;
    let diff = if control & I32_INVERTED != 0 {
        !magnitude as i32
    } else {
        magnitude as i32
    };
    Ok((base.wrapping_add(diff), len))
}

/// Number of bytes [`encode_i64`] writes for `value` against `base`.
pub fn encoded_len_i64(value: i64, base: i64) -> usize {
    let (_, magnitude) = fold_i64(value.wrapping_sub(base));
    packed_len_i64(magnitude).unwrap_or(1 + 8)
}

pub fn encode_i64(value: i64, base: i64, out: &mut Vec<u8>) {
    let diff = value.wrapping_sub(base);
    let (inverted, magnitude) = fold_i64(diff);
    match packed_len_i64(magnitude) {
        Some(len) => {
            let word = (magnitude << I64_CONTROL_BITS)
                | (if inverted { I64_INVERTED as u64 } else { 0 })
                | len as u64;
            out.extend_from_slice(&word.to_le_bytes()[..len]);
        }
        None => {
            out.push(I64_ESCAPE);
            out.extend_from_slice(&diff.to_le_bytes());
        }
    }
}

pub fn decode_i64(buf: &[u8], base: i64) -> Result<(i64, usize)> {
    let Some(&first) = buf.first() else {
        bail_corrupt_error!("packed int64 is empty");
    };
    let control = first & 0x1F;
    let len = (control & I64_LENGTH_MASK) as usize;
    if control == I64_ESCAPE {
        if buf.len() < 9 {
            bail_corrupt_error!("packed int64 escape truncated");
        }
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&buf[1..9]);
        return Ok((base.wrapping_add(i64::from_le_bytes(raw)), 9));
    }
    if !(1..=8).contains(&len) {
        bail_corrupt_error!("invalid packed int64 control {control:#x}");
    }
    if buf.len() < len {
        bail_corrupt_error!("packed int64 needs {len} bytes, {} available", buf.len());
    }
    let mut word = [0u8; 8];
    word[..len].copy_from_slice(&buf[..len]);
    let magnitude = u64::from_le_bytes(word) >> I64_CONTROL_BITS;
    let diff = if control & I64_INVERTED != 0 {
        !magnitude as i64
    } else {
        magnitude as i64
    };
    Ok((base.wrapping_add(diff), len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_thresholds_reserve_control_bits() {
        for (i, limit) in I32_THRESHOLDS.iter().enumerate() {
            let len = i as u32 + 1;
            assert_eq!(*limit, (1u32 << (8 * len - 4)) - 1);
        }
        for (i, limit) in I64_THRESHOLDS.iter().enumerate() {
            let len = i as u32 + 1;
            assert_eq!(*limit, (1u64 << (8 * len - 5)) - 1);
        }
    }

    #[rstest]
    #[case(0, 0, 1)]
    #[case(15, 0, 1)]
    #[case(16, 0, 2)]
    #[case(-16, 0, 1)]
    #[case(-17, 0, 2)]
    #[case(4095, 0, 2)]
    #[case(4096, 0, 3)]
    #[case(1_048_575, 0, 3)]
    #[case(1_048_576, 0, 4)]
    #[case(268_435_455, 0, 4)]
    #[case(268_435_456, 0, 5)]
    #[case(-268_435_456, 0, 4)]
    #[case(-268_435_457, 0, 5)]
    #[case(1000, 990, 1)]
    #[case(i32::MAX, i32::MIN, 1)]
    #[case(i32::MIN, i32::MAX, 1)]
    fn test_i32_lengths(#[case] value: i32, #[case] base: i32, #[case] expected_len: usize) {
        let mut buf = Vec::new();
        encode_i32(value, base, &mut buf);
        assert_eq!(buf.len(), expected_len);
        assert_eq!(encoded_len_i32(value, base), expected_len);

        let (decoded, consumed) = decode_i32(&buf, base).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(consumed, expected_len);
        assert_eq!(packed_len_from_control_i32(buf[0]), expected_len);
    }

    #[rstest]
    #[case(0, 0, 1)]
    #[case(7, 0, 1)]
    #[case(8, 0, 2)]
    #[case(-8, 0, 1)]
    #[case(-9, 0, 2)]
    #[case(2047, 0, 2)]
    #[case(2048, 0, 3)]
    #[case(576_460_752_303_423_487, 0, 8)]
    #[case(576_460_752_303_423_488, 0, 9)]
    #[case(-576_460_752_303_423_488, 0, 8)]
    #[case(-576_460_752_303_423_489, 0, 9)]
    #[case(i64::MAX, 0, 9)]
    #[case(i64::MIN, 1, 9)]
    #[case(i64::MAX, i64::MIN, 1)]
    fn test_i64_lengths(#[case] value: i64, #[case] base: i64, #[case] expected_len: usize) {
        let mut buf = Vec::new();
        encode_i64(value, base, &mut buf);
        assert_eq!(buf.len(), expected_len);
        assert_eq!(encoded_len_i64(value, base), expected_len);

        let (decoded, consumed) = decode_i64(&buf, base).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(consumed, expected_len);
        assert_eq!(packed_len_from_control_i64(buf[0]), expected_len);
    }

    #[test]
    fn test_i32_bit_layout() {
        let mut buf = Vec::new();
        encode_i32(105, 100, &mut buf);
        // magnitude 5, not inverted, length 1
        assert_eq!(buf, vec![0x51]);

        buf.clear();
        encode_i32(95, 100, &mut buf);
        // diff -5 folds to magnitude 4 with the inverted bit
        assert_eq!(buf, vec![0x49]);

        buf.clear();
        encode_i32(i32::MAX, 0, &mut buf);
        let mut expected = vec![I32_ESCAPE];
        expected.extend_from_slice(&i32::MAX.to_le_bytes());
        assert_eq!(buf, expected);
    }

    #[test]
    fn test_i64_bit_layout() {
        let mut buf = Vec::new();
        encode_i64(3, 0, &mut buf);
        assert_eq!(buf, vec![(3 << 5) | 1]);

        buf.clear();
        encode_i64(-1, 0, &mut buf);
        assert_eq!(buf, vec![0x10 | 1]);

        buf.clear();
        encode_i64(300, 0, &mut buf);
        let word = (300u64 << 5) | 2;
        assert_eq!(buf, word.to_le_bytes()[..2].to_vec());
    }

    #[test]
    fn test_round_trip_sampled_pairs() {
        // xorshift keeps the sample deterministic
        let mut state = 0x9E37_79B9_7F4A_7C15u64;
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };
        for _ in 0..10_000 {
            let a = next();
            let b = next();
            let shift = (next() % 64) as u32;

            let (value, base) = ((a >> shift) as i64, b as i64);
            let mut buf = Vec::new();
            encode_i64(value, base, &mut buf);
            assert_eq!(decode_i64(&buf, base).unwrap(), (value, buf.len()));

            let (value, base) = ((a >> shift) as i32, (b >> 32) as i32);
            buf.clear();
            encode_i32(value, base, &mut buf);
            assert_eq!(decode_i32(&buf, base).unwrap(), (value, buf.len()));
        }
    }

    #[test]
    fn test_invalid_control_is_corrupt() {
        assert!(decode_i32(&[0x00], 0).is_err());
        assert!(decode_i32(&[0x06], 0).is_err());
        assert!(decode_i32(&[I32_ESCAPE, 1, 2], 0).is_err());
        assert!(decode_i64(&[0x0A], 0).is_err());
        assert!(decode_i64(&[], 0).is_err());
    }
}
