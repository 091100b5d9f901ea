use std::cmp::Ordering;

use crate::column::convert::convert;
use crate::value::{Value, TOP_CHAR};

/// Orders two strings the way index keys are ordered.
///
/// Strings are compared by case folded characters first; a case sensitive
/// collation then breaks ties with lowercase sorting before uppercase. A
/// string starting with [`TOP_CHAR`] sorts above every string that does not.
pub fn collate_strings(a: &str, b: &str, case_sensitive: bool) -> Ordering {
    let a_top = a.starts_with(TOP_CHAR);
    let b_top = b.starts_with(TOP_CHAR);
    match (a_top, b_top) {
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }

    let folded = a
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase));
    if folded != Ordering::Equal || !case_sensitive {
        return folded;
    }
    // lowercase first on a case-only difference
    for (x, y) in a.chars().zip(b.chars()) {
        if x != y {
            return match (x.is_lowercase(), y.is_lowercase()) {
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                _ => x.cmp(&y),
            };
        }
    }
    a.len().cmp(&b.len())
}

/// Same as [`collate_strings`] with trailing blanks ignored, which is how
/// fixed width strings compare.
pub fn collate_strings_trimmed(a: &str, b: &str, case_sensitive: bool) -> Ordering {
    collate_strings(a.trim_end_matches(' '), b.trim_end_matches(' '), case_sensitive)
}

/// Orders two non-null values. Numeric values of different kinds are widened
/// to the higher ranked kind before comparing.
pub fn collate_values(a: &Value, b: &Value, case_sensitive: bool, trimmed: bool) -> Ordering {
    match (a, b) {
        (Value::Text(x), Value::Text(y)) if trimmed => collate_strings_trimmed(x, y, case_sensitive),
        (Value::Text(x), Value::Text(y)) => collate_strings(x, y, case_sensitive),
        (Value::Bytes(x), Value::Bytes(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::DateTime(x), Value::DateTime(y)) => x.cmp(y),
        (Value::Date(x), Value::Date(y)) => x.cmp(y),
        (Value::Time(x), Value::Time(y)) => x.cmp(y),
        (Value::Guid(x), Value::Guid(y)) => x.cmp(y),
        _ => collate_numeric(a, b)
            .unwrap_or_else(|| a.natural_kind().type_id().cmp(&b.natural_kind().type_id())),
    }
}

fn collate_numeric(a: &Value, b: &Value) -> Option<Ordering> {
    let ka = a.natural_kind();
    let kb = b.natural_kind();
    let target = if ka.arithmetic_rank()? >= kb.arithmetic_rank()? {
        ka
    } else {
        kb
    };
    let a = convert(a, target).ok()?;
    let b = convert(b, target).ok()?;
    let ordering = match (&a, &b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::U8(x), Value::U8(y)) => x.cmp(y),
        (Value::I16(x), Value::I16(y)) => x.cmp(y),
        (Value::I32(x), Value::I32(y)) => x.cmp(y),
        (Value::I64(x), Value::I64(y)) => x.cmp(y),
        (Value::U64(x), Value::U64(y)) => x.cmp(y),
        (Value::F32(x), Value::F32(y)) => x.total_cmp(y),
        (Value::F64(x), Value::F64(y)) => x.total_cmp(y),
        (Value::Decimal(x), Value::Decimal(y)) => x.cmp(y),
        _ => return None,
    };
    Some(ordering)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal::Decimal;

    #[rstest]
    #[case("abc", "abd", false, Ordering::Less)]
    #[case("ABC", "abc", false, Ordering::Equal)]
    #[case("abc", "ABC", true, Ordering::Less)]
    #[case("Abc", "abc", true, Ordering::Greater)]
    #[case("ab", "abc", true, Ordering::Less)]
    #[case("", "a", false, Ordering::Less)]
    fn test_collate_strings(
        #[case] a: &str,
        #[case] b: &str,
        #[case] case_sensitive: bool,
        #[case] expected: Ordering,
    ) {
        assert_eq!(collate_strings(a, b, case_sensitive), expected);
        assert_eq!(collate_strings(b, a, case_sensitive), expected.reverse());
    }

    // accented letters order by code point after lowercasing, not next to
    // their base letter
    #[rstest]
    #[case("é", "f", Ordering::Greater)]
    #[case("Émile", "emily", Ordering::Greater)]
    #[case("Äpfel", "zebra", Ordering::Greater)]
    #[case("ÉCOLE", "école", Ordering::Equal)]
    fn test_collation_is_invariant_code_point_order(
        #[case] a: &str,
        #[case] b: &str,
        #[case] expected: Ordering,
    ) {
        assert_eq!(collate_strings(a, b, false), expected);
    }

    #[rstest]
    #[case("zzzz")]
    #[case("\u{FFFE}")]
    #[case("\u{10FFFF}")]
    #[case("")]
    fn test_top_sentinel_sorts_last(#[case] other: &str) {
        let top = format!("{TOP_CHAR}");
        for case_sensitive in [false, true] {
            assert_eq!(collate_strings(&top, other, case_sensitive), Ordering::Greater);
            assert_eq!(collate_strings(other, &top, case_sensitive), Ordering::Less);
        }
    }

    #[test]
    fn test_trimmed_ignores_trailing_blanks() {
        assert_eq!(collate_strings_trimmed("ab   ", "ab", false), Ordering::Equal);
        assert_eq!(collate_strings("ab   ", "ab", false), Ordering::Greater);
    }

    #[test]
    fn test_mixed_numeric_widening() {
        assert_eq!(
            collate_values(&Value::U8(3), &Value::I64(-1), false, false),
            Ordering::Greater
        );
        assert_eq!(
            collate_values(&Value::I32(2), &Value::Decimal(Decimal::new(25, 1)), false, false),
            Ordering::Less
        );
        assert_eq!(
            collate_values(&Value::F64(2.0), &Value::I16(2), false, false),
            Ordering::Equal
        );
    }
}
