//! SIMD-accelerated delimiter scanning using memchr
//!
//! Splits a buffer (or a bounded range of it) into divisions. The delimiter
//! count is taken first so the result is allocated exactly once.
//!
//! Uses memchr crate for fast byte searching with SIMD acceleration:
//! - SSE2 (default x86_64)
//! - AVX2 (runtime detection)
//! - NEON (aarch64)

use memchr::{memchr, memchr_iter};

use super::division::Division;

/// Divide the whole buffer.
///
/// `k` delimiters produce `k + 1` divisions that partition the buffer exactly.
/// An empty buffer yields one empty division. `None` never splits.
pub fn get_divisions(buffer: &str, delimiter: Option<u8>) -> Vec<Division> {
    get_divisions_bounded(buffer, delimiter, Division::new(0, buffer.len()))
}

/// Divide `buffer[bound.offset..bound.end()]`.
///
/// Result offsets are buffer-absolute. An invalid bound yields no divisions,
/// which is how descent into a missing element terminates quietly.
pub fn get_divisions_bounded(buffer: &str, delimiter: Option<u8>, bound: Division) -> Vec<Division> {
    if !bound.valid {
        return Vec::new();
    }
    let bytes = buffer.as_bytes();
    let end = bound.end().min(bytes.len());
    let start = bound.offset.min(end);
    let range = &bytes[start..end];

    let Some(delimiter) = delimiter else {
        return vec![Division::new(start, range.len())];
    };

    let count = memchr_iter(delimiter, range).count();
    let mut divisions = Vec::with_capacity(count + 1);
    let mut offset = 0;
    while let Some(found) = memchr(delimiter, &range[offset..]) {
        divisions.push(Division::new(start + offset, found));
        offset += found + 1;
    }
    divisions.push(Division::new(start + offset, range.len() - offset));
    divisions
}

/// Number of divisions `get_divisions` would produce, without allocating
#[inline]
pub fn count_divisions(text: &str, delimiter: Option<u8>) -> usize {
    match delimiter {
        Some(d) => memchr_iter(d, text.as_bytes()).count() + 1,
        None => 1,
    }
}

/// The `index`-th division of `text`, scanning no further than needed
pub fn nth_division(text: &str, delimiter: Option<u8>, index: usize) -> Option<&str> {
    let Some(delimiter) = delimiter else {
        return (index == 0).then_some(text);
    };
    let bytes = text.as_bytes();
    let mut start = 0;
    for _ in 0..index {
        let found = memchr(delimiter, &bytes[start..])?;
        start += found + 1;
    }
    let end = memchr(delimiter, &bytes[start..]).map_or(bytes.len(), |i| start + i);
    text.get(start..end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", 1)]
    #[case("a", 1)]
    #[case("a|b", 2)]
    #[case("|", 2)]
    #[case("a||b|", 4)]
    fn test_division_count(#[case] input: &str, #[case] expected: usize) {
        let divisions = get_divisions(input, Some(b'|'));
        assert_eq!(divisions.len(), expected);
        assert_eq!(count_divisions(input, Some(b'|')), expected);
    }

    #[test]
    fn test_divisions_partition_buffer() {
        let input = "MSH|^~\\&||A|";
        let divisions = get_divisions(input, Some(b'|'));
        let mut expected_offset = 0;
        for div in &divisions {
            assert_eq!(div.offset, expected_offset);
            expected_offset = div.end() + 1;
        }
        assert_eq!(divisions.last().map(Division::end), Some(input.len()));
        let values: Vec<_> = divisions.iter().map(|d| d.slice(input)).collect();
        assert_eq!(values, vec!["MSH", "^~\\&", "", "A", ""]);
    }

    #[test]
    fn test_bounded_offsets_are_absolute() {
        let input = "PID|a^b^c|x";
        let divisions = get_divisions_bounded(input, Some(b'^'), Division::new(4, 5));
        assert_eq!(divisions, vec![Division::new(4, 1), Division::new(6, 1), Division::new(8, 1)]);
    }

    #[test]
    fn test_invalid_bound_yields_nothing() {
        assert!(get_divisions_bounded("a|b", Some(b'|'), Division::INVALID).is_empty());
    }

    #[test]
    fn test_no_delimiter_never_splits() {
        let divisions = get_divisions("^~\\&", None);
        assert_eq!(divisions, vec![Division::new(0, 4)]);
    }

    #[test]
    fn test_nth_division() {
        assert_eq!(nth_division("a|b|c", Some(b'|'), 1), Some("b"));
        assert_eq!(nth_division("a|b|c", Some(b'|'), 2), Some("c"));
        assert_eq!(nth_division("a|b|c", Some(b'|'), 3), None);
        assert_eq!(nth_division("abc", None, 0), Some("abc"));
        assert_eq!(nth_division("abc", None, 1), None);
    }
}
