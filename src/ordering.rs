//! Line orderings.

use std::cmp::Ordering;

/// Total order over lines used by chunk sorting and by every merge comparison.
///
/// A missing line (`None`) is an absent row. Implementations are expected to rank absent and empty lines after
/// every non-empty line so malformed rows sink to the end of the output instead of aborting the sort.
pub trait LineOrdering: Send + Sync {
    /// Compares two optional lines (without their separator byte).
    fn compare(&self, a: Option<&[u8]>, b: Option<&[u8]>) -> Ordering;

    /// Compares two lines that are known to be present.
    fn compare_lines(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.compare(Some(a), Some(b))
    }
}

impl<F> LineOrdering for F
where
    F: Fn(&[u8], &[u8]) -> Ordering + Send + Sync,
{
    fn compare(&self, a: Option<&[u8]>, b: Option<&[u8]>) -> Ordering {
        match (non_empty(a), non_empty(b)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => self(a, b),
        }
    }
}

/// Ordering for lines shaped as `<integer-id><delimiter><free-text>`.
///
/// The text after the first delimiter is the primary key and is compared byte-wise. When texts are equal the
/// integer prefixes decide, compared numerically. If either prefix is not an integer the textual result stands.
/// A line without the delimiter is all text and has no numeric key.
#[derive(Debug, Clone, Copy)]
pub struct IdTextOrdering {
    delimiter: u8,
}

impl IdTextOrdering {
    pub fn new(delimiter: u8) -> Self {
        IdTextOrdering { delimiter }
    }

    fn split<'a>(&self, line: &'a [u8]) -> (Option<&'a [u8]>, &'a [u8]) {
        match line.iter().position(|&b| b == self.delimiter) {
            Some(idx) => (Some(&line[..idx]), &line[idx + 1..]),
            None => (None, line),
        }
    }
}

impl Default for IdTextOrdering {
    fn default() -> Self {
        IdTextOrdering { delimiter: b'.' }
    }
}

impl LineOrdering for IdTextOrdering {
    fn compare(&self, a: Option<&[u8]>, b: Option<&[u8]>) -> Ordering {
        let (a, b) = match (non_empty(a), non_empty(b)) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Greater,
            (Some(_), None) => return Ordering::Less,
            (Some(a), Some(b)) => (a, b),
        };

        let (id_a, text_a) = self.split(a);
        let (id_b, text_b) = self.split(b);

        let result = text_a.cmp(text_b);
        if result != Ordering::Equal {
            return result;
        }

        match (id_a.and_then(parse_id), id_b.and_then(parse_id)) {
            (Some(id_a), Some(id_b)) => id_a.cmp(&id_b),
            _ => result,
        }
    }
}

fn non_empty(line: Option<&[u8]>) -> Option<&[u8]> {
    line.filter(|line| !line.is_empty())
}

fn parse_id(prefix: &[u8]) -> Option<i64> {
    std::str::from_utf8(prefix).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod test {
    use std::cmp::Ordering;

    use rstest::*;

    use super::{IdTextOrdering, LineOrdering};

    #[rstest]
    #[case(Some("1. Apple"), Some("2. Banana is yellow"), Ordering::Less)]
    #[case(Some("2. Banana is yellow"), Some("1. Apple"), Ordering::Greater)]
    #[case(Some("1. Apple"), Some("1. Apple"), Ordering::Equal)]
    #[case(Some("1. Apple"), Some("2. Apple"), Ordering::Less)]
    #[case(Some("2. Apple"), Some("1. Apple"), Ordering::Greater)]
    #[case(Some("1. Apple"), Some("415. Apple"), Ordering::Less)]
    #[case(Some("-3. Apple"), Some("2. Apple"), Ordering::Less)]
    #[case(Some("1. Apple"), Some(""), Ordering::Less)]
    #[case(Some(""), Some("1. Apple"), Ordering::Greater)]
    #[case(Some(""), Some(""), Ordering::Equal)]
    #[case(Some("1. Apple"), None, Ordering::Less)]
    #[case(None, Some("1. Apple"), Ordering::Greater)]
    #[case(None, Some(""), Ordering::Equal)]
    #[case(None, None, Ordering::Equal)]
    #[case(Some("x. Apple"), Some("1. Apple"), Ordering::Equal)]
    #[case(Some("x. Apple"), Some("1. Banana"), Ordering::Less)]
    #[case(Some("Apple"), Some("1.Apple"), Ordering::Equal)]
    #[case(Some("5.B"), Some("4.a"), Ordering::Less)]
    fn test_id_text_ordering(#[case] a: Option<&str>, #[case] b: Option<&str>, #[case] expected: Ordering) {
        let ordering = IdTextOrdering::default();

        let actual = ordering.compare(a.map(str::as_bytes), b.map(str::as_bytes));
        assert_eq!(actual, expected);

        let reversed = ordering.compare(b.map(str::as_bytes), a.map(str::as_bytes));
        assert_eq!(reversed, expected.reverse());
    }

    #[test]
    fn test_custom_delimiter() {
        let ordering = IdTextOrdering::new(b';');

        assert_eq!(ordering.compare_lines(b"2;a.b", b"1;a.b"), Ordering::Greater);
        assert_eq!(ordering.compare_lines(b"9;a", b"1;b"), Ordering::Less);
    }

    #[test]
    fn test_closure_ordering() {
        let reversed = |a: &[u8], b: &[u8]| a.cmp(b).reverse();

        assert_eq!(reversed.compare_lines(b"a", b"b"), Ordering::Greater);
        assert_eq!(reversed.compare(Some(b"a"), None), Ordering::Less);
        assert_eq!(reversed.compare(Some(b""), None), Ordering::Equal);
    }
}
