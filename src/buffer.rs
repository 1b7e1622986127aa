//! In-memory chunk buffer.

use std::ops::Range;

use crate::ordering::LineOrdering;

/// Lines of one chunk held in memory.
///
/// The buffer owns the raw chunk bytes and keeps one byte range per line, so sorting only moves ranges around.
/// Line storage is sized for the expected number of lines up front and grows if the chunk holds more.
pub struct LineBuffer {
    data: Vec<u8>,
    lines: Vec<Range<usize>>,
}

impl LineBuffer {
    /// Splits `data` into lines terminated by `separator`. The separator is not part of a line.
    /// A trailing line without a separator is kept.
    pub fn new(data: Vec<u8>, separator: u8, expected_lines: usize) -> Self {
        let mut lines = Vec::with_capacity(expected_lines + 1);

        let mut start = 0;
        for (idx, &byte) in data.iter().enumerate() {
            if byte == separator {
                lines.push(start..idx);
                start = idx + 1;
            }
        }
        if start < data.len() {
            lines.push(start..data.len());
        }

        return LineBuffer { data, lines };
    }

    /// Returns the number of lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sorts lines using the ordering. The sort is stable.
    pub fn sort_by<O: LineOrdering + ?Sized>(&mut self, ordering: &O) {
        let data = &self.data;
        self.lines
            .sort_by(|a, b| ordering.compare_lines(&data[a.clone()], &data[b.clone()]));
    }

    /// Iterates over lines in their current order.
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.lines.iter().map(move |range| &self.data[range.clone()])
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::LineBuffer;
    use crate::ordering::IdTextOrdering;

    fn lines(buffer: &LineBuffer) -> Vec<&str> {
        buffer.iter().map(|line| std::str::from_utf8(line).unwrap()).collect()
    }

    #[rstest]
    #[case("", vec![])]
    #[case("\n", vec![""])]
    #[case("1. a\n2. b\n", vec!["1. a", "2. b"])]
    #[case("1. a\n2. b", vec!["1. a", "2. b"])]
    #[case("1. a\n\n2. b\n", vec!["1. a", "", "2. b"])]
    fn test_line_split(#[case] data: &str, #[case] expected: Vec<&str>) {
        let buffer = LineBuffer::new(data.as_bytes().to_vec(), b'\n', 0);

        assert_eq!(buffer.len(), expected.len());
        assert_eq!(lines(&buffer), expected);
    }

    #[test]
    fn test_buffer_grows_past_expected_lines() {
        let data = b"3. c\n2. b\n1. a\n".to_vec();
        let mut buffer = LineBuffer::new(data, b'\n', 1);
        assert_eq!(buffer.len(), 3);

        buffer.sort_by(&IdTextOrdering::default());

        assert_eq!(lines(&buffer), vec!["1. a", "2. b", "3. c"]);
    }

    #[test]
    fn test_sort_is_stable() {
        let data = b"x. same\n1. a\ny. same\n".to_vec();
        let mut buffer = LineBuffer::new(data, b'\n', 3);

        buffer.sort_by(&IdTextOrdering::default());

        assert_eq!(lines(&buffer), vec!["1. a", "x. same", "y. same"]);
    }
}
