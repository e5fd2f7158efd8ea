//! Structural spans of a document: the word ranges covered by its title,
//! headings, navigation and so on.

use serde::{Deserialize, Serialize};

/// Structural zones recorded in the forward index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Zone {
    Title,
    Heading,
    Nav,
    PageHeader,
    PageFooter,
    Code,
    Pre,
}

impl Zone {
    pub const ALL: [Zone; 7] = [
        Zone::Title,
        Zone::Heading,
        Zone::Nav,
        Zone::PageHeader,
        Zone::PageFooter,
        Zone::Code,
        Zone::Pre,
    ];

    /// The one-byte code used in journals and spans files.
    pub fn code(self) -> u8 {
        match self {
            Zone::Title => b't',
            Zone::Heading => b'h',
            Zone::Nav => b'n',
            Zone::PageHeader => b'p',
            Zone::PageFooter => b'f',
            Zone::Code => b'c',
            Zone::Pre => b'r',
        }
    }

    pub fn from_code(code: u8) -> Option<Zone> {
        Zone::ALL.into_iter().find(|z| z.code() == code)
    }
}

/// The spans of one zone in one document, as interlaced start/end word
/// offsets. Each span covers `[start, end)`; starts are non-decreasing.
///
/// Every check walks the sequence once, front to back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentSpan {
    starts_ends: Vec<u32>,
}

impl DocumentSpan {
    pub fn new(starts_ends: Vec<u32>) -> Self {
        DocumentSpan { starts_ends }
    }

    pub fn starts_ends(&self) -> &[u32] {
        &self.starts_ends
    }

    fn pairs(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.starts_ends.chunks_exact(2).map(|p| (p[0], p[1]))
    }

    /// Number of spans.
    pub fn size(&self) -> usize {
        self.starts_ends.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Total number of positions covered.
    pub fn length(&self) -> u32 {
        self.pairs().map(|(start, end)| end.saturating_sub(start)).sum()
    }

    pub fn contains_position(&self, position: u32) -> bool {
        for (start, end) in self.pairs() {
            if start > position {
                return false;
            }
            if end > position {
                return true;
            }
        }
        false
    }

    /// Whether `[position, position + len)` lies inside a single span.
    pub fn contains_range(&self, position: u32, len: u32) -> bool {
        let stop = position.saturating_add(len);
        for (start, end) in self.pairs() {
            if start > position {
                return false;
            }
            if stop <= end {
                return true;
            }
        }
        false
    }

    /// Whether `[position, position + len)` shares a position with any span.
    pub fn overlaps_range(&self, position: u32, len: u32) -> bool {
        let stop = position.saturating_add(len);
        for (start, end) in self.pairs() {
            if start >= stop {
                return false;
            }
            if end > position && start < end {
                return true;
            }
        }
        false
    }

    /// Whether any of the ascending `positions` starts a range of `len`
    /// inside a single span.
    pub fn contains_any_range(&self, positions: &[u32], len: u32) -> bool {
        self.walk_ranges(positions, len, true) > 0
    }

    /// Number of ascending `positions` starting a range of `len` inside a
    /// span.
    pub fn count_range_matches(&self, positions: &[u32], len: u32) -> usize {
        self.walk_ranges(positions, len, false)
    }

    fn walk_ranges(&self, positions: &[u32], len: u32, first_only: bool) -> usize {
        let mut spans = self.pairs();
        let Some((mut start, mut end)) = spans.next() else {
            return 0;
        };

        let mut count = 0;
        let mut pi = 0;
        while pi < positions.len() {
            let position = positions[pi];
            if position >= start && position.saturating_add(len) <= end {
                count += 1;
                if first_only {
                    return count;
                }
                pi += 1;
            } else if position < end {
                pi += 1;
            } else if let Some(next) = spans.next() {
                (start, end) = next;
            } else {
                break;
            }
        }
        count
    }

    /// Number of spans exactly equal to `[p, p + len)` for some `p` in
    /// the ascending `positions`.
    pub fn count_range_matches_exact(&self, positions: &[u32], len: u32) -> usize {
        let mut count = 0;
        let mut pi = 0;
        for (start, end) in self.pairs() {
            while pi < positions.len() && positions[pi] < start {
                pi += 1;
            }
            if pi == positions.len() {
                break;
            }
            if positions[pi] == start && start.saturating_add(len) == end {
                count += 1;
            }
        }
        count
    }

    /// Number of ascending `positions` that fall inside some span.
    pub fn count_intersections(&self, positions: &[u32]) -> usize {
        let mut spans = self.pairs().peekable();
        let mut count = 0;
        for &position in positions {
            while let Some(&(_, end)) = spans.peek() {
                if end <= position {
                    spans.next();
                } else {
                    break;
                }
            }
            match spans.peek() {
                Some(&(start, _)) if start <= position => count += 1,
                Some(_) => {}
                None => break,
            }
        }
        count
    }

    /// Every position covered by a span, in order.
    pub fn positions(&self) -> impl Iterator<Item = u32> + '_ {
        self.pairs().flat_map(|(start, end)| start..end)
    }
}

/// All zone spans of one document. Zones without spans are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentSpans {
    pub title: DocumentSpan,
    pub heading: DocumentSpan,
    pub nav: DocumentSpan,
    pub page_header: DocumentSpan,
    pub page_footer: DocumentSpan,
    pub code: DocumentSpan,
    pub pre: DocumentSpan,
}

impl DocumentSpans {
    pub fn get(&self, zone: Zone) -> &DocumentSpan {
        match zone {
            Zone::Title => &self.title,
            Zone::Heading => &self.heading,
            Zone::Nav => &self.nav,
            Zone::PageHeader => &self.page_header,
            Zone::PageFooter => &self.page_footer,
            Zone::Code => &self.code,
            Zone::Pre => &self.pre,
        }
    }

    /// Set the spans of the zone with `code`. Unknown codes are ignored.
    pub fn accept(&mut self, code: u8, starts_ends: Vec<u32>) {
        let span = DocumentSpan::new(starts_ends);
        match Zone::from_code(code) {
            Some(Zone::Title) => self.title = span,
            Some(Zone::Heading) => self.heading = span,
            Some(Zone::Nav) => self.nav = span,
            Some(Zone::PageHeader) => self.page_header = span,
            Some(Zone::PageFooter) => self.page_footer = span,
            Some(Zone::Code) => self.code = span,
            Some(Zone::Pre) => self.pre = span,
            None => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        Zone::ALL.iter().all(|&z| self.get(z).is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_containment() {
        let mut spans = DocumentSpans::default();
        spans.accept(Zone::Title.code(), vec![10, 20]);
        let title = spans.get(Zone::Title);

        assert!(title.contains_position(15));
        assert!(!title.contains_position(25));
        assert!(title.contains_range(12, 5));
        assert!(!title.contains_range(18, 5));
    }

    #[test]
    fn test_position_boundaries() {
        let span = DocumentSpan::new(vec![10, 20, 30, 35]);
        assert!(span.contains_position(10));
        assert!(!span.contains_position(20));
        assert!(span.contains_position(34));
        assert!(!span.contains_position(9));
        assert!(!span.contains_position(35));
        assert!(span.contains_range(30, 5));
        assert!(!span.contains_range(19, 12));
        assert!(span.overlaps_range(18, 5));
        assert!(span.overlaps_range(5, 6));
        assert!(!span.overlaps_range(20, 10));
    }

    #[test]
    fn test_range_counting() {
        let span = DocumentSpan::new(vec![1, 4, 10, 13, 20, 30]);
        assert!(span.contains_any_range(&[0, 11], 2));
        assert!(!span.contains_any_range(&[3, 12], 2));
        assert_eq!(span.count_range_matches(&[1, 2, 10, 21, 29], 2), 4);
        assert_eq!(span.count_range_matches_exact(&[1, 10, 20], 3), 2);
        assert_eq!(span.count_intersections(&[0, 1, 3, 4, 12, 25, 40]), 4);
    }

    #[test]
    fn test_size_length_positions() {
        let span = DocumentSpan::new(vec![2, 4, 7, 8]);
        assert_eq!(span.size(), 2);
        assert_eq!(span.length(), 3);
        assert_eq!(span.positions().collect::<Vec<_>>(), vec![2, 3, 7]);

        let empty = DocumentSpan::default();
        assert!(empty.is_empty());
        assert!(!empty.contains_position(0));
        assert_eq!(empty.count_intersections(&[1, 2]), 0);
    }

    #[test]
    fn test_unknown_zone_ignored() {
        let mut spans = DocumentSpans::default();
        spans.accept(b'z', vec![1, 2]);
        assert!(spans.is_empty());
        assert_eq!(Zone::from_code(b'c'), Some(Zone::Code));
    }
}
