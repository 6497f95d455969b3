#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A `Span` records which bytes of the user's source text a token (or a parse tree node built
/// from tokens) came from. Spans are an optional payload on input edges: the parser itself only
/// ever deals in vertices.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Span {
    start: usize,
    end: usize,
}

impl Span {
    /// Create a new span starting at byte `start` and ending at byte `end`.
    ///
    /// # Panics
    ///
    /// If `end` is less than `start`.
    pub fn new(start: usize, end: usize) -> Self {
        if end < start {
            panic!("Span starts ({}) after it ends ({})!", start, end);
        }
        Span { start, end }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the smallest span which covers both `self` and `other`.
    pub fn cover(&self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

#[cfg(test)]
mod test {
    use super::Span;

    #[test]
    fn test_cover() {
        let s = Span::new(3, 5).cover(Span::new(8, 9));
        assert_eq!((s.start(), s.end(), s.len()), (3, 9, 6));
        assert!(Span::new(4, 4).is_empty());
    }

    #[test]
    #[should_panic]
    fn test_backwards() {
        Span::new(2, 1);
    }
}
