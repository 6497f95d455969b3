use std::hash::Hash;

use fnv::FnvHashSet;
use indexmap::IndexSet;
use rsmgrammar::StIdx;

use crate::{gss::GssIdx, input::Vertex, sppf::SppfIdx};

/// A unit of parser work: continue in state `stidx` at input vertex `pos`, returning to `gss`
/// once the current nonterminal is complete. `sppf` is the derivation built so far in the
/// current nonterminal, or `None` if nothing has been derived yet.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) struct Descriptor<StorageT, V> {
    pub(crate) stidx: StIdx<StorageT>,
    pub(crate) gss: GssIdx,
    pub(crate) pos: V,
    pub(crate) sppf: Option<SppfIdx>,
}

/// The parser's worklist. Descriptors are kept in one bucket per recovery weight and are popped
/// from the lowest weight bucket first (most recently pushed first within a bucket). Once a
/// bucket has been left behind it is never revisited: pushing a descriptor with a lower weight
/// than the current bucket adds it to the current bucket.
///
/// A descriptor's SPPF node is determined by its `(state, GSS node, position)` triple, so that
/// triple alone identifies work which has already been done.
pub(crate) struct Descriptors<StorageT, V> {
    buckets: Vec<IndexSet<Descriptor<StorageT, V>>>,
    cur: usize,
    seen: FnvHashSet<(StIdx<StorageT>, GssIdx, V)>,
}

impl<StorageT: Copy + Eq + Hash, V: Vertex> Descriptors<StorageT, V> {
    pub(crate) fn new() -> Self {
        Descriptors {
            buckets: vec![IndexSet::new()],
            cur: 0,
            seen: FnvHashSet::default(),
        }
    }

    /// Queue `d` with recovery weight `weight`. Returns `false` if an equivalent descriptor has
    /// already been processed or is already queued in the same bucket.
    pub(crate) fn push(&mut self, d: Descriptor<StorageT, V>, weight: u32) -> bool {
        if self.is_seen(&d) {
            return false;
        }
        let b = (weight as usize).max(self.cur);
        if b >= self.buckets.len() {
            self.buckets.resize_with(b + 1, IndexSet::new);
        }
        self.buckets[b].insert(d)
    }

    /// Pop the next descriptor from the current bucket which has not yet been processed.
    pub(crate) fn pop(&mut self) -> Option<Descriptor<StorageT, V>> {
        while let Some(d) = self.buckets[self.cur].pop() {
            if !self.is_seen(&d) {
                return Some(d);
            }
        }
        None
    }

    /// Move on to the next non-empty bucket, returning `false` if there is none.
    pub(crate) fn advance(&mut self) -> bool {
        while self.cur + 1 < self.buckets.len() {
            self.cur += 1;
            if !self.buckets[self.cur].is_empty() {
                return true;
            }
        }
        false
    }

    /// The weight of the bucket currently being processed.
    pub(crate) fn current(&self) -> usize {
        self.cur
    }

    /// Record that `d` has been processed. Returns `false` if it already had been.
    pub(crate) fn mark_seen(&mut self, d: &Descriptor<StorageT, V>) -> bool {
        self.seen.insert((d.stidx, d.gss, d.pos))
    }

    pub(crate) fn is_seen(&self, d: &Descriptor<StorageT, V>) -> bool {
        self.seen.contains(&(d.stidx, d.gss, d.pos))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn desc(stidx: u16, pos: usize) -> Descriptor<u16, usize> {
        Descriptor {
            stidx: StIdx(stidx),
            gss: GssIdx::from(0),
            pos,
            sppf: None,
        }
    }

    #[test]
    fn test_buckets() {
        let mut ds = Descriptors::new();
        assert!(ds.push(desc(0, 0), 0));
        assert!(ds.push(desc(1, 0), 2));
        assert!(ds.push(desc(2, 0), 0));
        assert!(!ds.push(desc(2, 0), 0));
        assert_eq!(ds.pop(), Some(desc(2, 0)));
        assert_eq!(ds.pop(), Some(desc(0, 0)));
        assert_eq!(ds.pop(), None);
        assert!(ds.advance());
        assert_eq!(ds.current(), 2);
        // Cheaper work found late is done in the current bucket.
        assert!(ds.push(desc(3, 0), 1));
        assert_eq!(ds.pop(), Some(desc(3, 0)));
        assert_eq!(ds.pop(), Some(desc(1, 0)));
        assert!(!ds.advance());
    }

    #[test]
    fn test_seen() {
        let mut ds = Descriptors::new();
        let d = desc(0, 1);
        assert!(ds.push(d, 1));
        assert!(ds.mark_seen(&d));
        assert!(!ds.mark_seen(&d));
        assert!(!ds.push(d, 0));
        let mut d2 = d;
        d2.sppf = Some(SppfIdx::from(3));
        assert!(ds.is_seen(&d2));
        assert_eq!(ds.pop(), None);
        assert!(ds.advance());
        assert_eq!(ds.pop(), None);
    }
}
