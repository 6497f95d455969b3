use std::hash::Hash;

use fnv::FnvHashMap;
use indexmap::{IndexMap, IndexSet};
use rsmgrammar::{NIdx, StIdx};

use crate::{input::Vertex, sppf::SppfIdx};

/// The index of a node in a [Gss].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct GssIdx(u32);

impl From<usize> for GssIdx {
    fn from(v: usize) -> Self {
        if v > u32::MAX as usize {
            panic!("Overflow");
        }
        GssIdx(v as u32)
    }
}

impl From<GssIdx> for usize {
    fn from(g: GssIdx) -> Self {
        g.0 as usize
    }
}

/// A GSS node records a call of a nonterminal at an input vertex. Its outgoing edges lead back
/// to the callers, labelled with the state to resume in and the SPPF node built before the call.
#[derive(Debug)]
pub(crate) struct GssNode<StorageT, V> {
    nidx: NIdx<StorageT>,
    pos: V,
    /// The lowest recovery weight of any path which has been found to reach this call.
    min_left: u32,
    edges: IndexMap<(StIdx<StorageT>, Option<SppfIdx>), IndexSet<GssIdx>>,
    /// The symbol nodes which have been returned from this call so far.
    popped: IndexSet<SppfIdx>,
}

impl<StorageT: Copy, V: Copy> GssNode<StorageT, V> {
    pub(crate) fn nidx(&self) -> NIdx<StorageT> {
        self.nidx
    }

    pub(crate) fn pos(&self) -> V {
        self.pos
    }

    pub(crate) fn min_left(&self) -> u32 {
        self.min_left
    }

    pub(crate) fn popped(&self) -> &IndexSet<SppfIdx> {
        &self.popped
    }
}

/// A graph-structured stack. Nodes are unique per `(nonterminal, input vertex)` pair.
#[derive(Debug)]
pub(crate) struct Gss<StorageT, V> {
    nodes: Vec<GssNode<StorageT, V>>,
    index: FnvHashMap<(NIdx<StorageT>, V), GssIdx>,
}

impl<StorageT: Copy + Eq + Hash, V: Vertex> Gss<StorageT, V> {
    pub(crate) fn new() -> Self {
        Gss {
            nodes: Vec::new(),
            index: FnvHashMap::default(),
        }
    }

    /// Return the node for a call of `nidx` at `pos`, creating it if necessary. `weight` is the
    /// recovery weight of the path making the call: an existing node's `min_left` is lowered to
    /// it. The second element of the tuple is `true` if the node was created.
    pub(crate) fn get_or_create(
        &mut self,
        nidx: NIdx<StorageT>,
        pos: V,
        weight: u32,
    ) -> (GssIdx, bool) {
        if let Some(&gidx) = self.index.get(&(nidx, pos)) {
            let n = &mut self.nodes[usize::from(gidx)];
            n.min_left = n.min_left.min(weight);
            return (gidx, false);
        }
        let gidx = GssIdx::from(self.nodes.len());
        self.nodes.push(GssNode {
            nidx,
            pos,
            min_left: weight,
            edges: IndexMap::new(),
            popped: IndexSet::new(),
        });
        if self.index.insert((nidx, pos), gidx).is_some() {
            panic!("Duplicate GSS node for {:?}", pos);
        }
        (gidx, true)
    }

    /// Add an edge from `callee` back to `caller`, to be resumed in state `ret` with the SPPF
    /// prefix `prefix`. Returns `true` if the edge is new.
    pub(crate) fn add_pop_edge(
        &mut self,
        callee: GssIdx,
        ret: StIdx<StorageT>,
        prefix: Option<SppfIdx>,
        caller: GssIdx,
    ) -> bool {
        self.nodes[usize::from(callee)]
            .edges
            .entry((ret, prefix))
            .or_default()
            .insert(caller)
    }

    /// Record that `callee` has returned `result`. Returns `false` if that result had already
    /// been recorded, in which case its callers have already been resumed with it.
    pub(crate) fn pop(&mut self, callee: GssIdx, result: SppfIdx) -> bool {
        self.nodes[usize::from(callee)].popped.insert(result)
    }

    /// Return a snapshot of `callee`'s edges as `(return state, prefix, caller)` triples.
    pub(crate) fn edges(&self, callee: GssIdx) -> Vec<(StIdx<StorageT>, Option<SppfIdx>, GssIdx)> {
        self.nodes[usize::from(callee)]
            .edges
            .iter()
            .flat_map(|(&(ret, prefix), callers)| callers.iter().map(move |&c| (ret, prefix, c)))
            .collect()
    }

    pub(crate) fn node(&self, gidx: GssIdx) -> &GssNode<StorageT, V> {
        &self.nodes[usize::from(gidx)]
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_get_or_create() {
        let mut gss = Gss::<u16, usize>::new();
        let (g0, c0) = gss.get_or_create(NIdx(0), 0, 3);
        let (g1, c1) = gss.get_or_create(NIdx(1), 0, 0);
        let (g2, c2) = gss.get_or_create(NIdx(0), 0, 1);
        assert!(c0 && c1 && !c2);
        assert_eq!(g0, g2);
        assert_ne!(g0, g1);
        assert_eq!(gss.len(), 2);
        assert_eq!(gss.node(g0).min_left(), 1);
        gss.get_or_create(NIdx(0), 0, 2);
        assert_eq!(gss.node(g0).min_left(), 1);
        assert_eq!(gss.node(g1).pos(), 0);
        assert_eq!(gss.node(g1).nidx(), NIdx(1));
    }

    #[test]
    fn test_edges_and_pops() {
        let mut gss = Gss::<u16, usize>::new();
        let (caller, _) = gss.get_or_create(NIdx(0), 0, 0);
        let (callee, _) = gss.get_or_create(NIdx(1), 2, 0);
        assert!(gss.add_pop_edge(callee, StIdx(4), Some(SppfIdx::from(7)), caller));
        assert!(!gss.add_pop_edge(callee, StIdx(4), Some(SppfIdx::from(7)), caller));
        assert!(gss.add_pop_edge(callee, StIdx(4), None, caller));
        assert_eq!(
            gss.edges(callee),
            vec![
                (StIdx(4), Some(SppfIdx::from(7)), caller),
                (StIdx(4), None, caller)
            ]
        );
        assert!(gss.edges(caller).is_empty());
        assert!(gss.pop(callee, SppfIdx::from(9)));
        assert!(!gss.pop(callee, SppfIdx::from(9)));
        assert_eq!(gss.node(callee).popped().len(), 1);
    }
}
