use std::{fmt::Write as _, hash::Hash};

use fnv::FnvHashMap;
use num_traits::{AsPrimitive, PrimInt, Unsigned};
use rsmgrammar::{NIdx, Rsm, StIdx, TIdx};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use vob::Vob;

use crate::{Span, input::Vertex, parser::Node};

/// The index of a node in an [Sppf].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SppfIdx(u32);

impl From<usize> for SppfIdx {
    fn from(v: usize) -> Self {
        if v > u32::MAX as usize {
            panic!("Overflow");
        }
        SppfIdx(v as u32)
    }
}

impl From<SppfIdx> for usize {
    fn from(s: SppfIdx) -> Self {
        s.0 as usize
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SppfNodeKind<StorageT, V> {
    /// A terminal matched against an input edge. `None` records the crossing of an epsilon edge
    /// in the input.
    Terminal(Option<TIdx<StorageT>>),
    /// The empty derivation of a nullable nonterminal.
    Epsilon,
    /// A terminal inserted by error recovery. Inserted terminals have zero width.
    Inserted(TIdx<StorageT>),
    /// An input terminal skipped by error recovery.
    Skipped(TIdx<StorageT>),
    /// A partial derivation of the nonterminal owning the given state, up to that state.
    Intermediate(StIdx<StorageT>),
    /// A complete derivation of a nonterminal.
    Symbol(NIdx<StorageT>),
    /// One way of deriving its parent: `left` (if present) followed by `right`, where `right`
    /// starts at `pivot`. `stidx` is the state reached after `right`.
    Packed {
        stidx: StIdx<StorageT>,
        pivot: V,
        left: Option<SppfIdx>,
        right: SppfIdx,
    },
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SppfNode<StorageT, V> {
    kind: SppfNodeKind<StorageT, V>,
    lext: V,
    rext: V,
    weight: u32,
    span: Option<Span>,
    /// For symbol and intermediate nodes, their packed children sorted by `(pivot, stidx, left,
    /// right)`.
    packed: Vec<SppfIdx>,
    /// For packed nodes, the node they belong to. For everything else, the packed nodes which
    /// have this node as a child.
    parents: Vec<SppfIdx>,
}

impl<StorageT: Copy, V: Copy> SppfNode<StorageT, V> {
    pub fn kind(&self) -> SppfNodeKind<StorageT, V> {
        self.kind
    }

    /// The input vertex this node's derivation starts at.
    pub fn lext(&self) -> V {
        self.lext
    }

    /// The input vertex this node's derivation ends at.
    pub fn rext(&self) -> V {
        self.rext
    }

    /// The minimal recovery weight of any derivation rooted at this node.
    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// For terminal and skipped nodes, the span of the input edge they were created from.
    pub fn span(&self) -> Option<Span> {
        self.span
    }

    pub fn packed(&self) -> &[SppfIdx] {
        &self.packed
    }

    pub fn parents(&self) -> &[SppfIdx] {
        &self.parents
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
enum SppfKey<StorageT, V> {
    Terminal(Option<TIdx<StorageT>>, V, V),
    Epsilon(V),
    Inserted(TIdx<StorageT>, V),
    Skipped(TIdx<StorageT>, V, V),
    Intermediate(StIdx<StorageT>, V, V),
    Symbol(NIdx<StorageT>, V, V),
    Packed(SppfIdx, StIdx<StorageT>, Option<SppfIdx>, SppfIdx),
}

/// A shared packed parse forest. Every node is interned: asking for a node which already exists
/// returns the existing node's index. Nodes are never removed, so an `SppfIdx` remains valid for
/// the lifetime of the forest.
#[derive(Clone, Debug)]
pub struct Sppf<StorageT, V> {
    nodes: Vec<SppfNode<StorageT, V>>,
    index: FnvHashMap<SppfKey<StorageT, V>, SppfIdx>,
}

#[derive(Clone, Copy)]
enum Step<StorageT> {
    /// Emit a node into the current sequence, nesting symbol nodes.
    Item(SppfIdx),
    /// Emit the contents of a node into the current sequence.
    Prefix(SppfIdx),
    Leave(SppfIdx),
    Close(SppfIdx, NIdx<StorageT>, usize),
}

impl<StorageT: 'static + Hash + PrimInt + Unsigned, V: Vertex> Sppf<StorageT, V>
where
    usize: AsPrimitive<StorageT>,
{
    pub(crate) fn new() -> Self {
        Sppf {
            nodes: Vec::new(),
            index: FnvHashMap::default(),
        }
    }

    pub fn node(&self, idx: SppfIdx) -> &SppfNode<StorageT, V> {
        &self.nodes[usize::from(idx)]
    }

    pub fn weight(&self, idx: SppfIdx) -> u32 {
        self.nodes[usize::from(idx)].weight
    }

    /// How many nodes (including packed nodes) does this forest contain?
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over the indices of every node in this forest, in creation order.
    pub fn iter_idxs(&self) -> impl Iterator<Item = SppfIdx> {
        (0..self.nodes.len()).map(SppfIdx::from)
    }

    fn intern(
        &mut self,
        key: SppfKey<StorageT, V>,
        kind: SppfNodeKind<StorageT, V>,
        lext: V,
        rext: V,
        weight: u32,
        span: Option<Span>,
    ) -> SppfIdx {
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let idx = SppfIdx::from(self.nodes.len());
        self.nodes.push(SppfNode {
            kind,
            lext,
            rext,
            weight,
            span,
            packed: Vec::new(),
            parents: Vec::new(),
        });
        self.index.insert(key, idx);
        idx
    }

    /// Return the leaf for a terminal (or, if `tidx` is `None`, an input epsilon edge) between
    /// `left` and `right`.
    pub(crate) fn terminal_node(
        &mut self,
        tidx: Option<TIdx<StorageT>>,
        left: V,
        right: V,
        span: Option<Span>,
    ) -> SppfIdx {
        self.intern(
            SppfKey::Terminal(tidx, left, right),
            SppfNodeKind::Terminal(tidx),
            left,
            right,
            0,
            span,
        )
    }

    pub(crate) fn epsilon_node(&mut self, pos: V) -> SppfIdx {
        self.intern(SppfKey::Epsilon(pos), SppfNodeKind::Epsilon, pos, pos, 0, None)
    }

    pub(crate) fn inserted_node(&mut self, tidx: TIdx<StorageT>, at: V, cost: u32) -> SppfIdx {
        self.intern(
            SppfKey::Inserted(tidx, at),
            SppfNodeKind::Inserted(tidx),
            at,
            at,
            cost,
            None,
        )
    }

    pub(crate) fn skipped_node(
        &mut self,
        tidx: TIdx<StorageT>,
        from: V,
        to: V,
        cost: u32,
        span: Option<Span>,
    ) -> SppfIdx {
        self.intern(
            SppfKey::Skipped(tidx, from, to),
            SppfNodeKind::Skipped(tidx),
            from,
            to,
            cost,
            span,
        )
    }

    /// Return the symbol node for `nidx` spanning `lext..rext`, creating it (with no packed
    /// children yet) if necessary.
    fn symbol(&mut self, nidx: NIdx<StorageT>, lext: V, rext: V) -> SppfIdx {
        self.intern(
            SppfKey::Symbol(nidx, lext, rext),
            SppfNodeKind::Symbol(nidx),
            lext,
            rext,
            u32::MAX,
            None,
        )
    }

    /// Extend the prefix `left` (`None` if nothing has been derived yet) with `right`, arriving
    /// in state `stidx`. A final state with no outgoing edges can only complete its nonterminal,
    /// so the result is a symbol node; otherwise it is an intermediate node.
    pub(crate) fn get_node_p(
        &mut self,
        rsm: &Rsm<StorageT>,
        stidx: StIdx<StorageT>,
        left: Option<SppfIdx>,
        right: SppfIdx,
    ) -> SppfIdx {
        let lext = match left {
            Some(l) => self.node(l).lext,
            None => self.node(right).lext,
        };
        let rext = self.node(right).rext;
        let parent = if rsm.is_final(stidx) && !rsm.has_outgoing(stidx) {
            self.symbol(rsm.owner(stidx), lext, rext)
        } else {
            self.intern(
                SppfKey::Intermediate(stidx, lext, rext),
                SppfNodeKind::Intermediate(stidx),
                lext,
                rext,
                u32::MAX,
                None,
            )
        };
        // A node can't be a derivation of itself with nothing in front of it.
        if left.is_none() && parent == right {
            return parent;
        }
        self.add_packed(parent, stidx, left, right);
        parent
    }

    /// Complete the nonterminal owning `stidx` (which must be a final state) from `prefix`.
    pub(crate) fn symbol_node(
        &mut self,
        rsm: &Rsm<StorageT>,
        stidx: StIdx<StorageT>,
        prefix: SppfIdx,
    ) -> SppfIdx {
        let nidx = rsm.owner(stidx);
        if self.node(prefix).kind == SppfNodeKind::Symbol(nidx) {
            return prefix;
        }
        let (lext, rext) = (self.node(prefix).lext, self.node(prefix).rext);
        let sym = self.symbol(nidx, lext, rext);
        self.add_packed(sym, stidx, None, prefix);
        sym
    }

    /// Complete the nonterminal owning `stidx` (which must be a final state) with an empty
    /// derivation at `pos`.
    pub(crate) fn epsilon_symbol(
        &mut self,
        rsm: &Rsm<StorageT>,
        stidx: StIdx<StorageT>,
        pos: V,
    ) -> SppfIdx {
        let eps = self.epsilon_node(pos);
        let sym = self.symbol(rsm.owner(stidx), pos, pos);
        self.add_packed(sym, stidx, None, eps);
        sym
    }

    fn add_packed(
        &mut self,
        parent: SppfIdx,
        stidx: StIdx<StorageT>,
        left: Option<SppfIdx>,
        right: SppfIdx,
    ) {
        let key = SppfKey::Packed(parent, stidx, left, right);
        if self.index.contains_key(&key) {
            return;
        }
        let pivot = self.node(right).lext;
        let weight = left
            .map_or(0, |l| self.weight(l))
            .saturating_add(self.weight(right));
        let (lext, rext) = (self.node(parent).lext, self.node(parent).rext);
        let pidx = self.intern(
            key,
            SppfNodeKind::Packed {
                stidx,
                pivot,
                left,
                right,
            },
            lext,
            rext,
            weight,
            None,
        );
        self.nodes[usize::from(pidx)].parents.push(parent);
        if let Some(l) = left {
            self.nodes[usize::from(l)].parents.push(pidx);
        }
        self.nodes[usize::from(right)].parents.push(pidx);

        let order = (pivot, stidx, left, right);
        let nodes = &self.nodes;
        let i = match nodes[usize::from(parent)]
            .packed
            .binary_search_by(|x| packed_order(&nodes[usize::from(*x)]).cmp(&order))
        {
            Ok(i) | Err(i) => i,
        };
        self.nodes[usize::from(parent)].packed.insert(i, pidx);
        self.lower_weight(parent, weight);
    }

    /// Lower `idx`'s weight to `weight` (if that is an improvement) and propagate the change to
    /// every node which (transitively) derives `idx`.
    fn lower_weight(&mut self, idx: SppfIdx, weight: u32) {
        let mut todo = vec![(idx, weight)];
        while let Some((idx, weight)) = todo.pop() {
            if weight >= self.weight(idx) {
                continue;
            }
            self.nodes[usize::from(idx)].weight = weight;
            for i in 0..self.nodes[usize::from(idx)].parents.len() {
                let pidx = self.nodes[usize::from(idx)].parents[i];
                let (left, right) = match self.node(pidx).kind {
                    SppfNodeKind::Packed { left, right, .. } => (left, right),
                    _ => unreachable!(),
                };
                let pw = left
                    .map_or(0, |l| self.weight(l))
                    .saturating_add(self.weight(right));
                if pw < self.weight(pidx) {
                    self.nodes[usize::from(pidx)].weight = pw;
                    todo.push((self.nodes[usize::from(pidx)].parents[0], pw));
                }
            }
        }
    }

    /// Return the minimal-weight packed child of `idx` whose children are not on `path`, or
    /// `None` if every packed child leads back into `path`. Ties go to the first packed child.
    fn cheapest_packed(&self, idx: SppfIdx, path: &Vob) -> Option<SppfIdx> {
        let on_path = |x: SppfIdx| path.get(usize::from(x)) == Some(true);
        let mut best: Option<SppfIdx> = None;
        for &pidx in &self.node(idx).packed {
            let (left, right) = match self.node(pidx).kind {
                SppfNodeKind::Packed { left, right, .. } => (left, right),
                _ => unreachable!(),
            };
            if left.is_some_and(on_path) || on_path(right) {
                continue;
            }
            match best {
                Some(b) if self.weight(b) <= self.weight(pidx) => (),
                _ => best = Some(pidx),
            }
        }
        best
    }

    fn expand(&self, idx: SppfIdx, path: &Vob, todo: &mut Vec<Step<StorageT>>) {
        if let Some(pidx) = self.cheapest_packed(idx, path) {
            if let SppfNodeKind::Packed { left, right, .. } = self.node(pidx).kind {
                todo.push(Step::Item(right));
                if let Some(l) = left {
                    todo.push(Step::Prefix(l));
                }
            }
        }
    }

    /// Extract a single minimal-weight parse tree rooted at the symbol node `root`. Intermediate
    /// nodes are flattened into the sequence of their parent; cyclic derivations are never
    /// followed.
    pub(crate) fn tree(&self, root: SppfIdx) -> Node<StorageT, V> {
        let mut path = Vob::from_elem(false, self.nodes.len());
        let mut out = Vec::new();
        let mut todo = vec![Step::Item(root)];
        while let Some(step) = todo.pop() {
            match step {
                Step::Item(idx) | Step::Prefix(idx) => {
                    let n = self.node(idx);
                    match n.kind {
                        SppfNodeKind::Terminal(Some(tidx)) => out.push(Node::Term {
                            tidx,
                            from: n.lext,
                            to: n.rext,
                            span: n.span,
                        }),
                        SppfNodeKind::Terminal(None) | SppfNodeKind::Epsilon => (),
                        SppfNodeKind::Inserted(tidx) => {
                            out.push(Node::Inserted { tidx, at: n.lext })
                        }
                        SppfNodeKind::Skipped(tidx) => out.push(Node::Skipped {
                            tidx,
                            from: n.lext,
                            to: n.rext,
                            span: n.span,
                        }),
                        SppfNodeKind::Symbol(nidx) if matches!(step, Step::Item(_)) => {
                            path.set(usize::from(idx), true);
                            todo.push(Step::Close(idx, nidx, out.len()));
                            self.expand(idx, &path, &mut todo);
                        }
                        SppfNodeKind::Symbol(_) | SppfNodeKind::Intermediate(_) => {
                            path.set(usize::from(idx), true);
                            todo.push(Step::Leave(idx));
                            self.expand(idx, &path, &mut todo);
                        }
                        SppfNodeKind::Packed { .. } => unreachable!(),
                    }
                }
                Step::Leave(idx) => {
                    path.set(usize::from(idx), false);
                }
                Step::Close(idx, nidx, start) => {
                    path.set(usize::from(idx), false);
                    let nodes = out.split_off(start);
                    out.push(Node::Nonterm { nidx, nodes });
                }
            }
        }
        debug_assert_eq!(out.len(), 1);
        out.pop().unwrap()
    }

    fn label(&self, rsm: &Rsm<StorageT>, idx: SppfIdx) -> String {
        match self.node(idx).kind {
            SppfNodeKind::Terminal(Some(tidx)) => format!("'{}'", rsm.term_name(tidx)),
            SppfNodeKind::Terminal(None) => "<eps-edge>".to_owned(),
            SppfNodeKind::Epsilon => "<eps>".to_owned(),
            SppfNodeKind::Inserted(tidx) => format!("+'{}'", rsm.term_name(tidx)),
            SppfNodeKind::Skipped(tidx) => format!("-'{}'", rsm.term_name(tidx)),
            SppfNodeKind::Intermediate(stidx) => format!("@{}", usize::from(stidx)),
            SppfNodeKind::Symbol(nidx) => rsm.nonterm_name(nidx).to_owned(),
            SppfNodeKind::Packed { stidx, pivot, .. } => {
                format!("@{} pivot {:?}", usize::from(stidx), pivot)
            }
        }
    }

    /// Return a pretty-printed version of the forest, one node per line. Packed nodes list their
    /// children, other inner nodes list their packed nodes.
    pub fn pp(&self, rsm: &Rsm<StorageT>) -> String {
        let w = self.nodes.len().to_string().len();
        let mut s = String::new();
        for idx in self.iter_idxs() {
            let n = self.node(idx);
            write!(
                s,
                "{:>w$} {} [{:?}..{:?}] w={}",
                usize::from(idx),
                self.label(rsm, idx),
                n.lext,
                n.rext,
                n.weight,
                w = w
            )
            .ok();
            let children: Vec<SppfIdx> = match n.kind {
                SppfNodeKind::Packed { left, right, .. } => {
                    left.into_iter().chain(Some(right)).collect()
                }
                _ => n.packed.clone(),
            };
            if !children.is_empty() {
                s.push_str(" ->");
                for c in children {
                    write!(s, " {}", usize::from(c)).ok();
                }
            }
            s.push('\n');
        }
        s
    }

    /// Return the forest in Graphviz's dot format.
    pub fn to_dot(&self, rsm: &Rsm<StorageT>) -> String {
        let mut s = String::from("digraph sppf {\n");
        for idx in self.iter_idxs() {
            let n = self.node(idx);
            let i = usize::from(idx);
            match n.kind {
                SppfNodeKind::Packed { left, right, .. } => {
                    writeln!(s, "  {} [shape=point]", i).ok();
                    for c in left.into_iter().chain(Some(right)) {
                        writeln!(s, "  {} -> {}", i, usize::from(c)).ok();
                    }
                }
                SppfNodeKind::Symbol(_) | SppfNodeKind::Intermediate(_) => {
                    writeln!(
                        s,
                        "  {} [label=\"{} [{:?}..{:?}] w={}\", shape=oval]",
                        i,
                        self.label(rsm, idx).replace('"', "\\\""),
                        n.lext,
                        n.rext,
                        n.weight
                    )
                    .ok();
                    for c in &n.packed {
                        writeln!(s, "  {} -> {}", i, usize::from(*c)).ok();
                    }
                }
                _ => {
                    writeln!(
                        s,
                        "  {} [label=\"{} [{:?}..{:?}]\", shape=box]",
                        i,
                        self.label(rsm, idx).replace('"', "\\\""),
                        n.lext,
                        n.rext
                    )
                    .ok();
                }
            }
        }
        s.push_str("}\n");
        s
    }
}

impl<StorageT: PartialEq, V: PartialEq> PartialEq for Sppf<StorageT, V> {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
    }
}

fn packed_order<StorageT: Copy, V: Copy>(
    n: &SppfNode<StorageT, V>,
) -> (V, StIdx<StorageT>, Option<SppfIdx>, SppfIdx) {
    match n.kind {
        SppfNodeKind::Packed {
            stidx,
            pivot,
            left,
            right,
        } => (pivot, stidx, left, right),
        _ => unreachable!(),
    }
}
