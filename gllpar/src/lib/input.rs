//! Inputs to the parser. An input is a directed graph whose edges are labelled with terminals
//! (or with nothing, for edges which the parser may cross without consuming a terminal). A
//! token stream is the special case of a graph which is a single chain.

use std::{fmt::Debug, hash::Hash};

use indexmap::IndexMap;
use rsmgrammar::TIdx;
use vob::Vob;

use crate::Span;

/// Anything which can be used as a vertex of an input graph.
pub trait Vertex: Copy + Debug + Eq + Hash + Ord + 'static {}

impl<T: Copy + Debug + Eq + Hash + Ord + 'static> Vertex for T {}

/// An edge leaving a vertex of an input graph.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InputEdge<StorageT, V> {
    term: Option<TIdx<StorageT>>,
    head: V,
    span: Option<Span>,
}

impl<StorageT: Copy, V: Copy> InputEdge<StorageT, V> {
    pub fn new(term: Option<TIdx<StorageT>>, head: V, span: Option<Span>) -> Self {
        InputEdge { term, head, span }
    }

    /// The terminal this edge is labelled with, or `None` for an epsilon edge.
    pub fn term(&self) -> Option<TIdx<StorageT>> {
        self.term
    }

    /// The vertex this edge leads to.
    pub fn head(&self) -> V {
        self.head
    }

    pub fn span(&self) -> Option<Span> {
        self.span
    }
}

/// The interface the parser uses to walk an input.
pub trait InputGraph<StorageT: 'static> {
    type Vertex: Vertex;

    /// The vertices at which a parse of the start nonterminal may begin.
    fn start_vertices(&self) -> Vec<Self::Vertex>;

    /// Can a parse of the start nonterminal end at `v`?
    fn is_final(&self, v: Self::Vertex) -> bool;

    /// Return the edges leaving `v`.
    fn edges_from<'a>(
        &'a self,
        v: Self::Vertex,
    ) -> Box<dyn Iterator<Item = InputEdge<StorageT, Self::Vertex>> + 'a>;
}

/// A linear input of `n` terminals, with vertices `0..=n`. Terminal `i` labels the edge from
/// vertex `i` to vertex `i + 1`; vertex `0` is the only start vertex and `n` the only final
/// vertex.
#[derive(Clone, Debug)]
pub struct LinearInput<StorageT> {
    toks: Vec<(TIdx<StorageT>, Option<Span>)>,
}

impl<StorageT: Copy> LinearInput<StorageT> {
    pub fn new(toks: Vec<TIdx<StorageT>>) -> Self {
        LinearInput {
            toks: toks.into_iter().map(|x| (x, None)).collect(),
        }
    }

    /// Create a linear input from lexemes, each of which records the span of user input it was
    /// lexed from.
    pub fn from_lexemes(lexemes: Vec<(TIdx<StorageT>, Span)>) -> Self {
        LinearInput {
            toks: lexemes.into_iter().map(|(t, s)| (t, Some(s))).collect(),
        }
    }

    /// How many terminals does this input contain?
    pub fn len(&self) -> usize {
        self.toks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.toks.is_empty()
    }
}

impl<StorageT: 'static + Copy> InputGraph<StorageT> for LinearInput<StorageT> {
    type Vertex = usize;

    fn start_vertices(&self) -> Vec<usize> {
        vec![0]
    }

    fn is_final(&self, v: usize) -> bool {
        v == self.toks.len()
    }

    fn edges_from<'a>(
        &'a self,
        v: usize,
    ) -> Box<dyn Iterator<Item = InputEdge<StorageT, usize>> + 'a> {
        Box::new(
            self.toks
                .get(v)
                .map(|(t, s)| InputEdge::new(Some(*t), v + 1, *s))
                .into_iter(),
        )
    }
}

/// An arbitrary input graph, which may contain cycles, with vertices numbered from 0 in the
/// order they were added.
#[derive(Clone, Debug)]
pub struct GraphInput<StorageT> {
    edges: Vec<Vec<InputEdge<StorageT, usize>>>,
    starts: Vec<usize>,
    finals: Vob,
}

impl<StorageT: Copy + PartialEq> GraphInput<StorageT> {
    pub fn new() -> Self {
        GraphInput {
            edges: Vec::new(),
            starts: Vec::new(),
            finals: Vob::new(),
        }
    }

    /// Add a new vertex, returning its index.
    pub fn add_vertex(&mut self) -> usize {
        self.edges.push(Vec::new());
        self.finals.push(false);
        self.edges.len() - 1
    }

    /// Add an edge from `from` to `to` labelled with `term` (`None` for an epsilon edge). Adding
    /// the same edge twice has no effect.
    ///
    /// # Panics
    ///
    /// If either vertex does not exist.
    pub fn add_edge(&mut self, from: usize, term: Option<TIdx<StorageT>>, to: usize) {
        assert!(to < self.edges.len(), "Unknown vertex {}", to);
        let e = InputEdge::new(term, to, None);
        if !self.edges[from].contains(&e) {
            self.edges[from].push(e);
        }
    }

    /// Mark `v` as a vertex at which a parse may start.
    pub fn add_start(&mut self, v: usize) {
        assert!(v < self.edges.len(), "Unknown vertex {}", v);
        if !self.starts.contains(&v) {
            self.starts.push(v);
        }
    }

    /// Mark `v` as a vertex at which a parse may end.
    pub fn add_final(&mut self, v: usize) {
        self.finals.set(v, true);
    }

    pub fn vertices_len(&self) -> usize {
        self.edges.len()
    }
}

impl<StorageT: Copy + PartialEq> Default for GraphInput<StorageT> {
    fn default() -> Self {
        Self::new()
    }
}

impl<StorageT: 'static + Copy> InputGraph<StorageT> for GraphInput<StorageT> {
    type Vertex = usize;

    fn start_vertices(&self) -> Vec<usize> {
        self.starts.clone()
    }

    fn is_final(&self, v: usize) -> bool {
        self.finals.get(v) == Some(true)
    }

    fn edges_from<'a>(
        &'a self,
        v: usize,
    ) -> Box<dyn Iterator<Item = InputEdge<StorageT, usize>> + 'a> {
        Box::new(self.edges[v].iter().copied())
    }
}

/// An edge added to the input by error recovery. An edge with a terminal is an insertion (its
/// head is the vertex it leaves); an edge without one skips the input between its two vertices.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct RecoveryEdge<StorageT, V> {
    term: Option<TIdx<StorageT>>,
    head: V,
    weight: u32,
}

impl<StorageT: Copy, V: Copy> RecoveryEdge<StorageT, V> {
    pub fn term(&self) -> Option<TIdx<StorageT>> {
        self.term
    }

    pub fn head(&self) -> V {
        self.head
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }
}

/// The overlay of recovery edges accumulated during a parse. The input itself is never
/// modified.
#[derive(Clone, Debug)]
pub struct RecoveryEdges<StorageT, V> {
    edges: IndexMap<V, Vec<RecoveryEdge<StorageT, V>>>,
    len: usize,
}

impl<StorageT: Copy + Eq, V: Vertex> RecoveryEdges<StorageT, V> {
    pub(crate) fn new() -> Self {
        RecoveryEdges {
            edges: IndexMap::new(),
            len: 0,
        }
    }

    /// Add a recovery edge, returning `true` if it was not already present.
    pub(crate) fn add_recovery_edge(
        &mut self,
        from: V,
        to: V,
        term: Option<TIdx<StorageT>>,
        weight: u32,
    ) -> bool {
        let e = RecoveryEdge {
            term,
            head: to,
            weight,
        };
        let es = self.edges.entry(from).or_default();
        if es.contains(&e) {
            return false;
        }
        es.push(e);
        self.len += 1;
        true
    }

    /// Return the recovery edges leaving `v`.
    pub fn edges_from(&self, v: V) -> &[RecoveryEdge<StorageT, V>] {
        self.edges.get(&v).map(|x| x.as_slice()).unwrap_or(&[])
    }

    /// Iterate over all recovery edges as `(from, edge)` pairs, in the order they were added.
    pub fn iter(&self) -> impl Iterator<Item = (V, &RecoveryEdge<StorageT, V>)> + '_ {
        self.edges
            .iter()
            .flat_map(|(v, es)| es.iter().map(move |e| (*v, e)))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_linear() {
        let inp = LinearInput::new(vec![TIdx(3u16), TIdx(1)]);
        assert_eq!(inp.start_vertices(), vec![0]);
        assert!(!inp.is_final(1));
        assert!(inp.is_final(2));
        let es = inp.edges_from(1).collect::<Vec<_>>();
        assert_eq!(es, vec![InputEdge::new(Some(TIdx(1)), 2, None)]);
        assert_eq!(inp.edges_from(2).count(), 0);
    }

    #[test]
    fn test_graph() {
        let mut g = GraphInput::<u16>::new();
        let v0 = g.add_vertex();
        let v1 = g.add_vertex();
        g.add_edge(v0, Some(TIdx(0)), v1);
        g.add_edge(v0, Some(TIdx(0)), v1);
        g.add_edge(v1, None, v0);
        g.add_start(v0);
        g.add_final(v1);
        assert_eq!(g.vertices_len(), 2);
        assert_eq!(g.edges_from(v0).count(), 1);
        assert_eq!(
            g.edges_from(v1).collect::<Vec<_>>(),
            vec![InputEdge::new(None, v0, None)]
        );
        assert!(g.is_final(v1));
        assert!(!g.is_final(v0));
    }

    #[test]
    fn test_recovery_edges() {
        let mut re = RecoveryEdges::<u16, usize>::new();
        assert!(re.add_recovery_edge(2, 3, None, 1));
        assert!(!re.add_recovery_edge(2, 3, None, 1));
        assert!(re.add_recovery_edge(2, 2, Some(TIdx(4)), 2));
        assert_eq!(re.len(), 2);
        assert_eq!(re.edges_from(2)[1].term(), Some(TIdx(4)));
        assert_eq!(re.edges_from(2)[1].head(), 2);
        assert!(re.edges_from(0).is_empty());
        assert_eq!(
            re.iter().map(|(v, e)| (v, e.weight())).collect::<Vec<_>>(),
            vec![(2, 1), (2, 2)]
        );
    }
}
