// Copyright (c) 2017 King's College London
// created by the Software Development Team <http://soft-dev.org/>
//
// The Universal Permissive License (UPL), Version 1.0
//
// Subject to the condition set forth below, permission is hereby granted to any person obtaining a
// copy of this software, associated documentation and/or data (collectively the "Software"), free
// of charge and under any and all copyright rights in the Software, and any and all patent rights
// owned or freely licensable by each licensor hereunder covering either (i) the unmodified
// Software as contributed to or provided by such licensor, or (ii) the Larger Works (as defined
// below), to deal in both
//
// (a) the Software, and
// (b) any piece of software and/or hardware listed in the lrgrwrks.txt file
// if one is included with the Software (each a "Larger Work" to which the Software is contributed
// by such licensors),
//
// without restriction, including without limitation the rights to copy, create derivative works
// of, display, perform, and distribute the Software and make, use, sell, offer for sale, import,
// export, have made, and have sold the Software and the Larger Work(s), and to sublicense the
// foregoing rights on either these or other terms.
//
// This license is subject to the following condition: The above copyright notice and either this
// complete permission notice or at a minimum a reference to the UPL must be included in all copies
// or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING
// BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM,
// DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

use std::{
    error::Error,
    fmt::{self, Debug, Display},
    hash::Hash,
    mem,
};

use indexmap::IndexMap;
use num_traits::{AsPrimitive, PrimInt, Unsigned};
use rsmgrammar::{
    NIdx, Rsm, TIdx,
    analysis::{Analysis, RsmWarningAnalysis},
};

use crate::{
    Span,
    descriptors::{Descriptor, Descriptors},
    gss::{Gss, GssIdx},
    input::{InputEdge, InputGraph, RecoveryEdges, Vertex},
    recovery,
    sppf::{Sppf, SppfIdx},
};

/// A parse tree. Inserted terminals have zero width; skipped terminals record the input they
/// consumed without it being part of the derivation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node<StorageT, V> {
    Term {
        tidx: TIdx<StorageT>,
        from: V,
        to: V,
        span: Option<Span>,
    },
    Inserted {
        tidx: TIdx<StorageT>,
        at: V,
    },
    Skipped {
        tidx: TIdx<StorageT>,
        from: V,
        to: V,
        span: Option<Span>,
    },
    Nonterm {
        nidx: NIdx<StorageT>,
        nodes: Vec<Node<StorageT, V>>,
    },
}

impl<StorageT: 'static + Hash + PrimInt + Unsigned, V: Vertex> Node<StorageT, V>
where
    usize: AsPrimitive<StorageT>,
{
    /// Return a pretty-printed version of this node. Terminals which carry a span are printed
    /// along with the text of `input` it covers.
    pub fn pp(&self, rsm: &Rsm<StorageT>, input: &str) -> String {
        let text = |span: Option<Span>| match span {
            Some(s) => format!(" {}", &input[s.start()..s.end()]),
            None => String::new(),
        };
        let mut st = vec![(0, self)]; // Stack of (indent level, node) pairs
        let mut s = String::new();
        while let Some((indent, e)) = st.pop() {
            for _ in 0..indent {
                s.push(' ');
            }
            match e {
                Node::Term { tidx, span, .. } => {
                    s.push_str(&format!("{}{}\n", rsm.term_name(*tidx), text(*span)));
                }
                Node::Inserted { tidx, .. } => {
                    s.push_str(&format!("{} <inserted>\n", rsm.term_name(*tidx)));
                }
                Node::Skipped { tidx, span, .. } => {
                    s.push_str(&format!("<skipped {}{}>\n", rsm.term_name(*tidx), text(*span)));
                }
                Node::Nonterm { nidx, nodes } => {
                    s.push_str(&format!("{}\n", rsm.nonterm_name(*nidx)));
                    for x in nodes.iter().rev() {
                        st.push((indent + 1, x));
                    }
                }
            }
        }
        s
    }

    /// Return the terminals this tree derives, in order, including inserted terminals but not
    /// skipped ones: in other words, the input as recovery repaired it.
    pub fn tokens(&self) -> Vec<TIdx<StorageT>> {
        let mut toks = Vec::new();
        let mut st = vec![self];
        while let Some(e) = st.pop() {
            match e {
                Node::Term { tidx, .. } | Node::Inserted { tidx, .. } => toks.push(*tidx),
                Node::Skipped { .. } => (),
                Node::Nonterm { nodes, .. } => st.extend(nodes.iter().rev()),
            }
        }
        toks
    }

    /// Return the repairs made in this tree, in input order.
    pub fn repairs(&self) -> Vec<ParseRepair<StorageT, V>> {
        let mut rprs = Vec::new();
        let mut st = vec![self];
        while let Some(e) = st.pop() {
            match e {
                Node::Term { .. } => (),
                Node::Inserted { tidx, at } => rprs.push(ParseRepair::Insert {
                    tidx: *tidx,
                    at: *at,
                }),
                Node::Skipped { tidx, from, to, .. } => rprs.push(ParseRepair::Skip {
                    tidx: *tidx,
                    from: *from,
                    to: *to,
                }),
                Node::Nonterm { nodes, .. } => st.extend(nodes.iter().rev()),
            }
        }
        rprs
    }

    /// Return the span of input covered by the terminals of this tree, or `None` if no terminal
    /// carries a span.
    pub fn span(&self) -> Option<Span> {
        let mut span: Option<Span> = None;
        let mut st = vec![self];
        while let Some(e) = st.pop() {
            match e {
                Node::Term { span: Some(s), .. } | Node::Skipped { span: Some(s), .. } => {
                    span = Some(span.map_or(*s, |x| x.cover(*s)));
                }
                Node::Nonterm { nodes, .. } => st.extend(nodes.iter()),
                _ => (),
            }
        }
        span
    }
}

/// A repair made by error recovery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseRepair<StorageT, V> {
    /// Insert a terminal at vertex `at`.
    Insert { tidx: TIdx<StorageT>, at: V },
    /// Skip the input terminal on the edge from `from` to `to`.
    Skip {
        tidx: TIdx<StorageT>,
        from: V,
        to: V,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryKind {
    /// Find a parse with the minimal total cost of inserted and skipped terminals.
    Weighted,
    /// Don't do any error recovery.
    None,
}

/// Counters describing the work a parse did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParseStats {
    /// Descriptors processed.
    pub descriptors: usize,
    pub gss_nodes: usize,
    pub sppf_nodes: usize,
    pub recovery_edges: usize,
    /// Was the parse stopped early because the descriptor budget ran out?
    pub truncated: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// No derivation of the start nonterminal exists, even with error recovery.
    Unrecoverable,
    /// The descriptor budget ran out before any derivation was found.
    BudgetExhausted,
}

/// The reason a parse produced no forest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParseError {
    kind: ParseErrorKind,
    stats: ParseStats,
}

impl ParseError {
    pub fn kind(&self) -> ParseErrorKind {
        self.kind
    }

    pub fn stats(&self) -> ParseStats {
        self.stats
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            ParseErrorKind::Unrecoverable => write!(f, "No parse found"),
            ParseErrorKind::BudgetExhausted => write!(
                f,
                "Descriptor budget exhausted after {} descriptors with no parse found",
                self.stats.descriptors
            ),
        }
    }
}

impl Error for ParseError {}

/// The result of a successful parse: a shared packed parse forest containing every derivation
/// found, and the minimal-weight root.
#[derive(Debug)]
pub struct Forest<StorageT, V> {
    root: SppfIdx,
    sppf: Sppf<StorageT, V>,
    results: IndexMap<(V, V), SppfIdx>,
    recovery_edges: RecoveryEdges<StorageT, V>,
    stats: ParseStats,
}

impl<StorageT: 'static + Hash + PrimInt + Unsigned, V: Vertex> Forest<StorageT, V>
where
    usize: AsPrimitive<StorageT>,
{
    /// The symbol node of the minimal-weight derivation of the start nonterminal.
    pub fn root(&self) -> SppfIdx {
        self.root
    }

    /// The total recovery cost of the root: 0 if the input needed no repairs.
    pub fn weight(&self) -> u32 {
        self.sppf.weight(self.root)
    }

    pub fn sppf(&self) -> &Sppf<StorageT, V> {
        &self.sppf
    }

    pub fn stats(&self) -> ParseStats {
        self.stats
    }

    /// Return every `(start vertex, final vertex)` pair the start nonterminal was derived
    /// between, with the weight of its cheapest derivation, in the order they were found.
    pub fn pairs(&self) -> Vec<(V, V, u32)> {
        self.results
            .iter()
            .map(|(&(l, r), &idx)| (l, r, self.sppf.weight(idx)))
            .collect()
    }

    /// The symbol node deriving the start nonterminal between `from` and `to`, if there is one.
    pub fn root_between(&self, from: V, to: V) -> Option<SppfIdx> {
        self.results.get(&(from, to)).copied()
    }

    /// Extract a minimal-weight parse tree from the root.
    pub fn tree(&self) -> Node<StorageT, V> {
        self.sppf.tree(self.root)
    }

    /// Return the repairs made in the tree returned by [Forest::tree].
    pub fn repairs(&self) -> Vec<ParseRepair<StorageT, V>> {
        self.tree().repairs()
    }

    /// The recovery edges considered during the parse.
    pub fn recovery_edges(&self) -> &RecoveryEdges<StorageT, V> {
        &self.recovery_edges
    }
}

/// The state of a single parse.
pub(crate) struct ParseContext<'a, StorageT: 'static + Eq + Hash, I: InputGraph<StorageT>> {
    pub(crate) rsm: &'a Rsm<StorageT>,
    pub(crate) input: &'a I,
    pub(crate) term_costs: &'a dyn Fn(TIdx<StorageT>) -> u8,
    pub(crate) skip_cost: u8,
    recoverer: RecoveryKind,
    max_descriptors: Option<usize>,
    starts: Vec<I::Vertex>,
    gss: Gss<StorageT, I::Vertex>,
    pub(crate) sppf: Sppf<StorageT, I::Vertex>,
    pub(crate) recovery_edges: RecoveryEdges<StorageT, I::Vertex>,
    queue: Descriptors<StorageT, I::Vertex>,
    /// Recovery candidates met while looking for an error-free parse.
    parked: Vec<Descriptor<StorageT, I::Vertex>>,
    recovering: bool,
    results: IndexMap<(I::Vertex, I::Vertex), SppfIdx>,
    processed: usize,
    truncated: bool,
}

impl<'a, StorageT: 'static + Debug + Hash + PrimInt + Unsigned, I: InputGraph<StorageT>>
    ParseContext<'a, StorageT, I>
where
    usize: AsPrimitive<StorageT>,
{
    fn parse(
        builder: &RTParserBuilder<'a, StorageT>,
        input: &'a I,
    ) -> Result<Forest<StorageT, I::Vertex>, ParseError> {
        let mut pc = ParseContext {
            rsm: builder.rsm,
            input,
            term_costs: builder.term_costs,
            skip_cost: builder.skip_cost,
            recoverer: builder.recoverer,
            max_descriptors: builder.max_descriptors,
            starts: input.start_vertices(),
            gss: Gss::new(),
            sppf: Sppf::new(),
            recovery_edges: RecoveryEdges::new(),
            queue: Descriptors::new(),
            parked: Vec::new(),
            recovering: false,
            results: IndexMap::new(),
            processed: 0,
            truncated: false,
        };
        for v in pc.starts.clone() {
            let (gidx, _) = pc.gss.get_or_create(pc.rsm.start_nonterm(), v, 0);
            pc.push(Descriptor {
                stidx: pc.rsm.start_state(),
                gss: gidx,
                pos: v,
                sppf: None,
            });
        }
        pc.run();
        pc.finish()
    }

    fn run(&mut self) {
        loop {
            while let Some(d) = self.queue.pop() {
                if let Some(m) = self.max_descriptors {
                    if self.processed >= m {
                        log::debug!("Descriptor budget of {} exhausted", m);
                        self.truncated = true;
                        return;
                    }
                }
                self.queue.mark_seen(&d);
                self.processed += 1;
                self.process(d);
            }
            let cur = self.queue.current();
            if let Some(w) = self.best_weight() {
                if w as usize <= cur {
                    return;
                }
            }
            if !self.recovering {
                if self.recoverer == RecoveryKind::None {
                    return;
                }
                log::debug!(
                    "No error-free parse: recovering from {} descriptors",
                    self.parked.len()
                );
                self.recovering = true;
                for d in mem::take(&mut self.parked) {
                    recovery::recover(self, d);
                }
            }
            if !self.queue.advance() {
                return;
            }
            log::debug!("Processing descriptors of weight {}", self.queue.current());
        }
    }

    fn process(&mut self, d: Descriptor<StorageT, I::Vertex>) {
        log::trace!("Processing {:?}", d);
        let rsm = self.rsm;
        let Descriptor {
            stidx,
            gss,
            pos,
            sppf: prefix,
        } = d;
        let edges = self.input.edges_from(pos).collect::<Vec<InputEdge<_, _>>>();
        for e in &edges {
            match e.term() {
                None => {
                    let leaf = self.sppf.terminal_node(None, pos, e.head(), e.span());
                    let p = self.sppf.get_node_p(rsm, stidx, prefix, leaf);
                    self.push(Descriptor {
                        stidx,
                        gss,
                        pos: e.head(),
                        sppf: Some(p),
                    });
                }
                Some(tidx) => {
                    if let Some(tgts) = rsm.term_edges(stidx).get(&tidx) {
                        let leaf = self.sppf.terminal_node(Some(tidx), pos, e.head(), e.span());
                        for &tgt in tgts {
                            let p = self.sppf.get_node_p(rsm, tgt, prefix, leaf);
                            self.push(Descriptor {
                                stidx: tgt,
                                gss,
                                pos: e.head(),
                                sppf: Some(p),
                            });
                        }
                    }
                }
            }
        }

        for (&nidx, rets) in rsm.nonterm_edges(stidx) {
            let weight = self.weight(gss, prefix);
            let (callee, created) = self.gss.get_or_create(nidx, pos, weight);
            if created {
                log::trace!("New GSS node for {} at {:?}", rsm.nonterm_name(nidx), pos);
            }
            for &ret in rets {
                if self.gss.add_pop_edge(callee, ret, prefix, gss) {
                    // Results popped before this edge existed must be replayed along it.
                    let popped = self
                        .gss
                        .node(callee)
                        .popped()
                        .iter()
                        .copied()
                        .collect::<Vec<_>>();
                    for r in popped {
                        let p = self.sppf.get_node_p(rsm, ret, prefix, r);
                        let rext = self.sppf.node(r).rext();
                        self.push(Descriptor {
                            stidx: ret,
                            gss,
                            pos: rext,
                            sppf: Some(p),
                        });
                    }
                }
            }
            self.push(Descriptor {
                stidx: rsm.entry_state(nidx),
                gss: callee,
                pos,
                sppf: None,
            });
        }

        if rsm.is_final(stidx) {
            let sym = match prefix {
                None => self.sppf.epsilon_symbol(rsm, stidx, pos),
                Some(p) => self.sppf.symbol_node(rsm, stidx, p),
            };
            self.pop(gss, sym, pos);
        }

        // Recovery candidates include descriptors which matched input: repairing them may be
        // cheaper than anything reachable from the match.
        let repairable =
            !rsm.term_edges(stidx).is_empty() || edges.iter().any(|e| e.term().is_some());
        if repairable && self.recoverer != RecoveryKind::None {
            if self.recovering {
                recovery::recover(self, d);
            } else {
                self.parked.push(d);
            }
        }
    }

    /// Return the symbol node `sym` from the call `gss`, resuming every caller.
    fn pop(&mut self, gss: GssIdx, sym: SppfIdx, pos: I::Vertex) {
        if !self.gss.pop(gss, sym) {
            return;
        }
        let rsm = self.rsm;
        let (nidx, lext) = (self.gss.node(gss).nidx(), self.gss.node(gss).pos());
        if nidx == rsm.start_nonterm() && self.starts.contains(&lext) && self.input.is_final(pos) {
            if self.results.insert((lext, pos), sym).is_none() {
                log::debug!(
                    "Derived {} from {:?} to {:?} with weight {}",
                    rsm.nonterm_name(nidx),
                    lext,
                    pos,
                    self.sppf.weight(sym)
                );
            }
        }
        for (ret, prefix, caller) in self.gss.edges(gss) {
            let p = self.sppf.get_node_p(rsm, ret, prefix, sym);
            self.push(Descriptor {
                stidx: ret,
                gss: caller,
                pos,
                sppf: Some(p),
            });
        }
    }

    /// The recovery weight of the path to a descriptor: the cheapest way of reaching its GSS
    /// node plus the weight of what has been derived since.
    fn weight(&self, gss: GssIdx, sppf: Option<SppfIdx>) -> u32 {
        self.gss
            .node(gss)
            .min_left()
            .saturating_add(sppf.map_or(0, |x| self.sppf.weight(x)))
    }

    pub(crate) fn push(&mut self, d: Descriptor<StorageT, I::Vertex>) {
        let w = self.weight(d.gss, d.sppf);
        self.queue.push(d, w);
    }

    fn best_weight(&self) -> Option<u32> {
        self.results.values().map(|x| self.sppf.weight(*x)).min()
    }

    fn finish(self) -> Result<Forest<StorageT, I::Vertex>, ParseError> {
        let stats = ParseStats {
            descriptors: self.processed,
            gss_nodes: self.gss.len(),
            sppf_nodes: self.sppf.len(),
            recovery_edges: self.recovery_edges.len(),
            truncated: self.truncated,
        };
        log::debug!("Parse finished: {:?}", stats);
        // Ties go to the pair found first.
        let root = self
            .results
            .values()
            .copied()
            .min_by_key(|x| self.sppf.weight(*x));
        match root {
            Some(root) => Ok(Forest {
                root,
                sppf: self.sppf,
                results: self.results,
                recovery_edges: self.recovery_edges,
                stats,
            }),
            None => Err(ParseError {
                kind: if self.truncated {
                    ParseErrorKind::BudgetExhausted
                } else {
                    ParseErrorKind::Unrecoverable
                },
                stats,
            }),
        }
    }
}

/// Configures and runs a GLL parser over an RSM.
pub struct RTParserBuilder<'a, StorageT: 'static + Eq + Hash> {
    rsm: &'a Rsm<StorageT>,
    recoverer: RecoveryKind,
    term_costs: &'a dyn Fn(TIdx<StorageT>) -> u8,
    skip_cost: u8,
    max_descriptors: Option<usize>,
}

impl<'a, StorageT: 'static + Debug + Hash + PrimInt + Unsigned> RTParserBuilder<'a, StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    /// Create a new builder for `rsm`. Warnings about unproductive or unreachable nonterminals
    /// are logged at this point.
    pub fn new(rsm: &'a Rsm<StorageT>) -> Self {
        let mut wa = RsmWarningAnalysis::new();
        wa.analyse(rsm);
        for w in wa.iter() {
            log::warn!("{}", w.pp(rsm));
        }
        RTParserBuilder {
            rsm,
            recoverer: RecoveryKind::Weighted,
            term_costs: &|_| 1,
            skip_cost: 1,
            max_descriptors: None,
        }
    }

    /// Set the recoverer for this parser to `rk`.
    pub fn recoverer(mut self, rk: RecoveryKind) -> Self {
        self.recoverer = rk;
        self
    }

    /// Set the cost of inserting each terminal. Every cost must be greater than zero.
    pub fn term_costs(mut self, f: &'a dyn Fn(TIdx<StorageT>) -> u8) -> Self {
        self.term_costs = f;
        self
    }

    /// Set the cost of skipping an input terminal.
    ///
    /// # Panics
    ///
    /// If `cost` is zero.
    pub fn skip_cost(mut self, cost: u8) -> Self {
        assert!(cost > 0, "Skip cost must be greater than zero");
        self.skip_cost = cost;
        self
    }

    /// Stop parsing after `max` descriptors have been processed.
    pub fn max_descriptors(mut self, max: Option<usize>) -> Self {
        self.max_descriptors = max;
        self
    }

    /// Parse `input`. On success return a forest whose root has the minimal recovery weight of
    /// any derivation of the start nonterminal found.
    ///
    /// # Panics
    ///
    /// If any terminal's insertion cost is zero.
    pub fn parse<I: InputGraph<StorageT>>(
        &self,
        input: &'a I,
    ) -> Result<Forest<StorageT, I::Vertex>, ParseError> {
        for tidx in self.rsm.iter_tidxs() {
            assert!(
                (self.term_costs)(tidx) > 0,
                "Insertion cost of '{}' must be greater than zero",
                self.rsm.term_name(tidx)
            );
        }
        ParseContext::parse(self, input)
    }
}
