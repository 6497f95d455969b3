use std::{error::Error, fmt, hash::Hash};

use indexmap::{IndexMap, IndexSet};
use num_traits::{self, AsPrimitive, PrimInt, Unsigned};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use vob::Vob;

use crate::{NIdx, StIdx, Symbol, TIdx};

/// The various different possible errors that can occur when building an `Rsm`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RsmErrorKind {
    /// A line of the text format could not be parsed.
    MalformedLine,
    /// No start nonterminal could be determined, or it has no rules.
    MissingStart,
    /// A nonterminal is referenced but has no entry state.
    UnknownNonterminal(String),
    /// A state id was declared more than once.
    DuplicateState(usize),
    /// An edge refers to a state id which was never declared.
    UnknownState(usize),
    /// A nonterminal has more than one entry state.
    DuplicateEntry(String),
    /// An edge joins states owned by different nonterminals.
    CrossNonterminalEdge,
}

/// Any error from building an `Rsm` returns an instance of this struct. `line` is set if the
/// error can be traced to a (1-based) line of the text format.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RsmError {
    pub kind: RsmErrorKind,
    pub line: Option<usize>,
}

impl Error for RsmError {}

impl fmt::Display for RsmError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.line {
            Some(l) => write!(f, "{} at line {}", self.kind, l),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl fmt::Display for RsmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RsmErrorKind::MalformedLine => write!(f, "Malformed line"),
            RsmErrorKind::MissingStart => write!(f, "No start nonterminal"),
            RsmErrorKind::UnknownNonterminal(n) => write!(f, "Unknown nonterminal '{}'", n),
            RsmErrorKind::DuplicateState(id) => write!(f, "State {} declared more than once", id),
            RsmErrorKind::UnknownState(id) => write!(f, "Unknown state {}", id),
            RsmErrorKind::DuplicateEntry(n) => {
                write!(f, "Nonterminal '{}' has more than one entry state", n)
            }
            RsmErrorKind::CrossNonterminalEdge => {
                write!(f, "Edge joins states of different nonterminals")
            }
        }
    }
}

/// A single state of a nonterminal's automaton.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RsmState<StorageT: Eq + Hash> {
    owner: NIdx<StorageT>,
    term_edges: IndexMap<TIdx<StorageT>, Vec<StIdx<StorageT>>>,
    nonterm_edges: IndexMap<NIdx<StorageT>, Vec<StIdx<StorageT>>>,
}

impl<StorageT: Eq + Hash> RsmState<StorageT> {
    pub(crate) fn new(owner: NIdx<StorageT>) -> Self {
        RsmState {
            owner,
            term_edges: IndexMap::new(),
            nonterm_edges: IndexMap::new(),
        }
    }

    pub(crate) fn owner(&self) -> NIdx<StorageT>
    where
        StorageT: Copy,
    {
        self.owner
    }

    /// Add an edge labelled with `tidx` to `head`, returning `false` if it already existed.
    pub(crate) fn add_term_edge(&mut self, tidx: TIdx<StorageT>, head: StIdx<StorageT>) -> bool {
        let tgts = self.term_edges.entry(tidx).or_default();
        if tgts.contains(&head) {
            return false;
        }
        tgts.push(head);
        true
    }

    /// Add an edge labelled with `nidx` to `head`, returning `false` if it already existed.
    pub(crate) fn add_nonterm_edge(&mut self, nidx: NIdx<StorageT>, head: StIdx<StorageT>) -> bool {
        let tgts = self.nonterm_edges.entry(nidx).or_default();
        if tgts.contains(&head) {
            return false;
        }
        tgts.push(head);
        true
    }
}

/// A recursive state machine: one automaton per nonterminal, whose edges are labelled either
/// with terminals or with (calls to) nonterminals. An `Rsm` is immutable once built.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rsm<StorageT: Eq + Hash = u32> {
    states: Vec<RsmState<StorageT>>,
    finals: Vob,
    /// Nonterminal names mapped to their entry state; a nonterminal's `NIdx` is its position.
    nonterms: IndexMap<String, StIdx<StorageT>>,
    terms: IndexSet<String>,
    start: NIdx<StorageT>,
}

impl<StorageT: 'static + Hash + PrimInt + Unsigned> Rsm<StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    pub(crate) fn from_parts(
        states: Vec<RsmState<StorageT>>,
        finals: Vob,
        nonterms: IndexMap<String, StIdx<StorageT>>,
        terms: IndexSet<String>,
        start: NIdx<StorageT>,
    ) -> Self {
        if num_traits::cast::<usize, StorageT>(states.len()).is_none()
            || num_traits::cast::<usize, StorageT>(nonterms.len()).is_none()
            || num_traits::cast::<usize, StorageT>(terms.len()).is_none()
        {
            panic!("StorageT is not big enough to store this RSM's indices.");
        }
        debug_assert_eq!(finals.len(), states.len());
        Rsm {
            states,
            finals,
            nonterms,
            terms,
            start,
        }
    }

    /// Return the index of the start nonterminal.
    pub fn start_nonterm(&self) -> NIdx<StorageT> {
        self.start
    }

    /// Return the entry state of the start nonterminal.
    pub fn start_state(&self) -> StIdx<StorageT> {
        self.entry_state(self.start)
    }

    /// Return the entry state of nonterminal `nidx`.
    pub fn entry_state(&self, nidx: NIdx<StorageT>) -> StIdx<StorageT> {
        self.nonterms[usize::from(nidx)]
    }

    /// Is `stidx` an accepting state of its owning nonterminal?
    pub fn is_final(&self, stidx: StIdx<StorageT>) -> bool {
        self.finals.get(usize::from(stidx)) == Some(true)
    }

    /// Return the nonterminal whose automaton `stidx` belongs to.
    pub fn owner(&self, stidx: StIdx<StorageT>) -> NIdx<StorageT> {
        self.states[usize::from(stidx)].owner
    }

    /// Does `stidx` have any outgoing edges at all?
    pub fn has_outgoing(&self, stidx: StIdx<StorageT>) -> bool {
        let st = &self.states[usize::from(stidx)];
        !st.term_edges.is_empty() || !st.nonterm_edges.is_empty()
    }

    /// Return the terminal edges leaving `stidx`, in insertion order.
    pub fn term_edges(
        &self,
        stidx: StIdx<StorageT>,
    ) -> &IndexMap<TIdx<StorageT>, Vec<StIdx<StorageT>>> {
        &self.states[usize::from(stidx)].term_edges
    }

    /// Return the nonterminal edges leaving `stidx`, in insertion order.
    pub fn nonterm_edges(
        &self,
        stidx: StIdx<StorageT>,
    ) -> &IndexMap<NIdx<StorageT>, Vec<StIdx<StorageT>>> {
        &self.states[usize::from(stidx)].nonterm_edges
    }

    /// Return an iterator over all edges leaving `stidx` as `(label, head)` pairs: terminal
    /// edges first, then nonterminal edges, each in insertion order.
    pub fn edges(
        &self,
        stidx: StIdx<StorageT>,
    ) -> impl Iterator<Item = (Symbol<StorageT>, StIdx<StorageT>)> + '_ {
        let st = &self.states[usize::from(stidx)];
        st.term_edges
            .iter()
            .flat_map(|(tidx, tgts)| tgts.iter().map(move |x| (Symbol::Term(*tidx), *x)))
            .chain(st.nonterm_edges.iter().flat_map(|(nidx, tgts)| {
                tgts.iter().map(move |x| (Symbol::Nonterm(*nidx), *x))
            }))
    }

    /// How many states does this RSM have?
    pub fn states_len(&self) -> StIdx<StorageT> {
        StIdx(self.states.len().as_())
    }

    /// How many nonterminals does this RSM have?
    pub fn nonterms_len(&self) -> NIdx<StorageT> {
        NIdx(self.nonterms.len().as_())
    }

    /// How many terminals does this RSM have?
    pub fn terms_len(&self) -> TIdx<StorageT> {
        TIdx(self.terms.len().as_())
    }

    /// Return an iterator which produces (in order from `0..self.states_len()`) all this RSM's
    /// valid `StIdx`s.
    pub fn iter_stidxs(&self) -> impl Iterator<Item = StIdx<StorageT>> {
        // We can use as_ safely, because we know that we're only generating integers from
        // 0..self.states.len() and we've already checked that fits into StorageT.
        (0..self.states.len()).map(|x| StIdx(x.as_()))
    }

    /// Return an iterator which produces (in order from `0..self.nonterms_len()`) all this RSM's
    /// valid `NIdx`s.
    pub fn iter_nidxs(&self) -> impl Iterator<Item = NIdx<StorageT>> {
        (0..self.nonterms.len()).map(|x| NIdx(x.as_()))
    }

    /// Return an iterator which produces (in order from `0..self.terms_len()`) all this RSM's
    /// valid `TIdx`s.
    pub fn iter_tidxs(&self) -> impl Iterator<Item = TIdx<StorageT>> {
        (0..self.terms.len()).map(|x| TIdx(x.as_()))
    }

    /// Return the name of nonterminal `nidx`. Panics if `nidx` doesn't exist.
    pub fn nonterm_name(&self, nidx: NIdx<StorageT>) -> &str {
        self.nonterms
            .get_index(usize::from(nidx))
            .map(|(n, _)| n.as_str())
            .unwrap()
    }

    /// Map a nonterminal name to its `NIdx`.
    pub fn nonterm_idx(&self, n: &str) -> Option<NIdx<StorageT>> {
        self.nonterms.get_index_of(n).map(|x| NIdx(x.as_()))
    }

    /// Return the name of terminal `tidx`. Panics if `tidx` doesn't exist.
    pub fn term_name(&self, tidx: TIdx<StorageT>) -> &str {
        self.terms.get_index(usize::from(tidx)).unwrap()
    }

    /// Map a terminal name to its `TIdx`.
    pub fn term_idx(&self, n: &str) -> Option<TIdx<StorageT>> {
        self.terms.get_index_of(n).map(|x| TIdx(x.as_()))
    }

    /// Return a pretty-printed version of this RSM's states and edges.
    pub fn pp(&self) -> String {
        fn num_digits(i: usize) -> usize {
            if i == 0 { 1 } else { ((i as f64).log10() as usize) + 1 }
        }

        let width = num_digits(self.states.len().saturating_sub(1));
        let mut o = String::new();
        for stidx in self.iter_stidxs() {
            let nidx = self.owner(stidx);
            o.push_str(&format!(
                "{:>width$} [{}]",
                usize::from(stidx),
                self.nonterm_name(nidx),
                width = width
            ));
            if self.entry_state(nidx) == stidx {
                o.push_str(" entry");
            }
            if self.is_final(stidx) {
                o.push_str(" final");
            }
            o.push('\n');
            for (sym, head) in self.edges(stidx) {
                let label = match sym {
                    Symbol::Term(tidx) => format!("'{}'", self.term_name(tidx)),
                    Symbol::Nonterm(nidx) => self.nonterm_name(nidx).to_owned(),
                };
                o.push_str(&format!(
                    "{:width$}  {} -> {}\n",
                    "",
                    label,
                    usize::from(head),
                    width = width
                ));
            }
        }
        o
    }
}

/// Builds an `Rsm` from BNF-style rules. Each nonterminal's rules are merged into a prefix tree
/// rooted at that nonterminal's entry state; the state reached at the end of a rule is final.
///
/// In a rule's right-hand side, a symbol written as `'x'` is the terminal `x`; anything else
/// names a nonterminal.
///
/// ```
/// use rsmgrammar::{Rsm, RsmBuilder};
///
/// let rsm: Rsm<u16> = RsmBuilder::new()
///     .rule("E", &["E", "'+'", "T"])
///     .rule("E", &["T"])
///     .rule("T", &["'x'"])
///     .start("E")
///     .build()
///     .unwrap();
/// assert_eq!(rsm.nonterm_name(rsm.start_nonterm()), "E");
/// ```
#[derive(Debug, Default)]
pub struct RsmBuilder {
    rules: Vec<(String, Vec<String>)>,
    start: Option<String>,
}

impl RsmBuilder {
    pub fn new() -> Self {
        RsmBuilder {
            rules: Vec::new(),
            start: None,
        }
    }

    /// Add the rule `lhs -> rhs`. An empty `rhs` makes `lhs` nullable.
    pub fn rule(mut self, lhs: &str, rhs: &[&str]) -> Self {
        self.rules.push((
            lhs.to_owned(),
            rhs.iter().map(|x| (*x).to_owned()).collect(),
        ));
        self
    }

    /// Set the start nonterminal. Defaults to the left-hand side of the first rule.
    pub fn start(mut self, name: &str) -> Self {
        self.start = Some(name.to_owned());
        self
    }

    pub fn build<StorageT: 'static + Hash + PrimInt + Unsigned>(
        self,
    ) -> Result<Rsm<StorageT>, RsmError>
    where
        usize: AsPrimitive<StorageT>,
    {
        // Entry states come first, so nonterminal `i` has entry state `i`.
        let mut states = Vec::new();
        let mut nonterms = IndexMap::new();
        let mut lhs_idxs = Vec::with_capacity(self.rules.len());
        for (lhs, _) in &self.rules {
            let i = match nonterms.get_index_of(lhs) {
                Some(i) => i,
                None => {
                    let stidx = StIdx(states.len().as_());
                    states.push(RsmState::new(NIdx(nonterms.len().as_())));
                    nonterms.insert_full(lhs.clone(), stidx).0
                }
            };
            lhs_idxs.push(i);
        }

        let start = match self.start {
            Some(ref n) => nonterms.get_index_of(n.as_str()),
            None => lhs_idxs.first().copied(),
        }
        .map(|i| NIdx(i.as_()))
        .ok_or(RsmError {
            kind: RsmErrorKind::MissingStart,
            line: None,
        })?;

        let mut terms = IndexSet::new();
        let mut finals = Vec::new();
        for ((_, rhs), &li) in self.rules.iter().zip(lhs_idxs.iter()) {
            let owner = NIdx(li.as_());
            let mut cur = usize::from(nonterms[li]);
            for sym in rhs {
                let next = match term_name(sym) {
                    Some(tn) => {
                        let tidx = TIdx(terms.insert_full(tn.to_owned()).0.as_());
                        match states[cur].term_edges.get(&tidx).and_then(|x| x.first()) {
                            Some(&n) => n,
                            None => {
                                let n = StIdx(states.len().as_());
                                states.push(RsmState::new(owner));
                                states[cur].add_term_edge(tidx, n);
                                n
                            }
                        }
                    }
                    None => {
                        let nidx = nonterms
                            .get_index_of(sym.as_str())
                            .map(|i| NIdx(i.as_()))
                            .ok_or_else(|| RsmError {
                                kind: RsmErrorKind::UnknownNonterminal(sym.clone()),
                                line: None,
                            })?;
                        match states[cur].nonterm_edges.get(&nidx).and_then(|x| x.first()) {
                            Some(&n) => n,
                            None => {
                                let n = StIdx(states.len().as_());
                                states.push(RsmState::new(owner));
                                states[cur].add_nonterm_edge(nidx, n);
                                n
                            }
                        }
                    }
                };
                cur = usize::from(next);
            }
            finals.push(cur);
        }

        let mut finals_vob = Vob::from_elem(false, states.len());
        for i in finals {
            finals_vob.set(i, true);
        }
        Ok(Rsm::from_parts(states, finals_vob, nonterms, terms, start))
    }
}

/// If `sym` is of the form `'x'`, return `x`.
fn term_name(sym: &str) -> Option<&str> {
    if sym.len() >= 2 && sym.starts_with('\'') && sym.ends_with('\'') {
        Some(&sym[1..sym.len() - 1])
    } else {
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_prefix_sharing() {
        let rsm = RsmBuilder::new()
            .rule("E", &["T"])
            .rule("E", &["T", "'+'", "E"])
            .rule("T", &["'x'"])
            .build::<u16>()
            .unwrap();
        // E: entry, after T (final, shared by both rules), after '+', after E.
        // T: entry, after 'x'.
        assert_eq!(usize::from(rsm.states_len()), 6);
        let e = rsm.nonterm_idx("E").unwrap();
        let t = rsm.nonterm_idx("T").unwrap();
        assert_eq!(rsm.start_nonterm(), e);
        let after_t = rsm.nonterm_edges(rsm.entry_state(e))[&t][0];
        assert!(rsm.is_final(after_t));
        assert!(rsm.has_outgoing(after_t));
        let plus = rsm.term_idx("+").unwrap();
        assert_eq!(rsm.term_edges(after_t)[&plus].len(), 1);
        assert_eq!(rsm.owner(after_t), e);
        assert!(!rsm.is_final(rsm.entry_state(e)));
    }

    #[test]
    fn test_empty_rule() {
        let rsm = RsmBuilder::new()
            .rule("S", &["'a'", "S"])
            .rule("S", &[])
            .build::<u8>()
            .unwrap();
        let s = rsm.start_state();
        assert!(rsm.is_final(s));
        assert!(rsm.has_outgoing(s));
        assert_eq!(rsm.term_name(TIdx(0)), "a");
    }

    #[test]
    fn test_errors() {
        let e = RsmBuilder::new().build::<u32>().unwrap_err();
        assert_eq!(e.kind, RsmErrorKind::MissingStart);
        let e = RsmBuilder::new()
            .rule("S", &["'a'"])
            .start("T")
            .build::<u32>()
            .unwrap_err();
        assert_eq!(e.kind, RsmErrorKind::MissingStart);
        let e = RsmBuilder::new()
            .rule("S", &["A", "'b'"])
            .build::<u32>()
            .unwrap_err();
        assert_eq!(e.kind, RsmErrorKind::UnknownNonterminal("A".to_owned()));
        assert_eq!(e.to_string(), "Unknown nonterminal 'A'");
    }

    #[test]
    fn test_pp() {
        let rsm = RsmBuilder::new()
            .rule("S", &["'a'", "S"])
            .rule("S", &["'b'"])
            .build::<u32>()
            .unwrap();
        assert_eq!(
            rsm.pp(),
            "0 [S] entry
   'a' -> 1
   'b' -> 3
1 [S]
   S -> 2
2 [S] final
3 [S] final
"
        );
    }
}
