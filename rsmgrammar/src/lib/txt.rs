//! Reading and writing RSMs in a line-oriented text format:
//!
//! ```text
//! StartState(id=0,nonterminal=Nonterminal("S"),isStart=true,isFinal=false)
//! State(id=1,nonterminal=Nonterminal("S"),isStart=false,isFinal=true)
//! TerminalEdge(tail=0,head=1,terminal=Terminal("a"))
//! NonterminalEdge(tail=1,head=1,nonterminal=Nonterminal("S"))
//! ```
//!
//! `StartState` declares the entry state of the start nonterminal; every other nonterminal's
//! entry is a `State` with `isStart=true`. State ids are arbitrary, but states are numbered in the
//! order they are declared.

use std::{error::Error, fs::read_to_string, hash::Hash, path::Path};

use indexmap::{IndexMap, IndexSet};
use num_traits::{AsPrimitive, PrimInt, Unsigned};
use regex::Regex;
use vob::Vob;

use crate::{
    NIdx, StIdx, Symbol, TIdx,
    rsm::{Rsm, RsmError, RsmErrorKind, RsmState},
};

struct StateDecl {
    line: usize,
    id: usize,
    nonterm: String,
    is_start: bool,
    is_final: bool,
    is_grammar_start: bool,
}

enum EdgeLabel {
    Term(String),
    Nonterm(String),
}

struct EdgeDecl {
    line: usize,
    tail: usize,
    head: usize,
    label: EdgeLabel,
}

fn err(kind: RsmErrorKind, line: Option<usize>) -> RsmError {
    RsmError { kind, line }
}

impl<StorageT: 'static + Hash + PrimInt + Unsigned> Rsm<StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    /// Read an RSM from the text format.
    pub fn from_txt(s: &str) -> Result<Self, RsmError> {
        let state_re = Regex::new(
            r#"^(StartState|State)\(id=(\d+),nonterminal=Nonterminal\("([^"]*)"\),isStart=(true|false),isFinal=(true|false)\)$"#,
        )
        .unwrap();
        let term_re =
            Regex::new(r#"^TerminalEdge\(tail=(\d+),head=(\d+),terminal=Terminal\("([^"]*)"\)\)$"#)
                .unwrap();
        let nonterm_re = Regex::new(
            r#"^NonterminalEdge\(tail=(\d+),head=(\d+),nonterminal=Nonterminal\("([^"]*)"\)\)$"#,
        )
        .unwrap();

        let mut state_decls = Vec::new();
        let mut edge_decls = Vec::new();
        for (i, l) in s.lines().enumerate() {
            let l = l.trim();
            if l.is_empty() {
                continue;
            }
            let line = i + 1;
            let num = |x: &str| {
                x.parse::<usize>()
                    .map_err(|_| err(RsmErrorKind::MalformedLine, Some(line)))
            };
            if let Some(c) = state_re.captures(l) {
                state_decls.push(StateDecl {
                    line,
                    id: num(&c[2])?,
                    nonterm: c[3].to_owned(),
                    is_start: &c[4] == "true",
                    is_final: &c[5] == "true",
                    is_grammar_start: &c[1] == "StartState",
                });
            } else if let Some(c) = term_re.captures(l) {
                edge_decls.push(EdgeDecl {
                    line,
                    tail: num(&c[1])?,
                    head: num(&c[2])?,
                    label: EdgeLabel::Term(c[3].to_owned()),
                });
            } else if let Some(c) = nonterm_re.captures(l) {
                edge_decls.push(EdgeDecl {
                    line,
                    tail: num(&c[1])?,
                    head: num(&c[2])?,
                    label: EdgeLabel::Nonterm(c[3].to_owned()),
                });
            } else {
                return Err(err(RsmErrorKind::MalformedLine, Some(line)));
            }
        }

        // Nonterminals are numbered in the order they are first mentioned by a state.
        let mut ids = IndexMap::new();
        let mut entries: IndexMap<String, Option<StIdx<StorageT>>> = IndexMap::new();
        let mut start = None;
        let mut states = Vec::with_capacity(state_decls.len());
        let mut finals = Vob::from_elem(false, state_decls.len());
        for d in &state_decls {
            let stidx = StIdx(states.len().as_());
            if ids.insert(d.id, stidx).is_some() {
                return Err(err(RsmErrorKind::DuplicateState(d.id), Some(d.line)));
            }
            let ni = match entries.get_index_of(&d.nonterm) {
                Some(x) => x,
                None => entries.insert_full(d.nonterm.clone(), None).0,
            };
            if d.is_start || d.is_grammar_start {
                if entries[ni].is_some() {
                    return Err(err(
                        RsmErrorKind::DuplicateEntry(d.nonterm.clone()),
                        Some(d.line),
                    ));
                }
                entries[ni] = Some(stidx);
            }
            if d.is_grammar_start {
                if start.is_some() {
                    return Err(err(
                        RsmErrorKind::DuplicateEntry(d.nonterm.clone()),
                        Some(d.line),
                    ));
                }
                start = Some(NIdx(ni.as_()));
            }
            if d.is_final {
                finals.set(usize::from(stidx), true);
            }
            states.push(RsmState::new(NIdx(ni.as_())));
        }
        let start = start.ok_or(err(RsmErrorKind::MissingStart, None))?;
        let mut nonterms = IndexMap::with_capacity(entries.len());
        for (n, e) in entries {
            match e {
                Some(stidx) => {
                    nonterms.insert(n, stidx);
                }
                None => return Err(err(RsmErrorKind::UnknownNonterminal(n), None)),
            }
        }

        let mut terms = IndexSet::new();
        for d in edge_decls {
            let tail = *ids
                .get(&d.tail)
                .ok_or(err(RsmErrorKind::UnknownState(d.tail), Some(d.line)))?;
            let head = *ids
                .get(&d.head)
                .ok_or(err(RsmErrorKind::UnknownState(d.head), Some(d.line)))?;
            if states[usize::from(tail)].owner() != states[usize::from(head)].owner() {
                return Err(err(RsmErrorKind::CrossNonterminalEdge, Some(d.line)));
            }
            match d.label {
                EdgeLabel::Term(n) => {
                    let tidx = TIdx(terms.insert_full(n).0.as_());
                    states[usize::from(tail)].add_term_edge(tidx, head);
                }
                EdgeLabel::Nonterm(n) => {
                    let nidx = nonterms.get_index_of(n.as_str()).ok_or_else(|| {
                        err(RsmErrorKind::UnknownNonterminal(n.clone()), Some(d.line))
                    })?;
                    states[usize::from(tail)].add_nonterm_edge(NIdx(nidx.as_()), head);
                }
            }
        }

        Ok(Rsm::from_parts(states, finals, nonterms, terms, start))
    }

    /// Read an RSM in the text format from the file at `path`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn Error>> {
        let s = read_to_string(path)?;
        Ok(Rsm::from_txt(&s)?)
    }

    /// Write this RSM in the text format. States are written in `StIdx` order, so reading the
    /// output back produces the same state numbering and edge order.
    pub fn to_txt(&self) -> String {
        let mut o = String::new();
        for stidx in self.iter_stidxs() {
            let nidx = self.owner(stidx);
            let kind = if stidx == self.start_state() {
                "StartState"
            } else {
                "State"
            };
            o.push_str(&format!(
                "{}(id={},nonterminal=Nonterminal(\"{}\"),isStart={},isFinal={})\n",
                kind,
                usize::from(stidx),
                self.nonterm_name(nidx),
                self.entry_state(nidx) == stidx,
                self.is_final(stidx)
            ));
        }
        for stidx in self.iter_stidxs() {
            for (sym, head) in self.edges(stidx) {
                match sym {
                    Symbol::Term(tidx) => o.push_str(&format!(
                        "TerminalEdge(tail={},head={},terminal=Terminal(\"{}\"))\n",
                        usize::from(stidx),
                        usize::from(head),
                        self.term_name(tidx)
                    )),
                    Symbol::Nonterm(nidx) => o.push_str(&format!(
                        "NonterminalEdge(tail={},head={},nonterminal=Nonterminal(\"{}\"))\n",
                        usize::from(stidx),
                        usize::from(head),
                        self.nonterm_name(nidx)
                    )),
                }
            }
        }
        o
    }
}
