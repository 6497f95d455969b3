use std::{fmt, hash::Hash, ops::Deref};

use num_traits::{AsPrimitive, PrimInt, Unsigned};
use vob::Vob;

use crate::{NIdx, Rsm};

/// Performs an analysis on a given `Subject`. The mechanisms by which you retrieve the results
/// of an analysis are not specified by the trait, and are particular to the types that implement
/// it.
pub trait Analysis<Subject> {
    fn analyse(&mut self, subject: &Subject);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RsmWarningKind {
    /// No terminal string can be derived from the nonterminal.
    UnproductiveNonterm,
    /// The nonterminal can never be called from the start nonterminal.
    UnreachableNonterm,
}

impl fmt::Display for RsmWarningKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            RsmWarningKind::UnproductiveNonterm => "Unproductive nonterminal",
            RsmWarningKind::UnreachableNonterm => "Unreachable nonterminal",
        };
        write!(f, "{}", s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RsmWarning<StorageT> {
    pub kind: RsmWarningKind,
    pub nidx: NIdx<StorageT>,
}

impl<StorageT: 'static + Hash + PrimInt + Unsigned> RsmWarning<StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    /// Return a pretty-printed version of this warning, naming the nonterminal.
    pub fn pp(&self, rsm: &Rsm<StorageT>) -> String {
        format!("{} '{}'", self.kind, rsm.nonterm_name(self.nidx))
    }
}

/// Collects `RsmWarning`s. Dereferences into the `Vec` of warnings found.
pub struct RsmWarningAnalysis<StorageT> {
    warnings: Vec<RsmWarning<StorageT>>,
}

impl<StorageT> RsmWarningAnalysis<StorageT> {
    pub fn new() -> Self {
        RsmWarningAnalysis {
            warnings: Vec::new(),
        }
    }
}

impl<StorageT> Default for RsmWarningAnalysis<StorageT> {
    fn default() -> Self {
        Self::new()
    }
}

impl<StorageT> Deref for RsmWarningAnalysis<StorageT> {
    type Target = Vec<RsmWarning<StorageT>>;

    fn deref(&self) -> &Self::Target {
        &self.warnings
    }
}

impl<StorageT: 'static + Hash + PrimInt + Unsigned> Analysis<Rsm<StorageT>>
    for RsmWarningAnalysis<StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    fn analyse(&mut self, rsm: &Rsm<StorageT>) {
        let productive = productive_nonterms(rsm);
        let reachable = reachable_nonterms(rsm);
        for nidx in rsm.iter_nidxs() {
            if productive.get(usize::from(nidx)) != Some(true) {
                self.warnings.push(RsmWarning {
                    kind: RsmWarningKind::UnproductiveNonterm,
                    nidx,
                });
            }
            if reachable.get(usize::from(nidx)) != Some(true) {
                self.warnings.push(RsmWarning {
                    kind: RsmWarningKind::UnreachableNonterm,
                    nidx,
                });
            }
        }
    }
}

/// Return a `Vob` with a bit set for every nonterminal which derives at least one terminal
/// string (possibly the empty one).
pub fn productive_nonterms<StorageT: 'static + Hash + PrimInt + Unsigned>(
    rsm: &Rsm<StorageT>,
) -> Vob
where
    usize: AsPrimitive<StorageT>,
{
    // A state "completes" if some path from it reaches a final state of its own automaton using
    // only terminal edges and calls to productive nonterminals.
    let mut completes = Vob::from_elem(false, usize::from(rsm.states_len()));
    let mut productive = Vob::from_elem(false, usize::from(rsm.nonterms_len()));
    loop {
        let mut changed = false;
        for stidx in rsm.iter_stidxs() {
            if completes.get(usize::from(stidx)) == Some(true) {
                continue;
            }
            let c = rsm.is_final(stidx)
                || rsm
                    .term_edges(stidx)
                    .values()
                    .flatten()
                    .any(|x| completes.get(usize::from(*x)) == Some(true))
                || rsm.nonterm_edges(stidx).iter().any(|(nidx, tgts)| {
                    productive.get(usize::from(*nidx)) == Some(true)
                        && tgts
                            .iter()
                            .any(|x| completes.get(usize::from(*x)) == Some(true))
                });
            if c {
                completes.set(usize::from(stidx), true);
                let owner = rsm.owner(stidx);
                if rsm.entry_state(owner) == stidx {
                    productive.set(usize::from(owner), true);
                }
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    productive
}

/// Return a `Vob` with a bit set for every nonterminal which can be called, directly or
/// indirectly, from the start nonterminal (which is itself always reachable).
pub fn reachable_nonterms<StorageT: 'static + Hash + PrimInt + Unsigned>(
    rsm: &Rsm<StorageT>,
) -> Vob
where
    usize: AsPrimitive<StorageT>,
{
    let mut reachable = Vob::from_elem(false, usize::from(rsm.nonterms_len()));
    reachable.set(usize::from(rsm.start_nonterm()), true);
    loop {
        let mut changed = false;
        for stidx in rsm.iter_stidxs() {
            if reachable.get(usize::from(rsm.owner(stidx))) != Some(true) {
                continue;
            }
            for nidx in rsm.nonterm_edges(stidx).keys() {
                if reachable.get(usize::from(*nidx)) != Some(true) {
                    reachable.set(usize::from(*nidx), true);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
    reachable
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::RsmBuilder;

    #[test]
    fn test_productive() {
        let rsm = RsmBuilder::new()
            .rule("S", &["A"])
            .rule("S", &["B", "'b'"])
            .rule("A", &["'a'", "A"])
            .rule("B", &[])
            .rule("C", &["C", "'c'"])
            .start("S")
            .build::<u16>()
            .unwrap();
        let p = productive_nonterms(&rsm);
        let has = |n: &str| p.get(usize::from(rsm.nonterm_idx(n).unwrap())) == Some(true);
        assert!(has("S"));
        assert!(!has("A"));
        assert!(has("B"));
        assert!(!has("C"));
    }

    #[test]
    fn test_warnings() {
        let rsm = RsmBuilder::new()
            .rule("S", &["'a'"])
            .rule("S", &["X"])
            .rule("X", &["X"])
            .rule("U", &["'u'"])
            .build::<u32>()
            .unwrap();
        let mut a = RsmWarningAnalysis::<u32>::new();
        a.analyse(&rsm);
        let x = rsm.nonterm_idx("X").unwrap();
        let u = rsm.nonterm_idx("U").unwrap();
        assert_eq!(
            *a,
            vec![
                RsmWarning {
                    kind: RsmWarningKind::UnproductiveNonterm,
                    nidx: x
                },
                RsmWarning {
                    kind: RsmWarningKind::UnreachableNonterm,
                    nidx: u
                },
            ]
        );
        assert_eq!(a[0].pp(&rsm), "Unproductive nonterminal 'X'");
    }
}
