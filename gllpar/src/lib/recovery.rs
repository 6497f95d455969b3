//! Weighted error recovery. Every descriptor which expects a terminal, or which sits before an
//! input terminal, is offered two kinds of repair alongside whatever the input matched. Each
//! repair is recorded as an edge in the parse's recovery overlay:
//!
//!   * skipping an input terminal, at the cost set by
//!     [RTParserBuilder::skip_cost](crate::RTParserBuilder::skip_cost);
//!   * inserting a terminal the current state expects but which no input edge provides, at that
//!     terminal's insertion cost. Inserting a terminal which the input provides is never cheaper
//!     than matching it.
//!
//! A substitution is an insertion followed by a skip. Because descriptors are processed in order
//! of their recovery weight, the first derivation found with a given weight is as cheap as any
//! derivation the parser could find.

use std::{fmt::Debug, hash::Hash};

use num_traits::{AsPrimitive, PrimInt, Unsigned};

use crate::{descriptors::Descriptor, input::InputGraph, parser::ParseContext};

pub(crate) fn recover<StorageT, I>(
    pc: &mut ParseContext<'_, StorageT, I>,
    d: Descriptor<StorageT, I::Vertex>,
) where
    StorageT: 'static + Debug + Hash + PrimInt + Unsigned,
    usize: AsPrimitive<StorageT>,
    I: InputGraph<StorageT>,
{
    let rsm = pc.rsm;
    let Descriptor {
        stidx,
        gss,
        pos,
        sppf: prefix,
    } = d;
    let edges = pc.input.edges_from(pos).collect::<Vec<_>>();
    log::trace!("Recovering {:?} with {} input edges", d, edges.len());

    let skip_cost = u32::from(pc.skip_cost);
    for e in &edges {
        if let Some(tidx) = e.term() {
            pc.recovery_edges
                .add_recovery_edge(pos, e.head(), None, skip_cost);
            let leaf = pc
                .sppf
                .skipped_node(tidx, pos, e.head(), skip_cost, e.span());
            let p = pc.sppf.get_node_p(rsm, stidx, prefix, leaf);
            pc.push(Descriptor {
                stidx,
                gss,
                pos: e.head(),
                sppf: Some(p),
            });
        }
    }

    for (&tidx, tgts) in rsm.term_edges(stidx) {
        if edges.iter().any(|e| e.term() == Some(tidx)) {
            continue;
        }
        let cost = u32::from((pc.term_costs)(tidx));
        pc.recovery_edges
            .add_recovery_edge(pos, pos, Some(tidx), cost);
        let leaf = pc.sppf.inserted_node(tidx, pos, cost);
        for &tgt in tgts {
            let p = pc.sppf.get_node_p(rsm, tgt, prefix, leaf);
            pc.push(Descriptor {
                stidx: tgt,
                gss,
                pos,
                sppf: Some(p),
            });
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use rsmgrammar::{Rsm, TIdx};

    use super::*;
    use crate::{
        Forest, LinearInput, ParseRepair, RTParserBuilder, RecoveryKind,
        sppf::{SppfIdx, SppfNodeKind},
        test_utils::{do_parse, rsm_from_rules},
    };

    const CALC_LEX: &str = "\\+ '+'
                            \\* '*'
                            \\( '('
                            \\) ')'
                            [0-9]+ 'INT'";
    const CALC_RULES: &str = "
        E -> E '+' T | T
        T -> T '*' F | F
        F -> '(' E ')' | 'INT'
    ";

    /// Return the positions of every recovery leaf reachable from the root using only packed
    /// nodes which are as cheap as the node they belong to.
    fn minimal_repair_positions(f: &Forest<u16, usize>) -> HashSet<usize> {
        let sppf = f.sppf();
        let mut seen = HashSet::new();
        let mut found = HashSet::new();
        let mut st = vec![f.root()];
        while let Some(idx) = st.pop() {
            if !seen.insert(idx) {
                continue;
            }
            let n = sppf.node(idx);
            match n.kind() {
                SppfNodeKind::Inserted(_) | SppfNodeKind::Skipped(_) => {
                    found.insert(n.lext());
                }
                SppfNodeKind::Symbol(_) | SppfNodeKind::Intermediate(_) => {
                    st.extend(
                        n.packed()
                            .iter()
                            .filter(|p: &&SppfIdx| sppf.weight(**p) == n.weight()),
                    );
                }
                SppfNodeKind::Packed { left, right, .. } => {
                    st.extend(left);
                    st.push(right);
                }
                _ => (),
            }
        }
        found
    }

    fn reparse(rules: &str, f: &Forest<u16, usize>) {
        let rsm = rsm_from_rules(rules);
        let input = LinearInput::new(f.tree().tokens());
        let f2 = RTParserBuilder::new(&rsm)
            .recoverer(RecoveryKind::None)
            .parse(&input)
            .unwrap();
        assert_eq!(f2.weight(), 0);
    }

    #[test]
    fn missing_terminal() {
        let lexs = "[a-z]+ 'ID'
                    = '='
                    [0-9]+ 'INT'
                    ; ';'";
        let rules = "Stmts -> Stmt Stmts | Stmt
                     Stmt -> 'ID' '=' 'INT' ';'";
        let (rsm, r) = do_parse(RecoveryKind::Weighted, lexs, rules, "x = 1 y = 2;");
        let f = r.unwrap();
        assert_eq!(f.weight(), 1);
        assert_eq!(
            f.repairs(),
            vec![ParseRepair::Insert {
                tidx: rsm.term_idx(";").unwrap(),
                at: 3
            }]
        );
        assert!(f.recovery_edges().len() > 0);
        assert_eq!(
            f.tree().pp(&rsm, "x = 1 y = 2;"),
            "Stmts
 Stmt
  ID x
  = =
  INT 1
  ; <inserted>
 Stmts
  Stmt
   ID y
   = =
   INT 2
   ; ;
"
        );
        reparse(rules, &f);
    }

    #[test]
    fn extra_terminal() {
        let (rsm, r) = do_parse(RecoveryKind::Weighted, CALC_LEX, CALC_RULES, "1+*3");
        let f = r.unwrap();
        assert_eq!(f.weight(), 1);
        assert_eq!(f.repairs().len(), 1);
        // Skipping the '*' or inserting an INT before it are among the cheapest repairs.
        assert!(minimal_repair_positions(&f).contains(&2));
        assert!(f.tree().pp(&rsm, "1+*3").contains("INT 3"));
        reparse(CALC_RULES, &f);
    }

    #[test]
    fn trailing_input() {
        let (rsm, r) = do_parse(RecoveryKind::Weighted, CALC_LEX, CALC_RULES, "1 2");
        let f = r.unwrap();
        assert_eq!(f.weight(), 1);
        assert_eq!(f.repairs().len(), 1);
        reparse(CALC_RULES, &f);
        // Skipping the ')' and inserting a '(' before the '1' or the '2' all cost 1.
        let (_, r) = do_parse(RecoveryKind::Weighted, CALC_LEX, CALC_RULES, "1+2)");
        let f = r.unwrap();
        assert_eq!(f.weight(), 1);
        match f.repairs()[..] {
            [ParseRepair::Skip { tidx, from, to }] => {
                assert_eq!(tidx, rsm.term_idx(")").unwrap());
                assert_eq!((from, to), (3, 4));
            }
            [ParseRepair::Insert { tidx, at }] => {
                assert_eq!(tidx, rsm.term_idx("(").unwrap());
                assert!(at == 0 || at == 2);
            }
            _ => panic!("{:?}", f.repairs()),
        }
        assert!(minimal_repair_positions(&f).contains(&3));
        reparse(CALC_RULES, &f);
    }

    #[test]
    fn empty_input() {
        let lexs = "a 'a'";
        let (rsm, r) = do_parse(RecoveryKind::Weighted, lexs, "S -> 'a'", "");
        let f = r.unwrap();
        assert_eq!(f.weight(), 1);
        assert_eq!(
            f.repairs(),
            vec![ParseRepair::Insert {
                tidx: rsm.term_idx("a").unwrap(),
                at: 0
            }]
        );
        let (_, r) = do_parse(RecoveryKind::Weighted, lexs, "S -> 'a' S | 'a'", "");
        assert_eq!(r.unwrap().weight(), 1);
    }

    #[test]
    fn dyck() {
        let lexs = "\\( '('
                    \\) ')'";
        let rules = "S -> '(' S ')' S |";
        for (input, weight) in [
            ("", 0),
            ("()", 0),
            ("()()", 0),
            ("()(())", 0),
            ("(()())", 0),
            ("(", 1),
            (")", 1),
            ("(()", 1),
            ("(()()", 1),
            ("))", 2),
        ] {
            let (_, r) = do_parse(RecoveryKind::Weighted, lexs, rules, input);
            let f = r.unwrap();
            assert_eq!(f.weight(), weight, "{}", input);
            assert_eq!(f.repairs().len(), weight as usize, "{}", input);
            reparse(rules, &f);
        }
    }

    #[test]
    fn term_costs() {
        let lexs = "a 'a'
                    b 'b'
                    c 'c'";
        let rules = "S -> 'a' 'b' 'c'";
        let rsm = rsm_from_rules(rules);
        let (a, b, c) = (
            rsm.term_idx("a").unwrap(),
            rsm.term_idx("b").unwrap(),
            rsm.term_idx("c").unwrap(),
        );
        let (_, r) = do_parse(RecoveryKind::Weighted, lexs, rules, "a c");
        assert_eq!(
            r.unwrap().repairs(),
            vec![ParseRepair::Insert { tidx: b, at: 1 }]
        );
        // Every repair of "a c" must insert a 'b', so its cost dominates the weight.
        let input = LinearInput::new(vec![a, c]);
        let costs = move |t: TIdx<u16>| if t == b { 5 } else { 1 };
        let f = RTParserBuilder::new(&rsm)
            .term_costs(&costs)
            .parse(&input)
            .unwrap();
        assert_eq!(f.weight(), 5);
        assert_eq!(f.repairs(), vec![ParseRepair::Insert { tidx: b, at: 1 }]);
        // Skipping the 'c' and inserting both 'b' and 'c' costs more than inserting 'b' alone.
        let f = RTParserBuilder::new(&rsm)
            .term_costs(&|t: TIdx<u16>| if t == b { 9 } else { 1 })
            .skip_cost(2)
            .parse(&input)
            .unwrap();
        assert_eq!(f.weight(), 9);
    }

    #[test]
    fn repairs_after_matched_input() {
        let lexs = "a 'a'
                    b 'b'
                    c 'c'
                    d 'd'";
        // The 'b' matches the first alternative, but inserting a 'c' before it is cheaper than
        // completing that alternative.
        let rules = "S -> 'a' 'b' 'd' 'd' 'd' | 'a' 'c' 'b'";
        let (rsm, r) = do_parse(RecoveryKind::Weighted, lexs, rules, "a b");
        let f = r.unwrap();
        assert_eq!(f.weight(), 1);
        assert_eq!(
            f.repairs(),
            vec![ParseRepair::Insert {
                tidx: rsm.term_idx("c").unwrap(),
                at: 1
            }]
        );
        reparse(rules, &f);

        // The 'a' matches, but skipping it is cheaper than completing its alternative.
        let lexs = "a 'a'
                    b 'b'
                    x 'x'";
        let rules = "S -> 'a' 'x' 'x' 'x' | 'b'";
        let (rsm, r) = do_parse(RecoveryKind::Weighted, lexs, rules, "a b");
        let f = r.unwrap();
        assert_eq!(f.weight(), 1);
        assert_eq!(
            f.repairs(),
            vec![ParseRepair::Skip {
                tidx: rsm.term_idx("a").unwrap(),
                from: 0,
                to: 1
            }]
        );
        assert_eq!(f.tree().pp(&rsm, "a b"), "S\n <skipped a a>\n b b\n");
    }

    /// Return the fewest single terminal insertions and deletions which turn `toks` into a
    /// sentence of `rsm`, or `None` if more than `max` are needed.
    fn min_edit_cost(rsm: &Rsm<u16>, toks: &[TIdx<u16>], max: u32) -> Option<u32> {
        let terms = rsm.iter_tidxs().collect::<Vec<_>>();
        let mut seen = HashSet::new();
        seen.insert(toks.to_vec());
        let mut level = vec![toks.to_vec()];
        for cost in 0..=max {
            for s in &level {
                let input = LinearInput::new(s.clone());
                if RTParserBuilder::new(rsm)
                    .recoverer(RecoveryKind::None)
                    .parse(&input)
                    .is_ok()
                {
                    return Some(cost);
                }
            }
            let mut next = Vec::new();
            for s in &level {
                for i in 0..=s.len() {
                    if i < s.len() {
                        let mut t = s.clone();
                        t.remove(i);
                        if seen.insert(t.clone()) {
                            next.push(t);
                        }
                    }
                    for &tidx in &terms {
                        let mut t = s.clone();
                        t.insert(i, tidx);
                        if seen.insert(t.clone()) {
                            next.push(t);
                        }
                    }
                }
            }
            level = next;
        }
        None
    }

    #[test]
    fn weight_is_minimal_edit_cost() {
        for (rules, inputs) in [
            (
                "S -> 'a' 'b' 'd' 'd' 'd' | 'a' 'c' 'b'",
                &["", "a", "b", "ab", "abd", "acbd", "cb", "bdd", "abdd", "aab"][..],
            ),
            (
                "S -> 'a' 'x' 'x' 'x' | 'b'",
                &["", "a", "ab", "ba", "axb", "xxx", "bb", "axx"][..],
            ),
            (
                "S -> 'a' 'b' C | 'a' 'c' D
                 C -> 'c' 'c'
                 D -> 'd'",
                &["", "a", "ac", "abd", "acc", "abcd", "bcc", "ad", "acdd", "dca"][..],
            ),
            (
                "S -> 'a' S 'b' | 'a' 'c' | 'c' S",
                &["", "ab", "acb", "aacb", "ccc", "cacbb", "b", "abc"][..],
            ),
        ] {
            let rsm = rsm_from_rules(rules);
            for input in inputs {
                let toks = input
                    .chars()
                    .map(|c| rsm.term_idx(&c.to_string()).unwrap())
                    .collect::<Vec<_>>();
                let f = RTParserBuilder::new(&rsm)
                    .parse(&LinearInput::new(toks.clone()))
                    .unwrap();
                match min_edit_cost(&rsm, &toks, 3) {
                    Some(cost) => assert_eq!(f.weight(), cost, "{} on {:?}", rules, input),
                    None => assert!(f.weight() > 3, "{} on {:?}", rules, input),
                }
                assert_eq!(f.repairs().len(), f.weight() as usize);
            }
        }
    }

    #[test]
    fn graph_recovery() {
        let rsm = rsm_from_rules("S -> 'a' 'b'");
        let a = rsm.term_idx("a").unwrap();
        let mut g = crate::GraphInput::new();
        let vs = (0..3).map(|_| g.add_vertex()).collect::<Vec<_>>();
        g.add_edge(vs[0], Some(a), vs[1]);
        g.add_edge(vs[1], Some(a), vs[2]);
        g.add_start(vs[0]);
        g.add_final(vs[2]);
        let f = RTParserBuilder::new(&rsm).parse(&g).unwrap();
        assert_eq!(f.weight(), 2);
        assert_eq!(f.pairs(), vec![(0, 2, 2)]);
    }
}
