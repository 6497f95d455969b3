use regex::Regex;
use rsmgrammar::{Rsm, RsmBuilder, TIdx};

use crate::{Forest, LinearInput, ParseError, RTParserBuilder, RecoveryKind, Span};

/// Build an RSM from rules of the form `A -> 'x' B | C` (one nonterminal per line; an empty
/// alternative is an empty rule). The first rule's nonterminal is the start nonterminal.
pub(crate) fn rsm_from_rules(rules: &str) -> Rsm<u16> {
    let mut b = RsmBuilder::new();
    for l in rules.lines().map(|x| x.trim()).filter(|x| !x.is_empty()) {
        let (lhs, rhs) = l.split_once("->").unwrap();
        for alt in rhs.split('|') {
            b = b.rule(lhs.trim(), &alt.split_whitespace().collect::<Vec<_>>());
        }
    }
    b.build().unwrap()
}

// A highly simplified lexer. Each line has the form `regex 'NAME'` where `NAME` is one of the
// RSM's terminals. Whitespace between lexemes is skipped and the longest match wins.
pub(crate) fn small_lexer(lexs: &str, rsm: &Rsm<u16>) -> Vec<(TIdx<u16>, Regex)> {
    let mut rules = Vec::new();
    for l in lexs.split('\n').map(|x| x.trim()).filter(|x| !x.is_empty()) {
        assert!(l.rfind('\'') == Some(l.len() - 1));
        let i = l[..l.len() - 1].rfind('\'').unwrap();
        let name = &l[i + 1..l.len() - 1];
        let re = &l[..i - 1].trim();
        rules.push((
            rsm.term_idx(name).unwrap(),
            Regex::new(&format!("\\A(?:{})", re)).unwrap(),
        ));
    }
    rules
}

pub(crate) fn small_lex(rules: Vec<(TIdx<u16>, Regex)>, input: &str) -> Vec<(TIdx<u16>, Span)> {
    let mut lexemes = vec![];
    let mut i = 0;
    while i < input.len() {
        if input[i..].starts_with(char::is_whitespace) {
            i += 1;
            continue;
        }
        let mut longest = 0; // Length of the longest match
        let mut longest_tidx = None;
        for (tidx, r) in rules.iter() {
            if let Some(m) = r.find(&input[i..]) {
                let len = m.end();
                if len > longest {
                    longest = len;
                    longest_tidx = Some(*tidx);
                }
            }
        }
        assert!(longest > 0);
        lexemes.push((longest_tidx.unwrap(), Span::new(i, i + longest)));
        i += longest;
    }
    lexemes
}

pub(crate) fn do_parse(
    rk: RecoveryKind,
    lexs: &str,
    rules: &str,
    input: &str,
) -> (Rsm<u16>, Result<Forest<u16, usize>, ParseError>) {
    let rsm = rsm_from_rules(rules);
    let lexemes = small_lex(small_lexer(lexs, &rsm), input);
    let input = LinearInput::from_lexemes(lexemes);
    let r = RTParserBuilder::new(&rsm).recoverer(rk).parse(&input);
    (rsm, r)
}
