#![allow(clippy::new_without_default)]
#![allow(clippy::type_complexity)]
#![allow(clippy::len_without_is_empty)]
#![forbid(unsafe_code)]

//! `gllpar` is a generalised LL (GLL) parser for grammars represented as recursive state machines
//! (see the [rsmgrammar] crate). It accepts any context-free grammar, including ambiguous and
//! left-recursive ones, and parses inputs which are arbitrary directed graphs of terminals, of
//! which a token stream is the simplest case.
//!
//! Every derivation found is recorded in a shared packed parse forest (SPPF). If the input has
//! no derivation, the parser repairs it by inserting and skipping terminals. Each repair has a
//! cost and the parser returns a derivation of minimal total cost.
//!
//! ```rust
//! use gllpar::{LinearInput, RTParserBuilder};
//! use rsmgrammar::RsmBuilder;
//!
//! let rsm = RsmBuilder::new()
//!     .rule("E", &["E", "'+'", "'x'"])
//!     .rule("E", &["'x'"])
//!     .build::<u32>()
//!     .unwrap();
//! let (x, plus) = (rsm.term_idx("x").unwrap(), rsm.term_idx("+").unwrap());
//! // "x + + x": one '+' too many.
//! let input = LinearInput::new(vec![x, plus, plus, x]);
//! let forest = RTParserBuilder::new(&rsm).parse(&input).unwrap();
//! assert_eq!(forest.weight(), 1);
//! assert_eq!(forest.repairs().len(), 1);
//! ```

mod descriptors;
mod gss;
mod input;
mod parser;
mod recovery;
mod span;
mod sppf;
#[cfg(test)]
mod test_utils;

pub use crate::{
    input::{GraphInput, InputEdge, InputGraph, LinearInput, RecoveryEdge, RecoveryEdges, Vertex},
    parser::{
        Forest, Node, ParseError, ParseErrorKind, ParseRepair, ParseStats, RTParserBuilder,
        RecoveryKind,
    },
    span::Span,
    sppf::{Sppf, SppfIdx, SppfNode, SppfNodeKind},
};
