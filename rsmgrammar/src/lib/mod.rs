#![allow(clippy::new_without_default)]
#![allow(clippy::type_complexity)]
#![forbid(unsafe_code)]

//! A library for manipulating recursive state machines (RSMs): the grammar representation
//! consumed by the `gllpar` parser.
//!
//! An RSM has one automaton per nonterminal. Each automaton has an entry state and a set of
//! final states; its edges are labelled either with a terminal (which must be matched against
//! the input) or with a nonterminal (which calls that nonterminal's automaton). RSMs can be built
//! from BNF-style rules with [`RsmBuilder`](struct.RsmBuilder.html) or read from a simple text
//! format with [`Rsm::from_txt`](struct.Rsm.html#method.from_txt).
//!
//! The `StorageT` type parameter used throughout this crate determines the size of state,
//! nonterminal, and terminal indices. The default, `u32`, is big enough for any realistic
//! grammar; smaller types save memory for large parse forests.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod analysis;
mod idxnewtype;
mod rsm;
mod txt;

pub use crate::{
    idxnewtype::{NIdx, StIdx, TIdx},
    rsm::{Rsm, RsmBuilder, RsmError, RsmErrorKind},
};

/// A grammar symbol: either a call to a nonterminal or a terminal.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Symbol<StorageT> {
    Nonterm(NIdx<StorageT>),
    Term(TIdx<StorageT>),
}
