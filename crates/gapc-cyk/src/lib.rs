//! Generation of the bottom-up (CYK) table-filling procedure for algebraic
//! dynamic programming grammars.
//!
//! Given the analyzed facts of a grammar (tracks, tabulated non-terminals,
//! table dimensions and evaluation order), this crate emits a `cyk()`
//! procedure that evaluates every tabulated non-terminal over every cell of
//! its DP table, each cell only after all cells it depends on.
//!
//! ## Examples
//!
//! ```rust
//! use gapc_cyk::{Builtins, GrammarModel, NonTerminal, Printer, TableDims};
//!
//! let model = GrammarModel::new("struct", 1)
//!     .with_nonterminal(NonTerminal::new("struct", vec![TableDims::QUADRATIC]));
//! let builtins = Builtins::new();
//!
//! let procedure = gapc_cyk::generate(&model, &builtins).unwrap();
//! let code = Printer::new(None).print(&procedure);
//! assert!(code.contains("nt_tabulate_struct(t_0_i - 1, t_0_j);"));
//! ```
//!
//! Generated procedures can be executed with the reference evaluator to
//! inspect the cells they visit:
//!
//! ```rust
//! use gapc_cyk::{Builtins, EvalOptions, GrammarModel, NonTerminal, TableDims};
//!
//! let model = GrammarModel::new("struct", 1)
//!     .with_nonterminal(NonTerminal::new("struct", vec![TableDims::QUADRATIC]));
//! let builtins = Builtins::new();
//! let procedure = gapc_cyk::generate(&model, &builtins).unwrap();
//!
//! let options = EvalOptions::for_model(&model, &[3]).unwrap();
//! let calls = gapc_cyk::collect_calls(&procedure, &builtins, &options).unwrap();
//! assert_eq!(calls.len(), 10);
//! ```
mod arena;
pub mod ast;
mod builtin;
mod cyk;
mod error;
pub mod eval;
mod model;
mod printer;

pub use arena::{Arena, ArenaId};
pub use ast::{Procedure, StmtPool};
pub use builtin::Builtins;
pub use cyk::{TraversalMode, generate, inject_calls, skeleton};
pub use error::{CykError, ModelError};
pub use eval::{EvalError, EvalOptions, EvalStats, NtCall, WorkShare, collect_calls, eval_procedure};
pub use model::{
    Axiom, CykOptions, GrammarModel, NonTerminal, Parallel, RunningIndices, Side, TableDims,
    TableIndex,
};
pub use printer::{Printer, PrinterConfig};
