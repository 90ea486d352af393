//! This crate provides the core logic for a simulator of finite automata (DFA and NFA),
//! pushdown automata and Turing machines.
//! It includes modules for parsing machine definitions, validating them, running them
//! against input strings, stepping finite automata interactively, and a catalog of
//! built-in machines.

pub mod analyzer;
pub mod driver;
pub mod encoder;
pub mod engine;
pub mod loader;
pub mod machine;
pub mod parser;
pub mod programs;
mod saturation;
pub mod types;

/// Re-exports the `Rule` enum from the parser module, used by the `pest` grammar.
pub use crate::parser::Rule;
/// Re-exports the reachability check and `AnalysisError` from the analyzer module.
pub use analyzer::{unreachable_states, AnalysisError};
/// Re-exports the interactive `Driver`.
pub use driver::Driver;
pub use encoder::encode;
/// Re-exports the execution entry points and their options and results.
pub use engine::{execute, run, Execution, Limits, Options, Snapshot};
pub use loader::DefinitionLoader;
pub use machine::{Configuration, Halt, Move, Step, Tape, TuringMachine};
pub use parser::parse;
pub use programs::{Program, ProgramInfo, ProgramManager, PROGRAMS};
/// Re-exports the definition model, verdicts and the crate error type.
pub use types::{
    Acceptance, AutomatonError, Definition, Direction, Kind, Rejection, Rules, Undecided,
    Verdict,
};
