//! This module is the catalog of built-in definitions embedded from `machines/`.

use crate::parser::parse;
use crate::types::{Definition, Kind};
use tracing::warn;

/// Embedded definitions: name, kind and text.
const MACHINE_TEXTS: [(&str, Kind, &str); 6] = [
    (
        "zero-one",
        Kind::Pda,
        include_str!("../machines/zero-one.pda"),
    ),
    ("zero-one", Kind::Tm, include_str!("../machines/zero-one.tm")),
    (
        "more-a-than-b",
        Kind::Pda,
        include_str!("../machines/more-a-than-b.pda"),
    ),
    (
        "even-zeros",
        Kind::Dfa,
        include_str!("../machines/even-zeros.dfa"),
    ),
    (
        "ends-with-ab",
        Kind::Nfa,
        include_str!("../machines/ends-with-ab.nfa"),
    ),
    (
        "balanced",
        Kind::Pda,
        include_str!("../machines/balanced.pda"),
    ),
];

/// A built-in definition together with the text it was parsed from.
#[derive(Debug, Clone)]
pub struct Program {
    pub name: &'static str,
    pub kind: Kind,
    pub text: &'static str,
    pub definition: Definition,
}

/// Summary of a catalog entry, for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramInfo {
    pub name: &'static str,
    pub kind: Kind,
    pub state_count: usize,
    pub transition_count: usize,
}

lazy_static::lazy_static! {
    pub static ref PROGRAMS: Vec<Program> = MACHINE_TEXTS
        .iter()
        .filter_map(|&(name, kind, text)| match parse(text, kind) {
            Ok(definition) => Some(Program {
                name,
                kind,
                text,
                definition,
            }),
            Err(e) => {
                warn!(name, %kind, error = %e, "failed to parse built-in definition");
                None
            }
        })
        .collect();
}

pub struct ProgramManager;

impl ProgramManager {
    /// Get the number of available programs
    pub fn count() -> usize {
        PROGRAMS.len()
    }

    /// Get a program by name and kind
    pub fn get(name: &str, kind: Kind) -> Option<&'static Program> {
        PROGRAMS.iter().find(|p| p.name == name && p.kind == kind)
    }

    /// Get every program with the given name, whatever its kind
    pub fn find(name: &str) -> Vec<&'static Program> {
        PROGRAMS.iter().filter(|p| p.name == name).collect()
    }

    /// List all program names, without repeats
    pub fn names() -> Vec<&'static str> {
        let mut names: Vec<&'static str> = PROGRAMS.iter().map(|p| p.name).collect();
        names.dedup();
        names
    }

    pub fn list() -> Vec<ProgramInfo> {
        PROGRAMS
            .iter()
            .map(|p| ProgramInfo {
                name: p.name,
                kind: p.kind,
                state_count: p.definition.states().len(),
                transition_count: p.definition.transition_count(),
            })
            .collect()
    }
}
