//! This module defines the core data structures shared by the parser, the machine model and the
//! execution engine: machine kinds, transition keys and targets, the transition table, the
//! immutable `Definition`, execution verdicts and the crate error type.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use thiserror::Error;

/// Tokens accepted in definition text for the epsilon symbol.
pub const EPSILON_MARKERS: [&str; 3] = ["ε", "eps", "epsilon"];
/// Tokens accepted in Turing machine transitions for the blank symbol.
pub const BLANK_MARKERS: [&str; 2] = ["_", "blank"];
/// The default blank symbol of a Turing machine tape.
pub const DEFAULT_BLANK_SYMBOL: char = '_';
/// The default bottom-of-stack marker of a pushdown automaton.
pub const DEFAULT_STACK_BOTTOM: char = '$';
/// The file name reported for definitions that were not read from a file.
pub const INLINE_SOURCE: &str = "<input>";

/// The closed set of machine kinds the engine can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// Deterministic finite automaton.
    Dfa,
    /// Nondeterministic finite automaton with epsilon moves.
    Nfa,
    /// Nondeterministic pushdown automaton.
    Pda,
    /// Deterministic single-tape Turing machine.
    Tm,
}

impl Kind {
    /// Infers the machine kind from a definition file extension.
    pub fn from_extension(extension: &str) -> Option<Kind> {
        extension.parse().ok()
    }

    /// Returns `true` for the two finite automaton kinds.
    pub fn is_finite(&self) -> bool {
        matches!(self, Kind::Dfa | Kind::Nfa)
    }

    /// The lowercase name used on the command line and as a file extension.
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Dfa => "dfa",
            Kind::Nfa => "nfa",
            Kind::Pda => "pda",
            Kind::Tm => "tm",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

impl FromStr for Kind {
    type Err = AutomatonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dfa" => Ok(Kind::Dfa),
            "nfa" => Ok(Kind::Nfa),
            "pda" => Ok(Kind::Pda),
            "tm" | "turing" => Ok(Kind::Tm),
            _ => Err(AutomatonError::UnknownKind(s.to_string())),
        }
    }
}

/// Direction of a Turing machine head move. There is no stay move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Move the head one cell to the left.
    Left,
    /// Move the head one cell to the right.
    Right,
}

impl Direction {
    /// The signed offset applied to the head position.
    pub fn offset(&self) -> i64 {
        match self {
            Direction::Left => -1,
            Direction::Right => 1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Left => write!(f, "L"),
            Direction::Right => write!(f, "R"),
        }
    }
}

/// Acceptance convention of a pushdown automaton.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Acceptance {
    /// Accept when the input is consumed in an accepting state, whatever the stack holds.
    #[default]
    FinalState,
    /// Accept when the input is consumed and nothing but the bottom marker is left.
    EmptyStack,
}

/// Key of a finite automaton transition. `symbol == None` is an epsilon move.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FiniteKey {
    pub state: String,
    pub symbol: Option<char>,
}

/// Key of a pushdown transition.
///
/// `input == None` reads nothing; `top == None` ignores the stack (no check, no pop).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PushdownKey {
    pub state: String,
    pub input: Option<char>,
    pub top: Option<char>,
}

/// Target of a pushdown transition.
///
/// `push` is listed top first: after the move `push[0]` is the new stack top.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PushdownTarget {
    pub state: String,
    pub push: Vec<char>,
}

/// Key of a Turing machine transition: the current state and the symbol under the head.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TuringKey {
    pub state: String,
    pub read: char,
}

/// Target of a Turing machine transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TuringTarget {
    pub state: String,
    pub write: char,
    pub direction: Direction,
}

/// A transition relation that keeps declaration order.
///
/// One key may map to several targets; lookups return them in the order they were declared.
#[derive(Debug, Clone)]
pub struct TransitionTable<K, T> {
    entries: Vec<(K, T)>,
    index: HashMap<K, Vec<usize>>,
}

impl<K, T> Default for TransitionTable<K, T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<K: Clone + Eq + Hash, T: PartialEq> TransitionTable<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a transition. Returns `false` when the identical transition is already present.
    pub fn insert(&mut self, key: K, target: T) -> bool {
        let slots = self.index.entry(key.clone()).or_default();
        if slots.iter().any(|&i| self.entries[i].1 == target) {
            return false;
        }

        slots.push(self.entries.len());
        self.entries.push((key, target));
        true
    }

    /// Returns the targets declared for `key`, in declaration order.
    pub fn get<'a>(&'a self, key: &K) -> impl Iterator<Item = &'a T> + 'a {
        self.index
            .get(key)
            .into_iter()
            .flatten()
            .map(move |&i| &self.entries[i].1)
    }

    /// Returns `true` when at least one target is declared for `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Iterates over every transition in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &T)> {
        self.entries.iter().map(|(k, t)| (k, t))
    }

    /// The number of transitions (not keys).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Pushdown-specific part of a definition.
#[derive(Debug, Clone)]
pub struct Pushdown {
    pub transitions: TransitionTable<PushdownKey, PushdownTarget>,
    pub stack_alphabet: BTreeSet<char>,
    pub bottom: char,
    pub acceptance: Acceptance,
}

/// Turing-machine-specific part of a definition.
#[derive(Debug, Clone)]
pub struct Turing {
    pub transitions: TransitionTable<TuringKey, TuringTarget>,
    pub tape_alphabet: BTreeSet<char>,
    pub blank: char,
    pub reject: BTreeSet<String>,
}

/// The transition relation of a definition, one variant per family of machine.
#[derive(Debug, Clone)]
pub enum Rules {
    /// DFA and NFA transitions.
    Finite(TransitionTable<FiniteKey, String>),
    Pushdown(Pushdown),
    Turing(Turing),
}

/// An immutable machine definition, built once by the parser and shared by every run.
#[derive(Debug, Clone)]
pub struct Definition {
    pub(crate) name: String,
    pub(crate) kind: Kind,
    pub(crate) states: Vec<String>,
    pub(crate) alphabet: BTreeSet<char>,
    pub(crate) start: String,
    pub(crate) accept: BTreeSet<String>,
    pub(crate) rules: Rules,
}

impl Definition {
    /// The display name, taken from the `$Name` section or empty.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// States in declaration order.
    pub fn states(&self) -> &[String] {
        &self.states
    }

    /// The input alphabet.
    pub fn alphabet(&self) -> &BTreeSet<char> {
        &self.alphabet
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn accept(&self) -> &BTreeSet<String> {
        &self.accept
    }

    pub fn is_accepting(&self, state: &str) -> bool {
        self.accept.contains(state)
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    /// The number of declared transitions, epsilon moves included.
    pub fn transition_count(&self) -> usize {
        match &self.rules {
            Rules::Finite(table) => table.len(),
            Rules::Pushdown(pda) => pda.transitions.len(),
            Rules::Turing(tm) => tm.transitions.len(),
        }
    }
}

/// Why a run did not accept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// The input contains a symbol outside the alphabet.
    InvalidSymbol { symbol: char, position: usize },
    /// A deterministic machine had no transition for its current state and symbol.
    NoMove {
        state: String,
        symbol: Option<char>,
        position: usize,
    },
    /// Every branch of a nondeterministic finite automaton died before the input ended.
    Stuck { position: usize },
    /// The input was consumed (or the machine halted) outside the accepting states.
    NotAccepting { states: Vec<String> },
    /// A Turing machine halted in one of its rejecting states.
    RejectState { state: String },
    /// A Turing machine had no transition for its state and the symbol under the head.
    Halted { state: String, symbol: char },
    /// No accepting pushdown configuration is reachable. `explored` counts the reachability
    /// transitions derived before that was settled.
    Exhausted { explored: usize },
}

/// Which caller-imposed cap stopped an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Undecided {
    StepLimit(usize),
    ConfigurationLimit(usize),
}

/// The outcome of running a definition against an input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    Rejected(Rejection),
    Undecided(Undecided),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Verdict::Rejected(_))
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Accepted => write!(f, "ACCEPTED"),
            Verdict::Rejected(rejection) => write!(f, "REJECTED ({rejection})"),
            Verdict::Undecided(undecided) => write!(f, "UNDECIDED ({undecided})"),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::InvalidSymbol { symbol, position } => {
                write!(f, "invalid symbol '{symbol}' at position {position}")
            }
            Rejection::NoMove {
                state,
                symbol: Some(symbol),
                position,
            } => write!(
                f,
                "no transition from '{state}' on '{symbol}' at position {position}"
            ),
            Rejection::NoMove {
                state, position, ..
            } => write!(f, "no transition from '{state}' at position {position}"),
            Rejection::Stuck { position } => {
                write!(f, "no valid transitions at position {position}")
            }
            Rejection::NotAccepting { states } => {
                write!(f, "final state(s): {}", states.join(", "))
            }
            Rejection::RejectState { state } => write!(f, "halted in reject state '{state}'"),
            Rejection::Halted { state, symbol } => {
                write!(f, "halted in '{state}' with no transition on '{symbol}'")
            }
            Rejection::Exhausted { explored } => write!(
                f,
                "no accepting configuration is reachable ({explored} transitions derived)"
            ),
        }
    }
}

impl fmt::Display for Undecided {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Undecided::StepLimit(n) => write!(f, "no verdict after {n} steps"),
            Undecided::ConfigurationLimit(n) => {
                write!(f, "no verdict after deriving {n} pushdown transitions")
            }
        }
    }
}

/// Represents the errors raised while building or driving machines.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AutomatonError {
    /// The definition text is structurally invalid. `line == 0` refers to the whole text.
    #[error("{}", located(.file, .line, .message))]
    MalformedDefinition {
        file: String,
        line: usize,
        message: String,
    },
    /// Indicates an error related to file system operations.
    #[error("File error: {0}")]
    FileError(String),
    /// The requested operation is not available for this machine kind.
    #[error("{kind} machines do not support {operation}")]
    UnsupportedKind { kind: Kind, operation: &'static str },
    /// The machine kind name is not recognised.
    #[error("Unknown machine kind '{0}' (expected dfa, nfa, pda or tm)")]
    UnknownKind(String),
}

impl AutomatonError {
    /// Creates a `MalformedDefinition` error for a definition that was not read from a file.
    pub fn malformed(line: usize, message: impl Into<String>) -> Self {
        AutomatonError::MalformedDefinition {
            file: INLINE_SOURCE.to_string(),
            line,
            message: message.into(),
        }
    }

    /// Attributes a `MalformedDefinition` error to `file`. Other variants pass through.
    pub fn in_file(self, path: &str) -> Self {
        match self {
            AutomatonError::MalformedDefinition { line, message, .. } => {
                AutomatonError::MalformedDefinition {
                    file: path.to_string(),
                    line,
                    message,
                }
            }
            other => other,
        }
    }
}

fn located(file: &str, line: &usize, message: &str) -> String {
    if *line == 0 {
        format!("{file}: {message}")
    } else {
        format!("{file}:{line}: {message}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_serialization() {
        let left_json = serde_json::to_string(&Direction::Left).unwrap();
        let right_json = serde_json::to_string(&Direction::Right).unwrap();

        assert_eq!(left_json, "\"Left\"");
        assert_eq!(right_json, "\"Right\"");

        let left: Direction = serde_json::from_str(&left_json).unwrap();
        assert_eq!(left, Direction::Left);
    }

    #[test]
    fn test_verdict_serialization() {
        let verdict = Verdict::Rejected(Rejection::InvalidSymbol {
            symbol: 'x',
            position: 2,
        });

        let json = serde_json::to_string(&verdict).unwrap();
        assert_eq!(
            json,
            r#"{"rejected":{"invalid_symbol":{"symbol":"x","position":2}}}"#
        );
        assert_eq!(serde_json::to_string(&Verdict::Accepted).unwrap(), "\"accepted\"");
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("DFA".parse::<Kind>().unwrap(), Kind::Dfa);
        assert_eq!("turing".parse::<Kind>().unwrap(), Kind::Tm);
        assert_eq!(Kind::from_extension("pda"), Some(Kind::Pda));
        assert_eq!(Kind::from_extension("txt"), None);
        assert!(matches!(
            "lba".parse::<Kind>(),
            Err(AutomatonError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_table_keeps_declaration_order() {
        let mut table = TransitionTable::new();
        let key = FiniteKey {
            state: "q0".into(),
            symbol: Some('a'),
        };

        assert!(table.insert(key.clone(), "q2".to_string()));
        assert!(table.insert(key.clone(), "q1".to_string()));
        assert!(!table.insert(key.clone(), "q2".to_string()));

        let targets: Vec<_> = table.get(&key).cloned().collect();
        assert_eq!(targets, vec!["q2", "q1"]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_error_display() {
        let error = AutomatonError::malformed(4, "expected 3 fields").in_file("m.dfa");
        assert_eq!(error.to_string(), "m.dfa:4: expected 3 fields");

        let error = AutomatonError::malformed(0, "missing $States section");
        assert_eq!(error.to_string(), "<input>: missing $States section");
    }
}
