//! This module provides functions for analyzing machine definitions to detect errors before
//! execution. This includes checks for declared states and symbols, the single start state,
//! accepting states, and conflicting transitions in deterministic machines.

use crate::parser::{Declarations, Declared, Transition};
use crate::types::{Acceptance, AutomatonError, Definition, Kind, Rules};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Represents the errors that can be found during the analysis of a definition.
///
/// Every variant carries the line it refers to; `0` stands for the definition as a whole.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum AnalysisError {
    /// No state is declared.
    NoStates,
    /// The input alphabet is empty.
    EmptyAlphabet,
    /// A state is declared twice.
    DuplicateState { state: String, line: usize, first: usize },
    /// A symbol is declared twice in the same alphabet.
    DuplicateSymbol { symbol: char, line: usize },
    /// The `$Start` section names no state.
    MissingStartState,
    /// The `$Start` section names more than one state.
    MultipleStartStates { line: usize, states: Vec<String> },
    /// A state is used but never declared in `$States`.
    UndeclaredState {
        state: String,
        line: usize,
        role: &'static str,
    },
    /// A symbol is used but missing from the relevant alphabet.
    UndeclaredSymbol {
        symbol: char,
        line: usize,
        alphabet: &'static str,
    },
    /// The machine can never accept.
    NoAcceptingStates,
    /// A Turing machine state is both accepting and rejecting.
    AcceptAndReject { state: String, line: usize },
    /// The blank symbol is part of the input alphabet.
    BlankInAlphabet { symbol: char, line: usize },
    /// A deterministic machine has two different moves for the same key.
    ConflictingTransition {
        key: String,
        line: usize,
        first: usize,
    },
}

impl AnalysisError {
    fn line(&self) -> usize {
        match self {
            AnalysisError::NoStates
            | AnalysisError::EmptyAlphabet
            | AnalysisError::MissingStartState
            | AnalysisError::NoAcceptingStates => 0,
            AnalysisError::DuplicateState { line, .. }
            | AnalysisError::DuplicateSymbol { line, .. }
            | AnalysisError::MultipleStartStates { line, .. }
            | AnalysisError::UndeclaredState { line, .. }
            | AnalysisError::UndeclaredSymbol { line, .. }
            | AnalysisError::AcceptAndReject { line, .. }
            | AnalysisError::BlankInAlphabet { line, .. }
            | AnalysisError::ConflictingTransition { line, .. } => *line,
        }
    }

    fn message(&self) -> String {
        match self {
            AnalysisError::NoStates => "no states declared".to_string(),
            AnalysisError::EmptyAlphabet => "no input symbols declared".to_string(),
            AnalysisError::DuplicateState { state, first, .. } => {
                format!("state `{state}` already declared at line {first}")
            }
            AnalysisError::DuplicateSymbol { symbol, .. } => {
                format!("symbol `{symbol}` declared twice")
            }
            AnalysisError::MissingStartState => "exactly one start state required, found none".to_string(),
            AnalysisError::MultipleStartStates { states, .. } => format!(
                "exactly one start state required, found {}: {}",
                states.len(),
                states.join(", ")
            ),
            AnalysisError::UndeclaredState { state, role, .. } => {
                format!("{role} `{state}` is not a declared state")
            }
            AnalysisError::UndeclaredSymbol {
                symbol, alphabet, ..
            } => format!("symbol `{symbol}` is not in the {alphabet} alphabet"),
            AnalysisError::NoAcceptingStates => "no accepting states declared".to_string(),
            AnalysisError::AcceptAndReject { state, .. } => {
                format!("state `{state}` is both accepting and rejecting")
            }
            AnalysisError::BlankInAlphabet { symbol, .. } => {
                format!("the blank symbol `{symbol}` cannot be an input symbol")
            }
            AnalysisError::ConflictingTransition { key, first, .. } => format!(
                "conflicting transition for {key} (first defined at line {first}); \
                 a deterministic machine allows one move per key"
            ),
        }
    }
}

impl From<AnalysisError> for AutomatonError {
    /// Converts an `AnalysisError` into a `MalformedDefinition` at the error's line.
    fn from(error: AnalysisError) -> Self {
        AutomatonError::malformed(error.line(), error.message())
    }
}

/// Analyzes parsed declarations for structural and referential errors.
///
/// The checks run in order and the first failure is returned, so a definition is either
/// entirely valid or rejected before any machine is built.
pub(crate) fn analyze(declarations: &Declarations) -> Result<(), AnalysisError> {
    let checks: [fn(&Declarations) -> Result<(), AnalysisError>; 6] = [
        check_states,
        check_alphabets,
        check_start_state,
        check_final_states,
        check_transitions,
        check_determinism,
    ];

    match checks.iter().find_map(|check| check(declarations).err()) {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Checks that states are declared, and declared once.
fn check_states(d: &Declarations) -> Result<(), AnalysisError> {
    if d.states.is_empty() {
        return Err(AnalysisError::NoStates);
    }

    let mut seen: HashMap<&str, usize> = HashMap::new();
    for state in &d.states {
        if let Some(&first) = seen.get(state.value.as_str()) {
            return Err(AnalysisError::DuplicateState {
                state: state.value.clone(),
                line: state.line,
                first,
            });
        }
        seen.insert(&state.value, state.line);
    }

    Ok(())
}

/// Checks every alphabet for duplicates, and the blank symbol against the input alphabet.
fn check_alphabets(d: &Declarations) -> Result<(), AnalysisError> {
    if d.alphabet.is_empty() {
        return Err(AnalysisError::EmptyAlphabet);
    }

    for symbols in [
        Some(&d.alphabet),
        d.stack_alphabet.as_ref(),
        d.tape_alphabet.as_ref(),
    ]
    .into_iter()
    .flatten()
    {
        check_unique_symbols(symbols)?;
    }

    if d.kind == Kind::Tm {
        if let Some(symbol) = d.alphabet.iter().find(|s| s.value == d.blank) {
            return Err(AnalysisError::BlankInAlphabet {
                symbol: symbol.value,
                line: symbol.line,
            });
        }
    }

    Ok(())
}

fn check_unique_symbols(symbols: &[Declared<char>]) -> Result<(), AnalysisError> {
    let mut seen = HashSet::new();
    for symbol in symbols {
        if !seen.insert(symbol.value) {
            return Err(AnalysisError::DuplicateSymbol {
                symbol: symbol.value,
                line: symbol.line,
            });
        }
    }
    Ok(())
}

/// Checks that exactly one start state is declared, and that it exists.
fn check_start_state(d: &Declarations) -> Result<(), AnalysisError> {
    match d.start.as_slice() {
        [] => Err(AnalysisError::MissingStartState),
        [start] => check_declared_state(d, start, "start state"),
        [_, second, ..] => Err(AnalysisError::MultipleStartStates {
            line: second.line,
            states: d.start.iter().map(|s| s.value.clone()).collect(),
        }),
    }
}

/// Checks accepting and rejecting states against the kind's acceptance rules.
fn check_final_states(d: &Declarations) -> Result<(), AnalysisError> {
    for state in &d.accept {
        check_declared_state(d, state, "accepting state")?;
    }
    for state in &d.reject {
        check_declared_state(d, state, "rejecting state")?;
        if d.accept.iter().any(|a| a.value == state.value) {
            return Err(AnalysisError::AcceptAndReject {
                state: state.value.clone(),
                line: state.line,
            });
        }
    }

    let can_accept = match d.kind {
        Kind::Dfa | Kind::Nfa => !d.accept.is_empty(),
        Kind::Pda => !d.accept.is_empty() || d.acceptance == Acceptance::EmptyStack,
        Kind::Tm => !d.accept.is_empty() || !d.reject.is_empty(),
    };
    if !can_accept {
        return Err(AnalysisError::NoAcceptingStates);
    }

    Ok(())
}

/// Checks that every transition only references declared states and symbols.
fn check_transitions(d: &Declarations) -> Result<(), AnalysisError> {
    let alphabet = d.alphabet_set();
    let stack = d.stack_set();
    let tape = d.tape_set();

    for declared in &d.transitions {
        let line = declared.line;
        let (from, to) = match &declared.value {
            Transition::Finite { key, target } => {
                check_symbol(key.symbol, Some(&alphabet), line, "input")?;
                (&key.state, target)
            }
            Transition::Pushdown { key, target } => {
                check_symbol(key.input, Some(&alphabet), line, "input")?;
                check_symbol(key.top, stack.as_ref(), line, "stack")?;
                for &symbol in &target.push {
                    check_symbol(Some(symbol), stack.as_ref(), line, "stack")?;
                }
                (&key.state, &target.state)
            }
            Transition::Turing { key, target } => {
                check_symbol(Some(key.read), tape.as_ref(), line, "tape")?;
                check_symbol(Some(target.write), tape.as_ref(), line, "tape")?;
                (&key.state, &target.state)
            }
        };

        for (state, role) in [(from, "transition source"), (to, "transition target")] {
            if !d.states.iter().any(|s| &s.value == state) {
                return Err(AnalysisError::UndeclaredState {
                    state: state.clone(),
                    line,
                    role,
                });
            }
        }
    }

    Ok(())
}

/// Checks that a DFA or a Turing machine has at most one move per key.
fn check_determinism(d: &Declarations) -> Result<(), AnalysisError> {
    let mut seen: HashMap<String, (&Transition, usize)> = HashMap::new();

    for declared in &d.transitions {
        let key = match (&declared.value, d.kind) {
            (Transition::Finite { key, .. }, Kind::Dfa) => match key.symbol {
                Some(symbol) => format!("({}, {symbol})", key.state),
                None => format!("({}, ε)", key.state),
            },
            (Transition::Turing { key, .. }, Kind::Tm) => {
                format!("({}, {})", key.state, key.read)
            }
            _ => continue,
        };

        match seen.get(&key) {
            Some((first, _)) if *first == &declared.value => {}
            Some((_, first)) => {
                return Err(AnalysisError::ConflictingTransition {
                    key,
                    line: declared.line,
                    first: *first,
                })
            }
            None => {
                seen.insert(key, (&declared.value, declared.line));
            }
        }
    }

    Ok(())
}

fn check_declared_state(
    d: &Declarations,
    state: &Declared<String>,
    role: &'static str,
) -> Result<(), AnalysisError> {
    if d.states.iter().any(|s| s.value == state.value) {
        return Ok(());
    }
    Err(AnalysisError::UndeclaredState {
        state: state.value.clone(),
        line: state.line,
        role,
    })
}

/// Checks a symbol against an alphabet. `None` symbols (epsilon) and absent alphabets pass.
fn check_symbol(
    symbol: Option<char>,
    alphabet: Option<&BTreeSet<char>>,
    line: usize,
    name: &'static str,
) -> Result<(), AnalysisError> {
    match (symbol, alphabet) {
        (Some(symbol), Some(alphabet)) if !alphabet.contains(&symbol) => {
            Err(AnalysisError::UndeclaredSymbol {
                symbol,
                line,
                alphabet: name,
            })
        }
        _ => Ok(()),
    }
}

/// Returns the states that no sequence of transitions reaches from the start state.
///
/// Symbols, stack and tape contents are ignored, so this over-approximates reachability:
/// a state reported here can never be entered by any run.
pub fn unreachable_states(definition: &Definition) -> Vec<String> {
    let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
    match definition.rules() {
        Rules::Finite(table) => {
            for (key, target) in table.iter() {
                edges.entry(&key.state).or_default().push(target);
            }
        }
        Rules::Pushdown(pda) => {
            for (key, target) in pda.transitions.iter() {
                edges.entry(&key.state).or_default().push(&target.state);
            }
        }
        Rules::Turing(tm) => {
            for (key, target) in tm.transitions.iter() {
                edges.entry(&key.state).or_default().push(&target.state);
            }
        }
    }

    let mut visited = HashSet::new();
    let mut queue = vec![definition.start()];

    while let Some(state) = queue.pop() {
        if !visited.insert(state) {
            continue;
        }
        if let Some(next) = edges.get(state) {
            queue.extend(next.iter().filter(|s| !visited.contains(*s)));
        }
    }

    definition
        .states()
        .iter()
        .filter(|s| !visited.contains(s.as_str()))
        .cloned()
        .collect()
}
