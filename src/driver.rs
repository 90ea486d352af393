//! This module implements the interactive "game" over a finite automaton: symbols arrive
//! one at a time and the driver keeps the set of states the automaton could be in.

use crate::types::{AutomatonError, Definition, Rules};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Steps a finite automaton one symbol at a time, holding the set of live states.
///
/// Once the set is empty it stays empty: a dead end is only left through `reset`.
pub struct Driver<'d> {
    definition: &'d Definition,
    states: BTreeSet<String>,
    consumed: Vec<char>,
}

impl<'d> Driver<'d> {
    /// Creates a driver positioned at the epsilon closure of the start state.
    ///
    /// # Errors
    ///
    /// Returns `AutomatonError::UnsupportedKind` for pushdown and Turing definitions.
    pub fn new(definition: &'d Definition) -> Result<Self, AutomatonError> {
        if !matches!(definition.rules(), Rules::Finite(_)) {
            return Err(AutomatonError::UnsupportedKind {
                kind: definition.kind(),
                operation: "interactive stepping",
            });
        }

        Ok(Self {
            definition,
            states: Self::initial_states(definition),
            consumed: Vec::new(),
        })
    }

    fn initial_states(definition: &Definition) -> BTreeSet<String> {
        definition.epsilon_closure(&BTreeSet::from([definition.start().to_string()]))
    }

    /// Applies one consuming move and returns the new state set.
    ///
    /// A symbol outside the alphabet has no moves and empties the set.
    pub fn step(&mut self, symbol: char) -> &BTreeSet<String> {
        self.states = if self.definition.alphabet().contains(&symbol) {
            self.definition.successors(&self.states, symbol)
        } else {
            BTreeSet::new()
        };
        self.consumed.push(symbol);

        debug!(%symbol, states = ?self.states, "driver step");
        &self.states
    }

    pub fn states(&self) -> &BTreeSet<String> {
        &self.states
    }

    /// The symbols applied since the last reset.
    pub fn consumed(&self) -> &[char] {
        &self.consumed
    }

    /// Returns `true` if the current set contains an accepting state.
    pub fn is_accepting(&self) -> bool {
        self.states.iter().any(|s| self.definition.is_accepting(s))
    }

    pub fn is_stuck(&self) -> bool {
        self.states.is_empty()
    }

    pub fn reset(&mut self) {
        self.states = Self::initial_states(self.definition);
        self.consumed.clear();
    }

    /// The state set each alphabet symbol would lead to, without moving.
    pub fn preview(&self) -> BTreeMap<char, BTreeSet<String>> {
        self.definition
            .alphabet()
            .iter()
            .map(|&symbol| (symbol, self.definition.successors(&self.states, symbol)))
            .collect()
    }
}
