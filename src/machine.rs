//! This module is the machine model: the per-run configurations of every machine kind and the
//! moves a `Definition` allows from them. It also provides `TuringMachine`, a stepper that
//! owns a single Turing machine configuration and advances it one move at a time.

use crate::types::{
    Acceptance, Definition, FiniteKey, PushdownKey, PushdownTarget, Rules, TuringKey,
    TuringTarget, DEFAULT_BLANK_SYMBOL,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// A Turing machine tape: unbounded in both directions, blank wherever nothing was written.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tape {
    cells: BTreeMap<i64, char>,
    head: i64,
    blank: char,
}

impl Tape {
    /// Creates a tape holding `input` from position 0, with the head on the first symbol.
    pub fn new(input: &[char], blank: char) -> Self {
        let cells = input
            .iter()
            .enumerate()
            .filter(|(_, &c)| c != blank)
            .map(|(i, &c)| (i as i64, c))
            .collect();
        Self {
            cells,
            head: 0,
            blank,
        }
    }

    /// The symbol under the head.
    pub fn read(&self) -> char {
        self.symbol_at(self.head)
    }

    /// The symbol at `position`; unvisited cells read as blank.
    pub fn symbol_at(&self, position: i64) -> char {
        self.cells.get(&position).copied().unwrap_or(self.blank)
    }

    /// Writes under the head. Writing the blank frees the cell.
    pub fn write(&mut self, symbol: char) {
        if symbol == self.blank {
            self.cells.remove(&self.head);
        } else {
            self.cells.insert(self.head, symbol);
        }
    }

    pub fn shift(&mut self, offset: i64) {
        self.head += offset;
    }

    pub fn head(&self) -> i64 {
        self.head
    }

    /// The span between the leftmost and rightmost non-blank cells.
    pub fn contents(&self) -> String {
        match (self.cells.keys().next(), self.cells.keys().next_back()) {
            (Some(&first), Some(&last)) => (first..=last).map(|p| self.symbol_at(p)).collect(),
            _ => String::new(),
        }
    }

    /// The `2 * radius + 1` cells centred on the head.
    pub fn window(&self, radius: i64) -> String {
        (self.head - radius..=self.head + radius)
            .map(|p| self.symbol_at(p))
            .collect()
    }
}

/// Configuration of a DFA or NFA branch: one state and the number of symbols consumed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FiniteConfiguration {
    pub state: String,
    pub position: usize,
}

/// Configuration of a pushdown branch. The stack top is the last element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PushdownConfiguration {
    pub state: String,
    pub position: usize,
    pub stack: Vec<char>,
}

impl PushdownConfiguration {
    /// The stack rendered top first.
    pub fn stack_string(&self) -> String {
        self.stack.iter().rev().collect()
    }
}

/// Configuration of a Turing machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TuringConfiguration {
    pub state: String,
    pub tape: Tape,
}

/// A complete instantaneous description of a run, whatever the machine kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Configuration {
    Finite(FiniteConfiguration),
    Pushdown(PushdownConfiguration),
    Turing(TuringConfiguration),
}

impl Configuration {
    pub fn state(&self) -> &str {
        match self {
            Configuration::Finite(c) => &c.state,
            Configuration::Pushdown(c) => &c.state,
            Configuration::Turing(c) => &c.state,
        }
    }
}

/// The transition target that produced a move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Finite(String),
    Pushdown(PushdownTarget),
    Turing(TuringTarget),
}

/// One legal move: the target that was applied and the configuration it leads to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Move {
    pub target: Target,
    pub next: Configuration,
}

impl Definition {
    /// The configuration every run starts from.
    ///
    /// A pushdown stack starts with the bottom marker; a tape holds the input from position 0.
    pub fn initial_configuration(&self, input: &[char]) -> Configuration {
        let state = self.start.clone();
        match &self.rules {
            Rules::Finite(_) => Configuration::Finite(FiniteConfiguration { state, position: 0 }),
            Rules::Pushdown(pda) => Configuration::Pushdown(PushdownConfiguration {
                state,
                position: 0,
                stack: vec![pda.bottom],
            }),
            Rules::Turing(tm) => Configuration::Turing(TuringConfiguration {
                state,
                tape: Tape::new(input, tm.blank),
            }),
        }
    }

    /// Every configuration reachable from `config` by one move, in declaration order.
    ///
    /// Moves come from the definition's own rules; a configuration of another kind has none.
    /// A pushdown move that must match the stack top has no effect on an empty stack, and a
    /// Turing machine in an accepting or rejecting state is halted and has no moves.
    pub fn moves(&self, config: &Configuration, input: &[char]) -> Vec<Move> {
        match (&self.rules, config) {
            (Rules::Finite(table), Configuration::Finite(c)) => {
                let mut moves = Vec::new();
                let next_symbol = input.get(c.position).copied();

                for (symbol, advance) in [(next_symbol, 1), (None, 0)] {
                    if advance == 1 && symbol.is_none() {
                        continue;
                    }
                    let key = FiniteKey {
                        state: c.state.clone(),
                        symbol,
                    };
                    moves.extend(table.get(&key).map(|target| Move {
                        target: Target::Finite(target.clone()),
                        next: Configuration::Finite(FiniteConfiguration {
                            state: target.clone(),
                            position: c.position + advance,
                        }),
                    }));
                }
                moves
            }
            (Rules::Pushdown(pda), Configuration::Pushdown(c)) => {
                let mut moves = Vec::new();
                let next_symbol = input.get(c.position).copied();
                let top = c.stack.last().copied();

                for (symbol, advance) in [(next_symbol, 1), (None, 0)] {
                    if advance == 1 && symbol.is_none() {
                        continue;
                    }
                    for (matched, pop) in [(top, true), (None, false)] {
                        if pop && matched.is_none() {
                            continue;
                        }
                        let key = PushdownKey {
                            state: c.state.clone(),
                            input: symbol,
                            top: matched,
                        };
                        moves.extend(pda.transitions.get(&key).map(|target| {
                            let mut stack = c.stack.clone();
                            if pop {
                                stack.pop();
                            }
                            // push[0] must end on top
                            stack.extend(target.push.iter().rev());
                            Move {
                                target: Target::Pushdown(target.clone()),
                                next: Configuration::Pushdown(PushdownConfiguration {
                                    state: target.state.clone(),
                                    position: c.position + advance,
                                    stack,
                                }),
                            }
                        }));
                    }
                }
                moves
            }
            (Rules::Turing(tm), Configuration::Turing(c)) => {
                if self.accept.contains(&c.state) || tm.reject.contains(&c.state) {
                    return Vec::new();
                }
                let key = TuringKey {
                    state: c.state.clone(),
                    read: c.tape.read(),
                };
                tm.transitions
                    .get(&key)
                    .map(|target| {
                        let mut tape = c.tape.clone();
                        tape.write(target.write);
                        tape.shift(target.direction.offset());
                        Move {
                            target: Target::Turing(target.clone()),
                            next: Configuration::Turing(TuringConfiguration {
                                state: target.state.clone(),
                                tape,
                            }),
                        }
                    })
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    /// Returns `true` if `config` is an accepting configuration once `input` is consumed.
    ///
    /// Finite and pushdown configurations must have consumed the whole input; a pushdown
    /// automaton using empty-stack acceptance ignores its states and checks that only the
    /// bottom marker (or nothing) is left.
    pub fn accepts(&self, config: &Configuration, input: &[char]) -> bool {
        match (&self.rules, config) {
            (Rules::Finite(_), Configuration::Finite(c)) => {
                c.position == input.len() && self.accept.contains(&c.state)
            }
            (Rules::Pushdown(pda), Configuration::Pushdown(c)) => {
                c.position == input.len()
                    && match pda.acceptance {
                        Acceptance::FinalState => self.accept.contains(&c.state),
                        Acceptance::EmptyStack => {
                            c.stack.is_empty() || c.stack.as_slice() == [pda.bottom]
                        }
                    }
            }
            (Rules::Turing(_), Configuration::Turing(c)) => self.accept.contains(&c.state),
            _ => false,
        }
    }

    /// The set of states reachable from `states` through epsilon moves alone.
    ///
    /// Computed to a fixed point, so applying it to its own result changes nothing.
    pub fn epsilon_closure(&self, states: &BTreeSet<String>) -> BTreeSet<String> {
        let Rules::Finite(table) = &self.rules else {
            return states.clone();
        };

        let mut closure = states.clone();
        let mut queue: VecDeque<String> = states.iter().cloned().collect();

        while let Some(state) = queue.pop_front() {
            let key = FiniteKey {
                state,
                symbol: None,
            };
            for next in table.get(&key) {
                if closure.insert(next.clone()) {
                    queue.push_back(next.clone());
                }
            }
        }

        closure
    }

    /// One consuming step of the subset construction: the closure of every state reachable
    /// from the closure of `states` by reading `symbol`.
    pub fn successors(&self, states: &BTreeSet<String>, symbol: char) -> BTreeSet<String> {
        let Rules::Finite(table) = &self.rules else {
            return BTreeSet::new();
        };

        let next: BTreeSet<String> = self
            .epsilon_closure(states)
            .into_iter()
            .flat_map(|state| {
                let key = FiniteKey {
                    state,
                    symbol: Some(symbol),
                };
                table.get(&key).cloned().collect::<Vec<_>>()
            })
            .collect();

        self.epsilon_closure(&next)
    }
}

/// Represents the outcome of a Turing machine step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// The machine performed a move and continues execution.
    Continue,
    /// The machine has halted.
    Halt(Halt),
}

/// Why a Turing machine halted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Halt {
    /// Halted in an accepting state.
    Accept,
    /// Halted in a rejecting state.
    Reject,
    /// No transition for the current state and the symbol under the head.
    NoMove(char),
}

/// A single-tape Turing machine running a `Definition`.
///
/// The definition is borrowed, so any number of machines may run the same definition.
pub struct TuringMachine<'d> {
    definition: &'d Definition,
    initial: TuringConfiguration,
    config: TuringConfiguration,
    step_count: usize,
}

impl<'d> TuringMachine<'d> {
    /// Creates a machine with `input` on its tape, head on the first symbol.
    ///
    /// A definition of another kind has no Turing moves, so such a machine halts at once.
    pub fn new(definition: &'d Definition, input: &str) -> Self {
        let blank = match definition.rules() {
            Rules::Turing(tm) => tm.blank,
            _ => DEFAULT_BLANK_SYMBOL,
        };
        let input: Vec<char> = input.chars().collect();
        let initial = TuringConfiguration {
            state: definition.start().to_string(),
            tape: Tape::new(&input, blank),
        };

        Self {
            definition,
            config: initial.clone(),
            initial,
            step_count: 0,
        }
    }

    /// Executes a single move, updating the tape in place.
    ///
    /// # Returns
    ///
    /// * `Step::Continue` if the machine performed a move.
    /// * `Step::Halt(_)` if it is in an accepting or rejecting state, or has no move.
    pub fn step(&mut self) -> Step {
        if let Some(halt) = self.halted() {
            return Step::Halt(halt);
        }

        let read = self.config.tape.read();
        let Rules::Turing(tm) = self.definition.rules() else {
            return Step::Halt(Halt::NoMove(read));
        };
        let key = TuringKey {
            state: self.config.state.clone(),
            read,
        };

        match tm.transitions.get(&key).next() {
            Some(target) => {
                self.config.tape.write(target.write);
                self.config.tape.shift(target.direction.offset());
                self.config.state.clone_from(&target.state);
                self.step_count += 1;
                Step::Continue
            }
            None => Step::Halt(Halt::NoMove(read)),
        }
    }

    /// Runs the machine until it halts. A machine that never halts never returns.
    pub fn run(&mut self) -> Halt {
        loop {
            if let Step::Halt(halt) = self.step() {
                return halt;
            }
        }
    }

    /// Runs at most `max_steps` moves. Returns `None` if the machine is still running.
    pub fn run_for(&mut self, max_steps: usize) -> Option<Halt> {
        for _ in 0..max_steps {
            if let Step::Halt(halt) = self.step() {
                return Some(halt);
            }
        }
        self.halted()
    }

    /// Returns `Halt::Accept` or `Halt::Reject` if the current state is a halting state.
    pub fn halted(&self) -> Option<Halt> {
        let Rules::Turing(tm) = self.definition.rules() else {
            return None;
        };
        if self.definition.is_accepting(&self.config.state) {
            Some(Halt::Accept)
        } else if tm.reject.contains(&self.config.state) {
            Some(Halt::Reject)
        } else {
            None
        }
    }

    /// Resets the machine to its initial configuration.
    pub fn reset(&mut self) {
        self.config = self.initial.clone();
        self.step_count = 0;
    }

    /// Returns the current state of the Turing Machine.
    pub fn state(&self) -> &str {
        &self.config.state
    }

    pub fn tape(&self) -> &Tape {
        &self.config.tape
    }

    /// Returns the total number of moves executed.
    pub fn step_count(&self) -> usize {
        self.step_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::types::Kind;

    const EPSILON_NFA: &str = r#"
$States
s, p, q, f
$Symbols
a
$Start
s
$Accept
f
$Rules
q > a > f
$EpsilonRules
s > p
p > q
q > s
"#;

    const STACK_PDA: &str = r#"
$States
q
$Alphabet
a
$Start
q
$Accept
q
$Rules
q > a, $ > q, AB$
q > ε, A > q, ε
q > a, ε > q, C
"#;

    const WALKER_TM: &str = r#"
$States
q0, q1, qa
$Alphabet
1
$Start
q0
$Accept
qa
$Rules
q0 > 1 > q0, X, R
q0 > _ > q1, _, L
q1 > X > q1, 1, L
q1 > _ > qa, _, R
"#;

    fn set(states: &[&str]) -> BTreeSet<String> {
        states.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_tape_defaults_to_blank() {
        let mut tape = Tape::new(&['a', 'b'], '_');
        assert_eq!(tape.read(), 'a');
        assert_eq!(tape.symbol_at(-5), '_');
        assert_eq!(tape.symbol_at(100), '_');

        tape.shift(-1);
        tape.write('x');
        assert_eq!(tape.head(), -1);
        assert_eq!(tape.contents(), "xab");
        assert_eq!(tape.window(1), "_xa");

        tape.write('_');
        assert_eq!(tape.contents(), "ab");
    }

    #[test]
    fn test_epsilon_closure_follows_cycles() {
        let definition = parse(EPSILON_NFA, Kind::Nfa).unwrap();

        let closure = definition.epsilon_closure(&set(&["s"]));
        assert_eq!(closure, set(&["s", "p", "q"]));
        assert_eq!(definition.epsilon_closure(&closure), closure);
    }

    #[test]
    fn test_successors_apply_closure_before_and_after() {
        let definition = parse(EPSILON_NFA, Kind::Nfa).unwrap();

        assert_eq!(definition.successors(&set(&["s"]), 'a'), set(&["f"]));
        assert!(definition.successors(&set(&["f"]), 'a').is_empty());
    }

    #[test]
    fn test_finite_moves_include_epsilon() {
        let definition = parse(EPSILON_NFA, Kind::Nfa).unwrap();
        let config = definition.initial_configuration(&['a']);

        let moves = definition.moves(&config, &['a']);
        assert_eq!(moves.len(), 1);
        assert_eq!(
            moves[0].next,
            Configuration::Finite(FiniteConfiguration {
                state: "p".into(),
                position: 0
            })
        );
    }

    #[test]
    fn test_pushdown_push_order_and_wildcard() {
        let definition = parse(STACK_PDA, Kind::Pda).unwrap();
        let input = ['a'];
        let config = definition.initial_configuration(&input);

        let moves = definition.moves(&config, &input);
        let stacks: Vec<String> = moves
            .iter()
            .map(|m| match &m.next {
                Configuration::Pushdown(c) => c.stack_string(),
                other => panic!("unexpected {:?}", other),
            })
            .collect();

        // "AB$" replaces "$": A ends on top. The wildcard move keeps "$" and adds C.
        assert_eq!(stacks, vec!["AB$", "C$"]);
    }

    #[test]
    fn test_pushdown_empty_stack_has_no_matching_move() {
        let definition = parse(STACK_PDA, Kind::Pda).unwrap();
        let config = Configuration::Pushdown(PushdownConfiguration {
            state: "q".into(),
            position: 1,
            stack: Vec::new(),
        });

        assert!(definition.moves(&config, &['a']).is_empty());
    }

    #[test]
    fn test_branches_do_not_share_stacks() {
        let definition = parse(STACK_PDA, Kind::Pda).unwrap();
        let input = ['a', 'a'];
        let config = definition.initial_configuration(&input);

        let mut moves = definition.moves(&config, &input);
        if let Configuration::Pushdown(c) = &mut moves[0].next {
            c.stack.push('Z');
        }
        match &moves[1].next {
            Configuration::Pushdown(c) => assert_eq!(c.stack_string(), "C$"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_turing_machine_steps_and_resets() {
        let definition = parse(WALKER_TM, Kind::Tm).unwrap();
        let mut machine = TuringMachine::new(&definition, "11");

        assert_eq!(machine.step(), Step::Continue);
        assert_eq!(machine.tape().contents(), "X1");
        assert_eq!(machine.tape().head(), 1);

        assert_eq!(machine.run(), Halt::Accept);
        assert_eq!(machine.state(), "qa");
        assert_eq!(machine.tape().contents(), "11");
        assert_eq!(machine.step_count(), 6);

        assert_eq!(machine.step(), Step::Halt(Halt::Accept));

        machine.reset();
        assert_eq!(machine.state(), "q0");
        assert_eq!(machine.step_count(), 0);
        assert_eq!(machine.tape().contents(), "11");
    }

    #[test]
    fn test_turing_machine_agrees_with_generic_moves() {
        let definition = parse(WALKER_TM, Kind::Tm).unwrap();
        let mut machine = TuringMachine::new(&definition, "111");

        while machine.halted().is_none() {
            let current = Configuration::Turing(TuringConfiguration {
                state: machine.state().to_string(),
                tape: machine.tape().clone(),
            });
            let expected = definition.moves(&current, &[]).into_iter().next();

            assert_eq!(machine.step(), Step::Continue);
            let stepped = Configuration::Turing(TuringConfiguration {
                state: machine.state().to_string(),
                tape: machine.tape().clone(),
            });
            assert_eq!(expected.map(|m| m.next), Some(stepped));
        }
        assert_eq!(machine.halted(), Some(Halt::Accept));
    }

    #[test]
    fn test_turing_machine_moves_left_of_origin() {
        let definition = parse(WALKER_TM, Kind::Tm).unwrap();
        let mut machine = TuringMachine::new(&definition, "");

        // q0 reads blank, moves to -1; q1 reads blank there and accepts.
        assert_eq!(machine.run_for(10), Some(Halt::Accept));
        assert_eq!(machine.tape().head(), 0);
    }

    #[test]
    fn test_turing_machine_without_move() {
        let definition = parse(WALKER_TM, Kind::Tm).unwrap();
        let mut machine = TuringMachine::new(&definition, "2");

        assert_eq!(machine.step(), Step::Halt(Halt::NoMove('2')));
    }

    #[test]
    fn test_turing_machine_over_finite_definition_halts() {
        let definition = parse(EPSILON_NFA, Kind::Nfa).unwrap();
        let mut machine = TuringMachine::new(&definition, "a");

        assert_eq!(machine.halted(), None);
        assert_eq!(machine.step(), Step::Halt(Halt::NoMove('a')));
    }
}
