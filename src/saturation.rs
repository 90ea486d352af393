//! Decides pushdown acceptance by saturating a finite automaton over stack contents.
//!
//! For a fixed input, the configurations a pushdown automaton can reach form a regular set.
//! The automaton built here has one control location per `(state, position)` pair, and a
//! configuration `(state, position, stack)` is reachable exactly when the stack, read top
//! first and followed by the floor letter, spells a path from that location to the sink.
//! Transitions are added until nothing new follows, so the construction finishes in time
//! polynomial in the input length however the machine loops on epsilon moves.

use crate::types::{Acceptance, Definition, Rules};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::trace;

/// A stack letter, or the floor under the bottommost symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Letter {
    Symbol(char),
    Floor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Node {
    /// A machine state at an input position.
    Control { state: usize, position: usize },
    /// Inside the initial stack, `depth` letters below the top.
    Initial(usize),
    /// Inside the push of `rule` fired at `position`, `depth` letters below the new top.
    Push {
        rule: usize,
        position: usize,
        depth: usize,
    },
    /// Past the floor. Every stack path ends here.
    Sink,
}

/// `None` as the letter is a silent transition.
type Edge = (Node, Option<Letter>, Node);

struct Rule {
    input: Option<char>,
    top: Option<char>,
    to: usize,
    push: Vec<Letter>,
}

/// The result of saturating the stack automaton of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Saturation completed after deriving `transitions` transitions.
    Decided { accepted: bool, transitions: usize },
    /// The caller's cap on derived transitions was reached first.
    Limited(usize),
}

/// Decides whether `definition` accepts `input`, deriving at most `limit` transitions.
///
/// A definition that is not a pushdown automaton never accepts.
pub(crate) fn saturate(definition: &Definition, input: &[char], limit: Option<usize>) -> Outcome {
    match Saturation::new(definition, input) {
        Some(saturation) => saturation.run(limit),
        None => Outcome::Decided {
            accepted: false,
            transitions: 0,
        },
    }
}

struct Saturation<'a> {
    input: &'a [char],
    rules: Vec<Rule>,
    by_state: Vec<Vec<usize>>,
    accepting: Vec<bool>,
    acceptance: Acceptance,
    bottom: char,
    pending: VecDeque<Edge>,
    edges: HashSet<Edge>,
    outgoing: HashMap<Node, Vec<(Option<Letter>, Node)>>,
    silent_into: HashMap<Node, Vec<Node>>,
}

impl<'a> Saturation<'a> {
    fn new(definition: &Definition, input: &'a [char]) -> Option<Self> {
        let Rules::Pushdown(pda) = definition.rules() else {
            return None;
        };
        let index: HashMap<&str, usize> = definition
            .states()
            .iter()
            .enumerate()
            .map(|(i, state)| (state.as_str(), i))
            .collect();
        let start = *index.get(definition.start())?;

        let mut rules = Vec::new();
        let mut by_state = vec![Vec::new(); definition.states().len()];
        for (key, target) in pda.transitions.iter() {
            let (Some(&from), Some(&to)) =
                (index.get(key.state.as_str()), index.get(target.state.as_str()))
            else {
                continue;
            };
            by_state[from].push(rules.len());
            rules.push(Rule {
                input: key.input,
                top: key.top,
                to,
                push: target.push.iter().map(|&c| Letter::Symbol(c)).collect(),
            });
        }

        let mut saturation = Self {
            input,
            rules,
            by_state,
            accepting: definition
                .states()
                .iter()
                .map(|state| definition.is_accepting(state))
                .collect(),
            acceptance: pda.acceptance,
            bottom: pda.bottom,
            pending: VecDeque::new(),
            edges: HashSet::new(),
            outgoing: HashMap::new(),
            silent_into: HashMap::new(),
        };
        saturation.spell(
            Node::Control {
                state: start,
                position: 0,
            },
            &[Letter::Symbol(pda.bottom), Letter::Floor],
            Node::Sink,
            Node::Initial,
        );
        Some(saturation)
    }

    /// Queues a path spelling `letters` from `from` to `to` through `via(1)`, `via(2)`, ...
    ///
    /// An empty word is a single silent transition.
    fn spell(&mut self, from: Node, letters: &[Letter], to: Node, via: impl Fn(usize) -> Node) {
        let Some((last, rest)) = letters.split_last() else {
            self.pending.push_back((from, None, to));
            return;
        };
        let mut node = from;
        for (depth, &letter) in rest.iter().enumerate() {
            let next = via(depth + 1);
            self.pending.push_back((node, Some(letter), next));
            node = next;
        }
        self.pending.push_back((node, Some(*last), to));
    }

    fn run(mut self, limit: Option<usize>) -> Outcome {
        let mut transitions = 0;

        while let Some(edge) = self.pending.pop_front() {
            if self.edges.contains(&edge) {
                continue;
            }
            if let Some(max) = limit {
                if transitions >= max {
                    return Outcome::Limited(max);
                }
            }
            transitions += 1;
            self.edges.insert(edge);
            trace!(?edge, "derived");

            let (from, letter, to) = edge;
            self.outgoing.entry(from).or_default().push((letter, to));
            match letter {
                None => {
                    // `from` now reads whatever `to` reads
                    self.silent_into.entry(to).or_default().push(from);
                    let inherited: Vec<Edge> = self
                        .outgoing
                        .get(&to)
                        .into_iter()
                        .flatten()
                        .filter(|(letter, _)| letter.is_some())
                        .map(|&(letter, next)| (from, letter, next))
                        .collect();
                    self.pending.extend(inherited);
                }
                Some(letter) => {
                    let sources = self.silent_into.get(&from).cloned().unwrap_or_default();
                    self.pending
                        .extend(sources.into_iter().map(|source| (source, Some(letter), to)));
                    if let Node::Control { state, position } = from {
                        self.fire(state, position, letter, to);
                    }
                }
            }
        }

        Outcome::Decided {
            accepted: self.accepts(),
            transitions,
        }
    }

    /// Applies every rule of `state` at `position` to stacks whose top `letter` leads to `below`.
    fn fire(&mut self, state: usize, position: usize, letter: Letter, below: Node) {
        for slot in 0..self.by_state[state].len() {
            let index = self.by_state[state][slot];
            let rule = &self.rules[index];

            let next = match rule.input {
                None => position,
                Some(symbol) if self.input.get(position) == Some(&symbol) => position + 1,
                Some(_) => continue,
            };
            let letters: Vec<Letter> = match rule.top {
                Some(top) if letter == Letter::Symbol(top) => rule.push.clone(),
                Some(_) => continue,
                None => rule.push.iter().copied().chain([letter]).collect(),
            };
            let head = Node::Control {
                state: rule.to,
                position: next,
            };

            self.spell(head, &letters, below, |depth| Node::Push {
                rule: index,
                position,
                depth,
            });
        }
    }

    /// Checks the saturated automaton for an accepting configuration at the end of the input.
    fn accepts(&self) -> bool {
        let end = self.input.len();
        let reads = |state: usize| {
            self.outgoing
                .get(&Node::Control {
                    state,
                    position: end,
                })
                .map(Vec::as_slice)
                .unwrap_or_default()
        };

        (0..self.accepting.len()).any(|state| match self.acceptance {
            Acceptance::FinalState => self.accepting[state] && !reads(state).is_empty(),
            Acceptance::EmptyStack => reads(state).iter().any(|&(letter, next)| match letter {
                Some(Letter::Floor) => true,
                Some(Letter::Symbol(c)) if c == self.bottom => self
                    .outgoing
                    .get(&next)
                    .is_some_and(|edges| edges.iter().any(|&(l, _)| l == Some(Letter::Floor))),
                _ => false,
            }),
        })
    }
}
