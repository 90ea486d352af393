//! This module runs a `Definition` against an input string and produces a `Verdict`.
//!
//! Every run is a pure function of the definition and the input. A definition is only ever
//! borrowed, so any number of runs may share one definition across threads.

use crate::machine::{Configuration, Halt, Step, TuringMachine};
use crate::saturation::{saturate, Outcome};
use crate::types::{Definition, Kind, Rejection, Rules, Undecided, Verdict};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet, VecDeque};
use tracing::{debug, trace, warn};

/// Number of cells on each side of the head recorded in a Turing snapshot.
const TAPE_WINDOW: i64 = 8;

/// Caller-imposed caps on a run. `None` means uncapped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Turing machine moves before the run is `Undecided`.
    pub max_steps: Option<usize>,
    /// Pushdown reachability transitions derived before the run is `Undecided`. Also caps
    /// the configurations visited while recovering a traced accepting path.
    pub max_configurations: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    pub limits: Limits,
    /// Record snapshots of the run in `Execution::trace`.
    pub trace: bool,
}

/// A recorded configuration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Snapshot {
    /// The state set after `position` symbols.
    Finite {
        position: usize,
        states: Vec<String>,
    },
    /// A configuration on the accepting path. The stack is written top first.
    Pushdown {
        state: String,
        position: usize,
        stack: String,
    },
    /// A Turing configuration before move `step`. `tape` is centred on the head.
    Turing {
        step: usize,
        state: String,
        head: i64,
        tape: String,
    },
}

/// The result of `execute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    pub verdict: Verdict,
    /// Symbols consumed (DFA/NFA), reachability transitions derived (PDA) or moves made (TM).
    pub steps: usize,
    pub trace: Vec<Snapshot>,
}

impl Execution {
    fn new(verdict: Verdict, steps: usize, trace: Vec<Snapshot>) -> Self {
        Self {
            verdict,
            steps,
            trace,
        }
    }
}

/// Runs `definition` on `input` without caps or tracing.
///
/// Returns for every definition except a Turing machine that never halts.
pub fn run(definition: &Definition, input: &str) -> Verdict {
    execute(definition, input, &Options::default()).verdict
}

/// Runs `definition` on `input` under `options`.
pub fn execute(definition: &Definition, input: &str, options: &Options) -> Execution {
    let symbols: Vec<char> = input.chars().collect();
    debug!(kind = %definition.kind(), name = definition.name(), input, "run started");

    let execution = match first_invalid_symbol(definition, &symbols) {
        Some(rejection) => Execution::new(Verdict::Rejected(rejection), 0, Vec::new()),
        None => match (definition.kind(), definition.rules()) {
            (Kind::Dfa, Rules::Finite(_)) => deterministic(definition, &symbols, options),
            (_, Rules::Finite(_)) => nondeterministic(definition, &symbols, options),
            (_, Rules::Pushdown(_)) => pushdown(definition, &symbols, options),
            (_, Rules::Turing(_)) => turing(definition, input, options),
        },
    };

    debug!(verdict = %execution.verdict, steps = execution.steps, "run finished");
    execution
}

fn first_invalid_symbol(definition: &Definition, input: &[char]) -> Option<Rejection> {
    input
        .iter()
        .position(|c| !definition.alphabet().contains(c))
        .map(|position| Rejection::InvalidSymbol {
            symbol: input[position],
            position,
        })
}

fn finite_snapshot<S>(position: usize, states: impl IntoIterator<Item = S>) -> Snapshot
where
    S: AsRef<str>,
{
    Snapshot::Finite {
        position,
        states: states.into_iter().map(|s| s.as_ref().to_string()).collect(),
    }
}

fn deterministic(definition: &Definition, input: &[char], options: &Options) -> Execution {
    let mut trace = Vec::new();
    let mut config = definition.initial_configuration(input);

    for (position, &symbol) in input.iter().enumerate() {
        if options.trace {
            trace.push(finite_snapshot(position, [config.state()]));
        }
        match definition.moves(&config, input).into_iter().next() {
            Some(next) => config = next.next,
            None => {
                let rejection = Rejection::NoMove {
                    state: config.state().to_string(),
                    symbol: Some(symbol),
                    position,
                };
                return Execution::new(Verdict::Rejected(rejection), position, trace);
            }
        }
    }

    let state = config.state().to_string();
    if options.trace {
        trace.push(finite_snapshot(input.len(), [state.as_str()]));
    }
    let verdict = if definition.accepts(&config, input) {
        Verdict::Accepted
    } else {
        Verdict::Rejected(Rejection::NotAccepting {
            states: vec![state],
        })
    };
    Execution::new(verdict, input.len(), trace)
}

fn nondeterministic(definition: &Definition, input: &[char], options: &Options) -> Execution {
    let mut trace = Vec::new();
    let start = BTreeSet::from([definition.start().to_string()]);
    let mut states = definition.epsilon_closure(&start);

    for (position, &symbol) in input.iter().enumerate() {
        if options.trace {
            trace.push(finite_snapshot(position, &states));
        }
        states = definition.successors(&states, symbol);
        trace!(position, %symbol, ?states, "subset step");

        if states.is_empty() {
            let rejection = Rejection::Stuck { position };
            return Execution::new(Verdict::Rejected(rejection), position + 1, trace);
        }
    }

    if options.trace {
        trace.push(finite_snapshot(input.len(), &states));
    }
    let verdict = if states.iter().any(|s| definition.is_accepting(s)) {
        Verdict::Accepted
    } else {
        Verdict::Rejected(Rejection::NotAccepting {
            states: states.into_iter().collect(),
        })
    };
    Execution::new(verdict, input.len(), trace)
}

/// A configuration reached by the accepting-path search and the index of the one it came from.
struct Node {
    config: Configuration,
    parent: Option<usize>,
}

fn pushdown(definition: &Definition, input: &[char], options: &Options) -> Execution {
    let limit = options.limits.max_configurations;
    let (accepted, transitions) = match saturate(definition, input, limit) {
        Outcome::Decided {
            accepted,
            transitions,
        } => (accepted, transitions),
        Outcome::Limited(max) => {
            let verdict = Verdict::Undecided(Undecided::ConfigurationLimit(max));
            return Execution::new(verdict, max, Vec::new());
        }
    };

    if !accepted {
        debug!(transitions, "no accepting configuration is reachable");
        let rejection = Rejection::Exhausted {
            explored: transitions,
        };
        return Execution::new(Verdict::Rejected(rejection), transitions, Vec::new());
    }

    let path = if options.trace {
        shortest_accepting_path(definition, input, limit)
    } else {
        Vec::new()
    };
    Execution::new(Verdict::Accepted, transitions, path)
}

/// Breadth-first search for an accepting configuration, returning the path that reaches it.
///
/// Only called once acceptance is known, so the search always ends unless `limit` cuts it
/// short, in which case the path is empty.
fn shortest_accepting_path(
    definition: &Definition,
    input: &[char],
    limit: Option<usize>,
) -> Vec<Snapshot> {
    let initial = definition.initial_configuration(input);
    let mut visited: HashSet<Configuration> = HashSet::from([initial.clone()]);
    let mut arena = vec![Node {
        config: initial,
        parent: None,
    }];
    let mut queue = VecDeque::from([0]);
    let mut explored = 0;

    while let Some(index) = queue.pop_front() {
        if let Some(max) = limit {
            if explored >= max {
                warn!(max, "accepting path not found within the configuration limit");
                return Vec::new();
            }
        }
        explored += 1;

        let config = &arena[index].config;
        trace!(index, ?config, "exploring");

        if definition.accepts(config, input) {
            return accepting_path(&arena, index);
        }

        for candidate in definition.moves(config, input) {
            if visited.insert(candidate.next.clone()) {
                arena.push(Node {
                    config: candidate.next,
                    parent: Some(index),
                });
                queue.push_back(arena.len() - 1);
            }
        }
    }

    Vec::new()
}

fn accepting_path(arena: &[Node], mut index: usize) -> Vec<Snapshot> {
    let mut path = Vec::new();
    loop {
        if let Configuration::Pushdown(config) = &arena[index].config {
            path.push(Snapshot::Pushdown {
                state: config.state.clone(),
                position: config.position,
                stack: config.stack_string(),
            });
        }
        match arena[index].parent {
            Some(parent) => index = parent,
            None => break,
        }
    }
    path.reverse();
    path
}

fn turing(definition: &Definition, input: &str, options: &Options) -> Execution {
    let mut machine = TuringMachine::new(definition, input);
    let mut trace = Vec::new();

    let halt = loop {
        if options.trace {
            let tape = machine.tape();
            trace.push(Snapshot::Turing {
                step: machine.step_count(),
                state: machine.state().to_string(),
                head: tape.head(),
                tape: tape.window(TAPE_WINDOW),
            });
        }
        if let Some(halt) = machine.halted() {
            break halt;
        }
        if let Some(max) = options.limits.max_steps {
            if machine.step_count() >= max {
                let verdict = Verdict::Undecided(Undecided::StepLimit(max));
                return Execution::new(verdict, machine.step_count(), trace);
            }
        }
        if let Step::Halt(halt) = machine.step() {
            break halt;
        }
        trace!(step = machine.step_count(), state = machine.state(), "moved");
    };

    let state = machine.state().to_string();
    let verdict = match halt {
        Halt::Accept => Verdict::Accepted,
        Halt::Reject => Verdict::Rejected(Rejection::RejectState { state }),
        Halt::NoMove(symbol) => Verdict::Rejected(Rejection::Halted { state, symbol }),
    };
    Execution::new(verdict, machine.step_count(), trace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    const EVEN_ZEROS: &str = r#"
$States
even, odd
$Symbols
0, 1
$Start
even
$Accept
even
$Rules
even > 0 > odd
odd > 0 > even
even > 1 > even
"#;

    const ENDS_WITH_AB: &str = r#"
$States
q0, q1, q2, q3
$Symbols
a, b
$Start
q0
$Accept
q3
$Rules
q0 > a > q0, q1
q0 > b > q0
q1 > b > q2
$EpsilonRules
q2 > q3
"#;

    const ZERO_ONE_PDA: &str = r#"
$States
q0, q1, q2, qf
$Alphabet
0, 1
$Start
q0
$Accept
qf
$Rules
q0 > 0, $ > q1, A$
q1 > 0, A > q1, AA
q1 > 1, A > q2, ε
q2 > 1, A > q2, ε
q2 > ε, $ > qf, $
"#;

    const PUMPING_PDA: &str = r#"
$States
p, q
$Alphabet
a
$Start
p
$Accept
q
$Rules
p > ε, ε > p, X
p > ε, X > p, ε
p > ε, X > p, XX
"#;

    const TOWER_PDA: &str = r#"
$States
q, f
$Alphabet
a
$Start
q
$Accept
f
$Rules
q > ε, $ > q, A$
q > ε, A > q, BA
q > ε, B > q, CB
q > ε, C > q, DC
q > ε, D > q, ED
q > ε, E > f, ε
"#;

    // Epsilon moves push any mix of A and B, so reachable stacks grow exponentially.
    const TWO_SYMBOL_PUMP: &str = r#"
$States
q, f
$Alphabet
a
$Start
q
$Accept
f
$Rules
q > ε, ε > q, A
q > ε, ε > q, B
q > a, ε > q, ε
"#;

    const LOOPING_TM: &str = r#"
$States
q0, qa, qr
$Alphabet
a
$Start
q0
$Accept
qa
$Reject
qr
$Rules
q0 > a > q0, a, R
q0 > _ > q0, _, L
"#;

    const REJECTING_TM: &str = r#"
$States
q0, qa, qr
$Alphabet
a, b
$Start
q0
$Accept
qa
$Reject
qr
$Rules
q0 > a > q0, a, R
q0 > b > qr, b, R
q0 > _ > qa, _, R
"#;

    #[test]
    fn test_dfa_walk() {
        let dfa = parse(EVEN_ZEROS, Kind::Dfa).unwrap();

        assert_eq!(run(&dfa, ""), Verdict::Accepted);
        assert_eq!(run(&dfa, "1001"), Verdict::Accepted);
        assert_eq!(
            run(&dfa, "10"),
            Verdict::Rejected(Rejection::NotAccepting {
                states: vec!["odd".into()]
            })
        );
    }

    #[test]
    fn test_dfa_stops_at_missing_transition() {
        let dfa = parse(EVEN_ZEROS, Kind::Dfa).unwrap();

        assert_eq!(
            run(&dfa, "0101"),
            Verdict::Rejected(Rejection::NoMove {
                state: "odd".into(),
                symbol: Some('1'),
                position: 1
            })
        );
    }

    #[test]
    fn test_invalid_symbol_is_rejected() {
        let dfa = parse(EVEN_ZEROS, Kind::Dfa).unwrap();

        assert_eq!(
            run(&dfa, "00x1"),
            Verdict::Rejected(Rejection::InvalidSymbol {
                symbol: 'x',
                position: 2
            })
        );
    }

    #[test]
    fn test_nfa_subset_construction() {
        let nfa = parse(ENDS_WITH_AB, Kind::Nfa).unwrap();

        for accepted in ["ab", "aab", "babab", "bbab"] {
            assert!(run(&nfa, accepted).is_accepted(), "{accepted}");
        }
        for rejected in ["", "a", "ba", "abb"] {
            assert!(run(&nfa, rejected).is_rejected(), "{rejected}");
        }
    }

    #[test]
    fn test_nfa_trace_records_every_prefix() {
        let nfa = parse(ENDS_WITH_AB, Kind::Nfa).unwrap();
        let options = Options {
            trace: true,
            ..Options::default()
        };

        let execution = execute(&nfa, "ab", &options);
        assert_eq!(execution.steps, 2);
        assert_eq!(
            execution.trace,
            vec![
                finite_snapshot(0, &["q0".to_string()]),
                finite_snapshot(1, &["q0".to_string(), "q1".to_string()]),
                finite_snapshot(2, &["q0".to_string(), "q2".to_string(), "q3".to_string()]),
            ]
        );
    }

    #[test]
    fn test_pushdown_language() {
        let pda = parse(ZERO_ONE_PDA, Kind::Pda).unwrap();

        for accepted in ["01", "0011", "000111"] {
            assert!(run(&pda, accepted).is_accepted(), "{accepted}");
        }
        for rejected in ["", "0", "01 1", "10", "001"] {
            assert!(run(&pda, rejected).is_rejected(), "{rejected}");
        }
    }

    #[test]
    fn test_pushdown_accepting_path() {
        let pda = parse(ZERO_ONE_PDA, Kind::Pda).unwrap();
        let options = Options {
            trace: true,
            ..Options::default()
        };

        let execution = execute(&pda, "01", &options);
        assert_eq!(execution.verdict, Verdict::Accepted);

        let stacks: Vec<(String, usize, String)> = execution
            .trace
            .into_iter()
            .map(|snapshot| match snapshot {
                Snapshot::Pushdown {
                    state,
                    position,
                    stack,
                } => (state, position, stack),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(
            stacks,
            vec![
                ("q0".to_string(), 0, "$".to_string()),
                ("q1".to_string(), 1, "A$".to_string()),
                ("q2".to_string(), 2, "$".to_string()),
                ("qf".to_string(), 2, "$".to_string()),
            ]
        );
    }

    #[test]
    fn test_pushdown_epsilon_loop_terminates() {
        let pda = parse(PUMPING_PDA, Kind::Pda).unwrap();

        assert!(matches!(
            run(&pda, "a"),
            Verdict::Rejected(Rejection::Exhausted { .. })
        ));
    }

    #[test]
    fn test_pushdown_configuration_limit() {
        let pda = parse(PUMPING_PDA, Kind::Pda).unwrap();
        let options = Options {
            limits: Limits {
                max_configurations: Some(3),
                ..Limits::default()
            },
            trace: false,
        };

        let execution = execute(&pda, "a", &options);
        assert_eq!(
            execution.verdict,
            Verdict::Undecided(Undecided::ConfigurationLimit(3))
        );
        assert_eq!(execution.steps, 3);
    }

    #[test]
    fn test_pushdown_reaches_tall_epsilon_stack() {
        let pda = parse(TOWER_PDA, Kind::Pda).unwrap();
        let options = Options {
            trace: true,
            ..Options::default()
        };

        let execution = execute(&pda, "", &options);
        assert_eq!(execution.verdict, Verdict::Accepted);

        let stacks: Vec<String> = execution
            .trace
            .iter()
            .map(|snapshot| match snapshot {
                Snapshot::Pushdown { stack, .. } => stack.clone(),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(stacks, vec!["$", "A$", "BA$", "CBA$", "DCBA$", "EDCBA$", "DCBA$"]);
    }

    #[test]
    fn test_pushdown_two_symbol_pumping_stays_polynomial() {
        let pda = parse(TWO_SYMBOL_PUMP, Kind::Pda).unwrap();
        let input = "a".repeat(40);

        let execution = execute(&pda, &input, &Options::default());
        assert!(matches!(
            execution.verdict,
            Verdict::Rejected(Rejection::Exhausted { .. })
        ));
        assert!(execution.steps < 10_000, "{} transitions", execution.steps);
    }

    #[test]
    fn test_turing_step_limit() {
        let tm = parse(LOOPING_TM, Kind::Tm).unwrap();
        let options = Options {
            limits: Limits {
                max_steps: Some(50),
                ..Limits::default()
            },
            trace: false,
        };

        let execution = execute(&tm, "aa", &options);
        assert_eq!(
            execution.verdict,
            Verdict::Undecided(Undecided::StepLimit(50))
        );
        assert_eq!(execution.steps, 50);
    }

    #[test]
    fn test_turing_reject_state() {
        let tm = parse(REJECTING_TM, Kind::Tm).unwrap();

        assert_eq!(run(&tm, "aa"), Verdict::Accepted);
        assert_eq!(
            run(&tm, "ab"),
            Verdict::Rejected(Rejection::RejectState { state: "qr".into() })
        );
    }

    #[test]
    fn test_turing_trace() {
        let tm = parse(REJECTING_TM, Kind::Tm).unwrap();
        let options = Options {
            trace: true,
            ..Options::default()
        };

        let execution = execute(&tm, "a", &options);
        assert_eq!(execution.steps, 2);
        assert_eq!(execution.trace.len(), 3);
        match &execution.trace[2] {
            Snapshot::Turing {
                step, state, head, ..
            } => {
                assert_eq!((*step, state.as_str(), *head), (2, "qa", 2));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_runs_share_a_definition_across_threads() {
        let pda = parse(ZERO_ONE_PDA, Kind::Pda).unwrap();
        let definition = &pda;
        let inputs = ["01", "0011", "10", "001", "000111"];

        let verdicts: Vec<bool> = std::thread::scope(|scope| {
            let handles: Vec<_> = inputs
                .iter()
                .map(|&input| scope.spawn(move || run(definition, input).is_accepted()))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect()
        });

        assert_eq!(verdicts, vec![true, true, false, false, true]);
    }

    #[test]
    fn test_execution_serializes() {
        let dfa = parse(EVEN_ZEROS, Kind::Dfa).unwrap();
        let options = Options {
            trace: true,
            ..Options::default()
        };

        let json = serde_json::to_value(execute(&dfa, "0", &options)).unwrap();
        assert_eq!(json["steps"], 1);
        assert_eq!(json["trace"][1]["kind"], "finite");
        assert_eq!(json["trace"][1]["states"][0], "odd");
    }
}
