// Property-based tests for the execution engine.
//
// Machines are generated as definition text and parsed, so every property also exercises
// the parser and analyzer on inputs nobody wrote by hand.

use automata::machine::PushdownConfiguration;
use automata::{
    execute, parse, run, Configuration, Definition, Kind, Limits, Options, Snapshot, Verdict,
};
use proptest::collection::vec;
use proptest::prelude::*;
use std::collections::{BTreeSet, HashSet, VecDeque};

// ============================================================================
// GENERATORS
// ============================================================================

const SYMBOLS: [char; 2] = ['a', 'b'];

fn state(i: usize) -> String {
    format!("q{i}")
}

/// Renders a finite automaton. `accept` is forced non-empty by accepting the last state.
fn finite_text(states: usize, accept: &[bool], rules: &[String], epsilon: &[String]) -> String {
    let names: Vec<String> = (0..states).map(state).collect();
    let mut accepting: Vec<String> = (0..states)
        .filter(|&i| accept[i])
        .map(state)
        .collect();
    if accepting.is_empty() {
        accepting.push(state(states - 1));
    }

    let mut text = format!(
        "$States\n{}\n$Symbols\na, b\n$Start\nq0\n$Accept\n{}\n$Rules\n",
        names.join(", "),
        accepting.join(", ")
    );
    for rule in rules {
        text.push_str(rule);
        text.push('\n');
    }
    if !epsilon.is_empty() {
        text.push_str("$EpsilonRules\n");
        for rule in epsilon {
            text.push_str(rule);
            text.push('\n');
        }
    }
    text
}

/// A complete or partial DFA over {a, b} with up to five states.
fn dfa_text() -> impl Strategy<Value = String> {
    (1usize..6).prop_flat_map(|n| {
        (
            vec(proptest::option::of(0..n), n * SYMBOLS.len()),
            vec(any::<bool>(), n),
        )
            .prop_map(move |(targets, accept)| {
                let rules: Vec<String> = targets
                    .iter()
                    .enumerate()
                    .filter_map(|(i, target)| {
                        target.map(|t| {
                            let from = i / SYMBOLS.len();
                            let symbol = SYMBOLS[i % SYMBOLS.len()];
                            format!("{} > {} > {}", state(from), symbol, state(t))
                        })
                    })
                    .collect();
                finite_text(n, &accept, &rules, &[])
            })
    })
}

/// An NFA as (state count, accepting flags, consuming rules, epsilon rules), one target per
/// line so that the rule order can be shuffled freely.
type NfaParts = (usize, Vec<bool>, Vec<String>, Vec<String>);

fn nfa_parts() -> impl Strategy<Value = NfaParts> {
    (1usize..6).prop_flat_map(|n| {
        (
            Just(n),
            vec(any::<bool>(), n),
            vec((0..n, 0..SYMBOLS.len(), 0..n), 0..12).prop_map(|edges| {
                edges
                    .into_iter()
                    .map(|(from, symbol, to)| {
                        format!("{} > {} > {}", state(from), SYMBOLS[symbol], state(to))
                    })
                    .collect::<Vec<_>>()
            }),
            vec((0..n, 0..n), 0..6).prop_map(|edges| {
                edges
                    .into_iter()
                    .map(|(from, to)| format!("{} > {}", state(from), state(to)))
                    .collect::<Vec<_>>()
            }),
        )
    })
}

/// An NFA rendered twice: once as generated and once with every rule list shuffled.
fn nfa_text_pair() -> impl Strategy<Value = (String, String)> {
    nfa_parts().prop_flat_map(|(n, accept, rules, epsilon)| {
        let original = finite_text(n, &accept, &rules, &epsilon);
        (
            Just(original),
            Just(rules).prop_shuffle(),
            Just(epsilon).prop_shuffle(),
        )
            .prop_map(move |(original, rules, epsilon)| {
                (original, finite_text(n, &accept, &rules, &epsilon))
            })
    })
}

/// A pushdown automaton whose moves are mostly epsilon moves, free to push and pop.
///
/// Pushes mix two stack symbols, so epsilon cycles reach exponentially many stacks.
fn epsilon_heavy_pda_text() -> impl Strategy<Value = String> {
    (1usize..5).prop_flat_map(|n| {
        let rule = (
            0..n,
            prop_oneof![3 => Just("ε"), 1 => Just("a")],
            prop_oneof![Just("ε"), Just("A"), Just("B"), Just("$")],
            0..n,
            prop_oneof![
                Just("ε"),
                Just("A"),
                Just("B"),
                Just("AB"),
                Just("BA"),
                Just("AA")
            ],
        )
            .prop_map(|(from, input, top, to, push)| {
                format!("{} > {}, {} > {}, {}", state(from), input, top, state(to), push)
            });
        (vec(rule, 1..10), 0..n).prop_map(move |(rules, accept)| {
            let names: Vec<String> = (0..n).map(state).collect();
            format!(
                "$States\n{}\n$Alphabet\na\n$Start\nq0\n$Accept\n{}\n$Rules\n{}\n",
                names.join(", "),
                state(accept),
                rules.join("\n")
            )
        })
    })
}

fn input_string() -> impl Strategy<Value = String> {
    "[ab]{0,10}"
}

// ============================================================================
// HELPERS
// ============================================================================

/// Plain breadth-first search over pushdown configurations, giving up after `budget`.
fn brute_force_accepts(pda: &Definition, input: &[char], budget: usize) -> bool {
    let initial = pda.initial_configuration(input);
    let mut visited = HashSet::from([initial.clone()]);
    let mut queue = VecDeque::from([initial]);

    while let Some(config) = queue.pop_front() {
        if pda.accepts(&config, input) {
            return true;
        }
        if visited.len() > budget {
            return false;
        }
        for candidate in pda.moves(&config, input) {
            if visited.insert(candidate.next.clone()) {
                queue.push_back(candidate.next);
            }
        }
    }
    false
}

fn pushdown_configuration(snapshot: &Snapshot) -> Configuration {
    match snapshot {
        Snapshot::Pushdown {
            state,
            position,
            stack,
        } => Configuration::Pushdown(PushdownConfiguration {
            state: state.clone(),
            position: *position,
            stack: stack.chars().rev().collect(),
        }),
        other => panic!("unexpected {:?}", other),
    }
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #[test]
    fn dfa_runs_are_deterministic(text in dfa_text(), input in input_string()) {
        let dfa = parse(&text, Kind::Dfa).unwrap();

        let first = run(&dfa, &input);
        prop_assert_eq!(&run(&dfa, &input), &first);

        let traced = execute(&dfa, &input, &Options { trace: true, ..Options::default() });
        prop_assert_eq!(&traced.verdict, &first);
    }

    #[test]
    fn dfa_and_nfa_readings_agree(text in dfa_text(), input in input_string()) {
        let dfa = parse(&text, Kind::Dfa).unwrap();
        let nfa = parse(&text, Kind::Nfa).unwrap();

        prop_assert_eq!(run(&dfa, &input).is_accepted(), run(&nfa, &input).is_accepted());
    }

    #[test]
    fn nfa_verdict_ignores_rule_order(
        (original, shuffled) in nfa_text_pair(),
        input in input_string(),
    ) {
        let original = parse(&original, Kind::Nfa).unwrap();
        let shuffled = parse(&shuffled, Kind::Nfa).unwrap();

        prop_assert_eq!(run(&original, &input), run(&shuffled, &input));
    }

    #[test]
    fn epsilon_closure_is_idempotent(
        (n, accept, rules, epsilon) in nfa_parts(),
        picks in vec(any::<bool>(), 5),
    ) {
        let nfa = parse(&finite_text(n, &accept, &rules, &epsilon), Kind::Nfa).unwrap();
        let seed: BTreeSet<String> = (0..n).filter(|&i| picks[i]).map(state).collect();

        let once = nfa.epsilon_closure(&seed);
        prop_assert!(once.is_superset(&seed));
        prop_assert_eq!(nfa.epsilon_closure(&once), once);
    }

    #[test]
    fn pushdown_search_always_decides(text in epsilon_heavy_pda_text(), input in "a{0,4}") {
        let pda = parse(&text, Kind::Pda).unwrap();

        let verdict = run(&pda, &input);
        prop_assert!(!matches!(verdict, Verdict::Undecided(_)), "{:?}", verdict);
    }

    #[test]
    fn pushdown_search_finds_what_brute_force_finds(
        text in epsilon_heavy_pda_text(),
        input in "a{0,4}",
    ) {
        let pda = parse(&text, Kind::Pda).unwrap();
        let symbols: Vec<char> = input.chars().collect();

        if brute_force_accepts(&pda, &symbols, 2_000) {
            prop_assert_eq!(run(&pda, &input), Verdict::Accepted);
        }
    }

    #[test]
    fn pushdown_accepting_path_is_a_run(
        text in epsilon_heavy_pda_text(),
        input in "a{0,4}",
    ) {
        let pda = parse(&text, Kind::Pda).unwrap();
        let symbols: Vec<char> = input.chars().collect();
        let options = Options {
            limits: Limits {
                max_configurations: Some(20_000),
                ..Limits::default()
            },
            trace: true,
        };

        let execution = execute(&pda, &input, &options);
        if execution.verdict.is_accepted() && !execution.trace.is_empty() {
            let path: Vec<Configuration> =
                execution.trace.iter().map(pushdown_configuration).collect();

            prop_assert_eq!(&path[0], &pda.initial_configuration(&symbols));
            for pair in path.windows(2) {
                let legal = pda
                    .moves(&pair[0], &symbols)
                    .into_iter()
                    .any(|m| m.next == pair[1]);
                prop_assert!(legal, "{:?} does not lead to {:?}", pair[0], pair[1]);
            }
            prop_assert!(pda.accepts(&path[path.len() - 1], &symbols));
        }
    }
}
