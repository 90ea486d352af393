//! This module renders a `Definition` back into the text format in a canonical layout.
//!
//! Sections always appear in the same order, lists are comma separated on one line, and
//! transitions keep their declaration order. Parsing the output yields an equivalent
//! definition, and encoding that definition again yields the same text.

use crate::parser::Section;
use crate::types::{Acceptance, Definition, FiniteKey, Rules, EPSILON_MARKERS};
use std::collections::{BTreeSet, HashMap};

/// Encodes a definition in the canonical text format.
pub fn encode(definition: &Definition) -> String {
    let mut out = String::new();

    if !definition.name().is_empty() {
        section(&mut out, Section::Name, [definition.name().to_string()]);
    }
    section(&mut out, Section::States, [definition.states().join(", ")]);
    section(&mut out, Section::Alphabet, [symbols(definition.alphabet())]);
    section(&mut out, Section::Start, [definition.start().to_string()]);
    if !definition.accept().is_empty() {
        section(&mut out, Section::Accept, [names(definition.accept())]);
    }

    match definition.rules() {
        Rules::Finite(table) => {
            let (consuming, epsilon) = group_finite(table.iter());
            section(&mut out, Section::Rules, consuming);
            if !epsilon.is_empty() {
                section(&mut out, Section::EpsilonRules, epsilon);
            }
        }
        Rules::Pushdown(pda) => {
            let extra: BTreeSet<char> = pda
                .stack_alphabet
                .iter()
                .copied()
                .filter(|&c| c != pda.bottom)
                .collect();
            if !extra.is_empty() {
                section(&mut out, Section::StackAlphabet, [symbols(&extra)]);
            }
            section(&mut out, Section::Bottom, [pda.bottom.to_string()]);
            if pda.acceptance == Acceptance::EmptyStack {
                section(&mut out, Section::Acceptance, ["empty_stack".to_string()]);
            }

            let rules = pda.transitions.iter().map(|(key, target)| {
                let push: String = target.push.iter().collect();
                format!(
                    "{} > {}, {} > {}, {}",
                    key.state,
                    or_epsilon(key.input),
                    or_epsilon(key.top),
                    target.state,
                    if push.is_empty() { epsilon() } else { push },
                )
            });
            section(&mut out, Section::Rules, rules);
        }
        Rules::Turing(tm) => {
            if !tm.reject.is_empty() {
                section(&mut out, Section::Reject, [names(&tm.reject)]);
            }
            let extra: BTreeSet<char> = tm
                .tape_alphabet
                .iter()
                .copied()
                .filter(|c| *c != tm.blank && !definition.alphabet().contains(c))
                .collect();
            if !extra.is_empty() {
                section(&mut out, Section::TapeAlphabet, [symbols(&extra)]);
            }
            section(&mut out, Section::Blank, [tm.blank.to_string()]);

            let tape_symbol = |c: char| {
                if c == tm.blank {
                    "_".to_string()
                } else {
                    c.to_string()
                }
            };
            let rules = tm.transitions.iter().map(|(key, target)| {
                format!(
                    "{} > {} > {}, {}, {}",
                    key.state,
                    tape_symbol(key.read),
                    target.state,
                    tape_symbol(target.write),
                    target.direction,
                )
            });
            section(&mut out, Section::Rules, rules);
        }
    }

    out
}

fn section(out: &mut String, section: Section, lines: impl IntoIterator<Item = String>) {
    out.push_str(section.marker());
    out.push('\n');
    for line in lines {
        out.push_str(&line);
        out.push('\n');
    }
}

fn symbols(set: &BTreeSet<char>) -> String {
    set.iter().map(char::to_string).collect::<Vec<_>>().join(", ")
}

fn names(set: &BTreeSet<String>) -> String {
    set.iter().cloned().collect::<Vec<_>>().join(", ")
}

fn epsilon() -> String {
    EPSILON_MARKERS[0].to_string()
}

fn or_epsilon(symbol: Option<char>) -> String {
    symbol.map(String::from).unwrap_or_else(epsilon)
}

/// Merges targets that share a key into one line per key, first declaration first.
/// Returns the consuming lines and the epsilon lines separately.
fn group_finite<'a>(
    transitions: impl Iterator<Item = (&'a FiniteKey, &'a String)>,
) -> (Vec<String>, Vec<String>) {
    let mut order: Vec<&FiniteKey> = Vec::new();
    let mut targets: HashMap<&FiniteKey, Vec<&str>> = HashMap::new();

    for (key, target) in transitions {
        let slot = targets.entry(key).or_default();
        if slot.is_empty() {
            order.push(key);
        }
        slot.push(target);
    }

    let mut consuming = Vec::new();
    let mut epsilon = Vec::new();
    for key in order {
        let to = targets[key].join(", ");
        match key.symbol {
            Some(symbol) => consuming.push(format!("{} > {} > {}", key.state, symbol, to)),
            None => epsilon.push(format!("{} > {}", key.state, to)),
        }
    }
    (consuming, epsilon)
}
