//! This module provides the parser for machine definitions, utilizing the `pest` crate.
//!
//! Parsing happens in three passes. The grammar in `grammar.pest` splits the text into
//! `$Section` headers and `>`/`,` separated entries. The entries are then decoded into
//! line-tagged `Declarations` according to the machine kind, checked by the analyzer, and
//! finally compiled into an immutable `Definition`.

use crate::{
    analyzer::analyze,
    types::{
        Acceptance, AutomatonError, Definition, Direction, FiniteKey, Kind, Pushdown,
        PushdownKey, PushdownTarget, Rules, TransitionTable, Turing, TuringKey, TuringTarget,
        BLANK_MARKERS, DEFAULT_BLANK_SYMBOL, DEFAULT_STACK_BOTTOM, EPSILON_MARKERS,
    },
};
use pest::{
    error::{Error, LineColLocation},
    iterators::Pairs,
    Parser as PestParser,
};
use pest_derive::Parser as PestParser;
use std::collections::{BTreeSet, HashMap};
use tracing::warn;

/// Derives a `PestParser` for the definition grammar defined in `grammar.pest`.
#[derive(PestParser)]
#[grammar = "grammar.pest"]
pub struct DefinitionParser;

/// Parses definition text into a `Definition` of the given kind.
///
/// The text is split into sections, every entry is decoded and validated, and only then is
/// the definition built: a malformed definition never yields a partial machine.
///
/// # Returns
///
/// * `Ok(Definition)` if the text is well formed.
/// * `Err(AutomatonError::MalformedDefinition)` naming the offending line otherwise.
pub fn parse(input: &str, kind: Kind) -> Result<Definition, AutomatonError> {
    let pairs = DefinitionParser::parse(Rule::definition, input).map_err(syntax_error)?;
    let sections = collect_sections(pairs, kind)?;
    let declarations = declare(kind, &sections)?;

    analyze(&declarations)?;

    Ok(declarations.into_definition())
}

/// The sections a definition may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Section {
    Name,
    States,
    Alphabet,
    Start,
    Accept,
    Reject,
    Rules,
    EpsilonRules,
    StackAlphabet,
    Bottom,
    TapeAlphabet,
    Blank,
    Acceptance,
}

impl Section {
    /// Resolves a `$Marker` (without the `$`). Markers are case-insensitive.
    fn from_marker(marker: &str) -> Option<Section> {
        let section = match marker.to_ascii_lowercase().replace('-', "_").as_str() {
            "name" => Section::Name,
            "states" => Section::States,
            "symbols" | "alphabet" | "sigma" => Section::Alphabet,
            "start" | "start_state" => Section::Start,
            "accept" | "accept_states" | "final" => Section::Accept,
            "reject" | "reject_states" => Section::Reject,
            "rules" | "transitions" => Section::Rules,
            "epsilonrules" | "epsilon_rules" => Section::EpsilonRules,
            "stack_alphabet" | "stack" => Section::StackAlphabet,
            "bottom" | "stack_bottom" => Section::Bottom,
            "tape_alphabet" | "tape" => Section::TapeAlphabet,
            "blank" | "blank_symbol" => Section::Blank,
            "acceptance" => Section::Acceptance,
            _ => return None,
        };
        Some(section)
    }

    /// The canonical header of the section.
    pub(crate) fn marker(&self) -> &'static str {
        match self {
            Section::Name => "$Name",
            Section::States => "$States",
            Section::Alphabet => "$Symbols",
            Section::Start => "$Start",
            Section::Accept => "$Accept",
            Section::Reject => "$Reject",
            Section::Rules => "$Rules",
            Section::EpsilonRules => "$EpsilonRules",
            Section::StackAlphabet => "$Stack_alphabet",
            Section::Bottom => "$Bottom",
            Section::TapeAlphabet => "$Tape_alphabet",
            Section::Blank => "$Blank",
            Section::Acceptance => "$Acceptance",
        }
    }

    fn applies_to(&self, kind: Kind) -> bool {
        match self {
            Section::EpsilonRules => kind == Kind::Nfa,
            Section::StackAlphabet | Section::Bottom | Section::Acceptance => kind == Kind::Pda,
            Section::Reject | Section::TapeAlphabet | Section::Blank => kind == Kind::Tm,
            _ => true,
        }
    }
}

/// One entry line: fields separated by `>`, each holding `,` separated items.
#[derive(Debug)]
struct Entry {
    line: usize,
    fields: Vec<Vec<String>>,
}

/// A section header and the entries that follow it.
#[derive(Debug)]
struct Block {
    line: usize,
    entries: Vec<Entry>,
}

/// A value together with the line that declared it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Declared<T> {
    pub value: T,
    pub line: usize,
}

/// A decoded transition line.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Transition {
    Finite { key: FiniteKey, target: String },
    Pushdown { key: PushdownKey, target: PushdownTarget },
    Turing { key: TuringKey, target: TuringTarget },
}

/// Everything a definition declares, still tagged with source lines for diagnostics.
#[derive(Debug)]
pub(crate) struct Declarations {
    pub kind: Kind,
    pub name: Option<String>,
    pub states: Vec<Declared<String>>,
    pub alphabet: Vec<Declared<char>>,
    pub start: Vec<Declared<String>>,
    pub accept: Vec<Declared<String>>,
    pub reject: Vec<Declared<String>>,
    pub stack_alphabet: Option<Vec<Declared<char>>>,
    pub bottom: char,
    pub tape_alphabet: Option<Vec<Declared<char>>>,
    pub blank: char,
    pub acceptance: Acceptance,
    pub transitions: Vec<Declared<Transition>>,
}

impl Declarations {
    fn new(kind: Kind) -> Self {
        Self {
            kind,
            name: None,
            states: Vec::new(),
            alphabet: Vec::new(),
            start: Vec::new(),
            accept: Vec::new(),
            reject: Vec::new(),
            stack_alphabet: None,
            bottom: DEFAULT_STACK_BOTTOM,
            tape_alphabet: None,
            blank: DEFAULT_BLANK_SYMBOL,
            acceptance: Acceptance::default(),
            transitions: Vec::new(),
        }
    }

    /// The input alphabet as a set.
    pub(crate) fn alphabet_set(&self) -> BTreeSet<char> {
        self.alphabet.iter().map(|d| d.value).collect()
    }

    /// The declared stack alphabet, with the bottom marker always included.
    pub(crate) fn stack_set(&self) -> Option<BTreeSet<char>> {
        self.stack_alphabet.as_ref().map(|symbols| {
            symbols
                .iter()
                .map(|d| d.value)
                .chain(std::iter::once(self.bottom))
                .collect()
        })
    }

    /// The declared tape alphabet, with the input alphabet and the blank always included.
    pub(crate) fn tape_set(&self) -> Option<BTreeSet<char>> {
        self.tape_alphabet.as_ref().map(|symbols| {
            symbols
                .iter()
                .map(|d| d.value)
                .chain(self.alphabet.iter().map(|d| d.value))
                .chain(std::iter::once(self.blank))
                .collect()
        })
    }

    /// Compiles validated declarations into a `Definition`.
    fn into_definition(self) -> Definition {
        let alphabet = self.alphabet_set();
        let stack_declared = self.stack_set();
        let tape_declared = self.tape_set();

        let rules = match self.kind {
            Kind::Dfa | Kind::Nfa => {
                let mut table = TransitionTable::new();
                for declared in self.transitions {
                    if let Transition::Finite { key, target } = declared.value {
                        insert_once(&mut table, key, target, declared.line);
                    }
                }
                Rules::Finite(table)
            }
            Kind::Pda => {
                let mut table = TransitionTable::new();
                let mut derived = BTreeSet::from([self.bottom]);
                for declared in self.transitions {
                    if let Transition::Pushdown { key, target } = declared.value {
                        derived.extend(key.top);
                        derived.extend(target.push.iter().copied());
                        insert_once(&mut table, key, target, declared.line);
                    }
                }
                Rules::Pushdown(Pushdown {
                    transitions: table,
                    stack_alphabet: stack_declared.unwrap_or(derived),
                    bottom: self.bottom,
                    acceptance: self.acceptance,
                })
            }
            Kind::Tm => {
                let mut table = TransitionTable::new();
                let mut derived: BTreeSet<char> = alphabet.clone();
                derived.insert(self.blank);
                for declared in self.transitions {
                    if let Transition::Turing { key, target } = declared.value {
                        derived.insert(key.read);
                        derived.insert(target.write);
                        insert_once(&mut table, key, target, declared.line);
                    }
                }
                Rules::Turing(Turing {
                    transitions: table,
                    tape_alphabet: tape_declared.unwrap_or(derived),
                    blank: self.blank,
                    reject: self.reject.into_iter().map(|d| d.value).collect(),
                })
            }
        };

        Definition {
            name: self.name.unwrap_or_default(),
            kind: self.kind,
            states: self.states.into_iter().map(|d| d.value).collect(),
            alphabet,
            start: self
                .start
                .into_iter()
                .next()
                .map(|d| d.value)
                .unwrap_or_default(),
            accept: self.accept.into_iter().map(|d| d.value).collect(),
            rules,
        }
    }
}

/// Inserts a transition, logging identical duplicates instead of storing them twice.
fn insert_once<K, T>(table: &mut TransitionTable<K, T>, key: K, target: T, line: usize)
where
    K: Clone + Eq + std::hash::Hash + std::fmt::Debug,
    T: PartialEq + std::fmt::Debug,
{
    if !table.insert(key.clone(), target) {
        warn!(line, ?key, "duplicate transition ignored");
    }
}

/// Converts a grammar-level `pest` error into a `MalformedDefinition`.
fn syntax_error(error: Error<Rule>) -> AutomatonError {
    let line = match error.line_col {
        LineColLocation::Pos((line, _)) | LineColLocation::Span((line, _), _) => line,
    };
    AutomatonError::malformed(line, format!("syntax error: {}", error.variant.message()))
}

/// Groups entries under their section headers.
fn collect_sections(
    pairs: Pairs<Rule>,
    kind: Kind,
) -> Result<HashMap<Section, Block>, AutomatonError> {
    let mut sections: HashMap<Section, Block> = HashMap::new();
    let mut current: Option<Section> = None;

    for pair in pairs.flat_map(|p| p.into_inner()) {
        let line = pair.line_col().0;

        match pair.as_rule() {
            Rule::section => {
                let marker = pair.as_str().trim_start_matches('$');
                let section = Section::from_marker(marker).ok_or_else(|| {
                    AutomatonError::malformed(line, format!("unknown section `${marker}`"))
                })?;

                if !section.applies_to(kind) {
                    return Err(AutomatonError::malformed(
                        line,
                        format!(
                            "section `{}` is not allowed in a {kind} definition",
                            section.marker()
                        ),
                    ));
                }

                if let Some(previous) = sections.get(&section) {
                    return Err(AutomatonError::malformed(
                        line,
                        format!(
                            "duplicate `{}` section (first declared at line {})",
                            section.marker(),
                            previous.line
                        ),
                    ));
                }

                sections.insert(
                    section,
                    Block {
                        line,
                        entries: Vec::new(),
                    },
                );
                current = Some(section);
            }
            Rule::entry => {
                let fields = pair
                    .into_inner()
                    .map(|field| {
                        field
                            .into_inner()
                            .map(|item| item.as_str().to_string())
                            .collect()
                    })
                    .collect();

                match current.and_then(|section| sections.get_mut(&section)) {
                    Some(block) => block.entries.push(Entry { line, fields }),
                    None => {
                        return Err(AutomatonError::malformed(
                            line,
                            "entry outside of any section; expected a `$Section` header first",
                        ))
                    }
                }
            }
            _ => {} // EOI
        }
    }

    Ok(sections)
}

/// Decodes every section into line-tagged declarations for `kind`.
fn declare(
    kind: Kind,
    sections: &HashMap<Section, Block>,
) -> Result<Declarations, AutomatonError> {
    let mut declarations = Declarations::new(kind);

    for required in [
        Section::States,
        Section::Alphabet,
        Section::Start,
        Section::Rules,
    ] {
        check_required_section(sections, required)?;
    }

    if let Some(block) = sections.get(&Section::Name) {
        declarations.name = Some(parse_name(block)?);
    }

    declarations.states = parse_names(sections.get(&Section::States))?;
    declarations.start = parse_names(sections.get(&Section::Start))?;
    declarations.accept = parse_names(sections.get(&Section::Accept))?;
    declarations.reject = parse_names(sections.get(&Section::Reject))?;
    declarations.alphabet = parse_symbols(sections.get(&Section::Alphabet), "input symbol")?;

    if let Some(block) = sections.get(&Section::StackAlphabet) {
        declarations.stack_alphabet = Some(parse_symbols(Some(block), "stack symbol")?);
    }
    if let Some(block) = sections.get(&Section::Bottom) {
        declarations.bottom = parse_single_symbol(block, Section::Bottom)?;
    }
    if let Some(block) = sections.get(&Section::TapeAlphabet) {
        declarations.tape_alphabet = Some(parse_symbols(Some(block), "tape symbol")?);
    }
    if let Some(block) = sections.get(&Section::Blank) {
        declarations.blank = parse_single_symbol(block, Section::Blank)?;
    }
    if let Some(block) = sections.get(&Section::Acceptance) {
        declarations.acceptance = parse_acceptance(block)?;
    }

    let blank = declarations.blank;
    for entry in sections
        .get(&Section::Rules)
        .map(|b| b.entries.as_slice())
        .unwrap_or_default()
    {
        let transitions = match kind {
            Kind::Dfa | Kind::Nfa => parse_finite_transition(entry, kind)?,
            Kind::Pda => vec![parse_pushdown_transition(entry)?],
            Kind::Tm => vec![parse_turing_transition(entry, blank)?],
        };
        declarations
            .transitions
            .extend(transitions.into_iter().map(|value| Declared {
                value,
                line: entry.line,
            }));
    }

    for entry in sections
        .get(&Section::EpsilonRules)
        .map(|b| b.entries.as_slice())
        .unwrap_or_default()
    {
        let transitions = parse_epsilon_transition(entry)?;
        declarations
            .transitions
            .extend(transitions.into_iter().map(|value| Declared {
                value,
                line: entry.line,
            }));
    }

    Ok(declarations)
}

/// Checks that a required section is present, returning an `Err` if it's missing.
fn check_required_section(
    sections: &HashMap<Section, Block>,
    section: Section,
) -> Result<(), AutomatonError> {
    if sections.contains_key(&section) {
        return Ok(());
    }
    Err(AutomatonError::malformed(
        0,
        format!("missing `{}` section", section.marker()),
    ))
}

/// The `$Name` section: a single free-text entry.
fn parse_name(block: &Block) -> Result<String, AutomatonError> {
    match block.entries.as_slice() {
        [entry] => Ok(entry
            .fields
            .iter()
            .map(|items| items.join(", "))
            .collect::<Vec<_>>()
            .join(" > ")),
        [] => Err(AutomatonError::malformed(block.line, "`$Name` section is empty")),
        [_, second, ..] => Err(AutomatonError::malformed(
            second.line,
            "`$Name` takes a single line",
        )),
    }
}

/// A list section (states, start, accept, reject): one or more names per line.
fn parse_names(block: Option<&Block>) -> Result<Vec<Declared<String>>, AutomatonError> {
    let mut names = Vec::new();

    for entry in block.map(|b| b.entries.as_slice()).unwrap_or_default() {
        let items = expect_list(entry)?;
        names.extend(items.iter().map(|item| Declared {
            value: item.clone(),
            line: entry.line,
        }));
    }

    Ok(names)
}

/// An alphabet section: one or more single-character symbols per line.
fn parse_symbols(
    block: Option<&Block>,
    what: &str,
) -> Result<Vec<Declared<char>>, AutomatonError> {
    let mut symbols = Vec::new();

    for entry in block.map(|b| b.entries.as_slice()).unwrap_or_default() {
        for item in expect_list(entry)? {
            if is_epsilon(item) {
                return Err(AutomatonError::malformed(
                    entry.line,
                    format!("the epsilon marker `{item}` cannot be declared as an {what}"),
                ));
            }
            symbols.push(Declared {
                value: parse_symbol(item, entry.line, what)?,
                line: entry.line,
            });
        }
    }

    Ok(symbols)
}

/// A section holding exactly one symbol (`$Bottom`, `$Blank`).
fn parse_single_symbol(block: &Block, section: Section) -> Result<char, AutomatonError> {
    match block.entries.as_slice() {
        [entry] => match expect_list(entry)? {
            [item] => parse_symbol(item, entry.line, "symbol"),
            items => Err(AutomatonError::malformed(
                entry.line,
                format!(
                    "`{}` takes exactly one symbol, found {}",
                    section.marker(),
                    items.len()
                ),
            )),
        },
        [] => Err(AutomatonError::malformed(
            block.line,
            format!("`{}` section is empty", section.marker()),
        )),
        [_, second, ..] => Err(AutomatonError::malformed(
            second.line,
            format!("`{}` takes exactly one symbol", section.marker()),
        )),
    }
}

fn parse_acceptance(block: &Block) -> Result<Acceptance, AutomatonError> {
    let Some(entry) = block.entries.first() else {
        return Err(AutomatonError::malformed(
            block.line,
            "`$Acceptance` section is empty",
        ));
    };

    match expect_list(entry)? {
        [item] => match item.to_ascii_lowercase().as_str() {
            "final_state" | "final" => Ok(Acceptance::FinalState),
            "empty_stack" | "empty" => Ok(Acceptance::EmptyStack),
            other => Err(AutomatonError::malformed(
                entry.line,
                format!("unknown acceptance `{other}` (expected final_state or empty_stack)"),
            )),
        },
        _ => Err(AutomatonError::malformed(
            entry.line,
            "`$Acceptance` takes exactly one value",
        )),
    }
}

/// `from > symbol > to[, to...]`
fn parse_finite_transition(entry: &Entry, kind: Kind) -> Result<Vec<Transition>, AutomatonError> {
    const SYNTAX: &str = "from > symbol > to";
    let fields = expect_fields(entry, &[1, 1, 0], SYNTAX)?;

    let state = fields[0][0].clone();
    let symbol = parse_input_symbol(&fields[1][0], entry.line)?;
    let targets = &fields[2];

    if kind == Kind::Dfa {
        if symbol.is_none() {
            return Err(AutomatonError::malformed(
                entry.line,
                "epsilon transitions are not allowed in a DFA",
            ));
        }
        if targets.len() > 1 {
            return Err(AutomatonError::malformed(
                entry.line,
                format!(
                    "a DFA transition has exactly one target, found {}",
                    targets.len()
                ),
            ));
        }
    }

    Ok(targets
        .iter()
        .map(|target| Transition::Finite {
            key: FiniteKey {
                state: state.clone(),
                symbol,
            },
            target: target.clone(),
        })
        .collect())
}

/// `from > to[, to...]` in the `$EpsilonRules` section.
fn parse_epsilon_transition(entry: &Entry) -> Result<Vec<Transition>, AutomatonError> {
    let fields = expect_fields(entry, &[1, 0], "from > to")?;
    let state = &fields[0][0];

    Ok(fields[1]
        .iter()
        .map(|target| Transition::Finite {
            key: FiniteKey {
                state: state.clone(),
                symbol: None,
            },
            target: target.clone(),
        })
        .collect())
}

/// `from > input, top > to, push`
fn parse_pushdown_transition(entry: &Entry) -> Result<Transition, AutomatonError> {
    let fields = expect_fields(entry, &[1, 2, 2], "from > input, top > to, push")?;

    let input = parse_input_symbol(&fields[1][0], entry.line)?;
    let top = match fields[1][1].as_str() {
        token if is_epsilon(token) => None,
        token => Some(parse_symbol(token, entry.line, "stack symbol")?),
    };
    let push = match fields[2][1].as_str() {
        token if is_epsilon(token) => Vec::new(),
        token => token.chars().collect(),
    };

    Ok(Transition::Pushdown {
        key: PushdownKey {
            state: fields[0][0].clone(),
            input,
            top,
        },
        target: PushdownTarget {
            state: fields[2][0].clone(),
            push,
        },
    })
}

/// `from > read > to, write, direction`
fn parse_turing_transition(entry: &Entry, blank: char) -> Result<Transition, AutomatonError> {
    let fields = expect_fields(entry, &[1, 1, 3], "from > read > to, write, direction")?;

    Ok(Transition::Turing {
        key: TuringKey {
            state: fields[0][0].clone(),
            read: parse_tape_symbol(&fields[1][0], blank, entry.line)?,
        },
        target: TuringTarget {
            state: fields[2][0].clone(),
            write: parse_tape_symbol(&fields[2][1], blank, entry.line)?,
            direction: parse_direction(&fields[2][2], entry.line)?,
        },
    })
}

/// Checks the shape of a transition line. `0` in `shape` means "one or more items".
fn expect_fields<'e>(
    entry: &'e Entry,
    shape: &[usize],
    syntax: &str,
) -> Result<&'e [Vec<String>], AutomatonError> {
    if entry.fields.len() != shape.len() {
        return Err(AutomatonError::malformed(
            entry.line,
            format!(
                "expected {} fields separated by '>' (`{syntax}`), found {}",
                shape.len(),
                entry.fields.len()
            ),
        ));
    }

    for (i, (items, &expected)) in entry.fields.iter().zip(shape).enumerate() {
        if expected != 0 && items.len() != expected {
            return Err(AutomatonError::malformed(
                entry.line,
                format!(
                    "expected {expected} item(s) in field {} of `{syntax}`, found {}",
                    i + 1,
                    items.len()
                ),
            ));
        }
    }

    Ok(&entry.fields)
}

/// A list entry must not contain `>` separators.
fn expect_list(entry: &Entry) -> Result<&[String], AutomatonError> {
    match entry.fields.as_slice() {
        [items] => Ok(items),
        fields => Err(AutomatonError::malformed(
            entry.line,
            format!(
                "expected a comma separated list, found {} fields separated by '>'",
                fields.len()
            ),
        )),
    }
}

fn is_epsilon(token: &str) -> bool {
    EPSILON_MARKERS
        .iter()
        .any(|marker| marker.eq_ignore_ascii_case(token))
}

/// Parses a single-character symbol.
fn parse_symbol(token: &str, line: usize, what: &str) -> Result<char, AutomatonError> {
    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(symbol), None) => Ok(symbol),
        _ => Err(AutomatonError::malformed(
            line,
            format!("expected a single-character {what}, found `{token}`"),
        )),
    }
}

/// An input symbol, or `None` for epsilon.
fn parse_input_symbol(token: &str, line: usize) -> Result<Option<char>, AutomatonError> {
    if is_epsilon(token) {
        return Ok(None);
    }
    parse_symbol(token, line, "input symbol").map(Some)
}

/// A tape symbol; the blank markers stand for the machine's blank symbol.
fn parse_tape_symbol(token: &str, blank: char, line: usize) -> Result<char, AutomatonError> {
    if BLANK_MARKERS
        .iter()
        .any(|marker| marker.eq_ignore_ascii_case(token))
    {
        return Ok(blank);
    }
    parse_symbol(token, line, "tape symbol")
}

/// Supports `L`, `<`, `←` for Left and `R`, `→` for Right. Stay moves are rejected.
fn parse_direction(token: &str, line: usize) -> Result<Direction, AutomatonError> {
    match token {
        "L" | "l" | "<" | "←" => Ok(Direction::Left),
        "R" | "r" | "→" => Ok(Direction::Right),
        "S" | "s" | "-" | "N" => Err(AutomatonError::malformed(
            line,
            format!("the head must move left or right, `{token}` (stay) is not allowed"),
        )),
        _ => Err(AutomatonError::malformed(
            line,
            format!("unsupported direction `{token}` (expected L or R)"),
        )),
    }
}
