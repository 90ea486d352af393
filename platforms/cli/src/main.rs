use automata::{
    encode, execute, unreachable_states, AutomatonError, Definition, DefinitionLoader, Driver,
    Execution, Kind, Limits, Options, ProgramManager, Snapshot, Verdict,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::collections::BTreeSet;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::EnvFilter;

const EXIT_ACCEPTED: u8 = 0;
const EXIT_REJECTED: u8 = 1;
const EXIT_ERROR: u8 = 2;
const EXIT_UNDECIDED: u8 = 3;

#[derive(Parser)]
#[clap(author, version, about, long_about = None, arg_required_else_help = true)]
struct Cli {
    /// Log at debug level unless RUST_LOG is set
    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a definition on an input. Without an input, read from standard input
    Run(RunArgs),
    /// Print a summary and the canonical text of a definition
    Show {
        /// Machine kind: dfa, nfa, pda or tm
        kind: Kind,
        /// Definition file, or the name of a built-in definition
        definition: String,
    },
    /// List the built-in definitions
    List,
}

#[derive(Args)]
struct RunArgs {
    /// Machine kind: dfa, nfa, pda or tm
    kind: Kind,

    /// Definition file, or the name of a built-in definition
    definition: String,

    /// The input string. DFA and NFA definitions step interactively when omitted
    input: Option<String>,

    /// Print the configurations of the run
    #[clap(long)]
    trace: bool,

    /// Give up on a Turing machine after this many moves
    #[clap(long)]
    max_steps: Option<usize>,

    /// Give up on a pushdown run after deriving this many reachability transitions
    #[clap(long)]
    max_configurations: Option<usize>,

    #[clap(long, value_enum, default_value_t = Format::Text)]
    format: Format,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Serialize)]
struct Report<'a> {
    input: &'a str,
    #[serde(flatten)]
    execution: &'a Execution,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(io::stderr)
        .init();

    let result = match cli.command {
        Command::Run(args) => run(&args),
        Command::Show { kind, definition } => show(kind, &definition),
        Command::List => {
            list();
            Ok(EXIT_ACCEPTED)
        }
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Loads `name` as a file when it exists, otherwise as a built-in definition.
fn resolve(kind: Kind, name: &str) -> Result<Definition, AutomatonError> {
    let path = Path::new(name);
    let definition = if path.exists() {
        DefinitionLoader::load(path, kind)?
    } else {
        ProgramManager::get(name, kind)
            .map(|program| program.definition.clone())
            .ok_or_else(|| {
                AutomatonError::FileError(format!(
                    "'{name}' is neither a file nor a built-in {kind} definition"
                ))
            })?
    };

    let unreachable = unreachable_states(&definition);
    if !unreachable.is_empty() {
        warn!(states = ?unreachable, "definition has unreachable states");
    }
    Ok(definition)
}

fn run(args: &RunArgs) -> Result<u8, AutomatonError> {
    let definition = resolve(args.kind, &args.definition)?;
    let options = Options {
        limits: Limits {
            max_steps: args.max_steps,
            max_configurations: args.max_configurations,
        },
        trace: args.trace,
    };

    if let Some(input) = &args.input {
        let execution = execute(&definition, input, &options);
        print_execution(input, &execution, args.format, false);
        return Ok(exit_code(&execution.verdict));
    }

    if definition.kind().is_finite() {
        return interactive(&definition);
    }

    // one input per line; the exit code follows the last verdict
    let mut code = EXIT_ACCEPTED;
    let terminal = atty::is(atty::Stream::Stdin);
    while let Some(line) = prompt(terminal, "input> ")? {
        match line.as_str() {
            "quit" | "exit" => break,
            input => {
                let execution = execute(&definition, input, &options);
                print_execution(input, &execution, args.format, true);
                code = exit_code(&execution.verdict);
            }
        }
    }
    Ok(code)
}

fn exit_code(verdict: &Verdict) -> u8 {
    match verdict {
        Verdict::Accepted => EXIT_ACCEPTED,
        Verdict::Rejected(_) => EXIT_REJECTED,
        Verdict::Undecided(_) => EXIT_UNDECIDED,
    }
}

/// Reads one line from stdin, printing `text` first on a terminal. `None` at end of input.
fn prompt(interactive: bool, text: &str) -> Result<Option<String>, AutomatonError> {
    if interactive {
        print!("{text}");
        io::stdout().flush().map_err(io_error)?;
    }

    let mut line = String::new();
    let read = io::stdin().lock().read_line(&mut line).map_err(io_error)?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

fn io_error(e: io::Error) -> AutomatonError {
    AutomatonError::FileError(format!("Failed to access the terminal: {e}"))
}

fn print_execution(input: &str, execution: &Execution, format: Format, labelled: bool) {
    if format == Format::Json {
        let report = Report { input, execution };
        match serde_json::to_string(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Error: failed to serialize result: {e}"),
        }
        return;
    }

    for snapshot in &execution.trace {
        println!("{}", render_snapshot(snapshot));
    }
    if labelled {
        println!("{input:?}: {}", execution.verdict);
    } else {
        println!("{}", execution.verdict);
    }
}

fn render_snapshot(snapshot: &Snapshot) -> String {
    match snapshot {
        Snapshot::Finite { position, states } => {
            format!("{position:>4}  {{{}}}", states.join(", "))
        }
        Snapshot::Pushdown {
            state,
            position,
            stack,
        } => format!("{position:>4}  {state:<10} stack: {stack}"),
        Snapshot::Turing {
            step,
            state,
            head,
            tape,
        } => format!("{step:>4}  {state:<10} head: {head:<4} tape: {tape}"),
    }
}

fn render_set(states: &BTreeSet<String>) -> String {
    format!(
        "{{{}}}",
        states.iter().cloned().collect::<Vec<_>>().join(", ")
    )
}

/// Steps a finite automaton one symbol at a time until `quit` or end of input.
fn interactive(definition: &Definition) -> Result<u8, AutomatonError> {
    let mut driver = Driver::new(definition)?;
    let terminal = atty::is(atty::Stream::Stdin);
    let alphabet: String = definition.alphabet().iter().collect();

    if terminal {
        println!("Enter symbols from {{{alphabet}}}. Commands: moves, reset, quit.");
    }
    report(&driver);

    while let Some(line) = prompt(terminal, "> ")? {
        match line.trim() {
            "" => continue,
            "quit" | "exit" => break,
            "reset" => {
                driver.reset();
                report(&driver);
            }
            "moves" => {
                for (symbol, states) in driver.preview() {
                    println!("  {symbol} -> {}", render_set(&states));
                }
            }
            symbols => {
                let symbols: Vec<char> = symbols.chars().filter(|c| !c.is_whitespace()).collect();
                if let Some(bad) = symbols
                    .iter()
                    .find(|c| !definition.alphabet().contains(*c))
                {
                    println!("'{bad}' is not in the alphabet {{{alphabet}}}");
                    continue;
                }
                for symbol in symbols {
                    driver.step(symbol);
                }
                report(&driver);
            }
        }
    }

    Ok(if driver.is_accepting() {
        EXIT_ACCEPTED
    } else {
        EXIT_REJECTED
    })
}

fn report(driver: &Driver) {
    let consumed: String = driver.consumed().iter().collect();
    if driver.is_stuck() {
        println!("[{consumed}] stuck, no state is reachable (reset to start over)");
    } else if driver.is_accepting() {
        println!("[{consumed}] {} accepting", render_set(driver.states()));
    } else {
        println!("[{consumed}] {}", render_set(driver.states()));
    }
}

fn show(kind: Kind, name: &str) -> Result<u8, AutomatonError> {
    let definition = resolve(kind, name)?;
    let list = |items: Vec<String>| items.join(", ");

    if !definition.name().is_empty() {
        println!("Name:        {}", definition.name());
    }
    println!("Kind:        {}", definition.kind());
    println!("States:      {}", list(definition.states().to_vec()));
    println!(
        "Alphabet:    {}",
        list(definition.alphabet().iter().map(char::to_string).collect())
    );
    println!("Start:       {}", definition.start());
    println!(
        "Accept:      {}",
        list(definition.accept().iter().cloned().collect())
    );
    println!("Transitions: {}", definition.transition_count());

    let unreachable = unreachable_states(&definition);
    if !unreachable.is_empty() {
        println!("Unreachable: {}", list(unreachable));
    }

    println!();
    print!("{}", encode(&definition));
    Ok(EXIT_ACCEPTED)
}

fn list() {
    for info in ProgramManager::list() {
        println!(
            "{:<16} {:<4} {} states, {} transitions",
            info.name,
            info.kind.as_str(),
            info.state_count,
            info.transition_count
        );
    }
}
