//! storebridge-inspect
//!
//! Offline companion to the bridge: loads a saved state tree, runs filter
//! patterns against it and prints what an inspector subscribed to those
//! filters would receive.

use std::path::PathBuf;

use serde_json::{Map, Value};
use storebridge::{BridgeConfig, FilterPattern, FilteredState, StateTree};
use tracing::debug;

/// Command line options
#[derive(Debug, Default)]
struct Options {
    /// State tree file; either `{ "root": {...} }` or the bare root node
    tree_file: Option<PathBuf>,
    /// Filter patterns, in the order given
    filters: Vec<String>,
    /// Bridge config supplying default filters
    config_file: Option<PathBuf>,
    /// Print expanded paths instead of projections
    expand_only: bool,
    /// Single-line output
    compact: bool,
}

const USAGE: &str = "\
storebridge-inspect - Preview filtered store state

USAGE:
    storebridge-inspect [OPTIONS] <TREE_FILE>

OPTIONS:
    -f, --filter <PATTERN>    Filter pattern, may be repeated [default: config filters]
    -c, --config <FILE>       Bridge config JSON
    -e, --expand              Print the concrete paths each filter expands to
        --compact             Print JSON on a single line
    -h, --help                Print help information";

enum Parsed {
    Run(Options),
    Help,
}

fn parse_args(args: &[String]) -> Result<Parsed, String> {
    let mut options = Options::default();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--filter" | "-f" => {
                let value = args.get(i + 1).ok_or("--filter requires a value")?;
                options.filters.push(value.clone());
                i += 2;
            }
            "--config" | "-c" => {
                let value = args.get(i + 1).ok_or("--config requires a value")?;
                options.config_file = Some(PathBuf::from(value));
                i += 2;
            }
            "--expand" | "-e" => {
                options.expand_only = true;
                i += 1;
            }
            "--compact" => {
                options.compact = true;
                i += 1;
            }
            "--help" | "-h" => return Ok(Parsed::Help),
            arg if arg.starts_with('-') => return Err(format!("unknown argument: {arg}")),
            arg => {
                if options.tree_file.is_some() {
                    return Err(format!("unexpected extra argument: {arg}"));
                }
                options.tree_file = Some(PathBuf::from(arg));
                i += 1;
            }
        }
    }

    if options.tree_file.is_none() {
        return Err("missing <TREE_FILE>".to_string());
    }
    Ok(Parsed::Run(options))
}

/// Accept both a full tree and a bare root node.
fn root_node(document: Value) -> Value {
    let wrapped = matches!(&document, Value::Object(map) if map.len() == 1 && map.get("root").is_some_and(Value::is_object));
    if wrapped {
        StateTree::from_value(document).root().clone()
    } else {
        document
    }
}

fn run(options: &Options) -> Result<Value, Box<dyn std::error::Error>> {
    let config = match &options.config_file {
        Some(path) => BridgeConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => BridgeConfig::default(),
    };
    let filters = if options.filters.is_empty() {
        config.default_filters.clone()
    } else {
        options.filters.clone()
    };

    let tree_file = options.tree_file.as_ref().ok_or("missing <TREE_FILE>")?;
    debug!(tree_file = %tree_file.display(), ?filters, "loading state tree");
    let document: Value = serde_json::from_str(&std::fs::read_to_string(tree_file)?)?;
    let root = root_node(document);

    let patterns: Vec<FilterPattern> = filters.iter().map(|raw| FilterPattern::parse(raw.as_str())).collect();
    if options.expand_only {
        let mut out = Map::new();
        for pattern in &patterns {
            let paths = pattern.expand(&root).into_iter().map(Value::String).collect();
            out.insert(pattern.as_str().to_string(), Value::Array(paths));
        }
        return Ok(Value::Object(out));
    }

    let states: Vec<FilteredState> = patterns
        .iter()
        .map(|pattern| FilteredState::compute(pattern, &root))
        .collect();
    Ok(serde_json::to_value(states)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(Parsed::Run(options)) => options,
        Ok(Parsed::Help) => {
            println!("{USAGE}");
            return Ok(());
        }
        Err(message) => {
            eprintln!("error: {message}");
            eprintln!();
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    };

    let output = run(&options)?;
    if options.compact {
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&output)?);
    }
    Ok(())
}
