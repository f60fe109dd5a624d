use std::path::{Component, Path, PathBuf};
use std::sync::Once;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use moonbridge::{Script, ScriptFunction, ScriptOptions, ScriptValue, Spread, ValueType, invoke_values};
use serde::Serialize;

mod repl;
#[cfg(test)]
mod main_test;

static TRACE_INIT: Once = Once::new();
const DEFAULT_TRACE_FILTER: &str = "moonbridge=debug,moonbridge_core=info,moonbridge_stdlib=info";

#[derive(Debug, Parser)]
#[command(name = "moon", author, version, about = "Inspect and drive moonbridge scripts", long_about = None)]
struct CliArgs {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    load: LoadArgs,
}

/// How the script's context is prepared.
#[derive(Debug, Clone, Args)]
struct LoadArgs {
    /// Open the standard library before running the script
    #[arg(long = "std", global = true)]
    load_std: bool,

    /// Run this file before the script (repeatable)
    #[arg(long = "dep", value_name = "FILE", global = true, value_parser = parse_sanitized_path)]
    dependencies: Vec<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load and run a script file.
    Run {
        #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
        file: PathBuf,
    },
    /// Print the value at a dotted path.
    Get {
        #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
        file: PathBuf,
        #[arg(value_name = "PATH")]
        path: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Call a script function and print its results.
    Call {
        #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
        file: PathBuf,
        #[arg(value_name = "FUNCTION")]
        function: String,
        /// Arguments: integers, numbers, true/false, nil, or text
        #[arg(value_name = "ARGS", allow_negative_numbers = true)]
        args: Vec<String>,
        /// Number of results the function returns
        #[arg(long, default_value_t = 1)]
        returns: usize,
        #[arg(long)]
        json: bool,
    },
    /// List the fields of a table with their types.
    Fields {
        #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
        file: PathBuf,
        #[arg(value_name = "PATH")]
        path: String,
        #[arg(long)]
        json: bool,
    },
    /// Interactive session in a script's context.
    Repl {
        #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
        file: PathBuf,
    },
}

fn sanitize_path(raw: &str) -> anyhow::Result<PathBuf> {
    let p = Path::new(raw);

    for comp in p.components() {
        if matches!(comp, Component::ParentDir) {
            return Err(anyhow::anyhow!(
                "Parent directory components ('..') are not allowed in file paths."
            ));
        }
    }

    Ok(p.to_path_buf())
}

fn parse_sanitized_path(raw: &str) -> Result<PathBuf, String> {
    sanitize_path(raw).map_err(|e| e.to_string())
}

fn env_toggle_enabled(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    !(trimmed.eq_ignore_ascii_case("0") || trimmed.eq_ignore_ascii_case("false") || trimmed.eq_ignore_ascii_case("off"))
}

fn filter_expr_from(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("1")
        || trimmed.eq_ignore_ascii_case("true")
        || trimmed.eq_ignore_ascii_case("on")
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn maybe_init_tracing() {
    let raw = match std::env::var("MOON_TRACE") {
        Ok(value) => value,
        Err(_) => return,
    };

    if !env_toggle_enabled(&raw) {
        return;
    }

    TRACE_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let filter_expr = filter_expr_from(&raw).or_else(|| std::env::var("RUST_LOG").ok());

        let builder = fmt().with_writer(std::io::stderr);

        let builder = match filter_expr.and_then(|expr| EnvFilter::try_new(expr).ok()) {
            Some(filter) => builder.with_env_filter(filter),
            None => builder.with_env_filter(DEFAULT_TRACE_FILTER),
        };

        let _ = builder.try_init();
    });
}

/// Reads a command-line argument as the script value it most likely means.
pub(crate) fn parse_value(raw: &str) -> ScriptValue {
    match raw {
        "nil" => ScriptValue::Nil,
        "true" => ScriptValue::Boolean(true),
        "false" => ScriptValue::Boolean(false),
        _ => {
            if let Ok(i) = raw.parse::<i64>() {
                ScriptValue::Integer(i)
            } else if let Ok(f) = raw.parse::<f64>() {
                ScriptValue::Number(f)
            } else {
                ScriptValue::String(raw.to_string())
            }
        }
    }
}

#[derive(Serialize)]
struct FieldEntry<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: ValueType,
}

fn open_script(file: &Path, load: &LoadArgs) -> anyhow::Result<Script> {
    let options = ScriptOptions::new()
        .standard_library(load.load_std)
        .dependencies(load.dependencies.iter().cloned());
    let name = file.to_string_lossy();
    Script::open_with(&name, options).with_context(|| format!("cannot load '{}'", name))
}

fn print_value(value: &ScriptValue, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(value)?);
    } else {
        println!("{}", value);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    maybe_init_tracing();

    let CliArgs { command, load } = CliArgs::parse();

    match command {
        Commands::Run { file } => {
            open_script(&file, &load)?;
        }
        Commands::Get { file, path, json } => {
            let script = open_script(&file, &load)?;
            let value = script.get::<ScriptValue>(&path)?;
            print_value(&value, json)?;
        }
        Commands::Call {
            file,
            function,
            args,
            returns,
            json,
        } => {
            let script = open_script(&file, &load)?;
            let function = ScriptFunction::new(&function, returns)?;
            let args = Spread(args.iter().map(|raw| parse_value(raw)).collect());
            let results = invoke_values(script.state()?, &function, args)?;
            if json {
                println!("{}", serde_json::to_string(&results)?);
            } else {
                for value in &results {
                    print_value(value, false)?;
                }
            }
        }
        Commands::Fields { file, path, json } => {
            let script = open_script(&file, &load)?;
            let fields = script.fields(&path)?;
            if json {
                let entries: Vec<FieldEntry<'_>> = fields
                    .iter()
                    .map(|(name, kind)| FieldEntry { name, kind: *kind })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for (name, kind) in &fields {
                    println!("{}\t{}", name, kind);
                }
            }
        }
        Commands::Repl { file } => {
            let script = open_script(&file, &load)?;
            repl::run(&script)?;
        }
    }
    Ok(())
}
