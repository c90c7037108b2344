use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ferry_boa::{BoaEngine, number_to_raw};
use ferry_core::{Bridge, CallResult, RawValue, Signature, TypeTag};
use std::fmt::Display;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::filter::EnvFilter;

mod config;
mod exports;

#[derive(Parser)]
#[command(name = "ferry", version, about = "Managed/JavaScript call bridge")]
struct Cli {
    /// Config file (default: ferry.toml in the current or a parent directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print bridge statistics as JSON to stderr when done
    #[arg(long, global = true)]
    stats: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a JavaScript expression
    Eval { expr: String },
    /// Bind and call a demo export, e.g. `call "[MicroBenchmarks] BP.BenchmarkExports:Sum" ii 1 2`
    Call {
        name: String,
        signature: String,
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Run a script with the `Ferry` global installed
    Run { entry: PathBuf },
    /// List the demo exports
    Exports,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(config.logging.filter.parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    debug!(bridge = ?config.bridge, "Loaded configuration");
    let bridge = Bridge::builder().config(config.bridge).build();
    exports::install(&bridge)?;
    let mut engine = BoaEngine::new(bridge.clone())?;

    let code = match cli.command {
        Commands::Eval { expr } => report(engine.eval(&expr)),
        Commands::Call {
            name,
            signature,
            args,
        } => {
            let raws = parse_args(&signature, &args)?;
            report(bridge.call(&mut engine, &name, &signature, raws))
        }
        Commands::Run { entry } => {
            let source = std::fs::read_to_string(&entry)
                .with_context(|| format!("Failed to read {}", entry.display()))?;
            report(engine.eval(&source))
        }
        Commands::Exports => {
            for name in bridge.exports().map(|e| e.names()).unwrap_or_default() {
                println!("{}", name);
            }
            0
        }
    };

    if cli.stats {
        let stats = serde_json::json!({
            "bridge": bridge.stats(),
            "interns": bridge.interns().stats(),
        });
        eprintln!("{}", serde_json::to_string_pretty(&stats)?);
    }

    Ok(exit_code(code))
}

/// Print the outcome and return its exception code
fn report<T: Display>(result: CallResult<T>) -> i32 {
    let code = result.code();
    match result {
        CallResult::Completed(value) => println!("{}", value),
        CallResult::Faulted(fault) => eprintln!("error: {}", fault),
    }
    code
}

fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code)
        .map(ExitCode::from)
        .unwrap_or(ExitCode::FAILURE)
}

/// Turn command-line words into raw values according to the signature
fn parse_args(signature_text: &str, args: &[String]) -> Result<Vec<RawValue>> {
    let signature = Signature::parse(signature_text)?;
    args.iter()
        .enumerate()
        .map(|(index, text)| parse_arg(signature.param(index), text))
        .collect()
}

fn parse_arg(tag: &TypeTag, text: &str) -> Result<RawValue> {
    let raw = match tag {
        TypeTag::Int32 => RawValue::Int32(
            text.parse()
                .with_context(|| format!("'{}' is not an int32", text))?,
        ),
        TypeTag::Float64 => RawValue::Float64(
            text.parse()
                .with_context(|| format!("'{}' is not a float64", text))?,
        ),
        TypeTag::String | TypeTag::InternedString => RawValue::from(text),
        _ => match text.parse::<f64>() {
            Ok(n) => number_to_raw(n),
            Err(_) => RawValue::from(text),
        },
    };
    Ok(raw)
}
