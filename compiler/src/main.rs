use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use lfc::descriptor::ChainDescriptor;
use lfc::emit::CompileOptions;
use lfc::pass::PassId;
use lfc::pipeline::{run_pipeline, CompilationState};
use lfc::pool::{ArrayPool, SharedPool};
use lfc::render::FusedChain;
use lfc::types::Type;
use lfc::value::Value;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum EmitStage {
    /// Rust-flavoured source of every fused chain
    Rust,
    /// Rendered fused bodies as JSON
    Ir,
    /// Chain descriptors as JSON
    Descriptors,
    /// Static element count and loop count per chain
    Count,
    /// Execute one chain and print its result
    Run,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum InputFormat {
    /// `.lfc` chain definitions
    Lfc,
    /// JSON array of chain descriptors
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "lfc",
    version,
    about = "Lazy-chain Fusion Compiler — fuses sequence operator chains into single-loop iterators"
)]
struct Cli {
    /// Input file
    source: PathBuf,

    /// Input format
    #[arg(long, value_enum, default_value_t = InputFormat::Lfc)]
    format: InputFormat,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Rust)]
    emit: EmitStage,

    /// Output file path (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Restrict output to one chain; required by `--emit run` with several chains
    #[arg(long)]
    chain: Option<String>,

    /// Chain argument for `--emit run`, as `name=value` (repeatable)
    #[arg(long = "arg", value_name = "NAME=VALUE")]
    args: Vec<String>,

    /// Omit the provenance header from emitted source
    #[arg(long)]
    no_provenance: bool,

    /// Log passes and timing (overridden by RUST_LOG)
    #[arg(long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let source = match std::fs::read_to_string(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("lfc: error: {}: {}", cli.source.display(), e);
            return ExitCode::from(2);
        }
    };
    let file = cli.source.display().to_string();

    // ── Build the initial state ──
    let mut state = match cli.format {
        InputFormat::Lfc => {
            let parse_result = lfc::parser::parse(&source);
            if !parse_result.errors.is_empty() {
                for err in &parse_result.errors {
                    let (line, col) = lfc::diag::line_col(&source, err.span().start);
                    eprintln!("{file}:{line}:{col}: parse error: {err}");
                }
                return ExitCode::FAILURE;
            }
            let Some(program) = parse_result.program else {
                eprintln!("lfc: parse failed with no output");
                return ExitCode::FAILURE;
            };
            CompilationState::from_program(source.clone(), program)
        }
        InputFormat::Json => match serde_json::from_str::<Vec<ChainDescriptor>>(&source) {
            Ok(descriptors) => CompilationState::from_descriptors(source.clone(), descriptors),
            Err(e) => {
                eprintln!("{file}: error[E0300]: invalid chain descriptors: {e}");
                return ExitCode::FAILURE;
            }
        },
    };

    // ── Run passes ──
    let terminal = match cli.emit {
        EmitStage::Rust => PassId::Emit,
        EmitStage::Descriptors => PassId::Bind,
        EmitStage::Ir | EmitStage::Count | EmitStage::Run => PassId::Render,
    };
    let options = CompileOptions {
        provenance: !cli.no_provenance,
    };
    let result = run_pipeline(&mut state, terminal, &options, |_, diags| {
        for d in diags {
            eprintln!("{}", d.render(&file, &source));
        }
    });
    if result.is_err() {
        return ExitCode::FAILURE;
    }

    // ── Produce output ──
    let output = match cli.emit {
        EmitStage::Rust => state
            .artifacts
            .generated
            .map(|g| g.rust_source)
            .unwrap_or_default(),
        EmitStage::Descriptors => {
            let descriptors: Vec<&ChainDescriptor> = state
                .artifacts
                .descriptors
                .iter()
                .flatten()
                .filter(|d| cli.chain.as_deref().map_or(true, |c| c == d.name))
                .collect();
            match serde_json::to_string_pretty(&descriptors) {
                Ok(json) => json + "\n",
                Err(e) => {
                    eprintln!("lfc: error[E0300]: {e}");
                    return ExitCode::FAILURE;
                }
            }
        }
        EmitStage::Ir => {
            let fused = selected(&state, cli.chain.as_deref());
            match serde_json::to_string_pretty(&fused) {
                Ok(json) => json + "\n",
                Err(e) => {
                    eprintln!("lfc: error[E0300]: {e}");
                    return ExitCode::FAILURE;
                }
            }
        }
        EmitStage::Count => selected(&state, cli.chain.as_deref())
            .iter()
            .map(|c| {
                let count = c
                    .static_count
                    .map_or_else(|| "unknown".to_string(), |n| n.to_string());
                format!("{}: count {count}, loops {}\n", c.name, c.loop_count)
            })
            .collect(),
        EmitStage::Run => match run(&state, cli.chain.as_deref(), &cli.args) {
            Ok(value) => format!("{value}\n"),
            Err(message) => {
                eprintln!("lfc: error: {message}");
                return ExitCode::FAILURE;
            }
        },
    };

    match &cli.output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, output) {
                eprintln!("lfc: error: {}: {}", path.display(), e);
                return ExitCode::from(2);
            }
        }
        None => print!("{output}"),
    }
    ExitCode::SUCCESS
}

fn selected<'s>(state: &'s CompilationState, chain: Option<&str>) -> Vec<&'s FusedChain> {
    state
        .artifacts
        .fused
        .iter()
        .flatten()
        .filter(|c| chain.map_or(true, |name| name == c.name))
        .collect()
}

fn run(state: &CompilationState, chain: Option<&str>, raw_args: &[String]) -> Result<Value, String> {
    let candidates = selected(state, chain);
    let fused = match (candidates.as_slice(), chain) {
        ([one], _) => *one,
        ([], Some(name)) => return Err(format!("no chain named `{name}`")),
        ([], None) => return Err("no chains to run".into()),
        (_, _) => return Err("several chains; pick one with --chain".into()),
    };

    let mut given = std::collections::HashMap::new();
    for raw in raw_args {
        let (name, value) = raw
            .split_once('=')
            .ok_or_else(|| format!("argument `{raw}` is not `name=value`"))?;
        given.insert(name.trim(), value.trim());
    }
    let mut args = Vec::new();
    for p in &fused.params {
        let text = given
            .remove(p.name.as_str())
            .ok_or_else(|| format!("missing argument `{}`", p.name))?;
        args.push(parse_arg(text, &p.ty).map_err(|e| format!("argument `{}`: {e}", p.name))?);
    }
    if let Some(extra) = given.keys().next() {
        return Err(format!("chain `{}` has no parameter `{extra}`", fused.name));
    }

    let pool: std::sync::Arc<dyn ArrayPool> = SharedPool::global();
    fused.call(args, pool).map_err(|e| e.to_string())
}

/// Parse a command-line argument as JSON and shape it to `ty`.
fn parse_arg(text: &str, ty: &Type) -> Result<Value, String> {
    let json: serde_json::Value = serde_json::from_str(text)
        .or_else(|_| serde_json::from_str(&format!("{text:?}")))
        .map_err(|e| e.to_string())?;
    from_json(&json, ty)
}

fn from_json(json: &serde_json::Value, ty: &Type) -> Result<Value, String> {
    use serde_json::Value as J;
    let mismatch = || format!("expected {ty}, found {json}");
    match (ty, json) {
        (Type::Int, J::Number(n)) => n
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .map(Value::Int)
            .ok_or_else(mismatch),
        (Type::Long, J::Number(n)) => n.as_i64().map(Value::Long).ok_or_else(mismatch),
        (Type::Double, J::Number(n)) => n.as_f64().map(Value::Double).ok_or_else(mismatch),
        (Type::Bool, J::Bool(b)) => Ok(Value::Bool(*b)),
        (Type::Str, J::String(s)) => Ok(Value::Str(s.clone())),
        (Type::List(elem) | Type::Seq(elem), J::Array(items)) => items
            .iter()
            .map(|item| from_json(item, elem))
            .collect::<Result<_, _>>()
            .map(Value::List),
        (Type::Object, J::Null) => Ok(Value::Null),
        (Type::Object, J::Bool(b)) => Ok(Value::Bool(*b)),
        (Type::Object, J::String(s)) => Ok(Value::Str(s.clone())),
        (Type::Object, J::Number(n)) => match n.as_i64() {
            Some(i) => Ok(i32::try_from(i).map_or(Value::Long(i), Value::Int)),
            None => n.as_f64().map(Value::Double).ok_or_else(mismatch),
        },
        (Type::Object, J::Array(_)) => from_json(json, &Type::List(Box::new(Type::Object))),
        _ => Err(mismatch()),
    }
}
