//! CLI tool for running bytecode programs
//!
//! Usage:
//!   tsbc run [options] <file>...     Link and run assembly (.tsbc) or object (.json) files
//!   tsbc disasm <file>...            Print the linked program as assembly
//!   tsbc resume [options] <snapshot> Continue a dumped VM
//!
//! Options:
//!   --step-limit <n>    Abort after n instructions
//!   --gc-interval <n>   Collect after every n allocations (0 = on demand)
//!   --max-depth <n>     Maximum call stack depth
//!   --dump <path>       Write a JSON snapshot when stopping at the step limit
//!
//! Logging is controlled with `RUST_LOG` (e.g. `RUST_LOG=tsbc=trace`).

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tsbc::{ObjectFile, StepResult, Value, Vm, assemble, disassemble, link};

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    Disasm,
    Resume,
}

/// CLI configuration
struct Config {
    command: Command,
    inputs: Vec<PathBuf>,
    step_limit: Option<u64>,
    gc_interval: Option<usize>,
    max_depth: Option<usize>,
    dump_path: Option<PathBuf>,
}

fn usage(program_name: &str) -> String {
    format!(
        "Usage: {} <run|disasm|resume> [--step-limit <n>] [--gc-interval <n>] [--max-depth <n>] [--dump <path>] <file>...",
        program_name
    )
}

fn parse_value<T: std::str::FromStr>(
    args: &[String],
    i: usize,
    flag: &str,
) -> Result<T, String> {
    args.get(i)
        .ok_or_else(|| format!("{} requires a value", flag))?
        .parse::<T>()
        .map_err(|_| format!("{} must be a non-negative integer", flag))
}

fn parse_args() -> Result<Config, String> {
    let args: Vec<String> = env::args().collect();
    let program_name = args.first().map_or("tsbc", |s| s.as_str());

    let command = match args.get(1).map(String::as_str) {
        Some("run") => Command::Run,
        Some("disasm") => Command::Disasm,
        Some("resume") => Command::Resume,
        _ => return Err(usage(program_name)),
    };

    let mut config = Config {
        command,
        inputs: Vec::new(),
        step_limit: None,
        gc_interval: None,
        max_depth: None,
        dump_path: None,
    };

    let mut i = 2;
    while i < args.len() {
        let Some(arg) = args.get(i) else {
            break;
        };
        match arg.as_str() {
            "--step-limit" => {
                i += 1;
                config.step_limit = Some(parse_value(&args, i, "--step-limit")?);
            }
            "--gc-interval" => {
                i += 1;
                config.gc_interval = Some(parse_value(&args, i, "--gc-interval")?);
            }
            "--max-depth" => {
                i += 1;
                config.max_depth = Some(parse_value(&args, i, "--max-depth")?);
            }
            "--dump" => {
                i += 1;
                let path = args
                    .get(i)
                    .ok_or_else(|| "--dump requires a value".to_string())?;
                config.dump_path = Some(PathBuf::from(path));
            }
            other if other.starts_with('-') => {
                return Err(format!("Unknown option: {}", other));
            }
            other => config.inputs.push(PathBuf::from(other)),
        }
        i += 1;
    }

    if config.inputs.is_empty() {
        return Err(usage(program_name));
    }
    if config.command == Command::Resume && config.inputs.len() != 1 {
        return Err("resume takes exactly one snapshot file".to_string());
    }
    Ok(config)
}

/// Load one input: `.json` files hold a serialized object file, anything
/// else is assembly text
fn load_object_file(path: &Path) -> Result<ObjectFile, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
    if is_json {
        serde_json::from_str(&text).map_err(|e| format!("{}: {}", path.display(), e))
    } else {
        assemble(&text).map_err(|e| format!("{}: {}", path.display(), e))
    }
}

fn link_inputs(inputs: &[PathBuf]) -> Result<ObjectFile, String> {
    let files = inputs
        .iter()
        .map(|path| load_object_file(path))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(link(&files))
}

fn run() -> Result<(), String> {
    let config = parse_args()?;

    let mut vm = match config.command {
        Command::Disasm => {
            let file = link_inputs(&config.inputs)?;
            print!("{}", disassemble(&file));
            return Ok(());
        }
        Command::Run => {
            let file = link_inputs(&config.inputs)?;
            Vm::with_builtins(file).map_err(|e| e.to_string())?
        }
        Command::Resume => {
            let path = config
                .inputs
                .first()
                .ok_or_else(|| "resume requires a snapshot file".to_string())?;
            let json = fs::read_to_string(path)
                .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
            let mut vm = Vm::with_builtins(ObjectFile::default()).map_err(|e| e.to_string())?;
            vm.load_json(&json).map_err(|e| e.to_string())?;
            vm
        }
    };

    if let Some(interval) = config.gc_interval {
        vm.set_gc_interval(interval);
    }
    if let Some(depth) = config.max_depth {
        vm.set_max_call_depth(depth);
    }
    log::debug!("{:?}", vm.config());

    let start = Instant::now();
    let mut steps: u64 = 0;
    loop {
        if config.step_limit.is_some_and(|limit| steps >= limit) {
            log::info!("step limit reached after {:?}", start.elapsed());
            let Some(path) = &config.dump_path else {
                return Err(format!("step limit of {} reached", steps));
            };
            let json = vm.dump_json().map_err(|e| e.to_string())?;
            fs::write(path, json)
                .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
            eprintln!("Snapshot written to {}", path.display());
            return Ok(());
        }
        let step = match vm.step() {
            Ok(step) => step,
            // already reported through the console
            Err(e) if e.is_uncaught() => std::process::exit(1),
            Err(e) => return Err(e.to_string()),
        };
        match step {
            StepResult::Continue => steps += 1,
            StepResult::Complete(value) => {
                log::info!(
                    "finished in {} steps, {:?}, {:?}",
                    steps,
                    start.elapsed(),
                    vm.gc_stats()
                );
                if !matches!(value, Value::Undefined) {
                    println!("{}", vm.inspect(&value));
                }
                return Ok(());
            }
        }
    }
}
