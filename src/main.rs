//! `oak`: the command-line driver for the OakScript pipeline.
//!
//! Three subcommands: `run` compiles a source file in memory and executes
//! it; `compile` writes a bytecode container to disk; `runbytecode` loads a
//! container and executes it. Exit code is 0 on success and non-zero on any
//! compile or runtime error, with the error printed to stderr via the
//! `anyhow` chain.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;

use oakscript::{Container, OakVm};

#[derive(Parser)]
#[command(name = "oak", version, about = "Compiler and VM for OakScript")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable VM instruction tracing (one line per executed opcode).
    #[arg(long, global = true)]
    trace: bool,

    /// Raise log verbosity; repeat for more (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a source file in memory and execute it.
    Run { source: PathBuf },
    /// Compile a source file to a bytecode container on disk.
    Compile { source: PathBuf, output: PathBuf },
    /// Load a bytecode container and execute it.
    Runbytecode { path: PathBuf },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(level),
    );
    // OAKSCRIPT_DEBUG_LOG, when set, mirrors trace-level records to a file
    // in addition to the usual stderr target.
    if let Ok(path) = std::env::var("OAKSCRIPT_DEBUG_LOG") {
        if let Ok(file) = fs::OpenOptions::new().create(true).append(true).open(&path) {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
    }
    let _ = builder.try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Run { source } => {
            let text = fs::read_to_string(&source)
                .with_context(|| format!("reading {}", source.display()))?;
            let container = oakscript::compile(&text).context("compiling source")?;
            execute(container, cli.trace)?;
        }
        Command::Compile { source, output } => {
            let text = fs::read_to_string(&source)
                .with_context(|| format!("reading {}", source.display()))?;
            let container = oakscript::compile(&text).context("compiling source")?;
            fs::write(&output, container.to_bytes())
                .with_context(|| format!("writing {}", output.display()))?;
        }
        Command::Runbytecode { path } => {
            let bytes =
                fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            let container = Container::from_bytes(&bytes).context("loading bytecode container")?;
            execute(container, cli.trace)?;
        }
    }
    Ok(())
}

fn execute(container: Container, trace: bool) -> Result<()> {
    let mut vm = OakVm::new(container)
        .context("initializing VM")?
        .with_trace(trace);
    vm.run().context("running program")?;
    Ok(())
}
