mod agent;
mod config;
mod llm;
mod sandbox;
mod skills;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::agent::{render_artifact, Envelope, TaskAgent};
use crate::config::Config;
use crate::sandbox::SecurityGate;
use crate::skills::{builtin, HandlerContext, RegistryBuilder};

fn print_help() {
    println!(
        "\
taskgate v{}

Runs plain-English instructions against a fixed catalogue of operations,
confined to a sandbox directory.

USAGE:
    taskgate [OPTIONS] [CONFIG_PATH]

ARGUMENTS:
    CONFIG_PATH    Path to TOML configuration file [default: config/taskgate.toml]

OPTIONS:
    -h, --help        Print this help message and exit
    -V, --version     Print version and exit
        --run TEXT    Run one instruction, print the result envelope and exit
        --read PATH   Print a file from the sandbox and exit

Without --run or --read, instructions are read from stdin, one per line,
and each result is printed as one JSON line. Lines starting with / are
commands (/read PATH, /actions, /status, /ping, /help).

ENVIRONMENT VARIABLES:
    Variables are referenced in the config file via ${{VAR_NAME}} syntax.

    RUST_LOG              Log level filter for tracing
                          (e.g. debug, taskgate=debug,warn)
    AIPROXY_TOKEN         API key for an OpenAI-compatible endpoint
    ANTHROPIC_API_KEY     API key for Anthropic Claude models

EXAMPLES:
    taskgate                                          # uses config/taskgate.toml
    taskgate --run \"count the Wednesdays in /data/dates.txt\"
    taskgate --read /data/dates-wednesdays.txt
    RUST_LOG=debug taskgate /etc/taskgate.toml       # with debug logging",
        env!("CARGO_PKG_VERSION"),
    );
}

/// What the binary was asked to do.
enum Mode {
    Interactive,
    Run(String),
    Read(String),
}

struct Args {
    config_path: String,
    mode: Mode,
}

fn parse_args() -> Result<Args> {
    let mut config_path = None;
    let mut mode = Mode::Interactive;
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("taskgate v{}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--run" => {
                let text = args.next().ok_or_else(|| anyhow!("--run needs an instruction"))?;
                mode = Mode::Run(text);
            }
            "--read" => {
                let path = args.next().ok_or_else(|| anyhow!("--read needs a path"))?;
                mode = Mode::Read(path);
            }
            flag if flag.starts_with('-') => {
                return Err(anyhow!("Unknown option: {flag} (see --help)"));
            }
            path => config_path = Some(path.to_string()),
        }
    }

    Ok(Args {
        config_path: config_path.unwrap_or_else(|| "config/taskgate.toml".to_string()),
        mode,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;

    // Logs go to stderr; stdout carries only results
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("taskgate=info")),
        )
        .init();

    info!("Loading configuration from {}", args.config_path);
    let config = Config::load(&args.config_path)?;

    let gate = Arc::new(SecurityGate::new(&config.sandbox)?);
    info!(
        "Sandbox: {} mounted at {}",
        gate.root().display(),
        gate.mount().display()
    );

    let services = llm::connect(&config.llm)?;
    info!("LLM: {}", config.llm.description());
    if services.embeddings.is_none() {
        info!("No embedding service for this provider, similarity search will fail");
    }

    let mut builder = RegistryBuilder::new();
    builtin::register_all(&mut builder, &config.handlers.disabled)?;
    let registry = Arc::new(builder.build());
    info!("Actions: {} registered", registry.len());

    let ctx = HandlerContext {
        gate,
        llm: services.completion,
        embeddings: services.embeddings,
        tools: config.tools.clone(),
    };
    let agent = TaskAgent::new(registry, ctx);

    match args.mode {
        Mode::Run(text) => {
            println!("{}", agent.submit(&text).await.to_json());
            Ok(())
        }
        Mode::Read(path) => {
            match agent.read_artifact(&path).await {
                Ok(artifact) => println!("{}", render_artifact(&artifact)),
                Err(e) => println!("{}", Envelope::from(e).to_json()),
            }
            Ok(())
        }
        Mode::Interactive => run_interactive(&agent).await,
    }
}

/// Reads instructions from stdin until EOF or Ctrl-C.
async fn run_interactive(agent: &TaskAgent) -> Result<()> {
    info!("Ready, reading instructions from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) if line.trim().is_empty() => continue,
                    Some(line) => println!("{}", agent.handle_line(&line).await),
                    None => {
                        info!("End of input, exiting");
                        return Ok(());
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, exiting");
                return Ok(());
            }
        }
    }
}
