// pipeflow-cli/src/main.rs

use anyhow::Context as _;
use clap::Parser;
use pipeflow::script::source_of;
use pipeflow::stages::{EchoSink, StdinSource};
use pipeflow::{compile, run_io, Registry, RunContext, Runnable};
use std::process::ExitCode;
use tracing::{event, Level};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pipeflow", about = "Run a pipeline script over standard input")]
struct Cli {
  /// Log at debug level, regardless of RUST_LOG.
  #[arg(long)]
  debug: bool,

  /// Describe every available stage and exit.
  #[arg(long)]
  lib: bool,

  /// Describe one stage and exit.
  #[arg(long, value_name = "NAME")]
  pkg: Option<String>,

  /// The script, inline or as a path to a script file.
  #[arg(value_name = "SCRIPT")]
  script: Option<String>,
}

fn init_tracing(debug: bool) {
  let filter = match debug {
    true => EnvFilter::new("debug"),
    false => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .init();
}

async fn run_script(registry: &Registry, script: &str) -> anyhow::Result<bool> {
  let source = source_of(script)?;
  let modules = compile(&source, registry)?;

  let ctx = RunContext::new();
  let cancel = ctx.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      event!(Level::WARN, "Interrupted, cancelling pipeline.");
      cancel.cancel();
    }
  });

  let outcome = run_io(
    &ctx,
    Runnable::new(StdinSource),
    modules,
    Runnable::new(EchoSink::stdout()),
  )
  .await;

  if let Err(e) = ctx.scope().release() {
    eprintln!("{}", e);
  }

  match outcome {
    Ok(()) => Ok(true),
    Err(failures) => {
      for failure in failures.failures() {
        eprintln!("{}", failure);
      }
      Ok(false)
    }
  }
}

async fn run_cli(cli: Cli) -> anyhow::Result<bool> {
  let registry = Registry::builtin();

  if cli.lib {
    for definition in registry.sorted() {
      println!("{}\n", definition.help());
    }
    return Ok(true);
  }
  if let Some(name) = &cli.pkg {
    println!("{}", registry.help(name)?);
    return Ok(true);
  }

  let script = cli.script.context("no script given (see --help)")?;
  run_script(&registry, &script).await
}

#[tokio::main]
async fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.debug);

  match run_cli(cli).await {
    Ok(true) => ExitCode::SUCCESS,
    Ok(false) => ExitCode::FAILURE,
    Err(e) => {
      eprintln!("{:#}", e);
      ExitCode::FAILURE
    }
  }
}
