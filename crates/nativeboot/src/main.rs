//! # nativeboot
//!
//! ```bash
//! nativeboot                 # run every pending setup step, then build
//! nativeboot status          # show which steps are already done
//! nativeboot env bash        # print the composed environment for eval
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nativeboot::env::Shell;
use nativeboot::process::{HttpTransport, SystemRunner};
use nativeboot::{Bootstrap, Config, Host, StepFailed};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nativeboot", about = "Bootstrap a native build environment")]
struct Cli {
    /// Invocation root; all areas and checkouts are created under it
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Configuration file (default: <root>/bootstrap.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline (default)
    Run,
    /// Show which steps are already satisfied
    Status,
    /// Print the composed environment as shell exports
    Env {
        #[arg(value_enum, default_value_t = Shell::Bash)]
        shell: Shell,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    if let Err(err) = run(Cli::parse()) {
        log::error!("{err:#}");
        let code = err.downcast_ref::<StepFailed>().map_or(1, StepFailed::exit_code);
        std::process::exit(code);
    }
}

fn run(cli: Cli) -> Result<()> {
    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir().context("Reading current directory")?,
    };
    let config = Config::load(&root, cli.config.as_deref())?;

    let runner = SystemRunner;
    let transport = HttpTransport;
    let bootstrap = Bootstrap::new(
        &config,
        &root,
        Host {
            runner: &runner,
            transport: &transport,
            inherited_path: std::env::var_os("PATH"),
        },
    )?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let report = bootstrap.run()?;
            println!(
                "\n=== Bootstrap complete ({} ran, {} already done) ===",
                report.ran.len(),
                report.skipped.len()
            );
        }
        Command::Status => {
            println!("Bootstrap status ({}):\n", root.display());
            let steps = bootstrap.status();
            let done = steps.iter().filter(|(_, ok)| *ok).count();
            for (name, ok) in &steps {
                let mark = if *ok { "[done]   " } else { "[pending]" };
                println!("  {mark} {name}");
            }
            println!("\n  {done}/{} steps satisfied", steps.len());
        }
        Command::Env { shell } => {
            print!("{}", bootstrap.environment().exports(shell));
        }
    }

    Ok(())
}
