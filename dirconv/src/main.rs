//! Run an external converter in every subdirectory and collect its outputs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use dirconv::batch::run_batch;
use dirconv::core::classify::batch_exit_code;
use dirconv::core::types::{BatchSummary, DirOutcome};
use dirconv::exit_codes;
use dirconv::io::config::{BatchConfig, CONFIG_FILE_NAME, ConfigOverrides, load_config};
use dirconv::io::converter::ProcessConverter;
use dirconv::io::init::{InitOptions, init_config};
use dirconv::plan::{PlanStatus, build_plan};

#[derive(Parser)]
#[command(
    name = "dirconv",
    version,
    about = "Run a converter in every subdirectory and collect its outputs"
)]
struct Cli {
    /// Directory whose subdirectories are processed.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Config file (defaults to `<root>/dirconv.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default `dirconv.toml` into the root.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// List subdirectories and whether each would be processed.
    Plan,
    /// Convert every ready subdirectory.
    Run {
        /// Stop at the first failing directory.
        #[arg(long)]
        fail_fast: bool,
        /// Replace outputs that already exist in the root.
        #[arg(long)]
        overwrite: bool,
        /// Leave the staged helper in each subdirectory.
        #[arg(long)]
        keep_helper: bool,
    },
}

fn main() {
    dirconv::logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.root.join(CONFIG_FILE_NAME));
    debug!(root = %cli.root.display(), config = %config_path.display(), "resolved paths");
    match cli.command {
        Command::Init { force } => cmd_init(&cli.root, force),
        Command::Plan => cmd_plan(&cli.root, &config_path),
        Command::Run {
            fail_fast,
            overwrite,
            keep_helper,
        } => {
            let overrides = ConfigOverrides {
                fail_fast,
                overwrite,
                keep_helper,
            };
            cmd_run(&cli.root, &config_path, &overrides)
        }
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let path = init_config(root, &InitOptions { force })?;
    println!("init: wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_plan(root: &Path, config_path: &Path) -> Result<i32> {
    let cfg = load_config(config_path).context("load config")?;
    let plan = build_plan(root, &cfg)?;
    let (mut ready, mut skipped, mut failed) = (0usize, 0usize, 0usize);
    for entry in &plan {
        match &entry.status {
            PlanStatus::Ready => {
                ready += 1;
                println!("ready {}", entry.candidate.name);
            }
            PlanStatus::Skip(reason) => {
                skipped += 1;
                println!("skip {} ({})", entry.candidate.name, reason);
            }
            PlanStatus::Fail(reason) => {
                failed += 1;
                println!("error {} ({})", entry.candidate.name, reason);
            }
        }
    }
    println!("plan: ready={ready} skipped={skipped} failed={failed}");
    if failed > 0 {
        return Ok(exit_codes::PARTIAL);
    }
    if ready == 0 {
        return Ok(exit_codes::EMPTY);
    }
    Ok(exit_codes::OK)
}

fn cmd_run(root: &Path, config_path: &Path, overrides: &ConfigOverrides) -> Result<i32> {
    let cfg: BatchConfig = overrides.apply(load_config(config_path).context("load config")?);
    let converter = ProcessConverter::new(cfg.command.clone())?;
    let summary = run_batch(root, &cfg, &converter, print_outcome)?;
    print_summary(&summary);
    Ok(batch_exit_code(&summary.outcomes))
}

fn print_outcome(outcome: &DirOutcome) {
    let mut line = format!("{} {}", outcome.status.label(), outcome.name);
    if !outcome.collected.is_empty() {
        line.push_str(&format!(" -> {}", outcome.collected.join(", ")));
    }
    if let Some(message) = &outcome.message {
        line.push_str(&format!(" ({message})"));
    }
    println!("{line}");
}

fn print_summary(summary: &BatchSummary) {
    let counts = &summary.counts;
    println!(
        "run: id={} converted={} skipped={} failed={} outputs={}{}",
        summary.run_id,
        counts.converted,
        counts.skipped,
        counts.failed,
        counts.outputs,
        if summary.stopped_early {
            " stopped_early=true"
        } else {
            ""
        }
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["dirconv", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false }));
        assert_eq!(cli.root, PathBuf::from("."));
    }

    #[test]
    fn parse_run_flags_and_global_root() {
        let cli = Cli::parse_from(["dirconv", "run", "--fail-fast", "--root", "books"]);
        assert!(matches!(
            cli.command,
            Command::Run {
                fail_fast: true,
                overwrite: false,
                keep_helper: false,
            }
        ));
        assert_eq!(cli.root, PathBuf::from("books"));
    }

    #[test]
    fn parse_plan_with_config() {
        let cli = Cli::parse_from(["dirconv", "--config", "alt.toml", "plan"]);
        assert!(matches!(cli.command, Command::Plan));
        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
    }
}
