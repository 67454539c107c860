//! startup-optimizer - inspect and trim programs launched at logon

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use startup_optimizer::startup::{OptimizationPlan, Optimizer, OptimizerConfig};

#[derive(Parser, Debug)]
#[command(name = "startup-optimizer")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory containing startup_rules.safe.json (default: next to the executable)
    #[arg(long)]
    base_path: Option<PathBuf>,

    /// Timeout for external listing tools, in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Log level used when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify startup entries without changing anything
    Scan,

    /// Classify and disable what the policy allows
    Optimize {
        /// Report what would be disabled, but don't apply
        #[arg(long)]
        dry_run: bool,
    },

    /// Undo earlier runs by restoring renamed files and values
    Restore,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let mut config = OptimizerConfig::default();
    if let Some(path) = cli.base_path {
        config.base_path = path;
    }
    config.external_timeout_secs = cli.timeout_secs;

    match cli.command {
        Commands::Scan => {
            let plan = Optimizer::system(config).scan();
            print_plan(&plan, cli.json)?;
        }
        Commands::Optimize { dry_run } => {
            config.apply = !dry_run;
            let report = Optimizer::system(config).run_detailed();
            for outcome in &report.sources {
                if let Err(ref reason) = outcome.result {
                    log::info!("{} unavailable: {}", outcome.source, reason);
                }
            }
            print_plan(&report.plan, cli.json)?;
        }
        Commands::Restore => {
            let outcomes = Optimizer::system(config).restore()?;
            if cli.json {
                let json = serde_json::to_string_pretty(&outcomes)
                    .context("failed to serialize restore results")?;
                println!("{}", json);
            } else if outcomes.is_empty() {
                println!("Nothing to restore");
            } else {
                for o in outcomes {
                    let mark = if o.restored { "restored" } else { "skipped" };
                    println!("[{:<8}] {} ({})", mark, o.target, o.note);
                }
            }
        }
    }

    Ok(())
}

fn print_plan(plan: &OptimizationPlan, json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(plan).context("failed to serialize plan")?;
        println!("{}", out);
    } else {
        print!("{}", plan);
    }
    Ok(())
}
