mod commands;
mod utils;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "skyforge")]
#[command(about = "Managed Redis and a CDN-fronted frontend on Google Cloud, from one KDL file", long_about = None)]
struct Cli {
    /// Stack file (skips discovery)
    #[arg(long, global = true, env = "SKYFORGE_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Environment name, overrides `environment` in the stack file
    #[arg(short, long, global = true, env = "SKYFORGE_ENV")]
    environment: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the stack file
    Validate,
    /// Show the changes an apply would make
    Plan {
        /// Limit to one provisioning unit
        #[arg(short, long, value_enum)]
        unit: Option<UnitArg>,
    },
    /// Create or update resources
    Apply {
        /// Limit to one provisioning unit
        #[arg(short, long, value_enum)]
        unit: Option<UnitArg>,
        /// Apply without asking
        #[arg(short, long)]
        yes: bool,
    },
    /// Delete resources in reverse dependency order
    Destroy {
        /// Limit to one provisioning unit
        #[arg(short, long, value_enum)]
        unit: Option<UnitArg>,
        /// Destroy without asking
        #[arg(short, long)]
        yes: bool,
    },
    /// Print published outputs from the local state
    Output {
        /// Show sensitive values instead of masking them
        #[arg(long)]
        show_sensitive: bool,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the resource dependency order
    Graph {
        /// Limit to one provisioning unit
        #[arg(short, long, value_enum)]
        unit: Option<UnitArg>,
    },
    /// Show version information
    Version,
}

#[derive(Clone, Copy, ValueEnum)]
enum UnitArg {
    Cache,
    Frontend,
}

impl From<UnitArg> for skyforge_cloud_gcp::Unit {
    fn from(unit: UnitArg) -> Self {
        match unit {
            UnitArg::Cache => skyforge_cloud_gcp::Unit::Cache,
            UnitArg::Frontend => skyforge_cloud_gcp::Unit::Frontend,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries user-facing output, logs go to stderr
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if matches!(cli.command, Commands::Version) {
        commands::version::handle();
        return Ok(());
    }

    let target = utils::Target {
        config: cli.config,
        environment: cli.environment,
    };

    match cli.command {
        Commands::Validate => commands::validate::handle(&target)?,
        Commands::Plan { unit } => commands::plan::handle(&target, unit.map(Into::into)).await?,
        Commands::Apply { unit, yes } => {
            commands::apply::handle(&target, unit.map(Into::into), yes).await?
        }
        Commands::Destroy { unit, yes } => {
            commands::destroy::handle(&target, unit.map(Into::into), yes).await?
        }
        Commands::Output {
            show_sensitive,
            json,
        } => commands::output::handle(&target, show_sensitive, json).await?,
        Commands::Graph { unit } => commands::graph::handle(&target, unit.map(Into::into))?,
        Commands::Version => unreachable!("Version is handled before config loading"),
    }

    Ok(())
}
