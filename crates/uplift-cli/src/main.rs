mod actors;
mod cmd;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uplift_core::paths::resolve_db_path;

#[derive(Parser)]
#[command(
    name = "uplift",
    about = "In-place OS major-version upgrade orchestrator",
    version,
    propagate_version = true
)]
struct Cli {
    /// Audit store path (default: /var/lib/uplift/audit.db)
    #[arg(long, global = true, env = "UPLIFT_DB")]
    db: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the upgrade workflow (use --resume to continue after a reboot)
    Upgrade {
        /// Continue the last execution instead of starting a new one
        #[arg(long)]
        resume: bool,

        /// Target OS version (e.g. 10.0)
        #[arg(long)]
        target: Option<String>,

        /// Optional YAML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Restrict execution to actors carrying TAG (repeatable)
        #[arg(long = "only-actors-with-tag", value_name = "TAG")]
        only_with_tags: Vec<String>,
    },

    /// Re-run the workflow from a completed phase (requires UPLIFT_UNSUPPORTED=1)
    Rerun {
        /// Phase to restart from (currently only FirstBoot)
        from_phase: String,

        /// Restrict execution to actors carrying TAG (repeatable)
        #[arg(long = "only-actors-with-tag", value_name = "TAG")]
        only_with_tags: Vec<String>,
    },

    /// Show the last execution, its checkpoints, and any inhibitors
    Status,

    /// List workflow phases in execution order
    Phases,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.debug {
        tracing::Level::DEBUG
    } else if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let result = run(cli);

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Upgrade {
            resume,
            target,
            config,
            only_with_tags,
        } => {
            let db_path = resolve_db_path(cli.db.as_deref())?;
            cmd::upgrade::run(&db_path, resume, target, config, only_with_tags, cli.json)
        }
        Commands::Rerun {
            from_phase,
            only_with_tags,
        } => {
            let db_path = resolve_db_path(cli.db.as_deref())?;
            cmd::rerun::run(&db_path, &from_phase, only_with_tags, cli.json)
        }
        Commands::Status => {
            let db_path = resolve_db_path(cli.db.as_deref())?;
            cmd::status::run(&db_path, cli.json)
        }
        Commands::Phases => cmd::phases::run(cli.json),
    }
}
