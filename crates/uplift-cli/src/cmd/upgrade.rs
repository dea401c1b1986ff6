use crate::actors;
use crate::output::print_json;
use anyhow::{bail, Context};
use std::path::{Path, PathBuf};
use uplift_core::audit::{Execution, ExecutionKind};
use uplift_core::config::ExecutionConfig;
use uplift_core::db::AuditDb;
use uplift_core::message::Message;
use uplift_core::registry::ActorRegistry;
use uplift_core::rerun::resume_upgrade;
use uplift_core::scheduler::{RunOptions, RunSummary, Scheduler};

pub fn run(
    db_path: &Path,
    resume: bool,
    target: Option<String>,
    config_file: Option<PathBuf>,
    only_with_tags: Vec<String>,
    json: bool,
) -> anyhow::Result<()> {
    let db = AuditDb::open(db_path)
        .with_context(|| format!("failed to open audit store at {}", db_path.display()))?;
    let registry = ActorRegistry::build(actors::builtin(), &actors::external_types())
        .context("actor registry validation failed")?;

    let summary = if resume {
        resume_upgrade(&db, &registry)?
    } else {
        let mut config = match config_file {
            Some(path) => ExecutionConfig::load(&path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => ExecutionConfig::default(),
        };
        config.capture_env();
        if target.is_some() {
            config.target_version = target;
        }
        if !only_with_tags.is_empty() {
            config.only_with_tags = only_with_tags;
        }

        let execution = Execution::new(ExecutionKind::Upgrade, config);
        db.store_execution(&execution)?;
        db.store_message(&Message::seeded(
            execution.context,
            actors::upgrade_request_type(),
            serde_json::json!({
                "target_version": execution.config.target_version,
            }),
        ))?;

        Scheduler::new(&registry, &db).run(&execution, &RunOptions::default())?
    };

    report(&summary, json)
}

pub fn report(summary: &RunSummary, json: bool) -> anyhow::Result<()> {
    if json {
        print_json(summary)?;
    } else {
        println!("Context: {}", summary.context);
        println!(
            "Actors: {} executed, {} skipped",
            summary.executed.len(),
            summary.skipped.len()
        );
    }
    if !summary.inhibited.is_empty() {
        bail!("upgrade inhibited: {}", summary.inhibited.join("; "));
    }
    if !json {
        println!("All requested phases completed.");
    }
    Ok(())
}
