use crate::output::{print_json, print_kv, print_table};
use anyhow::Context;
use std::path::Path;
use uplift_core::db::AuditDb;
use uplift_core::scheduler::inhibitors;

pub fn run(db_path: &Path, json: bool) -> anyhow::Result<()> {
    let db = AuditDb::open(db_path)
        .with_context(|| format!("failed to open audit store at {}", db_path.display()))?;

    let Some(execution) = db.last_execution()? else {
        if json {
            return print_json(&serde_json::json!({ "last_execution": null }));
        }
        println!("No executions recorded.");
        return Ok(());
    };

    let checkpoints = db.checkpoints(execution.context)?;
    let blocking = inhibitors(&db, execution.context)?;

    if json {
        #[derive(serde::Serialize)]
        struct CheckpointRow {
            phase: String,
            actor: String,
            completed_at: String,
        }

        #[derive(serde::Serialize)]
        struct StatusOutput {
            context: String,
            kind: String,
            created_at: String,
            target_version: Option<String>,
            checkpoints: Vec<CheckpointRow>,
            inhibitors: Vec<String>,
        }

        let output = StatusOutput {
            context: execution.context.to_string(),
            kind: execution.kind.to_string(),
            created_at: execution.created_at.to_rfc3339(),
            target_version: execution.config.target_version.clone(),
            checkpoints: checkpoints
                .iter()
                .map(|c| CheckpointRow {
                    phase: c.phase.to_string(),
                    actor: c.actor.clone(),
                    completed_at: c.completed_at.to_rfc3339(),
                })
                .collect(),
            inhibitors: blocking,
        };
        return print_json(&output);
    }

    print_kv(&[
        ("Execution", format!("{} ({})", execution.context, execution.kind)),
        ("Created", execution.created_at.to_rfc3339()),
        (
            "Target",
            execution
                .config
                .target_version
                .clone()
                .unwrap_or_else(|| "(none)".to_string()),
        ),
    ]);

    if checkpoints.is_empty() {
        println!("\nNo checkpoints yet.");
    } else {
        println!("\nCheckpoints:");
        let rows: Vec<Vec<String>> = checkpoints
            .iter()
            .map(|c| {
                vec![
                    c.phase.to_string(),
                    c.actor.clone(),
                    c.completed_at.to_rfc3339(),
                ]
            })
            .collect();
        print_table(&["PHASE", "ACTOR", "COMPLETED"], &rows);
    }

    if !blocking.is_empty() {
        println!("\nInhibitors:");
        for title in &blocking {
            println!("  {title}");
        }
    }

    Ok(())
}
