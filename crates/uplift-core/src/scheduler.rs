//! Sequential, phase-ordered actor execution.
//!
//! One actor runs at a time; a phase fully completes before the next one
//! starts, so anything produced in phase N is visible to every actor of
//! phase N+1. Checkpoints commit only after an actor returns non-fatally,
//! which makes interruption (SIGTERM, reboot) safe: the in-flight actor
//! simply re-runs on the next resume.

use crate::actor::{ActorApi, ActorStop};
use crate::audit::Execution;
use crate::db::AuditDb;
use crate::error::{Result, UpliftError};
use crate::message::{ErrorRecord, Message, MessageType, Report};
use crate::phase::Phase;
use crate::registry::ActorRegistry;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunOptions / RunSummary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Skip actors that already hold a checkpoint under this context.
    pub resume: bool,
    /// First phase to enter; earlier phases are not even iterated.
    pub start_phase: Option<Phase>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub context: Uuid,
    pub executed: Vec<(Phase, String)>,
    pub skipped: Vec<(Phase, String)>,
    /// Titles of the inhibiting reports, when the run stopped at the gate.
    pub inhibited: Vec<String>,
    pub completed: bool,
}

impl RunSummary {
    fn new(context: Uuid) -> Self {
        RunSummary {
            context,
            executed: Vec::new(),
            skipped: Vec::new(),
            inhibited: Vec::new(),
            completed: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct Scheduler<'a> {
    registry: &'a ActorRegistry,
    db: &'a AuditDb,
}

impl<'a> Scheduler<'a> {
    pub fn new(registry: &'a ActorRegistry, db: &'a AuditDb) -> Self {
        Scheduler { registry, db }
    }

    pub fn run(&self, execution: &Execution, opts: &RunOptions) -> Result<RunSummary> {
        let context = execution.context;
        let filter = &execution.config.only_with_tags;
        let mut summary = RunSummary::new(context);

        for phase in Phase::all() {
            if let Some(start) = opts.start_phase {
                if *phase < start {
                    continue;
                }
            }

            if phase.is_destructive() {
                let blocking = inhibitors(self.db, context)?;
                if !blocking.is_empty() {
                    warn!(
                        phase = %phase,
                        count = blocking.len(),
                        "inhibitors present, refusing to enter destructive phase"
                    );
                    summary.inhibited = blocking;
                    return Ok(summary);
                }
            }

            info!(phase = %phase, "entering phase");
            for actor in self.registry.actors_in_phase(*phase) {
                let manifest = actor.manifest();
                if !manifest.matches_filter(filter) {
                    debug!(actor = %manifest.name, "excluded by tag filter");
                    continue;
                }
                if opts.resume && self.db.has_checkpoint(context, *phase, &manifest.name)? {
                    debug!(actor = %manifest.name, "already checkpointed, skipping");
                    continue;
                }

                info!(phase = %phase, actor = %manifest.name, "running actor");
                let mut api =
                    ActorApi::new(self.db, &execution.config, context, manifest, *phase);
                match actor.process(&mut api) {
                    Ok(()) => {
                        summary.executed.push((*phase, manifest.name.clone()));
                    }
                    Err(ActorStop::Skip { reason }) => {
                        info!(actor = %manifest.name, %reason, "actor skipped itself");
                        summary.skipped.push((*phase, manifest.name.clone()));
                    }
                    Err(ActorStop::Fatal { reason }) => {
                        error!(phase = %phase, actor = %manifest.name, %reason, "actor failed");
                        self.record_failure(context, *phase, &manifest.name, &reason)?;
                        return Err(UpliftError::ActorFailed {
                            phase: *phase,
                            actor: manifest.name.clone(),
                            reason,
                        });
                    }
                }
                // Outputs are durable; completion becomes the source of truth.
                self.db.add_checkpoint(context, *phase, &manifest.name)?;
            }
        }

        summary.completed = true;
        Ok(summary)
    }

    fn record_failure(&self, context: Uuid, phase: Phase, actor: &str, reason: &str) -> Result<()> {
        let record = ErrorRecord {
            actor: actor.to_string(),
            phase,
            message: reason.to_string(),
        };
        self.db.store_message(&Message::new(
            context,
            MessageType::error(),
            actor,
            phase,
            serde_json::to_value(&record)?,
        ))
    }
}

/// Titles of inhibiting reports accumulated during or before the Checks
/// phase. An aggregate gate: no single actor decides; any inhibitor-flagged
/// report blocks every destructive phase.
pub fn inhibitors(db: &AuditDb, context: Uuid) -> Result<Vec<String>> {
    let mut titles = Vec::new();
    for message in db.messages(context, &MessageType::report())? {
        if message.phase > Phase::Checks {
            continue;
        }
        let report = Report::from_message(&message)?;
        if report.is_inhibitor() {
            titles.push(report.title);
        }
    }
    Ok(titles)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
