//! Resume and rerun: safe re-entry into a partially or fully completed
//! upgrade.
//!
//! `rerun` never mutates the prior context. It clones the full
//! message/checkpoint history into a fresh context, prunes the clone from
//! the requested phase onward, and hands the scheduler a context that looks
//! exactly like "completed through phase P-1, not yet started at P". That
//! state is reachable only this way, never by forward execution.

use crate::audit::{Execution, ExecutionKind};
use crate::db::AuditDb;
use crate::error::{Result, UpliftError};
use crate::phase::Phase;
use crate::registry::ActorRegistry;
use crate::scheduler::{RunOptions, RunSummary, Scheduler};
use tracing::info;

/// Clone the last execution's context and re-run it from `from_phase`.
///
/// `from_phase` is restricted to the resumable allow-list. The new `Rerun`
/// execution row is inserted only after the clone and prune have committed,
/// so an interrupted rerun can leave orphan rows but never a partially
/// cloned "last execution".
pub fn rerun(
    db: &mut AuditDb,
    registry: &ActorRegistry,
    from_phase: Phase,
    only_with_tags: Vec<String>,
) -> Result<RunSummary> {
    if !from_phase.resumable() {
        let supported = Phase::resumable_phases()
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(UpliftError::UnsupportedResumePhase(from_phase, supported));
    }

    let last = db.last_execution()?.ok_or(UpliftError::NoPriorExecution)?;
    if !db.phase_ran(last.context, from_phase)? {
        return Err(UpliftError::PhaseNeverRan(from_phase));
    }

    let mut config = last.config.clone();
    if !only_with_tags.is_empty() {
        config.only_with_tags = only_with_tags;
    }
    let execution = Execution::new(ExecutionKind::Rerun, config);

    db.clone_context(last.context, execution.context)?;
    let stats = db.prune_from_phase(execution.context, from_phase)?;
    info!(
        source = %last.context,
        context = %execution.context,
        phase = %from_phase,
        checkpoints = stats.checkpoints,
        error_messages = stats.messages,
        "cloned context and pruned resume point"
    );
    db.store_execution(&execution)?;

    let opts = RunOptions {
        resume: true,
        start_phase: Some(from_phase),
    };
    Scheduler::new(registry, db).run(&execution, &opts)
}

/// Continue the last execution in its own context, skipping everything
/// already checkpointed. This is the post-reboot path: the in-flight actor
/// at interruption time holds no checkpoint and simply runs again.
pub fn resume_upgrade(db: &AuditDb, registry: &ActorRegistry) -> Result<RunSummary> {
    let last = db.last_execution()?.ok_or(UpliftError::NoPriorExecution)?;
    info!(context = %last.context, "resuming last execution");
    let opts = RunOptions {
        resume: true,
        start_phase: None,
    };
    Scheduler::new(registry, db).run(&last, &opts)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{Actor, ActorApi, ActorManifest, ActorResult};
    use crate::config::ExecutionConfig;
    use crate::message::{ErrorRecord, Message, MessageType, Report};
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    struct CountingActor {
        manifest: ActorManifest,
        runs: Arc<AtomicUsize>,
    }

    impl CountingActor {
        fn boxed(name: &str, phase: Phase, runs: &Arc<AtomicUsize>) -> Box<dyn Actor> {
            Box::new(CountingActor {
                manifest: ActorManifest::new(name).phase_tag(phase),
                runs: Arc::clone(runs),
            })
        }
    }

    impl Actor for CountingActor {
        fn manifest(&self) -> &ActorManifest {
            &self.manifest
        }

        fn process(&self, _api: &mut ActorApi<'_>) -> ActorResult {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn full_registry(
        early_runs: &Arc<AtomicUsize>,
        late_runs: &Arc<AtomicUsize>,
    ) -> ActorRegistry {
        ActorRegistry::build(
            vec![
                CountingActor::boxed("scan_os_release", Phase::Facts, early_runs),
                CountingActor::boxed("apply_rpms", Phase::RpmUpgrade, early_runs),
                CountingActor::boxed("relabel_selinux", Phase::FirstBoot, late_runs),
            ],
            &BTreeSet::new(),
        )
        .unwrap()
    }

    fn completed_upgrade(db: &AuditDb, registry: &ActorRegistry) -> Execution {
        let execution = Execution::new(ExecutionKind::Upgrade, ExecutionConfig::default());
        db.store_execution(&execution).unwrap();
        let summary = Scheduler::new(registry, db)
            .run(&execution, &RunOptions::default())
            .unwrap();
        assert!(summary.completed);
        execution
    }

    #[test]
    fn rerun_firstboot_clones_prunes_and_reexecutes() {
        let early = Arc::new(AtomicUsize::new(0));
        let late = Arc::new(AtomicUsize::new(0));
        let registry = full_registry(&early, &late);
        let mut db = AuditDb::open_in_memory().unwrap();

        let prior = completed_upgrade(&db, &registry);
        assert_eq!(late.load(Ordering::SeqCst), 1);

        // Stale error report from the prior FirstBoot run
        let record = ErrorRecord {
            actor: "relabel_selinux".to_string(),
            phase: Phase::FirstBoot,
            message: "transient failure".to_string(),
        };
        db.store_message(&Message::new(
            prior.context,
            MessageType::error(),
            "relabel_selinux",
            Phase::FirstBoot,
            serde_json::to_value(&record).unwrap(),
        ))
        .unwrap();

        let summary = rerun(&mut db, &registry, Phase::FirstBoot, Vec::new()).unwrap();
        assert!(summary.completed);
        assert_ne!(summary.context, prior.context);

        // Only the FirstBoot actor re-ran.
        assert_eq!(early.load(Ordering::SeqCst), 2);
        assert_eq!(late.load(Ordering::SeqCst), 2);

        // Clone fidelity: new context = prior checkpoints minus FirstBoot,
        // plus the fresh FirstBoot completion.
        let prior_cp = db.checkpoints(prior.context).unwrap();
        let new_cp = db.checkpoints(summary.context).unwrap();
        assert_eq!(prior_cp.len(), 3);
        assert_eq!(new_cp.len(), 3);
        let prior_pre: Vec<_> = prior_cp
            .iter()
            .filter(|c| c.phase < Phase::FirstBoot)
            .map(|c| (c.phase, c.actor.clone()))
            .collect();
        let new_pre: Vec<_> = new_cp
            .iter()
            .filter(|c| c.phase < Phase::FirstBoot)
            .map(|c| (c.phase, c.actor.clone()))
            .collect();
        assert_eq!(prior_pre, new_pre);

        // Stale FirstBoot error reports are gone from the clone, untouched
        // in the source.
        assert!(db
            .messages(summary.context, &MessageType::error())
            .unwrap()
            .is_empty());
        assert_eq!(
            db.messages(prior.context, &MessageType::error()).unwrap().len(),
            1
        );

        // The rerun is now the last execution.
        let last = db.last_execution().unwrap().unwrap();
        assert_eq!(last.context, summary.context);
        assert_eq!(last.kind, ExecutionKind::Rerun);
    }

    #[test]
    fn rerun_twice_yields_identical_checkpoint_sets() {
        let early = Arc::new(AtomicUsize::new(0));
        let late = Arc::new(AtomicUsize::new(0));
        let registry = full_registry(&early, &late);
        let mut db = AuditDb::open_in_memory().unwrap();
        completed_upgrade(&db, &registry);

        let first = rerun(&mut db, &registry, Phase::FirstBoot, Vec::new()).unwrap();
        let second = rerun(&mut db, &registry, Phase::FirstBoot, Vec::new()).unwrap();

        let sets = |ctx: Uuid| -> Vec<(Phase, String)> {
            db.checkpoints(ctx)
                .unwrap()
                .into_iter()
                .filter(|c| c.phase >= Phase::FirstBoot)
                .map(|c| (c.phase, c.actor))
                .collect()
        };
        assert_eq!(sets(first.context), sets(second.context));
    }

    #[test]
    fn rerun_requires_a_prior_execution() {
        let early = Arc::new(AtomicUsize::new(0));
        let late = Arc::new(AtomicUsize::new(0));
        let registry = full_registry(&early, &late);
        let mut db = AuditDb::open_in_memory().unwrap();

        let err = rerun(&mut db, &registry, Phase::FirstBoot, Vec::new()).unwrap_err();
        assert!(matches!(err, UpliftError::NoPriorExecution));
    }

    #[test]
    fn rerun_rejects_phase_that_never_ran() {
        let early = Arc::new(AtomicUsize::new(0));
        // Registry without any FirstBoot actor: the phase completes without
        // checkpoints, so it never "ran".
        let registry = ActorRegistry::build(
            vec![CountingActor::boxed("scan_os_release", Phase::Facts, &early)],
            &BTreeSet::new(),
        )
        .unwrap();
        let mut db = AuditDb::open_in_memory().unwrap();
        completed_upgrade(&db, &registry);

        let err = rerun(&mut db, &registry, Phase::FirstBoot, Vec::new()).unwrap_err();
        assert!(matches!(err, UpliftError::PhaseNeverRan(Phase::FirstBoot)));
    }

    #[test]
    fn rerun_rejects_unsupported_phase() {
        let early = Arc::new(AtomicUsize::new(0));
        let late = Arc::new(AtomicUsize::new(0));
        let registry = full_registry(&early, &late);
        let mut db = AuditDb::open_in_memory().unwrap();
        completed_upgrade(&db, &registry);

        let err = rerun(&mut db, &registry, Phase::RpmUpgrade, Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            UpliftError::UnsupportedResumePhase(Phase::RpmUpgrade, _)
        ));
    }

    #[test]
    fn rerun_carries_configuration_forward() {
        let early = Arc::new(AtomicUsize::new(0));
        let late = Arc::new(AtomicUsize::new(0));
        let registry = full_registry(&early, &late);
        let mut db = AuditDb::open_in_memory().unwrap();

        let mut config = ExecutionConfig::default();
        config.target_version = Some("10.0".to_string());
        let execution = Execution::new(ExecutionKind::Upgrade, config);
        db.store_execution(&execution).unwrap();
        Scheduler::new(&registry, &db)
            .run(&execution, &RunOptions::default())
            .unwrap();

        let summary = rerun(&mut db, &registry, Phase::FirstBoot, Vec::new()).unwrap();
        let cloned = db.execution(summary.context).unwrap().unwrap();
        assert_eq!(cloned.config.target_version.as_deref(), Some("10.0"));
    }

    #[test]
    fn resume_continues_same_context_after_interruption() {
        let runs = Arc::new(AtomicUsize::new(0));
        let late = Arc::new(AtomicUsize::new(0));
        let registry = full_registry(&runs, &late);
        let db = AuditDb::open_in_memory().unwrap();

        // Simulate an interrupted run: execution exists, only Facts is
        // checkpointed (the process died mid-RpmUpgrade).
        let execution = Execution::new(ExecutionKind::Upgrade, ExecutionConfig::default());
        db.store_execution(&execution).unwrap();
        db.add_checkpoint(execution.context, Phase::Facts, "scan_os_release")
            .unwrap();

        let summary = resume_upgrade(&db, &registry).unwrap();
        assert!(summary.completed);
        assert_eq!(summary.context, execution.context);

        // scan_os_release was skipped; apply_rpms and relabel_selinux ran.
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(late.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rerun_report_from_message_survives_clone() {
        // Reports produced before the resume point stay readable in the
        // cloned context.
        let early = Arc::new(AtomicUsize::new(0));
        let late = Arc::new(AtomicUsize::new(0));
        let registry = full_registry(&early, &late);
        let mut db = AuditDb::open_in_memory().unwrap();
        let prior = completed_upgrade(&db, &registry);

        let report = Report::new("checks passed", "all clear");
        db.store_message(&Message::new(
            prior.context,
            MessageType::report(),
            "check_target",
            Phase::Checks,
            serde_json::to_value(&report).unwrap(),
        ))
        .unwrap();

        let summary = rerun(&mut db, &registry, Phase::FirstBoot, Vec::new()).unwrap();
        let cloned = db
            .messages(summary.context, &MessageType::report())
            .unwrap();
        assert_eq!(cloned.len(), 1);
        assert_eq!(Report::from_message(&cloned[0]).unwrap(), report);
    }
}
