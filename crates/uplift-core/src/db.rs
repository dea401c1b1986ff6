//! Durable audit and message store over SQLite.
//!
//! # Schema
//!
//! ```text
//! execution   (id, context, kind, configuration, created_at)
//! data_source (id, actor, phase)                  -- interned (actor, phase)
//! message     (id, context, msg_type, data_source_id, payload, created_at)
//! audit       (id, event, context, data_source_id, stamp)
//! ```
//!
//! Checkpoints are `audit` rows with `event = 'checkpoint'`. Messages and
//! audit rows are append-only within a context; the only mutation the store
//! offers is cloning a whole context and pruning the clone, both as single
//! transactions. WAL journaling with `synchronous = FULL` keeps committed
//! rows intact across the reboot the upgrade itself performs.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::audit::{Checkpoint, Execution, ExecutionKind};
use crate::config::ExecutionConfig;
use crate::error::Result;
use crate::message::{Message, MessageType};
use crate::phase::Phase;

const CHECKPOINT_EVENT: &str = "checkpoint";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS execution (
    id            INTEGER PRIMARY KEY,
    context       TEXT NOT NULL UNIQUE,
    kind          TEXT NOT NULL,
    configuration TEXT NOT NULL,
    created_at    TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS data_source (
    id    INTEGER PRIMARY KEY,
    actor TEXT NOT NULL,
    phase TEXT NOT NULL,
    UNIQUE (actor, phase)
);
CREATE TABLE IF NOT EXISTS message (
    id             INTEGER PRIMARY KEY,
    context        TEXT NOT NULL,
    msg_type       TEXT NOT NULL,
    data_source_id INTEGER NOT NULL REFERENCES data_source (id),
    payload        TEXT NOT NULL,
    created_at     TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS audit (
    id             INTEGER PRIMARY KEY,
    event          TEXT NOT NULL,
    context        TEXT NOT NULL,
    data_source_id INTEGER NOT NULL REFERENCES data_source (id),
    stamp          TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_message_lookup ON message (context, msg_type);
CREATE INDEX IF NOT EXISTS idx_audit_lookup ON audit (context, event);
";

// ---------------------------------------------------------------------------
// PruneStats
// ---------------------------------------------------------------------------

/// Row counts removed by [`AuditDb::prune_from_phase`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    pub checkpoints: usize,
    pub messages: usize,
}

// ---------------------------------------------------------------------------
// AuditDb
// ---------------------------------------------------------------------------

/// Single-writer store for executions, messages, and checkpoints. The
/// scheduler serializes all writes; reads always see a committed prefix.
pub struct AuditDb {
    conn: Connection,
}

impl AuditDb {
    /// Open or create the store at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        // journal_mode is a query-style pragma: it answers with the mode.
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.execute_batch(
            "PRAGMA synchronous = FULL;
             PRAGMA foreign_keys = ON;",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(AuditDb { conn })
    }

    /// In-memory store, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(AuditDb { conn })
    }

    // -----------------------------------------------------------------------
    // Executions
    // -----------------------------------------------------------------------

    pub fn store_execution(&self, execution: &Execution) -> Result<()> {
        self.conn.execute(
            "INSERT INTO execution (context, kind, configuration, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                execution.context.to_string(),
                execution.kind.as_str(),
                execution.config.to_json()?,
                execution.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// The most recently created execution, if any.
    pub fn last_execution(&self) -> Result<Option<Execution>> {
        let row = self
            .conn
            .query_row(
                "SELECT context, kind, configuration, created_at
                 FROM execution ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        row.map(|r| parse_execution(&r.0, &r.1, &r.2, &r.3)).transpose()
    }

    pub fn execution(&self, context: Uuid) -> Result<Option<Execution>> {
        let row = self
            .conn
            .query_row(
                "SELECT context, kind, configuration, created_at
                 FROM execution WHERE context = ?1",
                params![context.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        row.map(|r| parse_execution(&r.0, &r.1, &r.2, &r.3)).transpose()
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    pub fn store_message(&self, message: &Message) -> Result<()> {
        let ds = self.data_source_id(&message.actor, message.phase)?;
        self.conn.execute(
            "INSERT INTO message (context, msg_type, data_source_id, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message.context.to_string(),
                message.msg_type.as_str(),
                ds,
                serde_json::to_string(&message.payload)?,
                message.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Messages of one type in a context, in creation order.
    pub fn messages(&self, context: Uuid, msg_type: &MessageType) -> Result<Vec<Message>> {
        let mut stmt = self.conn.prepare(
            "SELECT m.msg_type, ds.actor, ds.phase, m.payload, m.created_at
             FROM message m JOIN data_source ds ON ds.id = m.data_source_id
             WHERE m.context = ?1 AND m.msg_type = ?2
             ORDER BY m.id",
        )?;
        let rows = stmt.query_map(params![context.to_string(), msg_type.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        let mut messages = Vec::new();
        for row in rows {
            let (ty, actor, phase, payload, created_at) = row?;
            messages.push(Message {
                context,
                msg_type: MessageType::new(ty),
                actor,
                phase: Phase::from_str(&phase)?,
                payload: serde_json::from_str(&payload)?,
                created_at: parse_stamp(&created_at)?,
            });
        }
        Ok(messages)
    }

    // -----------------------------------------------------------------------
    // Checkpoints
    // -----------------------------------------------------------------------

    pub fn add_checkpoint(&self, context: Uuid, phase: Phase, actor: &str) -> Result<()> {
        let ds = self.data_source_id(actor, phase)?;
        self.conn.execute(
            "INSERT INTO audit (event, context, data_source_id, stamp)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                CHECKPOINT_EVENT,
                context.to_string(),
                ds,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// All checkpoints of a context, in completion order.
    pub fn checkpoints(&self, context: Uuid) -> Result<Vec<Checkpoint>> {
        let mut stmt = self.conn.prepare(
            "SELECT ds.phase, ds.actor, a.stamp
             FROM audit a JOIN data_source ds ON ds.id = a.data_source_id
             WHERE a.context = ?1 AND a.event = ?2
             ORDER BY a.id",
        )?;
        let rows = stmt.query_map(params![context.to_string(), CHECKPOINT_EVENT], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut checkpoints = Vec::new();
        for row in rows {
            let (phase, actor, stamp) = row?;
            checkpoints.push(Checkpoint {
                context,
                phase: Phase::from_str(&phase)?,
                actor,
                completed_at: parse_stamp(&stamp)?,
            });
        }
        Ok(checkpoints)
    }

    pub fn has_checkpoint(&self, context: Uuid, phase: Phase, actor: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*)
             FROM audit a JOIN data_source ds ON ds.id = a.data_source_id
             WHERE a.context = ?1 AND a.event = ?2 AND ds.phase = ?3 AND ds.actor = ?4",
            params![
                context.to_string(),
                CHECKPOINT_EVENT,
                phase.as_str(),
                actor
            ],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// True if any actor checkpointed under `phase` in this context.
    pub fn phase_ran(&self, context: Uuid, phase: Phase) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*)
             FROM audit a JOIN data_source ds ON ds.id = a.data_source_id
             WHERE a.context = ?1 AND a.event = ?2 AND ds.phase = ?3",
            params![context.to_string(), CHECKPOINT_EVENT, phase.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // -----------------------------------------------------------------------
    // Cloning and pruning
    // -----------------------------------------------------------------------

    /// Copy every message and audit row of `src` into `dst`, in original
    /// order, inside one transaction. Partial clones are never observable;
    /// the source context is never touched.
    pub fn clone_context(&mut self, src: Uuid, dst: Uuid) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO message (context, msg_type, data_source_id, payload, created_at)
             SELECT ?2, msg_type, data_source_id, payload, created_at
             FROM message WHERE context = ?1 ORDER BY id",
            params![src.to_string(), dst.to_string()],
        )?;
        tx.execute(
            "INSERT INTO audit (event, context, data_source_id, stamp)
             SELECT event, ?2, data_source_id, stamp
             FROM audit WHERE context = ?1 ORDER BY id",
            params![src.to_string(), dst.to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Delete, from `context` only, all checkpoints belonging to `from` and
    /// every later phase, plus `error`-typed messages scoped to those
    /// phases. Other message types of the redone phases are retained. One
    /// transaction.
    pub fn prune_from_phase(&mut self, context: Uuid, from: Phase) -> Result<PruneStats> {
        let error_type = MessageType::error();
        let mut stats = PruneStats::default();
        let tx = self.conn.transaction()?;
        for phase in Phase::all().iter().filter(|p| **p >= from) {
            stats.checkpoints += tx.execute(
                "DELETE FROM audit
                 WHERE context = ?1 AND event = ?2
                   AND data_source_id IN (SELECT id FROM data_source WHERE phase = ?3)",
                params![context.to_string(), CHECKPOINT_EVENT, phase.as_str()],
            )?;
            stats.messages += tx.execute(
                "DELETE FROM message
                 WHERE context = ?1 AND msg_type = ?2
                   AND data_source_id IN (SELECT id FROM data_source WHERE phase = ?3)",
                params![context.to_string(), error_type.as_str(), phase.as_str()],
            )?;
        }
        tx.commit()?;
        Ok(stats)
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn data_source_id(&self, actor: &str, phase: Phase) -> Result<i64> {
        self.conn.execute(
            "INSERT OR IGNORE INTO data_source (actor, phase) VALUES (?1, ?2)",
            params![actor, phase.as_str()],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM data_source WHERE actor = ?1 AND phase = ?2",
            params![actor, phase.as_str()],
            |row| row.get(0),
        )?;
        Ok(id)
    }
}

fn parse_execution(context: &str, kind: &str, config: &str, created_at: &str) -> Result<Execution> {
    Ok(Execution {
        context: Uuid::from_str(context)?,
        kind: ExecutionKind::from_str(kind)?,
        config: ExecutionConfig::from_json(config)?,
        created_at: parse_stamp(created_at)?,
    })
}

fn parse_stamp(stamp: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(stamp).map(|d| d.with_timezone(&Utc))?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ErrorRecord, Report};
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, AuditDb) {
        let dir = TempDir::new().unwrap();
        let db = AuditDb::open(&dir.path().join("audit.db")).unwrap();
        (dir, db)
    }

    fn facts_message(context: Uuid, actor: &str, n: u64) -> Message {
        Message::new(
            context,
            MessageType::new("os_release"),
            actor,
            Phase::Facts,
            serde_json::json!({ "n": n }),
        )
    }

    fn error_message(context: Uuid, phase: Phase) -> Message {
        let record = ErrorRecord {
            actor: "failing_actor".to_string(),
            phase,
            message: "boom".to_string(),
        };
        Message::new(
            context,
            MessageType::error(),
            "failing_actor",
            phase,
            serde_json::to_value(&record).unwrap(),
        )
    }

    #[test]
    fn execution_roundtrip_and_last() {
        let (_dir, db) = open_tmp();
        assert!(db.last_execution().unwrap().is_none());

        let mut config = ExecutionConfig::default();
        config.target_version = Some("10.0".to_string());
        let first = Execution::new(ExecutionKind::Upgrade, config.clone());
        let second = Execution::new(ExecutionKind::Rerun, config);
        db.store_execution(&first).unwrap();
        db.store_execution(&second).unwrap();

        let last = db.last_execution().unwrap().unwrap();
        assert_eq!(last.context, second.context);
        assert_eq!(last.kind, ExecutionKind::Rerun);
        assert_eq!(last.config.target_version.as_deref(), Some("10.0"));

        let fetched = db.execution(first.context).unwrap().unwrap();
        assert_eq!(fetched.kind, ExecutionKind::Upgrade);
    }

    #[test]
    fn messages_kept_in_creation_order() {
        let (_dir, db) = open_tmp();
        let context = Uuid::new_v4();
        for n in 0..5 {
            db.store_message(&facts_message(context, "scan_os_release", n))
                .unwrap();
        }

        let messages = db.messages(context, &MessageType::new("os_release")).unwrap();
        assert_eq!(messages.len(), 5);
        for (n, msg) in messages.iter().enumerate() {
            assert_eq!(msg.payload["n"], n as u64);
            assert_eq!(msg.actor, "scan_os_release");
            assert_eq!(msg.phase, Phase::Facts);
        }
    }

    #[test]
    fn messages_are_immutable_on_reread() {
        let (_dir, db) = open_tmp();
        let context = Uuid::new_v4();
        db.store_message(&facts_message(context, "scan_os_release", 7))
            .unwrap();

        let first = db.messages(context, &MessageType::new("os_release")).unwrap();
        let second = db.messages(context, &MessageType::new("os_release")).unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].payload, serde_json::json!({ "n": 7 }));
    }

    #[test]
    fn checkpoints_and_phase_ran() {
        let (_dir, db) = open_tmp();
        let context = Uuid::new_v4();
        db.add_checkpoint(context, Phase::Facts, "scan_os_release")
            .unwrap();
        db.add_checkpoint(context, Phase::Checks, "check_target")
            .unwrap();

        let checkpoints = db.checkpoints(context).unwrap();
        assert_eq!(checkpoints.len(), 2);
        assert_eq!(checkpoints[0].phase, Phase::Facts);
        assert_eq!(checkpoints[1].actor, "check_target");

        assert!(db.has_checkpoint(context, Phase::Facts, "scan_os_release").unwrap());
        assert!(!db.has_checkpoint(context, Phase::Facts, "check_target").unwrap());
        assert!(db.phase_ran(context, Phase::Checks).unwrap());
        assert!(!db.phase_ran(context, Phase::FirstBoot).unwrap());
    }

    #[test]
    fn clone_copies_everything_and_leaves_source_alone() {
        let (_dir, mut db) = open_tmp();
        let src = Uuid::new_v4();
        let dst = Uuid::new_v4();
        db.store_message(&facts_message(src, "scan_os_release", 1))
            .unwrap();
        db.add_checkpoint(src, Phase::Facts, "scan_os_release").unwrap();
        db.add_checkpoint(src, Phase::FirstBoot, "late_actor").unwrap();

        db.clone_context(src, dst).unwrap();

        let src_cp = db.checkpoints(src).unwrap();
        let dst_cp = db.checkpoints(dst).unwrap();
        assert_eq!(src_cp.len(), 2);
        assert_eq!(dst_cp.len(), 2);
        assert_eq!(dst_cp[0].phase, src_cp[0].phase);
        assert_eq!(dst_cp[0].actor, src_cp[0].actor);
        assert_eq!(dst_cp[0].completed_at, src_cp[0].completed_at);

        let src_msgs = db.messages(src, &MessageType::new("os_release")).unwrap();
        let dst_msgs = db.messages(dst, &MessageType::new("os_release")).unwrap();
        assert_eq!(src_msgs.len(), 1);
        assert_eq!(dst_msgs.len(), 1);
        assert_eq!(dst_msgs[0].payload, src_msgs[0].payload);
    }

    #[test]
    fn prune_removes_late_checkpoints_and_error_reports_only() {
        let (_dir, mut db) = open_tmp();
        let context = Uuid::new_v4();

        db.add_checkpoint(context, Phase::Facts, "scan_os_release").unwrap();
        db.add_checkpoint(context, Phase::Finalization, "write_bootloader").unwrap();
        db.add_checkpoint(context, Phase::FirstBoot, "relabel_selinux").unwrap();

        // A data message and an error report, both produced in FirstBoot
        let report = Report::new("firstboot finding", "detail");
        db.store_message(&Message::new(
            context,
            MessageType::report(),
            "relabel_selinux",
            Phase::FirstBoot,
            serde_json::to_value(&report).unwrap(),
        ))
        .unwrap();
        db.store_message(&error_message(context, Phase::FirstBoot)).unwrap();
        // An earlier error report must survive
        db.store_message(&error_message(context, Phase::Checks)).unwrap();

        let stats = db.prune_from_phase(context, Phase::FirstBoot).unwrap();
        assert_eq!(stats.checkpoints, 1);
        assert_eq!(stats.messages, 1);

        let remaining: Vec<Phase> = db
            .checkpoints(context)
            .unwrap()
            .into_iter()
            .map(|c| c.phase)
            .collect();
        assert_eq!(remaining, vec![Phase::Facts, Phase::Finalization]);

        // Non-error FirstBoot message retained, FirstBoot error gone,
        // Checks-phase error untouched.
        assert_eq!(db.messages(context, &MessageType::report()).unwrap().len(), 1);
        let errors = db.messages(context, &MessageType::error()).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].phase, Phase::Checks);
    }

    #[test]
    fn prune_covers_all_later_phases() {
        let (_dir, mut db) = open_tmp();
        let context = Uuid::new_v4();
        for phase in Phase::all() {
            db.add_checkpoint(context, *phase, "actor").unwrap();
        }

        let stats = db.prune_from_phase(context, Phase::RpmUpgrade).unwrap();
        assert_eq!(stats.checkpoints, 4);

        let remaining: Vec<Phase> = db
            .checkpoints(context)
            .unwrap()
            .into_iter()
            .map(|c| c.phase)
            .collect();
        assert_eq!(
            remaining,
            vec![
                Phase::Facts,
                Phase::Checks,
                Phase::TargetTransactionFacts,
                Phase::InterimPreparation
            ]
        );
    }

    #[test]
    fn reopen_preserves_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.db");
        let context = Uuid::new_v4();
        {
            let db = AuditDb::open(&path).unwrap();
            db.store_execution(&Execution::new(
                ExecutionKind::Upgrade,
                ExecutionConfig::default(),
            ))
            .unwrap();
            db.add_checkpoint(context, Phase::Facts, "scan_os_release").unwrap();
        }
        let db = AuditDb::open(&path).unwrap();
        assert!(db.last_execution().unwrap().is_some());
        assert_eq!(db.checkpoints(context).unwrap().len(), 1);
    }
}
