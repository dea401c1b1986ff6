use crate::error::Result;
use crate::phase::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Data-source name used for messages seeded by the workflow driver rather
/// than by an actor (externally-fed types).
pub const SEED_ACTOR: &str = "workflow";

/// Flag on a [`Report`] that blocks entry into destructive phases.
pub const INHIBITOR_FLAG: &str = "inhibitor";

// ---------------------------------------------------------------------------
// MessageType
// ---------------------------------------------------------------------------

/// Named message schema. Identity only: contract validation compares names;
/// payloads are free-form JSON owned by the producing actor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageType(String);

impl MessageType {
    pub fn new(name: impl Into<String>) -> Self {
        MessageType(name.into())
    }

    /// Human-facing findings with severity and optional inhibitor flag.
    pub fn report() -> Self {
        MessageType::new("report")
    }

    /// Actor failure records. The only type pruned on `rerun`.
    pub fn error() -> Self {
        MessageType::new("error")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageType {
    fn from(s: &str) -> Self {
        MessageType::new(s)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// An immutable, typed record produced by one actor and consumed by zero or
/// more actors running later in phase order. Append-only once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub context: Uuid,
    pub msg_type: MessageType,
    pub actor: String,
    pub phase: Phase,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        context: Uuid,
        msg_type: MessageType,
        actor: impl Into<String>,
        phase: Phase,
        payload: serde_json::Value,
    ) -> Self {
        Message {
            context,
            msg_type,
            actor: actor.into(),
            phase,
            payload,
            created_at: Utc::now(),
        }
    }

    /// A message fed externally (e.g. by the CLI layer) before any actor
    /// runs. Attributed to the workflow itself, in the first phase.
    pub fn seeded(context: Uuid, msg_type: MessageType, payload: serde_json::Value) -> Self {
        Message::new(context, msg_type, SEED_ACTOR, Phase::Facts, payload)
    }
}

// ---------------------------------------------------------------------------
// Severity / Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Info
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        };
        f.write_str(s)
    }
}

/// Payload of a `report` message: a human-facing finding. A report carrying
/// the inhibitor flag blocks the workflow from entering destructive phases,
/// regardless of which actor produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub flags: Vec<String>,
}

impl Report {
    pub fn new(title: impl Into<String>, summary: impl Into<String>) -> Self {
        Report {
            title: title.into(),
            summary: summary.into(),
            severity: Severity::default(),
            flags: Vec::new(),
        }
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn inhibitor(mut self) -> Self {
        if !self.flags.iter().any(|f| f == INHIBITOR_FLAG) {
            self.flags.push(INHIBITOR_FLAG.to_string());
        }
        self
    }

    pub fn is_inhibitor(&self) -> bool {
        self.flags.iter().any(|f| f == INHIBITOR_FLAG)
    }

    pub fn from_message(message: &Message) -> Result<Report> {
        Ok(serde_json::from_value(message.payload.clone())?)
    }
}

// ---------------------------------------------------------------------------
// ErrorRecord
// ---------------------------------------------------------------------------

/// Payload of an `error` message, written by the engine when an actor fails
/// fatally. Pruned from cloned contexts on `rerun` so a later retry does not
/// carry stale failure reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub actor: String,
    pub phase: Phase,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
