use crate::config::ExecutionConfig;
use crate::phase::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ExecutionKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionKind {
    Upgrade,
    Rerun,
}

impl ExecutionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionKind::Upgrade => "upgrade",
            ExecutionKind::Rerun => "rerun",
        }
    }
}

impl fmt::Display for ExecutionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExecutionKind {
    type Err = crate::error::UpliftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upgrade" => Ok(ExecutionKind::Upgrade),
            "rerun" => Ok(ExecutionKind::Rerun),
            _ => Err(crate::error::UpliftError::InvalidExecutionKind(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// One top-level invocation of the workflow. The context id scopes every
/// message and checkpoint the run produces; the configuration snapshot is
/// frozen at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub context: Uuid,
    pub kind: ExecutionKind,
    pub config: ExecutionConfig,
    pub created_at: DateTime<Utc>,
}

impl Execution {
    pub fn new(kind: ExecutionKind, config: ExecutionConfig) -> Self {
        Execution {
            context: Uuid::new_v4(),
            kind,
            config,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

/// Durable marker that an actor ran to completion in a phase under a
/// context. Written exactly once per invocation, only after the actor's
/// outputs were all persisted; its presence is the sole source of truth for
/// "already done" during resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub context: Uuid,
    pub phase: Phase,
    pub actor: String,
    pub completed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
