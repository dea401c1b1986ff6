use crate::config::ExecutionConfig;
use crate::db::AuditDb;
use crate::error::{Result, UpliftError};
use crate::message::{Message, MessageType, Report};
use crate::phase::{Phase, Tag};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ActorManifest
// ---------------------------------------------------------------------------

/// Declarative contract of an actor: its name, the message types it reads
/// and writes, and its phase/workflow tags. Immutable once the registry is
/// built; the scheduler enforces it at every `consume`/`produce` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorManifest {
    pub name: String,
    #[serde(default)]
    pub consumes: BTreeSet<MessageType>,
    #[serde(default)]
    pub produces: BTreeSet<MessageType>,
    #[serde(default)]
    pub tags: BTreeSet<Tag>,
}

impl ActorManifest {
    pub fn new(name: impl Into<String>) -> Self {
        ActorManifest {
            name: name.into(),
            consumes: BTreeSet::new(),
            produces: BTreeSet::new(),
            tags: BTreeSet::new(),
        }
    }

    pub fn consume(mut self, msg_type: impl Into<MessageType>) -> Self {
        self.consumes.insert(msg_type.into());
        self
    }

    pub fn produce(mut self, msg_type: impl Into<MessageType>) -> Self {
        self.produces.insert(msg_type.into());
        self
    }

    pub fn tag(mut self, tag: Tag) -> Self {
        self.tags.insert(tag);
        self
    }

    pub fn phase_tag(self, phase: Phase) -> Self {
        self.tag(Tag::Phase(phase))
    }

    /// The single phase this actor belongs to, if exactly one phase tag is
    /// declared. The registry rejects manifests where this is ambiguous.
    pub fn phase(&self) -> Option<Phase> {
        let mut phases = self.tags.iter().filter_map(Tag::phase);
        let first = phases.next()?;
        if phases.next().is_some() {
            return None;
        }
        Some(first)
    }

    /// True if any workflow/custom tag name appears in `only`. An empty
    /// filter matches every actor.
    pub fn matches_filter(&self, only: &[String]) -> bool {
        if only.is_empty() {
            return true;
        }
        self.tags
            .iter()
            .filter_map(Tag::name)
            .any(|name| only.iter().any(|o| o == name))
    }
}

// ---------------------------------------------------------------------------
// ActorStop
// ---------------------------------------------------------------------------

/// Early termination of an actor's `process()`. `Skip` ends that actor only
/// and the run proceeds; `Fatal` aborts the whole run at this actor.
#[derive(Debug, Clone, PartialEq)]
pub enum ActorStop {
    Skip { reason: String },
    Fatal { reason: String },
}

impl ActorStop {
    pub fn skip(reason: impl Into<String>) -> Self {
        ActorStop::Skip {
            reason: reason.into(),
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        ActorStop::Fatal {
            reason: reason.into(),
        }
    }
}

impl From<UpliftError> for ActorStop {
    fn from(err: UpliftError) -> Self {
        ActorStop::fatal(err.to_string())
    }
}

pub type ActorResult = std::result::Result<(), ActorStop>;

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// A unit of upgrade logic. Implementations read their declared inputs and
/// write their declared outputs through the [`ActorApi`] handed to
/// `process`; everything else is the engine's business.
pub trait Actor {
    fn manifest(&self) -> &ActorManifest;

    fn process(&self, api: &mut ActorApi<'_>) -> ActorResult;
}

// ---------------------------------------------------------------------------
// ActorApi
// ---------------------------------------------------------------------------

/// Per-invocation view handed to an actor: reads are scoped to the actor's
/// declared `consumes` set, writes are validated against its `produces` set
/// and persisted immediately. One value per invocation, passed explicitly;
/// there is no ambient current-actor state.
pub struct ActorApi<'a> {
    db: &'a AuditDb,
    config: &'a ExecutionConfig,
    context: Uuid,
    manifest: &'a ActorManifest,
    phase: Phase,
}

impl<'a> ActorApi<'a> {
    pub fn new(
        db: &'a AuditDb,
        config: &'a ExecutionConfig,
        context: Uuid,
        manifest: &'a ActorManifest,
        phase: Phase,
    ) -> Self {
        ActorApi {
            db,
            config,
            context,
            manifest,
            phase,
        }
    }

    pub fn context(&self) -> Uuid {
        self.context
    }

    pub fn config(&self) -> &ExecutionConfig {
        self.config
    }

    /// All committed messages of `msg_type` in this context, in creation
    /// order. Restartable: repeated calls within one invocation see the same
    /// consistent snapshot, since nothing else writes while an actor runs.
    pub fn consume(&self, msg_type: &MessageType) -> Result<Vec<Message>> {
        if !self.manifest.consumes.contains(msg_type) {
            return Err(UpliftError::UndeclaredConsumption {
                actor: self.manifest.name.clone(),
                msg_type: msg_type.to_string(),
            });
        }
        self.db.messages(self.context, msg_type)
    }

    /// Persist one output message. Producing a type outside the declared
    /// `produces` set is a contract violation and fails the actor.
    pub fn produce(&mut self, msg_type: MessageType, payload: serde_json::Value) -> Result<()> {
        if !self.manifest.produces.contains(&msg_type) {
            return Err(UpliftError::UndeclaredProduction {
                actor: self.manifest.name.clone(),
                msg_type: msg_type.to_string(),
            });
        }
        let message = Message::new(
            self.context,
            msg_type,
            self.manifest.name.clone(),
            self.phase,
            payload,
        );
        self.db.store_message(&message)
    }

    pub fn produce_report(&mut self, report: &Report) -> Result<()> {
        self.produce(MessageType::report(), serde_json::to_value(report)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
