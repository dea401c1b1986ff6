use crate::phase::Phase;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpliftError {
    #[error("no prior execution found: run 'uplift upgrade' first")]
    NoPriorExecution,

    #[error("invalid phase: {0}")]
    InvalidPhase(String),

    #[error("invalid execution kind: {0}")]
    InvalidExecutionKind(String),

    #[error("phase '{0}' cannot be rerun (supported: {1})")]
    UnsupportedResumePhase(Phase, String),

    #[error("phase '{0}' was never executed in the last run")]
    PhaseNeverRan(Phase),

    #[error("duplicate actor name: {0}")]
    DuplicateActor(String),

    #[error("actor '{0}' has no phase tag")]
    MissingPhaseTag(String),

    #[error("actor '{0}' has more than one phase tag")]
    MultiplePhaseTags(String),

    #[error("actor '{actor}' consumes '{msg_type}' but no earlier actor produces it")]
    UnsatisfiedConsumer { actor: String, msg_type: String },

    #[error("dependency cycle among actors in phase '{phase}': {actors}")]
    DependencyCycle { phase: Phase, actors: String },

    #[error("actor '{actor}' produced undeclared message type '{msg_type}'")]
    UndeclaredProduction { actor: String, msg_type: String },

    #[error("actor '{actor}' consumed undeclared message type '{msg_type}'")]
    UndeclaredConsumption { actor: String, msg_type: String },

    #[error("actor '{actor}' failed in phase '{phase}': {reason}")]
    ActorFailed {
        phase: Phase,
        actor: String,
        reason: String,
    },

    #[error("home directory not found: set HOME environment variable")]
    HomeNotFound,

    #[error("invalid context id: {0}")]
    ContextId(#[from] uuid::Error),

    #[error("invalid timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("audit store error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, UpliftError>;
