use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// A totally ordered stage of the upgrade workflow. The declaration order
/// here is the execution order; no phase ever runs before an earlier one
/// has fully completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Facts,
    Checks,
    TargetTransactionFacts,
    InterimPreparation,
    RpmUpgrade,
    Applications,
    Finalization,
    FirstBoot,
}

impl Phase {
    pub fn all() -> &'static [Phase] {
        &[
            Phase::Facts,
            Phase::Checks,
            Phase::TargetTransactionFacts,
            Phase::InterimPreparation,
            Phase::RpmUpgrade,
            Phase::Applications,
            Phase::Finalization,
            Phase::FirstBoot,
        ]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Option<Phase> {
        let all = Phase::all();
        let i = self.index();
        all.get(i + 1).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Facts => "facts",
            Phase::Checks => "checks",
            Phase::TargetTransactionFacts => "target_transaction_facts",
            Phase::InterimPreparation => "interim_preparation",
            Phase::RpmUpgrade => "rpm_upgrade",
            Phase::Applications => "applications",
            Phase::Finalization => "finalization",
            Phase::FirstBoot => "first_boot",
        }
    }

    /// True for phases that mutate the host (RPM transaction, bootloader and
    /// initramfs changes). Entry into the first destructive phase is gated on
    /// the absence of accumulated inhibitors.
    pub fn is_destructive(self) -> bool {
        self >= Phase::InterimPreparation
    }

    /// True for phases that are safe to re-enter via `rerun`.
    pub fn resumable(self) -> bool {
        matches!(self, Phase::FirstBoot)
    }

    pub fn resumable_phases() -> Vec<Phase> {
        Phase::all().iter().copied().filter(|p| p.resumable()).collect()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = crate::error::UpliftError;

    /// Accepts `first_boot`, `first-boot`, and `FirstBoot` spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "facts" => Ok(Phase::Facts),
            "checks" => Ok(Phase::Checks),
            "targettransactionfacts" => Ok(Phase::TargetTransactionFacts),
            "interimpreparation" => Ok(Phase::InterimPreparation),
            "rpmupgrade" => Ok(Phase::RpmUpgrade),
            "applications" => Ok(Phase::Applications),
            "finalization" => Ok(Phase::Finalization),
            "firstboot" => Ok(Phase::FirstBoot),
            _ => Err(crate::error::UpliftError::InvalidPhase(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tag
// ---------------------------------------------------------------------------

/// Actor metadata. Every actor carries exactly one `Phase` tag selecting
/// where it runs; `Workflow` and `Custom` tags select participation and are
/// matched by `--only-actors-with-tag` filters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Tag {
    Phase(Phase),
    Workflow(String),
    Custom(String),
}

impl Tag {
    pub fn workflow(name: impl Into<String>) -> Self {
        Tag::Workflow(name.into())
    }

    pub fn custom(name: impl Into<String>) -> Self {
        Tag::Custom(name.into())
    }

    pub fn phase(&self) -> Option<Phase> {
        match self {
            Tag::Phase(p) => Some(*p),
            _ => None,
        }
    }

    /// The filterable name of a workflow or custom tag.
    pub fn name(&self) -> Option<&str> {
        match self {
            Tag::Phase(_) => None,
            Tag::Workflow(n) | Tag::Custom(n) => Some(n),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
