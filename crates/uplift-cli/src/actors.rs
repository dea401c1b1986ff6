//! Compiled-in seed actors. The broader check/mutation actor population
//! lives outside this crate; these two exist so a bare installation can
//! exercise the whole workflow: one collects host facts, one validates the
//! requested upgrade path against them.

use std::collections::BTreeSet;
use std::path::PathBuf;

use uplift_core::actor::{Actor, ActorApi, ActorManifest, ActorResult, ActorStop};
use uplift_core::message::{MessageType, Report, Severity};
use uplift_core::phase::{Phase, Tag};

pub const WORKFLOW_TAG: &str = "upgrade";

const OS_RELEASE_PATH: &str = "/etc/os-release";

pub fn os_release_type() -> MessageType {
    MessageType::new("os_release")
}

/// Seeded by the CLI before any actor runs.
pub fn upgrade_request_type() -> MessageType {
    MessageType::new("upgrade_request")
}

pub fn builtin() -> Vec<Box<dyn Actor>> {
    vec![
        Box::new(ScanOsRelease::new()),
        Box::new(CheckTargetVersion::new()),
    ]
}

pub fn external_types() -> BTreeSet<MessageType> {
    [upgrade_request_type()].into()
}

// ---------------------------------------------------------------------------
// ScanOsRelease
// ---------------------------------------------------------------------------

/// Reads `/etc/os-release` into an `os_release` facts message.
pub struct ScanOsRelease {
    manifest: ActorManifest,
    path: PathBuf,
}

impl ScanOsRelease {
    pub fn new() -> Self {
        ScanOsRelease {
            manifest: ActorManifest::new("scan_os_release")
                .produce(os_release_type())
                .phase_tag(Phase::Facts)
                .tag(Tag::workflow(WORKFLOW_TAG)),
            path: PathBuf::from(OS_RELEASE_PATH),
        }
    }
}

impl Actor for ScanOsRelease {
    fn manifest(&self) -> &ActorManifest {
        &self.manifest
    }

    fn process(&self, api: &mut ActorApi<'_>) -> ActorResult {
        if !self.path.exists() {
            return Err(ActorStop::skip(format!(
                "{} not present on this host",
                self.path.display()
            )));
        }
        let data = std::fs::read_to_string(&self.path)
            .map_err(|e| ActorStop::fatal(format!("reading {}: {e}", self.path.display())))?;
        api.produce(os_release_type(), parse_os_release(&data))?;
        Ok(())
    }
}

/// Parse the `KEY=value` lines of an os-release file into a JSON object,
/// stripping surrounding quotes.
fn parse_os_release(data: &str) -> serde_json::Value {
    let mut fields = serde_json::Map::new();
    for line in data.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        fields.insert(key.trim().to_string(), serde_json::Value::from(value));
    }
    serde_json::Value::Object(fields)
}

// ---------------------------------------------------------------------------
// CheckTargetVersion
// ---------------------------------------------------------------------------

/// Validates the requested target against the running system: the target
/// must be present and exactly one major version ahead. Anything else is an
/// inhibitor finding, which blocks the destructive phases downstream.
pub struct CheckTargetVersion {
    manifest: ActorManifest,
}

impl CheckTargetVersion {
    pub fn new() -> Self {
        CheckTargetVersion {
            manifest: ActorManifest::new("check_target_version")
                .consume(os_release_type())
                .consume(upgrade_request_type())
                .produce(MessageType::report())
                .phase_tag(Phase::Checks)
                .tag(Tag::workflow(WORKFLOW_TAG)),
        }
    }
}

impl Actor for CheckTargetVersion {
    fn manifest(&self) -> &ActorManifest {
        &self.manifest
    }

    fn process(&self, api: &mut ActorApi<'_>) -> ActorResult {
        let target = api
            .consume(&upgrade_request_type())?
            .first()
            .and_then(|m| m.payload["target_version"].as_str().map(str::to_string));
        let source = api
            .consume(&os_release_type())?
            .first()
            .and_then(|m| m.payload["VERSION_ID"].as_str().map(str::to_string));

        let report = check_upgrade_path(source.as_deref(), target.as_deref());
        api.produce_report(&report)?;
        Ok(())
    }
}

fn check_upgrade_path(source: Option<&str>, target: Option<&str>) -> Report {
    let Some(target) = target else {
        return Report::new(
            "no target version",
            "no target version was requested; pass --target",
        )
        .severity(Severity::High)
        .inhibitor();
    };
    let Some(source) = source else {
        return Report::new(
            "unknown source version",
            "the running system reports no VERSION_ID",
        )
        .severity(Severity::High)
        .inhibitor();
    };
    match (major_of(source), major_of(target)) {
        (Some(s), Some(t)) if t == s + 1 => Report::new(
            "upgrade path supported",
            format!("{source} to {target} is a supported in-place upgrade"),
        ),
        _ => Report::new(
            "unsupported upgrade path",
            format!("cannot upgrade in place from {source} to {target}"),
        )
        .severity(Severity::High)
        .inhibitor(),
    }
}

fn major_of(version: &str) -> Option<u64> {
    version.split('.').next()?.parse().ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
