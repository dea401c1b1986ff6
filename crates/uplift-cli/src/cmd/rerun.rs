use crate::actors;
use crate::cmd::CommandError;
use anyhow::Context;
use std::path::Path;
use uplift_core::config::unsupported_enabled;
use uplift_core::db::AuditDb;
use uplift_core::phase::Phase;
use uplift_core::registry::ActorRegistry;

pub fn run(
    db_path: &Path,
    from_phase: &str,
    only_with_tags: Vec<String>,
    json: bool,
) -> anyhow::Result<()> {
    // Gate and phase checks come first: a refused rerun must leave the
    // audit store exactly as it found it.
    if !unsupported_enabled() {
        return Err(CommandError::UnsupportedNotSet.into());
    }
    let phase: Phase = from_phase.parse().map_err(CommandError::Engine)?;

    let mut db = AuditDb::open(db_path)
        .with_context(|| format!("failed to open audit store at {}", db_path.display()))?;
    let registry = ActorRegistry::build(actors::builtin(), &actors::external_types())
        .context("actor registry validation failed")?;

    let summary = uplift_core::rerun::rerun(&mut db, &registry, phase, only_with_tags)?;
    super::upgrade::report(&summary, json)
}
