use crate::error::{Result, UpliftError};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Audit store location
// ---------------------------------------------------------------------------

/// System-wide store used when running as the upgrade tool normally does.
pub const SYSTEM_DB_DIR: &str = "/var/lib/uplift";

/// Per-user fallback, relative to the home directory.
pub const USER_DB_DIR: &str = ".local/share/uplift";

pub const DB_FILE: &str = "audit.db";

pub const ENV_DB: &str = "UPLIFT_DB";

/// Resolve the audit store path. Precedence: explicit flag, then the
/// `UPLIFT_DB` environment variable, then the system directory when it
/// already exists, then the per-user directory.
pub fn resolve_db_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Ok(value) = std::env::var(ENV_DB) {
        if !value.is_empty() {
            return Ok(PathBuf::from(value));
        }
    }
    let system = Path::new(SYSTEM_DB_DIR);
    if system.is_dir() {
        return Ok(system.join(DB_FILE));
    }
    let home = home::home_dir().ok_or(UpliftError::HomeNotFound)?;
    Ok(home.join(USER_DB_DIR).join(DB_FILE))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
