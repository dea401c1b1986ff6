pub mod phases;
pub mod rerun;
pub mod status;
pub mod upgrade;

use thiserror::Error;

/// User-facing command errors, raised before any engine state is touched.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("rerun is an unsupported operation: set UPLIFT_UNSUPPORTED=1 to proceed")]
    UnsupportedNotSet,

    #[error(transparent)]
    Engine(#[from] uplift_core::UpliftError),
}
