//! Dispatch and registration settings.

use serde::{Deserialize, Serialize};

/// Settings for extension registration and dispatch diagnostics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Emit verbose registration diagnostics (full descriptor dumps on
    /// duplicate-id skips, `inspect()` output at debug level).
    #[serde(default)]
    pub debug: bool,
}
