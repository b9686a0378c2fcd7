//! Events emitted by extension points.
//!
//! Points notify observers about registry mutations; UI features use
//! the `Extended` event to re-render regions when a late-loaded
//! module contributes new extensions.

use serde::{Deserialize, Serialize};

/// A mutation event on an extension point.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PointEvent {
    /// A new extension was registered on the point.
    Extended {
        /// The point that was extended.
        point: String,
        /// The id of the newly registered extension.
        extension: String,
    },
    /// The point was wholesale cleared.
    Cleared {
        /// The point that was cleared.
        point: String,
    },
}

impl PointEvent {
    /// The id of the point this event concerns.
    pub fn point(&self) -> &str {
        match self {
            Self::Extended { point, .. } => point,
            Self::Cleared { point } => point,
        }
    }
}
