//! Endpoint and overall health status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of one endpoint, or the rollup of all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Healthy,
    Degraded,
    Down,
    /// Nothing has been observed yet.
    Unknown,
}

impl Status {
    /// Whether `self` outranks `other` when rolling up statuses.
    /// Down beats degraded beats healthy beats unknown.
    pub fn priority_over(self, other: Status) -> bool {
        self.rank() > other.rank()
    }

    fn rank(self) -> u8 {
        match self {
            Status::Unknown => 0,
            Status::Healthy => 1,
            Status::Degraded => 2,
            Status::Down => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Healthy => "healthy",
            Status::Degraded => "degraded",
            Status::Down => "down",
            Status::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
