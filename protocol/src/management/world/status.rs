use serde::{Deserialize, Serialize};

use crate::management::minecraft::PingResponse;

/// Derived, never persisted classification of a slot's live state. Computed
/// fresh on every inventory read from the query reply and the log tail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "stats", rename_all = "snake_case")]
pub enum RuntimeStatus {
    Stopped,
    Starting,
    Running(PingResponse),
}

impl RuntimeStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, RuntimeStatus::Running(_))
    }

    pub fn is_starting(&self) -> bool {
        matches!(self, RuntimeStatus::Starting)
    }

    pub fn stats(&self) -> Option<&PingResponse> {
        match self {
            RuntimeStatus::Running(stats) => Some(stats),
            _ => None,
        }
    }

    /// Connected player count; zero unless the slot answers queries.
    pub fn players_online(&self) -> i32 {
        self.stats().map(|s| s.num_players).unwrap_or(0)
    }

    pub fn game_version(&self) -> Option<&str> {
        self.stats().map(|s| s.game_version.as_str())
    }
}
