use serde::{Deserialize, Serialize};

use super::{RuntimeStatus, ServerProperties, Slot};

/// One world's line in the status listing: its durable identity (name and
/// slot binding), its dashboard links, and the runtime status derived for
/// this read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldReport {
    pub name: String,
    pub slot: Slot,
    pub icon_path: String,
    pub map_link: String,
    pub server_properties: ServerProperties,
    pub status: RuntimeStatus,
}

impl WorldReport {
    /// Whether the world is bound to a real slot.
    pub fn occupied(&self) -> bool {
        self.slot.is_used()
    }

    pub fn players_online(&self) -> i32 {
        self.status.players_online()
    }
}
