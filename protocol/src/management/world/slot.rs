use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the fixed server instance identities a world can be bound to,
/// plus the sentinel for "not bound anywhere".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Slot1,
    Slot2,
    Slot3,
    None,
}

/// The slots that map to real service units, in display order.
pub const USED_SLOTS: [Slot; 3] = [Slot::Slot1, Slot::Slot2, Slot::Slot3];

impl Slot {
    /// Game and query port, derived deterministically from the slot id.
    pub fn port(self) -> u16 {
        match self {
            Slot::Slot1 | Slot::None => 25565,
            Slot::Slot2 => 25566,
            Slot::Slot3 => 25567,
        }
    }

    /// Name of the service unit running this slot.
    pub fn service_name(self) -> String {
        format!("minecraft{}", self)
    }

    /// File name of the slot's persisted world binding.
    pub fn binding_file_name(self) -> String {
        self.to_string()
    }

    pub fn is_used(self) -> bool {
        self != Slot::None
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Slot::Slot1 => "slot1",
            Slot::Slot2 => "slot2",
            Slot::Slot3 => "slot3",
            Slot::None => "none",
        };
        write!(f, "{}", name)
    }
}
