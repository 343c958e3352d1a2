use std::collections::HashMap;
use std::fs;

use log::debug;
use serde::Deserialize;

use crate::config::AppConfig;
use mcws_protocol::management::world::{
    RuntimeStatus, ServerProperties, Slot, WorldReport, USED_SLOTS,
};

/// Subset of the metadata file the renderer writes per world; only the
/// spawn position matters here.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenderSettings {
    start_pos: [i64; 2],
}

/// The durable slot → world assignments, one single-line file per slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotBindings(HashMap<Slot, String>);

impl SlotBindings {
    /// Reads every slot's binding file. A missing or empty file means the
    /// slot is unassigned.
    pub fn load(config: &AppConfig) -> Self {
        let mut bindings = HashMap::new();
        for slot in USED_SLOTS {
            if let Ok(content) = fs::read_to_string(config.binding_path(slot)) {
                let world = content.trim().to_string();
                if !world.is_empty() {
                    bindings.insert(slot, world);
                }
            }
        }
        Self(bindings)
    }

    pub fn world_of(&self, slot: Slot) -> Option<&str> {
        self.0.get(&slot).map(String::as_str)
    }

    pub fn slot_of(&self, world: &str) -> Slot {
        USED_SLOTS
            .into_iter()
            .find(|slot| self.world_of(*slot) == Some(world))
            .unwrap_or(Slot::None)
    }

    pub fn is_bound(&self, world: &str) -> bool {
        self.slot_of(world).is_used()
    }

    /// Rewrites one slot's binding file. Only the swap flow calls this.
    pub fn bind(config: &AppConfig, slot: Slot, world: &str) -> std::io::Result<()> {
        fs::write(config.binding_path(slot), world)
    }
}

/// Enumerates world storage and derives each world's dashboard links and
/// properties. Pure filesystem reads; runtime status is layered on by the
/// lifecycle manager.
pub struct WorldInventory {
    config: AppConfig,
}

impl WorldInventory {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Lists every world directory with its slot binding, spawn-aware map
    /// link and properties. Status starts as `Stopped`; the caller overlays
    /// live data.
    pub fn list(&self, bindings: &SlotBindings) -> std::io::Result<Vec<WorldReport>> {
        let mut reports = Vec::new();
        let mut entries: Vec<_> = fs::read_dir(&self.config.world_directory)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect();
        entries.sort();

        for world in entries {
            let (x, y) = self.spawn_coords(&world).unwrap_or((0, 0));
            reports.push(WorldReport {
                slot: bindings.slot_of(&world),
                icon_path: format!("maps/{}/screenshot.png", world),
                map_link: map_fragment("maps", &world, x, y),
                server_properties: self.read_properties(&world),
                status: RuntimeStatus::Stopped,
                name: world,
            });
        }
        Ok(reports)
    }

    pub fn world_count(&self) -> usize {
        fs::read_dir(&self.config.world_directory)
            .map(|entries| entries.filter_map(|entry| entry.ok()).count())
            .unwrap_or(0)
    }

    /// Spawn coordinates from the world's render metadata; `None` until the
    /// first render pass has produced one, or when the file is malformed.
    pub fn spawn_coords(&self, world: &str) -> Option<(i64, i64)> {
        let path = self.config.render_settings_path(world);
        let settings = fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str::<RenderSettings>(&content).ok());
        match settings {
            Some(settings) => Some((settings.start_pos[0], settings.start_pos[1])),
            None => {
                debug!("{} has not been rendered", world);
                None
            }
        }
    }

    /// Best-effort read of the world's `server.properties`; a missing file
    /// yields an empty mapping.
    pub fn read_properties(&self, world: &str) -> ServerProperties {
        fs::read_to_string(self.config.properties_path(world))
            .map(|content| ServerProperties::parse(&content))
            .unwrap_or_default()
    }

    /// Full-file rewrite of the world's `server.properties`.
    pub fn write_properties(
        &self,
        world: &str,
        properties: &ServerProperties,
    ) -> std::io::Result<()> {
        fs::write(self.config.properties_path(world), properties.render())
    }

    /// Externally reachable URL of a world's map view, used for screenshots.
    pub fn map_url(&self, world: &str) -> String {
        let (x, y) = self.spawn_coords(world).unwrap_or((0, 0));
        format!(
            "http://{}/{}",
            self.config.host_name,
            map_fragment("maps", world, x, y)
        )
    }
}

/// Map-view fragment centered on the spawn position.
fn map_fragment(prefix: &str, world: &str, x: i64, y: i64) -> String {
    format!(
        "{}/{}/#overworld:{}:50:{}:100:-0.36:0.72:0:0:perspective",
        prefix, world, x, y
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcws_protocol::management::world::default_properties;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.world_directory = dir.path().join("worlds");
        config.map_directory = dir.path().join("maps");
        fs::create_dir_all(&config.world_directory).unwrap();
        fs::create_dir_all(&config.map_directory).unwrap();
        config
    }

    fn add_world(config: &AppConfig, name: &str) {
        fs::create_dir_all(config.world_path(name)).unwrap();
    }

    #[test]
    fn listing_overlays_slot_bindings() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        add_world(&config, "alpha");
        add_world(&config, "beta");
        SlotBindings::bind(&config, Slot::Slot2, "beta").unwrap();

        let inventory = WorldInventory::new(config.clone());
        let bindings = SlotBindings::load(&config);
        let reports = inventory.list(&bindings).unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].name, "alpha");
        assert_eq!(reports[0].slot, Slot::None);
        assert_eq!(reports[1].name, "beta");
        assert_eq!(reports[1].slot, Slot::Slot2);
        assert!(reports.iter().all(|r| r.status == RuntimeStatus::Stopped));
    }

    #[test]
    fn unrendered_world_defaults_to_origin_coordinates() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        add_world(&config, "alpha");

        let inventory = WorldInventory::new(config.clone());
        assert_eq!(inventory.spawn_coords("alpha"), None);

        let reports = inventory.list(&SlotBindings::default()).unwrap();
        assert!(reports[0].map_link.contains("#overworld:0:50:0:"));
    }

    #[test]
    fn malformed_render_metadata_degrades_to_missing() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        add_world(&config, "alpha");
        let settings = config.render_settings_path("alpha");
        fs::create_dir_all(settings.parent().unwrap()).unwrap();
        fs::write(&settings, "{not json").unwrap();

        let inventory = WorldInventory::new(config);
        assert_eq!(inventory.spawn_coords("alpha"), None);
    }

    #[test]
    fn rendered_world_links_through_its_spawn() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        add_world(&config, "alpha");
        let settings = config.render_settings_path("alpha");
        fs::create_dir_all(settings.parent().unwrap()).unwrap();
        fs::write(&settings, r#"{"startPos": [120, -48], "sorting": 0}"#).unwrap();

        let inventory = WorldInventory::new(config);
        assert_eq!(inventory.spawn_coords("alpha"), Some((120, -48)));
        assert!(inventory
            .map_url("alpha")
            .ends_with("maps/alpha/#overworld:120:50:-48:100:-0.36:0.72:0:0:perspective"));
    }

    #[test]
    fn properties_round_trip_through_the_world_directory() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        add_world(&config, "alpha");
        let inventory = WorldInventory::new(config);

        let mut properties = default_properties();
        properties.set("custom-plugin-key", "42");
        inventory.write_properties("alpha", &properties).unwrap();

        assert_eq!(inventory.read_properties("alpha"), properties);
    }

    #[test]
    fn binding_files_round_trip() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        SlotBindings::bind(&config, Slot::Slot1, "alpha").unwrap();
        SlotBindings::bind(&config, Slot::Slot3, "gamma").unwrap();

        let bindings = SlotBindings::load(&config);
        assert_eq!(bindings.world_of(Slot::Slot1), Some("alpha"));
        assert_eq!(bindings.world_of(Slot::Slot2), None);
        assert_eq!(bindings.slot_of("gamma"), Slot::Slot3);
        assert!(bindings.is_bound("alpha"));
        assert!(!bindings.is_bound("beta"));
    }
}
