use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::storage::file::{Config, FileIoWithBackup};
use mcws_protocol::management::world::Slot;

/// immutable through full lifetime of app, unless restart app.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    /// Public host the slots answer queries on.
    pub host_name: String,
    /// Root directory holding one subdirectory per world. The per-slot
    /// binding files live next to it, in its parent.
    pub world_directory: PathBuf,
    /// Webroots of the rendered maps, one subdirectory per world.
    pub map_directory: PathBuf,
    /// Per-slot renderer configuration trees.
    pub render_config_directory: PathBuf,
    pub manifest_url: String,
    pub server_jar_path: PathBuf,
    pub renderer_jar_path: PathBuf,
    pub browser_path: PathBuf,
    /// `user:group` owning world files, applied after world creation.
    pub world_owner: String,
    /// `user:group` owning the rendered map webroots.
    pub map_owner: String,
    /// Numeric uid the headless browser runs as.
    pub browser_uid: u32,
    pub query_timeout_ms: u64,
    /// Base template for the per-dimension renderer configuration.
    pub render_template: IndexMap<String, serde_json::Value>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut render_template = IndexMap::new();
        for (key, value) in [
            ("remove-caves-below-y", json!(55)),
            ("cave-detection-ocean-floor", json!(-5)),
            ("cave-detection-uses-block-light", json!(false)),
            ("render-edges", json!(true)),
            ("save-hires-layer", json!(true)),
            ("storage", json!("file")),
            ("ignore-missing-light-data", json!(false)),
            ("min-inhabited-time", json!(0)),
            ("marker-sets", json!({})),
            ("sky-color", json!("#7dabff")),
            ("void-color", json!("#000000")),
            ("ambient-light", json!(0.1)),
            ("world-sky-light", json!(15)),
        ] {
            render_template.insert(key.to_string(), value);
        }

        Self {
            host_name: "localhost".to_string(),
            world_directory: PathBuf::from("/srv/minecraft/worlds"),
            map_directory: PathBuf::from("/srv/minecraft/maps"),
            render_config_directory: PathBuf::from("/srv/minecraft/render"),
            manifest_url: "http://launchermeta.mojang.com/mc/game/version_manifest.json"
                .to_string(),
            server_jar_path: PathBuf::from("/srv/minecraft/server.jar"),
            renderer_jar_path: PathBuf::from("/srv/minecraft/bluemap.jar"),
            browser_path: PathBuf::from("/usr/bin/chromium-browser"),
            world_owner: "111:117".to_string(),
            map_owner: "1000:1000".to_string(),
            browser_uid: 1000,
            query_timeout_ms: 1500,
            render_template,
        }
    }
}

impl FileIoWithBackup for AppConfig {}

impl Config for AppConfig {
    type ConfigType = AppConfig;
}

impl AppConfig {
    fn load() -> AppConfig {
        Self::load_config_or_default("config.json", Self::default).unwrap()
    }

    pub fn get() -> &'static AppConfig {
        &APP_CONFIG
    }

    pub fn world_path(&self, world: &str) -> PathBuf {
        self.world_directory.join(world)
    }

    pub fn properties_path(&self, world: &str) -> PathBuf {
        self.world_path(world).join("server.properties")
    }

    /// The append-only console log the lifecycle manager classifies.
    pub fn log_path(&self, world: &str) -> PathBuf {
        self.world_path(world).join("logs/latest.log")
    }

    /// Persisted slot binding: one plain-text file per slot, next to the
    /// world directory.
    pub fn binding_path(&self, slot: Slot) -> PathBuf {
        let parent = self
            .world_directory
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.world_directory.clone());
        parent.join(slot.binding_file_name())
    }

    pub fn map_path(&self, world: &str) -> PathBuf {
        self.map_directory.join(world)
    }

    /// Render metadata written by the renderer on its first pass over a
    /// world; carries the spawn coordinates used for map links.
    pub fn render_settings_path(&self, world: &str) -> PathBuf {
        self.map_path(world).join("maps/overworld/settings.json")
    }

    pub fn render_config_path(&self, slot: Slot) -> PathBuf {
        self.render_config_directory.join(slot.to_string())
    }
}

static APP_CONFIG: LazyLock<AppConfig> = LazyLock::new(AppConfig::load);
