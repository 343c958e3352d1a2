use std::fmt::Write as _;
use std::fs;

use crate::config::AppConfig;
use mcws_protocol::management::world::Slot;

/// The three dimensions every world carries; each gets its own map
/// configuration in a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dimension {
    Overworld,
    Nether,
    End,
}

const DIMENSIONS: [Dimension; 3] = [Dimension::Overworld, Dimension::Nether, Dimension::End];

impl Dimension {
    fn key(self) -> &'static str {
        match self {
            Dimension::Overworld => "overworld",
            Dimension::Nether => "nether",
            Dimension::End => "end",
        }
    }

    /// Human-readable map title for the given world.
    fn map_name(self, world: &str) -> String {
        match self {
            Dimension::Overworld => world.to_string(),
            Dimension::Nether => format!("{} (Nether)", world),
            Dimension::End => format!("{} (End)", world),
        }
    }

    /// Save-data subdirectory holding the dimension's region files.
    fn world_subpath(self) -> &'static str {
        match self {
            Dimension::Overworld => "",
            Dimension::Nether => "/DIM-1",
            Dimension::End => "/DIM1",
        }
    }
}

/// Writes the per-slot renderer configuration tree before a slot starts
/// with a new world: one `key: value` file per dimension derived from the
/// configured base template, plus the fixed core/webapp/storage/webserver
/// files pointing the renderer at the world's map webroot.
pub struct RenderConfigWriter<'a> {
    config: &'a AppConfig,
}

impl<'a> RenderConfigWriter<'a> {
    pub fn new(config: &'a AppConfig) -> Self {
        Self { config }
    }

    pub fn write_slot_configs(&self, world: &str, slot: Slot) -> std::io::Result<()> {
        let root = self.config.render_config_path(slot);
        fs::create_dir_all(root.join("maps"))?;
        fs::create_dir_all(root.join("storages"))?;

        for dimension in DIMENSIONS {
            fs::write(
                root.join("maps").join(format!("{}.conf", dimension.key())),
                self.dimension_config(world, dimension),
            )?;
        }
        fs::write(root.join("core.conf"), self.core_config())?;
        fs::write(root.join("webapp.conf"), self.webapp_config(world))?;
        fs::write(root.join("storages/file.conf"), self.storage_config(world))?;
        fs::write(root.join("webserver.conf"), self.webserver_config(world))?;
        Ok(())
    }

    /// One dimension's map settings: name and world path first, then the
    /// base template verbatim. String values are JSON-quoted.
    fn dimension_config(&self, world: &str, dimension: Dimension) -> String {
        let world_path = format!(
            "{}/world{}",
            self.config.world_path(world).display(),
            dimension.world_subpath()
        );

        let mut text = String::new();
        let _ = writeln!(text, "name: {:?}", dimension.map_name(world));
        let _ = writeln!(text, "world: {:?}", world_path);
        for (key, value) in &self.config.render_template {
            let _ = writeln!(text, "{}: {}", key, value);
        }
        text
    }

    fn core_config(&self) -> String {
        concat!(
            "accept-download: true\n",
            "data: \"data\"\n",
            "render-thread-count: -1\n",
            "scan-for-mod-resources: false\n",
            "metrics: true\n",
            "log: {\n",
            "  file: \"data/logs/debug.log\"\n",
            "  append: false\n",
            "}\n"
        )
        .to_string()
    }

    fn webapp_config(&self, world: &str) -> String {
        format!(
            "enabled: true\n\
             webroot: {:?}\n\
             update-settings-file: true\n\
             use-cookies: true\n\
             enable-free-flight: true\n\
             default-to-flat-view: false\n\
             min-zoom-distance: 5\n\
             max-zoom-distance: 100000\n\
             resolution-default: 1\n\
             hires-slider-max: 500\n\
             hires-slider-default: 100\n\
             hires-slider-min: 0\n\
             lowres-slider-max: 7000\n\
             lowres-slider-default: 2000\n\
             lowres-slider-min: 500\n\
             scripts: []\n\
             styles: []\n",
            self.config.map_path(world).display().to_string()
        )
    }

    fn storage_config(&self, world: &str) -> String {
        format!(
            "storage-type: FILE\nroot: {:?}\ncompression: GZIP\n",
            self.config.map_path(world).join("maps").display().to_string()
        )
    }

    fn webserver_config(&self, world: &str) -> String {
        format!(
            "enabled: false\n\
             webroot: {:?}\n\
             port: 8100\n\
             log: {{\n\
             \x20   file: \"data/logs/webserver.log\"\n\
             \x20   append: false\n\
             }}\n",
            self.config.map_path(world).display().to_string()
        )
    }
}

/// Renderer invocation arguments for one slot's configuration tree.
pub fn renderer_args(config: &AppConfig, slot: Slot) -> Vec<String> {
    vec![
        "-jar".to_string(),
        config.renderer_jar_path.display().to_string(),
        "-c".to_string(),
        config.render_config_path(slot).display().to_string(),
        "-r".to_string(),
    ]
}
