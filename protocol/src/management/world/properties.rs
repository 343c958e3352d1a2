use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered view of a world's `server.properties`. Only a handful of keys are
/// ever interpreted; everything else, including keys added by future game
/// versions or by hand, is carried through verbatim and in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerProperties(IndexMap<String, String>);

impl ServerProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the `key=value` line format. Lines without `=` (comments,
    /// blanks) carry no data and are dropped, matching a full-file rewrite
    /// on save.
    pub fn parse(text: &str) -> Self {
        let mut map = IndexMap::new();
        for line in text.lines() {
            if let Some((key, value)) = line.split_once('=') {
                map.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        Self(map)
    }

    /// Renders back to the `key=value` line format, preserving insertion
    /// order.
    pub fn render(&self) -> String {
        let mut text = String::new();
        for (key, value) in &self.0 {
            text.push_str(key);
            text.push('=');
            text.push_str(value);
            text.push('\n');
        }
        text
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// The stock key set a fresh world is created with.
pub fn default_properties() -> ServerProperties {
    let defaults = [
        ("enable-jmx-monitoring", "false"),
        ("verify-names", "true"),
        ("rcon.port", "25575"),
        ("level-seed", ""),
        ("enable-command-block", "false"),
        ("gamemode", "survival"),
        ("enable-query", "true"),
        ("generator-settings", "{}"),
        ("enforce-secure-profile", "true"),
        ("level-name", "world"),
        ("motd", "A Minecraft Server"),
        ("query.port", "25565"),
        ("pvp", "true"),
        ("texture-pack", ""),
        ("generate-structures", "true"),
        ("max-chained-neighbor-updates", "1000000"),
        ("difficulty", "hard"),
        ("network-compression-threshold", "256"),
        ("max-tick-time", "60000"),
        ("require-resource-pack", "false"),
        ("use-native-transport", "true"),
        ("max-players", "20"),
        ("online-mode", "true"),
        ("enable-status", "true"),
        ("allow-flight", "false"),
        ("broadcast-rcon-to-ops", "true"),
        ("view-distance", "10"),
        ("max-build-height", "256"),
        ("server-ip", ""),
        ("resource-pack-prompt", ""),
        ("allow-nether", "true"),
        ("server-port", "25565"),
        ("enable-rcon", "true"),
        ("sync-chunk-writes", "true"),
        ("op-permission-level", "2"),
        ("prevent-proxy-connections", "false"),
        ("hide-online-players", "false"),
        ("resource-pack", ""),
        ("entity-broadcast-range-percentage", "100"),
        ("simulation-distance", "10"),
        ("player-idle-timeout", "30"),
        ("rcon.password", ""),
        ("force-gamemode", "true"),
        ("rate-limit", "0"),
        ("hardcore", "false"),
        ("white-list", "false"),
        ("broadcast-console-to-ops", "true"),
        ("spawn-npcs", "true"),
        ("previews-chat", "false"),
        ("spawn-animals", "true"),
        ("snooper-enabled", "true"),
        ("function-permission-level", "2"),
        ("level-type", "default"),
        ("text-filtering-config", ""),
        ("spawn-monsters", "true"),
        ("enforce-whitelist", "false"),
        ("spawn-protection", "0"),
        ("resource-pack-sha1", ""),
        ("max-world-size", "29999984"),
    ];
    let mut properties = ServerProperties::new();
    for (key, value) in defaults {
        properties.set(key, value);
    }
    properties
}
