use std::fs;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use serde::Deserialize;

use crate::config::AppConfig;
use crate::management::comm::{LogSource, ProcessControl};
use crate::management::minecraft::QueryClient;
use crate::management::render::RenderConfigWriter;
use crate::management::worlds::{SlotBindings, WorldInventory};
use crate::management::ManagerError;
use mcws_protocol::management::minecraft::{classify, listener_stopped, LogState};
use mcws_protocol::management::world::{
    default_properties, RuntimeStatus, Slot, WorldReport, USED_SLOTS,
};

const MAX_WORLDS: usize = 40;
const START_POLL_DELAY: Duration = Duration::from_millis(1000);
const STOP_POLL_DELAY: Duration = Duration::from_millis(1500);
// No single wait may exceed this, however long the whole poll runs.
const MAX_POLL_DELAY: Duration = Duration::from_secs(5);

const EULA_TEXT: &str = "#By changing the setting below to TRUE you are indicating your agreement \
to our EULA (https://account.mojang.com/documents/minecraft_eula).\neula=true\n";
const OPS_JSON: &str = "[]";

lazy_static! {
    static ref WORLD_NAME_RE: Regex =
        Regex::new(r"^[a-zA-Z0-9]+$").expect("failed to compile WORLD_NAME_RE regex");
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWorldOptions {
    pub world_name: String,
    #[serde(default)]
    pub hardcore: bool,
    #[serde(default)]
    pub game_mode: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
}

/// Orchestrates the slot lifecycle: live status derivation, world creation,
/// start/stop of slot services and world swaps. Holds the OS-process and
/// log-inspection collaborators behind trait objects so the polling logic
/// tests against scripted fakes.
pub struct SlotManager {
    config: AppConfig,
    inventory: WorldInventory,
    query: QueryClient,
    process: Arc<dyn ProcessControl>,
    logs: Arc<dyn LogSource>,
}

impl SlotManager {
    pub fn new(
        config: AppConfig,
        process: Arc<dyn ProcessControl>,
        logs: Arc<dyn LogSource>,
    ) -> Self {
        let query = QueryClient::with_timeout(Duration::from_millis(config.query_timeout_ms));
        Self {
            inventory: WorldInventory::new(config.clone()),
            config,
            query,
            process,
            logs,
        }
    }

    /// Status of every known world. Occupied slots are queried concurrently;
    /// a slot that fails to answer degrades to `Stopped` or `Starting` (log
    /// evidence permitting) and never fails the listing as a whole.
    pub async fn list_worlds(&self) -> Result<Vec<WorldReport>, ManagerError> {
        let bindings = SlotBindings::load(&self.config);
        let mut reports = self.inventory.list(&bindings)?;

        let queries = USED_SLOTS.iter().filter_map(|&slot| {
            bindings.world_of(slot).map(|world| {
                let world = world.to_string();
                async move {
                    let result = self.query.query(&self.config.host_name, slot.port()).await;
                    (slot, world, result)
                }
            })
        });

        for (slot, world, result) in join_all(queries).await {
            let Some(report) = reports.iter_mut().find(|report| report.name == world) else {
                continue;
            };
            match result {
                Ok(stats) => report.status = RuntimeStatus::Running(stats),
                Err(err) if err.is_timeout() => {
                    if self.log_state(&world).await == LogState::Starting {
                        report.status = RuntimeStatus::Starting;
                    }
                }
                Err(err) => warn!("query for {} ({}) failed: {}", world, slot, err),
            }
        }
        Ok(reports)
    }

    /// Creates a new, unassigned world. Validation failures are reported to
    /// the caller; failures while laying down the storage are logged and
    /// already-created artifacts are kept.
    pub async fn create_world(
        &self,
        options: NewWorldOptions,
    ) -> Result<Vec<WorldReport>, ManagerError> {
        if self.inventory.world_count() > MAX_WORLDS {
            return Err(ManagerError::validation(format!(
                "only {} worlds supported, contact an admin",
                MAX_WORLDS
            )));
        }
        if !WORLD_NAME_RE.is_match(&options.world_name) {
            return Err(ManagerError::validation(
                "name can only contain letters and numbers",
            ));
        }

        if let Err(err) = self.create_world_storage(&options).await {
            warn!("failed to create {}: {}", options.world_name, err);
        }
        self.list_worlds().await
    }

    async fn create_world_storage(&self, options: &NewWorldOptions) -> Result<(), ManagerError> {
        let world = options.world_name.as_str();
        let directory = self.config.world_path(world);
        fs::create_dir(&directory)?;
        fs::write(directory.join("eula.txt"), EULA_TEXT)?;
        fs::write(directory.join("ops.json"), OPS_JSON)?;

        let mut properties = default_properties();
        properties.set("motd", slot_motd(world, Slot::None));
        properties.set(
            "difficulty",
            options.difficulty.clone().unwrap_or_else(|| "normal".to_string()),
        );
        properties.set(
            "gamemode",
            options.game_mode.clone().unwrap_or_else(|| "survival".to_string()),
        );
        if options.hardcore {
            properties.set("hardcore", "true");
        }
        self.inventory.write_properties(world, &properties)?;

        // The game runs under its own service account.
        let directory = directory.display().to_string();
        self.process
            .run("chown", &["-R", &self.config.world_owner, &directory])
            .await
    }

    /// Starts a slot's service and waits for the boot to become observable.
    /// The wait only ends on `Running` or `Starting`; a boot that never gets
    /// that far needs operator intervention.
    pub async fn start_slot(&self, slot: Slot) -> Result<Vec<WorldReport>, ManagerError> {
        let world = self.bound_world(slot)?;

        let mut properties = self.inventory.read_properties(&world);
        properties.set("server-port", slot.port().to_string());
        properties.set("query.port", slot.port().to_string());
        properties.set("enable-query", "true");
        properties.set("enable-rcon", "false");
        properties.set("motd", slot_motd(&world, slot));
        self.inventory.write_properties(&world, &properties)?;

        self.process.start(&slot.service_name()).await?;
        info!("waiting for {} to boot {}", slot, world);

        let mut delay = Duration::ZERO;
        loop {
            sleep_capped(delay).await;
            delay = START_POLL_DELAY;
            let reports = self.list_worlds().await?;
            let up = reports
                .iter()
                .find(|report| report.slot == slot)
                .map_or(false, |report| {
                    report.status.is_running() || report.status.is_starting()
                });
            if up {
                return Ok(reports);
            }
        }
    }

    /// Stops a slot's service and waits for the log to confirm the full
    /// shutdown. If the live query already shows the process gone the wait
    /// ends early: a crash during stop still counts as stopped.
    pub async fn stop_slot(&self, slot: Slot) -> Result<Vec<WorldReport>, ManagerError> {
        let world = self.bound_world(slot)?;
        self.process.stop(&slot.service_name()).await?;

        loop {
            let tail = self.log_tail(&world).await;
            if listener_stopped(&tail) {
                break;
            }
            let reports = self.list_worlds().await?;
            let still_running = reports
                .iter()
                .find(|report| report.slot == slot)
                .map_or(false, |report| report.status.is_running());
            if !still_running {
                break;
            }
            sleep_capped(STOP_POLL_DELAY).await;
        }
        self.list_worlds().await
    }

    /// Rebinds a slot to another world: stop, rewrite the binding record,
    /// regenerate the renderer configuration, start.
    pub async fn switch_world(
        &self,
        slot: Slot,
        world: &str,
    ) -> Result<Vec<WorldReport>, ManagerError> {
        let bindings = SlotBindings::load(&self.config);
        let reports = self.list_worlds().await?;
        validate_switch(&reports, &bindings, slot, world)?;

        // A slot that never held a world has nothing to stop.
        if bindings.world_of(slot).is_some() {
            self.stop_slot(slot).await?;
        }
        SlotBindings::bind(&self.config, slot, world)?;
        RenderConfigWriter::new(&self.config).write_slot_configs(world, slot)?;
        self.start_slot(slot).await
    }

    fn bound_world(&self, slot: Slot) -> Result<String, ManagerError> {
        if !slot.is_used() {
            return Err(ManagerError::validation("the unassigned slot has no service"));
        }
        SlotBindings::load(&self.config)
            .world_of(slot)
            .map(str::to_string)
            .ok_or_else(|| ManagerError::validation(format!("{} has no world bound", slot)))
    }

    async fn log_tail(&self, world: &str) -> String {
        self.logs
            .read(&self.config.log_path(world))
            .await
            .unwrap_or_default()
    }

    async fn log_state(&self, world: &str) -> LogState {
        classify(&self.log_tail(world).await)
    }
}

fn slot_motd(world: &str, slot: Slot) -> String {
    format!("{} ({})", world, slot)
}

/// Preconditions for a world swap: the outgoing world must be idle, the
/// destination must not be live elsewhere and must not hold another slot.
fn validate_switch(
    reports: &[WorldReport],
    bindings: &SlotBindings,
    slot: Slot,
    world: &str,
) -> Result<(), ManagerError> {
    if !slot.is_used() {
        return Err(ManagerError::validation("cannot swap onto the unassigned slot"));
    }
    if !reports.iter().any(|report| report.name == world) {
        return Err(ManagerError::validation(format!("unknown world {}", world)));
    }

    if let Some(current) = bindings.world_of(slot) {
        let players = reports
            .iter()
            .find(|report| report.name == current)
            .map_or(0, WorldReport::players_online);
        if players != 0 {
            return Err(ManagerError::conflict(format!("{} is currently in use", slot)));
        }
    }

    let destination = reports.iter().find(|report| report.name == world);
    if destination.map_or(false, |report| report.status.is_running()) {
        return Err(ManagerError::conflict(format!("{} is already running", world)));
    }
    if bindings.is_bound(world) {
        return Err(ManagerError::conflict(format!(
            "{} is already in another slot",
            world
        )));
    }
    Ok(())
}

async fn sleep_capped(delay: Duration) {
    tokio::time::sleep(delay.min(MAX_POLL_DELAY)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mcws_protocol::management::minecraft::PingResponse;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Process collaborator that records every call and always succeeds.
    #[derive(Default)]
    struct RecordingControl {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingControl {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl ProcessControl for RecordingControl {
        async fn start(&self, service: &str) -> Result<(), ManagerError> {
            self.record(format!("start {}", service));
            Ok(())
        }
        async fn stop(&self, service: &str) -> Result<(), ManagerError> {
            self.record(format!("stop {}", service));
            Ok(())
        }
        async fn restart(&self, service: &str) -> Result<(), ManagerError> {
            self.record(format!("restart {}", service));
            Ok(())
        }
        async fn run_as(
            &self,
            program: &str,
            args: &[&str],
            _uid: Option<u32>,
        ) -> Result<(), ManagerError> {
            self.record(format!("{} {}", program, args.join(" ")));
            Ok(())
        }
    }

    /// Log collaborator handing out one fixed tail for every world.
    struct FixedLog(&'static str);

    #[async_trait]
    impl LogSource for FixedLog {
        async fn read(&self, _path: &Path) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    const STARTING_LOG: &str =
        "[12:01:03] [Server thread/INFO]: Starting Minecraft server on *:25565\n";
    const STOPPED_LOG: &str =
        "[12:30:02] [Server thread/INFO]: Thread Query Listener stopped\n";

    fn test_config(dir: &TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.host_name = "127.0.0.1".to_string();
        // Nothing is listening in tests; keep the degrade-to-log path quick.
        config.query_timeout_ms = 50;
        config.world_directory = dir.path().join("worlds");
        config.map_directory = dir.path().join("maps");
        config.render_config_directory = dir.path().join("render");
        std::fs::create_dir_all(&config.world_directory).unwrap();
        std::fs::create_dir_all(&config.map_directory).unwrap();
        config
    }

    fn manager_with(
        config: &AppConfig,
        log: &'static str,
    ) -> (SlotManager, Arc<RecordingControl>) {
        let process = Arc::new(RecordingControl::default());
        let manager = SlotManager::new(
            config.clone(),
            process.clone(),
            Arc::new(FixedLog(log)),
        );
        (manager, process)
    }

    fn add_world(config: &AppConfig, name: &str) {
        std::fs::create_dir_all(config.world_path(name)).unwrap();
    }

    fn stopped_report(name: &str, slot: Slot) -> WorldReport {
        WorldReport {
            name: name.to_string(),
            slot,
            icon_path: String::new(),
            map_link: String::new(),
            server_properties: Default::default(),
            status: RuntimeStatus::Stopped,
        }
    }

    fn running_report(name: &str, slot: Slot, players: &[&str]) -> WorldReport {
        let mut report = stopped_report(name, slot);
        report.status = RuntimeStatus::Running(PingResponse {
            world_height: 0,
            motd: String::new(),
            game_type: "SMP".into(),
            game_name: "MINECRAFT".into(),
            game_version: "1.20.4".into(),
            plugins: String::new(),
            default_world: name.into(),
            num_players: players.len() as i32,
            max_players: 20,
            host: "localhost".into(),
            port: slot.port(),
            players: players.iter().map(|p| p.to_string()).collect(),
        });
        report
    }

    fn bindings_of(pairs: &[(Slot, &str)]) -> SlotBindings {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.world_directory = dir.path().join("worlds");
        std::fs::create_dir_all(&config.world_directory).unwrap();
        for (slot, world) in pairs {
            SlotBindings::bind(&config, *slot, world).unwrap();
        }
        SlotBindings::load(&config)
    }

    #[tokio::test]
    async fn create_world_rejects_bad_names() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let (manager, _) = manager_with(&config, "");

        let err = manager
            .create_world(NewWorldOptions {
                world_name: "bad name!".to_string(),
                hardcore: false,
                game_mode: None,
                difficulty: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::Validation(_)));
    }

    #[tokio::test]
    async fn create_world_enforces_the_world_limit() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        for index in 0..41 {
            add_world(&config, &format!("world{}", index));
        }
        let (manager, _) = manager_with(&config, "");

        let err = manager
            .create_world(NewWorldOptions {
                world_name: "another".to_string(),
                hardcore: false,
                game_mode: None,
                difficulty: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::Validation(_)));
    }

    #[tokio::test]
    async fn create_world_lays_down_storage_with_overrides() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let (manager, process) = manager_with(&config, "");

        let reports = manager
            .create_world(NewWorldOptions {
                world_name: "alpha".to_string(),
                hardcore: true,
                game_mode: Some("creative".to_string()),
                difficulty: None,
            })
            .await
            .unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].name, "alpha");
        assert_eq!(reports[0].slot, Slot::None);

        let world_dir = config.world_path("alpha");
        assert!(world_dir.join("eula.txt").is_file());
        assert_eq!(
            std::fs::read_to_string(world_dir.join("ops.json")).unwrap(),
            "[]"
        );
        let properties = reports[0].server_properties.clone();
        assert_eq!(properties.get("hardcore"), Some("true"));
        assert_eq!(properties.get("gamemode"), Some("creative"));
        assert_eq!(properties.get("difficulty"), Some("normal"));
        assert_eq!(properties.get("motd"), Some("alpha (none)"));

        let calls = process.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("chown -R 111:117"));
    }

    #[tokio::test]
    async fn start_slot_rewrites_network_properties_and_waits_for_boot() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        add_world(&config, "alpha");
        SlotBindings::bind(&config, Slot::Slot2, "alpha").unwrap();
        let (manager, process) = manager_with(&config, STARTING_LOG);

        let reports = manager.start_slot(Slot::Slot2).await.unwrap();
        let report = reports.iter().find(|r| r.name == "alpha").unwrap();
        assert_eq!(report.status, RuntimeStatus::Starting);

        let properties = &report.server_properties;
        assert_eq!(properties.get("server-port"), Some("25566"));
        assert_eq!(properties.get("query.port"), Some("25566"));
        assert_eq!(properties.get("enable-query"), Some("true"));
        assert_eq!(properties.get("enable-rcon"), Some("false"));
        assert_eq!(properties.get("motd"), Some("alpha (slot2)"));

        assert_eq!(process.calls(), vec!["start minecraftslot2".to_string()]);
    }

    #[tokio::test]
    async fn start_slot_without_a_binding_is_a_validation_error() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let (manager, _) = manager_with(&config, "");

        assert!(matches!(
            manager.start_slot(Slot::Slot1).await,
            Err(ManagerError::Validation(_))
        ));
        assert!(matches!(
            manager.start_slot(Slot::None).await,
            Err(ManagerError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn stop_slot_finishes_once_the_listener_reports_down() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        add_world(&config, "alpha");
        SlotBindings::bind(&config, Slot::Slot1, "alpha").unwrap();
        let (manager, process) = manager_with(&config, STOPPED_LOG);

        let reports = manager.stop_slot(Slot::Slot1).await.unwrap();
        assert_eq!(reports[0].status, RuntimeStatus::Stopped);
        assert_eq!(process.calls(), vec!["stop minecraftslot1".to_string()]);
    }

    #[tokio::test]
    async fn stop_slot_treats_a_vanished_process_as_stopped() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        add_world(&config, "alpha");
        SlotBindings::bind(&config, Slot::Slot1, "alpha").unwrap();
        // The log never shows a clean shutdown, but the query has nothing to
        // answer either: the crash escape hatch must end the wait.
        let (manager, _) = manager_with(&config, "");

        let reports = manager.stop_slot(Slot::Slot1).await.unwrap();
        assert_eq!(reports[0].status, RuntimeStatus::Stopped);
    }

    #[test]
    fn switch_rejects_a_destination_running_elsewhere() {
        let reports = vec![
            stopped_report("alpha", Slot::Slot1),
            running_report("beta", Slot::None, &[]),
        ];
        let bindings = bindings_of(&[(Slot::Slot1, "alpha")]);

        let err = validate_switch(&reports, &bindings, Slot::Slot1, "beta").unwrap_err();
        assert!(matches!(err, ManagerError::Conflict(_)));
        assert_eq!(err.to_string(), "beta is already running");
    }

    #[test]
    fn switch_rejects_when_the_slot_is_in_use() {
        let reports = vec![
            running_report("alpha", Slot::Slot1, &["alice"]),
            stopped_report("beta", Slot::None),
        ];
        let bindings = bindings_of(&[(Slot::Slot1, "alpha")]);

        let err = validate_switch(&reports, &bindings, Slot::Slot1, "beta").unwrap_err();
        assert!(matches!(err, ManagerError::Conflict(_)));
        assert_eq!(err.to_string(), "slot1 is currently in use");
    }

    #[test]
    fn switch_rejects_a_world_bound_to_another_slot() {
        let reports = vec![
            stopped_report("alpha", Slot::Slot1),
            stopped_report("beta", Slot::Slot2),
        ];
        let bindings = bindings_of(&[(Slot::Slot1, "alpha"), (Slot::Slot2, "beta")]);

        let err = validate_switch(&reports, &bindings, Slot::Slot1, "beta").unwrap_err();
        assert!(matches!(err, ManagerError::Conflict(_)));
        assert_eq!(err.to_string(), "beta is already in another slot");
    }

    #[test]
    fn switch_allows_an_idle_unbound_destination() {
        let reports = vec![
            stopped_report("alpha", Slot::Slot1),
            stopped_report("beta", Slot::None),
        ];
        let bindings = bindings_of(&[(Slot::Slot1, "alpha")]);

        assert!(validate_switch(&reports, &bindings, Slot::Slot1, "beta").is_ok());
    }

    #[test]
    fn switch_allows_a_destination_that_is_merely_starting() {
        let mut starting = stopped_report("beta", Slot::None);
        starting.status = RuntimeStatus::Starting;
        let reports = vec![stopped_report("alpha", Slot::Slot1), starting];
        let bindings = bindings_of(&[(Slot::Slot1, "alpha")]);

        assert!(validate_switch(&reports, &bindings, Slot::Slot1, "beta").is_ok());
    }

    #[tokio::test]
    async fn switch_rebinds_regenerates_render_configs_and_restarts() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        add_world(&config, "alpha");
        add_world(&config, "beta");
        SlotBindings::bind(&config, Slot::Slot1, "alpha").unwrap();
        // The boot log keeps both the stop wait and the start wait short:
        // the slot reads as Starting, which ends either poll.
        let (manager, process) = manager_with(&config, STARTING_LOG);

        let reports = manager.switch_world(Slot::Slot1, "beta").await.unwrap();

        let bindings = SlotBindings::load(&config);
        assert_eq!(bindings.world_of(Slot::Slot1), Some("beta"));
        assert!(config
            .render_config_path(Slot::Slot1)
            .join("maps/overworld.conf")
            .is_file());
        assert_eq!(
            process.calls(),
            vec![
                "stop minecraftslot1".to_string(),
                "start minecraftslot1".to_string()
            ]
        );
        let beta = reports.iter().find(|r| r.name == "beta").unwrap();
        assert_eq!(beta.slot, Slot::Slot1);
    }

    #[tokio::test]
    async fn world_bindings_stay_unique_across_create_and_swap_sequences() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let (manager, _) = manager_with(&config, STARTING_LOG);

        for name in ["alpha", "beta", "gamma"] {
            manager
                .create_world(NewWorldOptions {
                    world_name: name.to_string(),
                    hardcore: false,
                    game_mode: None,
                    difficulty: None,
                })
                .await
                .unwrap();
        }
        manager.switch_world(Slot::Slot1, "alpha").await.unwrap();
        manager.switch_world(Slot::Slot2, "beta").await.unwrap();

        // The same world can never land in two slots.
        assert!(matches!(
            manager.switch_world(Slot::Slot3, "alpha").await,
            Err(ManagerError::Conflict(_))
        ));
        // Re-binding the slot that already holds it is a conflict too.
        assert!(matches!(
            manager.switch_world(Slot::Slot1, "alpha").await,
            Err(ManagerError::Conflict(_))
        ));

        let bindings = SlotBindings::load(&config);
        let bound: Vec<_> = USED_SLOTS
            .into_iter()
            .filter_map(|slot| bindings.world_of(slot))
            .collect();
        let mut unique = bound.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(bound.len(), unique.len());
        assert_eq!(bindings.world_of(Slot::Slot3), None);
    }

    #[test]
    fn switch_rejects_an_unknown_world() {
        let reports = vec![stopped_report("alpha", Slot::Slot1)];
        let bindings = bindings_of(&[(Slot::Slot1, "alpha")]);

        assert!(matches!(
            validate_switch(&reports, &bindings, Slot::Slot1, "ghost"),
            Err(ManagerError::Validation(_))
        ));
    }
}
