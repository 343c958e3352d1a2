//! Unattended maintenance: version sync, deferred slot restarts and map
//! rendering, in that order, on a repeating timer. Every routine goes
//! through the slot lifecycle manager for its view of the world; nothing
//! here keeps durable state, each cycle rebuilds its picture from disk and
//! live queries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use log::{debug, info, warn};
use tokio::sync::Notify;

use crate::config::AppConfig;
use crate::management::comm::ProcessControl;
use crate::management::render::renderer_args;
use crate::management::worlds::WorldInventory;
use crate::management::SlotManager;
use crate::storage::file::file_sha1;
use self::manifest::{download, fetch_json, VersionManifest, VersionPackage};
use mcws_protocol::management::world::WorldReport;

pub mod manifest;

const FIRST_RUN_DELAY: Duration = Duration::from_secs(5);
const CYCLE_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Maintenance flags owned by the scheduler instance. Cleared only by the
/// routine that can prove the corresponding work is done.
#[derive(Debug, Default)]
struct MaintenanceState {
    /// A newer release was detected and the binary swap is underway.
    update_pending: AtomicBool,
    /// A binary swap landed; every occupied slot must restart once idle.
    restart_deferred: AtomicBool,
    /// At most one render pass may run at a time.
    rendering: AtomicBool,
}

/// Resets the render flag when the pass ends, however it ends.
struct RenderGuard<'a>(&'a AtomicBool);

impl Drop for RenderGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Scheduler {
    manager: Arc<SlotManager>,
    process: Arc<dyn ProcessControl>,
    inventory: WorldInventory,
    config: AppConfig,
    http: reqwest::Client,
    state: MaintenanceState,
}

impl Scheduler {
    pub fn new(
        manager: Arc<SlotManager>,
        process: Arc<dyn ProcessControl>,
        config: AppConfig,
    ) -> Self {
        Self {
            manager,
            process,
            inventory: WorldInventory::new(config.clone()),
            config,
            http: reqwest::Client::new(),
            state: MaintenanceState::default(),
        }
    }

    /// Runs cycles until `stop` fires. The first cycle is delayed a few
    /// seconds so the daemon finishes coming up first.
    pub async fn run(self: Arc<Self>, stop: Arc<Notify>) {
        tokio::select! {
            _ = stop.notified() => return,
            _ = tokio::time::sleep(FIRST_RUN_DELAY) => {}
        }
        info!("starting background tasks");
        loop {
            self.run_cycle().await;
            tokio::select! {
                _ = stop.notified() => return,
                _ = tokio::time::sleep(CYCLE_INTERVAL) => {}
            }
        }
    }

    /// One maintenance cycle. A failing step is logged and never blocks the
    /// remaining steps or later cycles.
    pub async fn run_cycle(&self) {
        debug!(
            "maintenance cycle: update_pending={} restart_deferred={}",
            self.state.update_pending.load(Ordering::SeqCst),
            self.state.restart_deferred.load(Ordering::SeqCst)
        );
        if let Err(err) = self.sync_version().await {
            warn!("version sync failed: {:#}", err);
        }
        if let Err(err) = self.flush_deferred_restarts().await {
            warn!("deferred restart flush failed: {:#}", err);
        }
        if let Err(err) = self.render_maps().await {
            warn!("render pass failed: {:#}", err);
        }
    }

    async fn occupied_worlds(&self) -> anyhow::Result<Vec<WorldReport>> {
        Ok(self
            .manager
            .list_worlds()
            .await?
            .into_iter()
            .filter(WorldReport::occupied)
            .collect())
    }

    /// Compares the live game version against the upstream feed and stages
    /// a new server binary when they differ. The swap itself is deferred to
    /// [`flush_deferred_restarts`], attempted once immediately.
    async fn sync_version(&self) -> anyhow::Result<()> {
        let worlds = self.occupied_worlds().await?;
        let Some(current) = current_game_version(&worlds) else {
            debug!("no slot reports a game version, skipping version sync");
            return Ok(());
        };
        info!("current version {}", current);

        let feed: VersionManifest = fetch_json(&self.http, &self.config.manifest_url).await?;
        info!("latest version {}", feed.latest.release);
        if current == feed.latest.release {
            return Ok(());
        }

        self.state.update_pending.store(true, Ordering::SeqCst);
        let package_url = feed
            .latest_release_url()
            .context("feed has no entry for its own latest release")?;
        let package: VersionPackage = fetch_json(&self.http, package_url).await?;

        info!("updating server binary to {}", package.id);
        download(
            &self.http,
            &package.downloads.server.url,
            &self.config.server_jar_path,
        )
        .await?;

        let digest = file_sha1(&self.config.server_jar_path).await?;
        if digest != package.downloads.server.sha1 {
            bail!(
                "server binary checksum mismatch: expected {} got {}",
                package.downloads.server.sha1,
                digest
            );
        }

        let jar = self.config.server_jar_path.display().to_string();
        self.process.run("chmod", &["+x", &jar]).await?;
        self.state.update_pending.store(false, Ordering::SeqCst);
        self.state.restart_deferred.store(true, Ordering::SeqCst);

        // The slots may happen to be idle right now.
        self.flush_deferred_restarts().await
    }

    /// Restarts every occupied slot once none of them has players online,
    /// then clears the deferred flag. Otherwise leaves the flag for the
    /// next cycle.
    async fn flush_deferred_restarts(&self) -> anyhow::Result<()> {
        if !self.state.restart_deferred.load(Ordering::SeqCst) {
            return Ok(());
        }
        let worlds = self.occupied_worlds().await?;
        self.flush_for(&worlds).await;
        Ok(())
    }

    async fn flush_for(&self, worlds: &[WorldReport]) {
        if !self.state.restart_deferred.load(Ordering::SeqCst) {
            return;
        }
        if worlds.iter().any(|world| world.players_online() > 0) {
            debug!("players online, deferring restart to a later cycle");
            return;
        }

        self.state.restart_deferred.store(false, Ordering::SeqCst);
        for world in worlds {
            let service = world.slot.service_name();
            if let Err(err) = self.process.restart(&service).await {
                warn!("failed to restart {}: {}", service, err);
            }
        }
    }

    async fn render_maps(&self) -> anyhow::Result<()> {
        let worlds = self.occupied_worlds().await?;
        self.render_pass(&worlds).await;
        Ok(())
    }

    /// One sequential sweep rendering every occupied world and refreshing
    /// its screenshot. A second trigger while a pass is in flight is a
    /// no-op; per-world failures do not stop the sweep.
    async fn render_pass(&self, worlds: &[WorldReport]) {
        if self
            .state
            .rendering
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("render pass already in progress, skipping");
            return;
        }
        let _guard = RenderGuard(&self.state.rendering);

        info!("starting render pass over {} worlds", worlds.len());
        // Sequential on purpose: the renderer saturates the CPU on its own.
        for world in worlds {
            debug!("rendering {} ({})", world.name, world.slot);
            let args = renderer_args(&self.config, world.slot);
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            if let Err(err) = self.process.run("java", &args).await {
                warn!("failed to render {}: {}", world.name, err);
                continue;
            }
            if let Err(err) = self.update_screenshot(&world.name).await {
                warn!("failed to update screenshot for {}: {}", world.name, err);
            }
        }
    }

    /// Best-effort refresh of a world's dashboard screenshot: fix map
    /// ownership, restore the favicon the renderer overwrote, then shoot
    /// the map view headlessly at the world's spawn.
    async fn update_screenshot(&self, world: &str) -> anyhow::Result<()> {
        self.inventory
            .spawn_coords(world)
            .with_context(|| format!("{} has no render metadata yet", world))?;

        let map_root = self.config.map_path(world).display().to_string();
        self.process
            .run("chown", &["-R", &self.config.map_owner, &map_root])
            .await?;

        self.restore_favicon(world)?;

        let destination = self.config.map_path(world).join("screenshot.png");
        let screenshot_arg = format!("--screenshot={}", destination.display());
        let url = self.inventory.map_url(world);
        let browser = self.config.browser_path.display().to_string();
        self.process
            .run_as(
                &browser,
                &[
                    "--headless=new",
                    "--timeout=20000",
                    "--hide-scrollbars",
                    "--disable-cache",
                    &screenshot_arg,
                    &url,
                ],
                Some(self.config.browser_uid),
            )
            .await?;
        Ok(())
    }

    /// The renderer regenerates the webapp assets on every pass, favicon
    /// included; copy the site-wide one back over it.
    fn restore_favicon(&self, world: &str) -> anyhow::Result<()> {
        let assets = self.config.map_path(world).join("assets");
        let favicon = std::fs::read_dir(&assets)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .find(|name| name.starts_with("favicon"));
        let Some(favicon) = favicon else {
            debug!("{} has no favicon asset to replace", world);
            return Ok(());
        };

        let site_favicon = self
            .config
            .map_directory
            .parent()
            .map(|parent| parent.join("favicon.ico"))
            .context("map directory has no parent")?;
        std::fs::copy(site_favicon, assets.join(favicon))?;
        Ok(())
    }
}

/// Game version to compare against the feed: the first occupied slot that
/// answers queries wins. Slots running mixed versions make this ambiguous;
/// see DESIGN.md.
fn current_game_version(worlds: &[WorldReport]) -> Option<String> {
    worlds
        .iter()
        .find_map(|world| world.status.game_version().map(str::to_string))
}
