use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::ops::Deref;
use std::sync::{Arc, LazyLock};
use tokio::sync::Notify;

use crate::config::AppConfig;
use crate::management::comm::{FsLogSource, LogSource, ProcessControl, SystemdControl};
use crate::management::SlotManager;
use crate::scheduler::Scheduler;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
static START_TIME: LazyLock<DateTime<Utc>> = LazyLock::new(Utc::now);

pub struct ApplicationState {
    pub stop_notify: Arc<Notify>,
    pub manager: Arc<SlotManager>,
    pub scheduler: Arc<Scheduler>,
}
pub type AppState = Arc<ApplicationState>;

pub fn get_start_time() -> &'static DateTime<Utc> {
    START_TIME.deref()
}

fn init_app_state() -> AppState {
    let config = AppConfig::get();
    debug!(
        "config loaded: {}",
        serde_json::to_string_pretty(&config).unwrap()
    );

    let process: Arc<dyn ProcessControl> = Arc::new(SystemdControl);
    let logs: Arc<dyn LogSource> = Arc::new(FsLogSource);
    let manager = Arc::new(SlotManager::new(config.clone(), process.clone(), logs));
    let scheduler = Arc::new(Scheduler::new(manager.clone(), process, config.clone()));

    Arc::new(ApplicationState {
        stop_notify: Arc::new(Notify::new()),
        manager,
        scheduler,
    })
}

pub async fn run_app() -> anyhow::Result<()> {
    let _ = get_start_time();
    info!("mcws daemon v{}", VERSION);

    let state = init_app_state();
    match state.manager.list_worlds().await {
        Ok(worlds) => info!(
            "{} worlds on disk, {} occupying slots",
            worlds.len(),
            worlds.iter().filter(|world| world.occupied()).count()
        ),
        Err(err) => warn!("initial world listing failed: {}", err),
    }

    let maintenance = tokio::spawn(
        state
            .scheduler
            .clone()
            .run(state.stop_notify.clone()),
    );

    tokio::signal::ctrl_c()
        .await
        .expect("can't install ctrl+c signal handler");
    state.stop_notify.notify_waiters();
    maintenance.await?;
    info!("Bye.");
    Ok(())
}
