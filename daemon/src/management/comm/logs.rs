use async_trait::async_trait;
use std::path::Path;

/// Read-only view of a slot's append-only console log. The manager only
/// ever reads; rotation and ownership stay with the game server.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Full text of the log, or `None` when it does not exist (yet).
    async fn read(&self, path: &Path) -> Option<String>;
}

pub struct FsLogSource;

#[async_trait]
impl LogSource for FsLogSource {
    async fn read(&self, path: &Path) -> Option<String> {
        tokio::fs::read_to_string(path).await.ok()
    }
}
