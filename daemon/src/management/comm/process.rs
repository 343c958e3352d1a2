use async_trait::async_trait;
use log::{debug, warn};
use tokio::process::Command;

use crate::management::ManagerError;

/// OS process control seam: service units for the slots themselves, plus a
/// generic "run a command, check its exit status" primitive for the external
/// tools (chmod, chown, renderer, headless browser).
#[async_trait]
pub trait ProcessControl: Send + Sync {
    async fn start(&self, service: &str) -> Result<(), ManagerError>;
    async fn stop(&self, service: &str) -> Result<(), ManagerError>;
    async fn restart(&self, service: &str) -> Result<(), ManagerError>;
    async fn run(&self, program: &str, args: &[&str]) -> Result<(), ManagerError> {
        self.run_as(program, args, None).await
    }
    async fn run_as(
        &self,
        program: &str,
        args: &[&str],
        uid: Option<u32>,
    ) -> Result<(), ManagerError>;
}

/// Production implementation shelling out to `systemctl` and friends.
pub struct SystemdControl;

impl SystemdControl {
    async fn systemctl(&self, verb: &str, service: &str) -> Result<(), ManagerError> {
        self.run("systemctl", &[verb, service]).await
    }
}

#[async_trait]
impl ProcessControl for SystemdControl {
    async fn start(&self, service: &str) -> Result<(), ManagerError> {
        self.systemctl("start", service).await
    }

    async fn stop(&self, service: &str) -> Result<(), ManagerError> {
        self.systemctl("stop", service).await
    }

    async fn restart(&self, service: &str) -> Result<(), ManagerError> {
        self.systemctl("restart", service).await
    }

    async fn run_as(
        &self,
        program: &str,
        args: &[&str],
        uid: Option<u32>,
    ) -> Result<(), ManagerError> {
        debug!("attempting command \"{} {}\"", program, args.join(" "));
        let mut cmd = Command::new(program);
        cmd.args(args);
        #[cfg(unix)]
        if let Some(uid) = uid {
            cmd.uid(uid);
        }
        #[cfg(not(unix))]
        let _ = uid;

        let status = cmd.status().await?;
        if status.success() {
            Ok(())
        } else {
            warn!(
                "command \"{} {}\" failed with {:?}",
                program,
                args.join(" "),
                status.code()
            );
            Err(ManagerError::ExternalTool {
                command: program.to_string(),
                code: status.code(),
            })
        }
    }
}
