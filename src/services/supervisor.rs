//! Supervision of the DHCP daemon backing the access point.

use crate::command::{CommandLine, CommandResult, CommandRunner, FailureKind, Privilege};
use log::{error, info, warn};
use std::{path::Path, sync::Arc, time::Duration};
use tokio::time::sleep;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// How a supervised daemon is launched and found
#[derive(Clone, Debug)]
pub struct SupervisedService {
    /// process name for `pgrep`/`pkill`
    pub process_name: String,
    /// binary to launch
    pub program: String,
    /// flag preceding the configuration path
    pub config_flag: String,
    /// service manager unit used as fallback
    pub unit: String,
}

impl SupervisedService {
    pub fn dnsmasq() -> Self {
        Self {
            process_name: "dnsmasq".to_string(),
            program: "dnsmasq".to_string(),
            config_flag: "-C".to_string(),
            unit: "dnsmasq".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SupervisorTiming {
    /// wait after killing a previous instance
    pub kill_grace: Duration,
    /// wait after launching before checking liveness
    pub launch_grace: Duration,
    /// bound for each supervisor command
    pub command_timeout: Duration,
}

impl Default for SupervisorTiming {
    fn default() -> Self {
        Self {
            kill_grace: Duration::from_secs(1),
            launch_grace: Duration::from_millis(500),
            command_timeout: crate::command::DEFAULT_TIMEOUT,
        }
    }
}

pub struct ServiceSupervisor<R> {
    runner: Arc<R>,
    privilege: Privilege,
    service: SupervisedService,
    timing: SupervisorTiming,
}

impl<R> ServiceSupervisor<R>
where
    R: CommandRunner + Send + Sync,
{
    pub fn new(
        runner: Arc<R>,
        privilege: Privilege,
        service: SupervisedService,
        timing: SupervisorTiming,
    ) -> Self {
        Self {
            runner,
            privilege,
            service,
            timing,
        }
    }

    /// Make sure exactly one freshly launched instance is running.
    ///
    /// Tries `max_retries` kill/launch/verify rounds, then one restart through
    /// the service manager. Returns whether the daemon was seen running.
    pub async fn ensure_running(&self, config_path: &Path, max_retries: u32) -> bool {
        let name = &self.service.process_name;

        for attempt in 1..=max_retries {
            info!("start {name} (attempt {attempt}/{max_retries})");

            self.stop().await;
            pause(self.timing.kill_grace).await;

            let launched = self.run(self.launch_command(config_path)).await;
            if !launched.success {
                warn!(
                    "failed to launch {name} (attempt {attempt}/{max_retries}): {}",
                    launched.error_text()
                );
                continue;
            }

            pause(self.timing.launch_grace).await;

            if self.is_running().await {
                info!("{name} is running");
                return true;
            }

            warn!("{name} not running after attempt {attempt}/{max_retries}");
        }

        warn!("{name} did not come up, restarting via service manager");

        let restarted = self.run(self.fallback_command()).await;
        if !restarted.success {
            warn!("service manager restart of {name} failed: {}", restarted.error_text());
        }

        pause(self.timing.launch_grace).await;

        let running = self.is_running().await;
        if running {
            info!("{name} is running after service manager restart");
        } else {
            error!("{}: {name}", FailureKind::ServiceUnverified);
        }
        running
    }

    /// Force-kill any running instance; absence is not an error
    pub async fn stop(&self) {
        self.run(self.kill_command()).await;
    }

    pub async fn is_running(&self) -> bool {
        self.run(self.lookup_command()).await.success
    }

    pub fn kill_command(&self) -> CommandLine {
        self.privilege
            .command("pkill")
            .args(["-9", "-x", self.service.process_name.as_str()])
    }

    pub fn launch_command(&self, config_path: &Path) -> CommandLine {
        self.privilege
            .command(&self.service.program)
            .arg(self.service.config_flag.as_str())
            .arg(config_path.to_string_lossy())
    }

    pub fn lookup_command(&self) -> CommandLine {
        CommandLine::new("pgrep").args(["-x", self.service.process_name.as_str()])
    }

    pub fn fallback_command(&self) -> CommandLine {
        self.privilege
            .command("systemctl")
            .args(["restart", self.service.unit.as_str()])
    }

    async fn run(&self, command: CommandLine) -> CommandResult {
        self.runner
            .run(&command, self.timing.command_timeout)
            .await
    }
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        sleep(duration).await;
    }
}
