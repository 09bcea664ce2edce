//! Moves the wireless interface between access point and client mode.
//!
//! Every mutating operation holds the state lock for its whole command
//! sequence, so two callers never interleave commands on the interface.
//! Nothing here returns an error: failures are logged and reported as
//! `false`, an empty string or the caller's fallback.

pub mod backend;
pub mod hostapd;
pub mod nmcli;

pub use backend::{Action, Backend, ModeBackend, ServiceAction, Step, StepPolicy};
pub use hostapd::DirectControlBackend;
pub use nmcli::{Nmcli, ProfileManagerBackend};

use crate::{
    command::{CommandLine, CommandResult, CommandRunner},
    config::ApConfig,
    services::{
        credentials::Credentials,
        gateway::{self, InterfaceSource, SHARED_CONNECTION_SUBNET},
    },
};
use log::{debug, error, info, warn};
use std::{fmt, sync::Arc, time::Duration};
use tokio::sync::Mutex;

/// What the orchestrator believes the interface is doing
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ModeState {
    #[default]
    Idle,
    HotspotActive {
        profile: String,
    },
    ClientConnected {
        ssid: String,
    },
}

impl ModeState {
    pub fn name(&self) -> &'static str {
        match self {
            ModeState::Idle => "idle",
            ModeState::HotspotActive { .. } => "hotspot",
            ModeState::ClientConnected { .. } => "client",
        }
    }
}

impl fmt::Display for ModeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeState::Idle => write!(f, "idle"),
            ModeState::HotspotActive { profile } => write!(f, "hotspot {profile}"),
            ModeState::ClientConnected { ssid } => write!(f, "client of {ssid}"),
        }
    }
}

pub struct NetworkModeOrchestrator<R, B, I> {
    runner: Arc<R>,
    backend: B,
    interfaces: I,
    ap: ApConfig,
    command_timeout: Duration,
    state: Mutex<ModeState>,
}

impl<R, B, I> NetworkModeOrchestrator<R, B, I>
where
    R: CommandRunner + Send + Sync,
    B: ModeBackend + Send + Sync,
    I: InterfaceSource + Send + Sync,
{
    pub fn new(
        ap: &ApConfig,
        runner: Arc<R>,
        backend: B,
        interfaces: I,
        command_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            backend,
            interfaces,
            ap: ap.clone(),
            command_timeout,
            state: Mutex::new(ModeState::Idle),
        }
    }

    /// Snapshot of the tracked mode
    pub async fn mode(&self) -> ModeState {
        self.state.lock().await.clone()
    }

    /// Tear down whatever runs on the interface and bring up an access point.
    ///
    /// The connection profile is named after `ssid`.
    pub async fn start_hotspot(&self, ssid: &str, password: &str) -> bool {
        let credentials = match Credentials::for_hotspot(ssid, password) {
            Ok(credentials) => credentials,
            Err(e) => {
                error!("start hotspot rejected: {e:#}");
                return false;
            }
        };

        if !self.supported() {
            return false;
        }

        let mut state = self.state.lock().await;

        info!("start hotspot {ssid} (was {})", *state);

        if matches!(*state, ModeState::ClientConnected { .. }) {
            self.run_command(&self.backend.nmcli().disconnect_device())
                .await;
            *state = ModeState::Idle;
        }

        // leftovers of a previous hotspot must not block the new one
        if !self.stop_hotspot_locked(&mut state).await {
            debug!("teardown before start hotspot failed, continuing");
        }

        let plan = self.backend.start_hotspot_plan(&credentials);
        if !self.execute(&plan).await {
            error!("failed to start hotspot {ssid}");
            *state = ModeState::Idle;
            return false;
        }

        info!("hotspot {ssid} is up");
        *state = ModeState::HotspotActive {
            profile: credentials.ssid().to_string(),
        };
        true
    }

    /// Tear down the access point; succeeds trivially when none is running
    pub async fn stop_hotspot(&self) -> bool {
        if !self.supported() {
            return false;
        }

        let mut state = self.state.lock().await;
        self.stop_hotspot_locked(&mut state).await
    }

    /// Join `ssid`; an empty password joins an open network
    pub async fn connect_client(&self, ssid: &str, password: &str) -> bool {
        let Some(credentials) = Self::client_credentials(ssid, password) else {
            return false;
        };

        if !self.supported() {
            return false;
        }

        let mut state = self.state.lock().await;

        if matches!(*state, ModeState::HotspotActive { .. }) {
            self.stop_hotspot_locked(&mut state).await;
        }

        self.join_locked(&mut state, &credentials).await
    }

    pub async fn disconnect_client(&self) -> bool {
        if !self.supported() {
            return false;
        }

        let mut state = self.state.lock().await;
        let disconnected = self
            .run_command(&self.backend.nmcli().disconnect_device())
            .await
            .success;

        // a disconnect also takes down an access point running on the interface
        if disconnected {
            *state = ModeState::Idle;
        }
        disconnected
    }

    /// Hand the interface to NetworkManager (`true`) or take it away
    pub async fn set_managed(&self, managed: bool) -> bool {
        if !self.supported() {
            return false;
        }

        let _state = self.state.lock().await;
        self.run_command(&self.backend.nmcli().set_managed(managed))
            .await
            .success
    }

    /// Let NetworkManager auto-connect the interface
    pub async fn connect_device(&self) -> bool {
        if !self.supported() {
            return false;
        }

        let _state = self.state.lock().await;
        self.run_command(&self.backend.nmcli().connect_device())
            .await
            .success
    }

    /// Active connections as printed by `nmcli`; empty on failure
    pub async fn query_status(&self) -> String {
        self.output_of(&self.backend.nmcli().show_active()).await
    }

    /// Visible networks as printed by `nmcli`; empty on failure
    pub async fn scan_networks(&self) -> String {
        self.output_of(&self.backend.nmcli().scan()).await
    }

    /// Whether profile `name` exists and is among the active connections
    pub async fn is_hotspot_running(&self, name: &str) -> bool {
        if !self.supported() {
            return false;
        }

        let nmcli = self.backend.nmcli();
        if !self.run_command(&nmcli.show_connection(name)).await.success {
            return false;
        }

        let active = self.run_command(&nmcli.show_active()).await;
        active.success
            && active
                .stdout
                .lines()
                .any(|line| line.split_whitespace().next() == Some(name))
    }

    /// Save workflow: leave access point mode and join the submitted network.
    ///
    /// Runs as one critical section; only the final join decides the result.
    pub async fn apply_client_credentials(&self, ssid: &str, password: &str) -> bool {
        let Some(credentials) = Self::client_credentials(ssid, password) else {
            return false;
        };

        if !self.supported() {
            return false;
        }

        let mut state = self.state.lock().await;

        info!("apply client credentials for {ssid}");

        if !self.stop_hotspot_locked(&mut state).await {
            warn!("failed to stop hotspot, trying to connect anyway");
        }

        let nmcli = self.backend.nmcli();
        if !self.run_command(&nmcli.set_managed(true)).await.success {
            warn!("failed to set {} managed", nmcli.interface());
        }
        if !self.run_command(&nmcli.connect_device()).await.success {
            debug!("device connect failed, joining explicitly");
        }

        self.join_locked(&mut state, &credentials).await
    }

    /// Address clients should use to reach this device
    pub async fn resolve_gateway_ip(&self, fallback: &str) -> String {
        if !self.supported() {
            return fallback.to_string();
        }

        let interfaces = self.interfaces.interfaces().await;
        let allowed = [
            self.ap.subnet_prefix(),
            SHARED_CONNECTION_SUBNET.to_string(),
        ];

        gateway::resolve_gateway_ip(&interfaces, &allowed, fallback)
    }

    /// Single ping to `host`
    pub async fn is_network_available(&self, host: &str) -> bool {
        if !self.supported() {
            return false;
        }

        let ping = CommandLine::new("ping").args(["-c", "1", "-W", "1", host]);
        let result = self.runner.run(&ping, self.command_timeout).await;

        info!("network available: {}", result.success);
        result.success
    }

    async fn stop_hotspot_locked(&self, state: &mut ModeState) -> bool {
        let active = match &*state {
            ModeState::HotspotActive { profile } => Some(profile.clone()),
            _ => None,
        };

        let plan = self.backend.stop_hotspot_plan(active.as_deref());
        let stopped = self.execute(&plan).await;

        match active {
            Some(profile) if stopped => {
                info!("hotspot {profile} stopped");
                *state = ModeState::Idle;
            }
            Some(profile) => error!("failed to stop hotspot {profile}"),
            None => debug!("no hotspot was active"),
        }

        stopped
    }

    async fn join_locked(&self, state: &mut ModeState, credentials: &Credentials) -> bool {
        let ssid = credentials.ssid();
        let result = self.run_command(&self.backend.nmcli().join(credentials)).await;
        let joined = result.success;

        if joined {
            info!("connected to {ssid}");
            *state = ModeState::ClientConnected {
                ssid: ssid.to_string(),
            };
        } else {
            error!("failed to connect to {ssid}: {}", result.error_text());
            *state = ModeState::Idle;
        }
        joined
    }

    /// Run a plan in order; stops at the first failed fatal step
    async fn execute(&self, plan: &[Step]) -> bool {
        for step in plan {
            let failure = match &step.action {
                Action::Run(command) => {
                    let result = self.run_command(command).await;
                    (!result.success).then(|| result.error_text())
                }
                Action::Service(action) => (!self.backend.perform(action).await)
                    .then(|| "service action failed".to_string()),
            };

            let Some(reason) = failure else {
                continue;
            };

            match step.policy {
                StepPolicy::Fatal => {
                    error!("{} failed ({reason}), aborting", step.label);
                    return false;
                }
                StepPolicy::NonFatal => warn!("{} failed ({reason}), continuing", step.label),
                StepPolicy::Ignored => debug!("{} failed ({reason}), ignored", step.label),
            }
        }

        true
    }

    async fn output_of(&self, command: &CommandLine) -> String {
        if !self.supported() {
            return String::new();
        }

        let result = self.run_command(command).await;
        if result.success {
            result.stdout
        } else {
            String::new()
        }
    }

    async fn run_command(&self, command: &CommandLine) -> CommandResult {
        self.runner.run(command, self.command_timeout).await
    }

    fn supported(&self) -> bool {
        let supported = self.runner.is_supported();
        if !supported {
            warn!("network configuration is not supported on this platform");
        }
        supported
    }

    fn client_credentials(ssid: &str, password: &str) -> Option<Credentials> {
        Credentials::new(ssid, password)
            .inspect_err(|e| error!("client credentials rejected: {e:#}"))
            .ok()
    }
}
