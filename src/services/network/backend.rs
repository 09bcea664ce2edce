//! Command backends as step plans.
//!
//! A backend only decides *which* steps make up an operation and how their
//! failures are treated. Running the plan and tracking the mode is up to the
//! orchestrator.

use super::{hostapd::DirectControlBackend, nmcli::Nmcli, nmcli::ProfileManagerBackend};
use crate::{
    command::{CommandLine, CommandRunner},
    config::{AppConfig, BackendKind},
    services::{
        credentials::Credentials,
        supervisor::{ServiceSupervisor, SupervisedService, SupervisorTiming},
    },
};
use std::sync::Arc;
use trait_variant::make;

/// How the failure of a single step affects the enclosing operation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepPolicy {
    /// abort the operation and report failure
    Fatal,
    /// log a warning and carry on
    NonFatal,
    /// expected to fail in some states, carry on quietly
    Ignored,
}

/// Work that is not a single external command
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServiceAction {
    /// write access point and DHCP daemon configuration
    RenderDaemonConfig(Credentials),
    /// start the DHCP daemon and verify it stays up
    EnsureDhcp,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Run(CommandLine),
    Service(ServiceAction),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Step {
    pub label: &'static str,
    pub policy: StepPolicy,
    pub action: Action,
}

impl Step {
    pub fn run(label: &'static str, policy: StepPolicy, command: CommandLine) -> Self {
        Self {
            label,
            policy,
            action: Action::Run(command),
        }
    }

    pub fn service(label: &'static str, policy: StepPolicy, action: ServiceAction) -> Self {
        Self {
            label,
            policy,
            action: Action::Service(action),
        }
    }

    /// The command this step runs, if it is a plain command
    pub fn command(&self) -> Option<&CommandLine> {
        match &self.action {
            Action::Run(command) => Some(command),
            Action::Service(_) => None,
        }
    }
}

#[make(Send)]
pub trait ModeBackend {
    /// Client-mode and device commands, shared by all backends
    fn nmcli(&self) -> &Nmcli;

    /// Steps that bring the access point up, teardown excluded
    fn start_hotspot_plan(&self, credentials: &Credentials) -> Vec<Step>;

    /// Steps that tear the access point down.
    ///
    /// `active_profile` is the hotspot known to be running, if any. Without
    /// one every step is best effort and the teardown cannot fail.
    fn stop_hotspot_plan(&self, active_profile: Option<&str>) -> Vec<Step>;

    async fn perform(&self, action: &ServiceAction) -> bool;
}

/// Backend chosen at construction time
pub enum Backend<R> {
    ProfileManager(ProfileManagerBackend),
    DirectControl(DirectControlBackend<R>),
}

impl<R> Backend<R>
where
    R: CommandRunner + Send + Sync,
{
    pub fn from_config(config: &AppConfig, runner: Arc<R>) -> Self {
        let privilege = config.commands.privilege;
        let nmcli = Nmcli::new(privilege, &config.ap.interface);

        match config.backend {
            BackendKind::ProfileManager => {
                Backend::ProfileManager(ProfileManagerBackend::new(nmcli, &config.ap))
            }
            BackendKind::DirectControl => {
                let supervisor = ServiceSupervisor::new(
                    runner,
                    privilege,
                    SupervisedService::dnsmasq(),
                    SupervisorTiming {
                        command_timeout: config.commands.timeout,
                        ..Default::default()
                    },
                );
                Backend::DirectControl(DirectControlBackend::new(
                    nmcli,
                    &config.ap,
                    config.daemons.clone(),
                    supervisor,
                ))
            }
        }
    }
}

impl<R> ModeBackend for Backend<R>
where
    R: CommandRunner + Send + Sync,
{
    fn nmcli(&self) -> &Nmcli {
        match self {
            Backend::ProfileManager(backend) => backend.nmcli(),
            Backend::DirectControl(backend) => backend.nmcli(),
        }
    }

    fn start_hotspot_plan(&self, credentials: &Credentials) -> Vec<Step> {
        match self {
            Backend::ProfileManager(backend) => backend.start_hotspot_plan(credentials),
            Backend::DirectControl(backend) => backend.start_hotspot_plan(credentials),
        }
    }

    fn stop_hotspot_plan(&self, active_profile: Option<&str>) -> Vec<Step> {
        match self {
            Backend::ProfileManager(backend) => backend.stop_hotspot_plan(active_profile),
            Backend::DirectControl(backend) => backend.stop_hotspot_plan(active_profile),
        }
    }

    async fn perform(&self, action: &ServiceAction) -> bool {
        match self {
            Backend::ProfileManager(backend) => backend.perform(action).await,
            Backend::DirectControl(backend) => backend.perform(action).await,
        }
    }
}
