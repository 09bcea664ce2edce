//! Access point driven directly through `hostapd` and a supervised `dnsmasq`.

use super::{
    backend::{ModeBackend, ServiceAction, Step, StepPolicy},
    nmcli::Nmcli,
};
use crate::{
    command::{CommandLine, CommandRunner},
    config::{ApConfig, DaemonPaths},
    services::{
        credentials::Credentials,
        daemon_config::DaemonConfigRenderer,
        supervisor::{DEFAULT_MAX_RETRIES, ServiceSupervisor},
    },
};
use log::error;

pub struct DirectControlBackend<R> {
    nmcli: Nmcli,
    ap: ApConfig,
    paths: DaemonPaths,
    renderer: DaemonConfigRenderer,
    supervisor: ServiceSupervisor<R>,
}

impl<R> DirectControlBackend<R>
where
    R: CommandRunner + Send + Sync,
{
    pub fn new(
        nmcli: Nmcli,
        ap: &ApConfig,
        paths: DaemonPaths,
        supervisor: ServiceSupervisor<R>,
    ) -> Self {
        Self {
            nmcli,
            ap: ap.clone(),
            paths,
            renderer: DaemonConfigRenderer,
            supervisor,
        }
    }

    fn launch_hostapd(&self) -> CommandLine {
        self.nmcli
            .privilege()
            .command("hostapd")
            .arg("-B")
            .arg(self.paths.hostapd_config.to_string_lossy())
    }

    fn kill_hostapd(&self) -> CommandLine {
        self.nmcli
            .privilege()
            .command("pkill")
            .args(["-9", "-x", "hostapd"])
    }

    fn add_address(&self) -> CommandLine {
        let cidr = self.ap.cidr();
        self.nmcli
            .privilege()
            .command("ip")
            .args(["addr", "add", cidr.as_str(), "dev", self.nmcli.interface()])
    }

    fn flush_addresses(&self) -> CommandLine {
        self.nmcli
            .privilege()
            .command("ip")
            .args(["addr", "flush", "dev", self.nmcli.interface()])
    }
}

impl<R> ModeBackend for DirectControlBackend<R>
where
    R: CommandRunner + Send + Sync,
{
    fn nmcli(&self) -> &Nmcli {
        &self.nmcli
    }

    fn start_hotspot_plan(&self, credentials: &Credentials) -> Vec<Step> {
        use StepPolicy::*;

        vec![
            Step::run("release interface", Ignored, self.nmcli.disconnect_device()),
            Step::run("unmanage interface", Ignored, self.nmcli.set_managed(false)),
            Step::service(
                "render daemon config",
                Fatal,
                ServiceAction::RenderDaemonConfig(credentials.clone()),
            ),
            Step::run("start hostapd", Fatal, self.launch_hostapd()),
            Step::run("assign address", NonFatal, self.add_address()),
            Step::service("start dhcp", Fatal, ServiceAction::EnsureDhcp),
        ]
    }

    fn stop_hotspot_plan(&self, active_profile: Option<&str>) -> Vec<Step> {
        use StepPolicy::*;

        // handing the interface back is the only step that can fail a real teardown
        let managed = if active_profile.is_some() {
            Fatal
        } else {
            Ignored
        };

        vec![
            Step::run("stop dhcp", Ignored, self.supervisor.kill_command()),
            Step::run("stop hostapd", Ignored, self.kill_hostapd()),
            Step::run("flush addresses", Ignored, self.flush_addresses()),
            Step::run("manage interface", managed, self.nmcli.set_managed(true)),
        ]
    }

    async fn perform(&self, action: &ServiceAction) -> bool {
        match action {
            ServiceAction::RenderDaemonConfig(credentials) => {
                match self.renderer.render(
                    &self.ap,
                    credentials,
                    &self.paths.hostapd_config,
                    &self.paths.dnsmasq_config,
                ) {
                    Ok(()) => true,
                    Err(e) => {
                        error!("failed to render daemon config: {e:#}");
                        false
                    }
                }
            }
            ServiceAction::EnsureDhcp => {
                self.supervisor
                    .ensure_running(&self.paths.dnsmasq_config, DEFAULT_MAX_RETRIES)
                    .await
            }
        }
    }
}
