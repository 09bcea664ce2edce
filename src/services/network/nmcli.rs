//! NetworkManager (`nmcli`) commands and the profile manager backend.

use super::backend::{ModeBackend, ServiceAction, Step, StepPolicy};
use crate::{
    command::{CommandLine, Privilege},
    config::ApConfig,
    services::credentials::Credentials,
};
use log::error;

/// Builds `nmcli` invocations scoped to one interface
#[derive(Clone, Debug)]
pub struct Nmcli {
    privilege: Privilege,
    interface: String,
}

impl Nmcli {
    pub fn new(privilege: Privilege, interface: &str) -> Self {
        Self {
            privilege,
            interface: interface.to_string(),
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn privilege(&self) -> Privilege {
        self.privilege
    }

    fn nmcli(&self) -> CommandLine {
        self.privilege.command("nmcli")
    }

    pub fn create_hotspot(&self, profile: &str, credentials: &Credentials) -> CommandLine {
        self.nmcli()
            .args(["device", "wifi", "hotspot", "ifname", self.interface.as_str()])
            .args(["con-name", profile, "ssid", credentials.ssid(), "password"])
            .secret_arg(credentials.password())
    }

    pub fn modify(&self, profile: &str, setting: &str, value: &str) -> CommandLine {
        self.nmcli()
            .args(["connection", "modify", profile, setting, value])
    }

    pub fn connection_up(&self, profile: &str) -> CommandLine {
        self.nmcli().args(["connection", "up", profile])
    }

    pub fn connection_down(&self, profile: &str) -> CommandLine {
        self.nmcli().args(["connection", "down", profile])
    }

    pub fn connection_delete(&self, profile: &str) -> CommandLine {
        self.nmcli().args(["connection", "delete", profile])
    }

    pub fn show_connection(&self, profile: &str) -> CommandLine {
        self.nmcli().args(["connection", "show", profile])
    }

    pub fn show_active(&self) -> CommandLine {
        self.nmcli().args(["connection", "show", "--active"])
    }

    pub fn set_managed(&self, managed: bool) -> CommandLine {
        let state = if managed { "yes" } else { "no" };
        self.nmcli()
            .args(["device", "set", self.interface.as_str(), "managed", state])
    }

    pub fn connect_device(&self) -> CommandLine {
        self.nmcli()
            .args(["device", "connect", self.interface.as_str()])
    }

    pub fn disconnect_device(&self) -> CommandLine {
        self.nmcli()
            .args(["device", "disconnect", self.interface.as_str()])
    }

    /// Join a network; open networks get no password argument
    pub fn join(&self, credentials: &Credentials) -> CommandLine {
        let command = self
            .nmcli()
            .args(["device", "wifi", "connect", credentials.ssid()]);

        let command = if credentials.is_open() {
            command
        } else {
            command.arg("password").secret_arg(credentials.password())
        };

        command.args(["ifname", self.interface.as_str()])
    }

    pub fn scan(&self) -> CommandLine {
        self.nmcli()
            .args(["device", "wifi", "list", "ifname", self.interface.as_str()])
    }
}

/// Access point managed as a NetworkManager connection profile
#[derive(Clone, Debug)]
pub struct ProfileManagerBackend {
    nmcli: Nmcli,
    ap: ApConfig,
}

impl ProfileManagerBackend {
    pub fn new(nmcli: Nmcli, ap: &ApConfig) -> Self {
        Self {
            nmcli,
            ap: ap.clone(),
        }
    }
}

impl ModeBackend for ProfileManagerBackend {
    fn nmcli(&self) -> &Nmcli {
        &self.nmcli
    }

    fn start_hotspot_plan(&self, credentials: &Credentials) -> Vec<Step> {
        use StepPolicy::*;

        let profile = credentials.ssid();
        let nmcli = &self.nmcli;
        let dhcp_range = format!("{},{}", self.ap.dhcp_range_start, self.ap.dhcp_range_end);

        vec![
            Step::run("set managed", Ignored, nmcli.set_managed(true)),
            Step::run("delete stale profile", Ignored, nmcli.connection_delete(profile)),
            Step::run(
                "create hotspot",
                Fatal,
                nmcli.create_hotspot(profile, credentials),
            ),
            Step::run(
                "set address",
                NonFatal,
                nmcli.modify(profile, "ipv4.addresses", &self.ap.cidr()),
            ),
            Step::run(
                "set address method",
                NonFatal,
                nmcli.modify(profile, "ipv4.method", "manual"),
            ),
            Step::run(
                "set dhcp range",
                NonFatal,
                nmcli.modify(profile, "ipv4.dhcp-range", &dhcp_range),
            ),
            Step::run("connection up", Fatal, nmcli.connection_up(profile)),
        ]
    }

    fn stop_hotspot_plan(&self, active_profile: Option<&str>) -> Vec<Step> {
        match active_profile {
            Some(profile) => vec![
                Step::run(
                    "connection down",
                    StepPolicy::Ignored,
                    self.nmcli.connection_down(profile),
                ),
                Step::run(
                    "delete profile",
                    StepPolicy::Fatal,
                    self.nmcli.connection_delete(profile),
                ),
            ],
            None => vec![Step::run(
                "connection down",
                StepPolicy::Ignored,
                self.nmcli.connection_down(&self.ap.ssid),
            )],
        }
    }

    async fn perform(&self, action: &ServiceAction) -> bool {
        error!("profile manager backend cannot perform {action:?}");
        false
    }
}
