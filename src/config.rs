use crate::{
    command::{DEFAULT_TIMEOUT, Privilege},
    services::credentials::Credentials,
};
use anyhow::{Context, Result, anyhow, bail, ensure};
use std::{env, fmt::Display, net::Ipv4Addr, path::PathBuf, str::FromStr, time::Duration};

/// Prefix length of the access point subnet
pub const AP_PREFIX_LEN: u8 = 24;

type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Application configuration loaded and validated at startup
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Access point parameters
    pub ap: ApConfig,

    /// Which command backend drives the interface
    pub backend: BackendKind,

    /// HTTP api configuration
    pub ui: UiConfig,

    /// External command execution settings
    pub commands: CommandConfig,

    /// Timing of the provisioning workflow
    pub provisioning: ProvisioningConfig,

    /// Rendered daemon configuration files (direct control backend)
    pub daemons: DaemonPaths,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApConfig {
    pub ssid: String,
    pub password: String,
    pub interface: String,
    pub channel: u8,
    pub address: Ipv4Addr,
    pub dhcp_range_start: Ipv4Addr,
    pub dhcp_range_end: Ipv4Addr,
    pub country: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// NetworkManager profiles via `nmcli`
    ProfileManager,
    /// `hostapd` plus a supervised `dnsmasq`
    DirectControl,
}

#[derive(Clone, Debug)]
pub struct UiConfig {
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct CommandConfig {
    pub privilege: Privilege,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct ProvisioningConfig {
    pub startup_delay: Duration,
    pub hotspot_settle: Duration,
    pub reboot_delay: Duration,
    pub probe_host: String,
}

#[derive(Clone, Debug)]
pub struct DaemonPaths {
    pub hostapd_config: PathBuf,
    pub dnsmasq_config: PathBuf,
}

impl AppConfig {
    /// Load and validate the configuration from environment variables
    pub fn load() -> Result<Self> {
        Self::load_from(&|key| env::var(key).ok())
    }

    /// Load and validate the configuration from an arbitrary key lookup
    pub fn load_from(lookup: Lookup) -> Result<Self> {
        let ap = ApConfig::load(lookup).context("failed to load access point config")?;
        let backend = parse_or(lookup, "NETWORK_BACKEND", BackendKind::ProfileManager)?;
        let ui = UiConfig::load(lookup)?;
        let commands = CommandConfig::load(lookup)?;
        let provisioning = ProvisioningConfig::load(lookup)?;
        let daemons = DaemonPaths::load(lookup);

        Ok(Self {
            ap,
            backend,
            ui,
            commands,
            provisioning,
            daemons,
        })
    }
}

impl Default for ApConfig {
    fn default() -> Self {
        Self {
            ssid: "RaspberryPi5-WiFiSetup".to_string(),
            password: "raspberry".to_string(),
            interface: "wlan0".to_string(),
            channel: 7,
            address: Ipv4Addr::new(192, 168, 4, 1),
            dhcp_range_start: Ipv4Addr::new(192, 168, 4, 50),
            dhcp_range_end: Ipv4Addr::new(192, 168, 4, 150),
            country: "CN".to_string(),
        }
    }
}

impl ApConfig {
    fn load(lookup: Lookup) -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            ssid: var_or(lookup, "AP_SSID", &defaults.ssid),
            password: var_or(lookup, "AP_PASSWORD", &defaults.password),
            interface: var_or(lookup, "AP_INTERFACE", &defaults.interface),
            channel: parse_or(lookup, "AP_CHANNEL", defaults.channel)?,
            address: parse_or(lookup, "AP_ADDRESS", defaults.address)?,
            dhcp_range_start: parse_or(lookup, "AP_DHCP_START", defaults.dhcp_range_start)?,
            dhcp_range_end: parse_or(lookup, "AP_DHCP_END", defaults.dhcp_range_end)?,
            country: var_or(lookup, "COUNTRY", &defaults.country),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        Credentials::for_hotspot(&self.ssid, &self.password)
            .context("invalid access point credentials")?;
        ensure!(!self.interface.is_empty(), "interface name is empty");
        ensure!(
            (1..=14).contains(&self.channel),
            "channel {} is outside 1..=14",
            self.channel
        );

        let start = u32::from(self.dhcp_range_start);
        let end = u32::from(self.dhcp_range_end);
        ensure!(
            start <= end,
            "dhcp range start {} is after end {}",
            self.dhcp_range_start,
            self.dhcp_range_end
        );

        let prefix = self.subnet_prefix();
        for addr in [self.dhcp_range_start, self.dhcp_range_end] {
            ensure!(
                addr.to_string().starts_with(&prefix),
                "dhcp address {addr} is outside {prefix}0/{AP_PREFIX_LEN}"
            );
        }

        let address = u32::from(self.address);
        ensure!(
            !(start..=end).contains(&address),
            "access point address {} lies inside the dhcp range",
            self.address
        );

        Ok(())
    }

    /// Dotted prefix of the access point /24, e.g. `192.168.4.`
    pub fn subnet_prefix(&self) -> String {
        let [a, b, c, _] = self.address.octets();
        format!("{a}.{b}.{c}.")
    }

    /// Access point address in CIDR notation
    pub fn cidr(&self) -> String {
        format!("{}/{AP_PREFIX_LEN}", self.address)
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nmcli" | "networkmanager" | "profile-manager" => Ok(Self::ProfileManager),
            "hostapd" | "direct" | "direct-control" => Ok(Self::DirectControl),
            other => bail!("unknown network backend: {other}"),
        }
    }
}

impl UiConfig {
    fn load(lookup: Lookup) -> Result<Self> {
        let port = parse_or(lookup, "UI_PORT", 5241u16)?;

        Ok(Self { port })
    }
}

impl CommandConfig {
    fn load(lookup: Lookup) -> Result<Self> {
        let privilege = if parse_bool_or(lookup, "USE_SUDO", true)? {
            Privilege::Sudo
        } else {
            Privilege::User
        };
        let timeout = seconds_or(lookup, "COMMAND_TIMEOUT_SECS", DEFAULT_TIMEOUT.as_secs())?;
        ensure!(!timeout.is_zero(), "COMMAND_TIMEOUT_SECS must be positive");

        Ok(Self { privilege, timeout })
    }
}

impl ProvisioningConfig {
    fn load(lookup: Lookup) -> Result<Self> {
        Ok(Self {
            startup_delay: seconds_or(lookup, "STARTUP_DELAY_SECS", 10)?,
            hotspot_settle: seconds_or(lookup, "HOTSPOT_SETTLE_SECS", 2)?,
            reboot_delay: seconds_or(lookup, "REBOOT_DELAY_SECS", 50)?,
            probe_host: var_or(lookup, "PROBE_HOST", "8.8.8.8"),
        })
    }
}

impl DaemonPaths {
    fn load(lookup: Lookup) -> Self {
        Self {
            hostapd_config: var_or(
                lookup,
                "HOSTAPD_CONFIG_PATH",
                "/run/wifi-provisioner/hostapd.conf",
            )
            .into(),
            dnsmasq_config: var_or(
                lookup,
                "DNSMASQ_CONFIG_PATH",
                "/run/wifi-provisioner/dnsmasq.conf",
            )
            .into(),
        }
    }
}

fn var_or(lookup: Lookup, key: &str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| default.to_string())
}

fn parse_or<T>(lookup: Lookup, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("failed to parse {key}: {e}")),
        None => Ok(default),
    }
}

fn parse_bool_or(lookup: Lookup, key: &str, default: bool) -> Result<bool> {
    let Some(value) = lookup(key) else {
        return Ok(default);
    };

    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("failed to parse {key}: invalid boolean {other:?}"),
    }
}

fn seconds_or(lookup: Lookup, key: &str, default: u64) -> Result<Duration> {
    parse_or(lookup, key, default).map(Duration::from_secs)
}
