//! Gateway address resolution from the host's IPv4 interfaces.

use crate::command::{CommandLine, CommandRunner};
use anyhow::{Context, Result};
use log::{debug, warn};
#[cfg(feature = "mock")]
use mockall::automock;
use serde::Deserialize;
use std::{net::Ipv4Addr, sync::Arc, time::Duration};
use trait_variant::make;

/// Subnet NetworkManager hands out for shared (hotspot) connections
pub const SHARED_CONNECTION_SUBNET: &str = "10.42.0.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub name: String,
    pub address: Ipv4Addr,
    pub up: bool,
    pub loopback: bool,
}

impl InterfaceAddress {
    pub fn new(name: &str, address: Ipv4Addr) -> Self {
        Self {
            name: name.to_string(),
            address,
            up: true,
            loopback: address.is_loopback(),
        }
    }

    fn is_usable(&self) -> bool {
        self.up && !self.loopback && !self.address.is_loopback()
    }

    fn looks_wireless(&self) -> bool {
        let name = self.name.to_ascii_lowercase();
        name.starts_with("wl")
            || name.starts_with("ap")
            || name.starts_with("uap")
            || name.contains("wifi")
            || name.contains("wi-fi")
            || name.contains("hotspot")
    }
}

/// Pick the address clients of the access point should talk to.
///
/// Order of preference: a wireless-looking interface inside one of
/// `allowed_prefixes`, then any up non-loopback interface, then `fallback`.
pub fn resolve_gateway_ip(
    interfaces: &[InterfaceAddress],
    allowed_prefixes: &[String],
    fallback: &str,
) -> String {
    let in_allowed_subnet = |iface: &InterfaceAddress| {
        let address = iface.address.to_string();
        allowed_prefixes
            .iter()
            .any(|prefix| address.starts_with(prefix.as_str()))
    };

    interfaces
        .iter()
        .filter(|iface| iface.is_usable())
        .find(|iface| iface.looks_wireless() && in_allowed_subnet(iface))
        .or_else(|| interfaces.iter().find(|iface| iface.is_usable()))
        .map(|iface| iface.address.to_string())
        .unwrap_or_else(|| fallback.to_string())
}

#[make(Send)]
#[cfg_attr(feature = "mock", automock)]
pub trait InterfaceSource {
    async fn interfaces(&self) -> Vec<InterfaceAddress>;
}

/// Enumerates interfaces via `ip -json -4 addr show`
pub struct IpAddrSource<R> {
    runner: Arc<R>,
    limit: Duration,
}

impl<R> IpAddrSource<R> {
    pub fn new(runner: Arc<R>, limit: Duration) -> Self {
        Self { runner, limit }
    }

    fn command() -> CommandLine {
        CommandLine::new("ip").args(["-json", "-4", "addr", "show"])
    }
}

impl<R> InterfaceSource for IpAddrSource<R>
where
    R: CommandRunner + Send + Sync,
{
    async fn interfaces(&self) -> Vec<InterfaceAddress> {
        let result = self.runner.run(&Self::command(), self.limit).await;
        if !result.success {
            return Vec::new();
        }

        match parse_ip_json(&result.stdout) {
            Ok(interfaces) => {
                debug!("interfaces: {interfaces:?}");
                interfaces
            }
            Err(e) => {
                warn!("failed to parse interface list: {e:#}");
                Vec::new()
            }
        }
    }
}

#[derive(Deserialize)]
struct IpLink {
    ifname: String,
    #[serde(default)]
    flags: Vec<String>,
    #[serde(default)]
    addr_info: Vec<IpAddrInfo>,
}

#[derive(Deserialize)]
struct IpAddrInfo {
    #[serde(default)]
    family: Option<String>,
    #[serde(default)]
    local: Option<String>,
}

/// Parse the JSON printed by `ip -json -4 addr show`
pub fn parse_ip_json(json: &str) -> Result<Vec<InterfaceAddress>> {
    let links: Vec<IpLink> =
        serde_json::from_str(json).context("failed to deserialize ip address list")?;

    Ok(links
        .into_iter()
        .flat_map(|link| {
            let up = link.flags.iter().any(|flag| flag == "UP");
            let loopback = link.flags.iter().any(|flag| flag == "LOOPBACK");

            link.addr_info
                .into_iter()
                .filter(|info| info.family.as_deref().is_none_or(|family| family == "inet"))
                .filter_map(|info| info.local?.parse::<Ipv4Addr>().ok())
                .map(|address| InterfaceAddress {
                    name: link.ifname.clone(),
                    address,
                    up,
                    loopback,
                })
                .collect::<Vec<_>>()
        })
        .collect())
}
