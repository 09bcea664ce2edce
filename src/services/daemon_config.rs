//! Configuration files for `hostapd` and `dnsmasq`.

use crate::{config::ApConfig, services::credentials::Credentials};
use anyhow::{Context, Result};
use ini::{EscapePolicy, Ini, WriteOption};
use log::info;
use std::{fs, path::Path};

const DHCP_LEASE_TIME: &str = "24h";
const AP_NETMASK: &str = "255.255.255.0";

/// Writes the access point and DHCP daemon configuration
#[derive(Clone, Debug, Default)]
pub struct DaemonConfigRenderer;

impl DaemonConfigRenderer {
    pub fn render(
        &self,
        ap: &ApConfig,
        credentials: &Credentials,
        hostapd_path: &Path,
        dnsmasq_path: &Path,
    ) -> Result<()> {
        write_ini(&Self::hostapd(ap, credentials), hostapd_path)?;
        write_ini(&Self::dnsmasq(ap), dnsmasq_path)?;
        Ok(())
    }

    fn hostapd(ap: &ApConfig, credentials: &Credentials) -> Ini {
        let mut ini = Ini::new();

        ini.with_general_section()
            .set("interface", &ap.interface)
            .set("driver", "nl80211")
            .set("ssid", credentials.ssid())
            .set("country_code", &ap.country)
            .set("hw_mode", "g")
            .set("channel", ap.channel.to_string())
            .set("auth_algs", "1")
            .set("ignore_broadcast_ssid", "0")
            .set("wpa", "2")
            .set("wpa_passphrase", credentials.password())
            .set("wpa_key_mgmt", "WPA-PSK")
            .set("rsn_pairwise", "CCMP");

        ini
    }

    fn dnsmasq(ap: &ApConfig) -> Ini {
        let mut ini = Ini::new();
        let address = ap.address.to_string();

        ini.with_general_section()
            .set("interface", &ap.interface)
            .set("listen-address", &address)
            .set(
                "dhcp-range",
                format!(
                    "{},{},{AP_NETMASK},{DHCP_LEASE_TIME}",
                    ap.dhcp_range_start, ap.dhcp_range_end
                ),
            )
            .add("dhcp-option", format!("3,{address}"))
            .add("dhcp-option", format!("6,{address}"));

        ini
    }
}

fn write_ini(ini: &Ini, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).context(format!("failed to create directory {dir:?}"))?;
    }

    // values are already free of control characters; keep them byte exact
    let options = WriteOption {
        escape_policy: EscapePolicy::Nothing,
        ..Default::default()
    };

    info!("write daemon config to {path:?}");

    ini.write_to_file_opt(path, options)
        .context(format!("failed to write daemon config: {path:?}"))
}
