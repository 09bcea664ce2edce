//! Validated wireless credentials.
//!
//! SSID and passphrase end up as process arguments and inside daemon
//! configuration files, so anything that could break either (control
//! characters, line breaks) is rejected up front.

use anyhow::{Result, bail, ensure};
use std::fmt;

const MAX_SSID_BYTES: usize = 32;
const MIN_PASSPHRASE_CHARS: usize = 8;
const MAX_PASSPHRASE_CHARS: usize = 63;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    ssid: String,
    password: String,
}

impl Credentials {
    /// Credentials for joining a network; an empty password means an open network
    pub fn new(ssid: &str, password: &str) -> Result<Self> {
        validate_ssid(ssid)?;
        if !password.is_empty() {
            validate_passphrase(password)?;
        }

        Ok(Self {
            ssid: ssid.to_string(),
            password: password.to_string(),
        })
    }

    /// Credentials for an access point; WPA2 requires a passphrase
    pub fn for_hotspot(ssid: &str, password: &str) -> Result<Self> {
        validate_ssid(ssid)?;
        validate_passphrase(password)?;

        Ok(Self {
            ssid: ssid.to_string(),
            password: password.to_string(),
        })
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("ssid", &self.ssid)
            .field("password", &"***")
            .finish()
    }
}

fn validate_ssid(ssid: &str) -> Result<()> {
    ensure!(!ssid.is_empty(), "ssid is empty");
    ensure!(
        ssid.len() <= MAX_SSID_BYTES,
        "ssid exceeds {MAX_SSID_BYTES} bytes"
    );
    if ssid.chars().any(char::is_control) {
        bail!("ssid contains control characters");
    }
    Ok(())
}

fn validate_passphrase(password: &str) -> Result<()> {
    let len = password.chars().count();
    ensure!(
        (MIN_PASSPHRASE_CHARS..=MAX_PASSPHRASE_CHARS).contains(&len),
        "password must have {MIN_PASSPHRASE_CHARS} to {MAX_PASSPHRASE_CHARS} characters"
    );
    if password.chars().any(char::is_control) {
        bail!("password contains control characters");
    }
    Ok(())
}
