//! Network provisioning services
//!
//! Everything that touches the host network stack lives here, behind the
//! [`crate::command::CommandRunner`] seam so it can be exercised without
//! real hardware.

pub mod credentials;
pub mod daemon_config;
pub mod gateway;
pub mod network;
pub mod reboot;
pub mod supervisor;
