#![allow(dead_code)]

use std::{
    net::Ipv4Addr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use wifi_provisioner::{
    NetworkModeOrchestrator,
    command::{CommandLine, CommandResult, CommandRunner, FailureKind, Privilege},
    config::ApConfig,
    services::{
        gateway::{InterfaceAddress, InterfaceSource},
        network::{ModeBackend, Nmcli, ProfileManagerBackend},
    },
};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Records every command it is asked to run.
///
/// Commands whose argv line starts with a registered failure prefix exit
/// with code 1, timed out prefixes report a timeout; registered outputs are
/// returned as stdout.
pub struct ScriptedRunner {
    log: Mutex<Vec<String>>,
    failures: Mutex<Vec<String>>,
    timeouts: Mutex<Vec<String>>,
    outputs: Mutex<Vec<(String, String)>>,
    supported: AtomicBool,
}

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self {
            log: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            timeouts: Mutex::new(Vec::new()),
            outputs: Mutex::new(Vec::new()),
            supported: AtomicBool::new(true),
        }
    }
}

impl ScriptedRunner {
    pub fn fail(&self, prefix: &str) {
        self.failures.lock().unwrap().push(prefix.to_string());
    }

    pub fn time_out(&self, prefix: &str) {
        self.timeouts.lock().unwrap().push(prefix.to_string());
    }

    pub fn output(&self, prefix: &str, stdout: &str) {
        self.outputs
            .lock()
            .unwrap()
            .push((prefix.to_string(), stdout.to_string()));
    }

    pub fn set_supported(&self, supported: bool) {
        self.supported.store(supported, Ordering::SeqCst);
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.log()
            .iter()
            .filter(|line| line.starts_with(prefix))
            .count()
    }
}

impl CommandRunner for ScriptedRunner {
    fn is_supported(&self) -> bool {
        self.supported.load(Ordering::SeqCst)
    }

    async fn run(&self, command: &CommandLine, _limit: Duration) -> CommandResult {
        let line = command.argv().join(" ");
        self.log.lock().unwrap().push(line.clone());

        // hand control back so concurrent callers get a chance to interleave
        tokio::task::yield_now().await;

        if !self.is_supported() {
            return CommandResult::failed(FailureKind::PlatformUnsupported, "unsupported");
        }

        let timed_out = self
            .timeouts
            .lock()
            .unwrap()
            .iter()
            .any(|prefix| line.starts_with(prefix.as_str()));
        if timed_out {
            return CommandResult::failed(FailureKind::Timeout, "timeout exceeded");
        }

        let failed = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .any(|prefix| line.starts_with(prefix.as_str()));
        if failed {
            return CommandResult::completed(1, String::new(), "scripted failure".to_string());
        }

        let stdout = self
            .outputs
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, stdout)| stdout.clone())
            .unwrap_or_default();

        CommandResult::completed(0, stdout, String::new())
    }
}

/// Fixed interface list
pub struct StaticInterfaces(pub Vec<InterfaceAddress>);

impl StaticInterfaces {
    pub fn hotspot() -> Self {
        Self(vec![
            InterfaceAddress::new("eth0", Ipv4Addr::new(10, 0, 0, 5)),
            InterfaceAddress::new("wlan0", Ipv4Addr::new(192, 168, 4, 1)),
        ])
    }
}

impl InterfaceSource for StaticInterfaces {
    async fn interfaces(&self) -> Vec<InterfaceAddress> {
        self.0.clone()
    }
}

pub fn orchestrator_with<B: ModeBackend + Send + Sync>(
    runner: &Arc<ScriptedRunner>,
    backend: B,
) -> NetworkModeOrchestrator<ScriptedRunner, B, StaticInterfaces> {
    NetworkModeOrchestrator::new(
        &ApConfig::default(),
        Arc::clone(runner),
        backend,
        StaticInterfaces::hotspot(),
        TIMEOUT,
    )
}

pub fn profile_manager() -> ProfileManagerBackend {
    ProfileManagerBackend::new(Nmcli::new(Privilege::User, "wlan0"), &ApConfig::default())
}

pub fn orchestrator(
    runner: &Arc<ScriptedRunner>,
) -> NetworkModeOrchestrator<ScriptedRunner, ProfileManagerBackend, StaticInterfaces> {
    orchestrator_with(runner, profile_manager())
}
