use actix_server::ServerHandle;
use actix_web::{App, HttpServer, web::Data};
use anyhow::{Context, Result};
use env_logger::{Builder, Env, Target};
use log::{debug, error, info, warn};
use std::{io::Write, sync::Arc};
use tokio::{
    signal::unix::{SignalKind, signal},
    time::sleep,
};
use wifi_provisioner::{
    api::Api,
    command::ProcessRunner,
    config::AppConfig,
    services::{
        gateway::IpAddrSource,
        network::{Backend, NetworkModeOrchestrator},
        reboot::RebootScheduler,
    },
};

type Orchestrator = NetworkModeOrchestrator<
    ProcessRunner,
    Backend<ProcessRunner>,
    IpAddrSource<ProcessRunner>,
>;
type UiApi = Api<ProcessRunner, Backend<ProcessRunner>, IpAddrSource<ProcessRunner>>;

#[actix_web::main]
async fn main() {
    if let Err(e) = run().await {
        error!("application error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    initialize();

    let config = AppConfig::load().context("failed to load config")?;
    info!(
        "{:?} backend on {}, api port {}",
        config.backend, config.ap.interface, config.ui.port
    );

    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    let runner = Arc::new(ProcessRunner::new());
    let orchestrator = Arc::new(NetworkModeOrchestrator::new(
        &config.ap,
        Arc::clone(&runner),
        Backend::from_config(&config, Arc::clone(&runner)),
        IpAddrSource::new(Arc::clone(&runner), config.commands.timeout),
        config.commands.timeout,
    ));
    let reboot = Arc::new(RebootScheduler::new(
        runner,
        config.commands.privilege,
        config.provisioning.reboot_delay,
        config.commands.timeout,
    ));

    provision(&config, &orchestrator).await;

    let (server_handle, server_task) =
        run_server(UiApi::new(orchestrator, reboot), config.ui.port)?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            debug!("ctrl-c received");
        },
        _ = sigterm.recv() => {
            debug!("SIGTERM received");
        },
        result = server_task => {
            match result {
                Ok(Ok(())) => debug!("server stopped normally"),
                Ok(Err(e)) => error!("server stopped with error: {e}"),
                Err(e) => error!("server task panicked: {e}"),
            }
        },
    }

    info!("shutting down");
    server_handle.stop(true).await;
    info!("shutdown complete");

    Ok(())
}

fn initialize() {
    log_panics::init();

    let mut builder = if cfg!(debug_assertions) {
        Builder::from_env(Env::default().default_filter_or("debug"))
    } else {
        Builder::from_env(Env::default().default_filter_or("info"))
    };

    builder.format(|f, record| match record.level() {
        log::Level::Error => {
            eprintln!("{}", record.args());
            Ok(())
        }
        _ => {
            writeln!(f, "{}", record.args())
        }
    });

    builder.target(Target::Stdout).init();

    info!("module version: {}", env!("CARGO_PKG_VERSION"));
}

/// Stay on the current network if it works, otherwise open the setup hotspot
async fn provision(config: &AppConfig, orchestrator: &Orchestrator) {
    let ap = &config.ap;
    let fallback = ap.address.to_string();

    // give NetworkManager a chance to join a known network first
    sleep(config.provisioning.startup_delay).await;

    if orchestrator
        .is_network_available(&config.provisioning.probe_host)
        .await
    {
        let ip = orchestrator.resolve_gateway_ip(&fallback).await;
        info!("network available, device reachable at {ip}");
        return;
    }

    info!("no network available, starting hotspot {}", ap.ssid);

    if !orchestrator.start_hotspot(&ap.ssid, &ap.password).await {
        error!("failed to start hotspot {}", ap.ssid);
        return;
    }

    sleep(config.provisioning.hotspot_settle).await;

    let ip = orchestrator.resolve_gateway_ip(&fallback).await;
    if ip != fallback {
        warn!("hotspot address {ip} differs from configured address {fallback}");
    }

    info!(
        "join {} and open http://{ip}:{}/ to configure the network",
        ap.ssid, config.ui.port
    );
}

fn run_server(
    api: UiApi,
    port: u16,
) -> Result<(
    ServerHandle,
    tokio::task::JoinHandle<Result<(), std::io::Error>>,
)> {
    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(api.clone()))
            .configure(UiApi::configure)
    })
    .bind(("0.0.0.0", port))
    .context("failed to bind server")?
    .disable_signals()
    .run();

    Ok((server.handle(), tokio::spawn(server)))
}
