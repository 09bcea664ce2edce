use crate::{
    command::CommandRunner,
    services::{
        credentials::Credentials,
        gateway::InterfaceSource,
        network::{ModeBackend, NetworkModeOrchestrator},
        reboot::RebootScheduler,
    },
};
use actix_web::{
    HttpResponse, Responder,
    web::{self, Either},
};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use serde_valid::Validate;
use std::sync::Arc;

#[derive(Deserialize, Validate)]
pub struct SaveConfigRequest {
    #[validate(min_length = 1)]
    #[validate(max_length = 32)]
    ssid: String,
    #[serde(default)]
    #[validate(max_length = 63)]
    pwd: String,
}

#[derive(Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveConfigResponse {
    pub ssid: String,
    pub reboot_in_seconds: u64,
}

#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub struct StatusResponse {
    pub mode: String,
    pub status: String,
}

pub struct Api<Runner, Plans, Interfaces> {
    pub orchestrator: Arc<NetworkModeOrchestrator<Runner, Plans, Interfaces>>,
    pub reboot: Arc<RebootScheduler<Runner>>,
}

impl<Runner, Plans, Interfaces> Clone for Api<Runner, Plans, Interfaces> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: Arc::clone(&self.orchestrator),
            reboot: Arc::clone(&self.reboot),
        }
    }
}

impl<Runner, Plans, Interfaces> Api<Runner, Plans, Interfaces>
where
    Runner: CommandRunner + Send + Sync + 'static,
    Plans: ModeBackend + Send + Sync + 'static,
    Interfaces: InterfaceSource + Send + Sync + 'static,
{
    pub fn new(
        orchestrator: Arc<NetworkModeOrchestrator<Runner, Plans, Interfaces>>,
        reboot: Arc<RebootScheduler<Runner>>,
    ) -> Self {
        Api {
            orchestrator,
            reboot,
        }
    }

    /// Join the submitted network and reboot into client mode
    pub async fn save_config(
        body: Either<web::Form<SaveConfigRequest>, web::Json<SaveConfigRequest>>,
        api: web::Data<Self>,
    ) -> impl Responder {
        let request = match body {
            Either::Left(form) => form.into_inner(),
            Either::Right(json) => json.into_inner(),
        };

        debug!("save_config() called for {}", request.ssid);

        if let Err(e) = request.validate() {
            error!("save_config: invalid request: {e}");
            return HttpResponse::BadRequest().body(e.to_string());
        }

        if let Err(e) = Credentials::new(&request.ssid, &request.pwd) {
            error!("save_config: invalid credentials: {e:#}");
            return HttpResponse::BadRequest().body(e.to_string());
        }

        if !api
            .orchestrator
            .apply_client_credentials(&request.ssid, &request.pwd)
            .await
        {
            return HttpResponse::InternalServerError()
                .body("failed to apply network configuration");
        }

        api.reboot.schedule();

        HttpResponse::Ok().json(SaveConfigResponse {
            ssid: request.ssid,
            reboot_in_seconds: api.reboot.delay().as_secs(),
        })
    }

    pub async fn status(api: web::Data<Self>) -> impl Responder {
        debug!("status() called");

        let mode = api.orchestrator.mode().await;
        let status = api.orchestrator.query_status().await;

        HttpResponse::Ok().json(StatusResponse {
            mode: mode.name().to_string(),
            status,
        })
    }

    pub async fn networks(api: web::Data<Self>) -> impl Responder {
        debug!("networks() called");

        HttpResponse::Ok()
            .content_type("text/plain; charset=utf-8")
            .body(api.orchestrator.scan_networks().await)
    }

    pub async fn healthcheck() -> impl Responder {
        HttpResponse::Ok().body(env!("CARGO_PKG_VERSION"))
    }

    /// Register all routes on an actix service config
    pub fn configure(cfg: &mut web::ServiceConfig) {
        cfg.route("/config", web::post().to(Self::save_config))
            .route("/status", web::get().to(Self::status))
            .route("/networks", web::get().to(Self::networks))
            .route("/healthcheck", web::get().to(Self::healthcheck));
    }
}
