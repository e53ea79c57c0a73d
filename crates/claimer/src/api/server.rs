use crate::guard::QuarantineTracker;
use crate::ledger::Ledger;
use crate::metrics::MetricsContext;
use crate::utils::loop_heartbeats::LoopHeartbeats;
use actix_web::middleware::{NormalizePath, TrailingSlash};
use actix_web::{middleware, web, App, HttpResponse, HttpServer, Responder};
use chrono::Utc;
use log::{error, info};
use serde::Deserialize;
use serde_json::json;
use shared::models::api::ApiResponse;
use std::sync::Arc;

const DEFAULT_HOURS_BACK: u32 = 24;
const MAX_HOURS_BACK: u32 = 24 * 30;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn Ledger>,
    pub heartbeats: Arc<LoopHeartbeats>,
    pub metrics: Arc<MetricsContext>,
    pub quarantine: Arc<QuarantineTracker>,
}

#[derive(Deserialize)]
struct RecentQuery {
    hours: Option<u32>,
}

async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let status = state.heartbeats.health_status();
    if status.healthy {
        HttpResponse::Ok().json(status)
    } else {
        HttpResponse::ServiceUnavailable().json(status)
    }
}

async fn metrics(state: web::Data<AppState>) -> impl Responder {
    match state.metrics.export_metrics() {
        Ok(body) => HttpResponse::Ok().content_type("text/plain").body(body),
        Err(e) => {
            error!("Error exporting metrics: {e:?}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn recent_claims(
    query: web::Query<RecentQuery>,
    state: web::Data<AppState>,
) -> impl Responder {
    let hours = query
        .hours
        .unwrap_or(DEFAULT_HOURS_BACK)
        .min(MAX_HOURS_BACK);
    match state.ledger.get_recent(hours).await {
        Ok(records) => HttpResponse::Ok().json(ApiResponse::new(true, records)),
        Err(e) => {
            error!("Failed to read ledger: {e:#}");
            HttpResponse::InternalServerError().json(ApiResponse::new(
                false,
                format!("Failed to read ledger: {e}"),
            ))
        }
    }
}

async fn quarantined_wallets(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(ApiResponse::new(
        true,
        state.quarantine.quarantined_at(Utc::now()),
    ))
}

pub(crate) fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/metrics", web::get().to(metrics))
        .route("/claims/recent", web::get().to(recent_claims))
        .route("/quarantine", web::get().to(quarantined_wallets));
}

pub async fn start_server(host: &str, port: u16, state: AppState) -> std::io::Result<()> {
    info!("Starting server at http://{host}:{port}");

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .wrap(NormalizePath::new(TrailingSlash::Trim))
            .app_data(web::Data::new(state.clone()))
            .configure(configure)
            .default_service(web::route().to(|| async {
                HttpResponse::NotFound().json(json!({
                    "success": false,
                    "error": "Resource not found"
                }))
            }))
    })
    .bind((host, port))?
    .run()
    .await
}
