use std::sync::Arc;
use std::time::Instant;

use actix_web::middleware::from_fn;
use actix_web::{HttpResponse, Responder, web};
use serde_json::json;
use tracing::{error, trace};

use super::middleware::ApiKeyAuth;
use crate::errors::IpLocateError;
use crate::services::{RefreshOrchestrator, Resolver};
use crate::storage::StoreRegistry;
use crate::storage::models::IpVersion;
use crate::utils::ip::random_public_ip;

/// 单次 benchmark 的最大次数
pub const MAX_BENCHMARK_TIMES: u64 = 1_000_000;

fn error_json(status: actix_web::http::StatusCode, message: impl Into<String>) -> HttpResponse {
    HttpResponse::build(status).json(json!({ "error": message.into() }))
}

fn parse_version(raw: &str) -> Option<IpVersion> {
    raw.trim().parse::<u8>().ok().and_then(IpVersion::from_number)
}

fn resolve_error(e: IpLocateError) -> HttpResponse {
    match e {
        IpLocateError::InvalidInput(msg) => HttpResponse::BadRequest().json(json!({ "error": msg })),
        other => {
            error!("Resolve failed: {}", other);
            error_json(
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
            )
        }
    }
}

pub struct LocateService;

impl LocateService {
    pub async fn welcome() -> impl Responder {
        HttpResponse::Ok()
            .json(json!({ "message": "Welcome! To use this system please query /ip/$ip" }))
    }

    pub async fn lookup_ip(
        path: web::Path<String>,
        resolver: web::Data<Arc<Resolver>>,
    ) -> impl Responder {
        let ip = path.into_inner();
        trace!("Lookup request for {}", ip);
        match resolver.resolve(&ip).await {
            Ok(location) => HttpResponse::Ok().json(location),
            Err(e) => resolve_error(e),
        }
    }

    pub async fn random_ip(
        path: web::Path<String>,
        resolver: web::Data<Arc<Resolver>>,
    ) -> impl Responder {
        let Some(version) = parse_version(&path) else {
            return HttpResponse::BadRequest().json(json!({ "error": "IP version must be 4 or 6" }));
        };
        let ip = random_public_ip(version).to_string();
        match resolver.resolve(&ip).await {
            Ok(location) => HttpResponse::Ok().json(location),
            Err(e) => resolve_error(e),
        }
    }

    pub async fn benchmark(
        path: web::Path<(String, String)>,
        resolver: web::Data<Arc<Resolver>>,
    ) -> impl Responder {
        let (version, times) = path.into_inner();
        let Some(version) = parse_version(&version) else {
            return HttpResponse::BadRequest().json(json!({ "error": "IP version must be 4 or 6" }));
        };
        let times = match times.trim().parse::<u64>() {
            Ok(n) if (1..=MAX_BENCHMARK_TIMES).contains(&n) => n,
            _ => {
                return HttpResponse::BadRequest().json(json!({
                    "error": "URL must contain a numeric number of times to run"
                }));
            }
        };

        // 生成地址不计入耗时
        let ips: Vec<String> = (0..times)
            .map(|_| random_public_ip(version).to_string())
            .collect();

        let started = Instant::now();
        for ip in &ips {
            if resolver.resolve(ip).await.is_err() {
                return error_json(
                    actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Error encountered during run ({})", ip),
                );
            }
        }
        let elapsed = started.elapsed();
        let ms = elapsed.as_millis() as u64;
        let us = elapsed.as_micros() as u64;

        HttpResponse::Ok().json(json!({
            "times": times,
            "ms": ms,
            "μs": us,
            "ms_per_op": ms / times,
            "μs_per_op": us / times,
        }))
    }

    pub async fn trigger_refresh(
        orchestrator: web::Data<Arc<RefreshOrchestrator>>,
    ) -> impl Responder {
        if orchestrator.spawn_refresh(false) {
            HttpResponse::Accepted().json(json!({ "status": "started" }))
        } else {
            HttpResponse::Conflict().json(json!({ "status": "already_running" }))
        }
    }

    pub async fn health(
        registry: web::Data<Arc<StoreRegistry>>,
        orchestrator: web::Data<Arc<RefreshOrchestrator>>,
    ) -> impl Responder {
        match registry.generations().await {
            Ok(generations) => {
                let datasets: Vec<_> = generations
                    .into_iter()
                    .map(|(key, generation)| {
                        json!({
                            "dataset": key.dataset,
                            "ip_version": key.version.number(),
                            "generation": generation,
                        })
                    })
                    .collect();
                HttpResponse::Ok().json(json!({
                    "status": "ok",
                    "backend": registry.backend_name(),
                    "refresh": orchestrator.state(),
                    "datasets": datasets,
                    "last_refresh": orchestrator.last_report(),
                }))
            }
            Err(e) => {
                error!("Health check failed: {}", e);
                HttpResponse::ServiceUnavailable().json(json!({
                    "status": "unhealthy",
                    "error": e.to_string(),
                }))
            }
        }
    }
}

/// 注册全部路由
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(LocateService::welcome))
        .route("/health", web::get().to(LocateService::health))
        .service(
            web::resource("/ip/{ip}")
                .wrap(from_fn(ApiKeyAuth::optional))
                .route(web::get().to(LocateService::lookup_ip)),
        )
        .service(
            web::resource("/random/{ip_version}")
                .wrap(from_fn(ApiKeyAuth::required))
                .route(web::get().to(LocateService::random_ip)),
        )
        .service(
            web::resource("/benchmark/{ip_version}/{times}")
                .wrap(from_fn(ApiKeyAuth::required))
                .route(web::get().to(LocateService::benchmark)),
        )
        .service(
            web::resource("/refresh")
                .wrap(from_fn(ApiKeyAuth::required))
                .route(web::post().to(LocateService::trigger_refresh)),
        );
}
