use actix_web::{HttpResponse, Responder, get, web};
use serde_json::json;

use super::models::{AppState, error_response};

/// Liveness plus a coordinator round-trip, so a wedged actor shows up as 503.
#[get("/health/")]
pub async fn health_check(state: web::Data<AppState>) -> impl Responder {
    match state.coordinator.status().await {
        Ok(s) => HttpResponse::Ok().json(json!({
            "status": "API is up and running 🦀",
            "height": s.height,
            "phase": s.phase,
        })),
        Err(e) => error_response(&e),
    }
}
