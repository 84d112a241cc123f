use actix_web::{HttpResponse, Responder, get, web};

use super::models::{AppState, error_response};

#[get("/stats/")]
pub async fn get_stats(state: web::Data<AppState>) -> impl Responder {
    match state.coordinator.status().await {
        Ok(status) => HttpResponse::Ok().json(status),
        Err(e) => error_response(&e),
    }
}
