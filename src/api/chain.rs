use actix_web::{HttpResponse, Responder, get, web};

use super::models::{AppState, ChainResponse, ValidateResponse, error_response};

/// Get the full blockchain.
#[get("/chain/")]
pub async fn get_chain(state: web::Data<AppState>) -> impl Responder {
    let chain = match state.coordinator.chain().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };
    let difficulty = match state.coordinator.status().await {
        Ok(s) => s.difficulty,
        Err(e) => return error_response(&e),
    };
    HttpResponse::Ok().json(ChainResponse {
        length: chain.len(),
        difficulty,
        chain,
    })
}

/// Full integrity audit of the chain.
#[get("/validate/")]
pub async fn validate_chain(state: web::Data<AppState>) -> impl Responder {
    let valid = match state.coordinator.validate().await {
        Ok(v) => v,
        Err(e) => return error_response(&e),
    };
    match state.coordinator.status().await {
        Ok(s) => HttpResponse::Ok().json(ValidateResponse {
            valid,
            length: s.chain_length,
        }),
        Err(e) => error_response(&e),
    }
}
