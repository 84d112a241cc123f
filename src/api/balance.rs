use actix_web::{HttpResponse, Responder, get, web};

use super::models::{AppState, BalanceResponse, error_response};

#[get("/balance/{address}/")]
pub async fn get_balance(state: web::Data<AppState>, path: web::Path<(String,)>) -> impl Responder {
    let address = path.into_inner().0;
    match state.coordinator.balance_of(&address).await {
        Ok(balance) => HttpResponse::Ok().json(BalanceResponse { address, balance }),
        Err(e) => error_response(&e),
    }
}

/// Every address the ledger has seen, with its balance.
#[get("/balances/")]
pub async fn get_balances(state: web::Data<AppState>) -> impl Responder {
    match state.coordinator.balances().await {
        Ok(all) => HttpResponse::Ok().json(all),
        Err(e) => error_response(&e),
    }
}
