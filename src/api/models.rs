use actix_web::HttpResponse;
use serde::{Deserialize, Serialize};

use crate::blockchain::Block;
use crate::coordinator::{CoordinatorHandle, WorkDescriptor};
use crate::error::ChainError;

/// Shared application state: every handler talks to the coordinator task.
pub struct AppState {
    pub coordinator: CoordinatorHandle,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Typed rejection → HTTP status. Validation failures are the caller's
/// problem (4xx); storage and availability are ours (5xx).
pub fn error_response(err: &ChainError) -> HttpResponse {
    let body = ErrorResponse {
        error: err.to_string(),
    };
    match err {
        ChainError::StaleSubmission(_) | ChainError::DuplicateTransaction(_) => {
            HttpResponse::Conflict().json(body)
        }
        ChainError::UnknownWorker(_) => HttpResponse::NotFound().json(body),
        ChainError::StorageError(_) | ChainError::CorruptLedger(_) => {
            HttpResponse::InternalServerError().json(body)
        }
        ChainError::CoordinatorUnavailable => HttpResponse::ServiceUnavailable().json(body),
        _ => HttpResponse::BadRequest().json(body),
    }
}

/* ---------- Mining API Models ---------- */

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub worker_id: String,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub worker_id: String,
    pub work: Option<WorkDescriptor>,
}

#[derive(Deserialize)]
pub struct SubmitRequest {
    pub worker_id: String,
    pub round_id: u64,
    pub block: Block,
}

#[derive(Serialize)]
pub struct SubmitResponse {
    pub accepted: bool,
    pub height: u64,
    pub hash: String,
}

/* ---------- Chain API Models ---------- */

#[derive(Serialize)]
pub struct ChainResponse {
    pub length: usize,
    pub difficulty: u32,
    pub chain: Vec<Block>,
}

#[derive(Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub length: usize,
}

/* ---------- TX API Models ---------- */

/// A client-signed transaction. The signature covers every other field.
#[derive(Deserialize)]
pub struct NewTxRequest {
    pub id: String,
    pub timestamp: i64,
    pub sender: String,
    pub recipient: String,
    pub amount: u64,
    #[serde(default)]
    pub fee: u64,
    pub signature: String,
}

#[derive(Serialize)]
pub struct NewTxResponse {
    pub id: String,
}

/// Dev helper input: sign a transfer server-side with a supplied key.
#[derive(Deserialize)]
pub struct SignTxRequest {
    pub private_key: String,
    pub recipient: String,
    pub amount: u64,
    #[serde(default)]
    pub fee: u64,
}

#[derive(Serialize)]
pub struct MempoolResponse {
    pub size: usize,
    pub transactions: Vec<String>, // ids, fee ordered
}

/* ---------- Balance API Models ---------- */

#[derive(Serialize)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: i128,
}
