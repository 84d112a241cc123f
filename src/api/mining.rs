use actix_web::{HttpResponse, Responder, get, post, web};
use log::{debug, info, warn};

use super::models::{
    AppState, RegisterRequest, RegisterResponse, SubmitRequest, SubmitResponse, error_response,
};

/// Register a remote worker. Returns the open round's work, if any.
#[post("/mining/register/")]
pub async fn register_worker(
    state: web::Data<AppState>,
    req: web::Json<RegisterRequest>,
) -> impl Responder {
    let worker_id = req.into_inner().worker_id;
    if worker_id.trim().is_empty() {
        return HttpResponse::BadRequest().body("worker_id required");
    }
    match state.coordinator.register_worker(&worker_id).await {
        Ok(work) => HttpResponse::Ok().json(RegisterResponse { worker_id, work }),
        Err(e) => error_response(&e),
    }
}

/// Current round's work descriptor; 204 while no round is open.
#[get("/mining/work/")]
pub async fn get_work(state: web::Data<AppState>) -> impl Responder {
    match state.coordinator.current_work().await {
        Ok(Some(work)) => HttpResponse::Ok().json(work),
        Ok(None) => HttpResponse::NoContent().finish(),
        Err(e) => error_response(&e),
    }
}

/// Submit a mined block for a round.
#[post("/mining/submit/")]
pub async fn submit_block(
    state: web::Data<AppState>,
    req: web::Json<SubmitRequest>,
) -> impl Responder {
    let SubmitRequest {
        worker_id,
        round_id,
        block,
    } = req.into_inner();
    debug!(
        "SUBMIT worker={} round={} height={} nonce={}",
        worker_id, round_id, block.height, block.nonce
    );

    match state
        .coordinator
        .submit_block(&worker_id, round_id, block)
        .await
    {
        Ok(committed) => {
            info!(
                "ACCEPTED round {} from {} -> block#{} hash={}",
                round_id, worker_id, committed.height, committed.hash
            );
            HttpResponse::Ok().json(SubmitResponse {
                accepted: true,
                height: committed.height,
                hash: committed.hash,
            })
        }
        Err(e) => {
            warn!("REJECTED round {} from {}: {}", round_id, worker_id, e);
            error_response(&e)
        }
    }
}
