use actix_web::{HttpResponse, Responder, get, post, web};
use log::{debug, info, warn};
use std::time::Instant;

use super::models::{
    AppState, MempoolResponse, NewTxRequest, NewTxResponse, SignTxRequest, error_response,
};
use crate::transaction::{Transaction, TxKind};
use crate::wallet::public_key_for_secret_hex;

/// Submit a client-signed transaction into the mempool.
#[post("/tx/")]
pub async fn post_transaction(
    state: web::Data<AppState>,
    body: web::Json<NewTxRequest>,
) -> impl Responder {
    let t0 = Instant::now();
    let req = body.into_inner();
    debug!(
        "POST /tx/ - received id={} amount={} fee={}",
        req.id, req.amount, req.fee
    );

    if req.id.trim().is_empty() {
        warn!("POST /tx/ - rejected: empty id");
        return HttpResponse::BadRequest().body("transaction id required");
    }

    let tx = Transaction {
        id: req.id,
        timestamp: req.timestamp,
        sender: req.sender,
        recipient: req.recipient,
        amount: req.amount,
        fee: req.fee,
        kind: TxKind::Regular,
        signature: Some(req.signature),
    };
    let id = tx.id.clone();

    if let Err(e) = state.coordinator.submit_transaction(tx).await {
        warn!("POST /tx/ - {} rejected: {}", id, e);
        return error_response(&e);
    }

    info!("POST /tx/ - id={} OK ({} ms)", id, t0.elapsed().as_millis());
    HttpResponse::Created().json(NewTxResponse { id })
}

/// DEV helper: build and sign a transfer with the given private key.
/// Nothing is submitted; post the result to `/tx/`.
#[post("/tx/sign/")]
pub async fn sign_transaction(body: web::Json<SignTxRequest>) -> impl Responder {
    let req = body.into_inner();
    let sender = match public_key_for_secret_hex(&req.private_key) {
        Ok(pk) => pk,
        Err(msg) => return HttpResponse::BadRequest().body(msg),
    };
    let mut tx = Transaction::new(sender, req.recipient, req.amount, req.fee);
    if let Err(msg) = tx.sign(&req.private_key) {
        return HttpResponse::BadRequest().body(msg);
    }
    HttpResponse::Ok().json(tx)
}

/// List current mempool (just ids, fee ordered).
#[get("/mempool/")]
pub async fn get_mempool(state: web::Data<AppState>) -> impl Responder {
    match state.coordinator.pending().await {
        Ok(pending) => HttpResponse::Ok().json(MempoolResponse {
            size: pending.len(),
            transactions: pending.into_iter().map(|t| t.id).collect(),
        }),
        Err(e) => error_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{App, http::StatusCode, test, web};
    use serde_json::json;
    use std::time::Duration;

    use crate::api::{AppState, init_routes};
    use crate::blockchain::{Blockchain, LedgerParams};
    use crate::coordinator::{self, CoordinatorSettings};
    use crate::storage::MemoryStore;
    use crate::transaction::Transaction;
    use crate::wallet::generate_keypair_hex;

    fn state_for(genesis: &str) -> web::Data<AppState> {
        let ledger = Blockchain::open(
            Box::new(MemoryStore::new()),
            &LedgerParams {
                difficulty: 1,
                block_reward: 50,
                genesis_address: genesis.to_string(),
                genesis_supply: 100,
            },
        )
        .unwrap();
        let coordinator = coordinator::spawn(
            ledger,
            CoordinatorSettings {
                reward_address: "coordinator".into(),
                round_timeout: Duration::from_secs(60),
                block_interval: Duration::from_secs(60),
                start_delay: Duration::from_secs(60),
                max_txs_per_block: 10,
                storage_retries: 1,
            },
        );
        web::Data::new(AppState { coordinator })
    }

    #[actix_web::test]
    async fn signed_transfer_is_admitted_and_listed() {
        let (sk, _, addr) = generate_keypair_hex();
        let app = test::init_service(
            App::new()
                .app_data(state_for(&addr))
                .configure(init_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/tx/sign/")
            .set_json(json!({ "private_key": sk, "recipient": "bob", "amount": 10, "fee": 2 }))
            .to_request();
        let tx: Transaction = test::call_and_read_body_json(&app, req).await;
        assert_eq!(tx.sender, addr);

        let req = test::TestRequest::post()
            .uri("/api/v1/tx/")
            .set_json(&tx)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let req = test::TestRequest::post()
            .uri("/api/v1/tx/")
            .set_json(&tx)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::get().uri("/api/v1/mempool/").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["size"], 1);
        assert_eq!(body["transactions"][0], tx.id.as_str());
    }

    #[actix_web::test]
    async fn bad_signature_and_overdraft_are_bad_requests() {
        let (sk, _, addr) = generate_keypair_hex();
        let app = test::init_service(
            App::new()
                .app_data(state_for(&addr))
                .configure(init_routes),
        )
        .await;

        let mut tx = Transaction::new(addr.clone(), "bob".into(), 10, 0);
        tx.sign(&sk).unwrap();
        tx.amount = 11;
        let req = test::TestRequest::post()
            .uri("/api/v1/tx/")
            .set_json(&tx)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let mut tx = Transaction::new(addr, "bob".into(), 500, 0);
        tx.sign(&sk).unwrap();
        let req = test::TestRequest::post()
            .uri("/api/v1/tx/")
            .set_json(&tx)
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert!(body["error"].as_str().unwrap().starts_with("insufficient balance"));
    }
}
