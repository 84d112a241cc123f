use actix_web::{HttpResponse, Responder, post};
use log::debug;
use serde::Serialize;

use crate::wallet::generate_keypair_hex;

/// Fresh key pair. The address is what transfers and coinbases pay to;
/// the private key never touches the server again.
#[derive(Serialize)]
struct WalletResponse {
    private_key: String,
    public_key: String,
    address: String,
}

#[post("/wallet/new/")]
pub async fn create_wallet() -> impl Responder {
    let (private_key, public_key, address) = generate_keypair_hex();
    debug!("WALLET issued address={}", address);
    HttpResponse::Created().json(WalletResponse {
        private_key,
        public_key,
        address,
    })
}
