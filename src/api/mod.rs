mod balance;
mod chain;
mod health;
mod mining;
pub mod models;
mod stats;
mod tx;
mod wallet;

use actix_web::web::{self, ServiceConfig};

pub use models::AppState;

pub fn init_routes(cfg: &mut ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(health::health_check)
            .service(chain::get_chain)
            .service(chain::validate_chain)
            .service(tx::post_transaction)
            .service(tx::sign_transaction)
            .service(tx::get_mempool)
            .service(balance::get_balance)
            .service(balance::get_balances)
            .service(wallet::create_wallet)
            .service(mining::register_worker)
            .service(mining::get_work)
            .service(mining::submit_block)
            .service(stats::get_stats),
    );
}
