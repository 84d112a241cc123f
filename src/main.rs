mod api;
mod blockchain;
mod config;
mod coordinator;
mod error;
mod mempool;
mod storage;
mod transaction;
mod wallet;
mod worker;

use actix_web::{App, HttpServer, web};
use dotenvy::dotenv;
use log::{error, info, warn};
use std::io;

use api::AppState;
use blockchain::Blockchain;
use config::Config;
use coordinator::CoordinatorSettings;
use storage::{BlockStore, FileStore, MemoryStore};
use worker::{MinerWorker, NONCE_STRIDE};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let _ = dotenv();
    env_logger::init();

    let cfg = Config::from_env();

    let reward_address = match cfg.reward_address.clone() {
        Some(addr) => addr,
        None => {
            let (sk, _, addr) = wallet::generate_keypair_hex();
            warn!("REWARD_ADDRESS not set; generated coordinator wallet {addr}");
            warn!("keep this private key to spend rewards: {sk}");
            addr
        }
    };

    let store: Box<dyn BlockStore> = if cfg.in_memory() {
        warn!("DB_PATH={}: blocks will not survive a restart", cfg.db_path);
        Box::new(MemoryStore::new())
    } else {
        Box::new(FileStore::open(&cfg.db_path).map_err(io::Error::other)?)
    };
    let ledger = Blockchain::open(store, &cfg.ledger_params()).map_err(|e| {
        error!("refusing to start: {e}");
        io::Error::other(e)
    })?;
    info!(
        "ledger at {} loaded: {} blocks, tip {}",
        cfg.db_path,
        ledger.len(),
        ledger.tip().hash
    );

    let handle = coordinator::spawn(
        ledger,
        CoordinatorSettings {
            reward_address: reward_address.clone(),
            round_timeout: cfg.round_timeout,
            block_interval: cfg.block_interval,
            start_delay: cfg.start_delay,
            max_txs_per_block: cfg.max_txs_per_block,
            storage_retries: cfg.storage_retries,
        },
    );

    for i in 0..cfg.local_miners {
        let worker = MinerWorker::new(
            format!("local-{i}"),
            Some(reward_address.clone()),
            i as u64 * NONCE_STRIDE,
        );
        let handle = handle.clone();
        tokio::spawn(async move {
            if let Err(e) = worker.run(handle).await {
                error!("local worker {i} stopped: {e}");
            }
        });
    }

    info!(
        "⛓️ Starting blockchain API at http://{}:{} (difficulty {}, {} local miners)",
        cfg.host, cfg.port, cfg.difficulty, cfg.local_miners
    );

    let state = web::Data::new(AppState {
        coordinator: handle,
    });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(api::init_routes)
    })
    .bind((cfg.host.as_str(), cfg.port))?
    .run()
    .await
}
