use log::{debug, info};
use std::collections::BTreeMap;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, sleep_until};

use super::messages::{Command, CoordinatorStatus, Event, WorkDescriptor};
use super::round::{Coordinator, CoordinatorSettings};
use crate::blockchain::{Block, Blockchain};
use crate::error::{ChainError, Result};
use crate::transaction::Transaction;

const COMMAND_QUEUE: usize = 256;
const EVENT_QUEUE: usize = 1024;

/// Cheap, cloneable front door to the coordinator task.
#[derive(Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<Event>,
}

/// Start the coordinator task on the current tokio runtime.
pub fn spawn(ledger: Blockchain, settings: CoordinatorSettings) -> CoordinatorHandle {
    let (commands, rx) = mpsc::channel(COMMAND_QUEUE);
    let (events, _) = broadcast::channel(EVENT_QUEUE);
    let coordinator = Coordinator::new(ledger, settings, events.clone(), Instant::now());
    tokio::spawn(run(coordinator, rx));
    CoordinatorHandle { commands, events }
}

async fn run(mut coordinator: Coordinator, mut rx: mpsc::Receiver<Command>) {
    info!("coordinator started");
    loop {
        let wake = coordinator.next_wakeup();
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(cmd) => handle(&mut coordinator, cmd),
                None => break,
            },
            _ = sleep_until_opt(wake) => coordinator.on_timer(Instant::now()),
        }
    }
    info!("coordinator stopped: all handles dropped");
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(t) => sleep_until(t).await,
        None => std::future::pending().await,
    }
}

fn handle(c: &mut Coordinator, cmd: Command) {
    // A dropped reply receiver only means the caller went away.
    match cmd {
        Command::SubmitTransaction { tx, reply } => {
            let _ = reply.send(c.admit_transaction(tx));
        }
        Command::RegisterWorker { worker_id, reply } => {
            let _ = reply.send(c.register_worker(&worker_id));
        }
        Command::SubmitBlock {
            worker_id,
            round_id,
            block,
            reply,
        } => {
            let res = c.submit(&worker_id, round_id, *block, Instant::now());
            let _ = reply.send(res);
            c.finish_commit();
        }
        Command::CurrentWork { reply } => {
            let _ = reply.send(c.current_work());
        }
        Command::Chain { reply } => {
            let _ = reply.send(c.ledger().blocks().to_vec());
        }
        Command::Pending { reply } => {
            let _ = reply.send(c.mempool().pending());
        }
        Command::Balance { address, reply } => {
            let _ = reply.send(c.ledger().balance_of(&address));
        }
        Command::Balances { reply } => {
            let _ = reply.send(c.ledger().balances());
        }
        Command::Validate { reply } => {
            let _ = reply.send(c.ledger().is_valid_chain());
        }
        Command::Status { reply } => {
            let _ = reply.send(c.status());
        }
    }
}

impl CoordinatorHandle {
    /// Listen for round and mempool events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| ChainError::CoordinatorUnavailable)?;
        rx.await.map_err(|_| {
            debug!("coordinator dropped a reply");
            ChainError::CoordinatorUnavailable
        })
    }

    pub async fn submit_transaction(&self, tx: Transaction) -> Result<()> {
        self.request(|reply| Command::SubmitTransaction { tx, reply })
            .await?
    }

    pub async fn register_worker(&self, worker_id: &str) -> Result<Option<WorkDescriptor>> {
        let worker_id = worker_id.to_string();
        self.request(|reply| Command::RegisterWorker { worker_id, reply })
            .await
    }

    pub async fn submit_block(
        &self,
        worker_id: &str,
        round_id: u64,
        block: Block,
    ) -> Result<Block> {
        let worker_id = worker_id.to_string();
        self.request(|reply| Command::SubmitBlock {
            worker_id,
            round_id,
            block: Box::new(block),
            reply,
        })
        .await?
    }

    pub async fn current_work(&self) -> Result<Option<WorkDescriptor>> {
        self.request(|reply| Command::CurrentWork { reply }).await
    }

    pub async fn chain(&self) -> Result<Vec<Block>> {
        self.request(|reply| Command::Chain { reply }).await
    }

    pub async fn pending(&self) -> Result<Vec<Transaction>> {
        self.request(|reply| Command::Pending { reply }).await
    }

    pub async fn balance_of(&self, address: &str) -> Result<i128> {
        let address = address.to_string();
        self.request(|reply| Command::Balance { address, reply })
            .await
    }

    pub async fn balances(&self) -> Result<BTreeMap<String, i128>> {
        self.request(|reply| Command::Balances { reply }).await
    }

    pub async fn validate(&self) -> Result<bool> {
        self.request(|reply| Command::Validate { reply }).await
    }

    pub async fn status(&self) -> Result<CoordinatorStatus> {
        self.request(|reply| Command::Status { reply }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::model::tests::{account, params, transfer};
    use crate::blockchain::pow;
    use crate::coordinator::RoundPhase;
    use crate::storage::MemoryStore;
    use std::time::Duration;

    fn settings(start_delay: Duration) -> CoordinatorSettings {
        CoordinatorSettings {
            reward_address: "coordinator".into(),
            round_timeout: Duration::from_secs(30),
            block_interval: Duration::from_secs(5),
            start_delay,
            max_txs_per_block: 10,
            storage_retries: 1,
        }
    }

    fn ledger(genesis: &str) -> Blockchain {
        Blockchain::open(Box::new(MemoryStore::new()), &params(genesis)).unwrap()
    }

    async fn next_round(rx: &mut broadcast::Receiver<Event>) -> WorkDescriptor {
        loop {
            if let Event::RoundOpened(work) = rx.recv().await.unwrap() {
                return work;
            }
        }
    }

    #[tokio::test]
    async fn concurrent_valid_submissions_commit_once() {
        let a = account();
        let handle = spawn(ledger(&a.address), settings(Duration::ZERO));
        let mut rx = handle.subscribe();
        let work = next_round(&mut rx).await;
        handle.register_worker("w1").await.unwrap();
        handle.register_worker("w2").await.unwrap();

        let mut one = work.candidate(Some("one"));
        let mut two = work.candidate(Some("two"));
        pow::mine(&mut one, work.difficulty);
        pow::mine(&mut two, work.difficulty);

        let (r1, r2) = tokio::join!(
            handle.submit_block("w1", work.round_id, one),
            handle.submit_block("w2", work.round_id, two),
        );
        let results = [r1, r2];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            results
                .iter()
                .any(|r| *r == Err(ChainError::StaleSubmission(work.round_id)))
        );

        let chain = handle.chain().await.unwrap();
        assert_eq!(chain.len(), 2);
        assert!(handle.validate().await.unwrap());
        let status = handle.status().await.unwrap();
        assert_eq!(status.phase, RoundPhase::Idle);
        assert_eq!(status.workers, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_round_times_out_and_reopens() {
        let a = account();
        let handle = spawn(ledger(&a.address), settings(Duration::from_secs(1)));
        let mut rx = handle.subscribe();
        let pay = transfer(&a, "C", 10, 1);
        handle.submit_transaction(pay.clone()).await.unwrap();

        let first = next_round(&mut rx).await;
        let opened_at = Instant::now();
        let second = next_round(&mut rx).await;
        assert!(opened_at.elapsed() >= Duration::from_secs(30));

        assert_eq!(second.round_id, first.round_id + 1);
        assert_eq!(second.previous_hash, first.previous_hash);
        assert_eq!(second.height, first.height);
        assert_eq!(second.transactions[1].id, pay.id);

        assert_eq!(handle.chain().await.unwrap().len(), 1);
        assert_eq!(handle.pending().await.unwrap(), vec![pay]);
        assert_eq!(handle.balance_of(&a.address).await.unwrap(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn next_round_opens_after_block_interval() {
        let a = account();
        let handle = spawn(ledger(&a.address), settings(Duration::ZERO));
        let mut rx = handle.subscribe();
        let work = next_round(&mut rx).await;
        handle.register_worker("w1").await.unwrap();

        let mut block = work.candidate(None);
        pow::mine(&mut block, work.difficulty);
        let committed_at = Instant::now();
        handle.submit_block("w1", work.round_id, block).await.unwrap();
        assert_eq!(handle.current_work().await.unwrap(), None);

        let next = next_round(&mut rx).await;
        assert!(committed_at.elapsed() >= Duration::from_secs(5));
        assert_eq!(next.height, 2);
        assert_eq!(next.round_id, work.round_id + 1);
        assert_eq!(handle.balances().await.unwrap().get("coordinator"), Some(&50));
    }

    #[tokio::test]
    async fn intake_reports_typed_failures() {
        let a = account();
        let handle = spawn(ledger(&a.address), settings(Duration::from_secs(60)));
        let mut rx = handle.subscribe();

        let too_much = transfer(&a, "C", 100, 1);
        assert!(matches!(
            handle.submit_transaction(too_much).await,
            Err(ChainError::InsufficientBalance { .. })
        ));
        let ok = transfer(&a, "C", 1, 1);
        handle.submit_transaction(ok.clone()).await.unwrap();
        match rx.recv().await.unwrap() {
            Event::TransactionAdmitted(tx) => assert_eq!(tx.id, ok.id),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(handle.status().await.unwrap().mempool_size, 1);
    }
}
