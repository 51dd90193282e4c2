//! Broker RPC surface and run orchestration.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::board::Board;
use crate::engine::split_lengths;
use crate::protocol::{
    methods, AliveCellsCountResponse, CurrentWorldResponse, Empty, InitServerRequest,
    PauseResponse, RunGolRequest, RunGolResponse, RunServerResponse, ServerAddress,
    WorldChangeResponse,
};
use crate::rpc::{params, to_result, RpcClient, RpcService};

use super::{reconcile, BrokerConfig, BrokerError};

/// A dialled worker: the cached connection plus the address the ring
/// neighbours are told about.
#[derive(Debug, Clone)]
struct WorkerHandle {
    client: RpcClient,
    address: ServerAddress,
}

struct BrokerState {
    /// Initial board of the active run, read-only once the run starts;
    /// snapshots are rebuilt against it.
    world: Option<Board>,
    working: bool,
    run_cancel: CancellationToken,
    workers: Vec<WorkerHandle>,
    /// How many of `workers` form the current ring. Short boards use
    /// fewer workers than are connected, and control calls must not
    /// consult the idle ones.
    active: usize,
}

/// The broker service.
pub struct Broker {
    config: BrokerConfig,
    state: Mutex<BrokerState>,
    /// Serialises runs. A superseded run is cancelled before the new one
    /// queues here, so the wait is bounded by its unwind.
    run_lock: AsyncMutex<()>,
    shutdown: CancellationToken,
}

impl Broker {
    /// Creates a broker. `shutdown` is cancelled by `Broker.Stop`, which is
    /// the embedding process's cue to exit.
    pub fn new(config: BrokerConfig, shutdown: CancellationToken) -> Self {
        Self {
            config,
            state: Mutex::new(BrokerState {
                world: None,
                working: false,
                run_cancel: CancellationToken::new(),
                workers: Vec::new(),
                active: 0,
            }),
            run_lock: AsyncMutex::new(()),
            shutdown,
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs a board to the target turn across the ring.
    pub async fn run_gol(&self, req: RunGolRequest) -> Result<RunGolResponse, BrokerError> {
        if req.board.width() == 0 || req.board.height() == 0 {
            return Err(BrokerError::InvalidBoard(
                "dimensions must be positive".to_string(),
            ));
        }
        if !req.board.is_consistent() {
            return Err(BrokerError::InvalidBoard(
                "payload length does not match dimensions".to_string(),
            ));
        }

        {
            let state = self.state.lock().expect("broker state lock poisoned");
            if state.working {
                info!("superseding active run");
                state.run_cancel.cancel();
            }
        }
        let _run = self.run_lock.lock().await;

        let cancel = CancellationToken::new();
        {
            let mut state = self.state.lock().expect("broker state lock poisoned");
            state.world = Some(req.board.clone());
            state.working = true;
            state.run_cancel = cancel.clone();
        }

        let result = self.drive_run(&req, &cancel).await;
        self.state
            .lock()
            .expect("broker state lock poisoned")
            .working = false;

        if let Err(ref err) = result {
            error!(error = %err, "run failed");
        }
        result
    }

    async fn drive_run(
        &self,
        req: &RunGolRequest,
        cancel: &CancellationToken,
    ) -> Result<RunGolResponse, BrokerError> {
        let workers = self.connected_workers().await?;
        let height = req.board.height();
        // Never hand out an empty stripe.
        let count = workers.len().min(height);
        let workers = &workers[..count];
        let sizes = split_lengths(height, count);
        self.state
            .lock()
            .expect("broker state lock poisoned")
            .active = count;

        let mut start_y = 0;
        for (i, handle) in workers.iter().enumerate() {
            let init = InitServerRequest {
                stripe: req.board.stripe(start_y, sizes[i]),
                start_y,
                current_turn: req.current_turn,
                turns: req.turns,
                threads: req.threads,
                previous: workers[(i + count - 1) % count].address.clone(),
                next: workers[(i + 1) % count].address.clone(),
            };
            handle
                .client
                .call::<_, Empty>(methods::WORKER_INIT_SERVER, &init)
                .await
                .map_err(|source| BrokerError::Worker {
                    address: handle.address.to_string(),
                    source,
                })?;
            start_y += sizes[i];
        }
        info!(
            workers = count,
            turns = req.turns,
            width = req.board.width(),
            height,
            "ring initialised, starting run"
        );

        let mut receivers = Vec::with_capacity(count);
        for handle in workers {
            let client = handle.client.clone();
            let address = handle.address.to_string();
            let (tx, rx) = oneshot::channel();
            tokio::spawn(async move {
                let result = client
                    .call::<_, RunServerResponse>(methods::WORKER_RUN_SERVER, &Empty {})
                    .await;
                let _ = tx.send((address, result));
            });
            receivers.push(rx);
        }

        let mut stripes = Vec::with_capacity(count);
        for rx in receivers {
            let (address, result) = tokio::select! {
                _ = cancel.cancelled() => return Err(BrokerError::Closed),
                received = rx => received.map_err(|_| BrokerError::Closed)?,
            };
            let response = result.map_err(|source| BrokerError::Worker { address, source })?;
            stripes.push(response.stripe);
        }

        let board = Board::from_stripes(req.board.width(), &stripes).ok_or_else(|| {
            BrokerError::InvalidBoard("worker stripes disagree on width".to_string())
        })?;
        info!(turns = req.turns, "run complete");
        Ok(RunGolResponse {
            board,
            current_turn: req.turns,
        })
    }

    /// Returns the cached worker handles, dialling the configured endpoints
    /// on first use.
    async fn connected_workers(&self) -> Result<Vec<WorkerHandle>, BrokerError> {
        {
            let state = self.state.lock().expect("broker state lock poisoned");
            if !state.workers.is_empty() {
                return Ok(state.workers.clone());
            }
        }

        let mut workers = Vec::new();
        for endpoint in &self.config.worker_endpoints {
            if workers.len() == self.config.max_nodes {
                break;
            }
            match RpcClient::connect(&endpoint.to_string()).await {
                Ok(client) => {
                    info!(worker = %endpoint, "worker connected");
                    workers.push(WorkerHandle {
                        client,
                        address: endpoint.clone(),
                    });
                }
                Err(error) => {
                    debug!(worker = %endpoint, error = %error, "worker endpoint did not answer");
                }
            }
        }
        if workers.is_empty() {
            return Err(BrokerError::NoNodeConnected);
        }

        let mut state = self.state.lock().expect("broker state lock poisoned");
        if state.workers.is_empty() {
            state.workers = workers;
        }
        Ok(state.workers.clone())
    }

    /// Assembles a consistent world from the ring's change logs.
    pub async fn get_world(&self) -> Result<CurrentWorldResponse, BrokerError> {
        let (initial, workers) = {
            let state = self.state.lock().expect("broker state lock poisoned");
            let initial = state.world.clone().ok_or(BrokerError::NoActiveRun)?;
            (initial, state.workers[..state.active].to_vec())
        };
        if workers.is_empty() {
            return Err(BrokerError::NoActiveRun);
        }

        let mut fetches = Vec::with_capacity(workers.len());
        for handle in &workers {
            let client = handle.client.clone();
            let address = handle.address.to_string();
            fetches.push(tokio::spawn(async move {
                let result = client
                    .call::<_, WorldChangeResponse>(methods::WORKER_GET_WORLD_CHANGE, &Empty {})
                    .await;
                (address, result)
            }));
        }

        let mut responses = Vec::with_capacity(workers.len());
        for fetch in fetches {
            let (address, result) = fetch
                .await
                .map_err(|e| BrokerError::Internal(e.to_string()))?;
            responses.push(result.map_err(|source| BrokerError::Worker { address, source })?);
        }

        let (world, current_turn) = reconcile::rebuild_world(&initial, &responses)?;
        debug!(turn = current_turn, "snapshot reconciled");
        Ok(CurrentWorldResponse {
            world,
            current_turn,
        })
    }

    /// Counts live cells in the world a snapshot would return.
    pub async fn count_alive_cells(&self) -> Result<AliveCellsCountResponse, BrokerError> {
        let snapshot = self.get_world().await?;
        Ok(AliveCellsCountResponse {
            count: snapshot.world.alive_count(),
            current_turn: snapshot.current_turn,
        })
    }

    /// Forwards pause to one worker; halo exchange stalls the rest of the
    /// ring within a generation.
    pub async fn pause(&self) -> Result<PauseResponse, BrokerError> {
        let worker = {
            let state = self.state.lock().expect("broker state lock poisoned");
            state.workers[..state.active]
                .first()
                .cloned()
                .ok_or(BrokerError::NoActiveRun)?
        };
        worker
            .client
            .call::<_, PauseResponse>(methods::WORKER_PAUSE, &Empty {})
            .await
            .map_err(|source| BrokerError::Worker {
                address: worker.address.to_string(),
                source,
            })
    }

    /// Cancels the run, stops every worker, and tells the embedding
    /// process to exit.
    pub async fn stop(&self) {
        info!("broker stopping");
        let workers = {
            let state = self.state.lock().expect("broker state lock poisoned");
            state.run_cancel.cancel();
            state.workers.clone()
        };
        for handle in workers {
            // Workers may die before the reply makes it back; that is fine.
            let _ = handle
                .client
                .call::<_, Empty>(methods::WORKER_STOP, &Empty {})
                .await;
        }
        self.shutdown.cancel();
    }
}

#[async_trait]
impl RpcService for Broker {
    async fn dispatch(&self, method: &str, raw: Value) -> Result<Value, String> {
        match method {
            methods::BROKER_RUN_GOL => {
                let req: RunGolRequest = params(raw)?;
                let res = self.run_gol(req).await.map_err(|e| e.to_string())?;
                to_result(&res)
            }
            methods::BROKER_COUNT_ALIVE_CELLS => {
                let _: Empty = params(raw)?;
                let res = self.count_alive_cells().await.map_err(|e| e.to_string())?;
                to_result(&res)
            }
            methods::BROKER_GET_WORLD => {
                let _: Empty = params(raw)?;
                let res = self.get_world().await.map_err(|e| e.to_string())?;
                to_result(&res)
            }
            methods::BROKER_PAUSE => {
                let _: Empty = params(raw)?;
                let res = self.pause().await.map_err(|e| e.to_string())?;
                to_result(&res)
            }
            methods::BROKER_STOP => {
                let _: Empty = params(raw)?;
                self.stop().await;
                to_result(&Empty {})
            }
            other => Err(format!("unknown method: {other}")),
        }
    }
}
