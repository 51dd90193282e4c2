//! Worker RPC surface and simulation state.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::board::Board;
use crate::protocol::{
    methods, Empty, InitServerRequest, LineResponse, PauseResponse, RunServerResponse,
    WorldChangeResponse,
};
use crate::rpc::{params, to_result, RpcClient, RpcService};

use super::changelog::ChangeLog;
use super::halo::{self, HandlerSide};
use super::run_loop::{self, RunContext, RunOutcome};
use super::WorkerError;

/// A queued snapshot request, answered at the next safe point of the
/// generation loop.
pub(super) struct SnapshotRequest {
    pub(super) reply: oneshot::Sender<WorldChangeResponse>,
}

/// Everything the state mutex protects.
///
/// Readers never observe a partially applied generation: the loop mutates
/// stripe, change log, and turn counter in one critical section.
pub(super) struct SimState {
    pub(super) stripe: Board,
    pub(super) start_y: usize,
    pub(super) turns: u32,
    pub(super) threads: usize,
    pub(super) current_turn: u32,
    pub(super) changes: ChangeLog,
}

/// One stripe worker.
pub struct Worker {
    state: Mutex<SimState>,
    first_line: AsyncMutex<Option<HandlerSide>>,
    last_line: AsyncMutex<Option<HandlerSide>>,
    snapshot_tx: Mutex<Option<mpsc::Sender<SnapshotRequest>>>,
    run_ctx: Mutex<Option<RunContext>>,
    /// Serialises generation loops: a superseded run must finish unwinding
    /// (and clear the working flag) before its replacement starts.
    run_gate: AsyncMutex<()>,
    run_cancel: Mutex<CancellationToken>,
    working: watch::Sender<bool>,
    paused: watch::Sender<bool>,
    shutdown: CancellationToken,
}

impl Worker {
    /// Creates an idle worker. `shutdown` is cancelled by `Worker.Stop`,
    /// which is the embedding process's cue to exit.
    pub fn new(shutdown: CancellationToken) -> Self {
        let (working, _) = watch::channel(false);
        let (paused, _) = watch::channel(false);
        Self {
            state: Mutex::new(SimState {
                stripe: Board::new(0, 0),
                start_y: 0,
                turns: 0,
                threads: 1,
                current_turn: 0,
                changes: ChangeLog::new(),
            }),
            first_line: AsyncMutex::new(None),
            last_line: AsyncMutex::new(None),
            snapshot_tx: Mutex::new(None),
            run_ctx: Mutex::new(None),
            run_gate: AsyncMutex::new(()),
            run_cancel: Mutex::new(CancellationToken::new()),
            working,
            paused,
            shutdown,
        }
    }

    /// Token the embedding process should watch to know when to exit.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Resets state and joins the ring described by the request.
    ///
    /// A run in progress is cancelled first; its loop drops the old
    /// rendezvous ends, which releases any neighbour parked on them.
    pub async fn init_server(&self, req: InitServerRequest) -> Result<(), WorkerError> {
        if !req.stripe.is_consistent() || req.stripe.height() == 0 {
            return Err(WorkerError::InvalidStripe);
        }

        // Dial before touching any run state, so a failed dial leaves the
        // prior run untouched and the loop hand-over window stays short.
        let prev = dial_neighbour(&req.previous.to_string()).await?;
        let next = dial_neighbour(&req.next.to_string()).await?;

        self.run_cancel
            .lock()
            .expect("run cancel lock poisoned")
            .cancel();
        // A paused loop cannot observe the cancel; lift the gate.
        self.paused.send_replace(false);
        // Drop a never-started run's rendezvous ends before waiting on the
        // handler mutexes, or a handler parked on them would hold us up
        // forever.
        drop(self.run_ctx.lock().expect("run context lock poisoned").take());

        info!(
            previous = %req.previous,
            next = %req.next,
            start_y = req.start_y,
            rows = req.stripe.height(),
            "worker joined ring"
        );

        let (first_loop, first_handler) = halo::rendezvous();
        let (last_loop, last_handler) = halo::rendezvous();
        let (snapshot_tx, snapshot_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        *self.first_line.lock().await = Some(first_handler);
        *self.last_line.lock().await = Some(last_handler);
        *self.snapshot_tx.lock().expect("snapshot sender lock poisoned") = Some(snapshot_tx);
        *self.run_cancel.lock().expect("run cancel lock poisoned") = cancel.clone();

        {
            let mut state = self.state.lock().expect("worker state lock poisoned");
            state.stripe = req.stripe;
            state.start_y = req.start_y;
            state.turns = req.turns;
            state.threads = req.threads.max(1);
            state.current_turn = req.current_turn;
            state.changes.reset();
        }

        *self.run_ctx.lock().expect("run context lock poisoned") = Some(RunContext {
            first: first_loop,
            last: last_loop,
            snapshot_rx,
            prev,
            next,
            cancel,
        });
        Ok(())
    }

    /// Runs the generation loop to the target turn and returns the final
    /// stripe.
    pub async fn run_server(&self) -> Result<RunServerResponse, WorkerError> {
        let _gate = self.run_gate.lock().await;
        let mut ctx = self
            .run_ctx
            .lock()
            .expect("run context lock poisoned")
            .take()
            .ok_or(WorkerError::NotInitialised)?;

        self.working.send_replace(true);
        let outcome = run_loop::run_generations(self, &mut ctx).await;
        self.working.send_replace(false);

        // Answer snapshot requests that raced run completion; anyone still
        // blocked on the channel saw the working flag flip and took the
        // direct path.
        while let Ok(request) = ctx.snapshot_rx.try_recv() {
            let _ = request.reply.send(self.change_snapshot());
        }
        drop(ctx);

        match outcome {
            Ok(RunOutcome::Completed) => {
                let state = self.state.lock().expect("worker state lock poisoned");
                info!(turn = state.current_turn, "stripe run complete");
                Ok(RunServerResponse {
                    stripe: state.stripe.clone(),
                })
            }
            Ok(RunOutcome::Cancelled) => {
                debug!("stripe run cancelled");
                Err(WorkerError::Closed)
            }
            Err(err) => {
                error!(error = %err, "stripe run failed");
                Err(err)
            }
        }
    }

    /// Returns an immutable copy of the stripe's first row.
    ///
    /// Parks on the rendezvous until the generation loop opens its borders,
    /// which guarantees the row belongs to the turn the neighbour expects.
    pub async fn get_first_line(&self) -> Result<LineResponse, WorkerError> {
        let mut guard = self.first_line.lock().await;
        let side = guard.as_mut().ok_or(WorkerError::NoActiveRun)?;
        let line = side
            .exchange(|| {
                let state = self.state.lock().expect("worker state lock poisoned");
                state.stripe.row(0).to_vec()
            })
            .await
            .map_err(|_| WorkerError::NoActiveRun)?;
        Ok(LineResponse { line })
    }

    /// Returns an immutable copy of the stripe's last row.
    pub async fn get_last_line(&self) -> Result<LineResponse, WorkerError> {
        let mut guard = self.last_line.lock().await;
        let side = guard.as_mut().ok_or(WorkerError::NoActiveRun)?;
        let line = side
            .exchange(|| {
                let state = self.state.lock().expect("worker state lock poisoned");
                state.stripe.row(state.stripe.height() - 1).to_vec()
            })
            .await
            .map_err(|_| WorkerError::NoActiveRun)?;
        Ok(LineResponse { line })
    }

    /// Returns the change log and current turn.
    ///
    /// While a run is live the request is queued and answered at the next
    /// per-generation safe point, keeping ring skew at most one generation.
    /// Otherwise - before a run, after completion, or racing either edge -
    /// the frozen state is read directly.
    pub async fn get_world_change(&self) -> WorldChangeResponse {
        let mut working = self.working.subscribe();
        if !*working.borrow() {
            return self.change_snapshot();
        }
        let sender = self
            .snapshot_tx
            .lock()
            .expect("snapshot sender lock poisoned")
            .clone();
        let Some(sender) = sender else {
            return self.change_snapshot();
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        tokio::select! {
            sent = sender.send(SnapshotRequest { reply: reply_tx }) => {
                if sent.is_err() {
                    return self.change_snapshot();
                }
            }
            _ = working.wait_for(|w| !w) => return self.change_snapshot(),
        }
        tokio::select! {
            reply = reply_rx => reply.unwrap_or_else(|_| self.change_snapshot()),
            _ = working.wait_for(|w| !w) => self.change_snapshot(),
        }
    }

    /// Toggles the pause gate and reports the current turn.
    pub fn pause(&self) -> PauseResponse {
        let paused = !*self.paused.borrow();
        self.paused.send_replace(paused);
        let current_turn = self
            .state
            .lock()
            .expect("worker state lock poisoned")
            .current_turn;
        info!(paused, turn = current_turn, "pause toggled");
        PauseResponse { current_turn }
    }

    /// Cancels any run and tells the embedding process to exit.
    pub fn stop(&self) {
        info!("worker stopping");
        self.run_cancel
            .lock()
            .expect("run cancel lock poisoned")
            .cancel();
        self.paused.send_replace(false);
        self.shutdown.cancel();
    }

    /// Reads the change log under the state mutex.
    pub(super) fn change_snapshot(&self) -> WorldChangeResponse {
        let state = self.state.lock().expect("worker state lock poisoned");
        let (committed, pending) = state.changes.snapshot();
        WorldChangeResponse {
            committed,
            pending,
            current_turn: state.current_turn,
        }
    }

    pub(super) fn run_parameters(&self) -> (u32, u32, usize, usize, usize) {
        let state = self.state.lock().expect("worker state lock poisoned");
        (
            state.current_turn,
            state.turns,
            state.threads,
            state.stripe.width(),
            state.stripe.height(),
        )
    }

    pub(super) fn paused_watch(&self) -> watch::Receiver<bool> {
        self.paused.subscribe()
    }

    /// Builds the h+2 virtual stripe: upper halo, own rows, lower halo.
    pub(super) fn virtual_stripe(&self, upper: &[u8], lower: &[u8]) -> Vec<u8> {
        let state = self.state.lock().expect("worker state lock poisoned");
        let mut cells = Vec::with_capacity(upper.len() + state.stripe.cells().len() + lower.len());
        cells.extend_from_slice(upper);
        cells.extend_from_slice(state.stripe.cells());
        cells.extend_from_slice(lower);
        cells
    }

    /// Applies one generation's flips in a single critical section.
    ///
    /// `flips` are stripe-local; the change log records them in global
    /// coordinates.
    pub(super) fn commit_generation(&self, flips: Vec<crate::board::Cell>) {
        let mut state = self.state.lock().expect("worker state lock poisoned");
        state.stripe.apply_flips(&flips);
        let start_y = state.start_y;
        let global = flips
            .into_iter()
            .map(|cell| crate::board::Cell::new(cell.x, cell.y + start_y))
            .collect();
        state.changes.advance(global);
        state.current_turn += 1;
    }
}

async fn dial_neighbour(address: &str) -> Result<RpcClient, WorkerError> {
    RpcClient::connect(address)
        .await
        .map_err(|source| WorkerError::Dial {
            address: address.to_string(),
            source,
        })
}

#[async_trait]
impl RpcService for Worker {
    async fn dispatch(&self, method: &str, raw: Value) -> Result<Value, String> {
        match method {
            methods::WORKER_INIT_SERVER => {
                let req: InitServerRequest = params(raw)?;
                self.init_server(req).await.map_err(|e| e.to_string())?;
                to_result(&Empty {})
            }
            methods::WORKER_RUN_SERVER => {
                let _: Empty = params(raw)?;
                let res = self.run_server().await.map_err(|e| e.to_string())?;
                to_result(&res)
            }
            methods::WORKER_GET_FIRST_LINE => {
                let _: Empty = params(raw)?;
                let res = self.get_first_line().await.map_err(|e| e.to_string())?;
                to_result(&res)
            }
            methods::WORKER_GET_LAST_LINE => {
                let _: Empty = params(raw)?;
                let res = self.get_last_line().await.map_err(|e| e.to_string())?;
                to_result(&res)
            }
            methods::WORKER_GET_WORLD_CHANGE => {
                let _: Empty = params(raw)?;
                to_result(&self.get_world_change().await)
            }
            methods::WORKER_PAUSE => {
                let _: Empty = params(raw)?;
                to_result(&self.pause())
            }
            methods::WORKER_STOP => {
                let _: Empty = params(raw)?;
                self.stop();
                to_result(&Empty {})
            }
            other => Err(format!("unknown method: {other}")),
        }
    }
}
