//! The worker's generation loop.
//!
//! Per generation, in order:
//!
//! 1. spawn both outgoing halo fetches (concurrent in both directions;
//!    synchronous calls would deadlock the ring),
//! 2. post readiness tokens so incoming halo requests may proceed,
//! 3. answer at most one queued snapshot request while the stripe is still
//!    in its pre-compute state,
//! 4. wait for both neighbours to copy our borders and for both halos to
//!    arrive,
//! 5. run the rule kernel over the virtual stripe across the configured
//!    thread count,
//! 6. commit stripe bytes, change log, and turn in one critical section,
//! 7. bail out if the cancel token fired.
//!
//! Every await is cancellation-aware so a superseding `InitServer` or a
//! `Stop` never leaves the loop parked on a rendezvous that nobody will
//! complete.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::board::Cell;
use crate::engine::{flipped_in_rows, split_lengths};
use crate::protocol::{methods, Empty, LineResponse};
use crate::rpc::{RpcClient, RpcError};

use super::halo::LoopSide;
use super::service::{SnapshotRequest, Worker};
use super::WorkerError;

/// Loop-side handles for one run, created by `InitServer` and consumed by
/// `RunServer`.
pub(super) struct RunContext {
    pub(super) first: LoopSide,
    pub(super) last: LoopSide,
    pub(super) snapshot_rx: mpsc::Receiver<SnapshotRequest>,
    pub(super) prev: RpcClient,
    pub(super) next: RpcClient,
    pub(super) cancel: CancellationToken,
}

pub(super) enum RunOutcome {
    Completed,
    Cancelled,
}

pub(super) async fn run_generations(
    worker: &Worker,
    ctx: &mut RunContext,
) -> Result<RunOutcome, WorkerError> {
    let (mut turn, turns, threads, width, rows) = worker.run_parameters();
    let mut paused = worker.paused_watch();
    let cancel = ctx.cancel.clone();

    while turn < turns {
        // Admission gate: a pause parks the loop here, between generations.
        // Neighbours stall within one generation once our halos stop, so
        // pausing one worker pauses the ring.
        tokio::select! {
            _ = cancel.cancelled() => return Ok(RunOutcome::Cancelled),
            _ = paused.wait_for(|p| !p) => {}
        }

        let upper_fetch = spawn_halo_fetch(&ctx.prev, methods::WORKER_GET_LAST_LINE);
        let lower_fetch = spawn_halo_fetch(&ctx.next, methods::WORKER_GET_FIRST_LINE);

        if ctx.first.signal_ready().await.is_err() || ctx.last.signal_ready().await.is_err() {
            return Ok(RunOutcome::Cancelled);
        }

        // Snapshot window: borders are published but nothing has mutated
        // yet, so the change log still describes this exact stripe.
        if let Ok(request) = ctx.snapshot_rx.try_recv() {
            trace!(turn, "answering snapshot at safe point");
            let _ = request.reply.send(worker.change_snapshot());
        }

        // Both neighbours must ack copying our borders before we may
        // overwrite them.
        let done = async {
            let first = ctx.first.await_done().await;
            let last = ctx.last.await_done().await;
            first.and(last)
        };
        tokio::select! {
            _ = cancel.cancelled() => return Ok(RunOutcome::Cancelled),
            acked = done => {
                if acked.is_err() {
                    return Ok(RunOutcome::Cancelled);
                }
            }
        }

        let upper = match await_halo(&cancel, upper_fetch).await? {
            Some(line) => line,
            None => return Ok(RunOutcome::Cancelled),
        };
        let lower = match await_halo(&cancel, lower_fetch).await? {
            Some(line) => line,
            None => return Ok(RunOutcome::Cancelled),
        };
        for halo in [&upper, &lower] {
            if halo.len() != width {
                return Err(WorkerError::HaloWidth {
                    expected: width,
                    actual: halo.len(),
                });
            }
        }

        let virtual_stripe = worker.virtual_stripe(&upper, &lower);
        let flips = compute_flips(virtual_stripe, width, rows, threads).await?;
        worker.commit_generation(flips);
        turn += 1;
        trace!(turn, "generation committed");

        if cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }
    }

    Ok(RunOutcome::Completed)
}

fn spawn_halo_fetch(
    client: &RpcClient,
    method: &'static str,
) -> JoinHandle<Result<LineResponse, RpcError>> {
    let client = client.clone();
    tokio::spawn(async move { client.call::<_, LineResponse>(method, &Empty {}).await })
}

/// Waits for an outgoing halo fetch; `Ok(None)` means the run was
/// cancelled while waiting.
async fn await_halo(
    cancel: &CancellationToken,
    fetch: JoinHandle<Result<LineResponse, RpcError>>,
) -> Result<Option<Vec<u8>>, WorkerError> {
    let joined = tokio::select! {
        _ = cancel.cancelled() => return Ok(None),
        joined = fetch => joined,
    };
    let response = joined
        .map_err(|e| WorkerError::Internal(e.to_string()))?
        .map_err(WorkerError::Halo)?;
    Ok(Some(response.line))
}

/// Partitions the interior rows across `threads` blocking tasks and merges
/// their flips in rank order.
async fn compute_flips(
    virtual_stripe: Vec<u8>,
    width: usize,
    rows: usize,
    threads: usize,
) -> Result<Vec<Cell>, WorkerError> {
    let shared = std::sync::Arc::new(virtual_stripe);
    let mut handles = Vec::with_capacity(threads);
    let mut y = 1;
    for size in split_lengths(rows, threads) {
        let shared = std::sync::Arc::clone(&shared);
        let (y0, y1) = (y, y + size);
        handles.push(tokio::task::spawn_blocking(move || {
            flipped_in_rows(&shared, width, y0, y1)
        }));
        y += size;
    }

    let mut flips = Vec::new();
    for handle in handles {
        flips.extend(
            handle
                .await
                .map_err(|e| WorkerError::Internal(e.to_string()))?,
        );
    }
    Ok(flips)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{ALIVE, DEAD};

    #[tokio::test]
    async fn test_compute_flips_matches_single_threaded() {
        // A vertical blinker spine: every thread count must produce the
        // same flips in the same order.
        let spine_row = [DEAD, DEAD, ALIVE, DEAD, DEAD];
        let mut virtual_stripe = Vec::new();
        for _ in 0..5 {
            virtual_stripe.extend_from_slice(&spine_row);
        }

        let single = compute_flips(virtual_stripe.clone(), 5, 3, 1).await.unwrap();
        let multi = compute_flips(virtual_stripe.clone(), 5, 3, 3).await.unwrap();
        let excess = compute_flips(virtual_stripe, 5, 3, 8).await.unwrap();

        assert_eq!(single, multi);
        assert_eq!(single, excess);
        assert!(!single.is_empty());
    }
}
