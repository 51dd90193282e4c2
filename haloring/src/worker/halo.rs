//! Two-step halo rendezvous.
//!
//! Each boundary row has a ready/done channel pair. The generation loop
//! sends a readiness token before it reads incoming halos; the line handler
//! consumes the token, copies the row, then acks with a done token. The
//! loop waits for both acks before mutating the stripe, which guarantees
//! that every neighbour has copied this worker's borders for generation `t`
//! before they are overwritten by `t + 1`.
//!
//! Channels have capacity 1: per boundary and generation there is exactly
//! one fetch, so tokens alternate strictly and anything with more slack
//! would let a neighbour run more than one generation ahead.

use thiserror::Error;
use tokio::sync::mpsc;

/// The generation loop's end of one boundary rendezvous.
#[derive(Debug)]
pub struct LoopSide {
    ready_tx: mpsc::Sender<()>,
    done_rx: mpsc::Receiver<()>,
}

/// The line handler's end of one boundary rendezvous.
#[derive(Debug)]
pub struct HandlerSide {
    ready_rx: mpsc::Receiver<()>,
    done_tx: mpsc::Sender<()>,
}

/// The loop side disappeared: the run was cancelled, superseded, or never
/// started.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("no active run")]
pub struct LoopGone;

/// Creates one boundary's rendezvous pair.
pub fn rendezvous() -> (LoopSide, HandlerSide) {
    let (ready_tx, ready_rx) = mpsc::channel(1);
    let (done_tx, done_rx) = mpsc::channel(1);
    (
        LoopSide { ready_tx, done_rx },
        HandlerSide { ready_rx, done_tx },
    )
}

impl LoopSide {
    /// Posts the readiness token for this generation.
    pub async fn signal_ready(&self) -> Result<(), LoopGone> {
        self.ready_tx.send(()).await.map_err(|_| LoopGone)
    }

    /// Waits for the handler's ack that the border row was copied out.
    pub async fn await_done(&mut self) -> Result<(), LoopGone> {
        self.done_rx.recv().await.ok_or(LoopGone)
    }
}

impl HandlerSide {
    /// Parks until the loop signals readiness, runs `copy`, then acks.
    ///
    /// When the loop side has been dropped (run cancelled or finished) the
    /// handler unblocks with [`LoopGone`] instead of deadlocking.
    pub async fn exchange<T>(&mut self, copy: impl FnOnce() -> T) -> Result<T, LoopGone> {
        self.ready_rx.recv().await.ok_or(LoopGone)?;
        let value = copy();
        self.done_tx.send(()).await.map_err(|_| LoopGone)?;
        Ok(value)
    }
}
