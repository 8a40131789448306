//! Per-item ordered execution of admission intents.
//!
//! Items are hashed onto a fixed set of shards (`item_id mod shards`). Each
//! shard is a bounded FIFO channel drained by a single worker task, so intents
//! for one item run one at a time, in the order they were published, while
//! different shards proceed in parallel.

mod worker;

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::admission::section::{AdmissionCore, Op, OpOutput};
use crate::config::SerializerConfig;
use crate::error::AdmissionError;
use crate::types::ItemId;

use worker::{run_shard, Job};

/// Handle on the eventual outcome of a published intent.
///
/// Dropping a ticket does not cancel the intent; its outcome still reaches
/// notification subscribers.
pub struct Ticket<T> {
    rx: oneshot::Receiver<Result<OpOutput, AdmissionError>>,
    convert: fn(OpOutput) -> Result<T, AdmissionError>,
}

impl<T> Ticket<T> {
    pub(crate) fn new(
        rx: oneshot::Receiver<Result<OpOutput, AdmissionError>>,
        convert: fn(OpOutput) -> Result<T, AdmissionError>,
    ) -> Self {
        Self { rx, convert }
    }

    /// Wait for the intent to be processed.
    pub async fn outcome(self) -> Result<T, AdmissionError> {
        match self.rx.await {
            Ok(result) => result.and_then(self.convert),
            Err(_) => Err(AdmissionError::ConsumerFailed(
                "intent dropped before an outcome was produced".into(),
            )),
        }
    }
}

pub struct RequestSerializer {
    shards: Vec<mpsc::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl RequestSerializer {
    /// Spawn one worker per shard. Must be called inside a Tokio runtime.
    pub(crate) fn start(core: Arc<AdmissionCore>, cfg: &SerializerConfig) -> Self {
        let count = cfg.shards.max(1);
        let capacity = cfg.queue_capacity.max(1);
        let mut shards = Vec::with_capacity(count);
        let mut workers = Vec::with_capacity(count);
        for shard in 0..count {
            let (tx, rx) = mpsc::channel(capacity);
            shards.push(tx);
            workers.push(tokio::spawn(run_shard(shard, Arc::clone(&core), rx)));
        }
        tracing::info!(shards = count, queue_capacity = capacity, "request serializer started");
        Self { shards, workers }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Shard that owns `item`; stable for the serializer's lifetime.
    pub fn shard_for(&self, item: ItemId) -> usize {
        let n = self.shards.len() as i64;
        item.rem_euclid(n) as usize
    }

    /// Enqueue `op` behind everything already published for `item`.
    ///
    /// Never blocks: a full shard queue is reported as `SerializerUnavailable`
    /// along with the rejected op.
    pub(crate) fn publish(
        &self,
        item: ItemId,
        op: Op,
    ) -> Result<oneshot::Receiver<Result<OpOutput, AdmissionError>>, (AdmissionError, Op)> {
        let shard = self.shard_for(item);
        let (reply, rx) = oneshot::channel();
        match self.shards[shard].try_send(Job { item, op, reply }) {
            Ok(()) => Ok(rx),
            Err(mpsc::error::TrySendError::Full(job)) => {
                tracing::warn!(shard, item_id = item, "serializer shard queue full");
                Err((
                    AdmissionError::SerializerUnavailable(format!("shard {shard} queue is full")),
                    job.op,
                ))
            }
            Err(mpsc::error::TrySendError::Closed(job)) => Err((
                AdmissionError::SerializerUnavailable("serializer has shut down".into()),
                job.op,
            )),
        }
    }

    /// Stop accepting intents, let every shard drain what it already holds,
    /// and wait for the workers to exit.
    pub async fn shutdown(self) {
        let RequestSerializer { shards, workers } = self;
        drop(shards);
        for (shard, worker) in workers.into_iter().enumerate() {
            if let Err(e) = worker.await {
                tracing::error!(shard, "serializer worker ended abnormally: {e}");
            }
        }
        tracing::info!("request serializer stopped");
    }
}
