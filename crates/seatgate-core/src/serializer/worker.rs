use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::admission::section::{AdmissionCore, Op, OpOutput};
use crate::error::AdmissionError;
use crate::types::ItemId;

pub(crate) type Reply = oneshot::Sender<Result<OpOutput, AdmissionError>>;

/// One intent waiting in a shard queue.
pub(crate) struct Job {
    pub item: ItemId,
    pub op: Op,
    pub reply: Reply,
}

/// Drain one shard in arrival order until every sender is gone.
///
/// Each section runs in its own task and the worker waits for it, so a panic
/// inside a section is reported to that intent's caller and the shard keeps
/// going with the next intent.
pub(crate) async fn run_shard(shard: usize, core: Arc<AdmissionCore>, mut rx: mpsc::Receiver<Job>) {
    tracing::debug!(shard, "serializer shard started");
    while let Some(Job { item, op, reply }) = rx.recv().await {
        let name = op.name();
        let section = {
            let core = Arc::clone(&core);
            tokio::spawn(async move { core.execute(item, op).await })
        };
        let result = match section.await {
            Ok(Ok(outcome)) => Ok(core.finish(outcome)),
            Ok(Err(e)) => Err(e),
            Err(join) => {
                tracing::error!(shard, item_id = item, op = name, "consumer failed: {join}");
                // Whatever the dead section wrote to the cache is suspect.
                core.drop_cached_count(item).await;
                Err(AdmissionError::ConsumerFailed(join.to_string()))
            }
        };
        if reply.send(result).is_err() {
            tracing::debug!(shard, item_id = item, op = name, "caller stopped waiting for outcome");
        }
    }
    tracing::debug!(shard, "serializer shard stopped");
}
