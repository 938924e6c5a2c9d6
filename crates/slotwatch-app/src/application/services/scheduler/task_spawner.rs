use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

use slotwatch_domain::{RunResult, StopReason, Target, WorkerId};

use crate::application::services::worker::{Worker, WorkerContext};

/// A finished task reports its worker id; `None` means it produced no result.
pub(super) type WorkerTasks = JoinSet<(WorkerId, Option<RunResult>)>;

/// Spawn one worker task. It waits for a pool permit first and holds it
/// until the worker terminates.
pub(super) fn spawn_worker(
    tasks: &mut WorkerTasks,
    id: WorkerId,
    target: Target,
    ctx: WorkerContext,
    permits: Arc<Semaphore>,
) {
    debug!(
        worker_id = %id,
        source = %target.source(),
        date = %target.date(),
        "➕ Spawning worker"
    );

    tasks.spawn(async move {
        let permit = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                debug!(worker_id = %id, "Cancelled while waiting for a pool slot");
                let finished_at = ctx.clock.now();
                return (
                    id,
                    Some(RunResult::stopped(target, Some(id), StopReason::Cancelled, finished_at)),
                );
            }
            permit = permits.acquire_owned() => permit,
        };
        let Ok(_permit) = permit else {
            error!(worker_id = %id, "Worker pool closed before the worker could start");
            return (id, None);
        };

        match AssertUnwindSafe(Worker::new(id, target, ctx).run())
            .catch_unwind()
            .await
        {
            Ok(result) => (id, Some(result)),
            Err(_) => {
                error!(worker_id = %id, "💥 Worker panicked");
                (id, None)
            }
        }
    });
}
