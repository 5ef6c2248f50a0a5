use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::error::UploadError;
use super::identity::StorageId;
use super::pipeline::Pipeline;
use super::UploadRequest;

pub(crate) type UploadReply = oneshot::Sender<Result<StorageId, UploadError>>;

/// A queued submission and where to send its result.
pub(crate) struct UploadJob {
    pub request: UploadRequest,
    pub reply: UploadReply,
}

/// Spawn `count` workers draining `rx`. Each exits once every sender is
/// gone and the queue is empty.
pub(crate) fn spawn_workers(
    count: usize,
    pipeline: Arc<Pipeline>,
    rx: flume::Receiver<UploadJob>,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|worker| tokio::spawn(run_worker(worker, pipeline.clone(), rx.clone())))
        .collect()
}

async fn run_worker(worker: usize, pipeline: Arc<Pipeline>, rx: flume::Receiver<UploadJob>) {
    tracing::debug!(worker, "upload worker started");

    while let Ok(UploadJob { request, reply }) = rx.recv_async().await {
        // a panicking upload must not shrink the pool
        match AssertUnwindSafe(pipeline.process(request))
            .catch_unwind()
            .await
        {
            Ok(result) => {
                // receiver may have given up waiting; the upload still completed
                let _ = reply.send(result);
            }
            Err(_) => {
                tracing::error!(worker, "upload panicked");
                drop(reply);
            }
        }
    }

    tracing::debug!(worker, "upload worker exiting");
}
