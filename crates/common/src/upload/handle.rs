use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use super::error::UploadError;
use super::identity::StorageId;

/// Pending result of a submitted upload.
///
/// Dropping the handle, or abandoning it after a timeout, does not cancel
/// the upload; it runs to completion (or rollback) on the worker.
#[derive(Debug)]
pub struct UploadHandle {
    rx: oneshot::Receiver<Result<StorageId, UploadError>>,
}

impl UploadHandle {
    pub(crate) fn new(rx: oneshot::Receiver<Result<StorageId, UploadError>>) -> Self {
        Self { rx }
    }

    /// A handle that is already resolved with `err`.
    pub(crate) fn failed(err: UploadError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(err));
        Self { rx }
    }
}

impl Future for UploadHandle {
    type Output = Result<StorageId, UploadError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(UploadError::WorkerLost)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dropped_sender_is_worker_lost() {
        let (tx, rx) = oneshot::channel();
        drop(tx);
        assert!(matches!(
            UploadHandle::new(rx).await,
            Err(UploadError::WorkerLost)
        ));
    }

    #[tokio::test]
    async fn test_failed_handle_resolves_immediately() {
        assert!(matches!(
            UploadHandle::failed(UploadError::ShutDown).await,
            Err(UploadError::ShutDown)
        ));
    }

    #[tokio::test]
    async fn test_resolves_with_sent_value() {
        let (tx, rx) = oneshot::channel();
        tx.send(Ok(StorageId::from_sequence(9))).unwrap();
        assert_eq!(UploadHandle::new(rx).await.unwrap().as_str(), "file_9.bin");
    }
}
