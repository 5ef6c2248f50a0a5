use std::thread::JoinHandle;
use std::time::Duration;

use flume::RecvTimeoutError;

/// Background thread that runs a task on a fixed interval until stopped.
///
/// Stopping drops the channel sender, which wakes the thread immediately,
/// then joins it.
#[derive(Debug)]
pub(crate) struct Sweeper {
    stop_tx: Option<flume::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    pub fn spawn<F>(name: &str, interval: Duration, mut task: F) -> std::io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => task(),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn stop(&mut self) {
        drop(self.stop_tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("sweeper thread panicked");
            }
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_runs_until_stopped() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let mut sweeper = Sweeper::spawn("test-sweeper", Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        while runs.load(Ordering::SeqCst) < 3 {
            std::thread::sleep(Duration::from_millis(5));
        }
        sweeper.stop();
        assert!(!sweeper.is_running());

        let after_stop = runs.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(runs.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_stop_does_not_wait_for_interval() {
        let mut sweeper = Sweeper::spawn("idle-sweeper", Duration::from_secs(3600), || {}).unwrap();
        let started = std::time::Instant::now();
        sweeper.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
