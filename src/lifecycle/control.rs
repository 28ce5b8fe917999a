//! Start/stop control for long-running loops.
//!
//! A loop owns a [`StopSignal`] and checks it between units of work; stopping
//! never cancels in-flight work. `stop_and_wait` doubles as the exit
//! acknowledgement.

use std::future::Future;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::ErrorKind;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("{0} is already running")]
    AlreadyRunning(&'static str),

    #[error("{0} is not running")]
    NotRunning(&'static str),
}

impl ControlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControlError::AlreadyRunning(_) => ErrorKind::AlreadyRunning,
            ControlError::NotRunning(_) => ErrorKind::NotRunning,
        }
    }
}

/// Cooperative stop flag handed to a loop.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl StopSignal {
    /// A signal that never fires, for one-shot manual runs.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_stopped(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once stop is requested (or the controller is gone).
    pub async fn stopped(&mut self) {
        match self.rx.as_mut() {
            Some(rx) => {
                // Err means the sender was dropped; treat as stop.
                let _ = rx.wait_for(|stopped| *stopped).await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

struct RunningLoop {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns at most one running instance of a named loop.
pub struct LoopControl {
    name: &'static str,
    slot: Mutex<Option<RunningLoop>>,
}

impl LoopControl {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: Mutex::new(None),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<RunningLoop>> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Spawn the loop produced by `body`; `AlreadyRunning` if one is active.
    ///
    /// If a stopped instance is still finishing its in-flight work, the new
    /// one waits for it to exit before running, so at most one body runs at a
    /// time and `stop_and_wait` covers both.
    pub fn start<F, Fut>(&self, body: F) -> Result<(), ControlError>
    where
        F: FnOnce(StopSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot();
        if let Some(running) = slot.as_ref() {
            if !running.handle.is_finished() && !*running.stop_tx.borrow() {
                return Err(ControlError::AlreadyRunning(self.name));
            }
        }
        let previous = slot
            .take()
            .map(|running| running.handle)
            .filter(|handle| !handle.is_finished());

        let (stop_tx, stop_rx) = watch::channel(false);
        let signal = StopSignal { rx: Some(stop_rx) };
        let work = body(signal.clone());
        let name = self.name;
        let handle = tokio::spawn(async move {
            if let Some(previous) = previous {
                tracing::debug!(task = name, "Waiting for previous instance to exit");
                if let Err(e) = previous.await {
                    tracing::error!(task = name, error = %e, "Previous instance ended abnormally");
                }
            }
            if !signal.is_stopped() {
                work.await;
            }
        });
        *slot = Some(RunningLoop { stop_tx, handle });
        tracing::info!(task = self.name, "Loop started");
        Ok(())
    }

    /// Ask the loop to exit after its in-flight work. Idempotent; returns
    /// whether a live loop was signalled.
    pub fn stop(&self) -> bool {
        let slot = self.slot();
        match slot.as_ref() {
            Some(running) if !running.handle.is_finished() => {
                let first = !*running.stop_tx.borrow();
                running.stop_tx.send_replace(true);
                if first {
                    tracing::info!(task = self.name, "Loop stop requested");
                }
                first
            }
            _ => false,
        }
    }

    /// Signal stop and wait for the loop to exit.
    pub async fn stop_and_wait(&self) {
        let running = self.slot().take();
        if let Some(running) = running {
            running.stop_tx.send_replace(true);
            if let Err(e) = running.handle.await {
                tracing::error!(task = self.name, error = %e, "Loop task ended abnormally");
            }
            tracing::info!(task = self.name, "Loop stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.slot()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished() && !*r.stop_tx.borrow())
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn ticking(counter: Arc<AtomicUsize>) -> impl FnOnce(StopSignal) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> {
        move |mut stop| {
            Box::pin(async move {
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(5)) => {}
                        _ = stop.stopped() => break,
                    }
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
        }
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let control = LoopControl::new("test loop");
        let counter = Arc::new(AtomicUsize::new(0));
        control.start(ticking(counter.clone())).unwrap();
        assert!(control.is_running());
        assert_eq!(
            control.start(ticking(counter.clone())),
            Err(ControlError::AlreadyRunning("test loop"))
        );
        control.stop_and_wait().await;
        assert!(!control.is_running());
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_loop_can_restart() {
        let control = LoopControl::new("test loop");
        let counter = Arc::new(AtomicUsize::new(0));
        assert!(!control.stop());

        control.start(ticking(counter.clone())).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(control.stop());
        assert!(!control.stop());
        control.stop_and_wait().await;

        let after_stop = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), after_stop);

        control.start(ticking(counter.clone())).unwrap();
        control.stop_and_wait().await;
    }

    #[tokio::test]
    async fn restart_while_stopping_never_overlaps() {
        let control = LoopControl::new("test loop");
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));

        // Each unit of work takes 60ms and ignores stop until it is done.
        let slow = |active: Arc<AtomicUsize>, peak: Arc<AtomicUsize>, runs: Arc<AtomicUsize>| {
            move |stop: StopSignal| async move {
                while !stop.is_stopped() {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(60)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    runs.fetch_add(1, Ordering::SeqCst);
                }
            }
        };

        control
            .start(slow(active.clone(), peak.clone(), runs.clone()))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(control.stop());
        control
            .start(slow(active.clone(), peak.clone(), runs.clone()))
            .unwrap();
        assert!(control.is_running());

        tokio::time::sleep(Duration::from_millis(150)).await;
        control.stop_and_wait().await;

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(active.load(Ordering::SeqCst), 0);
        assert!(runs.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn never_signal_is_not_stopped() {
        assert!(!StopSignal::never().is_stopped());
    }
}
