//! Process-wide shutdown signal
//!
//! One trigger, many cloneable listeners. Dropping the trigger counts as a
//! shutdown so that a panicked owner never leaves loops running forever.

use tokio::sync::watch;

/// Sending half, owned by the process entry point.
#[derive(Debug)]
pub struct ShutdownTrigger(watch::Sender<bool>);

/// Listening half handed to every long-running loop.
#[derive(Debug, Clone)]
pub struct Shutdown(watch::Receiver<bool>);

pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger(tx), Shutdown(rx))
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        let _ = self.0.send(true);
    }
}

impl Shutdown {
    /// Resolves once shutdown has been triggered (immediately if it already was).
    pub async fn wait(&mut self) {
        let _ = self.0.wait_for(|stopped| *stopped).await;
    }

    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }
}
