use tokio::sync::watch;

/// One-shot shutdown signal shared between the dispatcher and whoever stops it.
///
/// Triggering is sticky: a waiter that subscribes after [`ShutdownHandle::trigger`]
/// still sees the signal immediately.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    sender: watch::Sender<bool>,
    receiver: watch::Receiver<bool>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self { sender, receiver }
    }

    /// Signal shutdown. Idempotent.
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    /// Check if shutdown was requested
    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolve once shutdown has been triggered.
    pub async fn wait(&self) {
        let mut receiver = self.receiver.clone();
        // Only errors if the sender is dropped, and `self` holds it.
        let _ = receiver.wait_for(|stopped| *stopped).await;
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}
