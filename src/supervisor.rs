use tokio::sync::mpsc;
use tracing::error;

/// Report path for faults that must stop the process: a panic caught at the
/// request boundary, or a task that finds its invariants broken. The caller
/// still gets its error response; the process stops taking new work.
#[derive(Clone)]
pub struct FaultHandle {
    tx: mpsc::Sender<String>,
}

impl FaultHandle {
    /// Reports a fault. The first report triggers shutdown; later ones
    /// only log.
    pub fn report(&self, description: impl Into<String>) {
        let description = description.into();
        error!(target: "app", "fault reported: {}", description);
        let _ = self.tx.try_send(description);
    }
}

pub struct FaultMonitor {
    rx: mpsc::Receiver<String>,
}

impl FaultMonitor {
    /// Resolves with the first reported fault, or `None` when every handle
    /// is gone without one.
    pub async fn wait(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

pub fn fault_channel() -> (FaultHandle, FaultMonitor) {
    let (tx, rx) = mpsc::channel(1);
    (FaultHandle { tx }, FaultMonitor { rx })
}
