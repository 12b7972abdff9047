//! Termination signals that end the daemon

use std::io;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::info;

/// SIGTERM and SIGINT handlers. Both are live from `install` on, so a signal
/// that lands before the first `recv` is still delivered.
pub struct ShutdownSignals {
    term: Signal,
    interrupt: Signal,
}

impl ShutdownSignals {
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            term: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
        })
    }

    /// Waits for the next termination signal and returns its name.
    pub async fn recv(&mut self) -> &'static str {
        let name = tokio::select! {
            _ = self.term.recv() => "SIGTERM",
            _ = self.interrupt.recv() => "SIGINT",
        };
        info!(signal = name, "shutdown requested");
        name
    }
}
