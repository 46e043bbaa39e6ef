//! OS signal handling for graceful shutdown
//!
//! Listeners are registered before [`spawn_signal_handler`] returns, so a
//! signal that arrives right after engine construction already goes through
//! the quit path (and the dev server teardown) instead of killing the
//! process outright.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::message::{Message, QuitReason};
use fpreview_core::prelude::*;

/// The OS signal that asked us to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
    CtrlC,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "SIGINT"),
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
            ShutdownSignal::CtrlC => write!(f, "Ctrl+C"),
        }
    }
}

/// Register signal listeners, then spawn a task that turns the first signal
/// into a quit message
pub fn spawn_signal_handler(tx: mpsc::Sender<Message>) -> Result<JoinHandle<()>> {
    let mut listener = SignalListener::register()?;

    Ok(tokio::spawn(async move {
        let Some(signal) = listener.recv().await else {
            return;
        };

        info!("Received {}, shutting down", signal);
        if tx
            .send(Message::Quit(QuitReason::Signal(signal)))
            .await
            .is_err()
        {
            debug!("Engine already gone when {} arrived", signal);
        }
    }))
}

struct SignalListener {
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
}

impl SignalListener {
    #[cfg(unix)]
    fn register() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            sigint: signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?,
            sigterm: signal(SignalKind::terminate())
                .context("Failed to create SIGTERM handler")?,
        })
    }

    #[cfg(not(unix))]
    fn register() -> Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn recv(&mut self) -> Option<ShutdownSignal> {
        tokio::select! {
            Some(()) = self.sigint.recv() => Some(ShutdownSignal::Interrupt),
            Some(()) = self.sigterm.recv() => Some(ShutdownSignal::Terminate),
            else => None,
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) -> Option<ShutdownSignal> {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Some(ShutdownSignal::CtrlC),
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
                None
            }
        }
    }
}
