//! Host mode runner - engine event loop driven over stdio

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;

use fpreview_app::{Engine, EngineOptions, Message, QuitReason};
use fpreview_core::prelude::*;

use super::{parse_host_line, NdjsonSurface};

/// Options collected from the command line
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Appended to `customFlags` for every dev server start
    pub extra_flags: Vec<String>,
    /// Turn auto reload off for this run
    pub no_auto_reload: bool,
    /// Start the dev server immediately instead of on `webviewReady`
    pub start: bool,
}

/// Run a preview session for the workspace at `root` until quit
pub async fn run(root: &Path, options: RunOptions) -> Result<()> {
    info!("Workspace: {}", root.display());

    let surface = Arc::new(NdjsonSurface::stdout());
    let mut engine = Engine::new(
        root,
        surface,
        EngineOptions {
            extra_flags: options.extra_flags,
            auto_reload: options.no_auto_reload.then_some(false),
            ..EngineOptions::default()
        },
    );

    let stdin_tx = engine.msg_sender();
    std::thread::spawn(move || {
        read_stdin_blocking(std::io::stdin().lock(), stdin_tx);
    });

    if options.start {
        engine.msg_sender().send(Message::StartServer).await.map_err(|e| {
            Error::channel_send(format!("Failed to queue server start: {}", e))
        })?;
    }

    let result = engine.run().await;

    info!("Flutter Preview exiting");
    result
}

/// Forward stdin lines to the engine; end of input quits
fn read_stdin_blocking(reader: impl BufRead, msg_tx: mpsc::Sender<Message>) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        };

        match parse_host_line(&line) {
            Ok(Some(msg)) => {
                let quit = matches!(msg, Message::Quit(_));
                if msg_tx.blocking_send(msg).is_err() || quit {
                    info!("Stdin reader exiting");
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => warn!("{}", e),
        }
    }

    info!("Stdin closed, quitting");
    let _ = msg_tx.blocking_send(Message::Quit(QuitReason::HostClosed));
}
