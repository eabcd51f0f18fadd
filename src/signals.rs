//! Process signals
//!
//! SIGTERM and SIGINT request shutdown through the cancellation token.
//! SIGUSR1 and SIGUSR2 pause and resume the poster on screen; `display off`
//! and `display on` send them to a running instance.

use color_eyre::eyre::{Context, Result};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Playback control requested from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Pause,
    Resume,
}

/// Install signal handlers and forward them until shutdown
///
/// Handlers are registered before returning, so signals raised right
/// after this call are not lost.
///
/// # Errors
/// Returns an error if a handler cannot be registered.
pub fn spawn_signal_listener(shutdown: CancellationToken) -> Result<mpsc::UnboundedReceiver<Control>> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    let mut sigusr1 = signal(SignalKind::user_defined1()).context("Failed to install SIGUSR1 handler")?;
    let mut sigusr2 = signal(SignalKind::user_defined2()).context("Failed to install SIGUSR2 handler")?;

    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let control = tokio::select! {
                () = shutdown.cancelled() => break,
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down...");
                    shutdown.cancel();
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down...");
                    shutdown.cancel();
                    break;
                }
                _ = sigusr1.recv() => Control::Pause,
                _ = sigusr2.recv() => Control::Resume,
            };

            info!("Received {:?} request", control);
            if tx.send(control).is_err() {
                warn!("Playback control receiver gone; ignoring further requests");
                break;
            }
        }
    });

    Ok(rx)
}
