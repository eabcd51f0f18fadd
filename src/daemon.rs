//! Kiosk mode
//!
//! Wires everything together for `posterwall run`: logging, PID file,
//! signal handlers, poster discovery, the Wayfire connection and the
//! rotation loop.

use color_eyre::eyre::{self, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::compositor::WayfireSocket;
use crate::config::{Config, runtime_dir};
use crate::logging;
use crate::pidfile::{self, PidFile};
use crate::poster;
use crate::scheduler::{Scheduler, SchedulerSettings};
use crate::signals;

/// Run the kiosk until a termination signal or a fatal error
///
/// # Errors
/// Returns an error if no poster can be shown, the compositor is
/// unreachable, or the connection is lost.
pub async fn run(config: Config) -> Result<()> {
    let _log_guard = logging::init_daemon_logging(&config)?;

    info!("Starting posterwall {}", env!("CARGO_PKG_VERSION"));

    let _pid_file = match PidFile::create(pidfile::default_path()) {
        Ok(file) => Some(file),
        Err(e) => {
            warn!("{:#}; display on/off will not reach this instance", e);
            None
        }
    };

    let shutdown = CancellationToken::new();
    let controls = signals::spawn_signal_listener(shutdown.clone())?;

    let page_dir = &config.kiosk.page_directory;
    let posters = poster::discover(page_dir, &config.viewers.mime_query, &runtime_dir())?;
    if posters.is_empty() {
        eyre::bail!("No displayable posters in {:?}", page_dir);
    }
    info!("Found {} poster(s) in {:?}", posters.len(), page_dir);

    let mut compositor = WayfireSocket::new()?;
    compositor
        .connect()
        .await
        .context("Failed to connect to Wayfire (is the ipc plugin enabled?)")?;

    let mut scheduler = Scheduler::new(
        compositor,
        posters,
        SchedulerSettings::from(&config),
        shutdown,
        controls,
    );
    scheduler.run().await?;

    info!("Stopped");
    Ok(())
}
