//! Viewer shutdown
//!
//! All viewers are signalled first and then reaped against one shared
//! deadline, so shutdown time does not grow with the number of posters.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::poster::Poster;

/// How reaping ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapOutcome {
    /// Every viewer exited within the budget
    Graceful,
    /// The budget ran out; remaining viewers were killed
    Forced { killed: usize },
}

/// Send SIGTERM to every running viewer without waiting
pub fn terminate_all(posters: &mut [Poster]) {
    for poster in posters.iter_mut() {
        if let Err(e) = poster.terminate() {
            warn!("{:#}", e);
        }
    }
}

/// Wait for all viewers to exit within `total_timeout`, then kill the rest
///
/// The deadline is fixed on entry; each wait gets whatever is left of it.
pub async fn reap_all(posters: &mut [Poster], total_timeout: Duration) -> ReapOutcome {
    let deadline = Instant::now() + total_timeout;

    for i in 0..posters.len() {
        if !posters[i].has_process_handle() {
            continue;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, posters[i].wait()).await {
            Ok(Ok(status)) => debug!("Poster {} exited: {:?}", posters[i].index(), status),
            Ok(Err(e)) => warn!("Poster {}: {:#}", posters[i].index(), e),
            Err(_) => {
                warn!(
                    "Poster {} still running after {:?}; killing remaining viewers",
                    posters[i].index(),
                    total_timeout
                );
                let killed = kill_all(posters).await;
                return ReapOutcome::Forced { killed };
            }
        }
    }

    ReapOutcome::Graceful
}

/// Terminate then reap every viewer
pub async fn shutdown(posters: &mut [Poster], total_timeout: Duration) -> ReapOutcome {
    let running = posters.iter().filter(|p| p.has_process_handle()).count();
    info!("Stopping {} viewer(s), timeout {:?}", running, total_timeout);
    terminate_all(posters);
    reap_all(posters, total_timeout).await
}

async fn kill_all(posters: &mut [Poster]) -> usize {
    let mut killed = 0;
    for poster in posters.iter_mut() {
        if !poster.has_process_handle() {
            continue;
        }
        let was_running = poster.has_live_process();
        match poster.kill().await {
            Ok(()) if was_running => killed += 1,
            Ok(()) => {}
            Err(e) => warn!("Poster {}: {:#}", poster.index(), e),
        }
    }
    killed
}
