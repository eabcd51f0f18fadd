//! Screen power over HDMI-CEC
//!
//! Switching the screen also pauses or resumes the running kiosk, so a
//! video does not keep playing to a dark screen.

use color_eyre::eyre::{self, Context, Result};
use nix::sys::signal::{Signal, kill};
use std::path::Path;
use std::process::Command;
use tracing::{debug, info, warn};

use crate::pidfile;

const CEC_CTL: &str = "cec-ctl";

/// Requested screen state
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Power {
    On,
    Off,
}

impl Power {
    /// cec-ctl arguments, after configuring the adapter as a TV source
    fn cec_args(self) -> [&'static str; 2] {
        match self {
            Self::On => ["-t0", "--image-view-on"],
            Self::Off => ["-t0", "--standby"],
        }
    }

    /// Signal for the running kiosk
    #[must_use]
    pub fn signal(self) -> Signal {
        match self {
            Self::On => Signal::SIGUSR2,
            Self::Off => Signal::SIGUSR1,
        }
    }
}

/// Switch the screen and notify the running kiosk
///
/// # Errors
/// Returns an error if cec-ctl is missing or fails. A missing kiosk
/// instance only logs a warning.
pub fn set_power(power: Power, pid_file: &Path) -> Result<()> {
    which::which(CEC_CTL).with_context(|| format!("Required tool '{CEC_CTL}' not found in PATH"))?;

    run_cec(&["--tv", "-S"])?;
    run_cec(&power.cec_args())?;
    info!("Screen switched {:?}", power);

    notify_kiosk(power, pid_file);
    Ok(())
}

fn run_cec(args: &[&str]) -> Result<()> {
    debug!(":: {} -d0 {}", CEC_CTL, args.join(" "));
    let status = Command::new(CEC_CTL)
        .arg("-d0")
        .args(args)
        .status()
        .with_context(|| format!("Failed to run {CEC_CTL}"))?;
    if !status.success() {
        eyre::bail!("{} -d0 {} failed with {}", CEC_CTL, args.join(" "), status);
    }
    Ok(())
}

/// Send the pause/resume signal; returns whether a kiosk was signalled
pub fn notify_kiosk(power: Power, pid_file: &Path) -> bool {
    let Some(pid) = pidfile::read_running_pid(pid_file) else {
        warn!("No running kiosk found via {:?}; playback unchanged", pid_file);
        return false;
    };

    match kill(pid, power.signal()) {
        Ok(()) => {
            info!("Sent {} to kiosk (pid {})", power.signal(), pid);
            true
        }
        Err(e) => {
            warn!("Failed to signal kiosk (pid {}): {}", pid, e);
            false
        }
    }
}
