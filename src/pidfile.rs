//! PID file of the running kiosk instance
//!
//! Lets `display on|off` find the instance to pause or resume.

use color_eyre::eyre::{Context, Result};
use nix::sys::signal::kill;
use nix::unistd::{Pid, getuid};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::{runtime_dir, xdg_runtime_dir};

/// Default PID file location
///
/// `$XDG_RUNTIME_DIR/posterwall.pid`, or a per-user file under `/tmp`.
#[must_use]
pub fn default_path() -> PathBuf {
    path_in(xdg_runtime_dir().is_some(), &runtime_dir())
}

fn path_in(per_user_dir: bool, dir: &Path) -> PathBuf {
    if per_user_dir {
        dir.join("posterwall.pid")
    } else {
        dir.join(format!("posterwall-{}.pid", getuid()))
    }
}

/// PID file owned by this process, removed on drop
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Write the current PID to `path`
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn create(path: PathBuf) -> Result<Self> {
        if let Some(pid) = read_running_pid(&path) {
            warn!("PID file {:?} names running process {}; replacing it", path, pid);
        }
        fs::write(&path, format!("{}\n", std::process::id()))
            .with_context(|| format!("Failed to write PID file {path:?}"))?;
        debug!("Wrote PID file {:?}", path);
        Ok(Self { path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            debug!("Failed to remove PID file {:?}: {}", self.path, e);
        }
    }
}

/// PID recorded in `path`, if that process is still alive
#[must_use]
pub fn read_running_pid(path: &Path) -> Option<Pid> {
    let content = fs::read_to_string(path).ok()?;
    let raw: i32 = content.trim().parse().ok()?;
    if raw <= 0 {
        return None;
    }
    let pid = Pid::from_raw(raw);
    // Signal 0 only checks that the process exists
    kill(pid, None).ok().map(|()| pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pid_path_in_runtime_dir() {
        assert_eq!(
            path_in(true, Path::new("/run/user/1000")),
            PathBuf::from("/run/user/1000/posterwall.pid")
        );
        assert_eq!(
            path_in(false, Path::new("/tmp")),
            PathBuf::from(format!("/tmp/posterwall-{}.pid", getuid()))
        );
    }

    #[test]
    fn test_default_path_follows_runtime_dir() {
        let path = default_path();
        assert_eq!(path.parent(), Some(runtime_dir().as_path()));
    }

    #[test]
    fn test_pid_file_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posterwall.pid");

        let guard = PidFile::create(path.clone()).unwrap();
        let own = i32::try_from(std::process::id()).unwrap();
        assert_eq!(read_running_pid(guard.path()), Some(Pid::from_raw(own)));

        drop(guard);
        assert!(!path.exists());
        assert_eq!(read_running_pid(&path), None);
    }

    #[test]
    fn test_garbage_pid_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posterwall.pid");
        for content in ["", "abc", "-5", "0"] {
            fs::write(&path, content).unwrap();
            assert_eq!(read_running_pid(&path), None, "content {content:?}");
        }
    }

    #[test]
    fn test_stale_pid_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posterwall.pid");
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        fs::write(&path, pid.to_string()).unwrap();

        assert_eq!(read_running_pid(&path), None);
    }
}
