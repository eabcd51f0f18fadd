//! Posters and their viewer processes
//!
//! A poster is one media file bound to one workspace slot. Documents are
//! shown by a document viewer; videos by a media player that starts paused
//! and is controlled through a private IPC socket.

use color_eyre::eyre::{self, Context, Result};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::process::{Child, Command};
use tracing::{debug, info, trace, warn};

use crate::classify::{self, PosterKind};
use crate::compositor::View;
use crate::config::Viewers;

// mpv JSON IPC commands, one per line
const CMD_PLAY: &str = r#"{"command":["set_property","pause",false]}"#;
const CMD_PAUSE: &str = r#"{"command":["set_property","pause",true]}"#;
const CMD_REWIND: &str = r#"{"command":["seek",0,"absolute-percent"]}"#;

/// Per-kind viewer state
#[derive(Debug)]
pub enum Viewer {
    Document,
    Video {
        /// Probed length in whole seconds
        duration: Option<u64>,
        /// Private control socket of this poster's player
        control: PathBuf,
    },
}

/// One media item on one workspace
#[derive(Debug)]
pub struct Poster {
    index: usize,
    filepath: PathBuf,
    viewer: Viewer,
    child: Option<Child>,
    pid: Option<u32>,
    mapped: bool,
}

impl Poster {
    /// Create an unlaunched poster
    ///
    /// `control_dir` holds the control socket for video posters.
    #[must_use]
    pub fn new(index: usize, filepath: PathBuf, kind: PosterKind, control_dir: &Path) -> Self {
        let viewer = match kind {
            PosterKind::Document => Viewer::Document,
            PosterKind::Video => Viewer::Video {
                duration: None,
                control: control_dir.join(format!("posterwall-mpv-{index}.sock")),
            },
        };

        Self {
            index,
            filepath,
            viewer,
            child: None,
            pid: None,
            mapped: false,
        }
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn filepath(&self) -> &Path {
        &self.filepath
    }

    #[must_use]
    pub fn kind(&self) -> PosterKind {
        match self.viewer {
            Viewer::Document => PosterKind::Document,
            Viewer::Video { .. } => PosterKind::Video,
        }
    }

    /// Display time override; absent or zero falls back to the global interval
    #[must_use]
    pub fn duration(&self) -> Option<u64> {
        match self.viewer {
            Viewer::Document => None,
            Viewer::Video { duration, .. } => duration.filter(|d| *d > 0),
        }
    }

    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    #[must_use]
    pub fn is_launched(&self) -> bool {
        self.pid.is_some()
    }

    #[must_use]
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    /// Record that the compositor confirmed this poster's window
    pub fn mark_mapped(&mut self) {
        debug_assert!(self.child.is_some(), "mapped poster without a process");
        self.mapped = true;
    }

    /// Whether a compositor view belongs to this poster's process
    #[must_use]
    pub fn is_wayfire_view(&self, view: &View) -> bool {
        self.pid.is_some_and(|pid| i64::from(pid) == view.pid)
    }

    /// Start the viewer process
    ///
    /// # Errors
    /// Returns an error if the poster was already launched or the viewer
    /// cannot be spawned.
    pub async fn launch(&mut self, viewers: &Viewers) -> Result<()> {
        if self.child.is_some() {
            eyre::bail!("Poster {} already has a viewer process", self.index);
        }

        let mut command = match &mut self.viewer {
            Viewer::Document => {
                let mut command = Command::new(&viewers.document);
                command.arg(&self.filepath);
                command
            }
            Viewer::Video { duration, control } => {
                *duration = probe_duration(&viewers.probe, &self.filepath).await;

                // A stale socket from a previous run would be shadowed by the new player anyway
                if control.exists()
                    && let Err(e) = std::fs::remove_file(&*control)
                {
                    warn!("Could not remove stale control socket {:?}: {}", control, e);
                }

                let mut command = Command::new(&viewers.video);
                command
                    .args([
                        "--loop=inf",
                        "--keepaspect=yes",
                        "--keepaspect-window=no",
                        "--no-terminal",
                        "--pause",
                        "--mute=yes",
                        "--fullscreen",
                    ])
                    .arg(format!("--input-ipc-server={}", control.display()))
                    .arg(&self.filepath);
                command
            }
        };

        let viewer_name = match self.viewer {
            Viewer::Document => &viewers.document,
            Viewer::Video { .. } => &viewers.video,
        };

        let child = command
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start {viewer_name} for {:?}", self.filepath))?;

        self.pid = child.id();
        info!(
            "Launched {} poster {} ({:?}) as pid {:?}, duration {:?}",
            self.kind(),
            self.index,
            self.filepath,
            self.pid,
            self.duration()
        );
        self.child = Some(child);
        Ok(())
    }

    /// Resume playback (videos only)
    ///
    /// # Errors
    /// Returns an error if the control socket cannot be reached.
    pub async fn start_playback(&self) -> Result<()> {
        match &self.viewer {
            Viewer::Document => Ok(()),
            Viewer::Video { control, .. } => send_control(control, &[CMD_PLAY]).await,
        }
    }

    /// Pause and rewind to the start (videos only)
    ///
    /// # Errors
    /// Returns an error if the control socket cannot be reached.
    pub async fn stop_playback(&self) -> Result<()> {
        match &self.viewer {
            Viewer::Document => Ok(()),
            Viewer::Video { control, .. } => send_control(control, &[CMD_PAUSE, CMD_REWIND]).await,
        }
    }

    /// Pause without rewinding (videos only)
    ///
    /// # Errors
    /// Returns an error if the control socket cannot be reached.
    pub async fn pause_playback(&self) -> Result<()> {
        match &self.viewer {
            Viewer::Document => Ok(()),
            Viewer::Video { control, .. } => send_control(control, &[CMD_PAUSE]).await,
        }
    }

    /// Whether the viewer process is still running
    pub fn has_live_process(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Send SIGTERM to the viewer without waiting
    ///
    /// # Errors
    /// Returns an error if the signal cannot be delivered.
    pub fn terminate(&mut self) -> Result<()> {
        if !self.has_live_process() {
            return Ok(());
        }
        let Some(pid) = self.pid else {
            return Ok(());
        };

        let pid = Pid::from_raw(i32::try_from(pid)?);
        trace!("SIGTERM -> poster {} (pid {})", self.index, pid);
        signal::kill(pid, Signal::SIGTERM)
            .with_context(|| format!("Failed to terminate poster {} (pid {pid})", self.index))
    }

    /// Wait for the viewer to exit and release the handle
    ///
    /// Cancel safe: an interrupted wait keeps the handle.
    ///
    /// # Errors
    /// Returns an error if waiting on the process fails.
    pub async fn wait(&mut self) -> Result<Option<ExitStatus>> {
        let Some(child) = self.child.as_mut() else {
            return Ok(None);
        };
        let status = child.wait().await.context("Failed to wait for viewer")?;
        self.release();
        Ok(Some(status))
    }

    /// SIGKILL the viewer and reap it
    ///
    /// # Errors
    /// Returns an error if the process cannot be killed.
    pub async fn kill(&mut self) -> Result<()> {
        if self.has_live_process()
            && let Some(child) = self.child.as_mut()
        {
            child.kill().await.context("Failed to kill viewer")?;
        }
        self.release();
        Ok(())
    }

    /// Whether a process handle is still held (running or not yet reaped)
    #[must_use]
    pub fn has_process_handle(&self) -> bool {
        self.child.is_some()
    }

    /// Drop the handle of a viewer that has already exited
    ///
    /// Returns `true` if the poster held such a handle; it is then no
    /// longer mapped.
    pub fn release_if_exited(&mut self) -> bool {
        if !self.has_process_handle() || self.has_live_process() {
            return false;
        }
        self.release();
        true
    }

    fn release(&mut self) {
        self.child = None;
        self.mapped = false;
        if let Viewer::Video { control, .. } = &self.viewer
            && control.exists()
            && let Err(e) = std::fs::remove_file(control)
        {
            debug!("Failed to remove control socket {:?}: {}", control, e);
        }
    }

    /// Poster around an existing process
    #[cfg(test)]
    pub(crate) fn with_child(index: usize, kind: PosterKind, child: Child) -> Self {
        let mut poster = Self::new(
            index,
            PathBuf::from(format!("/posters/{index}")),
            kind,
            &std::env::temp_dir(),
        );
        poster.pid = child.id();
        poster.child = Some(child);
        poster
    }

    #[cfg(test)]
    pub(crate) fn set_duration(&mut self, seconds: Option<u64>) {
        if let Viewer::Video { duration, .. } = &mut self.viewer {
            *duration = seconds;
        }
    }
}

/// Discover posters in `dir`: regular files in sorted name order
///
/// The workspace index is the file's position in that order; files that
/// fail classification are skipped without shifting the other indices.
///
/// # Errors
/// Returns an error if the directory cannot be read.
pub fn discover(dir: &Path, mime_query: &str, control_dir: &Path) -> Result<Vec<Poster>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to read poster directory {dir:?}"))? {
        let entry = entry.with_context(|| format!("Failed to read entry in {dir:?}"))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        } else {
            debug!("Skipping non-file {:?}", path);
        }
    }
    files.sort();

    let posters = files
        .into_iter()
        .enumerate()
        .filter_map(|(index, path)| {
            classify::classify(mime_query, &path).map(|kind| Poster::new(index, path, kind, control_dir))
        })
        .collect();
    Ok(posters)
}

/// Probe a media file's length in whole seconds
///
/// Never fails: anything unexpected yields `None`.
pub async fn probe_duration(probe: &str, path: &Path) -> Option<u64> {
    let output = Command::new(probe)
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => {
            let duration = parse_duration(&String::from_utf8_lossy(&output.stdout));
            if duration.is_none() {
                warn!("Could not determine duration of {:?}; using rotation interval", path);
            }
            duration
        }
        Ok(output) => {
            warn!("{} exited with {} for {:?}; using rotation interval", probe, output.status, path);
            None
        }
        Err(e) => {
            warn!("Failed to run {}: {}; using rotation interval", probe, e);
            None
        }
    }
}

/// Parse a seconds value such as `"12.480000\n"`, truncating the fraction
#[must_use]
pub fn parse_duration(output: &str) -> Option<u64> {
    let seconds: f64 = output.trim().parse().ok()?;
    (seconds.is_finite() && seconds >= 0.0).then(|| seconds.trunc() as u64)
}

/// Send commands to a player's control socket without waiting for replies
async fn send_control(socket: &Path, commands: &[&str]) -> Result<()> {
    let mut stream = UnixStream::connect(socket)
        .await
        .with_context(|| format!("Failed to connect to control socket {socket:?}"))?;

    let mut payload = String::new();
    for command in commands {
        payload.push_str(command);
        payload.push('\n');
    }
    stream
        .write_all(payload.as_bytes())
        .await
        .with_context(|| format!("Failed to send to control socket {socket:?}"))?;
    stream.shutdown().await.ok();
    trace!("Sent {:?} to {:?}", commands, socket);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::Geometry;
    use rstest::rstest;
    use tokio::io::AsyncReadExt;
    use tokio::net::UnixListener;

    fn view_with_pid(pid: i64) -> View {
        View {
            id: 1,
            pid,
            output_id: 1,
            geometry: Geometry {
                x: 0,
                y: 0,
                width: 1,
                height: 1,
            },
            title: String::new(),
        }
    }

    #[rstest]
    #[case("12.480000\n", Some(12))]
    #[case("0.999", Some(0))]
    #[case("  300 ", Some(300))]
    #[case("N/A", None)]
    #[case("", None)]
    #[case("-3.0", None)]
    #[case("inf", None)]
    fn test_parse_duration(#[case] input: &str, #[case] expected: Option<u64>) {
        assert_eq!(parse_duration(input), expected);
    }

    #[test]
    fn test_zero_duration_falls_back_to_interval() {
        let mut poster = Poster::new(0, "a.mp4".into(), PosterKind::Video, Path::new("/tmp"));
        poster.set_duration(Some(0));
        assert_eq!(poster.duration(), None);
        poster.set_duration(Some(7));
        assert_eq!(poster.duration(), Some(7));
    }

    #[test]
    fn test_control_socket_is_unique_per_index() {
        let a = Poster::new(0, "a.mp4".into(), PosterKind::Video, Path::new("/run"));
        let b = Poster::new(1, "b.mp4".into(), PosterKind::Video, Path::new("/run"));
        let (Viewer::Video { control: ca, .. }, Viewer::Video { control: cb, .. }) = (&a.viewer, &b.viewer) else {
            panic!("expected video viewers");
        };
        assert_ne!(ca, cb);
    }

    #[tokio::test]
    async fn test_probe_failure_yields_none() {
        assert_eq!(
            probe_duration("posterwall-no-such-probe", Path::new("x.mp4")).await,
            None
        );
        // `false` runs but fails
        assert_eq!(probe_duration("false", Path::new("x.mp4")).await, None);
    }

    #[tokio::test]
    async fn test_document_playback_is_noop() {
        let poster = Poster::new(0, "a.pdf".into(), PosterKind::Document, Path::new("/nonexistent"));
        poster.start_playback().await.unwrap();
        poster.stop_playback().await.unwrap();
    }

    #[tokio::test]
    async fn test_video_playback_without_player_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let poster = Poster::new(3, "a.mp4".into(), PosterKind::Video, dir.path());
        assert!(poster.start_playback().await.is_err());
    }

    #[tokio::test]
    async fn test_stop_playback_pauses_then_rewinds() {
        let dir = tempfile::tempdir().unwrap();
        let poster = Poster::new(2, "a.mp4".into(), PosterKind::Video, dir.path());
        let Viewer::Video { control, .. } = &poster.viewer else {
            panic!("expected video viewer");
        };
        let listener = UnixListener::bind(control).unwrap();

        poster.stop_playback().await.unwrap();

        let (mut stream, _) = listener.accept().await.unwrap();
        let mut received = String::new();
        stream.read_to_string(&mut received).await.unwrap();
        let lines: Vec<&str> = received.lines().collect();
        assert_eq!(lines, vec![CMD_PAUSE, CMD_REWIND]);
    }

    #[tokio::test]
    async fn test_launch_matches_view_by_pid_and_terminates() {
        let viewers = Viewers {
            document: "sleep".to_string(),
            video: "sleep".to_string(),
            probe: "false".to_string(),
            mime_query: "xdg-mime".to_string(),
        };
        // `sleep 30` plays the document viewer with the path as its argument
        let mut poster = Poster::new(0, "30".into(), PosterKind::Document, Path::new("/tmp"));
        poster.launch(&viewers).await.unwrap();

        let pid = i64::from(poster.pid().unwrap());
        assert!(poster.is_wayfire_view(&view_with_pid(pid)));
        assert!(!poster.is_wayfire_view(&view_with_pid(pid + 1)));
        assert!(poster.launch(&viewers).await.is_err());

        poster.terminate().unwrap();
        let status = poster.wait().await.unwrap().unwrap();
        assert!(!status.success());
        assert!(!poster.has_live_process());
    }

    #[tokio::test]
    async fn test_exited_viewer_is_released() {
        let mut child = Command::new("true").stdin(Stdio::null()).spawn().unwrap();
        // Wait for the exit; the handle keeps the status
        while child.try_wait().unwrap().is_none() {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let mut exited = Poster::with_child(0, PosterKind::Video, child);
        exited.mark_mapped();

        assert!(exited.release_if_exited());
        assert!(!exited.is_mapped());
        assert!(!exited.has_process_handle());
        assert!(!exited.release_if_exited());

        let sleeper = Command::new("sleep").arg("30").kill_on_drop(true).spawn().unwrap();
        let mut running = Poster::with_child(1, PosterKind::Document, sleeper);
        assert!(!running.release_if_exited());
        assert!(running.has_process_handle());
    }

    #[tokio::test]
    async fn test_launch_failure_leaves_poster_unlaunched() {
        let viewers = Viewers {
            document: "posterwall-no-such-viewer".to_string(),
            video: "posterwall-no-such-viewer".to_string(),
            probe: "false".to_string(),
            mime_query: "xdg-mime".to_string(),
        };
        let mut poster = Poster::new(0, "a.pdf".into(), PosterKind::Document, Path::new("/tmp"));
        assert!(poster.launch(&viewers).await.is_err());
        assert!(!poster.is_launched());
    }

    #[test]
    fn test_discover_assigns_sorted_indices_and_skips_unknown() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c.pdf", "a.pdf", "b.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        // A stand-in MIME tool that reports pdf for *.pdf and text otherwise
        let tool = dir.path().join("fake-mime");
        std::fs::write(
            &tool,
            "#!/bin/sh\ncase \"$3\" in *.pdf) echo application/pdf;; *) echo text/plain;; esac\n",
        )
        .unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let posters = discover(dir.path(), tool.to_str().unwrap(), dir.path()).unwrap();
        let found: Vec<(usize, String)> = posters
            .iter()
            .map(|p| (p.index(), p.filepath().file_name().unwrap().to_string_lossy().into_owned()))
            .collect();
        // b.txt and the fake-mime script keep their slots but are skipped
        assert_eq!(found, vec![(0, "a.pdf".to_string()), (2, "c.pdf".to_string())]);
    }
}
