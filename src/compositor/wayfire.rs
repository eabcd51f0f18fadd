//! Wayfire compositor implementation
//!
//! Connects to Wayfire's IPC socket (`WAYFIRE_SOCKET`) and speaks its
//! length-prefixed JSON protocol. Events and method replies share one
//! connection, so a reader task splits them into two channels: events feed
//! `next_message`, replies complete the pending request.

use color_eyre::eyre::{self, Context, ContextCompat, Result};
use serde_json::{Value, json};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::net::unix::OwnedWriteHalf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::{Compositor, Geometry, Message, OutputInfo};

// ============================================================================
// Wayfire IPC Protocol Constants
// ============================================================================

const METHOD_WATCH: &str = "window-rules/events/watch";
const METHOD_OUTPUT_INFO: &str = "window-rules/output-info";
const METHOD_CONFIGURE_VIEW: &str = "window-rules/configure-view";
const METHOD_SET_WORKSPACE: &str = "vswitch/set-workspace";

const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Framing
// ============================================================================

/// Read one frame: 4-byte little-endian length, then a JSON document
///
/// Returns `Ok(None)` on a clean end of stream before a header.
pub(crate) async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Value>> {
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e).context("Failed to read IPC header"),
    }

    let length = u32::from_le_bytes(header) as usize;
    if length > MAX_MESSAGE_SIZE {
        eyre::bail!("IPC message too large: {length} bytes (max: {MAX_MESSAGE_SIZE})");
    }

    let mut payload = vec![0u8; length];
    reader
        .read_exact(&mut payload)
        .await
        .context("Failed to read IPC payload")?;

    let value = serde_json::from_slice(&payload).context("Failed to parse IPC message")?;
    Ok(Some(value))
}

/// Write one frame in the same format `read_frame` reads
pub(crate) async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, value: &Value) -> Result<()> {
    let payload = serde_json::to_vec(value).context("Failed to serialize IPC message")?;
    if payload.len() > MAX_MESSAGE_SIZE {
        eyre::bail!(
            "IPC message too large: {} bytes (max: {MAX_MESSAGE_SIZE})",
            payload.len()
        );
    }

    writer
        .write_all(&(payload.len() as u32).to_le_bytes())
        .await
        .context("Failed to write IPC header")?;
    writer
        .write_all(&payload)
        .await
        .context("Failed to write IPC payload")?;
    writer.flush().await.context("Failed to flush IPC socket")?;
    Ok(())
}

// ============================================================================
// Wayfire Compositor
// ============================================================================

/// Wayfire compositor connection
pub struct WayfireSocket {
    socket_path: PathBuf,
    writer: Option<OwnedWriteHalf>,
    events: Option<mpsc::UnboundedReceiver<Message>>,
    replies: Option<mpsc::UnboundedReceiver<Value>>,
    reader: Option<JoinHandle<()>>,
}

impl WayfireSocket {
    /// Create a new Wayfire compositor instance
    ///
    /// Reads `WAYFIRE_SOCKET` from environment.
    ///
    /// # Errors
    /// Returns an error if `WAYFIRE_SOCKET` is not set.
    pub fn new() -> Result<Self> {
        let socket_path = env::var_os("WAYFIRE_SOCKET")
            .map(PathBuf::from)
            .context("WAYFIRE_SOCKET not set. Is Wayfire running with the ipc plugin?")?;

        Ok(Self::with_path(socket_path))
    }

    /// Create an instance for an explicit socket path
    #[must_use]
    pub fn with_path(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            writer: None,
            events: None,
            replies: None,
            reader: None,
        }
    }

    /// Open the connection and start the reader task
    ///
    /// # Errors
    /// Returns an error if the socket cannot be connected.
    pub async fn connect(&mut self) -> Result<()> {
        info!("Connecting to Wayfire: {:?}", self.socket_path);

        let stream = UnixStream::connect(&self.socket_path)
            .await
            .with_context(|| format!("Failed to connect to Wayfire socket: {:?}", self.socket_path))?;

        let (mut read_half, write_half) = stream.into_split();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();

        let reader = tokio::spawn(async move {
            loop {
                match read_frame(&mut read_half).await {
                    Ok(Some(value)) => {
                        if value.get("event").is_some() {
                            if event_tx.send(Message::from_event(value)).is_err() {
                                break;
                            }
                        } else if reply_tx.send(value).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        warn!("Wayfire closed the IPC connection");
                        break;
                    }
                    Err(e) => {
                        warn!("Wayfire IPC read error: {:#}", e);
                        break;
                    }
                }
            }
        });

        self.writer = Some(write_half);
        self.events = Some(event_rx);
        self.replies = Some(reply_rx);
        self.reader = Some(reader);
        Ok(())
    }

    /// Send a method call and wait for its reply
    async fn request(&mut self, method: &str, data: Value) -> Result<Value> {
        let writer = self.writer.as_mut().context("Not connected to Wayfire")?;
        let message = json!({ "method": method, "data": data });
        trace!("Wayfire request: {}", message);
        write_frame(writer, &message).await?;

        let replies = self.replies.as_mut().context("Not connected to Wayfire")?;
        let reply = tokio::time::timeout(REPLY_TIMEOUT, replies.recv())
            .await
            .with_context(|| format!("Timeout waiting for Wayfire reply to {method}"))?
            .with_context(|| format!("Wayfire connection closed during {method}"))?;

        if let Some(error) = reply.get("error") {
            eyre::bail!("Wayfire rejected {method}: {error}");
        }
        Ok(reply)
    }
}

impl Drop for WayfireSocket {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl Compositor for WayfireSocket {
    fn name(&self) -> &'static str {
        "Wayfire"
    }

    async fn watch(&mut self, events: &[&str]) -> Result<()> {
        self.request(METHOD_WATCH, json!({ "events": events }))
            .await
            .context("Failed to subscribe to Wayfire events")?;
        debug!("Subscribed to Wayfire events: {:?}", events);
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Option<Message>> {
        let events = self.events.as_mut().context("Not connected to Wayfire")?;
        Ok(events.recv().await)
    }

    async fn output_info(&mut self, output_id: u64) -> Result<OutputInfo> {
        let reply = self
            .request(METHOD_OUTPUT_INFO, json!({ "id": output_id }))
            .await?;
        serde_json::from_value(reply)
            .with_context(|| format!("Unexpected output-info reply for output {output_id}"))
    }

    async fn configure_view(&mut self, view_id: u64, geometry: Geometry) -> Result<()> {
        self.request(
            METHOD_CONFIGURE_VIEW,
            json!({ "id": view_id, "geometry": geometry }),
        )
        .await?;
        Ok(())
    }

    async fn set_workspace(&mut self, x: i64, y: i64, output_id: u64) -> Result<()> {
        self.request(
            METHOD_SET_WORKSPACE,
            json!({ "x": x, "y": y, "output-id": output_id }),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::VIEW_MAPPED;
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn test_frame_round_trip_uses_little_endian_length() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let msg = json!({"method": "x", "data": {}});
        write_frame(&mut a, &msg).await.unwrap();

        let mut header = [0u8; 4];
        b.read_exact(&mut header).await.unwrap();
        let expected = serde_json::to_vec(&msg).unwrap().len() as u32;
        assert_eq!(u32::from_le_bytes(header), expected);
    }

    #[tokio::test]
    async fn test_read_frame_clean_eof_is_none() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);
        assert!(read_frame(&mut b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_rejects_oversized_length() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&u32::MAX.to_le_bytes()).await.unwrap();
        let err = read_frame(&mut b).await.unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    /// Fake Wayfire: answers watch/output-info, interleaving an event
    /// before each reply the way the real compositor may.
    async fn serve(listener: UnixListener) {
        let (mut stream, _) = listener.accept().await.unwrap();
        while let Some(request) = read_frame(&mut stream).await.unwrap() {
            let event = json!({
                "event": VIEW_MAPPED,
                "view": {
                    "id": 9, "pid": 4321, "output-id": 1, "title": "mpv",
                    "geometry": {"x": 0, "y": 0, "width": 10, "height": 10}
                }
            });
            write_frame(&mut stream, &event).await.unwrap();

            let reply = match request["method"].as_str().unwrap() {
                METHOD_OUTPUT_INFO => json!({
                    "id": 1,
                    "workarea": {"x": 0, "y": 0, "width": 1920, "height": 1080},
                    "workspace": {"x": 2, "y": 0, "grid_width": 3, "grid_height": 1}
                }),
                METHOD_SET_WORKSPACE => json!({"error": "no such output"}),
                _ => json!({"result": "ok"}),
            };
            write_frame(&mut stream, &reply).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_events_and_replies_are_demultiplexed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wayfire.sock");
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(serve(listener));

        let mut wf = WayfireSocket::with_path(path);
        wf.connect().await.unwrap();
        wf.watch(&[VIEW_MAPPED]).await.unwrap();

        let info = wf.output_info(1).await.unwrap();
        assert_eq!(info.workarea.width, 1920);
        assert_eq!(info.workspace.x, 2);

        // Both interleaved events were queued rather than mistaken for replies
        for _ in 0..2 {
            match wf.next_message().await.unwrap() {
                Some(Message::ViewMapped(v)) => assert_eq!(v.pid, 4321),
                other => panic!("expected ViewMapped, got {other:?}"),
            }
        }

        let err = wf.set_workspace(0, 0, 7).await.unwrap_err();
        assert!(err.to_string().contains("no such output"));
    }

    #[tokio::test]
    async fn test_request_without_connection_fails() {
        let mut wf = WayfireSocket::with_path(PathBuf::from("/nonexistent"));
        let err = wf.watch(&[VIEW_MAPPED]).await.unwrap_err();
        assert!(format!("{err:#}").contains("Not connected"));
    }
}
