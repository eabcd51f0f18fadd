//! Compositor abstraction layer
//!
//! Window-mapped notifications and window/workspace control over a
//! compositor's IPC socket. The only backend is Wayfire's JSON IPC
//! (`ipc` + `ipc-rules` plugins):
//! - `window-rules/events/watch` subscribes to `view-mapped`
//! - `window-rules/output-info` reports workarea and current workspace
//! - `window-rules/configure-view` moves/resizes a view
//! - `vswitch/set-workspace` switches the visible workspace

mod wayfire;

#[cfg(test)]
pub(crate) mod mock;

pub use wayfire::WayfireSocket;

use color_eyre::eyre::{self, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Event name for a newly mapped window
pub const VIEW_MAPPED: &str = "view-mapped";

/// Rectangle in compositor layout coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

/// Window descriptor sent by the compositor
#[derive(Debug, Clone, Deserialize)]
pub struct View {
    pub id: u64,
    /// Owning client process; Wayfire reports -1 when unknown
    #[serde(default = "unknown_pid")]
    pub pid: i64,
    #[serde(rename = "output-id", default)]
    pub output_id: u64,
    pub geometry: Geometry,
    #[serde(default)]
    pub title: String,
}

fn unknown_pid() -> i64 {
    -1
}

/// Usable area of an output
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Workarea {
    pub width: i64,
    pub height: i64,
}

/// Workspace grid position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct WorkspacePosition {
    pub x: i64,
    pub y: i64,
}

/// Output state needed to place views on other workspaces
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct OutputInfo {
    pub workarea: Workarea,
    pub workspace: WorkspacePosition,
}

/// Tagged message read from the compositor's event stream
#[derive(Debug, Clone)]
pub enum Message {
    /// A window was mapped; the only message that carries a view
    ViewMapped(View),
    /// Any other event, kept for logging only
    Other { event: String },
}

impl Message {
    /// Classify a raw event object by its `event` tag
    #[must_use]
    pub fn from_event(value: serde_json::Value) -> Self {
        let event = value
            .get("event")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();

        if event == VIEW_MAPPED
            && let Some(raw_view) = value.get("view")
        {
            match serde_json::from_value::<View>(raw_view.clone()) {
                Ok(view) => return Self::ViewMapped(view),
                Err(e) => debug!("Ignoring malformed view in {} event: {}", event, e),
            }
        }

        Self::Other { event }
    }
}

/// Operations the rotation controller needs from a compositor
///
/// `next_message` must be cancel safe: it is raced against the rotation
/// tick and signal handling in `tokio::select!`.
#[allow(async_fn_in_trait)]
pub trait Compositor {
    /// Human-readable backend name
    fn name(&self) -> &'static str;

    /// Subscribe to the given event types
    async fn watch(&mut self, events: &[&str]) -> Result<()>;

    /// Wait for the next event; `Ok(None)` means the connection closed
    async fn next_message(&mut self) -> Result<Option<Message>>;

    /// Query workarea and current workspace of an output
    async fn output_info(&mut self, output_id: u64) -> Result<OutputInfo>;

    /// Move and resize a view
    async fn configure_view(&mut self, view_id: u64, geometry: Geometry) -> Result<()>;

    /// Switch the visible workspace of an output
    async fn set_workspace(&mut self, x: i64, y: i64, output_id: u64) -> Result<()>;
}

/// Translate a display rectangle into layout coordinates on workspace
/// `(ws_x, ws_y)`, relative to the output's current workspace.
///
/// Workspaces are same-sized tiles of the workarea, so the target column
/// lies `ws_x - current.x` workarea widths away from the visible one.
#[must_use]
pub fn workspace_geometry(rect: Geometry, output: &OutputInfo, ws_x: i64, ws_y: i64) -> Geometry {
    let width = output.workarea.width;
    let height = output.workarea.height;

    Geometry {
        x: rect.x.rem_euclid(width) + width * (ws_x - output.workspace.x),
        y: rect.y.rem_euclid(height) + height * (ws_y - output.workspace.y),
        width: rect.width,
        height: rect.height,
    }
}

/// Place `view` with the fixed display rectangle on workspace column `workspace`
///
/// Safe to repeat: the target only depends on the output's workspace origin,
/// which placement itself does not change.
///
/// # Errors
/// Returns an error if the output query or the configure request fails,
/// or if the output reports an empty workarea.
pub async fn place<C: Compositor>(
    compositor: &mut C,
    view: &View,
    workspace: usize,
    rect: Geometry,
) -> Result<Geometry> {
    let output = compositor.output_info(view.output_id).await?;
    if output.workarea.width <= 0 || output.workarea.height <= 0 {
        eyre::bail!(
            "Output {} reports an empty workarea ({}x{})",
            view.output_id,
            output.workarea.width,
            output.workarea.height
        );
    }

    let ws_x = i64::try_from(workspace)?;
    let geometry = workspace_geometry(rect, &output, ws_x, 0);
    debug!(
        "Placing view {} ('{}') on workspace {} at {:?}",
        view.id, view.title, workspace, geometry
    );
    compositor.configure_view(view.id, geometry).await?;
    Ok(geometry)
}
