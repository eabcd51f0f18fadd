//! In-memory compositor for scheduler and placement tests

use color_eyre::eyre::Result;
use std::collections::{HashMap, VecDeque};

use super::{Compositor, Geometry, Message, OutputInfo, View, WorkspacePosition};

/// Scripted compositor: serves queued messages, then stays silent
pub(crate) struct MockCompositor {
    pub output: OutputInfo,
    pub queued: VecDeque<Message>,
    pub watched: Vec<String>,
    pub configured: Vec<(u64, Geometry)>,
    pub workspaces: Vec<(i64, i64, u64)>,
    /// Report a closed connection once the queue is empty
    pub close_when_drained: bool,
}

impl MockCompositor {
    pub fn new(output: OutputInfo) -> Self {
        Self {
            output,
            queued: VecDeque::new(),
            watched: Vec::new(),
            configured: Vec::new(),
            workspaces: Vec::new(),
            close_when_drained: false,
        }
    }

    pub fn push_mapped(&mut self, view: View) {
        self.queued.push_back(Message::ViewMapped(view));
    }

    pub fn push_other(&mut self, event: &str) {
        self.queued.push_back(Message::Other {
            event: event.to_string(),
        });
    }

    /// Final geometry of a view after all configure requests
    pub fn view_geometry(&self, view_id: u64) -> Option<Geometry> {
        let last: HashMap<u64, Geometry> = self.configured.iter().copied().collect();
        last.get(&view_id).copied()
    }
}

impl Compositor for MockCompositor {
    fn name(&self) -> &'static str {
        "Mock"
    }

    async fn watch(&mut self, events: &[&str]) -> Result<()> {
        self.watched.extend(events.iter().map(ToString::to_string));
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Option<Message>> {
        if let Some(msg) = self.queued.pop_front() {
            return Ok(Some(msg));
        }
        if self.close_when_drained {
            return Ok(None);
        }
        std::future::pending().await
    }

    async fn output_info(&mut self, _output_id: u64) -> Result<OutputInfo> {
        Ok(self.output)
    }

    async fn configure_view(&mut self, view_id: u64, geometry: Geometry) -> Result<()> {
        self.configured.push((view_id, geometry));
        Ok(())
    }

    async fn set_workspace(&mut self, x: i64, y: i64, output_id: u64) -> Result<()> {
        self.workspaces.push((x, y, output_id));
        self.output.workspace = WorkspacePosition { x, y };
        Ok(())
    }
}
