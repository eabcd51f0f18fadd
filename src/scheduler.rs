//! Rotation controller
//!
//! Drives posters through launch, window mapping, timed rotation and
//! shutdown. Everything runs on one task: the loop waits on the
//! compositor, a one second tick, playback control requests and the
//! shutdown token, so a silent compositor never delays shutdown by more
//! than one tick.

use color_eyre::eyre::{self, Result};
use sd_notify::NotifyState;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::compositor::{self, Compositor, Geometry, Message, VIEW_MAPPED, View};
use crate::config::{Config, Viewers};
use crate::poster::Poster;
use crate::signals::Control;
use crate::supervisor::{self, ReapOutcome};

/// Ceiling of every wait in the control loop
pub const TICK: Duration = Duration::from_secs(1);

/// Controller phases, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Discovering,
    Launching,
    AwaitingMapping,
    Rotating,
    Draining,
    Terminated,
}

/// What the controller needs from the configuration
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub viewers: Viewers,
    pub rotation_interval: Option<Duration>,
    pub output_id: u64,
    pub poster_rect: Geometry,
    pub settle_delay: Duration,
    pub mapping_timeout: Option<Duration>,
    pub shutdown_timeout: Duration,
}

impl From<&Config> for SchedulerSettings {
    fn from(config: &Config) -> Self {
        Self {
            viewers: config.viewers.clone(),
            rotation_interval: config.rotation_interval(),
            output_id: config.kiosk.output_id,
            poster_rect: config.poster,
            settle_delay: config.timing.settle_delay,
            mapping_timeout: config.timing.mapping_timeout,
            shutdown_timeout: config.timing.shutdown_timeout,
        }
    }
}

/// A due workspace switch, as positions in the rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Switch {
    pub from: usize,
    pub to: usize,
}

/// Rotation timing over `slots` posters
///
/// The poster being shown decides how long it stays: its own duration when
/// it has one, otherwise the global interval. No interval means rotation is
/// disabled altogether.
#[derive(Debug, Clone)]
pub struct Rotation {
    current: usize,
    slots: usize,
    last_switch: Instant,
    interval: Option<Duration>,
    held: bool,
}

impl Rotation {
    #[must_use]
    pub fn new(slots: usize, interval: Option<Duration>, now: Instant) -> Self {
        Self {
            current: 0,
            slots,
            last_switch: now,
            interval,
            held: false,
        }
    }

    #[must_use]
    pub fn current(&self) -> usize {
        self.current
    }

    /// How long the current poster stays, given its own duration
    #[must_use]
    pub fn dwell(&self, duration: Option<u64>) -> Option<Duration> {
        let global = self.interval?;
        Some(
            duration
                .filter(|secs| *secs > 0)
                .map_or(global, Duration::from_secs),
        )
    }

    /// Advance if the current poster's time is up
    pub fn poll(&mut self, now: Instant, current_duration: Option<u64>) -> Option<Switch> {
        if self.held || self.slots < 2 {
            return None;
        }
        let dwell = self.dwell(current_duration)?;
        if now.saturating_duration_since(self.last_switch) < dwell {
            return None;
        }

        let from = self.current;
        self.current = (self.current + 1) % self.slots;
        self.last_switch = now;
        Some(Switch {
            from,
            to: self.current,
        })
    }

    /// Stop switching until `resume`
    pub fn hold(&mut self) {
        self.held = true;
    }

    /// Continue switching; the current poster gets a full dwell again
    pub fn resume(&mut self, now: Instant) {
        self.held = false;
        self.last_switch = now;
    }

    /// Drop a slot from the rotation
    ///
    /// Returns `true` when the removed slot was the one on screen; the next
    /// slot then becomes current with a fresh dwell.
    pub fn remove(&mut self, slot: usize, now: Instant) -> bool {
        self.slots = self.slots.saturating_sub(1);
        if slot < self.current {
            self.current -= 1;
            return false;
        }
        if slot > self.current {
            return false;
        }
        if self.current >= self.slots {
            self.current = 0;
        }
        self.last_switch = now;
        true
    }
}

/// Top-level control loop
pub struct Scheduler<C: Compositor> {
    compositor: C,
    posters: Vec<Poster>,
    settings: SchedulerSettings,
    shutdown: CancellationToken,
    controls: mpsc::UnboundedReceiver<Control>,
    phase: Phase,
    /// Positions of launched posters still waiting for their window
    pending: Vec<usize>,
}

impl<C: Compositor> Scheduler<C> {
    /// Create a scheduler for discovered posters
    #[must_use]
    pub fn new(
        compositor: C,
        posters: Vec<Poster>,
        settings: SchedulerSettings,
        shutdown: CancellationToken,
        controls: mpsc::UnboundedReceiver<Control>,
    ) -> Self {
        Self {
            compositor,
            posters,
            settings,
            shutdown,
            controls,
            phase: Phase::Discovering,
            pending: Vec::new(),
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn posters(&self) -> &[Poster] {
        &self.posters
    }

    /// Run all phases; viewers are always shut down before returning
    ///
    /// # Errors
    /// Returns an error if the compositor connection fails or no poster
    /// could be shown. Viewers are drained first.
    pub async fn run(&mut self) -> Result<()> {
        let result = self.drive().await;
        if let Err(e) = &result {
            error!("Rotation stopped: {:#}", e);
        }
        self.drain().await;
        result
    }

    async fn drive(&mut self) -> Result<()> {
        if self.posters.is_empty() {
            eyre::bail!("No posters to show");
        }

        // Subscribe first: a window mapped before the watch would never be placed
        self.compositor.watch(&[VIEW_MAPPED]).await?;
        self.launch_all().await;

        self.await_mapping().await?;
        if self.shutdown.is_cancelled() {
            return Ok(());
        }

        self.rotate().await
    }

    async fn launch_all(&mut self) {
        self.phase = Phase::Launching;
        for (pos, poster) in self.posters.iter_mut().enumerate() {
            if !poster.is_launched()
                && let Err(e) = poster.launch(&self.settings.viewers).await
            {
                error!("Skipping poster {}: {:#}", poster.index(), e);
                continue;
            }
            self.pending.push(pos);
        }
        info!(
            "{} of {} poster(s) launched",
            self.pending.len(),
            self.posters.len()
        );
    }

    fn all_mapped(&self) -> bool {
        self.pending.is_empty()
    }

    /// Place each poster's window as it appears
    ///
    /// Returns once every launched poster is mapped, was given up on, or
    /// shutdown was requested.
    async fn await_mapping(&mut self) -> Result<()> {
        self.phase = Phase::AwaitingMapping;
        notify_status("Waiting for poster windows");

        let started = Instant::now();
        let mut tick = tokio::time::interval(TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !self.all_mapped() {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => {
                    info!("Shutdown requested while waiting for windows");
                    return Ok(());
                }

                msg = self.compositor.next_message() => match msg? {
                    Some(Message::ViewMapped(view)) => self.on_view_mapped(&view).await?,
                    Some(Message::Other { event }) => trace!("Ignoring {} event", event),
                    None => eyre::bail!("{} connection closed", self.compositor.name()),
                },

                _ = tick.tick() => {
                    self.drop_exited();
                    if let Some(timeout) = self.settings.mapping_timeout
                        && started.elapsed() >= timeout
                    {
                        self.abandon_pending(timeout);
                    }
                }
            }
        }

        info!("All posters mapped");
        if let Err(e) = sd_notify::notify(false, &[NotifyState::Ready]) {
            debug!("sd_notify READY failed: {}", e);
        }
        Ok(())
    }

    async fn on_view_mapped(&mut self, view: &View) -> Result<()> {
        let Some(slot) = self
            .pending
            .iter()
            .position(|&pos| self.posters[pos].is_wayfire_view(view))
        else {
            debug!("View {} (pid {}) is not a pending poster", view.id, view.pid);
            return Ok(());
        };
        let pos = self.pending[slot];
        let workspace = self.posters[pos].index();

        info!("Move '{}' to workspace {}", view.title, workspace);
        tokio::time::sleep(self.settings.settle_delay).await;
        // Second placement catches clients that resize themselves right after mapping
        compositor::place(&mut self.compositor, view, workspace, self.settings.poster_rect).await?;
        compositor::place(&mut self.compositor, view, workspace, self.settings.poster_rect).await?;

        self.posters[pos].mark_mapped();
        self.pending.remove(slot);
        Ok(())
    }

    /// Forget pending posters whose viewer already exited
    fn drop_exited(&mut self) {
        let posters = &mut self.posters;
        self.pending.retain(|&pos| {
            let alive = posters[pos].has_live_process();
            if !alive {
                warn!(
                    "Viewer for poster {} ({:?}) exited before its window appeared",
                    posters[pos].index(),
                    posters[pos].filepath()
                );
            }
            alive
        });
    }

    /// Stop waiting for the remaining windows; their viewers are terminated
    fn abandon_pending(&mut self, timeout: Duration) {
        for pos in self.pending.drain(..) {
            let poster = &mut self.posters[pos];
            warn!(
                "No window for poster {} ({:?}) after {:?}; leaving it out",
                poster.index(),
                poster.filepath(),
                timeout
            );
            if let Err(e) = poster.terminate() {
                warn!("{:#}", e);
            }
        }
    }

    /// Steady state: switch workspaces on schedule until shutdown
    async fn rotate(&mut self) -> Result<()> {
        self.phase = Phase::Rotating;

        let mut active: Vec<usize> = (0..self.posters.len())
            .filter(|&pos| self.posters[pos].is_mapped())
            .collect();
        if active.is_empty() {
            eyre::bail!("No poster window appeared");
        }

        let mut rotation = Rotation::new(active.len(), self.settings.rotation_interval, Instant::now());
        match self.settings.rotation_interval {
            Some(interval) => info!("Rotating {} poster(s), interval {:?}", active.len(), interval),
            None => info!("Rotation disabled, showing poster {}", self.posters[active[0]].index()),
        }

        self.show(active[0]).await?;
        if let Err(e) = self.posters[active[0]].start_playback().await {
            error!("Failed to start poster {}: {:#}", self.posters[active[0]].index(), e);
        }

        let mut tick = tokio::time::interval(TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => {}

                msg = self.compositor.next_message() => match msg? {
                    Some(msg) => debug!("Compositor message: {:?}", msg),
                    None => eyre::bail!("{} connection closed", self.compositor.name()),
                },

                Some(control) = self.controls.recv() => {
                    let current = active[rotation.current()];
                    self.apply_control(control, &mut rotation, current).await;
                }

                // Scheduled instants keep the switch times on the tick grid
                now = tick.tick() => {
                    if self.retire_exited(&mut active, &mut rotation, now)? {
                        let current = active[rotation.current()];
                        self.show(current).await?;
                        if let Err(e) = self.posters[current].start_playback().await {
                            error!("Failed to start poster {}: {:#}", self.posters[current].index(), e);
                        }
                    }
                    let current = active[rotation.current()];
                    if let Some(switch) = rotation.poll(now, self.posters[current].duration()) {
                        self.switch(active[switch.from], active[switch.to]).await?;
                    }
                }
            }

            if self.shutdown.is_cancelled() {
                info!("Shutdown requested");
                return Ok(());
            }
        }
    }

    /// Take posters whose viewer died out of the rotation
    ///
    /// Returns whether the poster on screen was among them.
    fn retire_exited(&mut self, active: &mut Vec<usize>, rotation: &mut Rotation, now: Instant) -> Result<bool> {
        let mut current_changed = false;
        let mut slot = 0;
        while slot < active.len() {
            let poster = &mut self.posters[active[slot]];
            if poster.release_if_exited() {
                warn!(
                    "Viewer for poster {} ({:?}) exited; leaving it out of rotation",
                    poster.index(),
                    poster.filepath()
                );
                active.remove(slot);
                current_changed |= rotation.remove(slot, now);
            } else {
                slot += 1;
            }
        }

        if active.is_empty() {
            eyre::bail!("All poster viewers exited");
        }
        Ok(current_changed)
    }

    async fn switch(&mut self, from: usize, to: usize) -> Result<()> {
        debug!(
            "Switching poster {} -> {}",
            self.posters[from].index(),
            self.posters[to].index()
        );
        self.show(to).await?;

        if let Err(e) = self.posters[from].stop_playback().await {
            error!("Failed to stop poster {}: {:#}", self.posters[from].index(), e);
        }
        if let Err(e) = self.posters[to].start_playback().await {
            error!("Failed to start poster {}: {:#}", self.posters[to].index(), e);
        }
        Ok(())
    }

    async fn show(&mut self, pos: usize) -> Result<()> {
        let workspace = i64::try_from(self.posters[pos].index())?;
        self.compositor
            .set_workspace(workspace, 0, self.settings.output_id)
            .await?;
        notify_status(&format!("Showing {}", self.posters[pos].filepath().display()));
        Ok(())
    }

    async fn apply_control(&mut self, control: Control, rotation: &mut Rotation, current: usize) {
        let poster = &self.posters[current];
        let result = match control {
            Control::Pause => {
                info!("Pausing poster {}", poster.index());
                rotation.hold();
                poster.pause_playback().await
            }
            Control::Resume => {
                info!("Resuming poster {}", poster.index());
                rotation.resume(Instant::now());
                poster.start_playback().await
            }
        };
        if let Err(e) = result {
            error!("{:?} of poster {} failed: {:#}", control, poster.index(), e);
        }
    }

    async fn drain(&mut self) {
        self.phase = Phase::Draining;
        if let Err(e) = sd_notify::notify(false, &[NotifyState::Stopping]) {
            debug!("sd_notify STOPPING failed: {}", e);
        }

        match supervisor::shutdown(&mut self.posters, self.settings.shutdown_timeout).await {
            ReapOutcome::Graceful => info!("All viewers stopped"),
            ReapOutcome::Forced { killed } => warn!("Killed {} viewer(s) after timeout", killed),
        }
        self.phase = Phase::Terminated;
    }
}

fn notify_status(status: &str) {
    if let Err(e) = sd_notify::notify(false, &[NotifyState::Status(status)]) {
        debug!("sd_notify STATUS failed: {}", e);
    }
}
