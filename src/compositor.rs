//! Render cycle and display recovery state machine.
//!
//! ```text
//! Initializing -> Running <-> ErrorRecovering -> ShuttingDown -> Stopped
//! ```
//!
//! Each cycle copies the current rotation frame into the working buffer,
//! draws the marker at the extrapolated position, patches in the HUD bars and
//! writes the result. Transport errors and the reinit schedule both feed the
//! same recovery transition; only exhausting the hard threshold is fatal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use globe_common::marker::MarkerStyle;
use globe_common::raster::Raster;
use globe_common::{GeoPoint, HudCompositor, SCREEN_HEIGHT, SCREEN_WIDTH, Telemetry, draw_marker};
use tracing::{debug, error, info, warn};

use crate::error::{CompositorError, InitError, TransportError};
use crate::frames::FrameStore;
use crate::orbit::{OrbitTracker, Position};
use crate::profiling::CycleMetrics;
use crate::settings::{RecoverySettings, Settings};
use crate::supervisor::Notifier;
use crate::transport::{CloseGuard, DisplayTransport, ReinitMode};

// =============================================================================
// Policy
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositorState {
    Initializing,
    Running,
    ErrorRecovering,
    ShuttingDown,
    Stopped,
}

impl CompositorState {
    /// Status line reported to the service manager.
    pub const fn status_line(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::ErrorRecovering => "recovering display",
            Self::ShuttingDown => "shutting down",
            Self::Stopped => "stopped",
        }
    }
}

/// Thresholds and schedules for recovery and housekeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    /// Errors since the last recovery that trigger a light reinit.
    pub soft_threshold: u32,
    /// Consecutive failed cycles that end the process.
    pub hard_threshold: u32,
    pub light_interval: Duration,
    pub full_interval: Duration,
    pub supervision_interval: Duration,
    pub watchdog_interval: Duration,
    pub join_timeout: Duration,
    pub stats_interval: Duration,
}

impl RecoveryPolicy {
    pub const fn from_settings(settings: &RecoverySettings) -> Self {
        Self {
            soft_threshold: settings.soft_error_threshold,
            hard_threshold: settings.hard_error_threshold,
            light_interval: settings.light_reinit_interval(),
            full_interval: settings.full_reinit_interval(),
            supervision_interval: settings.supervision_interval(),
            watchdog_interval: settings.watchdog_interval(),
            join_timeout: settings.join_timeout(),
            stats_interval: settings.stats_interval(),
        }
    }
}

impl Default for RecoveryPolicy {
    fn default() -> Self { Self::from_settings(&RecoverySettings::default()) }
}

/// What to do after a transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorVerdict {
    Continue,
    Recover,
    Fatal,
}

/// Error streaks and reinit timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayHealth {
    /// Failed cycles since the last successful write.
    pub consecutive_errors: u32,
    /// Failed cycles since the last successful write or recovery.
    pub errors_since_recovery: u32,
    pub last_light_reinit: Instant,
    pub last_full_reinit: Instant,
}

impl DisplayHealth {
    pub const fn new(now: Instant) -> Self {
        Self { consecutive_errors: 0, errors_since_recovery: 0, last_light_reinit: now, last_full_reinit: now }
    }

    pub fn record_error(
        &mut self,
        policy: &RecoveryPolicy,
    ) -> ErrorVerdict {
        self.consecutive_errors += 1;
        self.errors_since_recovery += 1;
        if self.consecutive_errors >= policy.hard_threshold {
            ErrorVerdict::Fatal
        } else if self.errors_since_recovery >= policy.soft_threshold {
            ErrorVerdict::Recover
        } else {
            ErrorVerdict::Continue
        }
    }

    pub const fn record_success(&mut self) {
        self.consecutive_errors = 0;
        self.errors_since_recovery = 0;
    }

    pub const fn record_recovery(&mut self) { self.errors_since_recovery = 0; }

    /// Scheduled reinit due at `now`, if any. A due full reinit wins.
    pub fn maintenance_due(
        &self,
        now: Instant,
        policy: &RecoveryPolicy,
    ) -> Option<ReinitMode> {
        if now.saturating_duration_since(self.last_full_reinit) >= policy.full_interval {
            Some(ReinitMode::Full)
        } else if now.saturating_duration_since(self.last_light_reinit) >= policy.light_interval {
            Some(ReinitMode::Light)
        } else {
            None
        }
    }

    pub const fn mark_reinit(
        &mut self,
        mode: ReinitMode,
        now: Instant,
    ) {
        self.last_light_reinit = now;
        if matches!(mode, ReinitMode::Full) {
            self.last_full_reinit = now;
        }
    }
}

// =============================================================================
// Compositor
// =============================================================================

/// Owns the working buffer and drives one display.
pub struct FrameCompositor<T: DisplayTransport> {
    state: CompositorState,
    frames: FrameStore,
    working: Box<[u8]>,
    step: usize,
    tracker: OrbitTracker,
    hud: Box<HudCompositor>,
    marker: MarkerStyle,
    orbit_scale: f32,
    transport: CloseGuard<T>,
    notifier: Notifier,
    policy: RecoveryPolicy,
    health: DisplayHealth,
    metrics: CycleMetrics,
    last_supervision: Instant,
    last_watchdog: Instant,
}

impl<T: DisplayTransport> FrameCompositor<T> {
    /// Assemble the pipeline. Nothing runs until [`start`](Self::start).
    pub fn new(
        frames: FrameStore,
        transport: T,
        tracker: OrbitTracker,
        notifier: Notifier,
        settings: &Settings,
    ) -> Result<Self, InitError> {
        // Close even if assembly fails below
        let transport = CloseGuard::new(transport);
        if frames.is_empty() {
            return Err(InitError::Frames("no rotation frames".into()));
        }
        let working = frames.frame(0).pixels().to_vec().into_boxed_slice();
        let policy = RecoveryPolicy::from_settings(&settings.recovery);
        let now = Instant::now();

        Ok(Self {
            state: CompositorState::Initializing,
            frames,
            working,
            step: 0,
            tracker,
            hud: Box::new(HudCompositor::new(&settings.theme)),
            marker: settings.marker,
            orbit_scale: settings.globe.orbit_scale,
            transport,
            notifier,
            policy,
            health: DisplayHealth::new(now),
            metrics: CycleMetrics::new(policy.stats_interval),
            last_supervision: now,
            last_watchdog: now,
        })
    }

    #[inline]
    pub const fn state(&self) -> CompositorState { self.state }

    #[inline]
    pub const fn health(&self) -> &DisplayHealth { &self.health }

    #[inline]
    pub const fn metrics(&self) -> &CycleMetrics { &self.metrics }

    #[inline]
    pub fn hud(&self) -> &HudCompositor { &self.hud }

    #[inline]
    pub fn transport(&self) -> &T { &self.transport }

    #[inline]
    pub fn transport_mut(&mut self) -> &mut T { &mut self.transport }

    #[inline]
    pub const fn tracker(&self) -> &OrbitTracker { &self.tracker }

    /// Last composed frame.
    #[inline]
    pub fn working_buffer(&self) -> &[u8] { &self.working }

    /// Next rotation step to be shown.
    #[inline]
    pub const fn step(&self) -> usize { self.step }

    /// Start the fetch thread and report readiness.
    pub fn start(&mut self) -> Result<(), InitError> {
        self.tracker.start().map_err(InitError::Thread)?;
        let now = Instant::now();
        self.health = DisplayHealth::new(now);
        self.last_supervision = now;
        self.last_watchdog = now;
        self.enter(CompositorState::Running);
        self.notifier.ready();
        info!(frames = self.frames.len(), "render loop running");
        Ok(())
    }

    /// Run cycles until `stop` is set or a fatal error occurs, then shut down.
    pub fn run(
        &mut self,
        stop: &AtomicBool,
    ) -> Result<(), CompositorError> {
        if self.state == CompositorState::Initializing {
            self.start()?;
        }
        let result = loop {
            if stop.load(Ordering::Relaxed) {
                info!("stop requested");
                break Ok(());
            }
            if let Err(e) = self.tick(Instant::now(), Utc::now()) {
                error!(error = %e, "render loop failed");
                break Err(e);
            }
        };
        self.shutdown();
        result
    }

    /// One loop iteration: maintenance, a render cycle, housekeeping.
    pub fn tick(
        &mut self,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Result<(), CompositorError> {
        self.maintain(now)?;
        self.cycle(wall)?;
        self.supervise(now, wall);
        self.keep_alive(now);
        self.metrics.maybe_log(now, &self.hud);
        Ok(())
    }

    // =========================================================================
    // Render cycle
    // =========================================================================

    /// Compose and write one frame.
    pub fn cycle(
        &mut self,
        wall: DateTime<Utc>,
    ) -> Result<(), CompositorError> {
        let started = Instant::now();

        let frame = self.frames.frame(self.step);
        self.working.copy_from_slice(frame.pixels());

        let position = self.tracker.store().estimate_at(wall);
        let point = GeoPoint::new(position.latitude as f32, position.longitude as f32);
        if let Some(mut raster) = Raster::new(&mut self.working, SCREEN_WIDTH as usize, SCREEN_HEIGHT as usize) {
            draw_marker(&mut raster, &frame.projection, point, self.orbit_scale, &self.marker);
        }

        self.hud.update(&telemetry(point, &position));
        self.hud.patch_into(&mut self.working);

        let render_time = started.elapsed();
        let write_started = Instant::now();
        let result = self.transport.write(&self.working);
        self.metrics.record_cycle(started.elapsed(), render_time, write_started.elapsed());
        self.step = (self.step + 1) % self.frames.len();

        match result {
            Ok(()) => {
                if self.health.consecutive_errors > 0 {
                    info!(errors = self.health.consecutive_errors, "display writes recovered");
                }
                self.health.record_success();
                self.enter(CompositorState::Running);
                Ok(())
            }
            Err(e) => self.on_transport_error(e, Instant::now()),
        }
    }

    fn on_transport_error(
        &mut self,
        err: TransportError,
        now: Instant,
    ) -> Result<(), CompositorError> {
        self.metrics.transport_errors += 1;
        match self.health.record_error(&self.policy) {
            ErrorVerdict::Fatal => Err(CompositorError::TooManyTransportErrors {
                count: self.health.consecutive_errors,
                last: err,
            }),
            ErrorVerdict::Recover => {
                warn!(error = %err, errors = self.health.consecutive_errors, "entering display recovery");
                self.enter(CompositorState::ErrorRecovering);
                match self.reinit(ReinitMode::Light, now) {
                    Ok(()) => {
                        self.health.record_recovery();
                        self.enter(CompositorState::Running);
                    }
                    Err(e) => warn!(error = %e, "light reinit failed"),
                }
                Ok(())
            }
            ErrorVerdict::Continue => {
                warn!(error = %err, errors = self.health.consecutive_errors, "frame write failed");
                Ok(())
            }
        }
    }

    fn reinit(
        &mut self,
        mode: ReinitMode,
        now: Instant,
    ) -> Result<(), TransportError> {
        self.health.mark_reinit(mode, now);
        match mode {
            ReinitMode::Light => self.metrics.light_reinits += 1,
            ReinitMode::Full => self.metrics.full_reinits += 1,
        }
        self.transport.reinit(mode)
    }

    // =========================================================================
    // Housekeeping
    // =========================================================================

    /// Run the scheduled reinit if one is due.
    pub fn maintain(
        &mut self,
        now: Instant,
    ) -> Result<(), CompositorError> {
        let Some(mut mode) = self.health.maintenance_due(now, &self.policy) else {
            return Ok(());
        };
        if mode == ReinitMode::Light && !self.transport.probe() {
            warn!("display probe failed, escalating to full reinit");
            mode = ReinitMode::Full;
        }

        info!(%mode, "scheduled display reinit");
        let previous = self.state;
        self.enter(CompositorState::ErrorRecovering);
        match self.reinit(mode, now) {
            Ok(()) => {
                self.enter(previous);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, %mode, "scheduled reinit failed");
                self.on_transport_error(e, now)
            }
        }
    }

    /// Restart the fetch unit if it is dead or stale.
    pub fn supervise(
        &mut self,
        now: Instant,
        wall: DateTime<Utc>,
    ) {
        if now.saturating_duration_since(self.last_supervision) < self.policy.supervision_interval {
            return;
        }
        self.last_supervision = now;
        match self.tracker.supervise(wall, self.policy.join_timeout) {
            Ok(true) => self.metrics.fetch_restarts += 1,
            Ok(false) => {}
            Err(e) => error!(error = %e, "fetch thread could not be restarted"),
        }
    }

    fn keep_alive(
        &mut self,
        now: Instant,
    ) {
        if self.notifier.is_enabled()
            && now.saturating_duration_since(self.last_watchdog) >= self.policy.watchdog_interval
        {
            self.last_watchdog = now;
            self.notifier.watchdog();
        }
    }

    /// Stop the fetch thread and close the display. Idempotent.
    pub fn shutdown(&mut self) {
        if self.state == CompositorState::Stopped {
            return;
        }
        self.enter(CompositorState::ShuttingDown);
        if !self.tracker.stop(self.policy.join_timeout) {
            warn!("fetch thread still running at shutdown");
        }
        self.notifier.stopping();
        self.transport.close();
        debug!(cycles = self.metrics.total_cycles, uptime = %self.metrics.uptime_string(), "compositor stopped");
        self.state = CompositorState::Stopped;
    }

    /// Move to `state`, reporting changes to the service manager.
    fn enter(
        &mut self,
        state: CompositorState,
    ) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "compositor state");
            self.notifier.status(state.status_line());
            self.state = state;
        }
    }
}

fn telemetry(
    point: GeoPoint,
    position: &Position,
) -> Telemetry {
    Telemetry {
        position: point,
        altitude_km: position.altitude_km as f32,
        speed_kmh: position.speed_kmh as f32,
        age_secs: u32::try_from(position.age.as_secs()).unwrap_or(u32::MAX),
    }
}
