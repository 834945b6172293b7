//! Orbit interpolation and the background fetch unit.
//!
//! The render loop never talks to the network. A dedicated thread fetches a
//! [`Fix`] on a fixed cadence (backing off exponentially on failure), turns
//! consecutive fixes into angular rates, and publishes an [`OrbitEstimate`]
//! into an [`EstimateStore`]. The render loop copies the estimate out under
//! a read lock and extrapolates it to the current instant.
//!
//! # Ownership
//!
//! - [`EstimateStore`]: shared `Arc<RwLock<_>>`, one writer (the fetch
//!   thread), any number of readers. Each new interpolator claims the store;
//!   writes from an earlier claim are dropped under the write lock, so a
//!   detached thread finishing a slow fetch cannot roll the estimate back
//! - [`OrbitInterpolator`]: fetch + estimate update logic, owned by the thread
//! - [`FetchUnit`]: the running thread and its stop channel
//! - [`OrbitTracker`]: supervises the unit and restarts it when it stalls

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam_channel::{RecvTimeoutError, Sender};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::fix::{Fix, load_fix, save_fix};
use crate::settings::OrbitSettings;
use crate::source::PositionSource;

/// Fixes further apart than this are not used to derive rates.
///
/// One orbit takes about 92 minutes, so a longitude delta over a long gap is
/// ambiguous.
pub const MAX_RATE_GAP: Duration = Duration::from_secs(15 * 60);

/// Wrap a longitude (or delta) into `[-180, 180)`.
pub fn wrap_longitude(lon: f64) -> f64 {
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped >= 180.0 { wrapped - 360.0 } else { wrapped }
}

fn seconds_between(
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

// =============================================================================
// Backoff
// =============================================================================

/// Exponential retry delay: base, 2x base, 4x base, ... capped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    failures: u32,
}

impl Backoff {
    pub const fn new(
        base: Duration,
        cap: Duration,
    ) -> Self {
        Self { base, cap, failures: 0 }
    }

    /// Record a failure and return the delay before the next attempt.
    pub fn on_failure(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let factor = 1u32.checked_shl(self.failures - 1).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Record a success and return the regular cadence.
    pub const fn on_success(&mut self) -> Duration {
        self.failures = 0;
        self.base
    }

    #[inline]
    pub const fn failures(&self) -> u32 { self.failures }
}

// =============================================================================
// Estimate
// =============================================================================

/// Where the base fix of an estimate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseKind {
    /// Configured default; no observation yet.
    Fallback,
    /// Loaded from the state file at startup.
    Restored,
    /// Fetched by this process.
    Observed,
}

/// Best current knowledge of the station's motion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitEstimate {
    pub base: Fix,
    /// Degrees per second.
    pub lon_rate: f64,
    pub lat_rate: f64,
    /// Instant the base fix describes; extrapolation starts here.
    pub last_update: DateTime<Utc>,
    pub consecutive_failures: u32,
    pub kind: BaseKind,
    /// Wall-clock time of the last successful fetch.
    pub last_success: Option<DateTime<Utc>>,
}

/// Extrapolated position for one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_km: f64,
    pub speed_kmh: f64,
    /// Time since the base fix was observed.
    pub age: Duration,
}

impl OrbitEstimate {
    fn at_rest(
        base: Fix,
        kind: BaseKind,
    ) -> Self {
        Self {
            base,
            lon_rate: 0.0,
            lat_rate: 0.0,
            last_update: base.observed_at,
            consecutive_failures: 0,
            kind,
            last_success: None,
        }
    }

    /// Stationary estimate at the configured default position.
    pub fn fallback(default: Fix) -> Self { Self::at_rest(default, BaseKind::Fallback) }

    /// Stationary estimate from a saved fix; its age is preserved.
    pub fn restored(saved: Fix) -> Self { Self::at_rest(saved, BaseKind::Restored) }

    #[inline]
    pub fn is_fallback(&self) -> bool { self.kind == BaseKind::Fallback }

    /// Fold a new fix into the estimate.
    #[must_use]
    pub fn advance(
        &self,
        fix: Fix,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let fix = fix.carry_over(&self.base);
        let dt = seconds_between(self.last_update, fix.observed_at);

        let (lon_rate, lat_rate) = if self.kind != BaseKind::Observed || dt > MAX_RATE_GAP.as_secs_f64() {
            (0.0, 0.0)
        } else if dt <= 0.0 {
            (self.lon_rate, self.lat_rate)
        } else {
            let dlon = wrap_longitude(fix.longitude - self.base.longitude);
            let dlat = fix.latitude - self.base.latitude;
            (dlon / dt, dlat / dt)
        };

        Self {
            base: fix,
            lon_rate,
            lat_rate,
            last_update: fix.observed_at,
            consecutive_failures: 0,
            kind: BaseKind::Observed,
            last_success: Some(fetched_at),
        }
    }

    /// Linear extrapolation to `t`.
    pub fn position_at(
        &self,
        t: DateTime<Utc>,
        fallback_altitude_km: f64,
        fallback_speed_kmh: f64,
    ) -> Position {
        let dt = seconds_between(self.last_update, t);
        Position {
            latitude: (self.base.latitude + self.lat_rate * dt).clamp(-90.0, 90.0),
            longitude: wrap_longitude(self.base.longitude + self.lon_rate * dt),
            altitude_km: self.base.altitude_km.unwrap_or(fallback_altitude_km),
            speed_kmh: self.base.speed_kmh.unwrap_or(fallback_speed_kmh),
            age: (t - self.base.observed_at).to_std().unwrap_or(Duration::ZERO),
        }
    }
}

// =============================================================================
// Store
// =============================================================================

#[derive(Debug)]
struct Slot {
    estimate: OrbitEstimate,
    /// Claim that may write; bumped by every claim and revoke.
    writer: u64,
}

/// Shared, always-populated estimate.
#[derive(Debug, Clone)]
pub struct EstimateStore {
    inner: Arc<RwLock<Slot>>,
    fallback_altitude_km: f64,
    fallback_speed_kmh: f64,
}

impl EstimateStore {
    pub fn new(initial: OrbitEstimate) -> Self {
        Self {
            fallback_altitude_km: initial.base.altitude_km.unwrap_or(0.0),
            fallback_speed_kmh: initial.base.speed_kmh.unwrap_or(0.0),
            inner: Arc::new(RwLock::new(Slot { estimate: initial, writer: 0 })),
        }
    }

    /// Copy of the whole estimate, taken under one read lock.
    #[inline]
    pub fn snapshot(&self) -> OrbitEstimate { self.inner.read().estimate }

    /// Extrapolated position at `t`.
    pub fn estimate_at(
        &self,
        t: DateTime<Utc>,
    ) -> Position {
        self.snapshot().position_at(t, self.fallback_altitude_km, self.fallback_speed_kmh)
    }

    /// Take over as the only writer; earlier claims lose write access.
    fn claim(&self) -> u64 {
        let mut slot = self.inner.write();
        slot.writer = slot.writer.wrapping_add(1);
        slot.writer
    }

    /// Drop write access for every outstanding claim.
    fn revoke(&self) { self.claim(); }

    /// Apply `update` if `writer` still holds the claim.
    fn update(
        &self,
        writer: u64,
        update: impl FnOnce(&OrbitEstimate) -> OrbitEstimate,
    ) -> Option<OrbitEstimate> {
        let mut slot = self.inner.write();
        if slot.writer != writer {
            return None;
        }
        slot.estimate = update(&slot.estimate);
        Some(slot.estimate)
    }

    fn set_failures(
        &self,
        writer: u64,
        failures: u32,
    ) -> bool {
        let mut slot = self.inner.write();
        if slot.writer != writer {
            return false;
        }
        slot.estimate.consecutive_failures = failures;
        true
    }
}

// =============================================================================
// Interpolator
// =============================================================================

/// Fetch cadence, backoff and fallback parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitConfig {
    pub fetch_interval: Duration,
    pub backoff_cap: Duration,
    pub stale_after: Duration,
    /// Used until the first observation; must carry altitude and speed.
    pub default_fix: Fix,
    pub state_file: Option<PathBuf>,
}

impl OrbitConfig {
    pub fn from_settings(
        settings: &OrbitSettings,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            fetch_interval: settings.fetch_interval(),
            backoff_cap: settings.backoff_cap(),
            stale_after: settings.stale_after(),
            default_fix: Fix::new(settings.default_latitude, settings.default_longitude, now)
                .with_motion(settings.default_altitude_km, settings.default_speed_kmh),
            state_file: Some(settings.state_file.clone()),
        }
    }

    /// Initial estimate: the saved fix when there is one, otherwise the default.
    pub fn seed(&self) -> OrbitEstimate {
        match self.state_file.as_deref().and_then(load_fix) {
            Some(saved) => {
                info!(lat = saved.latitude, lon = saved.longitude, observed_at = %saved.observed_at, "restored last fix");
                OrbitEstimate::restored(saved.carry_over(&self.default_fix))
            }
            None => OrbitEstimate::fallback(self.default_fix),
        }
    }
}

/// Fetch-and-update logic; the fetch thread owns one of these.
///
/// Creating one claims the store, so only the newest interpolator writes.
pub struct OrbitInterpolator {
    source: Arc<dyn PositionSource>,
    store: EstimateStore,
    writer: u64,
    backoff: Backoff,
    state_file: Option<PathBuf>,
}

impl OrbitInterpolator {
    pub fn new(
        source: Arc<dyn PositionSource>,
        store: EstimateStore,
        config: &OrbitConfig,
    ) -> Self {
        Self {
            source,
            writer: store.claim(),
            store,
            backoff: Backoff::new(config.fetch_interval, config.backoff_cap),
            state_file: config.state_file.clone(),
        }
    }

    /// One fetch attempt. Returns the delay until the next one.
    pub fn fetch_and_update(
        &mut self,
        now: DateTime<Utc>,
    ) -> Duration {
        match self.source.fetch() {
            Ok(fix) => {
                let Some(next) = self.store.update(self.writer, |current| current.advance(fix, now)) else {
                    debug!(observed_at = %fix.observed_at, "superseded fetch unit, discarding fix");
                    return self.backoff.on_success();
                };
                debug!(
                    lat = next.base.latitude,
                    lon = next.base.longitude,
                    lon_rate = next.lon_rate,
                    lat_rate = next.lat_rate,
                    "estimate updated"
                );
                if let Some(path) = &self.state_file
                    && let Err(e) = save_fix(path, &next.base)
                {
                    warn!(path = %path.display(), error = %e, "could not save last fix");
                }
                self.backoff.on_success()
            }
            Err(e) => {
                let delay = self.backoff.on_failure();
                if !self.store.set_failures(self.writer, self.backoff.failures()) {
                    debug!(error = %e, "superseded fetch unit, ignoring failure");
                    return delay;
                }
                warn!(
                    error = %e,
                    failures = self.backoff.failures(),
                    retry_in_secs = delay.as_secs(),
                    "position fetch failed"
                );
                delay
            }
        }
    }

    /// Extrapolated position at `t`.
    pub fn estimate_at(
        &self,
        t: DateTime<Utc>,
    ) -> Position {
        self.store.estimate_at(t)
    }
}

// =============================================================================
// Fetch Unit
// =============================================================================

/// A running fetch thread.
pub struct FetchUnit {
    handle: Option<JoinHandle<()>>,
    stop: Sender<()>,
    started_at: DateTime<Utc>,
}

impl FetchUnit {
    /// Start the thread; the first fetch happens immediately.
    pub fn spawn(mut interpolator: OrbitInterpolator) -> io::Result<Self> {
        let (stop, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let handle = thread::Builder::new().name("orbit-fetch".into()).spawn(move || {
            debug!("fetch thread running");
            loop {
                let delay = interpolator.fetch_and_update(Utc::now());
                match stop_rx.recv_timeout(delay) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            debug!("fetch thread exiting");
        })?;
        Ok(Self { handle: Some(handle), stop, started_at: Utc::now() })
    }

    /// Thread still running.
    pub fn is_alive(&self) -> bool { self.handle.as_ref().is_some_and(|h| !h.is_finished()) }

    #[inline]
    pub const fn started_at(&self) -> DateTime<Utc> { self.started_at }

    /// Signal the thread and wait up to `timeout` for it to exit.
    ///
    /// Returns `false` if it did not exit in time; the thread is then left to
    /// finish its current fetch and exit on its own.
    pub fn stop(
        mut self,
        timeout: Duration,
    ) -> bool {
        let _ = self.stop.try_send(());
        let Some(handle) = self.handle.take() else {
            return true;
        };

        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!(timeout_ms = timeout.as_millis() as u64, "fetch thread did not stop in time, detaching");
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        if handle.join().is_err() {
            warn!("fetch thread had panicked");
        }
        true
    }
}

impl Drop for FetchUnit {
    fn drop(&mut self) {
        // Dropping the sender also disconnects the channel; this just wakes the thread sooner
        let _ = self.stop.try_send(());
    }
}

// =============================================================================
// Supervision
// =============================================================================

/// Liveness of the fetch unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrbitHealth {
    pub alive: bool,
    /// No successful fetch within the staleness threshold.
    pub stale: bool,
    pub consecutive_failures: u32,
    /// Time since the last success (or since the unit started, before any).
    pub since_success: Duration,
}

impl OrbitHealth {
    #[inline]
    pub const fn needs_restart(&self) -> bool { !self.alive || self.stale }
}

/// Owns the shared store and keeps a fetch unit running against it.
pub struct OrbitTracker {
    source: Arc<dyn PositionSource>,
    store: EstimateStore,
    config: OrbitConfig,
    unit: Option<FetchUnit>,
    created_at: DateTime<Utc>,
    restarts: u32,
}

impl OrbitTracker {
    /// Seed the store; the fetch thread is not started yet.
    pub fn new(
        source: Arc<dyn PositionSource>,
        config: OrbitConfig,
    ) -> Self {
        let store = EstimateStore::new(config.seed());
        Self { source, store, config, unit: None, created_at: Utc::now(), restarts: 0 }
    }

    /// Handle for readers.
    #[inline]
    pub const fn store(&self) -> &EstimateStore { &self.store }

    #[inline]
    pub const fn restarts(&self) -> u32 { self.restarts }

    fn interpolator(&self) -> OrbitInterpolator {
        OrbitInterpolator::new(Arc::clone(&self.source), self.store.clone(), &self.config)
    }

    pub fn start(&mut self) -> io::Result<()> {
        if self.unit.is_none() {
            self.unit = Some(FetchUnit::spawn(self.interpolator())?);
            info!("position fetch started");
        }
        Ok(())
    }

    pub fn health(
        &self,
        now: DateTime<Utc>,
    ) -> OrbitHealth {
        let estimate = self.store.snapshot();
        let started = self.unit.as_ref().map_or(self.created_at, FetchUnit::started_at);
        let reference = estimate.last_success.map_or(started, |t| t.max(started));
        let since_success = (now - reference).to_std().unwrap_or(Duration::ZERO);
        OrbitHealth {
            alive: self.unit.as_ref().is_some_and(FetchUnit::is_alive),
            stale: since_success > self.config.stale_after,
            consecutive_failures: estimate.consecutive_failures,
            since_success,
        }
    }

    /// Restart the unit if it is dead or stale. Returns whether it restarted.
    pub fn supervise(
        &mut self,
        now: DateTime<Utc>,
        join_timeout: Duration,
    ) -> io::Result<bool> {
        let health = self.health(now);
        if !health.needs_restart() {
            return Ok(false);
        }
        warn!(
            alive = health.alive,
            stale = health.stale,
            failures = health.consecutive_failures,
            since_success_secs = health.since_success.as_secs(),
            "fetch unit unhealthy, restarting"
        );
        self.stop(join_timeout);
        self.restarts += 1;
        self.start()?;
        Ok(true)
    }

    /// Stop the unit with a bounded join. Returns whether it exited in time.
    pub fn stop(
        &mut self,
        join_timeout: Duration,
    ) -> bool {
        self.store.revoke();
        self.unit.take().is_none_or(|unit| unit.stop(join_timeout))
    }
}

impl Drop for OrbitTracker {
    fn drop(&mut self) {
        if self.unit.is_some() {
            self.stop(Duration::ZERO);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use parking_lot::Mutex;
    use proptest::prelude::*;

    use super::*;
    use crate::error::FetchError;

    fn at(secs: i64) -> DateTime<Utc> { DateTime::from_timestamp(secs, 0).unwrap() }

    struct Scripted(Mutex<VecDeque<Result<Fix, FetchError>>>);

    impl Scripted {
        fn new(script: Vec<Result<Fix, FetchError>>) -> Arc<Self> { Arc::new(Self(Mutex::new(script.into()))) }
    }

    impl PositionSource for Scripted {
        fn fetch(&self) -> Result<Fix, FetchError> { self.0.lock().pop_front().unwrap_or(Err(FetchError::AllFailed(1))) }
    }

    fn fail() -> Result<Fix, FetchError> { Err(FetchError::AllFailed(1)) }

    fn config() -> OrbitConfig {
        OrbitConfig {
            fetch_interval: Duration::from_secs(30),
            backoff_cap: Duration::from_secs(300),
            stale_after: Duration::from_secs(300),
            default_fix: Fix::new(10.0, 20.0, at(0)).with_motion(420.0, 27_600.0),
            state_file: None,
        }
    }

    fn interpolator(script: Vec<Result<Fix, FetchError>>) -> OrbitInterpolator {
        let config = config();
        let store = EstimateStore::new(OrbitEstimate::fallback(config.default_fix));
        OrbitInterpolator::new(Scripted::new(script), store, &config)
    }

    // =========================================================================
    // Backoff
    // =========================================================================

    #[test]
    fn test_backoff_sequence() {
        let mut backoff = Backoff::new(Duration::from_secs(30), Duration::from_secs(300));
        let delays: Vec<u64> = (0..6).map(|_| backoff.on_failure().as_secs()).collect();
        assert_eq!(delays, vec![30, 60, 120, 240, 300, 300]);
        assert_eq!(backoff.on_success(), Duration::from_secs(30));
        assert_eq!(backoff.failures(), 0);
        assert_eq!(backoff.on_failure(), Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_never_overflows() {
        let mut backoff = Backoff::new(Duration::from_secs(30), Duration::from_secs(300));
        for _ in 0..100 {
            assert!(backoff.on_failure() <= Duration::from_secs(300));
        }
    }

    proptest! {
        #[test]
        fn prop_backoff_monotonic_and_capped(outcomes in proptest::collection::vec(any::<bool>(), 1..64)) {
            let base = Duration::from_secs(30);
            let cap = Duration::from_secs(300);
            let mut backoff = Backoff::new(base, cap);
            let mut previous: Option<Duration> = None;
            for ok in outcomes {
                if ok {
                    prop_assert_eq!(backoff.on_success(), base);
                    previous = None;
                } else {
                    let delay = backoff.on_failure();
                    prop_assert!(delay >= base);
                    prop_assert!(delay <= cap);
                    if let Some(prev) = previous {
                        prop_assert!(delay >= prev);
                    }
                    previous = Some(delay);
                }
            }
        }
    }

    // =========================================================================
    // Estimation
    // =========================================================================

    #[test]
    fn test_two_fixes_extrapolate() {
        let mut interp = interpolator(vec![Ok(Fix::new(0.0, 0.0, at(0))), Ok(Fix::new(0.0, 5.0, at(30)))]);
        interp.fetch_and_update(at(0));
        interp.fetch_and_update(at(30));

        let at_update = interp.estimate_at(at(30));
        assert!((at_update.longitude - 5.0).abs() < 1e-9);

        let later = interp.estimate_at(at(45));
        assert!((later.longitude - 7.5).abs() < 1e-9);
        assert!(later.latitude.abs() < 1e-9);
    }

    #[test]
    fn test_failure_delays_then_success() {
        let mut interp = interpolator(vec![fail(), fail(), fail(), Ok(Fix::new(1.0, 1.0, at(210)))]);
        let delays: Vec<u64> = (0..4).map(|i| interp.fetch_and_update(at(i)).as_secs()).collect();
        assert_eq!(delays, vec![30, 60, 120, 30]);
        assert_eq!(interp.store.snapshot().consecutive_failures, 0);
    }

    #[test]
    fn test_failures_keep_fallback() {
        let mut interp = interpolator(vec![fail(), fail()]);
        interp.fetch_and_update(at(5));
        interp.fetch_and_update(at(35));

        let estimate = interp.store.snapshot();
        assert!(estimate.is_fallback());
        assert_eq!(estimate.consecutive_failures, 2);
        let position = interp.estimate_at(at(100));
        assert!((position.latitude - 10.0).abs() < 1e-9);
        assert!((position.longitude - 20.0).abs() < 1e-9);
        assert!((position.altitude_km - 420.0).abs() < 1e-9);
    }

    #[test]
    fn test_failures_keep_last_estimate() {
        let mut interp = interpolator(vec![Ok(Fix::new(0.0, 0.0, at(0))), Ok(Fix::new(0.0, 1.0, at(30))), fail()]);
        interp.fetch_and_update(at(0));
        interp.fetch_and_update(at(30));
        let before = interp.store.snapshot();
        interp.fetch_and_update(at(60));
        let after = interp.store.snapshot();
        assert_eq!(after.base, before.base);
        assert!((after.lon_rate - before.lon_rate).abs() < 1e-12);
        assert_eq!(after.consecutive_failures, 1);
    }

    #[test]
    fn test_first_fix_has_zero_rates() {
        let mut interp = interpolator(vec![Ok(Fix::new(45.0, 100.0, at(1000)))]);
        interp.fetch_and_update(at(1000));
        let estimate = interp.store.snapshot();
        assert_eq!(estimate.lon_rate, 0.0);
        assert_eq!(estimate.lat_rate, 0.0);
        assert_eq!(estimate.kind, BaseKind::Observed);
        // Motion carried over from the default fix
        assert_eq!(estimate.base.altitude_km, Some(420.0));
    }

    #[test]
    fn test_antimeridian_crossing() {
        let mut interp = interpolator(vec![Ok(Fix::new(0.0, 179.0, at(0))), Ok(Fix::new(0.0, -179.0, at(30)))]);
        interp.fetch_and_update(at(0));
        interp.fetch_and_update(at(30));

        let estimate = interp.store.snapshot();
        assert!((estimate.lon_rate - 2.0 / 30.0).abs() < 1e-9);
        let later = interp.estimate_at(at(60));
        assert!((later.longitude + 177.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_positive_elapsed_keeps_rates() {
        let mut interp = interpolator(vec![
            Ok(Fix::new(0.0, 0.0, at(0))),
            Ok(Fix::new(0.0, 3.0, at(30))),
            Ok(Fix::new(0.0, 3.5, at(30))),
        ]);
        for t in [0, 30, 31] {
            interp.fetch_and_update(at(t));
        }
        let estimate = interp.store.snapshot();
        assert!((estimate.lon_rate - 0.1).abs() < 1e-9);
        assert!((estimate.base.longitude - 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_long_gap_resets_rates() {
        let mut interp = interpolator(vec![Ok(Fix::new(0.0, 0.0, at(0))), Ok(Fix::new(0.0, 1.0, at(30))), Ok(Fix::new(0.0, 50.0, at(3000)))]);
        for t in [0, 30, 3000] {
            interp.fetch_and_update(at(t));
        }
        assert_eq!(interp.store.snapshot().lon_rate, 0.0);
    }

    #[test]
    fn test_latitude_clamped_and_longitude_wrapped() {
        let estimate = OrbitEstimate {
            base: Fix::new(89.0, 170.0, at(0)),
            lon_rate: 1.0,
            lat_rate: 1.0,
            last_update: at(0),
            consecutive_failures: 0,
            kind: BaseKind::Observed,
            last_success: Some(at(0)),
        };
        let p = estimate.position_at(at(20), 420.0, 27_600.0);
        assert_eq!(p.latitude, 90.0);
        assert!((p.longitude + 170.0).abs() < 1e-9);
        assert_eq!(p.age, Duration::from_secs(20));
    }

    #[test]
    fn test_wrap_longitude() {
        assert_eq!(wrap_longitude(180.0), -180.0);
        assert_eq!(wrap_longitude(-180.0), -180.0);
        assert!((wrap_longitude(540.5) + 179.5).abs() < 1e-9);
        assert!((wrap_longitude(-190.0) - 170.0).abs() < 1e-9);
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    #[test]
    fn test_success_persists_and_seeds() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.state_file = Some(dir.path().join("iss.json"));

        let store = EstimateStore::new(config.seed());
        assert!(store.snapshot().is_fallback());

        let mut interp = OrbitInterpolator::new(Scripted::new(vec![Ok(Fix::new(12.0, 34.0, at(500)))]), store, &config);
        interp.fetch_and_update(at(500));

        let seeded = config.seed();
        assert_eq!(seeded.kind, BaseKind::Restored);
        assert_eq!(seeded.base.latitude, 12.0);
        assert_eq!(seeded.lon_rate, 0.0);
        assert_eq!(seeded.last_update, at(500));
    }

    #[test]
    fn test_restored_base_does_not_produce_rates() {
        let store = EstimateStore::new(OrbitEstimate::restored(Fix::new(0.0, 0.0, at(0)).with_motion(420.0, 27_600.0)));
        let mut interp = OrbitInterpolator::new(Scripted::new(vec![Ok(Fix::new(0.0, 2.0, at(30)))]), store, &config());
        interp.fetch_and_update(at(30));
        assert_eq!(interp.store.snapshot().lon_rate, 0.0);
    }

    // =========================================================================
    // Fetch Unit and Supervision
    // =========================================================================

    #[test]
    fn test_fetch_unit_runs_and_stops() {
        let config = config();
        let store = EstimateStore::new(OrbitEstimate::fallback(config.default_fix));
        let source = Scripted::new(vec![Ok(Fix::new(5.0, 6.0, at(10)))]);
        let unit = FetchUnit::spawn(OrbitInterpolator::new(source, store.clone(), &config)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while store.snapshot().is_fallback() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(store.snapshot().base.latitude, 5.0);
        assert!(unit.is_alive());
        assert!(unit.stop(Duration::from_secs(2)));
    }

    #[test]
    fn test_tracker_health_and_restart() {
        let mut tracker = OrbitTracker::new(Scripted::new(vec![fail()]), config());
        let now = Utc::now();

        let health = tracker.health(now);
        assert!(!health.alive);
        assert!(health.needs_restart());

        tracker.start().unwrap();
        assert!(tracker.health(Utc::now()).alive);
        assert!(!tracker.supervise(Utc::now(), Duration::from_secs(2)).unwrap());

        // Ten minutes without a success
        let later = Utc::now() + chrono::Duration::minutes(10);
        let health = tracker.health(later);
        assert!(health.stale);
        assert!(tracker.supervise(later, Duration::from_secs(2)).unwrap());
        assert_eq!(tracker.restarts(), 1);
        assert!(tracker.health(Utc::now()).alive);
        assert!(tracker.stop(Duration::from_secs(2)));
        assert!(!tracker.health(Utc::now()).alive);
    }

    /// First call blocks until released, later calls answer immediately.
    struct Stalling {
        calls: Mutex<u32>,
        release: crossbeam_channel::Receiver<()>,
    }

    impl PositionSource for Stalling {
        fn fetch(&self) -> Result<Fix, FetchError> {
            let call = {
                let mut calls = self.calls.lock();
                *calls += 1;
                *calls
            };
            if call == 1 {
                let _ = self.release.recv_timeout(Duration::from_secs(5));
                Ok(Fix::new(0.0, 10.0, at(1000)))
            } else {
                Ok(Fix::new(0.0, 15.0, at(1030)))
            }
        }
    }

    fn wait_for(
        store: &EstimateStore,
        done: impl Fn(&OrbitEstimate) -> bool,
    ) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if done(&store.snapshot()) {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_detached_unit_cannot_overwrite_newer_estimate() {
        let (release_tx, release) = crossbeam_channel::bounded(1);
        let source = Arc::new(Stalling { calls: Mutex::new(0), release });
        let mut tracker = OrbitTracker::new(source.clone(), config());
        tracker.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while *source.calls.lock() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        // First unit is stuck in its fetch; the replacement gets detached from it
        let later = Utc::now() + chrono::Duration::minutes(10);
        assert!(tracker.supervise(later, Duration::from_millis(20)).unwrap());
        assert!(wait_for(tracker.store(), |e| e.base.observed_at == at(1030)));

        release_tx.send(()).unwrap();
        thread::sleep(Duration::from_millis(100));

        let estimate = tracker.store().snapshot();
        assert_eq!(estimate.last_update, at(1030));
        assert!((estimate.base.longitude - 15.0).abs() < 1e-9);
        assert!(tracker.stop(Duration::from_secs(2)));
    }

    #[test]
    fn test_superseded_interpolator_is_ignored() {
        let config = config();
        let store = EstimateStore::new(OrbitEstimate::fallback(config.default_fix));
        let mut old = OrbitInterpolator::new(Scripted::new(vec![Ok(Fix::new(1.0, 1.0, at(10))), fail()]), store.clone(), &config);
        let mut new = OrbitInterpolator::new(Scripted::new(vec![Ok(Fix::new(2.0, 2.0, at(40)))]), store.clone(), &config);

        new.fetch_and_update(at(40));
        old.fetch_and_update(at(41));
        old.fetch_and_update(at(42));

        let estimate = store.snapshot();
        assert_eq!(estimate.base.latitude, 2.0);
        assert_eq!(estimate.consecutive_failures, 0);
    }
}
