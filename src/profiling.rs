//! Cycle timing and counters, summarized to the log once per interval.
//!
//! # Usage
//!
//! ```ignore
//! let mut metrics = CycleMetrics::new(Duration::from_secs(60));
//!
//! // In the render loop:
//! let cycle_start = Instant::now();
//! // ... compose ...
//! let render_time = cycle_start.elapsed();
//! // ... transport write ...
//! metrics.record_cycle(cycle_start.elapsed(), render_time, write_time);
//! metrics.maybe_log(Instant::now(), &hud);
//! ```

use std::time::{Duration, Instant};

use globe_common::HudCompositor;
use globe_common::format::push_u32;
use heapless::String;

/// Frame timing and recovery statistics.
pub struct CycleMetrics {
    // Cycle timing (microseconds)
    /// Last full cycle time (compose + write)
    pub cycle_time_us: u32,
    /// Time spent composing the frame in memory
    pub render_time_us: u32,
    /// Time spent in the transport write
    pub write_time_us: u32,

    pub cycle_time_min_us: u32,
    pub cycle_time_max_us: u32,
    cycle_time_avg_us: f32,
    write_time_avg_us: f32,

    // Counters
    /// Cycles completed since startup (successful or not)
    pub total_cycles: u64,
    pub transport_errors: u64,
    pub light_reinits: u32,
    pub full_reinits: u32,
    pub fetch_restarts: u32,

    // Summary window
    interval: Duration,
    window_start: Instant,
    window_cycles: u64,
    window_hud_renders: u32,

    start_time: Instant,
}

impl CycleMetrics {
    /// Exponential moving average alpha (0.1 for smooth updates).
    const EMA_ALPHA: f32 = 0.1;

    /// Create new metrics, starting the uptime timer.
    pub fn new(interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            cycle_time_us: 0,
            render_time_us: 0,
            write_time_us: 0,
            cycle_time_min_us: u32::MAX,
            cycle_time_max_us: 0,
            cycle_time_avg_us: 0.0,
            write_time_avg_us: 0.0,
            total_cycles: 0,
            transport_errors: 0,
            light_reinits: 0,
            full_reinits: 0,
            fetch_restarts: 0,
            interval,
            window_start: now,
            window_cycles: 0,
            window_hud_renders: 0,
            start_time: now,
        }
    }

    /// Record timing for one cycle.
    pub fn record_cycle(
        &mut self,
        total_time: Duration,
        render_time: Duration,
        write_time: Duration,
    ) {
        let total_us = total_time.as_micros() as u32;
        let write_us = write_time.as_micros() as u32;

        self.cycle_time_us = total_us;
        self.render_time_us = render_time.as_micros() as u32;
        self.write_time_us = write_us;

        self.cycle_time_min_us = self.cycle_time_min_us.min(total_us);
        self.cycle_time_max_us = self.cycle_time_max_us.max(total_us);

        if self.total_cycles == 0 {
            self.cycle_time_avg_us = total_us as f32;
            self.write_time_avg_us = write_us as f32;
        } else {
            self.cycle_time_avg_us = ema(self.cycle_time_avg_us, total_us);
            self.write_time_avg_us = ema(self.write_time_avg_us, write_us);
        }

        self.total_cycles += 1;
        self.window_cycles += 1;
    }

    #[inline]
    pub const fn cycle_time_avg_us(&self) -> u32 { self.cycle_time_avg_us as u32 }

    #[inline]
    pub const fn write_time_avg_us(&self) -> u32 { self.write_time_avg_us as u32 }

    #[inline]
    pub fn uptime(&self) -> Duration { self.start_time.elapsed() }

    /// Format uptime as HH:MM:SS.
    pub fn uptime_string(&self) -> String<12> { hms(self.uptime().as_secs()) }

    /// Log a summary if the interval has elapsed, then start a new window.
    ///
    /// Returns whether a summary was written.
    pub fn maybe_log(
        &mut self,
        now: Instant,
        hud: &HudCompositor,
    ) -> bool {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.interval {
            return false;
        }

        let fps = self.window_cycles as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        let hud_renders = hud.render_calls().saturating_sub(self.window_hud_renders);
        tracing::info!(
            uptime = %self.uptime_string(),
            fps = format_args!("{fps:.1}"),
            avg_cycle_us = self.cycle_time_avg_us(),
            min_cycle_us = self.cycle_time_min_us,
            max_cycle_us = self.cycle_time_max_us,
            avg_write_us = self.write_time_avg_us(),
            hud_renders,
            hud_formats = hud.format_calls(),
            transport_errors = self.transport_errors,
            light_reinits = self.light_reinits,
            full_reinits = self.full_reinits,
            fetch_restarts = self.fetch_restarts,
            "render summary"
        );

        self.window_start = now;
        self.window_cycles = 0;
        self.window_hud_renders = hud.render_calls();
        true
    }
}

fn ema(
    avg: f32,
    sample_us: u32,
) -> f32 {
    CycleMetrics::EMA_ALPHA.mul_add(sample_us as f32, (1.0 - CycleMetrics::EMA_ALPHA) * avg)
}

fn hms(secs: u64) -> String<12> {
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    let mut s = String::new();
    for (i, part) in [hours, mins, secs].into_iter().enumerate() {
        if i > 0 {
            s.push(':').ok();
        }
        if part < 10 {
            s.push('0').ok();
        }
        push_u32(&mut s, part as u32);
    }
    s
}

#[cfg(test)]
mod tests {
    use globe_common::styles::HudTheme;

    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = CycleMetrics::new(Duration::from_secs(60));
        assert_eq!(metrics.total_cycles, 0);
        assert_eq!(metrics.cycle_time_min_us, u32::MAX);
        assert_eq!(metrics.cycle_time_max_us, 0);
    }

    #[test]
    fn test_record_cycle() {
        let mut metrics = CycleMetrics::new(Duration::from_secs(60));
        metrics.record_cycle(Duration::from_micros(20000), Duration::from_micros(4000), Duration::from_micros(16000));
        metrics.record_cycle(Duration::from_micros(10000), Duration::from_micros(4000), Duration::from_micros(6000));
        metrics.record_cycle(Duration::from_micros(30000), Duration::from_micros(4000), Duration::from_micros(26000));

        assert_eq!(metrics.total_cycles, 3);
        assert_eq!(metrics.cycle_time_us, 30000);
        assert_eq!(metrics.write_time_us, 26000);
        assert_eq!(metrics.cycle_time_min_us, 10000);
        assert_eq!(metrics.cycle_time_max_us, 30000);
        // 20000 -> 19000 -> 20100
        assert!(metrics.cycle_time_avg_us().abs_diff(20100) <= 1);
    }

    #[test]
    fn test_hms() {
        assert_eq!(hms(0).as_str(), "00:00:00");
        assert_eq!(hms(3 * 3600 + 25 * 60 + 7).as_str(), "03:25:07");
        assert_eq!(hms(100 * 3600).as_str(), "100:00:00");
    }

    #[test]
    fn test_summary_respects_interval() {
        let hud = Box::new(HudCompositor::new(&HudTheme::default()));
        let mut metrics = CycleMetrics::new(Duration::from_secs(60));
        let start = metrics.window_start;

        assert!(!metrics.maybe_log(start + Duration::from_secs(30), &hud));
        metrics.record_cycle(Duration::from_millis(50), Duration::from_millis(10), Duration::from_millis(40));
        assert!(metrics.maybe_log(start + Duration::from_secs(60), &hud));
        assert_eq!(metrics.window_cycles, 0);
        assert!(!metrics.maybe_log(start + Duration::from_secs(90), &hud));
    }
}
