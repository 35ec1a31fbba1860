//! Time management for the federation
//!
//! The federation advances a shared logical clock in fixed steps. The
//! manager requests `current + step` from the bus and only moves its own
//! clock when the grant arrives. This module owns that clock state together
//! with the pause schedule, the federation end time and real-time pacing.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// Longest single sleep while pacing against the wall clock
pub const MAX_PACING_SLICE: Duration = Duration::from_secs(1);

/// Totally ordered wrapper around a simulated time value
///
/// Used as a key in ordered collections (pause set, injection table).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeKey(pub f64);

impl PartialEq for TimeKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for TimeKey {}

impl PartialOrd for TimeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Manages the federation's logical clock
///
/// # Example
/// ```
/// use federation_manager_core_rs::TimeManager;
///
/// let mut time = TimeManager::new(1.0, 0.1, false);
/// assert_eq!(time.current_time(), 0.0);
///
/// let target = time.begin_request();
/// assert_eq!(target, 1.0);
/// assert!(!time.is_granted());
///
/// time.grant(target);
/// assert!(time.is_granted());
/// assert_eq!(time.current_time(), 1.0);
/// ```
#[derive(Debug, Clone)]
pub struct TimeManager {
    /// Last granted logical time
    current_time: f64,
    /// Increment requested on every step
    step: f64,
    /// Minimum offset for outbound timestamps
    lookahead: f64,
    /// Outstanding time-advance request, if any
    requested: Option<f64>,
    /// Whether the last request has been granted
    granted: bool,
    /// Number of completed request/grant cycles
    steps_completed: u64,
    /// Pending pause points, earliest first
    pause_times: BTreeSet<TimeKey>,
    /// Optional federation end time
    end_time: Option<f64>,
    /// Pace against the wall clock instead of running as fast as possible
    realtime: bool,
    /// Wall-clock instant and logical time recorded at the last (re)start
    anchor: Option<(Instant, f64)>,
}

impl TimeManager {
    /// Create a new TimeManager
    ///
    /// # Arguments
    /// * `step` - Logical time requested per iteration (must be positive)
    /// * `lookahead` - Offset applied to outbound timestamps (must be positive)
    /// * `realtime` - Pace the loop against the wall clock
    pub fn new(step: f64, lookahead: f64, realtime: bool) -> Self {
        assert!(step.is_finite() && step > 0.0, "step must be positive");
        assert!(
            lookahead.is_finite() && lookahead > 0.0,
            "lookahead must be positive"
        );
        Self {
            current_time: 0.0,
            step,
            lookahead,
            requested: None,
            granted: true,
            steps_completed: 0,
            pause_times: BTreeSet::new(),
            end_time: None,
            realtime,
            anchor: None,
        }
    }

    pub fn with_pause_times<I: IntoIterator<Item = f64>>(mut self, times: I) -> Self {
        self.pause_times = times.into_iter().map(TimeKey).collect();
        self
    }

    pub fn with_end_time(mut self, end_time: Option<f64>) -> Self {
        self.end_time = end_time;
        self
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn lookahead(&self) -> f64 {
        self.lookahead
    }

    pub fn steps_completed(&self) -> u64 {
        self.steps_completed
    }

    pub fn is_realtime(&self) -> bool {
        self.realtime
    }

    /// Small offset that keeps outbound timestamps off the lookahead boundary
    pub fn epsilon(&self) -> f64 {
        self.lookahead / 10_000.0
    }

    /// Earliest timestamp the manager may use for an outbound interaction
    ///
    /// `current + lookahead + lookahead / 10000`. This is also the start of
    /// the scheduler's injection window.
    ///
    /// # Example
    /// ```
    /// use federation_manager_core_rs::TimeManager;
    ///
    /// let time = TimeManager::new(1.0, 0.1, false);
    /// assert!((time.send_time() - 0.10001).abs() < 1e-12);
    /// ```
    pub fn send_time(&self) -> f64 {
        self.current_time + self.lookahead + self.epsilon()
    }

    /// Start a time-advance request for `current + step`
    ///
    /// Returns the requested time.
    pub fn begin_request(&mut self) -> f64 {
        let target = self.current_time + self.step;
        self.requested = Some(target);
        self.granted = false;
        target
    }

    /// Outstanding request target, if a request is in flight
    pub fn requested_time(&self) -> Option<f64> {
        self.requested
    }

    /// Record a grant from the bus
    pub fn grant(&mut self, time: f64) {
        self.current_time = time;
        self.requested = None;
        self.granted = true;
        self.steps_completed += 1;
    }

    pub fn is_granted(&self) -> bool {
        self.granted
    }

    /// Remove and report the earliest pause point once the clock exceeds it
    ///
    /// # Example
    /// ```
    /// use federation_manager_core_rs::TimeManager;
    ///
    /// let mut time = TimeManager::new(1.0, 0.1, false).with_pause_times([2.0]);
    /// time.grant(2.0);
    /// assert_eq!(time.take_due_pause(), None); // not exceeded yet
    /// time.grant(3.0);
    /// assert_eq!(time.take_due_pause(), Some(2.0));
    /// assert_eq!(time.take_due_pause(), None);
    /// ```
    pub fn take_due_pause(&mut self) -> Option<f64> {
        let earliest = *self.pause_times.first()?;
        if self.current_time > earliest.0 {
            self.pause_times.remove(&earliest);
            Some(earliest.0)
        } else {
            None
        }
    }

    /// Pending pause points, earliest first
    pub fn pending_pauses(&self) -> Vec<f64> {
        self.pause_times.iter().map(|k| k.0).collect()
    }

    /// True once the clock has moved past the configured end time
    pub fn is_past_end_time(&self) -> bool {
        self.end_time.is_some_and(|end| self.current_time > end)
    }

    /// Re-anchor real-time pacing at the current logical time
    ///
    /// Called when the loop starts and on every resume, so time spent paused
    /// is not "caught up" afterwards.
    pub fn anchor_wall_clock(&mut self, now: Instant) {
        self.anchor = Some((now, self.current_time));
    }

    /// How long the loop should sleep before the next step
    ///
    /// Returns `None` in as-fast-as-possible mode or once the wall clock has
    /// caught up with the logical offset since the last anchor. Sleeps are
    /// sliced to at most [`MAX_PACING_SLICE`] so the caller can observe
    /// termination between slices.
    pub fn pacing_delay(&self, now: Instant) -> Option<Duration> {
        if !self.realtime {
            return None;
        }
        let (anchor_wall, anchor_time) = self.anchor?;
        let offset = (self.current_time - anchor_time).max(0.0);
        let target = anchor_wall + Duration::from_secs_f64(offset);
        if now >= target {
            None
        } else {
            Some((target - now).min(MAX_PACING_SLICE))
        }
    }

    /// Serializable summary of the clock
    pub fn snapshot(&self) -> ClockSnapshot {
        ClockSnapshot {
            current_time: self.current_time,
            step: self.step,
            lookahead: self.lookahead,
            steps_completed: self.steps_completed,
            pending_pauses: self.pending_pauses(),
        }
    }
}

/// Point-in-time view of the clock for logging and run summaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockSnapshot {
    pub current_time: f64,
    pub step: f64,
    pub lookahead: f64,
    pub steps_completed: u64,
    pub pending_pauses: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "step must be positive")]
    fn test_zero_step_panics() {
        TimeManager::new(0.0, 0.1, false);
    }

    #[test]
    #[should_panic(expected = "lookahead must be positive")]
    fn test_negative_lookahead_panics() {
        TimeManager::new(1.0, -0.1, false);
    }

    #[test]
    fn test_pacing_skipped_when_not_realtime() {
        let mut time = TimeManager::new(1.0, 0.1, false);
        time.anchor_wall_clock(Instant::now());
        time.grant(10.0);
        assert_eq!(time.pacing_delay(Instant::now()), None);
    }

    #[test]
    fn test_pacing_slices_long_waits() {
        let mut time = TimeManager::new(1.0, 0.1, true);
        let start = Instant::now();
        time.anchor_wall_clock(start);
        time.grant(5.0);

        let delay = time.pacing_delay(start).unwrap();
        assert_eq!(delay, MAX_PACING_SLICE);

        let caught_up = start + Duration::from_secs(5);
        assert_eq!(time.pacing_delay(caught_up), None);
    }

    #[test]
    fn test_time_key_ordering() {
        let mut keys = vec![TimeKey(3.0), TimeKey(-1.0), TimeKey(2.5)];
        keys.sort();
        assert_eq!(keys, vec![TimeKey(-1.0), TimeKey(2.5), TimeKey(3.0)]);
    }
}
