use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use std::time::Duration;

use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn secs_to_nanos(secs: f64) -> u64 {
    (secs.max(0.0) * NANOS_PER_SEC).round() as u64
}

// ---------------------------------------------------------------------------
// SimTime
// ---------------------------------------------------------------------------

/// Integer-nanosecond simulation clock.
///
/// Every timer in the game loop reads this value instead of the wall clock,
/// so tests can drive time synchronously.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Resource,
)]
pub struct SimTime {
    nanos: u64,
}

impl SimTime {
    /// Create a new `SimTime` at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self { nanos: 0 }
    }

    /// Create a `SimTime` from a raw nanosecond count.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self { nanos }
    }

    /// Create a `SimTime` from seconds. Negative values clamp to zero.
    #[must_use]
    pub fn from_secs(secs: f64) -> Self {
        Self {
            nanos: secs_to_nanos(secs),
        }
    }

    /// Raw nanosecond count.
    #[must_use]
    pub const fn nanos(&self) -> u64 {
        self.nanos
    }

    /// Elapsed seconds as `f64`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn secs_f64(&self) -> f64 {
        self.nanos as f64 / NANOS_PER_SEC
    }

    /// Advance the clock by `delta_nanos` nanoseconds.
    pub const fn advance(&mut self, delta_nanos: u64) {
        self.nanos = self.nanos.saturating_add(delta_nanos);
    }

    /// Advance the clock by `delta_secs` seconds.
    pub fn advance_secs(&mut self, delta_secs: f64) {
        self.advance(secs_to_nanos(delta_secs));
    }

    /// Reset the clock to zero.
    pub const fn reset(&mut self) {
        self.nanos = 0;
    }
}

impl Add<Duration> for SimTime {
    type Output = Self;

    #[allow(clippy::cast_possible_truncation)]
    fn add(self, rhs: Duration) -> Self {
        Self {
            nanos: self.nanos.saturating_add(rhs.as_nanos() as u64),
        }
    }
}

impl AddAssign<Duration> for SimTime {
    #[allow(clippy::cast_possible_truncation)]
    fn add_assign(&mut self, rhs: Duration) {
        self.nanos = self.nanos.saturating_add(rhs.as_nanos() as u64);
    }
}

impl Sub for SimTime {
    type Output = Duration;

    /// Saturating difference between two instants.
    fn sub(self, rhs: Self) -> Duration {
        Duration::from_nanos(self.nanos.saturating_sub(rhs.nanos))
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.nanos / 1_000_000_000;
        let millis = (self.nanos % 1_000_000_000) / 1_000_000;
        write!(f, "{secs}.{millis:03}s")
    }
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

/// Fixed-timestep accumulator.
///
/// Collects variable frame deltas and hands out whole fixed steps, capped per
/// frame so a long stall cannot snowball into ever longer frames.
#[derive(Debug, Clone)]
pub struct Accumulator {
    accumulated: u64,
    timestep_nanos: u64,
    max_steps: u32,
    steps_this_frame: u32,
}

impl Accumulator {
    /// Create a new accumulator with the given fixed timestep in seconds.
    pub fn new(timestep_secs: f64) -> Self {
        Self {
            accumulated: 0,
            timestep_nanos: secs_to_nanos(timestep_secs),
            max_steps: 8,
            steps_this_frame: 0,
        }
    }

    /// Set the maximum number of steps allowed per frame.
    #[must_use]
    pub const fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Feed a frame delta and reset the per-frame step counter.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn accumulate(&mut self, delta: Duration) {
        self.accumulated = self.accumulated.saturating_add(delta.as_nanos() as u64);
        self.steps_this_frame = 0;
    }

    /// Consume one timestep if enough time is banked and the frame cap has
    /// not been reached.
    pub const fn should_step(&mut self) -> bool {
        if self.timestep_nanos == 0 || self.steps_this_frame >= self.max_steps {
            return false;
        }
        if self.accumulated >= self.timestep_nanos {
            self.accumulated -= self.timestep_nanos;
            self.steps_this_frame += 1;
            return true;
        }
        false
    }

    /// Drop any time left over after the step cap was hit.
    pub const fn discard_backlog(&mut self) {
        if self.accumulated > self.timestep_nanos {
            self.accumulated %= self.timestep_nanos;
        }
    }

    /// Reset accumulated time and step counter to zero.
    pub const fn reset(&mut self) {
        self.accumulated = 0;
        self.steps_this_frame = 0;
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// [`SimTime`] paired with an [`Accumulator`].
///
/// ```ignore
/// clock.tick(frame_delta);
/// while clock.should_step() {
///     clock.advance();
///     // one fixed step at clock.time()
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Clock {
    time: SimTime,
    accumulator: Accumulator,
}

impl Clock {
    /// Create a new clock with the given fixed timestep in seconds.
    pub fn new(timestep_secs: f64) -> Self {
        Self {
            time: SimTime::new(),
            accumulator: Accumulator::new(timestep_secs),
        }
    }

    /// Set the maximum number of simulation steps per tick.
    #[must_use]
    pub const fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.accumulator = self.accumulator.with_max_steps(max_steps);
        self
    }

    /// Feed a frame delta into the accumulator.
    pub const fn tick(&mut self, delta: Duration) {
        self.accumulator.accumulate(delta);
    }

    /// Returns `true` if a simulation step should be taken.
    pub const fn should_step(&mut self) -> bool {
        self.accumulator.should_step()
    }

    /// Advance simulation time by one timestep.
    pub const fn advance(&mut self) {
        self.time.advance(self.accumulator.timestep_nanos);
    }

    /// Drop time the step cap could not consume this frame.
    pub const fn discard_backlog(&mut self) {
        self.accumulator.discard_backlog();
    }

    /// Current simulation time.
    #[must_use]
    pub const fn time(&self) -> SimTime {
        self.time
    }
}

// ---------------------------------------------------------------------------
// Cadence
// ---------------------------------------------------------------------------

/// Periodic task timer driven by an injected [`SimTime`].
///
/// The first period starts at the first [`poll`](Self::poll) (or at
/// [`restart`](Self::restart)), matching an interval timer that fires one
/// period after it is armed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cadence {
    period_nanos: u64,
    next_due: Option<u64>,
}

impl Cadence {
    /// Create a cadence firing every `period_secs` seconds.
    pub fn from_secs(period_secs: f64) -> Self {
        Self {
            period_nanos: secs_to_nanos(period_secs),
            next_due: None,
        }
    }

    /// Create a cadence firing `hz` times per second. Non-positive rates
    /// never fire.
    pub fn from_hz(hz: f64) -> Self {
        if hz <= 0.0 {
            return Self {
                period_nanos: 0,
                next_due: None,
            };
        }
        Self::from_secs(1.0 / hz)
    }

    /// Period in seconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn period_secs(&self) -> f64 {
        self.period_nanos as f64 / NANOS_PER_SEC
    }

    /// Re-arm so the next firing is one full period after `now`.
    pub const fn restart(&mut self, now: SimTime) {
        self.next_due = Some(now.nanos().saturating_add(self.period_nanos));
    }

    /// Number of periods that elapsed up to `now`.
    pub fn poll(&mut self, now: SimTime) -> u32 {
        if self.period_nanos == 0 {
            return 0;
        }
        let Some(mut due) = self.next_due else {
            self.restart(now);
            return 0;
        };

        let mut fired = 0_u32;
        while now.nanos() >= due {
            fired = fired.saturating_add(1);
            due = due.saturating_add(self.period_nanos);
        }
        self.next_due = Some(due);
        fired
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- SimTime ----

    #[test]
    fn simtime_from_secs() {
        let t = SimTime::from_secs(2.5);
        assert_eq!(t.nanos(), 2_500_000_000);
    }

    #[test]
    fn simtime_from_negative_secs_clamps() {
        assert_eq!(SimTime::from_secs(-3.0), SimTime::new());
    }

    #[test]
    fn simtime_advance_and_reset() {
        let mut t = SimTime::new();
        t.advance_secs(0.25);
        t.advance(250_000_000);
        assert!((t.secs_f64() - 0.5).abs() < 1e-12);
        t.reset();
        assert_eq!(t.nanos(), 0);
    }

    #[test]
    fn simtime_arithmetic() {
        let a = SimTime::from_secs(1.0) + Duration::from_millis(500);
        assert_eq!(a.nanos(), 1_500_000_000);
        let b = SimTime::from_secs(1.0);
        assert_eq!(a - b, Duration::from_millis(500));
        assert_eq!(b - a, Duration::ZERO);
    }

    #[test]
    fn simtime_display() {
        assert_eq!(SimTime::from_nanos(3_042_000_000).to_string(), "3.042s");
    }

    // ---- Accumulator ----

    #[test]
    fn accumulator_dispenses_whole_steps() {
        let mut acc = Accumulator::new(0.01);
        acc.accumulate(Duration::from_millis(25));
        assert!(acc.should_step());
        assert!(acc.should_step());
        assert!(!acc.should_step());
    }

    #[test]
    fn accumulator_caps_steps_per_frame() {
        let mut acc = Accumulator::new(0.01).with_max_steps(3);
        acc.accumulate(Duration::from_millis(100));
        let steps = std::iter::from_fn(|| acc.should_step().then_some(())).count();
        assert_eq!(steps, 3);
        acc.discard_backlog();
        acc.accumulate(Duration::ZERO);
        assert!(!acc.should_step());
    }

    #[test]
    fn accumulator_zero_timestep_never_steps() {
        let mut acc = Accumulator::new(0.0);
        acc.accumulate(Duration::from_secs(1));
        assert!(!acc.should_step());
    }

    // ---- Clock ----

    #[test]
    fn clock_time_progression() {
        let mut clock = Clock::new(0.5);
        clock.tick(Duration::from_millis(1250));
        let mut steps = 0;
        while clock.should_step() {
            clock.advance();
            steps += 1;
        }
        assert_eq!(steps, 2);
        assert_eq!(clock.time(), SimTime::from_secs(1.0));
    }

    // ---- Cadence ----

    #[test]
    fn cadence_first_poll_arms_without_firing() {
        let mut cadence = Cadence::from_secs(1.0);
        assert_eq!(cadence.poll(SimTime::from_secs(5.0)), 0);
        assert_eq!(cadence.poll(SimTime::from_secs(5.5)), 0);
        assert_eq!(cadence.poll(SimTime::from_secs(6.0)), 1);
    }

    #[test]
    fn cadence_counts_elapsed_periods() {
        let mut cadence = Cadence::from_secs(1.0);
        cadence.restart(SimTime::new());
        assert_eq!(cadence.poll(SimTime::from_secs(0.99)), 0);
        assert_eq!(cadence.poll(SimTime::from_secs(3.2)), 3);
        assert_eq!(cadence.poll(SimTime::from_secs(3.9)), 0);
        assert_eq!(cadence.poll(SimTime::from_secs(4.0)), 1);
    }

    #[test]
    fn cadence_from_hz() {
        let cadence = Cadence::from_hz(20.0);
        assert!((cadence.period_secs() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn cadence_zero_rate_never_fires() {
        let mut cadence = Cadence::from_hz(0.0);
        assert_eq!(cadence.poll(SimTime::new()), 0);
        assert_eq!(cadence.poll(SimTime::from_secs(100.0)), 0);
    }
}
