//! Upside-down detection and automatic respawn.
//!
//! [`RecoveryController`] samples the chassis orientation on its own
//! [`Cadence`], independent of the physics rate. A flip must persist for more
//! than `flip_threshold` consecutive samples before the rig is respawned, so
//! a roll during a jump never triggers a teleport.

use bevy::log::{debug, info, warn};
use rand::Rng;

use rally_core::config::RecoveryConfig;
use rally_core::error::{RigError, SpawnError};
use rally_core::pose::Pose;
use rally_core::time::{Cadence, SimTime};
use rally_physics::world::PhysicsWorld;

use crate::rig::VehicleRig;
use crate::spawn::SpawnPointResolver;

/// `true` when the chassis' up axis points toward the world origin.
///
/// Down is always toward the origin (planet terrain). A chassis at the origin
/// or with its up axis exactly tangent to the surface is not upside down.
pub fn is_upside_down(chassis: &Pose) -> bool {
    let distance = chassis.translation.norm();
    if distance <= f32::EPSILON || !distance.is_finite() {
        return false;
    }
    let toward_origin = -chassis.translation / distance;
    chassis.up().dot(&toward_origin) > 0.0
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryState {
    /// Not flipped (or not flipped yet).
    #[default]
    Grounded,
    /// Upside down for this many consecutive samples.
    Flipped(u32),
    /// Held while `sample` runs the respawn sequence. `sample` always leaves
    /// `Grounded` or `Flipped(n)` behind, so `state()` never reports this.
    Recovering,
}

/// What a sample did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecoveryOutcome {
    /// Nothing to do: upright, disabled, or no sample due.
    Idle,
    /// Upside down, still below the threshold.
    Flipped(u32),
    /// The rig was respawned at this pose.
    Recovered(Pose),
    /// The threshold was reached but no spawn point could be resolved. The
    /// next sample retries.
    Deferred(SpawnError),
}

// ---------------------------------------------------------------------------
// RecoveryController
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RecoveryController {
    cadence: Cadence,
    flip_threshold: u32,
    state: RecoveryState,
    recoveries: u32,
}

impl RecoveryController {
    pub fn new(config: &RecoveryConfig) -> Self {
        Self {
            cadence: Cadence::from_secs(config.sample_period_secs),
            flip_threshold: config.flip_threshold,
            state: RecoveryState::Grounded,
            recoveries: 0,
        }
    }

    pub const fn state(&self) -> RecoveryState {
        self.state
    }

    /// Completed respawns since construction.
    pub const fn recoveries(&self) -> u32 {
        self.recoveries
    }

    /// Back to `Grounded` with the cadence re-armed at `now`.
    pub const fn reset(&mut self, now: SimTime) {
        self.state = RecoveryState::Grounded;
        self.cadence.restart(now);
    }

    /// Take one sample if at least one period elapsed by `now`.
    ///
    /// Missed periods collapse into a single sample, so a stalled loop
    /// cannot count several flips from one pose.
    pub fn tick<R: Rng + ?Sized>(
        &mut self,
        now: SimTime,
        rig: &mut VehicleRig,
        world: &mut PhysicsWorld,
        resolver: &SpawnPointResolver,
        rng: &mut R,
    ) -> Result<RecoveryOutcome, RigError> {
        if self.cadence.poll(now) == 0 {
            return Ok(RecoveryOutcome::Idle);
        }
        self.sample(rig, world, resolver, rng)
    }

    /// Take one orientation sample and act on it.
    pub fn sample<R: Rng + ?Sized>(
        &mut self,
        rig: &mut VehicleRig,
        world: &mut PhysicsWorld,
        resolver: &SpawnPointResolver,
        rng: &mut R,
    ) -> Result<RecoveryOutcome, RigError> {
        if !rig.is_enabled() {
            return Ok(RecoveryOutcome::Idle);
        }

        let chassis = world.pose(rig.chassis())?;
        if !is_upside_down(&chassis) {
            self.state = RecoveryState::Grounded;
            return Ok(RecoveryOutcome::Idle);
        }

        let count = match self.state {
            RecoveryState::Flipped(n) => n.saturating_add(1),
            RecoveryState::Grounded | RecoveryState::Recovering => 1,
        };
        self.state = RecoveryState::Flipped(count);
        debug!("Vehicle upside down ({count} samples)");
        if count <= self.flip_threshold {
            return Ok(RecoveryOutcome::Flipped(count));
        }

        self.state = RecoveryState::Recovering;
        let spawn = match resolver.resolve(Some(chassis.translation), rng) {
            Ok(spawn) => spawn,
            Err(err) => {
                warn!("Vehicle upside down for {count} samples but no spawn point: {err}");
                self.state = RecoveryState::Flipped(count);
                return Ok(RecoveryOutcome::Deferred(err));
            }
        };

        if let Err(err) = rig.respawn(world, spawn) {
            self.state = RecoveryState::Flipped(count);
            return Err(err);
        }
        self.state = RecoveryState::Grounded;
        self.recoveries += 1;
        info!("Vehicle recovered after {count} upside-down samples");
        Ok(RecoveryOutcome::Recovered(spawn))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
