//! Drive input buffer.
//!
//! [`DriveInput`] is a Bevy resource holding the latest throttle and steer
//! values from any input source (keyboard, gamepad, network, script). The
//! input system copies it into the game once per frame.

use bevy::prelude::*;

// ---------------------------------------------------------------------------
// DriveInput
// ---------------------------------------------------------------------------

/// Resource that buffers normalized drive input.
///
/// # Example
///
/// ```
/// use rally_sim::DriveInput;
///
/// let mut input = DriveInput::new();
/// input.set(0.5, -1.0);
/// assert!((input.throttle - 0.5).abs() < f32::EPSILON);
/// input.release();
/// assert!(input.throttle.abs() < f32::EPSILON);
/// ```
#[derive(Resource, Clone, Copy, Debug, Default, PartialEq)]
pub struct DriveInput {
    /// Forward (+) / reverse (-), nominally in `[-1, 1]`.
    pub throttle: f32,
    /// Right (+) / left (-), nominally in `[-1, 1]`.
    pub steer: f32,
}

impl DriveInput {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            throttle: 0.0,
            steer: 0.0,
        }
    }

    pub const fn set(&mut self, throttle: f32, steer: f32) {
        self.throttle = throttle;
        self.steer = steer;
    }

    /// Let go of both controls.
    pub const fn release(&mut self) {
        *self = Self::new();
    }

    pub fn is_idle(&self) -> bool {
        self.throttle.abs() < f32::EPSILON && self.steer.abs() < f32::EPSILON
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
