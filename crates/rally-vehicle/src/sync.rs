//! Presentation sync: physics poses into a [`VisualFrame`].
//!
//! Chassis and wheel poses are copied verbatim. The chase camera follows a
//! target rigidly offset from the chassis, closing a fixed fraction of the
//! remaining gap every frame. Engine pitch tracks commanded speed with a bit
//! of random jitter.

use nalgebra::Vector3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use rally_core::config::{AudioConfig, CameraConfig};
use rally_core::pose::Pose;

use crate::rig::RigTransforms;

// ---------------------------------------------------------------------------
// VisualFrame
// ---------------------------------------------------------------------------

/// Everything the presentation layer needs for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VisualFrame {
    pub chassis: Pose,
    pub wheels: [Pose; 4],
    pub camera: Pose,
    pub engine_pitch: f32,
}

// ---------------------------------------------------------------------------
// ChaseCamera
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ChaseCamera {
    offset: Pose,
    smoothing: f32,
    pose: Pose,
    snapped: bool,
}

impl ChaseCamera {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            offset: Pose::from_translation(Vector3::from(config.offset)),
            smoothing: config.smoothing,
            pose: Pose::identity(),
            snapped: false,
        }
    }

    /// Where the camera wants to be: the chassis pose composed with the offset.
    pub fn target(&self, chassis: &Pose) -> Pose {
        chassis.compose(&self.offset)
    }

    /// Move toward the target. The first update after construction or
    /// [`snap`](Self::snap) request jumps straight to it.
    pub fn update(&mut self, chassis: &Pose) -> Pose {
        let target = self.target(chassis);
        self.pose = if self.snapped {
            self.pose.approach(&target, self.smoothing)
        } else {
            self.snapped = true;
            target
        };
        self.pose
    }

    /// Jump to the target immediately.
    pub fn snap(&mut self, chassis: &Pose) -> Pose {
        self.pose = self.target(chassis);
        self.snapped = true;
        self.pose
    }

    /// Make the next [`update`](Self::update) jump instead of smoothing.
    pub const fn request_snap(&mut self) {
        self.snapped = false;
    }

    pub const fn pose(&self) -> Pose {
        self.pose
    }
}

// ---------------------------------------------------------------------------
// EnginePitch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnginePitch {
    base: f32,
    speed_scale: f32,
    jitter: f32,
}

impl EnginePitch {
    pub const fn new(config: &AudioConfig) -> Self {
        Self {
            base: config.engine_pitch_base,
            speed_scale: config.engine_pitch_speed_scale,
            jitter: config.engine_pitch_jitter,
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, forward_velocity: f32, rng: &mut R) -> f32 {
        // `gen_range` panics on an unbounded range.
        let noise = if self.jitter > 0.0 && self.jitter.is_finite() {
            rng.gen_range(0.0..self.jitter)
        } else {
            0.0
        };
        self.base + forward_velocity.abs() * self.speed_scale + noise
    }
}

// ---------------------------------------------------------------------------
// TransformSync
// ---------------------------------------------------------------------------

/// Single translation point from rig transforms to presentation state.
#[derive(Debug, Clone)]
pub struct TransformSync {
    camera: ChaseCamera,
    pitch: EnginePitch,
    frames: u64,
}

impl TransformSync {
    pub fn new(camera: &CameraConfig, audio: &AudioConfig) -> Self {
        Self {
            camera: ChaseCamera::new(camera),
            pitch: EnginePitch::new(audio),
            frames: 0,
        }
    }

    /// Fill `frame` from the rig's latest transforms.
    pub fn sync<R: Rng + ?Sized>(
        &mut self,
        transforms: &RigTransforms,
        forward_velocity: f32,
        frame: &mut VisualFrame,
        rng: &mut R,
    ) {
        frame.chassis = transforms.chassis;
        frame.wheels = transforms.wheels;
        frame.camera = self.camera.update(&transforms.chassis);
        frame.engine_pitch = self.pitch.sample(forward_velocity, rng);
        self.frames += 1;
    }

    /// Force the camera onto its target for the given transforms.
    pub fn snap_camera(&mut self, transforms: &RigTransforms) -> Pose {
        self.camera.snap(&transforms.chassis)
    }

    /// Snap the camera on the next [`sync`](Self::sync).
    pub const fn request_camera_snap(&mut self) {
        self.camera.request_snap();
    }

    pub const fn camera(&self) -> &ChaseCamera {
        &self.camera
    }

    /// Frames synced so far.
    pub const fn frames(&self) -> u64 {
        self.frames
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
