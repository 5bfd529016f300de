//! Hinge constraint descriptions.

use std::fmt;

use nalgebra::Vector3;

use crate::body::BodyId;

/// Stable handle to a constraint owned by the physics world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintId(pub u32);

impl fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "constraint#{}", self.0)
    }
}

/// Velocity motor driving a hinge about its axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HingeMotor {
    /// Target relative angular speed (rad/s) of body B with respect to body A.
    pub target_speed: f32,
    /// Maximum torque the motor may apply.
    pub max_force: f32,
    /// Velocity gain.
    pub damping: f32,
}

/// A revolute joint between two bodies.
///
/// `axis_a` is expressed in body A's frame and `axis_b` in body B's frame.
/// Rewriting `axis_a` at runtime turns the hinge relative to body A, which
/// is how front wheels steer.
#[derive(Debug, Clone, PartialEq)]
pub struct HingeDesc {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub pivot_a: Vector3<f32>,
    pub pivot_b: Vector3<f32>,
    pub axis_a: Vector3<f32>,
    pub axis_b: Vector3<f32>,
    pub motor: Option<HingeMotor>,
}

impl HingeDesc {
    /// Hinge with the same axis on both bodies and no motor.
    pub fn new(
        body_a: BodyId,
        body_b: BodyId,
        pivot_a: Vector3<f32>,
        pivot_b: Vector3<f32>,
        axis: Vector3<f32>,
    ) -> Self {
        Self {
            body_a,
            body_b,
            pivot_a,
            pivot_b,
            axis_a: axis,
            axis_b: axis,
            motor: None,
        }
    }

    #[must_use]
    pub const fn with_motor(mut self, motor: HingeMotor) -> Self {
        self.motor = Some(motor);
        self
    }

    /// `true` if `body` is one of the two hinged bodies.
    pub fn references(&self, body: BodyId) -> bool {
        self.body_a == body || self.body_b == body
    }
}
