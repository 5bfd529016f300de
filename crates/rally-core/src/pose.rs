//! Rigid transforms shared by the simulation and presentation layers.
//!
//! [`Pose`] is the explicit replacement for scene-graph parenting: a child's
//! world pose is always `parent.compose(&local)`, recomputed whenever it is
//! needed instead of being tracked through mutable parent links.

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Quaternions closer than this are treated as equal when slerping.
const SLERP_EPSILON: f32 = 1.0e-6;

// ---------------------------------------------------------------------------
// Pose
// ---------------------------------------------------------------------------

/// Position plus unit-quaternion orientation, in world or parent space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub translation: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    /// Pose at the origin with no rotation.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
        }
    }

    #[must_use]
    pub const fn new(translation: Vector3<f32>, rotation: UnitQuaternion<f32>) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// Pose at `translation` with no rotation.
    #[must_use]
    pub fn from_translation(translation: Vector3<f32>) -> Self {
        Self {
            translation,
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Compose `self` (parent) with a pose expressed in the parent's frame.
    #[must_use]
    pub fn compose(&self, local: &Self) -> Self {
        Self {
            translation: self.translation + self.rotation * local.translation,
            rotation: self.rotation * local.rotation,
        }
    }

    /// Transform a point from this pose's local frame into its parent frame.
    #[must_use]
    pub fn transform_point(&self, local: &Vector3<f32>) -> Vector3<f32> {
        self.translation + self.rotation * local
    }

    /// Local +Y expressed in the parent frame.
    #[must_use]
    pub fn up(&self) -> Vector3<f32> {
        self.rotation * Vector3::y()
    }

    /// Local -Z expressed in the parent frame (vehicle forward).
    #[must_use]
    pub fn forward(&self) -> Vector3<f32> {
        self.rotation * -Vector3::z()
    }

    /// Local +X expressed in the parent frame (vehicle right).
    #[must_use]
    pub fn right(&self) -> Vector3<f32> {
        self.rotation * Vector3::x()
    }

    /// Move `fraction` of the way toward `target`: linear on position,
    /// spherical on rotation.
    #[must_use]
    pub fn approach(&self, target: &Self, fraction: f32) -> Self {
        let t = fraction.clamp(0.0, 1.0);
        let rotation = self
            .rotation
            .try_slerp(&target.rotation, t, SLERP_EPSILON)
            .unwrap_or(target.rotation);
        Self {
            translation: self.translation.lerp(&target.translation, t),
            rotation,
        }
    }

    /// `true` when every component is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.translation.iter().all(|c| c.is_finite())
            && self.rotation.coords.iter().all(|c| c.is_finite())
    }

    #[must_use]
    pub fn to_isometry(&self) -> Isometry3<f32> {
        Isometry3::from_parts(Translation3::from(self.translation), self.rotation)
    }

    #[must_use]
    pub fn from_isometry(iso: &Isometry3<f32>) -> Self {
        Self {
            translation: iso.translation.vector,
            rotation: iso.rotation,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::f32::consts::{FRAC_PI_2, PI};

    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn identity_is_default() {
        assert_eq!(Pose::default(), Pose::identity());
    }

    #[test]
    fn compose_applies_parent_rotation_to_child_offset() {
        let parent = Pose::new(
            Vector3::new(10.0, 0.0, 0.0),
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), FRAC_PI_2),
        );
        let local = Pose::from_translation(Vector3::new(0.0, 0.0, -2.0));
        let world = parent.compose(&local);
        // -Z rotated +90 degrees about Y points along -X.
        assert_relative_eq!(world.translation, Vector3::new(8.0, 0.0, 0.0), epsilon = 1e-5);
        assert_relative_eq!(world.rotation, parent.rotation, epsilon = 1e-6);
    }

    #[test]
    fn compose_with_identity_is_noop() {
        let pose = Pose::new(
            Vector3::new(1.0, 2.0, 3.0),
            UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3),
        );
        let composed = pose.compose(&Pose::identity());
        assert_relative_eq!(composed.translation, pose.translation, epsilon = 1e-6);
        assert_relative_eq!(composed.rotation, pose.rotation, epsilon = 1e-6);
    }

    #[test]
    fn basis_vectors_follow_rotation() {
        let flipped = Pose::new(
            Vector3::zeros(),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), PI),
        );
        assert_relative_eq!(flipped.up(), -Vector3::y(), epsilon = 1e-6);
        assert_relative_eq!(flipped.right(), -Vector3::x(), epsilon = 1e-6);
        assert_relative_eq!(Pose::identity().forward(), -Vector3::z(), epsilon = 1e-6);
    }

    #[test]
    fn approach_moves_fraction_of_distance() {
        let from = Pose::identity();
        let to = Pose::from_translation(Vector3::new(10.0, 0.0, 0.0));
        let step = from.approach(&to, 0.1);
        assert_relative_eq!(step.translation.x, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn approach_slerps_rotation() {
        let from = Pose::identity();
        let to = Pose::new(
            Vector3::zeros(),
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 1.0),
        );
        let half = from.approach(&to, 0.5);
        assert_relative_eq!(half.rotation.angle(), 0.5, epsilon = 1e-5);
    }

    #[test]
    fn approach_clamps_fraction() {
        let from = Pose::identity();
        let to = Pose::from_translation(Vector3::new(4.0, 0.0, 0.0));
        assert_relative_eq!(from.approach(&to, 3.0).translation.x, 4.0, epsilon = 1e-6);
        assert_relative_eq!(from.approach(&to, -1.0).translation.x, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn isometry_roundtrip() {
        let pose = Pose::new(
            Vector3::new(-1.0, 5.0, 2.0),
            UnitQuaternion::from_euler_angles(0.3, -0.2, 1.1),
        );
        let back = Pose::from_isometry(&pose.to_isometry());
        assert_relative_eq!(back.translation, pose.translation, epsilon = 1e-6);
        assert_relative_eq!(back.rotation, pose.rotation, epsilon = 1e-6);
    }

    #[test]
    fn is_finite_detects_nan() {
        let mut pose = Pose::identity();
        assert!(pose.is_finite());
        pose.translation.y = f32::NAN;
        assert!(!pose.is_finite());
    }
}
