//! Rigid body descriptions.
//!
//! A [`BodyDesc`] is everything needed to (re)build a rapier body and its
//! colliders. The world keeps it for the lifetime of the body so a detached
//! body can be rebuilt exactly.

use std::fmt;
use std::sync::Arc;

use nalgebra::Vector3;
use rally_core::config::MaterialConfig;
use rally_core::error::PhysicsError;
use rally_core::pose::Pose;

use crate::terrain::TerrainMesh;

// ---------------------------------------------------------------------------
// BodyId
// ---------------------------------------------------------------------------

/// Stable handle to a body owned by [`PhysicsWorld`](crate::world::PhysicsWorld).
///
/// Unlike a rapier handle it survives detach/re-add cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub u32);

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "body#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// PhysicsMaterial
// ---------------------------------------------------------------------------

/// Contact material applied to every collider of a body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsMaterial {
    pub friction: f32,
    pub restitution: f32,
}

impl Default for PhysicsMaterial {
    fn default() -> Self {
        Self {
            friction: 0.5,
            restitution: 0.0,
        }
    }
}

impl From<MaterialConfig> for PhysicsMaterial {
    fn from(config: MaterialConfig) -> Self {
        Self {
            friction: config.friction,
            restitution: config.restitution,
        }
    }
}

// ---------------------------------------------------------------------------
// ShapeDesc
// ---------------------------------------------------------------------------

/// One collider attached to a body.
#[derive(Debug, Clone)]
pub enum ShapeDesc {
    /// Sphere centered at `offset` in body space.
    Sphere { radius: f32, offset: Vector3<f32> },
    /// Triangle mesh in body space (terrain).
    TriMesh(Arc<TerrainMesh>),
}

// ---------------------------------------------------------------------------
// BodyDesc
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Dynamic,
    Fixed,
}

/// Description of a rigid body: mass, shapes, material and initial pose.
///
/// Mass is split evenly across the shapes. A zero mass makes the body fixed.
#[derive(Debug, Clone)]
pub struct BodyDesc {
    pub mass: f32,
    pub shapes: Vec<ShapeDesc>,
    pub material: PhysicsMaterial,
    pub pose: Pose,
    pub ccd: bool,
    pub can_sleep: bool,
    pub linear_damping: f32,
    pub angular_damping: f32,
}

impl BodyDesc {
    /// Dynamic body with the given total mass and no shapes yet.
    pub fn dynamic(mass: f32) -> Self {
        Self {
            mass,
            shapes: Vec::new(),
            material: PhysicsMaterial::default(),
            pose: Pose::identity(),
            ccd: false,
            can_sleep: true,
            linear_damping: 0.0,
            angular_damping: 0.0,
        }
    }

    /// Zero-mass (immovable) body.
    pub fn fixed() -> Self {
        Self::dynamic(0.0)
    }

    #[must_use]
    pub fn with_sphere(mut self, radius: f32, offset: Vector3<f32>) -> Self {
        self.shapes.push(ShapeDesc::Sphere { radius, offset });
        self
    }

    #[must_use]
    pub fn with_shape(mut self, shape: ShapeDesc) -> Self {
        self.shapes.push(shape);
        self
    }

    #[must_use]
    pub const fn with_material(mut self, material: PhysicsMaterial) -> Self {
        self.material = material;
        self
    }

    #[must_use]
    pub const fn at(mut self, pose: Pose) -> Self {
        self.pose = pose;
        self
    }

    #[must_use]
    pub const fn with_ccd(mut self, enabled: bool) -> Self {
        self.ccd = enabled;
        self
    }

    #[must_use]
    pub const fn with_sleeping(mut self, can_sleep: bool) -> Self {
        self.can_sleep = can_sleep;
        self
    }

    pub fn kind(&self) -> BodyKind {
        if self.mass > 0.0 {
            BodyKind::Dynamic
        } else {
            BodyKind::Fixed
        }
    }

    /// Mass carried by each collider.
    #[allow(clippy::cast_precision_loss)]
    pub fn mass_per_shape(&self) -> f32 {
        if self.shapes.is_empty() || self.kind() == BodyKind::Fixed {
            0.0
        } else {
            self.mass / self.shapes.len() as f32
        }
    }

    pub fn validate(&self) -> Result<(), PhysicsError> {
        if !self.mass.is_finite() || self.mass < 0.0 {
            return Err(PhysicsError::InvalidBody(format!(
                "mass must be finite and >= 0, got {}",
                self.mass
            )));
        }
        if self.shapes.is_empty() {
            return Err(PhysicsError::InvalidBody("body has no shapes".into()));
        }
        for shape in &self.shapes {
            let ShapeDesc::Sphere { radius, offset } = shape else {
                continue;
            };
            if *radius <= 0.0 || !offset.iter().all(|c| c.is_finite()) {
                return Err(PhysicsError::InvalidBody(format!(
                    "sphere radius {radius} at {offset:?}"
                )));
            }
        }
        if !self.pose.is_finite() {
            return Err(PhysicsError::InvalidBody("non-finite pose".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_mass_is_fixed() {
        assert_eq!(BodyDesc::fixed().kind(), BodyKind::Fixed);
        assert_eq!(BodyDesc::dynamic(2.0).kind(), BodyKind::Dynamic);
    }

    #[test]
    fn mass_split_across_shapes() {
        let desc = BodyDesc::dynamic(1.0)
            .with_sphere(0.1, Vector3::zeros())
            .with_sphere(0.1, Vector3::x())
            .with_sphere(0.1, -Vector3::x())
            .with_sphere(0.1, Vector3::z());
        assert!((desc.mass_per_shape() - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn validate_requires_shapes() {
        let err = BodyDesc::dynamic(1.0).validate().unwrap_err();
        assert!(matches!(err, PhysicsError::InvalidBody(_)));
    }

    #[test]
    fn validate_rejects_bad_sphere() {
        let desc = BodyDesc::dynamic(1.0).with_sphere(0.0, Vector3::zeros());
        assert!(desc.validate().is_err());
    }

    #[test]
    fn validate_rejects_negative_mass() {
        let desc = BodyDesc::dynamic(-1.0).with_sphere(0.5, Vector3::zeros());
        assert!(desc.validate().is_err());
    }

    #[test]
    fn material_from_config() {
        let material = PhysicsMaterial::from(MaterialConfig {
            friction: 0.9,
            restitution: 0.2,
        });
        assert!((material.friction - 0.9).abs() < f32::EPSILON);
        assert!((material.restitution - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn body_id_display() {
        assert_eq!(BodyId(4).to_string(), "body#4");
    }
}
