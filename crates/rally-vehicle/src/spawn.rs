//! Spawn point resolution by raycasting the terrain.

use std::f32::consts::PI;
use std::sync::Arc;

use nalgebra::{UnitQuaternion, Vector3};
use rand::Rng;
use rand_distr::{Distribution, UnitSphere};

use rally_core::config::SpawnConfig;
use rally_core::error::SpawnError;
use rally_core::pose::Pose;
use rally_physics::terrain::TerrainMesh;

/// Finds a safe pose on the terrain along a radial direction.
///
/// The ray starts `cast_distance` from the origin along the chosen direction
/// and points back at the origin; the nearest hit is lifted by `clearance`
/// along the outward direction.
#[derive(Debug, Clone)]
pub struct SpawnPointResolver {
    terrain: Option<Arc<TerrainMesh>>,
    cast_distance: f32,
    clearance: f32,
}

impl SpawnPointResolver {
    pub fn new(config: &SpawnConfig) -> Self {
        Self {
            terrain: None,
            cast_distance: config.cast_distance,
            clearance: config.clearance,
        }
    }

    pub fn set_terrain(&mut self, terrain: Arc<TerrainMesh>) {
        self.terrain = Some(terrain);
    }

    pub const fn has_terrain(&self) -> bool {
        self.terrain.is_some()
    }

    /// Resolve a spawn pose along `hint`'s direction from the origin, or
    /// along a uniformly random direction when no hint is given.
    pub fn resolve<R: Rng + ?Sized>(
        &self,
        hint: Option<Vector3<f32>>,
        rng: &mut R,
    ) -> Result<Pose, SpawnError> {
        let terrain = self.terrain.as_ref().ok_or(SpawnError::TerrainNotLoaded)?;

        let outward = match hint {
            Some(hint) => {
                let length = hint.norm();
                if length <= f32::EPSILON || !length.is_finite() {
                    return Err(SpawnError::DegenerateHint);
                }
                hint / length
            }
            None => {
                let [x, y, z]: [f32; 3] = UnitSphere.sample(rng);
                Vector3::new(x, y, z)
            }
        };

        let hit = terrain
            .cast_ray(outward * self.cast_distance, -outward, self.cast_distance)
            .ok_or(SpawnError::NoIntersection)?;

        Ok(Pose::new(
            hit.point + outward * self.clearance,
            upright_rotation(&outward),
        ))
    }
}

/// Rotation taking the vehicle's +Y onto `outward`.
fn upright_rotation(outward: &Vector3<f32>) -> UnitQuaternion<f32> {
    UnitQuaternion::rotation_between(&Vector3::y(), outward)
        .unwrap_or_else(|| UnitQuaternion::from_axis_angle(&Vector3::x_axis(), PI))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
