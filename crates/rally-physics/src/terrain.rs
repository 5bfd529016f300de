//! Static terrain meshes.
//!
//! A [`TerrainMesh`] is immutable once built and is shared through `Arc`
//! between the physics world (as a fixed collider) and spawn resolution (as
//! a raycast target).

use std::f32::consts::{PI, TAU};
use std::fmt;

use nalgebra::{Point3, Vector3};
use rally_core::error::PhysicsError;
use rally_core::pose::Pose;
use rapier3d::parry::query::{Ray, RayCast};
use rapier3d::parry::shape::TriMesh;

// ---------------------------------------------------------------------------
// RayHit
// ---------------------------------------------------------------------------

/// Nearest intersection of a ray with a terrain mesh, in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub point: Vector3<f32>,
    pub normal: Vector3<f32>,
    /// Distance from the ray origin along the normalized direction.
    pub distance: f32,
}

// ---------------------------------------------------------------------------
// TerrainMesh
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct TerrainMesh {
    vertices: Vec<Point3<f32>>,
    indices: Vec<[u32; 3]>,
    pose: Pose,
    shape: TriMesh,
}

impl fmt::Debug for TerrainMesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerrainMesh")
            .field("vertices", &self.vertices.len())
            .field("triangles", &self.indices.len())
            .field("pose", &self.pose)
            .finish_non_exhaustive()
    }
}

impl TerrainMesh {
    /// Build a mesh from vertices and triangle indices, placed at `pose`.
    pub fn new(
        vertices: Vec<Point3<f32>>,
        indices: Vec<[u32; 3]>,
        pose: Pose,
    ) -> Result<Self, PhysicsError> {
        if vertices.is_empty() || indices.is_empty() {
            return Err(PhysicsError::InvalidMesh("mesh has no triangles".into()));
        }
        if let Some(v) = vertices.iter().find(|v| !v.coords.iter().all(|c| c.is_finite())) {
            return Err(PhysicsError::InvalidMesh(format!("non-finite vertex {v:?}")));
        }
        let count = vertices.len();
        if let Some(tri) = indices
            .iter()
            .find(|tri| tri.iter().any(|&i| i as usize >= count))
        {
            return Err(PhysicsError::InvalidMesh(format!(
                "triangle {tri:?} indexes past {count} vertices"
            )));
        }
        if !pose.is_finite() {
            return Err(PhysicsError::InvalidMesh("non-finite pose".into()));
        }

        let shape = TriMesh::new(vertices.clone(), indices.clone());

        Ok(Self {
            vertices,
            indices,
            pose,
            shape,
        })
    }

    /// Closed UV sphere centered on the origin with outward-facing triangles.
    pub fn uv_sphere(radius: f32, rings: u32, segments: u32) -> Result<Self, PhysicsError> {
        if radius <= 0.0 || rings < 2 || segments < 3 {
            return Err(PhysicsError::InvalidMesh(format!(
                "uv sphere radius={radius} rings={rings} segments={segments}"
            )));
        }

        // Vertex 0 is the north pole, then `rings - 1` latitude rings of
        // `segments` vertices each, then the south pole.
        let mut vertices = Vec::with_capacity(((rings - 1) * segments + 2) as usize);
        vertices.push(Point3::new(0.0, radius, 0.0));
        for ring in 1..rings {
            #[allow(clippy::cast_precision_loss)]
            let theta = PI * ring as f32 / rings as f32;
            let (sin_t, cos_t) = theta.sin_cos();
            for seg in 0..segments {
                // Quarter-segment phase keeps axis-aligned rays off mesh edges.
                #[allow(clippy::cast_precision_loss)]
                let phi = TAU * (seg as f32 + 0.25) / segments as f32;
                let (sin_p, cos_p) = phi.sin_cos();
                vertices.push(Point3::new(
                    radius * sin_t * cos_p,
                    radius * cos_t,
                    radius * sin_t * sin_p,
                ));
            }
        }
        let south = (rings - 1) * segments + 1;
        vertices.push(Point3::new(0.0, -radius, 0.0));

        let at = |ring: u32, seg: u32| 1 + (ring - 1) * segments + seg % segments;

        let mut indices = Vec::with_capacity((2 * rings * segments) as usize);
        for seg in 0..segments {
            indices.push([0, at(1, seg + 1), at(1, seg)]);
        }
        for ring in 1..rings - 1 {
            for seg in 0..segments {
                let a = at(ring, seg);
                let b = at(ring, seg + 1);
                let c = at(ring + 1, seg);
                let d = at(ring + 1, seg + 1);
                indices.push([a, b, c]);
                indices.push([b, d, c]);
            }
        }
        for seg in 0..segments {
            indices.push([south, at(rings - 1, seg), at(rings - 1, seg + 1)]);
        }

        Self::new(vertices, indices, Pose::identity())
    }

    /// Square, upward-facing patch at `height`, spanning
    /// `[-half_extent, half_extent]` on X and Z.
    pub fn flat_patch(half_extent: f32, height: f32) -> Result<Self, PhysicsError> {
        if half_extent <= 0.0 {
            return Err(PhysicsError::InvalidMesh(format!(
                "flat patch half extent {half_extent}"
            )));
        }
        let e = half_extent;
        let vertices = vec![
            Point3::new(-e, height, -e),
            Point3::new(e, height, -e),
            Point3::new(e, height, e),
            Point3::new(-e, height, e),
        ];
        Self::new(vertices, vec![[0, 3, 2], [0, 2, 1]], Pose::identity())
    }

    pub fn vertices(&self) -> &[Point3<f32>] {
        &self.vertices
    }

    pub fn indices(&self) -> &[[u32; 3]] {
        &self.indices
    }

    pub const fn pose(&self) -> Pose {
        self.pose
    }

    pub(crate) const fn shape(&self) -> &TriMesh {
        &self.shape
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    /// Nearest hit of the ray `origin + t * direction`, `t` in `[0, max_distance]`.
    ///
    /// `direction` need not be normalized; a zero direction never hits.
    pub fn cast_ray(
        &self,
        origin: Vector3<f32>,
        direction: Vector3<f32>,
        max_distance: f32,
    ) -> Option<RayHit> {
        let length = direction.norm();
        if length <= f32::EPSILON || !length.is_finite() {
            return None;
        }
        let dir = direction / length;
        let ray = Ray::new(Point3::from(origin), dir);
        let iso = self.pose.to_isometry();

        let distance = self.shape.cast_ray(&iso, &ray, max_distance, true)?;
        let normal = self
            .shape
            .cast_ray_and_get_normal(&iso, &ray, max_distance, true)
            .map_or(-dir, |hit| hit.normal);

        Some(RayHit {
            point: ray.point_at(distance).coords,
            normal,
            distance,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;

    use super::*;

    // ---- validation ----

    #[test]
    fn empty_mesh_rejected() {
        let err = TerrainMesh::new(Vec::new(), Vec::new(), Pose::identity()).unwrap_err();
        assert!(matches!(err, PhysicsError::InvalidMesh(_)));
    }

    #[test]
    fn single_triangle_builds_and_is_hit() {
        let vertices = vec![
            Point3::new(-1.0, 0.0, -1.0),
            Point3::new(-1.0, 0.0, 2.0),
            Point3::new(2.0, 0.0, -1.0),
        ];
        let mesh = TerrainMesh::new(vertices, vec![[0, 1, 2]], Pose::identity()).unwrap();
        assert_eq!(mesh.triangle_count(), 1);
        let hit = mesh
            .cast_ray(Vector3::new(0.0, 5.0, 0.0), -Vector3::y(), 10.0)
            .unwrap();
        assert_relative_eq!(hit.distance, 5.0, epsilon = 1e-4);
    }

    #[test]
    fn out_of_range_index_rejected() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ];
        let err = TerrainMesh::new(vertices, vec![[0, 1, 3]], Pose::identity()).unwrap_err();
        assert!(err.to_string().contains("indexes past"));
    }

    #[test]
    fn non_finite_vertex_rejected() {
        let vertices = vec![
            Point3::new(0.0, f32::NAN, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ];
        assert!(TerrainMesh::new(vertices, vec![[0, 1, 2]], Pose::identity()).is_err());
    }

    #[test]
    fn degenerate_sphere_parameters_rejected() {
        assert!(TerrainMesh::uv_sphere(10.0, 1, 8).is_err());
        assert!(TerrainMesh::uv_sphere(10.0, 4, 2).is_err());
        assert!(TerrainMesh::uv_sphere(0.0, 4, 8).is_err());
    }

    // ---- generators ----

    #[test]
    fn uv_sphere_counts() {
        let mesh = TerrainMesh::uv_sphere(5.0, 8, 12).unwrap();
        assert_eq!(mesh.vertices().len(), 7 * 12 + 2);
        assert_eq!(mesh.triangle_count(), 2 * 12 + 2 * 6 * 12);
    }

    #[test]
    fn uv_sphere_vertices_on_surface() {
        let mesh = TerrainMesh::uv_sphere(5.0, 8, 12).unwrap();
        for v in mesh.vertices() {
            assert_relative_eq!(v.coords.norm(), 5.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn uv_sphere_triangles_face_outward() {
        let mesh = TerrainMesh::uv_sphere(5.0, 8, 12).unwrap();
        let v = mesh.vertices();
        for tri in mesh.indices() {
            let [a, b, c] = tri.map(|i| v[i as usize].coords);
            let normal = (b - a).cross(&(c - a));
            let centroid = (a + b + c) / 3.0;
            assert!(normal.dot(&centroid) > 0.0, "inward triangle {tri:?}");
        }
    }

    // ---- raycasts ----

    #[test]
    fn ray_hits_flat_patch_from_above() {
        let mesh = TerrainMesh::flat_patch(10.0, 2.0).unwrap();
        let hit = mesh
            .cast_ray(Vector3::new(1.0, 50.0, -3.0), -Vector3::y(), 100.0)
            .unwrap();
        assert_relative_eq!(hit.point, Vector3::new(1.0, 2.0, -3.0), epsilon = 1e-4);
        assert_relative_eq!(hit.distance, 48.0, epsilon = 1e-4);
        assert_relative_eq!(hit.normal.y.abs(), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn ray_misses_outside_patch() {
        let mesh = TerrainMesh::flat_patch(10.0, 0.0).unwrap();
        assert!(
            mesh.cast_ray(Vector3::new(20.0, 5.0, 0.0), -Vector3::y(), 100.0)
                .is_none()
        );
    }

    #[test]
    fn ray_respects_max_distance() {
        let mesh = TerrainMesh::flat_patch(10.0, 0.0).unwrap();
        assert!(
            mesh.cast_ray(Vector3::new(0.0, 50.0, 0.0), -Vector3::y(), 10.0)
                .is_none()
        );
    }

    #[test]
    fn zero_direction_never_hits() {
        let mesh = TerrainMesh::flat_patch(10.0, 0.0).unwrap();
        assert!(
            mesh.cast_ray(Vector3::new(0.0, 5.0, 0.0), Vector3::zeros(), 100.0)
                .is_none()
        );
    }

    #[test]
    fn ray_toward_sphere_center_hits_near_radius() {
        let mesh = TerrainMesh::uv_sphere(50.0, 31, 64).unwrap();
        let hit = mesh
            .cast_ray(Vector3::new(200.0, 0.0, 0.0), -Vector3::x(), 200.0)
            .unwrap();
        assert_relative_eq!(hit.point.norm(), 50.0, epsilon = 0.2);
        assert!(hit.point.x > 0.0);
    }

    #[test]
    fn posed_mesh_is_hit_in_world_space() {
        let patch = TerrainMesh::flat_patch(5.0, 0.0).unwrap();
        let pose = Pose::new(Vector3::new(0.0, -3.0, 0.0), UnitQuaternion::identity());
        let mesh = TerrainMesh::new(patch.vertices().to_vec(), patch.indices().to_vec(), pose)
            .unwrap();
        let hit = mesh
            .cast_ray(Vector3::new(1.0, 10.0, 2.0), -Vector3::y(), 100.0)
            .unwrap();
        assert_relative_eq!(hit.point.y, -3.0, epsilon = 1e-4);
    }
}
