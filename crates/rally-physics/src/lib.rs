// rally-physics: Rigid-body world used by the rally vehicle.
//
// Wraps the rapier pipeline behind stable `BodyId` / `ConstraintId` handles
// so bodies and hinges can be detached from the simulation and re-added later
// without losing their descriptions or kinematic state. Terrain meshes double
// as static colliders and as raycast targets for spawn resolution.

pub mod body;
pub mod constraint;
pub mod terrain;
pub mod world;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        body::{BodyDesc, BodyId, BodyKind, PhysicsMaterial, ShapeDesc},
        constraint::{ConstraintId, HingeDesc, HingeMotor},
        terrain::{RayHit, TerrainMesh},
        world::{Gravity, HingeMut, PhysicsWorld},
    };
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
