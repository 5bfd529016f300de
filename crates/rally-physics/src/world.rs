//! The physics world: rapier pipeline state plus detachable bodies and hinges.
//!
//! Bodies and constraints are addressed by [`BodyId`] / [`ConstraintId`].
//! Detaching removes them from the rapier sets while the world keeps their
//! description and last kinematic state; re-adding rebuilds them from that
//! record. Kinematic reads and writes work in both states.

use std::collections::HashMap;
use std::sync::Arc;

use bevy::log::{debug, trace};
use nalgebra::{Point3, UnitVector3, Vector3};
use rally_core::config::{GravityConfig, PhysicsConfig};
use rally_core::error::PhysicsError;
use rally_core::pose::Pose;
use rapier3d::prelude::{
    CCDSolver, ColliderBuilder, ColliderSet, DefaultBroadPhase, GenericJoint, ImpulseJointHandle,
    ImpulseJointSet, IntegrationParameters, IslandManager, JointAxis, MotorModel,
    MultibodyJointSet, NarrowPhase, PhysicsPipeline, RevoluteJointBuilder, RigidBodyBuilder,
    RigidBodyHandle, RigidBodySet, SharedShape,
};

use crate::body::{BodyDesc, BodyId, BodyKind, PhysicsMaterial, ShapeDesc};
use crate::constraint::{ConstraintId, HingeDesc};
use crate::terrain::TerrainMesh;

/// Bodies closer than this to the origin feel no radial gravity.
const RADIAL_GRAVITY_MIN_DISTANCE: f32 = 1.0e-4;

// ---------------------------------------------------------------------------
// Gravity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gravity {
    /// Constant acceleration.
    Uniform(Vector3<f32>),
    /// Acceleration of `strength` toward the world origin.
    Radial { strength: f32 },
}

impl Default for Gravity {
    fn default() -> Self {
        Self::Uniform(Vector3::new(0.0, -9.81, 0.0))
    }
}

impl From<GravityConfig> for Gravity {
    fn from(config: GravityConfig) -> Self {
        match config {
            GravityConfig::Uniform { vector } => Self::Uniform(Vector3::from(vector)),
            GravityConfig::Radial { strength } => Self::Radial { strength },
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Kinematic state kept while a body is detached.
#[derive(Debug, Clone, Copy)]
struct KinematicState {
    pose: Pose,
    linvel: Vector3<f32>,
    angvel: Vector3<f32>,
}

struct BodyRecord {
    desc: BodyDesc,
    handle: Option<RigidBodyHandle>,
    stash: KinematicState,
}

struct ConstraintRecord {
    desc: HingeDesc,
    handle: Option<ImpulseJointHandle>,
}

// ---------------------------------------------------------------------------
// PhysicsWorld
// ---------------------------------------------------------------------------

/// All rapier state plus the id-addressed body and constraint records.
///
/// `PhysicsPipeline::step()` needs every set mutably at once, so they live
/// together here.
pub struct PhysicsWorld {
    // -- Rapier sets --
    rigid_bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,

    // -- Pipeline objects --
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    ccd_solver: CCDSolver,

    // -- Parameters --
    integration_parameters: IntegrationParameters,
    gravity: Gravity,
    substeps: u32,

    // -- Id-addressed records --
    bodies: HashMap<BodyId, BodyRecord>,
    constraints: HashMap<ConstraintId, ConstraintRecord>,
    next_body: u32,
    next_constraint: u32,
    steps: u64,
}

impl PhysicsWorld {
    /// Create a world stepping `dt` seconds per [`step`](Self::step), split
    /// into `substeps` solver substeps.
    pub fn new(gravity: Gravity, dt: f32, substeps: u32) -> Self {
        let substeps = substeps.max(1);
        let mut integration_parameters = IntegrationParameters::default();
        #[allow(clippy::cast_precision_loss)]
        {
            integration_parameters.dt = dt / substeps as f32;
        }

        Self {
            rigid_bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            ccd_solver: CCDSolver::new(),
            integration_parameters,
            gravity,
            substeps,
            bodies: HashMap::new(),
            constraints: HashMap::new(),
            next_body: 0,
            next_constraint: 0,
            steps: 0,
        }
    }

    pub fn from_config(config: &PhysicsConfig) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let dt = config.dt as f32;
        Self::new(config.gravity.into(), dt, config.substeps)
    }

    pub const fn gravity(&self) -> Gravity {
        self.gravity
    }

    pub const fn set_gravity(&mut self, gravity: Gravity) {
        self.gravity = gravity;
    }

    /// Number of completed [`step`](Self::step) calls.
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    // -----------------------------------------------------------------------
    // Bodies
    // -----------------------------------------------------------------------

    /// Register a body and add it to the simulation.
    pub fn create_body(&mut self, desc: BodyDesc) -> Result<BodyId, PhysicsError> {
        desc.validate()?;
        let id = BodyId(self.next_body);
        self.next_body += 1;

        let stash = KinematicState {
            pose: desc.pose,
            linvel: Vector3::zeros(),
            angvel: Vector3::zeros(),
        };
        self.bodies.insert(
            id,
            BodyRecord {
                desc,
                handle: None,
                stash,
            },
        );
        self.add_body(id)?;
        Ok(id)
    }

    /// Register a zero-mass triangle mesh body at the mesh's pose.
    pub fn add_static_mesh(
        &mut self,
        mesh: Arc<TerrainMesh>,
        material: PhysicsMaterial,
    ) -> Result<BodyId, PhysicsError> {
        let pose = mesh.pose();
        let desc = BodyDesc::fixed()
            .with_shape(ShapeDesc::TriMesh(mesh))
            .with_material(material)
            .at(pose);
        let id = self.create_body(desc)?;
        debug!("Static mesh added as {id}");
        Ok(id)
    }

    /// Re-add a detached body with its last known kinematic state.
    /// Adding an attached body is a no-op.
    pub fn add_body(&mut self, id: BodyId) -> Result<(), PhysicsError> {
        let record = self.bodies.get_mut(&id).ok_or(PhysicsError::UnknownBody(id.0))?;
        if record.handle.is_some() {
            return Ok(());
        }

        let desc = &record.desc;
        let builder = match desc.kind() {
            BodyKind::Dynamic => RigidBodyBuilder::dynamic()
                .linvel(record.stash.linvel)
                .angvel(record.stash.angvel)
                .ccd_enabled(desc.ccd)
                .can_sleep(desc.can_sleep)
                .linear_damping(desc.linear_damping)
                .angular_damping(desc.angular_damping),
            BodyKind::Fixed => RigidBodyBuilder::fixed(),
        };
        let handle = self
            .rigid_bodies
            .insert(builder.position(record.stash.pose.to_isometry()).build());

        let mass = desc.mass_per_shape();
        for shape in &desc.shapes {
            let collider = match shape {
                ShapeDesc::Sphere { radius, offset } => {
                    ColliderBuilder::ball(*radius).translation(*offset)
                }
                ShapeDesc::TriMesh(mesh) => {
                    ColliderBuilder::new(SharedShape::new(mesh.shape().clone()))
                }
            }
            .friction(desc.material.friction)
            .restitution(desc.material.restitution);
            let collider = if mass > 0.0 { collider.mass(mass) } else { collider };
            self.colliders
                .insert_with_parent(collider.build(), handle, &mut self.rigid_bodies);
        }

        record.handle = Some(handle);
        trace!("{id} added to simulation");
        Ok(())
    }

    /// Detach a body from the simulation, keeping its record and state.
    ///
    /// Attached constraints that reference the body are detached as well.
    /// Removing a detached body is a no-op.
    pub fn remove_body(&mut self, id: BodyId) -> Result<(), PhysicsError> {
        let record = self.bodies.get(&id).ok_or(PhysicsError::UnknownBody(id.0))?;
        if record.handle.is_none() {
            return Ok(());
        }

        let dependents: Vec<ConstraintId> = self
            .constraints
            .iter()
            .filter(|(_, c)| c.handle.is_some() && c.desc.references(id))
            .map(|(&cid, _)| cid)
            .collect();
        for cid in dependents {
            self.remove_constraint(cid)?;
        }

        let record = self.bodies.get_mut(&id).ok_or(PhysicsError::UnknownBody(id.0))?;
        let Some(handle) = record.handle.take() else {
            return Ok(());
        };
        if let Some(body) = self.rigid_bodies.remove(
            handle,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        ) {
            record.stash = KinematicState {
                pose: Pose::from_isometry(body.position()),
                linvel: *body.linvel(),
                angvel: *body.angvel(),
            };
        }
        trace!("{id} removed from simulation");
        Ok(())
    }

    /// `true` if the body exists and is part of the simulation.
    pub fn contains_body(&self, id: BodyId) -> bool {
        self.bodies.get(&id).is_some_and(|r| r.handle.is_some())
    }

    /// Number of attached bodies.
    pub fn body_count(&self) -> usize {
        self.bodies.values().filter(|r| r.handle.is_some()).count()
    }

    pub fn body_desc(&self, id: BodyId) -> Result<&BodyDesc, PhysicsError> {
        self.bodies
            .get(&id)
            .map(|r| &r.desc)
            .ok_or(PhysicsError::UnknownBody(id.0))
    }

    // -----------------------------------------------------------------------
    // Kinematic access
    // -----------------------------------------------------------------------

    fn state(&self, id: BodyId) -> Result<KinematicState, PhysicsError> {
        let record = self.bodies.get(&id).ok_or(PhysicsError::UnknownBody(id.0))?;
        let live = record.handle.and_then(|h| self.rigid_bodies.get(h));
        Ok(live.map_or(record.stash, |body| KinematicState {
            pose: Pose::from_isometry(body.position()),
            linvel: *body.linvel(),
            angvel: *body.angvel(),
        }))
    }

    pub fn pose(&self, id: BodyId) -> Result<Pose, PhysicsError> {
        self.state(id).map(|s| s.pose)
    }

    pub fn linvel(&self, id: BodyId) -> Result<Vector3<f32>, PhysicsError> {
        self.state(id).map(|s| s.linvel)
    }

    pub fn angvel(&self, id: BodyId) -> Result<Vector3<f32>, PhysicsError> {
        self.state(id).map(|s| s.angvel)
    }

    pub fn set_pose(&mut self, id: BodyId, pose: Pose) -> Result<(), PhysicsError> {
        let record = self.bodies.get_mut(&id).ok_or(PhysicsError::UnknownBody(id.0))?;
        match record.handle.and_then(|h| self.rigid_bodies.get_mut(h)) {
            Some(body) => body.set_position(pose.to_isometry(), true),
            None => record.stash.pose = pose,
        }
        Ok(())
    }

    pub fn set_velocities(
        &mut self,
        id: BodyId,
        linvel: Vector3<f32>,
        angvel: Vector3<f32>,
    ) -> Result<(), PhysicsError> {
        let record = self.bodies.get_mut(&id).ok_or(PhysicsError::UnknownBody(id.0))?;
        match record.handle.and_then(|h| self.rigid_bodies.get_mut(h)) {
            Some(body) => {
                body.set_linvel(linvel, true);
                body.set_angvel(angvel, true);
            }
            None => {
                record.stash.linvel = linvel;
                record.stash.angvel = angvel;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Constraints
    // -----------------------------------------------------------------------

    /// Register a hinge and add it to the simulation. Both bodies must be
    /// attached.
    pub fn create_hinge(&mut self, desc: HingeDesc) -> Result<ConstraintId, PhysicsError> {
        for body in [desc.body_a, desc.body_b] {
            if !self.bodies.contains_key(&body) {
                return Err(PhysicsError::UnknownBody(body.0));
            }
        }
        if desc.axis_a.norm() <= f32::EPSILON || desc.axis_b.norm() <= f32::EPSILON {
            return Err(PhysicsError::InvalidBody("hinge axis must be non-zero".into()));
        }

        let id = ConstraintId(self.next_constraint);
        for body in [desc.body_a, desc.body_b] {
            if !self.contains_body(body) {
                return Err(PhysicsError::BodyDetached {
                    constraint: id.0,
                    body: body.0,
                });
            }
        }
        self.next_constraint += 1;
        self.constraints
            .insert(id, ConstraintRecord { desc, handle: None });
        self.add_constraint(id)?;
        Ok(id)
    }

    /// Re-add a detached constraint. Adding an attached one is a no-op.
    pub fn add_constraint(&mut self, id: ConstraintId) -> Result<(), PhysicsError> {
        let record = self
            .constraints
            .get(&id)
            .ok_or(PhysicsError::UnknownConstraint(id.0))?;
        if record.handle.is_some() {
            return Ok(());
        }

        let body_handle = |body: BodyId| {
            self.bodies
                .get(&body)
                .and_then(|r| r.handle)
                .ok_or(PhysicsError::BodyDetached {
                    constraint: id.0,
                    body: body.0,
                })
        };
        let handle_a = body_handle(record.desc.body_a)?;
        let handle_b = body_handle(record.desc.body_b)?;

        let joint = build_hinge(&record.desc);
        let handle = self.impulse_joints.insert(handle_a, handle_b, joint, true);
        if let Some(record) = self.constraints.get_mut(&id) {
            record.handle = Some(handle);
        }
        trace!("{id} added to simulation");
        Ok(())
    }

    /// Detach a constraint, keeping its description. Removing a detached
    /// constraint is a no-op.
    pub fn remove_constraint(&mut self, id: ConstraintId) -> Result<(), PhysicsError> {
        let record = self
            .constraints
            .get_mut(&id)
            .ok_or(PhysicsError::UnknownConstraint(id.0))?;
        if let Some(handle) = record.handle.take() {
            self.impulse_joints.remove(handle, true);
            trace!("{id} removed from simulation");
        }
        Ok(())
    }

    pub fn contains_constraint(&self, id: ConstraintId) -> bool {
        self.constraints
            .get(&id)
            .is_some_and(|r| r.handle.is_some())
    }

    /// Number of attached constraints.
    pub fn constraint_count(&self) -> usize {
        self.constraints
            .values()
            .filter(|r| r.handle.is_some())
            .count()
    }

    /// Mutable access to a hinge's motor and axis, attached or not.
    pub fn hinge_mut(&mut self, id: ConstraintId) -> Result<HingeMut<'_>, PhysicsError> {
        let record = self
            .constraints
            .get_mut(&id)
            .ok_or(PhysicsError::UnknownConstraint(id.0))?;
        Ok(HingeMut {
            record,
            joints: &mut self.impulse_joints,
        })
    }

    pub fn hinge(&self, id: ConstraintId) -> Result<&HingeDesc, PhysicsError> {
        self.constraints
            .get(&id)
            .map(|r| &r.desc)
            .ok_or(PhysicsError::UnknownConstraint(id.0))
    }

    // -----------------------------------------------------------------------
    // Stepping
    // -----------------------------------------------------------------------

    /// Advance the simulation by one fixed step.
    pub fn step(&mut self) {
        let gravity = match self.gravity {
            Gravity::Uniform(g) => g,
            Gravity::Radial { .. } => Vector3::zeros(),
        };

        for _ in 0..self.substeps {
            self.apply_radial_gravity();
            self.pipeline.step(
                &gravity,
                &self.integration_parameters,
                &mut self.islands,
                &mut self.broad_phase,
                &mut self.narrow_phase,
                &mut self.rigid_bodies,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                &mut self.ccd_solver,
                None,
                &(),
                &(),
            );
        }
        self.steps += 1;
    }

    /// Replace every dynamic body's user force with its pull toward the origin.
    fn apply_radial_gravity(&mut self) {
        let Gravity::Radial { strength } = self.gravity else {
            return;
        };
        for (_, body) in self.rigid_bodies.iter_mut() {
            if !body.is_dynamic() {
                continue;
            }
            body.reset_forces(false);
            let position = *body.translation();
            let distance = position.norm();
            if distance > RADIAL_GRAVITY_MIN_DISTANCE {
                let force = -position / distance * strength * body.mass();
                body.add_force(force, true);
            }
        }
    }
}

impl std::fmt::Debug for PhysicsWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsWorld")
            .field("gravity", &self.gravity)
            .field("substeps", &self.substeps)
            .field("bodies", &self.body_count())
            .field("constraints", &self.constraint_count())
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

fn build_hinge(desc: &HingeDesc) -> GenericJoint {
    let axis_a = UnitVector3::new_normalize(desc.axis_a);
    let axis_b = UnitVector3::new_normalize(desc.axis_b);
    let mut builder = RevoluteJointBuilder::new(axis_a)
        .local_anchor1(Point3::from(desc.pivot_a))
        .local_anchor2(Point3::from(desc.pivot_b))
        .contacts_enabled(false);
    if let Some(motor) = desc.motor {
        builder = builder
            .motor_model(MotorModel::ForceBased)
            .motor_velocity(motor.target_speed, motor.damping)
            .motor_max_force(motor.max_force);
    }
    let mut joint: GenericJoint = builder.build().into();
    joint.set_local_axis2(axis_b);
    joint
}

// ---------------------------------------------------------------------------
// HingeMut
// ---------------------------------------------------------------------------

/// Write access to one hinge. Changes apply to the stored description and,
/// when attached, to the live joint.
pub struct HingeMut<'w> {
    record: &'w mut ConstraintRecord,
    joints: &'w mut ImpulseJointSet,
}

impl HingeMut<'_> {
    pub fn desc(&self) -> &HingeDesc {
        &self.record.desc
    }

    fn live(&mut self) -> Option<&mut GenericJoint> {
        let handle = self.record.handle?;
        self.joints.get_mut(handle).map(|joint| &mut joint.data)
    }

    /// Set the motor's target speed. Hinges without a motor ignore this.
    pub fn set_motor_speed(&mut self, speed: f32) {
        let Some(motor) = self.record.desc.motor.as_mut() else {
            return;
        };
        motor.target_speed = speed;
        let damping = motor.damping;
        if let Some(joint) = self.live() {
            joint.set_motor_velocity(JointAxis::AngX, speed, damping);
        }
    }

    /// Set the motor's torque limit. Hinges without a motor ignore this.
    pub fn set_motor_max_force(&mut self, max_force: f32) {
        let Some(motor) = self.record.desc.motor.as_mut() else {
            return;
        };
        motor.max_force = max_force;
        if let Some(joint) = self.live() {
            joint.set_motor_max_force(JointAxis::AngX, max_force);
        }
    }

    /// Rewrite the hinge axis in body A's frame. Zero axes are ignored.
    pub fn set_axis_a(&mut self, axis: Vector3<f32>) {
        let Some(unit) = UnitVector3::try_new(axis, f32::EPSILON) else {
            return;
        };
        self.record.desc.axis_a = axis;
        if let Some(joint) = self.live() {
            joint.set_local_axis1(unit);
        }
    }
}
