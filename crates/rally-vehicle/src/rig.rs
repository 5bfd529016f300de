//! The vehicle rig: chassis, four wheels and four hinges.
//!
//! Vehicle frame: +X right, +Y up, -Z forward. Rear hinges carry velocity
//! motors (rear-wheel drive). Front hinges are free; steering rewrites the
//! lateral component of their axis in the chassis frame, which turns the
//! wheels' rolling plane.

use bevy::log::{debug, info};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use rally_core::config::VehicleConfig;
use rally_core::error::{PhysicsError, RigError};
use rally_core::pose::Pose;
use rally_physics::body::{BodyDesc, BodyId, PhysicsMaterial};
use rally_physics::constraint::{ConstraintId, HingeDesc, HingeMotor};
use rally_physics::world::PhysicsWorld;

// ---------------------------------------------------------------------------
// WheelSlot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WheelSlot {
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight,
}

impl WheelSlot {
    /// Slots in storage order.
    pub const ALL: [Self; 4] = [
        Self::FrontLeft,
        Self::FrontRight,
        Self::RearLeft,
        Self::RearRight,
    ];

    pub const fn index(self) -> usize {
        match self {
            Self::FrontLeft => 0,
            Self::FrontRight => 1,
            Self::RearLeft => 2,
            Self::RearRight => 3,
        }
    }

    pub const fn is_front(self) -> bool {
        matches!(self, Self::FrontLeft | Self::FrontRight)
    }

    /// Driven wheels have a motor on their hinge.
    pub const fn is_driven(self) -> bool {
        !self.is_front()
    }

    /// Hinge pivot in chassis space.
    pub fn corner(self, config: &VehicleConfig) -> Vector3<f32> {
        let x = match self {
            Self::FrontLeft | Self::RearLeft => -config.half_track,
            Self::FrontRight | Self::RearRight => config.half_track,
        };
        let z = if self.is_front() {
            -config.half_wheelbase
        } else {
            config.half_wheelbase
        };
        Vector3::new(x, 0.0, z)
    }

    pub const fn radius(self, config: &VehicleConfig) -> f32 {
        if self.is_front() {
            config.front_wheel_radius
        } else {
            config.rear_wheel_radius
        }
    }
}

// ---------------------------------------------------------------------------
// RigTransforms
// ---------------------------------------------------------------------------

/// World poses of the rig's five bodies, read after a physics step.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RigTransforms {
    pub chassis: Pose,
    /// Indexed by [`WheelSlot::index`].
    pub wheels: [Pose; 4],
}

impl RigTransforms {
    pub const fn wheel(&self, slot: WheelSlot) -> &Pose {
        &self.wheels[slot.index()]
    }

    pub fn is_finite(&self) -> bool {
        self.chassis.is_finite() && self.wheels.iter().all(Pose::is_finite)
    }
}

// ---------------------------------------------------------------------------
// VehicleRig
// ---------------------------------------------------------------------------

/// Chassis + four wheels + four hinges registered with a [`PhysicsWorld`].
#[derive(Debug)]
pub struct VehicleRig {
    chassis: BodyId,
    wheels: [BodyId; 4],
    hinges: [ConstraintId; 4],
    corners: [Vector3<f32>; 4],

    max_wheel_speed: f32,
    max_steer: f32,
    /// Commanded rear motor speed in rad/s, positive drives forward.
    forward_velocity: f32,
    /// Lateral component written into the front hinge axes.
    right_velocity: f32,

    enabled: bool,
    transforms: RigTransforms,
}

impl VehicleRig {
    /// Build the rig at `pose` and register every body and hinge with `world`.
    pub fn new(
        world: &mut PhysicsWorld,
        config: &VehicleConfig,
        wheel_material: PhysicsMaterial,
        pose: Pose,
    ) -> Result<Self, PhysicsError> {
        let mut hull = BodyDesc::dynamic(config.chassis_mass)
            .with_ccd(true)
            .with_sleeping(false)
            .at(pose);
        for offset in &config.hull_offsets {
            hull = hull.with_sphere(config.hull_radius, Vector3::from(*offset));
        }
        let chassis = world.create_body(hull)?;

        let corners = WheelSlot::ALL.map(|slot| slot.corner(config));

        let mut wheels = [chassis; 4];
        let mut hinges = [ConstraintId(0); 4];
        for slot in WheelSlot::ALL {
            let corner = corners[slot.index()];
            let wheel = world.create_body(
                BodyDesc::dynamic(config.wheel_mass)
                    .with_sphere(slot.radius(config), Vector3::zeros())
                    .with_material(wheel_material)
                    .with_ccd(true)
                    .with_sleeping(false)
                    .at(pose.compose(&Pose::from_translation(corner))),
            )?;

            let mut hinge = HingeDesc::new(chassis, wheel, corner, Vector3::zeros(), Vector3::x());
            if slot.is_driven() {
                hinge = hinge.with_motor(HingeMotor {
                    target_speed: 0.0,
                    max_force: config.motor_max_torque,
                    damping: config.motor_damping,
                });
            }

            wheels[slot.index()] = wheel;
            hinges[slot.index()] = world.create_hinge(hinge)?;
        }

        let mut rig = Self {
            chassis,
            wheels,
            hinges,
            corners,
            max_wheel_speed: config.max_wheel_speed,
            max_steer: config.max_steer,
            forward_velocity: 0.0,
            right_velocity: 0.0,
            enabled: true,
            transforms: RigTransforms::default(),
        };
        rig.read_transforms(world)?;
        debug!("Vehicle rig built: chassis {chassis}, wheels {wheels:?}");
        Ok(rig)
    }

    // -----------------------------------------------------------------------
    // Inputs
    // -----------------------------------------------------------------------

    /// Store normalized drive inputs. Values are clamped to `[-1, 1]` and
    /// take effect at the next [`step`](Self::step).
    pub fn set_drive_input(&mut self, forward: f32, right: f32) {
        let clamp = |v: f32| if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 };
        self.forward_velocity = clamp(forward) * self.max_wheel_speed;
        self.right_velocity = clamp(right) * self.max_steer;
    }

    pub const fn forward_velocity(&self) -> f32 {
        self.forward_velocity
    }

    pub const fn right_velocity(&self) -> f32 {
        self.right_velocity
    }

    /// Write motor speeds and front axes. Both writes are idempotent.
    fn apply_inputs(&self, world: &mut PhysicsWorld) -> Result<(), PhysicsError> {
        for slot in WheelSlot::ALL {
            let mut hinge = world.hinge_mut(self.hinges[slot.index()])?;
            if slot.is_driven() {
                // Forward is -Z, so the wheels spin negatively about +X.
                hinge.set_motor_speed(-self.forward_velocity);
            } else {
                hinge.set_axis_a(Vector3::new(1.0, 0.0, self.right_velocity));
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Per-frame step
    // -----------------------------------------------------------------------

    /// Reapply inputs (when enabled) and read the bodies' poses. Call once
    /// after each physics step.
    pub fn step(&mut self, world: &mut PhysicsWorld) -> Result<(), RigError> {
        if self.enabled {
            self.apply_inputs(world)?;
        }
        self.read_transforms(world)?;
        Ok(())
    }

    fn read_transforms(&mut self, world: &PhysicsWorld) -> Result<(), PhysicsError> {
        self.transforms.chassis = world.pose(self.chassis)?;
        for (pose, &wheel) in self.transforms.wheels.iter_mut().zip(&self.wheels) {
            *pose = world.pose(wheel)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Detach / reattach / teleport
    // -----------------------------------------------------------------------

    /// Remove all hinges and bodies from the world. No-op when already
    /// detached.
    pub fn detach(&mut self, world: &mut PhysicsWorld) -> Result<(), RigError> {
        if !self.enabled {
            return Ok(());
        }
        for &hinge in &self.hinges {
            world.remove_constraint(hinge)?;
        }
        for &body in self.wheels.iter().chain(std::iter::once(&self.chassis)) {
            world.remove_body(body)?;
        }
        self.enabled = false;
        debug!("Vehicle rig detached");
        Ok(())
    }

    /// Re-add bodies, then whichever of the rig's hinges are missing.
    ///
    /// Safe to call repeatedly: it never duplicates a hinge.
    pub fn reattach(&mut self, world: &mut PhysicsWorld) -> Result<(), RigError> {
        for &body in std::iter::once(&self.chassis).chain(self.wheels.iter()) {
            if !world.contains_body(body) {
                world.add_body(body)?;
            }
        }
        for &hinge in &self.hinges {
            if !world.contains_constraint(hinge) {
                world.add_constraint(hinge)?;
            }
        }
        self.enabled = self.is_present(world);
        if self.enabled {
            debug!("Vehicle rig reattached");
        }
        Ok(())
    }

    /// `true` if every body and hinge of the rig is in the simulation.
    pub fn is_present(&self, world: &PhysicsWorld) -> bool {
        world.contains_body(self.chassis)
            && self.wheels.iter().all(|&w| world.contains_body(w))
            && self.hinges.iter().all(|&h| world.contains_constraint(h))
    }

    /// Place the rig at `pose` with zero velocity. Only valid while detached.
    pub fn teleport(&mut self, world: &mut PhysicsWorld, pose: Pose) -> Result<(), RigError> {
        if self.enabled {
            return Err(RigError::TeleportWhileAttached);
        }

        world.set_pose(self.chassis, pose)?;
        world.set_velocities(self.chassis, Vector3::zeros(), Vector3::zeros())?;
        for (&wheel, corner) in self.wheels.iter().zip(&self.corners) {
            world.set_pose(wheel, pose.compose(&Pose::from_translation(*corner)))?;
            world.set_velocities(wheel, Vector3::zeros(), Vector3::zeros())?;
        }
        self.read_transforms(world)?;
        Ok(())
    }

    /// Detach, clear inputs, teleport to `pose` and reattach.
    ///
    /// Runs to completion between two physics steps, so the world never
    /// steps with the rig half attached.
    pub fn respawn(&mut self, world: &mut PhysicsWorld, pose: Pose) -> Result<(), RigError> {
        self.detach(world)?;
        self.set_drive_input(0.0, 0.0);
        self.apply_inputs(world)?;
        self.teleport(world, pose)?;
        self.reattach(world)?;
        info!(
            "Vehicle respawned at ({:.2}, {:.2}, {:.2})",
            pose.translation.x, pose.translation.y, pose.translation.z
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Poses read by the last [`step`](Self::step) or teleport.
    pub const fn transforms(&self) -> &RigTransforms {
        &self.transforms
    }

    pub const fn chassis_pose(&self) -> Pose {
        self.transforms.chassis
    }

    /// Chassis linear velocity along its forward axis.
    pub fn forward_speed(&self, world: &PhysicsWorld) -> Result<f32, RigError> {
        let pose = world.pose(self.chassis)?;
        Ok(world.linvel(self.chassis)?.dot(&pose.forward()))
    }

    pub const fn chassis(&self) -> BodyId {
        self.chassis
    }

    pub const fn wheel(&self, slot: WheelSlot) -> BodyId {
        self.wheels[slot.index()]
    }

    pub const fn hinge(&self, slot: WheelSlot) -> ConstraintId {
        self.hinges[slot.index()]
    }

    pub const fn corner(&self, slot: WheelSlot) -> Vector3<f32> {
        self.corners[slot.index()]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use rally_physics::world::Gravity;

    use super::*;

    fn rig_in_empty_world() -> (PhysicsWorld, VehicleRig) {
        let mut world = PhysicsWorld::new(Gravity::Uniform(Vector3::zeros()), 1.0 / 60.0, 1);
        let rig = VehicleRig::new(
            &mut world,
            &VehicleConfig::default(),
            PhysicsMaterial::default(),
            Pose::from_translation(Vector3::new(0.0, 5.0, 0.0)),
        )
        .unwrap();
        (world, rig)
    }

    // ---- construction ----

    #[test]
    fn construction_registers_everything() {
        let (world, rig) = rig_in_empty_world();
        assert!(rig.is_enabled());
        assert!(rig.is_present(&world));
        assert_eq!(world.body_count(), 5);
        assert_eq!(world.constraint_count(), 4);
    }

    #[test]
    fn only_rear_hinges_have_motors() {
        let (world, rig) = rig_in_empty_world();
        for slot in WheelSlot::ALL {
            let hinge = world.hinge(rig.hinge(slot)).unwrap();
            assert_eq!(hinge.motor.is_some(), slot.is_driven(), "{slot:?}");
            assert_relative_eq!(hinge.axis_a, Vector3::x());
        }
    }

    #[test]
    fn corners_match_slots() {
        let config = VehicleConfig::default();
        assert_relative_eq!(
            WheelSlot::FrontLeft.corner(&config),
            Vector3::new(-1.0, 0.0, -1.0)
        );
        assert_relative_eq!(
            WheelSlot::RearRight.corner(&config),
            Vector3::new(1.0, 0.0, 1.0)
        );
        assert!(WheelSlot::RearLeft.radius(&config) > WheelSlot::FrontLeft.radius(&config));
    }

    // ---- inputs ----

    #[test]
    fn drive_input_is_clamped_and_scaled() {
        let (_, mut rig) = rig_in_empty_world();
        let config = VehicleConfig::default();
        rig.set_drive_input(3.0, -0.5);
        assert_relative_eq!(rig.forward_velocity(), config.max_wheel_speed);
        assert_relative_eq!(rig.right_velocity(), -0.5 * config.max_steer);
        rig.set_drive_input(f32::NAN, 0.0);
        assert_relative_eq!(rig.forward_velocity(), 0.0);
    }

    #[test]
    fn step_writes_motor_and_axis() {
        let (mut world, mut rig) = rig_in_empty_world();
        rig.set_drive_input(1.0, 1.0);
        // Nothing changes until the next step.
        let rear = rig.hinge(WheelSlot::RearLeft);
        assert_relative_eq!(world.hinge(rear).unwrap().motor.unwrap().target_speed, 0.0);

        rig.step(&mut world).unwrap();
        let config = VehicleConfig::default();
        assert_relative_eq!(
            world.hinge(rear).unwrap().motor.unwrap().target_speed,
            -config.max_wheel_speed
        );
        let front = world.hinge(rig.hinge(WheelSlot::FrontRight)).unwrap();
        assert_relative_eq!(front.axis_a, Vector3::new(1.0, 0.0, config.max_steer));
    }

    #[test]
    fn inputs_ignored_while_detached() {
        let (mut world, mut rig) = rig_in_empty_world();
        rig.detach(&mut world).unwrap();
        rig.set_drive_input(1.0, 0.0);
        rig.step(&mut world).unwrap();
        let rear = world.hinge(rig.hinge(WheelSlot::RearRight)).unwrap();
        assert_relative_eq!(rear.motor.unwrap().target_speed, 0.0);
    }

    // ---- detach / reattach ----

    #[test]
    fn detach_removes_everything_and_is_idempotent() {
        let (mut world, mut rig) = rig_in_empty_world();
        rig.detach(&mut world).unwrap();
        rig.detach(&mut world).unwrap();
        assert!(!rig.is_enabled());
        assert_eq!(world.body_count(), 0);
        assert_eq!(world.constraint_count(), 0);
    }

    #[test]
    fn reattach_twice_keeps_four_constraints() {
        let (mut world, mut rig) = rig_in_empty_world();
        rig.detach(&mut world).unwrap();
        rig.reattach(&mut world).unwrap();
        rig.reattach(&mut world).unwrap();
        assert!(rig.is_enabled());
        assert_eq!(world.body_count(), 5);
        assert_eq!(world.constraint_count(), 4);
    }

    #[test]
    fn reattach_restores_partially_missing_hinges() {
        let (mut world, mut rig) = rig_in_empty_world();
        world.remove_constraint(rig.hinge(WheelSlot::FrontLeft)).unwrap();
        assert_eq!(world.constraint_count(), 3);
        rig.reattach(&mut world).unwrap();
        assert_eq!(world.constraint_count(), 4);
    }

    // ---- teleport ----

    #[test]
    fn teleport_while_attached_is_rejected() {
        let (mut world, mut rig) = rig_in_empty_world();
        let err = rig.teleport(&mut world, Pose::identity()).unwrap_err();
        assert_eq!(err, RigError::TeleportWhileAttached);
    }

    #[test]
    fn respawn_clears_inputs_and_reattaches() {
        let (mut world, mut rig) = rig_in_empty_world();
        rig.set_drive_input(1.0, 1.0);
        rig.step(&mut world).unwrap();

        let target = Pose::from_translation(Vector3::new(3.0, 7.0, -2.0));
        rig.respawn(&mut world, target).unwrap();

        assert!(rig.is_enabled());
        assert_relative_eq!(rig.forward_velocity(), 0.0);
        assert_relative_eq!(rig.chassis_pose().translation, target.translation, epsilon = 1e-5);
        let front = world.hinge(rig.hinge(WheelSlot::FrontLeft)).unwrap();
        assert_relative_eq!(front.axis_a, Vector3::x());
        assert_eq!(world.constraint_count(), 4);
    }
}
