//! Bevy systems connecting [`Game`] to the ECS.
//!
//! Run in order each `Update`: input → advance → visuals → snapshot.

use bevy::log::error;
use bevy::prelude::*;

use rally_core::pose::Pose;
use rally_vehicle::rig::WheelSlot;
use rally_vehicle::snapshot::VehicleSnapshot;
use rally_vehicle::sync::VisualFrame;

use crate::game::Game;
use crate::input::DriveInput;

// ---------------------------------------------------------------------------
// Components and resources
// ---------------------------------------------------------------------------

/// Tags an entity whose [`Transform`] mirrors part of the local vehicle.
#[derive(Component, Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisualPart {
    Chassis,
    Wheel(WheelSlot),
    Camera,
}

impl VisualPart {
    /// The pose this part takes from `frame`.
    pub const fn pose(self, frame: &VisualFrame) -> Pose {
        match self {
            Self::Chassis => frame.chassis,
            Self::Wheel(slot) => frame.wheels[slot.index()],
            Self::Camera => frame.camera,
        }
    }
}

/// The last snapshot handed to the network layer.
#[derive(Resource, Clone, Debug, Default)]
pub struct LatestSnapshot {
    pub snapshot: Option<VehicleSnapshot>,
    /// Snapshots published so far.
    pub published: u64,
}

/// Convert a physics pose into a Bevy transform with unit scale.
pub fn pose_to_transform(pose: &Pose) -> Transform {
    let t = pose.translation;
    let q = pose.rotation.quaternion();
    Transform::from_translation(Vec3::new(t.x, t.y, t.z))
        .with_rotation(Quat::from_xyzw(q.i, q.j, q.k, q.w))
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

/// Copy the buffered drive input into the game.
#[allow(clippy::needless_pass_by_value)]
pub fn apply_drive_input(input: Res<DriveInput>, game: Option<ResMut<Game>>) {
    if let Some(mut game) = game {
        game.set_drive_input(input.throttle, input.steer);
    }
}

/// Advance the game by this frame's delta.
#[allow(clippy::needless_pass_by_value)]
pub fn advance_game(time: Res<Time>, game: Option<ResMut<Game>>) {
    let Some(mut game) = game else {
        return;
    };
    if let Err(err) = game.advance(time.delta()) {
        error!("Game step failed: {err}");
    }
}

/// Write the latest visual frame into every tagged entity.
#[allow(clippy::needless_pass_by_value)]
pub fn apply_visuals(game: Option<Res<Game>>, mut parts: Query<(&VisualPart, &mut Transform)>) {
    let Some(game) = game else {
        return;
    };
    let frame = game.frame();
    for (part, mut transform) in &mut parts {
        *transform = pose_to_transform(&part.pose(frame));
    }
}

/// Move a freshly emitted snapshot into [`LatestSnapshot`].
pub fn publish_snapshot(game: Option<ResMut<Game>>, mut latest: ResMut<LatestSnapshot>) {
    let Some(mut game) = game else {
        return;
    };
    if let Some(snapshot) = game.take_snapshot() {
        latest.snapshot = Some(snapshot);
        latest.published += 1;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use nalgebra::{UnitQuaternion, Vector3};

    use super::*;

    #[test]
    fn pose_to_transform_preserves_rotation() {
        let pose = Pose::new(
            Vector3::new(1.0, 2.0, 3.0),
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), FRAC_PI_2),
        );
        let transform = pose_to_transform(&pose);
        assert_eq!(transform.translation, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(transform.scale, Vec3::ONE);
        // +X rotated a quarter turn about +Y is -Z.
        let rotated = transform.rotation * Vec3::X;
        assert!((rotated - Vec3::NEG_Z).length() < 1e-5, "{rotated}");
    }

    #[test]
    fn visual_part_selects_pose() {
        let mut frame = VisualFrame::default();
        frame.wheels[WheelSlot::RearRight.index()] =
            Pose::from_translation(Vector3::new(0.0, 0.0, 9.0));
        frame.camera = Pose::from_translation(Vector3::new(0.0, 7.0, 0.0));

        assert_eq!(
            VisualPart::Wheel(WheelSlot::RearRight).pose(&frame).translation.z,
            9.0
        );
        assert_eq!(VisualPart::Camera.pose(&frame).translation.y, 7.0);
        assert_eq!(VisualPart::Chassis.pose(&frame), Pose::identity());
    }

    #[test]
    fn systems_without_game_are_noops() {
        let mut app = App::new();
        app.init_resource::<Time>()
            .init_resource::<DriveInput>()
            .init_resource::<LatestSnapshot>()
            .add_systems(
                Update,
                (apply_drive_input, advance_game, apply_visuals, publish_snapshot).chain(),
            );
        app.world_mut().spawn((VisualPart::Chassis, Transform::IDENTITY));
        app.update();
        assert!(app.world().resource::<LatestSnapshot>().snapshot.is_none());
    }
}
