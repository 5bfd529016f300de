//! Network snapshots of a vehicle's body poses.
//!
//! Transport is out of scope: snapshots are plain serde values with a JSON
//! encoding, emitted at a fixed rate and applied verbatim on the receiving
//! side.

use bevy::log::trace;
use serde::{Deserialize, Serialize};

use rally_core::pose::Pose;
use rally_core::time::{Cadence, SimTime};

use crate::rig::RigTransforms;

// ---------------------------------------------------------------------------
// VehicleSnapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    /// Sender's vehicle id.
    pub id: u32,
    /// Monotonic per-sender counter.
    pub sequence: u64,
    /// Sender simulation time in seconds.
    pub time: f64,
    pub chassis: Pose,
    pub wheels: [Pose; 4],
}

impl VehicleSnapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub const fn transforms(&self) -> RigTransforms {
        RigTransforms {
            chassis: self.chassis,
            wheels: self.wheels,
        }
    }
}

// ---------------------------------------------------------------------------
// SnapshotTask
// ---------------------------------------------------------------------------

/// Emits at most one snapshot per poll, at the configured rate.
#[derive(Debug, Clone)]
pub struct SnapshotTask {
    id: u32,
    cadence: Cadence,
    sequence: u64,
}

impl SnapshotTask {
    /// `hz <= 0` disables emission.
    pub fn new(id: u32, hz: f64) -> Self {
        Self {
            id,
            cadence: Cadence::from_hz(hz),
            sequence: 0,
        }
    }

    /// Snapshot of `transforms` if one is due at `now`. Missed periods are
    /// collapsed into a single snapshot.
    pub fn poll(&mut self, now: SimTime, transforms: &RigTransforms) -> Option<VehicleSnapshot> {
        if self.cadence.poll(now) == 0 {
            return None;
        }
        let snapshot = VehicleSnapshot {
            id: self.id,
            sequence: self.sequence,
            time: now.secs_f64(),
            chassis: transforms.chassis,
            wheels: transforms.wheels,
        };
        self.sequence += 1;
        trace!("Snapshot {} for vehicle {}", snapshot.sequence, self.id);
        Some(snapshot)
    }

    /// Snapshots emitted so far.
    pub const fn emitted(&self) -> u64 {
        self.sequence
    }
}

// ---------------------------------------------------------------------------
// RemoteVehicle
// ---------------------------------------------------------------------------

/// Presentation state of another player's vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteVehicle {
    id: u32,
    transforms: RigTransforms,
    last_sequence: Option<u64>,
}

impl RemoteVehicle {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            transforms: RigTransforms::default(),
            last_sequence: None,
        }
    }

    /// Overwrite the remote transforms with `snapshot`.
    ///
    /// Snapshots for another vehicle, or older than the last one applied,
    /// are ignored. Returns whether the snapshot was applied.
    pub fn apply(&mut self, snapshot: &VehicleSnapshot) -> bool {
        if snapshot.id != self.id {
            return false;
        }
        if self.last_sequence.is_some_and(|last| snapshot.sequence <= last) {
            return false;
        }
        self.transforms = snapshot.transforms();
        self.last_sequence = Some(snapshot.sequence);
        true
    }

    pub const fn id(&self) -> u32 {
        self.id
    }

    pub const fn transforms(&self) -> &RigTransforms {
        &self.transforms
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use nalgebra::{UnitQuaternion, Vector3};

    use super::*;

    fn sample_transforms() -> RigTransforms {
        let chassis = Pose::new(
            Vector3::new(1.0, 52.0, -3.0),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.25),
        );
        RigTransforms {
            chassis,
            wheels: [
                chassis.compose(&Pose::from_translation(Vector3::new(-1.0, 0.0, -1.0))),
                chassis.compose(&Pose::from_translation(Vector3::new(1.0, 0.0, -1.0))),
                chassis.compose(&Pose::from_translation(Vector3::new(-1.0, 0.0, 1.0))),
                chassis.compose(&Pose::from_translation(Vector3::new(1.0, 0.0, 1.0))),
            ],
        }
    }

    // ---- task ----

    #[test]
    fn task_emits_at_twenty_hertz() {
        let mut task = SnapshotTask::new(1, 20.0);
        let transforms = sample_transforms();
        let mut emitted = 0;
        // One second of 120 Hz polling, starting at t = 0.
        for i in 0..=120 {
            let now = SimTime::from_secs(f64::from(i) / 120.0);
            if task.poll(now, &transforms).is_some() {
                emitted += 1;
            }
        }
        assert_eq!(emitted, 20);
        assert_eq!(task.emitted(), 20);
    }

    #[test]
    fn task_collapses_missed_periods() {
        let mut task = SnapshotTask::new(1, 20.0);
        let transforms = sample_transforms();
        assert!(task.poll(SimTime::new(), &transforms).is_none());
        let snap = task.poll(SimTime::from_secs(1.0), &transforms).unwrap();
        assert_eq!(snap.sequence, 0);
        assert!(task.poll(SimTime::from_secs(1.0), &transforms).is_none());
    }

    #[test]
    fn disabled_task_never_emits() {
        let mut task = SnapshotTask::new(1, 0.0);
        let transforms = sample_transforms();
        for i in 0..100 {
            assert!(task.poll(SimTime::from_secs(f64::from(i)), &transforms).is_none());
        }
    }

    // ---- JSON ----

    #[test]
    fn json_encoding_has_expected_fields() {
        let mut task = SnapshotTask::new(9, 20.0);
        task.poll(SimTime::new(), &sample_transforms());
        let snap = task.poll(SimTime::from_secs(0.05), &sample_transforms()).unwrap();

        let json = snap.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["id"], 9);
        assert_eq!(value["sequence"], 0);
        assert_eq!(value["wheels"].as_array().unwrap().len(), 4);
        assert!(value["chassis"]["translation"].is_array());

        assert_eq!(VehicleSnapshot::from_json(&json).unwrap(), snap);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(VehicleSnapshot::from_json("{\"id\": 1}").is_err());
    }

    // ---- remote ----

    #[test]
    fn remote_applies_newer_snapshots_only() {
        let mut remote = RemoteVehicle::new(4);
        let transforms = sample_transforms();
        let mut snap = VehicleSnapshot {
            id: 4,
            sequence: 5,
            time: 0.25,
            chassis: transforms.chassis,
            wheels: transforms.wheels,
        };

        assert!(remote.apply(&snap));
        assert_eq!(remote.transforms(), &transforms);

        snap.sequence = 3;
        snap.chassis = Pose::identity();
        assert!(!remote.apply(&snap));
        assert_eq!(remote.transforms().chassis, transforms.chassis);
    }

    #[test]
    fn remote_ignores_other_vehicles() {
        let mut remote = RemoteVehicle::new(4);
        let snap = VehicleSnapshot {
            id: 5,
            sequence: 0,
            time: 0.0,
            chassis: Pose::identity(),
            wheels: [Pose::identity(); 4],
        };
        assert!(!remote.apply(&snap));
        assert_eq!(remote.id(), 4);
    }
}
