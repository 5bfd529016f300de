// rally-vehicle: The vehicle core.
//
// `VehicleRig` owns a chassis, four wheels and four hinges inside a
// `PhysicsWorld`. `RecoveryController` samples the chassis on a fixed cadence
// and respawns a vehicle that stays upside down, using `SpawnPointResolver`
// to find a safe point on the terrain. `TransformSync` mirrors the rig into a
// presentation frame with a smoothed chase camera, and `SnapshotTask`
// produces the outbound network snapshots.

pub mod recovery;
pub mod rig;
pub mod snapshot;
pub mod spawn;
pub mod sync;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        recovery::{RecoveryController, RecoveryOutcome, RecoveryState, is_upside_down},
        rig::{RigTransforms, VehicleRig, WheelSlot},
        snapshot::{RemoteVehicle, SnapshotTask, VehicleSnapshot},
        spawn::SpawnPointResolver,
        sync::{ChaseCamera, EnginePitch, TransformSync, VisualFrame},
    };
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use rally_core::config::RallyConfig;

    #[test]
    fn prelude_exports() {
        let config = RallyConfig::default();
        let _recovery = RecoveryController::new(&config.recovery);
        let _resolver = SpawnPointResolver::new(&config.spawn);
        let _sync = TransformSync::new(&config.camera, &config.audio);
        let _frame = VisualFrame::default();
        assert_eq!(WheelSlot::ALL.len(), 4);
    }
}
