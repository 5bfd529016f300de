// rally-core: Pose math, simulation time, configuration and errors shared by
// the rally vehicle crates.

pub mod config;
pub mod error;
pub mod pose;
pub mod time;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        config::RallyConfig,
        error::{ConfigError, PhysicsError, RallyError, RigError, SpawnError},
        pose::Pose,
        time::{Cadence, Clock, SimTime},
    };
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn prelude_exports() {
        let _config = RallyConfig::default();
        let _pose = Pose::identity();
        let _time = SimTime::new();
        let _cadence = Cadence::from_secs(1.0);
        let _clock = Clock::new(1.0 / 60.0);
        let _err: RallyError = SpawnError::TerrainNotLoaded.into();
    }
}
