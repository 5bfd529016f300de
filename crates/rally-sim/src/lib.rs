//! Game loop and Bevy integration for the rally vehicle core.
//!
//! [`Game`] drives physics, the vehicle rig, recovery and snapshots at a
//! fixed timestep. [`RallySimPlugin`] exposes it to a Bevy app along with a
//! [`DriveInput`] buffer and the presentation systems.
//!
//! # Example
//!
//! ```no_run
//! use bevy::prelude::*;
//! use rally_core::config::RallyConfig;
//! use rally_sim::RallySimPlugin;
//!
//! App::new()
//!     .add_plugins(RallySimPlugin::new(RallyConfig::default()))
//!     .run();
//! ```

pub mod game;
pub mod input;
pub mod systems;

use bevy::log::error;
use bevy::prelude::*;
use rally_core::config::RallyConfig;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use game::{Game, GameStats};
pub use input::DriveInput;
pub use systems::{LatestSnapshot, VisualPart};

// ---------------------------------------------------------------------------
// RallySet
// ---------------------------------------------------------------------------

/// Ordering of the per-frame systems.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RallySet {
    /// Input buffers are copied into the game.
    Input,
    /// Fixed physics steps, rig updates, recovery.
    Simulate,
    /// Visual transforms and outbound snapshots.
    Present,
}

// ---------------------------------------------------------------------------
// RallySimPlugin
// ---------------------------------------------------------------------------

/// Inserts the [`Game`] built from a [`RallyConfig`] and schedules its
/// systems in `Update`.
///
/// Terrain is not loaded here; call [`Game::load_terrain`] once the mesh is
/// available.
pub struct RallySimPlugin {
    config: RallyConfig,
}

impl RallySimPlugin {
    pub const fn new(config: RallyConfig) -> Self {
        Self { config }
    }
}

impl Default for RallySimPlugin {
    fn default() -> Self {
        Self::new(RallyConfig::default())
    }
}

impl Plugin for RallySimPlugin {
    fn build(&self, app: &mut App) {
        match Game::new(self.config.clone()) {
            Ok(game) => {
                app.insert_resource(game);
            }
            Err(err) => error!("Rally game not created: {err}"),
        }

        app.insert_resource(self.config.clone())
            .init_resource::<Time>()
            .init_resource::<DriveInput>()
            .init_resource::<LatestSnapshot>()
            .configure_sets(
                Update,
                (RallySet::Input, RallySet::Simulate, RallySet::Present).chain(),
            )
            .add_systems(Update, systems::apply_drive_input.in_set(RallySet::Input))
            .add_systems(Update, systems::advance_game.in_set(RallySet::Simulate))
            .add_systems(
                Update,
                (systems::apply_visuals, systems::publish_snapshot)
                    .chain()
                    .in_set(RallySet::Present),
            );
    }
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        DriveInput, Game, GameStats, LatestSnapshot, RallySet, RallySimPlugin, VisualPart,
        systems::pose_to_transform,
    };
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
