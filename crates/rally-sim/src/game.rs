//! Fixed-timestep driver for a single locally controlled vehicle.
//!
//! [`Game`] owns the physics world and every vehicle subsystem. Each call to
//! [`Game::advance`] banks the frame delta, runs whole physics steps and,
//! between steps, the rig update, recovery sampling and snapshot emission.
//! Presentation is synced once per frame after the last step.

use std::sync::Arc;
use std::time::Duration;

use bevy::log::{debug, info};
use bevy::prelude::Resource;
use nalgebra::Vector3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use rally_core::config::RallyConfig;
use rally_core::error::RallyError;
use rally_core::pose::Pose;
use rally_core::time::{Clock, SimTime};
use rally_physics::body::BodyId;
use rally_physics::terrain::TerrainMesh;
use rally_physics::world::PhysicsWorld;
use rally_vehicle::recovery::{RecoveryController, RecoveryOutcome};
use rally_vehicle::rig::VehicleRig;
use rally_vehicle::snapshot::{SnapshotTask, VehicleSnapshot};
use rally_vehicle::spawn::SpawnPointResolver;
use rally_vehicle::sync::{TransformSync, VisualFrame};

/// Physics steps allowed per [`Game::advance`] call before the backlog is
/// dropped.
pub const MAX_STEPS_PER_FRAME: u32 = 8;

/// Snapshot id of the locally controlled vehicle.
pub const LOCAL_VEHICLE_ID: u32 = 0;

// ---------------------------------------------------------------------------
// GameStats
// ---------------------------------------------------------------------------

/// Running totals since the game was created.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GameStats {
    /// Fixed physics steps taken.
    pub steps: u64,
    /// Chassis path length in metres while attached. Teleports do not count.
    pub distance: f32,
    /// Automatic upside-down recoveries.
    pub recoveries: u32,
    /// Explicit respawns (terrain load, new game, respawn requests).
    pub respawns: u32,
    /// Outbound snapshots produced.
    pub snapshots: u64,
}

// ---------------------------------------------------------------------------
// Game
// ---------------------------------------------------------------------------

#[derive(Resource)]
pub struct Game {
    config: RallyConfig,
    world: PhysicsWorld,
    rig: VehicleRig,
    recovery: RecoveryController,
    resolver: SpawnPointResolver,
    sync: TransformSync,
    snapshots: SnapshotTask,
    terrain: Option<(BodyId, Arc<TerrainMesh>)>,
    clock: Clock,
    rng: ChaCha8Rng,

    frame: VisualFrame,
    pending_snapshot: Option<VehicleSnapshot>,
    last_position: Option<Vector3<f32>>,
    stats: GameStats,
}

impl Game {
    /// Validate `config` and build the world and rig.
    ///
    /// The rig starts detached; it enters the simulation once terrain is
    /// loaded and a spawn point is found.
    pub fn new(config: RallyConfig) -> Result<Self, RallyError> {
        config.validate()?;

        let mut world = PhysicsWorld::from_config(&config.physics);
        let mut rig = VehicleRig::new(
            &mut world,
            &config.vehicle,
            config.physics.wheel.into(),
            Pose::identity(),
        )?;
        rig.detach(&mut world)?;

        let game = Self {
            recovery: RecoveryController::new(&config.recovery),
            resolver: SpawnPointResolver::new(&config.spawn),
            sync: TransformSync::new(&config.camera, &config.audio),
            snapshots: SnapshotTask::new(LOCAL_VEHICLE_ID, config.network.snapshot_hz),
            terrain: None,
            clock: Clock::new(config.physics.dt).with_max_steps(MAX_STEPS_PER_FRAME),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            frame: VisualFrame::default(),
            pending_snapshot: None,
            last_position: None,
            stats: GameStats::default(),
            config,
            world,
            rig,
        };
        info!("Game created (seed {})", game.config.seed);
        Ok(game)
    }

    // -----------------------------------------------------------------------
    // Terrain and respawn
    // -----------------------------------------------------------------------

    /// Install `mesh` as the static terrain and spawn the vehicle on it.
    ///
    /// A previously loaded terrain is taken out of the simulation first.
    pub fn load_terrain(&mut self, mesh: Arc<TerrainMesh>) -> Result<Pose, RallyError> {
        if let Some((old, _)) = self.terrain.take() {
            self.world.remove_body(old)?;
        }
        let body = self
            .world
            .add_static_mesh(Arc::clone(&mesh), self.config.physics.ground.into())?;
        info!(
            "Terrain loaded: {} triangles as {body}",
            mesh.triangle_count()
        );
        self.resolver.set_terrain(Arc::clone(&mesh));
        self.terrain = Some((body, mesh));
        self.respawn_random()
    }

    /// Respawn at a uniformly random point on the terrain.
    pub fn respawn_random(&mut self) -> Result<Pose, RallyError> {
        let pose = self.resolver.resolve(None, &mut self.rng)?;
        self.respawn_at(pose)?;
        Ok(pose)
    }

    /// Respawn at `pose`: detach, clear inputs, teleport, reattach.
    pub fn respawn_at(&mut self, pose: Pose) -> Result<(), RallyError> {
        self.rig.respawn(&mut self.world, pose)?;
        self.recovery.reset(self.clock.time());
        self.sync.request_camera_snap();
        self.last_position = None;
        self.stats.respawns += 1;
        Ok(())
    }

    /// Take the vehicle out of the simulation (death). Inputs stop having an
    /// effect until the next respawn.
    pub fn destroy(&mut self) -> Result<(), RallyError> {
        self.rig.detach(&mut self.world)?;
        self.last_position = None;
        info!("Vehicle destroyed at {}", self.clock.time());
        Ok(())
    }

    pub fn set_drive_input(&mut self, forward: f32, right: f32) {
        self.rig.set_drive_input(forward, right);
    }

    // -----------------------------------------------------------------------
    // Frame loop
    // -----------------------------------------------------------------------

    /// Bank `frame_dt` and run every physics step it pays for, then sync the
    /// presentation frame. Returns the number of steps taken.
    pub fn advance(&mut self, frame_dt: Duration) -> Result<u32, RallyError> {
        self.clock.tick(frame_dt);
        let mut steps = 0;
        while self.clock.should_step() {
            self.clock.advance();
            self.fixed_step()?;
            steps += 1;
        }
        if steps == MAX_STEPS_PER_FRAME {
            debug!("Step cap reached, dropping backlog");
            self.clock.discard_backlog();
        }

        self.sync.sync(
            self.rig.transforms(),
            self.rig.forward_velocity(),
            &mut self.frame,
            &mut self.rng,
        );
        Ok(steps)
    }

    fn fixed_step(&mut self) -> Result<(), RallyError> {
        let now = self.clock.time();
        self.world.step();
        self.rig.step(&mut self.world)?;
        self.stats.steps += 1;

        if self.rig.is_enabled() {
            let position = self.rig.chassis_pose().translation;
            if let Some(last) = self.last_position {
                self.stats.distance += (position - last).norm();
            }
            self.last_position = Some(position);
        }

        let outcome = self.recovery.tick(
            now,
            &mut self.rig,
            &mut self.world,
            &self.resolver,
            &mut self.rng,
        )?;
        if let RecoveryOutcome::Recovered(_) = outcome {
            self.stats.recoveries += 1;
            self.sync.request_camera_snap();
            self.last_position = None;
        }

        if self.rig.is_enabled() {
            if let Some(snapshot) = self.snapshots.poll(now, self.rig.transforms()) {
                self.pending_snapshot = Some(snapshot);
                self.stats.snapshots += 1;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub const fn config(&self) -> &RallyConfig {
        &self.config
    }

    pub const fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    pub const fn rig(&self) -> &VehicleRig {
        &self.rig
    }

    pub const fn recovery(&self) -> &RecoveryController {
        &self.recovery
    }

    /// Presentation state written by the last [`advance`](Self::advance).
    pub const fn frame(&self) -> &VisualFrame {
        &self.frame
    }

    pub fn terrain(&self) -> Option<&Arc<TerrainMesh>> {
        self.terrain.as_ref().map(|(_, mesh)| mesh)
    }

    pub const fn time(&self) -> SimTime {
        self.clock.time()
    }

    pub const fn stats(&self) -> &GameStats {
        &self.stats
    }

    /// The most recent snapshot not yet taken. Older unsent snapshots are
    /// superseded.
    pub fn take_snapshot(&mut self) -> Option<VehicleSnapshot> {
        self.pending_snapshot.take()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
