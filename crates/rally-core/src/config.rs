use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_physics_dt() -> f64 {
    1.0 / 60.0
}
const fn default_substeps() -> u32 {
    2
}
const fn default_gravity_strength() -> f32 {
    9.82
}
const fn default_seed() -> u64 {
    0
}
fn default_hull_offsets() -> Vec<[f32; 3]> {
    vec![
        [0.0, 0.0, 0.0],
        [0.0, -0.1, -1.3],
        [0.0, -0.1, 1.3],
        [1.0, -0.1, 0.0],
        [-1.0, -0.1, 0.0],
    ]
}

// ---------------------------------------------------------------------------
// RallyConfig
// ---------------------------------------------------------------------------

/// Complete configuration for the vehicle core.
///
/// Every field has a default, so a TOML file only needs the values it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Resource)]
pub struct RallyConfig {
    /// Master random seed (spawn directions, engine pitch jitter).
    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default)]
    pub physics: PhysicsConfig,

    #[serde(default)]
    pub vehicle: VehicleConfig,

    #[serde(default)]
    pub recovery: RecoveryConfig,

    #[serde(default)]
    pub spawn: SpawnConfig,

    #[serde(default)]
    pub camera: CameraConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub network: NetworkConfig,
}

impl Default for RallyConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            physics: PhysicsConfig::default(),
            vehicle: VehicleConfig::default(),
            recovery: RecoveryConfig::default(),
            spawn: SpawnConfig::default(),
            camera: CameraConfig::default(),
            audio: AudioConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl RallyConfig {
    /// Validate every section. Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.physics.validate()?;
        self.vehicle.validate()?;
        self.recovery.validate()?;
        self.spawn.validate()?;
        self.camera.validate()?;
        self.audio.validate()?;
        self.network.validate()?;
        Ok(())
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Render as pretty TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

// ---------------------------------------------------------------------------
// PhysicsConfig
// ---------------------------------------------------------------------------

/// How gravity is applied to dynamic bodies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum GravityConfig {
    /// Constant acceleration vector in m/s^2.
    Uniform { vector: [f32; 3] },
    /// Acceleration of `strength` m/s^2 toward the world origin (planet).
    Radial { strength: f32 },
}

impl Default for GravityConfig {
    fn default() -> Self {
        Self::Radial {
            strength: default_gravity_strength(),
        }
    }
}

/// Surface material parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaterialConfig {
    pub friction: f32,
    #[serde(default)]
    pub restitution: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Fixed step in seconds (default: 1/60).
    pub dt: f64,
    /// Solver substeps per fixed step.
    pub substeps: u32,
    pub gravity: GravityConfig,
    /// Static terrain material.
    pub ground: MaterialConfig,
    /// Wheel material.
    pub wheel: MaterialConfig,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            dt: default_physics_dt(),
            substeps: default_substeps(),
            gravity: GravityConfig::default(),
            ground: MaterialConfig {
                friction: 0.8,
                restitution: 0.0,
            },
            wheel: MaterialConfig {
                friction: 1.0,
                restitution: 0.0,
            },
        }
    }
}

impl PhysicsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dt <= 0.0 || !self.dt.is_finite() {
            return Err(ConfigError::InvalidPhysicsDt(self.dt));
        }
        if self.substeps == 0 {
            return Err(ConfigError::invalid("physics.substeps", "must be >= 1"));
        }
        let gravity_finite = match self.gravity {
            GravityConfig::Uniform { vector } => vector.iter().all(|c| c.is_finite()),
            GravityConfig::Radial { strength } => strength.is_finite(),
        };
        if !gravity_finite {
            return Err(ConfigError::invalid("physics.gravity", "must be finite"));
        }
        for (field, material) in [("physics.ground", self.ground), ("physics.wheel", self.wheel)] {
            let values = [material.friction, material.restitution];
            if values.iter().any(|&v| v < 0.0 || !v.is_finite()) {
                return Err(ConfigError::invalid(
                    field,
                    "friction and restitution must be finite and >= 0",
                ));
            }
        }
        Ok(())
    }

    /// Length of one solver substep in seconds.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn substep_dt(&self) -> f32 {
        (self.dt / f64::from(self.substeps.max(1))) as f32
    }
}

// ---------------------------------------------------------------------------
// VehicleConfig
// ---------------------------------------------------------------------------

/// Geometry and drivetrain of the vehicle rig.
///
/// Vehicle frame: +X right, +Y up, -Z forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub chassis_mass: f32,
    /// Radius of each hull sphere.
    pub hull_radius: f32,
    /// Hull sphere centers in chassis space.
    pub hull_offsets: Vec<[f32; 3]>,
    pub wheel_mass: f32,
    pub front_wheel_radius: f32,
    pub rear_wheel_radius: f32,
    /// Lateral distance from the chassis center to each wheel pivot.
    pub half_track: f32,
    /// Longitudinal distance from the chassis center to each axle.
    pub half_wheelbase: f32,
    /// Rear motor target speed (rad/s) at full forward input.
    pub max_wheel_speed: f32,
    /// Maximum torque each rear motor may apply.
    pub motor_max_torque: f32,
    /// Velocity gain of the rear motors.
    pub motor_damping: f32,
    /// Front hinge axis lateral component at full steering input.
    pub max_steer: f32,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            chassis_mass: 1.0,
            hull_radius: 0.1,
            hull_offsets: default_hull_offsets(),
            wheel_mass: 1.0,
            front_wheel_radius: 0.35,
            rear_wheel_radius: 0.4,
            half_track: 1.0,
            half_wheelbase: 1.0,
            max_wheel_speed: 40.0,
            motor_max_torque: 4.0,
            motor_damping: 10.0,
            max_steer: 0.5,
        }
    }
}

impl VehicleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("vehicle.chassis_mass", self.chassis_mass),
            ("vehicle.hull_radius", self.hull_radius),
            ("vehicle.wheel_mass", self.wheel_mass),
            ("vehicle.front_wheel_radius", self.front_wheel_radius),
            ("vehicle.rear_wheel_radius", self.rear_wheel_radius),
            ("vehicle.half_track", self.half_track),
            ("vehicle.half_wheelbase", self.half_wheelbase),
        ];
        for (field, value) in positive {
            if value <= 0.0 || !value.is_finite() {
                return Err(ConfigError::invalid(field, format!("must be > 0, got {value}")));
            }
        }
        if self.hull_offsets.is_empty() {
            return Err(ConfigError::invalid("vehicle.hull_offsets", "needs at least one sphere"));
        }
        if self.hull_offsets.iter().flatten().any(|c| !c.is_finite()) {
            return Err(ConfigError::invalid("vehicle.hull_offsets", "must be finite"));
        }
        let non_negative = [
            ("vehicle.max_wheel_speed", self.max_wheel_speed),
            ("vehicle.motor_max_torque", self.motor_max_torque),
            ("vehicle.motor_damping", self.motor_damping),
        ];
        for (field, value) in non_negative {
            if value < 0.0 || !value.is_finite() {
                return Err(ConfigError::invalid(field, format!("must be >= 0, got {value}")));
            }
        }
        if !(0.0..=1.0).contains(&self.max_steer) {
            return Err(ConfigError::invalid("vehicle.max_steer", "must be in [0, 1]"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecoveryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Seconds between upside-down samples.
    pub sample_period_secs: f64,
    /// Recovery fires once the flipped counter exceeds this value.
    pub flip_threshold: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            sample_period_secs: 1.0,
            flip_threshold: 3,
        }
    }
}

impl RecoveryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_period_secs <= 0.0 || !self.sample_period_secs.is_finite() {
            return Err(ConfigError::invalid(
                "recovery.sample_period_secs",
                format!("must be > 0, got {}", self.sample_period_secs),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SpawnConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    /// Distance from the origin at which spawn rays start. Must lie outside
    /// the terrain.
    pub cast_distance: f32,
    /// Height above the hit point at which the vehicle is placed.
    pub clearance: f32,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            cast_distance: 200.0,
            clearance: 4.0,
        }
    }
}

impl SpawnConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cast_distance <= 0.0 || !self.cast_distance.is_finite() {
            return Err(ConfigError::invalid("spawn.cast_distance", "must be > 0"));
        }
        if self.clearance < 0.0 || !self.clearance.is_finite() {
            return Err(ConfigError::invalid("spawn.clearance", "must be >= 0"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CameraConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Chase camera offset in chassis space.
    pub offset: [f32; 3],
    /// Fraction of the remaining distance covered each frame.
    pub smoothing: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            offset: [0.0, 4.0, 4.0],
            smoothing: 0.1,
        }
    }
}

impl CameraConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.smoothing <= 0.0 || self.smoothing > 1.0 || self.smoothing.is_nan() {
            return Err(ConfigError::invalid("camera.smoothing", "must be in (0, 1]"));
        }
        if !self.offset.iter().all(|c| c.is_finite()) {
            return Err(ConfigError::invalid("camera.offset", "must be finite"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Engine pitch = `base + |forward velocity| * speed_scale + U(0, jitter)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub engine_pitch_base: f32,
    pub engine_pitch_speed_scale: f32,
    pub engine_pitch_jitter: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            engine_pitch_base: 0.0,
            engine_pitch_speed_scale: 1.0 / 50.0,
            engine_pitch_jitter: 1.0 / 9.0,
        }
    }
}

impl AudioConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_negative = [
            ("audio.engine_pitch_base", self.engine_pitch_base),
            ("audio.engine_pitch_speed_scale", self.engine_pitch_speed_scale),
            ("audio.engine_pitch_jitter", self.engine_pitch_jitter),
        ];
        for (field, value) in non_negative {
            if value < 0.0 || !value.is_finite() {
                return Err(ConfigError::invalid(field, format!("must be >= 0, got {value}")));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// NetworkConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Outbound snapshot rate in Hz. Zero disables snapshots.
    pub snapshot_hz: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { snapshot_hz: 20.0 }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.snapshot_hz < 0.0 || !self.snapshot_hz.is_finite() {
            return Err(ConfigError::invalid("network.snapshot_hz", "must be >= 0"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- defaults ----

    #[test]
    fn default_config_is_valid() {
        RallyConfig::default().validate().unwrap();
    }

    #[test]
    fn defaults_match_game_constants() {
        let cfg = RallyConfig::default();
        assert!((cfg.recovery.sample_period_secs - 1.0).abs() < f64::EPSILON);
        assert_eq!(cfg.recovery.flip_threshold, 3);
        assert!((cfg.spawn.cast_distance - 200.0).abs() < f32::EPSILON);
        assert!((cfg.spawn.clearance - 4.0).abs() < f32::EPSILON);
        assert!((cfg.camera.smoothing - 0.1).abs() < f32::EPSILON);
        assert!((cfg.network.snapshot_hz - 20.0).abs() < f64::EPSILON);
        assert_eq!(cfg.vehicle.hull_offsets.len(), 5);
        assert!(matches!(cfg.physics.gravity, GravityConfig::Radial { .. }));
    }

    #[test]
    fn substep_dt_divides_step() {
        let physics = PhysicsConfig {
            dt: 0.02,
            substeps: 4,
            ..PhysicsConfig::default()
        };
        assert!((physics.substep_dt() - 0.005).abs() < 1e-7);
    }

    // ---- validation ----

    #[test]
    fn validate_rejects_non_positive_dt() {
        let mut cfg = RallyConfig::default();
        cfg.physics.dt = 0.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidPhysicsDt(_))));
    }

    #[test]
    fn validate_rejects_zero_substeps() {
        let mut cfg = RallyConfig::default();
        cfg.physics.substeps = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_wheel_radius() {
        let mut cfg = RallyConfig::default();
        cfg.vehicle.rear_wheel_radius = -0.4;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("rear_wheel_radius"));
    }

    #[test]
    fn validate_rejects_empty_hull() {
        let mut cfg = RallyConfig::default();
        cfg.vehicle.hull_offsets.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_smoothing() {
        let mut cfg = RallyConfig::default();
        cfg.camera.smoothing = 1.5;
        assert!(cfg.validate().is_err());
        cfg.camera.smoothing = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_sample_period() {
        let mut cfg = RallyConfig::default();
        cfg.recovery.sample_period_secs = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_finite_values() {
        let cases: [fn(&mut RallyConfig); 10] = [
            |c| c.physics.ground.friction = f32::NAN,
            |c| c.physics.gravity = GravityConfig::Radial { strength: f32::INFINITY },
            |c| c.vehicle.max_wheel_speed = f32::NAN,
            |c| c.vehicle.motor_max_torque = f32::INFINITY,
            |c| c.vehicle.hull_offsets[0][1] = f32::NAN,
            |c| c.spawn.cast_distance = f32::NAN,
            |c| c.spawn.clearance = f32::INFINITY,
            |c| c.camera.smoothing = f32::NAN,
            |c| c.camera.offset[2] = f32::NEG_INFINITY,
            |c| c.audio.engine_pitch_speed_scale = f32::NAN,
        ];
        for (i, corrupt) in cases.iter().enumerate() {
            let mut cfg = RallyConfig::default();
            corrupt(&mut cfg);
            assert!(cfg.validate().is_err(), "case {i} accepted");
        }
    }

    #[test]
    fn validate_rejects_negative_audio_jitter() {
        let mut cfg = RallyConfig::default();
        cfg.audio.engine_pitch_jitter = -0.1;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("engine_pitch_jitter"));
    }

    // ---- TOML ----

    #[test]
    fn toml_partial_document_keeps_defaults() {
        let cfg = RallyConfig::from_toml_str(
            r"
            seed = 11

            [recovery]
            flip_threshold = 5

            [physics.gravity]
            mode = 'uniform'
            vector = [0.0, -9.81, 0.0]
        ",
        )
        .unwrap();
        assert_eq!(cfg.seed, 11);
        assert_eq!(cfg.recovery.flip_threshold, 5);
        assert!((cfg.recovery.sample_period_secs - 1.0).abs() < f64::EPSILON);
        assert_eq!(
            cfg.physics.gravity,
            GravityConfig::Uniform {
                vector: [0.0, -9.81, 0.0]
            }
        );
        assert_eq!(cfg.vehicle, VehicleConfig::default());
    }

    #[test]
    fn toml_invalid_values_rejected() {
        let result = RallyConfig::from_toml_str(
            r"
            [physics]
            dt = -1.0
        ",
        );
        assert!(matches!(result, Err(ConfigError::InvalidPhysicsDt(_))));
    }

    #[test]
    fn toml_infinite_audio_jitter_rejected() {
        let result = RallyConfig::from_toml_str(
            r"
            [audio]
            engine_pitch_jitter = inf
        ",
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("audio.engine_pitch_jitter"));
    }

    #[test]
    fn toml_nan_motor_speed_rejected() {
        let result = RallyConfig::from_toml_str(
            r"
            [vehicle]
            max_wheel_speed = nan
        ",
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("vehicle.max_wheel_speed"));
    }

    #[test]
    fn toml_syntax_error_reported() {
        let result = RallyConfig::from_toml_str("[physics");
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn toml_string_parses_back() {
        let mut cfg = RallyConfig::default();
        cfg.seed = 99;
        cfg.camera.offset = [0.0, 3.0, 6.0];
        let text = cfg.to_toml_string().unwrap();
        let back = RallyConfig::from_toml_str(&text).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = std::env::temp_dir().join("rally_test_config");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("rally.toml");
        std::fs::write(
            &path,
            r"
            [spawn]
            clearance = 2.5
        ",
        )
        .unwrap();

        let cfg = RallyConfig::from_file(&path).unwrap();
        assert!((cfg.spawn.clearance - 2.5).abs() < f32::EPSILON);

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_dir(&dir);
    }

    #[test]
    fn from_file_missing_is_io_error() {
        let result = RallyConfig::from_file("/nonexistent/rally.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
