use thiserror::Error;

/// Top-level error type for the rally crates.
#[derive(Debug, Error)]
pub enum RallyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Physics error: {0}")]
    Physics(#[from] PhysicsError),

    #[error("Vehicle rig error: {0}")]
    Rig(#[from] RigError),

    #[error("Spawn error: {0}")]
    Spawn(#[from] SpawnError),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),

    #[error("Invalid physics dt: {0} (must be > 0)")]
    InvalidPhysicsDt(f64),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    /// Shorthand for [`ConfigError::InvalidValue`].
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Physics world errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhysicsError {
    #[error("Unknown body id {0}")]
    UnknownBody(u32),

    #[error("Unknown constraint id {0}")]
    UnknownConstraint(u32),

    #[error("Constraint {constraint} references detached body {body}")]
    BodyDetached { constraint: u32, body: u32 },

    #[error("Invalid body description: {0}")]
    InvalidBody(String),

    #[error("Invalid terrain mesh: {0}")]
    InvalidMesh(String),
}

/// Vehicle rig errors.
///
/// `TeleportWhileAttached` is an invariant violation: the caller broke the
/// detach → teleport → reattach protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RigError {
    #[error("teleport requested while the rig is attached to the physics world")]
    TeleportWhileAttached,

    #[error("rig body or constraint missing from the physics world: {0}")]
    Physics(#[from] PhysicsError),
}

/// Spawn point resolution failures.
///
/// All variants are recoverable: callers defer and retry later instead of
/// falling back to an unsafe position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SpawnError {
    #[error("no terrain mesh loaded")]
    TerrainNotLoaded,

    #[error("spawn ray did not intersect the terrain")]
    NoIntersection,

    #[error("spawn hint has no usable direction from the world origin")]
    DegenerateHint,
}
