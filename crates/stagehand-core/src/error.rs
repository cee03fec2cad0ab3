//! Profile and managed-system error types.

use thiserror::Error;

/// Errors raised while loading or validating a profile.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("failed to read profile: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse profile: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize profile: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("unknown component: {0}")]
    UnknownComponent(String),

    #[error("component {component} has no execution context {ec}")]
    UnknownExecutionContext { component: String, ec: u32 },

    #[error("component {component} has no port {port}")]
    UnknownPort { component: String, port: String },

    #[error("component {component} has no configuration set {set}")]
    UnknownConfigurationSet { component: String, set: String },

    #[error("duplicate component: {0}")]
    DuplicateComponent(String),

    #[error("constraint on {0} sets both wait_time_ms and preceding")]
    ConflictingConstraint(String),

    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: String, reason: String },
}

pub type ProfileResult<T> = Result<T, ProfileError>;

/// Errors reported by a managed-system client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SystemError {
    #[error("component not found: {0}")]
    ComponentNotFound(String),

    #[error("port not found: {component}.{port}")]
    PortNotFound { component: String, port: String },

    #[error("execution context {ec} not found on {component}")]
    ContextNotFound { component: String, ec: u32 },

    #[error("configuration set not found: {component}/{set}")]
    ConfigSetNotFound { component: String, set: String },

    #[error("cannot {transition} {target}: component is {state}")]
    InvalidTransition {
        target: String,
        transition: String,
        state: String,
    },

    #[error("connection already exists: {0}")]
    AlreadyConnected(String),

    #[error("connection not found: {0}")]
    NotConnected(String),
}

pub type SystemResult<T> = Result<T, SystemError>;
