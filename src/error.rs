//! Error types for the onboarding engine.

use crate::onboarding::FsmState;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("GitHub error: {0}")]
    GitHub(#[from] GitHubError),

    #[error("Onboarding error: {0}")]
    Onboarding(#[from] OnboardingError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Tool execution errors.
///
/// The engine never lets these escape a turn: they are rendered as a
/// `content` event and the table's transition still applies.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool {name} not found")]
    NotFound { name: String },

    #[error("Tool {name} execution failed: {reason}")]
    ExecutionFailed { name: String, reason: String },

    #[error("Invalid parameters for tool {name}: {reason}")]
    InvalidParameters { name: String, reason: String },
}

/// GitHub REST errors. The sync detector treats all of them as "no evidence yet".
#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    #[error("GitHub request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response from GitHub: {0}")]
    InvalidResponse(String),

    #[error("Not found on GitHub: {0}")]
    NotFound(String),
}

/// Errors a transition can return. These indicate a table bug or corrupt
/// persisted data, never a user-facing tool failure.
#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error("Auto state {state} revisited within one turn")]
    ChainCycle { state: FsmState },

    #[error("Auto chain exceeded {max} hops (last state {state})")]
    ChainTooLong { state: FsmState, max: usize },

    #[error("Invalid step data: {0}")]
    InvalidStepData(String),

    #[error("Step data version {found} is newer than supported version {supported}")]
    UnsupportedStepDataVersion { found: u32, supported: u32 },
}

/// External intent classifier errors.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Classifier request failed: {0}")]
    RequestFailed(String),

    #[error("Classifier returned an unknown intent: {0}")]
    UnknownIntent(String),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
