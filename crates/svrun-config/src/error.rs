//! Error types for configuration loading and validation

use thiserror::Error;

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while loading or validating a project configuration.
///
/// Every variant here is process-fatal: the harness refuses to spawn any
/// simulator subprocess against a configuration it could not fully validate.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the configuration file
    #[error("failed to read config file: {0}")]
    Io(String),

    /// TOML parsing error (includes missing required fields)
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// A required field was present but empty
    #[error("test `{test}` has an empty `{field}` field")]
    EmptyField { test: String, field: String },

    /// Two tests share the same name
    #[error("duplicate test name `{0}`: test names key artifacts and must be unique")]
    DuplicateTest(String),

    /// A simulator identifier is not one the harness knows how to drive
    #[error("unknown simulator `{name}` ({context}); available: {available}")]
    UnknownSimulator {
        name: String,
        context: String,
        available: String,
    },

    /// A simulator identifier is not declared in the `[simulators]` table
    #[error("simulator `{name}` ({context}) has no entry in the simulators table")]
    UndeclaredSimulator { name: String, context: String },
}
