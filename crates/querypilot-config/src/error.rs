//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration loading and resolution.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Missing required field.
    #[error("missing required field '{field}' in {context}")]
    MissingField { field: String, context: String },

    /// Two data sources share an id.
    #[error("duplicate data source id '{0}'")]
    DuplicateDataSource(String),

    /// A value is present but unusable.
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}
