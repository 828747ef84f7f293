//! Error types for configuration operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading, saving or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read or write a file
    #[error("I/O error on '{path}': {source}")]
    Io {
        /// Path of the file involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// Failed to serialize TOML
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A field is outside its accepted range or names an unknown variant
    #[error("invalid value for '{field}': {reason}")]
    Invalid {
        /// Dotted field path, e.g. `fm.algorithm`.
        field: String,
        /// Description of why the value was rejected.
        reason: String,
    },

    /// Engine name not recognized
    #[error("unknown engine: {0}")]
    UnknownEngine(String),

    /// Preset name not recognized for the selected engine
    #[error("unknown {engine} preset: {name}")]
    UnknownPreset {
        /// Engine the preset was looked up on.
        engine: String,
        /// Requested preset name.
        name: String,
    },
}

impl ConfigError {
    /// Create an I/O error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a validation error.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    fn mock_io_err() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::NotFound, "mock")
    }

    #[test]
    fn io_factory_keeps_path_and_source() {
        let err = ConfigError::io("/a/b.toml", mock_io_err());
        assert!(
            matches!(err, ConfigError::Io { ref path, .. } if path == std::path::Path::new("/a/b.toml"))
        );
        assert!(err.source().is_some());
        assert!(err.to_string().contains("/a/b.toml"));
    }

    #[test]
    fn invalid_display() {
        let err = ConfigError::invalid("fm.algorithm", "must be in 1..=32, got 40");
        assert_eq!(
            err.to_string(),
            "invalid value for 'fm.algorithm': must be in 1..=32, got 40"
        );
        assert!(err.source().is_none());
    }

    #[test]
    fn unknown_preset_display() {
        let err = ConfigError::UnknownPreset {
            engine: "fm".to_string(),
            name: "kazoo".to_string(),
        };
        assert_eq!(err.to_string(), "unknown fm preset: kazoo");
    }

    #[test]
    fn unknown_engine_display() {
        let err = ConfigError::UnknownEngine("theremin".to_string());
        assert_eq!(err.to_string(), "unknown engine: theremin");
    }
}
