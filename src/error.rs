//! Error types for the Opengear OM engine.
//!
//! Module execution reports [`ModuleError`](crate::modules::ModuleError) and the
//! device capability reports [`ConnectionError`](crate::connection::ConnectionError);
//! both fold into the crate-level [`Error`] used by configuration loading, logging
//! setup and the module registry.

use std::path::PathBuf;
use thiserror::Error;

use crate::connection::ConnectionError;
use crate::modules::ModuleError;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Module Errors
    // ========================================================================
    /// Module not found in the registry.
    #[error("Module '{0}' not found")]
    ModuleNotFound(String),

    /// Invalid module arguments.
    #[error("Invalid arguments for module '{module}': {message}")]
    ModuleArgs {
        /// Module name
        module: String,
        /// Error message
        message: String,
    },

    /// Module execution failed.
    #[error(transparent)]
    Module(#[from] ModuleError),

    // ========================================================================
    // Device Errors
    // ========================================================================
    /// The device rejected or failed a request.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A configuration file could not be read or parsed.
    #[error("Failed to load configuration from '{path}': {message}")]
    ConfigFile {
        /// Path to the configuration file
        path: PathBuf,
        /// Error message
        message: String,
    },

    // ========================================================================
    // I/O and Serialization Errors
    // ========================================================================
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Generic error with source.
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Creates a new module args error.
    pub fn module_args(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModuleArgs {
            module: module.into(),
            message: message.into(),
        }
    }

    /// Creates a new configuration file error.
    pub fn config_file(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigFile {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns the error code for process exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Module(_) | Error::ModuleArgs { .. } => 2,
            Error::Connection(_) => 3,
            Error::Config(_) | Error::ConfigFile { .. } => 4,
            Error::ModuleNotFound(_) => 5,
            _ => 1,
        }
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Adds context with a closure that is only evaluated on error.
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Other {
            message: message.into(),
            source: Some(Box::new(e)),
        })
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| Error::Other {
            message: f().into(),
            source: Some(Box::new(e)),
        })
    }
}
