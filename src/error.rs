//! Error types for episodic sampling and batching

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the library
///
/// None of these are transient: every variant reports a configuration or
/// programming error that has to be fixed before the run is restarted.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or contradictory split configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Fewer eligible classes than the episode needs
    #[error("Insufficient classes: episode needs {required}, stage has {available}")]
    InsufficientClasses { required: usize, available: usize },

    /// A chosen class has too few samples for its support/query draw
    #[error("Insufficient samples for label {label}: need {required}, have {available}")]
    InsufficientSamples {
        label: usize,
        required: usize,
        available: usize,
    },

    /// Internal invariant violation while building a batch
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Invalid numeric parameter (episode counts, ratios, batch sizes)
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Malformed graph record
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    /// A loader worker thread died
    #[error("Loader worker panicked: {0}")]
    WorkerPanicked(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl Error {
    /// Whether the error was raised while validating setup inputs
    /// (as opposed to during sampling or batching).
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_)
                | Error::InvalidParameter(_)
                | Error::Io(_)
                | Error::Json(_)
                | Error::Toml(_)
                | Error::TomlSer(_)
        )
    }
}
