use thiserror::Error;

/// Application level error type used throughout the crate.
#[derive(Error, Debug)]
pub enum AlarmError {
    /// I/O related failure
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or inconsistent configuration, including deployment contract violations
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error while parsing YAML configuration files
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Error while decoding a bus payload
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// E-mail could not be composed or delivered
    #[error("Mail error: {0}")]
    Mail(String),

    /// Desktop notification could not be shown
    #[error("Desktop notification error: {0}")]
    Desktop(String),

    /// Flashlight relay could not be switched
    #[error("Relay error: {0}")]
    Relay(String),

    /// Alarm bus connection or subscription failure
    #[error("Bus error: {0}")]
    Bus(String),

    /// Runtime failure such as a panicked background task
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Convenient alias over [`Result`] using [`AlarmError`]
pub type Result<T> = std::result::Result<T, AlarmError>;
