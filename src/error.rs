use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read configuration: {0}")]
    Io(#[from] io::Error),

    #[error("could not parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no {0} topic configured")]
    MissingTopic(&'static str),

    /// The output topic falls under the input filter, so converted readings
    /// would be read back in.
    #[error("output topic '{output}' is covered by input topic '{input}'")]
    FeedbackLoop { input: String, output: String },

    #[error("output topic '{0}' contains a wildcard")]
    WildcardOutput(String),
}

/// Failure while handling a single message. The relay drops the message and
/// carries on.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("malformed reading: {0}")]
    Decode(#[source] serde_json::Error),

    /// The converted value does not fit into an `f64`.
    #[error("{field} {value} is out of range after conversion")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("could not encode reading: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error("could not start worker thread: {0}")]
    Spawn(#[from] io::Error),

    #[error("{0} thread panicked")]
    Worker(&'static str),
}
