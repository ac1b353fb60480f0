use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("Unknown envelope type: {0}")]
    UnknownType(String),

    #[error("Invalid content for '{kind}' envelope: {source}")]
    InvalidContent {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid timestamp: {0}")]
    InvalidTime(#[from] chrono::ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
