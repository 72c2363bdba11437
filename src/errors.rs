/// Errors raised by the tagger and its collaborators
#[derive(thiserror::Error, Debug)]
pub enum TaggerError {
    /// Missing or inconsistent mappings, embeddings, dataset descriptors or parameters
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An operation was invoked out of lifecycle order
    #[error("invalid state: {0}")]
    State(String),

    /// A malformed sentence record
    #[error("invalid data: {0}")]
    Data(String),

    /// Reading or writing files
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML (de)serialization
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Word vector files
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// Saving or loading model parameters
    #[error("unable to record model parameters: {0}")]
    Record(String),
}

/// Result alias for the crate
pub type Result<T> = std::result::Result<T, TaggerError>;

impl TaggerError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn state(message: impl Into<String>) -> Self {
        Self::State(message.into())
    }

    pub(crate) fn data(message: impl Into<String>) -> Self {
        Self::Data(message.into())
    }
}
