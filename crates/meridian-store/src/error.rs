use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed document at {path}: {source}")]
    Serialization {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("internal store error: {0}")]
    Internal(String),
}
