use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed parameter file {path}: {source}")]
    YamlParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("missing required user variable: {0}")]
    MissingVariable(String),

    #[error("malformed --vars assignment '{0}', expected key=value")]
    MalformedVarsAssignment(String),

    #[error("unknown entity kind for print-vars: {0}")]
    UnknownKind(String),
}
