use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("template not found: {0}")]
    NotFound(String),

    #[error("placeholder {placeholder} not recognized by template {template}")]
    UnknownPlaceholder { template: String, placeholder: String },

    #[error("missing value for placeholder {placeholder} in template {template}")]
    MissingValue { template: String, placeholder: String },

    #[error("failed to read prompt directory {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, PromptError>;
