use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(
        "no container runtime found in PATH (tried: docker, podman).\n\
         Install Docker: https://docs.docker.com/get-docker/"
    )]
    RuntimeNotFound,

    #[error("container runtime '{0}' not found in PATH")]
    PreferredNotFound(String),

    #[error("{operation} is not supported by {backend}")]
    UnsupportedByBackend {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("image '{image}' unavailable: {detail}")]
    ImageUnavailable { image: String, detail: String },

    #[error("{program} {operation} failed: {stderr}")]
    CommandFailed {
        program: String,
        operation: String,
        stderr: String,
    },

    #[error("failed to parse {program} output: {detail}")]
    UnexpectedOutput { program: String, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
