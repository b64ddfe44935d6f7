use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    #[error("Root element not found: {0}")]
    RootNotFound(String),

    #[error("Root element is not attached to the document")]
    RootDetached,

    #[error("Cannot find mount point {0}")]
    MountPointNotFound(String),

    #[error("No scene registered with id {0}")]
    UnknownScene(String),

    #[error("Scene {0} is registered but missing from the scene order")]
    OrphanScene(String),

    #[error("Scene id registered twice: {0}")]
    DuplicateScene(String),

    #[error("Invalid stage '{stage}': {reason}")]
    InvalidStage { stage: String, reason: String },

    #[error("Invalid length: {0}")]
    InvalidLength(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
