/// Error taxonomy shared by the sampling core and the conversion pipeline.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),

    /// No compatible GPU. The orchestrator treats this as a fallback signal.
    #[error("No compatible GPU device: {0}")]
    DeviceUnavailable(String),

    #[error("Device allocation failed: {0}")]
    AllocationFailure(String),

    #[error("Device error: {0}")]
    DeviceError(String),

    #[error("Sampling worker for task {task} failed: {reason}")]
    WorkerFailure { task: usize, reason: String },

    #[error("Mesh parse error on line {line}: {reason}")]
    MeshParse { line: usize, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Metadata error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("DDS encoding error: {0}")]
    Dds(#[from] ddsfile::Error),
}

impl Error {
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration(reason.into())
    }

    pub fn invalid_mesh(reason: impl Into<String>) -> Self {
        Self::InvalidMesh(reason.into())
    }

    pub fn worker_failure(task: usize, reason: impl Into<String>) -> Self {
        Self::WorkerFailure {
            task,
            reason: reason.into(),
        }
    }
}
