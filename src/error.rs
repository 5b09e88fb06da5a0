use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid grid size {0}x{1}")]
    InvalidSize(usize, usize),
    #[error("Invalid multigrid size {0}x{1}, levels must halve evenly")]
    InvalidMultigridSize(usize, usize),
    #[error("buffer size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("strong rigid body coupling is not supported by the multigrid solver")]
    StrongCouplingUnsupported,
    #[error("{0} is not available in this world")]
    Unsupported(&'static str),
    #[error("unknown rigid body handle {0}")]
    UnknownRigidBody(usize),
    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write image: {0}")]
    Image(#[from] image::ImageError),
    #[error("failed to write exr: {0}")]
    Exr(#[from] exr::error::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
