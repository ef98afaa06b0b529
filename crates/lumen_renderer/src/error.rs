use thiserror::Error;

/// Errors that can occur while setting up a render or writing its output.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(std::io::Error),
}

pub type RenderResult<T> = Result<T, RenderError>;
