use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReduceError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid cluster id {id} (palette has {k} colors)")]
    InvalidClusterId { id: usize, k: usize },

    #[error("No image available: quantize an image first")]
    NoImageAvailable,

    #[error("Unsupported image format: {0}")]
    UnsupportedImageFormat(String),

    #[error("Invalid color: {0}")]
    InvalidColor(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Document error: {0}")]
    Document(String),
}

pub type Result<T> = std::result::Result<T, ReduceError>;
