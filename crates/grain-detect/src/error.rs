use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to decode mask image: {0}")]
    MaskDecode(#[from] image::ImageError),

    #[error("Mask payload is not valid base64: {0}")]
    MaskEncoding(#[from] base64::DecodeError),

    #[error("Vision backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Batch cancelled before mask {current} of {total}")]
    Cancelled { current: usize, total: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DetectError>;
