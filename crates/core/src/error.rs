//! Error types for melody slide conversion.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while converting a melody deck.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to read or write a file.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The input directory does not exist.
    #[error("Input directory does not exist: {}", .0.display())]
    MissingInputDirectory(PathBuf),

    /// The source file is not a presentation package this tool understands.
    #[error("Unsupported or unrecognized file format: {0}")]
    UnsupportedFormat(String),

    /// The source file lacks the expected slide/shape structure.
    #[error("Malformed source: {0}")]
    MalformedSource(String),

    /// A title field could not be read from the metadata slide.
    #[error("Missing metadata field: {0}")]
    MissingField(&'static str),

    /// ZIP archive error.
    #[error("ZIP error: {0}")]
    ZipError(String),

    /// XML parsing error.
    #[error("XML parsing error: {0}")]
    XmlError(String),

    /// Image decode/encode error.
    #[error("Image error: {0}")]
    ImageError(String),

    /// Metadata (de)serialization error.
    #[error("Metadata JSON error: {0}")]
    JsonError(String),

    /// The output file already exists and the overwrite policy forbids replacing it.
    #[error("Output already exists: {}", .0.display())]
    OutputExists(PathBuf),
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::ImageError(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::JsonError(e.to_string())
    }
}
