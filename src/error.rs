//! Error types for Quarry.

use thiserror::Error;

/// Why text could not be obtained from an imported item.
///
/// Every variant renders a message that can be shown to the person who
/// triggered the import as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionFailure {
    /// The video exists but has no transcript in any accepted language.
    NoTranscript(String),
    /// The uploader disabled captions for the video.
    CaptionsDisabled(String),
    /// The video is private.
    VideoPrivate(String),
    /// The video was removed, is region-locked, or otherwise unavailable.
    VideoUnavailable(String),
    /// The document contains no extractable text (usually a scanned PDF).
    DocumentEmpty,
    /// The document is password protected.
    DocumentProtected,
    /// The document could not be parsed.
    DocumentCorrupted(String),
    /// No extractor exists for this file type.
    UnsupportedFileType(String),
    /// Speech-to-text returned nothing usable.
    TranscriptionEmpty,
    /// Text was extracted but chunking produced nothing to index.
    NoChunks,
}

impl std::fmt::Display for ExtractionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionFailure::NoTranscript(id) => write!(
                f,
                "No transcript is available for video {}. Try a video with captions.",
                id
            ),
            ExtractionFailure::CaptionsDisabled(id) => write!(
                f,
                "Captions are disabled for video {}, so it cannot be imported.",
                id
            ),
            ExtractionFailure::VideoPrivate(id) => {
                write!(f, "Video {} is private and cannot be imported.", id)
            }
            ExtractionFailure::VideoUnavailable(id) => {
                write!(f, "Video {} is unavailable (removed or restricted).", id)
            }
            ExtractionFailure::DocumentEmpty => write!(
                f,
                "The document contains almost no extractable text. If it is a scanned PDF, \
                 run it through OCR first and upload the result."
            ),
            ExtractionFailure::DocumentProtected => write!(
                f,
                "The document is password protected. Remove the password and upload it again."
            ),
            ExtractionFailure::DocumentCorrupted(detail) => {
                write!(f, "The document could not be read, it may be corrupted: {}", detail)
            }
            ExtractionFailure::UnsupportedFileType(kind) => write!(
                f,
                "Unsupported file type '{}'. Supported documents are PDF, DOCX and plain text.",
                kind
            ),
            ExtractionFailure::TranscriptionEmpty => write!(
                f,
                "The audio transcription came back empty. Check that the file contains speech."
            ),
            ExtractionFailure::NoChunks => {
                write!(f, "No indexable content was found in this source.")
            }
        }
    }
}

/// Library-level error type for Quarry operations.
#[derive(Error, Debug)]
pub enum QuarryError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Source '{external_id}' has already been imported")]
    DuplicateSource { external_id: String },

    #[error("{0}")]
    Extraction(ExtractionFailure),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Could not generate a response: {0}")]
    Generation(String),

    #[error("Model rejected parameter '{param}': {message}")]
    UnsupportedParameter { param: String, message: String },

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error(
        "Vector index '{index}' is missing or does not match the embedding dimension. \
         Create it with `quarry index create` before searching."
    )]
    VectorIndexMissing { index: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Store(String),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl QuarryError {
    /// HTTP status that best describes this error.
    pub fn status_code(&self) -> u16 {
        match self {
            QuarryError::Validation(_) => 400,
            QuarryError::NotFound(_) => 404,
            QuarryError::DuplicateSource { .. } => 409,
            QuarryError::Extraction(_) => 422,
            QuarryError::Embedding(_)
            | QuarryError::Generation(_)
            | QuarryError::UnsupportedParameter { .. }
            | QuarryError::Transcription(_)
            | QuarryError::Http(_) => 502,
            QuarryError::VectorIndexMissing { .. } => 503,
            _ => 500,
        }
    }

    /// Whether the message is meant for the person who made the request,
    /// as opposed to an internal failure that should be logged and masked.
    pub fn is_user_facing(&self) -> bool {
        self.status_code() != 500
    }
}

impl From<ExtractionFailure> for QuarryError {
    fn from(failure: ExtractionFailure) -> Self {
        QuarryError::Extraction(failure)
    }
}

/// Result type alias for Quarry operations.
pub type Result<T> = std::result::Result<T, QuarryError>;
