// Custom error types for better error handling and debugging
//
// Using thiserror for ergonomic error definitions with:
// - Context preservation
// - Type-safe error matching
// - Source error chaining

use thiserror::Error;

/// Word segmentation errors
#[derive(Debug, Error)]
pub enum SegmentationError {
    #[error("Image not found or unable to read: {path}")]
    ImageUnreadable {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Text detection failed: {0}")]
    DetectionFailed(String),

    #[error("Failed to write word crop {path}: {source}")]
    CropWriteFailed {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Recognition service errors
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("ONNX inference failed: {0}")]
    InferenceFailed(#[from] ort::Error),

    #[error("Model produced no '{0}' output")]
    MissingOutput(String),

    #[error("Unexpected '{name}' output shape: {shape:?}")]
    UnexpectedShape { name: String, shape: Vec<usize> },

    #[error("Failed to load vocabulary from {path}: {reason}")]
    VocabLoad { path: String, reason: String },
}

/// Correction service errors
#[derive(Debug, Error)]
pub enum CorrectionError {
    #[error("Completion request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Completion endpoint returned {status}: {body}")]
    EndpointStatus { status: u16, body: String },
}

/// Pipeline orchestration errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Word segmentation failed: {source}")]
    SegmentationFailed {
        #[source]
        source: SegmentationError,
    },

    #[error("Recognition failed: {source}")]
    RecognitionFailed {
        #[source]
        source: RecognitionError,
    },

    #[error("Correction failed: {source}")]
    CorrectionFailed {
        #[source]
        source: CorrectionError,
    },

    #[error("Task join failed: {0}")]
    TaskJoinFailed(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid server config: {0}")]
    InvalidServerConfig(String),

    #[error("Invalid segmenter config: {0}")]
    InvalidSegmenterConfig(String),

    #[error("Invalid recognition config: {0}")]
    InvalidRecognitionConfig(String),

    #[error("Invalid correction config: {0}")]
    InvalidCorrectionConfig(String),

    #[error("Temperature must be in [0.0, 2.0], got {0}")]
    InvalidTemperature(f32),

    #[error("Top-p must be in (0.0, 1.0], got {0}")]
    InvalidTopP(f32),

    #[error("Beam count must be in [1, 16], got {0}")]
    InvalidBeamCount(usize),
}

// Convenience type aliases for Results
pub type SegmentationResult<T> = Result<T, SegmentationError>;
pub type RecognitionResult<T> = Result<T, RecognitionError>;
pub type CorrectionResult<T> = Result<T, CorrectionError>;
#[allow(dead_code)]
pub type PipelineResult<T> = Result<T, PipelineError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
