pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::Config;
pub use errors::{
    ConfigError, CorrectionError, PipelineError, RecognitionError, SegmentationError,
};
pub use types::{ErrorBody, TranscribeResponse, TranscriptionOutcome, WordBox};
