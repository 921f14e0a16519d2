// Library exports for the handwriting transcription backend

// Core modules
pub mod core;
pub mod pipeline;
pub mod services;
pub mod utils;

// Re-export commonly used types and functions
pub use core::{
    config::Config,
    errors::{
        ConfigError, CorrectionError, PipelineError, RecognitionError, SegmentationError,
    },
    types::{ErrorBody, TranscribeResponse, TranscriptionOutcome, WordBox},
};

pub use pipeline::Transcriber;

pub use services::{CorrectionService, RecognitionService, WordSegmenter};

pub use utils::{
    is_allowed_extension, sanitize_filename, words_dir_for, Metrics, ScratchGuard,
};
