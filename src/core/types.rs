// Request/response types for the transcription pipeline

use serde::{Deserialize, Serialize};

/// Successful transcription response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscribeResponse {
    pub transcribed_text: String,
    pub corrected_text: String,
}

/// Error payload returned for client and server failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Result of running the full pipeline over one uploaded image
#[derive(Debug, Clone)]
pub struct TranscriptionOutcome {
    /// Space-joined, trimmed concatenation of per-word recognition results
    pub transcription: String,
    /// Output of the correction model, empty when correction was skipped
    pub corrected: String,
}

/// A text token detected by the bounding-box engine, in source-image pixels
#[derive(Debug, Clone)]
pub struct WordBox {
    pub text: String,
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}
