// Per-request pipeline orchestration: segment → recognize → correct.
//
// The flow is strictly linear. CPU-bound stages run on the blocking thread
// pool so the async runtime is not starved; the correction call is plain
// async I/O.

use crate::core::config::Config;
use crate::core::errors::{PipelineError, PipelineResult};
use crate::core::types::TranscriptionOutcome;
use crate::services::{CorrectionService, RecognitionService, WordSegmenter};
use crate::utils::Metrics;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub struct Transcriber {
    config: Arc<Config>,
    segmenter: Arc<WordSegmenter>,
    recognizer: Arc<RecognitionService>,
    corrector: Arc<CorrectionService>,
    metrics: Metrics,
}

impl Transcriber {
    /// Construct the pipeline, loading both recognition sessions. Called once
    /// at startup; the resulting value is shared across requests.
    pub fn new(config: Arc<Config>, metrics: Metrics) -> Result<Self> {
        let segmenter = Arc::new(WordSegmenter::new(Arc::clone(&config)));
        let recognizer = Arc::new(RecognitionService::new(Arc::clone(&config))?);
        let corrector = Arc::new(CorrectionService::new(Arc::clone(&config))?);

        info!("Pipeline ready (recognition on {})", recognizer.device_type());

        Ok(Self {
            config,
            segmenter,
            recognizer,
            corrector,
            metrics,
        })
    }

    /// Run the full pipeline over one saved upload.
    ///
    /// Any stage failure aborts the request and discards partial results;
    /// scratch-file cleanup is the caller's responsibility (it must happen on
    /// every exit path, not just this one).
    pub async fn transcribe(&self, image_path: &Path) -> PipelineResult<TranscriptionOutcome> {
        let seg_start = Instant::now();
        let crop_paths = {
            let segmenter = Arc::clone(&self.segmenter);
            let path = image_path.to_path_buf();
            tokio::task::spawn_blocking(move || segmenter.separate_words(&path))
                .await
                .map_err(|e| PipelineError::TaskJoinFailed(e.to_string()))?
                .map_err(|source| PipelineError::SegmentationFailed { source })?
        };
        self.metrics.record_segmentation_duration(seg_start.elapsed());
        self.metrics.record_words_segmented(crop_paths.len());
        debug!(
            "Segmented {} word crops in {:.1}ms",
            crop_paths.len(),
            seg_start.elapsed().as_secs_f64() * 1000.0
        );

        let rec_start = Instant::now();
        let transcription = {
            let recognizer = Arc::clone(&self.recognizer);
            let paths = crop_paths.clone();
            tokio::task::spawn_blocking(move || recognizer.transcribe_crops(&paths))
                .await
                .map_err(|e| PipelineError::TaskJoinFailed(e.to_string()))?
                .map_err(|source| PipelineError::RecognitionFailed { source })?
        };
        self.metrics.record_recognition_duration(rec_start.elapsed());
        debug!(
            "Recognized {:?} in {:.1}ms",
            transcription,
            rec_start.elapsed().as_secs_f64() * 1000.0
        );

        // An empty transcription never reaches the correction model
        let corrected = if transcription.is_empty() || !self.config.correction_enabled() {
            String::new()
        } else {
            let corr_start = Instant::now();
            let result = self.corrector.correct(&transcription).await;
            self.metrics
                .record_correction_call(result.is_ok(), corr_start.elapsed());
            result.map_err(|source| PipelineError::CorrectionFailed { source })?
        };

        Ok(TranscriptionOutcome {
            transcription,
            corrected,
        })
    }
}
