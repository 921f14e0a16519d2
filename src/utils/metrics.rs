use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Global metrics collector for the application.
///
/// Tracks request outcomes, per-stage durations, and correction-model usage.
/// Thread-safe and can be shared across the application.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    // Request metrics
    requests_total: AtomicUsize,
    requests_failed: AtomicUsize,
    images_processed: AtomicUsize,
    words_segmented: AtomicUsize,

    // Stage durations
    segmentation_duration_ms: RwLock<Vec<u64>>,
    recognition_duration_ms: RwLock<Vec<u64>>,
    correction_duration_ms: RwLock<Vec<u64>>,

    // Correction model usage
    correction_calls_total: AtomicUsize,
    correction_calls_failed: AtomicUsize,

    // Per-endpoint request counters
    endpoint_counters: DashMap<String, AtomicUsize>,

    // Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                requests_total: AtomicUsize::new(0),
                requests_failed: AtomicUsize::new(0),
                images_processed: AtomicUsize::new(0),
                words_segmented: AtomicUsize::new(0),
                segmentation_duration_ms: RwLock::new(Vec::new()),
                recognition_duration_ms: RwLock::new(Vec::new()),
                correction_duration_ms: RwLock::new(Vec::new()),
                correction_calls_total: AtomicUsize::new(0),
                correction_calls_failed: AtomicUsize::new(0),
                endpoint_counters: DashMap::new(),
                start_time: Instant::now(),
            }),
        }
    }

    pub fn record_request(&self, success: bool) {
        self.inner.requests_total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.inner.images_processed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.requests_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_words_segmented(&self, count: usize) {
        self.inner.words_segmented.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_segmentation_duration(&self, duration: Duration) {
        self.inner
            .segmentation_duration_ms
            .write()
            .push(duration.as_millis() as u64);
    }

    pub fn record_recognition_duration(&self, duration: Duration) {
        self.inner
            .recognition_duration_ms
            .write()
            .push(duration.as_millis() as u64);
    }

    pub fn record_correction_call(&self, success: bool, duration: Duration) {
        self.inner
            .correction_calls_total
            .fetch_add(1, Ordering::Relaxed);
        if !success {
            self.inner
                .correction_calls_failed
                .fetch_add(1, Ordering::Relaxed);
        }
        self.inner
            .correction_duration_ms
            .write()
            .push(duration.as_millis() as u64);
    }

    pub fn record_endpoint_request(&self, endpoint: &str) {
        self.inner
            .endpoint_counters
            .entry(endpoint.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    // Get snapshot for reporting
    pub fn snapshot(&self) -> MetricsSnapshot {
        let segmentation = self.inner.segmentation_duration_ms.read();
        let segmentation_avg = avg(&segmentation);
        let segmentation_p95 = percentile(&segmentation, 0.95);
        drop(segmentation);

        let recognition = self.inner.recognition_duration_ms.read();
        let recognition_avg = avg(&recognition);
        let recognition_p95 = percentile(&recognition, 0.95);
        drop(recognition);

        let correction = self.inner.correction_duration_ms.read();
        let correction_avg = avg(&correction);
        let correction_p95 = percentile(&correction, 0.95);
        drop(correction);

        MetricsSnapshot {
            requests_total: self.inner.requests_total.load(Ordering::Relaxed),
            requests_failed: self.inner.requests_failed.load(Ordering::Relaxed),
            images_processed: self.inner.images_processed.load(Ordering::Relaxed),
            words_segmented: self.inner.words_segmented.load(Ordering::Relaxed),
            segmentation_avg_ms: segmentation_avg,
            segmentation_p95_ms: segmentation_p95,
            recognition_avg_ms: recognition_avg,
            recognition_p95_ms: recognition_p95,
            correction_avg_ms: correction_avg,
            correction_p95_ms: correction_p95,
            correction_calls_total: self.inner.correction_calls_total.load(Ordering::Relaxed),
            correction_calls_failed: self.inner.correction_calls_failed.load(Ordering::Relaxed),
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Generate Prometheus-format metrics
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP requests_total Total number of transcription requests
# TYPE requests_total counter
requests_total {{}} {}

# HELP requests_failed Number of failed transcription requests
# TYPE requests_failed counter
requests_failed {{}} {}

# HELP images_processed_total Images successfully transcribed
# TYPE images_processed_total counter
images_processed_total {{}} {}

# HELP words_segmented_total Word crops produced by segmentation
# TYPE words_segmented_total counter
words_segmented_total {{}} {}

# HELP stage_avg_duration_ms Average stage duration in milliseconds
# TYPE stage_avg_duration_ms gauge
stage_avg_duration_ms {{stage="segmentation"}} {}
stage_avg_duration_ms {{stage="recognition"}} {}
stage_avg_duration_ms {{stage="correction"}} {}

# HELP correction_calls_total Completion-server calls made
# TYPE correction_calls_total counter
correction_calls_total {{}} {}

# HELP correction_calls_failed Completion-server calls that failed
# TYPE correction_calls_failed counter
correction_calls_failed {{}} {}

# HELP uptime_seconds Application uptime in seconds
# TYPE uptime_seconds counter
uptime_seconds {{}} {}
"#,
            snapshot.requests_total,
            snapshot.requests_failed,
            snapshot.images_processed,
            snapshot.words_segmented,
            snapshot.segmentation_avg_ms,
            snapshot.recognition_avg_ms,
            snapshot.correction_avg_ms,
            snapshot.correction_calls_total,
            snapshot.correction_calls_failed,
            snapshot.uptime_seconds,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub requests_total: usize,
    pub requests_failed: usize,
    pub images_processed: usize,
    pub words_segmented: usize,
    pub segmentation_avg_ms: u64,
    pub segmentation_p95_ms: u64,
    pub recognition_avg_ms: u64,
    pub recognition_p95_ms: u64,
    pub correction_avg_ms: u64,
    pub correction_p95_ms: u64,
    pub correction_calls_total: usize,
    pub correction_calls_failed: usize,
    pub uptime_seconds: u64,
}

fn percentile(values: &[u64], p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let idx = ((values.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn avg(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = Metrics::new();

        metrics.record_request(true);
        metrics.record_request(false);
        metrics.record_words_segmented(7);
        metrics.record_segmentation_duration(Duration::from_millis(40));
        metrics.record_recognition_duration(Duration::from_millis(200));
        metrics.record_correction_call(true, Duration::from_millis(100));
        metrics.record_correction_call(false, Duration::from_millis(20));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 2);
        assert_eq!(snapshot.requests_failed, 1);
        assert_eq!(snapshot.images_processed, 1);
        assert_eq!(snapshot.words_segmented, 7);
        assert_eq!(snapshot.segmentation_avg_ms, 40);
        assert_eq!(snapshot.recognition_avg_ms, 200);
        assert_eq!(snapshot.correction_calls_total, 2);
        assert_eq!(snapshot.correction_calls_failed, 1);
        assert_eq!(snapshot.correction_avg_ms, 60);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.record_request(true);

        let prometheus = metrics.to_prometheus();
        assert!(prometheus.contains("requests_total {} 1"));
        assert!(prometheus.contains("stage_avg_duration_ms {stage=\"segmentation\"}"));
    }
}
