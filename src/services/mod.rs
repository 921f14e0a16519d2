pub mod correction;
pub mod onnx;
pub mod recognition;
pub mod segmentation;

// Re-export commonly used services
pub use correction::CorrectionService;
pub use recognition::RecognitionService;
pub use segmentation::WordSegmenter;
