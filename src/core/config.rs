use crate::core::errors::ConfigError;
use std::env;
use tracing::Level;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub log_level: Level,
    pub max_upload_bytes: usize,
}

/// Scratch-file configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub upload_dir: String,
    pub output_dir: String,
}

/// Word segmentation configuration
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    pub lang: String,
    /// Page segmentation mode (6 = single uniform block of text)
    pub psm: i32,
    /// OCR engine mode (3 = default, based on what is available)
    pub oem: i32,
    /// Pixel margin added around each detected box before cropping
    pub crop_padding: i32,
    pub contrast_gain: f32,
    pub denoise_radius: u32,
    pub threshold_block_radius: u32,
    pub dilate_radius: u8,
}

/// Vision-to-text model configuration
#[derive(Debug, Clone)]
pub struct RecognitionConfig {
    pub encoder_model_path: String,
    pub decoder_model_path: String,
    pub vocab_path: String,
    /// Square canvas edge the crops are letterboxed onto
    pub target_size: u32,
    pub max_length: usize,
    pub num_beams: usize,
    pub decoder_start_token_id: i64,
    pub eos_token_id: i64,
    /// Token ids dropped during decoding (bos/pad/eos/unk)
    pub special_token_ids: Vec<i64>,
}

/// Correction model configuration
#[derive(Debug, Clone)]
pub struct CorrectionConfig {
    pub enabled: bool,
    /// Base URL of the local llama.cpp-style completion server
    pub endpoint: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub stop: String,
    pub timeout_seconds: u64,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub segmenter: SegmenterConfig,
    pub recognition: RecognitionConfig,
    pub correction: CorrectionConfig,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from_env();
        config.validate()?;
        Ok(config)
    }

    fn load_from_env() -> Self {
        // Parse log level
        let log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(Level::INFO);

        // Token ids as a comma-separated list
        let special_token_ids = env::var("SPECIAL_TOKEN_IDS")
            .ok()
            .map(|s| {
                s.split(',')
                    .filter_map(|t| t.trim().parse().ok())
                    .collect::<Vec<i64>>()
            })
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| vec![0, 1, 2, 3]);

        Self {
            server: ServerConfig {
                port: env_parse("SERVER_PORT", 5000),
                host: env_string("SERVER_HOST", "0.0.0.0"),
                log_level,
                max_upload_bytes: env_parse("MAX_UPLOAD_MB", 20usize) * 1024 * 1024,
            },
            storage: StorageConfig {
                upload_dir: env_string("UPLOAD_DIR", "./uploads"),
                output_dir: env_string("OUTPUT_DIR", "./output"),
            },
            segmenter: SegmenterConfig {
                lang: env_string("TESSERACT_LANG", "eng"),
                psm: env_parse("TESSERACT_PSM", 6),
                oem: env_parse("TESSERACT_OEM", 3),
                crop_padding: env_parse("CROP_PADDING", 5),
                contrast_gain: env_parse("CONTRAST_GAIN", 1.5),
                denoise_radius: env_parse("DENOISE_RADIUS", 1),
                threshold_block_radius: env_parse("THRESHOLD_BLOCK_RADIUS", 5),
                dilate_radius: env_parse("DILATE_RADIUS", 1),
            },
            recognition: RecognitionConfig {
                encoder_model_path: env_string(
                    "ENCODER_MODEL_PATH",
                    "models/trocr/encoder.onnx",
                ),
                decoder_model_path: env_string(
                    "DECODER_MODEL_PATH",
                    "models/trocr/decoder.onnx",
                ),
                vocab_path: env_string("VOCAB_PATH", "models/trocr/vocab.json"),
                target_size: env_parse("RECOGNITION_TARGET_SIZE", 384),
                max_length: env_parse("MAX_OUTPUT_LENGTH", 64),
                num_beams: env_parse("NUM_BEAMS", 4),
                decoder_start_token_id: env_parse("DECODER_START_TOKEN_ID", 2),
                eos_token_id: env_parse("EOS_TOKEN_ID", 2),
                special_token_ids,
            },
            correction: CorrectionConfig {
                enabled: env_parse("CORRECTION_ENABLED", true),
                endpoint: env_string("CORRECTION_ENDPOINT", "http://127.0.0.1:8080"),
                max_tokens: env_parse("CORRECTION_MAX_TOKENS", 512),
                temperature: env_parse("CORRECTION_TEMPERATURE", 0.25),
                top_p: env_parse("CORRECTION_TOP_P", 0.9),
                stop: env_string("CORRECTION_STOP", "\n\n"),
                timeout_seconds: env_parse("CORRECTION_TIMEOUT_SECONDS", 120),
            },
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::InvalidServerConfig(
                "max upload size must be > 0".to_string(),
            ));
        }

        if self.segmenter.crop_padding < 0 || self.segmenter.crop_padding > 100 {
            return Err(ConfigError::InvalidSegmenterConfig(format!(
                "crop_padding must be in [0, 100], got {}",
                self.segmenter.crop_padding
            )));
        }

        if self.segmenter.contrast_gain <= 0.0 {
            return Err(ConfigError::InvalidSegmenterConfig(format!(
                "contrast_gain must be > 0, got {}",
                self.segmenter.contrast_gain
            )));
        }

        if self.segmenter.threshold_block_radius == 0 {
            return Err(ConfigError::InvalidSegmenterConfig(
                "threshold_block_radius must be > 0".to_string(),
            ));
        }

        if !(128..=1024).contains(&self.recognition.target_size) {
            return Err(ConfigError::InvalidRecognitionConfig(format!(
                "target_size must be between 128 and 1024, got {}",
                self.recognition.target_size
            )));
        }

        if !(1..=512).contains(&self.recognition.max_length) {
            return Err(ConfigError::InvalidRecognitionConfig(format!(
                "max_length must be between 1 and 512, got {}",
                self.recognition.max_length
            )));
        }

        if !(1..=16).contains(&self.recognition.num_beams) {
            return Err(ConfigError::InvalidBeamCount(self.recognition.num_beams));
        }

        if !(0.0..=2.0).contains(&self.correction.temperature) {
            return Err(ConfigError::InvalidTemperature(self.correction.temperature));
        }

        if self.correction.top_p <= 0.0 || self.correction.top_p > 1.0 {
            return Err(ConfigError::InvalidTopP(self.correction.top_p));
        }

        if self.correction.max_tokens == 0 {
            return Err(ConfigError::InvalidCorrectionConfig(
                "max_tokens must be > 0".to_string(),
            ));
        }

        if self.correction.timeout_seconds == 0 {
            return Err(ConfigError::InvalidCorrectionConfig(
                "timeout_seconds must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn server_port(&self) -> u16 {
        self.server.port
    }

    pub fn server_host(&self) -> &str {
        &self.server.host
    }

    pub fn log_level(&self) -> Level {
        self.server.log_level
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.server.max_upload_bytes
    }

    pub fn upload_dir(&self) -> &str {
        &self.storage.upload_dir
    }

    pub fn output_dir(&self) -> &str {
        &self.storage.output_dir
    }

    pub fn correction_enabled(&self) -> bool {
        self.correction.enabled
    }
}

// Note: No Default implementation because Config::new() can fail
// Users should explicitly call Config::new()? and handle errors

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::load_from_env();
        assert!(config.validate().is_ok());
        assert_eq!(config.recognition.num_beams, 4);
        assert_eq!(config.recognition.max_length, 64);
        assert_eq!(config.recognition.target_size, 384);
        assert_eq!(config.segmenter.crop_padding, 5);
        assert_eq!(config.correction.stop, "\n\n");
    }

    #[test]
    fn rejects_bad_beam_count() {
        let mut config = Config::load_from_env();
        config.recognition.num_beams = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBeamCount(0))
        ));
    }

    #[test]
    fn rejects_bad_top_p() {
        let mut config = Config::load_from_env();
        config.correction.top_p = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTopP(_))));
    }
}
