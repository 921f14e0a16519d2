// Vision-to-text recognition over an ONNX encoder/decoder pair.
//
// Each word crop is letterboxed onto a square canvas, pushed through the
// encoder once, then decoded with beam search over the decoder logits until
// EOS or the configured maximum length.

use crate::core::config::Config;
use crate::core::errors::{RecognitionError, RecognitionResult};
use crate::services::onnx::build_session;
use crate::utils::image_ops::resize_and_pad;
use anyhow::{Context, Result};
use image::DynamicImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::Value;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct RecognitionService {
    encoder: Mutex<Session>,
    decoder: Mutex<Session>,
    vocab: HashMap<i64, String>,
    config: Arc<Config>,
    device_type: String,
}

/// One candidate output sequence tracked during beam search
#[derive(Debug, Clone)]
struct Hypothesis {
    tokens: Vec<i64>,
    /// Sum of token log-probabilities
    score: f32,
    finished: bool,
}

impl RecognitionService {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let rec = &config.recognition;

        let (device_type, encoder) =
            build_session(Path::new(&rec.encoder_model_path), "encoder")?;
        let (_, decoder) = build_session(Path::new(&rec.decoder_model_path), "decoder")?;

        let vocab = load_vocabulary(Path::new(&rec.vocab_path))
            .context("Failed to load recognition vocabulary")?;

        info!(
            "✓ Recognition: {} (vocab_size={}, beams={}, max_length={})",
            device_type,
            vocab.len(),
            rec.num_beams,
            rec.max_length
        );

        Ok(Self {
            encoder: Mutex::new(encoder),
            decoder: Mutex::new(decoder),
            vocab,
            config,
            device_type,
        })
    }

    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    /// Recognize every crop in list order and join the results with spaces.
    ///
    /// Unreadable crop files are skipped; any model failure aborts the whole
    /// transcription. The result is trimmed of surrounding whitespace.
    pub fn transcribe_crops(&self, crop_paths: &[PathBuf]) -> RecognitionResult<String> {
        let mut transcription = String::new();

        for path in crop_paths {
            let img = match image::open(path) {
                Ok(img) => img,
                Err(e) => {
                    warn!("Skipping unreadable crop {}: {}", path.display(), e);
                    continue;
                }
            };

            let word = self.recognize_word(&img)?;
            debug!("Recognized {:?} from {}", word, path.display());
            transcription.push_str(&word);
            transcription.push(' ');
        }

        Ok(transcription.trim().to_string())
    }

    /// Run one crop through the encoder and beam-search the decoder output.
    pub fn recognize_word(&self, img: &DynamicImage) -> RecognitionResult<String> {
        let pixels = pixel_tensor(img, self.config.recognition.target_size);
        let (enc_dims, enc_data) = self.encode(pixels)?;
        let token_ids = self.generate(&enc_dims, &enc_data)?;
        Ok(detokenize(
            &self.vocab,
            &token_ids,
            &self.config.recognition.special_token_ids,
        ))
    }

    fn encode(&self, pixels: Array4<f32>) -> RecognitionResult<(Vec<usize>, Vec<f32>)> {
        let shape: Vec<usize> = pixels.shape().to_vec();
        let (flat, _offset) = pixels.into_raw_vec_and_offset();
        let shape_arr: [usize; 4] = [shape[0], shape[1], shape[2], shape[3]];
        let pixels_value = Value::from_array((shape_arr, flat))?;

        let (dims, data) = {
            let mut session = self.encoder.lock();
            let outputs = session.run(ort::inputs!["pixel_values" => pixels_value])?;

            let (shape, data) = if let Some(output) = outputs.get("last_hidden_state") {
                output.try_extract_tensor::<f32>()?
            } else {
                let first_key = outputs
                    .keys()
                    .next()
                    .ok_or_else(|| RecognitionError::MissingOutput("last_hidden_state".into()))?;
                outputs[first_key].try_extract_tensor::<f32>()?
            };

            let dims: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
            let data = data.to_vec();
            (dims, data)
        };

        if dims.len() != 3 {
            return Err(RecognitionError::UnexpectedShape {
                name: "last_hidden_state".into(),
                shape: dims,
            });
        }

        Ok((dims, data))
    }

    /// Beam-search decode against the encoder hidden states.
    ///
    /// Hypotheses are scored by summed log-probability; generation stops
    /// early once the best hypothesis has emitted EOS, or when every
    /// hypothesis has finished or hit the length cap.
    fn generate(&self, enc_dims: &[usize], enc_data: &[f32]) -> RecognitionResult<Vec<i64>> {
        let rec = &self.config.recognition;
        let mut decoder = self.decoder.lock();

        let mut beams = vec![Hypothesis {
            tokens: vec![rec.decoder_start_token_id],
            score: 0.0,
            finished: false,
        }];

        loop {
            let can_grow = beams
                .iter()
                .any(|b| !b.finished && b.tokens.len() < rec.max_length);
            if !can_grow {
                break;
            }

            let mut candidates = Vec::with_capacity(beams.len() * rec.num_beams);
            for beam in &beams {
                if beam.finished || beam.tokens.len() >= rec.max_length {
                    candidates.push(beam.clone());
                    continue;
                }

                let logits = Self::decoder_step(&mut decoder, &beam.tokens, enc_dims, enc_data)?;
                let log_probs = log_softmax(&logits);
                for (token_id, log_prob) in top_k(&log_probs, rec.num_beams) {
                    let mut tokens = beam.tokens.clone();
                    tokens.push(token_id);
                    candidates.push(Hypothesis {
                        finished: token_id == rec.eos_token_id,
                        tokens,
                        score: beam.score + log_prob,
                    });
                }
            }

            candidates.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            candidates.truncate(rec.num_beams);
            beams = candidates;

            if beams[0].finished {
                break;
            }
        }

        Ok(beams.into_iter().next().map(|b| b.tokens).unwrap_or_default())
    }

    /// Run the decoder over the current token prefix and return the logits
    /// of the last position.
    fn decoder_step(
        session: &mut Session,
        tokens: &[i64],
        enc_dims: &[usize],
        enc_data: &[f32],
    ) -> RecognitionResult<Vec<f32>> {
        let ids_value = Value::from_array(([1usize, tokens.len()], tokens.to_vec()))?;
        let enc_value = Value::from_array((
            [enc_dims[0], enc_dims[1], enc_dims[2]],
            enc_data.to_vec(),
        ))?;

        let outputs = session.run(ort::inputs![
            "input_ids" => ids_value,
            "encoder_hidden_states" => enc_value
        ])?;

        let (shape, data) = if let Some(output) = outputs.get("logits") {
            output.try_extract_tensor::<f32>()?
        } else {
            let first_key = outputs
                .keys()
                .next()
                .ok_or_else(|| RecognitionError::MissingOutput("logits".into()))?;
            outputs[first_key].try_extract_tensor::<f32>()?
        };

        let dims: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
        if dims.len() != 3 || dims[1] != tokens.len() {
            return Err(RecognitionError::UnexpectedShape {
                name: "logits".into(),
                shape: dims,
            });
        }

        let vocab_size = dims[2];
        let start = (dims[1] - 1) * vocab_size;
        Ok(data[start..start + vocab_size].to_vec())
    }
}

/// Letterbox a crop and normalize it to the [-1, 1] range the vision encoder
/// expects, in [1, 3, H, W] layout.
fn pixel_tensor(img: &DynamicImage, target_size: u32) -> Array4<f32> {
    let canvas = resize_and_pad(img, target_size);
    let target = target_size as usize;
    let mut array = Array4::<f32>::zeros((1, 3, target, target));

    for y in 0..target {
        for x in 0..target {
            let pixel = canvas.get_pixel(x as u32, y as u32);
            for c in 0..3 {
                array[[0, c, y, x]] = (pixel[c] as f32 / 255.0 - 0.5) / 0.5;
            }
        }
    }

    array
}

/// Load the id → token table from a vocab.json mapping tokens to ids.
fn load_vocabulary(path: &Path) -> RecognitionResult<HashMap<i64, String>> {
    let content = std::fs::read_to_string(path).map_err(|e| RecognitionError::VocabLoad {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let token_to_id: HashMap<String, i64> =
        serde_json::from_str(&content).map_err(|e| RecognitionError::VocabLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    Ok(token_to_id.into_iter().map(|(token, id)| (id, token)).collect())
}

/// Map generated token ids back to text, dropping special tokens and
/// resolving byte-level BPE whitespace markers.
fn detokenize(vocab: &HashMap<i64, String>, token_ids: &[i64], special: &[i64]) -> String {
    let mut text = String::new();
    for id in token_ids {
        if special.contains(id) {
            continue;
        }
        if let Some(token) = vocab.get(id) {
            text.push_str(token);
        }
    }
    text.replace('Ġ', " ").replace('Ċ', "\n").trim().to_string()
}

fn log_softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let sum: f32 = logits.iter().map(|&x| (x - max).exp()).sum();
    let lse = max + sum.ln();
    logits.iter().map(|&x| x - lse).collect()
}

/// Indices and values of the `k` largest entries, best first.
fn top_k(log_probs: &[f32], k: usize) -> Vec<(i64, f32)> {
    let mut indexed: Vec<(i64, f32)> = log_probs
        .iter()
        .copied()
        .enumerate()
        .map(|(i, v)| (i as i64, v))
        .collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    indexed.truncate(k);
    indexed
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn log_softmax_is_normalized() {
        let probs = log_softmax(&[1.0, 2.0, 3.0]);
        let total: f32 = probs.iter().map(|&p| p.exp()).sum();
        assert!((total - 1.0).abs() < 1e-5);
        // Order is preserved
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn top_k_returns_best_first() {
        let picked = top_k(&[0.1, 0.9, 0.5, 0.7], 2);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0].0, 1);
        assert_eq!(picked[1].0, 3);
    }

    #[test]
    fn top_k_handles_small_inputs() {
        let picked = top_k(&[0.3], 4);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].0, 0);
    }

    #[test]
    fn detokenize_resolves_bpe_markers_and_specials() {
        let vocab: HashMap<i64, String> = [
            (0, "<s>".to_string()),
            (2, "</s>".to_string()),
            (10, "ĠHello".to_string()),
            (11, "Ġworld".to_string()),
            (12, "!".to_string()),
        ]
        .into_iter()
        .collect();

        let text = detokenize(&vocab, &[2, 10, 11, 12, 2], &[0, 1, 2, 3]);
        assert_eq!(text, "Hello world!");
    }

    #[test]
    fn detokenize_skips_unknown_ids() {
        let vocab: HashMap<i64, String> = [(10, "Ġhi".to_string())].into_iter().collect();
        assert_eq!(detokenize(&vocab, &[10, 9999], &[]), "hi");
    }

    #[test]
    fn pixel_tensor_normalizes_to_unit_range() {
        let white = DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 10, Rgb([255, 255, 255])));
        let tensor = pixel_tensor(&white, 32);
        assert_eq!(tensor.shape(), &[1, 3, 32, 32]);
        // Center pixel comes from the white content
        assert!((tensor[[0, 0, 16, 16]] - 1.0).abs() < 1e-6);
        // Letterbox rows fill with zeros, which normalize to -1
        assert!((tensor[[0, 0, 0, 16]] - (-1.0)).abs() < 1e-6);
    }
}
