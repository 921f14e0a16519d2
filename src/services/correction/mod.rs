// Grammar correction through a local llama.cpp-style completion server.
//
// The quantized language model stays an external artifact; this client sends
// one completion request per transcription with fixed sampling parameters and
// returns the trimmed completion text. No retries.

use crate::core::config::Config;
use crate::core::errors::{CorrectionError, CorrectionResult};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct CorrectionService {
    config: Arc<Config>,
    http_client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    prompt: String,
    n_predict: u32,
    temperature: f32,
    top_p: f32,
    stop: Vec<String>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    content: String,
}

impl CorrectionService {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.correction.timeout_seconds))
            .pool_max_idle_per_host(2)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Request a single corrected rendition of the raw transcription.
    pub async fn correct(&self, transcription: &str) -> CorrectionResult<String> {
        let corr = &self.config.correction;
        let url = format!("{}/completion", corr.endpoint.trim_end_matches('/'));

        let request = CompletionRequest {
            prompt: build_prompt(transcription),
            n_predict: corr.max_tokens,
            temperature: corr.temperature,
            top_p: corr.top_p,
            stop: vec![corr.stop.clone()],
            stream: false,
        };

        debug!("Requesting correction for {} chars", transcription.len());
        let response = self.http_client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CorrectionError::EndpointStatus {
                status: status.as_u16(),
                body,
            });
        }

        let completion: CompletionResponse = response.json().await?;
        Ok(completion.content.trim().to_string())
    }
}

/// Fixed instructional prompt embedding the raw transcription verbatim.
fn build_prompt(transcription: &str) -> String {
    format!(
        "You are an expert in text correction. Below is an OCR-generated text with \
        potential errors in spelling, grammar, and word choice. Your task is to correct \
        the text to make it grammatically correct, coherent, and natural, preserving the \
        original meaning. Return only the corrected text. Make sure the final text makes \
        sense and if you add words then do not add more than 1 (one) word.\n\n\
        OCR Text: {transcription}\n\n\
        Corrected Text:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_transcription_verbatim() {
        let raw = "teh quick brwn fox";
        let prompt = build_prompt(raw);
        assert!(prompt.contains("OCR Text: teh quick brwn fox"));
        assert!(prompt.ends_with("Corrected Text:"));
    }

    #[test]
    fn completion_request_serializes_sampling_parameters() {
        let request = CompletionRequest {
            prompt: "p".to_string(),
            n_predict: 512,
            temperature: 0.25,
            top_p: 0.9,
            stop: vec!["\n\n".to_string()],
            stream: false,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["n_predict"], 512);
        assert_eq!(json["stop"][0], "\n\n");
        assert_eq!(json["stream"], false);
    }
}
