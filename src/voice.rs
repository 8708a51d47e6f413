//! Speech synthesis through the COEIROINK HTTP engine.

use crate::config::SpeechConfig;
use crate::error::{Error, Result};
use crate::persona::VoiceVariant;
use crate::retry::RetryPolicy;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

pub trait SpeechSynthesizer {
    /// WAV bytes for `text` spoken by `voice`.
    fn synthesize(&mut self, text: &str, voice: &VoiceVariant) -> Result<Vec<u8>>;
}

pub struct CoeiroinkClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    retry: RetryPolicy,
}

impl CoeiroinkClient {
    pub fn new(cfg: &SpeechConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            retry: RetryPolicy::new(cfg.attempts, Duration::from_secs(1)),
        })
    }

    fn estimate_prosody(&self, text: &str) -> Result<Value> {
        let resp: Value = self
            .client
            .post(format!("{}/v1/estimate_prosody", self.endpoint))
            .json(&json!({ "text": text }))
            .send()?
            .error_for_status()?
            .json()?;
        resp.get("detail")
            .cloned()
            .ok_or_else(|| Error::Speech("prosody response has no detail".into()))
    }
}

impl SpeechSynthesizer for CoeiroinkClient {
    fn synthesize(&mut self, text: &str, voice: &VoiceVariant) -> Result<Vec<u8>> {
        if text.trim().is_empty() {
            return Err(Error::Speech("empty text".into()));
        }
        debug!(voice = %voice.name, "estimating prosody");
        let detail = self.estimate_prosody(text)?;
        let query = json!({
            "speakerUuid": voice.uuid,
            "styleId": voice.style,
            "text": text,
            "speedScale": 1.0,
            "volumeScale": 1.0,
            "prosodyDetail": detail,
            "pitchScale": 0.0,
            "intonationScale": 1.0,
            "prePhonemeLength": 0.1,
            "postPhonemeLength": 0.5,
            "outputSamplingRate": 24000,
        });
        let url = format!("{}/v1/synthesis", self.endpoint);
        let bytes = self.retry.run("speech synthesis", |_| -> Result<Vec<u8>> {
            let resp = self.client.post(&url).json(&query).send()?.error_for_status()?;
            Ok(resp.bytes()?.to_vec())
        })?;
        info!(bytes = bytes.len(), "speech synthesized");
        Ok(bytes)
    }
}
