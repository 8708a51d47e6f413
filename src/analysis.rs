//! Image analysis: the typed record, its normalization and the Ollama client.

use crate::config::AnalysisConfig;
use crate::error::{Error, Result};
use crate::prompts;
use base64::Engine;
use image::{DynamicImage, ImageFormat};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Cursor};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_ITEM_NAME: &str = "Unknown Object";
pub const DEFAULT_CATEGORY: &str = "other";
/// Below the display threshold, so a guessed name is never shown as fact.
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Shape {
    Round,
    Sharp,
    Square,
    #[default]
    Other,
}

impl Shape {
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        [
            ("round", Shape::Round),
            ("sharp", Shape::Sharp),
            ("square", Shape::Square),
            ("other", Shape::Other),
        ]
        .into_iter()
        .find(|(k, _)| s.contains(k))
        .map(|(_, v)| v)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Shape::Round => "Round",
            Shape::Sharp => "Sharp",
            Shape::Square => "Square",
            Shape::Other => "Other",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Condition {
    Old,
    New,
    Dirty,
    Broken,
    #[default]
    Normal,
}

impl Condition {
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        [
            ("old", Condition::Old),
            ("dirty", Condition::Dirty),
            ("broken", Condition::Broken),
            ("new", Condition::New),
            ("normal", Condition::Normal),
        ]
        .into_iter()
        .find(|(k, _)| s.contains(k))
        .map(|(_, v)| v)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Condition::Old => "Old",
            Condition::New => "New",
            Condition::Dirty => "Dirty",
            Condition::Broken => "Broken",
            Condition::Normal => "Normal",
        }
    }

    pub fn is_worn(self) -> bool {
        matches!(self, Condition::Old | Condition::Dirty | Condition::Broken)
    }
}

/// Fully populated analysis result.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AnalysisRecord {
    pub is_machine: bool,
    pub shape: Shape,
    pub state: Condition,
    pub item_name: String,
    pub confidence: f32,
    pub item_category: String,
}

impl Default for AnalysisRecord {
    fn default() -> Self {
        RawAnalysis::default().normalize()
    }
}

/// Analysis fields as reported by the service; any may be absent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawAnalysis {
    pub is_machine: Option<bool>,
    pub shape: Option<String>,
    pub state: Option<String>,
    pub item_name: Option<String>,
    pub confidence: Option<f32>,
    pub item_category: Option<String>,
}

fn canonical_key(key: &str) -> String {
    let key: String = key
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .collect();
    match key.as_str() {
        "is_is_machine" | "ismachine" | "machine" => "is_machine".into(),
        "itemname" | "item" | "name" => "item_name".into(),
        "itemcategory" | "category" => "item_category".into(),
        "condition" => "state".into(),
        _ => key,
    }
}

fn as_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn as_confidence(v: &Value) -> Option<f32> {
    let f = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok()?,
        _ => return None,
    } as f32;
    if !f.is_finite() || f < 0.0 {
        return None;
    }
    // Percentages are reported now and then.
    Some(if f > 1.0 && f <= 100.0 { f / 100.0 } else { f.min(1.0) })
}

impl RawAnalysis {
    /// Reads a JSON object, reconciling key variants; first occurrence wins.
    pub fn from_value(value: &Value) -> Self {
        let mut raw = RawAnalysis::default();
        let Some(obj) = value.as_object() else {
            return raw;
        };
        for (k, v) in obj {
            match canonical_key(k).as_str() {
                "is_machine" if raw.is_machine.is_none() => raw.is_machine = as_bool(v),
                "shape" if raw.shape.is_none() => raw.shape = as_text(v),
                "state" if raw.state.is_none() => raw.state = as_text(v),
                "item_name" if raw.item_name.is_none() => raw.item_name = as_text(v),
                "item_category" if raw.item_category.is_none() => {
                    raw.item_category = as_text(v).map(|s| s.to_lowercase())
                }
                "confidence" if raw.confidence.is_none() => raw.confidence = as_confidence(v),
                _ => {}
            }
        }
        raw
    }

    /// Every field is filled; unparseable values take the defaults.
    pub fn normalize(self) -> AnalysisRecord {
        AnalysisRecord {
            is_machine: self.is_machine.unwrap_or(false),
            shape: self.shape.as_deref().and_then(Shape::parse).unwrap_or_default(),
            state: self.state.as_deref().and_then(Condition::parse).unwrap_or_default(),
            item_name: self.item_name.unwrap_or_else(|| DEFAULT_ITEM_NAME.to_string()),
            confidence: self.confidence.unwrap_or(DEFAULT_CONFIDENCE),
            item_category: self
                .item_category
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        }
    }
}

fn fenced_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").expect("valid regex"))
}

fn flat_object_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{[^{}]*\}").expect("valid regex"))
}

/// Pulls a JSON object out of free text: fenced block, then the first flat
/// object, then the last line that parses as an object.
pub fn extract_json(text: &str) -> Option<Value> {
    let parse = |s: &str| serde_json::from_str::<Value>(s).ok().filter(Value::is_object);
    if let Some(v) = fenced_re().captures(text).and_then(|c| parse(&c[1])) {
        return Some(v);
    }
    if let Some(v) = flat_object_re().find(text).and_then(|m| parse(m.as_str())) {
        return Some(v);
    }
    text.lines()
        .rev()
        .map(str::trim)
        .filter(|l| l.starts_with('{') && l.ends_with('}'))
        .find_map(parse)
}

/// Specific name when the analysis is confident enough, otherwise the
/// category label.
pub fn resolve_display_name(
    record: &AnalysisRecord,
    threshold: f32,
    categories: &BTreeMap<String, String>,
) -> String {
    if record.confidence >= threshold {
        return record.item_name.clone();
    }
    categories
        .get(&record.item_category)
        .or_else(|| categories.get(DEFAULT_CATEGORY))
        .cloned()
        .unwrap_or_else(|| "thing".to_string())
}

pub fn analysis_prompt(hint: Option<&str>) -> String {
    match hint {
        Some(h) => prompts::ANALYSIS_PROMPT_WITH_HINT.replace("{hint}", h),
        None => prompts::ANALYSIS_PROMPT.to_string(),
    }
}

pub trait Analyzer {
    /// Describes the image. `progress` receives the running chunk count.
    fn analyze(
        &mut self,
        image: &DynamicImage,
        hint: Option<&str>,
        progress: &mut dyn FnMut(u32),
    ) -> Result<RawAnalysis>;
}

pub struct OllamaAnalyzer {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    progress_interval: u32,
}

impl OllamaAnalyzer {
    pub fn new(cfg: &AnalysisConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            progress_interval: cfg.progress_interval.max(1),
        })
    }
}

pub fn encode_png_base64(image: &DynamicImage) -> Result<String> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(buf.into_inner()))
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

impl Analyzer for OllamaAnalyzer {
    fn analyze(
        &mut self,
        image: &DynamicImage,
        hint: Option<&str>,
        progress: &mut dyn FnMut(u32),
    ) -> Result<RawAnalysis> {
        if let Some(h) = hint {
            info!(hint = h, "analysis uses detection hint");
        }
        let body = json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": analysis_prompt(hint),
                "images": [encode_png_base64(image)?],
            }],
            "stream": true,
            "options": {
                "temperature": 0.1,
                "num_predict": 1024,
                "top_p": 0.85,
                "repeat_penalty": 1.1,
            },
        });
        let resp = self
            .client
            .post(format!("{}/api/chat", self.endpoint))
            .json(&body)
            .send()?
            .error_for_status()?;

        let mut content = String::new();
        let mut chunks = 0u32;
        for line in BufReader::new(resp).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let chunk: ChatChunk = serde_json::from_str(&line)?;
            if let Some(err) = chunk.error {
                return Err(Error::Analysis(err));
            }
            if let Some(m) = chunk.message {
                content.push_str(&m.content);
                chunks += 1;
                if chunks % self.progress_interval == 0 {
                    progress(chunks);
                }
            }
            if chunk.done {
                break;
            }
        }
        debug!(chunks, "analysis stream finished");
        match extract_json(&content) {
            Some(v) => Ok(RawAnalysis::from_value(&v)),
            None => {
                warn!("no JSON object in analysis response");
                Err(Error::Analysis("response carried no JSON object".into()))
            }
        }
    }
}

