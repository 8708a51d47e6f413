use crate::config::DialogueConfig;
use crate::error::{Error, Result};
use crate::prompts;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};

/// Text used when the generator returns nothing usable.
pub const SILENT_LINE: &str = "......";

#[derive(Clone, Debug, PartialEq)]
pub struct DialogueRequest {
    pub item_name: String,
    /// `Machine=…, Shape=…, State=…` line.
    pub context: String,
    pub topic: String,
    pub instruction: Option<String>,
}

impl DialogueRequest {
    pub fn prompt(&self) -> String {
        format!(
            "Role: personify the object '{}'.\n{}\nTopic: {}\n\n{}\n{}\n{}\n{}\n",
            self.item_name,
            self.context,
            self.topic,
            prompts::CORE_LOGIC,
            self.instruction.as_deref().unwrap_or(""),
            prompts::PERSONA_LOGIC,
            prompts::TASK,
        )
    }
}

pub trait DialogueGenerator {
    /// Free text, conventionally `<dialogue> by <attribution>`.
    fn generate(&mut self, request: &DialogueRequest) -> Result<String>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedDialogue {
    pub text: String,
    pub attribution: String,
}

fn by_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^(.*)\s+by\s+(.*)$").expect("valid regex"))
}

/// Splits on the last ` by `. Without it the whole reply is the dialogue and
/// the default attribution applies.
pub fn parse_dialogue(raw: &str, default_attribution: &str) -> ParsedDialogue {
    let cleaned = strip_fences(raw);
    let (text, attribution) = match by_re().captures(&cleaned) {
        Some(c) => (c[1].trim().to_string(), c[2].trim().to_string()),
        None => (cleaned.trim().to_string(), String::new()),
    };
    let text = text.trim_matches(|c| matches!(c, '"' | '「' | '」')).trim().to_string();
    ParsedDialogue {
        text: if text.is_empty() { SILENT_LINE.to_string() } else { text },
        attribution: if attribution.is_empty() {
            default_attribution.to_string()
        } else {
            attribution
        },
    }
}

fn strip_fences(text: &str) -> String {
    let t = text.trim();
    if t.starts_with("```") {
        t.replace("```json", "").replace("```", "").trim().to_string()
    } else {
        t.to_string()
    }
}

/// OpenAI-compatible chat completion endpoint.
pub struct ChatDialogue {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: String,
    temperature: f32,
}

impl ChatDialogue {
    /// Reads the API key from the environment variable named in the config.
    pub fn new(cfg: &DialogueConfig) -> Result<Self> {
        let api_key = std::env::var(&cfg.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Config(format!("{} is not set", cfg.api_key_env)))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        info!(model = %cfg.model, "dialogue client ready");
        Ok(Self {
            client,
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            api_key,
            temperature: cfg.temperature,
        })
    }
}

#[derive(Deserialize)]
struct Completion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl DialogueGenerator for ChatDialogue {
    fn generate(&mut self, request: &DialogueRequest) -> Result<String> {
        let prompt = request.prompt();
        debug!(item = %request.item_name, topic = %request.topic, "requesting dialogue");
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": prompts::DIALOGUE_SYSTEM},
                {"role": "user", "content": prompt},
            ],
            "stream": false,
            "temperature": self.temperature,
        });
        let completion: Completion = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?
            .error_for_status()?
            .json()?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Dialogue("empty completion".into()))
    }
}
