use crate::persona::VoiceVariant;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{env, fs, path::PathBuf};
use tracing::{debug, error, warn};

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    pub camera: CameraConfig,
    pub detector: DetectorConfig,
    pub preprocess: PreprocessConfig,
    pub pipeline: PipelineConfig,
    pub analysis: AnalysisConfig,
    pub dialogue: DialogueConfig,
    pub speech: SpeechConfig,
    /// Voice variants keyed by persona id.
    pub personas: BTreeMap<String, Vec<VoiceVariant>>,
    /// Keyword to memory instruction, matched against the item name.
    pub memories: Vec<(String, String)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            detector: DetectorConfig::default(),
            preprocess: PreprocessConfig::default(),
            pipeline: PipelineConfig::default(),
            analysis: AnalysisConfig::default(),
            dialogue: DialogueConfig::default(),
            speech: SpeechConfig::default(),
            personas: BTreeMap::new(),
            memories: crate::prompts::DEFAULT_MEMORIES
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// Manual sensor values applied after auto-exposure and auto-white-balance are disabled.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(default)]
pub struct ManualSettings {
    pub exposure: i64,
    pub gain: i64,
    pub contrast: i64,
    pub saturation: i64,
    pub brightness: i64,
    pub white_balance: i64,
}

impl Default for ManualSettings {
    fn default() -> Self {
        Self {
            exposure: -6,
            gain: 0,
            contrast: 32,
            saturation: 64,
            brightness: 0,
            white_balance: 4600,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct CameraConfig {
    /// Fixed device index; `None` runs the physical camera selector.
    pub index: Option<u32>,
    pub width: u32,
    pub height: u32,
    pub manual: ManualSettings,
    /// Frames discarded right after opening the device.
    pub init_warmup_frames: u32,
    pub init_read_attempts: u32,
    pub warmup_frames: u32,
    pub sample_frames: u32,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
    pub exclude_patterns: Vec<String>,
    pub min_fps: f32,
    pub fallback_index: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: None,
            width: 1280,
            height: 720,
            manual: ManualSettings::default(),
            init_warmup_frames: 15,
            init_read_attempts: 5,
            warmup_frames: 5,
            sample_frames: 5,
            retry_attempts: 2,
            retry_backoff_ms: 500,
            exclude_patterns: vec!["obs".into(), "virtual".into()],
            min_fps: 5.0,
            fallback_index: 0,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct DetectorConfig {
    pub model: String,
    pub repo: String,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub margin_ratio: f32,
    /// Labels the detector is known to report for the display stand.
    pub misidentified_labels: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model: "yolov8n-onnx-web/yolov8n.onnx".into(),
            repo: "salim4n/yolov8n-detect-onnx".into(),
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            margin_ratio: 0.1,
            misidentified_labels: vec!["cell phone".into(), "remote".into(), "laptop".into()],
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct PreprocessConfig {
    pub brightness: bool,
    pub contrast: bool,
    pub background_removal: bool,
    pub gamma: f32,
    pub target_luminance: f32,
    pub max_offset: f32,
    pub clip_limit: f32,
    pub tile_grid: u32,
    pub matting_model: Option<PathBuf>,
    pub save_intermediates: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            brightness: true,
            contrast: true,
            background_removal: false,
            gamma: 1.5,
            target_luminance: 140.0,
            max_offset: 50.0,
            clip_limit: 2.0,
            tile_grid: 8,
            matting_model: None,
            save_intermediates: true,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub display_threshold: f32,
    pub history_limit: usize,
    pub debounce_ms: u64,
    pub default_attribution: String,
    pub category_names: BTreeMap<String, String>,
    pub topics: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let category_names = [
            ("machine", "machine"),
            ("cloth", "cloth"),
            ("container", "container"),
            ("stationery", "stationery"),
            ("leather", "leather goods"),
            ("metal", "metal thing"),
            ("other", "thing"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self {
            data_dir: PathBuf::from("data"),
            display_threshold: 0.9,
            history_limit: 100,
            debounce_ms: 2000,
            default_attribution: "a nameless thing".into(),
            category_names,
            topics: crate::prompts::DEFAULT_TOPICS
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct AnalysisConfig {
    pub endpoint: String,
    pub model: String,
    pub progress_interval: u32,
    pub timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:11434".into(),
            model: "qwen2.5vl:7b".into(),
            progress_interval: 10,
            timeout_secs: 300,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct DialogueConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key_env: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.deepseek.com".into(),
            model: "deepseek-chat".into(),
            api_key_env: "DEEPSEEK_API_KEY".into(),
            temperature: 1.0,
            timeout_secs: 60,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SpeechConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub attempts: u32,
    pub timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "http://127.0.0.1:50032".into(),
            attempts: 3,
            timeout_secs: 30,
        }
    }
}

pub fn config_path() -> PathBuf {
    env::var_os("OBJECT_VOICE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.json"))
}

pub fn load_config() -> Config {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &std::path::Path) -> Config {
    match fs::read(path) {
        Ok(data) => match serde_json::from_slice(&data) {
            Ok(cfg) => {
                debug!(path = %path.display(), "loaded configuration");
                cfg
            }
            Err(e) => {
                error!("failed to parse {}: {e}", path.display());
                Config::default()
            }
        },
        Err(_) => {
            warn!(path = %path.display(), "no configuration file, using defaults");
            Config::default()
        }
    }
}
