//! Sequences a captured frame through localization, preprocessing,
//! analysis, dialogue and speech, and records the resulting message.

use crate::analysis::{resolve_display_name, Analyzer, AnalysisRecord, OllamaAnalyzer, RawAnalysis};
use crate::config::Config;
use crate::crop::{draw_detections, Localizer};
use crate::detect::{Detector, YoloDetector};
use crate::dialogue::{parse_dialogue, ChatDialogue, DialogueGenerator, DialogueRequest, SILENT_LINE};
use crate::events::{Event, EventSink};
use crate::frame::{capture_file_name, file_stem, DataDirs, Frame};
use crate::history::{MessageLog, MessagePair};
use crate::persona::{choose_voice, determine_persona, KeywordTable, VoiceVariant};
use crate::preprocess::{Matting, OnnxMatting, Preprocessor};
use crate::voice::{CoeiroinkClient, SpeechSynthesizer};
use chrono::Local;
use image::DynamicImage;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const FALLBACK_TOPIC: &str = "A recent time you were used";

/// External services; any of them may be missing.
#[derive(Default)]
pub struct Collaborators {
    pub analyzer: Option<Box<dyn Analyzer>>,
    pub dialogue: Option<Box<dyn DialogueGenerator>>,
    pub speech: Option<Box<dyn SpeechSynthesizer>>,
}

pub struct Coordinator {
    localizer: Localizer,
    preprocessor: Preprocessor,
    services: Collaborators,
    log: MessageLog,
    dirs: DataDirs,
    events: Arc<dyn EventSink>,
    display_threshold: f32,
    default_attribution: String,
    categories: BTreeMap<String, String>,
    topics: Vec<String>,
    voices: BTreeMap<String, Vec<VoiceVariant>>,
    memories: KeywordTable,
    save_intermediates: bool,
    speech_enabled: bool,
}

impl Coordinator {
    pub fn new(
        cfg: &Config,
        localizer: Localizer,
        preprocessor: Preprocessor,
        services: Collaborators,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let dirs = DataDirs::new(&cfg.pipeline.data_dir);
        dirs.ensure();
        let log = MessageLog::open(dirs.history(), cfg.pipeline.history_limit);
        Self {
            localizer,
            preprocessor,
            services,
            log,
            dirs,
            events,
            display_threshold: cfg.pipeline.display_threshold,
            default_attribution: cfg.pipeline.default_attribution.clone(),
            categories: cfg.pipeline.category_names.clone(),
            topics: cfg.pipeline.topics.clone(),
            voices: cfg.personas.clone(),
            memories: KeywordTable::new(&cfg.memories),
            save_intermediates: cfg.preprocess.save_intermediates,
            speech_enabled: cfg.speech.enabled,
        }
    }

    /// Builds the detector, matting model and service clients from the
    /// configuration. Anything that fails to load is logged and left out.
    pub fn from_config(cfg: &Config, events: Arc<dyn EventSink>) -> Self {
        let detector: Option<Box<dyn Detector>> = match YoloDetector::load(&cfg.detector) {
            Ok(d) => Some(Box::new(d)),
            Err(e) => {
                error!("{e}");
                None
            }
        };
        let matting: Option<Box<dyn Matting>> = match &cfg.preprocess.matting_model {
            Some(path) if cfg.preprocess.background_removal => match OnnxMatting::load(path) {
                Ok(m) => Some(Box::new(m)),
                Err(e) => {
                    warn!("matting model unavailable: {e}");
                    None
                }
            },
            _ => None,
        };
        let analyzer: Option<Box<dyn Analyzer>> = match OllamaAnalyzer::new(&cfg.analysis) {
            Ok(a) => Some(Box::new(a)),
            Err(e) => {
                error!("analysis client unavailable: {e}");
                None
            }
        };
        let dialogue: Option<Box<dyn DialogueGenerator>> = match ChatDialogue::new(&cfg.dialogue) {
            Ok(d) => Some(Box::new(d)),
            Err(e) => {
                error!("dialogue client unavailable: {e}");
                None
            }
        };
        let speech: Option<Box<dyn SpeechSynthesizer>> = if cfg.speech.enabled {
            match CoeiroinkClient::new(&cfg.speech) {
                Ok(s) => Some(Box::new(s)),
                Err(e) => {
                    error!("speech client unavailable: {e}");
                    None
                }
            }
        } else {
            None
        };
        Self::new(
            cfg,
            Localizer::new(detector, &cfg.detector),
            Preprocessor::new(cfg.preprocess.clone(), matting),
            Collaborators {
                analyzer,
                dialogue,
                speech,
            },
            events,
        )
    }

    pub fn dirs(&self) -> &DataDirs {
        &self.dirs
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    fn emit(&self, event: Event) {
        self.events.emit(event);
    }

    /// Runs every stage for one frame. Service failures degrade to their
    /// defaults, so this always produces a message.
    pub fn run_capture_pipeline(&mut self, frame: Frame) -> MessagePair {
        let now = Local::now();
        let name = capture_file_name(now);
        let stem = file_stem(&name).to_string();
        persist(&frame, &self.dirs.capture().join(&name));

        let crop = self.localizer.detect_and_crop(&frame);
        self.emit(Event::ItemIdentified(crop.primary_label().map(str::to_string)));

        let output = self.preprocessor.run(crop.frame.clone());
        if self.save_intermediates {
            let debug_dir = self.dirs.debug();
            persist(&crop.frame, &debug_dir.join(format!("{stem}_crop.jpg")));
            persist(&output.contrast, &debug_dir.join(format!("{stem}_contrast.jpg")));
            if !crop.detections.is_empty() {
                let overlay = Frame::new(draw_detections(&frame, &crop.detections));
                persist(&overlay, &debug_dir.join(format!("{stem}_detections.jpg")));
            }
        }
        let ext = if output.background_removed { "png" } else { "jpg" };
        save_final(&output.image, &self.dirs.processed().join(format!("{stem}.{ext}")));
        self.emit(Event::CaptureComplete(name.clone()));

        let hint = self.localizer.hint(&crop);
        let record = self.analyze(&output.image, hint.as_deref());
        let display_name = resolve_display_name(&record, self.display_threshold, &self.categories);
        info!(item = %record.item_name, display = %display_name, confidence = record.confidence, "object resolved");

        let persona = determine_persona(&record);
        let voice = choose_voice(&self.voices, persona, &mut rand::thread_rng()).cloned();
        match &voice {
            Some(v) => self.emit(Event::Credit(format!("COEIROINK: {} (Role: {})", v.name, persona.role()))),
            None => warn!("no voice configured for persona {}", persona.id()),
        }

        let request = DialogueRequest {
            item_name: display_name,
            context: format!(
                "Context: Machine={}, Shape={}, State={}.",
                record.is_machine,
                record.shape.as_str(),
                record.state.as_str()
            ),
            topic: self
                .topics
                .choose(&mut rand::thread_rng())
                .cloned()
                .unwrap_or_else(|| FALLBACK_TOPIC.to_string()),
            instruction: self.memories.lookup(&record.item_name).map(str::to_string),
        };
        let raw = self.generate(&request);
        let parsed = parse_dialogue(&raw, &self.default_attribution);
        self.emit(Event::Message(parsed.text.clone()));

        let pair = MessagePair {
            image: name,
            message: parsed.text,
            attribution: parsed.attribution,
            timestamp: now.to_rfc3339(),
        };
        if let Err(e) = self.log.append(pair.clone()) {
            error!("{e}");
        }

        let detail = self.speak(&pair.message, voice.as_ref(), &stem);
        self.emit(Event::StateComplete(detail));
        pair
    }

    fn analyze(&mut self, image: &DynamicImage, hint: Option<&str>) -> AnalysisRecord {
        self.emit(Event::AnalysisStart);
        let events = self.events.clone();
        let raw = match self.services.analyzer.as_mut() {
            Some(a) => {
                let mut progress = |n: u32| events.emit(Event::AnalysisProgress(n));
                match a.analyze(image, hint, &mut progress) {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!("analysis failed, using defaults: {e}");
                        RawAnalysis::default()
                    }
                }
            }
            None => {
                warn!("no analysis service, using defaults");
                RawAnalysis::default()
            }
        };
        let record = raw.normalize();
        debug!(?record, "analysis normalized");
        record
    }

    fn generate(&mut self, request: &DialogueRequest) -> String {
        let fallback = format!("{SILENT_LINE} by {}", request.item_name);
        match self.services.dialogue.as_mut() {
            Some(d) => match d.generate(request) {
                Ok(text) => {
                    debug!(raw = %text, "dialogue generated");
                    text
                }
                Err(e) => {
                    warn!("dialogue generation failed: {e}");
                    fallback
                }
            },
            None => {
                warn!("no dialogue service, using fallback line");
                fallback
            }
        }
    }

    /// Terminal step; its failure leaves the recorded message intact.
    fn speak(&mut self, text: &str, voice: Option<&VoiceVariant>, stem: &str) -> String {
        if !self.speech_enabled {
            return "audio disabled".into();
        }
        if text.chars().count() < 2 || text == SILENT_LINE {
            warn!("message too short for speech");
            return "audio skipped".into();
        }
        let (Some(speech), Some(voice)) = (self.services.speech.as_mut(), voice) else {
            return "audio skipped".into();
        };
        let wav_name = format!("{stem}.wav");
        let path = self.dirs.voice().join(&wav_name);
        match speech.synthesize(text, voice) {
            Ok(bytes) => match std::fs::write(&path, bytes) {
                Ok(()) => format!("saved {wav_name}"),
                Err(e) => {
                    error!("failed to write {}: {e}", path.display());
                    "audio write failed".into()
                }
            },
            Err(e) => {
                error!("speech synthesis failed: {e}");
                "audio generation failed".into()
            }
        }
    }
}

fn persist(frame: &Frame, path: &Path) {
    if let Err(e) = frame.save(path) {
        error!("failed to persist {}: {e}", path.display());
    }
}

fn save_final(image: &DynamicImage, path: &Path) {
    let result = match image {
        DynamicImage::ImageRgba8(_) => image.save(path),
        other => other.to_rgb8().save(path),
    };
    if let Err(e) = result {
        error!("failed to persist {}: {e}", path.display());
    }
}
