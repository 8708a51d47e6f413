use crate::config::DetectorConfig;
use crate::detect::{BBox, Detection, Detector};
use crate::frame::Frame;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CropPolicy {
    None,
    Single,
    Multi,
}

impl CropPolicy {
    pub fn tag(self) -> &'static str {
        match self {
            CropPolicy::None => "none",
            CropPolicy::Single => "single",
            CropPolicy::Multi => "multi",
        }
    }
}

/// Integer crop rectangle, `x2`/`y2` exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl CropBox {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x1: 0,
            y1: 0,
            x2: width,
            y2: height,
        }
    }

    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    pub fn as_bbox(&self) -> BBox {
        BBox::new(self.x1 as f32, self.y1 as f32, self.x2 as f32, self.y2 as f32)
    }
}

#[derive(Clone, Debug)]
pub struct CropResult {
    pub frame: Frame,
    pub crop_box: CropBox,
    pub detection_count: usize,
    pub detections: Vec<Detection>,
    pub policy: CropPolicy,
    /// Highest-confidence detection, whether or not it shaped the crop alone.
    pub primary: Option<Detection>,
}

impl CropResult {
    pub fn primary_label(&self) -> Option<&str> {
        self.primary.as_ref().map(|d| d.label.as_str())
    }
}

/// Grows `bbox` by `margin_ratio` of its own size on each side and clamps
/// it to the frame.
pub fn expand_with_margin(bbox: &BBox, margin_ratio: f32, width: u32, height: u32) -> CropBox {
    let (x1, y1, x2, y2) = (bbox.x1 as i64, bbox.y1 as i64, bbox.x2 as i64, bbox.y2 as i64);
    let mx = ((x2 - x1) as f32 * margin_ratio) as i64;
    let my = ((y2 - y1) as f32 * margin_ratio) as i64;
    let (w, h) = (i64::from(width), i64::from(height));
    let cx1 = (x1 - mx).clamp(0, (w - 1).max(0));
    let cy1 = (y1 - my).clamp(0, (h - 1).max(0));
    let cx2 = (x2 + mx).clamp(cx1 + 1, w.max(1));
    let cy2 = (y2 + my).clamp(cy1 + 1, h.max(1));
    CropBox {
        x1: cx1 as u32,
        y1: cy1 as u32,
        x2: cx2 as u32,
        y2: cy2 as u32,
    }
}

/// Applies the detection-count policy to an already computed detection list.
pub fn crop_with_detections(frame: &Frame, detections: Vec<Detection>, margin_ratio: f32) -> CropResult {
    let (w, h) = (frame.width(), frame.height());
    let primary = detections
        .iter()
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        .cloned();
    let (policy, region) = match detections.as_slice() {
        [] => (CropPolicy::None, None),
        [only] => (CropPolicy::Single, Some(only.bbox)),
        [first, rest @ ..] => (
            CropPolicy::Multi,
            Some(rest.iter().fold(first.bbox, |acc, d| acc.union(&d.bbox))),
        ),
    };
    let (cropped, crop_box) = match region {
        None => (frame.clone(), CropBox::full(w, h)),
        Some(region) => {
            let b = expand_with_margin(&region, margin_ratio, w, h);
            let img = image::imageops::crop_imm(frame.image(), b.x1, b.y1, b.width(), b.height()).to_image();
            (Frame::new(img), b)
        }
    };
    CropResult {
        frame: cropped,
        crop_box,
        detection_count: detections.len(),
        detections,
        policy,
        primary,
    }
}

/// Textual hint for the analysis stage from the most confident detection
/// whose label is not a known misidentification.
pub fn detection_hint(detections: &[Detection], misidentified: &[String]) -> Option<String> {
    detections
        .iter()
        .filter(|d| {
            !misidentified
                .iter()
                .any(|m| m.trim().eq_ignore_ascii_case(d.label.trim()))
        })
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        .map(|d| format!("{} (confidence: {:.2})", d.label, d.confidence))
}

/// Detection rectangles drawn over a copy of the frame.
pub fn draw_detections(frame: &Frame, detections: &[Detection]) -> RgbImage {
    let mut img = frame.image().clone();
    for d in detections {
        let w = d.bbox.width().max(1.0) as u32;
        let h = d.bbox.height().max(1.0) as u32;
        let rect = Rect::at(d.bbox.x1 as i32, d.bbox.y1 as i32).of_size(w, h);
        draw_hollow_rect_mut(&mut img, rect, Rgb([0, 255, 0]));
    }
    img
}

/// Runs the detector once and derives the crop.
pub struct Localizer {
    detector: Option<Box<dyn Detector>>,
    confidence_threshold: f32,
    margin_ratio: f32,
    misidentified: Vec<String>,
}

impl Localizer {
    pub fn new(detector: Option<Box<dyn Detector>>, cfg: &DetectorConfig) -> Self {
        Self {
            detector,
            confidence_threshold: cfg.confidence_threshold,
            margin_ratio: cfg.margin_ratio,
            misidentified: cfg.misidentified_labels.clone(),
        }
    }

    /// A detector failure degrades to the "none" policy.
    pub fn detect_and_crop(&mut self, frame: &Frame) -> CropResult {
        let detections = match self.detector.as_mut() {
            Some(d) => match d.detect(frame, self.confidence_threshold) {
                Ok(v) => v,
                Err(e) => {
                    warn!("detection failed, using full frame: {e}");
                    Vec::new()
                }
            },
            None => {
                warn!("no detector available, using full frame");
                Vec::new()
            }
        };
        let result = crop_with_detections(frame, detections, self.margin_ratio);
        info!(
            count = result.detection_count,
            policy = result.policy.tag(),
            primary = result.primary_label().unwrap_or("-"),
            "subject located"
        );
        result
    }

    pub fn hint(&self, result: &CropResult) -> Option<String> {
        detection_hint(&result.detections, &self.misidentified)
    }
}
