use crate::config::DetectorConfig;
use crate::error::{Error, Result};
use crate::frame::Frame;
use candle_core::{DType, Device, Tensor};
use candle_onnx::{onnx, read_file, simple_eval};
use hf_hub::api::sync::Api;
use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

pub const INPUT_SIZE: u32 = 640;
const PAD_VALUE: u8 = 114;

/// Axis-aligned box in source pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    pub fn iou(&self, other: &BBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BBox,
}

impl Detection {
    pub fn area(&self) -> f32 {
        self.bbox.area()
    }
}

pub trait Detector {
    /// One inference pass; boxes below `confidence_threshold` are dropped.
    fn detect(&mut self, frame: &Frame, confidence_threshold: f32) -> Result<Vec<Detection>>;
}

/// YOLOv8 ONNX model evaluated with candle.
pub struct YoloDetector {
    model: onnx::ModelProto,
    input_name: String,
    output_name: String,
    iou_threshold: f32,
    device: Device,
}

impl YoloDetector {
    /// Loads the model from a local path, or downloads it from the hub.
    pub fn load(cfg: &DetectorConfig) -> Result<Self> {
        let model_path = if Path::new(&cfg.model).exists() {
            cfg.model.clone()
        } else {
            info!(repo = %cfg.repo, file = %cfg.model, "downloading detector model");
            Api::new()
                .and_then(|api| api.model(cfg.repo.clone()).get(&cfg.model))
                .map_err(|e| Error::Detection(format!("failed to download model: {e}")))?
                .to_string_lossy()
                .into()
        };
        let mut model = read_file(&model_path)
            .map_err(|e| Error::Detection(format!("failed to load model: {e}")))?;
        patch_maxpool_padding(&mut model);
        let graph = model
            .graph
            .as_ref()
            .ok_or_else(|| Error::Detection("model graph missing".into()))?;
        let input_name = graph
            .input
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| Error::Detection("model has no input".into()))?;
        let output_name = graph
            .output
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| Error::Detection("model has no output".into()))?;
        debug!(path = %model_path, input = %input_name, output = %output_name, "detector loaded");
        Ok(Self {
            model,
            input_name,
            output_name,
            iou_threshold: cfg.iou_threshold,
            device: Device::Cpu,
        })
    }

    fn input_tensor(&self, frame: &Frame, lb: &Letterbox) -> Result<Tensor> {
        let (w, h) = lb.scaled_size(frame.width(), frame.height());
        let resized = image::imageops::resize(frame.image(), w, h, FilterType::CatmullRom);
        let mut canvas = RgbImage::from_pixel(INPUT_SIZE, INPUT_SIZE, Rgb([PAD_VALUE; 3]));
        image::imageops::replace(&mut canvas, &resized, lb.pad_x as i64, lb.pad_y as i64);
        let size = INPUT_SIZE as usize;
        let t = Tensor::from_vec(canvas.into_raw(), (size, size, 3), &self.device)?
            .permute((2, 0, 1))?
            .to_dtype(DType::F32)?
            .affine(1.0 / 255.0, 0.0)?
            .unsqueeze(0)?;
        Ok(t)
    }
}

/// Aspect-preserving fit into the square model input, centered on gray padding.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    pub fn fit(width: u32, height: u32, target: u32) -> Self {
        let scale = (target as f32 / width.max(1) as f32).min(target as f32 / height.max(1) as f32);
        let sw = ((width as f32 * scale).round() as u32).clamp(1, target);
        let sh = ((height as f32 * scale).round() as u32).clamp(1, target);
        Self {
            scale,
            pad_x: (target - sw) / 2,
            pad_y: (target - sh) / 2,
        }
    }

    pub fn scaled_size(&self, width: u32, height: u32) -> (u32, u32) {
        (
            ((width as f32 * self.scale).round() as u32).max(1),
            ((height as f32 * self.scale).round() as u32).max(1),
        )
    }

    /// Maps a point in model input space back to source pixels.
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x as f32) / self.scale, (y - self.pad_y as f32) / self.scale)
    }
}

impl Detector for YoloDetector {
    fn detect(&mut self, frame: &Frame, confidence_threshold: f32) -> Result<Vec<Detection>> {
        let mut inputs = HashMap::new();
        let lb = Letterbox::fit(frame.width(), frame.height(), INPUT_SIZE);
        inputs.insert(self.input_name.clone(), self.input_tensor(frame, &lb)?);
        let mut outputs = simple_eval(&self.model, inputs)?;
        let output = outputs
            .remove(&self.output_name)
            .ok_or_else(|| Error::Detection("model output missing".into()))?;
        // [1, 4 + classes, proposals]
        let rows = output.squeeze(0)?.to_dtype(DType::F32)?.to_vec2::<f32>()?;
        let candidates = decode_yolo(&rows, confidence_threshold, &lb, (frame.width(), frame.height()));
        let kept = nms(candidates, self.iou_threshold);
        debug!(count = kept.len(), "detections after nms");
        Ok(kept)
    }
}

/// Decodes YOLOv8 rows `[cx, cy, w, h, class scores...]` laid out column-wise
/// and maps the boxes into the source frame, clamped to its bounds.
pub fn decode_yolo(rows: &[Vec<f32>], threshold: f32, lb: &Letterbox, frame: (u32, u32)) -> Vec<Detection> {
    if rows.len() < 5 {
        return Vec::new();
    }
    let proposals = rows[0].len();
    let mut out = Vec::new();
    for i in 0..proposals {
        let (class, score) = rows[4..]
            .iter()
            .enumerate()
            .map(|(c, r)| (c, r[i]))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
        if score < threshold {
            continue;
        }
        let (cx, cy, w, h) = (rows[0][i], rows[1][i], rows[2][i], rows[3][i]);
        let (x1, y1) = lb.to_source(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = lb.to_source(cx + w / 2.0, cy + h / 2.0);
        let (fw, fh) = (frame.0 as f32, frame.1 as f32);
        out.push(Detection {
            label: COCO_CLASSES.get(class).copied().unwrap_or("object").to_string(),
            confidence: score,
            bbox: BBox::new(x1.clamp(0.0, fw), y1.clamp(0.0, fh), x2.clamp(0.0, fw), y2.clamp(0.0, fh)),
        });
    }
    out
}

/// Greedy class-agnostic suppression, highest confidence first.
pub fn nms(mut boxes: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::new();
    for b in boxes {
        if kept.iter().all(|k| k.bbox.iou(&b.bbox) <= iou_threshold) {
            kept.push(b);
        }
    }
    kept
}

fn patch_maxpool_padding(model: &mut onnx::ModelProto) {
    let Some(graph) = model.graph.as_mut() else {
        return;
    };
    let mut new_nodes = Vec::with_capacity(graph.node.len());
    for mut node in std::mem::take(&mut graph.node) {
        if node.op_type == "MaxPool" {
            let pads = node
                .attribute
                .iter_mut()
                .find(|a| a.name == "pads" && a.ints.iter().any(|&v| v != 0))
                .map(|a| std::mem::replace(&mut a.ints, vec![0; 4]));
            if let Some(pads) = pads.filter(|p| p.len() == 4) {
                let pad_init = format!("{}_pads", node.name);
                let full = vec![0, 0, pads[0], pads[1], 0, 0, pads[2], pads[3]];
                graph.initializer.push(onnx::TensorProto {
                    name: pad_init.clone(),
                    dims: vec![full.len() as i64],
                    data_type: onnx::tensor_proto::DataType::Int64 as i32,
                    int64_data: full,
                    ..Default::default()
                });
                let pad_out = format!("{}_pad_out", node.name);
                let mut pad_node = onnx::NodeProto {
                    input: vec![node.input[0].clone(), pad_init],
                    output: vec![pad_out.clone()],
                    name: format!("{}_pad", node.name),
                    op_type: "Pad".to_string(),
                    ..Default::default()
                };
                pad_node.attribute.push(onnx::AttributeProto {
                    name: "mode".to_string(),
                    r#type: onnx::attribute_proto::AttributeType::String as i32,
                    s: b"reflect".to_vec(),
                    ..Default::default()
                });
                new_nodes.push(pad_node);
                node.input[0] = pad_out;
            }
        }
        new_nodes.push(node);
    }
    graph.node = new_nodes;
}

pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];
