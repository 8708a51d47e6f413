//! Normalization applied to the cropped subject before analysis.
//!
//! Stages run in order and each can be switched off: gamma lift plus a
//! bounded brightness offset, CLAHE on the Lab lightness channel, and optional
//! background matting. Matting is best-effort; any failure keeps the
//! contrast-enhanced image.

use crate::config::PreprocessConfig;
use crate::error::{Error, Result};
use crate::frame::Frame;
use candle_core::{DType, Device, Tensor};
use candle_onnx::{onnx, read_file, simple_eval};
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Rgb, RgbImage, RgbaImage};
use opencv::core::{Mat, Size, Vector, CV_8UC3};
use opencv::imgproc;
use opencv::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Produces a per-pixel foreground alpha for a frame.
pub trait Matting {
    fn alpha(&mut self, frame: &Frame) -> Result<GrayImage>;
}

pub struct PreprocessOutput {
    /// Image handed to analysis; RGBA when the background was removed.
    pub image: DynamicImage,
    pub brightened: Frame,
    pub contrast: Frame,
    pub background_removed: bool,
}

pub struct Preprocessor {
    cfg: PreprocessConfig,
    matting: Option<Box<dyn Matting>>,
}

impl Preprocessor {
    pub fn new(cfg: PreprocessConfig, matting: Option<Box<dyn Matting>>) -> Self {
        Self { cfg, matting }
    }

    pub fn run(&mut self, frame: Frame) -> PreprocessOutput {
        let brightened = if self.cfg.brightness {
            normalize_brightness(&frame, self.cfg.gamma, self.cfg.target_luminance, self.cfg.max_offset)
        } else {
            frame
        };
        let contrast = if self.cfg.contrast {
            enhance_contrast(&brightened, self.cfg.clip_limit, self.cfg.tile_grid).unwrap_or_else(|e| {
                warn!("contrast enhancement failed, keeping brightened image: {e}");
                brightened.clone()
            })
        } else {
            brightened.clone()
        };
        let removed = if self.cfg.background_removal {
            self.remove_background(&contrast)
        } else {
            None
        };
        let background_removed = removed.is_some();
        let image = match removed {
            Some(rgba) => DynamicImage::ImageRgba8(rgba),
            None => DynamicImage::ImageRgb8(contrast.image().clone()),
        };
        PreprocessOutput {
            image,
            brightened,
            contrast,
            background_removed,
        }
    }

    fn remove_background(&mut self, frame: &Frame) -> Option<RgbaImage> {
        let Some(matting) = self.matting.as_mut() else {
            warn!("background removal enabled but no matting model loaded");
            return None;
        };
        match matting.alpha(frame).and_then(|a| apply_alpha(frame, &a)) {
            Ok(img) => {
                debug!("background removed");
                Some(img)
            }
            Err(e) => {
                warn!("background removal failed, keeping contrast image: {e}");
                None
            }
        }
    }
}

pub fn gamma_lut(gamma: f32) -> [u8; 256] {
    let inv = 1.0 / gamma.max(f32::EPSILON);
    let mut lut = [0u8; 256];
    for (i, v) in lut.iter_mut().enumerate() {
        *v = ((i as f32 / 255.0).powf(inv) * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Rec. 601 luma averaged over the frame.
pub fn mean_luminance(img: &RgbImage) -> f32 {
    let n = (img.width() as u64 * img.height() as u64).max(1);
    let sum: f64 = img
        .pixels()
        .map(|Rgb([r, g, b])| 0.299 * *r as f64 + 0.587 * *g as f64 + 0.114 * *b as f64)
        .sum();
    (sum / n as f64) as f32
}

/// Offset added when the mean luma is below target: 0.8 of the deficit,
/// capped at `max_offset`.
pub fn brightness_offset(mean: f32, target: f32, max_offset: f32) -> f32 {
    if mean >= target {
        0.0
    } else {
        ((target - mean) * 0.8).min(max_offset)
    }
}

pub fn normalize_brightness(frame: &Frame, gamma: f32, target: f32, max_offset: f32) -> Frame {
    let lut = gamma_lut(gamma);
    let mut img = frame.image().clone();
    for p in img.pixels_mut() {
        for c in p.0.iter_mut() {
            *c = lut[*c as usize];
        }
    }
    let mean = mean_luminance(&img);
    let offset = brightness_offset(mean, target, max_offset);
    if offset > 0.0 {
        let add = offset.round() as i16;
        for p in img.pixels_mut() {
            for c in p.0.iter_mut() {
                *c = (*c as i16 + add).clamp(0, 255) as u8;
            }
        }
    }
    debug!(mean, offset, "brightness normalized");
    Frame::new(img)
}

/// CLAHE on the L channel of Lab; the a and b planes are merged back untouched.
pub fn enhance_contrast(frame: &Frame, clip_limit: f32, grid: u32) -> Result<Frame> {
    let (w, h) = (frame.width(), frame.height());
    if w == 0 || h == 0 {
        return Ok(frame.clone());
    }
    let mut data = frame.image().as_raw().clone();
    // SAFETY: `data` holds h*w*3 bytes and outlives `rgb`.
    let rgb = unsafe {
        Mat::new_rows_cols_with_data_unsafe(
            h as i32,
            w as i32,
            CV_8UC3,
            data.as_mut_ptr().cast(),
            opencv::core::Mat_AUTO_STEP,
        )?
    };
    let mut lab = Mat::default();
    imgproc::cvt_color_def(&rgb, &mut lab, imgproc::COLOR_RGB2Lab)?;

    let mut channels = Vector::<Mat>::new();
    opencv::core::split(&lab, &mut channels)?;
    let grid = grid.max(1) as i32;
    let mut clahe = imgproc::create_clahe(f64::from(clip_limit), Size::new(grid, grid))?;
    let mut lightness = Mat::default();
    clahe.apply(&channels.get(0)?, &mut lightness)?;
    channels.set(0, lightness)?;

    let mut merged = Mat::default();
    opencv::core::merge(&channels, &mut merged)?;
    let mut out = Mat::default();
    imgproc::cvt_color_def(&merged, &mut out, imgproc::COLOR_Lab2RGB)?;
    let bytes = out.data_bytes()?.to_vec();
    let img = RgbImage::from_raw(w, h, bytes)
        .ok_or_else(|| Error::Model("contrast output size mismatch".into()))?;
    Ok(Frame::new(img))
}

pub fn apply_alpha(frame: &Frame, alpha: &GrayImage) -> Result<RgbaImage> {
    let (w, h) = (frame.width(), frame.height());
    let alpha = if alpha.dimensions() == (w, h) {
        alpha.clone()
    } else {
        image::imageops::resize(alpha, w, h, FilterType::Triangle)
    };
    let mut out = RgbaImage::new(w, h);
    for (x, y, p) in out.enumerate_pixels_mut() {
        let Rgb([r, g, b]) = *frame.image().get_pixel(x, y);
        *p = image::Rgba([r, g, b, alpha.get_pixel(x, y)[0]]);
    }
    if out.pixels().all(|p| p[3] == 0) {
        return Err(Error::Model("matting produced an empty mask".into()));
    }
    Ok(out)
}

const MATTING_SIZE: u32 = 320;
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Salient-object segmentation model (U²-Net family) exported to ONNX.
pub struct OnnxMatting {
    model: onnx::ModelProto,
    input_name: String,
    output_name: String,
    device: Device,
}

impl OnnxMatting {
    pub fn load(path: &Path) -> Result<Self> {
        let model = read_file(path)?;
        let graph = model
            .graph
            .as_ref()
            .ok_or_else(|| Error::Model("matting graph missing".into()))?;
        let input_name = graph
            .input
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| Error::Model("matting model has no input".into()))?;
        let output_name = graph
            .output
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| Error::Model("matting model has no output".into()))?;
        info!(path = %path.display(), "matting model loaded");
        Ok(Self {
            model,
            input_name,
            output_name,
            device: Device::Cpu,
        })
    }
}

impl Matting for OnnxMatting {
    fn alpha(&mut self, frame: &Frame) -> Result<GrayImage> {
        let resized = image::imageops::resize(frame.image(), MATTING_SIZE, MATTING_SIZE, FilterType::Triangle);
        let size = MATTING_SIZE as usize;
        let mut data = vec![0f32; 3 * size * size];
        for (i, p) in resized.pixels().enumerate() {
            for c in 0..3 {
                data[c * size * size + i] = (p[c] as f32 / 255.0 - MEAN[c]) / STD[c];
            }
        }
        let input = Tensor::from_vec(data, (1, 3, size, size), &self.device)?;
        let mut inputs = HashMap::new();
        inputs.insert(self.input_name.clone(), input);
        let mut outputs = simple_eval(&self.model, inputs)?;
        let mask = outputs
            .remove(&self.output_name)
            .ok_or_else(|| Error::Model("matting output missing".into()))?
            .flatten_all()?
            .to_dtype(DType::F32)?
            .to_vec1::<f32>()?;
        if mask.len() != size * size {
            return Err(Error::Model(format!("unexpected mask size {}", mask.len())));
        }
        let (lo, hi) = mask
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let range = (hi - lo).max(f32::EPSILON);
        let bytes = mask
            .iter()
            .map(|v| (((v - lo) / range) * 255.0).round() as u8)
            .collect();
        let small = GrayImage::from_raw(MATTING_SIZE, MATTING_SIZE, bytes)
            .ok_or_else(|| Error::Model("mask buffer mismatch".into()))?;
        Ok(image::imageops::resize(&small, frame.width(), frame.height(), FilterType::Triangle))
    }
}
