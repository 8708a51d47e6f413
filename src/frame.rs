use crate::error::{Error, Result};
use chrono::{DateTime, Local};
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// An immutable 8-bit RGB raster.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame(RgbImage);

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self(image)
    }

    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self(RgbImage::from_pixel(width, height, Rgb(rgb)))
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self(image::open(path)?.into_rgb8()))
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.0
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::persistence(parent.display().to_string(), e))?;
        }
        self.0.save(path)?;
        debug!(path = %path.display(), "frame written");
        Ok(())
    }
}

/// Per-pixel, per-channel median of equally sized frames.
///
/// Frames whose size differs from the first are ignored. An even sample
/// count takes the floor of the mean of the two middle values.
pub fn median_stack(frames: &[Frame]) -> Option<Frame> {
    let first = frames.first()?;
    let (w, h) = (first.width(), first.height());
    let usable: Vec<&[u8]> = frames
        .iter()
        .filter(|f| f.width() == w && f.height() == h)
        .map(|f| f.image().as_raw().as_slice())
        .collect();
    let n = usable.len();
    let mut out = vec![0u8; first.image().as_raw().len()];
    let mut column = vec![0u8; n];
    for (i, px) in out.iter_mut().enumerate() {
        for (slot, raw) in column.iter_mut().zip(&usable) {
            *slot = raw[i];
        }
        column.sort_unstable();
        *px = if n % 2 == 1 {
            column[n / 2]
        } else {
            ((column[n / 2 - 1] as u16 + column[n / 2] as u16) / 2) as u8
        };
    }
    RgbImage::from_raw(w, h, out).map(Frame)
}

/// Well-known subdirectories under the data directory.
#[derive(Clone, Debug)]
pub struct DataDirs {
    pub root: PathBuf,
}

impl DataDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn capture(&self) -> PathBuf {
        self.root.join("capture")
    }

    pub fn processed(&self) -> PathBuf {
        self.root.join("processed")
    }

    pub fn debug(&self) -> PathBuf {
        self.root.join("debug")
    }

    pub fn voice(&self) -> PathBuf {
        self.root.join("voice")
    }

    pub fn history(&self) -> PathBuf {
        self.root.join("messages.json")
    }

    pub fn ensure(&self) {
        for dir in [self.capture(), self.processed(), self.debug(), self.voice()] {
            if let Err(e) = std::fs::create_dir_all(&dir) {
                error!("failed to create {}: {e}", dir.display());
            }
        }
    }
}

pub fn capture_file_name(now: DateTime<Local>) -> String {
    format!("capture_{}.jpg", now.format("%Y%m%d_%H%M%S_%3f"))
}

/// File name without extension, used to derive companion file names.
pub fn file_stem(name: &str) -> &str {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
}
