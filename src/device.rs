//! Picks the physical camera among the enumerable devices.
//!
//! Virtual cameras (streaming software passthroughs) are excluded by name
//! and by a frame-rate floor, then the largest resolution wins. This is a
//! heuristic: when nothing survives, a fallback index is returned.

use nokhwa::{
    pixel_format::RgbFormat,
    query,
    utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType},
    Camera,
};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Indices scanned when the platform cannot enumerate device names.
pub const SCAN_LIMIT: u32 = 10;

#[derive(Clone, Debug, PartialEq)]
pub struct DeviceInfo {
    pub index: u32,
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProbeReport {
    pub frame_ok: bool,
    pub fps: f32,
    pub width: u32,
    pub height: u32,
}

impl ProbeReport {
    pub fn pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

pub trait DeviceProbe {
    /// `None` when the platform offers no name enumeration.
    fn enumerate(&mut self) -> Option<Vec<DeviceInfo>>;
    /// Opens the device briefly and reads one frame; `None` if it cannot be opened.
    fn probe(&mut self, index: u32) -> Option<ProbeReport>;
}

#[derive(Clone, Debug)]
pub struct SelectorPolicy {
    pub exclude_patterns: Vec<String>,
    pub min_fps: f32,
    pub fallback_index: u32,
}

pub fn is_excluded(name: &str, patterns: &[String]) -> bool {
    let name = name.to_lowercase();
    patterns
        .iter()
        .map(|p| p.trim().to_lowercase())
        .any(|p| !p.is_empty() && name.contains(&p))
}

/// Always returns an index; never fails for "no camera".
pub fn select_physical_camera_index<P: DeviceProbe>(probe: &mut P, policy: &SelectorPolicy) -> u32 {
    let candidates: Vec<u32> = match probe.enumerate() {
        Some(devices) => devices
            .into_iter()
            .filter(|d| {
                let excluded = is_excluded(&d.name, &policy.exclude_patterns);
                if excluded {
                    debug!(index = d.index, name = %d.name, "excluding camera by name");
                }
                !excluded
            })
            .map(|d| d.index)
            .collect(),
        None => {
            debug!("device names unavailable, scanning indices");
            (0..SCAN_LIMIT).collect()
        }
    };

    let mut best: Option<(u32, ProbeReport)> = None;
    for index in candidates {
        let Some(report) = probe.probe(index) else {
            continue;
        };
        if !report.frame_ok {
            debug!(index, "rejecting camera: frame read failed");
            continue;
        }
        if report.fps < policy.min_fps {
            debug!(index, fps = report.fps, "rejecting camera: frame rate too low");
            continue;
        }
        let better = match &best {
            Some((_, b)) => report.pixels() > b.pixels(),
            None => true,
        };
        if better {
            best = Some((index, report));
        }
    }

    match best {
        Some((index, r)) => {
            info!(index, width = r.width, height = r.height, fps = r.fps, "selected camera");
            index
        }
        None => {
            warn!(index = policy.fallback_index, "no physical camera identified, using fallback");
            policy.fallback_index
        }
    }
}

#[derive(Default)]
pub struct NokhwaProbe;

impl DeviceProbe for NokhwaProbe {
    fn enumerate(&mut self) -> Option<Vec<DeviceInfo>> {
        match query(ApiBackend::Auto) {
            Ok(list) if !list.is_empty() => Some(
                list.into_iter()
                    .filter_map(|info| {
                        let index = info.index().as_index().ok()?;
                        Some(DeviceInfo {
                            index,
                            name: info.human_name(),
                        })
                    })
                    .collect(),
            ),
            Ok(_) => None,
            Err(e) => {
                debug!("camera query failed: {e}");
                None
            }
        }
    }

    fn probe(&mut self, index: u32) -> Option<ProbeReport> {
        let req = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);
        let mut cam = Camera::new(CameraIndex::Index(index), req).ok()?;
        cam.open_stream().ok()?;
        let start = Instant::now();
        let reads = 3;
        let frame_ok = (0..reads).filter(|_| cam.frame().is_ok()).count() > 0;
        let measured = reads as f32 / start.elapsed().as_secs_f32().max(f32::EPSILON);
        let reported = cam.frame_rate() as f32;
        let fps = if reported > 0.0 { reported } else { measured };
        let res = cam.resolution();
        if let Err(e) = cam.stop_stream() {
            debug!(index, "failed to stop probe stream: {e}");
        }
        debug!(index, frame_ok, fps, width = res.width(), height = res.height(), "probed camera");
        Some(ProbeReport {
            frame_ok,
            fps,
            width: res.width(),
            height: res.height(),
        })
    }
}
