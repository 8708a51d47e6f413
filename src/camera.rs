//! Camera acquisition: manual exposure, warmup and median-stabilized capture.

use crate::config::{CameraConfig, ManualSettings};
use crate::error::{Error, Result};
use crate::frame::{median_stack, Frame};
use crate::retry::RetryPolicy;
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{
        CameraFormat, CameraIndex, ControlValueSetter, FrameFormat, KnownCameraControl,
        RequestedFormat, RequestedFormatType,
    },
    Camera,
};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Sensor properties the manager writes on every initialization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraControl {
    AutoExposure(bool),
    AutoWhiteBalance(bool),
    Exposure(i64),
    Gain(i64),
    Contrast(i64),
    Saturation(i64),
    Brightness(i64),
    WhiteBalance(i64),
}

impl CameraControl {
    /// Auto modes off first, then the explicit values.
    pub fn manual_sequence(m: &ManualSettings) -> [CameraControl; 8] {
        [
            CameraControl::AutoExposure(false),
            CameraControl::AutoWhiteBalance(false),
            CameraControl::Exposure(m.exposure),
            CameraControl::Gain(m.gain),
            CameraControl::Contrast(m.contrast),
            CameraControl::Saturation(m.saturation),
            CameraControl::Brightness(m.brightness),
            CameraControl::WhiteBalance(m.white_balance),
        ]
    }
}

/// An opened capture device. Dropping it releases the hardware.
pub trait CameraDevice {
    fn set_control(&mut self, control: CameraControl) -> Result<()>;
    fn read_frame(&mut self) -> Result<Frame>;
    fn resolution(&self) -> (u32, u32);
    fn frame_rate(&self) -> f32;
}

/// Opens devices by index.
pub trait CameraBackend {
    type Device: CameraDevice;

    fn open(&mut self, index: u32, width: u32, height: u32) -> Result<Self::Device>;
}

#[derive(Clone, Copy, Debug)]
pub struct CaptureSettings {
    pub width: u32,
    pub height: u32,
    pub manual: ManualSettings,
    pub init_warmup_frames: u32,
    pub init_read_attempts: u32,
    pub retry: RetryPolicy,
}

impl From<&CameraConfig> for CaptureSettings {
    fn from(c: &CameraConfig) -> Self {
        Self {
            width: c.width,
            height: c.height,
            manual: c.manual,
            init_warmup_frames: c.init_warmup_frames,
            init_read_attempts: c.init_read_attempts,
            retry: RetryPolicy::new(c.retry_attempts, Duration::from_millis(c.retry_backoff_ms)),
        }
    }
}

/// Sole owner of the camera handle.
pub struct CameraManager<B: CameraBackend> {
    backend: B,
    device: Option<B::Device>,
    index: u32,
    settings: CaptureSettings,
}

impl<B: CameraBackend> CameraManager<B> {
    pub fn new(backend: B, index: u32, settings: CaptureSettings) -> Self {
        Self {
            backend,
            device: None,
            index,
            settings,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// Opens `index`, applies the manual sensor settings and warms the device up.
    ///
    /// A device that yields no frame during warmup is still considered ready;
    /// the failure is logged and left to the capture retries.
    pub fn initialize(&mut self, index: u32, resolution: (u32, u32), manual: ManualSettings) -> Result<()> {
        self.release();
        self.index = index;
        self.settings.width = resolution.0;
        self.settings.height = resolution.1;
        self.settings.manual = manual;
        self.open_configured()
    }

    /// Switches to another device index.
    pub fn retarget(&mut self, index: u32) -> Result<()> {
        info!(from = self.index, to = index, "retargeting camera");
        let s = self.settings;
        self.initialize(index, (s.width, s.height), s.manual)
    }

    fn open_configured(&mut self) -> Result<()> {
        let s = self.settings;
        info!(index = self.index, width = s.width, height = s.height, "opening camera");
        let mut device = self.backend.open(self.index, s.width, s.height)?;
        for control in CameraControl::manual_sequence(&s.manual) {
            if let Err(e) = device.set_control(control) {
                warn!(?control, "camera control not applied: {e}");
            }
        }
        for _ in 0..s.init_warmup_frames {
            let _ = device.read_frame();
        }
        let readable = (0..s.init_read_attempts.max(1)).any(|_| device.read_frame().is_ok());
        if !readable {
            warn!(index = self.index, "camera opened but no frame readable yet");
        }
        let (w, h) = device.resolution();
        debug!(width = w, height = h, fps = device.frame_rate(), "camera ready");
        self.device = Some(device);
        Ok(())
    }

    fn ensure_open(&mut self) -> Result<&mut B::Device> {
        if self.device.is_none() {
            self.open_configured()?;
        }
        self.device
            .as_mut()
            .ok_or_else(|| Error::Capture("camera not initialized".into()))
    }

    /// Discards `warmup_frames`, then returns the per-pixel median of
    /// `sample_frames` reads.
    ///
    /// When every warmup read fails the device is released and reopened,
    /// bounded by the retry policy.
    pub fn capture_stabilized(&mut self, warmup_frames: u32, sample_frames: u32) -> Result<Frame> {
        let policy = self.settings.retry;
        let frame = policy.run("stabilized capture", |attempt| {
            if attempt > 0 {
                info!(attempt, "reopening camera");
                self.release();
            }
            self.capture_once(warmup_frames, sample_frames)
        });
        if let Err(e) = &frame {
            error!("stabilized capture failed: {e}");
        }
        frame
    }

    fn capture_once(&mut self, warmup_frames: u32, sample_frames: u32) -> Result<Frame> {
        let device = self.ensure_open()?;
        let mut warm_ok = 0;
        for i in 0..warmup_frames {
            match device.read_frame() {
                Ok(_) => warm_ok += 1,
                Err(e) => debug!(frame = i, "warmup read failed: {e}"),
            }
        }
        if warmup_frames > 0 && warm_ok == 0 {
            return Err(Error::Capture(format!(
                "all {warmup_frames} warmup reads failed"
            )));
        }
        let mut frames = Vec::with_capacity(sample_frames as usize);
        for i in 0..sample_frames.max(1) {
            match device.read_frame() {
                Ok(f) => frames.push(f),
                Err(e) => warn!(frame = i, "sample read failed: {e}"),
            }
        }
        let stacked = median_stack(&frames)
            .ok_or_else(|| Error::Capture("no sample frame readable".into()))?;
        info!(samples = frames.len(), "stabilized frame composed");
        Ok(stacked)
    }

    /// One raw frame, no stabilization.
    pub fn capture_single(&mut self) -> Result<Frame> {
        self.ensure_open()?.read_frame()
    }

    pub fn release(&mut self) {
        if self.device.take().is_some() {
            info!(index = self.index, "camera released");
        }
    }
}

impl<B: CameraBackend> Drop for CameraManager<B> {
    fn drop(&mut self) {
        self.release();
    }
}

// V4L2 control ids for the auto modes; other platforms reject them.
const V4L2_CID_EXPOSURE_AUTO: u128 = 0x009a_0901;
const V4L2_EXPOSURE_MANUAL: i64 = 1;
const V4L2_EXPOSURE_APERTURE_PRIORITY: i64 = 3;
const V4L2_CID_AUTO_WHITE_BALANCE: u128 = 0x0098_090c;

#[derive(Default)]
pub struct NokhwaBackend;

impl CameraBackend for NokhwaBackend {
    type Device = NokhwaCamera;

    fn open(&mut self, index: u32, width: u32, height: u32) -> Result<NokhwaCamera> {
        NokhwaCamera::open(index, width, height)
    }
}

pub struct NokhwaCamera {
    cam: Camera,
}

impl NokhwaCamera {
    pub fn open(index: u32, width: u32, height: u32) -> Result<Self> {
        let mut cam = None;
        let mut last_err = String::from("no format accepted");
        for (w, h) in [(width, height), (640, 480)] {
            for fmt in [FrameFormat::MJPEG, FrameFormat::YUYV, FrameFormat::RAWRGB] {
                let req = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
                    CameraFormat::new_from(w, h, fmt, 30),
                ));
                match Camera::new(CameraIndex::Index(index), req) {
                    Ok(c) => {
                        cam = Some(c);
                        break;
                    }
                    Err(e) => last_err = e.to_string(),
                }
            }
            if cam.is_some() {
                break;
            }
        }
        let mut cam = match cam {
            Some(c) => c,
            None => {
                let req = RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);
                Camera::new(CameraIndex::Index(index), req).map_err(|e| Error::DeviceOpen {
                    index,
                    reason: format!("{last_err}; {e}"),
                })?
            }
        };
        cam.open_stream().map_err(|e| Error::DeviceOpen {
            index,
            reason: e.to_string(),
        })?;
        debug!(format = ?cam.camera_format(), "camera stream opened");
        Ok(Self { cam })
    }
}

impl CameraDevice for NokhwaCamera {
    fn set_control(&mut self, control: CameraControl) -> Result<()> {
        let (id, value) = match control {
            CameraControl::AutoExposure(on) => (
                KnownCameraControl::Other(V4L2_CID_EXPOSURE_AUTO),
                if on {
                    V4L2_EXPOSURE_APERTURE_PRIORITY
                } else {
                    V4L2_EXPOSURE_MANUAL
                },
            ),
            CameraControl::AutoWhiteBalance(on) => (
                KnownCameraControl::Other(V4L2_CID_AUTO_WHITE_BALANCE),
                i64::from(on),
            ),
            CameraControl::Exposure(v) => (KnownCameraControl::Exposure, v),
            CameraControl::Gain(v) => (KnownCameraControl::Gain, v),
            CameraControl::Contrast(v) => (KnownCameraControl::Contrast, v),
            CameraControl::Saturation(v) => (KnownCameraControl::Saturation, v),
            CameraControl::Brightness(v) => (KnownCameraControl::Brightness, v),
            CameraControl::WhiteBalance(v) => (KnownCameraControl::WhiteBalance, v),
        };
        self.cam
            .set_camera_control(id, ControlValueSetter::Integer(value))
            .map_err(|e| Error::Capture(format!("{control:?}: {e}")))
    }

    fn read_frame(&mut self) -> Result<Frame> {
        let buf = self
            .cam
            .frame()
            .map_err(|e| Error::Capture(e.to_string()))?;
        let img = buf
            .decode_image::<RgbFormat>()
            .map_err(|e| Error::Capture(format!("decode: {e}")))?;
        Ok(Frame::new(img))
    }

    fn resolution(&self) -> (u32, u32) {
        let r = self.cam.resolution();
        (r.width(), r.height())
    }

    fn frame_rate(&self) -> f32 {
        self.cam.frame_rate() as f32
    }
}

impl Drop for NokhwaCamera {
    fn drop(&mut self) {
        if let Err(e) = self.cam.stop_stream() {
            debug!("failed to stop camera stream: {e}");
        }
    }
}
