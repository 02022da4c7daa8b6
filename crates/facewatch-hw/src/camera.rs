//! V4L2 webcam capture via the `v4l` crate.

use crate::frame;
use image::RgbImage;
use std::io;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::capability::Flags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const STREAM_BUFFERS: u32 = 4;
/// Highest `/dev/videoN` probed by [`Camera::list_devices`].
const MAX_DEVICE_INDEX: u32 = 16;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device busy: {0}")]
    DeviceBusy(String),
    #[error("{0} is not a video capture device")]
    NotCaptureDevice(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
}

/// A V4L2 capture device found on the system.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Pixel layouts the camera can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed YUYV 4:2:2.
    Yuyv,
    /// 8-bit luminance only; offered by some drivers instead of YUYV.
    Grey,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(Self::Yuyv),
            b"GREY" => Some(Self::Grey),
            _ => None,
        }
    }
}

/// An open camera streaming through memory-mapped buffers.
///
/// Dropping it stops the stream and closes the device.
pub struct Camera {
    stream: MmapStream<'static>,
    pub device_path: String,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl Camera {
    /// Open `device_path` (e.g. "/dev/video0") and ask for `width`x`height` YUYV.
    ///
    /// Frames come back at whatever size the driver settles on.
    pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| open_error(device_path, e))?;
        let caps = device
            .query_caps()
            .map_err(|e| CameraError::CaptureFailed(format!("{device_path}: query capabilities: {e}")))?;
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            return Err(CameraError::NotCaptureDevice(device_path.to_string()));
        }
        tracing::info!(device = device_path, card = %caps.card, driver = %caps.driver, "opened camera");

        let (format, width, height) = negotiate(&device, width, height)?;
        let stream = MmapStream::with_buffers(&device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| CameraError::CaptureFailed(format!("start mmap stream: {e}")))?;

        Ok(Self {
            stream,
            device_path: device_path.to_string(),
            width,
            height,
            format,
        })
    }

    /// Block for the next frame and convert it to RGB.
    pub fn read_frame(&mut self) -> Result<RgbImage, CameraError> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("dequeue buffer: {e}")))?;

        // Drivers that report zero bytes used still fill the buffer.
        let filled = match meta.bytesused as usize {
            0 => buf,
            used => &buf[..used.min(buf.len())],
        };

        let converted = match self.format {
            PixelFormat::Yuyv => frame::yuyv_to_rgb(filled, self.width, self.height),
            PixelFormat::Grey => frame::grey_to_rgb(filled, self.width, self.height),
        };
        converted.map_err(|e| CameraError::CaptureFailed(e.to_string()))
    }

    /// Capture-capable V4L2 devices, in `/dev/videoN` order.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..MAX_DEVICE_INDEX)
            .map(|i| format!("/dev/video{i}"))
            .filter(|path| Path::new(path).exists())
            .filter_map(|path| {
                let caps = Device::with_path(&path).ok()?.query_caps().ok()?;
                caps.capabilities.contains(Flags::VIDEO_CAPTURE).then(|| DeviceInfo {
                    path,
                    name: caps.card,
                    driver: caps.driver,
                    bus: caps.bus,
                })
            })
            .collect()
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        tracing::info!(device = %self.device_path, "camera released");
    }
}

fn open_error(device_path: &str, e: io::Error) -> CameraError {
    if e.raw_os_error() == Some(16) || e.to_string().contains("busy") {
        CameraError::DeviceBusy(device_path.to_string())
    } else {
        CameraError::DeviceNotFound(format!("{device_path}: {e}"))
    }
}

/// Request YUYV at the given size; accept whatever supported format and size
/// the driver returns.
fn negotiate(device: &Device, width: u32, height: u32) -> Result<(PixelFormat, u32, u32), CameraError> {
    let mut requested = device
        .format()
        .map_err(|e| CameraError::FormatNegotiationFailed(format!("read current format: {e}")))?;
    requested.fourcc = FourCC::new(b"YUYV");
    requested.width = width;
    requested.height = height;

    let actual = device
        .set_format(&requested)
        .map_err(|e| CameraError::FormatNegotiationFailed(format!("set format: {e}")))?;
    let format = PixelFormat::from_fourcc(actual.fourcc).ok_or_else(|| {
        CameraError::FormatNegotiationFailed(format!("driver chose {}, need YUYV or GREY", actual.fourcc))
    })?;

    if (actual.width, actual.height) != (width, height) {
        tracing::warn!(
            requested = %format_args!("{width}x{height}"),
            actual = %format_args!("{}x{}", actual.width, actual.height),
            "driver changed capture size"
        );
    }
    tracing::info!(width = actual.width, height = actual.height, ?format, "negotiated format");
    Ok((format, actual.width, actual.height))
}
