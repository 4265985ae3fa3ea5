//! Core types and traits for the camera session and its kernel boundary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDateTime;

use crate::controls::ControlId;

/// Pixel format representation (e.g., NV21, YUYV, JPEG).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");
    /// UYVY pixel format (4:2:2 packed).
    pub const UYVY: Self = Self::new(b"UYVY");
    /// NV12 pixel format (4:2:0 semi-planar, CbCr).
    pub const NV12: Self = Self::new(b"NV12");
    /// NV21 pixel format (4:2:0 semi-planar, CrCb).
    pub const NV21: Self = Self::new(b"NV21");
    /// Tiled NV12, the recording path's native layout.
    pub const NV12T: Self = Self::new(b"TV12");
    /// Planar YUV 4:2:0.
    pub const YUV420: Self = Self::new(b"YU12");
    /// Planar YUV 4:2:2.
    pub const YUV422P: Self = Self::new(b"422P");
    /// RGB565 (16-bit RGB).
    pub const RGB565: Self = Self::new(b"RGBP");
    /// JPEG-compressed output from the sensor's encoder.
    pub const JPEG: Self = Self::new(b"JPEG");
    /// MJPEG pixel format (Motion JPEG).
    pub const MJPG: Self = Self::new(b"MJPG");

    /// Bits per pixel used to size the driver's image buffer.
    ///
    /// Returns 0 for compressed or unknown formats.
    #[must_use]
    pub const fn bits_per_pixel(self) -> u32 {
        match &self.0 {
            b"NV12" | b"TV12" | b"NV21" | b"YU12" => 12,
            b"RGBP" | b"YUYV" | b"YVYU" | b"UYVY" | b"VYUY" | b"NV16" | b"NV61" | b"422P" => 16,
            b"RGB4" => 32,
            _ => 0,
        }
    }

    /// Whether this format carries chroma at half vertical resolution.
    #[must_use]
    pub const fn is_420(self) -> bool {
        matches!(&self.0, b"NV12" | b"NV21" | b"TV12" | b"YU12")
    }

    /// Bytes needed to hold one `width` x `height` frame in this format.
    ///
    /// NV12T planes are padded to 128-byte rows and 32-line bands and each
    /// plane is rounded up to 8 KiB. Packed 4:2:2, JPEG and unknown formats
    /// are sized at two bytes per pixel.
    #[must_use]
    pub const fn frame_size(self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        match &self.0 {
            b"YU12" | b"NV12" | b"NV21" => w * h * 3 / 2,
            b"TV12" => {
                align_up(align_up(w, 128) * align_up(h, 32), 8192)
                    + align_up(align_up(w, 128) * align_up(h / 2, 32), 8192)
            }
            _ => w * h * 2,
        }
    }
}

const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) / align * align
}

impl std::fmt::Display for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{}", char::from(byte))?;
        }
        Ok(())
    }
}

impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

impl From<FourCC> for v4l::FourCC {
    fn from(fourcc: FourCC) -> Self {
        Self::new(&fourcc.0)
    }
}

/// Video format specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Bytes per line (stride).
    pub stride: u32,
    /// Total frame size in bytes.
    pub size: u32,
}

impl Format {
    /// Create a new format specification sized from the pixel depth.
    #[must_use]
    pub const fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        let depth = fourcc.bits_per_pixel();
        Self {
            width,
            height,
            fourcc,
            stride: width * depth / 8,
            size: width * height * depth / 8,
        }
    }
}

/// Device capability flags.
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming.
    pub can_stream: bool,
}

/// Which physical sensor a session drives. The value is the V4L2 input index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraId {
    /// Main (rear) sensor.
    #[default]
    Back,
    /// Secondary (front) sensor, mounted rotated.
    Front,
}

impl CameraId {
    /// V4L2 input index selected for this sensor.
    #[must_use]
    pub const fn input_index(self) -> u32 {
        match self {
            Self::Back => 0,
            Self::Front => 1,
        }
    }

    /// Largest preview frame the sensor produces.
    #[must_use]
    pub const fn max_preview_size(self) -> (u32, u32) {
        match self {
            Self::Back => (1280, 720),
            Self::Front => (640, 480),
        }
    }

    /// Largest still frame the sensor produces.
    #[must_use]
    pub const fn max_snapshot_size(self) -> (u32, u32) {
        match self {
            Self::Back => (2560, 1920),
            Self::Front => (640, 480),
        }
    }

    /// Geometry and byte size of the EXIF thumbnail source (16 bpp).
    #[must_use]
    pub const fn thumbnail_config(self) -> (u32, u32, usize) {
        let (w, h) = match self {
            Self::Back => (320, 240),
            Self::Front => (160, 120),
        };
        (w, h, (w * h * 2) as usize)
    }

    /// Lens focal length in hundredths of a millimetre.
    #[must_use]
    pub const fn focal_length(self) -> u32 {
        match self {
            Self::Back => 343,
            Self::Front => 270,
        }
    }

    /// The front sensor delivers frames transposed.
    #[must_use]
    pub const fn transposed(self) -> bool {
        matches!(self, Self::Front)
    }
}

/// Driver-reported placement of one kernel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    /// Kernel buffer index.
    pub index: u32,
    /// Length in bytes.
    pub length: u32,
    /// Offset to pass to `mmap`.
    pub offset: u32,
}

/// Error type for camera operations.
#[derive(Debug)]
pub enum CameraError {
    /// Value outside the enumerated legal range of an attribute.
    InvalidParameter(String),
    /// Opening a device node failed.
    DeviceOpen {
        /// Device path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Device does not support video capture.
    Capability(String),
    /// The requested sensor input was rejected.
    InputSelect(u32),
    /// Requested format is not supported.
    FormatNotSupported(FourCC),
    /// An ioctl on an open device failed.
    DeviceIo {
        /// Name of the failed request.
        op: &'static str,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Mapping a kernel buffer into the process failed.
    BufferMap {
        /// Buffer index.
        index: u32,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The device produced no frame within the bounded wait.
    WaitTimeout(Duration),
    /// The sensor's health check reported a fault; the session needs a reset.
    SensorFault(i32),
    /// The driver returned a buffer index outside the pool.
    BufferIndex {
        /// Index reported by the driver.
        index: u32,
        /// Size of the pool.
        pool_size: usize,
    },
    /// JPEG size or offset read back from the sensor is unusable.
    EncodeReadback(String),
    /// The session has not been initialized.
    NotInitialized,
    /// The operation needs a stream that is not running.
    NotStreaming(&'static str),
    /// The external encoder or EXIF writer failed.
    Encode(String),
    /// I/O error.
    Io(std::io::Error),
}

impl CameraError {
    /// Wrap an ioctl failure.
    #[must_use]
    pub const fn io(op: &'static str, source: std::io::Error) -> Self {
        Self::DeviceIo { op, source }
    }
}

impl std::fmt::Display for CameraError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidParameter(msg) => write!(f, "Invalid parameter: {msg}"),
            Self::DeviceOpen { path, source } => {
                write!(f, "Cannot open {}: {source}", path.display())
            }
            Self::Capability(msg) => write!(f, "Device cannot capture: {msg}"),
            Self::InputSelect(idx) => write!(f, "Input {idx} rejected"),
            Self::FormatNotSupported(fourcc) => write!(f, "Format not supported: {fourcc}"),
            Self::DeviceIo { op, source } => write!(f, "{op} failed: {source}"),
            Self::BufferMap { index, source } => {
                write!(f, "Failed to map buffer {index}: {source}")
            }
            Self::WaitTimeout(timeout) => write!(f, "No frame within {timeout:?}"),
            Self::SensorFault(status) => write!(f, "Sensor fault, status {status}"),
            Self::BufferIndex { index, pool_size } => {
                write!(f, "Buffer index {index} outside pool of {pool_size}")
            }
            Self::EncodeReadback(msg) => write!(f, "JPEG readback failed: {msg}"),
            Self::NotInitialized => write!(f, "Camera is not initialized"),
            Self::NotStreaming(what) => write!(f, "{what} is not streaming"),
            Self::Encode(msg) => write!(f, "Encoding failed: {msg}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for CameraError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::DeviceOpen { source, .. }
            | Self::DeviceIo { source, .. }
            | Self::BufferMap { source, .. }
            | Self::Io(source) => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CameraError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;

/// A kernel buffer mapped into the process. Dropping it unmaps the memory.
pub trait BufferMapping {
    /// The mapped bytes.
    fn as_slice(&self) -> &[u8];

    /// Process address of the first mapped byte.
    fn base_address(&self) -> usize {
        self.as_slice().as_ptr() as usize
    }

    /// Mapped length in bytes.
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Whether the mapping is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One open V4L2 capture node: the fixed ioctl vocabulary the session uses.
///
/// Every method is a single blocking request into the driver.
pub trait VideoNode {
    /// Memory mapping handed out by [`VideoNode::map_buffer`].
    type Mapping: BufferMapping;

    /// `VIDIOC_QUERYCAP`.
    fn capabilities(&self) -> Result<DeviceCapabilities>;

    /// `VIDIOC_ENUMINPUT`: name of the input at `index`.
    fn input_name(&self, index: u32) -> Result<String>;

    /// `VIDIOC_S_INPUT`.
    fn select_input(&mut self, index: u32) -> Result<()>;

    /// `VIDIOC_ENUM_FMT`: whether the capture queue offers `fourcc`.
    fn supports_format(&self, fourcc: FourCC) -> Result<bool>;

    /// `VIDIOC_S_FMT`. Returns the format the driver settled on.
    fn set_format(&mut self, format: &Format) -> Result<Format>;

    /// `VIDIOC_S_PARM`: frame interval of `1/fps`.
    fn set_frame_rate(&mut self, fps: u32) -> Result<()>;

    /// `VIDIOC_G_CTRL`.
    fn control(&self, id: ControlId) -> Result<i32>;

    /// `VIDIOC_S_CTRL`. Returns the value the driver wrote back.
    fn set_control(&mut self, id: ControlId, value: i32) -> Result<i32>;

    /// `VIDIOC_S_EXT_CTRLS` carrying a broken-down local time.
    fn set_time_control(&mut self, id: ControlId, time: &NaiveDateTime) -> Result<()>;

    /// `VIDIOC_REQBUFS` for mmap capture buffers. Returns the granted count.
    fn request_buffers(&mut self, count: u32) -> Result<u32>;

    /// `VIDIOC_QUERYBUF`.
    fn query_buffer(&self, index: u32) -> Result<BufferInfo>;

    /// Map a queried buffer read/write, shared.
    fn map_buffer(&mut self, info: &BufferInfo) -> Result<Self::Mapping>;

    /// `VIDIOC_QBUF`.
    fn queue_buffer(&mut self, index: u32) -> Result<()>;

    /// `VIDIOC_DQBUF`. Returns the index exactly as the driver reported it.
    fn dequeue_buffer(&mut self) -> Result<u32>;

    /// `VIDIOC_STREAMON`.
    fn stream_on(&mut self) -> Result<()>;

    /// `VIDIOC_STREAMOFF`.
    fn stream_off(&mut self) -> Result<()>;

    /// Block until a frame is ready or `timeout` passes. `Ok(false)` on timeout.
    fn wait_readable(&self, timeout: Duration) -> Result<bool>;
}

/// Opens device nodes by path.
pub trait DeviceOpener {
    /// Node type produced.
    type Node: VideoNode;

    /// Open the node at `path` read/write.
    fn open(&mut self, path: &Path) -> Result<Self::Node>;
}
