//! The camera session: the host-facing API over one sensor.
//!
//! A session owns two open nodes of the same sensor. The capture node
//! serves preview and still capture; the record node serves video. Every
//! call blocks on the driver and the session does no locking, so callers
//! serialise access themselves.

use std::path::Path;
use std::thread;

use chrono::Local;
use log::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::controls::{self, ControlId};
use crate::encoder::{EncodeRequest, JpegEncoder, QualityLevel, Sampling};
use crate::exif::{CaptureContext, ExifAttributes, ExifWriter, GpsFix, GPS_PROCESSING_METHOD_MAX};
use crate::properties::PropertyStore;
use crate::settings::{Attribute, Phase, Settings};
use crate::stream::Channel;
use crate::traits::{CameraError, CameraId, DeviceOpener, Format, FourCC, Result, VideoNode};
use crate::validation::{
    check_frame_size, check_range, check_raw_format, normalize_rotation, parse_fixed_point,
    parse_timestamp, Range,
};

/// How an auto focus search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutofocusOutcome {
    /// The lens locked.
    Focused,
    /// The sensor gave up or the search was cancelled.
    Failed,
    /// Still searching after the polling budget.
    TimedOut,
}

/// Physical addresses of a buffer's planes as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneAddresses {
    /// Luma plane.
    pub y: u32,
    /// Interleaved chroma plane.
    pub cbcr: u32,
}

/// Location of a sensor-encoded JPEG inside the still capture buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareJpeg {
    /// Capture buffer holding the image.
    pub buffer_index: u32,
    /// Byte offset of the main image.
    pub offset: usize,
    /// Byte size of the main image.
    pub size: usize,
    /// Byte offset of the postview rendition.
    pub postview_offset: usize,
    /// Physical address of the postview rendition.
    pub postview_address: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureMode {
    Preview,
    Snapshot { burst: bool },
}

struct Devices<N: VideoNode> {
    capture: Channel<N>,
    record: Channel<N>,
}

fn open_node<O: DeviceOpener>(opener: &mut O, path: &Path, camera: CameraId) -> Result<O::Node> {
    let mut node = opener.open(path)?;
    let caps = node.capabilities()?;
    if !caps.can_capture {
        return Err(CameraError::Capability(format!(
            "{} ({})",
            caps.card,
            path.display()
        )));
    }
    node.select_input(camera.input_index())?;
    debug!(
        "{}: {} ({}), input {}",
        path.display(),
        caps.card,
        caps.driver,
        camera.input_index()
    );
    Ok(node)
}

fn oriented(format: &Format, transpose: bool) -> Format {
    if transpose {
        Format::new(format.height, format.width, format.fourcc)
    } else {
        format.clone()
    }
}

fn plane_addresses<N: VideoNode>(channel: &mut Channel<N>, index: u32) -> Result<PlaneAddresses> {
    channel.slot(index)?;
    let node = channel.node_mut();
    let y = node.set_control(ControlId::PADDR_Y, index as i32)?;
    let cbcr = node.set_control(ControlId::PADDR_CBCR, index as i32)?;
    Ok(PlaneAddresses {
        y: y as u32,
        cbcr: cbcr as u32,
    })
}

/// Give a still frame back: requeue it in burst mode, otherwise hold the
/// sensor where it is. A failed hold is not fatal.
fn release_snapshot_frame<N: VideoNode>(
    capture: &mut Channel<N>,
    index: u32,
    burst: bool,
) -> Result<()> {
    if burst {
        return capture.requeue(index);
    }
    if let Err(err) = capture.node_mut().set_control(ControlId::STREAM_PAUSE, 0) {
        warn!("stream pause after snapshot failed: {err}");
    }
    Ok(())
}

fn truncated(text: &str, max: usize) -> String {
    let mut end = text.len().min(max);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.get(..end).unwrap_or_default().to_owned()
}

/// One sensor's session state and its two device nodes.
pub struct CameraSession<O: DeviceOpener> {
    opener: O,
    config: SessionConfig,
    properties: Box<dyn PropertyStore>,
    camera: CameraId,
    devices: Option<Devices<O::Node>>,
    capture_mode: CaptureMode,
    settings: Settings,
    preview: Format,
    record: Format,
    snapshot: Format,
    thumbnail: (u32, u32),
    gps: GpsFix,
    exif_orientation: Option<i32>,
    exif: Option<ExifAttributes>,
    tracking_start_stop: Option<i32>,
    touch_af: Option<i32>,
    preview_polls: u32,
}

impl<O: DeviceOpener> CameraSession<O> {
    /// A closed session. Nothing touches the driver until [`Self::init`].
    pub fn new(opener: O, config: SessionConfig, properties: Box<dyn PropertyStore>) -> Self {
        let camera = CameraId::default();
        let (snap_w, snap_h) = camera.max_snapshot_size();
        let (thumb_w, thumb_h, _) = camera.thumbnail_config();
        Self {
            opener,
            config,
            properties,
            camera,
            devices: None,
            capture_mode: CaptureMode::Preview,
            settings: Settings::default(),
            preview: Format::new(640, 480, FourCC::NV21),
            record: Format::new(640, 480, FourCC::NV12T),
            snapshot: Format::new(snap_w, snap_h, FourCC::JPEG),
            thumbnail: (thumb_w, thumb_h),
            gps: GpsFix::default(),
            exif_orientation: None,
            exif: None,
            tracking_start_stop: None,
            touch_af: None,
            preview_polls: 0,
        }
    }

    /// Sensor this session drives.
    pub const fn camera(&self) -> CameraId {
        self.camera
    }

    /// Configuration in use.
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The settings cache.
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Whether both nodes are open.
    pub const fn is_initialized(&self) -> bool {
        self.devices.is_some()
    }

    /// Whether preview frames are flowing.
    pub fn is_previewing(&self) -> bool {
        self.capture_mode == CaptureMode::Preview && self.capture_streaming()
    }

    /// Whether a still capture is armed.
    pub fn is_snapshotting(&self) -> bool {
        matches!(self.capture_mode, CaptureMode::Snapshot { .. }) && self.capture_streaming()
    }

    /// Whether recording frames are flowing.
    pub fn is_recording(&self) -> bool {
        self.devices
            .as_ref()
            .is_some_and(|devices| devices.record.is_streaming())
    }

    fn capture_streaming(&self) -> bool {
        self.devices
            .as_ref()
            .is_some_and(|devices| devices.capture.is_streaming())
    }

    fn capture_node(&mut self) -> Result<&mut O::Node> {
        self.devices
            .as_mut()
            .map(|devices| devices.capture.node_mut())
            .ok_or(CameraError::NotInitialized)
    }

    fn preview_channel(&mut self) -> Result<&mut Channel<O::Node>> {
        let previewing = self.is_previewing();
        let devices = self.devices.as_mut().ok_or(CameraError::NotInitialized)?;
        if previewing {
            Ok(&mut devices.capture)
        } else {
            Err(CameraError::NotStreaming("preview"))
        }
    }

    fn snapshot_channel(&mut self) -> Result<(&mut Channel<O::Node>, bool)> {
        let devices = self.devices.as_mut().ok_or(CameraError::NotInitialized)?;
        match self.capture_mode {
            CaptureMode::Snapshot { burst } if devices.capture.is_streaming() => {
                Ok((&mut devices.capture, burst))
            }
            _ => Err(CameraError::NotStreaming("snapshot")),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle

    /// Open both nodes for `camera`, check they can capture and select the
    /// sensor's input. A second call while open does nothing.
    pub fn init(&mut self, camera: CameraId) -> Result<()> {
        if self.devices.is_some() {
            debug!("camera already initialized");
            return Ok(());
        }
        let capture = open_node(&mut self.opener, &self.config.capture_device, camera)?;
        let record = open_node(&mut self.opener, &self.config.record_device, camera)?;

        self.camera = camera;
        self.exif = Some(ExifAttributes::fixed(camera, self.properties.as_ref()));
        self.devices = Some(Devices {
            capture: Channel::new("capture", capture),
            record: Channel::new("record", record),
        });
        self.preview_polls = 0;
        info!(
            "{camera:?} camera initialized on {} and {}",
            self.config.capture_device.display(),
            self.config.record_device.display()
        );
        Ok(())
    }

    /// Stop everything and close both nodes. Safe to call when closed.
    pub fn deinit(&mut self) {
        if self.devices.is_none() {
            return;
        }
        if let Err(err) = self.stop_recording() {
            warn!("stopping recording on deinit: {err}");
        }
        if let Some(devices) = self.devices.as_mut() {
            if let Err(err) = devices.capture.stop() {
                warn!("stopping capture on deinit: {err}");
            }
        }
        self.devices = None;
        self.exif = None;
        info!("{:?} camera closed", self.camera);
    }

    /// Close and reopen the same sensor. The only recovery for a wedged
    /// sensor; cached settings survive and are pushed at the next start.
    pub fn reset(&mut self) -> Result<()> {
        info!("resetting {:?} camera", self.camera);
        self.deinit();
        self.init(self.camera)
    }

    // ------------------------------------------------------------------
    // Preview

    /// Negotiate the preview format, map a full pool and start streaming.
    ///
    /// Waits for the first frame; a timeout here leaves the stream on and
    /// the caller should [`Self::reset`].
    pub fn start_preview(&mut self) -> Result<()> {
        if self.is_previewing() {
            debug!("preview already running");
            return Ok(());
        }
        if self.is_snapshotting() {
            warn!("snapshot still armed, ending it before preview");
            self.end_snapshot()?;
        }

        let camera = self.camera;
        let devices = self.devices.as_mut().ok_or(CameraError::NotInitialized)?;
        let capture = &mut devices.capture;

        let fourcc = self.preview.fourcc;
        if !capture.node().supports_format(fourcc)? {
            return Err(CameraError::FormatNotSupported(fourcc));
        }
        let actual = capture
            .node_mut()
            .set_format(&oriented(&self.preview, camera.transposed()))?;
        debug!("preview format {}x{} {}", actual.width, actual.height, actual.fourcc);

        capture.allocate(self.config.max_buffers)?;

        if let Some(check) = self.settings.get(Attribute::DataLineCheck) {
            capture.node_mut().set_control(ControlId::CHECK_DATALINE, check)?;
        }
        if camera == CameraId::Front {
            let vt = self.settings.get(Attribute::VtMode).unwrap_or(controls::OFF);
            capture.node_mut().set_control(ControlId::VT_MODE, vt)?;
        }

        let settings = &self.settings;
        capture.start(|node| settings.apply_deferred(node, camera, Phase::BeforeStreamOn))?;
        self.capture_mode = CaptureMode::Preview;
        self.preview_polls = 0;
        settings.apply_deferred(capture.node_mut(), camera, Phase::AfterStreamOn)?;

        capture.wait_frame(self.config.first_frame_timeout)?;
        capture.node_mut().set_control(ControlId::RETURN_FOCUS, 0)?;
        info!(
            "preview started: {}x{} {}",
            self.preview.width, self.preview.height, self.preview.fourcc
        );
        Ok(())
    }

    /// Stop preview. A torch flash is switched off first. Does nothing when
    /// preview is not running.
    pub fn stop_preview(&mut self) -> Result<()> {
        if !self.is_previewing() {
            return Ok(());
        }
        let camera = self.camera;
        let devices = self.devices.as_mut().ok_or(CameraError::NotInitialized)?;
        if self.settings.get(Attribute::FlashMode) == Some(controls::flash_mode::TORCH) {
            if let Err(err) = self.settings.set(
                Attribute::FlashMode,
                controls::flash_mode::OFF,
                camera,
                Some(devices.capture.node_mut()),
            ) {
                warn!("torch off failed, stopping preview anyway: {err}");
            }
        }
        devices.capture.stop()?;
        devices.capture.release_pool();
        info!("preview stopped");
        Ok(())
    }

    /// Hold the preview stream without turning it off.
    pub fn pause_preview(&mut self) -> Result<()> {
        self.preview_channel()?
            .node_mut()
            .set_control(ControlId::STREAM_PAUSE, 0)?;
        debug!("preview paused");
        Ok(())
    }

    /// Release a held preview stream.
    pub fn resume_preview(&mut self) -> Result<()> {
        self.preview_channel()?
            .node_mut()
            .set_control(ControlId::STREAM_PAUSE, 1)?;
        debug!("preview resumed");
        Ok(())
    }

    /// Wait for the next preview frame and return its buffer index.
    ///
    /// The buffer goes straight back to the driver so the ring never
    /// starves. A timeout means the sensor is wedged; reset the session.
    pub fn get_preview(&mut self) -> Result<u32> {
        let timeout = self.config.frame_timeout;
        let esd_interval = self.config.esd_check_interval.filter(|&n| n > 0);
        self.preview_polls = self.preview_polls.wrapping_add(1);
        let polls = self.preview_polls;

        let capture = self.preview_channel()?;
        if let Some(interval) = esd_interval {
            if polls % interval == 0 {
                let status = capture.node().control(ControlId::ESD_INT)?;
                if status != 0 {
                    error!("sensor ESD status {status}, reset required");
                    return Err(CameraError::SensorFault(status));
                }
            }
        }
        let index = capture.next_index(timeout)?;
        capture.requeue(index)?;
        Ok(index)
    }

    /// Physical plane addresses of preview buffer `index`.
    pub fn preview_phys_addr(&mut self, index: u32) -> Result<PlaneAddresses> {
        let devices = self.devices.as_mut().ok_or(CameraError::NotInitialized)?;
        plane_addresses(&mut devices.capture, index)
    }

    // ------------------------------------------------------------------
    // Recording

    /// Start the recording stream in tiled NV12.
    pub fn start_recording(&mut self) -> Result<()> {
        let camera = self.camera;
        let devices = self.devices.as_mut().ok_or(CameraError::NotInitialized)?;
        if devices.record.is_streaming() {
            debug!("recording already running");
            return Ok(());
        }

        if !devices.record.node().supports_format(FourCC::NV12T)? {
            return Err(CameraError::FormatNotSupported(FourCC::NV12T));
        }
        let format = Format::new(self.record.width, self.record.height, FourCC::NV12T);
        devices
            .record
            .node_mut()
            .set_format(&oriented(&format, camera.transposed()))?;

        let fps = self
            .settings
            .get(Attribute::FrameRate)
            .unwrap_or(controls::frame_rate::AUTO);
        devices
            .capture
            .node_mut()
            .set_control(ControlId::FRAME_RATE, fps)?;

        devices.record.allocate(self.config.max_buffers)?;
        devices.record.start(|_| Ok(()))?;
        devices.record.wait_frame(self.config.frame_timeout)?;
        info!(
            "recording started: {}x{} at {fps} fps",
            self.record.width, self.record.height
        );
        Ok(())
    }

    /// Stop recording and restore the automatic frame rate. Does nothing
    /// when not recording.
    pub fn stop_recording(&mut self) -> Result<()> {
        let Some(devices) = self.devices.as_mut() else {
            return Ok(());
        };
        if !devices.record.is_streaming() {
            return Ok(());
        }
        devices.record.stop()?;
        devices
            .capture
            .node_mut()
            .set_control(ControlId::FRAME_RATE, controls::frame_rate::AUTO)?;
        devices.record.release_pool();
        info!("recording stopped");
        Ok(())
    }

    /// Wait for the next recorded frame. The buffer stays with the caller
    /// until [`Self::release_record_frame`].
    pub fn get_record_frame(&mut self) -> Result<u32> {
        let timeout = self.config.frame_timeout;
        let devices = self.devices.as_mut().ok_or(CameraError::NotInitialized)?;
        devices.record.next_index(timeout)
    }

    /// Hand a recorded frame back to the driver. Ignored when not recording.
    pub fn release_record_frame(&mut self, index: u32) -> Result<()> {
        let Some(devices) = self.devices.as_mut() else {
            return Ok(());
        };
        if !devices.record.is_streaming() {
            return Ok(());
        }
        devices.record.requeue(index)
    }

    /// Physical plane addresses of recording buffer `index`.
    pub fn record_phys_addr(&mut self, index: u32) -> Result<PlaneAddresses> {
        let devices = self.devices.as_mut().ok_or(CameraError::NotInitialized)?;
        plane_addresses(&mut devices.record, index)
    }

    // ------------------------------------------------------------------
    // Still capture

    /// Arm a still capture with a single buffer. A running preview is
    /// stopped first.
    pub fn begin_snapshot(&mut self, burst: bool) -> Result<()> {
        if self.is_previewing() {
            warn!("preview still running at snapshot, stopping it");
            self.stop_preview()?;
        }
        let devices = self.devices.as_mut().ok_or(CameraError::NotInitialized)?;
        let capture = &mut devices.capture;
        if capture.is_streaming() {
            debug!("snapshot already armed, burst={burst}");
            self.capture_mode = CaptureMode::Snapshot { burst };
            return Ok(());
        }

        let fourcc = self.snapshot.fourcc;
        if !capture.node().supports_format(fourcc)? {
            return Err(CameraError::FormatNotSupported(fourcc));
        }
        capture.node_mut().set_format(&oriented(&self.snapshot, true))?;
        capture.allocate(1)?;
        capture.start(|_| Ok(()))?;
        self.capture_mode = CaptureMode::Snapshot { burst };
        debug!(
            "snapshot armed: {}x{} {} burst={burst}",
            self.snapshot.width, self.snapshot.height, fourcc
        );
        Ok(())
    }

    /// Trigger the sensor's encoder and locate the JPEG it produced.
    ///
    /// Outside burst mode the stream is left paused, not stopped.
    pub fn get_jpeg(&mut self) -> Result<HardwareJpeg> {
        let timeout = self.config.first_frame_timeout;
        let (capture, burst) = self.snapshot_channel()?;

        let now = Local::now().naive_local();
        capture
            .node_mut()
            .set_time_control(ControlId::EXIF_TIME_INFO, &now)?;
        capture.trigger_capture()?;

        let index = capture.next_index(timeout)?;
        release_snapshot_frame(capture, index, burst)?;

        let node = capture.node();
        let size = node.control(ControlId::JPEG_MAIN_SIZE)?;
        let offset = node.control(ControlId::JPEG_MAIN_OFFSET)?;
        let postview_offset = node.control(ControlId::JPEG_POSTVIEW_OFFSET)?;
        if size <= 0 {
            return Err(CameraError::EncodeReadback(format!("main image size {size}")));
        }
        if offset < 0 || postview_offset < 0 {
            return Err(CameraError::EncodeReadback(format!(
                "main offset {offset}, postview offset {postview_offset}"
            )));
        }
        let (size, offset, postview_offset) =
            (size as usize, offset as usize, postview_offset as usize);

        let len = capture.slot(index)?.len();
        if offset + size > len {
            return Err(CameraError::EncodeReadback(format!(
                "{size} bytes at {offset} overrun the {len}-byte buffer"
            )));
        }

        let base = capture
            .node_mut()
            .set_control(ControlId::PADDR_Y, index as i32)?;
        info!("snapshot buffer {index}: {size} byte JPEG at offset {offset}");
        Ok(HardwareJpeg {
            buffer_index: index,
            offset,
            size,
            postview_offset,
            postview_address: (base as u32).wrapping_add(postview_offset as u32),
        })
    }

    /// The encoded bytes located by [`Self::get_jpeg`].
    pub fn jpeg_data(&self, jpeg: &HardwareJpeg) -> Result<&[u8]> {
        let devices = self.devices.as_ref().ok_or(CameraError::NotInitialized)?;
        devices
            .capture
            .slot(jpeg.buffer_index)?
            .as_slice()
            .get(jpeg.offset..jpeg.offset + jpeg.size)
            .ok_or_else(|| {
                CameraError::EncodeReadback(format!(
                    "{} bytes at {} outside buffer {}",
                    jpeg.size, jpeg.offset, jpeg.buffer_index
                ))
            })
    }

    /// Take the raw still frame and encode it on the host.
    ///
    /// `writer`, when given, supplies the EXIF block embedded in the file.
    pub fn get_jpeg_software(
        &mut self,
        encoder: &mut dyn JpegEncoder,
        writer: Option<&mut dyn ExifWriter>,
    ) -> Result<Vec<u8>> {
        let timeout = self.config.first_frame_timeout;
        let snapshot = self.snapshot.clone();
        let quality = QualityLevel::from_percent(
            self.settings.get(Attribute::JpegQuality).unwrap_or(100),
        );

        if !encoder.supports(snapshot.fourcc) {
            return Err(CameraError::FormatNotSupported(snapshot.fourcc));
        }

        let pixels = {
            let (capture, burst) = self.snapshot_channel()?;
            let index = capture.next_index(timeout)?;
            let wanted = snapshot.width as usize * snapshot.height as usize * 2;
            let pixels: Vec<u8> = capture
                .slot(index)?
                .as_slice()
                .iter()
                .take(wanted)
                .copied()
                .collect();
            release_snapshot_frame(capture, index, burst)?;
            pixels
        };

        let exif = match writer {
            Some(writer) => Some(writer.write(self.refresh_exif()?, None)?),
            None => None,
        };

        encoder.encode(&EncodeRequest {
            pixels: &pixels,
            fourcc: snapshot.fourcc,
            width: snapshot.width,
            height: snapshot.height,
            sampling: Sampling::for_format(snapshot.fourcc),
            quality,
            exif: exif.as_deref(),
        })
    }

    /// Disarm the still capture and unmap its buffer.
    pub fn end_snapshot(&mut self) -> Result<()> {
        if !self.is_snapshotting() {
            return Ok(());
        }
        let devices = self.devices.as_mut().ok_or(CameraError::NotInitialized)?;
        devices.capture.stop()?;
        devices.capture.release_pool();
        debug!("snapshot ended");
        Ok(())
    }

    /// Recompute the per-capture EXIF fields from the cache and a fresh
    /// shutter reading.
    fn refresh_exif(&mut self) -> Result<&mut ExifAttributes> {
        let devices = self.devices.as_ref().ok_or(CameraError::NotInitialized)?;
        let shutter_us = match devices.capture.node().control(ControlId::GET_SHUTTER_TIME) {
            Ok(us) => Some(us),
            Err(err) => {
                warn!("shutter time read failed: {err}");
                None
            }
        };
        let ctx = CaptureContext {
            width: self.snapshot.width,
            height: self.snapshot.height,
            orientation: self.exif_orientation,
            now: Local::now().naive_local(),
            shutter_us,
            iso: self.settings.get(Attribute::Iso),
            scene_mode: self.settings.get(Attribute::SceneMode),
            metering: self.settings.get(Attribute::Metering),
            white_balance: self.settings.get(Attribute::WhiteBalance),
            gps: &self.gps,
            thumbnail: self.thumbnail,
        };
        let attrs = self.exif.as_mut().ok_or(CameraError::NotInitialized)?;
        attrs.update(&ctx);
        Ok(attrs)
    }

    /// Build the EXIF block for the current capture.
    ///
    /// `thumbnail_source` is a YUYV frame at the configured thumbnail size;
    /// it is encoded and embedded when a thumbnail size is set.
    pub fn make_exif(
        &mut self,
        writer: &mut dyn ExifWriter,
        encoder: &mut dyn JpegEncoder,
        thumbnail_source: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        let (width, height) = self.thumbnail;
        let thumbnail = match thumbnail_source {
            Some(pixels) if width > 0 && height > 0 => Some(encoder.encode(&EncodeRequest {
                pixels,
                fourcc: FourCC::YUYV,
                width,
                height,
                sampling: Sampling::Yuv422,
                quality: QualityLevel::L2,
                exif: None,
            })?),
            _ => None,
        };

        let attrs = self.refresh_exif()?;
        attrs.enable_thumbnail = thumbnail.is_some();
        writer.write(attrs, thumbnail.as_deref())
    }

    // ------------------------------------------------------------------
    // Auto focus

    /// Start a single auto focus search.
    pub fn start_autofocus(&mut self) -> Result<()> {
        self.capture_node()?
            .set_control(ControlId::SET_AUTO_FOCUS, controls::ON)?;
        Ok(())
    }

    /// Poll the first search until it settles, then conclude it.
    ///
    /// The finish control is sent whatever the outcome.
    pub fn autofocus_result(&mut self) -> Result<AutofocusOutcome> {
        let count = self.config.af_search_count;
        let interval = self.config.af_poll_interval;
        let node = self.capture_node()?;

        let mut outcome = AutofocusOutcome::TimedOut;
        let mut read_error = None;
        for _ in 0..count {
            match node.control(ControlId::AUTO_FOCUS_RESULT_FIRST) {
                Ok(controls::af_result::PROGRESS) => thread::sleep(interval),
                Ok(controls::af_result::SUCCESS) => {
                    outcome = AutofocusOutcome::Focused;
                    break;
                }
                Ok(status) => {
                    debug!("auto focus ended with status {status}");
                    outcome = AutofocusOutcome::Failed;
                    break;
                }
                Err(err) => {
                    read_error = Some(err);
                    break;
                }
            }
        }

        node.set_control(ControlId::FINISH_AUTO_FOCUS, 0)?;
        if let Some(err) = read_error {
            return Err(err);
        }
        debug!("auto focus: {outcome:?}");
        Ok(outcome)
    }

    /// Abort a running search.
    pub fn cancel_autofocus(&mut self) -> Result<()> {
        self.capture_node()?
            .set_control(ControlId::SET_AUTO_FOCUS, controls::OFF)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Tunables

    /// Validate and cache `value`; push it now if preview is running.
    pub fn set_attribute(&mut self, attr: Attribute, value: i32) -> Result<()> {
        let previewing = self.is_previewing();
        let live = self
            .devices
            .as_mut()
            .filter(|_| previewing)
            .map(|devices| devices.capture.node_mut());
        self.settings.set(attr, value, self.camera, live)
    }

    /// Cached value of `attr`.
    pub fn attribute(&self, attr: Attribute) -> Option<i32> {
        self.settings.get(attr)
    }

    /// Exposure compensation in EV steps, -4 to 4.
    pub fn set_brightness(&mut self, ev: i32) -> Result<()> {
        self.set_attribute(Attribute::Brightness, ev.saturating_add(controls::EV_DEFAULT))
    }

    /// Exposure compensation in EV steps.
    pub fn brightness(&self) -> Option<i32> {
        self.attribute(Attribute::Brightness)
            .map(|stored| stored - controls::EV_DEFAULT)
    }

    /// Rotation in degrees; any right angle, negative meaning clockwise.
    pub fn set_rotation(&mut self, angle: i32) -> Result<()> {
        let angle = normalize_rotation(angle)?;
        self.set_attribute(Attribute::Rotation, angle)
    }

    /// Rotation, 0 when never set.
    pub fn rotation(&self) -> i32 {
        self.attribute(Attribute::Rotation).unwrap_or(0)
    }

    /// Frame rate; 0 lets the sensor decide.
    pub fn set_frame_rate(&mut self, fps: i32) -> Result<()> {
        self.set_attribute(Attribute::FrameRate, fps)
    }

    /// JPEG quality in percent.
    pub fn set_jpeg_quality(&mut self, quality: i32) -> Result<()> {
        self.set_attribute(Attribute::JpegQuality, quality)
    }

    /// JPEG quality in percent.
    pub fn jpeg_quality(&self) -> i32 {
        self.attribute(Attribute::JpegQuality).unwrap_or(100)
    }

    /// Flip the image vertically.
    pub fn set_vertical_mirror(&mut self) -> Result<()> {
        self.capture_node()?.set_control(ControlId::VFLIP, 0)?;
        Ok(())
    }

    /// Flip the image horizontally.
    pub fn set_horizontal_mirror(&mut self) -> Result<()> {
        self.capture_node()?.set_control(ControlId::HFLIP, 0)?;
        Ok(())
    }

    /// Object tracking state reported by the sensor.
    pub fn object_tracking_status(&self) -> Result<i32> {
        let devices = self.devices.as_ref().ok_or(CameraError::NotInitialized)?;
        devices.capture.node().control(ControlId::OBJ_TRACKING_STATUS)
    }

    /// Start (1) or stop (0) object tracking. Written on change.
    pub fn set_object_tracking_start_stop(&mut self, value: i32) -> Result<()> {
        check_range(
            "object tracking start/stop",
            value,
            Range::HalfOpen(controls::OFF, controls::SWITCH_MAX),
        )?;
        if self.tracking_start_stop == Some(value) {
            return Ok(());
        }
        self.capture_node()?
            .set_control(ControlId::OBJ_TRACKING_START_STOP, value)?;
        self.tracking_start_stop = Some(value);
        Ok(())
    }

    /// Start (1) or stop (0) touch auto focus. Written on change while
    /// preview is running.
    pub fn set_touch_af_start_stop(&mut self, value: i32) -> Result<()> {
        check_range(
            "touch AF start/stop",
            value,
            Range::HalfOpen(controls::OFF, controls::SWITCH_MAX),
        )?;
        if self.touch_af == Some(value) {
            return Ok(());
        }
        if self.is_previewing() {
            self.capture_node()?
                .set_control(ControlId::TOUCH_AF_START_STOP, value)?;
        }
        self.touch_af = Some(value);
        Ok(())
    }

    /// Scene detected by smart auto, or `None` when smart auto is off or
    /// the sensor reports something out of range.
    pub fn autoscene_status(&self) -> Result<Option<i32>> {
        if self.settings.get(Attribute::SmartAuto) != Some(controls::ON) {
            return Ok(None);
        }
        let devices = self.devices.as_ref().ok_or(CameraError::NotInitialized)?;
        let status = devices.capture.node().control(ControlId::SMART_AUTO_STATUS)?;
        if (controls::smart_auto_status::AUTO..=controls::smart_auto_status::MAX).contains(&status)
        {
            Ok(Some(status))
        } else {
            warn!("smart auto status {status} out of range");
            Ok(None)
        }
    }

    /// Lock or unlock face detection results.
    pub fn set_face_detect_lock(&mut self, value: i32) -> Result<()> {
        self.capture_node()?
            .set_control(ControlId::FACEDETECT_LOCKUNLOCK, value)?;
        Ok(())
    }

    /// Touch position for focus and tracking. Only reaches the sensor while
    /// preview is running.
    pub fn set_object_position(&mut self, x: i32, y: i32) -> Result<()> {
        if !self.is_previewing() {
            return Ok(());
        }
        let node = self.capture_node()?;
        node.set_control(ControlId::OBJECT_POSITION_X, x)?;
        node.set_control(ControlId::OBJECT_POSITION_Y, y)?;
        Ok(())
    }

    /// Apply batched settings at once. Only while preview is running.
    pub fn batch_reflection(&mut self) -> Result<()> {
        if self.is_previewing() {
            self.capture_node()?
                .set_control(ControlId::BATCH_REFLECTION, 1)?;
        }
        Ok(())
    }

    /// End the data line test pattern. Only while preview is running.
    pub fn stop_data_line_check(&mut self) -> Result<()> {
        if self.is_previewing() {
            self.capture_node()?
                .set_control(ControlId::CHECK_DATALINE_STOP, 1)?;
        }
        Ok(())
    }

    /// Name of the selected sensor input.
    pub fn sensor_name(&self) -> Result<String> {
        let devices = self.devices.as_ref().ok_or(CameraError::NotInitialized)?;
        devices.capture.node().input_name(self.camera.input_index())
    }

    // ------------------------------------------------------------------
    // GPS and EXIF inputs

    /// Latitude in decimal degrees; `None` clears it.
    pub fn set_gps_latitude(&mut self, text: Option<&str>) -> Result<()> {
        self.gps.latitude = text
            .map(|t| parse_fixed_point("GPS latitude", t, 10_000.0))
            .transpose()?;
        Ok(())
    }

    /// Longitude in decimal degrees; `None` clears it.
    pub fn set_gps_longitude(&mut self, text: Option<&str>) -> Result<()> {
        self.gps.longitude = text
            .map(|t| parse_fixed_point("GPS longitude", t, 10_000.0))
            .transpose()?;
        Ok(())
    }

    /// Altitude in metres; `None` clears it.
    pub fn set_gps_altitude(&mut self, text: Option<&str>) -> Result<()> {
        self.gps.altitude = text
            .map(|t| parse_fixed_point("GPS altitude", t, 100.0))
            .transpose()?;
        Ok(())
    }

    /// Fix time in seconds since the epoch; `None` clears it.
    pub fn set_gps_timestamp(&mut self, text: Option<&str>) -> Result<()> {
        self.gps.timestamp = text.map(parse_timestamp).transpose()?;
        Ok(())
    }

    /// How the fix was obtained. Long strings are cut to fit the tag.
    pub fn set_gps_processing_method(&mut self, text: Option<&str>) {
        self.gps.processing_method = text
            .map(|t| truncated(t, GPS_PROCESSING_METHOD_MAX))
            .unwrap_or_default();
    }

    /// The current GPS fix.
    pub const fn gps(&self) -> &GpsFix {
        &self.gps
    }

    /// Device orientation in degrees for the EXIF orientation tag.
    pub fn set_exif_orientation(&mut self, degrees: i32) -> Result<()> {
        if degrees < 0 {
            return Err(CameraError::InvalidParameter(format!(
                "EXIF orientation {degrees}"
            )));
        }
        self.exif_orientation = Some(degrees);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Geometry

    /// Preview size and raw format. Takes effect at the next start.
    pub fn set_preview_size(&mut self, width: u32, height: u32, fourcc: FourCC) -> Result<()> {
        check_frame_size("preview", width, height, self.camera.max_preview_size())?;
        check_raw_format(fourcc)?;
        self.preview = Format::new(width, height, fourcc);
        Ok(())
    }

    /// Preview geometry.
    pub const fn preview_format(&self) -> &Format {
        &self.preview
    }

    /// Bytes in one preview frame.
    pub const fn preview_frame_size(&self) -> usize {
        self.preview
            .fourcc
            .frame_size(self.preview.width, self.preview.height)
    }

    /// Recording size; the format is always tiled NV12.
    pub fn set_record_size(&mut self, width: u32, height: u32) -> Result<()> {
        check_frame_size("recording", width, height, self.camera.max_preview_size())?;
        self.record = Format::new(width, height, FourCC::NV12T);
        Ok(())
    }

    /// Recording geometry.
    pub const fn record_format(&self) -> &Format {
        &self.record
    }

    /// Still capture size.
    pub fn set_snapshot_size(&mut self, width: u32, height: u32) -> Result<()> {
        check_frame_size("snapshot", width, height, self.camera.max_snapshot_size())?;
        self.snapshot = Format::new(width, height, self.snapshot.fourcc);
        Ok(())
    }

    /// Still capture format: sensor JPEG or a raw layout.
    pub fn set_snapshot_format(&mut self, fourcc: FourCC) -> Result<()> {
        let fourcc = if fourcc == FourCC::JPEG {
            fourcc
        } else {
            check_raw_format(fourcc)?
        };
        self.snapshot = Format::new(self.snapshot.width, self.snapshot.height, fourcc);
        Ok(())
    }

    /// Still capture width, height and buffer size.
    pub const fn snapshot_size(&self) -> (u32, u32, usize) {
        let Format {
            width,
            height,
            fourcc,
            ..
        } = self.snapshot;
        (width, height, fourcc.frame_size(width, height))
    }

    /// Still capture format.
    pub const fn snapshot_format(&self) -> FourCC {
        self.snapshot.fourcc
    }

    /// EXIF thumbnail size; `(0, 0)` disables the thumbnail.
    pub fn set_jpeg_thumbnail_size(&mut self, width: u32, height: u32) -> Result<()> {
        if (width, height) != (0, 0) {
            let (max_w, max_h, _) = self.camera.thumbnail_config();
            check_frame_size("thumbnail", width, height, (max_w, max_h))?;
        }
        self.thumbnail = (width, height);
        Ok(())
    }

    /// EXIF thumbnail size.
    pub const fn jpeg_thumbnail_size(&self) -> (u32, u32) {
        self.thumbnail
    }
}

impl<O: DeviceOpener> Drop for CameraSession<O> {
    fn drop(&mut self) {
        self.deinit();
    }
}
