//! Control identifiers and enumerated values understood by the sensor driver.
//!
//! Standard IDs come from the V4L2 user and camera classes. Everything else is
//! the driver's private extension of that namespace.

/// A V4L2 control identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlId(pub u32);

const CID_BASE: u32 = 0x0098_0900;
const CID_CAMERA_CLASS_BASE: u32 = 0x009a_0900;
const CID_PRIVATE_BASE: u32 = 0x0800_0000;

const fn private(offset: u32) -> ControlId {
    ControlId(CID_PRIVATE_BASE + offset)
}

const fn camera(offset: u32) -> ControlId {
    ControlId(CID_CAMERA_CLASS_BASE + offset)
}

impl ControlId {
    /// Mirror horizontally.
    pub const HFLIP: Self = Self(CID_BASE + 20);
    /// Mirror vertically.
    pub const VFLIP: Self = Self(CID_BASE + 21);
    /// Image rotation in degrees.
    pub const ROTATION: Self = Self(CID_BASE + 34);

    /// Physical address of a buffer's luma plane (index in, address out).
    pub const PADDR_Y: Self = private(1);
    /// Physical address of a buffer's chroma plane.
    pub const PADDR_CBCR: Self = private(4);
    /// Byte size of the encoded main image.
    pub const JPEG_MAIN_SIZE: Self = private(32);
    /// Byte offset of the encoded main image in the capture buffer.
    pub const JPEG_MAIN_OFFSET: Self = private(33);
    /// Byte offset of the postview rendition in the capture buffer.
    pub const JPEG_POSTVIEW_OFFSET: Self = private(36);
    /// Sensor-side JPEG quality.
    pub const JPEG_QUALITY: Self = private(37);
    /// Legacy single-shot capture trigger.
    pub const CAPTURE_LEGACY: Self = private(41);
    /// Hold (0) or release (1) the stream without turning it off.
    pub const STREAM_PAUSE: Self = private(53);

    /// Scene preset.
    pub const SCENE_MODE: Self = private(70);
    /// Flash mode.
    pub const FLASH_MODE: Self = private(71);
    /// Exposure compensation.
    pub const BRIGHTNESS: Self = private(72);
    /// White balance preset.
    pub const WHITE_BALANCE: Self = private(73);
    /// Colour effect.
    pub const EFFECT: Self = private(74);
    /// ISO preset.
    pub const ISO: Self = private(75);
    /// Metering mode.
    pub const METERING: Self = private(76);
    /// Contrast step.
    pub const CONTRAST: Self = private(77);
    /// Saturation step.
    pub const SATURATION: Self = private(78);
    /// Sharpness step.
    pub const SHARPNESS: Self = private(79);
    /// Wide dynamic range.
    pub const WDR: Self = private(80);
    /// Stabilisation.
    pub const ANTI_SHAKE: Self = private(81);
    /// Touch auto focus start/stop.
    pub const TOUCH_AF_START_STOP: Self = private(82);
    /// Automatic scene detection.
    pub const SMART_AUTO: Self = private(83);
    /// Vintage colour mode.
    pub const VINTAGE_MODE: Self = private(84);
    /// Zoom step.
    pub const ZOOM: Self = private(90);
    /// Face detection mode.
    pub const FACE_DETECTION: Self = private(91);
    /// Scene detected by smart auto.
    pub const SMART_AUTO_STATUS: Self = private(92);
    /// Start or stop an auto focus search.
    pub const SET_AUTO_FOCUS: Self = private(93);
    /// Beauty shot.
    pub const BEAUTY_SHOT: Self = private(94);
    /// Lock face detection results.
    pub const FACEDETECT_LOCKUNLOCK: Self = private(96);
    /// Touch position, X.
    pub const OBJECT_POSITION_X: Self = private(97);
    /// Touch position, Y.
    pub const OBJECT_POSITION_Y: Self = private(98);
    /// Focus mode.
    pub const FOCUS_MODE: Self = private(99);
    /// Object tracking status.
    pub const OBJ_TRACKING_STATUS: Self = private(100);
    /// Object tracking start/stop.
    pub const OBJ_TRACKING_START_STOP: Self = private(101);
    /// Result of the first auto focus search.
    pub const AUTO_FOCUS_RESULT_FIRST: Self = private(103);
    /// Sensor frame rate.
    pub const FRAME_RATE: Self = private(104);
    /// Flicker suppression.
    pub const ANTI_BANDING: Self = private(105);
    /// Video gamma.
    pub const SET_GAMMA: Self = private(106);
    /// Slow auto exposure.
    pub const SET_SLOW_AE: Self = private(107);
    /// Apply all batched settings at once.
    pub const BATCH_REFLECTION: Self = private(108);
    /// Sensor data line test pattern.
    pub const CHECK_DATALINE: Self = private(112);
    /// Stop the data line test pattern.
    pub const CHECK_DATALINE_STOP: Self = private(113);
    /// Shutter time of the last exposure in microseconds.
    pub const GET_SHUTTER_TIME: Self = private(115);
    /// Electrostatic discharge status, non-zero when the sensor misbehaves.
    pub const ESD_INT: Self = private(117);
    /// Move the lens back after a search.
    pub const RETURN_FOCUS: Self = private(119);
    /// Conclude an auto focus search.
    pub const FINISH_AUTO_FOCUS: Self = private(120);

    /// Video call mode.
    pub const VT_MODE: Self = camera(48);
    /// Front sensor blur level.
    pub const VGA_BLUR: Self = camera(49);
    /// Single-shot capture trigger.
    pub const CAPTURE: Self = camera(50);
    /// Local date/time stamped into the sensor's EXIF (extended control).
    pub const EXIF_TIME_INFO: Self = camera(55);
}

impl std::fmt::Display for ControlId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Exposure compensation steps, stored offset so that 0 EV is [`EV_DEFAULT`].
pub const EV_MINUS_4: i32 = 0;
/// 0 EV.
pub const EV_DEFAULT: i32 = 4;
/// +4 EV.
pub const EV_PLUS_4: i32 = 8;

/// White balance presets.
pub mod white_balance {
    /// Exclusive lower bound.
    pub const BASE: i32 = 0;
    /// Automatic.
    pub const AUTO: i32 = 1;
    /// Daylight.
    pub const DAYLIGHT: i32 = 2;
    /// Cloudy.
    pub const CLOUDY: i32 = 3;
    /// Incandescent.
    pub const TUNGSTEN: i32 = 4;
    /// Fluorescent.
    pub const FLUORESCENT: i32 = 5;
    /// Exclusive upper bound.
    pub const MAX: i32 = 6;
}

/// Colour effects.
pub mod image_effect {
    /// Exclusive lower bound.
    pub const BASE: i32 = 0;
    /// No effect.
    pub const NONE: i32 = 1;
    /// Exclusive upper bound.
    pub const MAX: i32 = 8;
}

/// ISO presets.
pub mod iso {
    /// Automatic.
    pub const AUTO: i32 = 0;
    /// ISO 50.
    pub const ISO_50: i32 = 1;
    /// ISO 100.
    pub const ISO_100: i32 = 2;
    /// ISO 200.
    pub const ISO_200: i32 = 3;
    /// ISO 400.
    pub const ISO_400: i32 = 4;
    /// ISO 800.
    pub const ISO_800: i32 = 5;
    /// ISO 1600.
    pub const ISO_1600: i32 = 6;
    /// Exclusive upper bound.
    pub const MAX: i32 = 10;
}

/// Metering modes.
pub mod metering {
    /// Exclusive lower bound.
    pub const BASE: i32 = 0;
    /// Matrix.
    pub const MATRIX: i32 = 1;
    /// Centre weighted.
    pub const CENTER: i32 = 2;
    /// Spot.
    pub const SPOT: i32 = 3;
    /// Exclusive upper bound.
    pub const MAX: i32 = 4;
}

/// Scene presets.
pub mod scene_mode {
    /// Exclusive lower bound.
    pub const BASE: i32 = 0;
    /// No scene.
    pub const NONE: i32 = 1;
    /// Portrait.
    pub const PORTRAIT: i32 = 2;
    /// Night shot.
    pub const NIGHTSHOT: i32 = 3;
    /// Landscape.
    pub const LANDSCAPE: i32 = 5;
    /// Beach and snow.
    pub const BEACH_SNOW: i32 = 8;
    /// Exclusive upper bound.
    pub const MAX: i32 = 15;
}

/// Flash modes.
pub mod flash_mode {
    /// Exclusive lower bound.
    pub const BASE: i32 = 0;
    /// Off.
    pub const OFF: i32 = 1;
    /// Automatic.
    pub const AUTO: i32 = 2;
    /// Always fire.
    pub const ON: i32 = 3;
    /// Continuous light.
    pub const TORCH: i32 = 4;
    /// Exclusive upper bound.
    pub const MAX: i32 = 5;
}

/// Focus modes.
pub mod focus_mode {
    /// Single auto focus.
    pub const AUTO: i32 = 0;
    /// Macro.
    pub const MACRO: i32 = 1;
    /// Face priority.
    pub const FACEDETECT: i32 = 2;
    /// Exclusive upper bound.
    pub const MAX: i32 = 5;
}

/// Face detection modes.
pub mod face_detection {
    /// Off.
    pub const OFF: i32 = 0;
    /// On.
    pub const ON: i32 = 1;
    /// On without overlay.
    pub const NOLINE: i32 = 2;
    /// Used by beauty shot.
    pub const ON_BEAUTY: i32 = 3;
    /// Exclusive upper bound.
    pub const MAX: i32 = 4;
}

/// Frame rates. Any rate in `AUTO..=MAX` is accepted.
pub mod frame_rate {
    /// Let the sensor decide.
    pub const AUTO: i32 = 0;
    /// Inclusive upper bound.
    pub const MAX: i32 = 120;
}

/// Anti-banding modes. Both bounds inclusive.
pub mod anti_banding {
    /// Automatic.
    pub const AUTO: i32 = 0;
    /// Off.
    pub const OFF: i32 = 3;
}

/// Step controls centred on zero (contrast, saturation, sharpness).
pub mod adjust {
    /// Two steps below default.
    pub const MINUS_2: i32 = 0;
    /// Default.
    pub const DEFAULT: i32 = 2;
    /// Exclusive upper bound.
    pub const MAX: i32 = 5;
}

/// Zoom steps.
pub mod zoom {
    /// No zoom.
    pub const LEVEL_0: i32 = 0;
    /// Exclusive upper bound.
    pub const MAX: i32 = 31;
}

/// JPEG quality, in percent.
pub mod jpeg_quality {
    /// Lowest accepted value.
    pub const ECONOMY: i32 = 0;
    /// Exclusive upper bound.
    pub const MAX: i32 = 101;
}

/// Vintage modes.
pub mod vintage_mode {
    /// Exclusive lower bound.
    pub const BASE: i32 = 0;
    /// Off.
    pub const OFF: i32 = 1;
    /// Exclusive upper bound.
    pub const MAX: i32 = 6;
}

/// Smart auto scene status range (inclusive).
pub mod smart_auto_status {
    /// Plain auto.
    pub const AUTO: i32 = 0;
    /// Largest status the sensor reports.
    pub const MAX: i32 = 13;
}

/// Blur levels for the front sensor.
pub mod blur {
    /// No blur.
    pub const LEVEL_0: i32 = 0;
    /// Exclusive upper bound.
    pub const MAX: i32 = 4;
}

/// Shot modes, inclusive range.
pub mod shot_mode {
    /// Single shot.
    pub const SINGLE: i32 = 0;
    /// Self portrait, highest mode.
    pub const SELF: i32 = 6;
}

/// Sensor modes, inclusive range.
pub mod sensor_mode {
    /// Still camera.
    pub const CAMERA: i32 = 0;
    /// Camcorder with fixed frame rate.
    pub const MOVIE: i32 = 1;
}

/// Off/on switch values shared by boolean-like controls.
pub const OFF: i32 = 0;
/// See [`OFF`].
pub const ON: i32 = 1;
/// Exclusive upper bound of off/on controls.
pub const SWITCH_MAX: i32 = 2;
/// Exclusive upper bound of the anti-shake control (off, still, movie).
pub const ANTI_SHAKE_MAX: i32 = 3;

/// Auto focus search states reported by [`ControlId::AUTO_FOCUS_RESULT_FIRST`].
pub mod af_result {
    /// Search still running.
    pub const PROGRESS: i32 = 1;
    /// Lens locked.
    pub const SUCCESS: i32 = 2;
}
