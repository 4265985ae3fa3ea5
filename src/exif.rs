//! EXIF attribute assembly.
//!
//! The fixed part of the attribute set is filled once per session from the
//! camera identity and the property store. Everything else is recomputed
//! immediately before each encode from the cached settings and a fresh
//! shutter-time reading. Byte-level serialisation is left to an
//! [`ExifWriter`].

use chrono::{DateTime, NaiveDateTime, Timelike};
use log::warn;

use crate::controls;
use crate::properties::{self, PropertyStore};
use crate::traits::{CameraId, Result};

/// Unsigned EXIF rational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rational {
    /// Numerator.
    pub num: u32,
    /// Denominator.
    pub den: u32,
}

impl Rational {
    /// `num / den`.
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }
}

/// Signed EXIF rational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SRational {
    /// Numerator.
    pub num: i32,
    /// Denominator.
    pub den: i32,
}

impl SRational {
    /// `num / den`.
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }
}

const FNUMBER: Rational = Rational::new(26, 10);
const EXPOSURE_PROGRAM: u16 = 3;
const EXIF_VERSION: [u8; 4] = *b"0220";
const APEX_DEN: i32 = 100;
const FOCAL_LENGTH_DEN: u32 = 100;
const USER_COMMENT: &str = "User comments";
const COLOR_SPACE: u16 = 1;
const EXPOSURE_MODE: u16 = 0;
const GPS_VERSION: [u8; 4] = [2, 2, 0, 0];
const COMPRESSION: u16 = 6;
const RESOLUTION: Rational = Rational::new(72, 1);
const RESOLUTION_UNIT: u16 = 2;
const YCBCR_POSITIONING: u16 = 1;
const FLASH: u16 = 0;

/// Shutter time assumed when the sensor cannot report one, in microseconds.
pub const DEFAULT_SHUTTER_US: i32 = 100;
/// ISO written when the preset has no fixed speed.
const DEFAULT_ISO: u16 = 100;
/// Longest processing-method string kept, in bytes.
pub const GPS_PROCESSING_METHOD_MAX: usize = 100;

/// EXIF orientation codes.
pub mod orientation {
    /// Upright.
    pub const UP: u16 = 1;
    /// Rotated 180 degrees.
    pub const ROTATE_180: u16 = 3;
    /// Rotated 90 degrees clockwise.
    pub const ROTATE_90: u16 = 6;
    /// Rotated 270 degrees clockwise.
    pub const ROTATE_270: u16 = 8;
}

/// EXIF metering codes.
pub mod metering {
    /// Average.
    pub const AVERAGE: u16 = 1;
    /// Centre weighted.
    pub const CENTER: u16 = 2;
    /// Spot.
    pub const SPOT: u16 = 3;
}

/// EXIF scene capture types.
pub mod scene {
    /// Standard.
    pub const STANDARD: u16 = 0;
    /// Landscape.
    pub const LANDSCAPE: u16 = 1;
    /// Portrait.
    pub const PORTRAIT: u16 = 2;
    /// Night.
    pub const NIGHT: u16 = 3;
}

/// APEX aperture value of an f-number.
pub fn aperture_value(fnumber: f64) -> i32 {
    (2.0 * fnumber.log2()).round() as i32
}

/// APEX time value of an exposure in seconds.
pub fn shutter_value(exposure: f64) -> i32 {
    (-exposure.log2()).round() as i32
}

/// APEX speed value of an ISO rating.
pub fn sensitivity_value(iso: u16) -> i32 {
    (f64::from(iso) / 3.125).log2().round() as i32
}

/// Split an angle in 1/10000 degree into whole degrees, minutes and
/// seconds of its magnitude. Seconds are truncated.
pub fn to_dms(fixed: i64) -> [Rational; 3] {
    // 1/10000 degree is 0.36 arc-seconds.
    let total = fixed.unsigned_abs() * 36 / 100;
    let part = |v: u64| Rational::new(u32::try_from(v).unwrap_or(u32::MAX), 1);
    [
        part(total / 3600),
        part(total % 3600 / 60),
        part(total % 60),
    ]
}

/// Last GPS fix supplied by the host, in fixed point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GpsFix {
    /// Latitude in 1/10000 degree, north positive.
    pub latitude: Option<i64>,
    /// Longitude in 1/10000 degree, east positive.
    pub longitude: Option<i64>,
    /// Altitude in centimetres.
    pub altitude: Option<i64>,
    /// Fix time, seconds since the Unix epoch.
    pub timestamp: Option<i64>,
    /// How the fix was obtained.
    pub processing_method: String,
}

/// The GPS block of an EXIF attribute set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpsInfo {
    /// `N` or `S`.
    pub latitude_ref: char,
    /// Degrees, minutes, seconds.
    pub latitude: [Rational; 3],
    /// `E` or `W`.
    pub longitude_ref: char,
    /// Degrees, minutes, seconds.
    pub longitude: [Rational; 3],
    /// 0 above sea level, 1 below.
    pub altitude_ref: u8,
    /// Whole metres.
    pub altitude: Rational,
    /// UTC hour, minute, second of the fix.
    pub timestamp: [Rational; 3],
    /// UTC date of the fix, `YYYY:MM:DD`.
    pub datestamp: String,
    /// How the fix was obtained.
    pub processing_method: String,
}

impl GpsFix {
    /// The GPS block, or `None` unless both latitude and longitude are set
    /// and non-zero.
    pub fn to_info(&self) -> Option<GpsInfo> {
        let latitude = self.latitude.filter(|&v| v != 0)?;
        let longitude = self.longitude.filter(|&v| v != 0)?;
        let altitude = self.altitude.unwrap_or(0);

        let when = DateTime::from_timestamp(self.timestamp.unwrap_or(0), 0).unwrap_or_default();

        Some(GpsInfo {
            latitude_ref: if latitude > 0 { 'N' } else { 'S' },
            latitude: to_dms(latitude),
            longitude_ref: if longitude > 0 { 'E' } else { 'W' },
            longitude: to_dms(longitude),
            altitude_ref: u8::from(altitude <= 0),
            altitude: Rational::new((altitude as f64 / 100.0).abs() as u32, 1),
            timestamp: [
                Rational::new(when.hour(), 1),
                Rational::new(when.minute(), 1),
                Rational::new(when.second(), 1),
            ],
            datestamp: when.format("%Y:%m:%d").to_string(),
            processing_method: self.processing_method.clone(),
        })
    }
}

/// Session state the per-capture EXIF fields are derived from.
#[derive(Debug, Clone)]
pub struct CaptureContext<'a> {
    /// Still image width.
    pub width: u32,
    /// Still image height.
    pub height: u32,
    /// Host-reported device orientation in degrees.
    pub orientation: Option<i32>,
    /// Local time of the capture.
    pub now: NaiveDateTime,
    /// Shutter time read from the sensor, microseconds.
    pub shutter_us: Option<i32>,
    /// Cached ISO preset.
    pub iso: Option<i32>,
    /// Cached scene preset.
    pub scene_mode: Option<i32>,
    /// Cached metering mode.
    pub metering: Option<i32>,
    /// Cached white balance preset.
    pub white_balance: Option<i32>,
    /// Last GPS fix.
    pub gps: &'a GpsFix,
    /// Requested thumbnail size; `(0, 0)` for none.
    pub thumbnail: (u32, u32),
}

/// The attribute set handed to an [`ExifWriter`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct ExifAttributes {
    pub maker: String,
    pub model: String,
    pub software: String,
    pub ycbcr_positioning: u16,
    pub fnumber: Rational,
    pub exposure_program: u16,
    pub exif_version: [u8; 4],
    pub aperture: Rational,
    pub max_aperture: Rational,
    pub focal_length: Rational,
    pub user_comment: String,
    pub color_space: u16,
    pub exposure_mode: u16,
    pub gps_version_id: [u8; 4],
    pub compression_scheme: u16,
    pub x_resolution: Rational,
    pub y_resolution: Rational,
    pub resolution_unit: u16,

    pub width: u32,
    pub height: u32,
    pub orientation: u16,
    pub date_time: String,
    pub exposure_time: Rational,
    pub iso_speed_rating: u16,
    pub shutter_speed: SRational,
    pub brightness: SRational,
    pub exposure_bias: SRational,
    pub metering_mode: u16,
    pub flash: u16,
    pub white_balance: u16,
    pub scene_capture_type: u16,
    pub gps: Option<GpsInfo>,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    pub enable_thumbnail: bool,
}

impl ExifAttributes {
    /// The per-session part, with per-capture fields zeroed.
    pub fn fixed(camera: CameraId, props: &dyn PropertyStore) -> Self {
        let av = aperture_value(f64::from(FNUMBER.num) / f64::from(FNUMBER.den));
        let aperture = Rational::new((av * APEX_DEN) as u32, APEX_DEN as u32);
        Self {
            maker: props.get_or(properties::MAKER_KEY, properties::DEFAULT_MAKER),
            model: props.get_or(properties::MODEL_KEY, properties::DEFAULT_MODEL),
            software: props.get_or(properties::SOFTWARE_KEY, properties::DEFAULT_SOFTWARE),
            ycbcr_positioning: YCBCR_POSITIONING,
            fnumber: FNUMBER,
            exposure_program: EXPOSURE_PROGRAM,
            exif_version: EXIF_VERSION,
            aperture,
            max_aperture: aperture,
            focal_length: Rational::new(camera.focal_length(), FOCAL_LENGTH_DEN),
            user_comment: USER_COMMENT.to_owned(),
            color_space: COLOR_SPACE,
            exposure_mode: EXPOSURE_MODE,
            gps_version_id: GPS_VERSION,
            compression_scheme: COMPRESSION,
            x_resolution: RESOLUTION,
            y_resolution: RESOLUTION,
            resolution_unit: RESOLUTION_UNIT,

            width: 0,
            height: 0,
            orientation: orientation::UP,
            date_time: String::new(),
            exposure_time: Rational::default(),
            iso_speed_rating: DEFAULT_ISO,
            shutter_speed: SRational::default(),
            brightness: SRational::default(),
            exposure_bias: SRational::default(),
            metering_mode: metering::AVERAGE,
            flash: FLASH,
            white_balance: 0,
            scene_capture_type: scene::STANDARD,
            gps: None,
            thumbnail_width: 0,
            thumbnail_height: 0,
            enable_thumbnail: false,
        }
    }

    /// Recompute every per-capture field.
    pub fn update(&mut self, ctx: &CaptureContext<'_>) {
        self.width = ctx.width;
        self.height = ctx.height;
        self.orientation = match ctx.orientation {
            Some(90) => orientation::ROTATE_90,
            Some(180) => orientation::ROTATE_180,
            Some(270) => orientation::ROTATE_270,
            _ => orientation::UP,
        };
        self.date_time = ctx.now.format("%Y:%m:%d %H:%M:%S").to_string();

        let shutter_us = match ctx.shutter_us {
            Some(us) if us > 0 => us,
            other => {
                warn!("shutter time unavailable ({other:?}), using {DEFAULT_SHUTTER_US} us");
                DEFAULT_SHUTTER_US
            }
        };
        self.exposure_time = Rational::new(1, (1_000_000 / shutter_us) as u32);

        self.iso_speed_rating = match ctx.iso {
            Some(controls::iso::ISO_50) => 50,
            Some(controls::iso::ISO_100) => 100,
            Some(controls::iso::ISO_200) => 200,
            Some(controls::iso::ISO_400) => 400,
            Some(controls::iso::ISO_800) => 800,
            Some(controls::iso::ISO_1600) => 1600,
            _ => DEFAULT_ISO,
        };

        let av = aperture_value(f64::from(self.fnumber.num) / f64::from(self.fnumber.den));
        let tv = shutter_value(
            f64::from(self.exposure_time.num) / f64::from(self.exposure_time.den),
        );
        let sv = sensitivity_value(self.iso_speed_rating);
        let bv = av + tv - sv;
        self.shutter_speed = SRational::new(tv * APEX_DEN, APEX_DEN);
        self.brightness = SRational::new(bv * APEX_DEN, APEX_DEN);

        self.exposure_bias = if ctx.scene_mode == Some(controls::scene_mode::BEACH_SNOW) {
            SRational::new(APEX_DEN, APEX_DEN)
        } else {
            SRational::new(0, 1)
        };

        self.metering_mode = match ctx.metering {
            Some(controls::metering::SPOT) => metering::SPOT,
            Some(controls::metering::CENTER) => metering::CENTER,
            _ => metering::AVERAGE,
        };
        self.flash = FLASH;
        self.white_balance = match ctx.white_balance {
            None | Some(controls::white_balance::AUTO) => 0,
            Some(_) => 1,
        };
        self.scene_capture_type = match ctx.scene_mode {
            Some(controls::scene_mode::PORTRAIT) => scene::PORTRAIT,
            Some(controls::scene_mode::LANDSCAPE) => scene::LANDSCAPE,
            Some(controls::scene_mode::NIGHTSHOT) => scene::NIGHT,
            _ => scene::STANDARD,
        };

        self.gps = ctx.gps.to_info();
        self.thumbnail_width = ctx.thumbnail.0;
        self.thumbnail_height = ctx.thumbnail.1;
    }
}

/// Serialises an attribute set into an EXIF block.
pub trait ExifWriter {
    /// Produce the EXIF block for `attrs`, embedding `thumbnail` (a JPEG) when
    /// given.
    fn write(&mut self, attrs: &ExifAttributes, thumbnail: Option<&[u8]>) -> Result<Vec<u8>>;
}
