//! Cached tunables and the rules for when they reach the driver.
//!
//! A value is validated, compared against the cache and, if the sensor is
//! streaming, written to the driver before the cache is updated. Values set
//! while idle wait in the cache and are pushed in two phases around
//! stream-on by [`Settings::apply_deferred`].

use std::collections::BTreeMap;

use log::debug;

use crate::controls::{self, ControlId};
use crate::traits::{CameraId, Result, VideoNode};
use crate::validation::{check_range, Range};

/// A cached sensor setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Attribute {
    /// Exposure compensation, stored offset (0..=8, 4 is 0 EV).
    Brightness,
    /// White balance preset.
    WhiteBalance,
    /// Colour effect.
    Effect,
    /// ISO preset.
    Iso,
    /// Metering mode.
    Metering,
    /// Scene preset.
    SceneMode,
    /// Flash mode.
    FlashMode,
    /// Contrast step.
    Contrast,
    /// Saturation step.
    Saturation,
    /// Sharpness step.
    Sharpness,
    /// Wide dynamic range.
    Wdr,
    /// Stabilisation.
    AntiShake,
    /// Flicker suppression.
    AntiBanding,
    /// Zoom step.
    Zoom,
    /// Focus mode.
    FocusMode,
    /// Face detection mode.
    FaceDetect,
    /// Object tracking enable.
    ObjectTracking,
    /// Automatic scene detection.
    SmartAuto,
    /// Beauty shot.
    BeautyShot,
    /// Vintage colour mode.
    VintageMode,
    /// Rotation, 0/90/180/270.
    Rotation,
    /// Frame rate; 0 lets the sensor decide.
    FrameRate,
    /// JPEG quality in percent.
    JpegQuality,
    /// Video gamma.
    Gamma,
    /// Slow auto exposure.
    SlowAe,
    /// Video call mode.
    VtMode,
    /// Still or movie sensor mode.
    SensorMode,
    /// Shot mode.
    ShotMode,
    /// Front sensor blur level.
    Blur,
    /// Data line test pattern.
    DataLineCheck,
}

/// When a cached value is pushed relative to stream-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// After buffers are queued, before stream-on.
    BeforeStreamOn,
    /// Right after stream-on.
    AfterStreamOn,
}

impl Attribute {
    /// Legal values.
    pub const fn range(self) -> Range {
        use controls::*;
        match self {
            Self::Brightness => Range::Closed(EV_MINUS_4, EV_PLUS_4),
            Self::WhiteBalance => Range::Open(white_balance::BASE, white_balance::MAX),
            Self::Effect => Range::Open(image_effect::BASE, image_effect::MAX),
            Self::Iso => Range::HalfOpen(iso::AUTO, iso::MAX),
            Self::Metering => Range::Open(metering::BASE, metering::MAX),
            Self::SceneMode => Range::Open(scene_mode::BASE, scene_mode::MAX),
            Self::FlashMode => Range::Open(flash_mode::BASE, flash_mode::MAX),
            Self::Contrast | Self::Saturation | Self::Sharpness => {
                Range::HalfOpen(adjust::MINUS_2, adjust::MAX)
            }
            Self::AntiShake => Range::HalfOpen(OFF, ANTI_SHAKE_MAX),
            Self::AntiBanding => Range::Closed(anti_banding::AUTO, anti_banding::OFF),
            Self::Zoom => Range::HalfOpen(zoom::LEVEL_0, zoom::MAX),
            Self::FocusMode => Range::Below(focus_mode::MAX),
            Self::FaceDetect => Range::HalfOpen(face_detection::OFF, face_detection::MAX),
            Self::VintageMode => Range::Open(vintage_mode::BASE, vintage_mode::MAX),
            Self::Rotation => Range::Closed(0, 270),
            Self::FrameRate => Range::Closed(frame_rate::AUTO, frame_rate::MAX),
            Self::JpegQuality => Range::HalfOpen(jpeg_quality::ECONOMY, jpeg_quality::MAX),
            Self::SensorMode => Range::Closed(sensor_mode::CAMERA, sensor_mode::MOVIE),
            Self::ShotMode => Range::Closed(shot_mode::SINGLE, shot_mode::SELF),
            Self::Blur => Range::HalfOpen(blur::LEVEL_0, blur::MAX),
            Self::Wdr
            | Self::ObjectTracking
            | Self::SmartAuto
            | Self::BeautyShot
            | Self::Gamma
            | Self::SlowAe
            | Self::VtMode
            | Self::DataLineCheck => Range::HalfOpen(OFF, SWITCH_MAX),
        }
    }

    /// Driver control written when the value changes while streaming.
    ///
    /// `None` for settings that are only cached, or pushed by a specific
    /// operation (VT mode and the data line check at preview start).
    pub const fn live_control(self, camera: CameraId) -> Option<ControlId> {
        Some(match self {
            Self::Brightness => ControlId::BRIGHTNESS,
            Self::WhiteBalance => ControlId::WHITE_BALANCE,
            Self::Effect => ControlId::EFFECT,
            Self::Iso => ControlId::ISO,
            Self::Metering => ControlId::METERING,
            Self::SceneMode => ControlId::SCENE_MODE,
            Self::FlashMode => ControlId::FLASH_MODE,
            Self::Contrast => ControlId::CONTRAST,
            Self::Saturation => ControlId::SATURATION,
            Self::Sharpness => ControlId::SHARPNESS,
            Self::Wdr => ControlId::WDR,
            Self::AntiShake => ControlId::ANTI_SHAKE,
            Self::AntiBanding => ControlId::ANTI_BANDING,
            Self::Zoom => ControlId::ZOOM,
            Self::FocusMode => ControlId::FOCUS_MODE,
            Self::FaceDetect => ControlId::FACE_DETECTION,
            Self::SmartAuto => ControlId::SMART_AUTO,
            Self::BeautyShot => ControlId::BEAUTY_SHOT,
            Self::VintageMode => ControlId::VINTAGE_MODE,
            Self::Rotation => ControlId::ROTATION,
            Self::FrameRate => ControlId::FRAME_RATE,
            Self::Gamma => ControlId::SET_GAMMA,
            Self::SlowAe => ControlId::SET_SLOW_AE,
            Self::Blur => ControlId::VGA_BLUR,
            Self::JpegQuality => match camera {
                CameraId::Back => ControlId::JPEG_QUALITY,
                CameraId::Front => return None,
            },
            Self::ObjectTracking
            | Self::VtMode
            | Self::SensorMode
            | Self::ShotMode
            | Self::DataLineCheck => return None,
        })
    }
}

/// Settings pushed around stream-on, in push order.
///
/// The back sensor takes its exposure pipeline before stream-on and its
/// optics after; the front sensor only accepts controls once streaming.
pub const fn deferred(camera: CameraId, phase: Phase) -> &'static [Attribute] {
    use Attribute::*;
    match (camera, phase) {
        (CameraId::Back, Phase::BeforeStreamOn) => {
            &[FrameRate, Effect, Iso, Metering, SceneMode, WhiteBalance]
        }
        (CameraId::Back, Phase::AfterStreamOn) => &[
            Brightness,
            Zoom,
            Contrast,
            FocusMode,
            Saturation,
            Sharpness,
            FlashMode,
            Wdr,
            AntiShake,
            AntiBanding,
            SmartAuto,
            VintageMode,
            BeautyShot,
            FaceDetect,
            Rotation,
            Gamma,
            SlowAe,
            JpegQuality,
        ],
        (CameraId::Front, Phase::BeforeStreamOn) => &[],
        (CameraId::Front, Phase::AfterStreamOn) => &[
            FrameRate,
            Blur,
            Brightness,
            FlashMode,
            Wdr,
            AntiShake,
            AntiBanding,
            SmartAuto,
            VintageMode,
            BeautyShot,
            FaceDetect,
            Rotation,
            Gamma,
            SlowAe,
        ],
    }
}

/// The attribute cache. An attribute never set is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    values: BTreeMap<Attribute, i32>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut values = BTreeMap::new();
        values.insert(Attribute::JpegQuality, 100);
        values.insert(Attribute::VtMode, controls::OFF);
        Self { values }
    }
}

impl Settings {
    /// Cached value of `attr`.
    pub fn get(&self, attr: Attribute) -> Option<i32> {
        self.values.get(&attr).copied()
    }

    /// Validate `value` and store it.
    ///
    /// `live` is the capture node when the sensor is streaming. In that case
    /// the control is written first and the cache only changes if the write
    /// succeeds. Setting the cached value again writes nothing.
    pub fn set<N: VideoNode>(
        &mut self,
        attr: Attribute,
        value: i32,
        camera: CameraId,
        mut live: Option<&mut N>,
    ) -> Result<()> {
        check_range(&format!("{attr:?}"), value, attr.range())?;
        if self.get(attr) == Some(value) {
            return Ok(());
        }

        if let Some(node) = live.as_deref_mut() {
            if attr == Attribute::FaceDetect && value != controls::face_detection::OFF {
                node.set_control(ControlId::FOCUS_MODE, controls::focus_mode::AUTO)?;
            }
            if let Some(id) = attr.live_control(camera) {
                node.set_control(id, value)?;
            }
        }
        // Beauty shot is only cached once its face detection has landed.
        if attr == Attribute::BeautyShot {
            self.set(
                Attribute::FaceDetect,
                controls::face_detection::ON_BEAUTY,
                camera,
                live,
            )?;
        }
        debug!("{attr:?} = {value}");
        self.values.insert(attr, value);
        Ok(())
    }

    /// Push every cached setting that belongs to `phase` for `camera`.
    pub fn apply_deferred<N: VideoNode>(
        &self,
        node: &mut N,
        camera: CameraId,
        phase: Phase,
    ) -> Result<()> {
        for &attr in deferred(camera, phase) {
            let Some(value) = self.get(attr) else {
                continue;
            };
            if attr == Attribute::FrameRate {
                if value > 0 {
                    node.set_frame_rate(value as u32)?;
                }
                continue;
            }
            if let Some(id) = attr.live_control(camera) {
                debug!("deferred {attr:?} = {value}");
                node.set_control(id, value)?;
            }
        }
        Ok(())
    }
}
