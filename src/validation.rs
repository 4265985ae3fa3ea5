//! Input validation for camera settings.
//!
//! Every tunable accepts a closed range of integers; these helpers reject
//! anything outside it with [`CameraError::InvalidParameter`] before the value
//! reaches the settings cache or the driver.

use crate::traits::{CameraError, FourCC, Result};

/// Shape of an attribute's legal range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Range {
    /// `base < value < max`: both bounds are sentinels.
    Open(i32, i32),
    /// `min <= value < max`.
    HalfOpen(i32, i32),
    /// `min <= value <= max`.
    Closed(i32, i32),
    /// `value < max`, no lower bound.
    Below(i32),
}

impl Range {
    /// Whether `value` lies inside the range.
    #[must_use]
    pub const fn contains(self, value: i32) -> bool {
        match self {
            Self::Open(base, max) => base < value && value < max,
            Self::HalfOpen(min, max) => min <= value && value < max,
            Self::Closed(min, max) => min <= value && value <= max,
            Self::Below(max) => value < max,
        }
    }
}

/// Check `value` against `range`, naming the attribute in the error.
pub fn check_range(name: &str, value: i32, range: Range) -> Result<i32> {
    if range.contains(value) {
        Ok(value)
    } else {
        Err(CameraError::InvalidParameter(format!(
            "{name} {value} outside {range:?}"
        )))
    }
}

/// Fold a rotation in degrees onto 0, 90, 180 or 270.
///
/// Negative angles count clockwise, so -90 is 270.
pub fn normalize_rotation(angle: i32) -> Result<i32> {
    match angle {
        -360 | 0 | 360 => Ok(0),
        -270 | 90 => Ok(90),
        -180 | 180 => Ok(180),
        -90 | 270 => Ok(270),
        _ => Err(CameraError::InvalidParameter(format!(
            "rotation {angle} is not a right angle"
        ))),
    }
}

/// Reject a frame size that is empty or larger than the sensor produces.
pub fn check_frame_size(what: &str, width: u32, height: u32, max: (u32, u32)) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(CameraError::InvalidParameter(format!(
            "{what} size {width}x{height} is empty"
        )));
    }
    if width > max.0 || height > max.1 {
        return Err(CameraError::InvalidParameter(format!(
            "{what} size {width}x{height} exceeds {}x{}",
            max.0, max.1
        )));
    }
    Ok(())
}

/// Pixel formats the capture path can deliver raw.
pub fn check_raw_format(fourcc: FourCC) -> Result<FourCC> {
    match fourcc {
        FourCC::YUYV
        | FourCC::UYVY
        | FourCC::NV12
        | FourCC::NV21
        | FourCC::NV12T
        | FourCC::YUV420
        | FourCC::YUV422P
        | FourCC::RGB565 => Ok(fourcc),
        other => Err(CameraError::FormatNotSupported(other)),
    }
}

/// Parse a decimal coordinate into fixed point, `scale` units per degree
/// (or metre).
///
/// Surrounding whitespace is ignored. Text that is not a finite number is
/// rejected.
pub fn parse_fixed_point(what: &str, text: &str, scale: f64) -> Result<i64> {
    let value: f64 = text.trim().parse().map_err(|_| {
        CameraError::InvalidParameter(format!("{what} {text:?} is not a number"))
    })?;
    if !value.is_finite() {
        return Err(CameraError::InvalidParameter(format!(
            "{what} {text:?} is not finite"
        )));
    }
    #[allow(clippy::cast_possible_truncation)]
    Ok((value * scale).round() as i64)
}

/// Parse a GPS fix time given as seconds since the Unix epoch.
pub fn parse_timestamp(text: &str) -> Result<i64> {
    text.trim().parse().map_err(|_| {
        CameraError::InvalidParameter(format!("GPS timestamp {text:?} is not an integer"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_range_excludes_sentinels() {
        let range = Range::Open(0, 6);
        assert!(!range.contains(0));
        assert!(range.contains(1));
        assert!(range.contains(5));
        assert!(!range.contains(6));
    }

    #[test]
    fn test_half_open_and_closed_ranges() {
        assert!(Range::HalfOpen(0, 10).contains(0));
        assert!(!Range::HalfOpen(0, 10).contains(10));
        assert!(Range::Closed(0, 3).contains(3));
        assert!(!Range::Closed(0, 3).contains(-1));
        assert!(Range::Below(5).contains(-7));
        assert!(!Range::Below(5).contains(5));
    }

    #[test]
    fn test_check_range_error_names_attribute() {
        let err = check_range("white balance", 9, Range::Open(0, 6))
            .expect_err("9 is out of range");
        assert!(err.to_string().contains("white balance"));
        assert_eq!(
            check_range("iso", 3, Range::HalfOpen(0, 10)).expect("in range"),
            3
        );
    }

    #[test]
    fn test_normalize_rotation() {
        assert_eq!(normalize_rotation(0).expect("valid"), 0);
        assert_eq!(normalize_rotation(360).expect("valid"), 0);
        assert_eq!(normalize_rotation(-90).expect("valid"), 270);
        assert_eq!(normalize_rotation(-270).expect("valid"), 90);
        assert_eq!(normalize_rotation(-180).expect("valid"), 180);
        assert!(normalize_rotation(45).is_err());
        assert!(normalize_rotation(450).is_err());
    }

    #[test]
    fn test_check_frame_size() {
        assert!(check_frame_size("preview", 640, 480, (1280, 720)).is_ok());
        assert!(check_frame_size("preview", 0, 480, (1280, 720)).is_err());
        assert!(check_frame_size("preview", 1920, 1080, (1280, 720)).is_err());
    }

    #[test]
    fn test_check_raw_format_rejects_compressed() {
        assert!(check_raw_format(FourCC::NV21).is_ok());
        assert!(matches!(
            check_raw_format(FourCC::MJPG),
            Err(CameraError::FormatNotSupported(FourCC::MJPG))
        ));
    }

    #[test]
    fn test_parse_fixed_point() {
        assert_eq!(parse_fixed_point("lat", "12.5", 10_000.0).expect("number"), 125_000);
        assert_eq!(
            parse_fixed_point("lat", " -45.25 ", 10_000.0).expect("number"),
            -452_500
        );
        assert_eq!(parse_fixed_point("alt", "10.07", 100.0).expect("number"), 1007);
        assert!(parse_fixed_point("lat", "north", 10_000.0).is_err());
        assert!(parse_fixed_point("lat", "inf", 10_000.0).is_err());
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("1700000000").expect("integer"), 1_700_000_000);
        assert!(parse_timestamp("12:00").is_err());
    }
}
