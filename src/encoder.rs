//! JPEG encoding of raw frames.
//!
//! The session hands an [`EncodeRequest`] to any [`JpegEncoder`]. The
//! bundled [`SoftwareJpegEncoder`] converts YUV to RGB on the CPU and
//! encodes with the `image` crate.

use image::codecs::jpeg;
use image::ExtendedColorType;
use log::debug;

use crate::traits::{CameraError, FourCC, Result};

/// Chroma subsampling of the encoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sampling {
    /// 4:2:0.
    Yuv420,
    /// 4:2:2.
    Yuv422,
}

impl Sampling {
    /// Sampling that preserves the chroma of `fourcc`.
    #[must_use]
    pub const fn for_format(fourcc: FourCC) -> Self {
        if fourcc.is_420() {
            Self::Yuv420
        } else {
            Self::Yuv422
        }
    }
}

/// Encoder quality step, `L1` best.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityLevel {
    /// Quality 90 and up.
    L1,
    /// Quality 80 to 89.
    L2,
    /// Quality 70 to 79.
    L3,
    /// Anything lower.
    L4,
}

impl QualityLevel {
    /// Step for a JPEG quality in percent.
    #[must_use]
    pub const fn from_percent(quality: i32) -> Self {
        match quality {
            90.. => Self::L1,
            80..=89 => Self::L2,
            70..=79 => Self::L3,
            _ => Self::L4,
        }
    }

    /// Representative percentage handed to a percent-based encoder.
    #[must_use]
    pub const fn percent(self) -> u8 {
        match self {
            Self::L1 => 95,
            Self::L2 => 85,
            Self::L3 => 75,
            Self::L4 => 60,
        }
    }
}

/// One frame to encode.
#[derive(Debug, Clone, Copy)]
pub struct EncodeRequest<'a> {
    /// Raw pixels, tightly packed.
    pub pixels: &'a [u8],
    /// Layout of `pixels`.
    pub fourcc: FourCC,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Output subsampling.
    pub sampling: Sampling,
    /// Output quality.
    pub quality: QualityLevel,
    /// APP1 payload (starting with `Exif\0\0`) to embed, if any.
    pub exif: Option<&'a [u8]>,
}

/// Turns raw frames into JPEG files.
pub trait JpegEncoder {
    /// Encode `request` into a complete JPEG byte stream.
    fn encode(&mut self, request: &EncodeRequest<'_>) -> Result<Vec<u8>>;

    /// Whether frames in `fourcc` can be encoded at all.
    fn supports(&self, fourcc: FourCC) -> bool;
}

/// CPU encoder for packed and semi-planar YUV.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareJpegEncoder;

impl JpegEncoder for SoftwareJpegEncoder {
    fn encode(&mut self, request: &EncodeRequest<'_>) -> Result<Vec<u8>> {
        let rgb = to_rgb(request)?;
        let mut out = Vec::new();
        jpeg::JpegEncoder::new_with_quality(&mut out, request.quality.percent())
            .encode(&rgb, request.width, request.height, ExtendedColorType::Rgb8)
            .map_err(|e| CameraError::Encode(e.to_string()))?;
        debug!(
            "encoded {}x{} {} into {} bytes",
            request.width,
            request.height,
            request.fourcc,
            out.len()
        );
        match request.exif {
            Some(app1) => insert_app1(&out, app1),
            None => Ok(out),
        }
    }

    fn supports(&self, fourcc: FourCC) -> bool {
        matches!(
            fourcc,
            FourCC::YUYV
                | FourCC::UYVY
                | FourCC::NV12
                | FourCC::NV21
                | FourCC::YUV420
                | FourCC::YUV422P
        )
    }
}

/// Splice an APP1 segment right after the SOI marker.
fn insert_app1(jpeg: &[u8], payload: &[u8]) -> Result<Vec<u8>> {
    let segment_len = u16::try_from(payload.len() + 2)
        .map_err(|_| CameraError::Encode(format!("EXIF block of {} bytes", payload.len())))?;
    let Some(rest) = jpeg.strip_prefix(&[0xFF, 0xD8]) else {
        return Err(CameraError::Encode("encoder output has no SOI".to_owned()));
    };
    let mut out = Vec::with_capacity(jpeg.len() + payload.len() + 4);
    out.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xE1]);
    out.extend_from_slice(&segment_len.to_be_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(rest);
    Ok(out)
}

/// BT.601 limited range.
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = (i32::from(y) - 16).max(0);
    let d = i32::from(u) - 128;
    let e = i32::from(v) - 128;
    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;
    [
        r.clamp(0, 255) as u8,
        g.clamp(0, 255) as u8,
        b.clamp(0, 255) as u8,
    ]
}

fn to_rgb(request: &EncodeRequest<'_>) -> Result<Vec<u8>> {
    let (w, h) = (request.width as usize, request.height as usize);
    let needed = request.fourcc.frame_size(request.width, request.height);
    let Some(src) = request.pixels.get(..needed) else {
        return Err(CameraError::Encode(format!(
            "{}x{} {} needs {needed} bytes, got {}",
            w,
            h,
            request.fourcc,
            request.pixels.len()
        )));
    };

    // Byte offsets of Y, U and V for pixel (x, y).
    let locate: Box<dyn Fn(usize, usize) -> (usize, usize, usize)> = match request.fourcc {
        FourCC::YUYV => Box::new(move |x, y| {
            let pair = y * w * 2 + (x & !1) * 2;
            (y * w * 2 + x * 2, pair + 1, pair + 3)
        }),
        FourCC::UYVY => Box::new(move |x, y| {
            let pair = y * w * 2 + (x & !1) * 2;
            (y * w * 2 + x * 2 + 1, pair, pair + 2)
        }),
        FourCC::NV12 | FourCC::NV21 => {
            let swap = request.fourcc == FourCC::NV21;
            Box::new(move |x, y| {
                let chroma = w * h + (y / 2) * w + (x & !1);
                if swap {
                    (y * w + x, chroma + 1, chroma)
                } else {
                    (y * w + x, chroma, chroma + 1)
                }
            })
        }
        FourCC::YUV420 => Box::new(move |x, y| {
            let quarter = (w / 2) * (h / 2);
            let chroma = (y / 2) * (w / 2) + x / 2;
            (y * w + x, w * h + chroma, w * h + quarter + chroma)
        }),
        FourCC::YUV422P => Box::new(move |x, y| {
            let chroma = y * (w / 2) + x / 2;
            (y * w + x, w * h + chroma, w * h + w * h / 2 + chroma)
        }),
        other => return Err(CameraError::FormatNotSupported(other)),
    };

    let mut rgb = Vec::with_capacity(w * h * 3);
    for y in 0..h {
        for x in 0..w {
            let (yi, ui, vi) = locate(x, y);
            let sample = |i: usize| src.get(i).copied().unwrap_or(128);
            rgb.extend_from_slice(&yuv_to_rgb(sample(yi), sample(ui), sample(vi)));
        }
    }
    Ok(rgb)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(pixels: &[u8], fourcc: FourCC, w: u32, h: u32) -> EncodeRequest<'_> {
        EncodeRequest {
            pixels,
            fourcc,
            width: w,
            height: h,
            sampling: Sampling::for_format(fourcc),
            quality: QualityLevel::L2,
            exif: None,
        }
    }

    #[test]
    fn test_quality_thresholds() {
        assert_eq!(QualityLevel::from_percent(100), QualityLevel::L1);
        assert_eq!(QualityLevel::from_percent(90), QualityLevel::L1);
        assert_eq!(QualityLevel::from_percent(89), QualityLevel::L2);
        assert_eq!(QualityLevel::from_percent(80), QualityLevel::L2);
        assert_eq!(QualityLevel::from_percent(70), QualityLevel::L3);
        assert_eq!(QualityLevel::from_percent(69), QualityLevel::L4);
        assert_eq!(QualityLevel::from_percent(0), QualityLevel::L4);
    }

    #[test]
    fn test_sampling_follows_format() {
        for fourcc in [FourCC::NV12, FourCC::NV21, FourCC::NV12T, FourCC::YUV420] {
            assert_eq!(Sampling::for_format(fourcc), Sampling::Yuv420, "{fourcc}");
        }
        for fourcc in [FourCC::YUYV, FourCC::UYVY, FourCC::YUV422P, FourCC::RGB565] {
            assert_eq!(Sampling::for_format(fourcc), Sampling::Yuv422, "{fourcc}");
        }
    }

    #[test]
    fn test_grey_pixel_converts_to_grey() {
        let [r, g, b] = yuv_to_rgb(126, 128, 128);
        assert_eq!(r, g);
        assert_eq!(g, b);
        assert_eq!(yuv_to_rgb(16, 128, 128), [0, 0, 0]);
        assert_eq!(yuv_to_rgb(235, 128, 128), [255, 255, 255]);
    }

    #[test]
    fn test_encode_yuyv_produces_jpeg() {
        let pixels = [128u8, 128].repeat(16 * 8);
        let jpeg = SoftwareJpegEncoder
            .encode(&request(&pixels, FourCC::YUYV, 16, 8))
            .expect("encode");
        assert_eq!(jpeg.get(..2), Some(&[0xFF, 0xD8][..]));
        assert_eq!(jpeg.get(jpeg.len() - 2..), Some(&[0xFF, 0xD9][..]));
    }

    #[test]
    fn test_encode_nv21_with_exif_segment() {
        let pixels = vec![100u8; 16 * 16 * 3 / 2];
        let app1 = b"Exif\0\0MM\0*";
        let mut req = request(&pixels, FourCC::NV21, 16, 16);
        req.exif = Some(app1);

        let jpeg = SoftwareJpegEncoder.encode(&req).expect("encode");
        assert_eq!(jpeg.get(..4), Some(&[0xFF, 0xD8, 0xFF, 0xE1][..]));
        assert_eq!(jpeg.get(4..6), Some(&[0x00, 12][..]));
        assert_eq!(jpeg.get(6..16), Some(&app1[..]));
    }

    #[test]
    fn test_short_input_is_rejected() {
        let pixels = vec![0u8; 10];
        let result = SoftwareJpegEncoder.encode(&request(&pixels, FourCC::NV12, 16, 16));
        assert!(matches!(result, Err(CameraError::Encode(_))));
    }

    #[test]
    fn test_tiled_layout_is_not_supported() {
        let pixels = vec![0u8; FourCC::NV12T.frame_size(16, 16)];
        let result = SoftwareJpegEncoder.encode(&request(&pixels, FourCC::NV12T, 16, 16));
        assert!(matches!(
            result,
            Err(CameraError::FormatNotSupported(FourCC::NV12T))
        ));
    }

    #[test]
    fn test_supports_matches_converters() {
        let encoder = SoftwareJpegEncoder;
        assert!(encoder.supports(FourCC::YUYV));
        assert!(encoder.supports(FourCC::NV21));
        assert!(encoder.supports(FourCC::YUV422P));
        assert!(!encoder.supports(FourCC::JPEG));
        assert!(!encoder.supports(FourCC::NV12T));
        assert!(!encoder.supports(FourCC::RGB565));
    }
}
