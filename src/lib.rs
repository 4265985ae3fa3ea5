//! sec-camera: session layer for a two-node V4L2 phone camera.
//!
//! A [`CameraSession`] drives one sensor through a capture node (preview and
//! still capture) and a record node (video). The kernel boundary is the
//! [`traits::VideoNode`] trait, implemented for real hardware by
//! [`V4L2Node`] and by a scripted fake in unit tests.

pub mod buffer;
pub mod config;
pub mod controls;
pub mod device;
pub mod encoder;
pub mod exif;
pub mod properties;
pub mod session;
pub mod settings;
pub mod stream;
pub mod traits;
pub mod validation;

#[cfg(test)]
pub mod mock;

pub use config::SessionConfig;
pub use device::{V4L2Node, V4L2Opener};
pub use encoder::{JpegEncoder, SoftwareJpegEncoder};
pub use exif::{ExifAttributes, ExifWriter};
pub use properties::{PropertyStore, StaticProperties};
pub use session::{AutofocusOutcome, CameraSession, HardwareJpeg, PlaneAddresses};
pub use settings::Attribute;
pub use traits::{CameraError, CameraId, DeviceCapabilities, Format, FourCC, Result};
