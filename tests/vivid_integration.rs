//! Integration tests using the vivid virtual camera.
//!
//! These tests require:
//! - The `integration` feature flag: `cargo test --features integration`
//! - The vivid kernel module loaded: `sudo modprobe vivid n_devs=1`
//! - Access to /dev/video* devices (may require sudo or video group membership)
//!
//! vivid implements only the standard V4L2 requests, so these tests drive
//! the node and streaming layers directly. The session's private sensor
//! controls need real hardware.

#![cfg(feature = "integration")]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sec_camera::buffer::BufferPool;
use sec_camera::stream::Channel;
use sec_camera::traits::VideoNode;
use sec_camera::{CameraError, Format, FourCC, V4L2Node};
use serial_test::serial;

const TIMEOUT: Duration = Duration::from_secs(2);

/// Paths of all vivid nodes, found through sysfs before anything is opened.
fn find_vivid_devices() -> Vec<PathBuf> {
    let video4linux = Path::new("/sys/class/video4linux");
    let mut devices = Vec::new();
    for index in 0..16 {
        let name_path = video4linux.join(format!("video{index}")).join("name");
        let Ok(name) = fs::read_to_string(&name_path) else {
            continue;
        };
        if !name.to_lowercase().contains("vivid") {
            continue;
        }
        let path = PathBuf::from(format!("/dev/video{index}"));
        if V4L2Node::open(&path).is_ok() {
            devices.push(path);
        }
    }
    devices
}

/// Fail, not skip, when vivid is missing so CI notices.
macro_rules! require_vivid {
    () => {
        match find_vivid_devices().into_iter().next() {
            Some(path) => path,
            None => panic!(
                "vivid virtual camera not available.\n\
                 Load vivid with: sudo modprobe vivid n_devs=1\n\
                 Or run unit tests only: cargo test --lib"
            ),
        }
    };
}

fn yuyv_channel(path: &Path) -> Channel<V4L2Node> {
    let mut node = V4L2Node::open(path).expect("Failed to open vivid device");
    node.select_input(0).expect("Failed to select input");
    let actual = node
        .set_format(&Format::new(640, 480, FourCC::YUYV))
        .expect("Failed to set format");
    assert_eq!((actual.width, actual.height), (640, 480));
    Channel::new("vivid", node)
}

#[test]
#[serial]
fn test_vivid_capabilities() {
    let path = require_vivid!();
    let node = V4L2Node::open(&path).expect("Failed to open vivid device");
    assert_eq!(node.path(), path);
    let caps = node.capabilities().expect("VIDIOC_QUERYCAP");

    assert!(caps.driver.contains("vivid"), "Expected vivid driver");
    assert!(caps.can_capture, "vivid should support capture");
    assert!(caps.can_stream, "vivid should support streaming");
    assert!(!node.input_name(0).expect("VIDIOC_ENUMINPUT").is_empty());
}

#[test]
#[serial]
fn test_vivid_format_negotiation() {
    let path = require_vivid!();
    let mut node = V4L2Node::open(&path).expect("Failed to open vivid device");

    assert!(node.supports_format(FourCC::YUYV).expect("VIDIOC_ENUM_FMT"));
    assert!(!node.supports_format(FourCC::NV12T).expect("VIDIOC_ENUM_FMT"));

    let actual = node
        .set_format(&Format::new(640, 480, FourCC::YUYV))
        .expect("Failed to set format");
    assert_eq!(actual.fourcc, FourCC::YUYV);
    assert_eq!(actual.stride, 640 * 2);
}

#[test]
#[serial]
fn test_vivid_pool_maps_every_buffer() {
    let path = require_vivid!();
    let mut node = V4L2Node::open(&path).expect("Failed to open vivid device");
    node.set_format(&Format::new(640, 480, FourCC::YUYV))
        .expect("Failed to set format");

    let pool = BufferPool::allocate(&mut node, 4).expect("Failed to allocate pool");
    assert!(!pool.is_empty());
    for slot in pool.iter() {
        assert!(slot.len() >= 640 * 480 * 2, "buffer {} too small", slot.index());
        assert_ne!(slot.base_address(), 0);
    }
}

#[test]
#[serial]
fn test_vivid_stream_keeps_ring_full() {
    let path = require_vivid!();
    let mut channel = yuyv_channel(&path);
    let granted = channel.allocate(4).expect("Failed to allocate");
    assert!(channel.start(|_| Ok(())).expect("Failed to start"));

    for _ in 0..(granted * 3) {
        let index = channel.next_index(TIMEOUT).expect("Failed to dequeue");
        let slot = channel.slot(index).expect("slot");
        assert!(slot.as_slice().iter().any(|&b| b != 0), "empty frame");
        channel.requeue(index).expect("Failed to requeue");
    }

    channel.stop().expect("Failed to stop");
    assert!(!channel.is_streaming());
    assert!(matches!(
        channel.next_index(TIMEOUT),
        Err(CameraError::NotStreaming("vivid"))
    ));
}

#[test]
#[serial]
fn test_vivid_restart_after_release() {
    let path = require_vivid!();
    let mut channel = yuyv_channel(&path);

    for _ in 0..2 {
        channel.allocate(4).expect("Failed to allocate");
        channel.start(|_| Ok(())).expect("Failed to start");
        let index = channel.next_index(TIMEOUT).expect("Failed to dequeue");
        channel.requeue(index).expect("Failed to requeue");
        channel.stop().expect("Failed to stop");
        channel.release_pool();
    }
}

#[test]
#[serial]
fn test_vivid_frame_rate() {
    let path = require_vivid!();
    let mut node = V4L2Node::open(&path).expect("Failed to open vivid device");
    node.set_frame_rate(15).expect("VIDIOC_S_PARM");
}
