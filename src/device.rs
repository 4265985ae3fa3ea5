//! V4L2 device implementation using the v4l crate.
//!
//! Capability, format and frame-interval negotiation go through `v4l`'s
//! typed API. The buffer ring, scalar and extended controls and input
//! selection are issued through `v4l::v4l2::ioctl` with the `v4l_sys`
//! structs, because the driver's private controls and the session's own
//! buffer bookkeeping sit below what the `v4l` stream types expose.

#![allow(unsafe_code)]

use std::ffi::c_void;
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::time::Duration;
use std::{io, mem, ptr};

use chrono::{Datelike, NaiveDateTime, Timelike};
use log::{debug, warn};
use v4l::buffer::Type as BufferType;
use v4l::memory::Memory;
use v4l::v4l2::{self, vidioc};
use v4l::v4l_sys::{
    v4l2_buffer, v4l2_control, v4l2_ext_control, v4l2_ext_controls, v4l2_input,
    v4l2_requestbuffers,
};
use v4l::video::Capture;
use v4l::Device;

use crate::controls::ControlId;
use crate::traits::{
    BufferInfo, BufferMapping, CameraError, DeviceCapabilities, DeviceOpener, Format, FourCC,
    Result, VideoNode,
};

/// Issue `request` with `arg` as its argument block.
///
/// # Safety
///
/// `T` must be the type `request` encodes.
unsafe fn ioctl<T>(fd: RawFd, request: vidioc::_IOC_TYPE, arg: &mut T) -> io::Result<()> {
    // SAFETY: upheld by the caller.
    unsafe { v4l2::ioctl(fd, request, (arg as *mut T).cast::<c_void>()) }
}

fn buffer_desc(index: u32) -> v4l2_buffer {
    v4l2_buffer {
        index,
        type_: BufferType::VideoCapture as u32,
        memory: Memory::Mmap as u32,
        // SAFETY: all-zero is a valid bit pattern for this plain C struct.
        ..unsafe { mem::zeroed() }
    }
}

/// A kernel capture buffer mapped shared, read/write. Unmapped on drop.
pub struct MmapRegion {
    ptr: NonNull<u8>,
    len: usize,
}

impl BufferMapping for MmapRegion {
    fn as_slice(&self) -> &[u8] {
        // SAFETY: `ptr` is a live mapping of `len` bytes until drop.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for MmapRegion {
    fn drop(&mut self) {
        // SAFETY: the region was returned by a successful mmap of `len` bytes
        // and is unmapped exactly once.
        if let Err(err) = unsafe { v4l2::munmap(self.ptr.as_ptr().cast(), self.len) } {
            warn!("munmap of {} bytes failed: {err}", self.len);
        }
    }
}

/// An open V4L2 capture node.
pub struct V4L2Node {
    device: Device,
    path: PathBuf,
}

impl V4L2Node {
    /// Open the node at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let device = Device::with_path(path).map_err(|source| CameraError::DeviceOpen {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("opened {}", path.display());
        Ok(Self {
            device,
            path: path.to_path_buf(),
        })
    }

    /// Path this node was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fd(&self) -> RawFd {
        self.device.handle().fd()
    }

    fn to_format(fmt: &v4l::Format) -> Format {
        Format {
            width: fmt.width,
            height: fmt.height,
            fourcc: FourCC::from(fmt.fourcc),
            stride: fmt.stride,
            size: fmt.size,
        }
    }
}

impl VideoNode for V4L2Node {
    type Mapping = MmapRegion;

    fn capabilities(&self) -> Result<DeviceCapabilities> {
        let caps = self
            .device
            .query_caps()
            .map_err(|err| CameraError::io("VIDIOC_QUERYCAP", err))?;

        Ok(DeviceCapabilities {
            driver: caps.driver,
            card: caps.card,
            bus_info: caps.bus,
            can_capture: caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE),
            can_stream: caps.capabilities.contains(v4l::capability::Flags::STREAMING),
        })
    }

    fn input_name(&self, index: u32) -> Result<String> {
        let mut input = v4l2_input {
            index,
            // SAFETY: all-zero is a valid bit pattern for this plain C struct.
            ..unsafe { mem::zeroed() }
        };
        // SAFETY: VIDIOC_ENUMINPUT takes a `v4l2_input`.
        unsafe { ioctl(self.fd(), vidioc::VIDIOC_ENUMINPUT, &mut input) }
            .map_err(|err| CameraError::io("VIDIOC_ENUMINPUT", err))?;

        let end = input.name.iter().position(|&b| b == 0).unwrap_or(input.name.len());
        Ok(String::from_utf8_lossy(input.name.get(..end).unwrap_or_default()).into_owned())
    }

    fn select_input(&mut self, index: u32) -> Result<()> {
        let mut value = index as std::os::raw::c_int;
        // SAFETY: VIDIOC_S_INPUT takes an int.
        unsafe { ioctl(self.fd(), vidioc::VIDIOC_S_INPUT, &mut value) }
            .map_err(|_| CameraError::InputSelect(index))
    }

    fn supports_format(&self, fourcc: FourCC) -> Result<bool> {
        let formats = self
            .device
            .enum_formats()
            .map_err(|err| CameraError::io("VIDIOC_ENUM_FMT", err))?;
        Ok(formats
            .iter()
            .any(|desc| FourCC::from(desc.fourcc) == fourcc))
    }

    fn set_format(&mut self, format: &Format) -> Result<Format> {
        let mut fmt = self
            .device
            .format()
            .map_err(|err| CameraError::io("VIDIOC_G_FMT", err))?;

        fmt.width = format.width;
        fmt.height = format.height;
        fmt.fourcc = format.fourcc.into();
        if format.size != 0 {
            fmt.size = format.size;
        }

        let fmt = self
            .device
            .set_format(&fmt)
            .map_err(|err| CameraError::io("VIDIOC_S_FMT", err))?;

        Ok(Self::to_format(&fmt))
    }

    fn set_frame_rate(&mut self, fps: u32) -> Result<()> {
        let params = v4l::video::capture::Parameters::with_fps(fps);
        self.device
            .set_params(&params)
            .map(|_| ())
            .map_err(|err| CameraError::io("VIDIOC_S_PARM", err))
    }

    fn control(&self, id: ControlId) -> Result<i32> {
        let mut ctrl = v4l2_control { id: id.0, value: 0 };
        // SAFETY: VIDIOC_G_CTRL takes a `v4l2_control`.
        unsafe { ioctl(self.fd(), vidioc::VIDIOC_G_CTRL, &mut ctrl) }
            .map_err(|err| CameraError::io("VIDIOC_G_CTRL", err))?;
        Ok(ctrl.value)
    }

    fn set_control(&mut self, id: ControlId, value: i32) -> Result<i32> {
        let mut ctrl = v4l2_control { id: id.0, value };
        // SAFETY: VIDIOC_S_CTRL takes a `v4l2_control`.
        unsafe { ioctl(self.fd(), vidioc::VIDIOC_S_CTRL, &mut ctrl) }
            .map_err(|err| CameraError::io("VIDIOC_S_CTRL", err))?;
        Ok(ctrl.value)
    }

    fn set_time_control(&mut self, id: ControlId, time: &NaiveDateTime) -> Result<()> {
        // SAFETY: all-zero is valid for `tm` (null zone pointer included).
        let mut tm: libc::tm = unsafe { mem::zeroed() };
        tm.tm_sec = time.second() as libc::c_int;
        tm.tm_min = time.minute() as libc::c_int;
        tm.tm_hour = time.hour() as libc::c_int;
        tm.tm_mday = time.day() as libc::c_int;
        tm.tm_mon = time.month0() as libc::c_int;
        tm.tm_year = time.year() - 1900;
        tm.tm_wday = time.weekday().num_days_from_sunday() as libc::c_int;
        tm.tm_yday = time.ordinal0() as libc::c_int;

        let mut ctrl = v4l2_ext_control {
            id: id.0,
            size: mem::size_of::<libc::tm>() as u32,
            // SAFETY: all-zero is a valid bit pattern for this plain C struct.
            ..unsafe { mem::zeroed() }
        };
        ctrl.__bindgen_anon_1.ptr = ptr::addr_of_mut!(tm).cast();

        // The class is left at zero (current value), which the kernel
        // resolves per control id.
        let mut ctrls = v4l2_ext_controls {
            count: 1,
            controls: ptr::addr_of_mut!(ctrl),
            // SAFETY: all-zero is a valid bit pattern for this plain C struct.
            ..unsafe { mem::zeroed() }
        };
        // SAFETY: one control whose `tm` payload outlives the call.
        unsafe { ioctl(self.fd(), vidioc::VIDIOC_S_EXT_CTRLS, &mut ctrls) }
            .map_err(|err| CameraError::io("VIDIOC_S_EXT_CTRLS", err))
    }

    fn request_buffers(&mut self, count: u32) -> Result<u32> {
        let mut req = v4l2_requestbuffers {
            count,
            type_: BufferType::VideoCapture as u32,
            memory: Memory::Mmap as u32,
            // SAFETY: all-zero is a valid bit pattern for this plain C struct.
            ..unsafe { mem::zeroed() }
        };
        // SAFETY: VIDIOC_REQBUFS takes a `v4l2_requestbuffers`.
        unsafe { ioctl(self.fd(), vidioc::VIDIOC_REQBUFS, &mut req) }
            .map_err(|err| CameraError::io("VIDIOC_REQBUFS", err))?;
        debug!("requested {count} buffers, granted {}", req.count);
        Ok(req.count)
    }

    fn query_buffer(&self, index: u32) -> Result<BufferInfo> {
        let mut buf = buffer_desc(index);
        // SAFETY: VIDIOC_QUERYBUF takes a `v4l2_buffer`.
        unsafe { ioctl(self.fd(), vidioc::VIDIOC_QUERYBUF, &mut buf) }
            .map_err(|err| CameraError::io("VIDIOC_QUERYBUF", err))?;
        Ok(BufferInfo {
            index,
            length: buf.length,
            // SAFETY: mmap buffers report their location through `offset`.
            offset: unsafe { buf.m.offset },
        })
    }

    fn map_buffer(&mut self, info: &BufferInfo) -> Result<MmapRegion> {
        let len = info.length as usize;
        // SAFETY: maps a driver-provided buffer; failure is reported by the wrapper.
        let mapped = unsafe {
            v4l2::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.fd(),
                info.offset as libc::off_t,
            )
        }
        .map_err(|source| CameraError::BufferMap {
            index: info.index,
            source,
        })?;
        let ptr = NonNull::new(mapped.cast::<u8>()).ok_or_else(|| CameraError::BufferMap {
            index: info.index,
            source: io::Error::other("mmap returned null"),
        })?;
        Ok(MmapRegion { ptr, len })
    }

    fn queue_buffer(&mut self, index: u32) -> Result<()> {
        let mut buf = buffer_desc(index);
        // SAFETY: VIDIOC_QBUF takes a `v4l2_buffer`.
        unsafe { ioctl(self.fd(), vidioc::VIDIOC_QBUF, &mut buf) }
            .map_err(|err| CameraError::io("VIDIOC_QBUF", err))
    }

    fn dequeue_buffer(&mut self) -> Result<u32> {
        let mut buf = buffer_desc(0);
        // SAFETY: VIDIOC_DQBUF takes a `v4l2_buffer`.
        unsafe { ioctl(self.fd(), vidioc::VIDIOC_DQBUF, &mut buf) }
            .map_err(|err| CameraError::io("VIDIOC_DQBUF", err))?;
        Ok(buf.index)
    }

    fn stream_on(&mut self) -> Result<()> {
        let mut kind = BufferType::VideoCapture as std::os::raw::c_int;
        // SAFETY: VIDIOC_STREAMON takes the buffer type as an int.
        unsafe { ioctl(self.fd(), vidioc::VIDIOC_STREAMON, &mut kind) }
            .map_err(|err| CameraError::io("VIDIOC_STREAMON", err))
    }

    fn stream_off(&mut self) -> Result<()> {
        let mut kind = BufferType::VideoCapture as std::os::raw::c_int;
        // SAFETY: VIDIOC_STREAMOFF takes the buffer type as an int.
        unsafe { ioctl(self.fd(), vidioc::VIDIOC_STREAMOFF, &mut kind) }
            .map_err(|err| CameraError::io("VIDIOC_STREAMOFF", err))
    }

    fn wait_readable(&self, timeout: Duration) -> Result<bool> {
        let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let ready = self
            .device
            .handle()
            .poll(libc::POLLIN | libc::POLLERR, millis)
            .map_err(|err| CameraError::io("poll", err))?;
        Ok(ready > 0)
    }
}

/// Opens real device nodes.
#[derive(Debug, Default, Clone, Copy)]
pub struct V4L2Opener;

impl DeviceOpener for V4L2Opener {
    type Node = V4L2Node;

    fn open(&mut self, path: &Path) -> Result<V4L2Node> {
        V4L2Node::open(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_numbers_match_kernel_abi() {
        assert_eq!(vidioc::VIDIOC_G_CTRL, 0xC008_561B);
        assert_eq!(vidioc::VIDIOC_S_CTRL, 0xC008_561C);
        assert_eq!(vidioc::VIDIOC_STREAMON, 0x4004_5612);
        assert_eq!(vidioc::VIDIOC_S_INPUT, 0xC004_5627);
    }

    #[test]
    fn test_buffer_desc_targets_mmap_capture() {
        let buf = buffer_desc(3);
        assert_eq!(buf.index, 3);
        assert_eq!(buf.type_, BufferType::VideoCapture as u32);
        assert_eq!(buf.memory, Memory::Mmap as u32);
        assert_eq!(buf.length, 0);
    }

    #[test]
    fn test_open_missing_node_reports_path() {
        let err = V4L2Opener
            .open(Path::new("/dev/does-not-exist-video"))
            .err()
            .expect("open should fail");
        assert!(
            matches!(&err, CameraError::DeviceOpen { path, .. } if path == Path::new("/dev/does-not-exist-video")),
            "unexpected error: {err}"
        );
    }
}
