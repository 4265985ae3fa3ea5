//! Scripted fake kernel for testing without hardware.
//!
//! A [`MockOpener`] hands out [`MockNode`]s that share one [`MockKernel`].
//! Each node path has its own [`NodeState`]: what the fake driver reports and
//! a log of every request made against it.

use std::cell::{RefCell, RefMut};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use chrono::NaiveDateTime;

use crate::controls::ControlId;
use crate::traits::{
    BufferInfo, BufferMapping, CameraError, DeviceCapabilities, DeviceOpener, Format, FourCC,
    Result, VideoNode,
};

/// One request observed by the fake kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// `VIDIOC_QUERYCAP`.
    QueryCap,
    /// `VIDIOC_ENUMINPUT`.
    EnumInput(u32),
    /// `VIDIOC_S_INPUT`.
    SelectInput(u32),
    /// `VIDIOC_ENUM_FMT` looking for a format.
    EnumFormat(FourCC),
    /// `VIDIOC_S_FMT`.
    SetFormat(u32, u32, FourCC),
    /// `VIDIOC_S_PARM`.
    SetFrameRate(u32),
    /// `VIDIOC_G_CTRL`.
    GetControl(ControlId),
    /// `VIDIOC_S_CTRL`.
    SetControl(ControlId, i32),
    /// `VIDIOC_S_EXT_CTRLS` with a time payload.
    SetTimeControl(ControlId),
    /// `VIDIOC_REQBUFS`.
    RequestBuffers(u32),
    /// `VIDIOC_QUERYBUF`.
    QueryBuffer(u32),
    /// `mmap` of a buffer.
    Map(u32),
    /// `munmap` of a buffer.
    Unmap(u32),
    /// `VIDIOC_QBUF`.
    Queue(u32),
    /// `VIDIOC_DQBUF` and the index handed back.
    Dequeue(u32),
    /// `VIDIOC_STREAMON`.
    StreamOn,
    /// `VIDIOC_STREAMOFF`.
    StreamOff,
    /// `poll`.
    Wait,
}

/// Behaviour and history of one fake device node.
pub struct NodeState {
    /// Reported by `VIDIOC_QUERYCAP`.
    pub capabilities: DeviceCapabilities,
    /// Reported by `VIDIOC_ENUMINPUT`.
    pub input_name: String,
    /// Whether `VIDIOC_S_INPUT` fails.
    pub reject_input: bool,
    /// Formats `VIDIOC_ENUM_FMT` lists.
    pub formats: Vec<FourCC>,
    /// Cap on buffers granted by `VIDIOC_REQBUFS`.
    pub grant_limit: Option<u32>,
    /// Length of every buffer.
    pub buffer_len: u32,
    /// Bytes copied into each buffer when it is mapped.
    pub buffer_contents: Vec<u8>,
    /// Mapping the buffer with this index fails.
    pub fail_map_at: Option<u32>,
    /// Values read by `VIDIOC_G_CTRL` and returned by `VIDIOC_S_CTRL`.
    pub controls: HashMap<ControlId, i32>,
    /// Per-control values handed out in order before falling back to `controls`.
    pub control_script: HashMap<ControlId, VecDeque<i32>>,
    /// Controls whose get and set fail.
    pub fail_controls: HashSet<ControlId>,
    /// Whether `poll` always times out.
    pub stall: bool,
    /// Index the next `VIDIOC_DQBUF` reports regardless of the queue.
    pub bogus_index: Option<u32>,
    /// Buffers currently queued with the driver.
    pub queued: VecDeque<u32>,
    /// Whether the node is streaming.
    pub streaming: bool,
    /// Whether `VIDIOC_STREAMOFF` fails, leaving the node streaming.
    pub fail_stream_off: bool,
    /// Every request in order.
    pub calls: Vec<Call>,
}

impl Default for NodeState {
    fn default() -> Self {
        Self {
            capabilities: DeviceCapabilities {
                driver: "mock".to_owned(),
                card: "Mock Camera".to_owned(),
                bus_info: "mock:0".to_owned(),
                can_capture: true,
                can_stream: true,
            },
            input_name: "MOCK_SENSOR".to_owned(),
            reject_input: false,
            formats: vec![
                FourCC::NV21,
                FourCC::NV12,
                FourCC::NV12T,
                FourCC::YUYV,
                FourCC::UYVY,
                FourCC::JPEG,
            ],
            grant_limit: None,
            buffer_len: 4096,
            buffer_contents: Vec::new(),
            fail_map_at: None,
            controls: HashMap::new(),
            control_script: HashMap::new(),
            fail_controls: HashSet::new(),
            stall: false,
            bogus_index: None,
            queued: VecDeque::new(),
            streaming: false,
            fail_stream_off: false,
            calls: Vec::new(),
        }
    }
}

impl NodeState {
    /// Values written to `id`, in order.
    pub fn writes_to(&self, id: ControlId) -> Vec<i32> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::SetControl(cid, value) if *cid == id => Some(*value),
                _ => None,
            })
            .collect()
    }

    /// Number of recorded calls equal to `call`.
    pub fn count(&self, call: &Call) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }

    /// Position of the first recorded call equal to `call`.
    pub fn position(&self, call: &Call) -> Option<usize> {
        self.calls.iter().position(|c| c == call)
    }

    /// Forget the call history.
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    fn check_control(&self, id: ControlId, op: &'static str) -> Result<()> {
        if self.fail_controls.contains(&id) {
            Err(CameraError::io(op, std::io::Error::from_raw_os_error(libc::EINVAL)))
        } else {
            Ok(())
        }
    }
}

/// The shared fake kernel.
#[derive(Default)]
pub struct MockKernel {
    nodes: HashMap<PathBuf, NodeState>,
    fail_open: HashSet<PathBuf>,
}

impl MockKernel {
    fn node(&mut self, path: &Path) -> &mut NodeState {
        self.nodes.entry(path.to_path_buf()).or_default()
    }
}

/// Opens fake nodes and exposes their state to the test.
#[derive(Default)]
pub struct MockOpener {
    kernel: Rc<RefCell<MockKernel>>,
}

impl MockOpener {
    /// Create an opener with no nodes configured; every path opens.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make opening `path` fail.
    #[must_use]
    pub fn with_open_failure<P: AsRef<Path>>(self, path: P) -> Self {
        self.kernel
            .borrow_mut()
            .fail_open
            .insert(path.as_ref().to_path_buf());
        self
    }

    /// Configure the node at `path` before it is opened.
    #[must_use]
    pub fn with_node<P, F>(self, path: P, configure: F) -> Self
    where
        P: AsRef<Path>,
        F: FnOnce(&mut NodeState),
    {
        configure(self.kernel.borrow_mut().node(path.as_ref()));
        self
    }

    /// Inspect or reconfigure the node at `path`.
    pub fn node<P: AsRef<Path>>(&self, path: P) -> RefMut<'_, NodeState> {
        RefMut::map(self.kernel.borrow_mut(), |kernel| kernel.node(path.as_ref()))
    }

    /// A second handle onto the same kernel.
    #[must_use]
    pub fn handle(&self) -> Self {
        Self {
            kernel: Rc::clone(&self.kernel),
        }
    }
}

impl DeviceOpener for MockOpener {
    type Node = MockNode;

    fn open(&mut self, path: &Path) -> Result<MockNode> {
        let mut kernel = self.kernel.borrow_mut();
        if kernel.fail_open.contains(path) {
            return Err(CameraError::DeviceOpen {
                path: path.to_path_buf(),
                source: std::io::Error::from_raw_os_error(libc::ENOENT),
            });
        }
        kernel.node(path);
        Ok(MockNode {
            path: path.to_path_buf(),
            kernel: Rc::clone(&self.kernel),
        })
    }
}

/// A fake open device node.
pub struct MockNode {
    path: PathBuf,
    kernel: Rc<RefCell<MockKernel>>,
}

impl MockNode {
    fn with_state<T, F: FnOnce(&mut NodeState) -> T>(&self, f: F) -> T {
        f(self.kernel.borrow_mut().node(&self.path))
    }
}

/// A fake mapping. Records its unmap when dropped.
pub struct MockMapping {
    index: u32,
    data: Vec<u8>,
    path: PathBuf,
    kernel: Rc<RefCell<MockKernel>>,
}

impl BufferMapping for MockMapping {
    fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for MockMapping {
    fn drop(&mut self) {
        if let Ok(mut kernel) = self.kernel.try_borrow_mut() {
            kernel.node(&self.path).calls.push(Call::Unmap(self.index));
        }
    }
}

impl VideoNode for MockNode {
    type Mapping = MockMapping;

    fn capabilities(&self) -> Result<DeviceCapabilities> {
        self.with_state(|s| {
            s.calls.push(Call::QueryCap);
            Ok(s.capabilities.clone())
        })
    }

    fn input_name(&self, index: u32) -> Result<String> {
        self.with_state(|s| {
            s.calls.push(Call::EnumInput(index));
            Ok(s.input_name.clone())
        })
    }

    fn select_input(&mut self, index: u32) -> Result<()> {
        self.with_state(|s| {
            s.calls.push(Call::SelectInput(index));
            if s.reject_input {
                Err(CameraError::InputSelect(index))
            } else {
                Ok(())
            }
        })
    }

    fn supports_format(&self, fourcc: FourCC) -> Result<bool> {
        self.with_state(|s| {
            s.calls.push(Call::EnumFormat(fourcc));
            Ok(s.formats.contains(&fourcc))
        })
    }

    fn set_format(&mut self, format: &Format) -> Result<Format> {
        self.with_state(|s| {
            s.calls
                .push(Call::SetFormat(format.width, format.height, format.fourcc));
            Ok(format.clone())
        })
    }

    fn set_frame_rate(&mut self, fps: u32) -> Result<()> {
        self.with_state(|s| {
            s.calls.push(Call::SetFrameRate(fps));
            Ok(())
        })
    }

    fn control(&self, id: ControlId) -> Result<i32> {
        self.with_state(|s| {
            s.calls.push(Call::GetControl(id));
            s.check_control(id, "VIDIOC_G_CTRL")?;
            if let Some(value) = s.control_script.get_mut(&id).and_then(VecDeque::pop_front) {
                return Ok(value);
            }
            Ok(s.controls.get(&id).copied().unwrap_or(0))
        })
    }

    fn set_control(&mut self, id: ControlId, value: i32) -> Result<i32> {
        self.with_state(|s| {
            s.calls.push(Call::SetControl(id, value));
            s.check_control(id, "VIDIOC_S_CTRL")?;
            Ok(s.controls.get(&id).copied().unwrap_or(value))
        })
    }

    fn set_time_control(&mut self, id: ControlId, _time: &NaiveDateTime) -> Result<()> {
        self.with_state(|s| {
            s.calls.push(Call::SetTimeControl(id));
            s.check_control(id, "VIDIOC_S_EXT_CTRLS")
        })
    }

    fn request_buffers(&mut self, count: u32) -> Result<u32> {
        self.with_state(|s| {
            s.calls.push(Call::RequestBuffers(count));
            s.queued.clear();
            Ok(s.grant_limit.map_or(count, |limit| count.min(limit)))
        })
    }

    fn query_buffer(&self, index: u32) -> Result<BufferInfo> {
        self.with_state(|s| {
            s.calls.push(Call::QueryBuffer(index));
            Ok(BufferInfo {
                index,
                length: s.buffer_len,
                offset: index * s.buffer_len,
            })
        })
    }

    fn map_buffer(&mut self, info: &BufferInfo) -> Result<MockMapping> {
        let data = self.with_state(|s| {
            if s.fail_map_at == Some(info.index) {
                return Err(CameraError::BufferMap {
                    index: info.index,
                    source: std::io::Error::from_raw_os_error(libc::ENOMEM),
                });
            }
            s.calls.push(Call::Map(info.index));
            let mut data = vec![0u8; info.length as usize];
            let n = s.buffer_contents.len().min(data.len());
            if let (Some(dst), Some(src)) = (data.get_mut(..n), s.buffer_contents.get(..n)) {
                dst.copy_from_slice(src);
            }
            Ok(data)
        })?;
        Ok(MockMapping {
            index: info.index,
            data,
            path: self.path.clone(),
            kernel: Rc::clone(&self.kernel),
        })
    }

    fn queue_buffer(&mut self, index: u32) -> Result<()> {
        self.with_state(|s| {
            s.calls.push(Call::Queue(index));
            s.queued.push_back(index);
            Ok(())
        })
    }

    fn dequeue_buffer(&mut self) -> Result<u32> {
        self.with_state(|s| {
            let index = match s.bogus_index.take() {
                Some(index) => index,
                None => s.queued.pop_front().ok_or_else(|| {
                    CameraError::io(
                        "VIDIOC_DQBUF",
                        std::io::Error::from_raw_os_error(libc::EAGAIN),
                    )
                })?,
            };
            s.calls.push(Call::Dequeue(index));
            Ok(index)
        })
    }

    fn stream_on(&mut self) -> Result<()> {
        self.with_state(|s| {
            s.calls.push(Call::StreamOn);
            s.streaming = true;
            Ok(())
        })
    }

    fn stream_off(&mut self) -> Result<()> {
        self.with_state(|s| {
            s.calls.push(Call::StreamOff);
            if s.fail_stream_off {
                return Err(CameraError::io(
                    "VIDIOC_STREAMOFF",
                    std::io::Error::from_raw_os_error(libc::EIO),
                ));
            }
            s.streaming = false;
            Ok(())
        })
    }

    fn wait_readable(&self, _timeout: Duration) -> Result<bool> {
        self.with_state(|s| {
            s.calls.push(Call::Wait);
            Ok(!s.stall)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_node_defaults() {
        let mut opener = MockOpener::new();
        let node = opener.open(Path::new("/dev/video0")).expect("open should succeed");
        let caps = node.capabilities().expect("querycap should succeed");
        assert_eq!(caps.driver, "mock");
        assert!(caps.can_capture);
        assert!(caps.can_stream);
        assert_eq!(opener.node("/dev/video0").calls, vec![Call::QueryCap]);
    }

    #[test]
    fn test_open_failure() {
        let mut opener = MockOpener::new().with_open_failure("/dev/video2");
        assert!(opener.open(Path::new("/dev/video2")).is_err());
        assert!(opener.open(Path::new("/dev/video0")).is_ok());
    }

    #[test]
    fn test_queue_dequeue_is_fifo() {
        let mut opener = MockOpener::new();
        let mut node = opener.open(Path::new("/dev/video0")).expect("open");
        node.queue_buffer(0).expect("qbuf");
        node.queue_buffer(1).expect("qbuf");
        assert_eq!(node.dequeue_buffer().expect("dqbuf"), 0);
        assert_eq!(node.dequeue_buffer().expect("dqbuf"), 1);
        assert!(node.dequeue_buffer().is_err());
    }

    #[test]
    fn test_control_script_then_fallback() {
        let mut opener = MockOpener::new().with_node("/dev/video0", |s| {
            s.control_script
                .insert(ControlId::ESD_INT, VecDeque::from([3, 4]));
            s.controls.insert(ControlId::ESD_INT, 9);
        });
        let node = opener.open(Path::new("/dev/video0")).expect("open");
        assert_eq!(node.control(ControlId::ESD_INT).expect("g_ctrl"), 3);
        assert_eq!(node.control(ControlId::ESD_INT).expect("g_ctrl"), 4);
        assert_eq!(node.control(ControlId::ESD_INT).expect("g_ctrl"), 9);
    }

    #[test]
    fn test_mapping_records_unmap_on_drop() {
        let mut opener = MockOpener::new().with_node("/dev/video0", |s| {
            s.buffer_contents = vec![0xFF, 0xD8];
        });
        let mut node = opener.open(Path::new("/dev/video0")).expect("open");
        let info = node.query_buffer(0).expect("querybuf");
        let mapping = node.map_buffer(&info).expect("map");
        assert_eq!(mapping.as_slice().get(..2), Some(&[0xFF, 0xD8][..]));
        drop(mapping);
        assert_eq!(opener.node("/dev/video0").count(&Call::Unmap(0)), 1);
    }
}
