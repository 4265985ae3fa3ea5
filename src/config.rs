//! Session configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Buffers requested for preview and recording streams.
pub const MAX_BUFFERS: u32 = 8;

/// Device paths, pool size and timing for a [`crate::CameraSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Preview and still capture node.
    pub capture_device: PathBuf,
    /// Recording node.
    pub record_device: PathBuf,
    /// Buffers requested for preview and recording.
    pub max_buffers: u32,
    /// Bound on every steady-state frame wait.
    pub frame_timeout: Duration,
    /// Bound on the first preview frame after stream-on.
    pub first_frame_timeout: Duration,
    /// Polls of the first auto focus search before giving up.
    pub af_search_count: u32,
    /// Delay between auto focus polls.
    pub af_poll_interval: Duration,
    /// Check sensor health every this many preview frames.
    pub esd_check_interval: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capture_device: PathBuf::from("/dev/video0"),
            record_device: PathBuf::from("/dev/video2"),
            max_buffers: MAX_BUFFERS,
            frame_timeout: Duration::from_secs(1),
            first_frame_timeout: Duration::from_secs(10),
            af_search_count: 80,
            af_poll_interval: Duration::from_millis(50),
            esd_check_interval: None,
        }
    }
}

impl SessionConfig {
    /// Use `path` for preview and still capture.
    #[must_use]
    pub fn with_capture_device<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.capture_device = path.into();
        self
    }

    /// Use `path` for recording.
    #[must_use]
    pub fn with_record_device<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.record_device = path.into();
        self
    }

    /// Request `count` buffers per stream.
    #[must_use]
    pub const fn with_max_buffers(mut self, count: u32) -> Self {
        self.max_buffers = count;
        self
    }

    /// Bound steady-state frame waits.
    #[must_use]
    pub const fn with_frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = timeout;
        self
    }

    /// Bound the first preview frame wait.
    #[must_use]
    pub const fn with_first_frame_timeout(mut self, timeout: Duration) -> Self {
        self.first_frame_timeout = timeout;
        self
    }

    /// Auto focus polling budget.
    #[must_use]
    pub const fn with_autofocus_polling(mut self, count: u32, interval: Duration) -> Self {
        self.af_search_count = count;
        self.af_poll_interval = interval;
        self
    }

    /// Check sensor health every `frames` preview frames.
    #[must_use]
    pub const fn with_esd_check_interval(mut self, frames: u32) -> Self {
        self.esd_check_interval = Some(frames);
        self
    }
}
