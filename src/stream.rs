//! Streaming controller: one device node, its buffer pool and its
//! `Idle -> Streaming -> Idle` state.

use std::time::Duration;

use log::{debug, error};

use crate::buffer::{BufferPool, BufferSlot};
use crate::controls::ControlId;
use crate::traits::{CameraError, Result, VideoNode};

/// Whether a channel is delivering frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    /// Not streaming.
    #[default]
    Idle,
    /// Streaming; every pool buffer has been handed to the driver once.
    Streaming,
}

/// A device node together with the buffers it streams into.
pub struct Channel<N: VideoNode> {
    // Declared before `node` so buffers are unmapped before the node closes.
    pool: Option<BufferPool<N::Mapping>>,
    node: N,
    state: StreamState,
    name: &'static str,
}

impl<N: VideoNode> Channel<N> {
    /// Wrap an open node. `name` labels log lines and errors.
    pub const fn new(name: &'static str, node: N) -> Self {
        Self {
            pool: None,
            node,
            state: StreamState::Idle,
            name,
        }
    }

    /// The underlying node.
    pub const fn node(&self) -> &N {
        &self.node
    }

    /// The underlying node, mutably.
    pub fn node_mut(&mut self) -> &mut N {
        &mut self.node
    }

    /// Current state.
    pub const fn state(&self) -> StreamState {
        self.state
    }

    /// Whether the channel is streaming.
    pub fn is_streaming(&self) -> bool {
        self.state == StreamState::Streaming
    }

    /// The current pool, if one is allocated.
    pub const fn pool(&self) -> Option<&BufferPool<N::Mapping>> {
        self.pool.as_ref()
    }

    /// Replace the pool with `count` freshly mapped buffers. Returns the
    /// number granted.
    pub fn allocate(&mut self, count: u32) -> Result<usize> {
        self.pool = None;
        let pool = BufferPool::allocate(&mut self.node, count)?;
        let granted = pool.len();
        debug!("{}: pool of {granted} buffers", self.name);
        self.pool = Some(pool);
        Ok(granted)
    }

    /// Unmap and forget the pool.
    pub fn release_pool(&mut self) {
        if self.pool.take().is_some() {
            debug!("{}: pool released", self.name);
        }
    }

    /// Queue every pool buffer, run `before_stream_on`, then enable streaming.
    ///
    /// Returns `false` without touching the driver when already streaming.
    pub fn start<F>(&mut self, before_stream_on: F) -> Result<bool>
    where
        F: FnOnce(&mut N) -> Result<()>,
    {
        if self.is_streaming() {
            debug!("{}: already streaming", self.name);
            return Ok(false);
        }
        let count = self.pool.as_ref().map_or(0, BufferPool::len) as u32;
        if count == 0 {
            return Err(CameraError::NotInitialized);
        }
        for index in 0..count {
            self.node.queue_buffer(index)?;
        }
        before_stream_on(&mut self.node)?;
        self.node.stream_on()?;
        self.state = StreamState::Streaming;
        debug!("{}: streaming with {count} buffers queued", self.name);
        Ok(true)
    }

    /// Disable streaming. A no-op while idle.
    pub fn stop(&mut self) -> Result<()> {
        if !self.is_streaming() {
            return Ok(());
        }
        self.node.stream_off()?;
        self.state = StreamState::Idle;
        debug!("{}: stopped", self.name);
        Ok(())
    }

    /// Block until the driver signals a frame, failing after `timeout`.
    pub fn wait_frame(&self, timeout: Duration) -> Result<()> {
        if self.node.wait_readable(timeout)? {
            Ok(())
        } else {
            error!("{}: no frame within {timeout:?}", self.name);
            Err(CameraError::WaitTimeout(timeout))
        }
    }

    /// Wait for and dequeue the next filled buffer. The index is checked
    /// against the pool before it is returned.
    pub fn next_index(&mut self, timeout: Duration) -> Result<u32> {
        if !self.is_streaming() {
            return Err(CameraError::NotStreaming(self.name));
        }
        self.wait_frame(timeout)?;
        let index = self.node.dequeue_buffer()?;
        self.slot(index)?;
        Ok(index)
    }

    /// Hand buffer `index` back to the driver.
    pub fn requeue(&mut self, index: u32) -> Result<()> {
        self.slot(index)?;
        self.node.queue_buffer(index)
    }

    /// Slot for `index`.
    pub fn slot(&self, index: u32) -> Result<&BufferSlot<N::Mapping>> {
        match &self.pool {
            Some(pool) => pool.slot(index),
            None => Err(CameraError::BufferIndex {
                index,
                pool_size: 0,
            }),
        }
    }

    /// Fire the still-capture trigger.
    ///
    /// This sensor generation only latches a frame after both the legacy
    /// and the camera-class trigger have been written, in that order.
    pub fn trigger_capture(&mut self) -> Result<()> {
        self.node.set_control(ControlId::CAPTURE_LEGACY, 0)?;
        self.node.set_control(ControlId::CAPTURE, 0)?;
        Ok(())
    }
}
