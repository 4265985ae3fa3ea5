//! Kernel capture buffers mapped into the process.

use log::debug;

use crate::traits::{BufferMapping, CameraError, Result, VideoNode};

/// One mapped capture buffer. Its index is the kernel's buffer index.
pub struct BufferSlot<M> {
    index: u32,
    mapping: M,
}

impl<M: BufferMapping> BufferSlot<M> {
    /// Kernel buffer index.
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Process address of the first byte.
    pub fn base_address(&self) -> usize {
        self.mapping.base_address()
    }

    /// Mapped length in bytes.
    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    /// Whether the mapping is empty.
    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// The mapped bytes.
    pub fn as_slice(&self) -> &[u8] {
        self.mapping.as_slice()
    }
}

/// The set of buffers granted for one stream.
///
/// Slots are created in index order and never reassigned. Dropping the pool
/// unmaps every slot; a pool that failed halfway through allocation unmaps
/// the slots it had already mapped before the error is returned.
pub struct BufferPool<M> {
    slots: Vec<BufferSlot<M>>,
}

impl<M: BufferMapping> BufferPool<M> {
    /// Request `count` buffers from `node` and map each one granted.
    ///
    /// The driver may grant fewer than requested; the pool holds exactly the
    /// granted number.
    pub fn allocate<N>(node: &mut N, count: u32) -> Result<Self>
    where
        N: VideoNode<Mapping = M>,
    {
        let granted = node.request_buffers(count)?;
        if granted == 0 {
            return Err(CameraError::io(
                "VIDIOC_REQBUFS",
                std::io::Error::other("driver granted no buffers"),
            ));
        }

        let mut slots = Vec::with_capacity(granted as usize);
        for index in 0..granted {
            let info = node.query_buffer(index)?;
            let mapping = node.map_buffer(&info)?;
            debug!(
                "mapped buffer {index}: {} bytes at offset {:#x}",
                info.length, info.offset
            );
            slots.push(BufferSlot { index, mapping });
        }

        Ok(Self { slots })
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the pool has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot for a driver-reported index, rejecting anything outside the pool.
    pub fn slot(&self, index: u32) -> Result<&BufferSlot<M>> {
        self.slots
            .get(index as usize)
            .ok_or(CameraError::BufferIndex {
                index,
                pool_size: self.slots.len(),
            })
    }

    /// All slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = &BufferSlot<M>> {
        self.slots.iter()
    }
}
