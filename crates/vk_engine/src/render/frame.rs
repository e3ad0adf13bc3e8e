//! Frame slot ring
//!
//! Two frame slots rotate by frame counter. While the CPU records frame `k + 1`
//! into one slot the GPU may still be executing frame `k` from the other; the
//! slot's fence is what separates the two. A slot is only re-recorded after its
//! fence has been observed signaled, and that rule is enforced by the state
//! machine on [`FrameSlot`]:
//!
//! ```text
//! Idle --begin_recording--> Recording --mark_submitted--> Submitted
//!  ^                                                          |
//!  +------------------ wait_until_idle (fence) ---------------+
//! ```
//!
//! Slot objects are created once at startup. Their teardown is registered on
//! the deletion queue so it runs after the final fence wait.

use ash::vk;

use crate::render::deletion_queue::DeletionQueue;
use crate::render::device::GpuDevice;
use crate::render::{VulkanError, VulkanResult};

/// Number of frames that may be in flight at once
pub const FRAME_OVERLAP: usize = 2;

/// Slot index used for a frame counter
pub const fn current_slot(frame_number: u64) -> usize {
    (frame_number % FRAME_OVERLAP as u64) as usize
}

/// Where a slot is in its reuse cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// No outstanding GPU work; free for recording
    Idle,
    /// CPU is recording the command buffer
    Recording,
    /// Submitted; the GPU may still be reading the slot's resources
    Submitted,
}

/// Synchronization and recording resources of one in-flight frame
#[derive(Debug)]
pub struct FrameSlot {
    /// Signaled when the GPU finishes this slot's submission; created signaled
    pub render_fence: vk::Fence,
    /// Signaled by image acquisition, waited by the submission
    pub image_acquired: vk::Semaphore,
    /// Signaled by the submission, waited by presentation
    pub render_complete: vk::Semaphore,
    /// Pool owning `command_buffer`
    pub command_pool: vk::CommandPool,
    /// Primary command buffer re-recorded every use of the slot
    pub command_buffer: vk::CommandBuffer,
    state: SlotState,
}

impl FrameSlot {
    /// Create the slot's objects and register their teardown
    pub fn new<D: GpuDevice + 'static>(device: &D, deletion_queue: &mut DeletionQueue<D>) -> VulkanResult<Self> {
        let command_pool = device.create_command_pool()?;
        deletion_queue.push(move |d: &D| d.destroy_command_pool(command_pool));
        let command_buffer = device.allocate_command_buffer(command_pool)?;

        let render_fence = device.create_fence(true)?;
        deletion_queue.push(move |d: &D| d.destroy_fence(render_fence));

        let image_acquired = device.create_semaphore()?;
        let render_complete = device.create_semaphore()?;
        deletion_queue.push(move |d: &D| {
            d.destroy_semaphore(image_acquired);
            d.destroy_semaphore(render_complete);
        });

        Ok(Self {
            render_fence,
            image_acquired,
            render_complete,
            command_pool,
            command_buffer,
            state: SlotState::Idle,
        })
    }

    /// Current state
    pub fn state(&self) -> SlotState {
        self.state
    }

    /// Wait on the slot fence, mark the slot idle and re-arm the fence
    ///
    /// A fresh slot is `Idle` but its fence starts signaled, so the first wait
    /// returns immediately.
    pub fn wait_until_idle<D: GpuDevice>(&mut self, device: &D, timeout_ns: u64) -> VulkanResult<()> {
        if self.state == SlotState::Recording {
            return Err(VulkanError::InvalidOperation {
                reason: "Frame slot waited while still recording".to_string(),
            });
        }
        device.wait_for_fence(self.render_fence, timeout_ns)?;
        self.state = SlotState::Idle;
        device.reset_fence(self.render_fence)
    }

    /// Reset the command buffer and begin recording into it
    pub fn begin_recording<D: GpuDevice>(&mut self, device: &D) -> VulkanResult<vk::CommandBuffer> {
        if self.state != SlotState::Idle {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Frame slot cannot record from {:?}", self.state),
            });
        }
        device.reset_command_buffer(self.command_buffer)?;
        device.begin_command_buffer(self.command_buffer)?;
        self.state = SlotState::Recording;
        Ok(self.command_buffer)
    }

    /// Record that the command buffer has been handed to the queue
    pub fn mark_submitted(&mut self) -> VulkanResult<()> {
        if self.state != SlotState::Recording {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Frame slot cannot submit from {:?}", self.state),
            });
        }
        self.state = SlotState::Submitted;
        Ok(())
    }
}

/// Fixed ring of [`FRAME_OVERLAP`] slots
#[derive(Debug)]
pub struct FrameRing {
    slots: [FrameSlot; FRAME_OVERLAP],
}

impl FrameRing {
    /// Create every slot up front
    pub fn new<D: GpuDevice + 'static>(device: &D, deletion_queue: &mut DeletionQueue<D>) -> VulkanResult<Self> {
        let slots = [
            FrameSlot::new(device, deletion_queue)?,
            FrameSlot::new(device, deletion_queue)?,
        ];
        log::debug!("Created {} frame slots", FRAME_OVERLAP);
        Ok(Self { slots })
    }

    /// Slot owned by `frame_number`
    pub fn slot_mut(&mut self, frame_number: u64) -> &mut FrameSlot {
        &mut self.slots[current_slot(frame_number)]
    }

    /// All slots
    pub fn slots(&self) -> &[FrameSlot] {
        &self.slots
    }

    /// Fences of every slot that may still have GPU work outstanding
    pub fn pending_fences(&self) -> impl Iterator<Item = vk::Fence> + '_ {
        self.slots
            .iter()
            .filter(|slot| slot.state == SlotState::Submitted)
            .map(|slot| slot.render_fence)
    }

    /// Mark every slot idle once the caller has waited on their fences
    pub fn mark_all_idle(&mut self) {
        for slot in &mut self.slots {
            slot.state = SlotState::Idle;
        }
    }
}
