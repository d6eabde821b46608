//! Per-frame-in-flight synchronization: the fixed ring of frame slots, the
//! cursor that sequences them, and the acquire/submit/present primitives.

use crate::gfx::swapchain::SwapchainBundle;
use ash::{vk, Device};

/// Presentation status shared by acquire and present. Only `OutOfDate` and
/// `Suboptimal` are ever recovered (by swapchain recreation); anything else
/// surfaces as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Ready,
    Suboptimal,
    OutOfDate,
}

/// Outcome of an image acquire. `OutOfDate` carries no image: the frame
/// must be skipped because no valid extent is known until recreation.
pub enum Acquire {
    Image { index: u32, suboptimal: bool },
    OutOfDate,
}

/// One ring-buffer entry: everything a single in-flight frame owns. The
/// fence starts signaled so the first wait on each slot completes
/// immediately.
pub struct FrameSlot {
    pub acquire_semaphore: vk::Semaphore,
    pub render_done_semaphore: vk::Semaphore,
    pub fence: vk::Fence,
    pub command_buffer: vk::CommandBuffer,
}

impl FrameSlot {
    /// Blocks until the GPU has finished this slot's previous frame. This
    /// is the only CPU-side wait in the loop; it bounds run-ahead to the
    /// frames-in-flight depth.
    pub fn wait(&self, device: &Device) -> Result<(), vk::Result> {
        unsafe { device.wait_for_fences(&[self.fence], true, u64::MAX) }
    }

    /// Requests the next presentable image, signaling this slot's acquire
    /// semaphore when it is available.
    pub fn acquire(&self, swapchain: &SwapchainBundle) -> Result<Acquire, vk::Result> {
        let result = unsafe {
            swapchain.loader.acquire_next_image(
                swapchain.swapchain,
                u64::MAX,
                self.acquire_semaphore,
                vk::Fence::null(),
            )
        };
        match result {
            Ok((index, suboptimal)) => Ok(Acquire::Image { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquire::OutOfDate),
            Err(e) => Err(e),
        }
    }

    /// Submits the recorded command buffer: waits on the acquire semaphore
    /// at color-attachment output, signals the render-done semaphore and
    /// this slot's fence on completion.
    pub fn submit(&self, device: &Device, queue: vk::Queue) -> Result<(), vk::Result> {
        let wait_semaphores = [self.acquire_semaphore];
        let signal_semaphores = [self.render_done_semaphore];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let submit = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(std::slice::from_ref(&self.command_buffer))
            .signal_semaphores(&signal_semaphores);
        unsafe {
            device.reset_fences(&[self.fence])?;
            device.queue_submit(queue, &[submit], self.fence)
        }
    }

    /// Presents the image once rendering has signaled the render-done
    /// semaphore.
    pub fn present(
        &self,
        swapchain: &SwapchainBundle,
        queue: vk::Queue,
        image_index: u32,
    ) -> Result<FrameStatus, vk::Result> {
        let wait_semaphores = [self.render_done_semaphore];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(std::slice::from_ref(&swapchain.swapchain))
            .image_indices(std::slice::from_ref(&image_index));
        match unsafe { swapchain.loader.queue_present(queue, &present_info) } {
            Ok(true) => Ok(FrameStatus::Suboptimal),
            Ok(false) => Ok(FrameStatus::Ready),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR) => {
                Ok(FrameStatus::OutOfDate)
            }
            Err(e) => Err(e),
        }
    }
}

/// Walks the slot ring. Advanced exactly once per loop iteration, whether
/// or not the iteration drew anything, so every slot's fence keeps getting
/// waited on and no slot starves.
pub struct FrameCursor {
    index: usize,
    len: usize,
}

impl FrameCursor {
    pub fn new(len: usize) -> Self {
        Self { index: 0, len }
    }

    pub fn current(&self) -> usize {
        self.index
    }

    pub fn advance(&mut self) {
        self.index = (self.index + 1) % self.len;
    }
}

/// The fixed set of frame slots plus the cursor that sequences them.
pub struct FrameSync {
    pub slots: Vec<FrameSlot>,
    pub cursor: FrameCursor,
}

impl FrameSync {
    pub fn new(
        device: &Device,
        command_pool: vk::CommandPool,
        count: usize,
    ) -> Result<Self, vk::Result> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count as u32);
        let command_buffers = unsafe { device.allocate_command_buffers(&alloc_info)? };

        let semaphore_info = vk::SemaphoreCreateInfo::default();
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);

        let mut slots = Vec::with_capacity(count);
        for command_buffer in command_buffers {
            slots.push(FrameSlot {
                acquire_semaphore: unsafe { device.create_semaphore(&semaphore_info, None)? },
                render_done_semaphore: unsafe { device.create_semaphore(&semaphore_info, None)? },
                fence: unsafe { device.create_fence(&fence_info, None)? },
                command_buffer,
            });
        }

        Ok(Self { cursor: FrameCursor::new(count), slots })
    }

    /// Destroys the sync primitives. Command buffers are reclaimed with
    /// their pool.
    pub unsafe fn destroy(&mut self, device: &Device) {
        unsafe {
            for slot in &self.slots {
                device.destroy_semaphore(slot.acquire_semaphore, None);
                device.destroy_semaphore(slot.render_done_semaphore, None);
                device.destroy_fence(slot.fence, None);
            }
        }
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_is_iteration_count_mod_depth() {
        let n = 2;
        let mut cursor = FrameCursor::new(n);
        for k in 0..10usize {
            assert_eq!(cursor.current(), k % n);
            cursor.advance();
        }
    }

    #[test]
    fn cursor_advances_through_recreation_iterations() {
        // Iterations 2 and 5 stand in for frames that only recreated the
        // swapchain; the cursor must advance for those too.
        let mut cursor = FrameCursor::new(2);
        for _ in 0..7 {
            cursor.advance();
        }
        assert_eq!(cursor.current(), 7 % 2);
    }

    #[test]
    fn cursor_with_depth_three_wraps() {
        let mut cursor = FrameCursor::new(3);
        for _ in 0..4 {
            cursor.advance();
        }
        assert_eq!(cursor.current(), 1);
    }
}
