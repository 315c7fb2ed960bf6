// Synchronization primitives
//
// One set per frame in flight: the fence lets the CPU wait for the frame's
// previous submission, the semaphores order acquire -> render -> present.

use ash::vk;
use anyhow::{Context, Result};
use super::VulkanDevice;

pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &VulkanDevice) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Signalled so the first wait on each slot returns immediately
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        // Null handles are ignored by destroy if a later step fails
        let mut sync = Self {
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight_fence: vk::Fence::null(),
        };

        let result = (|| -> Result<(), vk::Result> {
            unsafe {
                sync.image_available = device.device.create_semaphore(&semaphore_info, None)?;
                sync.render_finished = device.device.create_semaphore(&semaphore_info, None)?;
                sync.in_flight_fence = device.device.create_fence(&fence_info, None)?;
            }
            Ok(())
        })();

        if let Err(e) = result {
            sync.destroy(&device.device);
            return Err(e).context("Failed to create frame synchronization objects");
        }

        Ok(sync)
    }

    /// One set for each frame in flight
    pub fn per_frame(device: &VulkanDevice, frames: usize) -> Result<Vec<Self>> {
        let mut all = Vec::with_capacity(frames);
        for _ in 0..frames {
            match Self::new(device) {
                Ok(sync) => all.push(sync),
                Err(e) => {
                    all.iter().for_each(|s| s.destroy(&device.device));
                    return Err(e);
                }
            }
        }
        Ok(all)
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_fence(self.in_flight_fence, None);
        }
    }
}
