// Command pool and single-use command buffers
//
// Uploads (buffer copies, layout transitions, mipmap blits) are recorded into
// a throwaway command buffer, submitted, and waited on with queue idle.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;
use super::VulkanDevice;

pub struct CommandPool {
    pub pool: vk::CommandPool,
    device: Arc<VulkanDevice>,
}

impl CommandPool {
    /// Pool on the graphics family; buffers can be reset one by one
    pub fn new(device: Arc<VulkanDevice>) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.graphics_queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .context("Failed to create command pool")?;

        Ok(Self { pool, device })
    }

    /// Allocate primary command buffers
    pub fn allocate(&self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe { self.device.device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate command buffers")
    }

    pub fn begin_single_time(&self) -> Result<vk::CommandBuffer> {
        let command_buffer = self.allocate(1)?[0];

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        if let Err(e) = unsafe {
            self.device
                .device
                .begin_command_buffer(command_buffer, &begin_info)
        } {
            self.free(command_buffer);
            return Err(e).context("Failed to begin single-time command buffer");
        }

        Ok(command_buffer)
    }

    /// End, submit to the graphics queue, block until it drains, free
    pub fn end_single_time(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        let device = &self.device.device;
        let result = (|| -> Result<()> {
            unsafe {
                device.end_command_buffer(command_buffer)?;

                let command_buffers = [command_buffer];
                let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

                device.queue_submit(
                    self.device.graphics_queue,
                    &[submit_info.build()],
                    vk::Fence::null(),
                )?;
                device.queue_wait_idle(self.device.graphics_queue)?;
            }
            Ok(())
        })();

        self.free(command_buffer);
        result.context("Failed to submit single-time command buffer")
    }

    /// Record with `record`, then submit and wait
    pub fn one_time_submit<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer) -> Result<()>,
    {
        let command_buffer = self.begin_single_time()?;
        if let Err(e) = record(&self.device.device, command_buffer) {
            // Nothing was submitted, the buffer can go straight back
            self.free(command_buffer);
            return Err(e);
        }
        self.end_single_time(command_buffer)
    }

    fn free(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.device
                .device
                .free_command_buffers(self.pool, &[command_buffer]);
        }
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_command_pool(self.pool, None);
        }
    }
}
