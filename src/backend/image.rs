// Images, image views and render target attachments
//
// The MSAA colour target and the depth buffer are recreated with the
// swapchain, so they live in `AttachmentImage` and clean up on drop.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;
use super::buffer::allocate_memory;
use super::VulkanDevice;

/// Parameters for a single-layer 2D image
#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub samples: vk::SampleCountFlags,
    pub format: vk::Format,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    pub memory_properties: vk::MemoryPropertyFlags,
}

/// Create a 2D image and bind freshly allocated memory to it
pub fn create_image(
    device: &VulkanDevice,
    desc: &ImageDesc,
) -> Result<(vk::Image, vk::DeviceMemory)> {
    let image_info = vk::ImageCreateInfo::builder()
        .image_type(vk::ImageType::TYPE_2D)
        .extent(vk::Extent3D {
            width: desc.width,
            height: desc.height,
            depth: 1,
        })
        .mip_levels(desc.mip_levels)
        .array_layers(1)
        .format(desc.format)
        .tiling(desc.tiling)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .usage(desc.usage)
        .samples(desc.samples)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let image = unsafe { device.device.create_image(&image_info, None) }
        .context("Failed to create image")?;

    let mem_requirements = unsafe { device.device.get_image_memory_requirements(image) };

    let memory = match allocate_memory(device, mem_requirements, desc.memory_properties) {
        Ok(memory) => memory,
        Err(e) => {
            unsafe { device.device.destroy_image(image, None) };
            return Err(e);
        }
    };

    if let Err(e) = unsafe { device.device.bind_image_memory(image, memory, 0) } {
        unsafe {
            device.device.destroy_image(image, None);
            device.device.free_memory(memory, None);
        }
        return Err(e).context("Failed to bind image memory");
    }

    Ok((image, memory))
}

/// 2D view over `mip_levels` levels starting at 0
pub fn create_image_view(
    device: &VulkanDevice,
    image: vk::Image,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
    mip_levels: u32,
) -> Result<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: mip_levels,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.device.create_image_view(&create_info, None) }
        .context("Failed to create image view")
}

/// Image + memory + view owned together
pub struct AttachmentImage {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    device: Arc<VulkanDevice>,
}

impl AttachmentImage {
    /// Multisampled colour target that gets resolved into the swapchain image
    pub fn color(
        device: &Arc<VulkanDevice>,
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> Result<Self> {
        Self::new(
            device,
            ImageDesc {
                width: extent.width,
                height: extent.height,
                mip_levels: 1,
                samples,
                format,
                tiling: vk::ImageTiling::OPTIMAL,
                usage: vk::ImageUsageFlags::TRANSIENT_ATTACHMENT
                    | vk::ImageUsageFlags::COLOR_ATTACHMENT,
                memory_properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            },
            vk::ImageAspectFlags::COLOR,
        )
    }

    pub fn depth(
        device: &Arc<VulkanDevice>,
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> Result<Self> {
        Self::new(
            device,
            ImageDesc {
                width: extent.width,
                height: extent.height,
                mip_levels: 1,
                samples,
                format,
                tiling: vk::ImageTiling::OPTIMAL,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                memory_properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            },
            vk::ImageAspectFlags::DEPTH,
        )
    }

    fn new(
        device: &Arc<VulkanDevice>,
        desc: ImageDesc,
        aspect_mask: vk::ImageAspectFlags,
    ) -> Result<Self> {
        let (image, memory) = create_image(device, &desc)?;

        let view = match create_image_view(device, image, desc.format, aspect_mask, 1) {
            Ok(view) => view,
            Err(e) => {
                unsafe {
                    device.device.destroy_image(image, None);
                    device.device.free_memory(memory, None);
                }
                return Err(e);
            }
        };

        log::debug!(
            "Created {:?} attachment {}x{} ({:?})",
            desc.format,
            desc.width,
            desc.height,
            desc.samples
        );

        Ok(Self {
            image,
            memory,
            view,
            device: device.clone(),
        })
    }
}

impl Drop for AttachmentImage {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_image_view(self.view, None);
            self.device.device.destroy_image(self.image, None);
            self.device.device.free_memory(self.memory, None);
        }
    }
}
