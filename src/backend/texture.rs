// Sampled textures: staging upload, layout transitions, mip chain, sampler
//
// Uploads go through a host-visible staging buffer into a device-local
// R8G8B8A8_SRGB image. Mip levels are generated on the GPU with blits, so the
// format has to support linear filtering for optimal tiling.

use anyhow::{bail, Context, Result};
use ash::vk;
use std::path::Path;
use std::sync::Arc;
use super::buffer::Buffer;
use super::image::{create_image, create_image_view, ImageDesc};
use super::{CommandPool, VulkanDevice};

pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// floor(log2(max(width, height))) + 1
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Extent of every level in the chain, each half the previous (never below 1)
pub fn mip_extents(width: u32, height: u32, mip_levels: u32) -> Vec<(i32, i32)> {
    let mut extents = Vec::with_capacity(mip_levels as usize);
    let (mut w, mut h) = (width.max(1) as i32, height.max(1) as i32);
    for _ in 0..mip_levels {
        extents.push((w, h));
        w = (w / 2).max(1);
        h = (h / 2).max(1);
    }
    extents
}

/// Access masks and pipeline stages for one layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Only the two transitions a texture upload needs are supported
pub fn layout_transition_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<TransitionMasks> {
    match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => {
            Ok(TransitionMasks {
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::TRANSFER_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::TRANSFER,
            })
        }
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok(TransitionMasks {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            })
        }
        _ => bail!(
            "Unsupported layout transition: {:?} -> {:?}",
            old_layout,
            new_layout
        ),
    }
}

/// RGBA8 checkerboard, `cell` pixels per square
pub fn checkerboard_pixels(size: u32, cell: u32) -> Vec<u8> {
    let cell = cell.max(1);
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let light = ((x / cell) + (y / cell)) % 2 == 0;
            let value = if light { 230 } else { 40 };
            pixels.extend_from_slice(&[value, value, value, 255]);
        }
    }
    pixels
}

fn color_subresource(base_mip_level: u32, level_count: u32) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level,
        level_count,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Record and submit a barrier moving every mip level between two layouts
pub fn transition_image_layout(
    commands: &CommandPool,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    mip_levels: u32,
) -> Result<()> {
    let masks = layout_transition_masks(old_layout, new_layout)?;

    commands.one_time_submit(|device, cmd| {
        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(color_subresource(0, mip_levels))
            .src_access_mask(masks.src_access)
            .dst_access_mask(masks.dst_access);

        unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                masks.src_stage,
                masks.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier.build()],
            );
        }
        Ok(())
    })
}

/// Copy tightly packed pixels from `buffer` into mip level 0
pub fn copy_buffer_to_image(
    commands: &CommandPool,
    buffer: vk::Buffer,
    image: vk::Image,
    width: u32,
    height: u32,
) -> Result<()> {
    commands.one_time_submit(|device, cmd| {
        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
        };

        unsafe {
            device.cmd_copy_buffer_to_image(
                cmd,
                buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
        Ok(())
    })
}

/// Fill levels 1.. by blitting down from level 0
///
/// Expects every level in TRANSFER_DST_OPTIMAL; leaves every level in
/// SHADER_READ_ONLY_OPTIMAL.
pub fn generate_mipmaps(
    device: &VulkanDevice,
    commands: &CommandPool,
    image: vk::Image,
    format: vk::Format,
    width: u32,
    height: u32,
    mip_levels: u32,
) -> Result<()> {
    let format_properties = device.format_properties(format);
    if !format_properties
        .optimal_tiling_features
        .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
    {
        bail!("Texture image format {:?} does not support linear blitting", format);
    }

    let extents = mip_extents(width, height, mip_levels);

    commands.one_time_submit(|device, cmd| {
        let barrier = |level: u32,
                       old_layout: vk::ImageLayout,
                       new_layout: vk::ImageLayout,
                       src_access: vk::AccessFlags,
                       dst_access: vk::AccessFlags| {
            vk::ImageMemoryBarrier::builder()
                .image(image)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .subresource_range(color_subresource(level, 1))
                .old_layout(old_layout)
                .new_layout(new_layout)
                .src_access_mask(src_access)
                .dst_access_mask(dst_access)
                .build()
        };

        for level in 1..mip_levels {
            let (src_w, src_h) = extents[level as usize - 1];
            let (dst_w, dst_h) = extents[level as usize];

            let to_src = barrier(
                level - 1,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::TRANSFER_READ,
            );

            let blit = vk::ImageBlit {
                src_offsets: [
                    vk::Offset3D { x: 0, y: 0, z: 0 },
                    vk::Offset3D { x: src_w, y: src_h, z: 1 },
                ],
                src_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: level - 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                dst_offsets: [
                    vk::Offset3D { x: 0, y: 0, z: 0 },
                    vk::Offset3D { x: dst_w, y: dst_h, z: 1 },
                ],
                dst_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: level,
                    base_array_layer: 0,
                    layer_count: 1,
                },
            };

            let to_shader = barrier(
                level - 1,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::AccessFlags::TRANSFER_READ,
                vk::AccessFlags::SHADER_READ,
            );

            unsafe {
                device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[to_src],
                );
                device.cmd_blit_image(
                    cmd,
                    image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[blit],
                    vk::Filter::LINEAR,
                );
                device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[to_shader],
                );
            }
        }

        // The last level was only ever written to
        let last = barrier(
            mip_levels - 1,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
        );

        unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[last],
            );
        }
        Ok(())
    })
}

/// Linear, repeating, anisotropic sampler covering the whole mip chain
pub fn create_texture_sampler(device: &VulkanDevice) -> Result<vk::Sampler> {
    let sampler_info = vk::SamplerCreateInfo::builder()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(true)
        .max_anisotropy(device.properties.limits.max_sampler_anisotropy)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .min_lod(0.0)
        .max_lod(vk::LOD_CLAMP_NONE)
        .mip_lod_bias(0.0);

    unsafe { device.device.create_sampler(&sampler_info, None) }
        .context("Failed to create texture sampler")
}

pub struct Texture {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
    device: Arc<VulkanDevice>,
}

impl Texture {
    pub fn from_file<P: AsRef<Path>>(
        device: &Arc<VulkanDevice>,
        commands: &CommandPool,
        path: P,
    ) -> Result<Self> {
        let path = path.as_ref();
        let pixels = ::image::open(path)
            .with_context(|| format!("Failed to load texture image: {:?}", path))?
            .to_rgba8();

        let (width, height) = pixels.dimensions();
        log::info!("Loaded texture {:?} ({}x{})", path, width, height);

        Self::from_rgba(device, commands, width, height, pixels.as_raw())
    }

    /// Grey checkerboard used when no texture file is configured
    pub fn checkerboard(device: &Arc<VulkanDevice>, commands: &CommandPool) -> Result<Self> {
        const SIZE: u32 = 256;
        log::info!("No texture configured, using a {}x{} checkerboard", SIZE, SIZE);
        Self::from_rgba(device, commands, SIZE, SIZE, &checkerboard_pixels(SIZE, 32))
    }

    /// Upload tightly packed RGBA8 pixels and build the full mip chain
    pub fn from_rgba(
        device: &Arc<VulkanDevice>,
        commands: &CommandPool,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || pixels.len() != expected {
            bail!(
                "Texture data is {} bytes, expected {} for {}x{} RGBA",
                pixels.len(),
                expected,
                width,
                height
            );
        }

        let mip_levels = mip_level_count(width, height);

        let staging =
            Buffer::host_visible_with_data(device, vk::BufferUsageFlags::TRANSFER_SRC, pixels)?;

        // Textures are sampled, never rendered to: always a single sample
        let (image, memory) = create_image(
            device,
            &ImageDesc {
                width,
                height,
                mip_levels,
                samples: vk::SampleCountFlags::TYPE_1,
                format: TEXTURE_FORMAT,
                tiling: vk::ImageTiling::OPTIMAL,
                usage: vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::SAMPLED,
                memory_properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            },
        )?;

        // Null view and sampler are fine to destroy if a later step fails
        let mut texture = Self {
            image,
            memory,
            view: vk::ImageView::null(),
            sampler: vk::Sampler::null(),
            device: device.clone(),
        };

        transition_image_layout(
            commands,
            image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            mip_levels,
        )?;
        copy_buffer_to_image(commands, staging.buffer, image, width, height)?;
        generate_mipmaps(device, commands, image, TEXTURE_FORMAT, width, height, mip_levels)?;

        texture.view = create_image_view(
            device,
            image,
            TEXTURE_FORMAT,
            vk::ImageAspectFlags::COLOR,
            mip_levels,
        )?;
        texture.sampler = create_texture_sampler(device)?;

        log::debug!("Texture uploaded with {} mip levels", mip_levels);

        Ok(texture)
    }

    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: self.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_sampler(self.sampler, None);
            self.device.device.destroy_image_view(self.view, None);
            self.device.device.destroy_image(self.image, None);
            self.device.device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_level_count() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 2), 2);
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(800, 600), 10);
        assert_eq!(mip_level_count(1024, 1), 11);
        assert_eq!(mip_level_count(1, 1023), 10);
    }

    #[test]
    fn test_mip_extents_halve_down_to_one() {
        assert_eq!(
            mip_extents(8, 2, mip_level_count(8, 2)),
            vec![(8, 2), (4, 1), (2, 1), (1, 1)]
        );
        assert_eq!(mip_extents(5, 5, 3), vec![(5, 5), (2, 2), (1, 1)]);
    }

    #[test]
    fn test_every_level_reaches_one_by_one() {
        for (w, h) in [(1, 1), (3, 7), (640, 480), (4096, 16)] {
            let extents = mip_extents(w, h, mip_level_count(w, h));
            assert_eq!(extents.last(), Some(&(1, 1)), "{}x{}", w, h);
        }
    }

    #[test]
    fn test_upload_transition() {
        let masks = layout_transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(masks.src_access, vk::AccessFlags::empty());
        assert_eq!(masks.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(masks.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn test_shader_read_transition() {
        let masks = layout_transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(masks.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(masks.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(masks.src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_other_transitions_are_rejected() {
        let err = layout_transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unsupported layout transition"));

        assert!(layout_transition_masks(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .is_err());
    }

    #[test]
    fn test_checkerboard_pixels() {
        let pixels = checkerboard_pixels(4, 2);
        assert_eq!(pixels.len(), 4 * 4 * 4);
        // (0,0) light, (2,0) dark, (2,2) light again
        assert_eq!(&pixels[0..4], &[230, 230, 230, 255]);
        assert_eq!(&pixels[8..12], &[40, 40, 40, 255]);
        let offset = (2 * 4 + 2) * 4;
        assert_eq!(&pixels[offset..offset + 4], &[230, 230, 230, 255]);
    }
}
