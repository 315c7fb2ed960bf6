// =============================================================================
// RENDERER - Vulkan objects for the scene and the per-frame loop
// =============================================================================
//
// SETUP ORDER:
//   device -> swapchain -> colour/depth targets -> render pass
//   -> descriptor set layout -> pipelines -> framebuffers -> command pool
//   -> texture -> vertex/index buffers -> uniform buffers
//   -> descriptor pool/sets -> command buffers -> sync objects
//
// FRAME FLOW:
//   wait fence -> acquire -> reset fence -> write uniforms -> record
//   -> submit -> present -> advance frame slot
//
// Swapchain-sized objects (targets, framebuffers) are rebuilt on resize; the
// render pass and pipelines only when the surface format changes.

use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::backend::buffer::{Buffer, UniformBuffer};
use crate::backend::descriptor;
use crate::backend::device::has_stencil_component;
use crate::backend::image::AttachmentImage;
use crate::backend::pipeline::{self, GraphicsPipeline};
use crate::backend::sync::FrameSync;
use crate::backend::texture::Texture;
use crate::backend::{CommandPool, Swapchain, VulkanDevice};
use crate::config::Config;
use crate::scene::{UniformBufferObject, CUBE_VERTEX_COUNT, INDICES, VERTICES};

/// Everything the renderer takes from the configuration
#[derive(Debug, Clone)]
pub struct RendererSettings {
    pub app_name: String,
    pub validation: bool,
    pub present_mode: vk::PresentModeKHR,
    pub max_samples: vk::SampleCountFlags,
    pub frames_in_flight: usize,
    pub clear_color: [f32; 4],
    pub rotation_speed: f32,
    pub draw_cube: bool,
    pub texture: Option<PathBuf>,
    pub scene_shaders: [PathBuf; 2],
    pub cube_shaders: [PathBuf; 2],
}

impl RendererSettings {
    pub fn from_config(config: &Config) -> Self {
        let assets = &config.assets;
        Self {
            app_name: config.window.title.clone(),
            // Validation only in debug builds
            validation: cfg!(debug_assertions) && config.debug.validation_layers,
            present_mode: config.present_mode(),
            max_samples: config.max_sample_count(),
            frames_in_flight: config.graphics.max_frames_in_flight,
            clear_color: config.graphics.clear_color,
            rotation_speed: config.graphics.rotation_speed,
            draw_cube: config.graphics.draw_cube,
            texture: assets.texture_path().map(PathBuf::from),
            scene_shaders: [
                PathBuf::from(&assets.scene_vertex_shader),
                PathBuf::from(&assets.scene_fragment_shader),
            ],
            cube_shaders: [
                PathBuf::from(&assets.cube_vertex_shader),
                PathBuf::from(&assets.cube_fragment_shader),
            ],
        }
    }
}

/// Scene pipeline plus the optional cube pipeline
fn create_pipelines(
    device: &VulkanDevice,
    render_pass: vk::RenderPass,
    samples: vk::SampleCountFlags,
    set_layout: vk::DescriptorSetLayout,
    settings: &RendererSettings,
) -> Result<(GraphicsPipeline, Option<GraphicsPipeline>)> {
    let scene = pipeline::create_scene_pipeline(
        device,
        render_pass,
        samples,
        set_layout,
        &settings.scene_shaders[0],
        &settings.scene_shaders[1],
    )
    .context("Failed to create scene pipeline")?;

    if !settings.draw_cube {
        return Ok((scene, None));
    }

    match pipeline::create_cube_pipeline(
        device,
        render_pass,
        samples,
        &settings.cube_shaders[0],
        &settings.cube_shaders[1],
    ) {
        Ok(cube) => Ok((scene, Some(cube))),
        Err(e) => {
            scene.destroy(&device.device);
            Err(e).context("Failed to create cube pipeline")
        }
    }
}

/// Colour target (only when multisampling) and depth target for one extent
fn create_targets(
    device: &Arc<VulkanDevice>,
    swapchain: &Swapchain,
    depth_format: vk::Format,
    samples: vk::SampleCountFlags,
) -> Result<(Option<AttachmentImage>, AttachmentImage)> {
    let color = if samples != vk::SampleCountFlags::TYPE_1 {
        Some(AttachmentImage::color(
            device,
            swapchain.extent,
            swapchain.format,
            samples,
        )?)
    } else {
        None
    };
    let depth = AttachmentImage::depth(device, swapchain.extent, depth_format, samples)?;
    Ok((color, depth))
}

pub struct Renderer {
    settings: RendererSettings,
    samples: vk::SampleCountFlags,
    depth_format: vk::Format,

    swapchain: Option<Swapchain>,
    color_target: Option<AttachmentImage>,
    depth_target: Option<AttachmentImage>,
    render_pass: vk::RenderPass,
    descriptor_set_layout: vk::DescriptorSetLayout,
    scene_pipeline: GraphicsPipeline,
    cube_pipeline: Option<GraphicsPipeline>,
    framebuffers: Vec<vk::Framebuffer>,

    commands: CommandPool,
    _texture: Texture,
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    uniform_buffers: Vec<UniformBuffer<UniformBufferObject>>,
    descriptor_pool: vk::DescriptorPool,
    descriptor_sets: Vec<vk::DescriptorSet>,

    /// One per frame in flight, re-recorded every frame
    command_buffers: Vec<vk::CommandBuffer>,
    frame_sync: Vec<FrameSync>,
    current_frame: usize,
    resize_requested: bool,
    start_time: Instant,

    // Last so every other handle above is gone before the device
    device: Arc<VulkanDevice>,
}

impl Renderer {
    pub fn new(
        settings: RendererSettings,
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        let device = VulkanDevice::new(
            &settings.app_name,
            settings.validation,
            display_handle,
            window_handle,
        )?;

        let samples = device.max_usable_sample_count(settings.max_samples);
        let depth_format = device.find_depth_format()?;
        log::info!(
            "MSAA samples: {:?}, depth format: {:?} (stencil: {})",
            samples,
            depth_format,
            has_stencil_component(depth_format)
        );

        let swapchain = Swapchain::new(device.clone(), width, height, settings.present_mode)?;
        let (color_target, depth_target) =
            create_targets(&device, &swapchain, depth_format, samples)?;

        let render_pass =
            pipeline::create_render_pass(&device, swapchain.format, depth_format, samples)?;
        let descriptor_set_layout = descriptor::create_descriptor_set_layout(&device)?;
        let (scene_pipeline, cube_pipeline) =
            create_pipelines(&device, render_pass, samples, descriptor_set_layout, &settings)?;

        let framebuffers = pipeline::create_framebuffers(
            &device,
            render_pass,
            &swapchain.image_views,
            depth_target.view,
            color_target.as_ref().map(|c| c.view),
            swapchain.extent,
        )?;

        let commands = CommandPool::new(device.clone())?;

        let texture = match &settings.texture {
            Some(path) => Texture::from_file(&device, &commands, path)?,
            None => Texture::checkerboard(&device, &commands)?,
        };

        let vertex_buffer = Buffer::device_local_with_data(
            &device,
            &commands,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &VERTICES,
        )?;
        let index_buffer = Buffer::device_local_with_data(
            &device,
            &commands,
            vk::BufferUsageFlags::INDEX_BUFFER,
            &INDICES,
        )?;

        let frames = settings.frames_in_flight;
        let uniform_buffers = UniformBuffer::per_frame(&device, frames)?;

        let descriptor_pool = descriptor::create_descriptor_pool(&device, frames as u32)?;
        let buffer_infos: Vec<_> = uniform_buffers.iter().map(|u| u.descriptor_info()).collect();
        let descriptor_sets = descriptor::create_descriptor_sets(
            &device,
            descriptor_pool,
            descriptor_set_layout,
            &buffer_infos,
            texture.descriptor_info(),
        )?;

        let command_buffers = commands.allocate(frames as u32)?;
        let frame_sync = FrameSync::per_frame(&device, frames)?;

        log::info!("Vulkan initialized with {} frames in flight", frames);

        Ok(Self {
            settings,
            samples,
            depth_format,
            swapchain: Some(swapchain),
            color_target,
            depth_target: Some(depth_target),
            render_pass,
            descriptor_set_layout,
            scene_pipeline,
            cube_pipeline,
            framebuffers,
            commands,
            _texture: texture,
            vertex_buffer,
            index_buffer,
            uniform_buffers,
            descriptor_pool,
            descriptor_sets,
            command_buffers,
            frame_sync,
            current_frame: 0,
            resize_requested: false,
            start_time: Instant::now(),
            device,
        })
    }

    /// Recreate the swapchain before the next present
    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    /// Render one frame; returns false when nothing was drawn
    pub fn draw_frame(&mut self, width: u32, height: u32) -> Result<bool> {
        if width == 0 || height == 0 {
            return Ok(false);
        }

        let sync = &self.frame_sync[self.current_frame];
        let (image_available, render_finished, in_flight) =
            (sync.image_available, sync.render_finished, sync.in_flight_fence);

        unsafe {
            self.device
                .device
                .wait_for_fences(&[in_flight], true, u64::MAX)
                .context("Failed to wait for frame fence")?;
        }

        let swapchain = self.swapchain.as_ref().context("Swapchain not initialized")?;
        let Some((image_index, suboptimal)) = swapchain.acquire_next_image(image_available)?
        else {
            self.recreate_swapchain(width, height)?;
            return Ok(false);
        };

        // Only reset once we know work is submitted, or the next wait deadlocks
        unsafe { self.device.device.reset_fences(&[in_flight]) }
            .context("Failed to reset frame fence")?;

        let ubo = UniformBufferObject::for_frame(
            self.start_time.elapsed().as_secs_f32(),
            self.settings.rotation_speed,
            swapchain.extent,
        );
        self.uniform_buffers[self.current_frame].write(&ubo);

        let cmd = self.command_buffers[self.current_frame];
        self.record_command_buffer(cmd, image_index)?;

        let wait_semaphores = [image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [render_finished];
        let command_buffers = [cmd];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device.device.queue_submit(
                self.device.graphics_queue,
                &[submit_info.build()],
                in_flight,
            )
        }
        .context("Failed to submit draw command buffer")?;

        let swapchain = self.swapchain.as_ref().context("Swapchain not initialized")?;
        let present_stale =
            swapchain.present(self.device.present_queue, image_index, &signal_semaphores)?;

        if present_stale || suboptimal || self.resize_requested {
            self.resize_requested = false;
            self.recreate_swapchain(width, height)?;
        }

        self.current_frame = (self.current_frame + 1) % self.frame_sync.len();
        Ok(true)
    }

    fn record_command_buffer(&self, cmd: vk::CommandBuffer, image_index: u32) -> Result<()> {
        let device = &self.device.device;
        let swapchain = self.swapchain.as_ref().context("Swapchain not initialized")?;
        let extent = swapchain.extent;

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.settings.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];

        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.render_pass)
            .framebuffer(self.framebuffers[image_index as usize])
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };

        unsafe {
            device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .context("Failed to reset command buffer")?;
            device
                .begin_command_buffer(cmd, &vk::CommandBufferBeginInfo::builder())
                .context("Failed to begin recording command buffer")?;

            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(cmd, 0, &[scissor]);

            if let Some(cube) = &self.cube_pipeline {
                device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, cube.pipeline);
                device.cmd_draw(cmd, CUBE_VERTEX_COUNT, 1, 0, 0);
            }

            device.cmd_bind_pipeline(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.scene_pipeline.pipeline,
            );
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.buffer], &[0]);
            device.cmd_bind_index_buffer(cmd, self.index_buffer.buffer, 0, vk::IndexType::UINT16);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.scene_pipeline.layout,
                0,
                &[self.descriptor_sets[self.current_frame]],
                &[],
            );
            device.cmd_draw_indexed(cmd, INDICES.len() as u32, 1, 0, 0, 0);

            device.cmd_end_render_pass(cmd);
            device
                .end_command_buffer(cmd)
                .context("Failed to record command buffer")?;
        }

        Ok(())
    }

    // =========================================================================
    // SWAPCHAIN RECREATION
    // =========================================================================

    /// Rebuild everything sized to the swapchain; a zero-sized window is skipped
    pub fn recreate_swapchain(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            log::debug!("Window minimized, skipping swapchain recreation");
            return Ok(());
        }

        self.device.wait_idle()?;

        pipeline::destroy_framebuffers(&self.device.device, &self.framebuffers);
        self.framebuffers.clear();
        self.color_target = None;
        self.depth_target = None;

        // The surface only allows one swapchain at a time
        let old_format = self.swapchain.take().map(|s| s.format);

        let swapchain = Swapchain::new(
            self.device.clone(),
            width,
            height,
            self.settings.present_mode,
        )?;

        if old_format != Some(swapchain.format) {
            log::info!("Surface format changed to {:?}, rebuilding pipelines", swapchain.format);
            self.rebuild_render_pass(swapchain.format)?;
        }

        let (color_target, depth_target) =
            create_targets(&self.device, &swapchain, self.depth_format, self.samples)?;

        self.framebuffers = pipeline::create_framebuffers(
            &self.device,
            self.render_pass,
            &swapchain.image_views,
            depth_target.view,
            color_target.as_ref().map(|c| c.view),
            swapchain.extent,
        )?;

        log::info!(
            "Swapchain recreated: {}x{}",
            swapchain.extent.width,
            swapchain.extent.height
        );

        self.color_target = color_target;
        self.depth_target = Some(depth_target);
        self.swapchain = Some(swapchain);
        Ok(())
    }

    fn rebuild_render_pass(&mut self, format: vk::Format) -> Result<()> {
        let render_pass =
            pipeline::create_render_pass(&self.device, format, self.depth_format, self.samples)?;

        let pipelines = create_pipelines(
            &self.device,
            render_pass,
            self.samples,
            self.descriptor_set_layout,
            &self.settings,
        );
        let (scene, cube) = match pipelines {
            Ok(pipelines) => pipelines,
            Err(e) => {
                unsafe { self.device.device.destroy_render_pass(render_pass, None) };
                return Err(e);
            }
        };

        self.destroy_pipelines();
        unsafe { self.device.device.destroy_render_pass(self.render_pass, None) };

        self.render_pass = render_pass;
        self.scene_pipeline = scene;
        self.cube_pipeline = cube;
        Ok(())
    }

    // =========================================================================
    // SHADER RELOAD
    // =========================================================================

    /// Rebuild both pipelines from the shader files on disk
    ///
    /// On failure the current pipelines stay in use and false is returned.
    pub fn reload_pipelines(&mut self) -> bool {
        if let Err(e) = self.device.wait_idle() {
            log::error!("Shader reload skipped: {:#}", e);
            return false;
        }

        match create_pipelines(
            &self.device,
            self.render_pass,
            self.samples,
            self.descriptor_set_layout,
            &self.settings,
        ) {
            Ok((scene, cube)) => {
                self.destroy_pipelines();
                self.scene_pipeline = scene;
                self.cube_pipeline = cube;
                log::info!("Shaders reloaded");
                true
            }
            Err(e) => {
                log::error!("Shader reload failed, keeping previous pipelines: {:#}", e);
                false
            }
        }
    }

    fn destroy_pipelines(&mut self) {
        self.scene_pipeline.destroy(&self.device.device);
        if let Some(cube) = self.cube_pipeline.take() {
            cube.destroy(&self.device.device);
        }
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        // Wait for GPU to finish before destroying anything
        if let Err(e) = self.device.wait_idle() {
            log::warn!("wait_idle failed during cleanup: {:#}", e);
        }

        let device = &self.device.device;
        unsafe {
            for sync in &self.frame_sync {
                sync.destroy(device);
            }
            device.free_command_buffers(self.commands.pool, &self.command_buffers);
            // Also frees the descriptor sets
            device.destroy_descriptor_pool(self.descriptor_pool, None);
        }

        pipeline::destroy_framebuffers(device, &self.framebuffers);
        self.destroy_pipelines();

        unsafe {
            let device = &self.device.device;
            device.destroy_descriptor_set_layout(self.descriptor_set_layout, None);
            device.destroy_render_pass(self.render_pass, None);
        }

        // Buffers, texture, targets, swapchain and the command pool drop with
        // their fields; the device goes when its last Arc does
    }
}
