// Scene data: vertex layout, uniform block and the geometry we draw

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};
use std::mem::{offset_of, size_of};

/// Interleaved vertex, matches the inputs of scene.vert
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: Vec3,
    pub color: Vec3,
    pub tex_coord: Vec2,
}

impl Vertex {
    const fn new(pos: [f32; 3], color: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            pos: Vec3::from_array(pos),
            color: Vec3::from_array(color),
            tex_coord: Vec2::from_array(tex_coord),
        }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, pos) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, color) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Vertex, tex_coord) as u32,
            },
        ]
    }
}

/// Two textured quads, one half a unit above the other
pub const VERTICES: [Vertex; 8] = [
    Vertex::new([-0.5, -0.5, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0]),
    Vertex::new([0.5, -0.5, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0]),
    Vertex::new([0.5, 0.5, 0.0], [0.0, 0.0, 1.0], [1.0, 1.0]),
    Vertex::new([-0.5, 0.5, 0.0], [1.0, 1.0, 1.0], [0.0, 1.0]),
    Vertex::new([-0.5, -0.5, -0.5], [1.0, 0.0, 0.0], [0.0, 0.0]),
    Vertex::new([0.5, -0.5, -0.5], [0.0, 1.0, 0.0], [1.0, 0.0]),
    Vertex::new([0.5, 0.5, -0.5], [0.0, 0.0, 1.0], [1.0, 1.0]),
    Vertex::new([-0.5, 0.5, -0.5], [1.0, 1.0, 1.0], [0.0, 1.0]),
];

pub const INDICES: [u16; 12] = [0, 1, 2, 2, 3, 0, 4, 5, 6, 6, 7, 4];

/// Vertices the cube pipeline generates in its vertex shader
pub const CUBE_VERTEX_COUNT: u32 = 36;

/// Uniform block at binding 0 of the scene pipeline
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl UniformBufferObject {
    /// Transforms for `elapsed` seconds into the run
    pub fn for_frame(elapsed: f32, rotation_speed: f32, extent: vk::Extent2D) -> Self {
        let model = Mat4::from_rotation_z((elapsed * rotation_speed).to_radians());
        let view = Mat4::look_at_rh(Vec3::splat(2.0), Vec3::ZERO, Vec3::Z);

        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let mut proj = Mat4::perspective_rh(45.0_f32.to_radians(), aspect, 0.1, 10.0);
        // Vulkan clip space has Y pointing down
        proj.y_axis.y *= -1.0;

        Self { model, view, proj }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn test_vertex_layout() {
        assert_eq!(size_of::<Vertex>(), 32);

        let binding = Vertex::binding_description();
        assert_eq!(binding.stride, 32);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);

        let attrs = Vertex::attribute_descriptions();
        let offsets: Vec<u32> = attrs.iter().map(|a| a.offset).collect();
        let locations: Vec<u32> = attrs.iter().map(|a| a.location).collect();
        assert_eq!(offsets, vec![0, 12, 24]);
        assert_eq!(locations, vec![0, 1, 2]);
        assert_eq!(attrs[2].format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn test_uniform_block_size() {
        assert_eq!(size_of::<UniformBufferObject>(), 192);
        assert_eq!(std::mem::align_of::<UniformBufferObject>() % 16, 0);
    }

    #[test]
    fn test_indices_stay_in_range() {
        assert_eq!(INDICES.len(), 12);
        assert!(INDICES.iter().all(|&i| (i as usize) < VERTICES.len()));
    }

    #[test]
    fn test_quads_are_stacked() {
        assert!(VERTICES[..4].iter().all(|v| v.pos.z == 0.0));
        assert!(VERTICES[4..].iter().all(|v| v.pos.z == -0.5));
    }

    #[test]
    fn test_model_rotates_about_z() {
        let extent = vk::Extent2D { width: 800, height: 600 };
        let start = UniformBufferObject::for_frame(0.0, 90.0, extent);
        assert_eq!(start.model, Mat4::IDENTITY);

        // One second at 90 deg/s turns +X into +Y
        let later = UniformBufferObject::for_frame(1.0, 90.0, extent);
        assert!(approx(later.model.transform_vector3(Vec3::X), Vec3::Y));
        assert!(approx(later.model.transform_vector3(Vec3::Z), Vec3::Z));
    }

    #[test]
    fn test_projection_flips_y() {
        let extent = vk::Extent2D { width: 800, height: 600 };
        let ubo = UniformBufferObject::for_frame(0.0, 90.0, extent);
        let unflipped = Mat4::perspective_rh(45.0_f32.to_radians(), 800.0 / 600.0, 0.1, 10.0);
        assert_eq!(ubo.proj.y_axis.y, -unflipped.y_axis.y);
        assert_eq!(ubo.proj.x_axis, unflipped.x_axis);

        // The origin sits in front of the camera
        let clip = ubo.proj * ubo.view * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let depth = clip.z / clip.w;
        assert!(depth > 0.0 && depth < 1.0);
    }

    #[test]
    fn test_zero_height_does_not_divide_by_zero() {
        let ubo = UniformBufferObject::for_frame(0.0, 90.0, vk::Extent2D { width: 10, height: 0 });
        assert!(ubo.proj.is_finite());
    }
}
