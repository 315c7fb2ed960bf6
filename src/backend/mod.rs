// Backend module - Vulkan abstraction layer
//
// Thin wrappers around ash. Long-lived objects hold an Arc<VulkanDevice> and
// clean up on drop; per-frame objects expose an explicit destroy.

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;

pub use command::CommandPool;
pub use device::VulkanDevice;
pub use swapchain::Swapchain;
