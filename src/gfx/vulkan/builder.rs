//! 逻辑设备和交换链的创建
//!
//! 描述的构建是纯函数，方便单独测试；真正的创建通过 [`VulkanApi`] 完成。

use ash::vk;

use super::api::{DeviceDesc, FeatureBlocks, SwapchainDesc, VulkanApi};
use super::extensions::CapabilitySet;
use super::queues::QueueFamilyAssignment;
use super::to_vk_format;
use crate::core::error::{DeviceError, Result};
use crate::gfx::params::DeviceParams;
use crate::rhi::{NativeObject, Texture, TextureDesc, TextureHandle};

impl FeatureBlocks {
    /// 只为已经协商启用的扩展声明特性块
    pub fn from_capabilities(caps: &CapabilitySet) -> Self {
        Self {
            acceleration_structure: caps.is_device_extension_enabled("VK_KHR_acceleration_structure"),
            buffer_device_address: caps.is_device_extension_enabled("VK_KHR_buffer_device_address"),
            ray_tracing_pipeline: caps.is_device_extension_enabled("VK_KHR_ray_tracing_pipeline"),
            ray_query: caps.is_device_extension_enabled("VK_KHR_ray_query"),
            mesh_shader: caps.is_device_extension_enabled("VK_NV_mesh_shader"),
            fragment_shading_rate: caps.is_device_extension_enabled("VK_KHR_fragment_shading_rate"),
        }
    }
}

impl DeviceDesc {
    pub fn new(assignment: &QueueFamilyAssignment, caps: &CapabilitySet) -> Self {
        Self {
            queue_families: assignment.unique_families().into_iter().collect(),
            extensions: caps.device_extensions().iter().cloned().collect(),
            features: FeatureBlocks::from_capabilities(caps),
        }
    }
}

/// 交换链图像的用途
pub fn swap_chain_usage() -> vk::ImageUsageFlags {
    vk::ImageUsageFlags::COLOR_ATTACHMENT
        | vk::ImageUsageFlags::TRANSFER_DST
        | vk::ImageUsageFlags::SAMPLED
}

impl SwapchainDesc {
    pub fn new(surface: vk::SurfaceKHR, params: &DeviceParams, assignment: &QueueFamilyAssignment) -> Self {
        Self {
            surface,
            min_image_count: params.swap_chain_buffer_count,
            format: to_vk_format(params.swap_chain_format),
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            extent: vk::Extent2D {
                width: params.back_buffer_width,
                height: params.back_buffer_height,
            },
            usage: swap_chain_usage(),
            sharing_families: assignment.swap_chain_sharing(),
            present_mode: if params.vsync_enabled {
                vk::PresentModeKHR::FIFO
            } else {
                vk::PresentModeKHR::IMMEDIATE
            },
        }
    }
}

/// 创建好的逻辑设备及其队列
#[derive(Debug, Clone, Copy)]
pub struct LogicalDevice {
    pub device: vk::Device,
    pub graphics_queue: vk::Queue,
    pub compute_queue: Option<vk::Queue>,
    pub transfer_queue: Option<vk::Queue>,
    pub present_queue: vk::Queue,
}

pub fn create_logical_device(
    api: &mut dyn VulkanApi,
    adapter: vk::PhysicalDevice,
    assignment: &QueueFamilyAssignment,
    caps: &CapabilitySet,
) -> Result<LogicalDevice> {
    let (Some(graphics), Some(present)) = (assignment.graphics, assignment.present) else {
        return Err(DeviceError::InvalidState(
            "graphics and present queue families must be resolved before device creation".to_string(),
        ));
    };

    let desc = DeviceDesc::new(assignment, caps);
    let device = api
        .create_device(adapter, &desc)
        .map_err(|e| DeviceError::native("create a Vulkan physical device", e))?;

    let queues = fetch_queues(api, device, graphics, present, assignment);
    if queues.is_err() {
        api.destroy_device();
    }
    queues
}

fn fetch_queues(
    api: &dyn VulkanApi,
    device: vk::Device,
    graphics: u32,
    present: u32,
    assignment: &QueueFamilyAssignment,
) -> Result<LogicalDevice> {
    let queue = |family: u32| {
        api.get_queue(family)
            .map_err(|e| DeviceError::native("retrieve a Vulkan device queue", e))
    };
    Ok(LogicalDevice {
        device,
        graphics_queue: queue(graphics)?,
        compute_queue: assignment.compute.map(&queue).transpose()?,
        transfer_queue: assignment.transfer.map(&queue).transpose()?,
        present_queue: queue(present)?,
    })
}

/// 一张交换链图像
#[derive(Debug, Clone)]
pub struct SwapChainImage {
    pub image: vk::Image,
    pub texture: TextureHandle,
}

/// 当前交换链
#[derive(Debug)]
pub struct SwapChain {
    pub handle: vk::SwapchainKHR,
    pub images: Vec<SwapChainImage>,
}

pub fn create_swap_chain(api: &mut dyn VulkanApi, desc: &SwapchainDesc, params: &DeviceParams) -> Result<SwapChain> {
    let handle = api
        .create_swapchain(desc)
        .map_err(|e| DeviceError::native("create a Vulkan swap chain", e))?;

    let images = match api.swapchain_images(handle) {
        Ok(images) => images,
        Err(e) => {
            api.destroy_swapchain(handle);
            return Err(DeviceError::native("retrieve swap chain images", e));
        }
    };

    let images = images
        .into_iter()
        .map(|image| {
            let desc = TextureDesc::swap_chain_image(
                params.back_buffer_width,
                params.back_buffer_height,
                params.swap_chain_format,
            );
            SwapChainImage {
                image,
                texture: Texture::from_native(NativeObject::VkImage(vk::Handle::as_raw(image)), desc),
            }
        })
        .collect::<Vec<_>>();

    tracing::info!(
        width = desc.extent.width,
        height = desc.extent.height,
        images = images.len(),
        present_mode = ?desc.present_mode,
        "Swap chain created"
    );

    Ok(SwapChain { handle, images })
}
