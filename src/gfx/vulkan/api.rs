//! Vulkan 原生调用接口
//!
//! 设备管理器只通过 [`VulkanApi`] 调用 Vulkan。正式实现是基于 ash 的
//! [`AshApi`](super::ash_api::AshApi)；测试中使用不需要 GPU 的 mock。
//! 实现者自己保存实例和设备的函数表，所以设备级调用不再传入设备句柄。

use std::sync::Arc;

use ash::prelude::VkResult;
use ash::vk;

use super::debug::DebugReportSink;
use super::queues::QueueFamily;
use crate::gfx::params::WindowSurfaceData;

/// 适配器的基本属性
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterProperties {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
}

/// 设备选择关心的硬件特性
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdapterFeatures {
    pub sampler_anisotropy: bool,
    pub texture_compression_bc: bool,
}

/// 按需启用的特性块
///
/// 每一项只有在对应扩展被协商启用时才会出现在设备创建信息中。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureBlocks {
    pub acceleration_structure: bool,
    pub buffer_device_address: bool,
    pub ray_tracing_pipeline: bool,
    pub ray_query: bool,
    pub mesh_shader: bool,
    pub fragment_shading_rate: bool,
}

/// 逻辑设备创建描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDesc {
    /// 去重后的队列族，每个族一个队列
    pub queue_families: Vec<u32>,
    pub extensions: Vec<String>,
    pub features: FeatureBlocks,
}

/// 交换链创建描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapchainDesc {
    pub surface: vk::SurfaceKHR,
    pub min_image_count: u32,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub extent: vk::Extent2D,
    pub usage: vk::ImageUsageFlags,
    /// 为空时使用独占模式，否则以并发模式在这些队列族间共享
    pub sharing_families: Vec<u32>,
    pub present_mode: vk::PresentModeKHR,
}

impl SwapchainDesc {
    pub fn sharing_mode(&self) -> vk::SharingMode {
        if self.sharing_families.is_empty() {
            vk::SharingMode::EXCLUSIVE
        } else {
            vk::SharingMode::CONCURRENT
        }
    }
}

/// 一次队列提交
#[derive(Debug, Clone, Default)]
pub struct SubmitDesc {
    pub wait_semaphores: Vec<vk::Semaphore>,
    pub wait_stage: vk::PipelineStageFlags,
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub signal_semaphores: Vec<vk::Semaphore>,
}

/// 屏障命令缓冲
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierCommands {
    pub pool: vk::CommandPool,
    pub buffer: vk::CommandBuffer,
}

/// Vulkan 调用接口
pub trait VulkanApi {
    /// 加载全局函数入口
    fn load_entry(&mut self) -> VkResult<()>;

    // 实例级
    fn enumerate_instance_extensions(&self) -> VkResult<Vec<String>>;
    fn enumerate_instance_layers(&self) -> VkResult<Vec<String>>;
    fn create_instance(&mut self, extensions: &[String], layers: &[String]) -> VkResult<vk::Instance>;
    fn destroy_instance(&mut self);

    fn create_debug_report_callback(
        &mut self,
        sink: Arc<DebugReportSink>,
    ) -> VkResult<vk::DebugReportCallbackEXT>;
    fn destroy_debug_report_callback(&mut self, callback: vk::DebugReportCallbackEXT);

    fn create_surface(&mut self, window: &WindowSurfaceData) -> VkResult<vk::SurfaceKHR>;
    fn destroy_surface(&mut self, surface: vk::SurfaceKHR);

    // 适配器查询
    fn enumerate_adapters(&self) -> VkResult<Vec<vk::PhysicalDevice>>;
    fn adapter_properties(&self, adapter: vk::PhysicalDevice) -> VkResult<AdapterProperties>;
    fn adapter_features(&self, adapter: vk::PhysicalDevice) -> VkResult<AdapterFeatures>;
    fn adapter_extensions(&self, adapter: vk::PhysicalDevice) -> VkResult<Vec<String>>;
    fn queue_families(&self, adapter: vk::PhysicalDevice) -> VkResult<Vec<QueueFamily>>;
    fn surface_support(
        &self,
        adapter: vk::PhysicalDevice,
        family: u32,
        surface: vk::SurfaceKHR,
    ) -> VkResult<bool>;
    fn surface_capabilities(
        &self,
        adapter: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR>;
    fn surface_formats(
        &self,
        adapter: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>>;

    // 设备级
    fn create_device(&mut self, adapter: vk::PhysicalDevice, desc: &DeviceDesc) -> VkResult<vk::Device>;
    fn destroy_device(&mut self);
    fn get_queue(&self, family: u32) -> VkResult<vk::Queue>;
    fn device_wait_idle(&self) -> VkResult<()>;
    fn queue_wait_idle(&self, queue: vk::Queue) -> VkResult<()>;
    fn queue_submit(&self, queue: vk::Queue, submit: &SubmitDesc, fence: vk::Fence) -> VkResult<()>;

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR>;
    fn destroy_swapchain(&mut self, swapchain: vk::SwapchainKHR);
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;
    /// 返回图像索引和 suboptimal 标志
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)>;
    /// 返回 suboptimal 标志
    fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool>;

    fn create_semaphore(&mut self) -> VkResult<vk::Semaphore>;
    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore);

    fn create_fence(&mut self) -> VkResult<vk::Fence>;
    fn destroy_fence(&mut self, fence: vk::Fence);
    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;
    fn wait_fence(&self, fence: vk::Fence, timeout: u64) -> VkResult<()>;

    /// 创建并录制一个空的可重复提交的命令缓冲
    fn create_barrier_commands(&mut self, family: u32) -> VkResult<BarrierCommands>;
    fn destroy_barrier_commands(&mut self, commands: BarrierCommands);
}
