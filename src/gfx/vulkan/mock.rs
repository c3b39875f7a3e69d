//! 测试用的 Vulkan 实现
//!
//! 句柄由计数器生成，所有调用按名字记录下来。克隆出的实例共享同一份状态，
//! 测试把一份交给设备管理器，另一份留着做断言。

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::prelude::VkResult;
use ash::vk::{self, Handle};

use super::api::{
    AdapterFeatures, AdapterProperties, BarrierCommands, DeviceDesc, SubmitDesc, SwapchainDesc,
    VulkanApi,
};
use super::debug::DebugReportSink;
use super::queues::QueueFamily;
use crate::gfx::params::WindowSurfaceData;

#[derive(Debug, Clone)]
pub struct MockAdapter {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub extensions: Vec<String>,
    pub features: AdapterFeatures,
    pub queue_families: Vec<QueueFamily>,
    pub present_families: Vec<u32>,
    pub surface_capabilities: vk::SurfaceCapabilitiesKHR,
    pub surface_formats: Vec<vk::SurfaceFormatKHR>,
}

impl MockAdapter {
    /// 满足所有最低要求的独立显卡
    pub fn discrete(name: &str) -> Self {
        Self {
            name: name.to_string(),
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            extensions: vec!["VK_KHR_swapchain".to_string(), "VK_KHR_maintenance1".to_string()],
            features: AdapterFeatures {
                sampler_anisotropy: true,
                texture_compression_bc: true,
            },
            queue_families: vec![
                QueueFamily::new(
                    vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
                    16,
                ),
                QueueFamily::new(vk::QueueFlags::TRANSFER, 2),
            ],
            present_families: vec![0],
            surface_capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 8,
                min_image_extent: vk::Extent2D { width: 1, height: 1 },
                max_image_extent: vk::Extent2D {
                    width: 16384,
                    height: 16384,
                },
                ..Default::default()
            },
            surface_formats: [vk::Format::B8G8R8A8_SRGB, vk::Format::B8G8R8A8_UNORM]
                .into_iter()
                .map(|format| vk::SurfaceFormatKHR {
                    format,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                })
                .collect(),
        }
    }
}

#[derive(Default)]
pub struct MockState {
    pub instance_extensions: Vec<String>,
    pub layers: Vec<String>,
    pub adapters: Vec<MockAdapter>,
    /// 按顺序记录的调用名
    pub calls: Vec<&'static str>,
    /// 尚未销毁的句柄及其种类
    pub live: BTreeMap<u64, &'static str>,
    pub signaled: BTreeMap<u64, bool>,
    pub swapchain_images: BTreeMap<u64, u32>,
    /// 下一次呈现返回的错误
    pub present_error: Option<vk::Result>,
    pub device_desc: Option<DeviceDesc>,
    pub swapchain_desc: Option<SwapchainDesc>,
    pub submits: Vec<SubmitDesc>,
    pub debug_sink: Option<Arc<DebugReportSink>>,
    next_handle: u64,
    next_image: u32,
}

impl MockState {
    fn handle(&mut self, kind: &'static str) -> u64 {
        self.next_handle += 1;
        let raw = 0x1000 + self.next_handle;
        self.live.insert(raw, kind);
        raw
    }

    fn release(&mut self, raw: u64) {
        self.live.remove(&raw);
        self.signaled.remove(&raw);
    }

    fn adapter(&self, adapter: vk::PhysicalDevice) -> VkResult<&MockAdapter> {
        let index = adapter.as_raw().checked_sub(1).ok_or(vk::Result::ERROR_DEVICE_LOST)?;
        self.adapters
            .get(index as usize)
            .ok_or(vk::Result::ERROR_DEVICE_LOST)
    }

    pub fn called(&self, name: &str) -> bool {
        self.calls.iter().any(|c| *c == name)
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls.iter().filter(|c| **c == name).count()
    }

    pub fn live_of(&self, kind: &str) -> usize {
        self.live.values().filter(|k| **k == kind).count()
    }
}

/// 共享状态的 mock
#[derive(Clone, Default)]
pub struct MockVulkan {
    state: Arc<Mutex<MockState>>,
}

impl MockVulkan {
    /// 标准环境：实例扩展齐全，验证层可用，只有给定的适配器
    pub fn with_adapters(adapters: Vec<MockAdapter>) -> Self {
        let mock = Self::default();
        {
            let mut state = mock.state();
            state.instance_extensions = [
                "VK_KHR_get_physical_device_properties2",
                "VK_KHR_surface",
                "VK_KHR_win32_surface",
                "VK_KHR_xlib_surface",
                "VK_EXT_debug_report",
                "VK_EXT_debug_utils",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect();
            state.layers = vec!["VK_LAYER_KHRONOS_validation".to_string()];
            state.adapters = adapters;
        }
        mock
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record(&self, name: &'static str) -> MutexGuard<'_, MockState> {
        let mut state = self.state();
        state.calls.push(name);
        state
    }
}

impl VulkanApi for MockVulkan {
    fn load_entry(&mut self) -> VkResult<()> {
        drop(self.record("load_entry"));
        Ok(())
    }

    fn enumerate_instance_extensions(&self) -> VkResult<Vec<String>> {
        Ok(self.record("enumerate_instance_extensions").instance_extensions.clone())
    }

    fn enumerate_instance_layers(&self) -> VkResult<Vec<String>> {
        Ok(self.record("enumerate_instance_layers").layers.clone())
    }

    fn create_instance(&mut self, _extensions: &[String], _layers: &[String]) -> VkResult<vk::Instance> {
        let raw = self.record("create_instance").handle("instance");
        Ok(vk::Instance::from_raw(raw))
    }

    fn destroy_instance(&mut self) {
        let mut state = self.record("destroy_instance");
        let instances: Vec<u64> = state
            .live
            .iter()
            .filter(|(_, kind)| **kind == "instance")
            .map(|(raw, _)| *raw)
            .collect();
        for raw in instances {
            state.release(raw);
        }
    }

    fn create_debug_report_callback(
        &mut self,
        sink: Arc<DebugReportSink>,
    ) -> VkResult<vk::DebugReportCallbackEXT> {
        let mut state = self.record("create_debug_report_callback");
        state.debug_sink = Some(sink);
        Ok(vk::DebugReportCallbackEXT::from_raw(state.handle("debug_report")))
    }

    fn destroy_debug_report_callback(&mut self, callback: vk::DebugReportCallbackEXT) {
        let mut state = self.record("destroy_debug_report_callback");
        state.debug_sink = None;
        state.release(callback.as_raw());
    }

    fn create_surface(&mut self, _window: &WindowSurfaceData) -> VkResult<vk::SurfaceKHR> {
        let raw = self.record("create_surface").handle("surface");
        Ok(vk::SurfaceKHR::from_raw(raw))
    }

    fn destroy_surface(&mut self, surface: vk::SurfaceKHR) {
        self.record("destroy_surface").release(surface.as_raw());
    }

    fn enumerate_adapters(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
        let state = self.record("enumerate_adapters");
        Ok((1..=state.adapters.len() as u64)
            .map(vk::PhysicalDevice::from_raw)
            .collect())
    }

    fn adapter_properties(&self, adapter: vk::PhysicalDevice) -> VkResult<AdapterProperties> {
        let state = self.state();
        let adapter = state.adapter(adapter)?;
        Ok(AdapterProperties {
            name: adapter.name.clone(),
            device_type: adapter.device_type,
        })
    }

    fn adapter_features(&self, adapter: vk::PhysicalDevice) -> VkResult<AdapterFeatures> {
        Ok(self.state().adapter(adapter)?.features)
    }

    fn adapter_extensions(&self, adapter: vk::PhysicalDevice) -> VkResult<Vec<String>> {
        Ok(self.state().adapter(adapter)?.extensions.clone())
    }

    fn queue_families(&self, adapter: vk::PhysicalDevice) -> VkResult<Vec<QueueFamily>> {
        Ok(self.state().adapter(adapter)?.queue_families.clone())
    }

    fn surface_support(&self, adapter: vk::PhysicalDevice, family: u32, _surface: vk::SurfaceKHR) -> VkResult<bool> {
        Ok(self.state().adapter(adapter)?.present_families.contains(&family))
    }

    fn surface_capabilities(
        &self,
        adapter: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        Ok(self.state().adapter(adapter)?.surface_capabilities)
    }

    fn surface_formats(
        &self,
        adapter: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        Ok(self.state().adapter(adapter)?.surface_formats.clone())
    }

    fn create_device(&mut self, _adapter: vk::PhysicalDevice, desc: &DeviceDesc) -> VkResult<vk::Device> {
        let mut state = self.record("create_device");
        state.device_desc = Some(desc.clone());
        Ok(vk::Device::from_raw(state.handle("device")))
    }

    fn destroy_device(&mut self) {
        let mut state = self.record("destroy_device");
        let devices: Vec<u64> = state
            .live
            .iter()
            .filter(|(_, kind)| **kind == "device")
            .map(|(raw, _)| *raw)
            .collect();
        for raw in devices {
            state.release(raw);
        }
    }

    fn get_queue(&self, family: u32) -> VkResult<vk::Queue> {
        Ok(vk::Queue::from_raw(0x100 + family as u64))
    }

    fn device_wait_idle(&self) -> VkResult<()> {
        drop(self.record("device_wait_idle"));
        Ok(())
    }

    fn queue_wait_idle(&self, _queue: vk::Queue) -> VkResult<()> {
        drop(self.record("queue_wait_idle"));
        Ok(())
    }

    fn queue_submit(&self, _queue: vk::Queue, submit: &SubmitDesc, fence: vk::Fence) -> VkResult<()> {
        let mut state = self.record("queue_submit");
        state.submits.push(submit.clone());
        if fence != vk::Fence::null() {
            state.signaled.insert(fence.as_raw(), true);
        }
        Ok(())
    }

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR> {
        let mut state = self.record("create_swapchain");
        state.swapchain_desc = Some(desc.clone());
        let raw = state.handle("swapchain");
        state.swapchain_images.insert(raw, desc.min_image_count);
        Ok(vk::SwapchainKHR::from_raw(raw))
    }

    fn destroy_swapchain(&mut self, swapchain: vk::SwapchainKHR) {
        let mut state = self.record("destroy_swapchain");
        state.swapchain_images.remove(&swapchain.as_raw());
        state.release(swapchain.as_raw());
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        let state = self.state();
        let count = state
            .swapchain_images
            .get(&swapchain.as_raw())
            .copied()
            .ok_or(vk::Result::ERROR_SURFACE_LOST_KHR)?;
        Ok((0..count as u64)
            .map(|i| vk::Image::from_raw(swapchain.as_raw() * 0x100 + i))
            .collect())
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout: u64,
        _semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        let mut state = self.record("acquire_next_image");
        let count = state
            .swapchain_images
            .get(&swapchain.as_raw())
            .copied()
            .ok_or(vk::Result::ERROR_OUT_OF_DATE_KHR)?;
        let index = state.next_image % count.max(1);
        state.next_image = state.next_image.wrapping_add(1);
        Ok((index, false))
    }

    fn queue_present(
        &self,
        _queue: vk::Queue,
        _swapchain: vk::SwapchainKHR,
        _image_index: u32,
        _wait: vk::Semaphore,
    ) -> VkResult<bool> {
        let mut state = self.record("queue_present");
        match state.present_error.take() {
            Some(err) => Err(err),
            None => Ok(false),
        }
    }

    fn create_semaphore(&mut self) -> VkResult<vk::Semaphore> {
        let raw = self.record("create_semaphore").handle("semaphore");
        Ok(vk::Semaphore::from_raw(raw))
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        self.record("destroy_semaphore").release(semaphore.as_raw());
    }

    fn create_fence(&mut self) -> VkResult<vk::Fence> {
        let mut state = self.record("create_fence");
        let raw = state.handle("fence");
        state.signaled.insert(raw, false);
        Ok(vk::Fence::from_raw(raw))
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        self.record("destroy_fence").release(fence.as_raw());
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        self.record("reset_fence").signaled.insert(fence.as_raw(), false);
        Ok(())
    }

    fn wait_fence(&self, fence: vk::Fence, _timeout: u64) -> VkResult<()> {
        let state = self.record("wait_fence");
        match state.signaled.get(&fence.as_raw()) {
            Some(true) => Ok(()),
            Some(false) => Err(vk::Result::TIMEOUT),
            None => Err(vk::Result::ERROR_DEVICE_LOST),
        }
    }

    fn create_barrier_commands(&mut self, _family: u32) -> VkResult<BarrierCommands> {
        let raw = self.record("create_barrier_commands").handle("command_pool");
        Ok(BarrierCommands {
            pool: vk::CommandPool::from_raw(raw),
            buffer: vk::CommandBuffer::from_raw(raw + 1),
        })
    }

    fn destroy_barrier_commands(&mut self, commands: BarrierCommands) {
        self.record("destroy_barrier_commands")
            .release(commands.pool.as_raw());
    }
}
