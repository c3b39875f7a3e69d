//! Vulkan 设备管理器
//!
//! 创建顺序：加载器 → 实例（能力协商）→ 调试回调 → 窗口表面 → 选择适配器 →
//! 逻辑设备 → 交换链 → 屏障命令和信号量。任何一步失败都按相反顺序销毁已创建的对象。
//!
//! 每帧的同步：`begin_frame` 获取图像并让获取信号量等待在图形队列上；
//! `present` 提交一个空的屏障命令缓冲，它等待所有挂起的信号量并触发呈现信号量，
//! 然后呈现并节流。

use ash::vk::{self, Handle};

use super::api::{BarrierCommands, SubmitDesc, SwapchainDesc, VulkanApi};
use super::ash_api::AshApi;
use super::builder::{self, LogicalDevice, SwapChain};
use super::debug::DebugReportSink;
use super::extensions::{CapabilityNegotiator, CapabilitySet};
use super::loader::LoaderState;
use super::queues::QueueFamilyAssignment;
use super::selector::{evaluate, gather_adapters, select_device, DeviceCandidate, SwapChainRequirements};
use super::{surface_instance_extensions, to_vk_format};
use crate::core::error::{DeviceError, Result};
use crate::gfx::backend::DeviceManager;
use crate::gfx::pacer::{CompletionSource, FramePacer, FramePhase, FrameTracker};
use crate::gfx::params::DeviceParams;
use crate::rhi::{CommandQueue, DeviceHandle, GraphicsApi, QueueInfo, TextureHandle};

/// 帧令牌是图形队列上的栅栏
struct FenceSource<'a> {
    api: &'a mut dyn VulkanApi,
    queue: vk::Queue,
}

impl CompletionSource for FenceSource<'_> {
    type Token = vk::Fence;

    fn create_token(&mut self) -> Result<vk::Fence> {
        self.api
            .create_fence()
            .map_err(|e| DeviceError::native("create a frame fence", e))
    }

    fn reset_token(&mut self, fence: &mut vk::Fence) -> Result<()> {
        self.api
            .reset_fence(*fence)
            .map_err(|e| DeviceError::native("reset a frame fence", e))
    }

    fn arm_token(&mut self, fence: &mut vk::Fence) -> Result<()> {
        // 空提交：栅栏在之前的所有提交完成后触发
        self.api
            .queue_submit(self.queue, &SubmitDesc::default(), *fence)
            .map_err(|e| DeviceError::native("signal a frame fence", e))
    }

    fn wait_token(&mut self, fence: &mut vk::Fence) -> Result<()> {
        self.api
            .wait_fence(*fence, u64::MAX)
            .map_err(|e| DeviceError::native("wait for a frame fence", e))
    }
}

pub struct VulkanDeviceManager {
    params: DeviceParams,
    api: Box<dyn VulkanApi>,
    loader: LoaderState,
    capabilities: Option<CapabilitySet>,
    renderer_string: String,

    instance: Option<vk::Instance>,
    debug_report: Option<vk::DebugReportCallbackEXT>,
    surface: Option<vk::SurfaceKHR>,
    physical_device: Option<vk::PhysicalDevice>,
    queue_families: QueueFamilyAssignment,
    device: Option<LogicalDevice>,

    swap_chain: Option<SwapChain>,
    swap_chain_index: u32,
    acquire_semaphore: Option<vk::Semaphore>,
    present_semaphore: Option<vk::Semaphore>,
    barrier: Option<BarrierCommands>,
    /// 下一次图形队列提交需要等待的信号量
    pending_waits: Vec<vk::Semaphore>,

    pacer: FramePacer<vk::Fence>,
    frame: FrameTracker,
}

impl VulkanDeviceManager {
    /// 使用系统 Vulkan 加载器
    pub fn new(params: DeviceParams) -> Self {
        Self::with_api(params, Box::new(AshApi::new()))
    }

    pub fn with_api(params: DeviceParams, api: Box<dyn VulkanApi>) -> Self {
        let pacer = FramePacer::new(params.max_frames_in_flight);
        let frame = FrameTracker::new(params.enable_validation_layer);
        Self {
            params,
            api,
            loader: LoaderState::default(),
            capabilities: None,
            renderer_string: String::new(),
            instance: None,
            debug_report: None,
            surface: None,
            physical_device: None,
            queue_families: QueueFamilyAssignment::default(),
            device: None,
            swap_chain: None,
            swap_chain_index: 0,
            acquire_semaphore: None,
            present_semaphore: None,
            barrier: None,
            pending_waits: Vec::new(),
            pacer,
            frame,
        }
    }

    pub fn native_physical_device(&self) -> Option<vk::PhysicalDevice> {
        self.physical_device
    }

    /// 取走图形队列下一次提交必须等待的信号量
    ///
    /// 外部录制层在自己的提交中等待它们（阶段为颜色附件输出）；
    /// 没有取走的信号量由 `present` 的屏障提交等待。
    pub fn take_graphics_waits(&mut self) -> Vec<vk::Semaphore> {
        std::mem::take(&mut self.pending_waits)
    }

    /// 在途队列曾经达到的最大长度
    pub fn frames_in_flight_high_water(&self) -> usize {
        self.pacer.high_water()
    }

    fn try_create(&mut self) -> Result<()> {
        self.loader.init_global()?;
        self.api
            .load_entry()
            .map_err(|e| DeviceError::native("load the Vulkan library", e))?;

        let window = self.params.window_surface.ok_or_else(|| {
            DeviceError::InvalidState("a window surface is required to create a swap chain".to_string())
        })?;

        let mut negotiator = CapabilityNegotiator::new(&self.params);
        for extension in surface_instance_extensions(&window.display)? {
            negotiator.require_instance_extension(extension);
        }

        self.create_instance(&mut negotiator)?;

        if self.params.enable_debug_runtime {
            self.install_debug_callback()?;
        }

        // 替换必须先于适配器检查
        let format = self.params.swap_chain_format.swap_chain_substitute();
        if format != self.params.swap_chain_format {
            tracing::debug!(from = self.params.swap_chain_format.name(), to = format.name(), "Swap chain format substituted");
            self.params.swap_chain_format = format;
        }

        let surface = self
            .api
            .create_surface(&window)
            .map_err(|e| DeviceError::native("create a window surface", e))?;
        self.surface = Some(surface);

        let candidate = self.pick_physical_device(&negotiator, surface)?;
        negotiator.negotiate_device(candidate.extensions.as_slice());
        let capabilities = negotiator.finalize();

        let queues = candidate.queues.ok_or_else(|| {
            DeviceError::InvalidState("selected adapter has no queue assignment".to_string())
        })?;
        self.physical_device = Some(candidate.handle);
        self.queue_families = queues;

        let device =
            builder::create_logical_device(self.api.as_mut(), candidate.handle, &queues, &capabilities)?;
        self.device = Some(device);
        self.capabilities = Some(capabilities);
        self.loader.init_device()?;

        self.renderer_string = candidate.name;
        self.params
            .info(&format!("Created Vulkan device: {}", self.renderer_string));
        tracing::info!(
            device = %self.renderer_string,
            graphics = ?queues.graphics,
            compute = ?queues.compute,
            transfer = ?queues.transfer,
            present = ?queues.present,
            "Vulkan device created"
        );

        self.create_swap_chain()?;

        let graphics_family = queues.graphics.unwrap_or_default();
        self.barrier = Some(
            self.api
                .create_barrier_commands(graphics_family)
                .map_err(|e| DeviceError::native("create the barrier command buffer", e))?,
        );
        self.acquire_semaphore = Some(self.create_semaphore()?);
        self.present_semaphore = Some(self.create_semaphore()?);

        Ok(())
    }

    fn create_instance(&mut self, negotiator: &mut CapabilityNegotiator) -> Result<()> {
        let extensions = self
            .api
            .enumerate_instance_extensions()
            .map_err(|e| DeviceError::native("enumerate Vulkan instance extensions", e))?;
        let layers = self
            .api
            .enumerate_instance_layers()
            .map_err(|e| DeviceError::native("enumerate Vulkan layers", e))?;
        negotiator.negotiate_instance(extensions.as_slice(), layers.as_slice())?;

        let instance = self
            .api
            .create_instance(
                &negotiator.enabled_instance_extensions(),
                &negotiator.enabled_layers(),
            )
            .map_err(|e| DeviceError::native("create a Vulkan instance", e))?;
        self.instance = Some(instance);
        self.loader.init_instance()?;
        tracing::debug!("Vulkan instance created");
        Ok(())
    }

    fn install_debug_callback(&mut self) -> Result<()> {
        let sink = DebugReportSink::new(
            self.params.message_callback.clone(),
            self.params.ignored_vulkan_validation_message_locations.clone(),
        );
        let callback = self
            .api
            .create_debug_report_callback(std::sync::Arc::new(sink))
            .map_err(|e| DeviceError::native("install the debug report callback", e))?;
        self.debug_report = Some(callback);
        Ok(())
    }

    fn pick_physical_device(
        &self,
        negotiator: &CapabilityNegotiator,
        surface: vk::SurfaceKHR,
    ) -> Result<DeviceCandidate> {
        let requirements = SwapChainRequirements {
            format: to_vk_format(self.params.swap_chain_format),
            extent: vk::Extent2D {
                width: self.params.back_buffer_width,
                height: self.params.back_buffer_height,
            },
            image_count: self.params.swap_chain_buffer_count,
        };

        let candidates = gather_adapters(self.api.as_ref(), surface)?
            .iter()
            .map(|snapshot| {
                evaluate(
                    snapshot,
                    negotiator.required_device_extensions(),
                    &requirements,
                    self.params.enable_compute_queue,
                    self.params.enable_copy_queue,
                )
            })
            .collect::<Vec<_>>();

        select_device(candidates).map_err(|message| {
            self.params.error(&message);
            DeviceError::NoSuitableAdapter(message)
        })
    }

    fn create_semaphore(&mut self) -> Result<vk::Semaphore> {
        self.api
            .create_semaphore()
            .map_err(|e| DeviceError::native("create a semaphore", e))
    }

    fn create_swap_chain(&mut self) -> Result<()> {
        let surface = self
            .surface
            .ok_or_else(|| DeviceError::InvalidState("no window surface".to_string()))?;
        let desc = SwapchainDesc::new(surface, &self.params, &self.queue_families);
        let swap_chain = builder::create_swap_chain(self.api.as_mut(), &desc, &self.params)?;
        self.swap_chain = Some(swap_chain);
        self.swap_chain_index = 0;
        Ok(())
    }

    fn destroy_swap_chain(&mut self) {
        if let Some(swap_chain) = self.swap_chain.take() {
            self.api.destroy_swapchain(swap_chain.handle);
        }
    }

    fn teardown(&mut self) {
        if self.device.is_some() {
            if let Err(e) = self.api.device_wait_idle() {
                tracing::warn!(error = %e, "vkDeviceWaitIdle failed during teardown");
            }
        }

        self.destroy_swap_chain();
        for semaphore in [self.acquire_semaphore.take(), self.present_semaphore.take()]
            .into_iter()
            .flatten()
        {
            self.api.destroy_semaphore(semaphore);
        }
        if let Some(barrier) = self.barrier.take() {
            self.api.destroy_barrier_commands(barrier);
        }
        // 设备已经空闲，令牌直接丢弃
        for fence in self.pacer.drain() {
            self.api.destroy_fence(fence);
        }
        if self.device.take().is_some() {
            self.api.destroy_device();
        }
        if let Some(surface) = self.surface.take() {
            self.api.destroy_surface(surface);
        }
        if let Some(callback) = self.debug_report.take() {
            self.api.destroy_debug_report_callback(callback);
        }
        if self.instance.take().is_some() {
            self.api.destroy_instance();
        }

        self.physical_device = None;
        self.queue_families = QueueFamilyAssignment::default();
        self.pending_waits.clear();
        self.swap_chain_index = 0;
        self.frame.reset();
        self.capabilities = None;
        self.renderer_string.clear();
        self.loader.reset();
    }

    fn enabled(&self, pick: impl Fn(&CapabilitySet) -> Vec<String>) -> Vec<String> {
        self.capabilities.as_ref().map(pick).unwrap_or_default()
    }
}

impl DeviceManager for VulkanDeviceManager {
    fn graphics_api(&self) -> GraphicsApi {
        GraphicsApi::Vulkan
    }

    fn device(&self) -> Option<DeviceHandle> {
        let device = self.device?;
        let roles = [
            (CommandQueue::Graphics, self.queue_families.graphics),
            (CommandQueue::Compute, self.queue_families.compute),
            (CommandQueue::Copy, self.queue_families.transfer),
            (CommandQueue::Present, self.queue_families.present),
        ];
        Some(DeviceHandle {
            api: GraphicsApi::Vulkan,
            native_device: device.device.as_raw(),
            queues: roles
                .into_iter()
                .filter_map(|(queue, family)| family.map(|family_index| QueueInfo { queue, family_index }))
                .collect(),
        })
    }

    fn create_device_and_swap_chain(&mut self) -> Result<()> {
        if self.device.is_some() {
            return Err(DeviceError::InvalidState("the Vulkan device already exists".to_string()));
        }

        let result = self.try_create();
        if let Err(err) = &result {
            match err {
                // 协商和选择失败已经报告过
                DeviceError::Configuration(_) | DeviceError::NoSuitableAdapter(_) => {}
                other => self.params.error(&other.to_string()),
            }
            tracing::error!(error = %err, "Vulkan device creation failed");
            self.teardown();
        }
        result
    }

    fn destroy_device_and_swap_chain(&mut self) {
        let existed = self.instance.is_some();
        self.teardown();
        if existed {
            tracing::info!("Vulkan device destroyed");
        }
    }

    fn resize_swap_chain(&mut self, width: u32, height: u32) -> Result<()> {
        if self.device.is_none() {
            return Ok(());
        }

        self.api
            .device_wait_idle()
            .map_err(|e| DeviceError::native("wait for the device to idle", e))?;
        self.destroy_swap_chain();

        // 已获取但没有被等待的信号量不能再次用于获取
        if !self.pending_waits.is_empty() {
            self.pending_waits.clear();
            if let Some(semaphore) = self.acquire_semaphore.take() {
                self.api.destroy_semaphore(semaphore);
            }
            self.acquire_semaphore = Some(self.create_semaphore()?);
        }
        self.frame.reset();

        self.params.back_buffer_width = width;
        self.params.back_buffer_height = height;
        self.create_swap_chain()
    }

    fn begin_frame(&mut self) -> Result<()> {
        let (Some(swap_chain), Some(semaphore)) = (self.swap_chain.as_ref(), self.acquire_semaphore) else {
            return Err(DeviceError::InvalidState("BeginFrame called without a swap chain".to_string()));
        };
        let handle = swap_chain.handle;
        self.frame.check_begin()?;
        if self.frame.phase() == FramePhase::Acquired {
            // 图像已经获取，再次获取会让同一个信号量被等待两次
            return Ok(());
        }

        let (index, suboptimal) = match self.api.acquire_next_image(handle, u64::MAX, semaphore) {
            Ok(acquired) => acquired,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                tracing::debug!("Swap chain is out of date at acquire");
                return Err(DeviceError::SwapChainOutOfDate);
            }
            Err(e) => return Err(DeviceError::native("acquire the next swap chain image", e)),
        };
        if suboptimal {
            tracing::debug!("Swap chain is suboptimal");
        }

        self.swap_chain_index = index;
        self.pending_waits.push(semaphore);
        self.frame.begun();
        tracing::trace!(index, "Frame begun");
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        let (Some(swap_chain), Some(device), Some(barrier), Some(present_semaphore)) = (
            self.swap_chain.as_ref().map(|s| s.handle),
            self.device,
            self.barrier,
            self.present_semaphore,
        ) else {
            return Err(DeviceError::InvalidState("Present called without a swap chain".to_string()));
        };
        self.frame.check_present()?;

        let submit = SubmitDesc {
            wait_semaphores: std::mem::take(&mut self.pending_waits),
            wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            command_buffers: vec![barrier.buffer],
            signal_semaphores: vec![present_semaphore],
        };
        self.api
            .queue_submit(device.graphics_queue, &submit, vk::Fence::null())
            .map_err(|e| DeviceError::native("submit the present barrier", e))?;

        match self
            .api
            .queue_present(device.present_queue, swap_chain, self.swap_chain_index, present_semaphore)
        {
            Ok(false) => {}
            Ok(true) => tracing::debug!("Swap chain is suboptimal"),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => tracing::debug!("Swap chain is out of date"),
            Err(e) => return Err(DeviceError::native("present a swap chain image", e)),
        }

        if self.params.enable_debug_runtime {
            // 验证层要求应用与 GPU 显式同步
            self.api
                .queue_wait_idle(device.present_queue)
                .map_err(|e| DeviceError::native("wait for the present queue", e))?;
        } else {
            if cfg!(not(target_os = "windows")) && self.params.vsync_enabled {
                self.api
                    .queue_wait_idle(device.present_queue)
                    .map_err(|e| DeviceError::native("wait for the present queue", e))?;
            }

            let mut source = FenceSource {
                api: self.api.as_mut(),
                queue: device.graphics_queue,
            };
            self.pacer.throttle(&mut source)?;
        }

        self.frame.presented();
        Ok(())
    }

    fn back_buffer(&self, index: usize) -> Option<TextureHandle> {
        self.swap_chain
            .as_ref()
            .and_then(|s| s.images.get(index))
            .map(|image| image.texture.clone())
    }

    fn current_back_buffer_index(&self) -> usize {
        self.swap_chain_index as usize
    }

    fn back_buffer_count(&self) -> usize {
        self.swap_chain.as_ref().map_or(0, |s| s.images.len())
    }

    fn renderer_string(&self) -> &str {
        &self.renderer_string
    }

    fn device_params(&self) -> &DeviceParams {
        &self.params
    }

    fn frames_in_flight(&self) -> usize {
        self.pacer.in_flight()
    }

    fn is_vulkan_instance_extension_enabled(&self, name: &str) -> bool {
        self.capabilities
            .as_ref()
            .is_some_and(|c| c.is_instance_extension_enabled(name))
    }

    fn is_vulkan_device_extension_enabled(&self, name: &str) -> bool {
        self.capabilities
            .as_ref()
            .is_some_and(|c| c.is_device_extension_enabled(name))
    }

    fn is_vulkan_layer_enabled(&self, name: &str) -> bool {
        self.capabilities.as_ref().is_some_and(|c| c.is_layer_enabled(name))
    }

    fn enabled_vulkan_instance_extensions(&self) -> Vec<String> {
        self.enabled(|c| c.instance_extensions().iter().cloned().collect())
    }

    fn enabled_vulkan_device_extensions(&self) -> Vec<String> {
        self.enabled(|c| c.device_extensions().iter().cloned().collect())
    }

    fn enabled_vulkan_layers(&self) -> Vec<String> {
        self.enabled(|c| c.layers().iter().cloned().collect())
    }
}

impl Drop for VulkanDeviceManager {
    fn drop(&mut self) {
        self.teardown();
    }
}
