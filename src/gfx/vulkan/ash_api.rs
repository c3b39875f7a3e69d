//! 基于 ash 的 [`VulkanApi`] 实现

use std::ffi::{c_void, CStr, CString};
use std::sync::Arc;

use ash::extensions::{ext, khr};
use ash::prelude::VkResult;
use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use super::api::{
    AdapterFeatures, AdapterProperties, BarrierCommands, DeviceDesc, SubmitDesc, SwapchainDesc,
    VulkanApi,
};
use super::debug::{debug_report_callback, report_flags, DebugReportSink};
use super::loader;
use super::queues::QueueFamily;
use crate::gfx::params::WindowSurfaceData;

struct InstanceFns {
    instance: ash::Instance,
    surface: khr::Surface,
    debug_report: ext::DebugReport,
}

struct DeviceFns {
    device: ash::Device,
    swapchain: khr::Swapchain,
}

/// 使用系统 Vulkan 加载器的实现
#[derive(Default)]
pub struct AshApi {
    entry: Option<&'static ash::Entry>,
    instance: Option<InstanceFns>,
    device: Option<DeviceFns>,
    debug_sink: Option<Arc<DebugReportSink>>,
}

fn names(raw: impl IntoIterator<Item = [std::ffi::c_char; vk::MAX_EXTENSION_NAME_SIZE]>) -> Vec<String> {
    raw.into_iter()
        .map(|name| {
            // SAFETY: Vulkan 保证名称以 NUL 结尾
            unsafe { CStr::from_ptr(name.as_ptr()) }
                .to_string_lossy()
                .into_owned()
        })
        .collect()
}

fn c_strings(list: &[String]) -> VkResult<Vec<CString>> {
    list.iter()
        .map(|s| CString::new(s.as_str()).map_err(|_| vk::Result::ERROR_EXTENSION_NOT_PRESENT))
        .collect()
}

impl AshApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self) -> VkResult<&'static ash::Entry> {
        self.entry.ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }

    fn instance(&self) -> VkResult<&InstanceFns> {
        self.instance.as_ref().ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }

    fn device(&self) -> VkResult<&DeviceFns> {
        self.device.as_ref().ok_or(vk::Result::ERROR_DEVICE_LOST)
    }
}

impl VulkanApi for AshApi {
    fn load_entry(&mut self) -> VkResult<()> {
        let entry = loader::entry().map_err(|e| {
            tracing::error!(error = %e, "Vulkan loader unavailable");
            vk::Result::ERROR_INITIALIZATION_FAILED
        })?;
        self.entry = Some(entry);
        Ok(())
    }

    fn enumerate_instance_extensions(&self) -> VkResult<Vec<String>> {
        let props = self.entry()?.enumerate_instance_extension_properties(None)?;
        Ok(names(props.into_iter().map(|p| p.extension_name)))
    }

    fn enumerate_instance_layers(&self) -> VkResult<Vec<String>> {
        let props = self.entry()?.enumerate_instance_layer_properties()?;
        Ok(names(props.into_iter().map(|p| p.layer_name)))
    }

    fn create_instance(&mut self, extensions: &[String], layers: &[String]) -> VkResult<vk::Instance> {
        let entry = self.entry()?;
        let extensions = c_strings(extensions)?;
        let layers = c_strings(layers)?;
        let extension_ptrs: Vec<_> = extensions.iter().map(|s| s.as_ptr()).collect();
        let layer_ptrs: Vec<_> = layers.iter().map(|s| s.as_ptr()).collect();

        let app_info = vk::ApplicationInfo::builder().api_version(vk::make_api_version(0, 1, 2, 0));
        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        // SAFETY: 所有指针在调用期间有效
        let instance = unsafe { entry.create_instance(&create_info, None)? };
        let handle = instance.handle();
        self.instance = Some(InstanceFns {
            surface: khr::Surface::new(entry, &instance),
            debug_report: ext::DebugReport::new(entry, &instance),
            instance,
        });
        Ok(handle)
    }

    fn destroy_instance(&mut self) {
        if let Some(fns) = self.instance.take() {
            unsafe { fns.instance.destroy_instance(None) };
        }
    }

    fn create_debug_report_callback(
        &mut self,
        sink: Arc<DebugReportSink>,
    ) -> VkResult<vk::DebugReportCallbackEXT> {
        let info = vk::DebugReportCallbackCreateInfoEXT::builder()
            .flags(report_flags())
            .pfn_callback(Some(debug_report_callback))
            .user_data(Arc::as_ptr(&sink) as *mut c_void);

        let callback = unsafe {
            self.instance()?
                .debug_report
                .create_debug_report_callback(&info, None)?
        };
        // 回调存活期间保持用户数据
        self.debug_sink = Some(sink);
        Ok(callback)
    }

    fn destroy_debug_report_callback(&mut self, callback: vk::DebugReportCallbackEXT) {
        if let Some(fns) = &self.instance {
            unsafe { fns.debug_report.destroy_debug_report_callback(callback, None) };
        }
        self.debug_sink = None;
    }

    fn create_surface(&mut self, window: &WindowSurfaceData) -> VkResult<vk::SurfaceKHR> {
        let entry = self.entry()?;
        let instance = &self.instance()?.instance;

        // SAFETY: 窗口句柄由调用者保证在表面销毁之前有效
        unsafe {
            match (window.window, window.display) {
                (RawWindowHandle::Win32(handle), _) => {
                    let hinstance = handle.hinstance.map_or(0, |h| h.get());
                    let info = vk::Win32SurfaceCreateInfoKHR::builder()
                        .hinstance(hinstance as _)
                        .hwnd(handle.hwnd.get() as _);
                    khr::Win32Surface::new(entry, instance).create_win32_surface(&info, None)
                }
                (RawWindowHandle::Xlib(handle), RawDisplayHandle::Xlib(display)) => {
                    let dpy = display
                        .display
                        .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)?;
                    let info = vk::XlibSurfaceCreateInfoKHR::builder()
                        .dpy(dpy.as_ptr() as _)
                        .window(handle.window);
                    khr::XlibSurface::new(entry, instance).create_xlib_surface(&info, None)
                }
                (RawWindowHandle::Xcb(handle), RawDisplayHandle::Xcb(display)) => {
                    let connection = display
                        .connection
                        .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)?;
                    let info = vk::XcbSurfaceCreateInfoKHR::builder()
                        .connection(connection.as_ptr() as _)
                        .window(handle.window.get());
                    khr::XcbSurface::new(entry, instance).create_xcb_surface(&info, None)
                }
                (RawWindowHandle::Wayland(handle), RawDisplayHandle::Wayland(display)) => {
                    let info = vk::WaylandSurfaceCreateInfoKHR::builder()
                        .display(display.display.as_ptr() as _)
                        .surface(handle.surface.as_ptr() as _);
                    khr::WaylandSurface::new(entry, instance).create_wayland_surface(&info, None)
                }
                _ => Err(vk::Result::ERROR_EXTENSION_NOT_PRESENT),
            }
        }
    }

    fn destroy_surface(&mut self, surface: vk::SurfaceKHR) {
        if let Some(fns) = &self.instance {
            unsafe { fns.surface.destroy_surface(surface, None) };
        }
    }

    fn enumerate_adapters(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
        unsafe { self.instance()?.instance.enumerate_physical_devices() }
    }

    fn adapter_properties(&self, adapter: vk::PhysicalDevice) -> VkResult<AdapterProperties> {
        let props = unsafe { self.instance()?.instance.get_physical_device_properties(adapter) };
        let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();
        Ok(AdapterProperties {
            name,
            device_type: props.device_type,
        })
    }

    fn adapter_features(&self, adapter: vk::PhysicalDevice) -> VkResult<AdapterFeatures> {
        let features = unsafe { self.instance()?.instance.get_physical_device_features(adapter) };
        Ok(AdapterFeatures {
            sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
            texture_compression_bc: features.texture_compression_bc == vk::TRUE,
        })
    }

    fn adapter_extensions(&self, adapter: vk::PhysicalDevice) -> VkResult<Vec<String>> {
        let props = unsafe {
            self.instance()?
                .instance
                .enumerate_device_extension_properties(adapter)?
        };
        Ok(names(props.into_iter().map(|p| p.extension_name)))
    }

    fn queue_families(&self, adapter: vk::PhysicalDevice) -> VkResult<Vec<QueueFamily>> {
        let props = unsafe {
            self.instance()?
                .instance
                .get_physical_device_queue_family_properties(adapter)
        };
        Ok(props.into_iter().map(QueueFamily::from).collect())
    }

    fn surface_support(&self, adapter: vk::PhysicalDevice, family: u32, surface: vk::SurfaceKHR) -> VkResult<bool> {
        unsafe {
            self.instance()?
                .surface
                .get_physical_device_surface_support(adapter, family, surface)
        }
    }

    fn surface_capabilities(
        &self,
        adapter: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.instance()?
                .surface
                .get_physical_device_surface_capabilities(adapter, surface)
        }
    }

    fn surface_formats(
        &self,
        adapter: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.instance()?
                .surface
                .get_physical_device_surface_formats(adapter, surface)
        }
    }

    fn create_device(&mut self, adapter: vk::PhysicalDevice, desc: &DeviceDesc) -> VkResult<vk::Device> {
        let priorities = [1.0f32];
        let queue_infos: Vec<_> = desc
            .queue_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extensions = c_strings(&desc.extensions)?;
        let extension_ptrs: Vec<_> = extensions.iter().map(|s| s.as_ptr()).collect();

        let features = vk::PhysicalDeviceFeatures::builder()
            .shader_image_gather_extended(true)
            .sampler_anisotropy(true)
            .tessellation_shader(true)
            .texture_compression_bc(true)
            .geometry_shader(true)
            .image_cube_array(true)
            .dual_src_blend(true);

        let blocks = desc.features;
        let mut vulkan12 = vk::PhysicalDeviceVulkan12Features::builder()
            .descriptor_indexing(true)
            .runtime_descriptor_array(true)
            .descriptor_binding_partially_bound(true)
            .descriptor_binding_variable_descriptor_count(true)
            .timeline_semaphore(true)
            .shader_sampled_image_array_non_uniform_indexing(true)
            .buffer_device_address(blocks.buffer_device_address);
        let mut accel = vk::PhysicalDeviceAccelerationStructureFeaturesKHR::builder()
            .acceleration_structure(true);
        let mut ray_pipeline = vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::builder()
            .ray_tracing_pipeline(true)
            .ray_traversal_primitive_culling(true);
        let mut ray_query = vk::PhysicalDeviceRayQueryFeaturesKHR::builder().ray_query(true);
        let mut mesh = vk::PhysicalDeviceMeshShaderFeaturesNV::builder()
            .task_shader(true)
            .mesh_shader(true);
        let mut vrs = vk::PhysicalDeviceFragmentShadingRateFeaturesKHR::builder()
            .pipeline_fragment_shading_rate(true)
            .primitive_fragment_shading_rate(true)
            .attachment_fragment_shading_rate(true);

        let mut create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_features(&features)
            .enabled_extension_names(&extension_ptrs)
            .push_next(&mut vulkan12);
        if blocks.acceleration_structure {
            create_info = create_info.push_next(&mut accel);
        }
        if blocks.ray_tracing_pipeline {
            create_info = create_info.push_next(&mut ray_pipeline);
        }
        if blocks.ray_query {
            create_info = create_info.push_next(&mut ray_query);
        }
        if blocks.mesh_shader {
            create_info = create_info.push_next(&mut mesh);
        }
        if blocks.fragment_shading_rate {
            create_info = create_info.push_next(&mut vrs);
        }

        let fns = self.instance()?;
        let device = unsafe { fns.instance.create_device(adapter, &create_info, None)? };
        let handle = device.handle();
        let swapchain = khr::Swapchain::new(&fns.instance, &device);
        self.device = Some(DeviceFns { device, swapchain });
        Ok(handle)
    }

    fn destroy_device(&mut self) {
        if let Some(fns) = self.device.take() {
            unsafe { fns.device.destroy_device(None) };
        }
    }

    fn get_queue(&self, family: u32) -> VkResult<vk::Queue> {
        Ok(unsafe { self.device()?.device.get_device_queue(family, 0) })
    }

    fn device_wait_idle(&self) -> VkResult<()> {
        unsafe { self.device()?.device.device_wait_idle() }
    }

    fn queue_wait_idle(&self, queue: vk::Queue) -> VkResult<()> {
        unsafe { self.device()?.device.queue_wait_idle(queue) }
    }

    fn queue_submit(&self, queue: vk::Queue, submit: &SubmitDesc, fence: vk::Fence) -> VkResult<()> {
        let device = &self.device()?.device;
        if submit.command_buffers.is_empty()
            && submit.wait_semaphores.is_empty()
            && submit.signal_semaphores.is_empty()
        {
            return unsafe { device.queue_submit(queue, &[], fence) };
        }

        let stages = vec![submit.wait_stage; submit.wait_semaphores.len()];
        let info = vk::SubmitInfo::builder()
            .wait_semaphores(&submit.wait_semaphores)
            .wait_dst_stage_mask(&stages)
            .command_buffers(&submit.command_buffers)
            .signal_semaphores(&submit.signal_semaphores)
            .build();
        unsafe { device.queue_submit(queue, &[info], fence) }
    }

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR> {
        let info = vk::SwapchainCreateInfoKHR::builder()
            .surface(desc.surface)
            .min_image_count(desc.min_image_count)
            .image_format(desc.format)
            .image_color_space(desc.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(desc.usage)
            .image_sharing_mode(desc.sharing_mode())
            .queue_family_indices(&desc.sharing_families)
            .pre_transform(vk::SurfaceTransformFlagsKHR::IDENTITY)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(desc.present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());
        unsafe { self.device()?.swapchain.create_swapchain(&info, None) }
    }

    fn destroy_swapchain(&mut self, swapchain: vk::SwapchainKHR) {
        if let Some(fns) = &self.device {
            unsafe { fns.swapchain.destroy_swapchain(swapchain, None) };
        }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.device()?.swapchain.get_swapchain_images(swapchain) }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.device()?
                .swapchain
                .acquire_next_image(swapchain, timeout, semaphore, vk::Fence::null())
        }
    }

    fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool> {
        let waits = [wait];
        let swapchains = [swapchain];
        let indices = [image_index];
        let info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&waits)
            .swapchains(&swapchains)
            .image_indices(&indices);
        unsafe { self.device()?.swapchain.queue_present(queue, &info) }
    }

    fn create_semaphore(&mut self) -> VkResult<vk::Semaphore> {
        let info = vk::SemaphoreCreateInfo::builder();
        unsafe { self.device()?.device.create_semaphore(&info, None) }
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        if let Some(fns) = &self.device {
            unsafe { fns.device.destroy_semaphore(semaphore, None) };
        }
    }

    fn create_fence(&mut self) -> VkResult<vk::Fence> {
        let info = vk::FenceCreateInfo::builder();
        unsafe { self.device()?.device.create_fence(&info, None) }
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        if let Some(fns) = &self.device {
            unsafe { fns.device.destroy_fence(fence, None) };
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device()?.device.reset_fences(&[fence]) }
    }

    fn wait_fence(&self, fence: vk::Fence, timeout: u64) -> VkResult<()> {
        unsafe { self.device()?.device.wait_for_fences(&[fence], true, timeout) }
    }

    fn create_barrier_commands(&mut self, family: u32) -> VkResult<BarrierCommands> {
        let device = &self.device()?.device;
        let pool_info = vk::CommandPoolCreateInfo::builder().queue_family_index(family);
        let pool = unsafe { device.create_command_pool(&pool_info, None)? };

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let recorded = unsafe {
            device.allocate_command_buffers(&alloc_info).and_then(|buffers| {
                let buffer = buffers
                    .first()
                    .copied()
                    .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)?;
                let begin = vk::CommandBufferBeginInfo::builder()
                    .flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE);
                device.begin_command_buffer(buffer, &begin)?;
                device.end_command_buffer(buffer)?;
                Ok(buffer)
            })
        };

        match recorded {
            Ok(buffer) => Ok(BarrierCommands { pool, buffer }),
            Err(e) => {
                unsafe { device.destroy_command_pool(pool, None) };
                Err(e)
            }
        }
    }

    fn destroy_barrier_commands(&mut self, commands: BarrierCommands) {
        if let Some(fns) = &self.device {
            unsafe { fns.device.destroy_command_pool(commands.pool, None) };
        }
    }
}
