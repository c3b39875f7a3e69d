//! 设备管理器的统一接口
//!
//! 每个图形 API 提供一个实现。调用者在创建时通过 [`create_device_manager`]
//! 选定后端，之后不能切换。

use crate::core::error::Result;
use crate::gfx::params::DeviceParams;
use crate::rhi::{DeviceHandle, GraphicsApi, TextureHandle};

/// 设备与呈现管理器
///
/// 所有方法都只能在同一个控制线程上调用。
///
/// # 生命周期
///
/// 1. `create_device_and_swap_chain`：能力协商、选择适配器、创建设备和交换链，
///    任何一步失败都会销毁已经创建的部分并返回错误
/// 2. 每帧 `begin_frame` 获取后台缓冲，外部录制命令，然后 `present`
/// 3. 窗口尺寸变化时 `resize_swap_chain`
/// 4. `destroy_device_and_swap_chain`，可以重复调用
pub trait DeviceManager {
    fn graphics_api(&self) -> GraphicsApi;

    /// 交给命令录制层的设备描述，设备不存在时为 `None`
    fn device(&self) -> Option<DeviceHandle>;

    fn create_device_and_swap_chain(&mut self) -> Result<()>;

    fn destroy_device_and_swap_chain(&mut self);

    /// 按新尺寸重建交换链，设备不存在时什么都不做
    fn resize_swap_chain(&mut self, width: u32, height: u32) -> Result<()>;

    /// 获取下一张可用的后台缓冲
    fn begin_frame(&mut self) -> Result<()>;

    /// 呈现当前后台缓冲并节流
    fn present(&mut self) -> Result<()>;

    fn current_back_buffer(&self) -> Option<TextureHandle> {
        self.back_buffer(self.current_back_buffer_index())
    }

    fn back_buffer(&self, index: usize) -> Option<TextureHandle>;

    fn current_back_buffer_index(&self) -> usize;

    fn back_buffer_count(&self) -> usize;

    /// 所选适配器的名称
    fn renderer_string(&self) -> &str;

    fn device_params(&self) -> &DeviceParams;

    /// 当前在途的帧数
    fn frames_in_flight(&self) -> usize;

    // 以下只对 Vulkan 后端有意义
    fn is_vulkan_instance_extension_enabled(&self, _name: &str) -> bool {
        false
    }

    fn is_vulkan_device_extension_enabled(&self, _name: &str) -> bool {
        false
    }

    fn is_vulkan_layer_enabled(&self, _name: &str) -> bool {
        false
    }

    fn enabled_vulkan_instance_extensions(&self) -> Vec<String> {
        Vec::new()
    }

    fn enabled_vulkan_device_extensions(&self) -> Vec<String> {
        Vec::new()
    }

    fn enabled_vulkan_layers(&self) -> Vec<String> {
        Vec::new()
    }
}

/// 为指定的图形 API 创建设备管理器
///
/// 只构造管理器，不创建设备。
pub fn create_device_manager(api: GraphicsApi, params: DeviceParams) -> Result<Box<dyn DeviceManager>> {
    tracing::debug!(api = api.name(), "Creating device manager");
    match api {
        GraphicsApi::Vulkan => Ok(Box::new(crate::gfx::vulkan::VulkanDeviceManager::new(params))),
        #[cfg(target_os = "windows")]
        GraphicsApi::D3D12 => Ok(Box::new(crate::gfx::dx12::Dx12DeviceManager::new(params))),
        #[cfg(not(target_os = "windows"))]
        GraphicsApi::D3D12 => {
            let _ = params;
            Err(crate::core::error::DeviceError::InvalidState(
                "DirectX 12 is only available on Windows".to_string(),
            ))
        }
    }
}
