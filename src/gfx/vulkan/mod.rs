//! Vulkan 后端
//!
//! 本模块包含 Vulkan 设备管理器的全部实现：
//! - `extensions`: 实例扩展、层和设备扩展的协商
//! - `selector`: 物理设备评估和选择
//! - `queues`: 队列族解析
//! - `builder`: 逻辑设备和交换链的创建
//! - `manager`: 把以上步骤串起来的 [`VulkanDeviceManager`]
//!
//! 所有原生调用都经过 [`api::VulkanApi`]，正式实现基于 ash。

pub mod api;
pub mod ash_api;
pub mod builder;
pub mod debug;
pub mod extensions;
pub mod loader;
pub mod manager;
pub mod queues;
pub mod selector;

#[cfg(test)]
pub(crate) mod mock;

pub use manager::VulkanDeviceManager;

use ash::vk;
use raw_window_handle::RawDisplayHandle;

use crate::core::error::{DeviceError, Result};
use crate::rhi::Format;

/// 与后端无关的格式到 Vulkan 格式
pub fn to_vk_format(format: Format) -> vk::Format {
    match format {
        Format::RGBA8_UNORM => vk::Format::R8G8B8A8_UNORM,
        Format::SRGBA8_UNORM => vk::Format::R8G8B8A8_SRGB,
        Format::BGRA8_UNORM => vk::Format::B8G8R8A8_UNORM,
        Format::SBGRA8_UNORM => vk::Format::B8G8R8A8_SRGB,
        Format::R10G10B10A2_UNORM => vk::Format::A2B10G10R10_UNORM_PACK32,
        Format::RGBA16_FLOAT => vk::Format::R16G16B16A16_SFLOAT,
    }
}

/// 窗口系统需要的实例扩展
pub fn surface_instance_extensions(display: &RawDisplayHandle) -> Result<Vec<&'static str>> {
    let platform = match display {
        RawDisplayHandle::Windows(_) => "VK_KHR_win32_surface",
        RawDisplayHandle::Xlib(_) => "VK_KHR_xlib_surface",
        RawDisplayHandle::Xcb(_) => "VK_KHR_xcb_surface",
        RawDisplayHandle::Wayland(_) => "VK_KHR_wayland_surface",
        other => {
            return Err(DeviceError::InvalidState(format!(
                "unsupported window system for a Vulkan surface: {:?}",
                other
            )))
        }
    };
    Ok(vec!["VK_KHR_surface", platform])
}

#[cfg(test)]
mod tests {
    use super::*;
    use raw_window_handle::{AppKitDisplayHandle, WindowsDisplayHandle};

    #[test]
    fn test_formats_map_to_vulkan() {
        assert_eq!(to_vk_format(Format::SBGRA8_UNORM), vk::Format::B8G8R8A8_SRGB);
        assert_eq!(to_vk_format(Format::RGBA8_UNORM), vk::Format::R8G8B8A8_UNORM);
        assert_eq!(to_vk_format(Format::RGBA16_FLOAT), vk::Format::R16G16B16A16_SFLOAT);
    }

    #[test]
    fn test_surface_extensions_follow_display() {
        let display = RawDisplayHandle::Windows(WindowsDisplayHandle::new());
        assert_eq!(
            surface_instance_extensions(&display).unwrap(),
            vec!["VK_KHR_surface", "VK_KHR_win32_surface"]
        );

        let display = RawDisplayHandle::AppKit(AppKitDisplayHandle::new());
        assert!(surface_instance_extensions(&display).is_err());
    }
}
