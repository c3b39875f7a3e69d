//! 设备与呈现管理
//!
//! - `backend`: 统一的 [`DeviceManager`] 接口和后端工厂
//! - `params`: 设备创建参数
//! - `pacer`: 两个后端共用的帧节流
//! - `vulkan`: 基于 ash 的 Vulkan 实现
//! - `dx12`: DirectX 12 实现（仅 Windows）

pub mod backend;
pub mod pacer;
pub mod params;
pub mod vulkan;
#[cfg(target_os = "windows")]
pub mod dx12;

pub use backend::{create_device_manager, DeviceManager};
pub use params::{DeviceParams, WindowSurfaceData};
pub use vulkan::VulkanDeviceManager;
#[cfg(target_os = "windows")]
pub use dx12::Dx12DeviceManager;
