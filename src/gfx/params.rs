//! 设备创建参数
//!
//! 外部调用者通过 `DeviceParams` 描述想要的设备：扩展和层列表、可选队列、
//! 交换链格式和尺寸、帧节流深度以及窗口句柄。

use std::fmt;

use raw_window_handle::{
    HandleError, HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle,
};

use crate::core::log::{default_message_callback, MessageSeverity, SharedMessageCallback};
use crate::rhi::Format;

/// 窗口表面的原生句柄
///
/// 只保存原始句柄，窗口本身的生命周期由调用者负责，必须长于设备管理器。
#[derive(Debug, Clone, Copy)]
pub struct WindowSurfaceData {
    pub window: RawWindowHandle,
    pub display: RawDisplayHandle,
}

impl WindowSurfaceData {
    pub fn new(window: RawWindowHandle, display: RawDisplayHandle) -> Self {
        Self { window, display }
    }

    /// 从任意提供原始句柄的窗口对象获取
    pub fn from_window<W>(window: &W) -> Result<Self, HandleError>
    where
        W: HasWindowHandle + HasDisplayHandle,
    {
        Ok(Self {
            window: window.window_handle()?.as_raw(),
            display: window.display_handle()?.as_raw(),
        })
    }
}

/// 设备创建参数
#[derive(Clone)]
pub struct DeviceParams {
    pub required_vulkan_instance_extensions: Vec<String>,
    pub optional_vulkan_instance_extensions: Vec<String>,
    pub required_vulkan_layers: Vec<String>,
    pub optional_vulkan_layers: Vec<String>,
    pub required_vulkan_device_extensions: Vec<String>,
    pub optional_vulkan_device_extensions: Vec<String>,

    /// 请求独立的计算队列（必须是不带图形能力的队列族）
    pub enable_compute_queue: bool,
    /// 请求独立的传输队列（必须是只有传输能力的队列族）
    pub enable_copy_queue: bool,
    pub enable_ray_tracing_extensions: bool,
    /// 启用原生调试运行时（Vulkan 验证层 / D3D12 调试层）
    pub enable_debug_runtime: bool,
    /// 启用帧阶段校验
    pub enable_validation_layer: bool,

    pub swap_chain_format: Format,
    pub back_buffer_width: u32,
    pub back_buffer_height: u32,
    pub swap_chain_buffer_count: u32,
    pub vsync_enabled: bool,
    pub max_frames_in_flight: u32,

    pub window_surface: Option<WindowSurfaceData>,
    /// 这些位置上的验证消息不再转发
    pub ignored_vulkan_validation_message_locations: Vec<usize>,
    /// DX12：选择描述中包含该子串的适配器，空串表示第一个硬件适配器
    pub adapter_name_substring: String,

    /// 启用扩展列表等信息性消息使用的严重程度
    pub info_log_severity: MessageSeverity,
    pub message_callback: SharedMessageCallback,
}

impl Default for DeviceParams {
    fn default() -> Self {
        Self {
            required_vulkan_instance_extensions: Vec::new(),
            optional_vulkan_instance_extensions: Vec::new(),
            required_vulkan_layers: Vec::new(),
            optional_vulkan_layers: Vec::new(),
            required_vulkan_device_extensions: Vec::new(),
            optional_vulkan_device_extensions: Vec::new(),
            enable_compute_queue: false,
            enable_copy_queue: false,
            enable_ray_tracing_extensions: false,
            enable_debug_runtime: false,
            enable_validation_layer: false,
            swap_chain_format: Format::SRGBA8_UNORM,
            back_buffer_width: 1280,
            back_buffer_height: 720,
            swap_chain_buffer_count: 3,
            vsync_enabled: false,
            max_frames_in_flight: 2,
            window_surface: None,
            ignored_vulkan_validation_message_locations: Vec::new(),
            adapter_name_substring: String::new(),
            info_log_severity: MessageSeverity::Info,
            message_callback: default_message_callback(),
        }
    }
}

impl fmt::Debug for DeviceParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceParams")
            .field("required_vulkan_instance_extensions", &self.required_vulkan_instance_extensions)
            .field("optional_vulkan_instance_extensions", &self.optional_vulkan_instance_extensions)
            .field("required_vulkan_layers", &self.required_vulkan_layers)
            .field("optional_vulkan_layers", &self.optional_vulkan_layers)
            .field("required_vulkan_device_extensions", &self.required_vulkan_device_extensions)
            .field("optional_vulkan_device_extensions", &self.optional_vulkan_device_extensions)
            .field("enable_compute_queue", &self.enable_compute_queue)
            .field("enable_copy_queue", &self.enable_copy_queue)
            .field("enable_ray_tracing_extensions", &self.enable_ray_tracing_extensions)
            .field("enable_debug_runtime", &self.enable_debug_runtime)
            .field("enable_validation_layer", &self.enable_validation_layer)
            .field("swap_chain_format", &self.swap_chain_format)
            .field("back_buffer_width", &self.back_buffer_width)
            .field("back_buffer_height", &self.back_buffer_height)
            .field("swap_chain_buffer_count", &self.swap_chain_buffer_count)
            .field("vsync_enabled", &self.vsync_enabled)
            .field("max_frames_in_flight", &self.max_frames_in_flight)
            .field("window_surface", &self.window_surface)
            .field("adapter_name_substring", &self.adapter_name_substring)
            .finish_non_exhaustive()
    }
}

impl DeviceParams {
    /// 发送一条诊断消息
    pub fn message(&self, text: &str, severity: MessageSeverity) {
        self.message_callback.message(text, severity);
    }

    /// 发送一条信息性消息，使用配置的严重程度
    pub fn info(&self, text: &str) {
        self.message_callback.message(text, self.info_log_severity);
    }

    /// 发送一条错误消息
    pub fn error(&self, text: &str) {
        self.message_callback.message(text, MessageSeverity::Error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::log::testing::CollectingCallback;
    use std::sync::Arc;

    #[test]
    fn test_default_params() {
        let params = DeviceParams::default();
        assert_eq!(params.swap_chain_buffer_count, 3);
        assert_eq!(params.max_frames_in_flight, 2);
        assert!(params.window_surface.is_none());
    }

    #[test]
    fn test_info_uses_configured_severity() {
        let sink = Arc::new(CollectingCallback::default());
        let params = DeviceParams {
            info_log_severity: MessageSeverity::Warning,
            message_callback: sink.clone(),
            ..Default::default()
        };
        params.info("Enabled Vulkan layers:");
        assert!(sink.contains("Enabled Vulkan layers:", MessageSeverity::Warning));
    }
}
