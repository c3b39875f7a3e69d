//! 配置管理模块
//!
//! 提供设备管理器配置的加载、解析和管理功能。
//! 支持从 TOML 配置文件加载，也支持命令行参数覆盖。
//!
//! # 配置文件格式 (config.toml)
//!
//! ```toml
//! [window]
//! width = 1280
//! height = 720
//! title = "present_rhi"
//! resizable = true
//!
//! [graphics]
//! backend = "vulkan"  # 或 "dx12"
//! vsync = true
//! swap_chain_buffer_count = 3
//! max_frames_in_flight = 2
//! swap_chain_format = "SRGBA8_UNORM"
//! enable_debug_runtime = false
//!
//! [logging]
//! level = "info"      # trace, debug, info, warn, error
//! file_output = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::{ConfigError, Result};
use crate::gfx::params::{DeviceParams, WindowSurfaceData};
use crate::rhi::{Format, GraphicsApi};

/// 顶层配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// 窗口配置
    #[serde(default)]
    pub window: WindowConfig,

    /// 图形配置
    #[serde(default)]
    pub graphics: GraphicsConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 窗口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default = "default_resizable")]
    pub resizable: bool,
}

/// 图形配置
///
/// 大部分字段与 [`DeviceParams`] 一一对应。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphicsConfig {
    /// 图形后端选择
    #[serde(default = "default_backend")]
    pub backend: GraphicsApi,

    /// 垂直同步
    #[serde(default = "default_vsync")]
    pub vsync: bool,

    #[serde(default = "default_buffer_count")]
    pub swap_chain_buffer_count: u32,

    /// 帧节流深度
    #[serde(default = "default_frames_in_flight")]
    pub max_frames_in_flight: u32,

    #[serde(default)]
    pub swap_chain_format: Format,

    #[serde(default)]
    pub enable_debug_runtime: bool,

    #[serde(default)]
    pub enable_validation_layer: bool,

    #[serde(default)]
    pub enable_compute_queue: bool,

    #[serde(default)]
    pub enable_copy_queue: bool,

    #[serde(default)]
    pub enable_ray_tracing_extensions: bool,

    #[serde(default)]
    pub required_instance_extensions: Vec<String>,

    #[serde(default)]
    pub optional_instance_extensions: Vec<String>,

    #[serde(default)]
    pub required_layers: Vec<String>,

    #[serde(default)]
    pub optional_layers: Vec<String>,

    #[serde(default)]
    pub required_device_extensions: Vec<String>,

    #[serde(default)]
    pub optional_device_extensions: Vec<String>,

    /// 需要屏蔽的验证消息位置
    #[serde(default)]
    pub ignored_validation_message_locations: Vec<usize>,

    /// DX12 适配器名称过滤
    #[serde(default)]
    pub adapter_name_substring: String,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// 是否输出到文件
    #[serde(default = "default_file_output")]
    pub file_output: bool,

    /// 日志文件路径
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// `EnvFilter` 指令字符串
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

// 默认值函数
fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }
fn default_title() -> String { "present_rhi".to_string() }
fn default_resizable() -> bool { true }
fn default_backend() -> GraphicsApi { GraphicsApi::Vulkan }
fn default_vsync() -> bool { true }
fn default_buffer_count() -> u32 { 3 }
fn default_frames_in_flight() -> u32 { 2 }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_file_output() -> bool { false }
fn default_log_file() -> String { "present_rhi.log".to_string() }

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            title: default_title(),
            resizable: default_resizable(),
        }
    }
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            vsync: default_vsync(),
            swap_chain_buffer_count: default_buffer_count(),
            max_frames_in_flight: default_frames_in_flight(),
            swap_chain_format: Format::default(),
            enable_debug_runtime: false,
            enable_validation_layer: false,
            enable_compute_queue: false,
            enable_copy_queue: false,
            enable_ray_tracing_extensions: false,
            required_instance_extensions: Vec::new(),
            optional_instance_extensions: Vec::new(),
            required_layers: Vec::new(),
            optional_layers: Vec::new(),
            required_device_extensions: Vec::new(),
            optional_device_extensions: Vec::new(),
            ignored_validation_message_locations: Vec::new(),
            adapter_name_substring: String::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: default_file_output(),
            log_file: default_log_file(),
        }
    }
}

impl Config {
    /// 从配置文件加载
    ///
    /// # 示例
    ///
    /// ```no_run
    /// use present_rhi::core::Config;
    ///
    /// let config = Config::from_file("config.toml").unwrap();
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let contents = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path_str.clone()))?;

        toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }

    /// 从配置文件加载，如果文件不存在则使用默认配置
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_default()
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// 从命令行参数覆盖配置
    ///
    /// 支持的参数：
    /// - `--dx12` / `--vulkan`: 选择后端
    /// - `--width <value>` / `--height <value>`: 设置窗口尺寸
    /// - `--debug`: 启用调试运行时和帧阶段校验
    /// - `--no-vsync`: 关闭垂直同步
    pub fn apply_args<I>(&mut self, args: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();

        if args.iter().any(|a| a == "--dx12") {
            self.graphics.backend = GraphicsApi::D3D12;
        }

        if args.iter().any(|a| a == "--vulkan") {
            self.graphics.backend = GraphicsApi::Vulkan;
        }

        if let Some(width) = parse_value(&args, "--width") {
            self.window.width = width;
        }

        if let Some(height) = parse_value(&args, "--height") {
            self.window.height = height;
        }

        if args.iter().any(|a| a == "--debug") {
            self.graphics.enable_debug_runtime = true;
            self.graphics.enable_validation_layer = true;
        }

        if args.iter().any(|a| a == "--no-vsync") {
            self.graphics.vsync = false;
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::InvalidValue {
                field: "window.width/height".to_string(),
                reason: "Window dimensions must be greater than 0".to_string(),
            }.into());
        }

        if self.graphics.swap_chain_buffer_count == 0 {
            return Err(ConfigError::InvalidValue {
                field: "graphics.swap_chain_buffer_count".to_string(),
                reason: "At least one swap chain buffer is required".to_string(),
            }.into());
        }

        if self.graphics.max_frames_in_flight == 0 {
            return Err(ConfigError::InvalidValue {
                field: "graphics.max_frames_in_flight".to_string(),
                reason: "At least one frame must be allowed in flight".to_string(),
            }.into());
        }

        Ok(())
    }

    /// 生成设备创建参数
    pub fn device_params(&self, window_surface: Option<WindowSurfaceData>) -> DeviceParams {
        let g = &self.graphics;
        DeviceParams {
            required_vulkan_instance_extensions: g.required_instance_extensions.clone(),
            optional_vulkan_instance_extensions: g.optional_instance_extensions.clone(),
            required_vulkan_layers: g.required_layers.clone(),
            optional_vulkan_layers: g.optional_layers.clone(),
            required_vulkan_device_extensions: g.required_device_extensions.clone(),
            optional_vulkan_device_extensions: g.optional_device_extensions.clone(),
            enable_compute_queue: g.enable_compute_queue,
            enable_copy_queue: g.enable_copy_queue,
            enable_ray_tracing_extensions: g.enable_ray_tracing_extensions,
            enable_debug_runtime: g.enable_debug_runtime,
            enable_validation_layer: g.enable_validation_layer,
            swap_chain_format: g.swap_chain_format,
            back_buffer_width: self.window.width,
            back_buffer_height: self.window.height,
            swap_chain_buffer_count: g.swap_chain_buffer_count,
            vsync_enabled: g.vsync,
            max_frames_in_flight: g.max_frames_in_flight,
            window_surface,
            ignored_vulkan_validation_message_locations: g
                .ignored_validation_message_locations
                .clone(),
            adapter_name_substring: g.adapter_name_substring.clone(),
            ..DeviceParams::default()
        }
    }
}

fn parse_value(args: &[String], flag: &str) -> Option<u32> {
    let idx = args.iter().position(|a| a == flag)?;
    args.get(idx + 1)?.parse().ok()
}
