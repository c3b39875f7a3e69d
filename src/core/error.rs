//! 错误处理模块
//!
//! 定义设备管理器使用的统一错误类型，使用 `thiserror` 提供错误消息。
//!
//! # 错误分类
//!
//! - **配置错误**：缺少必需的扩展或层，不会重试
//! - **无可用适配器**：所有枚举到的适配器都未通过硬性要求
//! - **原生调用失败**：实例、设备或交换链创建返回了后端错误码
//! - **交换链过期**：获取图像时交换链已与窗口不匹配，由调用方重建交换链
//! - **状态错误**：在错误的生命周期阶段调用了接口

use thiserror::Error;

/// 设备管理器统一的 Result 类型
pub type Result<T> = std::result::Result<T, DeviceError>;

/// 设备管理器的错误类型
#[derive(Debug, Error)]
pub enum DeviceError {
    /// 缺少必需的实例扩展或层
    #[error(transparent)]
    Configuration(#[from] NegotiationError),

    /// 没有任何适配器满足要求，消息中包含每个适配器的拒绝原因
    #[error("{0}")]
    NoSuitableAdapter(String),

    /// 原生 API 调用失败
    #[error("Failed to {call}, error code = {message}")]
    Native { call: &'static str, message: String },

    /// 交换链与窗口表面不再匹配，调用方应重建交换链后重试
    #[error("The swap chain is out of date")]
    SwapChainOutOfDate,

    /// 接口在错误的状态下被调用
    #[error("Invalid device manager state: {0}")]
    InvalidState(String),

    /// 配置文件错误
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeviceError {
    /// 包装一次失败的原生调用
    pub fn native(call: &'static str, err: impl std::fmt::Display) -> Self {
        DeviceError::Native {
            call,
            message: err.to_string(),
        }
    }
}

/// 能力协商失败
///
/// 每个缺失项单独列出一行，方便一次性修复配置。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    #[error(
        "Cannot create a Vulkan instance because the following required extension(s) are not supported:{}",
        itemize(.0)
    )]
    MissingInstanceExtensions(Vec<String>),

    #[error(
        "Cannot create a Vulkan instance because the following required layer(s) are not supported:{}",
        itemize(.0)
    )]
    MissingLayers(Vec<String>),
}

impl NegotiationError {
    /// 缺失项列表
    pub fn missing(&self) -> &[String] {
        match self {
            NegotiationError::MissingInstanceExtensions(v) | NegotiationError::MissingLayers(v) => v,
        }
    }
}

fn itemize(items: &[String]) -> String {
    items.iter().map(|s| format!("\n  - {}", s)).collect()
}

/// 配置相关的错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件未找到
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    /// 配置文件解析失败
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// 配置值无效
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}
