//! 核心功能模块
//!
//! 与具体图形 API 无关的基础设施：日志系统、配置管理和错误处理。
//!
//! # 模块组织
//!
//! - `log`：日志系统和诊断消息回调
//! - `config`：配置管理，支持从配置文件加载设备设置
//! - `error`：错误处理，定义统一的错误类型

pub mod log;
pub mod config;
pub mod error;

// 重新导出常用类型，方便使用
pub use error::{Result, DeviceError, NegotiationError, ConfigError};
pub use config::Config;
pub use log::{MessageCallback, MessageSeverity, SharedMessageCallback};
