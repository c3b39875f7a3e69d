//! 日志系统模块
//!
//! 基于 `tracing` 提供结构化的日志记录功能，并定义设备管理器的诊断消息接口。
//!
//! # 使用示例
//!
//! ```no_run
//! use present_rhi::core::log;
//! use present_rhi::core::config::LogLevel;
//!
//! // 初始化日志系统
//! log::init_logger(LogLevel::Info, false, None);
//!
//! tracing::info!(width = 800, height = 600, "Window created");
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self as tracing_fmt, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use super::config::LogLevel;

/// 初始化日志系统
///
/// 必须在程序开始时调用一次。
///
/// # 参数
///
/// * `level` - 日志级别
/// * `file_output` - 是否输出到文件
/// * `log_file_path` - 日志文件路径（可选，默认为 "present_rhi.log"）
pub fn init_logger(level: LogLevel, file_output: bool, log_file_path: Option<&str>) {
    let filter = EnvFilter::new(level.as_filter());

    if file_output {
        let log_path = log_file_path.unwrap_or("present_rhi.log");
        let path = Path::new(log_path);
        let directory = path.parent().unwrap_or(Path::new("."));
        let filename = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("present_rhi.log");

        // 每天滚动
        let file_appender = RollingFileAppender::new(Rotation::DAILY, directory, filename);

        let console_layer = tracing_fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_ansi(true);

        let file_layer = tracing_fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_ansi(false)
            .with_writer(file_appender);

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .try_init();
    } else {
        let fmt_layer = tracing_fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(true);

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init();
    }
}

/// 初始化简单的日志系统（仅控制台输出，Info 级别）
pub fn init_simple() {
    init_logger(LogLevel::Info, false, None);
}

/// 引擎核心日志 - Info 级别
#[macro_export]
macro_rules! engine_info {
    ($($arg:tt)*) => {
        tracing::info!(target: "present_rhi::engine", $($arg)*)
    };
}

/// 引擎核心日志 - Warn 级别
#[macro_export]
macro_rules! engine_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: "present_rhi::engine", $($arg)*)
    };
}

/// 引擎核心日志 - Error 级别
#[macro_export]
macro_rules! engine_error {
    ($($arg:tt)*) => {
        tracing::error!(target: "present_rhi::engine", $($arg)*)
    };
}

/// 诊断消息的严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageSeverity {
    Info,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for MessageSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageSeverity::Info => "info",
            MessageSeverity::Warning => "warning",
            MessageSeverity::Error => "error",
            MessageSeverity::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// 诊断消息接收端
///
/// 协商器和设备选择器是主要的消息来源。实现者决定消息的去向
/// （日志、控制台、测试收集器等）。
pub trait MessageCallback {
    fn message(&self, text: &str, severity: MessageSeverity);
}

/// 共享的消息回调句柄
pub type SharedMessageCallback = Arc<dyn MessageCallback + Send + Sync>;

/// 默认的消息回调：转发到 `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMessageCallback;

impl MessageCallback for TracingMessageCallback {
    fn message(&self, text: &str, severity: MessageSeverity) {
        match severity {
            MessageSeverity::Info => tracing::info!(target: "present_rhi::device", "{}", text),
            MessageSeverity::Warning => tracing::warn!(target: "present_rhi::device", "{}", text),
            MessageSeverity::Error | MessageSeverity::Fatal => {
                tracing::error!(target: "present_rhi::device", severity = %severity, "{}", text)
            }
        }
    }
}

/// 创建默认的消息回调
pub fn default_message_callback() -> SharedMessageCallback {
    Arc::new(TracingMessageCallback)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// 收集所有消息，供测试断言
    #[derive(Default)]
    pub struct CollectingCallback {
        pub messages: Mutex<Vec<(String, MessageSeverity)>>,
    }

    impl CollectingCallback {
        pub fn contains(&self, needle: &str, severity: MessageSeverity) -> bool {
            self.messages
                .lock()
                .unwrap()
                .iter()
                .any(|(text, s)| *s == severity && text.contains(needle))
        }

        pub fn count(&self, severity: MessageSeverity) -> usize {
            self.messages
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, s)| *s == severity)
                .count()
        }
    }

    impl MessageCallback for CollectingCallback {
        fn message(&self, text: &str, severity: MessageSeverity) {
            self.messages.lock().unwrap().push((text.to_string(), severity));
        }
    }
}
