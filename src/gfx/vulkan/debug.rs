//! 验证层消息转发
//!
//! 调试运行时开启时安装 `VK_EXT_debug_report` 回调，把验证层的错误、警告和
//! 性能警告以 `Warning` 级别转发给诊断消息回调。

use std::ffi::{c_char, c_void, CStr};

use ash::vk;

use crate::core::log::{MessageSeverity, SharedMessageCallback};

/// 回调关心的消息类别
pub fn report_flags() -> vk::DebugReportFlagsEXT {
    vk::DebugReportFlagsEXT::ERROR
        | vk::DebugReportFlagsEXT::WARNING
        | vk::DebugReportFlagsEXT::PERFORMANCE_WARNING
}

/// 回调的用户数据，生命周期必须覆盖回调对象
pub struct DebugReportSink {
    callback: SharedMessageCallback,
    ignored_locations: Vec<usize>,
}

impl DebugReportSink {
    pub fn new(callback: SharedMessageCallback, ignored_locations: Vec<usize>) -> Self {
        Self {
            callback,
            ignored_locations,
        }
    }

    /// 转发一条验证消息，被屏蔽的位置返回 false
    pub fn report(&self, location: usize, code: i32, layer_prefix: &str, message: &str) -> bool {
        if self.ignored_locations.contains(&location) {
            return false;
        }
        self.callback.message(
            &format_report(location, code, layer_prefix, message),
            MessageSeverity::Warning,
        );
        true
    }
}

pub fn format_report(location: usize, code: i32, layer_prefix: &str, message: &str) -> String {
    format!(
        "[Vulkan: location=0x{:x} code={}, layerPrefix='{}'] {}",
        location, code, layer_prefix, message
    )
}

/// `vkCreateDebugReportCallbackEXT` 使用的回调
///
/// # Safety
///
/// `user_data` 必须指向存活的 [`DebugReportSink`]。
pub unsafe extern "system" fn debug_report_callback(
    _flags: vk::DebugReportFlagsEXT,
    _object_type: vk::DebugReportObjectTypeEXT,
    _object: u64,
    location: usize,
    message_code: i32,
    layer_prefix: *const c_char,
    message: *const c_char,
    user_data: *mut c_void,
) -> vk::Bool32 {
    if user_data.is_null() {
        return vk::FALSE;
    }
    let sink = &*(user_data as *const DebugReportSink);
    let prefix = cstr_lossy(layer_prefix);
    let text = cstr_lossy(message);
    sink.report(location, message_code, &prefix, &text);

    // 不中断触发消息的调用
    vk::FALSE
}

unsafe fn cstr_lossy(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}
