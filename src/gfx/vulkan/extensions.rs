//! Vulkan 能力协商
//!
//! 从内置列表、调用者列表和运行时实际报告的可用列表计算出最终启用的
//! 实例扩展、层和设备扩展。协商器只会向集合中添加元素，
//! `finalize` 之后得到不可变的 [`CapabilitySet`]。

use std::collections::BTreeSet;

use crate::core::error::NegotiationError;
use crate::core::log::{MessageSeverity, SharedMessageCallback};
use crate::gfx::params::DeviceParams;

/// 始终需要的实例扩展
pub const REQUIRED_INSTANCE_EXTENSIONS: &[&str] = &["VK_KHR_get_physical_device_properties2"];

/// 始终需要的设备扩展
pub const REQUIRED_DEVICE_EXTENSIONS: &[&str] = &["VK_KHR_swapchain", "VK_KHR_maintenance1"];

pub const OPTIONAL_INSTANCE_EXTENSIONS: &[&str] =
    &["VK_EXT_sampler_filter_minmax", "VK_EXT_debug_utils"];

pub const OPTIONAL_DEVICE_EXTENSIONS: &[&str] = &[
    "VK_EXT_debug_marker",
    "VK_EXT_descriptor_indexing",
    "VK_KHR_buffer_device_address",
    "VK_NV_mesh_shader",
    "VK_KHR_fragment_shading_rate",
];

/// 光线追踪扩展包，要么全部启用，要么全部不启用
pub const RAY_TRACING_EXTENSIONS: &[&str] = &[
    "VK_KHR_acceleration_structure",
    "VK_KHR_deferred_host_operations",
    "VK_KHR_pipeline_library",
    "VK_KHR_ray_query",
    "VK_KHR_ray_tracing_pipeline",
];

/// 调试运行时额外需要的实例扩展和层
pub const DEBUG_REPORT_EXTENSION: &str = "VK_EXT_debug_report";
pub const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ExtensionSet {
    instance: BTreeSet<String>,
    layers: BTreeSet<String>,
    device: BTreeSet<String>,
}

fn to_set<S: AsRef<str>>(names: &[S]) -> BTreeSet<String> {
    names.iter().map(|s| s.as_ref().to_string()).collect()
}

/// 协商完成后的能力集合
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    enabled: ExtensionSet,
}

impl CapabilitySet {
    pub fn instance_extensions(&self) -> &BTreeSet<String> {
        &self.enabled.instance
    }

    pub fn layers(&self) -> &BTreeSet<String> {
        &self.enabled.layers
    }

    pub fn device_extensions(&self) -> &BTreeSet<String> {
        &self.enabled.device
    }

    pub fn is_instance_extension_enabled(&self, name: &str) -> bool {
        self.enabled.instance.contains(name)
    }

    pub fn is_layer_enabled(&self, name: &str) -> bool {
        self.enabled.layers.contains(name)
    }

    pub fn is_device_extension_enabled(&self, name: &str) -> bool {
        self.enabled.device.contains(name)
    }
}

/// 能力协商器
///
/// 使用流程：
/// 1. `new` 合并内置列表和调用者列表
/// 2. `require_instance_extension` 追加窗口系统需要的表面扩展
/// 3. `negotiate_instance` 对照运行时报告的实例扩展和层
/// 4. 选出适配器后 `negotiate_device` 对照该适配器的设备扩展
/// 5. `finalize`
pub struct CapabilityNegotiator {
    required: ExtensionSet,
    optional: ExtensionSet,
    enabled: ExtensionSet,
    ray_tracing: bool,
    callback: SharedMessageCallback,
    info_severity: MessageSeverity,
}

impl CapabilityNegotiator {
    pub fn new(params: &DeviceParams) -> Self {
        let mut required = ExtensionSet {
            instance: to_set(REQUIRED_INSTANCE_EXTENSIONS),
            layers: BTreeSet::new(),
            device: to_set(REQUIRED_DEVICE_EXTENSIONS),
        };
        required.instance.extend(to_set(&params.required_vulkan_instance_extensions));
        required.layers.extend(to_set(&params.required_vulkan_layers));
        required.device.extend(to_set(&params.required_vulkan_device_extensions));

        if params.enable_debug_runtime {
            required.instance.insert(DEBUG_REPORT_EXTENSION.to_string());
            required.layers.insert(VALIDATION_LAYER.to_string());
        }

        let mut optional = ExtensionSet {
            instance: to_set(OPTIONAL_INSTANCE_EXTENSIONS),
            layers: BTreeSet::new(),
            device: to_set(OPTIONAL_DEVICE_EXTENSIONS),
        };
        optional.instance.extend(to_set(&params.optional_vulkan_instance_extensions));
        optional.layers.extend(to_set(&params.optional_vulkan_layers));
        optional.device.extend(to_set(&params.optional_vulkan_device_extensions));

        Self {
            required,
            optional,
            enabled: ExtensionSet::default(),
            ray_tracing: params.enable_ray_tracing_extensions,
            callback: params.message_callback.clone(),
            info_severity: params.info_log_severity,
        }
    }

    pub fn require_instance_extension(&mut self, name: &str) {
        self.required.instance.insert(name.to_string());
    }

    /// 选择适配器时使用的必需设备扩展
    pub fn required_device_extensions(&self) -> &BTreeSet<String> {
        &self.required.device
    }

    /// 实例级协商之后启用的实例扩展
    pub fn enabled_instance_extensions(&self) -> Vec<String> {
        self.enabled.instance.iter().cloned().collect()
    }

    pub fn enabled_layers(&self) -> Vec<String> {
        self.enabled.layers.iter().cloned().collect()
    }

    /// 实例级协商
    ///
    /// 启用集合为 `required ∪ (optional ∩ available)`；必需项缺失时返回逐条列出的错误，
    /// 扩展缺失优先于层缺失报告。
    pub fn negotiate_instance<S: AsRef<str>>(
        &mut self,
        available_extensions: &[S],
        available_layers: &[S],
    ) -> Result<(), NegotiationError> {
        let available = to_set(available_extensions);
        let absent = missing(&self.required.instance, &available);
        if !absent.is_empty() {
            let err = NegotiationError::MissingInstanceExtensions(absent);
            self.callback.message(&err.to_string(), MessageSeverity::Error);
            return Err(err);
        }
        self.enabled.instance = enable(&self.required.instance, &self.optional.instance, &available);
        self.list("Enabled Vulkan instance extensions:", &self.enabled.instance);

        let available = to_set(available_layers);
        let absent = missing(&self.required.layers, &available);
        if !absent.is_empty() {
            let err = NegotiationError::MissingLayers(absent);
            self.callback.message(&err.to_string(), MessageSeverity::Error);
            return Err(err);
        }
        self.enabled.layers = enable(&self.required.layers, &self.optional.layers, &available);
        self.list("Enabled Vulkan layers:", &self.enabled.layers);

        Ok(())
    }

    /// 设备级协商
    ///
    /// 必需设备扩展已由设备选择器验证过，这里只挑选可选扩展，
    /// 并在调用者要求且适配器支持全部成员时启用光线追踪扩展包。
    pub fn negotiate_device<S: AsRef<str>>(&mut self, adapter_extensions: &[S]) {
        let available = to_set(adapter_extensions);
        self.enabled.device = enable(&self.required.device, &self.optional.device, &available);

        if self.ray_tracing {
            if RAY_TRACING_EXTENSIONS.iter().all(|e| available.contains(*e)) {
                self.enabled.device.extend(to_set(RAY_TRACING_EXTENSIONS));
            } else {
                tracing::warn!("Ray tracing extensions requested but not fully supported by the adapter");
            }
        }

        self.list("Enabled Vulkan device extensions:", &self.enabled.device);
    }

    pub fn finalize(self) -> CapabilitySet {
        CapabilitySet { enabled: self.enabled }
    }

    fn list(&self, header: &str, names: &BTreeSet<String>) {
        self.callback.message(header, self.info_severity);
        for name in names {
            self.callback.message(&format!("    {}", name), self.info_severity);
        }
    }
}

fn missing(required: &BTreeSet<String>, available: &BTreeSet<String>) -> Vec<String> {
    required.difference(available).cloned().collect()
}

fn enable(
    required: &BTreeSet<String>,
    optional: &BTreeSet<String>,
    available: &BTreeSet<String>,
) -> BTreeSet<String> {
    required
        .iter()
        .chain(optional.intersection(available))
        .cloned()
        .collect()
}
