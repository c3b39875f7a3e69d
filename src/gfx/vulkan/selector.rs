//! 物理设备选择
//!
//! 先把每个适配器的能力查询成快照，再对快照做纯函数式的评估。评估不会短路，
//! 所有不满足的条件都记录下来，最终的错误消息因此是完整的。

use std::collections::BTreeSet;
use std::fmt;

use ash::vk;

use super::api::{AdapterFeatures, VulkanApi};
use super::queues::{resolve_queues, QueueFamily, QueueFamilyAssignment};
use crate::core::error::{DeviceError, Result};

/// 交换链相关的要求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapChainRequirements {
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub image_count: u32,
}

/// 单个适配器的能力快照
#[derive(Debug, Clone)]
pub struct AdapterSnapshot {
    pub handle: vk::PhysicalDevice,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub extensions: Vec<String>,
    pub features: AdapterFeatures,
    pub surface_capabilities: vk::SurfaceCapabilitiesKHR,
    pub surface_formats: Vec<vk::SurfaceFormatKHR>,
    pub queue_families: Vec<QueueFamily>,
    /// 每个队列族能否呈现到窗口表面
    pub present_support: Vec<bool>,
}

impl AdapterSnapshot {
    /// 查询一个适配器
    pub fn query(
        api: &dyn VulkanApi,
        handle: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        let properties = api
            .adapter_properties(handle)
            .map_err(|e| DeviceError::native("query Vulkan device properties", e))?;
        let features = api
            .adapter_features(handle)
            .map_err(|e| DeviceError::native("query Vulkan device features", e))?;
        let extensions = api
            .adapter_extensions(handle)
            .map_err(|e| DeviceError::native("enumerate Vulkan device extensions", e))?;
        let surface_capabilities = api
            .surface_capabilities(handle, surface)
            .map_err(|e| DeviceError::native("query surface capabilities", e))?;
        let surface_formats = api
            .surface_formats(handle, surface)
            .map_err(|e| DeviceError::native("query surface formats", e))?;
        let queue_families = api
            .queue_families(handle)
            .map_err(|e| DeviceError::native("query Vulkan queue families", e))?;
        let present_support = (0..queue_families.len() as u32)
            .map(|family| api.surface_support(handle, family, surface))
            .collect::<ash::prelude::VkResult<Vec<bool>>>()
            .map_err(|e| DeviceError::native("query surface support", e))?;

        Ok(Self {
            handle,
            name: properties.name,
            device_type: properties.device_type,
            extensions,
            features,
            surface_capabilities,
            surface_formats,
            queue_families,
            present_support,
        })
    }

    fn can_present(&self, family: u32) -> bool {
        self.present_support
            .get(family as usize)
            .copied()
            .unwrap_or(false)
    }
}

/// 查询所有适配器
pub fn gather_adapters(api: &dyn VulkanApi, surface: vk::SurfaceKHR) -> Result<Vec<AdapterSnapshot>> {
    let adapters = api
        .enumerate_adapters()
        .map_err(|e| DeviceError::native("enumerate Vulkan physical devices", e))?;
    adapters
        .into_iter()
        .map(|handle| AdapterSnapshot::query(api, handle, surface))
        .collect()
}

/// 适配器被拒绝的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    MissingExtension(String),
    NoSamplerAnisotropy,
    NoTextureCompressionBc,
    ImageCount { requested: u32, min: u32, max: u32 },
    Extent {
        requested: vk::Extent2D,
        min: vk::Extent2D,
        max: vk::Extent2D,
    },
    Format,
    QueueTypes,
    CannotPresent,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::MissingExtension(name) => write!(f, "missing {}", name),
            RejectionReason::NoSamplerAnisotropy => f.write_str("does not support samplerAnisotropy"),
            RejectionReason::NoTextureCompressionBc => {
                f.write_str("does not support textureCompressionBC")
            }
            RejectionReason::ImageCount { requested, min, max } => write!(
                f,
                "cannot support the requested swap chain image count: requested {}, available {} - {}",
                requested, min, max
            ),
            RejectionReason::Extent { requested, min, max } => write!(
                f,
                "cannot support the requested swap chain size: requested {}x{}, available {}x{} - {}x{}",
                requested.width, requested.height, min.width, min.height, max.width, max.height
            ),
            RejectionReason::Format => f.write_str("does not support the requested swap chain format"),
            RejectionReason::QueueTypes => f.write_str("does not support the necessary queue types"),
            RejectionReason::CannotPresent => f.write_str("cannot present"),
        }
    }
}

/// 评估后的候选适配器
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub handle: vk::PhysicalDevice,
    pub name: String,
    pub discrete: bool,
    pub extensions: Vec<String>,
    pub queues: Option<QueueFamilyAssignment>,
    pub reasons: Vec<RejectionReason>,
}

impl DeviceCandidate {
    pub fn passed(&self) -> bool {
        self.reasons.is_empty()
    }

    fn diagnostic(&self) -> String {
        let mut text = format!("{}:", self.name);
        for reason in &self.reasons {
            text.push_str(&format!("\n  - {}", reason));
        }
        text
    }
}

/// 评估单个适配器
pub fn evaluate(
    snapshot: &AdapterSnapshot,
    required_extensions: &BTreeSet<String>,
    swap_chain: &SwapChainRequirements,
    wants_compute: bool,
    wants_transfer: bool,
) -> DeviceCandidate {
    let mut reasons = Vec::new();

    let reported: BTreeSet<&str> = snapshot.extensions.iter().map(|s| s.as_str()).collect();
    for ext in required_extensions {
        if !reported.contains(ext.as_str()) {
            reasons.push(RejectionReason::MissingExtension(ext.clone()));
        }
    }

    if !snapshot.features.sampler_anisotropy {
        reasons.push(RejectionReason::NoSamplerAnisotropy);
    }
    if !snapshot.features.texture_compression_bc {
        reasons.push(RejectionReason::NoTextureCompressionBc);
    }

    let caps = &snapshot.surface_capabilities;
    // max_image_count 为 0 表示没有上限
    if caps.min_image_count > swap_chain.image_count
        || (caps.max_image_count > 0 && caps.max_image_count < swap_chain.image_count)
    {
        reasons.push(RejectionReason::ImageCount {
            requested: swap_chain.image_count,
            min: caps.min_image_count,
            max: caps.max_image_count,
        });
    }

    let requested = swap_chain.extent;
    if caps.min_image_extent.width > requested.width
        || caps.min_image_extent.height > requested.height
        || caps.max_image_extent.width < requested.width
        || caps.max_image_extent.height < requested.height
    {
        reasons.push(RejectionReason::Extent {
            requested,
            min: caps.min_image_extent,
            max: caps.max_image_extent,
        });
    }

    if !snapshot
        .surface_formats
        .iter()
        .any(|f| f.format == swap_chain.format)
    {
        reasons.push(RejectionReason::Format);
    }

    let queues = resolve_queues(
        &snapshot.queue_families,
        wants_compute,
        wants_transfer,
        |family| snapshot.can_present(family),
    );
    if queues.is_none() {
        reasons.push(RejectionReason::QueueTypes);
    }

    // 必须能从图形队列呈现
    let graphics = queues
        .and_then(|q| q.graphics)
        .or_else(|| first_graphics_family(&snapshot.queue_families));
    if !graphics.is_some_and(|family| snapshot.can_present(family)) {
        reasons.push(RejectionReason::CannotPresent);
    }

    DeviceCandidate {
        handle: snapshot.handle,
        name: snapshot.name.clone(),
        discrete: snapshot.device_type == vk::PhysicalDeviceType::DISCRETE_GPU,
        extensions: snapshot.extensions.clone(),
        queues,
        reasons,
    }
}

fn first_graphics_family(families: &[QueueFamily]) -> Option<u32> {
    families
        .iter()
        .position(|f| f.queue_count > 0 && f.flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|i| i as u32)
}

pub const SELECTION_FAILURE_HEADER: &str =
    "Cannot find a Vulkan device that supports all the required extensions and properties.";

/// 选择设备
///
/// 优先选择第一个通过的独立显卡，否则选择第一个通过的其他适配器，保持枚举顺序。
/// 全部失败时返回包含每个适配器原因的完整消息。
pub fn select_device(candidates: Vec<DeviceCandidate>) -> std::result::Result<DeviceCandidate, String> {
    let mut message = SELECTION_FAILURE_HEADER.to_string();
    let mut discrete = None;
    let mut other = None;

    for candidate in candidates {
        message.push('\n');
        message.push_str(&candidate.diagnostic());

        if !candidate.passed() {
            continue;
        }
        if candidate.discrete {
            if discrete.is_none() {
                discrete = Some(candidate);
            }
        } else if other.is_none() {
            other = Some(candidate);
        }
    }

    discrete.or(other).ok_or(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn requirements() -> SwapChainRequirements {
        SwapChainRequirements {
            format: vk::Format::B8G8R8A8_SRGB,
            extent: vk::Extent2D { width: 1280, height: 720 },
            image_count: 3,
        }
    }

    fn required() -> BTreeSet<String> {
        ["VK_KHR_swapchain".to_string()].into_iter().collect()
    }

    fn snapshot(raw: u64, name: &str, device_type: vk::PhysicalDeviceType) -> AdapterSnapshot {
        AdapterSnapshot {
            handle: vk::PhysicalDevice::from_raw(raw),
            name: name.to_string(),
            device_type,
            extensions: vec!["VK_KHR_swapchain".to_string()],
            features: AdapterFeatures {
                sampler_anisotropy: true,
                texture_compression_bc: true,
            },
            surface_capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 0,
                min_image_extent: vk::Extent2D { width: 1, height: 1 },
                max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
                ..Default::default()
            },
            surface_formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            queue_families: vec![QueueFamily::new(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 4)],
            present_support: vec![true],
        }
    }

    fn eval(s: &AdapterSnapshot) -> DeviceCandidate {
        evaluate(s, &required(), &requirements(), false, false)
    }

    #[test]
    fn test_good_adapter_passes() {
        let candidate = eval(&snapshot(1, "GPU", vk::PhysicalDeviceType::DISCRETE_GPU));
        assert!(candidate.passed(), "{:?}", candidate.reasons);
        assert_eq!(candidate.queues.unwrap().graphics, Some(0));
    }

    #[test]
    fn test_all_failures_are_collected() {
        let mut s = snapshot(1, "Toaster", vk::PhysicalDeviceType::CPU);
        s.extensions.clear();
        s.features = AdapterFeatures::default();
        s.surface_capabilities.max_image_count = 2;
        s.surface_capabilities.max_image_extent = vk::Extent2D { width: 640, height: 480 };
        s.surface_formats.clear();
        s.present_support = vec![false];

        let candidate = eval(&s);
        assert_eq!(candidate.reasons.len(), 8);
        let text = candidate.diagnostic();
        assert!(text.starts_with("Toaster:"));
        assert!(text.contains("  - missing VK_KHR_swapchain"));
        assert!(text.contains("  - does not support samplerAnisotropy"));
        assert!(text.contains("  - does not support textureCompressionBC"));
        assert!(text.contains("requested 3, available 2 - 2"));
        assert!(text.contains("requested 1280x720, available 1x1 - 640x480"));
        assert!(text.contains("  - does not support the requested swap chain format"));
        assert!(text.contains("  - does not support the necessary queue types"));
        assert!(text.contains("  - cannot present"));
    }

    #[test]
    fn test_unbounded_max_image_count_accepts_any() {
        let mut s = snapshot(1, "GPU", vk::PhysicalDeviceType::DISCRETE_GPU);
        s.surface_capabilities.max_image_count = 0;
        let reqs = SwapChainRequirements { image_count: 64, ..requirements() };
        assert!(evaluate(&s, &required(), &reqs, false, false).passed());
    }

    #[test]
    fn test_discrete_preferred_then_enumeration_order() {
        let candidates = vec![
            eval(&snapshot(1, "Integrated", vk::PhysicalDeviceType::INTEGRATED_GPU)),
            eval(&snapshot(2, "Discrete A", vk::PhysicalDeviceType::DISCRETE_GPU)),
            eval(&snapshot(3, "Discrete B", vk::PhysicalDeviceType::DISCRETE_GPU)),
        ];
        assert_eq!(select_device(candidates).unwrap().name, "Discrete A");

        let candidates = vec![
            eval(&snapshot(1, "Virtual", vk::PhysicalDeviceType::VIRTUAL_GPU)),
            eval(&snapshot(2, "Integrated", vk::PhysicalDeviceType::INTEGRATED_GPU)),
        ];
        assert_eq!(select_device(candidates).unwrap().name, "Virtual");
    }

    #[test]
    fn test_failing_discrete_falls_back_to_other() {
        let mut bad = snapshot(1, "Broken Discrete", vk::PhysicalDeviceType::DISCRETE_GPU);
        bad.features.sampler_anisotropy = false;
        let candidates = vec![
            eval(&bad),
            eval(&snapshot(2, "Integrated", vk::PhysicalDeviceType::INTEGRATED_GPU)),
        ];
        assert_eq!(select_device(candidates).unwrap().name, "Integrated");
    }

    #[test]
    fn test_selection_failure_aggregates_every_adapter() {
        let mut a = snapshot(1, "Adapter A", vk::PhysicalDeviceType::DISCRETE_GPU);
        a.features.sampler_anisotropy = false;
        let mut b = snapshot(2, "Adapter B", vk::PhysicalDeviceType::INTEGRATED_GPU);
        b.extensions.clear();

        let message = select_device(vec![eval(&a), eval(&b)]).unwrap_err();
        assert!(message.starts_with(SELECTION_FAILURE_HEADER));
        assert!(message.contains("\nAdapter A:\n  - does not support samplerAnisotropy"));
        assert!(message.contains("\nAdapter B:\n  - missing VK_KHR_swapchain"));
    }
}
