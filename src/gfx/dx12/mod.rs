//! DirectX 12 后端
//!
//! 适配器选择、设备、命令队列和 flip-discard 交换链。帧节流与 Vulkan 后端共用
//! [`FramePacer`](crate::gfx::pacer::FramePacer)，令牌是同一个 D3D12 栅栏上的递增值。

pub mod manager;

pub use manager::Dx12DeviceManager;

use windows::Win32::Graphics::Dxgi::Common::*;

use crate::rhi::Format;

/// 交换链缓冲的 DXGI 格式
///
/// flip 模型的交换链不接受 sRGB 格式，sRGB 格式使用对应的 UNORM 存储格式。
pub fn to_dxgi_format(format: Format) -> DXGI_FORMAT {
    match format {
        Format::RGBA8_UNORM | Format::SRGBA8_UNORM => DXGI_FORMAT_R8G8B8A8_UNORM,
        Format::BGRA8_UNORM | Format::SBGRA8_UNORM => DXGI_FORMAT_B8G8R8A8_UNORM,
        Format::R10G10B10A2_UNORM => DXGI_FORMAT_R10G10B10A2_UNORM,
        Format::RGBA16_FLOAT => DXGI_FORMAT_R16G16B16A16_FLOAT,
    }
}

/// 以 NUL 结尾的 UTF-16 适配器描述
pub(crate) fn adapter_description(raw: &[u16]) -> String {
    let len = raw.iter().position(|&c| c == 0).unwrap_or(raw.len());
    String::from_utf16_lossy(&raw[..len])
}

/// 按名称子串选择适配器，空串选择第一个
pub(crate) fn pick_adapter(names: &[String], substring: &str) -> Option<usize> {
    names
        .iter()
        .position(|name| substring.is_empty() || name.contains(substring))
}
