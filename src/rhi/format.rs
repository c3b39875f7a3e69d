//! 后端无关的像素格式

use serde::{Deserialize, Serialize};

/// 交换链可用的颜色格式
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    RGBA8_UNORM,
    SRGBA8_UNORM,
    BGRA8_UNORM,
    SBGRA8_UNORM,
    R10G10B10A2_UNORM,
    RGBA16_FLOAT,
}

impl Format {
    /// 交换链格式替换
    ///
    /// RGBA 顺序的 8 位格式被替换为 BGRA 顺序，后者是桌面平台上普遍支持的呈现格式。
    /// 替换发生在适配器能力检查之前。
    pub fn swap_chain_substitute(self) -> Self {
        match self {
            Format::SRGBA8_UNORM => Format::SBGRA8_UNORM,
            Format::RGBA8_UNORM => Format::BGRA8_UNORM,
            other => other,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Format::RGBA8_UNORM => "RGBA8_UNORM",
            Format::SRGBA8_UNORM => "SRGBA8_UNORM",
            Format::BGRA8_UNORM => "BGRA8_UNORM",
            Format::SBGRA8_UNORM => "SBGRA8_UNORM",
            Format::R10G10B10A2_UNORM => "R10G10B10A2_UNORM",
            Format::RGBA16_FLOAT => "RGBA16_FLOAT",
        }
    }
}

impl Default for Format {
    fn default() -> Self {
        Format::SRGBA8_UNORM
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitution_only_touches_rgba8() {
        assert_eq!(Format::SRGBA8_UNORM.swap_chain_substitute(), Format::SBGRA8_UNORM);
        assert_eq!(Format::RGBA8_UNORM.swap_chain_substitute(), Format::BGRA8_UNORM);
        assert_eq!(Format::RGBA16_FLOAT.swap_chain_substitute(), Format::RGBA16_FLOAT);
        assert_eq!(Format::SBGRA8_UNORM.swap_chain_substitute(), Format::SBGRA8_UNORM);
    }

    #[test]
    fn test_format_toml_name() {
        #[derive(Deserialize)]
        struct Holder {
            format: Format,
        }
        let holder: Holder = toml::from_str("format = \"SBGRA8_UNORM\"").unwrap();
        assert_eq!(holder.format, Format::SBGRA8_UNORM);
    }
}
