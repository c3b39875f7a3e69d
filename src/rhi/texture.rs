//! 后端无关的纹理包装
//!
//! 交换链图像由各后端以原生句柄的形式返回，这里把它们包装成统一的纹理对象，
//! 供命令录制层使用。

use std::sync::Arc;

use super::format::Format;

/// 资源状态
///
/// 管理器只产出交换链图像，它们在呈现前后都处于可呈现状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStates {
    Present,
}

/// 原生对象句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeObject {
    /// `VkImage`
    VkImage(u64),
    /// `ID3D12Resource*`
    D3D12Resource(usize),
}

/// 纹理描述
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: Format,
    pub debug_name: String,
    pub initial_state: ResourceStates,
    /// 为 true 时，下游不需要为初始状态插入转换屏障
    pub keep_initial_state: bool,
    pub is_render_target: bool,
}

impl TextureDesc {
    /// 交换链图像的标准描述
    pub fn swap_chain_image(width: u32, height: u32, format: Format) -> Self {
        Self {
            width,
            height,
            format,
            debug_name: "Swap chain image".to_string(),
            initial_state: ResourceStates::Present,
            keep_initial_state: true,
            is_render_target: true,
        }
    }
}

/// 包装了原生图像的纹理
#[derive(Debug)]
pub struct Texture {
    desc: TextureDesc,
    native: NativeObject,
}

/// 纹理的共享句柄
pub type TextureHandle = Arc<Texture>;

impl Texture {
    /// 为原生纹理创建句柄，不转移原生对象的所有权
    pub fn from_native(native: NativeObject, desc: TextureDesc) -> TextureHandle {
        Arc::new(Self { desc, native })
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    pub fn native(&self) -> NativeObject {
        self.native
    }

    pub fn extent(&self) -> (u32, u32) {
        (self.desc.width, self.desc.height)
    }
}
