//! 后端无关的设备类型
//!
//! 外部的命令录制层只通过这些类型与设备管理器交互：图形 API 标识、
//! 队列标识、纹理包装以及逻辑设备描述。

pub mod format;
pub mod texture;

use serde::{Deserialize, Serialize};

pub use format::Format;
pub use texture::{NativeObject, ResourceStates, Texture, TextureDesc, TextureHandle};

/// 图形 API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphicsApi {
    Vulkan,
    #[serde(alias = "dx12")]
    D3D12,
}

impl GraphicsApi {
    pub fn name(&self) -> &'static str {
        match self {
            GraphicsApi::Vulkan => "Vulkan",
            GraphicsApi::D3D12 => "DirectX 12",
        }
    }
}

/// 逻辑队列角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandQueue {
    Graphics,
    Compute,
    Copy,
    Present,
}

/// 队列标识：角色 + 队列族索引
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueInfo {
    pub queue: CommandQueue,
    pub family_index: u32,
}

/// 交给命令录制层的逻辑设备描述
///
/// 只包含原生设备句柄和队列标识，不暴露提交队列本身。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    pub api: GraphicsApi,
    /// 原生设备句柄（`VkDevice` 或 `ID3D12Device*`）
    pub native_device: u64,
    pub queues: Vec<QueueInfo>,
}

impl DeviceHandle {
    pub fn queue_family(&self, queue: CommandQueue) -> Option<u32> {
        self.queues
            .iter()
            .find(|q| q.queue == queue)
            .map(|q| q.family_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_family_lookup() {
        let handle = DeviceHandle {
            api: GraphicsApi::Vulkan,
            native_device: 1,
            queues: vec![
                QueueInfo { queue: CommandQueue::Graphics, family_index: 0 },
                QueueInfo { queue: CommandQueue::Copy, family_index: 2 },
            ],
        };
        assert_eq!(handle.queue_family(CommandQueue::Copy), Some(2));
        assert_eq!(handle.queue_family(CommandQueue::Compute), None);
    }

    #[test]
    fn test_graphics_api_names() {
        assert_eq!(GraphicsApi::Vulkan.name(), "Vulkan");
        assert_eq!(GraphicsApi::D3D12.name(), "DirectX 12");
    }
}
