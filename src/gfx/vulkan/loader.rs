//! Vulkan 加载器状态
//!
//! 动态库入口每个进程只加载一次。每个设备管理器另外记录自己的加载阶段：
//! 全局函数先于实例创建，实例函数在实例创建之后，设备函数在设备创建之后重新加载。
//! 销毁时阶段回到 `Unloaded`。

use std::sync::OnceLock;

use crate::core::error::{DeviceError, Result};

static ENTRY: OnceLock<std::result::Result<ash::Entry, String>> = OnceLock::new();

/// 进程级的 Vulkan 入口
pub fn entry() -> Result<&'static ash::Entry> {
    let loaded = ENTRY.get_or_init(|| {
        // SAFETY: 只在第一次访问时加载，库在进程结束前不会卸载
        match unsafe { ash::Entry::load() } {
            Ok(entry) => {
                tracing::debug!("Vulkan loader initialized");
                Ok(entry)
            }
            Err(e) => Err(e.to_string()),
        }
    });
    loaded
        .as_ref()
        .map_err(|message| DeviceError::native("load the Vulkan library", message))
}

/// 加载阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoaderStage {
    Unloaded,
    Global,
    Instance,
    Device,
}

/// 单个设备管理器的加载阶段跟踪
#[derive(Debug)]
pub struct LoaderState {
    stage: LoaderStage,
}

impl Default for LoaderState {
    fn default() -> Self {
        Self {
            stage: LoaderStage::Unloaded,
        }
    }
}

impl LoaderState {
    pub fn stage(&self) -> LoaderStage {
        self.stage
    }

    pub fn init_global(&mut self) -> Result<()> {
        self.advance(LoaderStage::Unloaded, LoaderStage::Global)
    }

    pub fn init_instance(&mut self) -> Result<()> {
        self.advance(LoaderStage::Global, LoaderStage::Instance)
    }

    pub fn init_device(&mut self) -> Result<()> {
        self.advance(LoaderStage::Instance, LoaderStage::Device)
    }

    pub fn reset(&mut self) {
        self.stage = LoaderStage::Unloaded;
    }

    fn advance(&mut self, from: LoaderStage, to: LoaderStage) -> Result<()> {
        if self.stage != from {
            return Err(DeviceError::InvalidState(format!(
                "Vulkan loader cannot move to {:?} from {:?}",
                to, self.stage
            )));
        }
        tracing::trace!(stage = ?to, "Vulkan loader stage");
        self.stage = to;
        Ok(())
    }
}
