//! present_rhi - 后端无关的 GPU 设备与呈现管理
//!
//! 负责创建图形设备、选择适配器、解析队列族、建立交换链并控制每帧的
//! 呈现节奏。命令录制层只通过 [`gfx::DeviceManager`] 取得设备句柄和交换链图像。
//!
//! # 模块结构
//!
//! - `core`: 日志、配置、错误处理
//! - `rhi`: 后端无关的设备类型（图形 API、队列、格式、纹理）
//! - `gfx`: 设备管理器接口以及 Vulkan / DirectX 12 实现
//!
//! # 使用示例
//!
//! ```no_run
//! use present_rhi::gfx::{create_device_manager, DeviceParams};
//! use present_rhi::rhi::GraphicsApi;
//!
//! let params = DeviceParams::default();
//! let mut manager = create_device_manager(GraphicsApi::Vulkan, params).unwrap();
//! manager.create_device_and_swap_chain().unwrap();
//!
//! manager.begin_frame().unwrap();
//! // 录制并提交命令 ...
//! manager.present().unwrap();
//! ```

pub mod core;
pub mod rhi;
pub mod gfx;
