//! present_rhi 演示程序
//!
//! 打开一个窗口，创建设备和交换链，然后在事件循环中不断 BeginFrame / Present。
//! 可以通过配置文件或命令行参数选择图形后端。
//!
//! ```bash
//! # 使用配置文件
//! cargo run
//!
//! # 使用 DirectX 12，并打开调试运行时
//! cargo run -- --dx12 --debug
//! ```

use anyhow::Context;
use tracing::{debug, error, info};
use winit::{
    dpi::LogicalSize,
    event::{Event, WindowEvent},
    event_loop::EventLoop,
    window::WindowBuilder,
};

use present_rhi::core::{log, Config, DeviceError};
use present_rhi::gfx::{create_device_manager, WindowSurfaceData};
use present_rhi::{engine_error, engine_info, engine_warn};

fn main() -> anyhow::Result<()> {
    // 1. 加载配置（在初始化日志之前）
    let mut config = Config::from_file_or_default("config.toml");
    config.apply_args(std::env::args());
    if let Err(e) = config.validate() {
        // 配置中的日志设置不可信，退回控制台输出
        log::init_simple();
        engine_error!(error = %e, "Invalid configuration");
        return Err(e).context("Invalid configuration");
    }

    // 2. 初始化日志系统
    let log_file = config
        .logging
        .file_output
        .then_some(config.logging.log_file.as_str());
    log::init_logger(config.logging.level, config.logging.file_output, log_file);
    engine_info!(version = env!("CARGO_PKG_VERSION"), "present_rhi starting...");
    info!(
        backend = ?config.graphics.backend,
        width = config.window.width,
        height = config.window.height,
        vsync = config.graphics.vsync,
        "Graphics configuration"
    );

    // 3. 创建窗口
    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let window = WindowBuilder::new()
        .with_title(config.window.title.as_str())
        .with_inner_size(LogicalSize::new(config.window.width, config.window.height))
        .with_resizable(config.window.resizable)
        .build(&event_loop)
        .context("Failed to create window")?;

    // 4. 创建设备和交换链
    let surface = WindowSurfaceData::from_window(&window).context("Failed to get window handles")?;
    let mut params = config.device_params(Some(surface));
    let size = window.inner_size();
    params.back_buffer_width = size.width;
    params.back_buffer_height = size.height;

    let mut manager = create_device_manager(config.graphics.backend, params)?;
    manager
        .create_device_and_swap_chain()
        .context("Failed to create device and swap chain")?;
    engine_info!(
        renderer = manager.renderer_string(),
        back_buffers = manager.back_buffer_count(),
        "Device ready, entering main loop"
    );

    // 5. 事件循环
    event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { event, .. } => match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down...");
                manager.destroy_device_and_swap_chain();
                elwt.exit();
            }
            WindowEvent::Resized(new_size) => {
                debug!(width = new_size.width, height = new_size.height, "Window resized");
                // 最小化时尺寸为 0，保留旧的交换链
                if new_size.width == 0 || new_size.height == 0 {
                    return;
                }
                if let Err(e) = manager.resize_swap_chain(new_size.width, new_size.height) {
                    engine_warn!(error = %e, "Swap chain resize failed");
                }
            }
            WindowEvent::RedrawRequested => {
                let mut frame = manager.begin_frame();
                if let Err(DeviceError::SwapChainOutOfDate) = frame {
                    // 窗口尺寸已变化但 Resized 尚未送达，重建交换链并跳过这一帧
                    let size = window.inner_size();
                    if size.width > 0 && size.height > 0 {
                        if let Err(e) = manager.resize_swap_chain(size.width, size.height) {
                            engine_warn!(error = %e, "Swap chain resize failed");
                        }
                    }
                    return;
                }
                if frame.is_ok() {
                    frame = manager.present();
                }
                if let Err(e) = frame {
                    engine_error!(error = %e, "Frame failed");
                    error!("Exiting after frame failure");
                    manager.destroy_device_and_swap_chain();
                    elwt.exit();
                }
            }
            _ => (),
        },
        Event::AboutToWait => window.request_redraw(),
        _ => (),
    })?;

    Ok(())
}
