//! DirectX 12 设备管理器

use raw_window_handle::RawWindowHandle;
use windows::core::Interface;
use windows::Win32::Foundation::{CloseHandle, HANDLE, HWND};
use windows::Win32::Graphics::Direct3D::D3D_FEATURE_LEVEL_11_0;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;
use windows::Win32::System::Threading::{CreateEventA, WaitForSingleObject, INFINITE};

use super::{adapter_description, pick_adapter, to_dxgi_format};
use crate::core::error::{DeviceError, Result};
use crate::gfx::backend::DeviceManager;
use crate::gfx::pacer::{CompletionSource, FramePacer, FrameTracker};
use crate::gfx::params::DeviceParams;
use crate::rhi::{
    CommandQueue, DeviceHandle, GraphicsApi, NativeObject, QueueInfo, Texture, TextureDesc, TextureHandle,
};

/// 已创建的设备对象，COM 引用在析构时释放
struct Dx12Device {
    _factory: IDXGIFactory4,
    device: ID3D12Device,
    graphics_queue: ID3D12CommandQueue,
    compute_queue: Option<ID3D12CommandQueue>,
    copy_queue: Option<ID3D12CommandQueue>,
    swap_chain: IDXGISwapChain3,
    buffers: Vec<ID3D12Resource>,
    textures: Vec<TextureHandle>,
    fence: ID3D12Fence,
    fence_event: HANDLE,
    fence_value: u64,
}

impl Dx12Device {
    /// 在图形队列上触发一个新值并等待它完成
    fn flush(&mut self) -> Result<()> {
        self.fence_value += 1;
        let value = self.fence_value;
        unsafe { self.graphics_queue.Signal(&self.fence, value) }
            .map_err(|e| DeviceError::native("signal the D3D12 fence", e))?;
        wait_for_value(&self.fence, self.fence_event, value)
    }
}

fn wait_for_value(fence: &ID3D12Fence, event: HANDLE, value: u64) -> Result<()> {
    unsafe {
        if fence.GetCompletedValue() < value {
            fence
                .SetEventOnCompletion(value, event)
                .map_err(|e| DeviceError::native("set the D3D12 fence event", e))?;
            WaitForSingleObject(event, INFINITE);
        }
    }
    Ok(())
}

/// 帧令牌是共享栅栏上的目标值
struct FenceValueSource<'a> {
    queue: &'a ID3D12CommandQueue,
    fence: &'a ID3D12Fence,
    event: HANDLE,
    next_value: &'a mut u64,
}

impl CompletionSource for FenceValueSource<'_> {
    type Token = u64;

    fn create_token(&mut self) -> Result<u64> {
        Ok(0)
    }

    fn reset_token(&mut self, token: &mut u64) -> Result<()> {
        *token = 0;
        Ok(())
    }

    fn arm_token(&mut self, token: &mut u64) -> Result<()> {
        *self.next_value += 1;
        let value = *self.next_value;
        unsafe { self.queue.Signal(self.fence, value) }
            .map_err(|e| DeviceError::native("signal the D3D12 fence", e))?;
        *token = value;
        Ok(())
    }

    fn wait_token(&mut self, token: &mut u64) -> Result<()> {
        wait_for_value(self.fence, self.event, *token)
    }
}

pub struct Dx12DeviceManager {
    params: DeviceParams,
    device: Option<Dx12Device>,
    renderer_string: String,
    back_buffer_index: usize,
    pacer: FramePacer<u64>,
    frame: FrameTracker,
}

impl Dx12DeviceManager {
    pub fn new(params: DeviceParams) -> Self {
        let pacer = FramePacer::new(params.max_frames_in_flight);
        let frame = FrameTracker::new(params.enable_validation_layer);
        Self {
            params,
            device: None,
            renderer_string: String::new(),
            back_buffer_index: 0,
            pacer,
            frame,
        }
    }

    fn hwnd(&self) -> Result<HWND> {
        match self.params.window_surface.as_ref().map(|w| w.window) {
            Some(RawWindowHandle::Win32(handle)) => Ok(HWND(handle.hwnd.get() as *mut core::ffi::c_void)),
            Some(_) => Err(DeviceError::InvalidState(
                "DirectX 12 requires a Win32 window handle".to_string(),
            )),
            None => Err(DeviceError::InvalidState(
                "a window surface is required to create a swap chain".to_string(),
            )),
        }
    }

    fn select_adapter(&self, factory: &IDXGIFactory4) -> Result<(IDXGIAdapter1, String)> {
        let mut adapters = Vec::new();
        let mut names = Vec::new();
        let mut index = 0;
        // 枚举到 DXGI_ERROR_NOT_FOUND 为止
        while let Ok(adapter) = unsafe { factory.EnumAdapters1(index) } {
            index += 1;
            let desc = unsafe { adapter.GetDesc1() }
                .map_err(|e| DeviceError::native("query the DXGI adapter description", e))?;
            if desc.Flags & DXGI_ADAPTER_FLAG_SOFTWARE.0 as u32 != 0 {
                continue;
            }
            names.push(adapter_description(&desc.Description));
            adapters.push(adapter);
        }

        match pick_adapter(&names, &self.params.adapter_name_substring) {
            Some(i) => Ok((adapters.swap_remove(i), names.swap_remove(i))),
            None => {
                let message = if self.params.adapter_name_substring.is_empty() {
                    "Cannot find a hardware DXGI adapter.".to_string()
                } else {
                    format!(
                        "Cannot find a DXGI adapter whose description contains '{}'. Available adapters:{}",
                        self.params.adapter_name_substring,
                        names.iter().map(|n| format!("\n  - {}", n)).collect::<String>()
                    )
                };
                self.params.error(&message);
                Err(DeviceError::NoSuitableAdapter(message))
            }
        }
    }

    fn create_queue(device: &ID3D12Device, kind: D3D12_COMMAND_LIST_TYPE) -> Result<ID3D12CommandQueue> {
        let desc = D3D12_COMMAND_QUEUE_DESC {
            Type: kind,
            Flags: D3D12_COMMAND_QUEUE_FLAG_NONE,
            ..Default::default()
        };
        unsafe { device.CreateCommandQueue(&desc) }
            .map_err(|e| DeviceError::native("create a D3D12 command queue", e))
    }

    fn try_create(&mut self) -> Result<Dx12Device> {
        let hwnd = self.hwnd()?;

        let factory_flags = if self.params.enable_debug_runtime {
            let mut debug: Option<ID3D12Debug> = None;
            match unsafe { D3D12GetDebugInterface(&mut debug) }.ok().and(debug) {
                Some(debug) => {
                    unsafe { debug.EnableDebugLayer() };
                    tracing::debug!("DX12 debug layer enabled");
                }
                None => tracing::warn!("Failed to enable DX12 debug layer"),
            }
            DXGI_CREATE_FACTORY_DEBUG
        } else {
            DXGI_CREATE_FACTORY_FLAGS(0)
        };

        let factory: IDXGIFactory4 = unsafe { CreateDXGIFactory2(factory_flags) }
            .map_err(|e| DeviceError::native("create a DXGI factory", e))?;
        let (adapter, name) = self.select_adapter(&factory)?;

        let mut device: Option<ID3D12Device> = None;
        unsafe { D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_11_0, &mut device) }
            .map_err(|e| DeviceError::native("create a D3D12 device", e))?;
        let device = device.ok_or_else(|| DeviceError::native("create a D3D12 device", "no device returned"))?;

        let graphics_queue = Self::create_queue(&device, D3D12_COMMAND_LIST_TYPE_DIRECT)?;
        let compute_queue = if self.params.enable_compute_queue {
            Some(Self::create_queue(&device, D3D12_COMMAND_LIST_TYPE_COMPUTE)?)
        } else {
            None
        };
        let copy_queue = if self.params.enable_copy_queue {
            Some(Self::create_queue(&device, D3D12_COMMAND_LIST_TYPE_COPY)?)
        } else {
            None
        };

        let swap_chain_desc = DXGI_SWAP_CHAIN_DESC1 {
            Width: self.params.back_buffer_width,
            Height: self.params.back_buffer_height,
            Format: to_dxgi_format(self.params.swap_chain_format),
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                ..Default::default()
            },
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: self.params.swap_chain_buffer_count,
            SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
            ..Default::default()
        };
        let swap_chain: IDXGISwapChain1 =
            unsafe { factory.CreateSwapChainForHwnd(&graphics_queue, hwnd, &swap_chain_desc, None, None) }
                .map_err(|e| DeviceError::native("create a DXGI swap chain", e))?;
        let swap_chain: IDXGISwapChain3 = swap_chain
            .cast()
            .map_err(|e| DeviceError::native("query IDXGISwapChain3", e))?;

        let fence: ID3D12Fence = unsafe { device.CreateFence(0, D3D12_FENCE_FLAG_NONE) }
            .map_err(|e| DeviceError::native("create a D3D12 fence", e))?;
        let fence_event = unsafe { CreateEventA(None, false, false, None) }
            .map_err(|e| DeviceError::native("create a fence event", e))?;

        let mut created = Dx12Device {
            _factory: factory,
            device,
            graphics_queue,
            compute_queue,
            copy_queue,
            swap_chain,
            buffers: Vec::new(),
            textures: Vec::new(),
            fence,
            fence_event,
            fence_value: 0,
        };
        if let Err(err) = self.fetch_back_buffers(&mut created) {
            release(created);
            return Err(err);
        }

        self.renderer_string = name;
        Ok(created)
    }

    fn fetch_back_buffers(&self, device: &mut Dx12Device) -> Result<()> {
        device.buffers.clear();
        device.textures.clear();
        for i in 0..self.params.swap_chain_buffer_count {
            let buffer: ID3D12Resource = unsafe { device.swap_chain.GetBuffer(i) }
                .map_err(|e| DeviceError::native("retrieve a swap chain buffer", e))?;
            let desc = TextureDesc::swap_chain_image(
                self.params.back_buffer_width,
                self.params.back_buffer_height,
                self.params.swap_chain_format,
            );
            device
                .textures
                .push(Texture::from_native(NativeObject::D3D12Resource(buffer.as_raw() as usize), desc));
            device.buffers.push(buffer);
        }
        tracing::info!(
            width = self.params.back_buffer_width,
            height = self.params.back_buffer_height,
            buffers = device.buffers.len(),
            "Swap chain created"
        );
        Ok(())
    }

    fn resize_buffers(&mut self, device: &mut Dx12Device, width: u32, height: u32) -> Result<()> {
        device.flush()?;
        device.buffers.clear();
        device.textures.clear();
        unsafe {
            device.swap_chain.ResizeBuffers(
                self.params.swap_chain_buffer_count,
                width,
                height,
                to_dxgi_format(self.params.swap_chain_format),
                DXGI_SWAP_CHAIN_FLAG(0),
            )
        }
        .map_err(|e| DeviceError::native("resize the swap chain buffers", e))?;
        self.params.back_buffer_width = width;
        self.params.back_buffer_height = height;
        self.fetch_back_buffers(device)
    }

    fn teardown(&mut self) {
        if let Some(mut device) = self.device.take() {
            if let Err(e) = device.flush() {
                tracing::warn!(error = %e, "GPU flush failed during teardown");
            }
            // 设备已经空闲，令牌直接丢弃
            self.pacer.drain();
            release(device);
            tracing::info!("DirectX 12 device destroyed");
        }
        self.back_buffer_index = 0;
        self.frame.reset();
        self.renderer_string.clear();
    }
}

fn release(device: Dx12Device) {
    if let Err(e) = unsafe { CloseHandle(device.fence_event) } {
        tracing::warn!(error = %e, "Failed to close the fence event");
    }
}

impl DeviceManager for Dx12DeviceManager {
    fn graphics_api(&self) -> GraphicsApi {
        GraphicsApi::D3D12
    }

    fn device(&self) -> Option<DeviceHandle> {
        let device = self.device.as_ref()?;
        let mut queues = vec![
            QueueInfo {
                queue: CommandQueue::Graphics,
                family_index: D3D12_COMMAND_LIST_TYPE_DIRECT.0 as u32,
            },
            QueueInfo {
                queue: CommandQueue::Present,
                family_index: D3D12_COMMAND_LIST_TYPE_DIRECT.0 as u32,
            },
        ];
        if device.compute_queue.is_some() {
            queues.push(QueueInfo {
                queue: CommandQueue::Compute,
                family_index: D3D12_COMMAND_LIST_TYPE_COMPUTE.0 as u32,
            });
        }
        if device.copy_queue.is_some() {
            queues.push(QueueInfo {
                queue: CommandQueue::Copy,
                family_index: D3D12_COMMAND_LIST_TYPE_COPY.0 as u32,
            });
        }
        Some(DeviceHandle {
            api: GraphicsApi::D3D12,
            native_device: device.device.as_raw() as u64,
            queues,
        })
    }

    fn create_device_and_swap_chain(&mut self) -> Result<()> {
        if self.device.is_some() {
            return Err(DeviceError::InvalidState("the D3D12 device already exists".to_string()));
        }

        match self.try_create() {
            Ok(device) => {
                self.device = Some(device);
                self.params
                    .info(&format!("Created DirectX 12 device: {}", self.renderer_string));
                tracing::info!(device = %self.renderer_string, "DirectX 12 device created");
                Ok(())
            }
            Err(err) => {
                if !matches!(err, DeviceError::NoSuitableAdapter(_)) {
                    self.params.error(&err.to_string());
                }
                tracing::error!(error = %err, "DirectX 12 device creation failed");
                self.teardown();
                Err(err)
            }
        }
    }

    fn destroy_device_and_swap_chain(&mut self) {
        self.teardown();
    }

    fn resize_swap_chain(&mut self, width: u32, height: u32) -> Result<()> {
        let Some(mut device) = self.device.take() else {
            return Ok(());
        };

        let result = self.resize_buffers(&mut device, width, height);

        self.device = Some(device);
        self.frame.reset();
        result
    }

    fn begin_frame(&mut self) -> Result<()> {
        let Some(device) = self.device.as_ref() else {
            return Err(DeviceError::InvalidState("BeginFrame called without a swap chain".to_string()));
        };
        self.frame.check_begin()?;
        self.back_buffer_index = unsafe { device.swap_chain.GetCurrentBackBufferIndex() } as usize;
        self.frame.begun();
        tracing::trace!(index = self.back_buffer_index, "Frame begun");
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        let Some(device) = self.device.as_mut() else {
            return Err(DeviceError::InvalidState("Present called without a swap chain".to_string()));
        };
        self.frame.check_present()?;

        let sync_interval = u32::from(self.params.vsync_enabled);
        unsafe { device.swap_chain.Present(sync_interval, DXGI_PRESENT(0)) }
            .ok()
            .map_err(|e| DeviceError::native("present a swap chain image", e))?;

        if self.params.enable_debug_runtime {
            device.flush()?;
        } else {
            let mut source = FenceValueSource {
                queue: &device.graphics_queue,
                fence: &device.fence,
                event: device.fence_event,
                next_value: &mut device.fence_value,
            };
            self.pacer.throttle(&mut source)?;
        }

        self.frame.presented();
        Ok(())
    }

    fn back_buffer(&self, index: usize) -> Option<TextureHandle> {
        self.device.as_ref()?.textures.get(index).cloned()
    }

    fn current_back_buffer_index(&self) -> usize {
        self.back_buffer_index
    }

    fn back_buffer_count(&self) -> usize {
        self.device.as_ref().map_or(0, |d| d.textures.len())
    }

    fn renderer_string(&self) -> &str {
        &self.renderer_string
    }

    fn device_params(&self) -> &DeviceParams {
        &self.params
    }

    fn frames_in_flight(&self) -> usize {
        self.pacer.in_flight()
    }
}

impl Drop for Dx12DeviceManager {
    fn drop(&mut self) {
        self.teardown();
    }
}
