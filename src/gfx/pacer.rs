//! 帧节流
//!
//! `FramePacer` 限制同时在 GPU 上执行的帧数。每次呈现后：
//! 1. 在途队列长度超过上限时，弹出最旧的令牌并阻塞等待 GPU 完成，然后放回空闲池
//! 2. 从空闲池取一个令牌（池为空时新建），重置后挂到图形队列上，推入在途队列
//!
//! 令牌的具体类型由后端决定（Vulkan 栅栏、D3D12 栅栏），通过 [`CompletionSource`] 操作。
//! 两个后端共用同一套节流逻辑。

use std::collections::VecDeque;

use crate::core::error::{DeviceError, Result};

/// 完成查询的来源
pub trait CompletionSource {
    type Token;

    fn create_token(&mut self) -> Result<Self::Token>;
    fn reset_token(&mut self, token: &mut Self::Token) -> Result<()>;
    /// 在图形队列当前已提交的工作全部完成时触发令牌
    fn arm_token(&mut self, token: &mut Self::Token) -> Result<()>;
    /// 阻塞直到令牌被触发
    fn wait_token(&mut self, token: &mut Self::Token) -> Result<()>;
}

/// 有界的在途队列加空闲池
#[derive(Debug)]
pub struct FramePacer<T> {
    max_frames_in_flight: usize,
    in_flight: VecDeque<T>,
    free: Vec<T>,
    high_water: usize,
}

impl<T> FramePacer<T> {
    pub fn new(max_frames_in_flight: u32) -> Self {
        Self {
            max_frames_in_flight: max_frames_in_flight as usize,
            in_flight: VecDeque::new(),
            free: Vec::new(),
            high_water: 0,
        }
    }

    pub fn max_frames_in_flight(&self) -> usize {
        self.max_frames_in_flight
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn pooled(&self) -> usize {
        self.free.len()
    }

    /// 在途队列曾经达到的最大长度
    pub fn high_water(&self) -> usize {
        self.high_water
    }

    /// 呈现之后调用
    pub fn throttle<S>(&mut self, source: &mut S) -> Result<()>
    where
        S: CompletionSource<Token = T>,
    {
        while self.in_flight.len() > self.max_frames_in_flight {
            let Some(mut token) = self.in_flight.pop_front() else {
                break;
            };
            let waited = source.wait_token(&mut token);
            self.free.push(token);
            waited?;
        }

        let mut token = match self.free.pop() {
            Some(token) => token,
            None => source.create_token()?,
        };

        if let Err(err) = source
            .reset_token(&mut token)
            .and_then(|_| source.arm_token(&mut token))
        {
            self.free.push(token);
            return Err(err);
        }

        self.in_flight.push_back(token);
        self.high_water = self.high_water.max(self.in_flight.len());
        tracing::trace!(in_flight = self.in_flight.len(), pooled = self.free.len(), "Frame token armed");
        Ok(())
    }

    /// 取出所有令牌（在途的和空闲的），不等待
    ///
    /// 调用者负责在销毁设备之前释放这些令牌的原生对象。
    pub fn drain(&mut self) -> Vec<T> {
        let mut tokens: Vec<T> = self.in_flight.drain(..).collect();
        tokens.append(&mut self.free);
        tokens
    }
}

/// 帧阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    Acquired,
    Submitted,
}

/// 帧阶段跟踪
///
/// 严格模式（帧阶段校验开启）下，错误的调用顺序返回错误；否则只记录警告。
#[derive(Debug)]
pub struct FrameTracker {
    phase: FramePhase,
    strict: bool,
}

impl FrameTracker {
    pub fn new(strict: bool) -> Self {
        Self {
            phase: FramePhase::Idle,
            strict,
        }
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// 检查是否可以开始新的一帧
    pub fn check_begin(&self) -> Result<()> {
        if self.phase == FramePhase::Acquired {
            return self.violation("BeginFrame called twice without an intervening Present");
        }
        Ok(())
    }

    pub fn begun(&mut self) {
        self.phase = FramePhase::Acquired;
    }

    /// 检查是否可以呈现
    pub fn check_present(&self) -> Result<()> {
        if self.phase != FramePhase::Acquired {
            return self.violation("Present called without a preceding BeginFrame");
        }
        Ok(())
    }

    pub fn presented(&mut self) {
        self.phase = FramePhase::Submitted;
    }

    pub fn reset(&mut self) {
        self.phase = FramePhase::Idle;
    }

    fn violation(&self, message: &str) -> Result<()> {
        if self.strict {
            Err(DeviceError::InvalidState(message.to_string()))
        } else {
            tracing::warn!(phase = ?self.phase, "{}", message);
            Ok(())
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// 立即完成的计数令牌来源
    #[derive(Debug, Default)]
    pub struct CountingSource {
        pub created: usize,
        pub waits: usize,
        pub armed: usize,
        pub fail_wait: bool,
    }

    impl CompletionSource for CountingSource {
        type Token = usize;

        fn create_token(&mut self) -> Result<usize> {
            self.created += 1;
            Ok(self.created)
        }

        fn reset_token(&mut self, _token: &mut usize) -> Result<()> {
            Ok(())
        }

        fn arm_token(&mut self, _token: &mut usize) -> Result<()> {
            self.armed += 1;
            Ok(())
        }

        fn wait_token(&mut self, _token: &mut usize) -> Result<()> {
            self.waits += 1;
            if self.fail_wait {
                return Err(DeviceError::native("wait for a fence", "VK_ERROR_DEVICE_LOST"));
            }
            Ok(())
        }
    }
}
