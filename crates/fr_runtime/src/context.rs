// crates/fr_runtime/src/context.rs

//! GPU 设备上下文
//!
//! 实例 → 适配器 → 设备/队列的获取，忙标志与错误标志的维护。
//! 每个设备只允许取出一个 [`CommandQueue`]，保证单一提交者。

use crate::capabilities::DeviceCapabilities;
use crate::program::{Program, ProgramBuilder};
use crate::queue::CommandQueue;
use fr_foundation::{FrError, FrResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use wgpu::{
    Adapter, Device, DeviceDescriptor, Features, Instance, InstanceDescriptor, Limits,
    PowerPreference, Queue, RequestAdapterOptions,
};

/// 设备选择方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceSelection {
    /// 高性能优先（独立显卡）
    #[default]
    HighPerformance,
    /// 低功耗优先（集成显卡）
    LowPower,
    /// 按枚举顺序的固定索引
    Index(usize),
}

/// GPU 设备
///
/// 句柄可克隆；底层 wgpu 对象由 `Arc` 共享。
#[derive(Clone)]
pub struct GpuDevice {
    device: Arc<Device>,
    queue: Arc<Queue>,
    capabilities: Arc<DeviceCapabilities>,
    busy: Arc<AtomicBool>,
    errored: Arc<AtomicBool>,
    queue_taken: Arc<AtomicBool>,
}

impl GpuDevice {
    /// 按选择策略获取设备（阻塞）
    pub fn acquire(selection: DeviceSelection) -> FrResult<Self> {
        pollster::block_on(Self::acquire_async(selection))
    }

    /// 按选择策略获取设备
    pub async fn acquire_async(selection: DeviceSelection) -> FrResult<Self> {
        let instance = Instance::new(InstanceDescriptor::default());

        let adapter = Self::pick_adapter(&instance, selection).await?;
        let capabilities = DeviceCapabilities::from_adapter(&adapter);

        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("freshet device"),
                    required_features: Features::empty(),
                    required_limits: Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| FrError::DeviceUnavailable(e.to_string()))?;

        tracing::info!(
            device = %capabilities.name,
            backend = %capabilities.backend,
            kind = %capabilities.device_kind,
            "compute device acquired"
        );

        // 运行期设备错误置位错误标志，后续提交快速失败
        let errored = Arc::new(AtomicBool::new(false));
        let errored_flag = errored.clone();
        device.on_uncaptured_error(Box::new(move |error| {
            tracing::error!(%error, "uncaptured device error");
            errored_flag.store(true, Ordering::Release);
        }));

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            capabilities: Arc::new(capabilities),
            busy: Arc::new(AtomicBool::new(false)),
            errored,
            queue_taken: Arc::new(AtomicBool::new(false)),
        })
    }

    async fn pick_adapter(
        instance: &Instance,
        selection: DeviceSelection,
    ) -> FrResult<Adapter> {
        match selection {
            DeviceSelection::Index(idx) => {
                let mut adapters = instance.enumerate_adapters(wgpu::Backends::all());
                if idx >= adapters.len() {
                    return Err(FrError::DeviceUnavailable(format!(
                        "设备索引 {} 超出可用设备数 {}",
                        idx,
                        adapters.len()
                    )));
                }
                Ok(adapters.swap_remove(idx))
            }
            _ => {
                let power_preference = match selection {
                    DeviceSelection::LowPower => PowerPreference::LowPower,
                    _ => PowerPreference::HighPerformance,
                };
                instance
                    .request_adapter(&RequestAdapterOptions {
                        power_preference,
                        force_fallback_adapter: false,
                        compatible_surface: None,
                    })
                    .await
                    .ok_or_else(|| {
                        FrError::DeviceUnavailable("no suitable adapter found".into())
                    })
            }
        }
    }

    /// 编译程序
    ///
    /// 编译失败属于致命错误。
    pub fn compile(&self, builder: ProgramBuilder) -> FrResult<Program> {
        builder.compile(self)
    }

    /// 取出命令队列
    ///
    /// 每个设备仅允许一个提交者；二次取出返回 `InvalidState`。
    pub fn take_queue(&self) -> FrResult<CommandQueue> {
        if self.queue_taken.swap(true, Ordering::SeqCst) {
            return Err(FrError::invalid_state(
                "device queue already taken: one submitter per queue",
            ));
        }
        Ok(CommandQueue::new(
            self.device.clone(),
            self.queue.clone(),
            self.busy.clone(),
            self.errored.clone(),
        ))
    }

    /// 设备是否有未完成的已提交工作
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// 设备是否已进入错误状态
    pub fn is_errored(&self) -> bool {
        self.errored.load(Ordering::Acquire)
    }

    /// 设备是否支持双精度求解核
    pub fn is_double_compatible(&self) -> bool {
        self.capabilities.is_double_compatible()
    }

    /// 设备能力
    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    /// 底层 wgpu 设备
    pub(crate) fn raw_device(&self) -> &Arc<Device> {
        &self.device
    }

    /// 底层 wgpu 队列
    pub(crate) fn raw_queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    /// 阻塞至设备队列排空
    pub fn block_until_finished(&self) {
        let _ = self.device.poll(wgpu::Maintain::Wait);
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_default() {
        assert_eq!(DeviceSelection::default(), DeviceSelection::HighPerformance);
    }

    // 设备获取需要实际硬件
    #[test]
    #[ignore = "Requires GPU hardware"]
    fn test_acquire_and_queue_exclusivity() {
        let device = GpuDevice::acquire(DeviceSelection::HighPerformance).unwrap();
        let _q = device.take_queue().unwrap();
        assert!(device.take_queue().is_err());
    }
}
