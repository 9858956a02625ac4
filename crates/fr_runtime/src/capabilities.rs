// crates/fr_runtime/src/capabilities.rs

//! 设备能力描述
//!
//! 从 wgpu 适配器探测设备类型、工作组限制与内存限制。

use wgpu::{Adapter, Features};

/// 设备类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// CPU
    Cpu,
    /// 独立显卡
    DiscreteGpu,
    /// 集成显卡
    IntegratedGpu,
    /// 虚拟GPU
    VirtualGpu,
    /// 未知类型
    Unknown,
}

impl DeviceKind {
    /// 是否为GPU类型
    pub fn is_gpu(&self) -> bool {
        matches!(
            self,
            DeviceKind::DiscreteGpu | DeviceKind::IntegratedGpu | DeviceKind::VirtualGpu
        )
    }
}

impl From<wgpu::DeviceType> for DeviceKind {
    fn from(t: wgpu::DeviceType) -> Self {
        match t {
            wgpu::DeviceType::Cpu => DeviceKind::Cpu,
            wgpu::DeviceType::DiscreteGpu => DeviceKind::DiscreteGpu,
            wgpu::DeviceType::IntegratedGpu => DeviceKind::IntegratedGpu,
            wgpu::DeviceType::VirtualGpu => DeviceKind::VirtualGpu,
            wgpu::DeviceType::Other => DeviceKind::Unknown,
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Cpu => write!(f, "CPU"),
            DeviceKind::DiscreteGpu => write!(f, "Discrete GPU"),
            DeviceKind::IntegratedGpu => write!(f, "Integrated GPU"),
            DeviceKind::VirtualGpu => write!(f, "Virtual GPU"),
            DeviceKind::Unknown => write!(f, "Unknown"),
        }
    }
}

/// 内存信息
#[derive(Debug, Clone)]
pub struct MemoryInfo {
    /// 单个缓冲区最大字节数
    pub max_buffer_size: u64,
    /// 单个存储绑定最大字节数
    pub max_storage_binding_size: u64,
}

/// 设备能力描述
#[derive(Debug, Clone)]
pub struct DeviceCapabilities {
    /// 设备名称
    pub name: String,
    /// 后端名称 (Vulkan/Metal/DX12)
    pub backend: String,
    /// 设备类型
    pub device_kind: DeviceKind,
    /// 工作组最大线程总数
    pub max_workgroup_size: u32,
    /// 各维度最大工作组尺寸
    pub max_workgroup_dims: [u32; 3],
    /// 单维最大工作组派发数
    pub max_workgroups_per_dim: u32,
    /// 内存信息
    pub memory: MemoryInfo,
    /// 适配器是否报告 f64 特性
    ///
    /// WGSL 不提供 64 位浮点类型，因此即使适配器报告该特性，
    /// 本运行时的着色器路径也无法消费它。参见
    /// [`DeviceCapabilities::is_double_compatible`]。
    pub adapter_reports_f64: bool,
}

impl DeviceCapabilities {
    /// 从 wgpu 适配器探测能力
    pub fn from_adapter(adapter: &Adapter) -> Self {
        let info = adapter.get_info();
        let limits = adapter.limits();

        Self {
            name: info.name,
            backend: format!("{:?}", info.backend),
            device_kind: info.device_type.into(),
            max_workgroup_size: limits.max_compute_invocations_per_workgroup,
            max_workgroup_dims: [
                limits.max_compute_workgroup_size_x,
                limits.max_compute_workgroup_size_y,
                limits.max_compute_workgroup_size_z,
            ],
            max_workgroups_per_dim: limits.max_compute_workgroups_per_dimension,
            memory: MemoryInfo {
                max_buffer_size: limits.max_buffer_size,
                max_storage_binding_size: limits.max_storage_buffer_binding_size as u64,
            },
            adapter_reports_f64: adapter.features().contains(Features::SHADER_F64),
        }
    }

    /// 设备是否可按双精度运行求解核
    ///
    /// 着色器语言层面不存在 f64，始终返回 false；驱动据此将请求的
    /// 双精度降级为单精度。主机端数组与 CPU 参考引擎保持 f64。
    pub fn is_double_compatible(&self) -> bool {
        false
    }

    /// 是否适合承载求解任务
    pub fn is_suitable(&self) -> bool {
        self.device_kind.is_gpu() && self.max_workgroup_size >= 64
    }

    /// 方形二维工作组的边长约束
    ///
    /// 取 `⌊√总线程数⌋` 与各维度限制的较小者。
    pub fn square_workgroup_constraint(&self) -> u32 {
        let total = (self.max_workgroup_size as f64).sqrt().floor() as u32;
        total
            .min(self.max_workgroup_dims[0])
            .min(self.max_workgroup_dims[1])
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_caps() -> DeviceCapabilities {
        DeviceCapabilities {
            name: "Test".into(),
            backend: "Vulkan".into(),
            device_kind: DeviceKind::DiscreteGpu,
            max_workgroup_size: 256,
            max_workgroup_dims: [256, 256, 64],
            max_workgroups_per_dim: 65_535,
            memory: MemoryInfo {
                max_buffer_size: 1 << 30,
                max_storage_binding_size: 1 << 28,
            },
            adapter_reports_f64: false,
        }
    }

    #[test]
    fn test_device_kind_is_gpu() {
        assert!(DeviceKind::DiscreteGpu.is_gpu());
        assert!(!DeviceKind::Cpu.is_gpu());
    }

    #[test]
    fn test_square_workgroup_constraint() {
        let caps = test_caps();
        assert_eq!(caps.square_workgroup_constraint(), 16);
    }

    #[test]
    fn test_double_never_compatible_on_wgsl() {
        let mut caps = test_caps();
        caps.adapter_reports_f64 = true;
        assert!(!caps.is_double_compatible());
    }
}
