// crates/fr_physics/src/scheme/mod.rs

//! 数值格式
//!
//! 格式持有两个交替的单元状态缓冲区、设备端时间状态与批次遥测，
//! 通过专职工作线程向设备批量提交迭代。变体在构造时选定，
//! 选定后核函数集不再变更。

pub mod batch;
pub mod core;
pub mod telemetry;
pub mod worker;

pub use batch::QueueController;
pub use self::core::SwScheme;
pub use telemetry::{BatchTelemetry, EngineTelemetry};

use crate::domain::CartesianDomain;
use crate::domain::StateReadback;
use fr_foundation::{FrResult, Precision};
use serde::{Deserialize, Serialize};

/// 格式变体
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SchemeVariant {
    /// 一阶 Godunov 型（HLLC + Poleni），默认
    #[default]
    Godunov,
    /// 简化惯性形式
    Inertial,
    /// MUSCL-Hancock 二阶
    MusclHancock,
}

impl SchemeVariant {
    /// 摩擦是否折叠在通量核内
    ///
    /// 惯性变体的摩擦项位于面流量分母中，不运行独立摩擦核。
    pub fn friction_in_flux_kernel(&self) -> bool {
        matches!(self, SchemeVariant::Inertial)
    }
}

/// 黎曼求解器选择
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RiemannSolver {
    /// HLLC 近似求解器
    #[default]
    Hllc,
}

/// 时间步长模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TimestepMode {
    /// CFL 条件动态步长
    #[default]
    Cfl,
    /// 调用方提供的固定步长
    Fixed,
}

/// 迭代队列模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum QueueMode {
    /// 自适应队列长度
    #[default]
    Auto,
    /// 固定队列长度
    Fixed,
}

/// 缓存配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CacheMode {
    /// 不使用局部缓存
    #[default]
    None,
    /// 预测性缓存
    Prediction,
    /// 最大化缓存
    Maximum,
}

/// 缓存尺寸约束
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CacheConstraints {
    /// 按实际工作组尺寸
    #[default]
    Actual,
    /// 允许超配
    AllowOversize,
    /// 允许缩减
    AllowUndersize,
}

/// 边界耦合模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CouplingMode {
    /// 每单元一个强迫值
    #[default]
    Dense,
    /// 紧凑耦合表
    Sparse,
}

/// 格式配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemeSettings {
    /// 格式变体
    pub variant: SchemeVariant,
    /// 黎曼求解器
    pub riemann_solver: RiemannSolver,
    /// 时间步长模式
    pub timestep_mode: TimestepMode,
    /// 固定步长 [s]（Fixed 模式）
    pub fixed_timestep: f64,
    /// 初始步长 [s]（Cfl 模式的首次迭代）
    pub initial_timestep: f64,
    /// Courant 数
    pub courant: f64,
    /// 干阈值 [m]
    pub dry_threshold: f64,
    /// 摩擦效应开关
    pub friction_enabled: bool,
    /// 队列模式
    pub queue_mode: QueueMode,
    /// 初始队列长度
    pub initial_queue_size: u32,
    /// 缓存配置
    pub cache_mode: CacheMode,
    /// 缓存尺寸约束
    pub cache_constraints: CacheConstraints,
    /// 边界耦合模式
    pub coupling_mode: CouplingMode,
    /// 浮点精度
    pub precision: Precision,
    /// 步长归约的波前划分数
    pub reduction_wavefronts: u32,
    /// 工作组尺寸（None 按设备约束推导）
    pub work_group_size: Option<(u32, u32)>,
    /// GPU 派发的最小单元数，低于此值回退到 CPU 参考引擎
    pub min_gpu_cells: usize,
}

impl Default for SchemeSettings {
    fn default() -> Self {
        Self {
            variant: SchemeVariant::Godunov,
            riemann_solver: RiemannSolver::Hllc,
            timestep_mode: TimestepMode::Cfl,
            fixed_timestep: 0.1,
            initial_timestep: 0.001,
            courant: 0.5,
            dry_threshold: fr_foundation::VERY_SMALL_DEFAULT,
            friction_enabled: true,
            queue_mode: QueueMode::Auto,
            initial_queue_size: 1,
            cache_mode: CacheMode::None,
            cache_constraints: CacheConstraints::Actual,
            coupling_mode: CouplingMode::Dense,
            precision: Precision::Double,
            reduction_wavefronts: 200,
            work_group_size: None,
            min_gpu_cells: 1000,
        }
    }
}

/// 格式契约
///
/// 一个域绑定一个格式实例；`prepare` 上传全部主机数组并冻结域
/// 几何，`run_batch` 非阻塞地调度一批迭代，`read_back` 把设备端
/// 当前状态同步回域。
pub trait Scheme: Send {
    /// 编译核函数、分配设备缓冲区并上传初始条件
    fn prepare(&mut self, domain: &mut CartesianDomain) -> FrResult<()>;

    /// 调度一个以 `target` 为目标时刻的批次（非阻塞）
    fn run_batch(&mut self, target: f64) -> FrResult<()>;

    /// 阻塞至当前批次完成
    fn wait_idle(&self);

    /// 是否有批次在途
    fn is_busy(&self) -> bool;

    /// 最近一次批次的遥测
    fn telemetry(&self) -> BatchTelemetry;

    /// 标记边界数据待导入（下一批次开始时写入设备）
    fn import_boundaries(&mut self, domain: &CartesianDomain) -> FrResult<()>;

    /// 读回设备端当前状态到域
    fn read_back(&mut self, domain: &mut CartesianDomain) -> FrResult<()>;

    /// 读回当前状态（不经过域）
    fn read_state(&mut self) -> FrResult<StateReadback>;

    /// 释放设备资源；幂等，批次失败后调用亦安全
    fn cleanup(&mut self) -> FrResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_default() {
        let settings = SchemeSettings::default();
        assert_eq!(settings.variant, SchemeVariant::Godunov);
        assert_eq!(settings.courant, 0.5);
        assert_eq!(settings.reduction_wavefronts, 200);
        assert_eq!(settings.dry_threshold, 1e-10);
    }

    #[test]
    fn test_friction_in_flux_kernel() {
        assert!(SchemeVariant::Inertial.friction_in_flux_kernel());
        assert!(!SchemeVariant::Godunov.friction_in_flux_kernel());
        assert!(!SchemeVariant::MusclHancock.friction_in_flux_kernel());
    }
}
