// crates/fr_physics/src/lib.rs

//! freshet 物理层
//!
//! 二维浅水方程的 GPU 求解核心：
//!
//! - [`domain`]: 规则笛卡尔域与主机端单元数组
//! - [`scheme`]: Godunov 型格式（HLLC + Poleni）、简化惯性变体、
//!   MUSCL-Hancock 变体，以及批处理工作线程
//! - [`gpu`]: WGSL 核函数源码与管线组装
//! - [`engine`]: CPU 参考引擎（小规模域回退与数值验证）
//!
//! # 计算流程
//!
//! 每次迭代按以下顺序提交核函数，阶段间由队列屏障定序：
//!
//! 1. 通量核（HLLC 四面通量 + Poleni 修正 + CFL 候选）
//! 2. 摩擦核（半隐式曼宁，可选）
//! 3. 边界核（稠密扫描或稀疏耦合表）
//! 4. 时间步归约核（动态步长时）
//! 5. 推进核（提交或跳过）
//!
//! 随后翻转乒乓缓冲标志。最多 Q 次迭代构成一个批次，批末回读
//! 遥测标量。

pub mod domain;
pub mod engine;
pub mod gpu;
pub mod scheme;
pub mod types;

pub use domain::{CartesianDomain, CouplingList, DomainSummary};
pub use scheme::{
    BatchTelemetry, CacheConstraints, CacheMode, CouplingMode, QueueMode, RiemannSolver, Scheme,
    SchemeSettings, SchemeVariant, SwScheme, TimestepMode,
};
pub use types::{GridSpec, NumericalParams};
