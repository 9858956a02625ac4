// crates/fr_physics/src/domain/mod.rs

//! 计算域
//!
//! 规则笛卡尔域持有网格几何与全部主机端单元数组。设备端缓冲区
//! 由格式的 `prepare` 分配，与域的主机数组一一对应。

pub mod cartesian;
pub mod coupling;

pub use cartesian::{CartesianDomain, DomainSnapshot, DomainSummary, StateIndex, StateReadback};
pub use coupling::CouplingList;

/// Poleni 标志位：北面
pub const POLENI_N: u8 = 1 << 0;
/// Poleni 标志位：东面
pub const POLENI_E: u8 = 1 << 1;
/// Poleni 标志位：南面
pub const POLENI_S: u8 = 1 << 2;
/// Poleni 标志位：西面
pub const POLENI_W: u8 = 1 << 3;
