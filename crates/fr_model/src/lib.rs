// crates/fr_model/src/lib.rs

//! freshet 模型驱动
//!
//! 一个模型持有一个域、一个格式与一个设备，向调用方提供的目标
//! 时刻推进模拟并汇报进度。
//!
//! # 使用示例
//!
//! ```no_run
//! use fr_model::{FloodModel, ModelConfig};
//!
//! let mut model = FloodModel::build(ModelConfig::default()).unwrap();
//! {
//!     let domain = model.domain_mut();
//!     domain.set_resolution(1.0, 1.0).unwrap();
//!     domain.set_extent(100, 100).unwrap();
//!     for id in 0..10_000 {
//!         domain.set_bed_elevation(id, 0.0).unwrap();
//!         domain.set_fsl(id, 1.0).unwrap();
//!     }
//! }
//! model.prepare().unwrap();
//! model.run_next(3600.0).unwrap();
//! println!("t = {}", model.progress().current_time);
//! ```

pub mod config;
pub mod driver;
pub mod logging;
pub mod profiler;

pub use config::ModelConfig;
pub use driver::{FloodModel, Progress};
pub use logging::TracingLogger;
pub use profiler::TracingProfiler;

// 配置面枚举转发自物理层
pub use fr_physics::{
    CacheConstraints, CacheMode, CouplingMode, QueueMode, RiemannSolver, SchemeSettings,
    SchemeVariant, TimestepMode,
};
