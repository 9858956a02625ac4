// crates/fr_physics/src/gpu/mod.rs

//! GPU 核函数与管线
//!
//! - [`shaders`]: 编译期嵌入的 WGSL 源码
//! - [`pipelines`]: 按变体组装程序、缓冲区与计算核的设备引擎

pub mod pipelines;
pub mod shaders;

pub use pipelines::{ExecDimensions, GpuEngine};
