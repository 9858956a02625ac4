// crates/fr_physics/src/engine/mod.rs

//! CPU 参考引擎
//!
//! 与 WGSL 核函数同一套数值语义的主机端实现，用途有二：
//!
//! 1. 小规模域的回退路径：低于派发阈值的网格在 GPU 上得不偿失；
//! 2. 数值验证：单元测试与情景测试直接驱动本引擎。

pub mod friction;
pub mod hllc;
pub mod poleni;
pub mod reference;

pub use friction::manning_update;
pub use hllc::{hllc_face, FaceFlux};
pub use poleni::poleni_discharge;
pub use reference::ReferenceEngine;
