// crates/fr_foundation/src/lib.rs

//! freshet 基础层
//!
//! 定义整个工作区共享的基础设施：错误类型、运行时标量抽象、
//! 容差常量与类型化索引。本层不依赖工作区内任何其他 crate，
//! 禁止引入设备、网格或求解器等高层概念。

pub mod error;
pub mod indices;
pub mod logging;
pub mod scalar;
pub mod tolerance;

pub use error::{FrError, FrResult};
pub use indices::Direction;
pub use logging::{
    noop_logger, noop_profiler, ErrorKind, LoggerHandle, NoopLogger, NoopProfiler, ProfilePhase,
    Profiler, ProfilerHandle, SolverLogger,
};
pub use scalar::{Precision, RuntimeScalar};
pub use tolerance::{
    round_decimals, DISABLED_CELL, GRAVITY, QUITE_SMALL_FACTOR, ROUNDING_DECIMALS,
    VERY_SMALL_DEFAULT,
};
