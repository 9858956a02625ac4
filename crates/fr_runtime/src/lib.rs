// crates/fr_runtime/src/lib.rs

//! freshet 设备运行时门面
//!
//! 将计算设备抽象为四个概念：设备、程序、缓冲区、计算核，
//! 外加设备持有的命令队列。底层基于 wgpu（Vulkan/Metal/DX12）。
//!
//! # 排序保证
//!
//! - 同一队列内，[`CommandQueue::barrier`] 之前提交的命令先于其后
//!   提交的命令完成；
//! - [`CommandQueue::flush_and_set_marker`] 提交已录制的命令并附加
//!   完成标记，标记解析时设备忙标志清零；
//! - [`CommandQueue::block_until_finished`] 阻塞至队列排空，随后
//!   待读回的缓冲区可安全解析。
//!
//! # 架构
//!
//! ```text
//! +-------------+      +----------+      +---------------+
//! |  GpuDevice  | ---> | Program  | ---> | ComputeKernel |
//! +-------------+      +----------+      +---------------+
//!        |
//!        v
//! +--------------+     +------------------+
//! | CommandQueue | <-> | RawDeviceBuffer  |
//! +--------------+     +------------------+
//! ```

pub mod buffer;
pub mod capabilities;
pub mod context;
pub mod kernel;
pub mod program;
pub mod queue;

pub use buffer::{BufferKind, RawDeviceBuffer, ScalarBuffer, U32Buffer};
pub use capabilities::{DeviceCapabilities, DeviceKind, MemoryInfo};
pub use context::{DeviceSelection, GpuDevice};
pub use kernel::{ComputeKernel, KernelBuilder};
pub use program::{Program, ProgramBuilder};
pub use queue::CommandQueue;
