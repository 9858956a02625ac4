// crates/fr_foundation/src/logging.rs

//! 日志与剖析接口
//!
//! 求解器各层通过注入的 trait 对象输出日志与剖析事件，
//! 不直接依赖任何进程级单例。默认实现为空操作。

use std::fmt;
use std::sync::Arc;

/// 错误分级
///
/// 与恢复策略的对应关系：`Fatal` 中止运行；`ModelStop` 清理后可
/// 重新配置重试；`Warning` 记录后继续；`Information` 仅记录。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 致命错误（设备不可用、分配失败、编译失败）
    Fatal,
    /// 模型停止（前置条件违反、持续超限）
    ModelStop,
    /// 警告（单次跳过迭代、零长度批次）
    Warning,
    /// 信息（进度与配置说明）
    Information,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Fatal => write!(f, "FATAL"),
            ErrorKind::ModelStop => write!(f, "MODEL STOP"),
            ErrorKind::Warning => write!(f, "WARNING"),
            ErrorKind::Information => write!(f, "INFO"),
        }
    }
}

/// 求解器日志接口
pub trait SolverLogger: Send + Sync {
    /// 调试信息
    fn log_debug(&self, message: &str);
    /// 一般信息
    fn log_info(&self, message: &str);
    /// 警告
    fn log_warning(&self, message: &str);
    /// 错误，附带分级、出错位置与处置提示
    fn log_error(&self, message: &str, kind: ErrorKind, site: &str, hint: &str);
}

/// 空日志实现
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl SolverLogger for NoopLogger {
    fn log_debug(&self, _message: &str) {}
    fn log_info(&self, _message: &str) {}
    fn log_warning(&self, _message: &str) {}
    fn log_error(&self, _message: &str, _kind: ErrorKind, _site: &str, _hint: &str) {}
}

/// 剖析事件阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfilePhase {
    /// 区间开始
    Start,
    /// 区间结束
    End,
}

/// 剖析接口
///
/// 实现可以为空操作。
pub trait Profiler: Send + Sync {
    /// 记录一个剖析区间端点
    fn profile(&self, tag: &str, phase: ProfilePhase);
}

/// 空剖析实现
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProfiler;

impl Profiler for NoopProfiler {
    fn profile(&self, _tag: &str, _phase: ProfilePhase) {}
}

/// 共享日志句柄
pub type LoggerHandle = Arc<dyn SolverLogger>;

/// 共享剖析句柄
pub type ProfilerHandle = Arc<dyn Profiler>;

/// 创建空日志句柄
pub fn noop_logger() -> LoggerHandle {
    Arc::new(NoopLogger)
}

/// 创建空剖析句柄
pub fn noop_profiler() -> ProfilerHandle {
    Arc::new(NoopProfiler)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_logger_is_object_safe() {
        let logger: LoggerHandle = noop_logger();
        logger.log_info("ok");
        logger.log_error("e", ErrorKind::Warning, "site", "hint");
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::Fatal.to_string(), "FATAL");
        assert_eq!(ErrorKind::ModelStop.to_string(), "MODEL STOP");
    }
}
