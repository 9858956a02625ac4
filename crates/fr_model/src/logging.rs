// crates/fr_model/src/logging.rs

//! tracing 后端的日志实现
//!
//! 求解器各层只依赖注入的 [`SolverLogger`] 接口；本模块提供默认
//! 实现，把日志转发给进程的 tracing 订阅者。

use fr_foundation::{ErrorKind, SolverLogger};

/// tracing 日志实现
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl SolverLogger for TracingLogger {
    fn log_debug(&self, message: &str) {
        tracing::debug!(target: "freshet", "{message}");
    }

    fn log_info(&self, message: &str) {
        tracing::info!(target: "freshet", "{message}");
    }

    fn log_warning(&self, message: &str) {
        tracing::warn!(target: "freshet", "{message}");
    }

    fn log_error(&self, message: &str, kind: ErrorKind, site: &str, hint: &str) {
        match kind {
            ErrorKind::Fatal | ErrorKind::ModelStop => {
                tracing::error!(target: "freshet", %kind, site, hint, "{message}");
            }
            ErrorKind::Warning => {
                tracing::warn!(target: "freshet", site, hint, "{message}");
            }
            ErrorKind::Information => {
                tracing::info!(target: "freshet", site, "{message}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_logger_is_injectable() {
        let logger: fr_foundation::LoggerHandle = Arc::new(TracingLogger);
        logger.log_info("prepared");
        logger.log_error("device lost", ErrorKind::Fatal, "here", "retry");
    }
}
