// crates/fr_foundation/src/error.rs

//! 基础错误类型
//!
//! 定义整个工作区的基础错误类型。高层 crate（设备运行时、求解器、
//! 模型驱动）的错误最终都可表示为本类型的某个变体。
//!
//! # 错误分级
//!
//! 与日志级别的对应关系由调用方决定：设备不可用、内存分配失败、
//! 着色器编译失败属于致命错误（中止运行）；前置条件违反
//! （[`FrError::InvalidState`]）允许调用方重新配置后重试。

use thiserror::Error;

/// 统一结果类型别名
pub type FrResult<T> = Result<T, FrError>;

/// 工作区基础错误
#[derive(Debug, Error)]
pub enum FrError {
    /// 没有可用的计算设备
    #[error("设备不可用: {0}")]
    DeviceUnavailable(String),

    /// 设备内存或主机内存分配失败
    #[error("内存分配失败: {resource} 需要 {bytes} 字节")]
    OutOfMemory {
        /// 资源名称
        resource: String,
        /// 请求的字节数
        bytes: u64,
    },

    /// 着色器编译失败
    #[error("着色器编译失败 [{label}]: {message}")]
    ShaderCompilation {
        /// 程序标签
        label: String,
        /// 编译器输出
        message: String,
    },

    /// 对象处于错误的生命周期阶段
    ///
    /// 例如在 `prepare` 之后修改网格几何，或在 `prepare` 之前读取状态。
    #[error("无效状态: {0}")]
    InvalidState(String),

    /// 单元 ID 或数组索引越界
    #[error("索引越界: {index_type} 索引 {index} 超出范围 0..{len}")]
    Bounds {
        /// 索引类别（如 "Cell", "Coupling"）
        index_type: &'static str,
        /// 访问的索引值
        index: usize,
        /// 容器长度
        len: usize,
    },

    /// 输入数据验证失败
    #[error("无效的输入数据: {0}")]
    InvalidInput(String),

    /// 设备已进入错误状态，后续提交被快速拒绝
    #[error("设备已标记错误: {0}")]
    DeviceErrored(String),

    /// 工作线程通信失败
    #[error("求解器工作线程已退出")]
    WorkerGone,

    /// 内部实现错误（不变量被破坏）
    #[error("内部错误: {0}")]
    Internal(String),
}

impl FrError {
    /// 创建无效状态错误
    #[inline]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// 创建无效输入错误
    #[inline]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// 创建内存分配失败错误
    #[inline]
    pub fn out_of_memory(resource: impl Into<String>, bytes: u64) -> Self {
        Self::OutOfMemory {
            resource: resource.into(),
            bytes,
        }
    }

    /// 创建内部错误
    #[inline]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// 验证索引是否在有效范围内，越界则返回 [`FrError::Bounds`]
    #[inline]
    pub fn check_index(index_type: &'static str, index: usize, len: usize) -> FrResult<()> {
        if index >= len {
            Err(Self::Bounds {
                index_type,
                index,
                len,
            })
        } else {
            Ok(())
        }
    }

    /// 是否为致命错误（中止运行，不可重试）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DeviceUnavailable(_)
                | Self::OutOfMemory { .. }
                | Self::ShaderCompilation { .. }
                | Self::DeviceErrored(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FrError::invalid_state("prepare 之后不允许修改网格");
        assert!(err.to_string().contains("无效状态"));
    }

    #[test]
    fn test_check_index_success() {
        assert!(FrError::check_index("Cell", 5, 10).is_ok());
    }

    #[test]
    fn test_check_index_failure() {
        let result = FrError::check_index("Cell", 10, 10);
        assert!(matches!(result, Err(FrError::Bounds { index: 10, .. })));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(FrError::out_of_memory("cell states", 1024).is_fatal());
        assert!(!FrError::invalid_state("x").is_fatal());
        assert!(FrError::ShaderCompilation {
            label: "godunov".into(),
            message: "syntax".into()
        }
        .is_fatal());
    }
}
