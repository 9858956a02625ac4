// crates/fr_foundation/src/scalar.rs

//! 运行时标量抽象与精度选择
//!
//! 主机端数组统一以 f64 存储，设备端按 [`Precision`] 选择元素宽度，
//! 上传/回读时做一次宽度转换。同一块设备分配只存在一种类型视图。

use bytemuck::Pod;
use num_traits::Float;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 运行时标量 trait
///
/// 统一 f32/f64 的最小算术接口，供 CPU 参考引擎与缓冲区转换使用。
pub trait RuntimeScalar: Float + Pod + Send + Sync + fmt::Debug + 'static {
    /// 零值
    const ZERO: Self;
    /// 从配置 f64 转换
    fn from_config(v: f64) -> Self;
    /// 转换为 f64
    fn to_config(self) -> f64;
}

impl RuntimeScalar for f32 {
    const ZERO: Self = 0.0;

    #[inline]
    fn from_config(v: f64) -> Self {
        v as f32
    }

    #[inline]
    fn to_config(self) -> f64 {
        self as f64
    }
}

impl RuntimeScalar for f64 {
    const ZERO: Self = 0.0;

    #[inline]
    fn from_config(v: f64) -> Self {
        v
    }

    #[inline]
    fn to_config(self) -> f64 {
        self
    }
}

/// 运行时精度枚举
///
/// 在应用层选择计算精度，无需在配置层引入泛型参数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// 单精度浮点 (f32)
    ///
    /// 适用于大规模模拟，GPU 加速时内存占用减半。
    Single,
    /// 双精度浮点 (f64)
    ///
    /// 默认精度。设备不支持完整双精度时由驱动强制降级为单精度。
    #[default]
    Double,
}

impl Precision {
    /// 获取精度名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::Single => "f32",
            Self::Double => "f64",
        }
    }

    /// 每个标量占用的字节数
    pub fn size_bytes(&self) -> usize {
        match self {
            Self::Single => 4,
            Self::Double => 8,
        }
    }

    /// 是否为单精度
    #[inline]
    pub fn is_single(&self) -> bool {
        matches!(self, Self::Single)
    }

    /// 获取典型的机器精度
    pub fn epsilon(&self) -> f64 {
        match self {
            Self::Single => f32::EPSILON as f64,
            Self::Double => f64::EPSILON,
        }
    }

    /// 质量守恒检验的相对容差
    ///
    /// 单精度下数千次迭代的舍入累积明显更大。
    pub fn mass_balance_tolerance(&self) -> f64 {
        match self {
            Self::Single => 1e-3,
            Self::Double => 1e-6,
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 精度解析错误
#[derive(Debug, Clone)]
pub struct PrecisionParseError(String);

impl FromStr for Precision {
    type Err = PrecisionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "f32" | "float" | "single" | "float32" => Ok(Self::Single),
            "f64" | "double" | "float64" => Ok(Self::Double),
            _ => Err(PrecisionParseError(s.to_string())),
        }
    }
}

impl fmt::Display for PrecisionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "无效的精度值: '{}', 期望 'single' 或 'double'", self.0)
    }
}

impl std::error::Error for PrecisionParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precision_default() {
        assert_eq!(Precision::default(), Precision::Double);
    }

    #[test]
    fn test_precision_size_bytes() {
        assert_eq!(Precision::Single.size_bytes(), 4);
        assert_eq!(Precision::Double.size_bytes(), 8);
    }

    #[test]
    fn test_precision_parse() {
        assert_eq!("single".parse::<Precision>().unwrap(), Precision::Single);
        assert_eq!("f64".parse::<Precision>().unwrap(), Precision::Double);
        assert!("half".parse::<Precision>().is_err());
    }

    #[test]
    fn test_scalar_roundtrip() {
        let v = <f32 as RuntimeScalar>::from_config(1.5);
        assert_eq!(v.to_config(), 1.5);
        assert_eq!(<f64 as RuntimeScalar>::ZERO, 0.0);
    }
}
