// crates/fr_model/src/config.rs

//! 模型配置面

use fr_foundation::Precision;
use fr_physics::SchemeSettings;
use serde::{Deserialize, Serialize};

/// 模型配置
///
/// 汇总驱动层设置与格式配置。设备缺少完整双精度支持时，
/// [`crate::FloodModel::build`] 把请求的双精度强制降为单精度。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// 模拟总长 [s]；任何 `run_next` 的外层上界
    pub simulation_length: f64,
    /// 输出频率 [s]；目标时刻被钳制到下一个输出边界，0 表示不钳制
    pub output_frequency: f64,
    /// 浮点精度
    pub float_precision: Precision,
    /// 设备列表中的索引；None 按性能偏好自动选择
    pub selected_device: Option<usize>,
    /// 找不到计算设备时是否回退到 CPU 参考引擎
    pub allow_cpu_fallback: bool,
    /// 格式配置
    pub scheme: SchemeSettings,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            simulation_length: f64::INFINITY,
            output_frequency: 0.0,
            float_precision: Precision::Double,
            selected_device: None,
            allow_cpu_fallback: true,
            scheme: SchemeSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ModelConfig::default();
        assert_eq!(config.output_frequency, 0.0);
        assert!(config.allow_cpu_fallback);
        assert_eq!(config.float_precision, Precision::Double);
    }

    #[test]
    fn test_config_override() {
        let config = ModelConfig {
            simulation_length: 3600.0,
            output_frequency: 60.0,
            ..ModelConfig::default()
        };
        assert_eq!(config.simulation_length, 3600.0);
        assert_eq!(config.output_frequency, 60.0);
    }
}
