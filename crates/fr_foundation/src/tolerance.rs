// crates/fr_foundation/src/tolerance.rs

//! 数值容差与物理常量
//!
//! 干湿判定阈值、禁用单元哨兵值、输入值舍入。

/// 重力加速度 [m/s²]
pub const GRAVITY: f64 = 9.806_65;

/// 干单元深度阈值默认值 [m]
///
/// 深度低于此值的单元视为干单元，动量清零。
pub const VERY_SMALL_DEFAULT: f64 = 1e-10;

/// 摩擦计算深度阈值相对干阈值的倍数
///
/// `QUITE_SMALL = VERY_SMALL * QUITE_SMALL_FACTOR`，
/// 避免极浅水深下摩擦项除以 h^(7/3) 溢出。
pub const QUITE_SMALL_FACTOR: f64 = 10.0;

/// 禁用单元哨兵值
///
/// 最大自由水面位为此值的单元被所有核函数跳过。
pub const DISABLED_CELL: f64 = -9999.0;

/// 输入值舍入的小数位数
///
/// 主机与设备各持一份拷贝，入口处统一舍入，消除两份拷贝间的
/// 差异性舍入。
pub const ROUNDING_DECIMALS: u32 = 5;

/// 按给定小数位数舍入
#[inline]
pub fn round_decimals(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_decimals() {
        assert_eq!(round_decimals(1.234_567_89, 5), 1.234_57);
        assert_eq!(round_decimals(-0.000_004, 5), -0.0);
        assert_eq!(round_decimals(2.5, 0), 3.0);
    }

    #[test]
    fn test_threshold_relation() {
        assert!(VERY_SMALL_DEFAULT * QUITE_SMALL_FACTOR > VERY_SMALL_DEFAULT);
    }
}
