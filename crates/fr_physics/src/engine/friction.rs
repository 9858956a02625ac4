// crates/fr_physics/src/engine/friction.rs

//! 曼宁摩擦
//!
//! 半隐式更新，逐轴进行：
//!
//! ```text
//! q ← q / (1 + Δt · g · n² · |q| / h^(7/3))
//! ```
//!
//! 仅当 `h > QUITE_SMALL` 时施加，避免极浅水深下分母溢出。

/// 单轴半隐式曼宁摩擦更新
pub fn manning_update(q: f64, h: f64, n: f64, dt: f64, g: f64, quite_small: f64) -> f64 {
    if h <= quite_small || n <= 0.0 || dt <= 0.0 {
        return q;
    }
    q / (1.0 + dt * g * n * n * q.abs() / h.powf(7.0 / 3.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const G: f64 = 9.806_65;
    const QUITE_SMALL: f64 = 1e-9;

    #[test]
    fn test_friction_reduces_magnitude() {
        let q = manning_update(1.0, 0.5, 0.03, 0.1, G, QUITE_SMALL);
        assert!(q > 0.0 && q < 1.0);
    }

    #[test]
    fn test_friction_preserves_sign() {
        let q = manning_update(-1.0, 0.5, 0.03, 0.1, G, QUITE_SMALL);
        assert!(q < 0.0 && q > -1.0);
    }

    #[test]
    fn test_shallow_depth_guard() {
        let q = manning_update(1.0, 1e-10, 0.03, 0.1, G, QUITE_SMALL);
        assert_eq!(q, 1.0);
    }

    #[test]
    fn test_zero_roughness_identity() {
        let q = manning_update(1.0, 0.5, 0.0, 0.1, G, QUITE_SMALL);
        assert_eq!(q, 1.0);
    }

    #[test]
    fn test_semi_implicit_never_reverses() {
        // 半隐式形式不可能使流量反向，任意大的 dt 也只会趋零
        let q = manning_update(5.0, 0.1, 0.1, 1e6, G, QUITE_SMALL);
        assert!(q >= 0.0);
        assert!(q < 5.0e-3);
    }
}
