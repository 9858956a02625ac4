// crates/fr_physics/src/engine/poleni.rs

//! Poleni 堰流修正
//!
//! 当面标志置位且上游水位越过堰顶时，该面的流量以 Poleni 公式替换：
//!
//! ```text
//! q = c · (2/3) · √(2g) · (η_up − z_crest)^1.5
//! ```
//!
//! 下游水位亦越过堰顶时为淹没出流，乘以 √(1 − r³)，
//! 其中 `r = (η_down − z_crest)/(η_up − z_crest)`。

/// Poleni 过堰单宽流量（无符号，调用方按上游方向定号）
///
/// 返回 0 表示上游水位未越过堰顶。
pub fn poleni_discharge(eta_up: f64, eta_down: f64, crest: f64, c: f64, g: f64) -> f64 {
    let head = eta_up - crest;
    if head <= 0.0 {
        return 0.0;
    }

    let q_free = c * (2.0 / 3.0) * (2.0 * g).sqrt() * head.powf(1.5);

    let down_head = eta_down - crest;
    if down_head <= 0.0 {
        return q_free;
    }

    // 淹没修正
    let r = (down_head / head).clamp(0.0, 1.0);
    q_free * (1.0 - r * r * r).max(0.0).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    const G: f64 = 9.806_65;

    #[test]
    fn test_no_flow_below_crest() {
        assert_eq!(poleni_discharge(0.9, 0.0, 1.0, 0.577, G), 0.0);
    }

    #[test]
    fn test_free_flow_formula() {
        // 水头 1 m，c = 0.577
        let q = poleni_discharge(2.0, 0.5, 1.0, 0.577, G);
        let expected = 0.577 * (2.0 / 3.0) * (2.0 * G).sqrt();
        assert!((q - expected).abs() < 1e-12);
    }

    #[test]
    fn test_submerged_reduces_flow() {
        let q_free = poleni_discharge(2.0, 0.5, 1.0, 0.577, G);
        let q_sub = poleni_discharge(2.0, 1.5, 1.0, 0.577, G);
        assert!(q_sub < q_free);
        assert!(q_sub > 0.0);
    }

    #[test]
    fn test_fully_submerged_is_zero() {
        // r = 1 时通量归零
        let q = poleni_discharge(2.0, 2.0, 1.0, 0.577, G);
        assert!(q.abs() < 1e-12);
    }
}
