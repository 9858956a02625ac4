// crates/fr_physics/src/engine/hllc.rs

//! HLLC 近似黎曼求解器
//!
//! 两波 HLLC 求解器，带干底处理：
//!
//! - 两侧皆干：通量为零；
//! - 单侧干：干侧星区水深取零，波速用干底前沿速度估计；
//! - 其余情形：波速由 Roe 平均水深与流速估计。
//!
//! 输入状态以面法向为 x 轴（调用方负责旋转），返回
//! `(质量, 法向动量, 切向动量)` 通量。

/// 面通量三元组
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FaceFlux {
    /// 质量通量 [m²/s]
    pub mass: f64,
    /// 法向动量通量 [m³/s²]
    pub normal: f64,
    /// 切向动量通量 [m³/s²]
    pub transverse: f64,
}

impl FaceFlux {
    /// 零通量
    pub const ZERO: FaceFlux = FaceFlux {
        mass: 0.0,
        normal: 0.0,
        transverse: 0.0,
    };
}

/// 物理通量 F(U)，法向坐标系
#[inline]
fn physical_flux(h: f64, u: f64, v: f64, g: f64) -> FaceFlux {
    FaceFlux {
        mass: h * u,
        normal: h * u * u + 0.5 * g * h * h,
        transverse: h * u * v,
    }
}

/// HLLC 面通量
///
/// # 参数
///
/// - `h_l`, `h_r`: 面两侧重构水深（已做静水重构）
/// - `u_l`, `u_r`: 法向流速
/// - `v_l`, `v_r`: 切向流速
/// - `g`: 重力加速度
/// - `dry`: 干判定阈值
pub fn hllc_face(
    h_l: f64,
    h_r: f64,
    u_l: f64,
    u_r: f64,
    v_l: f64,
    v_r: f64,
    g: f64,
    dry: f64,
) -> FaceFlux {
    let left_dry = h_l < dry;
    let right_dry = h_r < dry;

    if left_dry && right_dry {
        return FaceFlux::ZERO;
    }

    let c_l = (g * h_l.max(0.0)).sqrt();
    let c_r = (g * h_r.max(0.0)).sqrt();

    // 波速估计
    let (s_l, s_r) = if left_dry {
        // 左侧干：干底前沿向左扩展
        (u_r - 2.0 * c_r, u_r + c_r)
    } else if right_dry {
        (u_l - c_l, u_l + 2.0 * c_l)
    } else {
        // Roe 平均
        let sqrt_hl = h_l.sqrt();
        let sqrt_hr = h_r.sqrt();
        let u_roe = (sqrt_hl * u_l + sqrt_hr * u_r) / (sqrt_hl + sqrt_hr);
        let h_roe = 0.5 * (h_l + h_r);
        let c_roe = (g * h_roe).sqrt();
        (
            (u_l - c_l).min(u_roe - c_roe),
            (u_r + c_r).max(u_roe + c_roe),
        )
    };

    if s_l >= 0.0 {
        return physical_flux(h_l, u_l, v_l, g);
    }
    if s_r <= 0.0 {
        return physical_flux(h_r, u_r, v_r, g);
    }

    // 中间波（接触波）速度
    let denom = h_r * (u_r - s_r) - h_l * (u_l - s_l);
    let s_m = if denom.abs() < 1e-14 {
        0.5 * (u_l + u_r)
    } else {
        (s_l * h_r * (u_r - s_r) - s_r * h_l * (u_l - s_l)) / denom
    };

    // HLL 中间态质量/法向动量通量
    let f_l = physical_flux(h_l, u_l, v_l, g);
    let f_r = physical_flux(h_r, u_r, v_r, g);
    let inv = 1.0 / (s_r - s_l);
    let mass = (s_r * f_l.mass - s_l * f_r.mass + s_l * s_r * (h_r - h_l)) * inv;
    let normal =
        (s_r * f_l.normal - s_l * f_r.normal + s_l * s_r * (h_r * u_r - h_l * u_l)) * inv;

    // 切向分量按接触波方向上风
    let transverse = if s_m >= 0.0 { mass * v_l } else { mass * v_r };

    FaceFlux {
        mass,
        normal,
        transverse,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const G: f64 = 9.806_65;
    const DRY: f64 = 1e-10;

    #[test]
    fn test_both_dry_zero_flux() {
        let flux = hllc_face(0.0, 0.0, 0.0, 0.0, 0.0, 0.0, G, DRY);
        assert_eq!(flux, FaceFlux::ZERO);
    }

    #[test]
    fn test_symmetric_still_water() {
        // 对称静水：质量通量为零，法向通量为纯压力项
        let h = 2.0;
        let flux = hllc_face(h, h, 0.0, 0.0, 0.0, 0.0, G, DRY);
        assert!(flux.mass.abs() < 1e-12);
        assert!((flux.normal - 0.5 * G * h * h).abs() < 1e-9);
        assert!(flux.transverse.abs() < 1e-12);
    }

    #[test]
    fn test_supercritical_left_to_right() {
        // 强超临界流动：通量等于左侧物理通量
        let h = 1.0;
        let u = 10.0;
        let flux = hllc_face(h, h, u, u, 0.0, 0.0, G, DRY);
        assert!((flux.mass - h * u).abs() < 1e-9);
        assert!((flux.normal - (h * u * u + 0.5 * G * h * h)).abs() < 1e-9);
    }

    #[test]
    fn test_dam_break_flux_positive() {
        // 左高右低：质量通量向右为正
        let flux = hllc_face(2.0, 0.1, 0.0, 0.0, 0.0, 0.0, G, DRY);
        assert!(flux.mass > 0.0);
    }

    #[test]
    fn test_dry_right_wet_left() {
        let flux = hllc_face(1.0, 0.0, 0.0, 0.0, 0.0, 0.0, G, DRY);
        assert!(flux.mass > 0.0, "湿侧向干侧泄流");
    }

    #[test]
    fn test_transverse_upwinded() {
        let flux = hllc_face(1.0, 1.0, 1.0, 1.0, 3.0, -5.0, G, DRY);
        // 流动向右，切向分量取左侧
        assert!((flux.transverse - flux.mass * 3.0).abs() < 1e-9);
    }
}
