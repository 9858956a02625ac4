// crates/fr_physics/src/types.rs

//! 共享类型：网格几何与数值参数

use fr_foundation::{Direction, FrError, FrResult, GRAVITY, QUITE_SMALL_FACTOR, VERY_SMALL_DEFAULT};
use serde::{Deserialize, Serialize};

/// 规则笛卡尔网格几何
///
/// 单元 ID 为行优先：`id = y * cols + x`。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    /// 行数 R
    pub rows: usize,
    /// 列数 C
    pub cols: usize,
    /// x 方向分辨率 [m]
    pub dx: f64,
    /// y 方向分辨率 [m]
    pub dy: f64,
}

impl GridSpec {
    /// 创建网格几何
    pub fn new(rows: usize, cols: usize, dx: f64, dy: f64) -> FrResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(FrError::invalid_input("网格行列数必须为正"));
        }
        if dx <= 0.0 || dy <= 0.0 {
            return Err(FrError::invalid_input("网格分辨率必须为正"));
        }
        Ok(Self { rows, cols, dx, dy })
    }

    /// 单元总数
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.rows * self.cols
    }

    /// 单元面积 [m²]
    #[inline]
    pub fn cell_area(&self) -> f64 {
        self.dx * self.dy
    }

    /// 最小特征长度
    #[inline]
    pub fn min_resolution(&self) -> f64 {
        self.dx.min(self.dy)
    }

    /// 坐标 → 单元 ID
    #[inline]
    pub fn cell_id(&self, x: usize, y: usize) -> usize {
        y * self.cols + x
    }

    /// 单元 ID → 坐标 (x, y)
    #[inline]
    pub fn cell_indices(&self, id: usize) -> (usize, usize) {
        (id % self.cols, id / self.cols)
    }

    /// 邻居单元 ID
    ///
    /// 越过网格边界时返回 `None`。
    pub fn neighbour(&self, id: usize, dir: Direction) -> Option<usize> {
        let (x, y) = self.cell_indices(id);
        let (ox, oy) = dir.offset();
        let nx = x.checked_add_signed(ox)?;
        let ny = y.checked_add_signed(oy)?;
        if nx >= self.cols || ny >= self.rows {
            return None;
        }
        Some(self.cell_id(nx, ny))
    }
}

/// 数值参数
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NumericalParams {
    /// 重力加速度 [m/s²]
    pub gravity: f64,
    /// Courant 数，(0, 1]
    pub courant: f64,
    /// 干单元深度阈值 [m]
    pub dry_threshold: f64,
}

impl NumericalParams {
    /// 摩擦计算深度阈值
    #[inline]
    pub fn quite_small(&self) -> f64 {
        self.dry_threshold * QUITE_SMALL_FACTOR
    }

    /// 深度是否视为干
    #[inline]
    pub fn is_dry(&self, h: f64) -> bool {
        h < self.dry_threshold
    }

    /// 参数校验
    pub fn validate(&self) -> FrResult<()> {
        if !(self.courant > 0.0 && self.courant <= 1.0) {
            return Err(FrError::invalid_input("Courant 数必须位于 (0, 1]"));
        }
        if self.dry_threshold <= 0.0 {
            return Err(FrError::invalid_input("干阈值必须为正"));
        }
        Ok(())
    }
}

impl Default for NumericalParams {
    fn default() -> Self {
        Self {
            gravity: GRAVITY,
            courant: 0.5,
            dry_threshold: VERY_SMALL_DEFAULT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_validation() {
        assert!(GridSpec::new(0, 10, 1.0, 1.0).is_err());
        assert!(GridSpec::new(10, 10, -1.0, 1.0).is_err());
        assert!(GridSpec::new(10, 10, 1.0, 1.0).is_ok());
    }

    #[test]
    fn test_cell_id_roundtrip() {
        let grid = GridSpec::new(7, 13, 1.0, 2.0).unwrap();
        for id in 0..grid.cell_count() {
            let (x, y) = grid.cell_indices(id);
            assert_eq!(grid.cell_id(x, y), id);
        }
    }

    #[test]
    fn test_neighbour_arithmetic() {
        let grid = GridSpec::new(4, 5, 1.0, 1.0).unwrap();
        let id = grid.cell_id(2, 1);
        assert_eq!(grid.neighbour(id, Direction::North), Some(grid.cell_id(2, 2)));
        assert_eq!(grid.neighbour(id, Direction::East), Some(grid.cell_id(3, 1)));
        assert_eq!(grid.neighbour(id, Direction::South), Some(grid.cell_id(2, 0)));
        assert_eq!(grid.neighbour(id, Direction::West), Some(grid.cell_id(1, 1)));
    }

    #[test]
    fn test_neighbour_border_is_none() {
        let grid = GridSpec::new(3, 3, 1.0, 1.0).unwrap();
        assert_eq!(grid.neighbour(grid.cell_id(0, 0), Direction::West), None);
        assert_eq!(grid.neighbour(grid.cell_id(0, 0), Direction::South), None);
        assert_eq!(grid.neighbour(grid.cell_id(2, 2), Direction::East), None);
        assert_eq!(grid.neighbour(grid.cell_id(2, 2), Direction::North), None);
    }

    #[test]
    fn test_params_validation() {
        let mut p = NumericalParams::default();
        assert!(p.validate().is_ok());
        p.courant = 1.5;
        assert!(p.validate().is_err());
    }
}
