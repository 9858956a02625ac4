// crates/fr_foundation/src/indices.rs

//! 方向枚举
//!
//! 规则笛卡尔网格上单元 ID 为 `id = y * cols + x`（行优先）。
//! 邻居查询是纯算术：N 方向 y 增一，E 方向 x 增一。

use serde::{Deserialize, Serialize};

/// 单元面方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// 北（y 增一）
    North,
    /// 东（x 增一）
    East,
    /// 南（y 减一）
    South,
    /// 西（x 减一）
    West,
}

impl Direction {
    /// 全部四个方向
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    /// 对面方向
    pub fn opposite(self) -> Self {
        match self {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
        }
    }

    /// 坐标偏移 (dx, dy)
    pub fn offset(self) -> (isize, isize) {
        match self {
            Direction::North => (0, 1),
            Direction::East => (1, 0),
            Direction::South => (0, -1),
            Direction::West => (-1, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opposite() {
        for dir in Direction::ALL {
            assert_eq!(dir.opposite().opposite(), dir);
        }
    }

    #[test]
    fn test_offset_antisymmetric() {
        for dir in Direction::ALL {
            let (dx, dy) = dir.offset();
            let (ox, oy) = dir.opposite().offset();
            assert_eq!((dx + ox, dy + oy), (0, 0));
        }
    }
}
