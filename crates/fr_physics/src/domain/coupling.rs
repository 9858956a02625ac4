// crates/fr_physics/src/domain/coupling.rs

//! 稀疏耦合表
//!
//! 当绝大多数单元无外部强迫时，以两条长度为 K 的平行数组仅存储
//! 活动单元：`ids[K]` 为单元 ID，`vals[K]` 为强迫值。K 在
//! `prepare` 时确定；`ids` 在一次运行期间不再变更，`vals` 可由
//! 调用方在批次之间刷新。

use fr_foundation::{FrError, FrResult};

/// 稀疏耦合表
#[derive(Debug, Clone)]
pub struct CouplingList {
    ids: Vec<u32>,
    vals: Vec<f64>,
}

impl CouplingList {
    /// 创建长度为 K 的耦合表，所有条目初始为零
    pub fn new(size: usize) -> FrResult<Self> {
        let mut ids = Vec::new();
        ids.try_reserve_exact(size)
            .map_err(|_| FrError::out_of_memory("coupling ids", (size * 4) as u64))?;
        ids.resize(size, 0);

        let mut vals = Vec::new();
        vals.try_reserve_exact(size)
            .map_err(|_| FrError::out_of_memory("coupling values", (size * 8) as u64))?;
        vals.resize(size, 0.0);

        Ok(Self { ids, vals })
    }

    /// 条目数量 K
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// 设置一个条目（ID 与值）
    pub fn set_entry(&mut self, index: usize, cell_id: u32, value: f64) -> FrResult<()> {
        FrError::check_index("Coupling", index, self.ids.len())?;
        self.ids[index] = cell_id;
        self.vals[index] = value;
        Ok(())
    }

    /// 仅刷新条目的强迫值
    pub fn set_value(&mut self, index: usize, value: f64) -> FrResult<()> {
        FrError::check_index("Coupling", index, self.vals.len())?;
        self.vals[index] = value;
        Ok(())
    }

    /// 单元 ID 数组
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    /// 强迫值数组
    pub fn vals(&self) -> &[f64] {
        &self.vals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coupling_list() {
        let mut list = CouplingList::new(3).unwrap();
        assert_eq!(list.len(), 3);
        list.set_entry(1, 42, 0.5).unwrap();
        assert_eq!(list.ids()[1], 42);
        assert_eq!(list.vals()[1], 0.5);
        list.set_value(1, 0.7).unwrap();
        assert_eq!(list.vals()[1], 0.7);
        assert!(list.set_entry(3, 0, 0.0).is_err());
    }
}
