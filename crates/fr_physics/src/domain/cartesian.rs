// crates/fr_physics/src/domain/cartesian.rs

//! 规则笛卡尔域
//!
//! 每个单元携带：
//!
//! - 状态四元组 `(η, η_max, qx, qy)`: 自由水面位、其运行最大值、
//!   两个方向的单宽流量 [m²/s]
//! - 底床高程 `z` 与曼宁糙率 `n`
//! - 四个 Poleni 面标志与四个 Poleni 几何参数 `(zx_max, cx, zy_max, cy)`
//! - 稠密模式下一个边界强迫值，或稀疏模式下耦合表成员资格
//!
//! 水深为导出量：`h = max(0, η − z)`。所有数值入口按固定小数位数
//! 舍入，保证主机与设备两份拷贝不发生差异性舍入。

use super::coupling::CouplingList;
use super::{POLENI_E, POLENI_N, POLENI_S, POLENI_W};
use crate::types::GridSpec;
use fr_foundation::{
    round_decimals, Direction, FrError, FrResult, DISABLED_CELL, ROUNDING_DECIMALS,
};
use rayon::prelude::*;

/// 状态分量索引
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum StateIndex {
    /// 自由水面位 η
    FreeSurfaceLevel = 0,
    /// 运行最大自由水面位 η_max
    MaxFreeSurfaceLevel = 1,
    /// x 方向单宽流量 qx
    DischargeX = 2,
    /// y 方向单宽流量 qy
    DischargeY = 3,
}

/// 域数据摘要（输入阶段统计）
#[derive(Debug, Clone, Copy, Default)]
pub struct DomainSummary {
    /// 最低底床高程
    pub min_topo: f64,
    /// 最高底床高程
    pub max_topo: f64,
    /// 最低自由水面位
    pub min_fsl: f64,
    /// 最高自由水面位
    pub max_fsl: f64,
}

/// 传给格式工作线程的域快照
#[derive(Debug, Clone)]
pub struct DomainSnapshot {
    /// 网格几何
    pub grid: GridSpec,
    /// 状态四元组，行优先
    pub states: Vec<[f64; 4]>,
    /// 底床高程
    pub bed: Vec<f64>,
    /// 曼宁糙率
    pub manning: Vec<f64>,
    /// Poleni 面标志位掩码
    pub poleni: Vec<u32>,
    /// x 向堰顶高程
    pub zx_max: Vec<f64>,
    /// x 向流量系数
    pub cx: Vec<f64>,
    /// y 向堰顶高程
    pub zy_max: Vec<f64>,
    /// y 向流量系数
    pub cy: Vec<f64>,
    /// 稠密边界强迫值（稀疏模式下为空）
    pub boundary: Vec<f64>,
    /// 稀疏耦合表（稠密模式下为 None）
    pub coupling: Option<CouplingList>,
}

/// 格式回读的状态数据
#[derive(Debug, Clone)]
pub struct StateReadback {
    /// 自由水面位
    pub eta: Vec<f64>,
    /// 运行最大自由水面位
    pub eta_max: Vec<f64>,
    /// x 方向单宽流量
    pub qx: Vec<f64>,
    /// y 方向单宽流量
    pub qy: Vec<f64>,
}

fn try_vec<T: Clone>(label: &'static str, len: usize, value: T) -> FrResult<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| FrError::out_of_memory(label, (len * std::mem::size_of::<T>()) as u64))?;
    v.resize(len, value);
    Ok(v)
}

struct DomainStorage {
    grid: GridSpec,
    states: Vec<[f64; 4]>,
    bed: Vec<f64>,
    manning: Vec<f64>,
    poleni: Vec<u8>,
    zx_max: Vec<f64>,
    cx: Vec<f64>,
    zy_max: Vec<f64>,
    cy: Vec<f64>,
    boundary: Vec<f64>,
    coupling: Option<CouplingList>,
    summary: DomainSummary,
    summary_seen: bool,
}

impl DomainStorage {
    fn allocate(grid: GridSpec, coupling_size: Option<usize>) -> FrResult<Self> {
        let n = grid.cell_count();
        Ok(Self {
            grid,
            states: try_vec("cell states", n, [0.0f64; 4])?,
            bed: try_vec("bed elevations", n, 0.0)?,
            manning: try_vec("manning coefficients", n, 0.0)?,
            poleni: try_vec("poleni flags", n, 0u8)?,
            zx_max: try_vec("poleni zx_max", n, 0.0)?,
            cx: try_vec("poleni cx", n, 0.0)?,
            zy_max: try_vec("poleni zy_max", n, 0.0)?,
            cy: try_vec("poleni cy", n, 0.0)?,
            boundary: if coupling_size.is_none() {
                try_vec("boundary values", n, 0.0)?
            } else {
                Vec::new()
            },
            coupling: match coupling_size {
                Some(k) => Some(CouplingList::new(k)?),
                None => None,
            },
            summary: DomainSummary::default(),
            summary_seen: false,
        })
    }

    fn track_topo(&mut self, z: f64) {
        if z == DISABLED_CELL {
            return;
        }
        if !self.summary_seen {
            self.summary = DomainSummary {
                min_topo: z,
                max_topo: z,
                min_fsl: z,
                max_fsl: z,
            };
            self.summary_seen = true;
        } else {
            self.summary.min_topo = self.summary.min_topo.min(z);
            self.summary.max_topo = self.summary.max_topo.max(z);
        }
    }

    fn track_fsl(&mut self, eta: f64) {
        if eta == DISABLED_CELL || !self.summary_seen {
            return;
        }
        self.summary.min_fsl = self.summary.min_fsl.min(eta);
        self.summary.max_fsl = self.summary.max_fsl.max(eta);
    }
}

/// 规则笛卡尔域
pub struct CartesianDomain {
    resolution: Option<(f64, f64)>,
    extent: Option<(usize, usize)>,
    use_sparse: bool,
    coupling_size: usize,
    sealed: bool,
    storage: Option<DomainStorage>,
}

impl CartesianDomain {
    /// 创建空域
    pub fn new() -> Self {
        Self {
            resolution: None,
            extent: None,
            use_sparse: false,
            coupling_size: 0,
            sealed: false,
            storage: None,
        }
    }

    // ========================================================================
    // prepare 之前的几何配置
    // ========================================================================

    fn check_unsealed(&self) -> FrResult<()> {
        if self.sealed {
            Err(FrError::invalid_state("域几何在 prepare 之后不可修改"))
        } else {
            Ok(())
        }
    }

    /// 设置网格分辨率
    pub fn set_resolution(&mut self, dx: f64, dy: f64) -> FrResult<()> {
        self.check_unsealed()?;
        if self.storage.is_some() {
            return Err(FrError::invalid_state("单元数组已分配，分辨率不可变更"));
        }
        if dx <= 0.0 || dy <= 0.0 {
            return Err(FrError::invalid_input("网格分辨率必须为正"));
        }
        self.resolution = Some((dx, dy));
        Ok(())
    }

    /// 设置网格范围（行数、列数）
    pub fn set_extent(&mut self, rows: usize, cols: usize) -> FrResult<()> {
        self.check_unsealed()?;
        if self.storage.is_some() {
            return Err(FrError::invalid_state("单元数组已分配，范围不可变更"));
        }
        if rows == 0 || cols == 0 {
            return Err(FrError::invalid_input("网格行列数必须为正"));
        }
        self.extent = Some((rows, cols));
        Ok(())
    }

    /// 启用/停用稀疏耦合模式
    pub fn use_sparse_coupling(&mut self, enabled: bool) -> FrResult<()> {
        self.check_unsealed()?;
        if self.storage.is_some() {
            return Err(FrError::invalid_state("单元数组已分配，耦合模式不可变更"));
        }
        self.use_sparse = enabled;
        Ok(())
    }

    /// 设置稀疏耦合表长度 K
    pub fn set_sparse_coupling_size(&mut self, size: usize) -> FrResult<()> {
        self.check_unsealed()?;
        if self.storage.is_some() {
            return Err(FrError::invalid_state("单元数组已分配，耦合表长度不可变更"));
        }
        self.coupling_size = size;
        Ok(())
    }

    /// 是否启用稀疏耦合
    pub fn sparse_coupling(&self) -> bool {
        self.use_sparse
    }

    /// 耦合表长度
    pub fn coupling_len(&self) -> usize {
        self.coupling_size
    }

    // ========================================================================
    // 存储访问
    // ========================================================================

    fn storage_mut(&mut self) -> FrResult<&mut DomainStorage> {
        if self.storage.is_none() {
            let (dx, dy) = self
                .resolution
                .ok_or_else(|| FrError::invalid_state("分辨率未设置"))?;
            let (rows, cols) = self
                .extent
                .ok_or_else(|| FrError::invalid_state("网格范围未设置"))?;
            let grid = GridSpec::new(rows, cols, dx, dy)?;
            let coupling = self.use_sparse.then_some(self.coupling_size);
            self.storage = Some(DomainStorage::allocate(grid, coupling)?);
        }
        // 上方刚刚填充，此处必有值
        self.storage
            .as_mut()
            .ok_or_else(|| FrError::internal("domain storage missing after allocation"))
    }

    fn storage_ref(&self) -> FrResult<&DomainStorage> {
        self.storage
            .as_ref()
            .ok_or_else(|| FrError::invalid_state("域尚未准备，单元数组未分配"))
    }

    /// 网格几何
    pub fn grid(&self) -> FrResult<GridSpec> {
        Ok(self.storage_ref()?.grid)
    }

    /// 单元总数
    pub fn cell_count(&self) -> usize {
        self.storage.as_ref().map_or(0, |s| s.grid.cell_count())
    }

    /// 冻结域几何（由格式的 prepare 调用）
    pub fn seal(&mut self) -> FrResult<()> {
        // 保证数组已分配
        let _ = self.storage_mut()?;
        self.sealed = true;
        Ok(())
    }

    /// 是否已冻结
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    // ========================================================================
    // 单元数据设置（输入值统一舍入）
    // ========================================================================

    fn rounded(value: f64) -> f64 {
        round_decimals(value, ROUNDING_DECIMALS)
    }

    /// 设置底床高程
    ///
    /// 同时将自由水面位初始化到底床（干单元）。
    pub fn set_bed_elevation(&mut self, id: usize, z: f64) -> FrResult<()> {
        let storage = self.storage_mut()?;
        FrError::check_index("Cell", id, storage.bed.len())?;
        let z = Self::rounded(z);
        storage.bed[id] = z;
        storage.states[id][StateIndex::FreeSurfaceLevel as usize] = z;
        storage.track_topo(z);
        Ok(())
    }

    /// 设置曼宁糙率
    pub fn set_manning(&mut self, id: usize, n: f64) -> FrResult<()> {
        let storage = self.storage_mut()?;
        FrError::check_index("Cell", id, storage.manning.len())?;
        storage.manning[id] = Self::rounded(n);
        Ok(())
    }

    /// 设置自由水面位
    ///
    /// 同时抬升运行最大值。
    pub fn set_fsl(&mut self, id: usize, eta: f64) -> FrResult<()> {
        let storage = self.storage_mut()?;
        FrError::check_index("Cell", id, storage.states.len())?;
        let eta = Self::rounded(eta);
        storage.states[id][StateIndex::FreeSurfaceLevel as usize] = eta;
        storage.states[id][StateIndex::MaxFreeSurfaceLevel as usize] = eta;
        storage.track_fsl(eta);
        Ok(())
    }

    /// 以水深设置自由水面位（η = z + d）
    pub fn set_depth(&mut self, id: usize, depth: f64) -> FrResult<()> {
        let z = {
            let storage = self.storage_ref()?;
            FrError::check_index("Cell", id, storage.bed.len())?;
            storage.bed[id]
        };
        self.set_fsl(id, z + depth)
    }

    /// 设置 x 方向单宽流量
    pub fn set_discharge_x(&mut self, id: usize, q: f64) -> FrResult<()> {
        let storage = self.storage_mut()?;
        FrError::check_index("Cell", id, storage.states.len())?;
        storage.states[id][StateIndex::DischargeX as usize] = Self::rounded(q);
        Ok(())
    }

    /// 设置 y 方向单宽流量
    pub fn set_discharge_y(&mut self, id: usize, q: f64) -> FrResult<()> {
        let storage = self.storage_mut()?;
        FrError::check_index("Cell", id, storage.states.len())?;
        storage.states[id][StateIndex::DischargeY as usize] = Self::rounded(q);
        Ok(())
    }

    /// 以流速设置 x 方向流量（乘以当前水深）
    pub fn set_velocity_x(&mut self, id: usize, u: f64) -> FrResult<()> {
        let h = self.depth(id)?;
        self.set_discharge_x(id, u * h)
    }

    /// 以流速设置 y 方向流量（乘以当前水深）
    pub fn set_velocity_y(&mut self, id: usize, v: f64) -> FrResult<()> {
        let h = self.depth(id)?;
        self.set_discharge_y(id, v * h)
    }

    /// 禁用单元
    ///
    /// 以 η_max = -9999 编码，所有核函数跳过此类单元。
    pub fn disable_cell(&mut self, id: usize) -> FrResult<()> {
        let storage = self.storage_mut()?;
        FrError::check_index("Cell", id, storage.states.len())?;
        storage.states[id][StateIndex::MaxFreeSurfaceLevel as usize] = DISABLED_CELL;
        Ok(())
    }

    /// 设置稠密边界强迫值
    pub fn set_boundary(&mut self, id: usize, value: f64) -> FrResult<()> {
        let storage = self.storage_mut()?;
        if storage.coupling.is_some() {
            return Err(FrError::invalid_state("稀疏耦合模式下不可设置稠密边界值"));
        }
        FrError::check_index("Cell", id, storage.boundary.len())?;
        storage.boundary[id] = Self::rounded(value);
        Ok(())
    }

    /// 设置稀疏耦合条目
    ///
    /// ID 在 prepare 之后不再变更；运行期间仅允许刷新值。
    pub fn set_coupling(&mut self, index: usize, cell_id: usize, value: f64) -> FrResult<()> {
        let sealed = self.sealed;
        let storage = self.storage_mut()?;
        let cell_count = storage.grid.cell_count();
        FrError::check_index("Cell", cell_id, cell_count)?;
        let coupling = storage
            .coupling
            .as_mut()
            .ok_or_else(|| FrError::invalid_state("域未启用稀疏耦合模式"))?;
        if sealed {
            return Err(FrError::invalid_state("耦合 ID 在 prepare 之后不可变更"));
        }
        coupling.set_entry(index, cell_id as u32, Self::rounded(value))
    }

    /// 刷新稀疏耦合条目的强迫值（批次之间调用）
    pub fn set_coupling_value(&mut self, index: usize, value: f64) -> FrResult<()> {
        let storage = self.storage_mut()?;
        let coupling = storage
            .coupling
            .as_mut()
            .ok_or_else(|| FrError::invalid_state("域未启用稀疏耦合模式"))?;
        coupling.set_value(index, Self::rounded(value))
    }

    // ========================================================================
    // Poleni 面标志与参数
    // ========================================================================

    /// 设置 x 方向 Poleni 条件
    ///
    /// 对称耦合：置位单元东面标志的同时置位其东邻居的西面标志，
    /// 格式从任一侧读取同一面的标志。外邻居在网格之外的面被忽略。
    pub fn set_poleni_x(&mut self, id: usize, enabled: bool) -> FrResult<()> {
        if !enabled {
            return Ok(());
        }
        let storage = self.storage_mut()?;
        FrError::check_index("Cell", id, storage.poleni.len())?;
        if let Some(east) = storage.grid.neighbour(id, Direction::East) {
            storage.poleni[id] |= POLENI_E;
            storage.poleni[east] |= POLENI_W;
        }
        Ok(())
    }

    /// 设置 y 方向 Poleni 条件
    ///
    /// 置位单元北面标志与其北邻居的南面标志。
    pub fn set_poleni_y(&mut self, id: usize, enabled: bool) -> FrResult<()> {
        if !enabled {
            return Ok(());
        }
        let storage = self.storage_mut()?;
        FrError::check_index("Cell", id, storage.poleni.len())?;
        if let Some(north) = storage.grid.neighbour(id, Direction::North) {
            storage.poleni[id] |= POLENI_N;
            storage.poleni[north] |= POLENI_S;
        }
        Ok(())
    }

    /// 查询某面的 Poleni 标志
    pub fn poleni_flag(&self, id: usize, dir: Direction) -> FrResult<bool> {
        let storage = self.storage_ref()?;
        FrError::check_index("Cell", id, storage.poleni.len())?;
        let bit = match dir {
            Direction::North => POLENI_N,
            Direction::East => POLENI_E,
            Direction::South => POLENI_S,
            Direction::West => POLENI_W,
        };
        Ok(storage.poleni[id] & bit != 0)
    }

    /// 设置 Poleni 几何参数
    pub fn set_poleni_params(
        &mut self,
        id: usize,
        zx_max: f64,
        cx: f64,
        zy_max: f64,
        cy: f64,
    ) -> FrResult<()> {
        let storage = self.storage_mut()?;
        FrError::check_index("Cell", id, storage.zx_max.len())?;
        storage.zx_max[id] = Self::rounded(zx_max);
        storage.cx[id] = Self::rounded(cx);
        storage.zy_max[id] = Self::rounded(zy_max);
        storage.cy[id] = Self::rounded(cy);
        Ok(())
    }

    // ========================================================================
    // 读取
    // ========================================================================

    /// 读取状态分量
    pub fn get_state(&self, id: usize, index: StateIndex) -> FrResult<f64> {
        let storage = self.storage_ref()?;
        FrError::check_index("Cell", id, storage.states.len())?;
        Ok(storage.states[id][index as usize])
    }

    /// 读取底床高程
    pub fn get_bed(&self, id: usize) -> FrResult<f64> {
        let storage = self.storage_ref()?;
        FrError::check_index("Cell", id, storage.bed.len())?;
        Ok(storage.bed[id])
    }

    /// 读取曼宁糙率
    pub fn get_manning(&self, id: usize) -> FrResult<f64> {
        let storage = self.storage_ref()?;
        FrError::check_index("Cell", id, storage.manning.len())?;
        Ok(storage.manning[id])
    }

    /// 水深 `h = max(0, η − z)`
    pub fn depth(&self, id: usize) -> FrResult<f64> {
        let storage = self.storage_ref()?;
        FrError::check_index("Cell", id, storage.states.len())?;
        let eta = storage.states[id][StateIndex::FreeSurfaceLevel as usize];
        Ok((eta - storage.bed[id]).max(0.0))
    }

    /// x 方向流速（干单元为零）
    pub fn velocity_x(&self, id: usize) -> FrResult<f64> {
        let h = self.depth(id)?;
        if h <= 0.0 {
            return Ok(0.0);
        }
        Ok(self.get_state(id, StateIndex::DischargeX)? / h)
    }

    /// y 方向流速（干单元为零）
    pub fn velocity_y(&self, id: usize) -> FrResult<f64> {
        let h = self.depth(id)?;
        if h <= 0.0 {
            return Ok(0.0);
        }
        Ok(self.get_state(id, StateIndex::DischargeY)? / h)
    }

    /// 单元是否被禁用
    pub fn is_disabled(&self, id: usize) -> FrResult<bool> {
        Ok(self.get_state(id, StateIndex::MaxFreeSurfaceLevel)? == DISABLED_CELL)
    }

    /// 坐标 → 单元 ID
    pub fn cell_id(&self, x: usize, y: usize) -> FrResult<usize> {
        let grid = self.grid()?;
        if x >= grid.cols || y >= grid.rows {
            return Err(FrError::Bounds {
                index_type: "Cell",
                index: y * grid.cols + x,
                len: grid.cell_count(),
            });
        }
        Ok(grid.cell_id(x, y))
    }

    /// 单元 ID → 坐标
    pub fn cell_indices(&self, id: usize) -> FrResult<(usize, usize)> {
        let grid = self.grid()?;
        FrError::check_index("Cell", id, grid.cell_count())?;
        Ok(grid.cell_indices(id))
    }

    /// 邻居单元 ID（边界外返回 None）
    pub fn neighbour(&self, id: usize, dir: Direction) -> FrResult<Option<usize>> {
        let grid = self.grid()?;
        FrError::check_index("Cell", id, grid.cell_count())?;
        Ok(grid.neighbour(id, dir))
    }

    /// 全域水量 [m³]
    ///
    /// 对所有活动单元求和 `h·Δx·Δy`，O(R·C)。
    pub fn total_volume(&self) -> FrResult<f64> {
        let storage = self.storage_ref()?;
        let area = storage.grid.cell_area();
        let volume: f64 = storage
            .states
            .par_iter()
            .zip(storage.bed.par_iter())
            .map(|(state, &z)| {
                if state[StateIndex::MaxFreeSurfaceLevel as usize] == DISABLED_CELL {
                    0.0
                } else {
                    (state[StateIndex::FreeSurfaceLevel as usize] - z).max(0.0) * area
                }
            })
            .sum();
        Ok(volume)
    }

    /// 输入阶段数据摘要
    pub fn summary(&self) -> FrResult<DomainSummary> {
        Ok(self.storage_ref()?.summary)
    }

    // ========================================================================
    // 与格式的数据交换
    // ========================================================================

    /// 生成传给格式工作线程的快照
    pub fn snapshot(&self) -> FrResult<DomainSnapshot> {
        let storage = self.storage_ref()?;
        Ok(DomainSnapshot {
            grid: storage.grid,
            states: storage.states.clone(),
            bed: storage.bed.clone(),
            manning: storage.manning.clone(),
            poleni: storage.poleni.iter().map(|&m| m as u32).collect(),
            zx_max: storage.zx_max.clone(),
            cx: storage.cx.clone(),
            zy_max: storage.zy_max.clone(),
            cy: storage.cy.clone(),
            boundary: storage.boundary.clone(),
            coupling: storage.coupling.clone(),
        })
    }

    /// 稠密边界值数组（稀疏模式下为空）
    pub fn boundary_values(&self) -> FrResult<Vec<f64>> {
        Ok(self.storage_ref()?.boundary.clone())
    }

    /// 稀疏耦合值数组
    pub fn coupling_values(&self) -> FrResult<Vec<f64>> {
        let storage = self.storage_ref()?;
        storage
            .coupling
            .as_ref()
            .map(|c| c.vals().to_vec())
            .ok_or_else(|| FrError::invalid_state("域未启用稀疏耦合模式"))
    }

    /// 将格式回读的状态写回主机数组
    pub fn apply_readback(&mut self, readback: &StateReadback) -> FrResult<()> {
        let storage = self
            .storage
            .as_mut()
            .ok_or_else(|| FrError::invalid_state("域尚未准备"))?;
        let n = storage.states.len();
        if readback.eta.len() != n {
            return Err(FrError::invalid_input("回读数组长度与域不一致"));
        }
        for (i, state) in storage.states.iter_mut().enumerate() {
            state[StateIndex::FreeSurfaceLevel as usize] = readback.eta[i];
            state[StateIndex::MaxFreeSurfaceLevel as usize] = readback.eta_max[i];
            state[StateIndex::DischargeX as usize] = readback.qx[i];
            state[StateIndex::DischargeY as usize] = readback.qy[i];
        }
        Ok(())
    }
}

impl Default for CartesianDomain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_domain() -> CartesianDomain {
        let mut domain = CartesianDomain::new();
        domain.set_resolution(1.0, 1.0).unwrap();
        domain.set_extent(4, 4).unwrap();
        domain
    }

    #[test]
    fn test_geometry_frozen_after_seal() {
        let mut domain = small_domain();
        domain.set_bed_elevation(0, 0.0).unwrap();
        domain.seal().unwrap();
        assert!(matches!(
            domain.set_resolution(2.0, 2.0),
            Err(FrError::InvalidState(_))
        ));
        assert!(matches!(
            domain.set_extent(8, 8),
            Err(FrError::InvalidState(_))
        ));
    }

    #[test]
    fn test_reader_before_allocation_fails() {
        let domain = CartesianDomain::new();
        assert!(matches!(
            domain.get_state(0, StateIndex::FreeSurfaceLevel),
            Err(FrError::InvalidState(_))
        ));
        assert!(matches!(domain.total_volume(), Err(FrError::InvalidState(_))));
    }

    #[test]
    fn test_value_rounding() {
        let mut domain = small_domain();
        domain.set_bed_elevation(0, 1.234_567_89).unwrap();
        assert_eq!(domain.get_bed(0).unwrap(), 1.234_57);
    }

    #[test]
    fn test_out_of_range_cell() {
        let mut domain = small_domain();
        assert!(matches!(
            domain.set_fsl(16, 1.0),
            Err(FrError::Bounds { .. })
        ));
        domain.set_fsl(15, 1.0).unwrap();
        assert!(matches!(
            domain.get_bed(16),
            Err(FrError::Bounds { .. })
        ));
    }

    #[test]
    fn test_depth_and_velocity_derivation() {
        let mut domain = small_domain();
        domain.set_bed_elevation(5, 2.0).unwrap();
        domain.set_depth(5, 1.5).unwrap();
        assert!((domain.depth(5).unwrap() - 1.5).abs() < 1e-12);

        domain.set_velocity_x(5, 2.0).unwrap();
        assert!((domain.get_state(5, StateIndex::DischargeX).unwrap() - 3.0).abs() < 1e-12);
        assert!((domain.velocity_x(5).unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_poleni_symmetry_east_west() {
        let mut domain = small_domain();
        domain.set_bed_elevation(0, 0.0).unwrap();
        let a = domain.cell_id(1, 1).unwrap();
        let b = domain.cell_id(2, 1).unwrap();
        domain.set_poleni_x(a, true).unwrap();
        assert!(domain.poleni_flag(a, Direction::East).unwrap());
        assert!(domain.poleni_flag(b, Direction::West).unwrap());
    }

    #[test]
    fn test_poleni_symmetry_north_south() {
        let mut domain = small_domain();
        domain.set_bed_elevation(0, 0.0).unwrap();
        let a = domain.cell_id(1, 1).unwrap();
        let b = domain.cell_id(1, 2).unwrap();
        domain.set_poleni_y(a, true).unwrap();
        assert!(domain.poleni_flag(a, Direction::North).unwrap());
        assert!(domain.poleni_flag(b, Direction::South).unwrap());
    }

    #[test]
    fn test_poleni_ignored_on_border_face() {
        let mut domain = small_domain();
        domain.set_bed_elevation(0, 0.0).unwrap();
        let edge = domain.cell_id(3, 0).unwrap();
        domain.set_poleni_x(edge, true).unwrap();
        assert!(!domain.poleni_flag(edge, Direction::East).unwrap());
    }

    #[test]
    fn test_total_volume_skips_disabled() {
        let mut domain = small_domain();
        for id in 0..16 {
            domain.set_bed_elevation(id, 0.0).unwrap();
            domain.set_fsl(id, 2.0).unwrap();
        }
        domain.disable_cell(3).unwrap();
        let volume = domain.total_volume().unwrap();
        assert!((volume - 15.0 * 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_sparse_coupling_mode() {
        let mut domain = CartesianDomain::new();
        domain.set_resolution(1.0, 1.0).unwrap();
        domain.set_extent(4, 4).unwrap();
        domain.use_sparse_coupling(true).unwrap();
        domain.set_sparse_coupling_size(2).unwrap();
        domain.set_coupling(0, 5, 0.001).unwrap();
        domain.set_coupling(1, 6, 0.002).unwrap();
        assert!(matches!(
            domain.set_boundary(5, 1.0),
            Err(FrError::InvalidState(_))
        ));
        domain.seal().unwrap();
        // prepare 之后 ID 不可变更，值可刷新
        assert!(domain.set_coupling(0, 7, 0.1).is_err());
        domain.set_coupling_value(0, 0.1).unwrap();
        assert_eq!(domain.coupling_values().unwrap()[0], 0.1);
    }

    #[test]
    fn test_cell_id_roundtrip_law() {
        let mut domain = small_domain();
        domain.set_bed_elevation(0, 0.0).unwrap();
        for id in 0..16 {
            let (x, y) = domain.cell_indices(id).unwrap();
            assert_eq!(domain.cell_id(x, y).unwrap(), id);
        }
    }
}
