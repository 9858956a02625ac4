// crates/fr_physics/src/engine/reference.rs

//! CPU 参考引擎
//!
//! 与设备核函数链同构的主机端迭代：
//! 通量 → 摩擦 → 边界 → 归约 → 推进，随后交换乒乓数组。
//! 被跳过的迭代（dt 为零或提交会越过目标时刻）是纯拷贝，
//! 不会污染乒乓数组对。

use super::friction::manning_update;
use super::hllc::{hllc_face, FaceFlux};
use super::poleni::poleni_discharge;
use crate::domain::cartesian::{DomainSnapshot, StateReadback};
use crate::domain::{POLENI_E, POLENI_N, POLENI_S, POLENI_W};
use crate::scheme::{SchemeVariant, TimestepMode};
use crate::types::{GridSpec, NumericalParams};
use fr_foundation::{Direction, DISABLED_CELL};
use rayon::prelude::*;

/// 推进提交判定的绝对容差
pub const COMMIT_EPS: f64 = 1e-12;

/// 干单元的 CFL 候选哨兵
const BIG_CANDIDATE: f64 = 1e10;

/// 状态分量下标
const FSL: usize = 0;
const FSL_MAX: usize = 1;
const QX: usize = 2;
const QY: usize = 3;

/// 面的求解类别
enum FaceKind {
    /// 普通内部面
    Interior(usize),
    /// 封闭壁面（网格边界或禁用邻居）
    Wall,
    /// Poleni 堰面（携带邻居 ID、堰顶高程与流量系数）
    Weir(usize, f64, f64),
}

/// CPU 参考引擎
pub struct ReferenceEngine {
    grid: GridSpec,
    params: NumericalParams,
    variant: SchemeVariant,
    friction_enabled: bool,
    timestep_mode: TimestepMode,
    fixed_dt: f64,

    src: Vec<[f64; 4]>,
    dst: Vec<[f64; 4]>,
    bed: Vec<f64>,
    manning: Vec<f64>,
    poleni: Vec<u32>,
    zx_max: Vec<f64>,
    cx: Vec<f64>,
    zy_max: Vec<f64>,
    cy: Vec<f64>,
    boundary: Vec<f64>,
    coupling_ids: Vec<u32>,
    coupling_vals: Vec<f64>,
    candidates: Vec<f64>,

    t: f64,
    dt: f64,
    target: f64,
    dt_mov_avg: f64,
    batch_dt: f64,
    successful: u32,
    skipped: u32,
}

impl ReferenceEngine {
    /// 从域快照创建引擎
    pub fn new(
        snapshot: DomainSnapshot,
        params: NumericalParams,
        variant: SchemeVariant,
        friction_enabled: bool,
        timestep_mode: TimestepMode,
        fixed_dt: f64,
        initial_dt: f64,
    ) -> Self {
        let n = snapshot.grid.cell_count();
        let (coupling_ids, coupling_vals) = match snapshot.coupling {
            Some(list) => (list.ids().to_vec(), list.vals().to_vec()),
            None => (Vec::new(), Vec::new()),
        };
        Self {
            grid: snapshot.grid,
            params,
            variant,
            friction_enabled,
            timestep_mode,
            fixed_dt,
            src: snapshot.states.clone(),
            dst: snapshot.states,
            bed: snapshot.bed,
            manning: snapshot.manning,
            poleni: snapshot.poleni,
            zx_max: snapshot.zx_max,
            cx: snapshot.cx,
            zy_max: snapshot.zy_max,
            cy: snapshot.cy,
            boundary: snapshot.boundary,
            coupling_ids,
            coupling_vals,
            candidates: vec![BIG_CANDIDATE; n],
            t: 0.0,
            dt: match timestep_mode {
                TimestepMode::Fixed => fixed_dt,
                TimestepMode::Cfl => initial_dt,
            },
            target: 0.0,
            dt_mov_avg: 0.0,
            batch_dt: 0.0,
            successful: 0,
            skipped: 0,
        }
    }

    // ========================================================================
    // 批次控制
    // ========================================================================

    /// 更新目标时刻并截断动态步长
    pub fn set_target(&mut self, target: f64) {
        self.target = target;
        if self.timestep_mode == TimestepMode::Cfl && self.t + self.dt > target {
            self.dt = (target - self.t).max(0.0);
        }
    }

    /// 清零批次遥测
    pub fn reset_counters(&mut self) {
        self.batch_dt = 0.0;
        self.successful = 0;
        self.skipped = 0;
    }

    /// 刷新稠密边界强迫值
    pub fn import_dense(&mut self, values: Vec<f64>) {
        self.boundary = values;
    }

    /// 刷新稀疏耦合值
    pub fn import_sparse_values(&mut self, values: Vec<f64>) {
        self.coupling_vals = values;
    }

    /// 当前模拟时刻
    pub fn time(&self) -> f64 {
        self.t
    }

    /// 当前时间步长
    pub fn timestep(&self) -> f64 {
        self.dt
    }

    /// 步长滑动平均
    pub fn timestep_mov_avg(&self) -> f64 {
        self.dt_mov_avg
    }

    /// 批内累计步长
    pub fn batch_dt_sum(&self) -> f64 {
        self.batch_dt
    }

    /// 批内成功迭代数
    pub fn batch_successful(&self) -> u32 {
        self.successful
    }

    /// 批内跳过迭代数
    pub fn batch_skipped(&self) -> u32 {
        self.skipped
    }

    /// 读取当前状态
    pub fn read_state(&self) -> StateReadback {
        let n = self.src.len();
        let mut eta = Vec::with_capacity(n);
        let mut eta_max = Vec::with_capacity(n);
        let mut qx = Vec::with_capacity(n);
        let mut qy = Vec::with_capacity(n);
        for s in &self.src {
            eta.push(s[FSL]);
            eta_max.push(s[FSL_MAX]);
            qx.push(s[QX]);
            qy.push(s[QY]);
        }
        StateReadback {
            eta,
            eta_max,
            qx,
            qy,
        }
    }

    // ========================================================================
    // 迭代
    // ========================================================================

    /// 本迭代的有效步长：提交会越过目标或步长为零时迭代退化为拷贝
    fn effective_dt(&self) -> f64 {
        if self.dt > 0.0 && self.t + self.dt <= self.target + COMMIT_EPS {
            self.dt
        } else {
            0.0
        }
    }

    /// 执行一次完整迭代（核函数链 + 乒乓交换）
    pub fn iterate(&mut self) {
        let dt_eff = self.effective_dt();

        self.flux_stage(dt_eff);
        if self.friction_enabled && !self.variant.friction_in_flux_kernel() {
            self.friction_stage(dt_eff);
        }
        self.boundary_stage(dt_eff);
        self.advance_stage();

        std::mem::swap(&mut self.src, &mut self.dst);
    }

    /// 面分类
    fn classify_face(&self, id: usize, dir: Direction) -> FaceKind {
        let Some(nb) = self.grid.neighbour(id, dir) else {
            return FaceKind::Wall;
        };
        if self.src[nb][FSL_MAX] == DISABLED_CELL {
            return FaceKind::Wall;
        }

        let (bit, crest, coeff) = match dir {
            Direction::East => (
                POLENI_E,
                self.zx_max[id].max(self.zx_max[nb]),
                self.cx[id].max(self.cx[nb]),
            ),
            Direction::West => (
                POLENI_W,
                self.zx_max[id].max(self.zx_max[nb]),
                self.cx[id].max(self.cx[nb]),
            ),
            Direction::North => (
                POLENI_N,
                self.zy_max[id].max(self.zy_max[nb]),
                self.cy[id].max(self.cy[nb]),
            ),
            Direction::South => (
                POLENI_S,
                self.zy_max[id].max(self.zy_max[nb]),
                self.cy[id].max(self.cy[nb]),
            ),
        };
        if self.poleni[id] & (bit as u32) != 0 {
            FaceKind::Weir(nb, crest, coeff)
        } else {
            FaceKind::Interior(nb)
        }
    }

    /// 单元朝某面的重构值 (η, qx, qy)
    ///
    /// 一阶变体直接取单元中心值；MUSCL-Hancock 变体按 MINMOD
    /// 限制斜率外推到面。
    fn reconstruct(&self, id: usize, dir: Direction) -> (f64, f64, f64) {
        let s = self.src[id];
        if !matches!(self.variant, SchemeVariant::MusclHancock) {
            return (s[FSL], s[QX], s[QY]);
        }

        #[inline]
        fn minmod(a: f64, b: f64) -> f64 {
            if a * b <= 0.0 {
                0.0
            } else if a.abs() < b.abs() {
                a
            } else {
                b
            }
        }

        let value = |cell: Option<usize>, idx: usize| cell.map(|c| self.src[c][idx]);
        let forward = self.grid.neighbour(id, dir);
        let backward = self.grid.neighbour(id, dir.opposite());

        let mut out = [s[FSL], s[QX], s[QY]];
        for (slot, idx) in [FSL, QX, QY].into_iter().enumerate() {
            let centre = s[idx];
            let fwd = value(forward, idx).map_or(0.0, |v| v - centre);
            let bwd = value(backward, idx).map_or(0.0, |v| centre - v);
            out[slot] = centre + 0.5 * minmod(bwd, fwd);
        }
        (out[0], out[1], out[2])
    }

    /// 一个面的通量，法向统一取 +x / +y
    ///
    /// 返回法向坐标系通量与本单元侧的静水重构深度（床坡源项用）。
    fn face_flux(&self, id: usize, dir: Direction) -> (FaceFlux, f64) {
        let g = self.params.gravity;
        let dry = self.params.dry_threshold;
        let axis_x = matches!(dir, Direction::East | Direction::West);
        let cell_is_left = matches!(dir, Direction::East | Direction::North);

        let z_c = self.bed[id];
        let (eta_c, qx_c, qy_c) = self.reconstruct(id, dir);

        // 单元侧面值速度分量
        let face_primitives = |eta: f64, qx: f64, qy: f64, z_face: f64| -> (f64, f64, f64) {
            let h = (eta - z_face).max(0.0);
            if h < dry {
                (h, 0.0, 0.0)
            } else if axis_x {
                (h, qx / h, qy / h)
            } else {
                (h, qy / h, qx / h)
            }
        };

        let wall_flux = |eta: f64, z_face: f64, un: f64, ut: f64| -> (FaceFlux, f64) {
            // 反射虚单元：等深反号法向流速，保持静水并封闭流动
            let h_star = (eta - z_face).max(0.0);
            let flux = if cell_is_left {
                hllc_face(h_star, h_star, un, -un, ut, ut, g, dry)
            } else {
                hllc_face(h_star, h_star, -un, un, ut, ut, g, dry)
            };
            (flux, h_star)
        };

        match self.classify_face(id, dir) {
            FaceKind::Wall => {
                let (_, un, ut) = face_primitives(eta_c, qx_c, qy_c, z_c);
                wall_flux(eta_c, z_c, un, ut)
            }
            FaceKind::Interior(nb) => {
                let z_face = z_c.max(self.bed[nb]);
                let (eta_n, qx_n, qy_n) = self.reconstruct(nb, dir.opposite());
                let (h_own, un_c, ut_c) = face_primitives(eta_c, qx_c, qy_c, z_face);
                let (h_nb, un_n, ut_n) = face_primitives(eta_n, qx_n, qy_n, z_face);
                let flux = if cell_is_left {
                    hllc_face(h_own, h_nb, un_c, un_n, ut_c, ut_n, g, dry)
                } else {
                    hllc_face(h_nb, h_own, un_n, un_c, ut_n, ut_c, g, dry)
                };
                (flux, h_own)
            }
            FaceKind::Weir(nb, crest, coeff) => {
                // 堰面不做高阶外推，两侧统一取单元中心水位
                let eta_cell = self.src[id][FSL];
                let eta_n = self.src[nb][FSL];
                // 上游按水位高侧判定；法向正方向为 左→右
                let cell_upstream = eta_cell >= eta_n;
                let (eta_up, eta_down) = if cell_upstream {
                    (eta_cell, eta_n)
                } else {
                    (eta_n, eta_cell)
                };

                let head = eta_up - crest;
                if head <= 0.0 {
                    // 未过堰顶：面等价于壁面，堰体即墙
                    let (_, un, ut) = face_primitives(eta_c, qx_c, qy_c, z_c);
                    return wall_flux(eta_cell, z_c.max(crest.min(eta_cell)), un, ut);
                }

                let magnitude = poleni_discharge(eta_up, eta_down, crest, coeff, g);
                let positive = cell_upstream == cell_is_left;
                let q = if positive { magnitude } else { -magnitude };
                let u_weir = q / head.max(dry);
                (
                    FaceFlux {
                        mass: q,
                        normal: q * u_weir,
                        transverse: 0.0,
                    },
                    head,
                )
            }
        }
    }

    /// 通量阶段：四面 HLLC + 床坡源项 + CFL 候选
    fn flux_stage(&mut self, dt_eff: f64) {
        use Direction::{East, North, South, West};

        let dx = self.grid.dx;
        let dy = self.grid.dy;
        let g = self.params.gravity;
        let dry = self.params.dry_threshold;
        let courant = self.params.courant;
        let min_res = self.grid.min_resolution();
        let inertial = matches!(self.variant, SchemeVariant::Inertial);

        // 通过不可变借用读取 self 的辅助闭包，dst/candidates 并行写
        let engine = &*self;
        let results: Vec<([f64; 4], f64)> = (0..self.src.len())
            .into_par_iter()
            .map(|id| {
                let s = engine.src[id];
                if s[FSL_MAX] == DISABLED_CELL {
                    return (s, BIG_CANDIDATE);
                }

                // dt 为零的迭代是纯拷贝，但仍需产出 CFL 候选，
                // 否则推进核无法为新目标时刻选出受限步长
                let new_state = if dt_eff == 0.0 {
                    s
                } else if inertial {
                    engine.inertial_update(id, dt_eff)
                } else {
                    let z = engine.bed[id];
                    let (f_e, h_e) = engine.face_flux(id, East);
                    let (f_w, h_w) = engine.face_flux(id, West);
                    let (f_n, h_n) = engine.face_flux(id, North);
                    let (f_s, h_s) = engine.face_flux(id, South);

                    let mut eta = s[FSL]
                        - dt_eff / dx * (f_e.mass - f_w.mass)
                        - dt_eff / dy * (f_n.mass - f_s.mass);
                    let mut qx = s[QX]
                        - dt_eff / dx * (f_e.normal - f_w.normal)
                        - dt_eff / dy * (f_n.transverse - f_s.transverse)
                        + dt_eff * g / (2.0 * dx) * (h_e * h_e - h_w * h_w);
                    let mut qy = s[QY]
                        - dt_eff / dy * (f_n.normal - f_s.normal)
                        - dt_eff / dx * (f_e.transverse - f_w.transverse)
                        + dt_eff * g / (2.0 * dy) * (h_n * h_n - h_s * h_s);

                    // 干湿收尾
                    if eta < z {
                        eta = z;
                    }
                    if eta - z < dry {
                        qx = 0.0;
                        qy = 0.0;
                    }
                    [eta, s[FSL_MAX].max(eta), qx, qy]
                };

                // CFL 候选（由更新后的状态计算）
                let h_new = (new_state[FSL] - engine.bed[id]).max(0.0);
                let candidate = if h_new < dry {
                    BIG_CANDIDATE
                } else {
                    let u = new_state[QX] / h_new;
                    let v = new_state[QY] / h_new;
                    let celerity = (g * h_new).sqrt();
                    if inertial {
                        courant * min_res / celerity
                    } else {
                        let speed = (u * u + v * v).sqrt();
                        courant * min_res / (speed + celerity)
                    }
                };
                (new_state, candidate)
            })
            .collect();

        for (id, (state, candidate)) in results.into_iter().enumerate() {
            self.dst[id] = state;
            self.candidates[id] = candidate;
        }
    }

    /// 简化惯性形式的单元更新
    ///
    /// 逐面计算显式惯性流量，质量守恒由面流量散度保证，
    /// 摩擦折叠在分母中（本变体不再单独运行摩擦核）。
    fn inertial_update(&self, id: usize, dt: f64) -> [f64; 4] {
        use Direction::{East, North, South, West};

        let g = self.params.gravity;
        let dry = self.params.dry_threshold;
        let s = self.src[id];
        let z = self.bed[id];

        let face = |dir, axis_x: bool, cell_is_left: bool| -> f64 {
            match self.classify_face(id, dir) {
                FaceKind::Wall => 0.0,
                FaceKind::Weir(nb, crest, coeff) => {
                    let eta_n = self.src[nb][FSL];
                    let (eta_up, eta_down, positive) = if cell_is_left {
                        if s[FSL] >= eta_n {
                            (s[FSL], eta_n, true)
                        } else {
                            (eta_n, s[FSL], false)
                        }
                    } else if eta_n >= s[FSL] {
                        (eta_n, s[FSL], true)
                    } else {
                        (s[FSL], eta_n, false)
                    };
                    let q = poleni_discharge(eta_up, eta_down, crest, coeff, g);
                    if positive {
                        q
                    } else {
                        -q
                    }
                }
                FaceKind::Interior(nb) => {
                    let n = self.src[nb];
                    let z_n = self.bed[nb];
                    // 面上有效水深：高水位减高底床
                    let h_flow = s[FSL].max(n[FSL]) - z.max(z_n);
                    if h_flow < dry {
                        return 0.0;
                    }
                    let (delta, cell_len, q_prev, n_mean) = if axis_x {
                        let d = if cell_is_left {
                            n[FSL] - s[FSL]
                        } else {
                            s[FSL] - n[FSL]
                        };
                        (
                            d,
                            self.grid.dx,
                            0.5 * (s[QX] + n[QX]),
                            0.5 * (self.manning[id] + self.manning[nb]),
                        )
                    } else {
                        let d = if cell_is_left {
                            n[FSL] - s[FSL]
                        } else {
                            s[FSL] - n[FSL]
                        };
                        (
                            d,
                            self.grid.dy,
                            0.5 * (s[QY] + n[QY]),
                            0.5 * (self.manning[id] + self.manning[nb]),
                        )
                    };
                    let numerator = q_prev - g * h_flow * dt * delta / cell_len;
                    let denom = 1.0
                        + g * n_mean * n_mean * dt * q_prev.abs() / h_flow.powf(7.0 / 3.0);
                    numerator / denom
                }
            }
        };

        let q_e = face(East, true, true);
        let q_w = face(West, true, false);
        let q_n = face(North, false, true);
        let q_s = face(South, false, false);

        let mut eta = s[FSL]
            - dt / self.grid.dx * (q_e - q_w)
            - dt / self.grid.dy * (q_n - q_s);
        let mut qx = 0.5 * (q_e + q_w);
        let mut qy = 0.5 * (q_n + q_s);

        if eta < z {
            eta = z;
        }
        if eta - z < dry {
            qx = 0.0;
            qy = 0.0;
        }
        [eta, s[FSL_MAX].max(eta), qx, qy]
    }

    /// 摩擦阶段：目的缓冲区上的半隐式曼宁更新
    fn friction_stage(&mut self, dt_eff: f64) {
        if dt_eff == 0.0 {
            return;
        }
        let g = self.params.gravity;
        let quite_small = self.params.quite_small();
        for (id, state) in self.dst.iter_mut().enumerate() {
            if state[FSL_MAX] == DISABLED_CELL {
                continue;
            }
            let h = (state[FSL] - self.bed[id]).max(0.0);
            let n = self.manning[id];
            state[QX] = manning_update(state[QX], h, n, dt_eff, g, quite_small);
            state[QY] = manning_update(state[QY], h, n, dt_eff, g, quite_small);
        }
    }

    /// 被强迫浸润的单元同时刷新 CFL 候选，步长归约看到注入后的状态
    fn candidate_for(
        state: &[f64; 4],
        z: f64,
        params: &NumericalParams,
        min_res: f64,
        inertial: bool,
    ) -> f64 {
        let h = (state[FSL] - z).max(0.0);
        if params.is_dry(h) {
            return BIG_CANDIDATE;
        }
        let celerity = (params.gravity * h).sqrt();
        if inertial {
            params.courant * min_res / celerity
        } else {
            let u = state[QX] / h;
            let v = state[QY] / h;
            params.courant * min_res / ((u * u + v * v).sqrt() + celerity)
        }
    }

    /// 边界阶段：稠密扫描或稀疏耦合表
    fn boundary_stage(&mut self, dt_eff: f64) {
        if dt_eff == 0.0 {
            return;
        }
        let min_res = self.grid.min_resolution();
        let inertial = matches!(self.variant, SchemeVariant::Inertial);
        if !self.coupling_ids.is_empty() {
            let n = self.dst.len();
            for (slot, &id) in self.coupling_ids.iter().enumerate() {
                let id = id as usize;
                // 稀疏表中的 ID 必须显式检查范围
                if id >= n {
                    continue;
                }
                let state = &mut self.dst[id];
                if state[FSL_MAX] == DISABLED_CELL {
                    continue;
                }
                state[FSL] += self.coupling_vals[slot] * dt_eff;
                state[FSL_MAX] = state[FSL_MAX].max(state[FSL]);
                let refreshed =
                    Self::candidate_for(state, self.bed[id], &self.params, min_res, inertial);
                self.candidates[id] = self.candidates[id].min(refreshed);
            }
        } else if !self.boundary.is_empty() {
            for (id, state) in self.dst.iter_mut().enumerate() {
                if state[FSL_MAX] == DISABLED_CELL {
                    continue;
                }
                let rate = self.boundary[id];
                if rate != 0.0 {
                    state[FSL] += rate * dt_eff;
                    state[FSL_MAX] = state[FSL_MAX].max(state[FSL]);
                    let refreshed =
                        Self::candidate_for(state, self.bed[id], &self.params, min_res, inertial);
                    self.candidates[id] = self.candidates[id].min(refreshed);
                }
            }
        }
    }

    /// 推进阶段：提交或跳过，并选取下一步长
    fn advance_stage(&mut self) {
        let committed = self.dt > 0.0 && self.t + self.dt <= self.target + COMMIT_EPS;
        if committed {
            self.t += self.dt;
            self.batch_dt += self.dt;
            self.successful += 1;
            self.dt_mov_avg = if self.dt_mov_avg > 0.0 {
                0.95 * self.dt_mov_avg + 0.05 * self.dt
            } else {
                self.dt
            };
        } else {
            self.skipped += 1;
        }

        match self.timestep_mode {
            TimestepMode::Fixed => {
                self.dt = self.fixed_dt;
            }
            TimestepMode::Cfl => {
                let tentative = self
                    .candidates
                    .iter()
                    .fold(BIG_CANDIDATE, |acc, &c| acc.min(c));
                self.dt = tentative.min((self.target - self.t).max(0.0));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CartesianDomain;
    use crate::scheme::{SchemeVariant, TimestepMode};

    fn flat_domain(rows: usize, cols: usize, eta: f64) -> CartesianDomain {
        let mut domain = CartesianDomain::new();
        domain.set_resolution(1.0, 1.0).unwrap();
        domain.set_extent(rows, cols).unwrap();
        for id in 0..rows * cols {
            domain.set_bed_elevation(id, 0.0).unwrap();
            domain.set_fsl(id, eta).unwrap();
        }
        domain
    }

    fn engine_from(domain: &CartesianDomain, variant: SchemeVariant) -> ReferenceEngine {
        ReferenceEngine::new(
            domain.snapshot().unwrap(),
            NumericalParams::default(),
            variant,
            true,
            TimestepMode::Cfl,
            0.0,
            0.01,
        )
    }

    #[test]
    fn test_still_water_is_preserved() {
        let domain = flat_domain(8, 8, 1.0);
        let mut engine = engine_from(&domain, SchemeVariant::Godunov);
        engine.set_target(1.0);
        for _ in 0..50 {
            engine.iterate();
        }
        let state = engine.read_state();
        for id in 0..64 {
            assert!((state.eta[id] - 1.0).abs() < 1e-9, "η 漂移: {}", state.eta[id]);
            assert!(state.qx[id].abs() < 1e-9);
            assert!(state.qy[id].abs() < 1e-9);
        }
    }

    #[test]
    fn test_still_water_over_bathymetry() {
        // 非平底静水：良平衡格式不得产生流动
        let mut domain = CartesianDomain::new();
        domain.set_resolution(1.0, 1.0).unwrap();
        domain.set_extent(6, 6).unwrap();
        for id in 0..36 {
            let (x, _) = (id % 6, id / 6);
            domain.set_bed_elevation(id, 0.1 * x as f64).unwrap();
            domain.set_fsl(id, 2.0).unwrap();
        }
        let mut engine = engine_from(&domain, SchemeVariant::Godunov);
        engine.set_target(0.5);
        for _ in 0..20 {
            engine.iterate();
        }
        let state = engine.read_state();
        for id in 0..36 {
            assert!((state.eta[id] - 2.0).abs() < 1e-9);
            assert!(state.qx[id].abs() < 1e-9, "qx = {}", state.qx[id]);
        }
    }

    #[test]
    fn test_mass_conservation_dam_break() {
        let mut domain = CartesianDomain::new();
        domain.set_resolution(1.0, 1.0).unwrap();
        domain.set_extent(1, 40).unwrap();
        for id in 0..40 {
            domain.set_bed_elevation(id, 0.0).unwrap();
            domain.set_fsl(id, if id < 20 { 2.0 } else { 0.1 }).unwrap();
        }
        let before = domain.total_volume().unwrap();

        let mut engine = engine_from(&domain, SchemeVariant::Godunov);
        engine.set_target(1.0);
        for _ in 0..200 {
            engine.iterate();
            if engine.time() >= 1.0 {
                break;
            }
        }
        let state = engine.read_state();
        let after: f64 = state.eta.iter().sum();
        assert!(
            (after - before).abs() <= 1e-6 * before,
            "质量不守恒: {} -> {}",
            before,
            after
        );
    }

    #[test]
    fn test_eta_max_monotone() {
        let mut domain = CartesianDomain::new();
        domain.set_resolution(1.0, 1.0).unwrap();
        domain.set_extent(1, 20).unwrap();
        for id in 0..20 {
            domain.set_bed_elevation(id, 0.0).unwrap();
            domain.set_fsl(id, if id < 10 { 1.0 } else { 0.2 }).unwrap();
        }
        let mut engine = engine_from(&domain, SchemeVariant::Godunov);
        engine.set_target(0.5);
        for _ in 0..50 {
            engine.iterate();
            let state = engine.read_state();
            for id in 0..20 {
                assert!(state.eta_max[id] >= state.eta[id] - 1e-12);
            }
            if engine.time() >= 0.5 {
                break;
            }
        }
    }

    #[test]
    fn test_dry_cells_produce_no_momentum() {
        // 相邻干单元之间不得由面通量产生动量
        let domain = flat_domain(4, 4, 0.0);
        let mut engine = engine_from(&domain, SchemeVariant::Godunov);
        engine.set_target(1.0);
        for _ in 0..10 {
            engine.iterate();
        }
        let state = engine.read_state();
        for id in 0..16 {
            assert_eq!(state.qx[id], 0.0);
            assert_eq!(state.qy[id], 0.0);
        }
    }

    #[test]
    fn test_fixed_dt_overshoot_skips() {
        let domain = flat_domain(2, 2, 1.0);
        let mut engine = ReferenceEngine::new(
            domain.snapshot().unwrap(),
            NumericalParams::default(),
            SchemeVariant::Godunov,
            false,
            TimestepMode::Fixed,
            1e5,
            1e5,
        );
        engine.set_target(1.0);
        let before = engine.read_state();
        for _ in 0..4 {
            engine.iterate();
        }
        assert_eq!(engine.batch_successful(), 0);
        assert!(engine.batch_skipped() > 0);
        assert_eq!(engine.time(), 0.0);
        let after = engine.read_state();
        assert_eq!(before.eta, after.eta, "跳过的迭代必须保持状态不变");
    }

    #[test]
    fn test_fixed_dt_within_target_commits() {
        let domain = flat_domain(2, 2, 1.0);
        let mut engine = ReferenceEngine::new(
            domain.snapshot().unwrap(),
            NumericalParams::default(),
            SchemeVariant::Godunov,
            false,
            TimestepMode::Fixed,
            0.01,
            0.01,
        );
        engine.set_target(0.05);
        for _ in 0..5 {
            engine.iterate();
        }
        assert_eq!(engine.batch_successful(), 5);
        assert!((engine.time() - 0.05).abs() < 1e-9);
        // 目标已达：继续迭代只会跳过
        engine.iterate();
        assert_eq!(engine.batch_skipped(), 1);
        assert!((engine.time() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_poleni_weir_discharge_matches_formula() {
        // 1×3 域，中间面设 Poleni；一次固定步长迭代后右侧增量符合公式
        let mut domain = CartesianDomain::new();
        domain.set_resolution(1.0, 1.0).unwrap();
        domain.set_extent(1, 3).unwrap();
        for id in 0..3 {
            domain.set_bed_elevation(id, 0.0).unwrap();
        }
        domain.set_fsl(0, 2.0).unwrap();
        domain.set_fsl(1, 2.0).unwrap();
        domain.set_fsl(2, 0.5).unwrap();
        domain.set_poleni_x(1, true).unwrap();
        domain.set_poleni_params(1, 1.0, 0.577, 0.0, 0.0).unwrap();
        domain.set_poleni_params(2, 1.0, 0.577, 0.0, 0.0).unwrap();

        let dt = 0.01;
        let mut engine = ReferenceEngine::new(
            domain.snapshot().unwrap(),
            NumericalParams::default(),
            SchemeVariant::Godunov,
            false,
            TimestepMode::Fixed,
            dt,
            dt,
        );
        engine.set_target(dt);
        let before = engine.read_state().eta[2];
        engine.iterate();
        let after = engine.read_state().eta[2];

        let q = poleni_discharge(2.0, 0.5, 1.0, 0.577, 9.806_65);
        let expected = q * dt; // Δη = q·dt/Δx, Δx = 1
        let actual = after - before;
        assert!(
            ((actual - expected) / expected).abs() < 1e-4,
            "Poleni 增量 {} 应接近 {}",
            actual,
            expected
        );
    }

    #[test]
    fn test_inertial_variant_still_water() {
        let domain = flat_domain(6, 6, 1.5);
        let mut engine = engine_from(&domain, SchemeVariant::Inertial);
        engine.set_target(0.5);
        for _ in 0..20 {
            engine.iterate();
        }
        let state = engine.read_state();
        for id in 0..36 {
            assert!((state.eta[id] - 1.5).abs() < 1e-9);
        }
    }
}
