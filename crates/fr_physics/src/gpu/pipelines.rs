// crates/fr_physics/src/gpu/pipelines.rs

//! 设备引擎
//!
//! 按变体编译程序、分配设备缓冲区并组装核函数集；对工作线程暴露
//! 批次原语：写目标时刻、导入边界、清零计数器、调度迭代、批末
//! 读回遥测。
//!
//! 乒乓缓冲：交替标志为假时源为主缓冲区、目的为备缓冲区，迭代后
//! 翻转。读回总是取最近一次迭代的目的缓冲区。

use super::shaders;
use crate::domain::cartesian::{DomainSnapshot, StateReadback};
use crate::scheme::telemetry::EngineTelemetry;
use crate::scheme::{CacheConstraints, CacheMode, CouplingMode, SchemeSettings, SchemeVariant, TimestepMode};
use crate::types::{GridSpec, NumericalParams};
use fr_foundation::{FrError, FrResult, Precision};
use fr_runtime::{
    BufferKind, CommandQueue, ComputeKernel, GpuDevice, KernelBuilder, ProgramBuilder,
    ScalarBuffer, U32Buffer,
};

/// 时间状态缓冲区字段下标
const TIME_T: usize = 0;
const TIME_DT: usize = 1;
const TIME_TARGET: usize = 2;
const TIME_MOV_AVG: usize = 3;
const TIME_BATCH_DT: usize = 4;

/// 执行尺寸
///
/// 工作组约束取设备总线程数平方根与各维度上限的较小者；缓存
/// 配置启用时全局尺寸按 wg/(wg−2) 放大以覆盖光环单元。归约核
/// 的工作组为二的幂，全局尺寸由波前划分数决定。
#[derive(Debug, Clone, Copy)]
pub struct ExecDimensions {
    /// 主核工作组 X
    pub wg_x: u32,
    /// 主核工作组 Y
    pub wg_y: u32,
    /// 主核全局尺寸 X（工作项）
    pub global_x: u32,
    /// 主核全局尺寸 Y
    pub global_y: u32,
    /// 归约核工作组
    pub reduce_wg: u32,
    /// 归约核全局工作项总数
    pub reduce_workers: u32,
    /// 归约组数
    pub reduce_groups: u32,
}

impl ExecDimensions {
    /// 由设备能力、配置与网格计算执行尺寸
    pub fn compute(device: &GpuDevice, settings: &SchemeSettings, grid: &GridSpec) -> Self {
        let caps = device.capabilities();
        let constraint = caps.square_workgroup_constraint();
        let (mut wg_x, mut wg_y) = settings.work_group_size.unwrap_or((constraint, constraint));
        wg_x = wg_x.max(1);
        wg_y = wg_y.max(1);

        let cached = settings.cache_mode != CacheMode::None;
        if cached {
            match settings.cache_constraints {
                CacheConstraints::AllowUndersize => wg_x = wg_x.saturating_sub(1).max(1),
                CacheConstraints::AllowOversize => {
                    if wg_y == 16 {
                        wg_y = 17;
                    }
                }
                CacheConstraints::Actual => {}
            }
        }
        // 超配后的乘积仍受设备工作组线程总数约束
        if wg_x * wg_y > caps.max_workgroup_size {
            wg_y = (caps.max_workgroup_size / wg_x.max(1)).max(1);
        }

        let cols = grid.cols as u32;
        let rows = grid.rows as u32;
        let (global_x, global_y) = if cached && wg_x > 2 && wg_y > 2 {
            (
                (cols as f64 * wg_x as f64 / (wg_x - 2) as f64).ceil() as u32,
                (rows as f64 * wg_y as f64 / (wg_y - 2) as f64).ceil() as u32,
            )
        } else {
            (cols, rows)
        };

        // 归约工作组：二的幂，不超过 512 与设备上限
        let max_wg = caps.max_workgroup_size.clamp(1, 512);
        let reduce_wg = if max_wg.is_power_of_two() {
            max_wg
        } else {
            (max_wg + 1).next_power_of_two() / 2
        };
        let cells = grid.cell_count() as u32;
        let wavefronts = settings.reduction_wavefronts.max(1);
        let stride_target = cells.div_ceil(wavefronts).max(1);
        let reduce_groups = stride_target.div_ceil(reduce_wg).max(1);
        let reduce_workers = reduce_groups * reduce_wg;

        Self {
            wg_x,
            wg_y,
            global_x,
            global_y,
            reduce_wg,
            reduce_workers,
            reduce_groups,
        }
    }
}

/// 核函数集
struct KernelSet {
    /// MUSCL 重构核（仅 MUSCL-Hancock 变体）
    half: Option<ComputeKernel>,
    full: ComputeKernel,
    friction: Option<ComputeKernel>,
    boundary: ComputeKernel,
    reduce: Option<ComputeKernel>,
    advance: ComputeKernel,
    reset: ComputeKernel,
}

/// 设备引擎
pub struct GpuEngine {
    queue: CommandQueue,
    kernels: KernelSet,

    states: ScalarBuffer,
    states_alt: ScalarBuffer,
    #[allow(dead_code)]
    bed: ScalarBuffer,
    #[allow(dead_code)]
    manning: ScalarBuffer,
    #[allow(dead_code)]
    poleni: U32Buffer,
    #[allow(dead_code)]
    poleni_params: [ScalarBuffer; 4],
    forcing: ScalarBuffer,
    #[allow(dead_code)]
    coupling_ids: Option<U32Buffer>,
    time_state: ScalarBuffer,
    counters: U32Buffer,
    #[allow(dead_code)]
    candidates: ScalarBuffer,
    #[allow(dead_code)]
    group_mins: ScalarBuffer,
    #[allow(dead_code)]
    recon: Option<(ScalarBuffer, ScalarBuffer)>,

    grid: GridSpec,
    alt: bool,
    dynamic_dt: bool,
    last: EngineTelemetry,
}

impl GpuEngine {
    /// 创建设备引擎：编译程序、分配缓冲区、上传初始条件、组装核
    pub fn new(
        device: &GpuDevice,
        snapshot: &DomainSnapshot,
        settings: &SchemeSettings,
        params: &NumericalParams,
    ) -> FrResult<Self> {
        let grid = snapshot.grid;
        let n = grid.cell_count();
        let dims = ExecDimensions::compute(device, settings, &grid);
        // WGSL 不提供 64 位浮点，设备端始终按单精度运行
        let precision = Precision::Single;
        let dynamic_dt = settings.timestep_mode == TimestepMode::Cfl;
        let sparse = settings.coupling_mode == CouplingMode::Sparse;
        let coupling_size = snapshot.coupling.as_ref().map_or(0, |c| c.len());

        let mut queue = device.take_queue()?;

        // --
        // 程序编译：常量头部 + 公共源码 + 各核源码
        // --

        let header = |label: &str| {
            ProgramBuilder::new(label.to_string())
                .constant_u32("DOMAIN_COLS", grid.cols as u32)
                .constant_u32("DOMAIN_ROWS", grid.rows as u32)
                .constant_u32("DOMAIN_CELLCOUNT", n as u32)
                .constant_real("DELTA_X", grid.dx)
                .constant_real("DELTA_Y", grid.dy)
                .constant_real("GRAVITY", params.gravity)
                .constant_real("COURANT", params.courant)
                .constant_real("VERY_SMALL", params.dry_threshold)
                .constant_real("QUITE_SMALL", params.quite_small())
                .constant_real("FIXED_DT", settings.fixed_timestep)
                .constant_bool(
                    "CFL_INERTIAL",
                    matches!(settings.variant, SchemeVariant::Inertial),
                )
                .constant_u32("WG_X", dims.wg_x)
                .constant_u32("WG_Y", dims.wg_y)
                .constant_u32("REDUCE_WG", dims.reduce_wg)
                .constant_u32("REDUCE_WORKERS", dims.reduce_workers)
                .constant_u32("REDUCE_GROUPS", dims.reduce_groups)
                .constant_u32("COUPLING_SIZE", coupling_size as u32)
                .append(shaders::COMMON)
        };

        let flux_source = match settings.variant {
            SchemeVariant::Godunov => shaders::GODUNOV,
            SchemeVariant::Inertial => shaders::INERTIAL,
            SchemeVariant::MusclHancock => shaders::MUSCL,
        };
        let flux_program = device.compile(header("flux").append(flux_source))?;
        let friction_program = device.compile(header("friction").append(shaders::FRICTION))?;
        let boundary_program = device.compile(header("boundary").append(shaders::BOUNDARY))?;
        let timestep_program = device.compile(header("timestep").append(shaders::TIMESTEP))?;

        // --
        // 缓冲区分配与初始内容
        // --

        let mut states = ScalarBuffer::new(
            device,
            "cell states",
            4 * n,
            precision,
            BufferKind::Storage,
            true,
        )?;
        let mut states_alt = ScalarBuffer::new(
            device,
            "cell states (alternate)",
            4 * n,
            precision,
            BufferKind::Storage,
            true,
        )?;
        let mut bed = ScalarBuffer::new(
            device,
            "bed elevations",
            n,
            precision,
            BufferKind::StorageReadOnly,
            false,
        )?;
        let mut manning = ScalarBuffer::new(
            device,
            "manning coefficients",
            n,
            precision,
            BufferKind::StorageReadOnly,
            false,
        )?;
        let mut poleni = U32Buffer::new(
            device,
            "poleni flags",
            n,
            BufferKind::StorageReadOnly,
            false,
        )?;
        let mut zx_max = ScalarBuffer::new(
            device,
            "poleni zx_max",
            n,
            precision,
            BufferKind::StorageReadOnly,
            false,
        )?;
        let mut cx = ScalarBuffer::new(
            device,
            "poleni cx",
            n,
            precision,
            BufferKind::StorageReadOnly,
            false,
        )?;
        let mut zy_max = ScalarBuffer::new(
            device,
            "poleni zy_max",
            n,
            precision,
            BufferKind::StorageReadOnly,
            false,
        )?;
        let mut cy = ScalarBuffer::new(
            device,
            "poleni cy",
            n,
            precision,
            BufferKind::StorageReadOnly,
            false,
        )?;

        let (mut forcing, coupling_ids) = if sparse {
            let forcing = ScalarBuffer::new(
                device,
                "coupling values",
                coupling_size.max(1),
                precision,
                BufferKind::StorageReadOnly,
                false,
            )?;
            let ids = U32Buffer::new(
                device,
                "coupling ids",
                coupling_size.max(1),
                BufferKind::StorageReadOnly,
                false,
            )?;
            (forcing, Some(ids))
        } else {
            (
                ScalarBuffer::new(
                    device,
                    "boundary values",
                    n,
                    precision,
                    BufferKind::StorageReadOnly,
                    false,
                )?,
                None,
            )
        };
        let mut coupling_ids = coupling_ids;

        let mut time_state = ScalarBuffer::new(
            device,
            "time state",
            5,
            precision,
            BufferKind::Storage,
            true,
        )?;
        let mut counters =
            U32Buffer::new(device, "batch counters", 2, BufferKind::Storage, true)?;
        let candidates = ScalarBuffer::new(
            device,
            "timestep candidates",
            n,
            precision,
            BufferKind::Storage,
            false,
        )?;
        let group_mins = ScalarBuffer::new(
            device,
            "timestep group minima",
            dims.reduce_groups as usize,
            precision,
            BufferKind::Storage,
            false,
        )?;
        let recon = if matches!(settings.variant, SchemeVariant::MusclHancock) {
            Some((
                ScalarBuffer::new(
                    device,
                    "reconstruction x",
                    8 * n,
                    precision,
                    BufferKind::Storage,
                    false,
                )?,
                ScalarBuffer::new(
                    device,
                    "reconstruction y",
                    8 * n,
                    precision,
                    BufferKind::Storage,
                    false,
                )?,
            ))
        } else {
            None
        };

        // 初始内容
        let mut flat_states = Vec::with_capacity(4 * n);
        for s in &snapshot.states {
            flat_states.extend_from_slice(s);
        }
        states.store_f64(&flat_states)?;
        states_alt.store_f64(&flat_states)?;
        bed.store_f64(&snapshot.bed)?;
        manning.store_f64(&snapshot.manning)?;
        poleni.store(&snapshot.poleni)?;
        zx_max.store_f64(&snapshot.zx_max)?;
        cx.store_f64(&snapshot.cx)?;
        zy_max.store_f64(&snapshot.zy_max)?;
        cy.store_f64(&snapshot.cy)?;
        if let Some(coupling) = &snapshot.coupling {
            if coupling.len() > 0 {
                forcing.store_f64(coupling.vals())?;
                if let Some(ids) = coupling_ids.as_mut() {
                    ids.store(coupling.ids())?;
                }
            }
        } else {
            forcing.store_f64(&snapshot.boundary)?;
        }
        let initial_dt = match settings.timestep_mode {
            TimestepMode::Fixed => settings.fixed_timestep,
            TimestepMode::Cfl => settings.initial_timestep,
        };
        time_state.store_f64(&[0.0, initial_dt, 0.0, 0.0, 0.0])?;
        counters.store(&[0, 0])?;

        // 一次性上传（prepare 契约）
        queue.enqueue_write(states.raw())?;
        queue.enqueue_write(states_alt.raw())?;
        queue.enqueue_write(bed.raw())?;
        queue.enqueue_write(manning.raw())?;
        queue.enqueue_write(poleni.raw())?;
        queue.enqueue_write(zx_max.raw())?;
        queue.enqueue_write(cx.raw())?;
        queue.enqueue_write(zy_max.raw())?;
        queue.enqueue_write(cy.raw())?;
        queue.enqueue_write(forcing.raw())?;
        if let Some(ids) = &coupling_ids {
            queue.enqueue_write(ids.raw())?;
        }
        queue.enqueue_write(time_state.raw())?;
        queue.enqueue_write(counters.raw())?;
        queue.block_until_finished()?;

        // --
        // 核函数组装；乒乓缓冲用预建的备用绑定组切换
        // --

        let flux_entry = match settings.variant {
            SchemeVariant::Godunov => "gts_cache_disabled",
            SchemeVariant::Inertial => "its_cache_disabled",
            SchemeVariant::MusclHancock => "gts_muscl",
        };

        let full = {
            let mut builder = KernelBuilder::new(&flux_program, flux_entry)
                .group_size(dims.wg_x, dims.wg_y, 1)
                .global_size(dims.global_x, dims.global_y, 1);
            match settings.variant {
                SchemeVariant::Inertial => {
                    builder = builder
                        .bind(&[
                            time_state.raw(),
                            bed.raw(),
                            states.raw(),
                            states_alt.raw(),
                            poleni.raw(),
                            zx_max.raw(),
                            cx.raw(),
                            zy_max.raw(),
                            cy.raw(),
                            manning.raw(),
                            candidates.raw(),
                        ])
                        .bind_alternate(&[
                            time_state.raw(),
                            bed.raw(),
                            states_alt.raw(),
                            states.raw(),
                            poleni.raw(),
                            zx_max.raw(),
                            cx.raw(),
                            zy_max.raw(),
                            cy.raw(),
                            manning.raw(),
                            candidates.raw(),
                        ])
                }
                SchemeVariant::MusclHancock => {
                    let (rx, ry) = recon
                        .as_ref()
                        .ok_or_else(|| FrError::internal("missing reconstruction buffers"))?;
                    builder = builder
                        .bind(&[
                            time_state.raw(),
                            bed.raw(),
                            states.raw(),
                            states_alt.raw(),
                            poleni.raw(),
                            zx_max.raw(),
                            cx.raw(),
                            zy_max.raw(),
                            cy.raw(),
                            candidates.raw(),
                            rx.raw(),
                            ry.raw(),
                        ])
                        .bind_alternate(&[
                            time_state.raw(),
                            bed.raw(),
                            states_alt.raw(),
                            states.raw(),
                            poleni.raw(),
                            zx_max.raw(),
                            cx.raw(),
                            zy_max.raw(),
                            cy.raw(),
                            candidates.raw(),
                            rx.raw(),
                            ry.raw(),
                        ])
                }
                SchemeVariant::Godunov => {
                    builder = builder
                        .bind(&[
                            time_state.raw(),
                            bed.raw(),
                            states.raw(),
                            states_alt.raw(),
                            poleni.raw(),
                            zx_max.raw(),
                            cx.raw(),
                            zy_max.raw(),
                            cy.raw(),
                            candidates.raw(),
                        ])
                        .bind_alternate(&[
                            time_state.raw(),
                            bed.raw(),
                            states_alt.raw(),
                            states.raw(),
                            poleni.raw(),
                            zx_max.raw(),
                            cx.raw(),
                            zy_max.raw(),
                            cy.raw(),
                            candidates.raw(),
                        ])
                }
            }
            builder.build(device)?
        };

        let half = if matches!(settings.variant, SchemeVariant::MusclHancock) {
            let (rx, ry) = recon
                .as_ref()
                .ok_or_else(|| FrError::internal("missing reconstruction buffers"))?;
            Some(
                KernelBuilder::new(&flux_program, "hts_reconstruct")
                    .group_size(dims.wg_x, dims.wg_y, 1)
                    .global_size(dims.global_x, dims.global_y, 1)
                    .bind_entries(&[
                        (2, states.raw()),
                        (10, rx.raw()),
                        (11, ry.raw()),
                    ])
                    .bind_alternate_entries(&[
                        (2, states_alt.raw()),
                        (10, rx.raw()),
                        (11, ry.raw()),
                    ])
                    .build(device)?,
            )
        } else {
            None
        };

        let friction = if settings.friction_enabled && !settings.variant.friction_in_flux_kernel()
        {
            Some(
                KernelBuilder::new(&friction_program, "per_friction")
                    .group_size(dims.wg_x, dims.wg_y, 1)
                    .global_size(dims.global_x, dims.global_y, 1)
                    .bind(&[
                        time_state.raw(),
                        states_alt.raw(),
                        bed.raw(),
                        manning.raw(),
                    ])
                    .bind_alternate(&[
                        time_state.raw(),
                        states.raw(),
                        bed.raw(),
                        manning.raw(),
                    ])
                    .build(device)?,
            )
        } else {
            None
        };

        let boundary = if sparse {
            let ids = coupling_ids
                .as_ref()
                .ok_or_else(|| FrError::internal("missing coupling id buffer"))?;
            KernelBuilder::new(&boundary_program, "bdy_coupled")
                .group_size(8, 1, 1)
                .global_size((coupling_size.max(1)) as u32, 1, 1)
                .bind_entries(&[
                    (0, forcing.raw()),
                    (1, time_state.raw()),
                    (2, states_alt.raw()),
                    (3, ids.raw()),
                    (4, bed.raw()),
                    (5, candidates.raw()),
                ])
                .bind_alternate_entries(&[
                    (0, forcing.raw()),
                    (1, time_state.raw()),
                    (2, states.raw()),
                    (3, ids.raw()),
                    (4, bed.raw()),
                    (5, candidates.raw()),
                ])
                .build(device)?
        } else {
            KernelBuilder::new(&boundary_program, "bdy_cell")
                .group_size(dims.wg_x, dims.wg_y, 1)
                .global_size(dims.global_x, dims.global_y, 1)
                .bind_entries(&[
                    (0, forcing.raw()),
                    (1, time_state.raw()),
                    (2, states_alt.raw()),
                    (4, bed.raw()),
                    (5, candidates.raw()),
                ])
                .bind_alternate_entries(&[
                    (0, forcing.raw()),
                    (1, time_state.raw()),
                    (2, states.raw()),
                    (4, bed.raw()),
                    (5, candidates.raw()),
                ])
                .build(device)?
        };

        let reduce = if dynamic_dt {
            Some(
                KernelBuilder::new(&timestep_program, "tst_reduce")
                    .group_size(dims.reduce_wg, 1, 1)
                    .global_size(dims.reduce_workers, 1, 1)
                    .bind_entries(&[(0, candidates.raw()), (1, group_mins.raw())])
                    .build(device)?,
            )
        } else {
            None
        };

        let advance = if dynamic_dt {
            KernelBuilder::new(&timestep_program, "tst_advance_dynamic")
                .bind_entries(&[
                    (1, group_mins.raw()),
                    (2, time_state.raw()),
                    (3, counters.raw()),
                ])
                .build(device)?
        } else {
            KernelBuilder::new(&timestep_program, "tst_advance_fixed")
                .bind_entries(&[(2, time_state.raw()), (3, counters.raw())])
                .build(device)?
        };

        let reset = KernelBuilder::new(&timestep_program, "tst_reset_counters")
            .bind_entries(&[(2, time_state.raw()), (3, counters.raw())])
            .build(device)?;

        let last = EngineTelemetry {
            timestep: initial_dt,
            ..EngineTelemetry::default()
        };

        Ok(Self {
            queue,
            kernels: KernelSet {
                half,
                full,
                friction,
                boundary,
                reduce,
                advance,
                reset,
            },
            states,
            states_alt,
            bed,
            manning,
            poleni,
            poleni_params: [zx_max, cx, zy_max, cy],
            forcing,
            coupling_ids,
            time_state,
            counters,
            candidates,
            group_mins,
            recon,
            grid,
            alt: false,
            dynamic_dt,
            last,
        })
    }

    /// 网格几何
    pub fn grid(&self) -> GridSpec {
        self.grid
    }

    /// 最近一次批末遥测
    pub fn last_telemetry(&self) -> EngineTelemetry {
        self.last
    }

    fn write_time_field(&mut self, index: usize, value: f64) -> FrResult<()> {
        self.time_state.store_f64_at(index, value)?;
        let width = self.time_state.precision().size_bytes();
        let offset = index * width;
        let bytes = self.time_state.raw().host_bytes()[offset..offset + width].to_vec();
        self.queue
            .enqueue_write_partial(self.time_state.raw(), offset as u64, &bytes)
    }

    /// 写入新目标时刻，动态模式下截断越界步长
    pub fn set_target(&mut self, target: f64) -> FrResult<()> {
        self.write_time_field(TIME_TARGET, target)?;
        if self.dynamic_dt {
            let t = self.last.time;
            let dt = self.last.timestep;
            if t + dt > target {
                self.write_time_field(TIME_DT, (target - t).max(0.0))?;
            }
        }
        Ok(())
    }

    /// 刷新稠密边界强迫缓冲区
    pub fn import_dense(&mut self, values: &[f64]) -> FrResult<()> {
        self.forcing.store_f64(values)?;
        self.queue.enqueue_write(self.forcing.raw())
    }

    /// 刷新稀疏耦合值缓冲区
    pub fn import_sparse(&mut self, values: &[f64]) -> FrResult<()> {
        if values.is_empty() {
            return Ok(());
        }
        self.forcing.store_f64(values)?;
        self.queue.enqueue_write(self.forcing.raw())
    }

    /// 调度批次计数器清零核
    pub fn reset_counters(&mut self) -> FrResult<()> {
        self.queue.submit(&self.kernels.reset, false)?;
        self.queue.barrier()
    }

    /// 调度一次迭代的核函数链，阶段间由队列屏障定序
    pub fn schedule_iteration(&mut self) -> FrResult<()> {
        let alt = self.alt;
        if let Some(half) = &self.kernels.half {
            self.queue.submit(half, alt)?;
            self.queue.barrier()?;
        }
        self.queue.submit(&self.kernels.full, alt)?;
        self.queue.barrier()?;
        if let Some(friction) = &self.kernels.friction {
            self.queue.submit(friction, alt)?;
            self.queue.barrier()?;
        }
        self.queue.submit(&self.kernels.boundary, alt)?;
        self.queue.barrier()?;
        if let Some(reduce) = &self.kernels.reduce {
            self.queue.submit(reduce, false)?;
            self.queue.barrier()?;
        }
        self.queue.submit(&self.kernels.advance, false)?;
        self.queue.barrier()?;
        self.alt = !self.alt;
        Ok(())
    }

    /// 批末：读回时间状态与计数器，阻塞至队列排空
    pub fn finish_batch(&mut self) -> FrResult<EngineTelemetry> {
        self.queue.enqueue_read(self.time_state.raw())?;
        self.queue.enqueue_read(self.counters.raw())?;
        self.queue.flush_and_set_marker()?;
        self.queue.block_until_finished()?;
        self.time_state.raw_mut().resolve_read()?;
        self.counters.raw_mut().resolve_read()?;

        self.last = EngineTelemetry {
            time: self.time_state.load_f64_at(TIME_T)?,
            timestep: self.time_state.load_f64_at(TIME_DT)?,
            timestep_mov_avg: self.time_state.load_f64_at(TIME_MOV_AVG)?,
            batch_dt_sum: self.time_state.load_f64_at(TIME_BATCH_DT)?,
            successful: self.counters.load_at(0)?,
            skipped: self.counters.load_at(1)?,
        };
        Ok(self.last)
    }

    /// 读回当前单元状态
    ///
    /// 最近一次迭代的目的缓冲区即当前状态。
    pub fn read_state(&mut self) -> FrResult<StateReadback> {
        {
            let current = if self.alt {
                self.states_alt.raw()
            } else {
                self.states.raw()
            };
            self.queue.enqueue_read(current)?;
        }
        self.queue.block_until_finished()?;
        let current = if self.alt {
            &mut self.states_alt
        } else {
            &mut self.states
        };
        current.raw_mut().resolve_read()?;

        let flat = current.to_f64_vec();
        let n = self.grid.cell_count();
        let mut readback = StateReadback {
            eta: Vec::with_capacity(n),
            eta_max: Vec::with_capacity(n),
            qx: Vec::with_capacity(n),
            qy: Vec::with_capacity(n),
        };
        for cell in 0..n {
            readback.eta.push(flat[4 * cell]);
            readback.eta_max.push(flat[4 * cell + 1]);
            readback.qx.push(flat[4 * cell + 2]);
            readback.qy.push(flat[4 * cell + 3]);
        }
        Ok(readback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduce_dimensions_are_power_of_two_groups() {
        // 纯算术验证归约尺寸推导
        let cells: u32 = 1_000_000;
        let wavefronts: u32 = 200;
        let reduce_wg: u32 = 256;
        let stride_target = cells.div_ceil(wavefronts);
        let groups = stride_target.div_ceil(reduce_wg).max(1);
        assert!(reduce_wg.is_power_of_two());
        assert!(groups * reduce_wg >= stride_target);
    }
}
