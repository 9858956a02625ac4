// crates/fr_physics/src/scheme/core.rs

//! 浅水格式句柄
//!
//! 调用方持有的格式对象。`prepare` 冻结域几何、构建引擎并启动
//! 工作线程；其余操作经通道转交，批次完成经条件变量同步。

use super::worker::{run_worker, Engine, SharedState, WorkerRequest};
use super::{BatchTelemetry, CouplingMode, Scheme, SchemeSettings, SchemeVariant, TimestepMode};
use crate::domain::{CartesianDomain, StateReadback};
use crate::engine::ReferenceEngine;
use crate::gpu::GpuEngine;
use crate::types::NumericalParams;
use fr_foundation::{
    noop_logger, noop_profiler, ErrorKind, FrError, FrResult, LoggerHandle, ProfilerHandle,
};
use std::sync::atomic::Ordering;
use std::sync::mpsc::{channel, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

struct Running {
    tx: Sender<WorkerRequest>,
    join: Option<JoinHandle<()>>,
    shared: Arc<SharedState>,
}

/// 浅水格式
///
/// 变体在构造时选定，选定后核函数集不再变更。
pub struct SwScheme {
    settings: SchemeSettings,
    device: Option<fr_runtime::GpuDevice>,
    logger: LoggerHandle,
    profiler: ProfilerHandle,
    running: Option<Running>,
}

impl SwScheme {
    /// 创建格式
    ///
    /// `device` 为 `None` 或域规模低于派发阈值时使用 CPU 参考引擎。
    pub fn new(settings: SchemeSettings, device: Option<fr_runtime::GpuDevice>) -> Self {
        Self {
            settings,
            device,
            logger: noop_logger(),
            profiler: noop_profiler(),
            running: None,
        }
    }

    /// 注入日志与剖析实现
    pub fn with_observers(mut self, logger: LoggerHandle, profiler: ProfilerHandle) -> Self {
        self.logger = logger;
        self.profiler = profiler;
        self
    }

    /// 格式配置
    pub fn settings(&self) -> &SchemeSettings {
        &self.settings
    }

    fn numerical_params(&self) -> NumericalParams {
        NumericalParams {
            courant: self.settings.courant,
            dry_threshold: self.settings.dry_threshold,
            ..NumericalParams::default()
        }
    }

    fn running(&self) -> FrResult<&Running> {
        self.running
            .as_ref()
            .ok_or_else(|| FrError::invalid_state("格式尚未 prepare"))
    }

    /// 记录格式配置细节
    fn log_details(&self, cell_count: usize, on_gpu: bool) {
        let s = &self.settings;
        let variant = match s.variant {
            SchemeVariant::Godunov => "Godunov-type 1st-order",
            SchemeVariant::Inertial => "Simplified inertial",
            SchemeVariant::MusclHancock => "MUSCL-Hancock 2nd-order",
        };
        self.logger.log_info(&format!("{variant} scheme prepared"));
        self.logger.log_info(&format!(
            "  Timestep mode:      {}",
            match s.timestep_mode {
                TimestepMode::Cfl => "Dynamic".to_string(),
                TimestepMode::Fixed => format!("Fixed ({}s)", s.fixed_timestep),
            }
        ));
        self.logger
            .log_info(&format!("  Courant number:     {}", s.courant));
        self.logger.log_info(&format!(
            "  Data reduction:     {} divisions",
            s.reduction_wavefronts
        ));
        self.logger
            .log_info(&format!("  Cell count:         {cell_count}"));
        self.logger.log_info(&format!(
            "  Execution target:   {}",
            if on_gpu { "GPU" } else { "CPU fallback" }
        ));
    }
}

impl Scheme for SwScheme {
    fn prepare(&mut self, domain: &mut CartesianDomain) -> FrResult<()> {
        if self.running.is_some() {
            return Err(FrError::invalid_state("格式已 prepare"));
        }

        let params = self.numerical_params();
        params.validate()?;

        let sparse_requested = self.settings.coupling_mode == CouplingMode::Sparse;
        if sparse_requested != domain.sparse_coupling() {
            return Err(FrError::invalid_state("域与格式的耦合模式不一致"));
        }
        if self.settings.timestep_mode == TimestepMode::Fixed
            && self.settings.fixed_timestep <= 0.0
        {
            return Err(FrError::invalid_input("固定步长必须为正"));
        }

        domain.seal()?;
        let summary = domain.summary()?;
        self.logger.log_info(&format!(
            "Initial domain volume: {:.3} m3 (topo {:.2}..{:.2} m)",
            domain.total_volume()?,
            summary.min_topo,
            summary.max_topo
        ));

        let snapshot = domain.snapshot()?;
        let cell_count = snapshot.grid.cell_count();

        // 引擎选择：设备可用且规模足够时走 GPU，否则 CPU 参考引擎
        let use_gpu = match &self.device {
            Some(device) => {
                cell_count >= self.settings.min_gpu_cells && !device.is_errored()
            }
            None => false,
        };

        let engine = if use_gpu {
            let device = self
                .device
                .as_ref()
                .ok_or_else(|| FrError::internal("device vanished during prepare"))?;
            if !self.settings.precision.is_single() && !device.is_double_compatible() {
                self.logger.log_warning(
                    "device lacks double-precision kernels, forcing single precision",
                );
            }
            Engine::Gpu(Box::new(GpuEngine::new(
                device,
                &snapshot,
                &self.settings,
                &params,
            )?))
        } else {
            let initial_dt = self.settings.initial_timestep;
            Engine::Cpu(Box::new(ReferenceEngine::new(
                snapshot,
                params,
                self.settings.variant,
                self.settings.friction_enabled,
                self.settings.timestep_mode,
                self.settings.fixed_timestep,
                initial_dt,
            )))
        };

        let shared = Arc::new(SharedState::new());
        let (tx, rx) = channel();
        let worker_shared = shared.clone();
        let worker_settings = self.settings.clone();
        let worker_logger = self.logger.clone();
        let worker_profiler = self.profiler.clone();

        let join = std::thread::Builder::new()
            .name("freshet-scheme".into())
            .spawn(move || {
                run_worker(
                    rx,
                    worker_shared,
                    engine,
                    worker_settings,
                    cell_count,
                    worker_logger,
                    worker_profiler,
                )
            })
            .map_err(|e| FrError::internal(format!("worker spawn failed: {e}")))?;

        self.running = Some(Running {
            tx,
            join: Some(join),
            shared,
        });

        self.log_details(cell_count, use_gpu);
        Ok(())
    }

    fn run_batch(&mut self, target: f64) -> FrResult<()> {
        let running = self.running()?;
        if running.shared.errored.load(Ordering::Acquire) {
            return Err(FrError::DeviceErrored("scheme not ready".into()));
        }
        // 已有批次在途时不再调度
        if running.shared.busy.load(Ordering::Acquire) {
            return Ok(());
        }
        running.shared.busy.store(true, Ordering::Release);
        running
            .tx
            .send(WorkerRequest::RunBatch { target })
            .map_err(|_| FrError::WorkerGone)
    }

    fn wait_idle(&self) {
        if let Some(running) = &self.running {
            running.shared.wait_idle();
        }
    }

    fn is_busy(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| r.shared.busy.load(Ordering::Acquire))
    }

    fn telemetry(&self) -> BatchTelemetry {
        self.running
            .as_ref()
            .map(|r| *r.shared.telemetry.read())
            .unwrap_or_default()
    }

    fn import_boundaries(&mut self, domain: &CartesianDomain) -> FrResult<()> {
        let request = match self.settings.coupling_mode {
            CouplingMode::Dense => WorkerRequest::ImportDense(domain.boundary_values()?),
            CouplingMode::Sparse => WorkerRequest::ImportSparse(domain.coupling_values()?),
        };
        self.running()?
            .tx
            .send(request)
            .map_err(|_| FrError::WorkerGone)
    }

    fn read_state(&mut self) -> FrResult<StateReadback> {
        let running = self.running()?;
        let (reply_tx, reply_rx) = channel();
        running
            .tx
            .send(WorkerRequest::ReadState(reply_tx))
            .map_err(|_| FrError::WorkerGone)?;
        reply_rx.recv().map_err(|_| FrError::WorkerGone)?
    }

    fn read_back(&mut self, domain: &mut CartesianDomain) -> FrResult<()> {
        let readback = self.read_state()?;
        domain.apply_readback(&readback)
    }

    fn cleanup(&mut self) -> FrResult<()> {
        let Some(mut running) = self.running.take() else {
            return Ok(());
        };
        let (reply_tx, reply_rx) = channel();
        if running.tx.send(WorkerRequest::Cleanup(reply_tx)).is_ok() {
            let _ = reply_rx.recv();
        }
        if let Some(join) = running.join.take() {
            if join.join().is_err() {
                self.logger.log_error(
                    "scheme worker panicked",
                    ErrorKind::Fatal,
                    "SwScheme::cleanup",
                    "inspect previous errors",
                );
            }
        }
        Ok(())
    }
}

impl Drop for SwScheme {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lake_domain(rows: usize, cols: usize) -> CartesianDomain {
        let mut domain = CartesianDomain::new();
        domain.set_resolution(1.0, 1.0).unwrap();
        domain.set_extent(rows, cols).unwrap();
        for id in 0..rows * cols {
            domain.set_bed_elevation(id, 0.0).unwrap();
            domain.set_fsl(id, 1.0).unwrap();
        }
        domain
    }

    #[test]
    fn test_prepare_seals_domain() {
        let mut domain = lake_domain(4, 4);
        let mut scheme = SwScheme::new(SchemeSettings::default(), None);
        scheme.prepare(&mut domain).unwrap();
        assert!(domain.is_sealed());
        assert!(matches!(
            domain.set_extent(8, 8),
            Err(FrError::InvalidState(_))
        ));
        scheme.cleanup().unwrap();
    }

    #[test]
    fn test_prepare_twice_fails() {
        let mut domain = lake_domain(4, 4);
        let mut scheme = SwScheme::new(SchemeSettings::default(), None);
        scheme.prepare(&mut domain).unwrap();
        assert!(scheme.prepare(&mut domain).is_err());
    }

    #[test]
    fn test_run_batch_before_prepare_fails() {
        let mut scheme = SwScheme::new(SchemeSettings::default(), None);
        assert!(matches!(
            scheme.run_batch(1.0),
            Err(FrError::InvalidState(_))
        ));
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let mut domain = lake_domain(4, 4);
        let mut scheme = SwScheme::new(SchemeSettings::default(), None);
        scheme.prepare(&mut domain).unwrap();
        scheme.cleanup().unwrap();
        scheme.cleanup().unwrap();
    }

    #[test]
    fn test_batch_advances_time_on_cpu_engine() {
        let mut domain = lake_domain(8, 8);
        let mut scheme = SwScheme::new(SchemeSettings::default(), None);
        scheme.prepare(&mut domain).unwrap();

        scheme.run_batch(0.5).unwrap();
        scheme.wait_idle();
        let telemetry = scheme.telemetry();
        assert!(telemetry.current_time > 0.0);
        assert!(telemetry.batch_successful > 0);
        scheme.cleanup().unwrap();
    }

    #[test]
    fn test_zero_length_target_submits_nothing() {
        let mut domain = lake_domain(4, 4);
        let mut scheme = SwScheme::new(SchemeSettings::default(), None);
        scheme.prepare(&mut domain).unwrap();

        // T = t = 0：不得提交任何迭代
        scheme.run_batch(0.0).unwrap();
        scheme.wait_idle();
        let telemetry = scheme.telemetry();
        assert_eq!(telemetry.batch_size, 0);
        assert_eq!(telemetry.total_iterations, 0);
        scheme.cleanup().unwrap();
    }

    #[test]
    fn test_rollback_scenario_fixed_huge_dt() {
        let mut domain = lake_domain(4, 4);
        let settings = SchemeSettings {
            timestep_mode: TimestepMode::Fixed,
            fixed_timestep: 1e5,
            friction_enabled: false,
            ..SchemeSettings::default()
        };
        let mut scheme = SwScheme::new(settings, None);
        scheme.prepare(&mut domain).unwrap();

        scheme.run_batch(1.0).unwrap();
        scheme.wait_idle();
        let telemetry = scheme.telemetry();
        assert_eq!(telemetry.batch_successful, 0);
        assert!(telemetry.batch_skipped > 0);
        assert_eq!(telemetry.current_time, 0.0);
        scheme.cleanup().unwrap();
    }

    #[test]
    fn test_read_back_updates_domain() {
        let mut domain = lake_domain(4, 4);
        let mut scheme = SwScheme::new(SchemeSettings::default(), None);
        scheme.prepare(&mut domain).unwrap();
        scheme.run_batch(0.1).unwrap();
        scheme.wait_idle();
        scheme.read_back(&mut domain).unwrap();
        // 静水湖面读回后不变
        for id in 0..16 {
            assert!(
                (domain
                    .get_state(id, crate::domain::StateIndex::FreeSurfaceLevel)
                    .unwrap()
                    - 1.0)
                    .abs()
                    < 1e-6
            );
        }
        scheme.cleanup().unwrap();
    }
}
