// crates/fr_physics/src/scheme/worker.rs

//! 格式工作线程
//!
//! 每个域一个工作线程，独占设备命令队列（唯一提交者）。请求经
//! 通道按序处理；批次完成通过条件变量发布，遥测写入共享读写锁。
//!
//! 共享窗口约定：
//! - 单元状态缓冲区对仅由本线程触碰，调用方只经批间读回访问；
//! - 边界/耦合缓冲区由调用方在批间刷新、设备在批内读取，两个
//!   窗口不重叠；
//! - 遥测标量只在批末由本线程写入，调用方在批外读取。

use super::batch::QueueController;
use super::telemetry::{BatchTelemetry, EngineTelemetry};
use super::SchemeSettings;
use crate::domain::StateReadback;
use crate::engine::ReferenceEngine;
use crate::gpu::GpuEngine;
use fr_foundation::{ErrorKind, FrResult, LoggerHandle, ProfilePhase, ProfilerHandle};
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::time::Instant;

/// 工作线程请求
pub(crate) enum WorkerRequest {
    /// 以给定目标时刻运行一个批次
    RunBatch { target: f64 },
    /// 刷新稠密边界强迫值
    ImportDense(Vec<f64>),
    /// 刷新稀疏耦合值
    ImportSparse(Vec<f64>),
    /// 读回当前状态
    ReadState(Sender<FrResult<StateReadback>>),
    /// 释放资源并退出
    Cleanup(Sender<()>),
}

/// 主机/设备引擎二选一
pub(crate) enum Engine {
    Gpu(Box<GpuEngine>),
    Cpu(Box<ReferenceEngine>),
}

impl Engine {
    fn set_target(&mut self, target: f64) -> FrResult<()> {
        match self {
            Engine::Gpu(e) => e.set_target(target),
            Engine::Cpu(e) => {
                e.set_target(target);
                Ok(())
            }
        }
    }

    fn import_dense(&mut self, values: Vec<f64>) -> FrResult<()> {
        match self {
            Engine::Gpu(e) => e.import_dense(&values),
            Engine::Cpu(e) => {
                e.import_dense(values);
                Ok(())
            }
        }
    }

    fn import_sparse(&mut self, values: Vec<f64>) -> FrResult<()> {
        match self {
            Engine::Gpu(e) => e.import_sparse(&values),
            Engine::Cpu(e) => {
                e.import_sparse_values(values);
                Ok(())
            }
        }
    }

    fn reset_counters(&mut self) -> FrResult<()> {
        match self {
            Engine::Gpu(e) => e.reset_counters(),
            Engine::Cpu(e) => {
                e.reset_counters();
                Ok(())
            }
        }
    }

    fn schedule_iteration(&mut self) -> FrResult<()> {
        match self {
            Engine::Gpu(e) => e.schedule_iteration(),
            Engine::Cpu(e) => {
                e.iterate();
                Ok(())
            }
        }
    }

    fn finish_batch(&mut self) -> FrResult<EngineTelemetry> {
        match self {
            Engine::Gpu(e) => e.finish_batch(),
            Engine::Cpu(e) => Ok(EngineTelemetry {
                time: e.time(),
                timestep: e.timestep(),
                timestep_mov_avg: e.timestep_mov_avg(),
                batch_dt_sum: e.batch_dt_sum(),
                successful: e.batch_successful(),
                skipped: e.batch_skipped(),
            }),
        }
    }

    fn read_state(&mut self) -> FrResult<StateReadback> {
        match self {
            Engine::Gpu(e) => e.read_state(),
            Engine::Cpu(e) => Ok(e.read_state()),
        }
    }

    fn current_time(&self) -> f64 {
        match self {
            Engine::Gpu(e) => e.last_telemetry().time,
            Engine::Cpu(e) => e.time(),
        }
    }

    fn timestep_mov_avg(&self) -> f64 {
        match self {
            Engine::Gpu(e) => e.last_telemetry().timestep_mov_avg,
            Engine::Cpu(e) => e.timestep_mov_avg(),
        }
    }
}

/// 调用方与工作线程的共享状态
pub(crate) struct SharedState {
    pub telemetry: RwLock<BatchTelemetry>,
    pub busy: AtomicBool,
    pub errored: AtomicBool,
    pub slow: AtomicBool,
    idle_lock: Mutex<()>,
    idle_cv: Condvar,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            telemetry: RwLock::new(BatchTelemetry::default()),
            busy: AtomicBool::new(false),
            errored: AtomicBool::new(false),
            slow: AtomicBool::new(false),
            idle_lock: Mutex::new(()),
            idle_cv: Condvar::new(),
        }
    }

    /// 阻塞至没有批次在途
    pub fn wait_idle(&self) {
        let mut guard = self.idle_lock.lock();
        while self.busy.load(Ordering::Acquire) {
            self.idle_cv.wait(&mut guard);
        }
    }

    fn notify_idle(&self) {
        let _guard = self.idle_lock.lock();
        self.busy.store(false, Ordering::Release);
        self.idle_cv.notify_all();
    }
}

/// 工作线程主循环
pub(crate) fn run_worker(
    rx: Receiver<WorkerRequest>,
    shared: Arc<SharedState>,
    mut engine: Engine,
    settings: SchemeSettings,
    cell_count: usize,
    logger: LoggerHandle,
    profiler: ProfilerHandle,
) {
    let mut controller = QueueController::new(settings.queue_mode, settings.initial_queue_size);
    let mut pending_dense: Option<Vec<f64>> = None;
    let mut pending_sparse: Option<Vec<f64>> = None;
    let mut last_target = f64::NEG_INFINITY;

    while let Ok(request) = rx.recv() {
        match request {
            WorkerRequest::ImportDense(values) => pending_dense = Some(values),
            WorkerRequest::ImportSparse(values) => pending_sparse = Some(values),
            WorkerRequest::ReadState(reply) => {
                let _ = reply.send(engine.read_state());
            }
            WorkerRequest::Cleanup(reply) => {
                let _ = reply.send(());
                break;
            }
            WorkerRequest::RunBatch { target } => {
                profiler.profile("BatchRunning", ProfilePhase::Start);
                let outcome = service_batch(
                    &mut engine,
                    &mut controller,
                    &shared,
                    &settings,
                    &logger,
                    cell_count,
                    target,
                    &mut last_target,
                    &mut pending_dense,
                    &mut pending_sparse,
                );
                if let Err(error) = outcome {
                    let kind = if error.is_fatal() {
                        ErrorKind::Fatal
                    } else {
                        ErrorKind::ModelStop
                    };
                    logger.log_error(
                        &format!("batch failed: {error}"),
                        kind,
                        "scheme worker",
                        "check device state and previous errors",
                    );
                    shared.errored.store(true, Ordering::Release);
                }
                profiler.profile("BatchRunning", ProfilePhase::End);
                shared.notify_idle();
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn service_batch(
    engine: &mut Engine,
    controller: &mut QueueController,
    shared: &SharedState,
    settings: &SchemeSettings,
    logger: &LoggerHandle,
    cell_count: usize,
    target: f64,
    last_target: &mut f64,
    pending_dense: &mut Option<Vec<f64>>,
    pending_sparse: &mut Option<Vec<f64>>,
) -> FrResult<()> {
    let wall_start = Instant::now();

    // 1. 目标时刻变更：写入新目标并截断越界步长
    if *last_target != target {
        engine.set_target(target)?;
        *last_target = target;
    }

    // 2. 待导入的边界数据
    let mut imported = false;
    if let Some(values) = pending_dense.take() {
        engine.import_dense(values)?;
        imported = true;
    }
    if let Some(values) = pending_sparse.take() {
        engine.import_sparse(values)?;
        imported = true;
    }

    let time_before = engine.current_time();
    let mov_avg = engine.timestep_mov_avg();

    // 模拟过慢守卫：步长滑动平均塌缩后不再调度
    if time_before > 0.1 && mov_avg > 0.0 && mov_avg < 1e-3 {
        shared.slow.store(true, Ordering::Release);
        shared.telemetry.write().slow = true;
        logger.log_warning(&format!(
            "simulation stalling, mean timestep {mov_avg:.3e}s at t={time_before:.3}s"
        ));
        return Ok(());
    }

    // 3. 提交至多 Q 次迭代
    let remaining = target - time_before;
    let mut submitted = 0u32;
    if imported || remaining > 1e-8 {
        engine.reset_counters()?;
    }
    if remaining > 1e-8 {
        let amount = controller.schedule(remaining, mov_avg);
        for _ in 0..amount {
            engine.schedule_iteration()?;
        }
        submitted = amount;
    }

    // 4.–6. 读回遥测，更新主机端计数
    let engine_tel = engine.finish_batch()?;
    controller.record_batch(wall_start.elapsed(), engine_tel.successful);

    {
        let mut telemetry = shared.telemetry.write();
        telemetry.absorb(engine_tel, submitted, cell_count as u64, settings.dry_threshold);
        if telemetry.rollback {
            logger.log_warning(&format!(
                "batch rolled back: no successful iteration, dt={:.3e}",
                engine_tel.timestep
            ));
        }
    }
    Ok(())
}
