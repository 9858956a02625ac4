// crates/fr_model/src/driver.rs

//! 模型驱动
//!
//! `run_next(T)` 循环调度批次直至模拟时刻到达 T：读取当前时刻，
//! 未达目标且格式空闲时调度下一批次；回退与过慢信号中断循环并
//! 记入日志。超过目标逾 1e-5 s 时记警告，遥测报告的时刻被钳制
//! 到目标，状态不丢弃。

use crate::config::ModelConfig;
use crate::logging::TracingLogger;
use fr_foundation::{
    noop_profiler, ErrorKind, FrError, FrResult, LoggerHandle, Precision, ProfilerHandle,
};
use fr_physics::{CartesianDomain, Scheme, SwScheme};
use fr_runtime::{DeviceSelection, GpuDevice};
use std::sync::Arc;

/// 过限容差
const OVERRUN_EPS: f64 = 1e-5;

/// 进度遥测
#[derive(Debug, Clone, Copy, Default)]
pub struct Progress {
    /// 当前模拟时刻 [s]（钳制到最近一次目标）
    pub current_time: f64,
    /// 当前步长 [s]
    pub current_timestep: f64,
    /// 成功迭代的平均步长 [s]
    pub average_timestep: f64,
    /// 最近批次的迭代数
    pub batch_size: u32,
    /// 最近批次成功迭代数
    pub batch_successful: u32,
    /// 最近批次跳过迭代数
    pub batch_skipped: u32,
    /// 累计计算单元数
    pub cells_calculated: u64,
}

/// 洪水淹没模型
///
/// 持有一个域、一个格式与一个设备。
pub struct FloodModel {
    domain: CartesianDomain,
    scheme: Box<dyn Scheme>,
    device: Option<GpuDevice>,
    config: ModelConfig,
    logger: LoggerHandle,
    last_target: f64,
}

impl FloodModel {
    /// 按配置构建模型
    ///
    /// 获取设备（失败且允许回退时转 CPU 引擎）、按设备能力强制
    /// 精度、构造格式。域几何与初始条件由调用方通过
    /// [`FloodModel::domain_mut`] 填充后调用 [`FloodModel::prepare`]。
    pub fn build(config: ModelConfig) -> FrResult<Self> {
        Self::build_with_observers(config, Arc::new(TracingLogger), noop_profiler())
    }

    /// 注入日志与剖析实现的构建入口
    pub fn build_with_observers(
        mut config: ModelConfig,
        logger: LoggerHandle,
        profiler: ProfilerHandle,
    ) -> FrResult<Self> {
        let selection = match config.selected_device {
            Some(index) => DeviceSelection::Index(index),
            None => DeviceSelection::HighPerformance,
        };

        let device = match GpuDevice::acquire(selection) {
            Ok(device) => Some(device),
            Err(error) => {
                if !config.allow_cpu_fallback {
                    return Err(error);
                }
                logger.log_warning(&format!(
                    "no compute device available ({error}), falling back to host engine"
                ));
                None
            }
        };

        // 设备不具备完整双精度时强制单精度
        if config.float_precision == Precision::Double {
            if let Some(device) = &device {
                if !device.is_double_compatible() {
                    logger.log_warning(
                        "device reports no double-precision support, forcing single precision",
                    );
                    config.float_precision = Precision::Single;
                }
            }
        }
        config.scheme.precision = config.float_precision;

        let scheme = SwScheme::new(config.scheme.clone(), device.clone())
            .with_observers(logger.clone(), profiler);

        Ok(Self {
            domain: CartesianDomain::new(),
            scheme: Box::new(scheme),
            device,
            config,
            logger,
            last_target: 0.0,
        })
    }

    /// 域（只读）
    pub fn domain(&self) -> &CartesianDomain {
        &self.domain
    }

    /// 域（可写，prepare 之前填充初始条件）
    pub fn domain_mut(&mut self) -> &mut CartesianDomain {
        &mut self.domain
    }

    /// 设备句柄
    pub fn device(&self) -> Option<&GpuDevice> {
        self.device.as_ref()
    }

    /// 配置
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// 准备格式：上传域数据并启动工作线程
    pub fn prepare(&mut self) -> FrResult<()> {
        self.scheme.prepare(&mut self.domain)
    }

    /// 推进模拟至目标时刻
    ///
    /// 返回时最后一个批次的完成标记已解析，主机端遥测可见。
    pub fn run_next(&mut self, target: f64) -> FrResult<()> {
        let target = target.min(self.config.simulation_length);
        self.last_target = target;

        let mut current = self.scheme.telemetry().current_time;
        if current >= target - 1e-8 {
            return Ok(());
        }

        let mut stagnant_batches = 0u32;
        while current < target - 1e-8 {
            let batch_target = self.clamp_to_output_boundary(current, target);

            self.scheme.run_batch(batch_target)?;
            self.scheme.wait_idle();

            let telemetry = self.scheme.telemetry();
            if telemetry.slow {
                self.logger.log_error(
                    "simulation progressing too slowly, stopping",
                    ErrorKind::ModelStop,
                    "FloodModel::run_next",
                    "check initial conditions and roughness",
                );
                return Ok(());
            }
            if telemetry.rollback {
                self.logger
                    .log_warning("scheme signalled a rollback, batch produced no progress");
            }

            if telemetry.current_time <= current + 1e-12 {
                stagnant_batches += 1;
                if stagnant_batches >= 2 {
                    self.logger.log_error(
                        &format!("simulated time stalled at {current:.6}s"),
                        ErrorKind::ModelStop,
                        "FloodModel::run_next",
                        "check timestep configuration",
                    );
                    return Ok(());
                }
            } else {
                stagnant_batches = 0;
            }
            current = telemetry.current_time;
        }

        if current > target + OVERRUN_EPS {
            self.logger.log_warning(&format!(
                "simulation overran target: t={current:.6}s, target={target:.6}s"
            ));
        }
        Ok(())
    }

    fn clamp_to_output_boundary(&self, current: f64, target: f64) -> f64 {
        let freq = self.config.output_frequency;
        if freq <= 0.0 {
            return target;
        }
        let next_boundary = (current / freq).floor() * freq + freq;
        next_boundary.min(target)
    }

    /// 进度遥测
    ///
    /// 报告的时刻被钳制到最近一次目标（过限策略）。
    pub fn progress(&self) -> Progress {
        let telemetry = self.scheme.telemetry();
        Progress {
            current_time: telemetry.current_time.min(self.last_target),
            current_timestep: telemetry.current_timestep,
            average_timestep: telemetry.average_timestep,
            batch_size: telemetry.batch_size,
            batch_successful: telemetry.batch_successful,
            batch_skipped: telemetry.batch_skipped,
            cells_calculated: telemetry.cells_calculated,
        }
    }

    /// 标记边界数据待导入（批次之间调用）
    pub fn import_boundaries(&mut self) -> FrResult<()> {
        self.scheme.import_boundaries(&self.domain)
    }

    /// 读回水深，行优先 R·C
    ///
    /// 阻塞至设备队列排空。
    pub fn read_depth(&mut self, out: &mut [f64]) -> FrResult<()> {
        self.sync_domain()?;
        self.fill(out, |domain, id| domain.depth(id))
    }

    /// 读回 x 方向流速
    pub fn read_velocity_x(&mut self, out: &mut [f64]) -> FrResult<()> {
        self.sync_domain()?;
        self.fill(out, |domain, id| domain.velocity_x(id))
    }

    /// 读回 y 方向流速
    pub fn read_velocity_y(&mut self, out: &mut [f64]) -> FrResult<()> {
        self.sync_domain()?;
        self.fill(out, |domain, id| domain.velocity_y(id))
    }

    /// 一次读回水深与两个流速分量
    pub fn read_all(
        &mut self,
        out_h: &mut [f64],
        out_vx: &mut [f64],
        out_vy: &mut [f64],
    ) -> FrResult<()> {
        self.sync_domain()?;
        self.fill(out_h, |domain, id| domain.depth(id))?;
        self.fill(out_vx, |domain, id| domain.velocity_x(id))?;
        self.fill(out_vy, |domain, id| domain.velocity_y(id))
    }

    fn sync_domain(&mut self) -> FrResult<()> {
        self.scheme.wait_idle();
        self.scheme.read_back(&mut self.domain)
    }

    fn fill(
        &self,
        out: &mut [f64],
        value: impl Fn(&CartesianDomain, usize) -> FrResult<f64>,
    ) -> FrResult<()> {
        let count = self.domain.cell_count();
        if out.len() != count {
            return Err(FrError::invalid_input(format!(
                "output slice holds {} cells, domain has {count}",
                out.len()
            )));
        }
        for (id, slot) in out.iter_mut().enumerate() {
            *slot = value(&self.domain, id)?;
        }
        Ok(())
    }

    /// 释放格式资源；幂等
    pub fn cleanup(&mut self) -> FrResult<()> {
        self.scheme.cleanup()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fr_physics::TimestepMode;

    fn lake_model(rows: usize, cols: usize) -> FloodModel {
        let config = ModelConfig {
            // 单元测试始终走 CPU 引擎，与设备无关
            allow_cpu_fallback: true,
            scheme: fr_physics::SchemeSettings {
                min_gpu_cells: usize::MAX,
                ..Default::default()
            },
            ..ModelConfig::default()
        };
        let mut model = FloodModel::build(config).unwrap();
        {
            let domain = model.domain_mut();
            domain.set_resolution(1.0, 1.0).unwrap();
            domain.set_extent(rows, cols).unwrap();
            for id in 0..rows * cols {
                domain.set_bed_elevation(id, 0.0).unwrap();
                domain.set_fsl(id, 1.0).unwrap();
            }
        }
        model
    }

    #[test]
    fn test_run_next_reaches_target() {
        let mut model = lake_model(8, 8);
        model.prepare().unwrap();
        model.run_next(0.5).unwrap();
        let progress = model.progress();
        assert!((progress.current_time - 0.5).abs() < 1e-6);
        model.cleanup().unwrap();
    }

    #[test]
    fn test_run_next_at_current_time_is_noop() {
        let mut model = lake_model(4, 4);
        model.prepare().unwrap();
        model.run_next(0.0).unwrap();
        let progress = model.progress();
        assert_eq!(progress.batch_size, 0);
        assert_eq!(progress.current_time, 0.0);
        model.cleanup().unwrap();
    }

    #[test]
    fn test_simulation_length_bounds_target() {
        let config = ModelConfig {
            simulation_length: 0.25,
            scheme: fr_physics::SchemeSettings {
                min_gpu_cells: usize::MAX,
                ..Default::default()
            },
            ..ModelConfig::default()
        };
        let mut model = FloodModel::build(config).unwrap();
        {
            let domain = model.domain_mut();
            domain.set_resolution(1.0, 1.0).unwrap();
            domain.set_extent(4, 4).unwrap();
            for id in 0..16 {
                domain.set_bed_elevation(id, 0.0).unwrap();
                domain.set_fsl(id, 1.0).unwrap();
            }
        }
        model.prepare().unwrap();
        model.run_next(100.0).unwrap();
        assert!(model.progress().current_time <= 0.25 + 1e-6);
        model.cleanup().unwrap();
    }

    #[test]
    fn test_stalled_fixed_timestep_stops_cleanly() {
        let config = ModelConfig {
            scheme: fr_physics::SchemeSettings {
                timestep_mode: TimestepMode::Fixed,
                fixed_timestep: 1e5,
                friction_enabled: false,
                min_gpu_cells: usize::MAX,
                ..Default::default()
            },
            ..ModelConfig::default()
        };
        let mut model = FloodModel::build(config).unwrap();
        {
            let domain = model.domain_mut();
            domain.set_resolution(1.0, 1.0).unwrap();
            domain.set_extent(4, 4).unwrap();
            for id in 0..16 {
                domain.set_bed_elevation(id, 0.0).unwrap();
                domain.set_fsl(id, 1.0).unwrap();
            }
        }
        model.prepare().unwrap();
        // 巨大固定步长：时间不可推进，循环应在两个停滞批次后返回
        model.run_next(1.0).unwrap();
        let progress = model.progress();
        assert_eq!(progress.current_time, 0.0);
        assert_eq!(progress.batch_successful, 0);
        assert!(progress.batch_skipped > 0);
        model.cleanup().unwrap();
    }

    #[test]
    fn test_read_all_row_major() {
        let mut model = lake_model(4, 4);
        model.prepare().unwrap();
        model.run_next(0.1).unwrap();

        let mut h = vec![0.0; 16];
        let mut vx = vec![0.0; 16];
        let mut vy = vec![0.0; 16];
        model.read_all(&mut h, &mut vx, &mut vy).unwrap();
        for id in 0..16 {
            assert!((h[id] - 1.0).abs() < 1e-6);
            assert!(vx[id].abs() < 1e-9);
            assert!(vy[id].abs() < 1e-9);
        }
        model.cleanup().unwrap();
    }

    #[test]
    fn test_output_boundary_clamp() {
        let config = ModelConfig {
            output_frequency: 0.2,
            ..ModelConfig::default()
        };
        let model = FloodModel::build(config).unwrap();
        assert!((model.clamp_to_output_boundary(0.0, 1.0) - 0.2).abs() < 1e-12);
        assert!((model.clamp_to_output_boundary(0.25, 1.0) - 0.4).abs() < 1e-12);
        assert!((model.clamp_to_output_boundary(0.95, 1.0) - 1.0).abs() < 1e-12);
    }
}
