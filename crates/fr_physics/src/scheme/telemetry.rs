// crates/fr_physics/src/scheme/telemetry.rs

//! 批次遥测
//!
//! 设备端三个批次标量（累计步长、成功数、跳过数）与时间状态在
//! 批末读回，由工作线程折算进共享遥测。调用方只在批次之间读取。

/// 引擎在一个批次结束时读回的原始遥测
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineTelemetry {
    /// 当前模拟时刻 [s]
    pub time: f64,
    /// 当前步长 [s]
    pub timestep: f64,
    /// 步长滑动平均 [s]
    pub timestep_mov_avg: f64,
    /// 批内累计步长 Σdt [s]
    pub batch_dt_sum: f64,
    /// 批内成功迭代数
    pub successful: u32,
    /// 批内跳过迭代数
    pub skipped: u32,
}

/// 对调用方可见的批次遥测
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchTelemetry {
    /// 当前模拟时刻 [s]
    pub current_time: f64,
    /// 当前步长 [s]
    pub current_timestep: f64,
    /// 步长滑动平均 [s]
    pub timestep_mov_avg: f64,
    /// 成功迭代的平均步长 [s]
    pub average_timestep: f64,
    /// 最近批次提交的迭代数
    pub batch_size: u32,
    /// 最近批次成功迭代数
    pub batch_successful: u32,
    /// 最近批次跳过迭代数
    pub batch_skipped: u32,
    /// 批内累计步长 Σdt [s]
    pub batch_dt_sum: f64,
    /// 历史总迭代数
    pub total_iterations: u64,
    /// 历史总成功数
    pub total_successful: u64,
    /// 历史总跳过数
    pub total_skipped: u64,
    /// 累计计算单元数
    pub cells_calculated: u64,
    /// 回退信号：批内无成功迭代且步长已塌缩
    pub rollback: bool,
    /// 模拟过慢信号
    pub slow: bool,
}

impl BatchTelemetry {
    /// 折算一次批末引擎遥测
    pub fn absorb(&mut self, engine: EngineTelemetry, submitted: u32, cell_count: u64, dry_dt: f64) {
        self.current_time = engine.time;
        self.current_timestep = engine.timestep;
        self.timestep_mov_avg = engine.timestep_mov_avg;
        self.batch_size = submitted;
        self.batch_successful = engine.successful;
        self.batch_skipped = engine.skipped;
        self.batch_dt_sum = engine.batch_dt_sum;
        self.average_timestep = if engine.successful > 0 {
            engine.batch_dt_sum / engine.successful as f64
        } else {
            0.0
        };
        self.total_iterations += submitted as u64;
        self.total_successful += engine.successful as u64;
        self.total_skipped += engine.skipped as u64;
        self.cells_calculated += submitted as u64 * cell_count;
        self.rollback = submitted > 0 && engine.successful == 0 && engine.timestep <= dry_dt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absorb_accumulates() {
        let mut tel = BatchTelemetry::default();
        tel.absorb(
            EngineTelemetry {
                time: 1.0,
                timestep: 0.1,
                timestep_mov_avg: 0.1,
                batch_dt_sum: 0.5,
                successful: 5,
                skipped: 1,
            },
            6,
            100,
            1e-10,
        );
        assert_eq!(tel.batch_successful, 5);
        assert!((tel.average_timestep - 0.1).abs() < 1e-12);
        assert_eq!(tel.cells_calculated, 600);
        assert!(!tel.rollback);

        tel.absorb(
            EngineTelemetry {
                time: 1.0,
                timestep: 0.0,
                timestep_mov_avg: 0.1,
                batch_dt_sum: 0.0,
                successful: 0,
                skipped: 4,
            },
            4,
            100,
            1e-10,
        );
        assert_eq!(tel.total_iterations, 10);
        assert!(tel.rollback, "零成功且步长塌缩应发出回退信号");
    }

    #[test]
    fn test_zero_successful_average_is_zero() {
        let mut tel = BatchTelemetry::default();
        tel.absorb(EngineTelemetry::default(), 0, 10, 1e-10);
        assert_eq!(tel.average_timestep, 0.0);
        assert!(!tel.rollback, "空批次不构成回退");
    }
}
