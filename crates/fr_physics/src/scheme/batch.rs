// crates/fr_physics/src/scheme/batch.rs

//! 自适应批次长度控制器
//!
//! 目标是每个批次约一秒的设备工作量。记录上一批次的墙钟时长 D
//! 与成功迭代数 r 后按
//!
//! ```text
//! Q_new ← clamp(⌈1 / (D / Q_old)⌉, 1, 3·r)
//! ```
//!
//! 更新队列长度；Q 超过 40 后每批增长不超过 2 倍。调度时还受
//! 步长滑动平均预测的到目标迭代数与硬上限约束。

use super::QueueMode;
use std::time::Duration;

/// 单批次迭代数硬上限
pub const MAX_QUEUE_SIZE: u32 = 300;

/// 自适应队列长度控制器
#[derive(Debug, Clone)]
pub struct QueueController {
    mode: QueueMode,
    queue_size: u32,
}

impl QueueController {
    /// 创建控制器
    pub fn new(mode: QueueMode, initial: u32) -> Self {
        Self {
            mode,
            queue_size: initial.clamp(1, MAX_QUEUE_SIZE),
        }
    }

    /// 当前队列长度
    pub fn queue_size(&self) -> u32 {
        self.queue_size
    }

    /// 本批次应提交的迭代数
    ///
    /// `remaining`: 距目标时刻的模拟时间；`dt_mov_avg`: 步长滑动
    /// 平均。平均值可用时队列不超过预测的到目标迭代数。
    pub fn schedule(&self, remaining: f64, dt_mov_avg: f64) -> u32 {
        let mut amount = self.queue_size;
        if dt_mov_avg > 1e-3 && remaining > 1e-2 {
            let estimated = (remaining / dt_mov_avg).ceil() as u32;
            amount = amount.min(estimated.max(1));
        } else {
            amount = 1;
        }
        amount.clamp(1, MAX_QUEUE_SIZE)
    }

    /// 记录批次结果并更新队列长度
    pub fn record_batch(&mut self, wall: Duration, successful: u32) {
        if self.mode == QueueMode::Fixed {
            return;
        }
        let seconds = wall.as_secs_f64();
        if seconds <= 0.0 {
            return;
        }
        let per_iteration = seconds / self.queue_size.max(1) as f64;
        let ideal = (1.0 / per_iteration).ceil().max(1.0) as u32;

        let mut next = ideal.clamp(1, (3 * successful).max(1));
        if self.queue_size > 40 {
            next = next.min(self.queue_size.saturating_mul(2));
        }
        self.queue_size = next.clamp(1, MAX_QUEUE_SIZE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_mode_never_adapts() {
        let mut controller = QueueController::new(QueueMode::Fixed, 8);
        controller.record_batch(Duration::from_millis(1), 8);
        assert_eq!(controller.queue_size(), 8);
    }

    #[test]
    fn test_grows_toward_one_second() {
        // 每次迭代 1 ms → 理想队列 1000，受 3·r 限制
        let mut controller = QueueController::new(QueueMode::Auto, 10);
        controller.record_batch(Duration::from_millis(10), 10);
        assert_eq!(controller.queue_size(), 30);
    }

    #[test]
    fn test_shrinks_when_batch_too_slow() {
        // 队列 100，批次耗时 10 s → 每次迭代 0.1 s → 理想 10
        let mut controller = QueueController::new(QueueMode::Auto, 100);
        controller.record_batch(Duration::from_secs(10), 100);
        assert_eq!(controller.queue_size(), 10);
    }

    #[test]
    fn test_growth_capped_above_forty() {
        let mut controller = QueueController::new(QueueMode::Auto, 50);
        // 每次迭代 1 µs → 理想极大，但增长不超过 2 倍
        controller.record_batch(Duration::from_micros(50), 50);
        assert_eq!(controller.queue_size(), 100);
    }

    #[test]
    fn test_hard_ceiling() {
        let mut controller = QueueController::new(QueueMode::Auto, 200);
        controller.record_batch(Duration::from_micros(200), 200);
        assert_eq!(controller.queue_size(), MAX_QUEUE_SIZE);
    }

    #[test]
    fn test_settles_near_implied_queue() {
        // 固定每次迭代 5 ms → 隐含队列 200；五个批次内收敛到 ±20%
        let mut controller = QueueController::new(QueueMode::Auto, 1);
        let per_iter = Duration::from_millis(5);
        for _ in 0..5 {
            let q = controller.queue_size();
            controller.record_batch(per_iter * q, q);
        }
        let q = controller.queue_size() as f64;
        assert!((q - 200.0).abs() <= 40.0, "Q = {} 未收敛到 200±20%", q);
    }

    #[test]
    fn test_schedule_respects_target_estimate() {
        let controller = QueueController::new(QueueMode::Auto, 100);
        // 距目标 0.5 s，平均步长 0.1 s → 只需 5 次迭代
        assert_eq!(controller.schedule(0.5, 0.1), 5);
        // 平均未建立时单步推进
        assert_eq!(controller.schedule(10.0, 0.0), 1);
    }
}
