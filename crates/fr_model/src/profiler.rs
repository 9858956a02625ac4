// crates/fr_model/src/profiler.rs

//! tracing 后端的剖析实现

use fr_foundation::{ProfilePhase, Profiler};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Instant;

/// tracing 剖析实现
///
/// 按标签配对 START/END 事件并输出区间耗时。
#[derive(Debug, Default)]
pub struct TracingProfiler {
    open: Mutex<HashMap<String, Instant>>,
}

impl TracingProfiler {
    /// 创建剖析器
    pub fn new() -> Self {
        Self::default()
    }
}

impl Profiler for TracingProfiler {
    fn profile(&self, tag: &str, phase: ProfilePhase) {
        match phase {
            ProfilePhase::Start => {
                self.open.lock().insert(tag.to_string(), Instant::now());
            }
            ProfilePhase::End => {
                if let Some(start) = self.open.lock().remove(tag) {
                    tracing::debug!(
                        target: "freshet::profile",
                        tag,
                        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
                        "profile section"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmatched_end_is_harmless() {
        let profiler = TracingProfiler::new();
        profiler.profile("batch", ProfilePhase::End);
        profiler.profile("batch", ProfilePhase::Start);
        profiler.profile("batch", ProfilePhase::End);
        assert!(profiler.open.lock().is_empty());
    }
}
