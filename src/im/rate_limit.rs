//! 滑动窗口频率限制
//!
//! 超限时立即返回频率错误，不排队等待。

use crate::im::clock::Clock;
use crate::im::error::{ImError, ImResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

pub struct RateLimiter {
    name: &'static str,
    max_calls: usize,
    window_ms: i64,
    err_code: i32,
    clock: Arc<dyn Clock>,
    calls: Mutex<VecDeque<i64>>,
}

impl RateLimiter {
    pub fn new(
        name: &'static str,
        max_calls: usize,
        window_ms: i64,
        err_code: i32,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name,
            max_calls,
            window_ms,
            err_code,
            clock,
            calls: Mutex::new(VecDeque::with_capacity(max_calls)),
        }
    }

    /// 记录一次调用；窗口内已达上限时返回错误且不计数
    pub fn acquire(&self) -> ImResult<()> {
        let now = self.clock.now_ms();
        let mut calls = self.calls.lock();
        while let Some(&first) = calls.front() {
            if now - first >= self.window_ms {
                calls.pop_front();
            } else {
                break;
            }
        }
        if calls.len() >= self.max_calls {
            tracing::warn!(
                "[RateLimit] ⛔ {} 调用过于频繁 (上限 {} 次 / {}ms)",
                self.name,
                self.max_calls,
                self.window_ms
            );
            return Err(ImError::new(
                self.err_code,
                format!(
                    "{} 调用频率超限: 每 {}ms 最多 {} 次",
                    self.name, self.window_ms, self.max_calls
                ),
            ));
        }
        calls.push_back(now);
        Ok(())
    }

    pub fn reset(&self) {
        self.calls.lock().clear();
    }
}
