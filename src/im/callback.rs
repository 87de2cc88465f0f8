//! 异步操作回调与按提交顺序派发的操作队列

use crate::im::error::ImResult;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// 异步操作的结果回调：成功带结果值，失败带错误码与描述
#[async_trait]
pub trait ImCallback<T: Send + 'static>: Send + Sync {
    async fn on_success(&self, value: T);
    async fn on_error(&self, code: i32, desc: String);
}

/// 会话内的操作队列
///
/// 操作按提交顺序被派发执行，但每个操作独立运行，完成顺序取决于各自的网络耗时。
pub struct OpQueue {
    tx: mpsc::UnboundedSender<BoxFuture<'static, ()>>,
}

impl OpQueue {
    /// 创建队列并启动派发任务（需在 tokio 运行时内调用）
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<BoxFuture<'static, ()>>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                tokio::spawn(job);
            }
            debug!("[OpQueue] 队列已关闭");
        });
        Self { tx }
    }

    /// 提交一个操作，结果通过回调返回；调用立即返回
    pub fn submit<T, F>(&self, op: F, callback: Arc<dyn ImCallback<T>>)
    where
        T: Send + 'static,
        F: Future<Output = ImResult<T>> + Send + 'static,
    {
        let job: BoxFuture<'static, ()> = Box::pin(async move {
            match op.await {
                Ok(value) => callback.on_success(value).await,
                Err(e) => callback.on_error(e.code, e.msg).await,
            }
        });
        if self.tx.send(job).is_err() {
            warn!("[OpQueue] 队列已关闭，操作被丢弃");
        }
    }
}

impl Default for OpQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::error::{err_code, ImError};
    use std::time::Duration;

    struct Recorder {
        tx: mpsc::UnboundedSender<Result<u32, i32>>,
    }

    #[async_trait]
    impl ImCallback<u32> for Recorder {
        async fn on_success(&self, value: u32) {
            let _ = self.tx.send(Ok(value));
        }
        async fn on_error(&self, code: i32, _desc: String) {
            let _ = self.tx.send(Err(code));
        }
    }

    #[tokio::test]
    async fn slow_operation_does_not_block_later_ones() {
        let queue = OpQueue::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cb: Arc<dyn ImCallback<u32>> = Arc::new(Recorder { tx });

        queue.submit(
            async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(1)
            },
            cb.clone(),
        );
        queue.submit(
            async { Err(ImError::new(err_code::ERR_GROUP_NOT_FOUND, "missing")) },
            cb.clone(),
        );
        queue.submit(async { Ok(3) }, cb);

        let mut results = Vec::new();
        for _ in 0..3 {
            results.push(rx.recv().await.unwrap());
        }
        assert_eq!(results.last(), Some(&Ok(1)));
        assert!(results.contains(&Err(err_code::ERR_GROUP_NOT_FOUND)));
        assert!(results.contains(&Ok(3)));
    }
}
