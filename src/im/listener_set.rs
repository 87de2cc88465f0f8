//! 监听器集合（事件总线的订阅者列表）
//!
//! 分发时先复制一份快照再逐个回调，回调内部可以安全地添加或移除监听器。

use parking_lot::RwLock;
use std::sync::Arc;

pub struct ListenerSet<T: ?Sized> {
    listeners: RwLock<Vec<Arc<T>>>,
}

impl<T: ?Sized> Default for ListenerSet<T> {
    fn default() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }
}

impl<T: ?Sized> ListenerSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加监听器，同一个实例重复添加只保留一份
    pub fn add(&self, listener: Arc<T>) {
        let mut listeners = self.listeners.write();
        if !listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            listeners.push(listener);
        }
    }

    /// 移除监听器（按实例比较）
    pub fn remove(&self, listener: &Arc<T>) {
        self.listeners.write().retain(|l| !Arc::ptr_eq(l, listener));
    }

    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// 当前监听器快照，锁在返回前释放
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.listeners.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[async_trait]
    trait Ping: Send + Sync {
        async fn ping(&self);
    }

    struct SelfRemoving {
        set: Arc<ListenerSet<dyn Ping>>,
        me: parking_lot::Mutex<Option<Arc<dyn Ping>>>,
        hits: AtomicUsize,
    }

    #[async_trait]
    impl Ping for SelfRemoving {
        async fn ping(&self) {
            self.hits.fetch_add(1, Ordering::SeqCst);
            if let Some(me) = self.me.lock().take() {
                self.set.remove(&me);
            }
        }
    }

    #[tokio::test]
    async fn removal_inside_callback_does_not_deadlock() {
        let set: Arc<ListenerSet<dyn Ping>> = Arc::new(ListenerSet::new());
        let listener = Arc::new(SelfRemoving {
            set: set.clone(),
            me: parking_lot::Mutex::new(None),
            hits: AtomicUsize::new(0),
        });
        let as_dyn: Arc<dyn Ping> = listener.clone();
        *listener.me.lock() = Some(as_dyn.clone());
        set.add(as_dyn.clone());
        set.add(as_dyn);
        assert_eq!(set.len(), 1);

        for l in set.snapshot() {
            l.ping().await;
        }
        assert!(set.is_empty());
        assert_eq!(listener.hits.load(Ordering::SeqCst), 1);

        for l in set.snapshot() {
            l.ping().await;
        }
        assert_eq!(listener.hits.load(Ordering::SeqCst), 1);
    }
}
