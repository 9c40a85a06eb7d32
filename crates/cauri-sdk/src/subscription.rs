//! 可取消订阅
//!
//! 存储层的 Unsubscribe 只保证不再登记新推送，但已经在途的推送仍可能落地。
//! 这里用一把可重入闸门包住回调：
//! - 回调执行期间持有闸门
//! - close() 获取同一把闸门后置关闭标记
//!
//! 因此 close() 返回后，没有正在执行的回调，也不会再有新的回调执行。
//! 回调内部关闭自己的订阅不会死锁（可重入）。

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::record_store::{DocPath, RecordStore, Snapshot, Unsubscribe};

/// 回调闸门
struct Gate {
    closed: ReentrantMutex<Cell<bool>>,
}

impl Gate {
    fn new() -> Self {
        Self {
            closed: ReentrantMutex::new(Cell::new(false)),
        }
    }

    /// 未关闭时执行，返回是否执行
    fn run<F: FnOnce()>(&self, f: F) -> bool {
        let closed = self.closed.lock();
        if closed.get() {
            return false;
        }
        f();
        true
    }

    fn close(&self) {
        let closed = self.closed.lock();
        closed.set(true);
    }

    fn is_closed(&self) -> bool {
        self.closed.lock().get()
    }
}

/// 单个路径上的活跃订阅
pub struct Subscription {
    id: Uuid,
    path: DocPath,
    gate: Arc<Gate>,
    handle: Box<dyn Unsubscribe>,
    closed: AtomicBool,
}

impl Subscription {
    /// 打开订阅；回调只在 close() 之前执行
    pub fn open<F>(store: &dyn RecordStore, path: DocPath, callback: F) -> Result<Self>
    where
        F: Fn(Snapshot) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        let gate = Arc::new(Gate::new());
        let guarded = {
            let gate = gate.clone();
            let path = path.clone();
            Arc::new(move |snapshot: Snapshot| {
                if !gate.run(|| callback(snapshot)) {
                    debug!("丢弃已关闭订阅的推送: id={}, path={}", id, path);
                }
            })
        };

        let handle = store.subscribe(&path, guarded)?;
        debug!("订阅已打开: id={}, path={}", id, path);

        Ok(Self {
            id,
            path,
            gate,
            handle,
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &DocPath {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.gate.is_closed()
    }

    /// 关闭订阅（幂等）
    ///
    /// 返回后保证不会再有回调执行。
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.gate.close();
        self.handle.unsubscribe();
        debug!("订阅已关闭: id={}, path={}", self.id, self.path);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// 一组同生命周期的订阅
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 打开订阅并加入集合
    pub fn open<F>(&mut self, store: &dyn RecordStore, path: DocPath, callback: F) -> Result<Uuid>
    where
        F: Fn(Snapshot) + Send + Sync + 'static,
    {
        let subscription = Subscription::open(store, path, callback)?;
        let id = subscription.id();
        self.subscriptions.push(subscription);
        Ok(id)
    }

    /// 关闭全部订阅，返回关闭数量
    pub fn close_all(&mut self) -> usize {
        let count = self.subscriptions.len();
        for subscription in self.subscriptions.drain(..) {
            subscription.close();
        }
        count
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn paths(&self) -> Vec<DocPath> {
        self.subscriptions.iter().map(|s| s.path().clone()).collect()
    }
}
