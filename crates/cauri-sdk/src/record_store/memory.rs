//! 进程内文档存储
//!
//! 离线模式、演示和测试使用。语义与托管文档库一致：
//! 订阅建立后立即推送当前快照，之后每次写入都推送完整快照；
//! 同一订阅的推送顺序与写入顺序一致。

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use tracing::debug;

use super::{DocPath, Document, RecordStore, Snapshot, SnapshotCallback, Unsubscribe};
use crate::error::{CauriSDKError, Result};

struct Listener {
    path: DocPath,
    callback: SnapshotCallback,
}

struct Inner {
    documents: RwLock<BTreeMap<DocPath, Document>>,
    listeners: Mutex<BTreeMap<u64, Listener>>,
    next_listener_id: AtomicU64,
    /// 写入与推送串行化，保证单订阅内的顺序；可重入以允许回调内写入
    delivery: ReentrantMutex<()>,
    offline: AtomicBool,
}

impl Inner {
    fn snapshot_for(&self, path: &DocPath) -> Snapshot {
        let documents = self.documents.read();
        if path.is_collection() {
            let docs = documents
                .iter()
                .filter(|(doc_path, _)| doc_path.parent_collection().as_ref() == Some(path))
                .map(|(doc_path, doc)| {
                    let id = doc_path.segments().last().cloned().unwrap_or_default();
                    (id, doc.clone())
                })
                .collect();
            Snapshot::Collection(docs)
        } else {
            Snapshot::Document(documents.get(path).cloned())
        }
    }

    /// 推送给所有受影响的订阅（调用方必须持有 delivery 锁）
    fn notify(&self, changed: &DocPath) {
        let parent = changed.parent_collection();
        let targets: Vec<(DocPath, SnapshotCallback)> = {
            let listeners = self.listeners.lock();
            listeners
                .values()
                .filter(|l| &l.path == changed || parent.as_ref() == Some(&l.path))
                .map(|l| (l.path.clone(), l.callback.clone()))
                .collect()
        };

        for (path, callback) in targets {
            let snapshot = self.snapshot_for(&path);
            debug!("推送快照: path={}, size={}", path, snapshot.size());
            callback(snapshot);
        }
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CauriSDKError::TransientNetwork(
                "record store unreachable".to_string(),
            ));
        }
        Ok(())
    }
}

/// 进程内文档存储
#[derive(Clone)]
pub struct MemoryRecordStore {
    inner: Arc<Inner>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                documents: RwLock::new(BTreeMap::new()),
                listeners: Mutex::new(BTreeMap::new()),
                next_listener_id: AtomicU64::new(1),
                delivery: ReentrantMutex::new(()),
                offline: AtomicBool::new(false),
            }),
        }
    }

    /// 模拟网络不可达：读写返回 TransientNetwork，已建立的订阅不受影响
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// 删除文档并推送
    pub fn delete_document(&self, path: &DocPath) -> Result<()> {
        self.inner.ensure_online()?;
        let _delivery = self.inner.delivery.lock();
        let removed = self.inner.documents.write().remove(path);
        if removed.is_some() {
            self.inner.notify(path);
        }
        Ok(())
    }

    /// 当前活跃订阅数
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// 指定路径上的活跃订阅数
    pub fn listener_count_for(&self, path: &DocPath) -> usize {
        self.inner
            .listeners
            .lock()
            .values()
            .filter(|l| &l.path == path)
            .count()
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get_once(&self, path: &DocPath) -> Result<Option<Document>> {
        self.inner.ensure_online()?;
        if path.is_collection() {
            return Err(CauriSDKError::InvalidData(format!(
                "get_once expects a document path, got collection {}",
                path
            )));
        }
        Ok(self.inner.documents.read().get(path).cloned())
    }

    async fn set_document(&self, path: &DocPath, fields: Document) -> Result<()> {
        self.inner.ensure_online()?;
        if path.is_collection() {
            return Err(CauriSDKError::InvalidData(format!(
                "set_document expects a document path, got collection {}",
                path
            )));
        }
        let _delivery = self.inner.delivery.lock();
        self.inner.documents.write().insert(path.clone(), fields);
        self.inner.notify(path);
        Ok(())
    }

    fn subscribe(&self, path: &DocPath, callback: SnapshotCallback) -> Result<Box<dyn Unsubscribe>> {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
        let _delivery = self.inner.delivery.lock();
        self.inner.listeners.lock().insert(
            id,
            Listener {
                path: path.clone(),
                callback: callback.clone(),
            },
        );
        debug!("新增订阅: id={}, path={}", id, path);

        callback(self.inner.snapshot_for(path));

        Ok(Box::new(MemoryUnsubscribe {
            id,
            inner: Arc::downgrade(&self.inner),
        }))
    }
}

struct MemoryUnsubscribe {
    id: u64,
    inner: Weak<Inner>,
}

impl Unsubscribe for MemoryUnsubscribe {
    fn unsubscribe(&self) {
        if let Some(inner) = self.inner.upgrade() {
            if inner.listeners.lock().remove(&self.id).is_some() {
                debug!("移除订阅: id={}", self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record_store::paths;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_subscribe_delivers_initial_and_updates() {
        let store = MemoryRecordStore::new();
        let path = paths::user_earnings("u1").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let handle = store
            .subscribe(
                &path,
                Arc::new(move |snap: Snapshot| {
                    seen_clone.lock().push(snap.document().cloned());
                }),
            )
            .unwrap();

        store.set_document(&path, doc(json!({"amount": 10}))).await.unwrap();
        store.set_document(&path, doc(json!({"amount": 20}))).await.unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert!(seen[0].is_none());
        assert_eq!(seen[2].as_ref().unwrap()["amount"], 20);
        drop(seen);

        handle.unsubscribe();
        handle.unsubscribe();
        assert_eq!(store.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_collection_snapshot_tracks_children() {
        let store = MemoryRecordStore::new();
        let cart = paths::user_cart("u1").unwrap();
        let sizes = Arc::new(Mutex::new(Vec::new()));
        let sizes_clone = sizes.clone();

        let _handle = store
            .subscribe(&cart, Arc::new(move |snap: Snapshot| sizes_clone.lock().push(snap.size())))
            .unwrap();

        store
            .set_document(&cart.child("item-1").unwrap(), doc(json!({"qty": 1})))
            .await
            .unwrap();
        store
            .set_document(&cart.child("item-2").unwrap(), doc(json!({"qty": 3})))
            .await
            .unwrap();
        // 其他用户的购物车不影响
        store
            .set_document(&paths::user_cart("u2").unwrap().child("x").unwrap(), doc(json!({})))
            .await
            .unwrap();
        store.delete_document(&cart.child("item-1").unwrap()).unwrap();

        assert_eq!(*sizes.lock(), vec![0, 1, 2, 1]);
    }

    #[tokio::test]
    async fn test_offline_store_fails_reads_and_writes() {
        let store = MemoryRecordStore::new();
        let path = paths::user_profile("u1").unwrap();
        store.set_offline(true);

        assert!(matches!(
            store.get_once(&path).await,
            Err(CauriSDKError::TransientNetwork(_))
        ));
        assert!(store.set_document(&path, Document::new()).await.is_err());

        store.set_offline(false);
        assert!(store.get_once(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_collection_paths_rejected_for_point_operations() {
        let store = MemoryRecordStore::new();
        let cart = paths::user_cart("u1").unwrap();
        assert!(matches!(
            store.get_once(&cart).await,
            Err(CauriSDKError::InvalidData(_))
        ));
    }
}
