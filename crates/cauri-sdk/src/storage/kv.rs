//! KV 存储模块 - 基于 sled 的本地键值存储
//!
//! 只保存客户端本地偏好（例如通知权限记忆），业务数据全部在远端文档库。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sled::{Db, Tree};

use crate::error::{CauriSDKError, Result};

const CLIENT_TREE: &str = "client";

/// KV 存储组件
#[derive(Debug, Clone)]
pub struct KvStore {
    path: PathBuf,
    db: Db,
    tree: Tree,
}

impl KvStore {
    /// 在 `{base_path}/kv` 打开存储
    pub async fn new(base_path: &Path) -> Result<Self> {
        let kv_path = base_path.join("kv");

        tokio::fs::create_dir_all(&kv_path)
            .await
            .map_err(|e| CauriSDKError::IO(format!("创建 KV 存储目录失败: {}", e)))?;

        // 旧实例可能刚释放文件锁，重试多次带退避
        const MAX_OPEN_RETRIES: u32 = 5;
        const RETRY_DELAY_MS: u64 = 100;
        let mut attempt = 0;
        let db = loop {
            match sled::open(&kv_path) {
                Ok(db) => break db,
                Err(e) => {
                    let msg = e.to_string();
                    let is_lock = msg.contains("could not acquire lock")
                        || msg.contains("Resource temporarily unavailable")
                        || msg.contains("WouldBlock");
                    attempt += 1;
                    if !is_lock || attempt >= MAX_OPEN_RETRIES {
                        return Err(CauriSDKError::KvStore(format!(
                            "打开 sled 数据库失败: {}",
                            msg
                        )));
                    }
                    let delay_ms = RETRY_DELAY_MS * (1 << attempt);
                    tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                }
            }
        };

        let tree = db
            .open_tree(CLIENT_TREE)
            .map_err(|e| CauriSDKError::KvStore(format!("打开 Tree 失败: {}", e)))?;

        tracing::info!("KV 存储已打开: {}", kv_path.display());

        Ok(Self {
            path: kv_path,
            db,
            tree,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 设置键值对
    pub async fn set<K, V>(&self, key: K, value: &V) -> Result<()>
    where
        K: AsRef<[u8]>,
        V: Serialize,
    {
        let value_bytes = serde_json::to_vec(value)
            .map_err(|e| CauriSDKError::Serialization(format!("序列化值失败: {}", e)))?;

        self.tree
            .insert(key, value_bytes)
            .map_err(|e| CauriSDKError::KvStore(format!("设置键值对失败: {}", e)))?;

        Ok(())
    }

    /// 获取键值对
    pub async fn get<K, V>(&self, key: K) -> Result<Option<V>>
    where
        K: AsRef<[u8]>,
        V: for<'de> Deserialize<'de>,
    {
        let result = self
            .tree
            .get(key)
            .map_err(|e| CauriSDKError::KvStore(format!("获取键值对失败: {}", e)))?;

        match result {
            Some(value_bytes) => {
                let value = serde_json::from_slice(&value_bytes).map_err(|e| {
                    CauriSDKError::Serialization(format!("反序列化值失败: {}", e))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// 删除键值对，返回是否存在
    pub async fn delete<K>(&self, key: K) -> Result<bool>
    where
        K: AsRef<[u8]>,
    {
        let removed = self
            .tree
            .remove(key)
            .map_err(|e| CauriSDKError::KvStore(format!("删除键值对失败: {}", e)))?;
        Ok(removed.is_some())
    }

    /// 检查键是否存在
    pub async fn exists<K>(&self, key: K) -> Result<bool>
    where
        K: AsRef<[u8]>,
    {
        self.tree
            .contains_key(key)
            .map_err(|e| CauriSDKError::KvStore(format!("检查键存在失败: {}", e)))
    }

    /// 落盘
    pub async fn flush(&self) -> Result<()> {
        self.db
            .flush_async()
            .await
            .map_err(|e| CauriSDKError::KvStore(format!("刷盘失败: {}", e)))?;
        Ok(())
    }
}

/// KV 存储键名
pub mod keys {
    /// 上一次已知的通知权限
    pub const NOTIFICATION_PERMISSION: &str = "notification.permission";
    /// 是否已经弹出过通知权限请求
    pub const NOTIFICATION_PROMPTED: &str = "notification.prompted";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_kv_store_basic_operations() {
        let temp_dir = TempDir::new().unwrap();
        let store = KvStore::new(temp_dir.path()).await.unwrap();

        let test_data = json!({"name": "test", "value": 123});
        store.set("test_key", &test_data).await.unwrap();
        let retrieved: serde_json::Value = store.get("test_key").await.unwrap().unwrap();
        assert_eq!(retrieved, test_data);

        assert!(store.exists("test_key").await.unwrap());
        assert!(!store.exists("non_existent_key").await.unwrap());

        assert!(store.delete("test_key").await.unwrap());
        assert!(!store.delete("test_key").await.unwrap());
        let deleted: Option<serde_json::Value> = store.get("test_key").await.unwrap();
        assert!(deleted.is_none());
    }

    #[tokio::test]
    async fn test_kv_store_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = KvStore::new(temp_dir.path()).await.unwrap();
            store.set(keys::NOTIFICATION_PROMPTED, &true).await.unwrap();
            store.flush().await.unwrap();
        }

        let store = KvStore::new(temp_dir.path()).await.unwrap();
        let prompted: Option<bool> = store.get(keys::NOTIFICATION_PROMPTED).await.unwrap();
        assert_eq!(prompted, Some(true));
    }
}
