//! 远端文档存储抽象
//!
//! 功能包括：
//! - 层级路径寻址（collection/document 交替）
//! - 单次读取、写入
//! - 长连接订阅：每次变化推送完整快照
//!
//! 托管文档数据库本身是外部服务，SDK 只依赖 [`RecordStore`] 契约。

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{CauriSDKError, Result};

pub mod memory;

pub use memory::MemoryRecordStore;

/// 文档内容（字段名 → JSON 值）
pub type Document = serde_json::Map<String, Value>;

/// 快照回调
pub type SnapshotCallback = Arc<dyn Fn(Snapshot) + Send + Sync>;

/// 层级路径，段数为奇数时指向集合，偶数时指向文档
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath(Vec<String>);

impl DocPath {
    pub fn new<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(CauriSDKError::InvalidData("empty document path".to_string()));
        }
        if let Some(bad) = segments.iter().find(|s| s.is_empty() || s.contains('/')) {
            return Err(CauriSDKError::InvalidData(format!(
                "invalid path segment: {:?}",
                bad
            )));
        }
        Ok(Self(segments))
    }

    /// 从 "a/b/c" 形式解析
    pub fn parse(path: &str) -> Result<Self> {
        Self::new(path.trim_matches('/').split('/'))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// 是否指向集合
    pub fn is_collection(&self) -> bool {
        self.0.len() % 2 == 1
    }

    /// 文档所在的集合路径（集合路径返回 None）
    pub fn parent_collection(&self) -> Option<DocPath> {
        if self.is_collection() {
            return None;
        }
        Some(DocPath(self.0[..self.0.len() - 1].to_vec()))
    }

    /// 追加一段
    pub fn child<S: Into<String>>(&self, segment: S) -> Result<Self> {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self::new(segments)
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

/// 远端数据布局
pub mod paths {
    use super::DocPath;
    use crate::error::Result;

    pub const USERS: &str = "users";
    pub const EARNINGS: &str = "earnings";
    pub const EARNINGS_CURRENT: &str = "current";
    pub const CART: &str = "cart";
    pub const ADMIN: &str = "admin";
    pub const ANNOUNCEMENT: &str = "announcement";
    pub const ANNOUNCEMENTS: &str = "announcements";

    /// users/{uid}
    pub fn user_profile(uid: &str) -> Result<DocPath> {
        DocPath::new([USERS, uid])
    }

    /// users/{uid}/earnings/current
    pub fn user_earnings(uid: &str) -> Result<DocPath> {
        DocPath::new([USERS, uid, EARNINGS, EARNINGS_CURRENT])
    }

    /// users/{uid}/cart
    pub fn user_cart(uid: &str) -> Result<DocPath> {
        DocPath::new([USERS, uid, CART])
    }

    /// admin/announcement
    pub fn announcement() -> Result<DocPath> {
        DocPath::new([ADMIN, ANNOUNCEMENT])
    }

    /// announcements
    pub fn announcements() -> Result<DocPath> {
        DocPath::new([ANNOUNCEMENTS])
    }
}

/// 某一时刻的完整快照
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    /// 文档快照，文档不存在时为 None
    Document(Option<Document>),
    /// 集合快照（按文档 ID 排序）
    Collection(Vec<(String, Document)>),
}

impl Snapshot {
    pub fn document(&self) -> Option<&Document> {
        match self {
            Snapshot::Document(doc) => doc.as_ref(),
            Snapshot::Collection(_) => None,
        }
    }

    /// 集合大小；文档快照存在时为 1
    pub fn size(&self) -> usize {
        match self {
            Snapshot::Document(doc) => usize::from(doc.is_some()),
            Snapshot::Collection(docs) => docs.len(),
        }
    }

    pub fn docs(&self) -> impl Iterator<Item = &Document> {
        let docs: &[(String, Document)] = match self {
            Snapshot::Collection(docs) => docs,
            Snapshot::Document(_) => &[],
        };
        docs.iter().map(|(_, doc)| doc)
    }
}

/// 字段读取（显式处理缺失/类型不符）
pub mod fields {
    use super::Document;

    /// 非空字符串字段
    pub fn non_empty_str<'a>(doc: Option<&'a Document>, key: &str) -> Option<&'a str> {
        doc?.get(key)?
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// 整数金额字段，浮点数向零截断
    pub fn amount(doc: Option<&Document>, key: &str) -> Option<i64> {
        let value = doc?.get(key)?;
        value
            .as_i64()
            .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
    }
}

/// 取消订阅句柄
///
/// 幂等：多次调用与一次调用等价。
pub trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self);
}

/// 远端文档存储契约
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 单次读取，文档不存在时返回 None
    async fn get_once(&self, path: &DocPath) -> Result<Option<Document>>;

    /// 写入（覆盖）文档
    async fn set_document(&self, path: &DocPath, fields: Document) -> Result<()>;

    /// 订阅路径变化；订阅建立后先推送一次当前快照
    fn subscribe(&self, path: &DocPath, callback: SnapshotCallback) -> Result<Box<dyn Unsubscribe>>;
}
