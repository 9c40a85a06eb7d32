//! 用户资料记录 `users/{uid}`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CauriSDKError, Result};
use crate::identity::IdentityProvider;
use crate::record_store::{fields, paths, Document, RecordStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub first_name: String,
    pub last_name: String,
    /// 短信注册时为空串
    pub email: String,
    /// 邮箱注册时为空串
    pub phone: String,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn with_email(first_name: &str, last_name: &str, email: &str) -> Self {
        Self {
            first_name: first_name.trim().to_string(),
            last_name: last_name.trim().to_string(),
            email: email.to_string(),
            phone: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_phone(first_name: &str, last_name: &str, phone: &str) -> Self {
        Self {
            first_name: first_name.trim().to_string(),
            last_name: last_name.trim().to_string(),
            email: String::new(),
            phone: phone.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn to_document(&self) -> Result<Document> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(CauriSDKError::Serialization(format!(
                "profile is not an object: {}",
                other
            ))),
        }
    }
}

/// 写入资料记录
pub async fn write_profile(store: &dyn RecordStore, uid: &str, profile: &UserProfile) -> Result<()> {
    let path = paths::user_profile(uid)?;
    store.set_document(&path, profile.to_document()?).await?;
    debug!("资料已写入: {}", path);
    Ok(())
}

/// 登录成功后把资料里的名字同步为身份提供方的显示名，失败只记日志
pub async fn apply_user_profile(identity: &dyn IdentityProvider, store: &dyn RecordStore, uid: &str) {
    let first_name = match paths::user_profile(uid) {
        Ok(path) => match store.get_once(&path).await {
            Ok(doc) => fields::non_empty_str(doc.as_ref(), "firstName").map(str::to_string),
            Err(e) => {
                warn!("加载资料失败: uid={}, {}", uid, e);
                return;
            }
        },
        Err(e) => {
            warn!("资料路径无效: uid={}, {}", uid, e);
            return;
        }
    };

    if let Some(name) = first_name {
        if let Err(e) = identity.update_display_name(&name).await {
            warn!("同步显示名失败: uid={}, {}", uid, e);
        }
    }
}
