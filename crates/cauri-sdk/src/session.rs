//! 会话模型
//!
//! 一个客户端上下文同一时刻最多只有一个活跃会话。

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// 已登录主体的会话
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// 身份提供方分配的主体 ID（不透明）
    pub uid: String,
    /// 身份提供方记录的显示名
    pub display_name: Option<String>,
    /// 邮箱（邮箱登录时存在）
    pub email: Option<String>,
    /// 手机号（短信登录时存在）
    pub phone: Option<String>,
    /// 登录时间（UTC毫秒时间戳）
    pub signed_in_at: i64,
}

impl Session {
    pub fn new<S: Into<String>>(uid: S) -> Self {
        Self {
            uid: uid.into(),
            display_name: None,
            email: None,
            phone: None,
            signed_in_at: Utc::now().timestamp_millis(),
        }
    }

    pub fn with_display_name<S: Into<String>>(mut self, name: S) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_email<S: Into<String>>(mut self, email: S) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone<S: Into<String>>(mut self, phone: S) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// 非空的显示名
    pub fn display_name(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// 是否是同一主体
    pub fn same_subject(&self, other: &Session) -> bool {
        self.uid == other.uid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_display_name_is_absent() {
        let session = Session::new("u1").with_display_name("   ");
        assert_eq!(session.display_name(), None);

        let session = Session::new("u1").with_display_name("Awa");
        assert_eq!(session.display_name(), Some("Awa"));
    }

    #[test]
    fn test_same_subject_ignores_metadata() {
        let a = Session::new("u1").with_email("a@example.com");
        let b = Session::new("u1").with_display_name("Awa");
        assert!(a.same_subject(&b));
        assert!(!a.same_subject(&Session::new("u2")));
    }
}
