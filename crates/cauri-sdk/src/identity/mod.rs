//! 身份提供方抽象
//!
//! 认证本身由外部托管服务完成，SDK 只依赖以下契约：
//! - 邮箱注册/登录
//! - 手机号登录：先提交防机器人令牌换取验证码挑战，再提交验证码
//! - 当前会话可观察（`watch`），登录、登出、资料更新都会推送

use async_trait::async_trait;
use tokio::sync::watch;

use crate::auth::challenge::AntiAutomationToken;
use crate::error::Result;
use crate::session::Session;

pub mod memory;

pub use memory::MemoryIdentityProvider;

/// 短信验证码挑战句柄
#[async_trait]
pub trait ConfirmationHandle: Send + Sync {
    /// 挑战对应的手机号
    fn phone(&self) -> &str;

    /// 提交验证码，成功后会话生效
    async fn confirm(&self, code: &str) -> Result<Session>;
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// 邮箱注册，成功后直接登录
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;

    /// 发送短信验证码
    async fn sign_in_with_phone(
        &self,
        phone: &str,
        token: &AntiAutomationToken,
    ) -> Result<Box<dyn ConfirmationHandle>>;

    /// 更新当前用户的显示名
    async fn update_display_name(&self, name: &str) -> Result<()>;

    async fn sign_out(&self) -> Result<()>;

    fn current_session(&self) -> Option<Session>;

    /// 会话变化流，订阅时立即可读到当前值
    fn on_session_change(&self) -> watch::Receiver<Option<Session>>;
}
