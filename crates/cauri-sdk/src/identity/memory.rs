//! 进程内身份提供方
//!
//! 离线演示和测试使用。验证码不会真正发出，通过 [`MemoryIdentityProvider::last_issued_code`] 读取。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ConfirmationHandle, IdentityProvider};
use crate::auth::challenge::{self, AntiAutomationToken};
use crate::error::{CauriSDKError, Result};
use crate::session::Session;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone)]
struct Account {
    uid: String,
    email: Option<String>,
    phone: Option<String>,
    password: Option<String>,
    display_name: Option<String>,
}

impl Account {
    fn session(&self) -> Session {
        Session {
            uid: self.uid.clone(),
            display_name: self.display_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            signed_in_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

struct Inner {
    accounts: Mutex<HashMap<String, Account>>,
    pending_codes: Mutex<HashMap<String, String>>,
    session: watch::Sender<Option<Session>>,
    network_calls: AtomicUsize,
    offline: AtomicBool,
    difficulty_bits: u32,
}

impl Inner {
    /// 每次“远程调用”计数，离线时失败
    fn call(&self, operation: &str) -> Result<()> {
        self.network_calls.fetch_add(1, Ordering::SeqCst);
        debug!("身份服务调用: {}", operation);
        if self.offline.load(Ordering::SeqCst) {
            return Err(CauriSDKError::TransientNetwork(
                "identity provider unreachable".to_string(),
            ));
        }
        Ok(())
    }

    fn activate(&self, session: Session) -> Session {
        info!("会话生效: uid={}", session.uid);
        self.session.send_replace(Some(session.clone()));
        session
    }
}

/// 进程内身份提供方
#[derive(Clone)]
pub struct MemoryIdentityProvider {
    inner: Arc<Inner>,
}

impl MemoryIdentityProvider {
    /// `difficulty_bits` 为服务端要求的工作量证明难度
    pub fn new(difficulty_bits: u32) -> Self {
        let (session, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                accounts: Mutex::new(HashMap::new()),
                pending_codes: Mutex::new(HashMap::new()),
                session,
                network_calls: AtomicUsize::new(0),
                offline: AtomicBool::new(false),
                difficulty_bits,
            }),
        }
    }

    /// 预置一个邮箱账号，返回 uid
    pub fn seed_account(&self, email: &str, password: &str, display_name: Option<&str>) -> String {
        let uid = Uuid::new_v4().simple().to_string();
        self.inner.accounts.lock().insert(
            uid.clone(),
            Account {
                uid: uid.clone(),
                email: Some(email.to_string()),
                phone: None,
                password: Some(password.to_string()),
                display_name: display_name.map(str::to_string),
            },
        );
        uid
    }

    /// 最近一次发给该号码的验证码
    pub fn last_issued_code(&self, phone: &str) -> Option<String> {
        self.inner.pending_codes.lock().get(phone).cloned()
    }

    /// 已发生的远程调用次数
    pub fn network_calls(&self) -> usize {
        self.inner.network_calls.load(Ordering::SeqCst)
    }

    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// 直接切换会话（模拟外部登录/登出）
    pub fn force_session(&self, session: Option<Session>) {
        self.inner.session.send_replace(session);
    }
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new(challenge::DEFAULT_DIFFICULTY_BITS)
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session> {
        self.inner.call("sign_up")?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(CauriSDKError::Credential("weak password".to_string()));
        }

        let account = {
            let mut accounts = self.inner.accounts.lock();
            if accounts
                .values()
                .any(|a| a.email.as_deref() == Some(email))
            {
                return Err(CauriSDKError::Credential("email already in use".to_string()));
            }
            let account = Account {
                uid: Uuid::new_v4().simple().to_string(),
                email: Some(email.to_string()),
                phone: None,
                password: Some(password.to_string()),
                display_name: None,
            };
            accounts.insert(account.uid.clone(), account.clone());
            account
        };

        Ok(self.inner.activate(account.session()))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        self.inner.call("sign_in")?;
        let account = self
            .inner
            .accounts
            .lock()
            .values()
            .find(|a| a.email.as_deref() == Some(email) && a.password.as_deref() == Some(password))
            .cloned()
            .ok_or_else(|| CauriSDKError::Credential("invalid email or password".to_string()))?;

        Ok(self.inner.activate(account.session()))
    }

    async fn sign_in_with_phone(
        &self,
        phone: &str,
        token: &AntiAutomationToken,
    ) -> Result<Box<dyn ConfirmationHandle>> {
        self.inner.call("sign_in_with_phone")?;
        if !challenge::verify(token, self.inner.difficulty_bits) {
            return Err(CauriSDKError::Credential(
                "anti-automation check failed".to_string(),
            ));
        }

        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        self.inner
            .pending_codes
            .lock()
            .insert(phone.to_string(), code);
        info!("验证码已发送: phone={}", phone);

        Ok(Box::new(MemoryConfirmation {
            phone: phone.to_string(),
            inner: self.inner.clone(),
        }))
    }

    async fn update_display_name(&self, name: &str) -> Result<()> {
        self.inner.call("update_display_name")?;
        let uid = self
            .current_session()
            .map(|s| s.uid)
            .ok_or_else(|| CauriSDKError::NotFound("no signed-in user".to_string()))?;

        if let Some(account) = self.inner.accounts.lock().get_mut(&uid) {
            account.display_name = Some(name.to_string());
        }
        self.inner.session.send_modify(|session| {
            if let Some(session) = session.as_mut().filter(|s| s.uid == uid) {
                session.display_name = Some(name.to_string());
            }
        });
        Ok(())
    }

    async fn sign_out(&self) -> Result<()> {
        self.inner.call("sign_out")?;
        self.inner.session.send_replace(None);
        info!("已登出");
        Ok(())
    }

    fn current_session(&self) -> Option<Session> {
        self.inner.session.borrow().clone()
    }

    fn on_session_change(&self) -> watch::Receiver<Option<Session>> {
        self.inner.session.subscribe()
    }
}

struct MemoryConfirmation {
    phone: String,
    inner: Arc<Inner>,
}

#[async_trait]
impl ConfirmationHandle for MemoryConfirmation {
    fn phone(&self) -> &str {
        &self.phone
    }

    async fn confirm(&self, code: &str) -> Result<Session> {
        self.inner.call("confirm")?;
        {
            let mut pending = self.inner.pending_codes.lock();
            let expected = pending.get(&self.phone).cloned();
            match expected {
                Some(expected) if expected == code.trim() => {
                    pending.remove(&self.phone);
                }
                Some(_) => {
                    return Err(CauriSDKError::Credential("invalid verification code".to_string()))
                }
                None => {
                    return Err(CauriSDKError::Credential("verification code expired".to_string()))
                }
            }
        }

        let account = {
            let mut accounts = self.inner.accounts.lock();
            let existing = accounts
                .values()
                .find(|a| a.phone.as_deref() == Some(self.phone.as_str()))
                .cloned();
            match existing {
                Some(account) => account,
                None => {
                    let account = Account {
                        uid: Uuid::new_v4().simple().to_string(),
                        email: None,
                        phone: Some(self.phone.clone()),
                        password: None,
                        display_name: None,
                    };
                    accounts.insert(account.uid.clone(), account.clone());
                    account
                }
            }
        };

        Ok(self.inner.activate(account.session()))
    }
}
