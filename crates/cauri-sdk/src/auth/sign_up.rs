//! 注册流程
//!
//! 两种方式：
//! - 邮箱：表单校验通过后创建账号，设置显示名并写入资料记录
//! - 短信：发送验证码，验证通过后设置显示名并写入资料记录

use std::sync::Arc;

use tracing::{info, warn};

use super::challenge::AntiAutomationVerifier;
use super::identifier::{is_valid_email, parse_phone};
use super::profile::{write_profile, UserProfile};
use crate::error::{CauriSDKError, Result, ValidationError};
use crate::events::{event_builders, AuthFlowKind, EventManager};
use crate::identity::{ConfirmationHandle, IdentityProvider};
use crate::record_store::RecordStore;
use crate::session::Session;

/// 邮箱注册表单
#[derive(Debug, Clone, Default)]
pub struct SignUpForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl SignUpForm {
    /// 校验顺序：两次密码一致 -> 必填项 -> 邮箱格式
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.password != self.confirm_password {
            return Err(ValidationError::PasswordMismatch);
        }

        let required: [(&'static str, &str); 4] = [
            ("email", self.email.trim()),
            ("password", self.password.as_str()),
            ("first_name", self.first_name.trim()),
            ("last_name", self.last_name.trim()),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.is_empty()) {
            return Err(ValidationError::MissingField(*field));
        }

        if !is_valid_email(self.email.trim()) {
            return Err(ValidationError::MalformedEmail(self.email.trim().to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpStep {
    Form,
    CodeSent { phone: String },
    Done { uid: String },
}

impl SignUpStep {
    pub fn name(&self) -> &'static str {
        match self {
            SignUpStep::Form => "form",
            SignUpStep::CodeSent { .. } => "code_sent",
            SignUpStep::Done { .. } => "done",
        }
    }
}

pub struct SignUpFlow {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn RecordStore>,
    verifier: Arc<dyn AntiAutomationVerifier>,
    events: Arc<EventManager>,
    step: SignUpStep,
    confirmation: Option<Box<dyn ConfirmationHandle>>,
}

impl SignUpFlow {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn RecordStore>,
        verifier: Arc<dyn AntiAutomationVerifier>,
        events: Arc<EventManager>,
    ) -> Self {
        Self {
            identity,
            store,
            verifier,
            events,
            step: SignUpStep::Form,
            confirmation: None,
        }
    }

    pub fn step(&self) -> &SignUpStep {
        &self.step
    }

    /// 邮箱注册
    pub async fn sign_up_with_email(&mut self, form: &SignUpForm) -> Result<Session> {
        form.validate().map_err(|e| self.fail(e.into()))?;

        let email = form.email.trim();
        let session = match self.identity.sign_up(email, &form.password).await {
            Ok(session) => session,
            Err(e) => return Err(self.fail(e)),
        };

        let profile = UserProfile::with_email(&form.first_name, &form.last_name, email);
        self.finish(session, profile).await
    }

    /// 短信注册第一步：发送验证码（可重复发送）
    pub async fn send_code(&mut self, phone: &str) -> Result<()> {
        let phone = parse_phone(phone).map_err(|e| self.fail(e.into()))?;

        let handle = match self.request_code(&phone).await {
            Ok(handle) => handle,
            Err(e) => return Err(self.fail(e)),
        };
        self.confirmation = Some(handle);
        info!("注册验证码已发送: phone={}", phone);
        self.enter(SignUpStep::CodeSent { phone });
        Ok(())
    }

    /// 短信注册第二步：验证码 + 姓名
    pub async fn verify_code(&mut self, code: &str, first_name: &str, last_name: &str) -> Result<Session> {
        let code = code.trim();
        if code.is_empty() {
            return Err(self.fail(ValidationError::EmptyCode.into()));
        }
        if first_name.trim().is_empty() {
            return Err(self.fail(ValidationError::MissingField("first_name").into()));
        }
        if last_name.trim().is_empty() {
            return Err(self.fail(ValidationError::MissingField("last_name").into()));
        }

        let result = match (&self.step, &self.confirmation) {
            (SignUpStep::CodeSent { .. }, Some(handle)) => handle.confirm(code).await,
            _ => Err(ValidationError::ChallengeNotIssued.into()),
        };
        let session = match result {
            Ok(session) => session,
            Err(e) => return Err(self.fail(e)),
        };
        self.confirmation = None;

        let phone = session.phone.clone().unwrap_or_default();
        let profile = UserProfile::with_phone(first_name, last_name, &phone);
        self.finish(session, profile).await
    }

    async fn request_code(&self, phone: &str) -> Result<Box<dyn ConfirmationHandle>> {
        let token = self.verifier.solve("sign_up").await?;
        self.identity.sign_in_with_phone(phone, &token).await
    }

    /// 账号已建立：设置显示名、写资料。这两步失败只记日志，账号本身已可用
    async fn finish(&mut self, session: Session, profile: UserProfile) -> Result<Session> {
        if let Err(e) = self.identity.update_display_name(&profile.first_name).await {
            warn!("设置显示名失败: uid={}, {}", session.uid, e);
        }
        if let Err(e) = write_profile(self.store.as_ref(), &session.uid, &profile).await {
            warn!("写入资料失败: uid={}, {}", session.uid, e);
        }

        info!("✅ 注册成功: uid={}", session.uid);
        self.enter(SignUpStep::Done {
            uid: session.uid.clone(),
        });
        Ok(session)
    }

    fn enter(&mut self, step: SignUpStep) {
        self.events
            .emit(event_builders::auth_step_changed(AuthFlowKind::SignUp, step.name()));
        self.step = step;
    }

    fn fail(&self, error: CauriSDKError) -> CauriSDKError {
        warn!("注册失败 (step={}): {}", self.step.name(), error);
        self.events
            .emit(event_builders::auth_failed(AuthFlowKind::SignUp, error.user_message()));
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::challenge::ProofOfWorkVerifier;
    use crate::identity::MemoryIdentityProvider;
    use crate::record_store::{paths, MemoryRecordStore};

    fn flow(identity: &MemoryIdentityProvider, store: &MemoryRecordStore) -> SignUpFlow {
        SignUpFlow::new(
            Arc::new(identity.clone()),
            Arc::new(store.clone()),
            Arc::new(ProofOfWorkVerifier::new("test", 4)),
            Arc::new(EventManager::new(64)),
        )
    }

    fn form() -> SignUpForm {
        SignUpForm {
            first_name: "Awa".to_string(),
            last_name: "Koné".to_string(),
            email: "awa@example.com".to_string(),
            password: "secret1".to_string(),
            confirm_password: "secret1".to_string(),
        }
    }

    #[test]
    fn test_form_validation_order() {
        let mismatch = SignUpForm {
            first_name: String::new(),
            confirm_password: "other".to_string(),
            ..form()
        };
        assert_eq!(mismatch.validate(), Err(ValidationError::PasswordMismatch));

        let missing = SignUpForm {
            last_name: "  ".to_string(),
            ..form()
        };
        assert_eq!(missing.validate(), Err(ValidationError::MissingField("last_name")));

        let bad_email = SignUpForm {
            email: "awa@".to_string(),
            ..form()
        };
        assert!(matches!(bad_email.validate(), Err(ValidationError::MalformedEmail(_))));
        assert!(form().validate().is_ok());
    }

    #[tokio::test]
    async fn test_mismatched_passwords_never_reach_provider() {
        let identity = MemoryIdentityProvider::new(4);
        let store = MemoryRecordStore::new();
        let mut flow = flow(&identity, &store);

        let bad = SignUpForm {
            confirm_password: "secret2".to_string(),
            ..form()
        };
        let err = flow.sign_up_with_email(&bad).await.unwrap_err();
        assert!(matches!(
            err,
            CauriSDKError::Validation(ValidationError::PasswordMismatch)
        ));
        assert_eq!(identity.network_calls(), 0);
        assert_eq!(flow.step(), &SignUpStep::Form);
    }

    #[tokio::test]
    async fn test_email_sign_up_writes_profile() {
        let identity = MemoryIdentityProvider::new(4);
        let store = MemoryRecordStore::new();
        let mut flow = flow(&identity, &store);

        let session = flow.sign_up_with_email(&form()).await.unwrap();
        assert_eq!(identity.current_session().unwrap().display_name(), Some("Awa"));

        let doc = store
            .get_once(&paths::user_profile(&session.uid).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc["firstName"], "Awa");
        assert_eq!(doc["email"], "awa@example.com");
        assert_eq!(doc["phone"], "");
        assert_eq!(flow.step().name(), "done");
    }

    #[tokio::test]
    async fn test_phone_sign_up() {
        let identity = MemoryIdentityProvider::new(4);
        let store = MemoryRecordStore::new();
        let mut flow = flow(&identity, &store);

        assert!(matches!(
            flow.send_code("0102030405").await,
            Err(CauriSDKError::Validation(ValidationError::MalformedPhone(_)))
        ));
        assert!(matches!(
            flow.verify_code("123456", "Kofi", "Mensah").await,
            Err(CauriSDKError::Validation(ValidationError::ChallengeNotIssued))
        ));
        assert_eq!(identity.network_calls(), 0);

        flow.send_code("+233 24 123 4567").await.unwrap();
        assert_eq!(flow.step().name(), "code_sent");
        let code = identity.last_issued_code("+233241234567").unwrap();

        assert!(matches!(
            flow.verify_code(&code, "Kofi", "").await,
            Err(CauriSDKError::Validation(ValidationError::MissingField("last_name")))
        ));

        let session = flow.verify_code(&code, "Kofi", "Mensah").await.unwrap();
        let doc = store
            .get_once(&paths::user_profile(&session.uid).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc["phone"], "+233241234567");
        assert_eq!(doc["email"], "");
        assert_eq!(doc["lastName"], "Mensah");
    }
}
