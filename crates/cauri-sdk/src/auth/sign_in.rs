//! 登录流程
//!
//! Start --邮箱--> Password --密码--> Done
//! Start --手机号--> (防机器人校验 + 发送验证码) --> Otp --验证码--> Done
//!
//! 任何失败都停留在当前步骤，可直接重试。

use std::sync::Arc;

use tracing::{info, warn};

use super::challenge::AntiAutomationVerifier;
use super::identifier::{parse_identifier, Identifier};
use super::profile::apply_user_profile;
use crate::error::{CauriSDKError, Result, ValidationError};
use crate::events::{event_builders, AuthFlowKind, EventManager};
use crate::identity::{ConfirmationHandle, IdentityProvider};
use crate::record_store::RecordStore;
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInStep {
    Start,
    Password { email: String },
    Otp { phone: String },
    Done { uid: String },
}

impl SignInStep {
    pub fn name(&self) -> &'static str {
        match self {
            SignInStep::Start => "start",
            SignInStep::Password { .. } => "password",
            SignInStep::Otp { .. } => "otp",
            SignInStep::Done { .. } => "done",
        }
    }
}

pub struct SignInFlow {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn RecordStore>,
    verifier: Arc<dyn AntiAutomationVerifier>,
    events: Arc<EventManager>,
    step: SignInStep,
    confirmation: Option<Box<dyn ConfirmationHandle>>,
}

impl SignInFlow {
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
            step: SignInStep::Start,
            confirmation: None,
        }
    }

    pub fn step(&self) -> &SignInStep {
        &self.step
    }

    /// 回到第一步
    pub fn reset(&mut self) {
        self.confirmation = None;
        self.enter(SignInStep::Start);
    }

    /// 提交邮箱或手机号
    ///
    /// 邮箱直接进入密码步骤；手机号先解防机器人题再请求验证码。
    /// 输入无效时不会发起任何网络调用。
    pub async fn submit_identifier(&mut self, input: &str) -> Result<&SignInStep> {
        if matches!(self.step, SignInStep::Done { .. }) {
            return Err(self.fail(ValidationError::WrongStep("done").into()));
        }

        let identifier = parse_identifier(input).map_err(|e| self.fail(e.into()))?;
        match identifier {
            Identifier::Email(email) => {
                self.confirmation = None;
                self.enter(SignInStep::Password { email });
            }
            Identifier::Phone(phone) => {
                let handle = match self.request_code(&phone).await {
                    Ok(handle) => handle,
                    Err(e) => return Err(self.fail(e)),
                };
                self.confirmation = Some(handle);
                info!("验证码已请求: phone={}", phone);
                self.enter(SignInStep::Otp { phone });
            }
        }
        Ok(&self.step)
    }

    /// 密码步骤
    pub async fn submit_password(&mut self, password: &str) -> Result<Session> {
        let email = match &self.step {
            SignInStep::Password { email } => email.clone(),
            other => {
                let step = other.name();
                return Err(self.fail(ValidationError::WrongStep(step).into()));
            }
        };
        if password.is_empty() {
            return Err(self.fail(ValidationError::MissingField("password").into()));
        }

        match self.identity.sign_in(&email, password).await {
            Ok(session) => Ok(self.complete(session).await),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// 验证码步骤
    pub async fn submit_code(&mut self, code: &str) -> Result<Session> {
        let code = code.trim();
        if code.is_empty() {
            return Err(self.fail(ValidationError::EmptyCode.into()));
        }
        let result = match (&self.step, &self.confirmation) {
            (SignInStep::Otp { .. }, Some(handle)) => handle.confirm(code).await,
            _ => Err(ValidationError::ChallengeNotIssued.into()),
        };

        match result {
            Ok(session) => {
                self.confirmation = None;
                Ok(self.complete(session).await)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn request_code(&self, phone: &str) -> Result<Box<dyn ConfirmationHandle>> {
        let token = self.verifier.solve("sign_in").await?;
        self.identity.sign_in_with_phone(phone, &token).await
    }

    async fn complete(&mut self, session: Session) -> Session {
        apply_user_profile(self.identity.as_ref(), self.store.as_ref(), &session.uid).await;
        info!("✅ 登录成功: uid={}", session.uid);
        self.enter(SignInStep::Done {
            uid: session.uid.clone(),
        });
        session
    }

    fn enter(&mut self, step: SignInStep) {
        self.events
            .emit(event_builders::auth_step_changed(AuthFlowKind::SignIn, step.name()));
        self.step = step;
    }

    fn fail(&self, error: CauriSDKError) -> CauriSDKError {
        warn!("登录失败 (step={}): {}", self.step.name(), error);
        self.events
            .emit(event_builders::auth_failed(AuthFlowKind::SignIn, error.user_message()));
        error
    }
}
