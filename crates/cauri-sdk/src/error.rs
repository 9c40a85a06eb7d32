use thiserror::Error;

/// 输入校验错误（在任何网络调用之前拦截）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// 标识符为空
    #[error("identifier is empty")]
    EmptyIdentifier,
    /// 既不是邮箱也不是 + 开头的国际号码
    #[error("malformed identifier: {0}")]
    MalformedIdentifier(String),
    /// 邮箱格式错误
    #[error("malformed email: {0}")]
    MalformedEmail(String),
    /// 手机号不是国际格式
    #[error("malformed phone number: {0}")]
    MalformedPhone(String),
    /// 两次输入的密码不一致
    #[error("password and confirmation do not match")]
    PasswordMismatch,
    /// 必填字段为空
    #[error("required field is empty: {0}")]
    MissingField(&'static str),
    /// 验证码为空
    #[error("verification code is empty")]
    EmptyCode,
    /// 尚未发送验证码就提交验证
    #[error("verification code requested before a challenge was issued")]
    ChallengeNotIssued,
    /// 当前步骤不接受该操作
    #[error("operation not allowed in step {0}")]
    WrongStep(&'static str),
}

impl ValidationError {
    /// 面向用户的提示文案
    pub fn user_message(&self) -> &'static str {
        match self {
            ValidationError::EmptyIdentifier => "Veuillez entrer un email ou un numéro.",
            ValidationError::MalformedIdentifier(_) => {
                "Format de numéro incorrect. Utilisez +225..."
            }
            ValidationError::MalformedEmail(_) => "Adresse e-mail invalide.",
            ValidationError::MalformedPhone(_) => {
                "Entrez un numéro valide au format international (+...)"
            }
            ValidationError::PasswordMismatch => "Les mots de passe ne correspondent pas.",
            ValidationError::MissingField(_) => "Veuillez remplir tous les champs.",
            ValidationError::EmptyCode => "Veuillez entrer l'OTP.",
            ValidationError::ChallengeNotIssued => "Demandez d'abord un code OTP.",
            ValidationError::WrongStep(_) => "Action impossible à cette étape.",
        }
    }
}

#[derive(Debug, Error)]
pub enum CauriSDKError {
    /// 输入校验失败（未发起网络请求）
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    /// 凭证错误（密码错误、验证码无效或过期）
    #[error("Credential error: {0}")]
    Credential(String),
    /// 后端不可达等瞬时网络错误，不自动重试
    #[error("Transient network error: {0}")]
    TransientNetwork(String),
    /// 权限被拒绝（定位、通知）
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("KV store error: {0}")]
    KvStore(String),
    #[error("IO error: {0}")]
    IO(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Not initialized: {0}")]
    NotInitialized(String),
    #[error("Shutting down: {0}")]
    ShuttingDown(String),
    #[error("Other error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for CauriSDKError {
    fn from(error: serde_json::Error) -> Self {
        CauriSDKError::Serialization(error.to_string())
    }
}

impl From<std::io::Error> for CauriSDKError {
    fn from(error: std::io::Error) -> Self {
        CauriSDKError::IO(error.to_string())
    }
}

impl From<sled::Error> for CauriSDKError {
    fn from(error: sled::Error) -> Self {
        CauriSDKError::KvStore(error.to_string())
    }
}

impl From<reqwest::Error> for CauriSDKError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            CauriSDKError::InvalidData(error.to_string())
        } else {
            CauriSDKError::TransientNetwork(error.to_string())
        }
    }
}

impl CauriSDKError {
    /// 是否是输入校验错误
    pub fn is_validation(&self) -> bool {
        matches!(self, CauriSDKError::Validation(_))
    }

    /// 用户能否通过再次操作重试（所有错误都不会让流程进入终态）
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CauriSDKError::Validation(_)
                | CauriSDKError::Credential(_)
                | CauriSDKError::TransientNetwork(_)
        )
    }

    /// 面向用户的提示文案
    pub fn user_message(&self) -> String {
        match self {
            CauriSDKError::Validation(e) => e.user_message().to_string(),
            CauriSDKError::Credential(_) => "Identifiants ou code invalides.".to_string(),
            CauriSDKError::TransientNetwork(_) => {
                "Service indisponible, veuillez réessayer.".to_string()
            }
            CauriSDKError::PermissionDenied(_) => "Permission refusée.".to_string(),
            _ => "Une erreur est survenue.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CauriSDKError>;
