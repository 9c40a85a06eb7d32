//! 认证流程
//!
//! - `identifier`: 邮箱/手机号分类
//! - `challenge`: 防机器人工作量证明
//! - `sign_in` / `sign_up`: 分步状态机
//! - `profile`: `users/{uid}` 资料记录

pub mod challenge;
pub mod identifier;
pub mod profile;
pub mod sign_in;
pub mod sign_up;

pub use challenge::{AntiAutomationToken, AntiAutomationVerifier, ProofOfWorkVerifier};
pub use identifier::{classify, parse_identifier, Identifier, IdentifierKind};
pub use profile::UserProfile;
pub use sign_in::{SignInFlow, SignInStep};
pub use sign_up::{SignUpFlow, SignUpForm, SignUpStep};
