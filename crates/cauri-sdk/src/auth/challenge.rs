//! 防机器人校验
//!
//! 发送短信验证码之前客户端必须先解出一道工作量证明题：
//! 找到 nonce，使 SHA-256("{challenge}:{nonce}") 的前导零比特数不少于难度。
//! 校验器由认证流程显式持有，不存在进程级全局实例。

use async_trait::async_trait;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{CauriSDKError, Result};

/// 默认难度
pub const DEFAULT_DIFFICULTY_BITS: u32 = 12;

/// 难度上限，超过后客户端求解耗时不可接受
pub const MAX_DIFFICULTY_BITS: u32 = 24;

/// 求解结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AntiAutomationToken {
    pub challenge: String,
    pub nonce: u64,
    /// 十六进制摘要
    pub digest: String,
}

/// 防机器人校验器
#[async_trait]
pub trait AntiAutomationVerifier: Send + Sync {
    /// 为指定动作（例如 "sign_in"）生成令牌
    async fn solve(&self, action: &str) -> Result<AntiAutomationToken>;
}

/// 基于 SHA-256 的工作量证明
#[derive(Debug, Clone)]
pub struct ProofOfWorkVerifier {
    site_key: String,
    difficulty_bits: u32,
}

impl ProofOfWorkVerifier {
    pub fn new<S: Into<String>>(site_key: S, difficulty_bits: u32) -> Self {
        Self {
            site_key: site_key.into(),
            difficulty_bits: difficulty_bits.min(MAX_DIFFICULTY_BITS),
        }
    }

    pub fn difficulty_bits(&self) -> u32 {
        self.difficulty_bits
    }
}

#[async_trait]
impl AntiAutomationVerifier for ProofOfWorkVerifier {
    async fn solve(&self, action: &str) -> Result<AntiAutomationToken> {
        let mut salt = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut salt);
        let challenge = format!("{}:{}:{}", self.site_key, action, hex::encode(salt));
        let difficulty = self.difficulty_bits;

        let token = tokio::task::spawn_blocking(move || solve_blocking(challenge, difficulty))
            .await
            .map_err(|e| CauriSDKError::Other(format!("工作量证明任务失败: {}", e)))?;

        debug!(
            "工作量证明完成: action={}, nonce={}, difficulty={}",
            action, token.nonce, difficulty
        );
        Ok(token)
    }
}

fn digest_for(challenge: &str, nonce: u64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(challenge.as_bytes());
    hasher.update(b":");
    hasher.update(nonce.to_string().as_bytes());
    hasher.finalize().into()
}

fn solve_blocking(challenge: String, difficulty_bits: u32) -> AntiAutomationToken {
    let mut nonce = 0u64;
    loop {
        let digest = digest_for(&challenge, nonce);
        if leading_zero_bits(&digest) >= difficulty_bits {
            return AntiAutomationToken {
                challenge,
                nonce,
                digest: hex::encode(digest),
            };
        }
        nonce = nonce.wrapping_add(1);
    }
}

/// 前导零比特数
pub fn leading_zero_bits(bytes: &[u8]) -> u32 {
    let mut bits = 0;
    for byte in bytes {
        if *byte == 0 {
            bits += 8;
        } else {
            bits += byte.leading_zeros();
            break;
        }
    }
    bits
}

/// 服务端校验：摘要可复算且满足难度
pub fn verify(token: &AntiAutomationToken, difficulty_bits: u32) -> bool {
    let digest = digest_for(&token.challenge, token.nonce);
    hex::encode(digest) == token.digest.to_lowercase()
        && leading_zero_bits(&digest) >= difficulty_bits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_zero_bits() {
        assert_eq!(leading_zero_bits(&[0x00, 0x00, 0xff]), 16);
        assert_eq!(leading_zero_bits(&[0x0f]), 4);
        assert_eq!(leading_zero_bits(&[0x80, 0x00]), 0);
        assert_eq!(leading_zero_bits(&[0, 0]), 16);
    }

    #[tokio::test]
    async fn test_solved_token_verifies() {
        let verifier = ProofOfWorkVerifier::new("test-site", 8);
        let token = verifier.solve("sign_in").await.unwrap();

        assert!(token.challenge.starts_with("test-site:sign_in:"));
        assert!(verify(&token, 8));
        assert!(verify(&token, 0));
    }

    #[tokio::test]
    async fn test_tampered_token_is_rejected() {
        let verifier = ProofOfWorkVerifier::new("test-site", 4);
        let mut token = verifier.solve("sign_up").await.unwrap();
        token.challenge.push('x');
        assert!(!verify(&token, 4));
    }

    #[test]
    fn test_difficulty_is_capped() {
        assert_eq!(ProofOfWorkVerifier::new("k", 64).difficulty_bits(), MAX_DIFFICULTY_BITS);
    }
}
