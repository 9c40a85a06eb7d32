//! 登录标识符分类
//!
//! 同一个输入框既接受邮箱也接受国际格式手机号，按输入内容分派到不同流程。

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

/// 常量模式，只编译一次
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(EMAIL_PATTERN).expect("EMAIL_PATTERN 是合法的正则"));

const PHONE_MIN_DIGITS: usize = 8;
const PHONE_MAX_DIGITS: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentifierKind {
    Email,
    Phone,
    Invalid,
}

/// 校验通过的标识符
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    Email(String),
    /// 已去除空格的 E.164 号码
    Phone(String),
}

impl Identifier {
    pub fn kind(&self) -> IdentifierKind {
        match self {
            Identifier::Email(_) => IdentifierKind::Email,
            Identifier::Phone(_) => IdentifierKind::Phone,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Identifier::Email(s) | Identifier::Phone(s) => s,
        }
    }
}

pub fn is_valid_email(input: &str) -> bool {
    EMAIL_RE.is_match(input)
}

/// 规范化国际号码："+225 01 02 03 04 05" -> "+2250102030405"
pub fn normalize_phone(input: &str) -> Option<String> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let digits = compact.strip_prefix('+')?;
    let valid = (PHONE_MIN_DIGITS..=PHONE_MAX_DIGITS).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit());
    valid.then_some(compact)
}

pub fn classify(input: &str) -> IdentifierKind {
    let input = input.trim();
    if input.contains('@') {
        if is_valid_email(input) {
            IdentifierKind::Email
        } else {
            IdentifierKind::Invalid
        }
    } else if normalize_phone(input).is_some() {
        IdentifierKind::Phone
    } else {
        IdentifierKind::Invalid
    }
}

/// 分类并给出可展示的错误
pub fn parse_identifier(input: &str) -> Result<Identifier, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyIdentifier);
    }

    match classify(trimmed) {
        IdentifierKind::Email => Ok(Identifier::Email(trimmed.to_string())),
        IdentifierKind::Phone => normalize_phone(trimmed)
            .map(Identifier::Phone)
            .ok_or_else(|| ValidationError::MalformedPhone(trimmed.to_string())),
        IdentifierKind::Invalid if trimmed.contains('@') => {
            Err(ValidationError::MalformedEmail(trimmed.to_string()))
        }
        IdentifierKind::Invalid => Err(ValidationError::MalformedIdentifier(trimmed.to_string())),
    }
}

/// 只接受手机号（注册页的短信模式）
pub fn parse_phone(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField("phone"));
    }
    normalize_phone(trimmed).ok_or_else(|| ValidationError::MalformedPhone(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_pattern_compiles() {
        assert!(Regex::new(EMAIL_PATTERN).is_ok());
        assert!(is_valid_email("awa@example.com"));
        assert!(!is_valid_email("awa@example"));
        assert!(!is_valid_email("a wa@example.com"));
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("user@example.com"), IdentifierKind::Email);
        assert_eq!(classify("+2250102030405"), IdentifierKind::Phone);
        assert_eq!(classify("+225 01 02 03 04 05"), IdentifierKind::Phone);
        assert_eq!(classify("0102030405"), IdentifierKind::Invalid);
        assert_eq!(classify("user@localhost"), IdentifierKind::Invalid);
        assert_eq!(classify("+12"), IdentifierKind::Invalid);
        assert_eq!(classify("+2250102x30405"), IdentifierKind::Invalid);
        assert_eq!(classify(""), IdentifierKind::Invalid);
    }

    #[test]
    fn test_parse_identifier_errors() {
        assert_eq!(parse_identifier("   "), Err(ValidationError::EmptyIdentifier));
        assert!(matches!(
            parse_identifier("0102030405"),
            Err(ValidationError::MalformedIdentifier(_))
        ));
        assert!(matches!(
            parse_identifier("a@b"),
            Err(ValidationError::MalformedEmail(_))
        ));
    }

    #[test]
    fn test_parse_identifier_normalizes() {
        assert_eq!(
            parse_identifier(" +225 01 02 03 04 05 "),
            Ok(Identifier::Phone("+2250102030405".to_string()))
        );
        let email = parse_identifier(" user@example.com").unwrap();
        assert_eq!(email.kind(), IdentifierKind::Email);
        assert_eq!(email.as_str(), "user@example.com");
    }

    #[test]
    fn test_parse_phone() {
        assert_eq!(parse_phone(""), Err(ValidationError::MissingField("phone")));
        assert!(matches!(parse_phone("0102030405"), Err(ValidationError::MalformedPhone(_))));
        assert_eq!(parse_phone("+33612345678").unwrap(), "+33612345678");
    }
}
