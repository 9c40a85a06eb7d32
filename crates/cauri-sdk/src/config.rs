//! SDK 配置

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::auth::challenge::{DEFAULT_DIFFICULTY_BITS, MAX_DIFFICULTY_BITS};
use crate::error::{CauriSDKError, Result};
use crate::location::GeocoderConfig;
use crate::notification::{FirstSnapshotPolicy, NotificationConfig};
use crate::view_state::DEFAULT_USER_NAME;

/// CauriM SDK 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CauriConfig {
    /// 本地数据目录（KV 存储位于 `{data_dir}/kv`）
    pub data_dir: PathBuf,
    /// 事件配置
    pub event_config: EventConfig,
    /// 入账通知配置
    pub notification_config: NotificationConfig,
    /// 问候语刷新间隔（秒）
    pub greeting_refresh_secs: u64,
    /// 时区偏移秒数，None 表示使用系统本地时区
    pub timezone_offset_seconds: Option<i32>,
    /// 未登录时的用户名占位
    pub placeholder_user_name: String,
    /// 反向地理编码配置
    pub geocoder_config: GeocoderConfig,
    /// 发送短信验证码前的工作量证明难度（比特）
    pub anti_automation_difficulty: u32,
    /// 防机器人站点标识
    pub anti_automation_site_key: String,
    /// 调试模式
    pub debug_mode: bool,
}

/// 事件配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// 事件缓冲区大小
    pub buffer_size: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { buffer_size: 1000 }
    }
}

impl Default for CauriConfig {
    fn default() -> Self {
        Self {
            data_dir: get_default_data_dir(),
            event_config: EventConfig::default(),
            notification_config: NotificationConfig::default(),
            greeting_refresh_secs: 60,
            timezone_offset_seconds: None,
            placeholder_user_name: DEFAULT_USER_NAME.to_string(),
            geocoder_config: GeocoderConfig::default(),
            anti_automation_difficulty: DEFAULT_DIFFICULTY_BITS,
            anti_automation_site_key: "cauri".to_string(),
            debug_mode: false,
        }
    }
}

/// 获取默认数据目录 ~/.cauri/
fn get_default_data_dir() -> PathBuf {
    if let Some(home_dir) = std::env::var("HOME").ok().map(PathBuf::from) {
        home_dir.join(".cauri")
    } else if let Some(home_dir) = std::env::var("USERPROFILE").ok().map(PathBuf::from) {
        home_dir.join(".cauri")
    } else {
        PathBuf::from("./cauri_data")
    }
}

impl CauriConfig {
    pub fn builder() -> CauriConfigBuilder {
        CauriConfigBuilder::new()
    }

    /// 从 JSON 文件加载，缺省字段取默认值
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CauriSDKError::Config(format!("读取配置文件失败 {}: {}", path.display(), e))
        })?;
        let config: CauriConfig = serde_json::from_str(&content).map_err(|e| {
            CauriSDKError::Config(format!("解析配置文件失败 {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(CauriSDKError::Config("数据目录不能为空".to_string()));
        }

        if self.event_config.buffer_size == 0 {
            return Err(CauriSDKError::Config("事件缓冲区大小不能为0".to_string()));
        }

        if self.greeting_refresh_secs == 0 {
            return Err(CauriSDKError::Config("问候语刷新间隔不能为0".to_string()));
        }

        if self.placeholder_user_name.trim().is_empty() {
            return Err(CauriSDKError::Config("用户名占位不能为空".to_string()));
        }

        if self.anti_automation_difficulty > MAX_DIFFICULTY_BITS {
            return Err(CauriSDKError::Config(format!(
                "工作量证明难度不能超过 {} 比特",
                MAX_DIFFICULTY_BITS
            )));
        }

        if self.geocoder_config.base_url.trim().is_empty() {
            return Err(CauriSDKError::Config("地理编码服务地址不能为空".to_string()));
        }

        Ok(())
    }
}

/// CauriM SDK 配置构建器
pub struct CauriConfigBuilder {
    config: CauriConfig,
}

impl CauriConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: CauriConfig::default(),
        }
    }

    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.data_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn event_config(mut self, config: EventConfig) -> Self {
        self.config.event_config = config;
        self
    }

    pub fn notification_config(mut self, config: NotificationConfig) -> Self {
        self.config.notification_config = config;
        self
    }

    /// 第一个余额快照是否提醒
    pub fn first_snapshot_policy(mut self, policy: FirstSnapshotPolicy) -> Self {
        self.config.notification_config.first_snapshot_policy = policy;
        self
    }

    pub fn greeting_refresh_secs(mut self, secs: u64) -> Self {
        self.config.greeting_refresh_secs = secs;
        self
    }

    /// 设置时区偏移（从小时）
    pub fn timezone_hours(mut self, hours: i32) -> Self {
        self.config.timezone_offset_seconds = Some(hours * 3600);
        self
    }

    /// 设置时区偏移（从秒）
    pub fn timezone_seconds(mut self, seconds: i32) -> Self {
        self.config.timezone_offset_seconds = Some(seconds);
        self
    }

    /// 使用系统本地时区
    pub fn timezone_local(mut self) -> Self {
        self.config.timezone_offset_seconds = None;
        self
    }

    pub fn placeholder_user_name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.placeholder_user_name = name.into();
        self
    }

    pub fn geocoder_config(mut self, config: GeocoderConfig) -> Self {
        self.config.geocoder_config = config;
        self
    }

    pub fn anti_automation_difficulty(mut self, bits: u32) -> Self {
        self.config.anti_automation_difficulty = bits;
        self
    }

    pub fn anti_automation_site_key<S: Into<String>>(mut self, key: S) -> Self {
        self.config.anti_automation_site_key = key.into();
        self
    }

    pub fn debug_mode(mut self, enabled: bool) -> Self {
        self.config.debug_mode = enabled;
        self
    }

    pub fn build(self) -> CauriConfig {
        self.config
    }
}

impl Default for CauriConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = CauriConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.greeting_refresh_secs, 60);
        assert_eq!(config.placeholder_user_name, "utilisateur");
        assert_eq!(
            config.notification_config.first_snapshot_policy,
            FirstSnapshotPolicy::BaselineOnly
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = CauriConfig::builder().greeting_refresh_secs(0).build();
        assert!(matches!(config.validate(), Err(CauriSDKError::Config(_))));

        let config = CauriConfig::builder().anti_automation_difficulty(25).build();
        assert!(config.validate().is_err());

        let config = CauriConfig::builder().placeholder_user_name("  ").build();
        assert!(config.validate().is_err());

        let config = CauriConfig::builder()
            .event_config(EventConfig { buffer_size: 0 })
            .build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_partial_json_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cauri.json");
        std::fs::write(
            &path,
            r#"{
                "data_dir": "/tmp/cauri-test",
                "timezone_offset_seconds": 0,
                "notification_config": {
                    "enabled": true,
                    "first_snapshot_policy": "alert_from_zero",
                    "title": "Paiement",
                    "icon": null
                }
            }"#,
        )
        .unwrap();

        let config = CauriConfig::from_json_file(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/cauri-test"));
        assert_eq!(config.timezone_offset_seconds, Some(0));
        assert_eq!(
            config.notification_config.first_snapshot_policy,
            FirstSnapshotPolicy::AlertFromZero
        );
        assert_eq!(config.greeting_refresh_secs, 60);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = CauriConfig::from_json_file("/nonexistent/cauri.json").unwrap_err();
        assert!(matches!(err, CauriSDKError::Config(_)));
    }
}
