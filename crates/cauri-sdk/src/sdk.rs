//! SDK 入口
//!
//! 分层初始化顺序：
//! 1. 本地存储 → 2. 事件层 → 3. 视图状态 → 4. 会话同步 / 问候 / 定位 → 5. 生命周期 Hook

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch, RwLock};
use tracing::{info, warn};

use crate::auth::challenge::{AntiAutomationVerifier, ProofOfWorkVerifier};
use crate::auth::{SignInFlow, SignUpFlow};
use crate::config::CauriConfig;
use crate::error::{CauriSDKError, Result};
use crate::events::{EventManager, SDKEvent};
use crate::greeting::{GreetingTicker, TimezoneConfig};
use crate::identity::IdentityProvider;
use crate::lifecycle::{LifecycleHook, LifecycleManager};
use crate::location::{LocationHook, LocationProvider, NominatimGeocoder, ReverseGeocoder};
use crate::notification::{EarningsNotifier, NotificationSurface};
use crate::record_store::RecordStore;
use crate::session::Session;
use crate::session_sync::SessionSubscriptionManager;
use crate::storage::KvStore;
use crate::view_state::{ViewState, WatchedValues};

/// 外部协作方
#[derive(Clone)]
pub struct CauriServices {
    pub identity: Arc<dyn IdentityProvider>,
    pub store: Arc<dyn RecordStore>,
    pub notifications: Arc<dyn NotificationSurface>,
    /// 无定位能力时为 None，不显示配送位置
    pub location: Option<Arc<dyn LocationProvider>>,
    /// None 时使用配置中的 Nominatim 服务
    pub geocoder: Option<Arc<dyn ReverseGeocoder>>,
}

/// CauriM 客户端 SDK
pub struct CauriSDK {
    config: CauriConfig,
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn RecordStore>,
    event_manager: Arc<EventManager>,
    values: WatchedValues,
    kv: Option<Arc<KvStore>>,
    session_sync: Arc<SessionSubscriptionManager>,
    lifecycle_manager: RwLock<LifecycleManager>,
    mounted: AtomicBool,
    shutting_down: AtomicBool,
}

impl CauriSDK {
    /// 异步初始化 SDK
    pub async fn initialize(config: CauriConfig, services: CauriServices) -> Result<Arc<Self>> {
        info!("正在初始化 CauriSDK... {}", crate::version::version_line());

        config.validate()?;

        // === 第1层：本地 KV（只存通知权限记忆，失败时降级） ===
        let kv = match KvStore::new(&config.data_dir).await {
            Ok(kv) => Some(Arc::new(kv)),
            Err(e) => {
                warn!("⚠️ KV 存储不可用，通知权限不会跨重启记忆: {}", e);
                None
            }
        };

        // === 第2层：事件管理器 ===
        let event_manager = Arc::new(EventManager::new(config.event_config.buffer_size));

        // === 第3层：视图状态 ===
        let values = WatchedValues::new(&config.placeholder_user_name);

        // === 第4层：会话同步 ===
        let notifier = Arc::new(EarningsNotifier::new(
            services.notifications.clone(),
            config.notification_config.clone(),
            event_manager.clone(),
            kv.clone(),
        ));
        let session_sync = SessionSubscriptionManager::new(
            services.store.clone(),
            services.identity.clone(),
            values.clone(),
            notifier,
            event_manager.clone(),
        );

        let timezone = match config.timezone_offset_seconds {
            Some(offset_seconds) => {
                info!("已设置时区偏移: {} 秒", offset_seconds);
                Some(TimezoneConfig { offset_seconds })
            }
            None => None,
        };
        let greeting = Arc::new(GreetingTicker::new(
            values.clone(),
            Duration::from_secs(config.greeting_refresh_secs),
            timezone,
        ));

        // === 第5层：生命周期 Hook（卸载时逆序执行） ===
        let mut lifecycle_manager = LifecycleManager::new();
        lifecycle_manager.register_hook(session_sync.clone());
        lifecycle_manager.register_hook(greeting);

        if let Some(provider) = services.location.clone() {
            let geocoder: Arc<dyn ReverseGeocoder> = match services.geocoder.clone() {
                Some(geocoder) => geocoder,
                None => Arc::new(NominatimGeocoder::new(&config.geocoder_config)?),
            };
            lifecycle_manager.register_hook(Arc::new(LocationHook::new(
                provider,
                geocoder,
                values.clone(),
                event_manager.clone(),
            )));
        } else {
            info!("ℹ️ 未提供定位能力，跳过配送位置");
        }

        let sdk = Arc::new(Self {
            config,
            identity: services.identity,
            store: services.store,
            event_manager,
            values,
            kv,
            session_sync,
            lifecycle_manager: RwLock::new(lifecycle_manager),
            mounted: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
        });

        info!("✅ CauriSDK 初始化完成");
        Ok(sdk)
    }

    pub fn config(&self) -> &CauriConfig {
        &self.config
    }

    fn check_running(&self) -> Result<()> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(CauriSDKError::ShuttingDown("SDK 正在关闭".to_string()));
        }
        Ok(())
    }

    /// 视图挂载：打开公告订阅、跟随会话、启动问候刷新与定位
    pub async fn mount(&self) -> Result<()> {
        self.check_running()?;
        if self.mounted.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.lifecycle_manager.read().await.notify_mount().await
    }

    /// 视图卸载：关闭全部订阅和后台任务
    pub async fn unmount(&self) -> Result<()> {
        if !self.mounted.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.lifecycle_manager.read().await.notify_unmount().await
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    /// 注册额外的生命周期 Hook（下次挂载生效）
    pub async fn register_lifecycle_hook(&self, hook: Arc<dyn LifecycleHook>) {
        self.lifecycle_manager.write().await.register_hook(hook);
    }

    /// 观察视图状态
    pub fn view_state(&self) -> watch::Receiver<ViewState> {
        self.values.subscribe()
    }

    /// 当前视图状态
    pub fn snapshot(&self) -> ViewState {
        self.values.snapshot()
    }

    pub fn events(&self) -> Arc<EventManager> {
        self.event_manager.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SDKEvent> {
        self.event_manager.subscribe()
    }

    /// 默认的工作量证明校验器
    pub fn default_verifier(&self) -> Arc<dyn AntiAutomationVerifier> {
        Arc::new(ProofOfWorkVerifier::new(
            self.config.anti_automation_site_key.clone(),
            self.config.anti_automation_difficulty,
        ))
    }

    /// 新的登录流程
    pub fn sign_in_flow(&self) -> SignInFlow {
        self.sign_in_flow_with(self.default_verifier())
    }

    pub fn sign_in_flow_with(&self, verifier: Arc<dyn AntiAutomationVerifier>) -> SignInFlow {
        SignInFlow::new(
            self.identity.clone(),
            self.store.clone(),
            verifier,
            self.event_manager.clone(),
        )
    }

    /// 新的注册流程
    pub fn sign_up_flow(&self) -> SignUpFlow {
        self.sign_up_flow_with(self.default_verifier())
    }

    pub fn sign_up_flow_with(&self, verifier: Arc<dyn AntiAutomationVerifier>) -> SignUpFlow {
        SignUpFlow::new(
            self.identity.clone(),
            self.store.clone(),
            verifier,
            self.event_manager.clone(),
        )
    }

    pub fn current_session(&self) -> Option<Session> {
        self.identity.current_session()
    }

    /// 登出；挂载中时会话订阅随会话流关闭
    pub async fn sign_out(&self) -> Result<()> {
        self.check_running()?;
        self.identity.sign_out().await?;
        info!("已请求登出");
        Ok(())
    }

    /// 当前会话订阅数（调试用）
    pub async fn session_subscription_count(&self) -> usize {
        self.session_sync.session_subscription_count().await
    }

    /// 关闭 SDK：卸载视图并刷写本地存储
    pub async fn shutdown(&self) -> Result<()> {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("正在关闭 CauriSDK...");

        if let Err(e) = self.unmount().await {
            warn!("卸载视图失败: {}", e);
        }
        if let Some(kv) = &self.kv {
            kv.flush().await?;
        }

        info!("✅ CauriSDK 已关闭");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::MemoryIdentityProvider;
    use crate::notification::MemoryNotificationSurface;
    use crate::record_store::{paths, Document, MemoryRecordStore};
    use serde_json::json;
    use tempfile::TempDir;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    async fn sdk(temp_dir: &TempDir) -> (Arc<CauriSDK>, MemoryIdentityProvider, MemoryRecordStore) {
        let identity = MemoryIdentityProvider::new(4);
        let store = MemoryRecordStore::new();
        let config = CauriConfig::builder()
            .data_dir(temp_dir.path())
            .anti_automation_difficulty(4)
            .timezone_hours(0)
            .build();
        let sdk = CauriSDK::initialize(
            config,
            CauriServices {
                identity: Arc::new(identity.clone()),
                store: Arc::new(store.clone()),
                notifications: Arc::new(MemoryNotificationSurface::granted()),
                location: None,
                geocoder: None,
            },
        )
        .await
        .unwrap();
        (sdk, identity, store)
    }

    #[tokio::test]
    async fn test_sign_in_mirrors_remote_values() {
        let temp_dir = TempDir::new().unwrap();
        let (sdk, identity, store) = sdk(&temp_dir).await;
        let uid = identity.seed_account("awa@example.com", "secret1", None);
        store
            .set_document(&paths::user_profile(&uid).unwrap(), doc(json!({"firstName": "Awa"})))
            .await
            .unwrap();
        store
            .set_document(&paths::user_earnings(&uid).unwrap(), doc(json!({"amount": 12500})))
            .await
            .unwrap();

        sdk.mount().await.unwrap();
        assert!(sdk.is_mounted());
        assert!(!sdk.snapshot().is_logged_in);

        let mut flow = sdk.sign_in_flow();
        flow.submit_identifier("awa@example.com").await.unwrap();
        flow.submit_password("secret1").await.unwrap();

        let mut view = sdk.view_state();
        let state = tokio::time::timeout(
            Duration::from_secs(2),
            view.wait_for(|state| state.is_logged_in && state.wallet == 12500),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert_eq!(state.user_name, "Awa");
        assert_eq!(state.wallet_label(), "FCFA 12 500");
        assert_eq!(sdk.session_subscription_count().await, 3);

        sdk.sign_out().await.unwrap();
        tokio::time::timeout(
            Duration::from_secs(2),
            view.wait_for(|state| !state.is_logged_in),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(sdk.snapshot().wallet, 0);

        sdk.shutdown().await.unwrap();
        assert!(!sdk.is_mounted());
        assert_eq!(store.listener_count(), 0);
        assert!(matches!(sdk.mount().await, Err(CauriSDKError::ShuttingDown(_))));
    }

    #[tokio::test]
    async fn test_initialize_rejects_invalid_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = CauriConfig::builder()
            .data_dir(temp_dir.path())
            .greeting_refresh_secs(0)
            .build();
        let result = CauriSDK::initialize(
            config,
            CauriServices {
                identity: Arc::new(MemoryIdentityProvider::new(4)),
                store: Arc::new(MemoryRecordStore::new()),
                notifications: Arc::new(MemoryNotificationSurface::granted()),
                location: None,
                geocoder: None,
            },
        )
        .await;
        assert!(matches!(result, Err(CauriSDKError::Config(_))));
    }
}
