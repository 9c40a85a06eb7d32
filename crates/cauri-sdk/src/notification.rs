//! 钱包入账通知
//!
//! 监听钱包余额，余额上涨且已获得通知权限时弹出一条通知。
//! 通知只是派生效果：无论是否弹出，最近观测值都会更新。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::events::{now_secs, EventManager, SDKEvent};
use crate::storage::kv::keys;
use crate::storage::KvStore;
use crate::view_state::format_wallet;

/// 通知权限
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPermission {
    /// 尚未询问
    Default,
    Granted,
    Denied,
}

/// 一条待展示的通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
}

/// 宿主平台的通知能力
#[async_trait]
pub trait NotificationSurface: Send + Sync {
    /// 当前权限（不弹窗）
    fn permission(&self) -> NotificationPermission;

    /// 请求权限，可能弹窗
    async fn request_permission(&self) -> NotificationPermission;

    fn show(&self, notification: &Notification) -> Result<()>;
}

/// 会话开始后第一个余额快照的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstSnapshotPolicy {
    /// 第一个快照只作为基线，不提醒
    #[default]
    BaselineOnly,
    /// 第一个快照与 0 比较，大于 0 即提醒
    AlertFromZero,
}

/// 通知配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub first_snapshot_policy: FirstSnapshotPolicy,
    pub title: String,
    pub icon: Option<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            first_snapshot_policy: FirstSnapshotPolicy::default(),
            title: "Nouveau paiement reçu".to_string(),
            icon: Some("/cauri-icon.png".to_string()),
        }
    }
}

/// 余额上涨事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub uid: String,
    pub previous: i64,
    pub current: i64,
    pub delta: i64,
    pub timestamp: u64,
}

impl NotificationEvent {
    pub fn body(&self) -> String {
        format!(
            "Vous avez reçu {}. Nouveau solde : {}",
            format_wallet(self.delta),
            format_wallet(self.current)
        )
    }
}

/// 余额比较状态机
#[derive(Debug, Clone)]
pub struct EarningsTrigger {
    policy: FirstSnapshotPolicy,
    last_observed: i64,
    seen_first: bool,
}

impl EarningsTrigger {
    pub fn new(policy: FirstSnapshotPolicy) -> Self {
        Self {
            policy,
            last_observed: 0,
            seen_first: false,
        }
    }

    /// 余额订阅打开时调用，最近观测值归零
    pub fn reset(&mut self) {
        self.last_observed = 0;
        self.seen_first = false;
    }

    pub fn last_observed(&self) -> i64 {
        self.last_observed
    }

    /// 观测一个新值，返回是否应提醒
    pub fn observe(&mut self, uid: &str, value: i64, granted: bool) -> Option<NotificationEvent> {
        let previous = self.last_observed;
        let first = !self.seen_first;
        self.seen_first = true;
        self.last_observed = value;

        if first && self.policy == FirstSnapshotPolicy::BaselineOnly {
            return None;
        }
        if value <= previous || !granted {
            return None;
        }

        Some(NotificationEvent {
            uid: uid.to_string(),
            previous,
            current: value,
            delta: value - previous,
            timestamp: now_secs(),
        })
    }
}

/// 入账通知器
pub struct EarningsNotifier {
    surface: Arc<dyn NotificationSurface>,
    config: NotificationConfig,
    trigger: Mutex<EarningsTrigger>,
    kv: Option<Arc<KvStore>>,
    prompted: AtomicBool,
    events: Arc<EventManager>,
}

impl EarningsNotifier {
    pub fn new(
        surface: Arc<dyn NotificationSurface>,
        config: NotificationConfig,
        events: Arc<EventManager>,
        kv: Option<Arc<KvStore>>,
    ) -> Self {
        let trigger = EarningsTrigger::new(config.first_snapshot_policy);
        Self {
            surface,
            config,
            trigger: Mutex::new(trigger),
            kv,
            prompted: AtomicBool::new(false),
            events,
        }
    }

    pub fn reset(&self) {
        self.trigger.lock().reset();
    }

    pub fn last_observed(&self) -> i64 {
        self.trigger.lock().last_observed()
    }

    /// 会话激活时调用：只在权限仍为 Default 且从未询问过时请求一次
    pub async fn ensure_permission(&self) -> NotificationPermission {
        let current = self.surface.permission();
        if !self.config.enabled || current != NotificationPermission::Default {
            self.remember(keys::NOTIFICATION_PERMISSION, &current).await;
            return current;
        }

        if self.already_prompted().await {
            // 平台报告 Default 时以上次记录的结果为准
            let last_known = self.last_known_permission().await.unwrap_or(current);
            debug!("通知权限已询问过，不再弹窗: {:?}", last_known);
            return last_known;
        }

        self.prompted.store(true, Ordering::SeqCst);
        self.remember(keys::NOTIFICATION_PROMPTED, &true).await;

        let result = self.surface.request_permission().await;
        info!("通知权限请求结果: {:?}", result);
        self.remember(keys::NOTIFICATION_PERMISSION, &result).await;
        result
    }

    /// 余额快照到达
    pub fn observe(&self, uid: &str, value: i64) -> Option<NotificationEvent> {
        let granted =
            self.config.enabled && self.surface.permission() == NotificationPermission::Granted;
        let event = self.trigger.lock().observe(uid, value, granted)?;

        let notification = Notification {
            title: self.config.title.clone(),
            body: event.body(),
            icon: self.config.icon.clone(),
        };
        if let Err(e) = self.surface.show(&notification) {
            warn!("展示入账通知失败: {}", e);
        }

        info!(
            "💰 余额上涨: uid={}, {} -> {} (+{})",
            uid, event.previous, event.current, event.delta
        );
        self.events.emit(SDKEvent::EarningsIncreased(event.clone()));
        Some(event)
    }

    /// 本地记录的最近一次权限状态
    pub async fn last_known_permission(&self) -> Option<NotificationPermission> {
        let kv = self.kv.as_ref()?;
        match kv.get::<_, NotificationPermission>(keys::NOTIFICATION_PERMISSION).await {
            Ok(permission) => permission,
            Err(e) => {
                warn!("读取通知权限状态失败: {}", e);
                None
            }
        }
    }

    async fn already_prompted(&self) -> bool {
        if self.prompted.load(Ordering::SeqCst) {
            return true;
        }
        let Some(kv) = &self.kv else {
            return false;
        };
        match kv.get::<_, bool>(keys::NOTIFICATION_PROMPTED).await {
            Ok(flag) => flag.unwrap_or(false),
            Err(e) => {
                warn!("读取通知权限记忆失败: {}", e);
                false
            }
        }
    }

    async fn remember<V: Serialize + Sync>(&self, key: &str, value: &V) {
        if let Some(kv) = &self.kv {
            if let Err(e) = kv.set(key, value).await {
                warn!("保存通知权限记忆失败: {}", e);
            }
        }
    }
}

/// 进程内通知面板，记录展示过的通知
pub struct MemoryNotificationSurface {
    permission: Mutex<NotificationPermission>,
    answer: NotificationPermission,
    shown: Mutex<Vec<Notification>>,
    requests: Mutex<usize>,
}

impl MemoryNotificationSurface {
    /// `answer` 为用户在弹窗中的选择
    pub fn new(initial: NotificationPermission, answer: NotificationPermission) -> Self {
        Self {
            permission: Mutex::new(initial),
            answer,
            shown: Mutex::new(Vec::new()),
            requests: Mutex::new(0),
        }
    }

    pub fn granted() -> Self {
        Self::new(NotificationPermission::Granted, NotificationPermission::Granted)
    }

    pub fn shown(&self) -> Vec<Notification> {
        self.shown.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        *self.requests.lock()
    }

    pub fn set_permission(&self, permission: NotificationPermission) {
        *self.permission.lock() = permission;
    }
}

#[async_trait]
impl NotificationSurface for MemoryNotificationSurface {
    fn permission(&self) -> NotificationPermission {
        *self.permission.lock()
    }

    async fn request_permission(&self) -> NotificationPermission {
        *self.requests.lock() += 1;
        let mut permission = self.permission.lock();
        if *permission == NotificationPermission::Default {
            *permission = self.answer;
        }
        *permission
    }

    fn show(&self, notification: &Notification) -> Result<()> {
        self.shown.lock().push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn notifier(surface: Arc<MemoryNotificationSurface>, policy: FirstSnapshotPolicy) -> EarningsNotifier {
        let config = NotificationConfig {
            first_snapshot_policy: policy,
            ..NotificationConfig::default()
        };
        EarningsNotifier::new(surface, config, Arc::new(EventManager::new(16)), None)
    }

    #[test]
    fn test_trigger_sequence_yields_two_increases() {
        for policy in [FirstSnapshotPolicy::BaselineOnly, FirstSnapshotPolicy::AlertFromZero] {
            let mut trigger = EarningsTrigger::new(policy);
            let deltas: Vec<i64> = [0, 500, 500, 300, 900]
                .into_iter()
                .filter_map(|v| trigger.observe("u1", v, true))
                .map(|e| e.delta)
                .collect();
            assert_eq!(deltas, vec![500, 600], "policy {:?}", policy);
            assert_eq!(trigger.last_observed(), 900);
        }
    }

    #[test]
    fn test_first_snapshot_policy() {
        let mut baseline = EarningsTrigger::new(FirstSnapshotPolicy::BaselineOnly);
        assert!(baseline.observe("u1", 1200, true).is_none());
        assert_eq!(baseline.last_observed(), 1200);

        let mut from_zero = EarningsTrigger::new(FirstSnapshotPolicy::AlertFromZero);
        let event = from_zero.observe("u1", 1200, true).unwrap();
        assert_eq!((event.previous, event.delta), (0, 1200));
    }

    #[test]
    fn test_last_observed_updates_without_permission() {
        let mut trigger = EarningsTrigger::new(FirstSnapshotPolicy::AlertFromZero);
        assert!(trigger.observe("u1", 500, false).is_none());
        assert_eq!(trigger.last_observed(), 500);
        // 授权后只对新的增量提醒
        let event = trigger.observe("u1", 700, true).unwrap();
        assert_eq!(event.delta, 200);

        trigger.reset();
        assert_eq!(trigger.last_observed(), 0);
    }

    #[test]
    fn test_notifier_shows_and_emits() {
        let surface = Arc::new(MemoryNotificationSurface::granted());
        let notifier = notifier(surface.clone(), FirstSnapshotPolicy::BaselineOnly);
        let mut receiver = notifier.events.subscribe();

        for value in [0, 500, 500, 300, 900] {
            notifier.observe("u1", value);
        }

        let shown = surface.shown();
        assert_eq!(shown.len(), 2);
        assert_eq!(shown[0].body, "Vous avez reçu FCFA 500. Nouveau solde : FCFA 500");
        assert_eq!(shown[0].icon.as_deref(), Some("/cauri-icon.png"));

        let mut deltas = Vec::new();
        while let Ok(SDKEvent::EarningsIncreased(event)) = receiver.try_recv() {
            deltas.push(event.delta);
        }
        assert_eq!(deltas, vec![500, 600]);
    }

    #[test]
    fn test_denied_permission_shows_nothing() {
        let surface = Arc::new(MemoryNotificationSurface::new(
            NotificationPermission::Denied,
            NotificationPermission::Denied,
        ));
        let notifier = notifier(surface.clone(), FirstSnapshotPolicy::AlertFromZero);
        for value in [100, 200, 300] {
            assert!(notifier.observe("u1", value).is_none());
        }
        assert!(surface.shown().is_empty());
        assert_eq!(notifier.last_observed(), 300);
    }

    #[tokio::test]
    async fn test_permission_requested_once() {
        let surface = Arc::new(MemoryNotificationSurface::new(
            NotificationPermission::Default,
            NotificationPermission::Granted,
        ));
        let notifier = notifier(surface.clone(), FirstSnapshotPolicy::BaselineOnly);

        assert_eq!(notifier.ensure_permission().await, NotificationPermission::Granted);
        assert_eq!(notifier.ensure_permission().await, NotificationPermission::Granted);
        assert_eq!(surface.request_count(), 1);
    }

    #[tokio::test]
    async fn test_prompt_memory_survives_restart() {
        let temp_dir = TempDir::new().unwrap();
        let answer_later = NotificationPermission::Default;

        {
            let kv = Arc::new(KvStore::new(temp_dir.path()).await.unwrap());
            let surface = Arc::new(MemoryNotificationSurface::new(
                NotificationPermission::Default,
                answer_later,
            ));
            let notifier = EarningsNotifier::new(
                surface.clone(),
                NotificationConfig::default(),
                Arc::new(EventManager::new(4)),
                Some(kv.clone()),
            );
            notifier.ensure_permission().await;
            assert_eq!(surface.request_count(), 1);
            kv.flush().await.unwrap();
        }

        let kv = Arc::new(KvStore::new(temp_dir.path()).await.unwrap());
        let surface = Arc::new(MemoryNotificationSurface::new(
            NotificationPermission::Default,
            NotificationPermission::Granted,
        ));
        let notifier = EarningsNotifier::new(
            surface.clone(),
            NotificationConfig::default(),
            Arc::new(EventManager::new(4)),
            Some(kv),
        );
        assert_eq!(notifier.ensure_permission().await, NotificationPermission::Default);
        assert_eq!(surface.request_count(), 0);
    }

    #[tokio::test]
    async fn test_last_known_permission_used_after_restart() {
        let temp_dir = TempDir::new().unwrap();

        {
            let kv = Arc::new(KvStore::new(temp_dir.path()).await.unwrap());
            let surface = Arc::new(MemoryNotificationSurface::new(
                NotificationPermission::Default,
                NotificationPermission::Denied,
            ));
            let notifier = EarningsNotifier::new(
                surface,
                NotificationConfig::default(),
                Arc::new(EventManager::new(4)),
                Some(kv.clone()),
            );
            assert_eq!(notifier.ensure_permission().await, NotificationPermission::Denied);
            kv.flush().await.unwrap();
        }

        // 重启后平台又报告 Default：沿用上次的拒绝结果，不再弹窗
        let kv = Arc::new(KvStore::new(temp_dir.path()).await.unwrap());
        let surface = Arc::new(MemoryNotificationSurface::new(
            NotificationPermission::Default,
            NotificationPermission::Granted,
        ));
        let notifier = EarningsNotifier::new(
            surface.clone(),
            NotificationConfig::default(),
            Arc::new(EventManager::new(4)),
            Some(kv),
        );
        assert_eq!(
            notifier.last_known_permission().await,
            Some(NotificationPermission::Denied)
        );
        assert_eq!(notifier.ensure_permission().await, NotificationPermission::Denied);
        assert_eq!(surface.request_count(), 0);
    }
}
