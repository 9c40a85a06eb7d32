//! 事件系统模块 - 处理 SDK 中的各种事件
//!
//! 功能包括：
//! - 会话切换与订阅开关事件
//! - 钱包、购物车、用户名、公告等视图值变更事件
//! - 钱包入账通知事件
//! - 认证流程步骤与失败事件
//! - 事件广播和订阅机制
//!
//! `emit` 是同步的：快照回调运行在存储的推送线程上，不能等待异步锁。

use crate::notification::NotificationEvent;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// 认证流程
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthFlowKind {
    SignIn,
    SignUp,
}

/// SDK 事件类型
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SDKEvent {
    /// 会话切换（uid 为 None 表示登出）
    SessionChanged {
        uid: Option<String>,
        timestamp: u64,
    },
    /// 会话订阅已打开
    SubscriptionsOpened {
        uid: String,
        count: usize,
        timestamp: u64,
    },
    /// 会话订阅已关闭
    SubscriptionsClosed {
        uid: Option<String>,
        count: usize,
        timestamp: u64,
    },
    /// 用户名变更
    DisplayNameChanged {
        uid: String,
        name: String,
        timestamp: u64,
    },
    /// 钱包余额变更
    WalletChanged {
        uid: String,
        amount: i64,
        timestamp: u64,
    },
    /// 购物车数量变更
    CartCountChanged {
        uid: String,
        count: usize,
        timestamp: u64,
    },
    /// 钱包入账通知
    EarningsIncreased(NotificationEvent),
    /// 顶部公告变更
    AnnouncementChanged {
        text: String,
        timestamp: u64,
    },
    /// 公告条变更
    AnnouncementsChanged {
        count: usize,
        timestamp: u64,
    },
    /// 认证流程进入新步骤
    AuthStepChanged {
        flow: AuthFlowKind,
        step: String,
        timestamp: u64,
    },
    /// 认证失败（流程停留在当前步骤）
    AuthFailed {
        flow: AuthFlowKind,
        message: String,
        timestamp: u64,
    },
    /// 配送位置已解析
    LocationResolved {
        label: String,
        language_code: String,
        timestamp: u64,
    },
}

impl SDKEvent {
    /// 获取事件类型名称
    pub fn event_type(&self) -> &'static str {
        match self {
            SDKEvent::SessionChanged { .. } => "session_changed",
            SDKEvent::SubscriptionsOpened { .. } => "subscriptions_opened",
            SDKEvent::SubscriptionsClosed { .. } => "subscriptions_closed",
            SDKEvent::DisplayNameChanged { .. } => "display_name_changed",
            SDKEvent::WalletChanged { .. } => "wallet_changed",
            SDKEvent::CartCountChanged { .. } => "cart_count_changed",
            SDKEvent::EarningsIncreased(_) => "earnings_increased",
            SDKEvent::AnnouncementChanged { .. } => "announcement_changed",
            SDKEvent::AnnouncementsChanged { .. } => "announcements_changed",
            SDKEvent::AuthStepChanged { .. } => "auth_step_changed",
            SDKEvent::AuthFailed { .. } => "auth_failed",
            SDKEvent::LocationResolved { .. } => "location_resolved",
        }
    }

    /// 获取关联的 uid（如果有）
    pub fn uid(&self) -> Option<&str> {
        match self {
            SDKEvent::SessionChanged { uid, .. } => uid.as_deref(),
            SDKEvent::SubscriptionsOpened { uid, .. } => Some(uid),
            SDKEvent::SubscriptionsClosed { uid, .. } => uid.as_deref(),
            SDKEvent::DisplayNameChanged { uid, .. } => Some(uid),
            SDKEvent::WalletChanged { uid, .. } => Some(uid),
            SDKEvent::CartCountChanged { uid, .. } => Some(uid),
            SDKEvent::EarningsIncreased(event) => Some(&event.uid),
            _ => None,
        }
    }

    /// 获取事件时间戳（秒）
    pub fn timestamp(&self) -> u64 {
        match self {
            SDKEvent::SessionChanged { timestamp, .. }
            | SDKEvent::SubscriptionsOpened { timestamp, .. }
            | SDKEvent::SubscriptionsClosed { timestamp, .. }
            | SDKEvent::DisplayNameChanged { timestamp, .. }
            | SDKEvent::WalletChanged { timestamp, .. }
            | SDKEvent::CartCountChanged { timestamp, .. }
            | SDKEvent::AnnouncementChanged { timestamp, .. }
            | SDKEvent::AnnouncementsChanged { timestamp, .. }
            | SDKEvent::AuthStepChanged { timestamp, .. }
            | SDKEvent::AuthFailed { timestamp, .. }
            | SDKEvent::LocationResolved { timestamp, .. } => *timestamp,
            SDKEvent::EarningsIncreased(event) => event.timestamp,
        }
    }
}

/// 事件过滤器
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    /// 事件类型过滤（为空时不过滤）
    pub event_types: Vec<String>,
    /// uid 过滤（为空时不过滤）
    pub uids: Vec<String>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_types(mut self, event_types: Vec<String>) -> Self {
        self.event_types = event_types;
        self
    }

    pub fn with_uids(mut self, uids: Vec<String>) -> Self {
        self.uids = uids;
        self
    }

    /// 检查事件是否匹配过滤器
    pub fn matches(&self, event: &SDKEvent) -> bool {
        if !self.event_types.is_empty()
            && !self.event_types.iter().any(|t| t == event.event_type())
        {
            return false;
        }

        if !self.uids.is_empty() {
            match event.uid() {
                Some(uid) => {
                    if !self.uids.iter().any(|u| u == uid) {
                        return false;
                    }
                }
                None => return false,
            }
        }

        true
    }
}

/// 事件监听器类型
pub type EventListener = Box<dyn Fn(&SDKEvent) + Send + Sync>;

/// 事件管理器
pub struct EventManager {
    /// 广播发送器
    sender: broadcast::Sender<SDKEvent>,
    /// 事件监听器映射
    listeners: RwLock<HashMap<String, Vec<EventListener>>>,
    /// 事件统计
    stats: RwLock<EventStats>,
}

/// 事件统计信息
#[derive(Debug, Clone, Default)]
pub struct EventStats {
    /// 总事件数
    pub total_events: u64,
    /// 按类型分组的事件数
    pub events_by_type: HashMap<String, u64>,
    /// 监听器数量
    pub listener_count: usize,
    /// 最后事件时间
    pub last_event_time: Option<u64>,
}

impl EventManager {
    /// 创建新的事件管理器
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));

        Self {
            sender,
            listeners: RwLock::new(HashMap::new()),
            stats: RwLock::new(EventStats::default()),
        }
    }

    /// 发布事件
    pub fn emit(&self, event: SDKEvent) {
        debug!("Emitting event: {}", event.event_type());

        {
            let mut stats = self.stats.write();
            stats.total_events += 1;
            *stats
                .events_by_type
                .entry(event.event_type().to_string())
                .or_insert(0) += 1;
            stats.last_event_time = Some(event.timestamp());
        }

        // 无订阅者时 send 会失败，属正常场景（无 UI 的客户端），仅打 debug
        if let Err(e) = self.sender.send(event.clone()) {
            debug!("Failed to broadcast event (no active receivers): {}", e);
        }

        let listeners = self.listeners.read();
        if let Some(event_listeners) = listeners.get(event.event_type()) {
            for listener in event_listeners {
                listener(&event);
            }
        }

        // 通用监听器
        if let Some(general_listeners) = listeners.get("*") {
            for listener in general_listeners {
                listener(&event);
            }
        }
    }

    /// 订阅事件
    pub fn subscribe(&self) -> broadcast::Receiver<SDKEvent> {
        self.sender.subscribe()
    }

    /// 订阅特定类型的事件
    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredEventReceiver {
        FilteredEventReceiver::new(self.sender.subscribe(), filter)
    }

    /// 添加事件监听器（"*" 监听全部）
    pub fn add_listener<F>(&self, event_type: &str, listener: F)
    where
        F: Fn(&SDKEvent) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.write();
        listeners
            .entry(event_type.to_string())
            .or_default()
            .push(Box::new(listener));

        self.stats.write().listener_count = listeners.values().map(|v| v.len()).sum();

        info!("Added listener for event type: {}", event_type);
    }

    /// 移除所有监听器
    pub fn clear_listeners(&self) {
        self.listeners.write().clear();
        self.stats.write().listener_count = 0;

        info!("Cleared all event listeners");
    }

    /// 获取事件统计
    pub fn get_stats(&self) -> EventStats {
        self.stats.read().clone()
    }

    /// 获取活跃订阅者数量
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// 过滤事件接收器
pub struct FilteredEventReceiver {
    receiver: broadcast::Receiver<SDKEvent>,
    filter: EventFilter,
}

impl FilteredEventReceiver {
    pub fn new(receiver: broadcast::Receiver<SDKEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// 接收下一个匹配的事件
    pub async fn recv(&mut self) -> Result<SDKEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// 尝试接收事件（非阻塞）
    pub fn try_recv(&mut self) -> Result<SDKEvent, broadcast::error::TryRecvError> {
        loop {
            let event = self.receiver.try_recv()?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

/// 当前时间（秒）
pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// 事件生成器 - 辅助函数
pub mod event_builders {
    use super::*;

    pub fn session_changed(uid: Option<String>) -> SDKEvent {
        SDKEvent::SessionChanged {
            uid,
            timestamp: now_secs(),
        }
    }

    pub fn subscriptions_opened(uid: &str, count: usize) -> SDKEvent {
        SDKEvent::SubscriptionsOpened {
            uid: uid.to_string(),
            count,
            timestamp: now_secs(),
        }
    }

    pub fn subscriptions_closed(uid: Option<String>, count: usize) -> SDKEvent {
        SDKEvent::SubscriptionsClosed {
            uid,
            count,
            timestamp: now_secs(),
        }
    }

    pub fn display_name_changed(uid: &str, name: &str) -> SDKEvent {
        SDKEvent::DisplayNameChanged {
            uid: uid.to_string(),
            name: name.to_string(),
            timestamp: now_secs(),
        }
    }

    pub fn wallet_changed(uid: &str, amount: i64) -> SDKEvent {
        SDKEvent::WalletChanged {
            uid: uid.to_string(),
            amount,
            timestamp: now_secs(),
        }
    }

    pub fn cart_count_changed(uid: &str, count: usize) -> SDKEvent {
        SDKEvent::CartCountChanged {
            uid: uid.to_string(),
            count,
            timestamp: now_secs(),
        }
    }

    pub fn announcement_changed(text: &str) -> SDKEvent {
        SDKEvent::AnnouncementChanged {
            text: text.to_string(),
            timestamp: now_secs(),
        }
    }

    pub fn announcements_changed(count: usize) -> SDKEvent {
        SDKEvent::AnnouncementsChanged {
            count,
            timestamp: now_secs(),
        }
    }

    pub fn auth_step_changed(flow: AuthFlowKind, step: &str) -> SDKEvent {
        SDKEvent::AuthStepChanged {
            flow,
            step: step.to_string(),
            timestamp: now_secs(),
        }
    }

    pub fn auth_failed(flow: AuthFlowKind, message: String) -> SDKEvent {
        SDKEvent::AuthFailed {
            flow,
            message,
            timestamp: now_secs(),
        }
    }

    pub fn location_resolved(label: &str, language_code: &str) -> SDKEvent {
        SDKEvent::LocationResolved {
            label: label.to_string(),
            language_code: language_code.to_string(),
            timestamp: now_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_event_manager_basic_functionality() {
        let manager = EventManager::new(100);
        let mut receiver = manager.subscribe();

        manager.emit(event_builders::wallet_changed("u1", 500));

        let received_event = receiver.recv().await.unwrap();
        assert_eq!(received_event.event_type(), "wallet_changed");

        let stats = manager.get_stats();
        assert_eq!(stats.total_events, 1);
        assert_eq!(stats.events_by_type.get("wallet_changed"), Some(&1));
    }

    #[tokio::test]
    async fn test_event_filter() {
        let manager = EventManager::new(100);

        let filter = EventFilter::new()
            .with_event_types(vec!["cart_count_changed".to_string()])
            .with_uids(vec!["u1".to_string()]);
        let mut filtered_receiver = manager.subscribe_filtered(filter);

        manager.emit(event_builders::cart_count_changed("u2", 4));
        manager.emit(event_builders::announcement_changed("Promo"));
        manager.emit(event_builders::cart_count_changed("u1", 2));

        let received_event = filtered_receiver.recv().await.unwrap();
        match received_event {
            SDKEvent::CartCountChanged { uid, count, .. } => {
                assert_eq!(uid, "u1");
                assert_eq!(count, 2);
            }
            other => panic!("Expected cart event, got {:?}", other),
        }
        assert!(filtered_receiver.try_recv().is_err());
    }

    #[test]
    fn test_event_listeners() {
        let manager = EventManager::new(100);
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let all = Arc::new(AtomicUsize::new(0));
        let all_clone = all.clone();

        manager.add_listener("session_changed", move |_event| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });
        manager.add_listener("*", move |_event| {
            all_clone.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 0..3 {
            manager.emit(event_builders::session_changed(Some("u1".to_string())));
        }
        manager.emit(event_builders::announcements_changed(2));

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(all.load(Ordering::SeqCst), 4);
        assert_eq!(manager.get_stats().listener_count, 2);

        manager.clear_listeners();
        assert_eq!(manager.get_stats().listener_count, 0);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let manager = EventManager::new(100);

        let mut receiver1 = manager.subscribe();
        let mut receiver2 = manager.subscribe();
        assert_eq!(manager.subscriber_count(), 2);

        manager.emit(event_builders::subscriptions_opened("u1", 3));

        assert_eq!(receiver1.recv().await.unwrap().event_type(), "subscriptions_opened");
        assert_eq!(receiver2.recv().await.unwrap().event_type(), "subscriptions_opened");
    }

    #[test]
    fn test_event_properties() {
        let event = event_builders::subscriptions_closed(None, 3);
        assert_eq!(event.event_type(), "subscriptions_closed");
        assert_eq!(event.uid(), None);
        assert!(event.timestamp() > 0);
    }
}
