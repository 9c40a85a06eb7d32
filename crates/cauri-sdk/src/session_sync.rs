//! 会话级订阅管理
//!
//! 把"当前会话"映射为一组实时订阅：
//! - `users/{uid}`            -> user_name
//! - `users/{uid}/earnings/current` -> wallet（并驱动入账通知）
//! - `users/{uid}/cart`       -> cart_count
//!
//! 会话切换在一把异步互斥锁内串行执行：先关闭旧会话的全部订阅，再打开新会话的订阅。
//! 订阅关闭后旧回调不会再执行，因此旧会话的迟到推送无法写入新会话的视图状态。
//!
//! 另外管理与会话无关的全局订阅（顶部公告、公告条），随视图挂载/卸载开关。

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::events::{event_builders, EventManager};
use crate::identity::IdentityProvider;
use crate::lifecycle::LifecycleHook;
use crate::notification::EarningsNotifier;
use crate::record_store::{fields, paths, RecordStore, Snapshot};
use crate::session::Session;
use crate::subscription::SubscriptionSet;
use crate::view_state::WatchedValues;

/// 会话槽：只在持有切换锁时修改
#[derive(Default)]
struct SessionSlot {
    session: Option<Session>,
    subscriptions: SubscriptionSet,
}

/// 会话级订阅管理器
pub struct SessionSubscriptionManager {
    me: Weak<SessionSubscriptionManager>,
    store: Arc<dyn RecordStore>,
    identity: Arc<dyn IdentityProvider>,
    values: WatchedValues,
    notifier: Arc<EarningsNotifier>,
    events: Arc<EventManager>,
    slot: tokio::sync::Mutex<SessionSlot>,
    global: Mutex<SubscriptionSet>,
    listener: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
    /// attach/detach 串行执行
    attach_gate: tokio::sync::Mutex<()>,
    /// 后台通知权限请求，不占用切换锁
    prompt: Mutex<Option<JoinHandle<()>>>,
}

impl SessionSubscriptionManager {
    pub fn new(
        store: Arc<dyn RecordStore>,
        identity: Arc<dyn IdentityProvider>,
        values: WatchedValues,
        notifier: Arc<EarningsNotifier>,
        events: Arc<EventManager>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            store,
            identity,
            values,
            notifier,
            events,
            slot: tokio::sync::Mutex::new(SessionSlot::default()),
            global: Mutex::new(SubscriptionSet::new()),
            listener: Mutex::new(None),
            attach_gate: tokio::sync::Mutex::new(()),
            prompt: Mutex::new(None),
        })
    }

    /// 当前生效的会话
    pub async fn current_session(&self) -> Option<Session> {
        self.slot.lock().await.session.clone()
    }

    /// 当前会话打开的订阅数
    pub async fn session_subscription_count(&self) -> usize {
        self.slot.lock().await.subscriptions.len()
    }

    pub fn global_subscription_count(&self) -> usize {
        self.global.lock().len()
    }

    /// 会话变化
    ///
    /// - 同一 uid 重复推送：只刷新会话元数据
    /// - 其他情况：关闭旧订阅、重置视图状态，新会话非空时打开新订阅
    ///
    /// 打开订阅失败时，已打开的部分全部关闭，视图状态保持默认，返回错误。
    pub async fn on_session_change(&self, next: Option<Session>) -> Result<()> {
        let mut slot = self.slot.lock().await;

        let unchanged = match (&slot.session, &next) {
            (Some(current), Some(incoming)) => current.same_subject(incoming),
            (None, None) => return Ok(()),
            _ => false,
        };
        if unchanged {
            debug!("会话未变化: uid={:?}", next.as_ref().map(|s| &s.uid));
            slot.session = next;
            return Ok(());
        }

        self.teardown(&mut slot);

        let Some(session) = next else {
            self.events.emit(event_builders::session_changed(None));
            return Ok(());
        };

        info!("🔄 会话切换: uid={}", session.uid);
        self.events
            .emit(event_builders::session_changed(Some(session.uid.clone())));

        let name = self.seed_display_name(&session).await;
        let uid = session.uid.clone();
        self.values.update(|state| {
            state.is_logged_in = true;
            state.uid = Some(uid);
            state.user_name = name;
        });

        self.notifier.reset();

        match self.open_session_subscriptions(&session, &mut slot.subscriptions) {
            Ok(count) => {
                info!("✅ 会话订阅已打开: uid={}, count={}", session.uid, count);
                self.events
                    .emit(event_builders::subscriptions_opened(&session.uid, count));
                slot.session = Some(session);
                self.spawn_permission_prompt();
                Ok(())
            }
            Err(e) => {
                let closed = slot.subscriptions.close_all();
                self.values.reset_session();
                warn!(
                    "⚠️ 打开会话订阅失败: uid={}, 已回滚 {} 个订阅: {}",
                    session.uid, closed, e
                );
                Err(e)
            }
        }
    }

    /// 会话生效后在后台请求通知权限，弹窗未应答时不阻塞切换
    fn spawn_permission_prompt(&self) {
        let notifier = self.notifier.clone();
        let handle = tokio::spawn(async move {
            notifier.ensure_permission().await;
        });
        if let Some(previous) = self.prompt.lock().replace(handle) {
            previous.abort();
        }
    }

    /// 关闭旧会话的订阅并重置视图状态
    fn teardown(&self, slot: &mut SessionSlot) {
        let previous = slot.session.take();
        let closed = slot.subscriptions.close_all();
        self.values.reset_session();
        self.notifier.reset();

        if previous.is_some() || closed > 0 {
            let uid = previous.map(|s| s.uid);
            info!("会话订阅已关闭: uid={:?}, count={}", uid, closed);
            self.events
                .emit(event_builders::subscriptions_closed(uid, closed));
        }
    }

    /// 资料名 -> 身份提供方显示名 -> 占位
    async fn seed_display_name(&self, session: &Session) -> String {
        let fallback = session
            .display_name()
            .unwrap_or(self.values.placeholder_name())
            .to_string();

        let path = match paths::user_profile(&session.uid) {
            Ok(path) => path,
            Err(e) => {
                warn!("资料路径无效: uid={}, {}", session.uid, e);
                return fallback;
            }
        };
        match self.store.get_once(&path).await {
            Ok(doc) => fields::non_empty_str(doc.as_ref(), "firstName")
                .map(str::to_string)
                .unwrap_or(fallback),
            Err(e) => {
                warn!("读取资料失败，使用默认名: uid={}, {}", session.uid, e);
                fallback
            }
        }
    }

    fn open_session_subscriptions(&self, session: &Session, set: &mut SubscriptionSet) -> Result<usize> {
        let uid = session.uid.clone();
        let store = self.store.as_ref();

        let fallback_name = session
            .display_name()
            .unwrap_or(self.values.placeholder_name())
            .to_string();
        set.open(store, paths::user_profile(&uid)?, {
            let values = self.values.clone();
            let events = self.events.clone();
            let uid = uid.clone();
            move |snapshot: Snapshot| {
                let name = fields::non_empty_str(snapshot.document(), "firstName")
                    .unwrap_or(&fallback_name)
                    .to_string();
                if values.update(|state| state.user_name = name.clone()) {
                    events.emit(event_builders::display_name_changed(&uid, &name));
                }
            }
        })?;

        set.open(store, paths::user_earnings(&uid)?, {
            let values = self.values.clone();
            let events = self.events.clone();
            let notifier = self.notifier.clone();
            let uid = uid.clone();
            move |snapshot: Snapshot| {
                let amount = fields::amount(snapshot.document(), "amount").unwrap_or(0);
                if values.update(|state| state.wallet = amount) {
                    events.emit(event_builders::wallet_changed(&uid, amount));
                }
                notifier.observe(&uid, amount);
            }
        })?;

        set.open(store, paths::user_cart(&uid)?, {
            let values = self.values.clone();
            let events = self.events.clone();
            let uid = uid.clone();
            move |snapshot: Snapshot| {
                let count = snapshot.size();
                if values.update(|state| state.cart_count = count) {
                    events.emit(event_builders::cart_count_changed(&uid, count));
                }
            }
        })?;

        Ok(set.len())
    }

    /// 打开全局订阅（已打开时忽略）
    pub fn mount_global(&self) -> Result<()> {
        let mut global = self.global.lock();
        if !global.is_empty() {
            return Ok(());
        }

        let result = self.open_global_subscriptions(&mut global);
        if let Err(e) = &result {
            global.close_all();
            warn!("⚠️ 打开公告订阅失败: {}", e);
        }
        result
    }

    fn open_global_subscriptions(&self, set: &mut SubscriptionSet) -> Result<()> {
        let store = self.store.as_ref();

        set.open(store, paths::announcement()?, {
            let values = self.values.clone();
            let events = self.events.clone();
            move |snapshot: Snapshot| {
                // 没有 text 的快照保留上一条公告
                let Some(text) = fields::non_empty_str(snapshot.document(), "text") else {
                    return;
                };
                let text = text.to_string();
                if values.update(|state| state.announcement = Some(text.clone())) {
                    events.emit(event_builders::announcement_changed(&text));
                }
            }
        })?;

        set.open(store, paths::announcements()?, {
            let values = self.values.clone();
            let events = self.events.clone();
            move |snapshot: Snapshot| {
                let items: Vec<String> = snapshot
                    .docs()
                    .filter_map(|doc| fields::non_empty_str(Some(doc), "text"))
                    .map(str::to_string)
                    .collect();
                let count = items.len();
                if values.update(|state| state.announcements = items) {
                    events.emit(event_builders::announcements_changed(count));
                }
            }
        })?;

        Ok(())
    }

    /// 关闭全局订阅
    pub fn unmount_global(&self) -> usize {
        let closed = self.global.lock().close_all();
        if closed > 0 {
            debug!("公告订阅已关闭: count={}", closed);
        }
        closed
    }

    /// 跟随身份提供方的会话流
    ///
    /// 先同步处理当前会话，再在后台转发后续变化。已附着时忽略。
    pub async fn attach(&self) -> Result<()> {
        let _gate = self.attach_gate.lock().await;
        if self.listener.lock().is_some() {
            return Ok(());
        }

        let mut receiver = self.identity.on_session_change();
        let initial = receiver.borrow_and_update().clone();
        let initial_result = self.on_session_change(initial).await;

        let token = CancellationToken::new();
        let child = token.clone();
        let me = self.me.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    changed = receiver.changed() => {
                        if changed.is_err() {
                            debug!("身份提供方会话流已关闭");
                            break;
                        }
                        let next = receiver.borrow_and_update().clone();
                        let Some(manager) = me.upgrade() else { break };
                        if let Err(e) = manager.on_session_change(next).await {
                            warn!("会话切换失败: {}", e);
                        }
                    }
                }
            }
        });

        let mut listener = self.listener.lock();
        if let Some((old_token, old_handle)) = listener.replace((token, handle)) {
            old_token.cancel();
            old_handle.abort();
        }
        info!("已附着身份提供方会话流");
        initial_result
    }

    /// 停止跟随会话流并关闭当前会话的订阅
    pub async fn detach(&self) -> Result<()> {
        let _gate = self.attach_gate.lock().await;
        let listener = self.listener.lock().take();
        if let Some((token, handle)) = listener {
            token.cancel();
            let _ = handle.await;
            info!("已脱离身份提供方会话流");
        }
        self.on_session_change(None).await
    }
}

#[async_trait]
impl LifecycleHook for SessionSubscriptionManager {
    fn name(&self) -> &'static str {
        "session_sync"
    }

    async fn on_mount(&self) -> Result<()> {
        let global = self.mount_global();
        let session = self.attach().await;
        global.and(session)
    }

    async fn on_unmount(&self) -> Result<()> {
        let result = self.detach().await;
        self.unmount_global();
        result
    }
}

impl Drop for SessionSubscriptionManager {
    fn drop(&mut self) {
        if let Some((token, handle)) = self.listener.get_mut().take() {
            token.cancel();
            handle.abort();
        }
        if let Some(handle) = self.prompt.get_mut().take() {
            handle.abort();
        }
    }
}
