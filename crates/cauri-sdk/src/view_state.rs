//! 视图状态（Watched Values）
//!
//! 所有字段只由快照推送（或会话结束时的重置）修改，展示层通过
//! `watch::Receiver<ViewState>` 只读观察。

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::greeting::Greeting;
use crate::location::DeliveryLocation;

/// 未登录或资料缺失时的用户名占位
pub const DEFAULT_USER_NAME: &str = "utilisateur";

/// 公告条为空时的占位文案
pub const ANNOUNCEMENTS_LOADING: &str = "Chargement des annonces...";

/// 导航栏需要的全部状态
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewState {
    /// 是否已登录
    pub is_logged_in: bool,
    /// 当前会话 uid
    pub uid: Option<String>,
    /// 问候语中的用户名
    pub user_name: String,
    /// 钱包余额（FCFA）
    pub wallet: i64,
    /// 购物车商品数
    pub cart_count: usize,
    /// 顶部滚动公告
    pub announcement: Option<String>,
    /// 底部公告条
    pub announcements: Vec<String>,
    /// 时段问候
    pub greeting: Greeting,
    /// 配送位置
    pub location: Option<DeliveryLocation>,
}

impl ViewState {
    pub fn new(placeholder_name: &str) -> Self {
        Self {
            is_logged_in: false,
            uid: None,
            user_name: placeholder_name.to_string(),
            wallet: 0,
            cart_count: 0,
            announcement: None,
            announcements: Vec::new(),
            greeting: Greeting::Morning,
            location: None,
        }
    }

    /// 问候行，例如 "Bonsoir, Awa"
    pub fn greeting_line(&self) -> String {
        format!("{}, {}", self.greeting.text(), self.user_name)
    }

    /// 钱包显示文本
    pub fn wallet_label(&self) -> String {
        format_wallet(self.wallet)
    }

    /// 公告条内容，为空时返回加载占位
    pub fn announcement_strip(&self) -> Vec<String> {
        if self.announcements.is_empty() {
            vec![ANNOUNCEMENTS_LOADING.to_string()]
        } else {
            self.announcements.clone()
        }
    }

    /// 购物车角标，0 时不显示
    pub fn cart_badge(&self) -> Option<usize> {
        (self.cart_count > 0).then_some(self.cart_count)
    }
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new(DEFAULT_USER_NAME)
    }
}

/// 金额格式化："FCFA 12 500"
pub fn format_wallet(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }
    let sign = if amount < 0 { "-" } else { "" };
    format!("FCFA {}{}", sign, grouped)
}

/// 视图状态的唯一写入方
#[derive(Debug, Clone)]
pub struct WatchedValues {
    sender: Arc<watch::Sender<ViewState>>,
    placeholder_name: String,
}

impl WatchedValues {
    pub fn new(placeholder_name: &str) -> Self {
        let (sender, _) = watch::channel(ViewState::new(placeholder_name));
        Self {
            sender: Arc::new(sender),
            placeholder_name: placeholder_name.to_string(),
        }
    }

    pub fn placeholder_name(&self) -> &str {
        &self.placeholder_name
    }

    /// 订阅视图状态
    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.sender.subscribe()
    }

    /// 当前状态快照
    pub fn snapshot(&self) -> ViewState {
        self.sender.borrow().clone()
    }

    /// 修改状态；值未变化时不通知观察者
    pub fn update<F>(&self, modify: F) -> bool
    where
        F: FnOnce(&mut ViewState),
    {
        self.sender.send_if_modified(|state| {
            let before = state.clone();
            modify(state);
            *state != before
        })
    }

    /// 会话结束：会话相关字段回到默认值，全局字段保留
    pub fn reset_session(&self) {
        let placeholder = self.placeholder_name.clone();
        self.update(|state| {
            state.is_logged_in = false;
            state.uid = None;
            state.user_name = placeholder;
            state.wallet = 0;
            state.cart_count = 0;
        });
    }
}
