//! 视图生命周期管理
//!
//! 把"挂载时订阅、卸载时退订"显式化：各模块实现 [`LifecycleHook`]，
//! 由 SDK 在 mount/unmount 时统一触发，不依赖任何 UI 框架的生命周期钩子。

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// 生命周期回调 Hook
#[async_trait]
pub trait LifecycleHook: Send + Sync {
    /// 用于日志的模块名
    fn name(&self) -> &'static str;

    /// 视图挂载时调用
    async fn on_mount(&self) -> Result<()>;

    /// 视图卸载时调用
    async fn on_unmount(&self) -> Result<()>;
}

/// 生命周期管理器
pub struct LifecycleManager {
    hooks: Vec<Arc<dyn LifecycleHook>>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// 获取已注册的 Hook 数量
    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    /// 注册生命周期回调 Hook
    pub fn register_hook(&mut self, hook: Arc<dyn LifecycleHook>) {
        info!("生命周期 Hook 已注册: {} (当前共 {} 个)", hook.name(), self.hooks.len() + 1);
        self.hooks.push(hook);
    }

    /// 通知所有 Hook：视图挂载
    ///
    /// 按注册顺序执行，某个 Hook 失败时记录错误并继续执行其他 Hook，最后返回第一个错误
    pub async fn notify_mount(&self) -> Result<()> {
        info!("🔄 通知所有模块：视图挂载");

        let mut errors = Vec::new();
        for hook in &self.hooks {
            if let Err(e) = hook.on_mount().await {
                warn!("⚠️ Hook {} 挂载失败: {}", hook.name(), e);
                errors.push(e);
            }
        }

        match errors.into_iter().next() {
            Some(first) => Err(first),
            None => {
                info!("✅ 所有模块挂载完成");
                Ok(())
            }
        }
    }

    /// 通知所有 Hook：视图卸载
    ///
    /// 按注册的逆序执行，保证后挂载的先卸载
    pub async fn notify_unmount(&self) -> Result<()> {
        info!("🔄 通知所有模块：视图卸载");

        let mut errors = Vec::new();
        for hook in self.hooks.iter().rev() {
            if let Err(e) = hook.on_unmount().await {
                warn!("⚠️ Hook {} 卸载失败: {}", hook.name(), e);
                errors.push(e);
            }
        }

        match errors.into_iter().next() {
            Some(first) => Err(first),
            None => {
                info!("✅ 所有模块卸载完成");
                Ok(())
            }
        }
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}
