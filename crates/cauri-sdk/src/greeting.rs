//! 时段问候
//!
//! 根据本地小时计算问候语，挂载期间按固定间隔刷新。
//! 时区可配置（固定偏移），未配置时使用系统本地时区。

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Local, Timelike, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Result;
use crate::lifecycle::LifecycleHook;
use crate::view_state::WatchedValues;

/// 时区配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimezoneConfig {
    /// 时区偏移（秒），例如：+00:00 = 0, +01:00 = 3600
    pub offset_seconds: i32,
}

impl TimezoneConfig {
    /// 从小时偏移创建
    pub fn from_hours(hours: i32) -> Self {
        Self {
            offset_seconds: hours * 3600,
        }
    }

    /// 从分钟偏移创建
    pub fn from_minutes(minutes: i32) -> Self {
        Self {
            offset_seconds: minutes * 60,
        }
    }

    /// 使用系统本地时区
    pub fn local() -> Self {
        Self {
            offset_seconds: Local::now().offset().local_minus_utc(),
        }
    }

    pub fn to_fixed_offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.offset_seconds)
    }
}

/// 问候语
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Greeting {
    /// 12 点前
    Morning,
    /// 12 点到 19 点
    Afternoon,
    /// 19 点后
    Evening,
}

impl Greeting {
    pub fn for_hour(hour: u32) -> Self {
        if hour < 12 {
            Greeting::Morning
        } else if hour < 19 {
            Greeting::Afternoon
        } else {
            Greeting::Evening
        }
    }

    /// 指定时刻在给定时区下的问候
    pub fn at(instant: DateTime<Utc>, timezone: Option<TimezoneConfig>) -> Self {
        let offset = timezone
            .and_then(|tz| tz.to_fixed_offset())
            .or_else(|| TimezoneConfig::local().to_fixed_offset());
        let hour = match offset {
            Some(offset) => instant.with_timezone(&offset).hour(),
            None => instant.hour(),
        };
        Self::for_hour(hour)
    }

    pub fn now(timezone: Option<TimezoneConfig>) -> Self {
        Self::at(Utc::now(), timezone)
    }

    pub fn text(&self) -> &'static str {
        match self {
            Greeting::Morning => "Bonjour",
            Greeting::Afternoon => "Bon après-midi",
            Greeting::Evening => "Bonsoir",
        }
    }
}

/// 问候语定时刷新
///
/// 独立于会话生命周期，只与视图挂载/卸载绑定。
pub struct GreetingTicker {
    values: WatchedValues,
    interval: Duration,
    timezone: Option<TimezoneConfig>,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl GreetingTicker {
    pub fn new(values: WatchedValues, interval: Duration, timezone: Option<TimezoneConfig>) -> Self {
        Self {
            values,
            interval,
            timezone,
            task: Mutex::new(None),
        }
    }

    /// 立即重新计算一次
    pub fn refresh(&self) -> Greeting {
        let greeting = Greeting::now(self.timezone);
        self.values.update(|state| state.greeting = greeting);
        greeting
    }

    /// 是否正在定时刷新
    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    /// 启动定时刷新（已启动时忽略）
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let child = token.clone();
        let values = self.values.clone();
        let timezone = self.timezone;
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        let greeting = Greeting::now(timezone);
                        if values.update(|state| state.greeting = greeting) {
                            debug!("问候语已刷新: {}", greeting.text());
                        }
                    }
                }
            }
        });

        *task = Some((token, handle));
    }

    /// 停止定时刷新并等待任务退出
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        if let Some((token, handle)) = task {
            token.cancel();
            let _ = handle.await;
        }
    }
}

#[async_trait]
impl LifecycleHook for GreetingTicker {
    fn name(&self) -> &'static str {
        "greeting"
    }

    async fn on_mount(&self) -> Result<()> {
        self.refresh();
        self.start();
        Ok(())
    }

    async fn on_unmount(&self) -> Result<()> {
        self.stop().await;
        Ok(())
    }
}

impl Drop for GreetingTicker {
    fn drop(&mut self) {
        if let Some((token, handle)) = self.task.get_mut().take() {
            token.cancel();
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view_state::DEFAULT_USER_NAME;
    use chrono::TimeZone;

    #[test]
    fn test_greeting_boundaries() {
        assert_eq!(Greeting::for_hour(0), Greeting::Morning);
        assert_eq!(Greeting::for_hour(11), Greeting::Morning);
        assert_eq!(Greeting::for_hour(12), Greeting::Afternoon);
        assert_eq!(Greeting::for_hour(18), Greeting::Afternoon);
        assert_eq!(Greeting::for_hour(19), Greeting::Evening);
        assert_eq!(Greeting::for_hour(23), Greeting::Evening);
    }

    #[test]
    fn test_greeting_uses_configured_offset() {
        // 10:30 UTC
        let instant = Utc.with_ymd_and_hms(2025, 6, 1, 10, 30, 0).unwrap();
        assert_eq!(
            Greeting::at(instant, Some(TimezoneConfig::from_hours(0))),
            Greeting::Morning
        );
        assert_eq!(
            Greeting::at(instant, Some(TimezoneConfig::from_hours(2))),
            Greeting::Afternoon
        );
        assert_eq!(
            Greeting::at(instant, Some(TimezoneConfig::from_minutes(9 * 60))),
            Greeting::Evening
        );
    }

    #[tokio::test]
    async fn test_ticker_mount_and_unmount() {
        let values = WatchedValues::new(DEFAULT_USER_NAME);
        let ticker = GreetingTicker::new(
            values.clone(),
            Duration::from_secs(60),
            Some(TimezoneConfig::from_hours(0)),
        );

        ticker.on_mount().await.unwrap();
        assert!(ticker.is_running());
        assert_eq!(values.snapshot().greeting, Greeting::now(Some(TimezoneConfig::from_hours(0))));

        // 重复启动不会产生第二个任务
        ticker.start();
        ticker.on_unmount().await.unwrap();
        assert!(!ticker.is_running());
    }
}
