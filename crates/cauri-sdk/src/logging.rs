//! 日志初始化
//!
//! 宿主应用通常自带 subscriber；这里只在没有全局 subscriber 时安装一个 fmt 输出。

use tracing::Level;

use crate::config::CauriConfig;

/// 安装 fmt subscriber，重复调用或宿主已安装时返回 false
pub fn init_logging(config: &CauriConfig) -> bool {
    let level = if config.debug_mode {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let installed = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("日志已初始化 (level={}) {}", level, crate::version::version_line());
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        let config = CauriConfig::builder().debug_mode(true).build();
        init_logging(&config);
        assert!(!init_logging(&config));
    }
}
