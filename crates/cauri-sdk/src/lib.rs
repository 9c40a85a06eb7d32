//! CauriM SDK - 商城客户端核心
//!
//! 提供商城首页所需的客户端逻辑：
//! - 🔄 实时视图状态：用户名、钱包余额、购物车数量、公告
//! - 🔐 会话隔离：每个会话的订阅在会话切换时全部关闭
//! - 💰 入账通知：余额增加时触发一次本地通知
//! - 📱 登录/注册：邮箱密码与手机短信验证码两条路径
//! - 📍 配送位置：定位 + 反向地理编码
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cauri_sdk::{CauriConfig, CauriSDK, CauriServices};
//! use cauri_sdk::identity::MemoryIdentityProvider;
//! use cauri_sdk::notification::MemoryNotificationSurface;
//! use cauri_sdk::record_store::MemoryRecordStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CauriConfig::builder()
//!         .data_dir("/path/to/data")
//!         .timezone_hours(0)
//!         .build();
//!
//!     let sdk = CauriSDK::initialize(config, CauriServices {
//!         identity: Arc::new(MemoryIdentityProvider::default()),
//!         store: Arc::new(MemoryRecordStore::new()),
//!         notifications: Arc::new(MemoryNotificationSurface::granted()),
//!         location: None,
//!         geocoder: None,
//!     }).await?;
//!
//!     sdk.mount().await?;
//!
//!     let mut flow = sdk.sign_in_flow();
//!     flow.submit_identifier("awa@example.com").await?;
//!     flow.submit_password("secret1").await?;
//!
//!     let state = sdk.snapshot();
//!     println!("{} {}", state.greeting_line(), state.wallet_label());
//!
//!     sdk.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod greeting;
pub mod identity;
pub mod lifecycle;
pub mod location;
pub mod logging;
pub mod notification;
pub mod record_store;
pub mod sdk;
pub mod session;
pub mod session_sync;
pub mod storage;
pub mod subscription;
pub mod version;
pub mod view_state;

pub use config::{CauriConfig, CauriConfigBuilder, EventConfig};
pub use error::{CauriSDKError, Result, ValidationError};
pub use events::{EventManager, SDKEvent};
pub use sdk::{CauriSDK, CauriServices};
pub use session::Session;
pub use version::SDK_VERSION;
pub use view_state::ViewState;
