//! 首页演示：手机号注册 → 余额变化 → 入账通知 → 登出
//!
//! 运行: cargo run --example storefront_demo

use std::sync::Arc;
use std::time::Duration;

use cauri_sdk::identity::MemoryIdentityProvider;
use cauri_sdk::logging::init_logging;
use cauri_sdk::notification::MemoryNotificationSurface;
use cauri_sdk::record_store::{paths, MemoryRecordStore, RecordStore};
use cauri_sdk::{CauriConfig, CauriSDK, CauriServices};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let data_dir = std::env::temp_dir().join("cauri-demo");
    let config = CauriConfig::builder()
        .data_dir(&data_dir)
        .anti_automation_difficulty(8)
        .debug_mode(true)
        .build();
    init_logging(&config);

    let identity = MemoryIdentityProvider::new(8);
    let store = MemoryRecordStore::new();
    let notifications = Arc::new(MemoryNotificationSurface::granted());

    let sdk = CauriSDK::initialize(
        config,
        CauriServices {
            identity: Arc::new(identity.clone()),
            store: Arc::new(store.clone()),
            notifications: notifications.clone(),
            location: None,
            geocoder: None,
        },
    )
    .await?;

    store
        .set_document(
            &paths::announcement()?,
            json!({"text": "Livraison gratuite ce week-end"})
                .as_object()
                .cloned()
                .unwrap_or_default(),
        )
        .await?;

    sdk.mount().await?;

    let phone = "+225 07 00 00 00 01";
    let mut flow = sdk.sign_up_flow();
    flow.send_code(phone).await?;
    let code = identity
        .last_issued_code("+2250700000001")
        .ok_or("验证码未发出")?;
    let session = flow.verify_code(&code, "Awa", "Koné").await?;
    println!("注册成功: {}", session.uid);

    let earnings = paths::user_earnings(&session.uid)?;
    for amount in [0, 2500, 2500, 7000] {
        store
            .set_document(&earnings, json!({"amount": amount}).as_object().cloned().unwrap_or_default())
            .await?;
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let state = sdk.snapshot();
    println!("{}", state.greeting_line());
    println!("余额: {}", state.wallet_label());
    println!("公告: {}", state.announcement.as_deref().unwrap_or(cauri_sdk::view_state::ANNOUNCEMENTS_LOADING));
    for notification in notifications.shown() {
        println!("通知: {} / {}", notification.title, notification.body);
    }

    sdk.sign_out().await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("登出后余额: {}", sdk.snapshot().wallet_label());

    sdk.shutdown().await?;
    Ok(())
}
