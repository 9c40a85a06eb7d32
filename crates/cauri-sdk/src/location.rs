//! 配送位置
//!
//! 挂载时获取设备坐标并反向地理编码，得到 "Livraison à {ville}, {pays}"、
//! 语言代码和国旗图标。任何失败都降级为固定文案，不阻塞挂载。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{CauriSDKError, Result};
use crate::events::{event_builders, EventManager};
use crate::lifecycle::LifecycleHook;
use crate::view_state::WatchedValues;

pub const DEFAULT_LANGUAGE_CODE: &str = "fr";
pub const LOCATION_DENIED: &str = "Accès à la localisation refusé";
pub const LOCATION_UNAVAILABLE: &str = "Impossible de détecter la localisation";

const FLAG_BASE_URL: &str = "https://flagcdn.com";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// 反向地理编码得到的地址（Nominatim `address` 字段子集）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub town: Option<String>,
    #[serde(default)]
    pub village: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
}

impl Address {
    /// city -> town -> village
    pub fn locality(&self) -> &str {
        [&self.city, &self.town, &self.village]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|s| !s.is_empty())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryLocation {
    pub label: String,
    pub language_code: String,
    pub flag_url: String,
}

impl DeliveryLocation {
    fn fallback(label: &str) -> Self {
        Self {
            label: label.to_string(),
            language_code: DEFAULT_LANGUAGE_CODE.to_string(),
            flag_url: flag_url(DEFAULT_LANGUAGE_CODE),
        }
    }

    pub fn denied() -> Self {
        Self::fallback(LOCATION_DENIED)
    }

    pub fn unavailable() -> Self {
        Self::fallback(LOCATION_UNAVAILABLE)
    }
}

pub fn flag_url(code: &str) -> String {
    format!("{}/{}.svg", FLAG_BASE_URL, code)
}

/// 地址 -> 展示文案
pub fn describe(address: &Address) -> DeliveryLocation {
    let country = address.country.as_deref().unwrap_or("");
    let code = address
        .country_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_lowercase)
        .unwrap_or_else(|| DEFAULT_LANGUAGE_CODE.to_string());

    DeliveryLocation {
        label: format!("Livraison à {}, {}", address.locality(), country),
        flag_url: flag_url(&code),
        language_code: code,
    }
}

/// 设备定位能力
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// 用户拒绝授权时返回 `PermissionDenied`
    async fn current_position(&self) -> Result<Coordinates>;
}

#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn reverse(&self, coordinates: Coordinates) -> Result<Address>;
}

/// 反向地理编码配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocoderConfig {
    pub base_url: String,
    pub user_agent: String,
    pub connect_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: format!("cauri-sdk/{}", crate::version::SDK_VERSION),
            connect_timeout_secs: Some(10),
            request_timeout_secs: Some(15),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    address: Option<Address>,
}

/// Nominatim JSON 接口
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocoderConfig) -> Result<Self> {
        let mut builder = Client::builder().user_agent(config.user_agent.clone());

        if let Some(timeout) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(timeout));
        }

        if let Some(timeout) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        let client = builder
            .build()
            .map_err(|e| CauriSDKError::Config(format!("创建 HTTP 客户端失败: {}", e)))?;

        info!("✅ 地理编码客户端已创建 (base_url: {})", config.base_url);

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn reverse_url(&self) -> String {
        format!("{}/reverse", self.base_url)
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    async fn reverse(&self, coordinates: Coordinates) -> Result<Address> {
        let response = self
            .client
            .get(self.reverse_url())
            .query(&[
                ("format", "json".to_string()),
                ("lat", coordinates.latitude.to_string()),
                ("lon", coordinates.longitude.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body: ReverseResponse = response.json().await?;
        body.address
            .ok_or_else(|| CauriSDKError::InvalidData("reverse geocoding returned no address".to_string()))
    }
}

/// 定位 + 反向编码，失败时降级
pub async fn resolve_delivery_location(
    provider: &dyn LocationProvider,
    geocoder: &dyn ReverseGeocoder,
) -> DeliveryLocation {
    let coordinates = match provider.current_position().await {
        Ok(coordinates) => coordinates,
        Err(CauriSDKError::PermissionDenied(reason)) => {
            info!("定位权限被拒绝: {}", reason);
            return DeliveryLocation::denied();
        }
        Err(e) => {
            warn!("获取定位失败: {}", e);
            return DeliveryLocation::unavailable();
        }
    };

    match geocoder.reverse(coordinates).await {
        Ok(address) => describe(&address),
        Err(e) => {
            warn!("反向地理编码失败: {}", e);
            DeliveryLocation::unavailable()
        }
    }
}

/// 挂载时后台解析配送位置，卸载时取消
pub struct LocationHook {
    provider: Arc<dyn LocationProvider>,
    geocoder: Arc<dyn ReverseGeocoder>,
    values: WatchedValues,
    events: Arc<EventManager>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LocationHook {
    pub fn new(
        provider: Arc<dyn LocationProvider>,
        geocoder: Arc<dyn ReverseGeocoder>,
        values: WatchedValues,
        events: Arc<EventManager>,
    ) -> Self {
        Self {
            provider,
            geocoder,
            values,
            events,
            task: Mutex::new(None),
        }
    }
}

#[async_trait]
impl LifecycleHook for LocationHook {
    fn name(&self) -> &'static str {
        "location"
    }

    async fn on_mount(&self) -> Result<()> {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(());
        }

        let provider = self.provider.clone();
        let geocoder = self.geocoder.clone();
        let values = self.values.clone();
        let events = self.events.clone();
        *task = Some(tokio::spawn(async move {
            let location =
                resolve_delivery_location(provider.as_ref(), geocoder.as_ref()).await;
            debug!("配送位置: {}", location.label);
            events.emit(event_builders::location_resolved(
                &location.label,
                &location.language_code,
            ));
            values.update(|state| state.location = Some(location));
        }));
        Ok(())
    }

    async fn on_unmount(&self) -> Result<()> {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
        Ok(())
    }
}

impl Drop for LocationHook {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}
