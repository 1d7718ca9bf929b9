use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::AppCore;

const DEFAULT_API_URL: &str = "https://api.stride.app";
const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;
const DEFAULT_HISTORY_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(super) struct AppConfig {
    pub(super) disable_network: Option<bool>,
    pub(super) api_base_url: Option<String>,
    pub(super) poll_interval_ms: Option<u64>,
    pub(super) history_page_size: Option<u32>,
}

pub(super) fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join("stride_config.json");
    let Ok(bytes) = std::fs::read(&path) else {
        return AppConfig::default();
    };
    serde_json::from_slice::<AppConfig>(&bytes).unwrap_or_default()
}

impl AppConfig {
    pub(super) fn resolved_api_base_url(&self) -> String {
        if let Some(url) = &self.api_base_url {
            if !url.is_empty() {
                return url.clone();
            }
        }
        if let Ok(url) = std::env::var("STRIDE_API_URL") {
            if !url.is_empty() {
                return url;
            }
        }
        DEFAULT_API_URL.to_string()
    }
}

impl AppCore {
    pub(super) fn network_enabled(&self) -> bool {
        // Used to keep Rust tests deterministic and offline.
        if let Some(disable) = self.config.disable_network {
            return !disable;
        }
        std::env::var("STRIDE_DISABLE_NETWORK").ok().as_deref() != Some("1")
    }

    pub(super) fn poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.config
                .poll_interval_ms
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS)
                .max(250),
        )
    }

    pub(super) fn history_page_size(&self) -> u32 {
        self.config
            .history_page_size
            .unwrap_or(DEFAULT_HISTORY_PAGE_SIZE)
    }
}
