use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

/// Namespace of the durable record holding the credential pair.
pub const TOKEN_NAMESPACE: &str = "ocr-platform.tokens";
/// Namespace of the durable record holding the cached user profile.
pub const PROFILE_NAMESPACE: &str = "ocr-platform.profile";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub api_base_url: String,
    pub database_url: String,
    pub loglevel: String,
    pub proxy: Option<Url>,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub user_agent: String,
    pub email: Option<String>,
    pub password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            database_url: "sqlite://ocr-client.sqlite".to_string(),
            loglevel: "info".to_string(),
            proxy: None,
            connect_timeout_secs: 5,
            request_timeout_secs: 30,
            poll_interval_ms: 3000,
            user_agent: concat!("ocr-client/", env!("CARGO_PKG_VERSION")).to_string(),
            email: None,
            password: None,
        }
    }
}

impl Config {
    /// Defaults, then `config.toml`, then `OCR_*` environment variables.
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("config.toml"))
            .merge(Env::prefixed("OCR_"))
    }

    /// Base URL with trailing slashes removed and `/api` appended once.
    pub fn api_root(&self) -> String {
        let trimmed = self.api_base_url.trim().trim_end_matches('/');
        if trimmed.ends_with("/api") {
            trimmed.to_string()
        } else {
            format!("{trimmed}/api")
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

pub static CONFIG: LazyLock<Config> = LazyLock::new(|| {
    Config::load().unwrap_or_else(|e| panic!("FATAL: invalid configuration: {e}"))
});
