use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use chatwire_core::error::{ChatwireError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub version: u32,

    #[serde(default)]
    pub endpoint: EndpointSection,

    #[serde(default)]
    pub heartbeat: HeartbeatSection,

    #[serde(default)]
    pub reconnect: ReconnectSection,

    #[serde(default)]
    pub storage: StorageSection,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            version: 1,
            endpoint: EndpointSection::default(),
            heartbeat: HeartbeatSection::default(),
            reconnect: ReconnectSection::default(),
            storage: StorageSection::default(),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(ChatwireError::UnsupportedVersion);
        }

        self.endpoint.validate()?;
        self.heartbeat.validate()?;
        self.reconnect.validate()?;
        self.storage.validate()?;

        Ok(())
    }
}

// --------------------
// endpoint
// --------------------
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointSection {
    /// Origin of the chat server (`http(s)://host[:port]` or `ws(s)://...`).
    #[serde(default = "default_origin")]
    pub origin: String,

    #[serde(default = "default_path")]
    pub path: String,

    /// Query parameter carrying the credential.
    #[serde(default = "default_token_param")]
    pub token_param: String,
}

impl Default for EndpointSection {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            path: default_path(),
            token_param: default_token_param(),
        }
    }
}

impl EndpointSection {
    pub fn validate(&self) -> Result<()> {
        self.base_url()?;
        if !self.path.starts_with('/') {
            return Err(ChatwireError::BadRequest(
                "endpoint.path must start with '/'".into(),
            ));
        }
        if self.token_param.trim().is_empty() {
            return Err(ChatwireError::BadRequest(
                "endpoint.token_param must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Origin with its scheme mapped to the WebSocket equivalent.
    fn base_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.origin)
            .map_err(|e| ChatwireError::BadRequest(format!("endpoint.origin invalid: {e}")))?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(ChatwireError::BadRequest(format!(
                    "endpoint.origin scheme not supported: {other}"
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|()| ChatwireError::BadRequest("endpoint.origin scheme rewrite failed".into()))?;
        Ok(url)
    }

    /// Full socket URL for one connection attempt.
    pub fn url_for(&self, credential: &str) -> Result<Url> {
        let mut url = self.base_url()?;
        url.set_path(&self.path);
        url.set_query(None);
        url.query_pairs_mut().append_pair(&self.token_param, credential);
        Ok(url)
    }
}

fn default_origin() -> String {
    "http://127.0.0.1:8080".into()
}
fn default_path() -> String {
    "/messenger/ws".into()
}
fn default_token_param() -> String {
    "token".into()
}

// --------------------
// heartbeat
// --------------------
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeartbeatSection {
    #[serde(default = "default_heartbeat_interval_ms")]
    pub interval_ms: u64,

    /// Watchdog window after each ping.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for HeartbeatSection {
    fn default() -> Self {
        Self {
            interval_ms: default_heartbeat_interval_ms(),
            timeout_ms: default_heartbeat_timeout_ms(),
        }
    }
}

impl HeartbeatSection {
    pub fn validate(&self) -> Result<()> {
        if !(1000..=300_000).contains(&self.interval_ms) {
            return Err(ChatwireError::BadRequest(
                "heartbeat.interval_ms must be between 1000 and 300000".into(),
            ));
        }
        if !(100..=60_000).contains(&self.timeout_ms) {
            return Err(ChatwireError::BadRequest(
                "heartbeat.timeout_ms must be between 100 and 60000".into(),
            ));
        }
        if self.timeout_ms >= self.interval_ms {
            return Err(ChatwireError::BadRequest(
                "heartbeat.timeout_ms must be less than interval_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}
fn default_heartbeat_timeout_ms() -> u64 {
    10_000
}

// --------------------
// reconnect
// --------------------
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectSection {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Upper bound for one handshake before it counts as a failed attempt.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl ReconnectSection {
    pub fn validate(&self) -> Result<()> {
        if !(10..=60_000).contains(&self.base_delay_ms) {
            return Err(ChatwireError::BadRequest(
                "reconnect.base_delay_ms must be between 10 and 60000".into(),
            ));
        }
        if self.max_delay_ms < self.base_delay_ms || self.max_delay_ms > 600_000 {
            return Err(ChatwireError::BadRequest(
                "reconnect.max_delay_ms must be between base_delay_ms and 600000".into(),
            ));
        }
        if !(100..=120_000).contains(&self.connect_timeout_ms) {
            return Err(ChatwireError::BadRequest(
                "reconnect.connect_timeout_ms must be between 100 and 120000".into(),
            ));
        }
        Ok(())
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}

// --------------------
// storage
// --------------------
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSection {
    /// Directory used by the file-backed store.
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_offline_queue_key")]
    pub offline_queue_key: String,

    #[serde(default = "default_active_room_key")]
    pub active_room_key: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
            offline_queue_key: default_offline_queue_key(),
            active_room_key: default_active_room_key(),
        }
    }
}

impl StorageSection {
    pub fn validate(&self) -> Result<()> {
        if self.offline_queue_key.is_empty() || self.active_room_key.is_empty() {
            return Err(ChatwireError::BadRequest(
                "storage keys must not be empty".into(),
            ));
        }
        if self.offline_queue_key == self.active_room_key {
            return Err(ChatwireError::BadRequest(
                "storage.offline_queue_key and storage.active_room_key must differ".into(),
            ));
        }
        Ok(())
    }
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from(".chatwire")
}
fn default_offline_queue_key() -> String {
    "chatwire.offline_queue".into()
}
fn default_active_room_key() -> String {
    "chatwire.active_room".into()
}
