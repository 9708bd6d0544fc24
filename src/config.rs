use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::{KEEP_N, TOP_ITEMS_LIMIT};
use crate::error::ConfigError;

/// submit 路径上的存储调用次数：insert、trim 两次、回读
const STORE_CALLS_PER_SUBMIT: u64 = 4;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub window: WindowConfig,
    pub stats: StatsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            request_timeout_secs: 45,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sled,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// sled 数据目录
    pub path: PathBuf,
    /// 猜测记录所在的 tree 名，tally 存在 `<collection>_tallies`
    pub collection: String,
    /// 单次存储操作的超时
    pub op_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sled,
            path: PathBuf::from("data/guess_the_weight"),
            collection: "submissions".to_string(),
            op_timeout_ms: 10_000,
        }
    }
}

impl StoreConfig {
    pub fn memory() -> Self {
        Self {
            backend: StoreBackend::Memory,
            ..Default::default()
        }
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WindowConfig {
    pub keep_n: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { keep_n: KEEP_N }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StatsConfig {
    pub top_items_limit: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            top_items_limit: TOP_ITEMS_LIMIT,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// tracing EnvFilter 语法，RUST_LOG 优先
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,tower_http=info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// 环境变量覆盖配置文件
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(self)
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("GUESS_BIND_ADDR") {
            self.server.bind_addr = addr;
        }
        if let Some(backend) = lookup("GUESS_STORE_BACKEND") {
            self.store.backend = match backend.trim().to_ascii_lowercase().as_str() {
                "sled" => StoreBackend::Sled,
                "memory" => StoreBackend::Memory,
                other => {
                    return Err(ConfigError::Invalid(format!(
                        "unknown store backend `{}`",
                        other
                    )))
                }
            };
        }
        if let Some(path) = lookup("GUESS_STORE_PATH") {
            self.store.path = PathBuf::from(path);
        }
        if let Some(collection) = lookup("GUESS_STORE_COLLECTION") {
            self.store.collection = collection;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.keep_n == 0 {
            return Err(ConfigError::Invalid("window.keep_n must be > 0".into()));
        }
        if self.store.collection.trim().is_empty() {
            return Err(ConfigError::Invalid("store.collection is empty".into()));
        }
        if self.store.op_timeout_ms == 0 {
            return Err(ConfigError::Invalid("store.op_timeout_ms must be > 0".into()));
        }
        // 一次 submit 最多串行 4 次存储调用，总时限要装得下
        let needed_ms = STORE_CALLS_PER_SUBMIT * self.store.op_timeout_ms;
        if self.server.request_timeout_secs.saturating_mul(1000) < needed_ms {
            return Err(ConfigError::Invalid(format!(
                "server.request_timeout_secs must cover {} store calls ({}ms)",
                STORE_CALLS_PER_SUBMIT, needed_ms
            )));
        }
        Ok(())
    }
}
