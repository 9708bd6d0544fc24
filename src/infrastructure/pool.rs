use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{error, info};

use super::memory::MemoryGuessStore;
use super::sled_store::SledGuessStore;
use super::store::GuessStore;
use crate::config::{StoreBackend, StoreConfig};
use crate::error::{StoreError, StoreResult};

/// 进程级存储句柄
///
/// 第一次 `acquire` 时按配置打开后端，之后所有请求共享同一个 `Arc`。
/// 打开失败不会被缓存，下一个请求会重试。请求结束时 drop 掉 `Arc` 即释放。
pub struct StoreHandle {
    config: StoreConfig,
    cell: OnceCell<Arc<dyn GuessStore>>,
}

impl StoreHandle {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            cell: OnceCell::new(),
        }
    }

    /// 直接注入一个已经打开的 store (测试用)
    pub fn with_store(config: StoreConfig, store: Arc<dyn GuessStore>) -> Self {
        Self {
            config,
            cell: OnceCell::new_with(Some(store)),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.cell.initialized()
    }

    pub async fn acquire(&self) -> StoreResult<Arc<dyn GuessStore>> {
        let store = self
            .cell
            .get_or_try_init(|| open_store(self.config.clone()))
            .await?;
        Ok(store.clone())
    }
}

async fn open_store(config: StoreConfig) -> StoreResult<Arc<dyn GuessStore>> {
    match config.backend {
        StoreBackend::Memory => {
            info!("💾 [Store] Using in-memory guess store");
            Ok(Arc::new(MemoryGuessStore::new()))
        }
        StoreBackend::Sled => {
            // sled 打开是阻塞 IO
            let path = config.path.clone();
            let collection = config.collection.clone();
            let opened =
                tokio::task::spawn_blocking(move || SledGuessStore::open(path, &collection))
                    .await
                    .map_err(|e| StoreError::Unavailable {
                        message: format!("store open task failed: {}", e),
                    })?;

            match opened {
                Ok(store) => Ok(Arc::new(store)),
                Err(e) => {
                    error!("❌ [Store] Failed to open sled store: {}", e);
                    Err(e)
                }
            }
        }
    }
}
