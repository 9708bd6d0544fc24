use chrono::{DateTime, Utc};
use tracing::debug;

use crate::core::{SortOrder, KEEP_N};
use crate::error::StoreResult;
use crate::infrastructure::GuessStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimOutcome {
    /// 超出窗口的最新一条记录的时间戳，没有超量时为 None
    pub cutoff: Option<DateTime<Utc>>,
    pub evicted: u64,
}

/// 每个 item 只保留最近 N 条猜测 (FIFO)
///
/// 不做全量计数：按时间倒序跳过 N 条再取 1 条作为 cutoff，
/// 然后删除严格早于 cutoff 的记录。和 cutoff 时间戳相同的记录全部保留，
/// 所以时间戳冲突时窗口可能短暂多于 N 条。删除按时间谓词执行，
/// 并发重复执行是幂等的。
#[derive(Debug, Clone, Copy)]
pub struct RollingWindowManager {
    keep_n: usize,
}

impl Default for RollingWindowManager {
    fn default() -> Self {
        Self::new(KEEP_N)
    }
}

impl RollingWindowManager {
    pub fn new(keep_n: usize) -> Self {
        Self { keep_n }
    }

    pub fn keep_n(&self) -> usize {
        self.keep_n
    }

    pub async fn trim(&self, store: &dyn GuessStore, item_id: &str) -> StoreResult<TrimOutcome> {
        // 1. 找 cutoff：倒序第 keep_n 条之后的那一条 (即超出窗口的最新一条)
        let cutoff = store
            .query_recent(item_id, self.keep_n, 1, SortOrder::Descending)
            .await?;

        let Some(cutoff) = cutoff.into_iter().next() else {
            return Ok(TrimOutcome {
                cutoff: None,
                evicted: 0,
            });
        };

        // 2. 批量删除更早的记录
        let evicted = store
            .delete_older_than(item_id, cutoff.created_at)
            .await?;

        debug!(
            item_id,
            keep_n = self.keep_n,
            cutoff = %cutoff.created_at,
            evicted,
            "window trimmed"
        );

        Ok(TrimOutcome {
            cutoff: Some(cutoff.created_at),
            evicted,
        })
    }
}
