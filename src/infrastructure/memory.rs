//! 内存存储后端
//!
//! 每个 item 的日志是按插入顺序的 `Vec`。时间戳不回退，所以插入顺序就是 `created_at` 顺序。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;

use super::clock::{Clock, MonotonicStamp, SystemClock};
use super::store::{rank_by_volume, GuessStore};
use crate::core::{Guess, ItemTally, SortOrder, Tally};
use crate::error::StoreResult;

#[derive(Default)]
struct Inner {
    logs: HashMap<String, Vec<Guess>>,
    tallies: HashMap<String, Tally>,
    stamp: MonotonicStamp,
}

pub struct MemoryGuessStore {
    inner: RwLock<Inner>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryGuessStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGuessStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            clock,
        }
    }

    /// 某 item 日志里当前保留的条数
    pub async fn retained(&self, item_id: &str) -> usize {
        self.inner
            .read()
            .await
            .logs
            .get(item_id)
            .map_or(0, |log| log.len())
    }
}

#[async_trait]
impl GuessStore for MemoryGuessStore {
    async fn insert(&self, item_id: &str, value_kg: f64) -> StoreResult<Guess> {
        let mut inner = self.inner.write().await;
        let created_at = inner.stamp.next(self.clock.now());
        let guess = Guess {
            item_id: item_id.to_string(),
            value_kg,
            created_at,
        };

        inner
            .logs
            .entry(item_id.to_string())
            .or_default()
            .push(guess.clone());
        inner
            .tallies
            .entry(item_id.to_string())
            .or_default()
            .record(value_kg);

        trace!(item_id, value_kg, "memory insert");
        Ok(guess)
    }

    async fn query_recent(
        &self,
        item_id: &str,
        skip: usize,
        limit: usize,
        order: SortOrder,
    ) -> StoreResult<Vec<Guess>> {
        let inner = self.inner.read().await;
        let Some(log) = inner.logs.get(item_id) else {
            return Ok(Vec::new());
        };

        let rows = match order {
            SortOrder::Descending => log.iter().rev().skip(skip).take(limit).cloned().collect(),
            SortOrder::Ascending => log.iter().skip(skip).take(limit).cloned().collect(),
        };
        Ok(rows)
    }

    async fn delete_older_than(&self, item_id: &str, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut inner = self.inner.write().await;
        let Some(log) = inner.logs.get_mut(item_id) else {
            return Ok(0);
        };

        let before = log.len();
        log.retain(|g| g.created_at >= cutoff);
        Ok((before - log.len()) as u64)
    }

    async fn count_and_average(&self, item_id: Option<&str>) -> StoreResult<Tally> {
        let inner = self.inner.read().await;
        let tally = match item_id {
            Some(id) => inner.tallies.get(id).copied().unwrap_or_default(),
            None => inner.tallies.values().fold(Tally::default(), |mut acc, t| {
                acc.merge(t);
                acc
            }),
        };
        Ok(tally)
    }

    async fn top_items_by_volume(&self, limit: usize) -> StoreResult<Vec<ItemTally>> {
        let inner = self.inner.read().await;
        let items = inner
            .tallies
            .iter()
            .map(|(item_id, tally)| ItemTally {
                item_id: item_id.clone(),
                tally: *tally,
            })
            .collect();
        Ok(rank_by_volume(items, limit))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
