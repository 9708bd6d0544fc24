use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::core::{Guess, Histogram, ItemTally, SortOrder, StatSummary, Tally};
use crate::error::{AggregationError, StoreError, StoreResult};
use crate::infrastructure::{GuessStore, StoreHandle};
use crate::math::histogram::{build_display_histogram, build_histogram, DisplayHistogram};
use crate::math::summary::summarize;
use crate::model::validation::{validate, SubmitBody};
use crate::model::window::RollingWindowManager;

/// 窗口内一条回显记录
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentGuess {
    pub guess_kg: f64,
    pub created_at: DateTime<Utc>,
}

impl From<Guess> for RecentGuess {
    fn from(g: Guess) -> Self {
        Self {
            guess_kg: g.value_kg,
            created_at: g.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub item_id: String,
    /// 入库后的值 (已夹紧、保留两位)
    pub guess_kg: f64,
    /// 最新在前，最多 keep_n 条
    pub recent: Vec<RecentGuess>,
    pub histogram: Histogram,
    pub stats: StatSummary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalStats {
    pub overall: Tally,
    pub per_item: Vec<ItemTally>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemDistribution {
    pub item_id: String,
    pub n: usize,
    pub display: DisplayHistogram,
}

/// 聚合服务：写路径 submit_guess，读路径 fetch_global_stats / item_distribution
///
/// 每次存储调用都带超时，超时只让当前请求失败。
pub struct Aggregator {
    store: StoreHandle,
    window: RollingWindowManager,
    top_items_limit: usize,
    op_timeout: Duration,
}

impl Aggregator {
    pub fn new(store: StoreHandle, window: RollingWindowManager, top_items_limit: usize) -> Self {
        let op_timeout = store.config().op_timeout();
        Self {
            store,
            window,
            top_items_limit,
            op_timeout,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            StoreHandle::new(config.store.clone()),
            RollingWindowManager::new(config.window.keep_n),
            config.stats.top_items_limit,
        )
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                operation,
                duration_ms: self.op_timeout.as_millis() as u64,
            }),
        }
    }

    async fn acquire(&self) -> StoreResult<std::sync::Arc<dyn GuessStore>> {
        self.bounded("acquire", self.store.acquire()).await
    }

    async fn read_window(&self, store: &dyn GuessStore, item_id: &str) -> StoreResult<Vec<Guess>> {
        self.bounded(
            "query_recent",
            store.query_recent(item_id, 0, self.window.keep_n(), SortOrder::Descending),
        )
        .await
    }

    pub async fn submit_guess(&self, body: &SubmitBody) -> Result<SubmitOutcome, AggregationError> {
        // 1. 校验失败直接返回，不碰存储
        let guess = validate(body)?;
        let store = self.acquire().await?;

        // 2. 写入是关键路径，失败则整个请求失败
        let inserted = self
            .bounded("insert", store.insert(&guess.item_id, guess.value_kg))
            .await?;
        debug!(
            item_id = %inserted.item_id,
            guess_kg = inserted.value_kg,
            "📥 [Submit] guess stored"
        );

        // 3. 裁剪是尽力而为，失败只记日志
        match self
            .bounded("trim", self.window.trim(store.as_ref(), &guess.item_id))
            .await
        {
            Ok(outcome) if outcome.evicted > 0 => {
                debug!(item_id = %guess.item_id, evicted = outcome.evicted, "🧹 [Submit] window trimmed");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(item_id = %guess.item_id, error = %e, "⚠️ [Submit] window trim failed, keeping insert");
            }
        }

        // 4. 回读窗口并计算统计
        let window = self.read_window(store.as_ref(), &guess.item_id).await?;
        let values: Vec<f64> = window.iter().map(|g| g.value_kg).collect();
        let histogram = build_histogram(&values);
        let stats = summarize(&values, guess.value_kg);

        Ok(SubmitOutcome {
            item_id: guess.item_id,
            guess_kg: guess.value_kg,
            recent: window.into_iter().map(RecentGuess::from).collect(),
            histogram,
            stats,
        })
    }

    pub async fn fetch_global_stats(&self) -> Result<GlobalStats, AggregationError> {
        let store = self.acquire().await?;
        let overall = self
            .bounded("count_and_average", store.count_and_average(None))
            .await?;
        let per_item = self
            .bounded(
                "top_items_by_volume",
                store.top_items_by_volume(self.top_items_limit),
            )
            .await?;

        info!(
            total = overall.count,
            items = per_item.len(),
            "📊 [Stats] global stats served"
        );
        Ok(GlobalStats { overall, per_item })
    }

    pub async fn item_distribution(&self, item_id: &str) -> Result<ItemDistribution, AggregationError> {
        let item_id = item_id.trim();
        if item_id.is_empty() {
            return Err(crate::error::ValidationError::EmptyItemId.into());
        }

        let store = self.acquire().await?;
        let window = self.read_window(store.as_ref(), item_id).await?;
        let values: Vec<f64> = window.iter().map(|g| g.value_kg).collect();

        Ok(ItemDistribution {
            item_id: item_id.to_string(),
            n: values.len(),
            display: build_display_histogram(&values),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::error::ValidationError;
    use crate::infrastructure::{ManualClock, MemoryGuessStore};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::sync::Arc;

    fn aggregator_with(store: Arc<dyn GuessStore>, keep_n: usize) -> Aggregator {
        Aggregator::new(
            StoreHandle::with_store(StoreConfig::memory(), store),
            RollingWindowManager::new(keep_n),
            50,
        )
    }

    fn clocked() -> (Arc<MemoryGuessStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap(),
        ));
        (Arc::new(MemoryGuessStore::with_clock(clock.clone())), clock)
    }

    #[tokio::test]
    async fn submit_returns_window_histogram_and_stats() {
        let (store, clock) = clocked();
        let agg = aggregator_with(store.clone(), 100);

        for v in [10.0, 30.0] {
            agg.submit_guess(&SubmitBody::new("bear", v)).await.unwrap();
            clock.advance(ChronoDuration::seconds(1));
        }
        let out = agg.submit_guess(&SubmitBody::new("bear", 20.0)).await.unwrap();

        assert_eq!(out.item_id, "bear");
        assert_eq!(out.recent.len(), 3);
        assert_eq!(out.recent[0].guess_kg, 20.0);
        assert_eq!(out.histogram.buckets[0].count, 3);
        assert_eq!(out.stats.mean_kg, 20.0);
        assert_eq!(out.stats.sd_kg, 8.16);
        assert_eq!(out.stats.z_score, Some(0.0));
    }

    #[tokio::test]
    async fn clamped_value_flows_into_stats() {
        let (store, _) = clocked();
        let agg = aggregator_with(store, 100);

        let low = agg.submit_guess(&SubmitBody::new("feather", -5.0)).await.unwrap();
        assert_eq!(low.guess_kg, 0.5);
        assert_eq!(low.recent[0].guess_kg, 0.5);
        assert_eq!(low.stats.mean_kg, 0.5);

        let high = agg.submit_guess(&SubmitBody::new("whale", 5000.0)).await.unwrap();
        assert_eq!(high.guess_kg, 1000.0);
        assert_eq!(high.histogram.buckets[19].count, 1);
    }

    #[tokio::test]
    async fn invalid_submission_does_not_touch_store() {
        let (store, _) = clocked();
        let agg = aggregator_with(store.clone(), 100);

        let err = agg.submit_guess(&SubmitBody::new("   ", 10.0)).await.unwrap_err();
        assert!(matches!(
            err,
            AggregationError::Validation(ValidationError::EmptyItemId)
        ));
        assert_eq!(store.count_and_average(None).await.unwrap().count, 0);
    }

    #[tokio::test]
    async fn window_is_bounded_but_global_stats_are_not() {
        let (store, clock) = clocked();
        let agg = aggregator_with(store.clone(), 100);

        let mut last = None;
        for i in 0..150 {
            let out = agg
                .submit_guess(&SubmitBody::new("piano", 200.0 + i as f64))
                .await
                .unwrap();
            assert!(out.recent.len() <= 100);
            assert!(out
                .recent
                .windows(2)
                .all(|w| w[0].created_at >= w[1].created_at));
            clock.advance(ChronoDuration::milliseconds(3));
            last = Some(out);
        }

        assert_eq!(last.unwrap().recent.len(), 100);
        let global = agg.fetch_global_stats().await.unwrap();
        assert_eq!(global.overall.count, 150);
        assert_eq!(global.per_item[0].item_id, "piano");
        assert_eq!(global.per_item[0].tally.count, 150);
    }

    #[tokio::test]
    async fn empty_store_global_stats() {
        let agg = aggregator_with(Arc::new(MemoryGuessStore::new()), 100);
        let global = agg.fetch_global_stats().await.unwrap();
        assert_eq!(global.overall, Tally::default());
        assert_eq!(global.overall.average(), 0.0);
        assert!(global.per_item.is_empty());
    }

    #[tokio::test]
    async fn distribution_uses_display_bins() {
        let agg = aggregator_with(Arc::new(MemoryGuessStore::new()), 100);
        for v in [5.0, 5.0, 900.0] {
            agg.submit_guess(&SubmitBody::new("horse", v)).await.unwrap();
        }
        let dist = agg.item_distribution(" horse ").await.unwrap();
        assert_eq!(dist.item_id, "horse");
        assert_eq!(dist.n, 3);
        assert_eq!(dist.display.total, 3);
        assert_eq!(dist.display.non_empty().len(), 2);
    }

    /// 写入成功、删除永远失败的 store
    struct BrokenTrimStore {
        inner: MemoryGuessStore,
    }

    #[async_trait]
    impl GuessStore for BrokenTrimStore {
        async fn insert(&self, item_id: &str, value_kg: f64) -> StoreResult<Guess> {
            self.inner.insert(item_id, value_kg).await
        }

        async fn query_recent(
            &self,
            item_id: &str,
            skip: usize,
            limit: usize,
            order: SortOrder,
        ) -> StoreResult<Vec<Guess>> {
            self.inner.query_recent(item_id, skip, limit, order).await
        }

        async fn delete_older_than(&self, _: &str, _: DateTime<Utc>) -> StoreResult<u64> {
            Err(StoreError::Unavailable {
                message: "delete refused".into(),
            })
        }

        async fn count_and_average(&self, item_id: Option<&str>) -> StoreResult<Tally> {
            self.inner.count_and_average(item_id).await
        }

        async fn top_items_by_volume(&self, limit: usize) -> StoreResult<Vec<ItemTally>> {
            self.inner.top_items_by_volume(limit).await
        }

        fn backend_name(&self) -> &'static str {
            "broken-trim"
        }
    }

    #[tokio::test]
    async fn trim_failure_keeps_the_insert() {
        let store = Arc::new(BrokenTrimStore {
            inner: MemoryGuessStore::new(),
        });
        let agg = aggregator_with(store.clone(), 1);

        agg.submit_guess(&SubmitBody::new("rock", 1.0)).await.unwrap();
        let out = agg.submit_guess(&SubmitBody::new("rock", 2.0)).await.unwrap();

        assert_eq!(out.recent.len(), 1);
        assert_eq!(out.recent[0].guess_kg, 2.0);
        assert_eq!(store.count_and_average(None).await.unwrap().count, 2);
    }

    /// 每个操作都卡住的 store
    struct StalledStore;

    #[async_trait]
    impl GuessStore for StalledStore {
        async fn insert(&self, _: &str, _: f64) -> StoreResult<Guess> {
            std::future::pending().await
        }

        async fn query_recent(&self, _: &str, _: usize, _: usize, _: SortOrder) -> StoreResult<Vec<Guess>> {
            std::future::pending().await
        }

        async fn delete_older_than(&self, _: &str, _: DateTime<Utc>) -> StoreResult<u64> {
            std::future::pending().await
        }

        async fn count_and_average(&self, _: Option<&str>) -> StoreResult<Tally> {
            std::future::pending().await
        }

        async fn top_items_by_volume(&self, _: usize) -> StoreResult<Vec<ItemTally>> {
            std::future::pending().await
        }

        fn backend_name(&self) -> &'static str {
            "stalled"
        }
    }

    #[tokio::test]
    async fn stalled_store_times_out() {
        let config = StoreConfig {
            op_timeout_ms: 20,
            ..StoreConfig::memory()
        };
        let agg = Aggregator::new(
            StoreHandle::with_store(config, Arc::new(StalledStore)),
            RollingWindowManager::default(),
            50,
        );

        let err = agg.submit_guess(&SubmitBody::new("cloud", 3.0)).await.unwrap_err();
        assert!(matches!(
            err,
            AggregationError::Store(StoreError::Timeout { operation: "insert", .. })
        ));

        let err = agg.fetch_global_stats().await.unwrap_err();
        assert!(matches!(err, AggregationError::Store(ref e) if e.is_connectivity()));
    }
}
