//! 存储抽象
//!
//! 每个 item 一条按 `(item_id, created_at)` 排序的追加日志，外加一份不裁剪的累计 tally。
//! 窗口裁剪只删日志，tally 保留全量历史给全局统计用。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::{Guess, ItemTally, SortOrder, Tally};
use crate::error::StoreResult;

#[async_trait]
pub trait GuessStore: Send + Sync {
    /// 追加一条猜测并原子地累加 tally
    ///
    /// `created_at` 由 store 分配，同一实例内不回退；返回时已落盘。
    async fn insert(&self, item_id: &str, value_kg: f64) -> StoreResult<Guess>;

    /// 按 `created_at` 读取某 item 的猜测
    ///
    /// 时间戳相同按插入顺序；先 skip 再 limit。
    async fn query_recent(
        &self,
        item_id: &str,
        skip: usize,
        limit: usize,
        order: SortOrder,
    ) -> StoreResult<Vec<Guess>>;

    /// 删除 `created_at` 严格早于 `cutoff` 的记录，返回删除条数，不动 tally
    async fn delete_older_than(&self, item_id: &str, cutoff: DateTime<Utc>) -> StoreResult<u64>;

    /// 单个 item 的全量计数/总和；`None` 则汇总所有 item
    async fn count_and_average(&self, item_id: Option<&str>) -> StoreResult<Tally>;

    /// 按提交量降序，数量相同按 item id 升序
    async fn top_items_by_volume(&self, limit: usize) -> StoreResult<Vec<ItemTally>>;

    fn backend_name(&self) -> &'static str;
}

/// 各后端共用的排序
pub(crate) fn rank_by_volume(mut items: Vec<ItemTally>, limit: usize) -> Vec<ItemTally> {
    items.sort_by(|a, b| {
        b.tally
            .count
            .cmp(&a.tally.count)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
    items.truncate(limit);
    items
}
