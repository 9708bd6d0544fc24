use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 猜测值下限 (kg)
pub const MIN_KG: f64 = 0.5;
/// 猜测值上限 (kg)
pub const MAX_KG: f64 = 1000.0;
/// 汇总直方图的桶宽 (kg)
pub const BUCKET_KG: u32 = 50;
/// 每个 item 保留的最近猜测条数
pub const KEEP_N: usize = 100;
/// /stats 返回的 item 排行上限
pub const TOP_ITEMS_LIMIT: usize = 50;

// 1. 单条猜测记录 (存储层拥有，创建后不可变)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guess {
    pub item_id: String,
    pub value_kg: f64,
    pub created_at: DateTime<Utc>,
}

// 2. 排序方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

// 3. 计数/均值聚合 (全量历史，不受窗口裁剪影响)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Tally {
    pub count: u64,
    pub sum_kg: f64,
}

impl Tally {
    pub fn record(&mut self, value_kg: f64) {
        self.count += 1;
        self.sum_kg += value_kg;
    }

    pub fn merge(&mut self, other: &Tally) {
        self.count += other.count;
        self.sum_kg += other.sum_kg;
    }

    /// 空聚合的均值按 0 处理
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum_kg / self.count as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemTally {
    pub item_id: String,
    pub tally: Tally,
}

// 4. 汇总直方图的一个桶
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub start_kg: u32,
    pub end_kg: u32,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Histogram {
    pub bucket_kg: u32,
    pub buckets: Vec<Bucket>,
}

// 5. 均值/标准差/z-score 摘要
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatSummary {
    pub n: usize,
    pub mean_kg: f64,
    pub sd_kg: f64,
    pub z_score: Option<f64>,
    pub z_abs: Option<f64>,
}

impl StatSummary {
    pub fn empty() -> Self {
        Self {
            n: 0,
            mean_kg: 0.0,
            sd_kg: 0.0,
            z_score: None,
            z_abs: None,
        }
    }
}
