//! JSON 报文结构，字段名与前端保持一致

use serde::Serialize;

use crate::core::{Histogram, StatSummary, Tally};
use crate::engine::{GlobalStats, ItemDistribution, RecentGuess, SubmitOutcome};
use crate::math::histogram::{DisplayBin, DisplayHistogram};

pub const INVALID_SUBMISSION: &str = "Invalid submission.";
pub const SERVICE_UNAVAILABLE: &str = "Service unavailable.";

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub ok: bool,
    pub recent: Vec<RecentGuess>,
    pub histogram: Histogram,
    pub stats: StatSummary,
}

impl From<SubmitOutcome> for SubmitResponse {
    fn from(out: SubmitOutcome) -> Self {
        Self {
            ok: true,
            recent: out.recent,
            histogram: out.histogram,
            stats: out.stats,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub ok: bool,
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
    pub count: u64,
    pub avg_guess_kg: f64,
}

impl From<Tally> for OverallStats {
    fn from(t: Tally) -> Self {
        Self {
            count: t.count,
            avg_guess_kg: t.average(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemStats {
    #[serde(rename = "_id")]
    pub id: String,
    pub count: u64,
    pub avg_guess_kg: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub overall: OverallStats,
    pub per_item: Vec<ItemStats>,
}

impl From<GlobalStats> for StatsResponse {
    fn from(stats: GlobalStats) -> Self {
        Self {
            overall: stats.overall.into(),
            per_item: stats
                .per_item
                .into_iter()
                .map(|item| ItemStats {
                    id: item.item_id,
                    count: item.tally.count,
                    avg_guess_kg: item.tally.average(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionResponse {
    #[serde(rename = "itemID")]
    pub item_id: String,
    pub n: usize,
    pub bin_kg: f64,
    pub max_count: u32,
    pub total: u32,
    pub bins: Vec<DisplayBin>,
}

impl From<ItemDistribution> for DistributionResponse {
    fn from(dist: ItemDistribution) -> Self {
        Self {
            item_id: dist.item_id,
            n: dist.n,
            bin_kg: DisplayHistogram::bin_kg(),
            max_count: dist.display.max_count,
            total: dist.display.total,
            bins: dist.display.non_empty(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub backend: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ItemTally;
    use serde_json::json;

    #[test]
    fn empty_stats_shape() {
        let body = StatsResponse::from(GlobalStats {
            overall: Tally::default(),
            per_item: vec![],
        });
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"overall": {"count": 0, "avgGuessKg": 0.0}, "perItem": []})
        );
    }

    #[test]
    fn per_item_uses_underscore_id() {
        let body = StatsResponse::from(GlobalStats {
            overall: Tally { count: 2, sum_kg: 30.0 },
            per_item: vec![ItemTally {
                item_id: "anvil".into(),
                tally: Tally { count: 2, sum_kg: 30.0 },
            }],
        });
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["perItem"][0]["_id"], "anvil");
        assert_eq!(v["perItem"][0]["avgGuessKg"], 15.0);
        assert_eq!(v["overall"]["count"], 2);
    }

    #[test]
    fn error_body_shape() {
        let v = serde_json::to_value(ErrorBody::new(INVALID_SUBMISSION)).unwrap();
        assert_eq!(v, json!({"ok": false, "error": "Invalid submission."}));
    }
}
