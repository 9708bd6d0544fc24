//! 两套固定分桶直方图
//!
//! `build_histogram` 是 /submit 返回的汇总直方图：[0, 1000) 上 20 个 50kg 桶，
//! 空桶也输出。`build_display_histogram` 给前端图表用：[1, 1000] 上 100 个 bin，
//! 渲染时只画非空 bin。两者服务不同的消费方，域和桶数都不能合并。

use serde::Serialize;

use crate::core::{Bucket, Histogram, BUCKET_KG, MAX_KG, MIN_KG};
use crate::math::clamp;

/// 前端直方图的下界 (kg)
pub const DISPLAY_MIN_KG: f64 = 1.0;
/// 前端直方图的上界 (kg)
pub const DISPLAY_MAX_KG: f64 = 1000.0;
pub const DISPLAY_BIN_COUNT: usize = 100;

pub fn bucket_count() -> usize {
    (MAX_KG as u32 / BUCKET_KG) as usize
}

pub fn build_histogram(guesses: &[f64]) -> Histogram {
    let mut buckets: Vec<Bucket> = (0..bucket_count() as u32)
        .map(|i| Bucket {
            start_kg: i * BUCKET_KG,
            end_kg: (i + 1) * BUCKET_KG,
            count: 0,
        })
        .collect();

    let last = buckets.len() - 1;
    for &raw in guesses.iter().filter(|g| g.is_finite()) {
        let g = clamp(raw, MIN_KG, MAX_KG);
        // MAX_KG 本身落在最后一个桶
        let idx = ((g / BUCKET_KG as f64).floor() as usize).min(last);
        buckets[idx].count += 1;
    }

    Histogram {
        bucket_kg: BUCKET_KG,
        buckets,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayHistogram {
    pub counts: [u32; DISPLAY_BIN_COUNT],
    /// 至少为 1，方便前端按比例画高度
    pub max_count: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayBin {
    pub index: usize,
    pub start_kg: f64,
    pub end_kg: f64,
    pub count: u32,
}

impl DisplayHistogram {
    pub fn bin_kg() -> f64 {
        (DISPLAY_MAX_KG - DISPLAY_MIN_KG) / DISPLAY_BIN_COUNT as f64
    }

    /// 只返回有数据的 bin
    pub fn non_empty(&self) -> Vec<DisplayBin> {
        let width = Self::bin_kg();
        self.counts
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c > 0)
            .map(|(index, &count)| DisplayBin {
                index,
                start_kg: DISPLAY_MIN_KG + index as f64 * width,
                end_kg: DISPLAY_MIN_KG + (index + 1) as f64 * width,
                count,
            })
            .collect()
    }
}

pub fn build_display_histogram(guesses: &[f64]) -> DisplayHistogram {
    let mut counts = [0u32; DISPLAY_BIN_COUNT];
    let mut total = 0;
    let width = DisplayHistogram::bin_kg();

    for &kg in guesses {
        if !kg.is_finite() || kg < DISPLAY_MIN_KG || kg > DISPLAY_MAX_KG {
            continue;
        }
        // 上界 1000 算出来是 100，越界直接丢弃
        let idx = ((kg - DISPLAY_MIN_KG) / width).floor() as usize;
        if idx < DISPLAY_BIN_COUNT {
            counts[idx] += 1;
            total += 1;
        }
    }

    let max_count = counts.iter().copied().max().unwrap_or(0).max(1);
    DisplayHistogram {
        counts,
        max_count,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn empty_input_still_has_all_buckets() {
        let h = build_histogram(&[]);
        assert_eq!(h.bucket_kg, 50);
        assert_eq!(h.buckets.len(), 20);
        assert_eq!(h.buckets[0].start_kg, 0);
        assert_eq!(h.buckets[19].end_kg, 1000);
        assert!(h.buckets.iter().all(|b| b.count == 0));
    }

    #[test]
    fn boundary_values_land_in_edge_buckets() {
        let h = build_histogram(&[1000.0, 0.5, 49.99, 50.0, -3.0, 7000.0]);
        assert_eq!(h.buckets[0].count, 3); // 0.5, 49.99, -3 -> 0.5
        assert_eq!(h.buckets[1].count, 1);
        assert_eq!(h.buckets[19].count, 2); // 1000 和 7000 -> 1000
    }

    #[test]
    fn non_finite_values_are_skipped() {
        let h = build_histogram(&[f64::NAN, f64::INFINITY, 10.0]);
        let total: u32 = h.buckets.iter().map(|b| b.count).sum();
        assert_eq!(total, 1);
    }

    #[test]
    fn counts_sum_to_finite_inputs() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let n = rng.gen_range(0..200);
            let xs: Vec<f64> = (0..n).map(|_| rng.gen_range(-100.0..2000.0)).collect();
            let total: u32 = build_histogram(&xs).buckets.iter().map(|b| b.count).sum();
            assert_eq!(total as usize, n);
        }
    }

    #[test]
    fn display_histogram_drops_out_of_domain() {
        let d = build_display_histogram(&[0.5, 1.0, 10.5, 11.5, 999.0, 1200.0, f64::NAN]);
        assert_eq!(d.counts[0], 2); // 1.0, 10.5
        assert_eq!(d.counts[1], 1); // 11.5
        assert_eq!(d.counts[99], 1); // 999
        assert_eq!(d.total, 4);
        assert_eq!(d.max_count, 2);
    }

    #[test]
    fn display_histogram_reports_only_non_empty_bins() {
        let d = build_display_histogram(&[5.0, 5.0, 500.0]);
        let bins = d.non_empty();
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[0].index, 0);
        assert_eq!(bins[0].count, 2);
        assert!((bins[0].start_kg - 1.0).abs() < 1e-9);
        assert!((bins[0].end_kg - 10.99).abs() < 1e-9);
    }

    #[test]
    fn display_histogram_max_count_floor_is_one() {
        let d = build_display_histogram(&[]);
        assert_eq!(d.max_count, 1);
        assert_eq!(d.total, 0);
        assert!(d.non_empty().is_empty());
    }
}
