use crate::core::StatSummary;
use crate::math::round2;

/// 计算窗口的总体均值/标准差，以及新猜测相对人群的 z-score
///
/// 只统计有限值；标准差用总体口径 (除以 n)。窗口为空时全部为 0，
/// 标准差为 0 时 z-score 返回 None。所有输出在完整精度计算后再保留两位小数。
pub fn summarize(guesses: &[f64], submitted_kg: f64) -> StatSummary {
    let xs: Vec<f64> = guesses.iter().copied().filter(|x| x.is_finite()).collect();
    let n = xs.len();
    if n == 0 {
        return StatSummary::empty();
    }

    let count = n as f64;
    let mean = xs.iter().sum::<f64>() / count;
    let var_pop = xs.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / count;
    let sd = var_pop.sqrt();

    if sd <= 0.0 {
        return StatSummary {
            n,
            mean_kg: round2(mean),
            sd_kg: 0.0,
            z_score: None,
            z_abs: None,
        };
    }

    let z = (submitted_kg - mean) / sd;
    StatSummary {
        n,
        mean_kg: round2(mean),
        sd_kg: round2(sd),
        z_score: Some(round2(z)),
        z_abs: Some(round2(z.abs())),
    }
}
