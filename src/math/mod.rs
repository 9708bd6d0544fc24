pub mod histogram;
pub mod summary;

/// 把数值夹到 [min, max] 区间
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.min(max).max(min)
}

/// 保留两位小数，半数向 +∞ 进位 (与浏览器端 Math.round 一致)
pub fn round2(value: f64) -> f64 {
    (value * 100.0 + 0.5).floor() / 100.0
}
