//! 猜重量聚合服务
//!
//! 按 item 收集重量猜测，只保留最近一段 FIFO 窗口，返回固定分桶直方图和新猜测相对人群的 z-score。
//! 全局统计走不裁剪的 per-item tally。

pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod infrastructure;
pub mod math;
pub mod model;

pub use crate::config::AppConfig;
pub use crate::core::{Guess, Histogram, StatSummary, Tally};
pub use crate::engine::Aggregator;
pub use crate::error::{AggregationError, StoreError, ValidationError};
