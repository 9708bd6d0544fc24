//! 聚合服务的错误类型

use thiserror::Error;

/// 存储层操作的返回类型
pub type StoreResult<T> = Result<T, StoreError>;

/// 存储后端抛出的错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 后端打不开或连不上
    #[error("Store unavailable: {message}")]
    Unavailable { message: String },

    /// 操作超过配置的时限
    #[error("Store operation `{operation}` timed out after {duration_ms}ms")]
    Timeout {
        operation: &'static str,
        duration_ms: u64,
    },

    /// 后端执行查询时报错
    #[error("Store backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// 记录编解码失败
    #[error("Record codec error: {source}")]
    Codec {
        #[from]
        source: bincode::Error,
    },
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Backend {
            source: Box::new(err),
        }
    }

    /// 连接类问题 (区别于数据错误)
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable { .. } | StoreError::Timeout { .. }
        )
    }
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        match err {
            sled::Error::Io(io) => StoreError::Unavailable {
                message: io.to_string(),
            },
            other => StoreError::backend(other),
        }
    }
}

/// 写库之前就被拒绝的提交
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("itemID is empty")]
    EmptyItemId,

    #[error("guessKg is not a finite number")]
    NonFiniteGuess,

    #[error("request body is not a JSON object: {0}")]
    MalformedBody(String),
}

/// 聚合接口对外暴露的错误
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("Invalid submission: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
