use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// 存储层用来给 createdAt 打时间戳
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 手动拨动的时钟，测试里用来制造相同/递增的时间戳
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// 保证同一个 store 发出的时间戳不回退
#[derive(Debug, Default)]
pub(crate) struct MonotonicStamp {
    last: Option<DateTime<Utc>>,
}

impl MonotonicStamp {
    pub(crate) fn next(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let stamp = match self.last {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last = Some(stamp);
        stamp
    }
}
