//! sled 存储后端
//!
//! 一个 sled 库里两棵树：
//!
//! - `<collection>`：猜测日志。key = `len(item_id) BE u32 ‖ item_id ‖ created_at 纳秒(翻转符号位, BE) ‖ sled id BE`，
//!   前缀扫描即按时间排序，"早于 cutoff" 就是一段 key 区间
//! - `<collection>_tallies`：`item_id -> Tally`，永不裁剪
//!
//! value 一律 bincode 编码。sled 的读写都是同步阻塞调用，统一丢到 `spawn_blocking` 里跑。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Batch, Db, IVec, Transactional, Tree};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::clock::{Clock, MonotonicStamp, SystemClock};
use super::store::{rank_by_volume, GuessStore};
use crate::core::{Guess, ItemTally, SortOrder, Tally};
use crate::error::{StoreError, StoreResult};

struct Shared {
    db: Db,
    log: Tree,
    tallies: Tree,
    clock: Arc<dyn Clock>,
    stamp: Mutex<MonotonicStamp>,
}

pub struct SledGuessStore {
    shared: Arc<Shared>,
}

fn item_prefix(item_id: &str) -> Vec<u8> {
    let bytes = item_id.as_bytes();
    let mut key = Vec::with_capacity(4 + bytes.len() + 16);
    key.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    key.extend_from_slice(bytes);
    key
}

/// 有符号纳秒翻转符号位，保证字节序和时间序一致
fn encode_stamp(at: DateTime<Utc>) -> [u8; 8] {
    let nanos = at.timestamp_nanos_opt().unwrap_or(i64::MAX);
    ((nanos as u64) ^ (1 << 63)).to_be_bytes()
}

fn log_key(item_id: &str, at: DateTime<Utc>, id: u64) -> Vec<u8> {
    let mut key = item_prefix(item_id);
    key.extend_from_slice(&encode_stamp(at));
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn decode_guess(raw: &IVec) -> StoreResult<Guess> {
    Ok(bincode::deserialize::<Guess>(raw)?)
}

fn read_tally(raw: Option<IVec>) -> StoreResult<Tally> {
    match raw {
        Some(raw) => Ok(bincode::deserialize::<Tally>(&raw)?),
        None => Ok(Tally::default()),
    }
}

impl Shared {
    /// 时间戳和 sled id 在同一把锁里生成，两者顺序一致
    fn next_stamp(&self) -> StoreResult<(DateTime<Utc>, u64)> {
        let mut stamp = self.stamp.lock().unwrap_or_else(|e| e.into_inner());
        let at = stamp.next(self.clock.now());
        let id = self.db.generate_id()?;
        Ok((at, id))
    }

    fn insert(&self, item_id: &str, value_kg: f64) -> StoreResult<Guess> {
        let (created_at, id) = self.next_stamp()?;
        let guess = Guess {
            item_id: item_id.to_string(),
            value_kg,
            created_at,
        };
        let key = log_key(item_id, created_at, id);
        let record = bincode::serialize(&guess)?;

        // 1. 日志和 tally 在同一个事务里写入
        (&self.log, &self.tallies)
            .transaction(|(log, tallies)| {
                log.insert(key.as_slice(), record.as_slice())?;

                let mut tally = match tallies.get(item_id.as_bytes())? {
                    Some(raw) => bincode::deserialize::<Tally>(&raw)
                        .map_err(ConflictableTransactionError::Abort)?,
                    None => Tally::default(),
                };
                tally.record(value_kg);
                let encoded =
                    bincode::serialize(&tally).map_err(ConflictableTransactionError::Abort)?;
                tallies.insert(item_id.as_bytes(), encoded)?;
                Ok(())
            })
            .map_err(|e: TransactionError<bincode::Error>| match e {
                TransactionError::Abort(codec) => StoreError::from(codec),
                TransactionError::Storage(storage) => StoreError::from(storage),
            })?;

        // 2. 落盘后才返回
        self.db.flush()?;
        Ok(guess)
    }

    fn query_recent(
        &self,
        item_id: &str,
        skip: usize,
        limit: usize,
        order: SortOrder,
    ) -> StoreResult<Vec<Guess>> {
        let scan = self.log.scan_prefix(item_prefix(item_id));
        let rows: Box<dyn Iterator<Item = sled::Result<(IVec, IVec)>>> = match order {
            SortOrder::Descending => Box::new(scan.rev()),
            SortOrder::Ascending => Box::new(scan),
        };

        rows.skip(skip)
            .take(limit)
            .map(|row| {
                let (_, value) = row?;
                decode_guess(&value)
            })
            .collect()
    }

    fn delete_older_than(&self, item_id: &str, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let start = item_prefix(item_id);
        let mut end = start.clone();
        end.extend_from_slice(&encode_stamp(cutoff));

        let mut batch = Batch::default();
        let mut removed = 0u64;
        for row in self.log.range(start..end) {
            let (key, _) = row?;
            batch.remove(key);
            removed += 1;
        }

        if removed > 0 {
            self.log.apply_batch(batch)?;
            self.db.flush()?;
            debug!(item_id, removed, "evicted guesses older than cutoff");
        }
        Ok(removed)
    }

    fn count_and_average(&self, item_id: Option<&str>) -> StoreResult<Tally> {
        match item_id {
            Some(id) => read_tally(self.tallies.get(id.as_bytes())?),
            None => {
                let mut overall = Tally::default();
                for row in self.tallies.iter() {
                    let (_, raw) = row?;
                    overall.merge(&read_tally(Some(raw))?);
                }
                Ok(overall)
            }
        }
    }

    fn top_items_by_volume(&self, limit: usize) -> StoreResult<Vec<ItemTally>> {
        let mut items = Vec::with_capacity(self.tallies.len());
        for row in self.tallies.iter() {
            let (key, raw) = row?;
            let item_id = String::from_utf8(key.to_vec()).map_err(StoreError::backend)?;
            items.push(ItemTally {
                item_id,
                tally: read_tally(Some(raw))?,
            });
        }
        Ok(rank_by_volume(items, limit))
    }
}

impl SledGuessStore {
    pub fn open<P: AsRef<Path>>(path: P, collection: &str) -> StoreResult<Self> {
        Self::open_with_clock(path, collection, Arc::new(SystemClock))
    }

    pub fn open_with_clock<P: AsRef<Path>>(
        path: P,
        collection: &str,
        clock: Arc<dyn Clock>,
    ) -> StoreResult<Self> {
        let db = sled::Config::new()
            .path(path.as_ref())
            .open()
            .map_err(|e| StoreError::Unavailable {
                message: format!("open {}: {}", path.as_ref().display(), e),
            })?;
        let log = db.open_tree(collection)?;
        let tallies = db.open_tree(format!("{}_tallies", collection))?;

        info!(
            "💾 [Store] Opened sled store at {} (collection `{}`, {} guesses retained)",
            path.as_ref().display(),
            collection,
            log.len()
        );

        Ok(Self {
            shared: Arc::new(Shared {
                db,
                log,
                tallies,
                clock,
                stamp: Mutex::new(MonotonicStamp::default()),
            }),
        })
    }

    /// 把同步的 sled 调用挪到阻塞线程池，不占 tokio worker
    async fn blocking<T, F>(&self, work: F) -> StoreResult<T>
    where
        F: FnOnce(&Shared) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || work(&shared))
            .await
            .map_err(|e| StoreError::Unavailable {
                message: format!("sled worker task failed: {}", e),
            })?
    }
}

#[async_trait]
impl GuessStore for SledGuessStore {
    async fn insert(&self, item_id: &str, value_kg: f64) -> StoreResult<Guess> {
        let item_id = item_id.to_string();
        self.blocking(move |s| s.insert(&item_id, value_kg)).await
    }

    async fn query_recent(
        &self,
        item_id: &str,
        skip: usize,
        limit: usize,
        order: SortOrder,
    ) -> StoreResult<Vec<Guess>> {
        let item_id = item_id.to_string();
        self.blocking(move |s| s.query_recent(&item_id, skip, limit, order))
            .await
    }

    async fn delete_older_than(&self, item_id: &str, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let item_id = item_id.to_string();
        self.blocking(move |s| s.delete_older_than(&item_id, cutoff))
            .await
    }

    async fn count_and_average(&self, item_id: Option<&str>) -> StoreResult<Tally> {
        let item_id = item_id.map(str::to_string);
        self.blocking(move |s| s.count_and_average(item_id.as_deref()))
            .await
    }

    async fn top_items_by_volume(&self, limit: usize) -> StoreResult<Vec<ItemTally>> {
        self.blocking(move |s| s.top_items_by_volume(limit)).await
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}
