use std::sync::Arc;

use guess_the_weight::config::StoreConfig;
use guess_the_weight::core::SortOrder;
use guess_the_weight::engine::Aggregator;
use guess_the_weight::infrastructure::{GuessStore, MemoryGuessStore, StoreHandle};
use guess_the_weight::model::validation::SubmitBody;
use guess_the_weight::model::window::RollingWindowManager;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submits_converge_to_window() {
    let store = Arc::new(MemoryGuessStore::new());
    let aggregator = Arc::new(Aggregator::new(
        StoreHandle::with_store(StoreConfig::memory(), store.clone()),
        RollingWindowManager::new(10),
        50,
    ));

    let mut tasks = Vec::new();
    for i in 0..64 {
        let agg = aggregator.clone();
        tasks.push(tokio::spawn(async move {
            agg.submit_guess(&SubmitBody::new("statue", 100.0 + i as f64))
                .await
                .map(|out| out.recent.len())
        }));
    }
    for task in tasks {
        let window = task.await.unwrap().unwrap();
        assert!(window <= 10);
    }

    // 收尾时再裁一次，窗口收敛
    RollingWindowManager::new(10)
        .trim(&*store, "statue")
        .await
        .unwrap();
    let all = store
        .query_recent("statue", 0, usize::MAX, SortOrder::Descending)
        .await
        .unwrap();
    // cutoff 之后只可能剩下与 cutoff 同一时间戳的记录
    assert!(all
        .iter()
        .skip(10)
        .all(|g| g.created_at == all[10].created_at));
    assert_eq!(store.count_and_average(None).await.unwrap().count, 64);
}
