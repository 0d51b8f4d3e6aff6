//! Pool concurrency and shared-state correctness.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;

use foreman::state::{Plan, PlanStore};
use foreman::sync::NamedMutex;
use foreman::worker::{AgentEvent, WorkerPool};
use foreman::{Error, TaskSpec};

use crate::fixtures::{standard_records, worker_config, MockSandbox};

#[tokio::test]
async fn test_three_workers_run_concurrently_and_stop_all() {
    let mock = MockSandbox::blocking();
    let runtime = mock.runtime();
    let (tx, _rx) = mpsc::channel(256);
    let mut pool = WorkerPool::new(3, tx);

    for _ in 0..3 {
        pool.spawn(&runtime, &worker_config()).await.unwrap();
    }
    assert_eq!(pool.active_count(), 3);
    assert!(!pool.has_capacity());
    assert_eq!(runtime.registry().len().await, 3);

    pool.stop_all().await;

    assert_eq!(pool.active_count(), 0);
    assert!(runtime.registry().is_empty().await);
}

#[tokio::test]
async fn test_capacity_rejects_fourth_worker() {
    let mock = MockSandbox::blocking();
    let runtime = mock.runtime();
    let (tx, _rx) = mpsc::channel(256);
    let mut pool = WorkerPool::new(3, tx);

    for _ in 0..3 {
        pool.spawn(&runtime, &worker_config()).await.unwrap();
    }
    let fourth = pool.spawn(&runtime, &worker_config()).await;
    assert!(matches!(fourth, Err(Error::PoolFull { max: 3 })));

    pool.stop_all().await;
}

#[tokio::test]
async fn test_events_from_parallel_workers_multiplex_one_channel() {
    let mock = MockSandbox::emitting(&standard_records());
    let runtime = mock.runtime();
    let (tx, mut rx) = mpsc::channel(256);
    let mut pool = WorkerPool::new(2, tx);

    let a = pool.spawn(&runtime, &worker_config()).await.unwrap();
    let b = pool.spawn(&runtime, &worker_config()).await.unwrap();
    pool.get(&a).unwrap().wait().await.unwrap();
    pool.get(&b).unwrap().wait().await.unwrap();

    let mut completed = HashSet::new();
    let mut stream_sources = HashSet::new();
    while let Ok(event) = rx.try_recv() {
        match event {
            AgentEvent::Stream { agent_id, .. } => {
                stream_sources.insert(agent_id);
            }
            AgentEvent::Completed { agent_id, exit_code } => {
                assert_eq!(exit_code, 0);
                completed.insert(agent_id);
            }
            AgentEvent::Failed { error, .. } => panic!("Unexpected failure: {}", error),
        }
    }
    assert_eq!(completed, HashSet::from([a, b]));
    assert_eq!(stream_sources, HashSet::from([a, b]));
}

#[tokio::test]
async fn test_named_mutex_serializes_interleaved_read_modify_write() {
    // Two tasks interleave await points inside their critical sections;
    // without per-key exclusion the final count would undershoot.
    let mutex = Arc::new(NamedMutex::new());
    let counter = Arc::new(tokio::sync::Mutex::new(0u32));

    let mut handles = Vec::new();
    for _ in 0..50 {
        let mutex = mutex.clone();
        let counter = counter.clone();
        handles.push(tokio::spawn(async move {
            mutex
                .run_exclusive("shared".to_string(), || async {
                    let read = *counter.lock().await;
                    tokio::task::yield_now().await;
                    *counter.lock().await = read + 1;
                })
                .await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(*counter.lock().await, 50);
    assert_eq!(mutex.key_count(), 0);
}

#[tokio::test]
async fn test_plan_store_concurrent_updates_across_plans() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(PlanStore::open(dir.path()).unwrap());
    store.save(&Plan::new("alpha", "Plan A")).await.unwrap();
    store.save(&Plan::new("beta", "Plan B")).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..10 {
        for plan_id in ["alpha", "beta"] {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update(plan_id, |p| {
                        let id = format!("{}-t{}", p.id, i);
                        p.tasks.push(TaskSpec::new(&id, "Task"));
                    })
                    .await
                    .unwrap();
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.load("alpha").await.unwrap().tasks.len(), 10);
    assert_eq!(store.load("beta").await.unwrap().tasks.len(), 10);
}
