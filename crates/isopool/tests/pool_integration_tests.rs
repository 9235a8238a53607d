//! Integration tests for the worker pool.
//!
//! These tests verify end-to-end behavior through the public API only:
//!
//! - Mixed workloads across saturation and drain
//! - Task-level failure vs context-level fault handling
//! - Pool self-healing and capacity restoration
//! - Terminate semantics and idempotency
//! - Status snapshot shape and serialization

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::time::sleep;

use isopool::{PoolConfig, PoolError, Work, WorkerPool};

// ============================================================================
// Test worker: a tiny arithmetic service with failure modes
// ============================================================================

/// Instructions understood by [`Calculator`].
#[derive(Debug, Clone)]
enum Request {
    /// Return `value + 1` after an optional delay.
    Increment { value: i64, delay_ms: u64 },
    /// Deliberate task-scoped failure.
    Reject(String),
    /// Crash the hosting context.
    Crash,
}

struct Calculator;

#[async_trait]
impl Work for Calculator {
    type Payload = Request;
    type Output = i64;
    type Error = String;

    async fn run(&mut self, request: Request) -> Result<i64, String> {
        match request {
            Request::Increment { value, delay_ms } => {
                if delay_ms > 0 {
                    sleep(Duration::from_millis(delay_ms)).await;
                }
                Ok(value + 1)
            }
            Request::Reject(reason) => Err(reason),
            Request::Crash => panic!("calculator crashed"),
        }
    }
}

fn calculator_pool(concurrency: usize) -> WorkerPool<Calculator> {
    WorkerPool::new(|| Calculator, PoolConfig::new(concurrency))
}

// ============================================================================
// Integration Test: Full Workflow
// ============================================================================

/// Complete workflow:
/// 1. Create a pool twice as oversubscribed as its capacity
/// 2. Submit a mixed batch without blocking
/// 3. Await everything, out of order
/// 4. Verify the pool is idle again
/// 5. Terminate
#[tokio::test]
async fn test_full_pool_workflow() {
    let pool = calculator_pool(2);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            pool.submit(Request::Increment {
                value: i,
                delay_ms: 5,
            })
        })
        .collect();

    let results = join_all(handles).await;
    for (i, settled) in results.into_iter().enumerate() {
        assert_eq!(settled, Ok(i as i64 + 1));
    }

    let status = pool.status().await.expect("pool alive");
    assert_eq!(status.concurrency, 2);
    assert_eq!(status.free_contexts, 2);
    assert_eq!(status.busy_contexts, 0);
    assert_eq!(status.pending_tasks, 0);
    assert_eq!(status.inflight_tasks, 0);

    pool.terminate().await;
}

// ============================================================================
// Integration Test: Failure Taxonomy
// ============================================================================

/// A rejected task and a crashed context surface as distinct errors, and
/// neither disturbs the rest of the batch.
#[tokio::test]
async fn test_task_error_and_context_fault_are_distinct() {
    let pool = calculator_pool(2);

    let ok = pool.submit(Request::Increment {
        value: 10,
        delay_ms: 0,
    });
    let rejected = pool.submit(Request::Reject("bad input".into()));
    let crashed = pool.submit(Request::Crash);
    let ok_after = pool.submit(Request::Increment {
        value: 20,
        delay_ms: 0,
    });

    assert_eq!(ok.await, Ok(11));
    match rejected.await {
        Err(PoolError::TaskFailed { message, .. }) => assert_eq!(message, "bad input"),
        other => panic!("expected TaskFailed, got {other:?}"),
    }
    match crashed.await {
        Err(PoolError::ContextFault { cause, .. }) => {
            assert!(cause.contains("calculator crashed"));
        }
        other => panic!("expected ContextFault, got {other:?}"),
    }
    assert_eq!(ok_after.await, Ok(21));

    pool.terminate().await;
}

/// After a crash the pool heals itself: capacity returns to `concurrency`
/// and a later submission runs on the replacement context.
#[tokio::test]
async fn test_pool_self_heals_after_crash() {
    let pool = calculator_pool(2);

    let before = pool.status().await.expect("pool alive");
    let original_ids: Vec<_> = before.contexts.iter().map(|c| c.id).collect();

    assert!(matches!(
        pool.submit(Request::Crash).await,
        Err(PoolError::ContextFault { .. })
    ));

    let after = pool.status().await.expect("pool alive");
    assert_eq!(after.free_contexts + after.busy_contexts, 2);
    assert_eq!(after.faults_recovered, 1);

    // Exactly one context identity changed.
    let surviving = after
        .contexts
        .iter()
        .filter(|c| original_ids.contains(&c.id))
        .count();
    assert_eq!(surviving, 1);

    assert_eq!(
        pool.submit(Request::Increment {
            value: 99,
            delay_ms: 0,
        })
        .await,
        Ok(100)
    );

    pool.terminate().await;
}

// ============================================================================
// Integration Test: Terminate Semantics
// ============================================================================

/// Terminate settles every outstanding handle, is idempotent, and later
/// submissions reject immediately instead of queueing forever.
#[tokio::test]
async fn test_terminate_is_final_and_idempotent() {
    let pool = calculator_pool(1);

    let inflight = pool.submit(Request::Increment {
        value: 0,
        delay_ms: 10_000,
    });
    let queued = pool.submit(Request::Increment {
        value: 1,
        delay_ms: 0,
    });

    pool.terminate().await;
    pool.terminate().await;

    assert_eq!(inflight.await, Err(PoolError::Terminated));
    assert_eq!(queued.await, Err(PoolError::Terminated));

    let late = pool.submit(Request::Increment {
        value: 2,
        delay_ms: 0,
    });
    assert_eq!(late.await, Err(PoolError::SubmitAfterTerminate));
}

// ============================================================================
// Integration Test: Status Serialization
// ============================================================================

/// The status snapshot serializes with camelCase keys for external
/// consumers.
#[tokio::test]
async fn test_status_serializes_camel_case() {
    let pool = calculator_pool(1);
    let status = pool.status().await.expect("pool alive");

    let json = serde_json::to_value(&status).expect("serializable");
    assert_eq!(json["concurrency"], 1);
    assert_eq!(json["freeContexts"], 1);
    assert_eq!(json["busyContexts"], 0);
    assert_eq!(json["pendingTasks"], 0);
    assert_eq!(json["inflightTasks"], 0);
    assert_eq!(json["faultsRecovered"], 0);
    assert!(json["contexts"][0]["id"].is_string());
    assert_eq!(json["contexts"][0]["busy"], false);
    assert!(json["contexts"][0]["spawnedAt"].is_string());

    pool.terminate().await;
}

// ============================================================================
// Integration Test: Sharing the Pool
// ============================================================================

/// The pool handle is usable from several tasks behind an `Arc`.
#[tokio::test]
async fn test_pool_shared_across_tasks() {
    let pool = Arc::new(calculator_pool(4));

    let mut joins = Vec::new();
    for i in 0..16i64 {
        let pool = Arc::clone(&pool);
        joins.push(tokio::spawn(async move {
            pool.submit(Request::Increment {
                value: i,
                delay_ms: 1,
            })
            .await
        }));
    }

    for (i, join) in joins.into_iter().enumerate() {
        assert_eq!(join.await.expect("join"), Ok(i as i64 + 1));
    }

    pool.terminate().await;
}
