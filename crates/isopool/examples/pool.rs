//! Worker pool demo: mixed success, a deliberate task failure, and a
//! context crash the pool recovers from.
//!
//! Run with: `cargo run --example pool`

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use isopool::{PoolConfig, Work, WorkerPool};

#[derive(Debug)]
enum Payload {
    Hash { input: String, rounds: u32 },
    Reject,
    Crash,
}

/// A toy checksum worker. `Reject` fails the task, `Crash` kills the
/// context.
struct Hasher;

#[async_trait]
impl Work for Hasher {
    type Payload = Payload;
    type Output = u64;
    type Error = String;

    async fn run(&mut self, payload: Payload) -> Result<u64, String> {
        match payload {
            Payload::Hash { input, rounds } => {
                // Simulate work proportional to the number of rounds.
                sleep(Duration::from_millis(u64::from(rounds) * 10)).await;
                let mut acc: u64 = 0xcbf2_9ce4_8422_2325;
                for _ in 0..rounds {
                    for byte in input.bytes() {
                        acc ^= u64::from(byte);
                        acc = acc.wrapping_mul(0x0000_0100_0000_01b3);
                    }
                }
                Ok(acc)
            }
            Payload::Reject => Err("payload rejected by policy".to_string()),
            Payload::Crash => panic!("simulated worker crash"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "isopool=debug".into()),
        )
        .init();

    let pool = WorkerPool::new(|| Hasher, PoolConfig::new(2));

    let mut handles = Vec::new();
    for (i, rounds) in [3u32, 1, 5, 2].into_iter().enumerate() {
        handles.push(pool.submit(Payload::Hash {
            input: format!("document-{i}"),
            rounds,
        }));
    }
    let rejected = pool.submit(Payload::Reject);
    let crashed = pool.submit(Payload::Crash);
    let after_recovery = pool.submit(Payload::Hash {
        input: "submitted-after-crash".to_string(),
        rounds: 1,
    });

    for handle in handles {
        let id = handle.id();
        match handle.await {
            Ok(checksum) => println!("{id}: checksum {checksum:#018x}"),
            Err(err) => println!("{id}: {err}"),
        }
    }
    println!("reject outcome: {:?}", rejected.await);
    println!("crash outcome:  {:?}", crashed.await);
    println!("after recovery: {:?}", after_recovery.await);

    let status = pool.status().await?;
    println!(
        "pool healthy: {} free / {} busy, {} fault(s) recovered",
        status.free_contexts, status.busy_contexts, status.faults_recovered
    );

    pool.terminate().await;
    Ok(())
}
