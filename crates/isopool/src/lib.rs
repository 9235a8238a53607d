//! Self-healing pool of isolated worker contexts.
//!
//! A [`WorkerPool`] owns a fixed set of execution contexts, each running one
//! [`Work`] instance on its own tokio task. Submitted payloads wait in a
//! FIFO queue, are dispatched to free contexts, and settle the
//! [`TaskHandle`] returned at submission time. A context that crashes is
//! discarded and replaced without losing the rest of the pool's work:
//! a deliberate `Err` from [`Work::run`] rejects only that task, while a
//! panic rejects the tasks the context held and triggers replacement.
//!
//! # Example
//!
//! ```
//! use isopool::{PoolConfig, Work, WorkerPool};
//!
//! struct Doubler;
//!
//! #[async_trait::async_trait]
//! impl Work for Doubler {
//!     type Payload = u64;
//!     type Output = u64;
//!     type Error = std::convert::Infallible;
//!
//!     async fn run(&mut self, payload: u64) -> Result<u64, Self::Error> {
//!         Ok(payload * 2)
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> isopool::PoolResult<()> {
//! let pool = WorkerPool::new(|| Doubler, PoolConfig::new(2));
//! let handle = pool.submit(21);
//! assert_eq!(handle.await?, 42);
//! pool.terminate().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod pool;
pub mod task;
pub mod worker;


pub use config::PoolConfig;
pub use error::{PoolError, PoolResult};
pub use pool::{ContextInfo, PoolStatus, WorkerPool};
pub use task::{TaskHandle, TaskId};
pub use worker::{ContextId, Work};
