//! Tick timing for Multiplay.
//!
//! - [`TickConfig`]: tick rate (1 to 128 Hz) and overrun policy.
//! - [`JobScheduler`]: periodic and one-shot jobs the host and client poll
//!   from their update, e.g. the per-tick gather or a delayed reconnect.
//! - [`TickDriver`]: an async loop pacer for running an update on tokio.

mod config;
mod driver;
mod jobs;

pub use config::{TickConfig, TickPolicy};
pub use driver::{TickDriver, TickInfo, TickMetrics};
pub use jobs::{JobId, JobScheduler};
