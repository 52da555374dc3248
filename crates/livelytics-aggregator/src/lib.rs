//! Real-time visitor analytics aggregator.
//!
//! A single actor task owns all in-memory aggregation state: a bounded
//! buffer of recent visits, per-dimension count maps, and the timers that
//! drive cleanup and dashboard broadcasts. Ingestion is fire-and-forget;
//! queries are request/reply messages; durable-store I/O (cold-start
//! preload, hourly traffic series) runs on worker tasks so it never stalls
//! the mailbox. State is ephemeral — the durable store is the only source
//! of truth across restarts.

pub mod actor;
pub mod broadcast;
pub mod histogram;
pub mod snapshot;
pub mod state;
pub mod store;
pub mod topn;
pub mod windows;

pub use actor::{Aggregator, AggregatorError};
pub use broadcast::{Broadcaster, DashboardUpdate};
pub use snapshot::StatsSnapshot;
pub use store::{ClickHouseStore, SessionStamp, VisitStore};
pub use windows::Window;
