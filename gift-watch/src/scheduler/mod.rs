//! Scheduler module driving the poll cycle.
//!
//! The Scheduler is responsible for:
//! - Running one fetch/diff/sync/dispatch cycle at a time on a fixed interval
//! - Ordering asset registration before the notifications that use it
//! - Flushing state once per cycle, including on shutdown

mod service;

pub use service::{CycleReport, DispatchTally, LoopState, Scheduler, SchedulerConfig};
