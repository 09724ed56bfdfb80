//! Storage Module
//!
//! The keyspace and its active expiry cycle.
//!
//! ```text
//!   command evaluation ──> Store <── run_expiry_cycle()
//!                            │              ▲
//!                  (threaded engine)        │
//!                   Arc<Mutex<Store>>  ExpirySweeper task / reactor cron
//! ```
//!
//! ## Example
//!
//! ```
//! use tinydice::storage::{run_expiry_cycle, Expiry, Store};
//! use bytes::Bytes;
//!
//! let mut store = Store::new();
//! store.set_with_expiry(Bytes::from("stale"), Bytes::from("v"), Expiry::At(0));
//! store.set(Bytes::from("fresh"), Bytes::from("v"));
//!
//! let report = run_expiry_cycle(&mut store);
//! assert_eq!(report.deleted, 1);
//! assert_eq!(store.len(), 1);
//! ```

pub mod engine;
pub mod expiry;

pub use engine::{lock_store, now_ms, Entry, Expiry, SampleOutcome, SharedStore, Store};
pub use expiry::{
    run_expiry_cycle, sample, sample_at, CycleReport, ExpiryConfig, ExpirySweeper, CONTINUE_THRESHOLD,
    DEFAULT_CRON_INTERVAL, SAMPLE_QUOTA,
};
