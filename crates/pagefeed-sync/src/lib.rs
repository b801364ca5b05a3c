//! Post-batch storage re-sync trigger for the downstream labeling service.

pub mod client;
pub mod config;

pub use client::{DisabledSyncTrigger, HttpSyncTrigger, SyncError, SyncOutcome, SyncTrigger};
pub use config::SyncConfig;
