//! # stockwatch - storefront stock monitor
//!
//! Polls storefront product pages on a fixed cadence, reconciles what it sees
//! against durable product state and keeps chat notifications in sync: a new
//! message when a product appears or restocks, an in-place edit when it sells
//! out or disappears.
//!
//! ## Core Concepts
//!
//! - **Source**: a monitored product URL; products are keyed by source and name
//! - **ProductRecord**: last known signatures, stock state and message handles
//! - **Decision**: the pure transition computed by [`reconcile::decide`]
//! - **Sweep**: delisting of stored products a source no longer shows
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stockwatch::engine::runtime::{Scheduler, SchedulerConfig};
//! use stockwatch::engine::SourcePoller;
//!
//! let poller = Arc::new(SourcePoller::new(store, fetcher, normalizer, coordinator));
//! let scheduler = Scheduler::new(poller, config, SchedulerConfig::default())?;
//! scheduler.run(async { let _ = tokio::signal::ctrl_c().await; }).await;
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod error;
pub mod observation;
pub mod product;

// Decision and rendering
pub mod message;
pub mod reconcile;
pub mod sweep;

// I/O edges
pub mod config;
pub mod fetch;
pub mod notify;
pub mod retry;
pub mod storage;

// Orchestration
pub mod engine;
pub mod logging;

pub use error::{ConfigError, FetchError, MonitorError, MonitorResult, SendFailure, StorageError};
pub use observation::{NormalizedObservation, ObservationNormalizer, ProductObservation};
pub use product::{ChannelId, MessageHandle, ProductKey, ProductRecord};
pub use reconcile::{decide, Decision, ListingKind, NotificationAction};
pub use storage::{InMemoryProductStore, JsonStateStore, ProductStore};
