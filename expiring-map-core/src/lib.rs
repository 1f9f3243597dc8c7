//! # Expiring Map Core
//!
//! A concurrent in-memory key-value map whose entries expire after a TTL.
//!
//! ## Features
//!
//! - Thread-safe storage using `DashMap` (sharded locks, no global lock)
//! - Automatic expiration on read (lazy eviction)
//! - Background sweeper task for each map instance
//! - Per-entry expiry callbacks, run exactly once and never under a lock
//! - Generic keys and values
//!
//! ## Example
//!
//! ```rust,no_run
//! use expiring_map_core::{on_expire, ExpiringMap, MapConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     // Sweep for expired entries every second
//!     let map = ExpiringMap::new(Duration::from_secs(1));
//!
//!     // Or with a config
//!     let config = MapConfig::default()
//!         .with_sweep_interval(Duration::from_millis(250));
//!     let sessions: ExpiringMap<String, u64> = ExpiringMap::with_config(config);
//!
//!     // Store a value for 3 seconds, logging when it expires
//!     map.set_with_callbacks(
//!         "hey",
//!         213,
//!         Duration::from_secs(3),
//!         [on_expire(|v: &i32| println!("{v} expired"))],
//!     );
//!
//!     if let Some(value) = map.get("hey") {
//!         println!("hey = {}", value);
//!     }
//!
//!     // Give it 2 more seconds on top of its current deadline
//!     map.refresh("hey", Duration::from_secs(2)).unwrap();
//!
//!     // Explicit removal never runs callbacks
//!     map.remove("hey");
//!     sessions.flush();
//! }
//! ```

mod config;
mod entry;
mod error;
mod map;

pub use config::MapConfig;
pub use entry::{on_expire, ExpiryCallback};
pub use error::Error;
pub use map::ExpiringMap;
