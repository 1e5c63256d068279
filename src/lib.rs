//! Point-in-time host health: load per core, available memory and free disk
//! space, judged against configurable thresholds.
//!
//! ```no_run
//! use hoststat::collectors::SysinfoProbe;
//! use hoststat::config::Thresholds;
//! use hoststat::health::{HealthSnapshot, StatsOptions};
//!
//! # async fn run() -> Result<(), hoststat::health::StatsError> {
//! let snapshot = HealthSnapshot::new(SysinfoProbe::new(), Thresholds::default(), "/");
//! let stats = snapshot
//!     .get_stats(Some(&StatsOptions {
//!         interval: Some(5),
//!         ..StatsOptions::default()
//!     }))
//!     .await?;
//! println!("healthy: {}", stats.is_healthy);
//! # Ok(())
//! # }
//! ```

pub mod collectors;
pub mod config;
pub mod health;
pub mod http;
pub mod metrics;
