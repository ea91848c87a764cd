//! # polychromatic
//!
//! Device coordination layer for RGB peripherals on Linux.
//!
//! ## Features
//!
//! - **Backend Aggregation**: One device list across every installed vendor backend
//! - **Fail-Soft**: A broken backend is reported, never fatal
//! - **Ownership Hand-off**: Software effects are stopped before hardware changes
//! - **Process Coordination**: PID lock files and control signals between components
//! - **Effect Files**: Validated, upgradable JSON effects with companion scripts
//! - **Bulk Apply**: One lighting choice across every device
//!
//! ## Architecture
//!
//! - [`Middleman`](middleman::Middleman) - Aggregates backends and owns hand-off
//! - [`ProcessCoordinator`](process::ProcessCoordinator) - Locks, signals, spawning
//! - [`SoftwareStateStore`](state::SoftwareStateStore) - Per-device owner records
//! - [`EffectFileManager`](effects::EffectFileManager) - Effect file storage
//! - [`BulkApply`](bulk::BulkApply) - Sweeps over every device
//!
//! ## Example
//!
//! ```no_run
//! use polychromatic::{app_context::AppContext, config::ConfigManager};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let ctx = AppContext::new(ConfigManager::load(None).await?).await;
//!     for device in ctx.middleman.get_device_list().await {
//!         println!("{} {}", device.serial, device.name);
//!     }
//!     Ok(())
//! }
//! ```

pub mod app_context;
pub mod backend;
pub mod backends;
pub mod bulk;
pub mod cli;
pub mod config;
pub mod device;
pub mod effects;
pub mod middleman;
pub mod process;
pub mod signals;
pub mod state;

#[cfg(test)]
mod test_support;
