//! Receiving side of [`ControlSignal`](crate::process::ControlSignal).
//!
//! A component that holds a lock polls these flags from its main loop.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use anyhow::{Context, Result};
use signal_hook::SigId;

use crate::process::ControlSignal;

/// Flags raised when this process is asked to stop or reload.
#[derive(Debug)]
pub struct ControlSignals {
    stop: Arc<AtomicBool>,
    reload: Arc<AtomicBool>,
    ids: Vec<SigId>,
}

impl ControlSignals {
    /// Installs handlers for the stop and reload signals.
    pub fn register() -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let reload = Arc::new(AtomicBool::new(false));

        let ids = vec![
            signal_hook::flag::register(ControlSignal::Stop.as_raw(), stop.clone())
                .context("Failed to register stop handler")?,
            signal_hook::flag::register(ControlSignal::Reload.as_raw(), reload.clone())
                .context("Failed to register reload handler")?,
        ];

        Ok(Self { stop, reload, ids })
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Returns true once per received reload request.
    pub fn take_reload(&self) -> bool {
        self.reload.swap(false, Ordering::Relaxed)
    }
}

impl Drop for ControlSignals {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            signal_hook::low_level::unregister(id);
        }
    }
}
