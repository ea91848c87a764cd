//! Backend abstraction and trait definitions.

use anyhow::Result;
use async_trait::async_trait;

use crate::{
    config::Config,
    device::{Device, DeviceUid, DiagnosticResult, OptionData, PartialDevice},
};

/// Trait for hardware backend implementations.
///
/// Provides a unified interface for enumerating and driving devices across
/// different hardware ecosystems. Any call may fail with a backend-specific
/// error; only the aggregator turns those into diagnostics.
///
/// # Example
///
/// ```no_run
/// use polychromatic::backend::{Backend, Matrix};
/// use polychromatic::device::{Device, DeviceUid, OptionData, PartialDevice};
/// use anyhow::Result;
///
/// #[derive(Debug)]
/// struct NullBackend;
///
/// #[async_trait::async_trait]
/// impl Backend for NullBackend {
///     fn id(&self) -> &'static str { "null" }
///     async fn list_devices(&self) -> Result<Vec<Device>> { Ok(vec![]) }
///     async fn list_unsupported_devices(&self) -> Result<Vec<PartialDevice>> { Ok(vec![]) }
///     async fn get_device(&self, _uid: DeviceUid) -> Result<Option<Device>> { Ok(None) }
///     async fn get_device_by_serial(&self, _serial: &str) -> Result<Option<Device>> { Ok(None) }
///     async fn set_device_state(
///         &self, _uid: DeviceUid, _zone: &str, _option_id: &str,
///         _option_data: &OptionData, _colours: &[String],
///     ) -> Result<bool> { Ok(false) }
///     async fn get_drawable(&self, _uid: DeviceUid) -> Result<Option<Box<dyn Matrix>>> {
///         Ok(None)
///     }
/// }
/// ```
#[async_trait]
pub trait Backend: Send + Sync + core::fmt::Debug {
    /// Stable identifier of this backend, e.g. `openrazer`.
    fn id(&self) -> &'static str;

    /// Lists every connected device this backend can drive.
    async fn list_devices(&self) -> Result<Vec<Device>>;

    /// Lists devices that are connected but not supported.
    async fn list_unsupported_devices(&self) -> Result<Vec<PartialDevice>>;

    /// Fetches one device. `Ok(None)` means it vanished.
    async fn get_device(&self, uid: DeviceUid) -> Result<Option<Device>>;

    /// Finds a device by its stable serial.
    async fn get_device_by_serial(&self, serial: &str) -> Result<Option<Device>>;

    /// Applies an option to a zone. `Ok(false)` means the request was not
    /// valid for this device.
    async fn set_device_state(
        &self,
        uid: DeviceUid,
        zone: &str,
        option_id: &str,
        option_data: &OptionData,
        colours: &[String],
    ) -> Result<bool>;

    /// Returns a drawable matrix for per-LED painting, if supported.
    async fn get_drawable(&self, uid: DeviceUid) -> Result<Option<Box<dyn Matrix>>>;

    /// Runs backend self-tests. `None` means the backend has none.
    async fn troubleshoot(&self) -> Result<Option<Vec<DiagnosticResult>>> {
        Ok(None)
    }

    /// Restarts the underlying driver or daemon.
    async fn restart(&self) -> Result<()> {
        anyhow::bail!("{} does not support restarting", self.id())
    }
}

/// Per-LED frame buffer bound to one device.
#[async_trait]
pub trait Matrix: Send + Sync {
    fn rows(&self) -> u32;
    fn cols(&self) -> u32;

    /// Sets one LED in the pending frame.
    fn set(&mut self, x: u32, y: u32, rgb: (u8, u8, u8));

    /// Blanks the pending frame.
    fn clear(&mut self);

    /// Pushes the pending frame to the hardware.
    async fn draw(&self) -> Result<()>;
}

/// Result of attempting to bring up one backend.
#[derive(Debug)]
pub enum LoadResult {
    Loaded(Box<dyn Backend>),
    NotInstalled,
    ImportError(String),
}

/// Attempts to construct a backend at startup.
#[async_trait]
pub trait BackendLoader: Send + Sync {
    fn id(&self) -> &'static str;

    async fn load(&self, config: &Config) -> LoadResult;
}

/// Returns the enumerated set of backends known to this build.
pub fn default_loaders(config: &Config) -> Vec<Box<dyn BackendLoader>> {
    let mut loaders: Vec<Box<dyn BackendLoader>> = Vec::new();
    if config.backends.openrazer {
        loaders.push(Box::new(crate::backends::openrazer::OpenRazerLoader));
    }
    loaders
}
