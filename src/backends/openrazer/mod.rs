//! OpenRazer daemon backend.
//!
//! Talks to `openrazer-daemon` over the session bus. Each device lives at
//! `/org/razer/device/<serial>` and exposes one interface per capability;
//! a missing interface simply means the device lacks that capability.

mod bus;
mod matrix;
mod options;
mod usb;

use std::{collections::BTreeMap, path::Path, process::Command as Process};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::Mutex;
use zbus::{Connection, fdo::DBusProxy, names::BusName};

use self::{
    bus::{BrightnessProxy, ChromaProxy, DaemonProxy, DevicesProxy, DpiProxy, MiscProxy},
    matrix::RazerMatrix,
    options::{Command, MAIN_ZONE, ZoneReport},
};
use crate::{
    backend::{Backend, BackendLoader, LoadResult, Matrix},
    config::Config,
    device::{
        Device, DeviceUid, DiagnosticResult, DpiRange, FormFactor, MatrixDims, OptionData,
        PartialDevice,
    },
};

pub const BACKEND_ID: &str = "openrazer";

/// Registers the OpenRazer backend with the aggregator.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenRazerLoader;

#[async_trait]
impl BackendLoader for OpenRazerLoader {
    fn id(&self) -> &'static str {
        BACKEND_ID
    }

    async fn load(&self, _config: &Config) -> LoadResult {
        match OpenRazerBackend::connect().await {
            Ok(Some(backend)) => LoadResult::Loaded(Box::new(backend)),
            Ok(None) => LoadResult::NotInstalled,
            Err(e) => LoadResult::ImportError(format!("{e:#}")),
        }
    }
}

#[derive(Debug)]
pub struct OpenRazerBackend {
    connection: Connection,
    /// Serials in order of first sighting; the index is the uid.
    serials: Mutex<Vec<String>>,
}

impl OpenRazerBackend {
    /// Connects to the daemon. `Ok(None)` when the daemon is not running.
    pub async fn connect() -> Result<Option<Self>> {
        let connection = Connection::session()
            .await
            .context("Failed to connect to the session bus")?;

        let dbus = DBusProxy::new(&connection).await?;
        let name = BusName::try_from(bus::SERVICE)?;
        if !dbus.name_has_owner(name).await? {
            debug!("{} is not on the bus", bus::SERVICE);
            return Ok(None);
        }

        let version = DaemonProxy::new(&connection)
            .await?
            .version()
            .await
            .context("OpenRazer daemon did not answer")?;
        info!("Connected to OpenRazer daemon {version}");

        Ok(Some(Self {
            connection,
            serials: Mutex::new(Vec::new()),
        }))
    }

    async fn daemon_serials(&self) -> Result<Vec<String>> {
        DevicesProxy::new(&self.connection)
            .await?
            .get_devices()
            .await
            .context("Failed to list OpenRazer devices")
    }

    async fn uid_for(&self, serial: &str) -> DeviceUid {
        let mut serials = self.serials.lock().await;
        let idx = match serials.iter().position(|s| s == serial) {
            Some(idx) => idx,
            None => {
                serials.push(serial.to_string());
                serials.len() - 1
            }
        };
        idx as DeviceUid
    }

    /// Serial for a uid, only if the daemon still reports that device.
    async fn live_serial(&self, uid: DeviceUid) -> Result<Option<String>> {
        let Some(serial) = self.serials.lock().await.get(uid as usize).cloned() else {
            return Ok(None);
        };
        Ok(self
            .daemon_serials()
            .await?
            .contains(&serial)
            .then_some(serial))
    }

    async fn misc(&self, serial: &str) -> Result<MiscProxy<'static>> {
        Ok(MiscProxy::builder(&self.connection)
            .path(bus::device_path(serial))?
            .build()
            .await?)
    }

    async fn chroma(&self, serial: &str) -> Result<ChromaProxy<'static>> {
        Ok(ChromaProxy::builder(&self.connection)
            .path(bus::device_path(serial))?
            .build()
            .await?)
    }

    async fn brightness(&self, serial: &str) -> Result<BrightnessProxy<'static>> {
        Ok(BrightnessProxy::builder(&self.connection)
            .path(bus::device_path(serial))?
            .build()
            .await?)
    }

    async fn dpi(&self, serial: &str) -> Result<DpiProxy<'static>> {
        Ok(DpiProxy::builder(&self.connection)
            .path(bus::device_path(serial))?
            .build()
            .await?)
    }

    async fn matrix_dims(&self, misc: &MiscProxy<'_>) -> Option<MatrixDims> {
        if !misc.has_matrix().await.unwrap_or(false) {
            return None;
        }
        matrix_from_dimensions(&misc.get_matrix_dimensions().await.ok()?)
    }

    async fn build_device(&self, serial: &str) -> Result<Device> {
        let misc = self.misc(serial).await?;
        let name = misc.get_device_name().await?;
        let kind = misc.get_device_type().await?;
        let matrix = self.matrix_dims(&misc).await;

        let chroma = self.chroma(serial).await?;
        let dpi = self.dpi(serial).await?;

        // Capabilities the device lacks answer with UnknownMethod.
        let report = ZoneReport {
            brightness: self.brightness(serial).await?.get_brightness().await.ok(),
            effect: chroma.get_effect().await.ok(),
            effect_colours: chroma.get_effect_colors().await.unwrap_or_default(),
            dpi: dpi
                .get_dpi()
                .await
                .ok()
                .and_then(|xy| Some((i64::from(*xy.first()?), i64::from(*xy.get(1)?)))),
            max_dpi: dpi.max_dpi().await.ok().map(i64::from).filter(|max| *max > 0),
            poll_rate: misc.get_poll_rate().await.ok().map(i64::from),
        };

        let monochromatic = report.effect.is_none() && matrix.is_none();
        let poll_rates = match report.poll_rate {
            Some(_) => options::POLL_RATES
                .iter()
                .filter_map(|hz| u32::try_from(*hz).ok())
                .collect(),
            None => Vec::new(),
        };

        Ok(Device {
            backend: BACKEND_ID.to_string(),
            uid: self.uid_for(serial).await,
            serial: serial.to_string(),
            name,
            form_factor: FormFactor::from_backend(&kind),
            monochromatic,
            matrix,
            dpi: report.max_dpi.and_then(dpi_range),
            poll_rates,
            zones: BTreeMap::from([(MAIN_ZONE.to_string(), options::main_zone(&report))]),
            software: None,
        })
    }

    async fn execute(&self, serial: &str, command: Command) -> Result<()> {
        debug!("OpenRazer {serial}: {command:?}");
        match command {
            Command::Brightness(level) => {
                self.brightness(serial).await?.set_brightness(level).await?
            }
            Command::PollRate(rate) => self.misc(serial).await?.set_poll_rate(rate).await?,
            Command::Dpi(dpi) => self.dpi(serial).await?.set_dpi(dpi, dpi).await?,
            effect => {
                let chroma = self.chroma(serial).await?;
                match effect {
                    Command::None => chroma.set_none().await?,
                    Command::Static((r, g, b)) => chroma.set_static(r, g, b).await?,
                    Command::Spectrum => chroma.set_spectrum().await?,
                    Command::BreathSingle((r, g, b)) => chroma.set_breath_single(r, g, b).await?,
                    Command::BreathDual((r1, g1, b1), (r2, g2, b2)) => {
                        chroma.set_breath_dual(r1, g1, b1, r2, g2, b2).await?
                    }
                    Command::BreathRandom => chroma.set_breath_random().await?,
                    Command::Wave(direction) => chroma.set_wave(direction).await?,
                    Command::Reactive((r, g, b), speed) => {
                        chroma.set_reactive(r, g, b, speed).await?
                    }
                    Command::Brightness(_) | Command::PollRate(_) | Command::Dpi(_) => {}
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for OpenRazerBackend {
    fn id(&self) -> &'static str {
        BACKEND_ID
    }

    async fn list_devices(&self) -> Result<Vec<Device>> {
        let mut devices = Vec::new();
        for serial in self.daemon_serials().await? {
            match self.build_device(&serial).await {
                Ok(device) => devices.push(device),
                Err(e) => warn!("Skipping OpenRazer device {serial}: {e:#}"),
            }
        }
        Ok(devices)
    }

    async fn list_unsupported_devices(&self) -> Result<Vec<PartialDevice>> {
        let mut supported = Vec::new();
        for serial in self.daemon_serials().await? {
            let ids = self
                .misc(&serial)
                .await?
                .get_vid_pid()
                .await
                .unwrap_or_default();
            if let [_, pid] = ids.as_slice() {
                match u16::try_from(*pid) {
                    Ok(pid) => supported.push(pid),
                    Err(_) => warn!("OpenRazer {serial}: product id {pid} out of range"),
                }
            }
        }

        Ok(usb::scan(Path::new(usb::SYSFS_USB))
            .into_iter()
            .filter(|(pid, _)| !supported.contains(pid))
            .map(|(pid, name)| PartialDevice {
                backend: BACKEND_ID.to_string(),
                name,
                vid_pid: Some((usb::RAZER_VID, pid)),
            })
            .collect())
    }

    async fn get_device(&self, uid: DeviceUid) -> Result<Option<Device>> {
        match self.live_serial(uid).await? {
            Some(serial) => Ok(Some(self.build_device(&serial).await?)),
            None => Ok(None),
        }
    }

    async fn get_device_by_serial(&self, serial: &str) -> Result<Option<Device>> {
        if !self.daemon_serials().await?.iter().any(|s| s == serial) {
            return Ok(None);
        }
        Ok(Some(self.build_device(serial).await?))
    }

    async fn set_device_state(
        &self,
        uid: DeviceUid,
        zone: &str,
        option_id: &str,
        option_data: &OptionData,
        colours: &[String],
    ) -> Result<bool> {
        if zone != MAIN_ZONE {
            return Ok(false);
        }
        let Some(command) = options::command_for(option_id, option_data, colours) else {
            return Ok(false);
        };
        let Some(serial) = self.live_serial(uid).await? else {
            return Ok(false);
        };

        self.execute(&serial, command).await?;
        Ok(true)
    }

    async fn get_drawable(&self, uid: DeviceUid) -> Result<Option<Box<dyn Matrix>>> {
        let Some(serial) = self.live_serial(uid).await? else {
            return Ok(None);
        };
        let Some(dims) = self.matrix_dims(&self.misc(&serial).await?).await else {
            return Ok(None);
        };
        Ok(Some(Box::new(RazerMatrix::new(
            self.chroma(&serial).await?,
            dims.rows,
            dims.cols,
        ))))
    }

    async fn troubleshoot(&self) -> Result<Option<Vec<DiagnosticResult>>> {
        let version = DaemonProxy::new(&self.connection).await?.version().await;
        let devices = self.daemon_serials().await;
        let unsupported = usb::scan(Path::new(usb::SYSFS_USB)).len();

        Ok(Some(vec![
            DiagnosticResult {
                test: String::from("daemon responds"),
                passed: version.is_ok(),
                detail: Some(match version {
                    Ok(v) => format!("version {v}"),
                    Err(e) => e.to_string(),
                }),
            },
            DiagnosticResult {
                test: String::from("devices enumerate"),
                passed: devices.is_ok(),
                detail: Some(match &devices {
                    Ok(serials) => format!(
                        "{} device(s), {unsupported} Razer USB device(s)",
                        serials.len()
                    ),
                    Err(e) => format!("{e:#}"),
                }),
            },
        ]))
    }

    async fn restart(&self) -> Result<()> {
        if let Err(e) = DaemonProxy::new(&self.connection).await?.stop().await {
            warn!("OpenRazer daemon did not stop cleanly: {e}");
        }
        let status = Process::new("openrazer-daemon")
            .status()
            .context("Failed to launch openrazer-daemon")?;
        if !status.success() {
            bail!("openrazer-daemon exited with {status}");
        }
        info!("OpenRazer daemon restarted");
        Ok(())
    }
}

/// Rows and columns reported by the daemon; anything not positive means no matrix.
fn matrix_from_dimensions(raw: &[i32]) -> Option<MatrixDims> {
    let [rows, cols] = raw else {
        return None;
    };
    Some(MatrixDims {
        rows: u32::try_from(*rows).ok().filter(|r| *r > 0)?,
        cols: u32::try_from(*cols).ok().filter(|c| *c > 0)?,
    })
}

fn dpi_range(max: i64) -> Option<DpiRange> {
    let max = u32::try_from(max).ok().filter(|max| *max >= 100)?;
    Some(DpiRange { min: 100, max })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn matrix_dimensions_must_be_positive() {
        assert_eq!(
            matrix_from_dimensions(&[6, 22]),
            Some(MatrixDims { rows: 6, cols: 22 })
        );
        assert_eq!(matrix_from_dimensions(&[-1, 22]), None);
        assert_eq!(matrix_from_dimensions(&[6, 0]), None);
        assert_eq!(matrix_from_dimensions(&[6]), None);
    }

    #[test]
    fn dpi_range_rejects_values_out_of_range() {
        assert_eq!(dpi_range(16000), Some(DpiRange { min: 100, max: 16000 }));
        assert_eq!(dpi_range(-1), None);
        assert_eq!(dpi_range(i64::from(u32::MAX) + 1), None);
    }
}
