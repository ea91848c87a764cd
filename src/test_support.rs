//! Doubles shared by the aggregator and bulk-apply tests.

use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::Path,
    sync::{Arc, Mutex},
};

use anyhow::{Result, bail};
use async_trait::async_trait;

use crate::{
    backend::{Backend, Matrix},
    config::Config,
    device::{
        Device, DeviceOption, DeviceUid, DiagnosticResult, FormFactor, OptionData, OptionKind,
        Parameter, PartialDevice,
    },
    process::{ControlSignal, ProcessProbe},
    state::SoftwareStateStore,
};

/// Ordered record of observable side effects.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

/// Keyboard-like device whose `main` zone runs a red static effect.
pub fn device(backend: &str, uid: DeviceUid, serial: &str) -> Device {
    let mut static_fx = DeviceOption::new("static", OptionKind::Effect);
    static_fx.active = true;
    static_fx.colours_required = 1;
    static_fx.colours = vec![String::from("#FF0000")];

    let mut breath = DeviceOption::new("breath", OptionKind::Effect);
    breath.colours_required = 1;
    breath.parameters = vec![
        Parameter {
            id: "single".into(),
            data: OptionData::Choice("single".into()),
            colours_required: 1,
            active: false,
        },
        Parameter {
            id: "dual".into(),
            data: OptionData::Choice("dual".into()),
            colours_required: 2,
            active: false,
        },
    ];

    let mut brightness = DeviceOption::new("brightness", OptionKind::Slider);
    brightness.max = 100;
    brightness.value = OptionData::Level(80);

    Device {
        backend: backend.to_string(),
        uid,
        serial: serial.to_string(),
        name: format!("Test device {serial}"),
        form_factor: FormFactor::Keyboard,
        monochromatic: false,
        matrix: None,
        dpi: None,
        poll_rates: Vec::new(),
        zones: BTreeMap::from([(
            String::from("main"),
            vec![
                DeviceOption::new("spectrum", OptionKind::Effect),
                static_fx,
                breath,
                brightness,
            ],
        )]),
        software: None,
    }
}

/// Backend serving a fixed device list and journaling every state change.
#[derive(Debug)]
pub struct MockBackend {
    id: &'static str,
    devices: Vec<Device>,
    failing: bool,
    faulty_writes: bool,
    journal: Journal,
    /// When set, each state change also records whether a software owner
    /// was still on file at the moment the backend was called.
    states: Option<SoftwareStateStore>,
}

impl MockBackend {
    pub fn new(id: &'static str, devices: Vec<Device>, journal: Journal) -> Self {
        Self {
            id,
            devices,
            failing: false,
            faulty_writes: false,
            journal,
            states: None,
        }
    }

    /// Backend whose every call fails.
    pub fn failing(id: &'static str, devices: Vec<Device>, journal: Journal) -> Self {
        Self {
            failing: true,
            ..Self::new(id, devices, journal)
        }
    }

    /// Backend that lists devices but fails every state change.
    pub fn faulty_writes(id: &'static str, devices: Vec<Device>, journal: Journal) -> Self {
        Self {
            faulty_writes: true,
            ..Self::new(id, devices, journal)
        }
    }

    pub fn observing(mut self, states: SoftwareStateStore) -> Self {
        self.states = Some(states);
        self
    }

    fn check(&self) -> Result<()> {
        if self.failing {
            bail!("{} daemon is not responding", self.id);
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn id(&self) -> &'static str {
        self.id
    }

    async fn list_devices(&self) -> Result<Vec<Device>> {
        self.check()?;
        Ok(self.devices.clone())
    }

    async fn list_unsupported_devices(&self) -> Result<Vec<PartialDevice>> {
        self.check()?;
        Ok(vec![PartialDevice {
            backend: self.id.to_string(),
            name: String::from("Mystery mouse"),
            vid_pid: Some((0x1532, 0xFFFF)),
        }])
    }

    async fn get_device(&self, uid: DeviceUid) -> Result<Option<Device>> {
        self.check()?;
        Ok(self.devices.iter().find(|d| d.uid == uid).cloned())
    }

    async fn get_device_by_serial(&self, serial: &str) -> Result<Option<Device>> {
        self.check()?;
        Ok(self.devices.iter().find(|d| d.serial == serial).cloned())
    }

    async fn set_device_state(
        &self,
        uid: DeviceUid,
        zone: &str,
        option_id: &str,
        option_data: &OptionData,
        colours: &[String],
    ) -> Result<bool> {
        let serial = self
            .devices
            .iter()
            .find(|d| d.uid == uid)
            .map(|d| d.serial.clone())
            .unwrap_or_default();

        if self.failing || self.faulty_writes {
            self.journal
                .lock()
                .unwrap()
                .push(format!("backend failed {serial}"));
            bail!("{} rejected {option_id}", self.id);
        }

        if let Some(states) = &self.states {
            let owner = states.get_owner(&serial).unwrap();
            self.journal
                .lock()
                .unwrap()
                .push(format!("owner on file: {}", owner.is_some()));
        }

        let known = self
            .devices
            .iter()
            .find(|d| d.uid == uid)
            .is_some_and(|d| d.zone_options(zone).iter().any(|o| o.id == option_id));
        self.journal.lock().unwrap().push(format!(
            "backend {serial} {zone} {option_id} {option_data} {}",
            colours.join(",")
        ));
        Ok(known)
    }

    async fn get_drawable(&self, _uid: DeviceUid) -> Result<Option<Box<dyn Matrix>>> {
        self.check()?;
        Ok(None)
    }

    async fn troubleshoot(&self) -> Result<Option<Vec<DiagnosticResult>>> {
        self.check()?;
        Ok(Some(vec![DiagnosticResult {
            test: String::from("mock responds"),
            passed: true,
            detail: None,
        }]))
    }
}

/// Probe over a simulated process table. Stopped processes die at once
/// unless marked with [`TestProbe::ignore_stop`].
pub struct TestProbe {
    pid: u32,
    alive: Mutex<HashSet<u32>>,
    stubborn: Mutex<HashSet<u32>>,
    journal: Journal,
}

impl TestProbe {
    pub fn new(pid: u32, journal: Journal) -> Self {
        Self {
            pid,
            alive: Mutex::new(HashSet::from([pid])),
            stubborn: Mutex::new(HashSet::new()),
            journal,
        }
    }

    pub fn revive(&self, pid: u32) {
        self.alive.lock().unwrap().insert(pid);
    }

    /// `pid` keeps running after a Stop request.
    pub fn ignore_stop(&self, pid: u32) {
        self.stubborn.lock().unwrap().insert(pid);
    }
}

impl ProcessProbe for TestProbe {
    fn current_pid(&self) -> u32 {
        self.pid
    }

    fn is_running(&self, pid: u32) -> bool {
        self.alive.lock().unwrap().contains(&pid)
    }

    fn belongs_to_family(&self, _pid: u32, _family: &str) -> bool {
        true
    }

    fn signal(&self, pid: u32, signal: ControlSignal) -> Result<()> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("signal {signal:?} {pid}"));
        if signal == ControlSignal::Stop && !self.stubborn.lock().unwrap().contains(&pid) {
            self.alive.lock().unwrap().remove(&pid);
        }
        Ok(())
    }

    fn spawn(&self, program: &Path, args: &[String]) -> Result<u32> {
        let name = program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.journal
            .lock()
            .unwrap()
            .push(format!("spawn {name} {}", args.join(" ")));
        Ok(4242)
    }
}

/// Writes a lock file for `name` as if `pid` had acquired it.
pub fn hold_lock(config: &Config, name: &str, pid: u32) {
    fs::create_dir_all(config.lock_dir()).unwrap();
    fs::write(config.lock_dir().join(name), pid.to_string()).unwrap();
}

/// Installs an executable stub for a component in the install dir.
pub fn install_component(config: &Config, name: &str) {
    fs::create_dir_all(&config.paths.install_dir).unwrap();
    fs::write(
        config
            .paths
            .install_dir
            .join(format!("{}-{name}", config.process.app_family)),
        "#!/bin/sh\n",
    )
    .unwrap();
}
