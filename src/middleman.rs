//! Aggregator over every loaded backend.
//!
//! The [`Middleman`] presents one device model regardless of how many
//! backends are loaded and turns every backend failure into a diagnostic
//! string, so callers never see backend-specific error types. Every state
//! change that could conflict with a software painter goes through the
//! ownership hand-off in [`Middleman::set_device_state`].

use std::{collections::BTreeMap, sync::Arc};

use futures::future::join_all;
use log::{debug, info, warn};

use crate::{
    backend::{Backend, BackendLoader, LoadResult, Matrix},
    config::Config,
    device::{
        ALWAYS_ALLOWED_OPTIONS, ActiveOption, Device, DeviceUid, DiagnosticResult, OptionData,
        OptionKind, PartialDevice, is_hex_colour,
    },
    process::ProcessCoordinator,
    state::{SoftwareOwner, SoftwareStateStore},
};

/// Result of an aggregator call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Ok(T),
    /// The device vanished between listing and lookup.
    NotFound,
    /// Unknown backend, or a request the device cannot honour.
    Invalid,
    /// The backend failed; the text describes why.
    BackendError(String),
}

impl<T> Outcome<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Outcome::Ok(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Ok(value) => Outcome::Ok(f(value)),
            Outcome::NotFound => Outcome::NotFound,
            Outcome::Invalid => Outcome::Invalid,
            Outcome::BackendError(e) => Outcome::BackendError(e),
        }
    }
}

fn backend_error<T>(backend: &str, what: &str, e: anyhow::Error) -> Outcome<T> {
    warn!("{backend}: {what} failed: {e:#}");
    Outcome::BackendError(format!("{e:#}"))
}

/// Load state of one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendStatus {
    Loaded,
    NotInstalled,
    ImportError(String),
}

pub struct Middleman {
    backends: Vec<Box<dyn Backend>>,
    status: BTreeMap<String, BackendStatus>,
    coordinator: Arc<ProcessCoordinator>,
    states: SoftwareStateStore,
    default_colour: String,
}

impl Middleman {
    /// Tries every loader. A backend that fails to load is recorded, never fatal.
    pub async fn init(
        config: &Config,
        coordinator: Arc<ProcessCoordinator>,
        loaders: &[Box<dyn BackendLoader>],
    ) -> Self {
        let results = join_all(
            loaders
                .iter()
                .map(|loader| async move { (loader.id(), loader.load(config).await) }),
        )
        .await;

        let mut backends = Vec::new();
        let mut status = BTreeMap::new();
        for (id, result) in results {
            let state = match result {
                LoadResult::Loaded(backend) => {
                    info!("Backend '{id}' loaded");
                    backends.push(backend);
                    BackendStatus::Loaded
                }
                LoadResult::NotInstalled => {
                    info!("Backend '{id}' is not installed");
                    BackendStatus::NotInstalled
                }
                LoadResult::ImportError(e) => {
                    warn!("Backend '{id}' failed to load: {e}");
                    BackendStatus::ImportError(e)
                }
            };
            status.insert(id.to_string(), state);
        }

        let mut middleman = Self::from_backends(config, coordinator, Vec::new());
        middleman.backends = backends;
        middleman.status = status;
        middleman
    }

    /// Wraps already-constructed backends, all reported as loaded.
    pub fn from_backends(
        config: &Config,
        coordinator: Arc<ProcessCoordinator>,
        backends: Vec<Box<dyn Backend>>,
    ) -> Self {
        let status = backends
            .iter()
            .map(|b| (b.id().to_string(), BackendStatus::Loaded))
            .collect();
        Self {
            backends,
            status,
            coordinator,
            states: SoftwareStateStore::new(config.state_dir()),
            default_colour: config.bulk.default_colour.clone(),
        }
    }

    pub fn backend_status(&self) -> &BTreeMap<String, BackendStatus> {
        &self.status
    }

    pub fn states(&self) -> &SoftwareStateStore {
        &self.states
    }

    pub fn coordinator(&self) -> &ProcessCoordinator {
        &self.coordinator
    }

    pub fn default_colour(&self) -> &str {
        &self.default_colour
    }

    fn backend(&self, id: &str) -> Option<&dyn Backend> {
        self.backends
            .iter()
            .find(|b| b.id() == id)
            .map(|b| b.as_ref())
    }

    /// Devices of every backend. A failing backend is omitted for this call.
    pub async fn get_device_list(&self) -> Vec<Device> {
        let lists = join_all(self.backends.iter().map(|b| b.list_devices())).await;

        let mut devices = Vec::new();
        for (backend, list) in self.backends.iter().zip(lists) {
            match list {
                Ok(list) => devices.extend(list),
                Err(e) => warn!("{}: listing devices failed: {e:#}", backend.id()),
            }
        }
        for device in &mut devices {
            self.attach_software(device);
        }
        devices
    }

    pub async fn get_unsupported_devices(&self) -> Vec<PartialDevice> {
        let lists = join_all(self.backends.iter().map(|b| b.list_unsupported_devices())).await;

        self.backends
            .iter()
            .zip(lists)
            .filter_map(|(backend, list)| {
                list.inspect_err(|e| {
                    warn!("{}: listing unsupported devices failed: {e:#}", backend.id())
                })
                .ok()
            })
            .flatten()
            .collect()
    }

    /// One device merged with its software state.
    pub async fn get_device(&self, backend_id: &str, uid: DeviceUid) -> Outcome<Device> {
        let Some(backend) = self.backend(backend_id) else {
            return Outcome::Invalid;
        };
        match backend.get_device(uid).await {
            Ok(Some(mut device)) => {
                self.attach_software(&mut device);
                Outcome::Ok(device)
            }
            Ok(None) => Outcome::NotFound,
            Err(e) => backend_error(backend_id, "get_device", e),
        }
    }

    /// Fills `device.software`. An effect record whose painter is gone is
    /// cleared rather than reported.
    fn attach_software(&self, device: &mut Device) {
        let serial = device.serial.as_str();
        device.software = match self.states.get_owner(serial) {
            Ok(Some(SoftwareOwner::Effect(effect))) if !self.coordinator.is_locked(serial) => {
                debug!(
                    "Effect '{}' on {serial} has no running painter, clearing",
                    effect.name
                );
                if let Err(e) = self.states.clear_effect(serial) {
                    warn!("{e:#}");
                }
                None
            }
            Ok(owner) => owner,
            Err(e) => {
                warn!("{e:#}");
                None
            }
        };
    }

    /// Applies an option, first taking the device away from any software owner.
    ///
    /// Unless `option_id` is one of [`ALWAYS_ALLOWED_OPTIONS`], the owner of
    /// `serial` is asked to stop and both software records are cleared
    /// before the backend is called.
    #[allow(clippy::too_many_arguments)]
    pub async fn set_device_state(
        &self,
        backend_id: &str,
        uid: DeviceUid,
        serial: &str,
        zone: &str,
        option_id: &str,
        option_data: &OptionData,
        colours: &[String],
    ) -> Outcome<()> {
        let Some(backend) = self.backend(backend_id) else {
            return Outcome::Invalid;
        };

        if !ALWAYS_ALLOWED_OPTIONS.contains(&option_id) {
            self.take_from_software(serial).await;
        }

        match backend
            .set_device_state(uid, zone, option_id, option_data, colours)
            .await
        {
            Ok(true) => Outcome::Ok(()),
            Ok(false) => {
                debug!("{backend_id}: {option_id} not valid for {serial}/{zone}");
                Outcome::Invalid
            }
            Err(e) => backend_error(backend_id, "set_device_state", e),
        }
    }

    /// A painter that outlives the stop grace period does not block the change.
    async fn take_from_software(&self, serial: &str) {
        self.coordinator.stop_and_wait(serial).await;

        if let Err(e) = self.states.clear_all(serial) {
            warn!("{e:#}");
        }
    }

    /// Finds the active effect option, in `zone` or across all zones.
    ///
    /// Zones are scanned in name order and the last active effect found
    /// wins. Pass a zone to get that zone's answer.
    pub fn get_current_device_option(device: &Device, zone: Option<&str>) -> Option<ActiveOption> {
        device
            .zones
            .iter()
            .filter(|(name, _)| zone.is_none_or(|z| z == name.as_str()))
            .flat_map(|(name, options)| options.iter().map(move |option| (name, option)))
            .filter(|(_, option)| option.kind == OptionKind::Effect && option.active)
            .map(|(name, option)| ActiveOption {
                zone: name.clone(),
                option_id: option.id.clone(),
                parameter: option.active_parameter().cloned(),
                colours: option.colours.clone(),
                colours_required: option.colours_needed(),
            })
            .last()
    }

    /// Restores what a device showed before a transient override.
    ///
    /// A recorded software effect is restarted; otherwise the active
    /// hardware option is sent again with its colours. `Invalid` means
    /// there was nothing to restore.
    pub async fn replay_active_effect(
        &self,
        backend_id: &str,
        uid: DeviceUid,
        zone: Option<&str>,
    ) -> Outcome<()> {
        let Some(backend) = self.backend(backend_id) else {
            return Outcome::Invalid;
        };
        let device = match backend.get_device(uid).await {
            Ok(Some(device)) => device,
            Ok(None) => return Outcome::NotFound,
            Err(e) => return backend_error(backend_id, "get_device", e),
        };

        match self.states.get_effect(&device.serial) {
            Ok(Some(effect)) => {
                return if self.coordinator.run_effect(&device.serial, &effect.path).await {
                    Outcome::Ok(())
                } else {
                    Outcome::BackendError(format!("could not start '{}'", effect.name))
                };
            }
            Ok(None) => {}
            Err(e) => warn!("{e:#}"),
        }

        let Some(active) = Self::get_current_device_option(&device, zone) else {
            return Outcome::Invalid;
        };
        match backend
            .set_device_state(uid, &active.zone, &active.option_id, &active.data(), &active.colours)
            .await
        {
            Ok(true) => Outcome::Ok(()),
            Ok(false) => Outcome::Invalid,
            Err(e) => backend_error(backend_id, "replay", e),
        }
    }

    /// Re-applies the active option of `zone` with colour slot `index` replaced.
    ///
    /// Returns false when the zone has no active colour-bearing option.
    pub async fn set_device_colour(
        &self,
        device: &Device,
        zone: &str,
        hex: &str,
        index: usize,
    ) -> bool {
        if !is_hex_colour(hex) {
            return false;
        }
        let Some(active) = Self::get_current_device_option(device, Some(zone)) else {
            return false;
        };
        if !active.is_colour_bearing() || index >= active.colours_required {
            return false;
        }

        let mut colours = active.colours.clone();
        colours.resize(active.colours_required, self.default_colour.clone());
        colours[index] = hex.to_string();

        self.set_device_state(
            &device.backend,
            device.uid,
            &device.serial,
            zone,
            &active.option_id,
            &active.data(),
            &colours,
        )
        .await
        .is_ok()
    }

    pub async fn get_drawable(&self, backend_id: &str, uid: DeviceUid) -> Outcome<Box<dyn Matrix>> {
        let Some(backend) = self.backend(backend_id) else {
            return Outcome::Invalid;
        };
        match backend.get_drawable(uid).await {
            Ok(Some(matrix)) => Outcome::Ok(matrix),
            Ok(None) => Outcome::Invalid,
            Err(e) => backend_error(backend_id, "get_drawable", e),
        }
    }

    pub async fn troubleshoot(&self, backend_id: &str) -> Outcome<Option<Vec<DiagnosticResult>>> {
        let Some(backend) = self.backend(backend_id) else {
            return Outcome::Invalid;
        };
        match backend.troubleshoot().await {
            Ok(results) => Outcome::Ok(results),
            Err(e) => backend_error(backend_id, "troubleshoot", e),
        }
    }

    pub async fn restart(&self, backend_id: &str) -> Outcome<()> {
        let Some(backend) = self.backend(backend_id) else {
            return Outcome::Invalid;
        };
        match backend.restart().await {
            Ok(()) => Outcome::Ok(()),
            Err(e) => backend_error(backend_id, "restart", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        process::ProcessProbe,
        test_support::{
            Journal, MockBackend, TestProbe, device, entries, hold_lock, install_component, journal,
        },
    };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::{path::Path, time::Duration};

    const OWN_PID: u32 = 100;
    const PAINTER_PID: u32 = 777;

    struct Fixture {
        _dir: tempfile::TempDir,
        config: Config,
        probe: Arc<TestProbe>,
        journal: Journal,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let mut config = Config::rooted_at(dir.path());
            config.process.stop_grace_ms = 200;
            config.process.stop_poll_ms = 10;
            let journal = journal();
            let probe = Arc::new(TestProbe::new(OWN_PID, journal.clone()));
            Self {
                _dir: dir,
                config,
                probe,
                journal,
            }
        }

        fn coordinator(&self) -> Arc<ProcessCoordinator> {
            let probe: Arc<dyn ProcessProbe> = self.probe.clone();
            Arc::new(ProcessCoordinator::with_probe(&self.config, probe))
        }

        fn middleman(&self, backends: Vec<Box<dyn Backend>>) -> Middleman {
            Middleman::from_backends(&self.config, self.coordinator(), backends)
        }

        fn states(&self) -> SoftwareStateStore {
            SoftwareStateStore::new(self.config.state_dir())
        }

        fn running_painter(&self, serial: &str) {
            hold_lock(&self.config, serial, PAINTER_PID);
            self.probe.revive(PAINTER_PID);
            self.states()
                .set_effect(serial, "Rainbow", "rainbow.svg", Path::new("/fx/rainbow.json"))
                .unwrap();
        }
    }

    struct TestLoader {
        id: &'static str,
        outcome: fn(Journal) -> LoadResult,
        journal: Journal,
    }

    #[async_trait]
    impl BackendLoader for TestLoader {
        fn id(&self) -> &'static str {
            self.id
        }

        async fn load(&self, _config: &Config) -> LoadResult {
            (self.outcome)(self.journal.clone())
        }
    }

    #[tokio::test]
    async fn init_records_every_backend_outcome() {
        let fx = Fixture::new();
        let loaders: Vec<Box<dyn BackendLoader>> = vec![
            Box::new(TestLoader {
                id: "good",
                outcome: |j| LoadResult::Loaded(Box::new(MockBackend::new("good", vec![], j))),
                journal: fx.journal.clone(),
            }),
            Box::new(TestLoader {
                id: "absent",
                outcome: |_| LoadResult::NotInstalled,
                journal: fx.journal.clone(),
            }),
            Box::new(TestLoader {
                id: "broken",
                outcome: |_| LoadResult::ImportError("symbol not found".into()),
                journal: fx.journal.clone(),
            }),
        ];

        let mm = Middleman::init(&fx.config, fx.coordinator(), &loaders).await;

        assert_eq!(
            mm.backend_status(),
            &BTreeMap::from([
                ("absent".to_string(), BackendStatus::NotInstalled),
                ("broken".to_string(), BackendStatus::ImportError("symbol not found".into())),
                ("good".to_string(), BackendStatus::Loaded),
            ])
        );
        assert_eq!(mm.get_device("absent", 0).await, Outcome::Invalid);
    }

    #[tokio::test]
    async fn device_list_omits_failing_backend() {
        let fx = Fixture::new();
        let mm = fx.middleman(vec![
            Box::new(MockBackend::new(
                "a",
                vec![device("a", 0, "A0"), device("a", 1, "A1")],
                fx.journal.clone(),
            )),
            Box::new(MockBackend::failing("b", vec![device("b", 0, "B0")], fx.journal.clone())),
        ]);

        let serials: Vec<String> = mm
            .get_device_list()
            .await
            .into_iter()
            .map(|d| d.serial)
            .collect();
        assert_eq!(serials, vec!["A0".to_string(), "A1".to_string()]);
        assert_eq!(mm.get_unsupported_devices().await.len(), 1);
    }

    #[tokio::test]
    async fn get_device_distinguishes_outcomes() {
        let fx = Fixture::new();
        let mm = fx.middleman(vec![
            Box::new(MockBackend::new("a", vec![device("a", 0, "A0")], fx.journal.clone())),
            Box::new(MockBackend::failing("b", vec![], fx.journal.clone())),
        ]);

        assert!(mm.get_device("a", 0).await.is_ok());
        assert_eq!(mm.get_device("a", 9).await, Outcome::NotFound);
        assert_eq!(
            mm.get_device("b", 0).await,
            Outcome::BackendError("b daemon is not responding".into())
        );
        assert_eq!(mm.get_device("zzz", 0).await, Outcome::Invalid);
    }

    #[tokio::test]
    async fn get_device_merges_live_effect_and_drops_dead_one() {
        let fx = Fixture::new();
        let mm = fx.middleman(vec![Box::new(MockBackend::new(
            "a",
            vec![device("a", 0, "A0"), device("a", 1, "A1")],
            fx.journal.clone(),
        ))]);
        fx.running_painter("A0");
        fx.states()
            .set_effect("A1", "Orphan", "", Path::new("/fx/orphan.json"))
            .unwrap();

        let live = mm.get_device("a", 0).await.ok().unwrap();
        assert!(matches!(live.software, Some(SoftwareOwner::Effect(ref e)) if e.name == "Rainbow"));

        let orphan = mm.get_device("a", 1).await.ok().unwrap();
        assert_eq!(orphan.software, None);
        assert_eq!(fx.states().get_effect("A1").unwrap(), None);
    }

    #[tokio::test]
    async fn hardware_option_hands_off_in_order() {
        let fx = Fixture::new();
        let backend = MockBackend::new("a", vec![device("a", 0, "A0")], fx.journal.clone())
            .observing(fx.states());
        let mm = fx.middleman(vec![Box::new(backend)]);
        fx.running_painter("A0");

        let outcome = mm
            .set_device_state("a", 0, "A0", "main", "spectrum", &OptionData::None, &[])
            .await;

        assert_eq!(outcome, Outcome::Ok(()));
        assert_eq!(
            entries(&fx.journal),
            vec![
                format!("signal Stop {PAINTER_PID}"),
                "owner on file: false".to_string(),
                "backend A0 main spectrum - ".to_string(),
            ]
        );
        assert_eq!(fx.states().get_owner("A0").unwrap(), None);
        assert!(!mm.coordinator().is_locked("A0"));
    }

    #[tokio::test]
    async fn painter_ignoring_stop_delays_hand_off_by_grace_only() {
        let fx = Fixture::new();
        let backend = MockBackend::new("a", vec![device("a", 0, "A0")], fx.journal.clone())
            .observing(fx.states());
        let mm = fx.middleman(vec![Box::new(backend)]);
        fx.running_painter("A0");
        fx.probe.ignore_stop(PAINTER_PID);

        let started = std::time::Instant::now();
        let outcome = mm
            .set_device_state("a", 0, "A0", "main", "spectrum", &OptionData::None, &[])
            .await;
        let waited = started.elapsed();

        assert_eq!(outcome, Outcome::Ok(()));
        assert!(waited >= Duration::from_millis(200), "returned after {waited:?}");
        assert!(waited < Duration::from_secs(2), "returned after {waited:?}");
        assert_eq!(
            entries(&fx.journal),
            vec![
                format!("signal Stop {PAINTER_PID}"),
                "owner on file: false".to_string(),
                "backend A0 main spectrum - ".to_string(),
            ]
        );
        assert!(mm.coordinator().is_locked("A0"));
    }

    #[tokio::test]
    async fn preset_record_cleared_by_hardware_option() {
        let fx = Fixture::new();
        let mm = fx.middleman(vec![Box::new(MockBackend::new(
            "a",
            vec![device("a", 0, "A0")],
            fx.journal.clone(),
        ))]);
        fx.states()
            .set_preset("A0", "Evening", "", Path::new("/presets/evening.json"))
            .unwrap();

        mm.set_device_state("a", 0, "A0", "main", "spectrum", &OptionData::None, &[])
            .await;

        assert_eq!(fx.states().get_preset("A0").unwrap(), None);
    }

    #[tokio::test]
    async fn always_allowed_options_leave_owner_alone() {
        let fx = Fixture::new();
        let mm = fx.middleman(vec![Box::new(MockBackend::new(
            "a",
            vec![device("a", 0, "A0")],
            fx.journal.clone(),
        ))]);
        fx.running_painter("A0");

        let outcome = mm
            .set_device_state("a", 0, "A0", "main", "brightness", &OptionData::Level(40), &[])
            .await;

        assert_eq!(outcome, Outcome::Ok(()));
        assert_eq!(
            entries(&fx.journal),
            vec!["backend A0 main brightness 40 ".to_string()]
        );
        assert!(fx.states().get_effect("A0").unwrap().is_some());
        assert!(mm.coordinator().is_locked("A0"));
    }

    #[tokio::test]
    async fn unknown_option_is_invalid_and_backend_failure_is_text() {
        let fx = Fixture::new();
        let mm = fx.middleman(vec![
            Box::new(MockBackend::new("a", vec![device("a", 0, "A0")], fx.journal.clone())),
            Box::new(MockBackend::failing("b", vec![device("b", 0, "B0")], fx.journal.clone())),
        ]);

        assert_eq!(
            mm.set_device_state("a", 0, "A0", "main", "lasers", &OptionData::None, &[])
                .await,
            Outcome::Invalid
        );
        assert!(matches!(
            mm.set_device_state("b", 0, "B0", "main", "spectrum", &OptionData::None, &[])
                .await,
            Outcome::BackendError(_)
        ));
    }

    #[test]
    fn current_option_last_zone_wins_unless_zone_given() {
        let mut dev = device("a", 0, "A0");
        let mut logo = dev.zones["main"].clone();
        for option in &mut logo {
            option.active = option.id == "breath";
        }
        logo[2].parameters[1].active = true;
        dev.zones.insert("logo".to_string(), logo);

        let any = Middleman::get_current_device_option(&dev, None).unwrap();
        assert_eq!((any.zone.as_str(), any.option_id.as_str()), ("main", "static"));

        let logo = Middleman::get_current_device_option(&dev, Some("logo")).unwrap();
        assert_eq!(logo.option_id, "breath");
        assert_eq!(logo.colours_required, 2);
        assert_eq!(logo.data(), OptionData::Choice("dual".into()));

        assert_eq!(Middleman::get_current_device_option(&dev, Some("wheel")), None);
    }

    #[tokio::test]
    async fn set_device_colour_substitutes_one_slot() {
        let fx = Fixture::new();
        let mut dev = device("a", 0, "A0");
        {
            let breath = &mut dev.zones.get_mut("main").unwrap()[2];
            breath.active = true;
            breath.parameters[1].active = true;
            breath.colours = vec!["#111111".into()];
        }
        dev.zones.get_mut("main").unwrap()[1].active = false;
        let mm = fx.middleman(vec![Box::new(MockBackend::new(
            "a",
            vec![dev.clone()],
            fx.journal.clone(),
        ))]);

        assert!(mm.set_device_colour(&dev, "main", "#0000FF", 1).await);
        assert_eq!(
            entries(&fx.journal),
            vec!["backend A0 main breath dual #111111,#0000FF".to_string()]
        );

        assert!(!mm.set_device_colour(&dev, "main", "#0000FF", 2).await);
        assert!(!mm.set_device_colour(&dev, "main", "blue", 0).await);
    }

    #[tokio::test]
    async fn set_device_colour_needs_colour_bearing_option() {
        let fx = Fixture::new();
        let mut dev = device("a", 0, "A0");
        for option in dev.zones.get_mut("main").unwrap() {
            option.active = option.id == "spectrum";
        }
        let mm = fx.middleman(vec![Box::new(MockBackend::new(
            "a",
            vec![dev.clone()],
            fx.journal.clone(),
        ))]);

        assert!(!mm.set_device_colour(&dev, "main", "#0000FF", 0).await);
        assert!(entries(&fx.journal).is_empty());
    }

    #[tokio::test]
    async fn replay_prefers_software_effect() {
        let fx = Fixture::new();
        install_component(&fx.config, "helper");
        let mm = fx.middleman(vec![Box::new(MockBackend::new(
            "a",
            vec![device("a", 0, "A0")],
            fx.journal.clone(),
        ))]);
        fx.states()
            .set_effect("A0", "Rainbow", "", Path::new("/fx/rainbow.json"))
            .unwrap();

        assert_eq!(mm.replay_active_effect("a", 0, None).await, Outcome::Ok(()));
        assert_eq!(
            entries(&fx.journal),
            vec![
                "spawn polychromatic-helper --run-fx /fx/rainbow.json --device-serial A0"
                    .to_string()
            ]
        );
    }

    #[tokio::test]
    async fn replay_resends_hardware_option() {
        let fx = Fixture::new();
        let mm = fx.middleman(vec![Box::new(MockBackend::new(
            "a",
            vec![device("a", 0, "A0")],
            fx.journal.clone(),
        ))]);

        assert_eq!(mm.replay_active_effect("a", 0, Some("main")).await, Outcome::Ok(()));
        assert_eq!(
            entries(&fx.journal),
            vec!["backend A0 main static - #FF0000".to_string()]
        );
        assert_eq!(mm.replay_active_effect("a", 5, None).await, Outcome::NotFound);
    }

    #[tokio::test]
    async fn diagnostics_pass_through() {
        let fx = Fixture::new();
        let mm = fx.middleman(vec![Box::new(MockBackend::new("a", vec![], fx.journal.clone()))]);

        let results = mm.troubleshoot("a").await.ok().flatten().unwrap();
        assert!(results.iter().all(|r| r.passed));
        assert!(matches!(mm.restart("a").await, Outcome::BackendError(_)));
        assert!(matches!(mm.get_drawable("a", 0).await, Outcome::Invalid));
    }

    #[test]
    fn outcome_map_keeps_failures() {
        let failed: Outcome<u8> = Outcome::BackendError("x".into());
        assert_eq!(failed.map(|v| v + 1), Outcome::BackendError("x".into()));
        assert_eq!(Outcome::Ok(1).map(|v| v + 1), Outcome::Ok(2));
    }
}
