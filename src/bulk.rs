//! One lighting choice applied across every connected device.

use log::{debug, info, warn};

use crate::{
    device::{Device, OptionData, is_hex_colour},
    middleman::{Middleman, Outcome},
};

/// A device zone touched by a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub serial: String,
    pub zone: String,
}

/// What happened to each target of a sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkReport {
    pub applied: Vec<Target>,
    /// Targets the request did not apply to.
    pub skipped: Vec<Target>,
    /// Targets whose backend failed, with the diagnostic.
    pub failed: Vec<(Target, String)>,
}

impl BulkReport {
    fn record(&mut self, target: Target, outcome: Outcome<()>) {
        match outcome {
            Outcome::Ok(()) => self.applied.push(target),
            Outcome::NotFound | Outcome::Invalid => self.skipped.push(target),
            Outcome::BackendError(e) => {
                warn!("Bulk apply failed on {}/{}: {e}", target.serial, target.zone);
                self.failed.push((target, e));
            }
        }
    }
}

/// Sweeps over the aggregator's devices. Every change goes through
/// [`Middleman::set_device_state`], so software owners are stopped first.
pub struct BulkApply<'a> {
    middleman: &'a Middleman,
}

impl<'a> BulkApply<'a> {
    pub fn new(middleman: &'a Middleman) -> Self {
        Self { middleman }
    }

    /// Sets `option_id` on every zone that offers it.
    ///
    /// Each zone keeps the colours it currently shows, padded with the
    /// default colour up to `colours_needed`.
    pub async fn set_bulk_option(
        &self,
        option_id: &str,
        option_data: &OptionData,
        colours_needed: usize,
    ) -> BulkReport {
        let mut report = BulkReport::default();

        for device in self.middleman.get_device_list().await {
            for (zone, options) in &device.zones {
                let Some(option) = options.iter().find(|o| o.id == option_id) else {
                    continue;
                };

                let mut colours = Middleman::get_current_device_option(&device, Some(zone))
                    .map(|active| active.colours)
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| option.colours.clone());
                colours.resize(colours_needed, self.middleman.default_colour().to_string());

                let outcome = self
                    .apply(&device, zone, option_id, option_data, &colours)
                    .await;
                report.record(target(&device, zone), outcome);
            }
        }

        info!(
            "Bulk {option_id}: {} applied, {} skipped, {} failed",
            report.applied.len(),
            report.skipped.len(),
            report.failed.len()
        );
        report
    }

    /// Puts `hex` into the first colour slot of each zone's active option.
    ///
    /// Zones without an active colour-bearing option are skipped.
    /// `Invalid` when `hex` is not a `#RRGGBB` colour.
    pub async fn set_bulk_colour(&self, hex: &str) -> Outcome<BulkReport> {
        if !is_hex_colour(hex) {
            return Outcome::Invalid;
        }
        let mut report = BulkReport::default();

        for device in self.middleman.get_device_list().await {
            for zone in device.zones.keys() {
                let active = Middleman::get_current_device_option(&device, Some(zone))
                    .filter(|active| active.is_colour_bearing());
                let Some(active) = active else {
                    debug!("{}/{zone} has no colour to change", device.serial);
                    report.skipped.push(target(&device, zone));
                    continue;
                };

                let mut colours = active.colours.clone();
                let default_colour = self.middleman.default_colour().to_string();
                colours.resize(active.colours_required, default_colour);
                colours[0] = hex.to_string();

                let outcome = self
                    .apply(&device, zone, &active.option_id, &active.data(), &colours)
                    .await;
                report.record(target(&device, zone), outcome);
            }
        }

        Outcome::Ok(report)
    }

    async fn apply(
        &self,
        device: &Device,
        zone: &str,
        option_id: &str,
        option_data: &OptionData,
        colours: &[String],
    ) -> Outcome<()> {
        self.middleman
            .set_device_state(
                &device.backend,
                device.uid,
                &device.serial,
                zone,
                option_id,
                option_data,
                colours,
            )
            .await
    }
}

fn target(device: &Device, zone: &str) -> Target {
    Target {
        serial: device.serial.clone(),
        zone: zone.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::Backend,
        config::Config,
        device::OptionKind,
        process::{ProcessCoordinator, ProcessProbe},
        test_support::{MockBackend, TestProbe, device, entries, journal},
    };
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn middleman(dir: &std::path::Path, backends: Vec<Box<dyn Backend>>) -> Middleman {
        let config = Config::rooted_at(dir);
        let probe: Arc<dyn ProcessProbe> = Arc::new(TestProbe::new(1, journal()));
        Middleman::from_backends(
            &config,
            Arc::new(ProcessCoordinator::with_probe(&config, probe)),
            backends,
        )
    }

    fn target(serial: &str) -> Target {
        Target {
            serial: serial.to_string(),
            zone: "main".to_string(),
        }
    }

    #[tokio::test]
    async fn one_failing_device_does_not_abort_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let log = journal();
        let mm = middleman(
            dir.path(),
            vec![
                Box::new(MockBackend::new(
                    "a",
                    vec![device("a", 0, "A0"), device("a", 1, "A1")],
                    log.clone(),
                )),
                Box::new(MockBackend::faulty_writes("b", vec![device("b", 0, "B0")], log.clone())),
            ],
        );

        let report = BulkApply::new(&mm)
            .set_bulk_option("breath", &OptionData::Choice("dual".into()), 2)
            .await;

        assert_eq!(report.applied, vec![target("A0"), target("A1")]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, target("B0"));
        assert_eq!(
            entries(&log),
            vec![
                "backend A0 main breath dual #FF0000,#00FF00".to_string(),
                "backend A1 main breath dual #FF0000,#00FF00".to_string(),
                "backend failed B0".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn zones_without_the_option_are_left_out() {
        let dir = tempfile::tempdir().unwrap();
        let log = journal();
        let mut headset = device("a", 1, "H1");
        headset
            .zones
            .get_mut("main")
            .unwrap()
            .retain(|o| o.kind != OptionKind::Effect || o.id == "spectrum");
        let mm = middleman(
            dir.path(),
            vec![Box::new(MockBackend::new(
                "a",
                vec![device("a", 0, "K0"), headset],
                log.clone(),
            ))],
        );

        let report = BulkApply::new(&mm)
            .set_bulk_option("static", &OptionData::None, 1)
            .await;

        assert_eq!(report.applied, vec![target("K0")]);
        assert!(report.skipped.is_empty());
    }

    #[tokio::test]
    async fn bulk_colour_targets_active_option() {
        let dir = tempfile::tempdir().unwrap();
        let log = journal();
        let mut spectrum = device("a", 1, "S1");
        for option in spectrum.zones.get_mut("main").unwrap() {
            option.active = option.id == "spectrum";
        }
        let mm = middleman(
            dir.path(),
            vec![Box::new(MockBackend::new(
                "a",
                vec![device("a", 0, "K0"), spectrum],
                log.clone(),
            ))],
        );

        let report = BulkApply::new(&mm).set_bulk_colour("#123456").await.ok().unwrap();

        assert_eq!(report.applied, vec![target("K0")]);
        assert_eq!(report.skipped, vec![target("S1")]);
        assert_eq!(
            entries(&log),
            vec!["backend K0 main static - #123456".to_string()]
        );
        assert_eq!(BulkApply::new(&mm).set_bulk_colour("red").await, Outcome::Invalid);
    }
}
