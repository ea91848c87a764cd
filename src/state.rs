//! Per-device software ownership records.
//!
//! One plain key-value file per device serial records which software effect
//! or preset was last applied. These files say nothing about liveness: the
//! process that wrote a record may be long gone, so readers combine them
//! with the lock files in [`crate::process`].

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

/// Reference to an effect or preset on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRef {
    pub name: String,
    pub icon: String,
    pub path: PathBuf,
}

/// Software entity owning a device. Effect and preset are exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoftwareOwner {
    Effect(StateRef),
    Preset(StateRef),
}

const EFFECT_PREFIX: &str = "effect";
const PRESET_PREFIX: &str = "preset";

/// Reads and writes the state files under one directory.
#[derive(Debug, Clone)]
pub struct SoftwareStateStore {
    dir: PathBuf,
}

impl SoftwareStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn get_effect(&self, serial: &str) -> Result<Option<StateRef>> {
        Ok(parse_ref(&self.read(serial)?, EFFECT_PREFIX))
    }

    pub fn get_preset(&self, serial: &str) -> Result<Option<StateRef>> {
        Ok(parse_ref(&self.read(serial)?, PRESET_PREFIX))
    }

    /// Returns whichever owner is recorded, effect first.
    pub fn get_owner(&self, serial: &str) -> Result<Option<SoftwareOwner>> {
        let entries = self.read(serial)?;
        Ok(parse_ref(&entries, EFFECT_PREFIX)
            .map(SoftwareOwner::Effect)
            .or_else(|| parse_ref(&entries, PRESET_PREFIX).map(SoftwareOwner::Preset)))
    }

    /// Records a software effect, replacing any preset record.
    pub fn set_effect(&self, serial: &str, name: &str, icon: &str, path: &Path) -> Result<()> {
        self.write(serial, &entries_for(EFFECT_PREFIX, name, icon, path))
    }

    /// Records a preset, replacing any effect record.
    pub fn set_preset(&self, serial: &str, name: &str, icon: &str, path: &Path) -> Result<()> {
        self.write(serial, &entries_for(PRESET_PREFIX, name, icon, path))
    }

    pub fn clear_effect(&self, serial: &str) -> Result<()> {
        self.clear_prefix(serial, EFFECT_PREFIX)
    }

    pub fn clear_preset(&self, serial: &str) -> Result<()> {
        self.clear_prefix(serial, PRESET_PREFIX)
    }

    /// Drops both records for the serial.
    pub fn clear_all(&self, serial: &str) -> Result<()> {
        match fs::remove_file(self.path_for(serial)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                Err(e).with_context(|| format!("Failed to clear state for {serial}"))
            }
            _ => Ok(()),
        }
    }

    fn clear_prefix(&self, serial: &str, prefix: &str) -> Result<()> {
        let mut entries = self.read(serial)?;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(&format!("{prefix}_")));
        if entries.len() == before {
            return Ok(());
        }
        if entries.is_empty() {
            self.clear_all(serial)
        } else {
            self.write(serial, &entries)
        }
    }

    fn path_for(&self, serial: &str) -> PathBuf {
        self.dir.join(crate::process::safe_name(serial))
    }

    fn read(&self, serial: &str) -> Result<BTreeMap<String, String>> {
        let path = self.path_for(serial);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        Ok(content
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.to_string()))
            .collect())
    }

    fn write(&self, serial: &str, entries: &BTreeMap<String, String>) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let path = self.path_for(serial);
        let body: String = entries
            .iter()
            .map(|(k, v)| format!("{k}={v}\n"))
            .collect();

        let tmp_path = self
            .dir
            .join(format!(".{}.tmp", crate::process::safe_name(serial)));
        fs::write(&tmp_path, body)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("Failed to move state to {}", path.display()))?;

        debug!("State for {serial} updated: {entries:?}");
        Ok(())
    }
}

fn entries_for(prefix: &str, name: &str, icon: &str, path: &Path) -> BTreeMap<String, String> {
    BTreeMap::from([
        (format!("{prefix}_name"), sanitize_value(name)),
        (format!("{prefix}_icon"), sanitize_value(icon)),
        (format!("{prefix}_path"), sanitize_value(&path.to_string_lossy())),
    ])
}

fn sanitize_value(value: &str) -> String {
    value.replace(['\n', '\r'], " ")
}

fn parse_ref(entries: &BTreeMap<String, String>, prefix: &str) -> Option<StateRef> {
    let name = entries.get(&format!("{prefix}_name"))?;
    Some(StateRef {
        name: name.clone(),
        icon: entries
            .get(&format!("{prefix}_icon"))
            .cloned()
            .unwrap_or_default(),
        path: entries
            .get(&format!("{prefix}_path"))
            .map(PathBuf::from)
            .unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store() -> (tempfile::TempDir, SoftwareStateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SoftwareStateStore::new(dir.path().join("states"));
        (dir, store)
    }

    #[test]
    fn absent_file_means_no_owner() {
        let (_dir, store) = store();
        assert_eq!(store.get_effect("PM1234").unwrap(), None);
        assert_eq!(store.get_owner("PM1234").unwrap(), None);
    }

    #[test]
    fn set_effect_then_get() {
        let (_dir, store) = store();
        store
            .set_effect("PM1234", "Rainbow", "img/rainbow.svg", Path::new("/fx/rainbow.json"))
            .unwrap();

        let effect = store.get_effect("PM1234").unwrap().unwrap();
        assert_eq!(effect.name, "Rainbow");
        assert_eq!(effect.icon, "img/rainbow.svg");
        assert_eq!(effect.path, PathBuf::from("/fx/rainbow.json"));
    }

    #[test]
    fn effect_and_preset_are_exclusive() {
        let (_dir, store) = store();
        store
            .set_effect("PM1234", "Rainbow", "", Path::new("/fx/rainbow.json"))
            .unwrap();
        store
            .set_preset("PM1234", "Evening", "", Path::new("/presets/evening.json"))
            .unwrap();

        assert_eq!(store.get_effect("PM1234").unwrap(), None);
        assert_eq!(store.get_preset("PM1234").unwrap().unwrap().name, "Evening");

        store
            .set_effect("PM1234", "Wave", "", Path::new("/fx/wave.json"))
            .unwrap();
        assert_eq!(store.get_preset("PM1234").unwrap(), None);
        assert!(matches!(
            store.get_owner("PM1234").unwrap(),
            Some(SoftwareOwner::Effect(r)) if r.name == "Wave"
        ));
    }

    #[test]
    fn clear_effect_removes_file() {
        let (_dir, store) = store();
        store
            .set_effect("PM1234", "Rainbow", "", Path::new("/fx/rainbow.json"))
            .unwrap();
        store.clear_effect("PM1234").unwrap();

        assert_eq!(store.get_effect("PM1234").unwrap(), None);
        assert!(!store.dir().join("PM1234").exists());
    }

    #[test]
    fn clearing_absent_records_is_not_an_error() {
        let (_dir, store) = store();
        store.clear_effect("nothing").unwrap();
        store.clear_preset("nothing").unwrap();
        store.clear_all("nothing").unwrap();
    }

    #[test]
    fn serial_with_path_separator_stays_inside_dir() {
        let (_dir, store) = store();
        store
            .set_preset("../evil/serial", "P", "", Path::new("/p.json"))
            .unwrap();

        assert_eq!(store.get_preset("../evil/serial").unwrap().unwrap().name, "P");
        assert_eq!(fs::read_dir(store.dir()).unwrap().count(), 1);
    }
}
