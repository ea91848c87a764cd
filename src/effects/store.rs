//! Effect files on disk.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use serde_json::{Value, json};

use super::{
    error::{LoadError, StoreError},
    schema::{EffectDefinition, EffectKind, EffectType, SAVE_FORMAT},
    upgrade::upgrade,
    validate::validate,
};

/// Extension of the executable that accompanies a scripted effect.
pub const SCRIPT_EXTENSION: &str = "py";

const EFFECT_EXTENSION: &str = "json";

/// One entry of [`EffectFileManager::list_items`].
#[derive(Debug)]
pub struct EffectListing {
    pub path: PathBuf,
    pub outcome: Result<EffectDefinition, LoadError>,
}

/// Loads, validates and mutates effect files in one directory.
#[derive(Debug, Clone)]
pub struct EffectFileManager {
    dir: PathBuf,
}

impl EffectFileManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// In-memory skeleton for a new effect.
    pub fn init_data(&self, name: &str, effect_type: EffectType) -> EffectDefinition {
        EffectDefinition::init(name, effect_type)
    }

    pub fn upgrade_item(&self, doc: Value) -> Value {
        upgrade(doc)
    }

    /// Loads an effect, upgrading older formats in memory only.
    pub fn get_item(&self, path: &Path) -> Result<EffectDefinition, LoadError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(LoadError::MissingFile),
            Err(e) => {
                debug!("{}: unreadable: {e}", path.display());
                return Err(LoadError::bad(format!("unreadable: {e}")));
            }
        };

        let doc: Value = serde_json::from_str(&raw).map_err(|e| {
            debug!("{}: not JSON: {e}", path.display());
            LoadError::bad(format!("not JSON: {e}"))
        })?;

        let Some(found) = doc.get("save_format").and_then(Value::as_u64) else {
            debug!("{}: save_format: missing", path.display());
            return Err(LoadError::bad("save_format: missing"));
        };
        if found > u64::from(SAVE_FORMAT) {
            warn!(
                "{} was written with save format {found}, this build supports {SAVE_FORMAT}",
                path.display()
            );
            return Err(LoadError::NewerFormatUnsupported {
                found,
                supported: SAVE_FORMAT,
            });
        }

        let doc = upgrade(doc);
        let violations = validate(&doc);
        if !violations.is_empty() {
            for violation in &violations {
                debug!("{}: {violation}", path.display());
            }
            return Err(LoadError::BadData { violations });
        }

        EffectDefinition::from_value(doc).map_err(|e| {
            debug!("{}: {e}", path.display());
            LoadError::bad(e.to_string())
        })
    }

    /// Writes an effect and returns where it landed.
    ///
    /// `path` is honoured when it is free or already holds an effect of the
    /// same name. Otherwise a new file named after the effect is created,
    /// so saving a renamed effect is a "save as" that leaves the old file
    /// in place. Use [`EffectFileManager::rename_item`] for a true rename.
    pub fn save_item(
        &self,
        data: &EffectDefinition,
        path: Option<&Path>,
    ) -> Result<PathBuf, StoreError> {
        let target = match path {
            Some(path) if self.writable_for(path, &data.meta.name) => path.to_path_buf(),
            Some(path) => unique_path(path.parent().unwrap_or(self.dir.as_path()), &data.meta.name),
            None => unique_path(&self.dir, &data.meta.name),
        };

        let mut doc = data.to_value()?;
        doc["save_format"] = json!(SAVE_FORMAT);

        let dir = target.parent().unwrap_or(self.dir.as_path());
        fs::create_dir_all(dir).map_err(StoreError::io(format!("create {}", dir.display())))?;

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = dir.join(format!(".{file_name}.tmp"));
        fs::write(&tmp, serde_json::to_string_pretty(&doc)?)
            .map_err(StoreError::io(format!("write {}", tmp.display())))?;
        fs::rename(&tmp, &target).map_err(StoreError::io(format!("move to {}", target.display())))?;

        info!("Saved effect '{}' to {}", data.meta.name, target.display());
        Ok(target)
    }

    /// Deletes an effect and, for scripted effects, its script.
    pub fn delete_item(&self, path: &Path) -> Result<(), StoreError> {
        let script = match self.raw_type(path)? {
            Some(EffectType::Scripted) => {
                let script = script_path(path);
                if !script.exists() {
                    return Err(StoreError::ScriptMissing(script));
                }
                Some(script)
            }
            _ => None,
        };

        if let Some(script) = script {
            fs::remove_file(&script)
                .map_err(StoreError::io(format!("remove {}", script.display())))?;
        }
        fs::remove_file(path).map_err(StoreError::io(format!("remove {}", path.display())))?;

        info!("Deleted effect {}", path.display());
        Ok(())
    }

    /// Copies an effect next to the original as "<name> (Copy)".
    pub fn clone_item(&self, path: &Path) -> Result<PathBuf, StoreError> {
        let mut data = self.get_item(path)?;
        let script = self.existing_script(path, &data)?;

        data.meta.name = format!("{} (Copy)", data.meta.name);
        let target = unique_path(path.parent().unwrap_or(self.dir.as_path()), &data.meta.name);
        let target = self.save_item(&data, Some(&target))?;

        if let Some(script) = script {
            let copy = script_path(&target);
            if let Err(e) = fs::copy(&script, &copy) {
                discard(&target);
                return Err(StoreError::Io {
                    context: format!("copy {}", script.display()),
                    source: e,
                });
            }
        }

        Ok(target)
    }

    /// Renames an effect: saves it under the new name, moves its script
    /// and removes the old file.
    pub fn rename_item(&self, path: &Path, new_name: &str) -> Result<PathBuf, StoreError> {
        let mut data = self.get_item(path)?;
        if data.meta.name == new_name {
            return Ok(path.to_path_buf());
        }
        let script = self.existing_script(path, &data)?;

        data.meta.name = new_name.to_string();
        let target = unique_path(path.parent().unwrap_or(self.dir.as_path()), new_name);
        let target = self.save_item(&data, Some(&target))?;

        if let Some(script) = script {
            if let Err(e) = fs::rename(&script, script_path(&target)) {
                discard(&target);
                return Err(StoreError::Io {
                    context: format!("move {}", script.display()),
                    source: e,
                });
            }
        }
        fs::remove_file(path).map_err(StoreError::io(format!("remove {}", path.display())))?;

        info!("Renamed {} to {}", path.display(), target.display());
        Ok(target)
    }

    /// Every effect file in the directory with its load outcome.
    pub fn list_items(&self) -> Result<Vec<EffectListing>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Io {
                    context: format!("list {}", self.dir.display()),
                    source: e,
                });
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == EFFECT_EXTENSION))
            .collect();
        paths.sort();

        Ok(paths
            .into_iter()
            .map(|path| EffectListing {
                outcome: self.get_item(&path),
                path,
            })
            .collect())
    }

    fn writable_for(&self, path: &Path, name: &str) -> bool {
        if !path.exists() {
            return true;
        }
        fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
            .is_some_and(|doc| doc.get("name").and_then(Value::as_str) == Some(name))
    }

    /// Effect type read straight from the document, without validation.
    fn raw_type(&self, path: &Path) -> Result<Option<EffectType>, StoreError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NoSuchEffect(path.to_path_buf()));
            }
            Err(e) => {
                return Err(StoreError::Io {
                    context: format!("read {}", path.display()),
                    source: e,
                });
            }
        };
        Ok(serde_json::from_str::<Value>(&raw)
            .ok()
            .and_then(|doc| doc.get("type").and_then(Value::as_u64))
            .and_then(EffectType::from_code))
    }

    fn existing_script(
        &self,
        path: &Path,
        data: &EffectDefinition,
    ) -> Result<Option<PathBuf>, StoreError> {
        if !matches!(data.kind, EffectKind::Scripted(_)) {
            return Ok(None);
        }
        let script = script_path(path);
        if script.exists() {
            Ok(Some(script))
        } else {
            Err(StoreError::ScriptMissing(script))
        }
    }
}

/// Script that accompanies a scripted effect file.
pub fn script_path(effect: &Path) -> PathBuf {
    effect.with_extension(SCRIPT_EXTENSION)
}

/// Turns a display name into a portable file stem.
pub fn safe_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .filter(|c| !c.is_control())
        .collect();
    let trimmed = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        String::from("effect")
    } else {
        trimmed.to_string()
    }
}

fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let stem = safe_filename(name);
    let first = dir.join(format!("{stem}.{EFFECT_EXTENSION}"));
    if !first.exists() {
        return first;
    }
    (2..)
        .map(|n| dir.join(format!("{stem}-{n}.{EFFECT_EXTENSION}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!("Failed to remove partial copy {}: {e}", path.display());
    }
}
