//! Configuration management for polychromatic.
//!
//! Handles loading, parsing, and validation of the YAML configuration file
//! that tells every component where lock/state files live, where effects
//! are stored and how software processes are located and stopped.

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::RwLock;

/// Main configuration structure.
///
/// Built once at process start and handed to every component that needs
/// it; nothing reads paths from ambient global state.
///
/// # Example
///
/// ```yaml
/// version: 1
/// paths:
///   runtime_dir: /run/user/1000/polychromatic
///   effects_dir: /home/me/.config/polychromatic/effects
///   component_dirs: ["/home/me/src/polychromatic/target/debug"]
/// process:
///   app_family: polychromatic
///   stop_grace_ms: 500
/// bulk:
///   default_colour: "#00FF00"
/// backends:
///   openrazer: true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Configuration version for compatibility checking.
    pub version: u8,

    /// Filesystem locations.
    #[serde(default)]
    pub paths: PathsCfg,

    /// Process coordination settings.
    #[serde(default)]
    pub process: ProcessCfg,

    /// Bulk-apply settings.
    #[serde(default)]
    pub bulk: BulkCfg,

    /// Which backends to attempt at startup.
    #[serde(default)]
    pub backends: BackendsCfg,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsCfg {
    /// Per-user runtime directory holding lock and state files.
    #[serde(default = "defaults::runtime_dir")]
    pub runtime_dir: PathBuf,

    /// Directory containing user-authored effect files.
    #[serde(default = "defaults::effects_dir")]
    pub effects_dir: PathBuf,

    /// Development-tree directories searched for component executables
    /// before the install directory.
    #[serde(default)]
    pub component_dirs: Vec<PathBuf>,

    /// System install directory for component executables.
    #[serde(default = "defaults::install_dir")]
    pub install_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessCfg {
    /// Substring that a live lock owner's command line must contain.
    #[serde(default = "defaults::app_family")]
    pub app_family: String,

    /// Upper bound on waiting for a stopped owner to release its lock.
    #[serde(default = "defaults::stop_grace_ms")]
    pub stop_grace_ms: u64,

    /// Poll interval used while waiting for the release.
    #[serde(default = "defaults::stop_poll_ms")]
    pub stop_poll_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkCfg {
    /// Colour used to pad zones that need more colours than they have.
    #[serde(default = "defaults::default_colour")]
    pub default_colour: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendsCfg {
    #[serde(default = "defaults::enabled")]
    pub openrazer: bool,
}

impl Default for PathsCfg {
    fn default() -> Self {
        Self {
            runtime_dir: defaults::runtime_dir(),
            effects_dir: defaults::effects_dir(),
            component_dirs: Vec::new(),
            install_dir: defaults::install_dir(),
        }
    }
}

impl Default for ProcessCfg {
    fn default() -> Self {
        Self {
            app_family: defaults::app_family(),
            stop_grace_ms: defaults::stop_grace_ms(),
            stop_poll_ms: defaults::stop_poll_ms(),
        }
    }
}

impl Default for BulkCfg {
    fn default() -> Self {
        Self {
            default_colour: defaults::default_colour(),
        }
    }
}

impl Default for BackendsCfg {
    fn default() -> Self {
        Self {
            openrazer: defaults::enabled(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            paths: PathsCfg::default(),
            process: ProcessCfg::default(),
            bulk: BulkCfg::default(),
            backends: BackendsCfg::default(),
        }
    }
}

impl Config {
    /// Builds a configuration rooted in `base`, used by tests and by
    /// callers that want an isolated tree.
    pub fn rooted_at(base: &Path) -> Self {
        Self {
            paths: PathsCfg {
                runtime_dir: base.join("runtime"),
                effects_dir: base.join("effects"),
                component_dirs: Vec::new(),
                install_dir: base.join("bin"),
            },
            ..Self::default()
        }
    }

    /// Directory holding one lock file per component or device serial.
    pub fn lock_dir(&self) -> PathBuf {
        self.paths.runtime_dir.join("pid")
    }

    /// Directory holding one software-state file per device serial.
    pub fn state_dir(&self) -> PathBuf {
        self.paths.runtime_dir.join("states")
    }

    /// Validates the configuration for consistency.
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            anyhow::bail!("Unsupported config version {}", self.version);
        }

        if self.process.app_family.trim().is_empty() {
            anyhow::bail!("process.app_family cannot be empty");
        }

        if self.process.stop_poll_ms > self.process.stop_grace_ms {
            anyhow::bail!(
                "process.stop_poll_ms ({}) exceeds process.stop_grace_ms ({})",
                self.process.stop_poll_ms,
                self.process.stop_grace_ms
            );
        }

        if !crate::device::is_hex_colour(&self.bulk.default_colour) {
            anyhow::bail!(
                "bulk.default_colour '{}' is not a #RRGGBB colour",
                self.bulk.default_colour
            );
        }

        Ok(())
    }
}

mod defaults {
    use std::{env, path::PathBuf};

    pub fn runtime_dir() -> PathBuf {
        match env::var_os("XDG_RUNTIME_DIR") {
            Some(dir) => PathBuf::from(dir).join("polychromatic"),
            // SAFETY: getuid has no preconditions and cannot fail.
            None => PathBuf::from(format!("/tmp/polychromatic-{}", unsafe { libc::getuid() })),
        }
    }

    pub fn effects_dir() -> PathBuf {
        env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("polychromatic/effects")
    }

    pub fn install_dir() -> PathBuf {
        PathBuf::from("/usr/bin")
    }

    pub fn app_family() -> String {
        String::from("polychromatic")
    }

    pub fn stop_grace_ms() -> u64 {
        500
    }

    pub fn stop_poll_ms() -> u64 {
        50
    }

    pub fn default_colour() -> String {
        String::from("#00FF00")
    }

    pub fn enabled() -> bool {
        true
    }
}

fn locate_config() -> Option<PathBuf> {
    if let Ok(env_path) = env::var("POLYCHROMATIC_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    if let Some(mut cfg_dir) = env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|h| Path::new(&h).join(".config")))
    {
        cfg_dir.push("polychromatic/config.yml");
        if cfg_dir.exists() {
            return Some(cfg_dir);
        }
    }

    let etc = Path::new("/etc/polychromatic/config.yml");
    if etc.exists() {
        return Some(etc.to_path_buf());
    }

    None
}

/// Configuration manager that handles both config data and file operations.
///
/// # Example
///
/// ```no_run
/// use polychromatic::config::ConfigManager;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config_manager = ConfigManager::load_or_default(None).await?;
/// let runtime_dir = config_manager.get().await.paths.runtime_dir.clone();
/// config_manager.reload().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: Arc<RwLock<Config>>,
    path: Option<PathBuf>,
}

impl ConfigManager {
    /// Creates a new ConfigManager with the given config and optional backing file.
    pub fn new(config: Config, path: Option<PathBuf>) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            path,
        }
    }

    /// Loads configuration from file or standard locations.
    ///
    /// Searches in the following order:
    /// 1. Provided path parameter
    /// 2. POLYCHROMATIC_CONFIG environment variable
    /// 3. XDG_CONFIG_HOME/polychromatic/config.yml or ~/.config/polychromatic/config.yml
    /// 4. /etc/polychromatic/config.yml
    pub async fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => locate_config().context("No configuration file found")?,
        };

        info!("Loading config from: {}", config_path.display());
        let config = Self::load_config_from_path(&config_path).await?;

        Ok(Self::new(config, Some(config_path)))
    }

    /// Like [`ConfigManager::load`] but falls back to built-in defaults when
    /// no file exists in any standard location.
    pub async fn load_or_default(path: Option<PathBuf>) -> Result<Self> {
        match path.or_else(locate_config) {
            Some(p) => Self::load(Some(p)).await,
            None => {
                info!("No configuration file found, using defaults");
                Ok(Self::new(Config::default(), None))
            }
        }
    }

    /// Gets a read-only reference to the current configuration.
    pub async fn get(&self) -> tokio::sync::RwLockReadGuard<'_, Config> {
        self.config.read().await
    }

    /// Returns the path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Reloads configuration from the same file.
    ///
    /// Components call this when they receive a reload request.
    pub async fn reload(&self) -> Result<()> {
        let Some(path) = &self.path else {
            info!("No configuration file to reload, keeping current values");
            return Ok(());
        };

        info!("Reloading config from: {}", path.display());
        let new_config = Self::load_config_from_path(path).await?;

        *self.config.write().await = new_config;
        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Saves configuration to a specific path.
    pub async fn save_to_path(&self, path: &Path) -> Result<()> {
        let config = self.config.read().await;
        let config_yaml =
            serde_yaml::to_string(&*config).context("Failed to serialize configuration")?;

        let tmp_path = path.with_extension("yml.tmp");
        fs::write(&tmp_path, config_yaml).with_context(|| {
            format!("Failed to write temporary config to {}", tmp_path.display())
        })?;

        fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to move config to {}", path.display()))?;

        info!("Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Clones the current configuration.
    ///
    /// Components hold the snapshot as `Arc<Config>` for their lifetime.
    pub async fn clone_config(&self) -> Config {
        self.config.read().await.clone()
    }

    async fn load_config_from_path(path: &Path) -> Result<Config> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML in: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Configuration validation failed for: {}", path.display()))?;

        Ok(config)
    }
}
