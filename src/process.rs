//! Cross-process ownership of named resources.
//!
//! Every component of the application family (the GUI, the tray helper,
//! software-effect painters) agrees on who owns a device or singleton role
//! through one lock file per name holding the owner's PID. Lock files are
//! created atomically; a lock whose PID is no longer a live member of the
//! family is stale and silently replaced.
//!
//! Stopping and reloading are cooperative: the coordinator delivers a
//! signal and returns without waiting for the target to react. Callers
//! that must see the owner gone use [`ProcessCoordinator::stop_and_wait`],
//! which polls for a bounded time.

use std::{
    fs, io,
    os::fd::AsRawFd,
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::Duration,
};

use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use tokio::time::{Instant, sleep};

use crate::config::Config;

/// Request delivered to a running component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Exit as soon as possible.
    Stop,
    /// Re-read configuration without exiting.
    Reload,
}

impl ControlSignal {
    pub fn as_raw(self) -> libc::c_int {
        match self {
            ControlSignal::Stop => libc::SIGTERM,
            ControlSignal::Reload => libc::SIGUSR1,
        }
    }
}

/// OS operations the coordinator relies on.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessProbe: Send + Sync {
    /// PID of the calling process.
    fn current_pid(&self) -> u32;

    /// Whether a process with this PID exists.
    fn is_running(&self, pid: u32) -> bool;

    /// Whether the process belongs to the application family.
    fn belongs_to_family(&self, pid: u32, family: &str) -> bool;

    /// Delivers a control signal.
    fn signal(&self, pid: u32, signal: ControlSignal) -> Result<()>;

    /// Starts a detached process and returns its PID.
    fn spawn(&self, program: &Path, args: &[String]) -> Result<u32>;
}

/// [`ProcessProbe`] backed by the running kernel.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl ProcessProbe for SystemProbe {
    fn current_pid(&self) -> u32 {
        std::process::id()
    }

    fn is_running(&self, pid: u32) -> bool {
        let Ok(pid) = libc::pid_t::try_from(pid) else {
            return false;
        };
        if pid <= 0 {
            return false;
        }
        // SAFETY: signal 0 performs the permission and existence checks only.
        let exists = unsafe { libc::kill(pid, 0) } == 0
            || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM);
        exists && process_state(pid) != Some('Z')
    }

    fn belongs_to_family(&self, pid: u32, family: &str) -> bool {
        match fs::read(format!("/proc/{pid}/cmdline")) {
            Ok(raw) => String::from_utf8_lossy(&raw).contains(family),
            // Without procfs, existence is the best evidence available.
            Err(_) => true,
        }
    }

    fn signal(&self, pid: u32, signal: ControlSignal) -> Result<()> {
        let raw_pid = libc::pid_t::try_from(pid).context("PID out of range")?;
        // SAFETY: plain syscall on a PID we just validated.
        if unsafe { libc::kill(raw_pid, signal.as_raw()) } != 0 {
            return Err(io::Error::last_os_error())
                .with_context(|| format!("Failed to send {signal:?} to {pid}"));
        }
        Ok(())
    }

    fn spawn(&self, program: &Path, args: &[String]) -> Result<u32> {
        let mut child = std::process::Command::new(program)
            .args(args)
            .stdin(std::process::Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to spawn {}", program.display()))?;
        let pid = child.id();

        thread::Builder::new()
            .name(format!("reap-{pid}"))
            .spawn(move || {
                if let Err(e) = child.wait() {
                    warn!("Failed to reap PID {pid}: {e}");
                }
            })
            .context("Failed to start reaper thread")?;
        Ok(pid)
    }
}

/// Scheduler state letter from `/proc/<pid>/stat`, when procfs is there.
fn process_state(pid: libc::pid_t) -> Option<char> {
    let stat = fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    stat_state(&stat)
}

/// The command name may itself contain parentheses; the state follows the last one.
fn stat_state(stat: &str) -> Option<char> {
    let (_, rest) = stat.rsplit_once(')')?;
    rest.trim_start().chars().next()
}

/// Outcome of [`ProcessCoordinator::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired,
    AlreadyOwned,
    HeldBy(u32),
}

impl AcquireOutcome {
    pub fn is_owned(self) -> bool {
        matches!(self, AcquireOutcome::Acquired | AcquireOutcome::AlreadyOwned)
    }
}

/// Component that renders software effects.
pub const HELPER_COMPONENT: &str = "helper";

const GUARD_ATTEMPTS: u32 = 20;
const GUARD_RETRY: Duration = Duration::from_millis(5);

/// Manages lock files, control signals and component spawning.
pub struct ProcessCoordinator {
    lock_dir: PathBuf,
    family: String,
    component_dirs: Vec<PathBuf>,
    install_dir: PathBuf,
    stop_grace: Duration,
    stop_poll: Duration,
    probe: Arc<dyn ProcessProbe>,
}

impl ProcessCoordinator {
    pub fn new(config: &Config) -> Self {
        Self::with_probe(config, Arc::new(SystemProbe))
    }

    pub fn with_probe(config: &Config, probe: Arc<dyn ProcessProbe>) -> Self {
        Self {
            lock_dir: config.lock_dir(),
            family: config.process.app_family.clone(),
            component_dirs: config.paths.component_dirs.clone(),
            install_dir: config.paths.install_dir.clone(),
            stop_grace: Duration::from_millis(config.process.stop_grace_ms),
            stop_poll: Duration::from_millis(config.process.stop_poll_ms.max(1)),
            probe,
        }
    }

    pub fn pid(&self) -> u32 {
        self.probe.current_pid()
    }

    /// Takes ownership of `name` for the calling process.
    ///
    /// A stale lock is discarded and replaced. A lock held by another live
    /// member of the family is reported, never waited on.
    pub fn acquire(&self, name: &str) -> Result<AcquireOutcome> {
        fs::create_dir_all(&self.lock_dir)
            .with_context(|| format!("Failed to create {}", self.lock_dir.display()))?;

        let pid = self.pid();
        let lock_path = self.lock_path(name);
        let tmp_path = self.lock_dir.join(format!(".{}.{pid}", safe_name(name)));
        fs::write(&tmp_path, pid.to_string())
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;

        let outcome = self.link_lock(name, &tmp_path, &lock_path, pid);
        let _ = fs::remove_file(&tmp_path);
        outcome
    }

    fn link_lock(
        &self,
        name: &str,
        tmp_path: &Path,
        lock_path: &Path,
        pid: u32,
    ) -> Result<AcquireOutcome> {
        if try_link(tmp_path, lock_path)? {
            info!("Acquired lock '{name}' for PID {pid}");
            return Ok(AcquireOutcome::Acquired);
        }
        if let Some(owner) = self.owner_pid(name) {
            return Ok(held(owner, pid));
        }

        // Stale locks are only removed under the guard, after looking again.
        let Some(_guard) = self.stale_guard(name)? else {
            return match self.owner_pid(name) {
                Some(owner) => Ok(held(owner, pid)),
                None => bail!("Lock '{name}' is being replaced by another process"),
            };
        };
        if let Some(owner) = self.owner_pid(name) {
            return Ok(held(owner, pid));
        }

        debug!("Discarding stale lock '{name}'");
        remove_if_present(lock_path)?;
        if try_link(tmp_path, lock_path)? {
            info!("Acquired lock '{name}' for PID {pid}");
            return Ok(AcquireOutcome::Acquired);
        }

        match self.owner_pid(name) {
            Some(owner) => Ok(held(owner, pid)),
            None => bail!("Lock '{name}' kept changing hands"),
        }
    }

    /// Exclusive `flock` on `.<name>.guard`, released when the file drops.
    /// `None` when another process kept it for every attempt.
    fn stale_guard(&self, name: &str) -> Result<Option<fs::File>> {
        let path = self.lock_dir.join(format!(".{}.guard", safe_name(name)));
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        for _ in 0..GUARD_ATTEMPTS {
            // SAFETY: the descriptor stays owned by `file` for the whole call.
            if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } == 0 {
                return Ok(Some(file));
            }
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EWOULDBLOCK) {
                return Err(err).with_context(|| format!("Failed to lock {}", path.display()));
            }
            thread::sleep(GUARD_RETRY);
        }
        Ok(None)
    }

    /// PID of the live owner of `name`, if any.
    pub fn owner_pid(&self, name: &str) -> Option<u32> {
        let recorded = fs::read_to_string(self.lock_path(name))
            .ok()?
            .trim()
            .parse::<u32>()
            .ok()?;

        if self.probe.is_running(recorded) && self.probe.belongs_to_family(recorded, &self.family)
        {
            Some(recorded)
        } else {
            None
        }
    }

    pub fn is_locked(&self, name: &str) -> bool {
        self.owner_pid(name).is_some()
    }

    /// Removes the lock when the caller owns it. Returns whether it did.
    pub fn release(&self, name: &str) -> Result<bool> {
        let lock_path = self.lock_path(name);
        let recorded = match fs::read_to_string(&lock_path) {
            Ok(content) => content.trim().parse::<u32>().ok(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", lock_path.display()));
            }
        };

        if recorded != Some(self.pid()) {
            warn!(
                "Refusing to release lock '{name}' held by {recorded:?} (caller is {})",
                self.pid()
            );
            return Ok(false);
        }

        remove_if_present(&lock_path)?;
        info!("Released lock '{name}'");
        Ok(true)
    }

    /// Asks the owner of `name` to exit. Returns whether a signal was sent.
    pub fn request_stop(&self, name: &str) -> bool {
        self.send(name, ControlSignal::Stop)
    }

    /// Asks the owner of `name` to reload. Returns whether a signal was sent.
    pub fn request_reload(&self, name: &str) -> bool {
        self.send(name, ControlSignal::Reload)
    }

    /// Asks the owner of `name` to exit, then polls until its lock is gone
    /// or the stop grace period ends. Returns whether `name` is free.
    pub async fn stop_and_wait(&self, name: &str) -> bool {
        if !self.request_stop(name) {
            return !self.is_locked(name);
        }

        let deadline = Instant::now() + self.stop_grace;
        while self.is_locked(name) {
            if Instant::now() >= deadline {
                warn!("Owner of '{name}' still running after {:?}", self.stop_grace);
                return false;
            }
            sleep(self.stop_poll).await;
        }
        true
    }

    fn send(&self, name: &str, signal: ControlSignal) -> bool {
        let Some(pid) = self.owner_pid(name) else {
            debug!("No live owner for '{name}', {signal:?} not sent");
            return false;
        };

        match self.probe.signal(pid, signal) {
            Ok(()) => {
                info!("Sent {signal:?} to '{name}' (PID {pid})");
                true
            }
            Err(e) => {
                warn!("{e:#}");
                false
            }
        }
    }

    /// Spawns a component unless one already owns the name.
    pub fn start(&self, name: &str, args: &[String]) -> bool {
        if let Some(pid) = self.owner_pid(name) {
            debug!("Component '{name}' already running as PID {pid}");
            return true;
        }

        let Some(program) = self.locate_component(name) else {
            warn!("No executable found for component '{name}'");
            return false;
        };

        match self.probe.spawn(&program, args) {
            Ok(pid) => {
                info!("Started '{name}' as PID {pid}: {}", program.display());
                true
            }
            Err(e) => {
                warn!("{e:#}");
                false
            }
        }
    }

    /// Stops the current owner of `serial` and spawns a painter for `effect`.
    ///
    /// Nothing is spawned while the old owner still holds the serial, as
    /// the new painter could not take it.
    pub async fn run_effect(&self, serial: &str, effect: &Path) -> bool {
        if !self.stop_and_wait(serial).await {
            warn!("Not running {}: {serial} is still owned", effect.display());
            return false;
        }

        let Some(program) = self.locate_component(HELPER_COMPONENT) else {
            warn!("No executable found for component '{HELPER_COMPONENT}'");
            return false;
        };

        let args = vec![
            "--run-fx".to_string(),
            effect.to_string_lossy().into_owned(),
            "--device-serial".to_string(),
            serial.to_string(),
        ];
        match self.probe.spawn(&program, &args) {
            Ok(pid) => {
                info!("Running {} on {serial} as PID {pid}", effect.display());
                true
            }
            Err(e) => {
                warn!("{e:#}");
                false
            }
        }
    }

    /// Finds `polychromatic-<name>` in the development dirs, then the install dir.
    pub fn locate_component(&self, name: &str) -> Option<PathBuf> {
        let file_name = format!("{}-{name}", self.family);
        self.component_dirs
            .iter()
            .chain(std::iter::once(&self.install_dir))
            .map(|dir| dir.join(&file_name))
            .find(|candidate| candidate.is_file())
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        self.lock_dir.join(safe_name(name))
    }
}

fn held(owner: u32, pid: u32) -> AcquireOutcome {
    if owner == pid {
        AcquireOutcome::AlreadyOwned
    } else {
        AcquireOutcome::HeldBy(owner)
    }
}

/// Hard-links the PID file into place. False when a lock already exists.
fn try_link(tmp_path: &Path, lock_path: &Path) -> Result<bool> {
    match fs::hard_link(tmp_path, lock_path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to create {}", lock_path.display())),
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => {
            Err(e).with_context(|| format!("Failed to remove {}", path.display()))
        }
        _ => Ok(()),
    }
}

/// Maps a component name or serial onto a single safe file name.
pub fn safe_name(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = mapped.trim_start_matches('.');
    if trimmed.is_empty() {
        String::from("_")
    } else {
        trimmed.to_string()
    }
}
