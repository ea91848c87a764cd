use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// polychromatic-ctl: inspect and drive RGB devices from the shell
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// YAML config file path (default: searched in standard locations)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Log debug messages to syslog
    #[arg(short = 'v', long = "verbose", default_value = "false")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List connected devices
    Devices,
    /// List connected devices no backend can drive
    Unsupported,
    /// Show one device as JSON
    Device { backend: String, uid: u32 },
    /// Apply an option to a device zone
    Set {
        backend: String,
        uid: u32,
        zone: String,
        option: String,
        /// Option value: true/false, a number, or text
        #[arg(long)]
        data: Option<String>,
        /// Colour slot, repeat for several
        #[arg(long = "colour")]
        colours: Vec<String>,
    },
    /// Replace one colour of the active option
    Colour {
        backend: String,
        uid: u32,
        zone: String,
        hex: String,
        #[arg(long, default_value_t = 0)]
        index: usize,
    },
    /// Restore the effect that was active before an override
    Replay {
        backend: String,
        uid: u32,
        #[arg(long)]
        zone: Option<String>,
    },
    /// Apply an option to every device offering it
    BulkOption {
        option: String,
        #[arg(long)]
        data: Option<String>,
        /// Colours the option needs
        #[arg(long, default_value_t = 0)]
        colours: usize,
    },
    /// Change the colour of every device's active option
    BulkColour { hex: String },
    /// Show backend load status
    Backends {
        /// Also run each backend's self-tests
        #[arg(long)]
        troubleshoot: bool,
    },
    /// Restart a backend's daemon
    Restart { backend: String },
    /// Inspect or signal lock owners
    Lock {
        #[command(subcommand)]
        action: LockAction,
    },
    /// Manage effect files
    Effect {
        #[command(subcommand)]
        action: EffectAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum LockAction {
    /// Print the owner PID of a lock
    Status { name: String },
    /// Ask the owner to exit
    Stop { name: String },
    /// Ask the owner to reload its configuration
    Reload { name: String },
    /// Take the lock and keep it until asked to stop
    Hold { name: String },
}

#[derive(Subcommand, Debug)]
pub enum EffectAction {
    /// List effect files and whether they load
    List,
    /// Create a new effect
    New {
        name: String,
        /// layered, scripted or sequence
        #[arg(long = "type", default_value = "layered")]
        kind: String,
    },
    /// Validate one effect file and print every problem
    Validate { path: PathBuf },
    /// Copy an effect as "<name> (Copy)"
    Clone { path: PathBuf },
    /// Delete an effect and its script
    Delete { path: PathBuf },
    /// Rename an effect, moving its file
    Rename { path: PathBuf, name: String },
    /// Run an effect on a device through the helper
    Run { path: PathBuf, serial: String },
}
