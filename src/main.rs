use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use log::{LevelFilter, info};
use syslog::{BasicLogger, Facility, Formatter3164};

use polychromatic::{
    app_context::AppContext,
    cli::{Cli, Command, EffectAction, LockAction},
    config::ConfigManager,
    device::OptionData,
    effects::{EffectType, LoadError},
    middleman::Outcome,
    process::AcquireOutcome,
    signals::ControlSignals,
};

fn init_log(level: LevelFilter) -> Result<()> {
    syslog::unix(Formatter3164 {
        facility: Facility::LOG_USER,
        hostname: None,
        process: "polychromatic".into(),
        pid: std::process::id(),
    })
    .map_err(|e| anyhow!("{e}"))
    .and_then(|logger| {
        log::set_boxed_logger(Box::new(BasicLogger::new(logger)))
            .map(|_| log::set_max_level(level))
            .map_err(|e| anyhow!("{e}"))
    })
}

fn outcome<T>(what: &str, outcome: Outcome<T>) -> Result<T> {
    match outcome {
        Outcome::Ok(value) => Ok(value),
        Outcome::NotFound => bail!("{what}: device not found"),
        Outcome::Invalid => bail!("{what}: request not valid"),
        Outcome::BackendError(e) => bail!("{what}: {e}"),
    }
}

fn option_data(raw: Option<&str>) -> OptionData {
    raw.map(OptionData::parse).unwrap_or_default()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    // No syslog socket means no logging, not a failure.
    let _ = init_log(level);

    let config_manager = ConfigManager::load_or_default(cli.config).await?;

    match cli.command {
        Command::Effect { action } => run_effect_action(&config_manager, action).await,
        Command::Lock { action } => run_lock_action(&config_manager, action).await,
        command => {
            let ctx = AppContext::new(config_manager).await;
            run_device_command(&ctx, command).await
        }
    }
}

async fn run_device_command(ctx: &AppContext, command: Command) -> Result<()> {
    let mm = &ctx.middleman;
    match command {
        Command::Devices => {
            for device in mm.get_device_list().await {
                let owner = match &device.software {
                    Some(owner) => format!("  [{owner:?}]"),
                    None => String::new(),
                };
                println!(
                    "{}:{}  {}  {} ({:?}){owner}",
                    device.backend, device.uid, device.serial, device.name, device.form_factor
                );
            }
        }
        Command::Unsupported => {
            for device in mm.get_unsupported_devices().await {
                let ids = device
                    .vid_pid
                    .map(|(vid, pid)| format!("{vid:04x}:{pid:04x}"))
                    .unwrap_or_default();
                println!("{}  {ids}  {}", device.backend, device.name);
            }
        }
        Command::Device { backend, uid } => {
            let device = outcome("device", mm.get_device(&backend, uid).await)?;
            println!("{}", serde_json::to_string_pretty(&device)?);
        }
        Command::Set {
            backend,
            uid,
            zone,
            option,
            data,
            colours,
        } => {
            let device = outcome("device", mm.get_device(&backend, uid).await)?;
            outcome(
                "set",
                mm.set_device_state(
                    &backend,
                    uid,
                    &device.serial,
                    &zone,
                    &option,
                    &option_data(data.as_deref()),
                    &colours,
                )
                .await,
            )?;
        }
        Command::Colour {
            backend,
            uid,
            zone,
            hex,
            index,
        } => {
            let device = outcome("device", mm.get_device(&backend, uid).await)?;
            if !mm.set_device_colour(&device, &zone, &hex, index).await {
                bail!("No active option in {zone} takes colour slot {index}");
            }
        }
        Command::Replay { backend, uid, zone } => {
            outcome(
                "replay",
                mm.replay_active_effect(&backend, uid, zone.as_deref()).await,
            )?;
        }
        Command::BulkOption {
            option,
            data,
            colours,
        } => {
            let report = ctx
                .bulk()
                .set_bulk_option(&option, &option_data(data.as_deref()), colours)
                .await;
            println!("{report:#?}");
        }
        Command::BulkColour { hex } => {
            let report = outcome("bulk colour", ctx.bulk().set_bulk_colour(&hex).await)?;
            println!("{report:#?}");
        }
        Command::Backends { troubleshoot } => {
            for (id, status) in mm.backend_status() {
                println!("{id}: {status:?}");
                if !troubleshoot {
                    continue;
                }
                match mm.troubleshoot(id).await {
                    Outcome::Ok(Some(results)) => {
                        for result in results {
                            let mark = if result.passed { "ok" } else { "FAIL" };
                            let detail = result.detail.unwrap_or_default();
                            println!("  [{mark}] {} {detail}", result.test);
                        }
                    }
                    Outcome::Ok(None) => println!("  no self-tests"),
                    other => println!("  {other:?}"),
                }
            }
        }
        Command::Restart { backend } => outcome("restart", mm.restart(&backend).await)?,
        Command::Lock { .. } | Command::Effect { .. } => {
            unreachable!("handled before backends load")
        }
    }
    Ok(())
}

async fn run_lock_action(config_manager: &ConfigManager, action: LockAction) -> Result<()> {
    let config = config_manager.clone_config().await;
    let coordinator = polychromatic::process::ProcessCoordinator::new(&config);

    match action {
        LockAction::Status { name } => match coordinator.owner_pid(&name) {
            Some(pid) => println!("{name}: held by {pid}"),
            None => println!("{name}: unlocked"),
        },
        LockAction::Stop { name } => {
            if !coordinator.request_stop(&name) {
                println!("{name}: no running owner");
            }
        }
        LockAction::Reload { name } => {
            if !coordinator.request_reload(&name) {
                println!("{name}: no running owner");
            }
        }
        LockAction::Hold { name } => {
            match coordinator.acquire(&name)? {
                AcquireOutcome::HeldBy(pid) => bail!("{name} is held by {pid}"),
                outcome => info!("{name}: {outcome:?}"),
            }
            let signals = ControlSignals::register()?;
            while !signals.stop_requested() {
                if signals.take_reload() {
                    config_manager
                        .reload()
                        .await
                        .context("Reload requested but config is invalid")?;
                }
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {}
                }
            }
            coordinator.release(&name)?;
        }
    }
    Ok(())
}

async fn run_effect_action(config_manager: &ConfigManager, action: EffectAction) -> Result<()> {
    let config = config_manager.clone_config().await;
    let effects = polychromatic::effects::EffectFileManager::new(config.paths.effects_dir.clone());

    match action {
        EffectAction::List => {
            for listing in effects.list_items()? {
                match listing.outcome {
                    Ok(effect) => println!(
                        "{}  {} ({:?})",
                        listing.path.display(),
                        effect.meta.name,
                        effect.effect_type()
                    ),
                    Err(e) => println!("{}  unusable: {e}", listing.path.display()),
                }
            }
        }
        EffectAction::New { name, kind } => {
            let kind: EffectType = kind.parse().map_err(|e: String| anyhow!(e))?;
            let path = effects.save_item(&effects.init_data(&name, kind), None)?;
            println!("{}", path.display());
        }
        EffectAction::Validate { path } => match effects.get_item(&path) {
            Ok(effect) => println!("{}: valid", effect.meta.name),
            Err(LoadError::BadData { violations }) => {
                for violation in &violations {
                    println!("{violation}");
                }
                bail!("{} problem(s) in {}", violations.len(), path.display());
            }
            Err(e) => bail!("{}: {e}", path.display()),
        },
        EffectAction::Clone { path } => println!("{}", effects.clone_item(&path)?.display()),
        EffectAction::Delete { path } => effects.delete_item(&path)?,
        EffectAction::Rename { path, name } => {
            println!("{}", effects.rename_item(&path, &name)?.display());
        }
        EffectAction::Run { path, serial } => {
            effects.get_item(&path)?;
            let coordinator = polychromatic::process::ProcessCoordinator::new(&config);
            if !coordinator.run_effect(&serial, &path).await {
                bail!("Could not start the effect helper");
            }
        }
    }
    Ok(())
}
