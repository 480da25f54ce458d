//! kmsmode - list, set and fall back display modes on a KMS device

mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use kmsmode::kms::{
    apply_fallback, commit, describe, ModeRequest, ResourceCatalog, SavedCrtc,
};
use kmsmode::kms::{catalog::state_name, mode::is_preferred, Device};
use kmsmode::Config;
use log::{debug, info};
use std::path::PathBuf;
use std::time::Duration;

use cli::{Cli, Command};

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn hold(secs: u64) {
    if secs > 0 {
        println!("Holding for {secs}s...");
        std::thread::sleep(Duration::from_secs(secs));
    }
}

fn fetch(device: &Device, config: &Config) -> Result<ResourceCatalog> {
    let catalog = ResourceCatalog::fetch(device, config.modeset.force_probe)?;
    for line in catalog.summary() {
        debug!("{}", line);
    }
    Ok(catalog)
}

fn list(device: &Device, config: &Config) -> Result<()> {
    let catalog = fetch(device, config)?;

    println!("Available connectors:");
    for conn in catalog.connectors() {
        println!(
            "Connector ID: {} Type: {} ({})",
            conn.id(),
            conn.name(),
            conn.interface_id
        );
        println!("  Status: {}", state_name(conn.state));
        if !conn.is_connected() {
            continue;
        }
        if conn.modes.is_empty() {
            println!("  Modes: none (EDID unavailable, try `fallback`)");
            continue;
        }
        println!("  Modes:");
        for mode in &conn.modes {
            let marker = if is_preferred(mode) { " *" } else { "" };
            println!("    {}{}", describe(mode), marker);
        }
    }
    for handle in catalog.skipped() {
        println!("Connector ID: {} (query failed)", u32::from(*handle));
    }

    let crtcs: Vec<String> = catalog
        .crtcs()
        .iter()
        .map(|&c| u32::from(c).to_string())
        .collect();
    println!("CRTCs: {}", crtcs.join(", "));
    Ok(())
}

struct SetArgs {
    connector: u32,
    mode: Option<ModeRequest>,
    lenient: bool,
    hold: u64,
    restore: bool,
}

fn set(device: &Device, config: &Config, args: SetArgs) -> Result<()> {
    let catalog = fetch(device, config)?;
    let resolver = config.resolver(args.lenient);
    let resolved = resolver.resolve(&catalog, args.connector, args.mode.as_ref())?;

    let saved = if args.restore {
        Some(SavedCrtc::save(device, &resolved)?)
    } else {
        None
    };

    let scanout = commit(device, &resolved)?;
    println!(
        "Successfully set mode: {}{} on connector {} (CRTC {})",
        describe(resolved.mode()),
        if resolved.is_synthetic() { " [synthetic]" } else { "" },
        resolved.connector_id(),
        resolved.crtc_id()
    );

    hold(args.hold);

    // Restore before the scanout is dropped so the CRTC never scans out a
    // removed framebuffer
    if let Some(saved) = saved {
        saved.restore(device)?;
    }
    drop(scanout);
    Ok(())
}

fn fallback(device: &Device, config: &Config, hold_secs: u64) -> Result<()> {
    let catalog = fetch(device, config)?;
    let report = apply_fallback(device, &catalog, &config.fallback_policy());

    if report.is_empty() {
        println!("All connected outputs advertise modes. No fallback needed.");
        return Ok(());
    }

    for outcome in &report.outcomes {
        match &outcome.result {
            Ok((mode, _)) => println!(
                "Connector {}: fallback mode {} applied",
                outcome.connector,
                describe(mode)
            ),
            Err(e) => eprintln!("Connector {}: {}", outcome.connector, e),
        }
    }

    hold(hold_secs);

    let failures = report.failures();
    if failures > 0 {
        bail!(
            "fallback failed on {} of {} connector(s)",
            failures,
            report.outcomes.len()
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::load(),
    };

    let path = cli
        .device
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.device));
    // Released by Drop on every return path below
    let device = Device::open(&path)?;
    println!("Using device: {}", path.display());
    info!("kmsmode {} on {}", env!("CARGO_PKG_VERSION"), path.display());

    match cli.command {
        Command::List => list(&device, &config),
        Command::Set {
            connector,
            mode,
            refresh,
            lenient,
            hold,
            restore,
        } => {
            let mode = match (mode, refresh) {
                (Some(mode), Some(hz)) => Some(mode.with_refresh(hz)),
                (mode, _) => mode,
            };
            set(
                &device,
                &config,
                SetArgs {
                    connector,
                    mode,
                    lenient,
                    hold,
                    restore,
                },
            )
            .with_context(|| format!("set mode on connector {}", connector))
        }
        Command::Fallback { hold } => fallback(&device, &config, hold),
    }
}
