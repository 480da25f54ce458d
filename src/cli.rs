use clap::{ArgAction, Parser, Subcommand};
use kmsmode::kms::ModeRequest;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kmsmode", version, about = "Query and set display modes on Linux KMS")]
pub struct Cli {
    /// DRM device node (default: config `device`, else /dev/dri/card0)
    #[arg(long, short)]
    pub device: Option<PathBuf>,

    /// Config file (default: $KMSMODE_CONFIG, ~/.config/kmsmode/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// More logging (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List connectors and the modes they advertise
    List,

    /// Set a mode on a connector
    #[command(alias = "test")]
    Set {
        /// Connector id (see `list`)
        connector: u32,

        /// Mode name, optionally with refresh (1920x1080 or 1920x1080@60).
        /// Omit to use the preferred mode.
        mode: Option<ModeRequest>,

        /// Refresh rate in Hz, overriding one given with the mode
        #[arg(requires = "mode")]
        refresh: Option<u32>,

        /// Try the mode even if the connector does not advertise it
        #[arg(long)]
        lenient: bool,

        /// Keep the mode on screen for this many seconds
        #[arg(long, default_value_t = 0)]
        hold: u64,

        /// Put the CRTC back as it was before exiting
        #[arg(long)]
        restore: bool,
    },

    /// Apply fallback modes to connected outputs that advertise none
    Fallback {
        /// Keep the modes on screen for this many seconds
        #[arg(long, default_value_t = 0)]
        hold: u64,
    },
}
