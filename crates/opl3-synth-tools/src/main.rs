use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod notes;
mod play;
mod settings;

use notes::print_note_table;
use play::{PlayOptions, play};
use settings::load_settings;

/// opl3-synth diagnostic tools
#[derive(Parser)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a Standard MIDI File against a recording bus and summarise the chip activity
    Play {
        /// MIDI file to replay
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Settings file (TOML, YAML or JSON) with [synth] and [[patches]] sections
        #[arg(long, value_name = "CONFIG")]
        config: Option<PathBuf>,
        /// Enable rhythm-mode percussion regardless of the settings file
        #[arg(long)]
        percussion: bool,
        /// Print every key-on, key-off and tone change as it reaches the chip
        #[arg(long)]
        dump: bool,
        /// Keep servicing voices this long after the last event (ms)
        #[arg(long = "tail-ms", default_value_t = 2000)]
        tail_ms: u32,
    },
    /// Print the MIDI note to block/F-number table
    Notes {
        /// First note to print
        #[arg(long, default_value_t = 0)]
        from: u8,
        /// Last note to print
        #[arg(long, default_value_t = 127)]
        to: u8,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play {
            file,
            config,
            percussion,
            dump,
            tail_ms,
        } => {
            let mut settings = load_settings(config.as_deref())?;
            if percussion {
                settings.synth.percussion = true;
            }
            play(
                &file,
                &settings,
                PlayOptions { dump, tail_ms },
            )?;
        }
        Commands::Notes { from, to } => {
            print_note_table(from, to)?;
        }
    }

    Ok(())
}
