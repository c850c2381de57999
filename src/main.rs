// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use slotlaunch::{audio, config, launcher, midi};

/// How long to wait for the audio device to start rendering before giving up on the transport.
const TRANSPORT_START_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A MIDI-triggered sample launcher."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the available MIDI input devices.
    MidiDevices {},
    /// Verifies a launcher config and decodes every sample it names.
    Verify {
        /// The path to the launcher config.
        config_path: PathBuf,
    },
    /// Starts the launcher.
    Start {
        /// The path to the launcher config.
        config_path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::MidiDevices {} => {
            let devices = midi::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Verify { config_path } => {
            let config = config::Launcher::deserialize(&config_path)?;
            let failures = launcher::verify(&config);

            println!(
                "{} slots configured, bank capacity {}.",
                config.bank().slots().len(),
                config.bank().capacity()
            );
            if failures.is_empty() {
                println!("All samples decoded.");
                return Ok(());
            }

            for failure in &failures {
                println!("- {}", failure);
            }
            return Err(format!("{} samples failed to load", failures.len()).into());
        }
        Commands::Start { config_path } => {
            let config = config::Launcher::deserialize(&config_path)?;
            let launcher = launcher::Launcher::new(&config)?;
            if let Ok(origin) = launcher.start_transport(TRANSPORT_START_TIMEOUT).await {
                info!(origin, "Launcher running");
            }

            let mut controller = launcher.controller()?;
            if let Err(e) = controller.join().await {
                error!(err = %e, "Controller failed");
                return Err(e.into());
            }
        }
    }

    Ok(())
}
