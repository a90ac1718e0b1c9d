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
use std::{error::Error, path::PathBuf, time::Duration};

use beatsync::{
    audio,
    clock::{clamp_tempo, TimeSignature},
    config::{self, init_session},
    engine::Settings,
    midi, session,
};
use clap::{crate_version, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

const SYSTEMD_SERVICE: &str = r#"
[Unit]
Description=beatsync musical event scheduler

[Service]
Type=simple
Restart=on-failure
EnvironmentFile=-/etc/default/beatsync
ExecStart=/usr/local/bin/beatsync start "$BEATSYNC_CONFIG"

[Install]
WantedBy=multi-user.target
Alias=beatsync.service
"#;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A sample-accurate musical event scheduler."
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
    /// Runs a metronome for a fixed amount of time.
    Click {
        /// The tempo in beats per minute.
        #[arg(short, long, default_value_t = 120.0)]
        bpm: f64,
        /// The time signature, e.g. 3/4.
        #[arg(short, long, default_value = "4/4")]
        time_signature: String,
        /// How long to click for.
        #[arg(short, long, default_value_t = 8)]
        seconds: u64,
        /// The device to drive the scheduler from.
        #[arg(short, long, default_value = "simulated")]
        device: String,
        /// Frames per render cycle.
        #[arg(long)]
        buffer_size: Option<usize>,
    },
    /// Checks a session file and prints what it would set up.
    Validate {
        /// The path to the session config.
        config_path: PathBuf,
    },
    /// Starts a session and runs until the controller closes.
    Start {
        /// The path to the session config.
        config_path: PathBuf,
    },
    /// Prints a systemd service definition to stdout.
    Systemd {},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;
            println!("Devices:");
            println!("- {} (wall clock)", audio::SIMULATED_DEVICE);
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
        Commands::Click {
            bpm,
            time_signature,
            seconds,
            device,
            buffer_size,
        } => {
            let defaults = Settings::default();
            let settings = Settings {
                tempo: clamp_tempo(bpm),
                time_signature: time_signature.parse::<TimeSignature>()?,
                buffer_size: buffer_size.unwrap_or(defaults.buffer_size),
                ..defaults
            };
            if settings.buffer_size == 0 {
                return Err("buffer size must be non-zero".into());
            }
            let status = session::click(
                &settings,
                &config::Audio::new(&device),
                Duration::from_secs(seconds),
            )
            .await?;
            println!(
                "Fired {} events through bar {} ({} notifications dropped).",
                status.fired,
                status.bar + 1,
                status.dropped
            );
        }
        Commands::Validate { config_path } => {
            let config = config::Session::deserialize(&config_path)?;
            let settings = config.settings()?;
            println!(
                "{} Hz, {} frames, {} BPM in {}, {} beats ahead",
                settings.sample_rate,
                settings.buffer_size,
                settings.tempo,
                settings.time_signature,
                settings.lookahead_beats
            );
            println!("Audio device: {}", config.audio().device());
            if let Some(midi) = config.midi() {
                println!("MIDI device: {}", midi.device());
            }
            let triggers = config.triggers()?;
            println!("Triggers (count: {}):", triggers.len());
            for trigger in triggers {
                println!("- {}", trigger);
            }
        }
        Commands::Start { config_path } => {
            let status = init_session(&config_path)?.join().await?;
            println!("Fired {} events.", status.fired);
        }
        Commands::Systemd {} => {
            println!("{}", SYSTEMD_SERVICE)
        }
    }

    Ok(())
}
