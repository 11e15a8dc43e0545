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
use std::io::{self, BufRead};
use std::path::PathBuf;

use clap::{crate_version, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tritone::audio;
use tritone::config::EngineConfig;
use tritone::performance;
use tritone::songfile;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A step-sequenced sample player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Plays a song through the audio interface until enter is pressed.
    Play {
        /// The path to the song file.
        song: PathBuf,
        /// The engine configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// The output device. Overrides the device in the configuration.
        #[arg(short, long)]
        device: Option<String>,
        /// The position to start playing from, in sub-beats.
        #[arg(short, long, default_value_t = 0)]
        start: u32,
    },
    /// Prints a summary of a song file.
    Inspect {
        /// The path to the song file.
        song: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
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
        Commands::Play {
            song,
            config,
            device,
            start,
        } => {
            let mut config = match config {
                Some(path) => EngineConfig::deserialize(&path)?,
                None => EngineConfig::default(),
            };
            if let Some(device) = device {
                config = config.with_device(&device);
            }

            let (playback, renderer) = performance::engine(&config);
            let device = audio::get_device(&config)?;
            let stream = device.start(renderer)?;

            playback.load(&song, false)?;
            playback.request_set_playhead_start(start);
            playback.play();
            info!(song = ?song, device = %device, start, "Playing");

            println!("Playing {}. Press enter to stop.", song.display());
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;

            playback.pause();
            drop(stream);
        }
        Commands::Inspect { song } => {
            let data = songfile::read_file(&song)?;
            println!("{}", song.display());
            println!("  bpm: {}", data.bpm);
            println!("  end position: {}", data.end_position);
            println!("  notes: {}", data.note_count());
            for (i, track) in data.tracks.iter().enumerate() {
                if track.is_empty() && track.sample_path.is_none() {
                    continue;
                }
                let sample = track
                    .sample_path
                    .as_deref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "(sine)".to_string());
                println!(
                    "  track {:>2}: {} notes, {} velocity events, {} pan events, sample {}{}{}",
                    i,
                    track.note_count(),
                    track.velocity_events.len(),
                    track.pan_events.len(),
                    sample,
                    if track.one_shot { ", one-shot" } else { "" },
                    if track.muted { ", muted" } else { "" },
                );
            }
        }
    }

    Ok(())
}
