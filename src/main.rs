use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod config;
mod replay;

use config::AppConfig;
use rtpdenoise_core::constants::{BYTES_PER_SAMPLE, SAMPLE_RATE};

#[derive(Parser)]
#[command(name = "rtpdenoise")]
#[command(about = "rtpdenoise: RNNoise suppression for RTP PCM streams", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a raw 48kHz s16le mono file through the filter as RTP packets
    Process {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Force suppression on regardless of the config file
        #[arg(long)]
        enable: bool,
        #[arg(long)]
        threshold: Option<f32>,
        /// PCM bytes per generated RTP packet
        #[arg(long)]
        packet_bytes: Option<usize>,
    },
    /// Print the effective configuration
    Config {
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
    /// Write the default configuration file
    InitConfig {
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            input,
            output,
            config,
            enable,
            threshold,
            packet_bytes,
        } => {
            let mut cfg = AppConfig::load(config.as_deref())?;
            if enable {
                cfg.noise_filter.enabled = true;
            }
            if let Some(threshold) = threshold {
                cfg.noise_filter.threshold = threshold;
            }
            if let Some(packet_bytes) = packet_bytes {
                cfg.packet_bytes = packet_bytes;
            }
            cfg.noise_filter.validate()?;

            let summary = replay::replay_file(&input, &output, &cfg)?;
            println!(
                "{} packets, {:.2}s, {} -> {} bytes ({})",
                summary.packets,
                summary.bytes_in as f64 / (SAMPLE_RATE as usize * BYTES_PER_SAMPLE) as f64,
                summary.bytes_in,
                summary.bytes_out,
                if summary.filtered { "filtered" } else { "passed through" }
            );
            if summary.filtered {
                let stats = summary.stats;
                println!(
                    "suppressed {} / passed {} packets; frames: {} voiced, {} attenuated, {} errors; {} fallbacks",
                    stats.packets_suppressed,
                    stats.packets_passed,
                    stats.frames_voiced,
                    stats.frames_attenuated,
                    stats.frame_errors,
                    stats.fallbacks
                );
            }
        }
        Commands::Config { path } => {
            let cfg = AppConfig::load(path.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&cfg)?);
        }
        Commands::InitConfig { path } => {
            let written = AppConfig::default().save(path.as_deref())?;
            println!("Wrote default configuration to {}", written.display());
        }
    }

    Ok(())
}
