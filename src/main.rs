//! `noir-wasapi`: probe the WASAPI output from the command line
//!
//! ```text
//! noir-wasapi devices
//! noir-wasapi tone --seconds 3 --frequency 440 --config output.json
//! noir-wasapi tone --virtual
//! ```

use std::f32::consts::TAU;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use noir_wasapi::audio::{AudioBackend, StreamState, VirtualEndpoint, VirtualHost, WasapiBackend};
use noir_wasapi::{create_backend, OutputConfig};

#[derive(Parser, Debug)]
#[command(name = "noir-wasapi", version, about = "WASAPI output probe")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List active render endpoints by friendly name
    Devices {
        /// Use the in-memory host instead of the system one
        #[arg(long = "virtual")]
        virtual_host: bool,
    },
    /// Play a sine tone through the selected endpoint
    Tone {
        /// Output config (JSON); defaults are used when absent
        #[arg(long)]
        config: Option<PathBuf>,

        /// Tone duration in seconds
        #[arg(long, default_value_t = 2.0)]
        seconds: f32,

        /// Tone frequency in Hz
        #[arg(long, default_value_t = 440.0)]
        frequency: f32,

        /// Use the in-memory host instead of the system one
        #[arg(long = "virtual")]
        virtual_host: bool,
    },
}

fn virtual_host() -> VirtualHost {
    VirtualHost::new()
        .with_endpoint(VirtualEndpoint::new("virtual-0", "Virtual Speakers"))
        .with_endpoint(VirtualEndpoint::new("virtual-1", "Virtual Headphones"))
        .with_default("virtual-0")
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Devices { virtual_host: true } => {
            let backend = WasapiBackend::with_host(virtual_host());
            print_devices(&backend);
        }
        Command::Devices { virtual_host: false } => {
            let backend = create_backend().context("Could not create WASAPI backend")?;
            print_devices(backend.as_ref());
        }
        Command::Tone {
            config,
            seconds,
            frequency,
            virtual_host: use_virtual,
        } => {
            let config = match config {
                Some(path) => OutputConfig::load(&path)
                    .with_context(|| format!("Could not load {}", path.display()))?,
                None => OutputConfig::default(),
            };

            if use_virtual {
                let host = virtual_host();
                let mut backend = WasapiBackend::with_host(host.clone());
                play_tone(&mut backend, &config, seconds, frequency, Some(&host))?;
                eprintln!(
                    "Virtual device consumed {} bytes",
                    host.played_bytes().len()
                );
            } else {
                let mut backend = create_backend().context("Could not create WASAPI backend")?;
                play_tone(backend.as_mut(), &config, seconds, frequency, None)?;
            }
        }
    }

    Ok(())
}

fn print_devices(backend: &dyn AudioBackend) {
    let names = backend.list_available_devices();
    if names.is_empty() {
        println!("No active output devices");
        return;
    }
    for (i, name) in names.iter().enumerate() {
        println!("{:>2}: {}", i, name);
    }
}

/// At most one period per submit, bounded by free space and what is left
fn frames_to_submit(free: u32, period_frames: u32, remaining: u64) -> u32 {
    free.min(period_frames).min(remaining.min(u32::MAX as u64) as u32)
}

/// Producer loop: submit up to one period, then wait for the host event
///
/// `device` stands in for the audio engine when running on the virtual host,
/// consuming one period of frames per iteration.
fn play_tone(
    backend: &mut dyn AudioBackend,
    config: &OutputConfig,
    seconds: f32,
    frequency: f32,
    device: Option<&VirtualHost>,
) -> Result<()> {
    backend.open(config);
    if backend.state() != StreamState::Ready {
        bail!("Could not open {} output", backend.name());
    }

    let format = backend.format().context("Open stream has no format")?;
    let period = backend.period().context("Open stream has no period")?;
    let period_frames = (format.sample_rate as u128 * period.as_micros() / 1_000_000) as u32;
    eprintln!("Output: {} (period {:?})", format, period);

    let channels = format.channels as usize;
    let total_frames = (seconds.max(0.0) * format.sample_rate as f32) as u64;
    let step = TAU * frequency / format.sample_rate as f32;
    let mut phase = 0.0f32;
    let mut written: u64 = 0;
    let mut samples: Vec<i16> = Vec::new();

    backend.play();
    while written < total_frames {
        let free = backend.available_frames().unwrap_or(0);
        let frames = frames_to_submit(free, period_frames, total_frames - written);
        if frames > 0 {
            samples.clear();
            for _ in 0..frames {
                let value = (phase.sin() * 0.2 * i16::MAX as f32) as i16;
                samples.extend(std::iter::repeat(value).take(channels));
                phase = (phase + step) % TAU;
            }
            if !backend.submit(&samples, frames) {
                backend.close();
                bail!("Submit of {} frames failed", frames);
            }
            written += frames as u64;
        }

        if let Some(host) = device {
            host.drain(period_frames);
        }
        if !backend.wait_for_buffer(period * 2) {
            log::warn!("[WASAPI] No buffer event within {:?}", period * 2);
        }
    }

    backend.close();
    eprintln!("Wrote {} frames", written);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_is_capped_at_one_period() {
        // Fresh 2-period buffer: only one period goes out
        assert_eq!(frames_to_submit(960, 480, 48_000), 480);
        assert_eq!(frames_to_submit(200, 480, 48_000), 200);
        assert_eq!(frames_to_submit(960, 480, 100), 100);
        assert_eq!(frames_to_submit(0, 480, 100), 0);
    }

    #[test]
    fn test_tone_on_virtual_host() {
        let host = virtual_host();
        let mut backend = WasapiBackend::with_host(host.clone());
        let config = OutputConfig {
            downmix_to_2ch: true,
            ..OutputConfig::default()
        };

        play_tone(&mut backend, &config, 0.05, 440.0, Some(&host)).unwrap();

        // 50 ms at 48 kHz, stereo 16-bit
        assert_eq!(host.played_bytes().len() + host.queued_bytes().len(), 2400 * 4);
        assert_eq!(backend.state(), StreamState::Closed);
    }
}
