//! Render a WAV file through the practice engine at a chosen tempo, pitch and loop.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use practice_player::wav::{read_wav, write_wav};
use practice_player::{EngineConfig, PlaybackController, PlaybackObserver, QualityTier};

#[derive(Parser, Debug)]
#[command(name = "render_offline", about = "Render a WAV at a new tempo and pitch")]
struct Cli {
    /// Input WAV file
    input: PathBuf,
    /// Output WAV file (32-bit float stereo)
    output: PathBuf,
    /// Playback rate, 0.5 to 1.5
    #[arg(short, long, default_value_t = 1.0)]
    rate: f64,
    /// Pitch shift in semitones, -12 to 12 in 0.5 steps
    #[arg(short, long, default_value_t = 0.0, allow_hyphen_values = true)]
    pitch: f64,
    /// Start position in seconds
    #[arg(long, default_value_t = 0.0)]
    start: f64,
    /// Loop start in seconds (requires --loop-end)
    #[arg(long, requires = "loop_end")]
    loop_start: Option<f64>,
    /// Loop end in seconds
    #[arg(long, requires = "loop_start")]
    loop_end: Option<f64>,
    /// Loop repetitions; 0 loops until --max-seconds
    #[arg(long, default_value_t = 1)]
    max_loops: u32,
    /// Quality tier: low, medium or high
    #[arg(short, long)]
    quality: Option<QualityTier>,
    /// Let tempo changes move pitch, like a turntable
    #[arg(long)]
    no_preserve_pitch: bool,
    /// Engine config JSON
    #[arg(long)]
    config: Option<PathBuf>,
    /// Output sample rate; defaults to the input's
    #[arg(long)]
    sample_rate: Option<u32>,
    /// Stop rendering after this much output
    #[arg(long, default_value_t = 600.0)]
    max_seconds: f64,
    /// Frames per process call
    #[arg(long, default_value_t = 128)]
    block_size: usize,
}

struct LoopLogger;

impl PlaybackObserver for LoopLogger {
    fn on_loop_count_update(&mut self, count: u32) {
        if count > 0 {
            info!("loop {} complete", count);
        }
    }

    fn on_quality_change(&mut self, tier: QualityTier) {
        info!("quality tier now {}", tier.as_str());
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            EngineConfig::from_json(&json).context("parsing engine config")?
        }
        None => EngineConfig::default(),
    };
    if let Some(tier) = cli.quality {
        config.quality_mode = tier;
    }
    // Offline rendering has no real-time budget to protect.
    config.adaptive_quality = false;
    config.preserve_pitch = !cli.no_preserve_pitch;
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    if cli.block_size == 0 {
        bail!("--block-size must be positive");
    }

    let buffer = read_wav(&cli.input).with_context(|| format!("reading {}", cli.input.display()))?;
    let sample_rate = cli.sample_rate.unwrap_or(buffer.sample_rate() as u32);
    let config = load_config(&cli)?;

    let mut controller = PlaybackController::new(sample_rate as f32, config).context("creating controller")?;
    controller.set_observer(Box::new(LoopLogger));
    controller.load(buffer);

    let rate = controller.set_playback_rate(cli.rate);
    let pitch = controller.set_pitch_shift(cli.pitch);
    if let (Some(start), Some(end)) = (cli.loop_start, cli.loop_end) {
        if controller.set_loop(start, end).is_none() {
            bail!("loop [{start}, {end}] must satisfy 0 <= start < end <= duration");
        }
        controller.set_max_loops(cli.max_loops);
    }
    controller.seek(cli.start);
    controller.play();
    info!(
        "rendering at rate {rate} pitch {pitch:+} on the {} path",
        controller.active_path().map_or("no", |p| p.as_str())
    );

    let mut left = Vec::new();
    let mut right = Vec::new();
    let mut block_left = vec![0.0; cli.block_size];
    let mut block_right = vec![0.0; cli.block_size];
    while controller.is_playing() && controller.now() < cli.max_seconds {
        controller.process(&mut block_left, &mut block_right);
        left.extend_from_slice(&block_left);
        right.extend_from_slice(&block_right);
    }
    // Let the final fade and compressor release ring out.
    for _ in 0..(sample_rate as usize / 10).div_ceil(cli.block_size) {
        controller.process(&mut block_left, &mut block_right);
        left.extend_from_slice(&block_left);
        right.extend_from_slice(&block_right);
    }

    write_wav(&cli.output, &left, &right, sample_rate)
        .with_context(|| format!("writing {}", cli.output.display()))?;
    info!(
        "wrote {:.2}s to {}",
        left.len() as f64 / sample_rate as f64,
        cli.output.display()
    );
    Ok(())
}
