//! Interactive native player: plays a WAV through the default output device and reads
//! transport commands from stdin.

mod audio_buffer;
mod cpal_host;
mod renderer;

use std::io::BufRead;
use std::path::PathBuf;
use std::thread;

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossbeam_channel::{bounded, unbounded};

use cpal_host::AudioHost;
use practice_player::wav::read_wav;
use practice_player::{EngineConfig, LoopPointKind, PlaybackController, QualityTier};
use renderer::{ChannelObserver, Command, Notice, PlayerRenderer};

#[derive(Parser, Debug)]
#[command(name = "practice_host", about = "Practice a track at any tempo and pitch")]
struct Cli {
    /// WAV file to practice with
    input: PathBuf,
    /// Engine config JSON
    #[arg(long)]
    config: Option<PathBuf>,
    /// Starting quality tier
    #[arg(short, long)]
    quality: Option<QualityTier>,
}

const HELP: &str = "\
commands:
  play | pause | stop          transport
  seek <seconds>               jump
  rate <0.5..1.5>              tempo
  pitch <-12..12>              semitones, 0.5 steps
  a | b                        capture loop start / end at the playhead
  loop <start> <end>           set both loop bounds
  clear                        remove the loop
  max <n>                      loop repetitions (0 = forever)
  quality <low|medium|high>    quality tier
  adaptive <on|off>            adaptive quality
  preserve <on|off>            keep pitch when changing tempo
  volume <0..1>                output gain
  status                       print session state
  quit";

fn parse_switch(word: Option<&str>) -> Result<bool> {
    match word {
        Some("on") | Some("true") => Ok(true),
        Some("off") | Some("false") => Ok(false),
        other => bail!("expected on/off, got {:?}", other.unwrap_or("")),
    }
}

fn parse_number<T: std::str::FromStr>(word: Option<&str>, what: &str) -> Result<T> {
    let word = word.with_context(|| format!("missing {}", what))?;
    word.parse()
        .map_err(|_| anyhow::anyhow!("'{}' is not a valid {}", word, what))
}

/// `Ok(None)` means quit.
fn parse_command(line: &str) -> Result<Option<Command>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        bail!("empty command");
    };
    let command = match verb {
        "play" => Command::Play,
        "pause" => Command::Pause,
        "stop" => Command::Stop,
        "seek" => Command::Seek(parse_number(words.next(), "time")?),
        "rate" => Command::Rate(parse_number(words.next(), "rate")?),
        "pitch" => Command::Pitch(parse_number(words.next(), "pitch")?),
        "a" => Command::LoopPoint(LoopPointKind::Start),
        "b" => Command::LoopPoint(LoopPointKind::End),
        "loop" => Command::Loop(
            parse_number(words.next(), "loop start")?,
            parse_number(words.next(), "loop end")?,
        ),
        "clear" => Command::ClearLoop,
        "max" => Command::MaxLoops(parse_number(words.next(), "loop count")?),
        "quality" => {
            let word = words.next().context("missing quality tier")?;
            Command::Quality(word.parse().map_err(anyhow::Error::msg)?)
        }
        "adaptive" => Command::Adaptive(parse_switch(words.next())?),
        "preserve" => Command::PreservePitch(parse_switch(words.next())?),
        "volume" => Command::Volume(parse_number(words.next(), "volume")?),
        "status" => Command::Status,
        "quit" | "exit" => return Ok(None),
        other => bail!("unknown command '{}'", other),
    };
    Ok(Some(command))
}

fn print_notice(notice: Notice) {
    match notice {
        Notice::Time(t) => println!("at {:.3}s", t),
        Notice::LoopCount(count) => println!("loop count {}", count),
        Notice::LoopComplete => {}
        Notice::Quality(tier) => println!("quality {}", tier.as_str()),
        Notice::Ended => println!("playback ended"),
        Notice::LoopPoint(kind, Some(t)) => println!("loop {:?} at {:.3}s", kind, t),
        Notice::LoopPoint(kind, None) => println!("loop {:?} rejected", kind),
        Notice::Applied(message) => println!("{}", message),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_json(
            &std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?,
        )?,
        None => EngineConfig::default(),
    };
    if let Some(tier) = cli.quality {
        config.quality_mode = tier;
    }
    let buffer = read_wav(&cli.input).with_context(|| format!("reading {}", cli.input.display()))?;

    let (command_tx, command_rx) = unbounded();
    let (notice_tx, notice_rx) = bounded(256);

    let host = AudioHost::start(|sample_rate| {
        let mut controller = PlaybackController::new(sample_rate, config)?;
        controller.set_observer(Box::new(ChannelObserver::new(notice_tx.clone())));
        controller.load(buffer);
        Ok(PlayerRenderer::new(controller, command_rx, notice_tx))
    })?;

    thread::spawn(move || {
        for notice in notice_rx {
            print_notice(notice);
        }
    });

    println!("output at {} Hz\n{}", host.sample_rate(), HELP);
    for line in std::io::stdin().lock().lines() {
        let line = line.context("reading stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_command(&line) {
            Ok(Some(command)) => {
                if command_tx.send(command).is_err() {
                    bail!("audio thread is gone");
                }
            }
            Ok(None) => break,
            Err(err) => eprintln!("{}", err),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_transport_and_parameters() {
        assert_eq!(parse_command("play").unwrap(), Some(Command::Play));
        assert_eq!(parse_command("pitch -3.5").unwrap(), Some(Command::Pitch(-3.5)));
        assert_eq!(parse_command("loop 2 5").unwrap(), Some(Command::Loop(2.0, 5.0)));
        assert_eq!(
            parse_command("quality high").unwrap(),
            Some(Command::Quality(QualityTier::High))
        );
        assert_eq!(parse_command("adaptive off").unwrap(), Some(Command::Adaptive(false)));
        assert_eq!(parse_command("quit").unwrap(), None);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_command("seek").is_err());
        assert!(parse_command("rate fast").is_err());
        assert!(parse_command("preserve maybe").is_err());
        assert!(parse_command("dance").is_err());
    }
}
