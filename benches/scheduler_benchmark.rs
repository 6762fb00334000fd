use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use practice_player::clock::SystemTimer;
use practice_player::config::CompressorConfig;
use practice_player::render::OutputBus;
use practice_player::{
    EngineConfig, GranularEngine, GranularParams, PlaybackController, QualityTier, SourceBuffer,
};

const SAMPLE_RATE: f32 = 48_000.0;
const BLOCK_SIZE: usize = 128;

fn test_buffer(seconds: f32) -> SourceBuffer {
    let frames = (seconds * SAMPLE_RATE) as usize;
    let samples = (0..frames)
        .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / SAMPLE_RATE).sin() * 0.5)
        .collect();
    SourceBuffer::mono(samples, SAMPLE_RATE).expect("valid buffer")
}

fn bench_tick(c: &mut Criterion) {
    let buffer = Arc::new(test_buffer(30.0));
    let mut group = c.benchmark_group("granular_tick");
    for tier in QualityTier::ALL {
        group.bench_function(tier.as_str(), |b| {
            b.iter_batched(
                || {
                    let params = GranularParams {
                        playback_rate: 0.8,
                        pitch_semitones: 3.0,
                        loop_region: None,
                        max_loops: 0,
                        loop_count: 0,
                        tier,
                        adaptive: None,
                    };
                    let mut engine =
                        GranularEngine::new(Arc::clone(&buffer), SAMPLE_RATE, params, Arc::new(SystemTimer));
                    engine.start(0.0, 0.0);
                    let bus = OutputBus::new(SAMPLE_RATE, 1.0, &CompressorConfig::default());
                    (engine, bus)
                },
                |(mut engine, mut bus)| {
                    let cadence = tier.settings().tick_cadence;
                    for step in 0..20 {
                        engine.tick(step as f64 * cadence, &mut bus);
                    }
                    black_box(bus.voice_count())
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_process(c: &mut Criterion) {
    let mut group = c.benchmark_group("controller_process");
    for (name, rate, pitch) in [("standard", 1.0, 0.0), ("granular", 0.75, -2.0)] {
        let mut config = EngineConfig::default();
        config.adaptive_quality = false;
        let mut controller = PlaybackController::new(SAMPLE_RATE, config).expect("valid config");
        controller.load(test_buffer(60.0));
        controller.set_playback_rate(rate);
        controller.set_pitch_shift(pitch);
        controller.play();

        let mut left = vec![0.0f32; BLOCK_SIZE];
        let mut right = vec![0.0f32; BLOCK_SIZE];
        group.bench_function(name, |b| {
            b.iter(|| {
                if !controller.is_playing() {
                    controller.seek(0.0);
                    controller.play();
                }
                controller.process(&mut left, &mut right);
                black_box(left[0]);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_tick, bench_process);
criterion_main!(benches);
