//! E2E tests for the engine lifecycle and output guarantees
//!
//! Drives the engine the way a platform callback would: a cadence of fill
//! calls interleaved with control operations, checking the output-level
//! invariants and the documented boundary behaviors.

use tonegen::{
    AudioEngine, ChannelMode, EngineError, LayerConfiguration, Mixer, MAX_BUFFER,
};

fn peak(block: &[f32]) -> f32 {
    block.iter().fold(0.0f32, |p, &s| p.max(s.abs()))
}

fn engine_with(configs: &[LayerConfiguration], mode: ChannelMode) -> AudioEngine {
    let mut engine = AudioEngine::new(48_000).unwrap();
    engine
        .initialize_with_envelope(configs, mode, 0.1, 0.1)
        .unwrap();
    engine
}

/// A zero-weight layer renders bit-exact silence
#[test]
fn test_silent_engine() {
    let layer = LayerConfiguration::mono(440.0, 2.0, 1.0, 0.0).unwrap();
    let mut engine = AudioEngine::new(48_000).unwrap();
    engine.initialize(&[layer], ChannelMode::Mono).unwrap();
    engine.start().unwrap();

    let mut block = [0.3f32; 1024];
    engine.fill_mono_buffer(&mut block).unwrap();
    assert!(
        block.iter().all(|&s| s == 0.0),
        "weight-zero layer must be exactly silent"
    );
}

/// No output sample ever escapes the safety clamp, even at full gain
#[test]
fn test_clamp_under_extreme_gain() {
    let layer = LayerConfiguration::mono(440.0, 2.0, 1.0, 1.0).unwrap();
    let mut engine = engine_with(&[layer], ChannelMode::Mono);
    engine.start().unwrap();
    engine.set_master_gain(1.0);
    engine.set_output_gain(1.0);

    let mut block = [0.0f32; 1024];
    for _ in 0..10 {
        engine.fill_mono_buffer(&mut block).unwrap();
        for (i, &sample) in block.iter().enumerate() {
            assert!(sample.is_finite(), "sample {i} not finite: {sample}");
            assert!(
                (-0.999..=0.999).contains(&sample),
                "sample {i} escaped the clamp: {sample}"
            );
        }
    }
}

/// Full eight-layer pool stays clamped and finite for many blocks
#[test]
fn test_no_nan_and_clamp_full_pool() {
    let layers: Vec<LayerConfiguration> = (0..8)
        .map(|i| {
            LayerConfiguration::mono(100.0 + 100.0 * i as f32, 0.5 + i as f32, 1.0, 1.0).unwrap()
        })
        .collect();
    let mut engine = engine_with(&layers, ChannelMode::Mono);
    engine.start().unwrap();

    let mut block = [0.0f32; 2048];
    for _ in 0..200 {
        engine.fill_mono_buffer(&mut block).unwrap();
        assert!(block.iter().all(|s| s.is_finite()));
        assert!(peak(&block) <= 0.999);
    }
}

/// Output gain scales the settled signal linearly
#[test]
fn test_output_gain_scales_linearly() {
    let layer = LayerConfiguration::mono(440.0, 0.0, 0.0, 1.0).unwrap();
    let mut engine = engine_with(&[layer], ChannelMode::Mono);
    engine.start().unwrap();

    let mut block = [0.0f32; 1024];
    // Let master gain and envelope settle completely.
    for _ in 0..60 {
        engine.fill_mono_buffer(&mut block).unwrap();
    }
    let full_peak = peak(&block);
    assert!(full_peak > 0.1, "settled engine should be audible");

    engine.set_output_gain(0.5);
    engine.fill_mono_buffer(&mut block).unwrap();
    let half_peak = peak(&block);

    let ratio = half_peak / full_peak;
    assert!(
        (0.49..=0.51).contains(&ratio),
        "output gain 0.5 should halve the peak, ratio {ratio}"
    );
}

/// Master gain ramps rather than jumping to a new target
#[test]
fn test_master_gain_smoothing_prevents_jumps() {
    let layer = LayerConfiguration::mono(440.0, 0.0, 0.0, 1.0).unwrap();
    let mut engine = engine_with(&[layer], ChannelMode::Mono);
    engine.start().unwrap();

    engine.set_master_gain(0.0);
    let mut block = [0.0f32; 1024];
    for _ in 0..60 {
        engine.fill_mono_buffer(&mut block).unwrap();
    }

    engine.set_master_gain(1.0);
    engine.fill_mono_buffer(&mut block).unwrap();
    let settled_equivalent = 0.25; // layer peak after pre-mod and mix headroom
    assert!(
        peak(&block) < 0.9 * settled_equivalent,
        "first block after a gain step must still be ramping, peak {}",
        peak(&block)
    );
}

/// Stopping fades the stream out; after the release the output is zero
#[test]
fn test_stop_silences_subsequent_buffers() {
    let layer = LayerConfiguration::mono(440.0, 0.0, 0.0, 1.0).unwrap();
    let mut engine = engine_with(&[layer], ChannelMode::Mono);
    engine.start().unwrap();

    let mut block = [0.0f32; 1024];
    for _ in 0..50 {
        engine.fill_mono_buffer(&mut block).unwrap();
    }
    assert!(peak(&block) > 0.1);

    engine.stop().unwrap();

    // The first post-stop blocks still carry the release tail.
    engine.fill_mono_buffer(&mut block).unwrap();
    let tail_peak = peak(&block);
    assert!(tail_peak > 0.0, "release tail should fade, not cut");

    // Two seconds of 0.1 s release: fully silent.
    for _ in 0..100 {
        engine.fill_mono_buffer(&mut block).unwrap();
    }
    assert!(
        block.iter().all(|&s| s == 0.0),
        "stream must be exactly silent after the release completes"
    );
}

/// Restarting after stop fades back in without a pop
#[test]
fn test_restart_after_stop() {
    let layer = LayerConfiguration::mono(440.0, 0.0, 0.0, 1.0).unwrap();
    let mut engine = engine_with(&[layer], ChannelMode::Mono);
    engine.start().unwrap();
    let mut block = [0.0f32; 1024];
    for _ in 0..50 {
        engine.fill_mono_buffer(&mut block).unwrap();
    }
    engine.stop().unwrap();
    for _ in 0..100 {
        engine.fill_mono_buffer(&mut block).unwrap();
    }

    engine.start().unwrap();
    engine.fill_mono_buffer(&mut block).unwrap();
    assert!(
        peak(&block) < 0.06,
        "restart must ramp from the attack, peak {}",
        peak(&block)
    );
    for _ in 0..50 {
        engine.fill_mono_buffer(&mut block).unwrap();
    }
    assert!(peak(&block) > 0.1, "restarted engine should become audible");
}

/// Wrong fill call for the engine's channel mode
#[test]
fn test_channel_mode_mismatch() {
    let layer = LayerConfiguration::mono(440.0, 0.0, 0.0, 0.5).unwrap();
    let mut engine = engine_with(&[layer], ChannelMode::Stereo);
    let mut block = [0.0f32; 256];
    assert_eq!(
        engine.fill_mono_buffer(&mut block).unwrap_err(),
        EngineError::ChannelModeMismatch
    );
}

/// Invalid configuration is rejected at construction with the field name
#[test]
fn test_invalid_configuration_rejected() {
    let err = LayerConfiguration::mono(10.0, 2.0, 1.0, 0.5).unwrap_err();
    assert_eq!(err, EngineError::InvalidConfiguration { field: "carrier_hz" });
}

/// Two identically driven engines produce bitwise-identical output
#[test]
fn test_engine_determinism() {
    let run = || {
        let layers = [
            LayerConfiguration::mono(440.0, 2.0, 0.8, 0.7).unwrap(),
            LayerConfiguration::mono(200.0, 7.0, 1.0, 0.5).unwrap(),
        ];
        let mut engine = engine_with(&layers, ChannelMode::Mono);
        engine.start().unwrap();
        engine.set_master_gain(0.8);

        let mut out = Vec::new();
        let mut block = [0.0f32; 512];
        for i in 0..40 {
            if i == 20 {
                engine.set_master_gain(0.3);
            }
            engine.fill_mono_buffer(&mut block).unwrap();
            out.extend_from_slice(&block);
        }
        out
    };
    assert_eq!(run(), run(), "equal engines, equal calls, equal samples");
}

/// Per-layer peak respects weight scaling through the whole engine path
#[test]
fn test_single_layer_peak_tracks_weight() {
    for &weight in &[0.25f32, 0.5, 1.0] {
        let layer = LayerConfiguration::mono(440.0, 2.0, 1.0, weight).unwrap();
        let mut engine = engine_with(&[layer], ChannelMode::Mono);
        engine.start().unwrap();

        let mut block = [0.0f32; 1024];
        let mut observed = 0.0f32;
        for _ in 0..100 {
            engine.fill_mono_buffer(&mut block).unwrap();
            observed = observed.max(peak(&block));
        }
        // carrier x 0.5 pre-mod headroom x weight x 0.5 mix headroom
        let bound = 0.25 * weight + 1e-4;
        assert!(
            observed <= bound,
            "weight {weight}: peak {observed} above bound {bound}"
        );
    }
}

/// Blocks larger than the engine maximum are refused
#[test]
fn test_oversized_block_refused() {
    let layer = LayerConfiguration::mono(440.0, 0.0, 0.0, 0.5).unwrap();
    let mut engine = engine_with(&[layer], ChannelMode::Mono);
    let mut block = vec![0.0f32; MAX_BUFFER + 1];
    assert_eq!(
        engine.fill_mono_buffer(&mut block).unwrap_err(),
        EngineError::InvalidBufferGeometry
    );
    // The maximum itself is fine.
    let mut block = vec![0.0f32; MAX_BUFFER];
    engine.fill_mono_buffer(&mut block).unwrap();
}

/// Envelope metering rises with playback and returns to zero after release
#[test]
fn test_layer_envelope_metering() {
    let layer = LayerConfiguration::mono(440.0, 0.0, 0.0, 1.0).unwrap();
    let mut engine = engine_with(&[layer], ChannelMode::Mono);
    let controls = engine.controls();
    engine.start().unwrap();

    let mut block = [0.0f32; 1024];
    for _ in 0..50 {
        engine.fill_mono_buffer(&mut block).unwrap();
    }
    assert!(engine.get_layer_envelope_value(0) > 0.5);
    assert!(controls.layer_envelope_value(0) > 0.5);
    assert_eq!(engine.get_layer_envelope_value(7), 0.0);
    assert_eq!(engine.get_layer_envelope_value(usize::MAX), 0.0);

    engine.stop().unwrap();
    for _ in 0..100 {
        engine.fill_mono_buffer(&mut block).unwrap();
    }
    assert_eq!(engine.get_layer_envelope_value(0), 0.0);
    assert_eq!(controls.layer_envelope_value(0), 0.0);
}

/// The mixer never reallocates its scratch in steady state
#[test]
fn test_steady_state_is_allocation_free() {
    let mut mixer = Mixer::new();
    mixer
        .initialize(8, 48_000, ChannelMode::Mono, 0.1, 0.1)
        .unwrap();
    let configs: Vec<LayerConfiguration> = (0..8)
        .map(|i| LayerConfiguration::mono(120.0 + i as f32 * 60.0, 3.0, 1.0, 0.6).unwrap())
        .collect();

    let mut out = vec![0.0f32; MAX_BUFFER];
    mixer.render_mono(&mut out, 48_000, &configs, true).unwrap();
    let capacity = mixer.scratch_capacity();

    for _ in 0..1_000 {
        mixer.render_mono(&mut out, 48_000, &configs, true).unwrap();
    }
    assert_eq!(
        mixer.scratch_capacity(),
        capacity,
        "scratch must be sized once at initialization"
    );
}

/// Dispose ends the engine's life for every stateful call
#[test]
fn test_dispose_lifecycle() {
    let layer = LayerConfiguration::mono(440.0, 0.0, 0.0, 0.5).unwrap();
    let mut engine = engine_with(&[layer], ChannelMode::Mono);
    engine.start().unwrap();
    engine.dispose();
    engine.dispose(); // idempotent

    let mut block = [0.0f32; 64];
    assert_eq!(
        engine.fill_mono_buffer(&mut block).unwrap_err(),
        EngineError::Disposed
    );
    assert_eq!(engine.start().unwrap_err(), EngineError::Disposed);
    assert_eq!(
        engine.update_configs(&[layer]).unwrap_err(),
        EngineError::Disposed
    );
    assert_eq!(
        engine.controls().update_configs(&[layer]).unwrap_err(),
        EngineError::Disposed
    );
}

/// reset . reset == reset, observed through the rendered signal
#[test]
fn test_reset_idempotence() {
    let layer = LayerConfiguration::mono(440.0, 2.0, 0.9, 0.8).unwrap();

    let render_after = |resets: usize| {
        let mut engine = engine_with(&[layer], ChannelMode::Mono);
        engine.start().unwrap();
        let mut block = [0.0f32; 1024];
        for _ in 0..20 {
            engine.fill_mono_buffer(&mut block).unwrap();
        }
        for _ in 0..resets {
            engine.reset().unwrap();
        }
        engine.start().unwrap();
        let mut out = Vec::new();
        for _ in 0..10 {
            engine.fill_mono_buffer(&mut block).unwrap();
            out.extend_from_slice(&block);
        }
        out
    };

    assert_eq!(render_after(1), render_after(2));
}
