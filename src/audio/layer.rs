//! Mono and stereo layer renderers
//!
//! A [`MonoLayer`] is one complete signal path: carrier, pre-modulation
//! headroom, optional amplitude modulation from a control-rate LFO, an
//! attack/release envelope, and the layer's mix weight. A [`StereoLayer`]
//! couples two mono paths driven from one configuration, with the right
//! carrier offset by the configured binaural amount. The beat percept of a
//! stereo layer exists only between the ears: neither channel carries any
//! amplitude modulation at the beat frequency.

use crate::audio::envelope::Envelope;
use crate::audio::lfo::Lfo;
use crate::audio::modulation;
use crate::audio::oscillator::SineOscillator;
use crate::config::LayerConfiguration;
use crate::MAX_BUFFER;

/// Fixed attenuation applied to the carrier before modulation. Combined
/// with the unity-bounded AM gain this caps a single layer at half scale,
/// so the mix headroom reservation holds regardless of modulator depth.
const PRE_MOD_HEADROOM: f32 = 0.5;

/// One mono signal path: carrier -> headroom -> AM -> envelope -> weight
#[derive(Debug, Clone)]
pub struct MonoLayer {
    carrier: SineOscillator,
    lfo: Lfo,
    envelope: Envelope,
    /// Scratch for the rendered modulator block
    mod_scratch: Vec<f32>,
    initialized: bool,
}

impl MonoLayer {
    /// Create an uninitialized layer; it renders silence until
    /// [`MonoLayer::initialize`] is called
    pub fn new() -> Self {
        Self {
            carrier: SineOscillator::new(),
            lfo: Lfo::new(),
            envelope: Envelope::new(),
            mod_scratch: Vec::new(),
            initialized: false,
        }
    }

    /// Configure the envelope and allocate scratch storage
    pub fn initialize(&mut self, sample_rate: u32, attack_secs: f32, release_secs: f32) {
        self.envelope.configure(attack_secs, release_secs, sample_rate);
        self.mod_scratch.resize(MAX_BUFFER, 0.0);
        self.initialized = true;
    }

    /// Render one block from the given configuration
    ///
    /// `gate` drives the envelope: open while the engine is playing, closed
    /// while a release tail runs out. Frequencies are re-applied from the
    /// configuration every block, which is the safe point to pick up
    /// configuration changes (no block is in flight on this layer).
    pub fn update_and_process(
        &mut self,
        block: &mut [f32],
        sample_rate: u32,
        config: &LayerConfiguration,
        gate: bool,
    ) {
        self.render_with_carrier(block, sample_rate, config, config.carrier_hz, gate);
    }

    /// Render one block with an explicit carrier frequency
    ///
    /// The stereo layer uses this to drive its right channel at
    /// `carrier_hz + stereo_offset_hz` from the same configuration.
    pub(crate) fn render_with_carrier(
        &mut self,
        block: &mut [f32],
        sample_rate: u32,
        config: &LayerConfiguration,
        carrier_hz: f32,
        gate: bool,
    ) {
        if !self.initialized {
            block.fill(0.0);
            return;
        }

        if self.mod_scratch.len() < block.len() {
            // Oversized blocks are rejected at the engine boundary; this
            // grow-once path only runs when the mixer is driven directly.
            self.mod_scratch.resize(block.len(), 0.0);
        }

        self.carrier.set_frequency(carrier_hz as f64, sample_rate);
        if config.has_modulation() {
            self.lfo.set_frequency(config.modulator_hz as f64, sample_rate);
        }
        self.envelope.trigger(gate);

        self.carrier.process(block);
        for sample in block.iter_mut() {
            *sample *= PRE_MOD_HEADROOM;
        }

        if config.has_modulation() {
            let modulator = &mut self.mod_scratch[..block.len()];
            self.lfo.process(modulator);
            modulation::apply(block, modulator, config.modulator_depth);
        }

        self.envelope.process(block);

        if config.weight == 0.0 {
            block.fill(0.0);
        } else if config.weight < 1.0 {
            for sample in block.iter_mut() {
                *sample *= config.weight;
            }
        }
    }

    /// Close the envelope gate; the release tail keeps rendering
    pub fn trigger_release(&mut self) {
        self.envelope.trigger(false);
    }

    /// Current envelope gain, for metering
    pub fn envelope_value(&self) -> f32 {
        self.envelope.value()
    }

    /// Whether the layer has been initialized
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Return oscillators and envelope to their initial state
    pub fn reset(&mut self) {
        self.carrier.reset();
        self.lfo.reset();
        self.envelope.reset();
    }
}

impl Default for MonoLayer {
    fn default() -> Self {
        Self::new()
    }
}

/// Two coupled mono paths rendering one stereo layer
///
/// Left uses the configured carrier; right uses carrier plus the stereo
/// offset. Envelopes are configured identically and gated together, so the
/// channels stay matched in level while differing only in frequency.
#[derive(Debug, Clone)]
pub struct StereoLayer {
    left: MonoLayer,
    right: MonoLayer,
}

impl StereoLayer {
    /// Create an uninitialized stereo layer
    pub fn new() -> Self {
        Self {
            left: MonoLayer::new(),
            right: MonoLayer::new(),
        }
    }

    /// Initialize both channel paths
    pub fn initialize(&mut self, sample_rate: u32, attack_secs: f32, release_secs: f32) {
        self.left.initialize(sample_rate, attack_secs, release_secs);
        self.right.initialize(sample_rate, attack_secs, release_secs);
    }

    /// Render one block into separate left/right planes
    pub fn update_and_process(
        &mut self,
        left: &mut [f32],
        right: &mut [f32],
        sample_rate: u32,
        config: &LayerConfiguration,
        gate: bool,
    ) {
        self.left
            .render_with_carrier(left, sample_rate, config, config.carrier_hz, gate);
        self.right.render_with_carrier(
            right,
            sample_rate,
            config,
            config.carrier_hz + config.stereo_offset_hz,
            gate,
        );
    }

    /// Close both envelope gates together
    pub fn trigger_release(&mut self) {
        self.left.trigger_release();
        self.right.trigger_release();
    }

    /// Envelope gain for metering; both channels share gating so the left
    /// value stands for the layer
    pub fn envelope_value(&self) -> f32 {
        self.left.envelope_value()
    }

    /// Reset both channel paths together
    pub fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}

impl Default for StereoLayer {
    fn default() -> Self {
        Self::new()
    }
}
