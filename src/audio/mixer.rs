//! Fixed-pool additive mixer
//!
//! The mixer owns one mono slot and one stereo slot per layer index, all
//! allocated once at initialization, and renders whichever slot a layer's
//! configuration selects. Summation is purely additive; the only level
//! processing here is the fixed [`MIX_HEADROOM`] attenuation and the
//! equal-power placement of mono layers into a stereo mix. Dynamics,
//! master gain, and the safety clamp live in the engine.

use crate::audio::layer::{MonoLayer, StereoLayer};
use crate::config::{ChannelMode, LayerConfiguration};
use crate::error::{EngineError, Result};
use crate::{MAX_BUFFER, MAX_LAYERS, MIX_HEADROOM};
use std::f32::consts::FRAC_PI_4;

/// Equal-power pan gains for a position in [-1, 1]
///
/// `theta = (pan + 1) * pi/4` maps the range onto a quarter circle, so
/// `cos/sin` keep the summed power constant across the arc.
pub(crate) fn pan_gains(pan: f32) -> (f32, f32) {
    let theta = (pan + 1.0) * FRAC_PI_4;
    (theta.cos(), theta.sin())
}

/// Multi-layer mixer with fixed slot pools
pub struct Mixer {
    mono_slots: Vec<MonoLayer>,
    stereo_slots: Vec<StereoLayer>,
    mono_tmp: Vec<f32>,
    left_tmp: Vec<f32>,
    right_tmp: Vec<f32>,
    active_layers: usize,
    output_mode: ChannelMode,
    initialized: bool,
}

impl Mixer {
    /// Create an empty mixer; it must be initialized before rendering
    pub fn new() -> Self {
        Self {
            mono_slots: Vec::new(),
            stereo_slots: Vec::new(),
            mono_tmp: Vec::new(),
            left_tmp: Vec::new(),
            right_tmp: Vec::new(),
            active_layers: 0,
            output_mode: ChannelMode::Mono,
            initialized: false,
        }
    }

    /// Allocate the slot pools and scratch buffers
    ///
    /// All storage is sized here; steady-state rendering performs no
    /// further allocation.
    pub fn initialize(
        &mut self,
        layer_count: usize,
        sample_rate: u32,
        output_mode: ChannelMode,
        attack_secs: f32,
        release_secs: f32,
    ) -> Result<()> {
        if layer_count == 0 || layer_count > MAX_LAYERS {
            return Err(EngineError::InvalidConfiguration { field: "layers" });
        }

        self.mono_slots = (0..MAX_LAYERS).map(|_| MonoLayer::new()).collect();
        self.stereo_slots = (0..MAX_LAYERS).map(|_| StereoLayer::new()).collect();
        for slot in self.mono_slots.iter_mut() {
            slot.initialize(sample_rate, attack_secs, release_secs);
        }
        for slot in self.stereo_slots.iter_mut() {
            slot.initialize(sample_rate, attack_secs, release_secs);
        }

        self.mono_tmp = vec![0.0; MAX_BUFFER];
        self.left_tmp = vec![0.0; MAX_BUFFER];
        self.right_tmp = vec![0.0; MAX_BUFFER];
        self.active_layers = layer_count;
        self.output_mode = output_mode;
        self.initialized = true;
        Ok(())
    }

    /// Render the active layers into one mono plane
    ///
    /// Layers configured as stereo render through their mono slot using the
    /// left carrier; a binaural offset is meaningless in a mono mix.
    pub fn render_mono(
        &mut self,
        out: &mut [f32],
        sample_rate: u32,
        configs: &[LayerConfiguration],
        gate: bool,
    ) -> Result<()> {
        if self.output_mode != ChannelMode::Mono {
            return Err(EngineError::ChannelModeMismatch);
        }
        self.grow_scratch(out.len());

        out.fill(0.0);
        let count = self.active_layers.min(configs.len());
        for i in 0..count {
            let tmp = &mut self.mono_tmp[..out.len()];
            self.mono_slots[i].update_and_process(tmp, sample_rate, &configs[i], gate);
            for (acc, &s) in out.iter_mut().zip(tmp.iter()) {
                *acc += s;
            }
        }

        for sample in out.iter_mut() {
            *sample *= MIX_HEADROOM;
        }
        Ok(())
    }

    /// Render the active layers into separate left and right planes
    ///
    /// Stereo layers render through their stereo slot into both planes;
    /// mono layers render once and are placed with the equal-power law.
    pub fn render_stereo(
        &mut self,
        left: &mut [f32],
        right: &mut [f32],
        sample_rate: u32,
        configs: &[LayerConfiguration],
        gate: bool,
    ) -> Result<()> {
        if self.output_mode != ChannelMode::Stereo {
            return Err(EngineError::ChannelModeMismatch);
        }
        if left.len() != right.len() {
            return Err(EngineError::InvalidBufferGeometry);
        }
        self.grow_scratch(left.len());

        left.fill(0.0);
        right.fill(0.0);
        let count = self.active_layers.min(configs.len());
        for i in 0..count {
            let config = &configs[i];
            match config.channel_mode {
                ChannelMode::Stereo => {
                    let left_tmp = &mut self.left_tmp[..left.len()];
                    let right_tmp = &mut self.right_tmp[..right.len()];
                    self.stereo_slots[i]
                        .update_and_process(left_tmp, right_tmp, sample_rate, config, gate);
                    for (acc, &s) in left.iter_mut().zip(left_tmp.iter()) {
                        *acc += s;
                    }
                    for (acc, &s) in right.iter_mut().zip(right_tmp.iter()) {
                        *acc += s;
                    }
                }
                ChannelMode::Mono => {
                    let tmp = &mut self.mono_tmp[..left.len()];
                    self.mono_slots[i].update_and_process(tmp, sample_rate, config, gate);
                    let (gain_l, gain_r) = pan_gains(config.pan);
                    for ((acc_l, acc_r), &s) in
                        left.iter_mut().zip(right.iter_mut()).zip(tmp.iter())
                    {
                        *acc_l += s * gain_l;
                        *acc_r += s * gain_r;
                    }
                }
            }
        }

        for sample in left.iter_mut() {
            *sample *= MIX_HEADROOM;
        }
        for sample in right.iter_mut() {
            *sample *= MIX_HEADROOM;
        }
        Ok(())
    }

    fn grow_scratch(&mut self, len: usize) {
        if self.mono_tmp.len() < len {
            self.mono_tmp.resize(len, 0.0);
            self.left_tmp.resize(len, 0.0);
            self.right_tmp.resize(len, 0.0);
        }
    }

    /// Close every layer's envelope gate
    pub fn trigger_release_all(&mut self) {
        for slot in self.mono_slots.iter_mut() {
            slot.trigger_release();
        }
        for slot in self.stereo_slots.iter_mut() {
            slot.trigger_release();
        }
    }

    /// Envelope gain of the layer at `index`, 0.0 for any invalid index
    ///
    /// Each index owns a mono and a stereo slot but a configuration only
    /// ever drives one of them, so the larger of the two is the live value.
    pub fn layer_envelope_value(&self, index: usize) -> f32 {
        if !self.initialized || index >= self.active_layers {
            return 0.0;
        }
        self.mono_slots[index]
            .envelope_value()
            .max(self.stereo_slots[index].envelope_value())
    }

    /// Number of active layers
    pub fn active_layers(&self) -> usize {
        self.active_layers
    }

    /// Output mode the mixer was initialized for
    pub fn output_mode(&self) -> ChannelMode {
        self.output_mode
    }

    /// Whether the mixer has been initialized
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Reset every slot to its initial state
    pub fn reset(&mut self) {
        for slot in self.mono_slots.iter_mut() {
            slot.reset();
        }
        for slot in self.stereo_slots.iter_mut() {
            slot.reset();
        }
    }

    /// Scratch capacity in samples, used to verify allocation-free steady
    /// state from the integration tests
    pub fn scratch_capacity(&self) -> usize {
        self.mono_tmp.capacity()
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}
