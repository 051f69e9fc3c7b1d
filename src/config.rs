//! Layer configuration and snapshots
//!
//! A [`LayerConfiguration`] is an immutable, validated description of one
//! tonal layer: carrier frequency, optional amplitude modulation, mix
//! weight, and channel placement. Configurations validate on construction
//! and are re-validated by the engine against its own sample rate, because
//! the Nyquist guard depends on engine-instance data.
//!
//! A [`LayerSnapshot`] is an ordered, bounded bundle of configurations that
//! is built once and then shared across threads behind an `Arc`, never
//! mutated after publication.

use crate::error::{EngineError, Result};
use crate::{
    CARRIER_MAX_HZ, CARRIER_MIN_HZ, CARRIER_NYQUIST_RATIO, DEFAULT_SAMPLE_RATE, MAX_LAYERS,
    MODULATOR_MAX_HZ, MODULATOR_MIN_HZ,
};

/// Output channel layout of a layer or an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    /// Single channel; in a stereo mix the layer is placed by its pan value
    Mono,
    /// Two coupled channels with a frequency offset on the right carrier
    Stereo,
}

/// Immutable description of one tonal layer
///
/// All fields are validated by the constructors; an engine re-validates
/// against its actual sample rate inside `initialize`/`update_configs`.
///
/// # Example
/// ```
/// use tonegen::LayerConfiguration;
///
/// let layer = LayerConfiguration::mono(440.0, 2.0, 0.8, 0.5).unwrap();
/// assert_eq!(layer.carrier_hz, 440.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerConfiguration {
    /// Audible carrier frequency in Hz (20..=2000, below 0.45 x sample rate)
    pub carrier_hz: f32,
    /// LFO rate in Hz; 0 disables modulation, otherwise 0.1..=100
    pub modulator_hz: f32,
    /// Amplitude modulation depth, 0..=1
    pub modulator_depth: f32,
    /// Mix weight of this layer, 0..=1
    pub weight: f32,
    /// Channel placement of this layer
    pub channel_mode: ChannelMode,
    /// Added to the carrier on the right channel; only meaningful in stereo
    pub stereo_offset_hz: f32,
    /// Stereo placement of a mono layer, -1 (left) ..= +1 (right)
    pub pan: f32,
}

impl LayerConfiguration {
    /// Create a fully specified configuration
    ///
    /// Validates every field against [`DEFAULT_SAMPLE_RATE`].
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        carrier_hz: f32,
        modulator_hz: f32,
        modulator_depth: f32,
        weight: f32,
        channel_mode: ChannelMode,
        stereo_offset_hz: f32,
        pan: f32,
    ) -> Result<Self> {
        let config = Self {
            carrier_hz,
            modulator_hz,
            modulator_depth,
            weight,
            channel_mode,
            stereo_offset_hz,
            pan,
        };
        config.validate(DEFAULT_SAMPLE_RATE)?;
        Ok(config)
    }

    /// Create a centered mono layer
    pub fn mono(carrier_hz: f32, modulator_hz: f32, modulator_depth: f32, weight: f32) -> Result<Self> {
        Self::new(
            carrier_hz,
            modulator_hz,
            modulator_depth,
            weight,
            ChannelMode::Mono,
            0.0,
            0.0,
        )
    }

    /// Create a stereo layer with a binaural frequency offset
    pub fn stereo(
        carrier_hz: f32,
        stereo_offset_hz: f32,
        modulator_hz: f32,
        modulator_depth: f32,
        weight: f32,
    ) -> Result<Self> {
        Self::new(
            carrier_hz,
            modulator_hz,
            modulator_depth,
            weight,
            ChannelMode::Stereo,
            stereo_offset_hz,
            0.0,
        )
    }

    /// Return a copy of this configuration with a different pan position
    pub fn with_pan(mut self, pan: f32) -> Result<Self> {
        self.pan = pan;
        self.validate(DEFAULT_SAMPLE_RATE)?;
        Ok(self)
    }

    /// Validate every field against the given sample rate
    ///
    /// # Errors
    /// [`EngineError::InvalidConfiguration`] naming the offending field.
    pub fn validate(&self, sample_rate: u32) -> Result<()> {
        let nyquist_limit = CARRIER_NYQUIST_RATIO * sample_rate as f32;

        if !(CARRIER_MIN_HZ..=CARRIER_MAX_HZ).contains(&self.carrier_hz)
            || self.carrier_hz >= nyquist_limit
        {
            return Err(EngineError::InvalidConfiguration { field: "carrier_hz" });
        }

        if self.modulator_hz != 0.0
            && !(MODULATOR_MIN_HZ..=MODULATOR_MAX_HZ).contains(&self.modulator_hz)
        {
            return Err(EngineError::InvalidConfiguration {
                field: "modulator_hz",
            });
        }

        if !(0.0..=1.0).contains(&self.modulator_depth) {
            return Err(EngineError::InvalidConfiguration {
                field: "modulator_depth",
            });
        }

        if !(0.0..=1.0).contains(&self.weight) {
            return Err(EngineError::InvalidConfiguration { field: "weight" });
        }

        if self.channel_mode == ChannelMode::Stereo {
            let right_hz = self.carrier_hz + self.stereo_offset_hz;
            if !(CARRIER_MIN_HZ..=CARRIER_MAX_HZ).contains(&right_hz) || right_hz >= nyquist_limit {
                return Err(EngineError::InvalidConfiguration {
                    field: "stereo_offset_hz",
                });
            }
        } else if !self.stereo_offset_hz.is_finite() {
            return Err(EngineError::InvalidConfiguration {
                field: "stereo_offset_hz",
            });
        }

        if !(-1.0..=1.0).contains(&self.pan) {
            return Err(EngineError::InvalidConfiguration { field: "pan" });
        }

        Ok(())
    }

    /// Whether this layer applies amplitude modulation at all
    pub fn has_modulation(&self) -> bool {
        self.modulator_hz > 0.0 && self.modulator_depth > 0.0
    }
}

/// Ordered, bounded bundle of layer configurations
///
/// Snapshots are immutable after construction and shared across threads
/// behind an `Arc`. Readers always observe a snapshot whole.
#[derive(Debug, Clone)]
pub struct LayerSnapshot {
    layers: Vec<LayerConfiguration>,
}

impl LayerSnapshot {
    /// Build a snapshot from a non-empty list of at most [`MAX_LAYERS`]
    /// configurations
    pub fn new(layers: Vec<LayerConfiguration>) -> Result<Self> {
        if layers.is_empty() || layers.len() > MAX_LAYERS {
            return Err(EngineError::InvalidConfiguration { field: "layers" });
        }
        Ok(Self { layers })
    }

    /// The configurations in layer order
    pub fn layers(&self) -> &[LayerConfiguration] {
        &self.layers
    }

    /// Number of layers in the snapshot
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Always false: snapshots reject empty layer lists at construction
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}
