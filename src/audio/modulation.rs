//! Headroom-preserving amplitude modulation
//!
//! Maps a bipolar modulator in [-1, 1] into a gain in [1 - depth, 1] and
//! multiplies it into the carrier block. Because the gain never exceeds
//! unity, full-depth modulation cannot raise the carrier's peak level,
//! which is what allows the mixer's fixed headroom reservation to hold
//! for any modulator settings.

/// Apply amplitude modulation to `carrier` in place
///
/// `depth <= 0` leaves the block untouched; `depth > 1` is clamped to 1.
/// For every sample: `gain = 1 - depth + depth * 0.5 * (mod + 1)`.
///
/// # Example
/// ```
/// use tonegen::audio::modulation;
///
/// let mut carrier = [0.5f32; 4];
/// let modulator = [-1.0f32, -0.5, 0.0, 1.0];
/// modulation::apply(&mut carrier, &modulator, 1.0);
/// assert_eq!(carrier[0], 0.0); // modulator trough gates fully at depth 1
/// assert_eq!(carrier[3], 0.5); // modulator crest leaves the carrier alone
/// ```
pub fn apply(carrier: &mut [f32], modulator: &[f32], depth: f32) {
    if depth <= 0.0 {
        return;
    }
    let depth = depth.min(1.0);

    for (sample, &m) in carrier.iter_mut().zip(modulator.iter()) {
        let gain = 1.0 - depth + depth * 0.5 * (m + 1.0);
        *sample *= gain;
    }
}
