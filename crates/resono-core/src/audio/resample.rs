//! Linear resampler on a fixed-point phase accumulator.

/// Resample `samples` from `from_rate` to `to_rate`.
///
/// The source position advances by a 32.32 fixed-point step of
/// `from_rate / to_rate` per output sample; the integer half indexes the
/// source and the fractional half is the interpolation weight. The final
/// source sample is held when the phase lands past the last pair. Linear
/// interpolation is plenty for fingerprinting, which only reads coarse
/// spectral structure well below the folding frequency.
pub fn resample_to_target(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let step = ((from_rate as u128) << 32) / to_rate as u128;
    let mut output =
        Vec::with_capacity((samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize + 1);

    let mut phase: u128 = 0;
    loop {
        let index = (phase >> 32) as usize;
        if index >= samples.len() {
            break;
        }
        let weight = (phase & 0xFFFF_FFFF) as f32 / 4_294_967_296.0;
        let current = samples[index];
        let next = samples.get(index + 1).copied().unwrap_or(current);
        output.push(current + (next - current) * weight);
        phase += step;
    }

    output
}
