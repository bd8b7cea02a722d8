//! ERB-scale placement of the gammatone filter-bank channels.

/// Most channels the detection-function driver will accept.
pub const MAX_CHANNELS: usize = 128;

/// Equivalent rectangular bandwidth (Hz) at frequency `f` (Hz), using the
/// linear approximation `ERB = 24.7 * (0.00437 f + 1)`.
pub fn erb(f: f32) -> f32 {
    24.7 * (0.00437 * f + 1.0)
}

/// Maps `num_channels` centre frequencies uniformly over the ERB scale
/// (`ERBS = 21.3 log10(1 + 0.00437 f)`).
///
/// The outermost channels are placed so that their ERB band edges touch
/// `min_freq` and `max_freq`:
///   `min_freq = fc[0]    - ERB(fc[0])/2`
///   `max_freq = fc[last] + ERB(fc[last])/2`
/// which solves to `fc[0] = (min_freq + 12.35)/0.9460305` and
/// `fc[last] = (max_freq - 12.35)/1.0539695`.  With a single channel, it
/// sits at `min_freq`.
pub fn central_freq_mapper(num_channels: usize, min_freq: f32, max_freq: f32) -> Vec<f32> {
    let mut fc = vec![0.0f32; num_channels];
    if num_channels == 1 {
        fc[0] = min_freq;
        return fc;
    }

    fc[0] = (min_freq + 12.35) / 0.946_030_5;
    fc[num_channels - 1] = (max_freq - 12.35) / 1.053_969_5;

    let min_erbs = 21.3 * (1.0 + 0.00437 * fc[0]).log10();
    let max_erbs = 21.3 * (1.0 + 0.00437 * fc[num_channels - 1]).log10();

    for (i, out) in fc.iter_mut().enumerate().take(num_channels - 1).skip(1) {
        let erbs = min_erbs + i as f32 * (max_erbs - min_erbs) / (num_channels as f32 - 1.0);
        *out = (10.0f32.powf(erbs / 21.4) - 1.0) / 0.00437;
    }
    fc
}
