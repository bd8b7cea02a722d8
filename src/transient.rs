//! Transient detection: locates note onsets and offsets.
//!
//! The path resamples the input to 11025 Hz, filters it through an
//! ERB-spaced gammatone bank, computes a summed-lag correntropy detection
//! function, and segments that function with alternating onset / offset
//! kernel fits.  Parameters follow the paper's suggestions for sung notes.

pub mod correntropy;
pub mod filterbank;
pub mod gammatone;
pub mod segment;
pub mod sigma;
pub mod vector;

use crate::audio;
use crate::core::base::Res;

/// Sample rate the transient stage operates at.
pub const TRANSIENT_SAMPLERATE: i32 = 11025;

/// Coerces `arg` to a positive multiple of 4, rounding up or down; values
/// already conforming (and non-positive values) pass through unchanged.
fn coerce_pos_multiple_of_4(arg: usize, round_up: bool) -> usize {
    if arg == 0 || arg % 4 == 0 {
        arg
    } else if arg < 4 {
        4
    } else if round_up {
        4 * (arg / 4 + 1)
    } else {
        4 * (arg / 4)
    }
}

/// Detects transients in `audio_data` at its native rate.
///
/// Returns sample indices into `audio_data`, alternating onset, offset.
pub fn detect_transients(audio_data: &[f32], samplerate: i32, verbose: bool) -> Res<Vec<i64>> {
    // parameters suggested by the paper
    let num_channels = 64;
    let min_freq = 80.0f32;
    let max_freq = 4000.0f32;
    let mut correntropy_win_size = (samplerate / 80) as usize; // assumes min_freq = 80
    if samplerate % 80 == 0 {
        correntropy_win_size += 1;
    }
    let interval = (samplerate / 200) as usize; // 5 ms
    let scale_factor = (4.0f32 / 3.0).powf(0.2); // Silverman's rule of thumb
    let sig_window_size = (samplerate * 7) as usize; // 7 s

    // the correntropy kernel requires strides that are multiples of 4
    let correntropy_win_size = coerce_pos_multiple_of_4(correntropy_win_size, true);
    let interval = coerce_pos_multiple_of_4(interval, false);

    let mut detection_func = correntropy::detection_function(
        correntropy_win_size,
        interval,
        scale_factor,
        sig_window_size,
        num_channels,
        min_freq,
        max_freq,
        samplerate,
        audio_data,
    )?;
    if verbose {
        println!("detection function computed ({} values)", detection_func.len());
    }

    let transients = segment::detect_transients(&mut detection_func)?;

    // detection-function indices -> sample indices
    Ok(transients.iter().map(|&t| t * interval as i64).collect())
}

/// Detects transients after resampling to [`TRANSIENT_SAMPLERATE`].
///
/// The returned indices are scaled back into the input's sample units.
pub fn detect_transients_from_resampled(
    audio_data: &[f32],
    samplerate: i32,
    verbose: bool,
) -> Res<Vec<i64>> {
    let resampled = audio::resample(audio_data, samplerate, TRANSIENT_SAMPLERATE)?;
    if verbose {
        println!("resampled {} -> {} samples", audio_data.len(), resampled.len());
    }

    let transients = detect_transients(&resampled, TRANSIENT_SAMPLERATE, verbose)?;

    let factor = ((samplerate as f32 / TRANSIENT_SAMPLERATE as f32) as i64).max(1);
    let scaled: Vec<i64> = transients.iter().map(|&t| t * factor).collect();

    if verbose {
        for pair in scaled.chunks(2) {
            if let [on, off] = pair {
                println!(
                    "  {} - {}   ({}ms - {}ms)",
                    on,
                    off,
                    on * 1000 / samplerate as i64,
                    off * 1000 / samplerate as i64
                );
            }
        }
        println!("done, {} notes found", scaled.len() / 2);
    }
    Ok(scaled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_coerce_pos_multiple_of_4() {
        assert_eq!(coerce_pos_multiple_of_4(0, true), 0);
        assert_eq!(coerce_pos_multiple_of_4(8, true), 8);
        assert_eq!(coerce_pos_multiple_of_4(3, false), 4);
        assert_eq!(coerce_pos_multiple_of_4(5, true), 8);
        assert_eq!(coerce_pos_multiple_of_4(5, false), 4);
        assert_eq!(coerce_pos_multiple_of_4(1500, false), 1500);
    }

    #[test]
    fn test_transient_parameters_at_11025() {
        // samplerate/80 = 137 (not a clean divide), rounded up to 140;
        // samplerate/200 = 55, rounded down to 52
        let w = coerce_pos_multiple_of_4((TRANSIENT_SAMPLERATE / 80) as usize, true);
        let h = coerce_pos_multiple_of_4((TRANSIENT_SAMPLERATE / 200) as usize, false);
        assert_eq!(w, 140);
        assert_eq!(h, 52);
    }
}
