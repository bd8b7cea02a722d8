//! Hamming-windowed, zero-padded real-to-complex short-time Fourier
//! transform producing a magnitude spectrogram.

use realfft::RealFftPlanner;
use rustfft::num_complex::Complex;

use crate::core::base::{AudioInfo, Error, Res};

/// Row-major magnitude spectrogram: `num_blocks` rows of `bins_per_block`
/// non-negative values each.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    pub data: Vec<f32>,
    pub num_blocks: usize,
    pub bins_per_block: usize,
}

impl Spectrogram {
    /// The magnitudes of block `i`.
    pub fn block(&self, i: usize) -> &[f32] {
        &self.data[i * self.bins_per_block..(i + 1) * self.bins_per_block]
    }

    pub fn block_mut(&mut self, i: usize) -> &mut [f32] {
        &mut self.data[i * self.bins_per_block..(i + 1) * self.bins_per_block]
    }
}

/// Hamming window of the given size.
pub fn window_function(size: usize) -> Vec<f32> {
    use std::f64::consts::PI;
    (0..size)
        .map(|i| (0.54 - 0.46 * (2.0 * PI * i as f64 / (size as f64 - 1.0)).cos()) as f32)
        .collect()
}

/// Number of STFT blocks covering the stream: `max(1, ceil((frames - W)/h) + 1)`.
pub fn num_stft_blocks(info: AudioInfo, unpadded_win_size: usize, interval: usize) -> usize {
    let num_blocks =
        ((info.frames - unpadded_win_size as i64) as f32 / interval as f32).ceil() as i64 + 1;
    num_blocks.max(1) as usize
}

/// Number of coefficients kept per DFT.
///
/// A real-to-complex transform of an even-length buffer includes a Nyquist
/// coefficient; it is clipped from the output (historical behaviour the
/// rest of the pitch path depends on).
fn returned_coefs_per_dft(padded_fft_size: usize) -> usize {
    let coefs = padded_fft_size / 2 + 1;
    if padded_fft_size % 2 == 0 {
        coefs - 1
    } else {
        coefs
    }
}

/// Computes the magnitude spectrogram of `input`.
///
/// Each of the [`num_stft_blocks`] windows starts at `i * interval`, is
/// multiplied by a Hamming window, zero-padded to `padded_fft_size`, and
/// transformed; the magnitude of the first [`returned_coefs_per_dft`]
/// coefficients lands in row `i` of the output.
pub fn stft_magnitudes(
    input: &[f32],
    info: AudioInfo,
    unpadded_win_size: usize,
    padded_fft_size: usize,
    interval: usize,
) -> Res<Spectrogram> {
    if unpadded_win_size < 1 {
        return Err(Error::NonPositiveArg("pitch window"));
    }
    if interval < 1 {
        return Err(Error::NonPositiveArg("pitch spacing"));
    }
    if padded_fft_size < unpadded_win_size {
        return Err(Error::Config(
            "pitch_padded cannot be less than pitch_window".into(),
        ));
    }

    let num_blocks = num_stft_blocks(info, unpadded_win_size, interval);
    let bins_per_block = returned_coefs_per_dft(padded_fft_size);

    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(padded_fft_size);
    let mut fft_in = fft.make_input_vec();
    let mut fft_out: Vec<Complex<f32>> = fft.make_output_vec();
    let mut scratch = fft.make_scratch_vec();

    let window = window_function(padded_fft_size);

    let mut data = vec![0.0f32; num_blocks * bins_per_block];
    for i in 0..num_blocks {
        let block_offset = i * interval;
        for j in 0..padded_fft_size {
            fft_in[j] = if j < unpadded_win_size && (block_offset + j) < info.frames as usize {
                input[block_offset + j] * window[j]
            } else {
                0.0
            };
        }
        fft.process_with_scratch(&mut fft_in, &mut fft_out, &mut scratch)
            .map_err(|e| Error::Config(e.to_string()))?;
        let row = &mut data[i * bins_per_block..(i + 1) * bins_per_block];
        for (j, out) in row.iter_mut().enumerate() {
            *out = fft_out[j].norm();
        }
    }

    Ok(Spectrogram {
        data,
        num_blocks,
        bins_per_block,
    })
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn info(frames: i64, samplerate: i32) -> AudioInfo {
        AudioInfo { frames, samplerate }
    }

    #[test]
    fn test_num_blocks_formula() {
        // ceil((1000 - 256)/128) + 1 = 7
        assert_eq!(num_stft_blocks(info(1000, 44100), 256, 128), 7);
        // exact fit: ceil((512 - 256)/128) + 1 = 3
        assert_eq!(num_stft_blocks(info(512, 44100), 256, 128), 3);
    }

    #[test]
    fn test_num_blocks_clamps_to_one_for_short_audio() {
        assert_eq!(num_stft_blocks(info(100, 44100), 256, 128), 1);
    }

    #[test]
    fn test_window_function_endpoints() {
        let w = window_function(64);
        // Hamming: 0.08 at the edges, 1.0 in the middle region
        assert!((w[0] - 0.08).abs() < 1e-6);
        assert!((w[63] - 0.08).abs() < 1e-6);
        let peak = w.iter().cloned().fold(0.0f32, f32::max);
        assert!(peak > 0.99);
    }

    #[test]
    fn test_nyquist_bin_is_dropped() {
        let samples = vec![0.0f32; 512];
        let spec = stft_magnitudes(&samples, info(512, 8000), 512, 512, 256).unwrap();
        assert_eq!(spec.bins_per_block, 256);
        let spec = stft_magnitudes(&samples, info(512, 8000), 511, 511, 256).unwrap();
        assert_eq!(spec.bins_per_block, 256); // odd size keeps ceil(n/2)
    }

    #[test]
    fn test_short_audio_yields_one_block() {
        let samples = vec![0.25f32; 100];
        let spec = stft_magnitudes(&samples, info(100, 8000), 256, 256, 128).unwrap();
        assert_eq!(spec.num_blocks, 1);
    }

    #[test]
    fn test_sine_peak_lands_in_expected_bin() {
        // 1 kHz sine at 8 kHz sampling with a 512-point FFT -> bin 64
        let n = 512;
        let samplerate = 8000;
        let samples: Vec<f32> = (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / samplerate as f32).sin())
            .collect();
        let spec = stft_magnitudes(&samples, info(n as i64, samplerate), n, n, n / 2).unwrap();
        let row = spec.block(0);
        let peak_bin = row
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert_eq!(peak_bin, 64);
    }

    #[test]
    fn test_padded_smaller_than_window_is_rejected() {
        let samples = vec![0.0f32; 512];
        let err = stft_magnitudes(&samples, info(512, 8000), 512, 256, 256).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
