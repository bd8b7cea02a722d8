//! Summed-lag correntropy: the detection-function contribution of one
//! filter-bank channel, using a fast approximation of a Gaussian kernel.
//!
//! For window `t` the routine accumulates
//! `sum_n sum_j K(x[t*h + n] - x[t*h + n + j], sigma[t]) / winsize`
//! with `n` over the window, `j` over lags `1..=max_lag`, and `K` a
//! normalized Gaussian evaluated through Schraudolph's integer-cast
//! approximation of `expf`.

use super::filterbank::{self, MAX_CHANNELS};
use super::gammatone::sos_gammatone;
use super::sigma::roll_sigma;
use super::vector::{add, broadcast, load, lshift_extract, mul, sub, to_array, F32x4};
use crate::core::base::{Error, Res};

// On [-sqrt(87.33654), sqrt(87.33654)] the expf approximation has a max
// relative error <= 3.6e-2; outside of it the kernel value is forced to 0.
const EXPF_SCHRAUDOLPH_MAX: f32 = 87.33654;
const EXPF_SCHRAUDOLPH_MAGIC_NUM: i32 = 298_765;
const EXPF_SCHRAUDOLPH_OFFSET: i32 = 127 * (1 << 23) - EXPF_SCHRAUDOLPH_MAGIC_NUM;
// -1 * (1 << 23) / ln(2)
const EXPF_SCHRAUDOLPH_SLOPE: f32 = -12_102_203.0;

// 1/sqrt(2): multiplied into the kernel argument
const KERNEL_ARG_COEF: f32 = 0.707_106_77;
// 1/sqrt(2*pi): multiplied into the kernel output
const KERNEL_NORM_COEF: f32 = 0.398_942_3;

/// Scalar Schraudolph kernel: approximates `exp(-u^2)`.
///
/// The float-to-int conversion truncates toward zero; this scalar path is
/// the bit-exact reference for the vector backend.
#[inline]
fn kernel_lane(u: f32) -> f32 {
    let u2 = u * u;
    let validity = (u2 < EXPF_SCHRAUDOLPH_MAX) as i32;
    let bits = validity * (EXPF_SCHRAUDOLPH_OFFSET + (EXPF_SCHRAUDOLPH_SLOPE * u2) as i32);
    f32::from_bits(bits as u32)
}

#[cfg(not(all(target_arch = "x86_64", target_feature = "ssse3")))]
#[inline]
fn kernel(u: F32x4) -> F32x4 {
    let lanes = to_array(u);
    super::vector::from_array([
        kernel_lane(lanes[0]),
        kernel_lane(lanes[1]),
        kernel_lane(lanes[2]),
        kernel_lane(lanes[3]),
    ])
}

#[cfg(all(target_arch = "x86_64", target_feature = "ssse3"))]
#[inline]
fn kernel(u: F32x4) -> F32x4 {
    use core::arch::x86_64::*;
    unsafe {
        let slope = _mm_set1_ps(EXPF_SCHRAUDOLPH_SLOPE);
        let offset = _mm_set1_epi32(EXPF_SCHRAUDOLPH_OFFSET);
        let max_arg = _mm_set1_ps(EXPF_SCHRAUDOLPH_MAX);

        let u2 = _mm_mul_ps(u.0, u.0);
        // lanes that pass the range check have all bits set
        let validity = _mm_castps_si128(_mm_cmplt_ps(u2, max_arg));
        let int_form = _mm_add_epi32(_mm_cvtps_epi32(_mm_mul_ps(slope, u2)), offset);
        F32x4(_mm_castsi128_ps(_mm_and_si128(validity, int_form)))
    }
}

/// Evaluates the normalized approximate Gaussian kernel on each entry of
/// `x`.  Exists for tests and for computing expected kernel values; the
/// hot loop in [`calc_summed_lag_correntrograms`] inlines the same math.
pub fn evaluate_kernel(x: &[f32], out: &mut [f32], bandwidth: f32) {
    debug_assert!(bandwidth > 0.0);
    let inv_bandwidth = 1.0 / bandwidth;
    for (o, &v) in out.iter_mut().zip(x.iter()) {
        *o = KERNEL_NORM_COEF * inv_bandwidth * kernel_lane(v * KERNEL_ARG_COEF * inv_bandwidth);
    }
}

/// Validates the stride requirements of the correntrogram kernel.
pub fn check_correntrogram_props(winsize: usize, max_lag: usize, hopsize: usize) -> Res<()> {
    if max_lag < 4 || max_lag % 4 != 0 {
        return Err(Error::BadStride("max lag"));
    }
    if winsize < 4 || winsize % 4 != 0 {
        return Err(Error::BadStride("window size"));
    }
    if hopsize < 4 || hopsize % 4 != 0 {
        return Err(Error::BadStride("hop size"));
    }
    Ok(())
}

/// Number of input entries [`calc_summed_lag_correntrograms`] reads.
pub fn expected_padded_audio_length(
    n_win: usize,
    winsize: usize,
    max_lag: usize,
    hopsize: usize,
) -> usize {
    (n_win - 1) * hopsize + winsize + max_lag
}

/// Accumulates the summed-lag correntrogram of each analysis window of `x`
/// into `summed_acgrams` (in place, so channels can share one output).
///
/// Contract: `x` must be 16-byte aligned and hold at least
/// [`expected_padded_audio_length`] entries; `winsize`, `max_lag`, and
/// `hopsize` must be positive multiples of 4; `bandwidths` holds one
/// positive value per window.
pub fn calc_summed_lag_correntrograms(
    x: &[f32],
    bandwidths: &[f32],
    winsize: usize,
    max_lag: usize,
    hopsize: usize,
    n_win: usize,
    summed_acgrams: &mut [f32],
) -> Res<()> {
    if x.as_ptr() as usize % 16 != 0 {
        return Err(Error::MisalignedBuffer);
    }
    check_correntrogram_props(winsize, max_lag, hopsize)?;
    if x.len() < expected_padded_audio_length(n_win, winsize, max_lag, hopsize) {
        return Err(Error::DetFuncLengthMismatch);
    }
    debug_assert!(bandwidths.len() >= n_win && summed_acgrams.len() >= n_win);

    for win_ind in 0..n_win {
        let win_start = win_ind * hopsize;

        let inv_bandwidth = 1.0 / bandwidths[win_ind];
        let accum_coef = inv_bandwidth * KERNEL_NORM_COEF / winsize as f32;
        let dx_coef = broadcast(KERNEL_ARG_COEF * inv_bandwidth);

        let mut accum = broadcast(0.0);

        // `large` must be big enough that any kernel evaluation touching it
        // yields zero; it fills the lanes beyond the window edges.
        let large = broadcast(99.0);

        let mut next_align_seg = large;
        let mut i = 0;
        while i <= winsize {
            let cur_align_seg = next_align_seg;
            next_align_seg = if i == winsize {
                large
            } else {
                load(&x[win_start + i..])
            };

            let jstart = if i > 0 { 0 } else { 1 };
            for j in jstart..4 {
                let window_seg = lshift_extract(cur_align_seg, next_align_seg, j);

                let mut k = 0;
                while k + 4 <= max_lag {
                    let lagged_signal = load(&x[win_start + i + k..]);
                    let dx = sub(window_seg, lagged_signal);
                    accum = add(kernel(mul(dx, dx_coef)), accum);
                    k += 4;
                }
            }
            i += 4;
        }

        let lanes = to_array(accum);
        summed_acgrams[win_ind] += accum_coef * ((lanes[0] + lanes[1]) + (lanes[2] + lanes[3]));
    }
    Ok(())
}

/// Backing store for the correntropy input: 16-byte aligned, zero-filled.
pub struct AlignedBuf {
    chunks: Vec<Chunk>,
    len: usize,
}

#[derive(Clone, Copy)]
#[repr(C, align(16))]
struct Chunk([f32; 4]);

impl AlignedBuf {
    /// A zeroed buffer of `len` floats, rounded up to a full 4-lane chunk.
    pub fn zeroed(len: usize) -> Self {
        let n_chunks = (len + 3) / 4;
        Self {
            chunks: vec![Chunk([0.0; 4]); n_chunks],
            len: n_chunks * 4,
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        // Chunk is #[repr(C, align(16))] over [f32; 4]: the chunk array is
        // one contiguous run of self.len floats
        unsafe { std::slice::from_raw_parts(self.chunks.as_ptr() as *const f32, self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        unsafe { std::slice::from_raw_parts_mut(self.chunks.as_mut_ptr() as *mut f32, self.len) }
    }
}

/// `max(1, ceil((data_length - winsize)/interval) + 1)` analysis windows.
pub fn compute_num_windows(data_length: usize, correntropy_win_size: usize, interval: usize) -> usize {
    let num = ((data_length as i64 - correntropy_win_size as i64) as f32 / interval as f32).ceil()
        as i64
        + 1;
    num.max(1) as usize
}

/// Detection-function length for the given stream.
pub fn det_function_length(data_length: usize, correntropy_win_size: usize, interval: usize) -> usize {
    compute_num_windows(data_length, correntropy_win_size, interval) - 1
}

/// Computes the transient detection function of `data`.
///
/// Runs every filter-bank channel through the gammatone filter, estimates
/// per-window kernel bandwidths, pools the summed-lag correntrograms over
/// channels and lags (the pooled summary matrix), and returns its first
/// difference.
#[allow(clippy::too_many_arguments)]
pub fn detection_function(
    correntropy_win_size: usize,
    interval: usize,
    scale_factor: f32,
    sig_window_size: usize,
    num_channels: usize,
    min_freq: f32,
    max_freq: f32,
    samplerate: i32,
    data: &[f32],
) -> Res<Vec<f32>> {
    if num_channels > MAX_CHANNELS {
        return Err(Error::TooManyChannels(MAX_CHANNELS));
    }
    check_correntrogram_props(correntropy_win_size, correntropy_win_size, interval)?;
    if data.len() <= correntropy_win_size {
        return Err(Error::NoTransients);
    }

    let central_freq = filterbank::central_freq_mapper(num_channels, min_freq, max_freq);

    let num_windows = compute_num_windows(data.len(), correntropy_win_size, interval);
    let det_length = num_windows - 1;
    if det_length == 0 {
        return Err(Error::NoTransients);
    }

    // the kernel reads past the final window; zero-pad out to the length it
    // expects
    let buffer_length = (num_windows - 1) * interval + 2 * correntropy_win_size;
    let mut buffer = AlignedBuf::zeroed(buffer_length);

    let mut pooled_summary_matrix = vec![0.0f32; num_windows];
    let mut sigmas = vec![0.0f32; num_windows];
    let start_index = correntropy_win_size / 2;

    for &cf in &central_freq {
        sos_gammatone(data, &mut buffer.as_mut_slice()[..data.len()], cf, samplerate)?;

        roll_sigma(
            start_index,
            interval,
            scale_factor,
            sig_window_size,
            num_windows,
            &buffer.as_slice()[..data.len()],
            &mut sigmas,
        )?;

        calc_summed_lag_correntrograms(
            buffer.as_slice(),
            &sigmas,
            correntropy_win_size,
            correntropy_win_size,
            interval,
            num_windows,
            &mut pooled_summary_matrix,
        )?;
    }

    Ok((0..det_length)
        .map(|i| pooled_summary_matrix[i + 1] - pooled_summary_matrix[i])
        .collect())
}
