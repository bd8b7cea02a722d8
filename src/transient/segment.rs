//! Transient segmentation: fits alternating onset / offset kernels to the
//! normalized detection function and reports their boundary positions.

use crate::core::base::{Error, Res};
use crate::core::lists::BoundedList;

const MIN_Z: f32 = -0.99999;
const DOUBLE_MAX_Z: f32 = 1.99998;
/// Kernel sharpness parameter `a` in `Lambda(z) = z / (1 + a - |z|)`.
const SHARPNESS_A: f32 = 0.15;

/// Shortest kernel considered (20 ms at a 5 ms correntropy hop).
pub const MIN_KERNEL: usize = 4;
/// Longest kernel considered (7.5 s at a 5 ms correntropy hop).
pub const MAX_KERNEL: usize = 1500;

/// Precomputes the kernel templates for every length in
/// `[min_k_len, min_k_len + num_kernels)`.
///
/// A kernel of length `m` samples `Lambda(z)` at `m` evenly spaced values
/// of `z` from `-1 + 1e-5` through `1 - 1e-5`; it increases monotonically
/// and crosses zero at the midpoint.
fn gen_kernels(min_k_len: usize, num_kernels: usize) -> Vec<Vec<f32>> {
    (0..num_kernels)
        .map(|i| {
            let kernel_len = min_k_len + i;
            (0..kernel_len)
                .map(|j| {
                    let z = (DOUBLE_MAX_Z * j as f32) / (kernel_len as f32 - 1.0) + MIN_Z;
                    z / (1.0 + SHARPNESS_A - z.abs())
                })
                .collect()
        })
        .collect()
}

/// Mean squared error of fitting `kernel` (negated for onsets) to `window`.
fn calc_fitness(kernel: &[f32], window: &[f32], onset: bool) -> f32 {
    let coef = if onset { -1.0f32 } else { 1.0 };
    let sum: f32 = kernel
        .iter()
        .zip(window.iter())
        .map(|(&k, &w)| {
            let diff = coef * k - w;
            diff * diff
        })
        .sum();
    sum / kernel.len() as f32
}

/// Length of the kernel that best fits the detection function at
/// `last_fit_ind`.
fn best_fitting_kernel(
    det_func: &[f32],
    last_fit_ind: usize,
    kernels: &[Vec<f32>],
    min_kernel: usize,
    max_kernel: usize,
    onset: bool,
) -> Res<usize> {
    let window = &det_func[last_fit_ind..];
    let max_length = max_kernel.min(det_func.len() - last_fit_ind);

    let mut best_fitness = f32::MAX;
    let mut best_length = None;
    for k_length in min_kernel..max_length {
        let cur_fitness = calc_fitness(&kernels[k_length - min_kernel], &window[..k_length], onset);
        if cur_fitness < best_fitness {
            best_fitness = cur_fitness;
            best_length = Some(k_length);
        }
    }
    best_length.ok_or(Error::BadKernelFit)
}

/// Scales the detection function, in place, into the value range of the
/// kernels: divides by the maximum magnitude times [`SHARPNESS_A`].
fn normalize_det_function(det_function: &mut [f32]) -> Res<()> {
    let max_val = det_function.iter().fold(0.0f32, |m, &v| m.max(v.abs()));
    if max_val == 0.0 {
        return Err(Error::AllNullDetFunc);
    }
    let factor = 1.0 / (max_val * SHARPNESS_A);
    for v in det_function.iter_mut() {
        *v *= factor;
    }
    Ok(())
}

/// Segments the detection function into alternating onset / offset
/// positions (in detection-function indices).
///
/// The returned list has even length, strictly increasing values, and
/// alternates onset, offset, onset, offset.  An onset fitted too close to
/// the end to pair with an offset is dropped, and so is the final
/// onset/offset pair (calibration heuristic carried over from the original
/// algorithm's tuning; it consistently suppresses a false positive at the
/// tail).
pub fn detect_transients(detection_func: &mut [f32]) -> Res<Vec<i64>> {
    normalize_det_function(detection_func)?;

    let len = detection_func.len();
    if len <= MIN_KERNEL {
        return Err(Error::NoTransients);
    }

    let num_kernels = MAX_KERNEL - MIN_KERNEL + 1;
    let kernels = gen_kernels(MIN_KERNEL, num_kernels);

    let mut transients: BoundedList<i64> = BoundedList::new(20, 0);
    let mut detect_index = 0usize;
    // an onset needs at least MIN_KERNEL trailing indices for its offset
    let last_possible_onset = len - MIN_KERNEL;

    let mut iteration: u64 = 0;
    while detect_index < last_possible_onset {
        let fit_onset = iteration % 2 == 0;
        iteration += 1;

        let best_k_len = best_fitting_kernel(
            detection_func,
            detect_index,
            &kernels,
            MIN_KERNEL,
            MAX_KERNEL,
            fit_onset,
        )?;
        detect_index += best_k_len;
        if fit_onset && detect_index >= last_possible_onset {
            // dangling onset with nowhere to match an offset
            break;
        }
        transients.append(detect_index as i64)?;
    }

    // heuristic: drop the final onset/offset pair
    transients.truncate_by(2);
    if transients.is_empty() {
        return Err(Error::NoTransients);
    }
    Ok(transients.into_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernels_increase_and_cross_zero_at_midpoint() {
        let kernels = gen_kernels(MIN_KERNEL, 16);
        for kernel in &kernels {
            assert!(kernel.windows(2).all(|w| w[0] < w[1]));
            let m = kernel.len();
            // negative first half, positive second half
            assert!(kernel[m / 2 - 1] < 0.0);
            assert!(kernel[m / 2] > 0.0);
            assert!((kernel[0] + kernel[m - 1]).abs() < 1e-4);
        }
    }

    #[test]
    fn test_all_null_detection_function() {
        let mut det = vec![0.0f32; 64];
        assert_eq!(detect_transients(&mut det), Err(Error::AllNullDetFunc));
    }

    #[test]
    fn test_too_short_detection_function() {
        let mut det = vec![1.0f32; MIN_KERNEL];
        assert_eq!(detect_transients(&mut det), Err(Error::NoTransients));
    }

    #[test]
    fn test_fitness_prefers_matching_shape() {
        let kernels = gen_kernels(MIN_KERNEL, 32);
        let offset_kernel: Vec<f32> = kernels[12].clone(); // length 16
        let onset_window: Vec<f32> = offset_kernel.iter().map(|&v| -v).collect();
        // fitting the onset window as an onset is exact; as an offset it is not
        assert!(calc_fitness(&offset_kernel, &onset_window, true) < 1e-10);
        assert!(calc_fitness(&offset_kernel, &onset_window, false) > 1.0);
    }

    #[test]
    fn test_transient_invariants_on_synthetic_function() {
        // three onset/offset ramps of width 24 followed by padding; after
        // the tail drop, at least one pair must survive
        let kernels = gen_kernels(MIN_KERNEL, 32);
        let ramp = &kernels[20]; // length 24
        let mut det: Vec<f32> = Vec::new();
        for _ in 0..3 {
            det.extend(ramp.iter().map(|&v| -v)); // onset
            det.extend(ramp.iter()); // offset
        }
        det.extend(std::iter::repeat(0.01).take(8));

        let transients = detect_transients(&mut det).unwrap();
        assert!(!transients.is_empty());
        assert_eq!(transients.len() % 2, 0);
        assert!(transients.windows(2).all(|w| w[0] < w[1]));
        assert!(*transients.last().unwrap() <= det.len() as i64);
    }
}
