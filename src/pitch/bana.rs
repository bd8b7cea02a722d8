//! BaNa per-frame candidate generation: harmonic peak picking, pair-wise
//! ratio analysis, and confidence-weighted distinctive consolidation.

use crate::core::base::{Error, Res};
use crate::core::lists::{bisect_left, DistinctCandidate, DistinctList, OrderedList};
use crate::pitch::peaks::findpeaks;
use crate::stft::Spectrogram;

/// Upper bound on the number of harmonic peaks a strategy may request.
pub const MAX_PEAKS: usize = 10;

/// Upper bounds of the frequency-ratio ranges used by the harmonic-order
/// lookup.
static RATIO_RANGES: [f32; 15] = [
    1.15, 1.29, 1.42, 1.59, 1.8, 1.9, 2.1, 2.4, 2.6, 2.8, 3.2, 3.8, 4.2, 4.8, 5.2,
];

/// Assumed harmonic order for each ratio range; negative entries mark
/// ratios that do not correspond to a trusted harmonic pair.
static M_RANGES: [i32; 15] = [4, 3, 2, 3, -1, 1, -1, 2, -1, 1, -1, 1, -1, 1, -1];

/// Estimates the harmonic order of `f_i`, assuming `f_i` and `f_j` belong
/// to one harmonic series (`f_i` the smaller).  Negative values mean the
/// ratio is not trusted.
fn calc_m(f_i: f32, f_j: f32) -> i32 {
    let ratio = f_j / f_i;
    let i = bisect_left(&RATIO_RANGES, ratio);
    if ratio > RATIO_RANGES[14] {
        // beyond a 5th-order harmonic
        -1
    } else if i == 0 {
        -2
    } else {
        M_RANGES[i - 1]
    }
}

/// Adds `f_i / m` to `candidates` for every peak pair whose frequency
/// ratio maps to a positive harmonic order `m`.
pub fn ratio_analysis_candidates(peaks: &[f32], candidates: &mut OrderedList) -> Res<()> {
    for i in 0..peaks.len().saturating_sub(1) {
        for j in i + 1..peaks.len() {
            let m = calc_m(peaks[i], peaks[j]);
            if m > 0 {
                candidates.insert(peaks[i] / m as f32)?;
            }
        }
    }
    Ok(())
}

/// Consolidates `candidates` into distinctive candidates.
///
/// Repeatedly selects the candidate with the most neighbours within `xi`
/// Hz (ties go to the lower frequency), appends it with its neighbour
/// count as confidence when it falls inside `[f0_min, f0_max]`, and
/// removes it together with its neighbours.
pub fn distinct_candidates(
    candidates: &mut OrderedList,
    max_length: usize,
    xi: f32,
    f0_min: f32,
    f0_max: f32,
) -> Res<DistinctList> {
    let mut confidence = vec![1i32; candidates.len()];
    let mut distinct = DistinctList::new(max_length, 0);

    while !candidates.is_empty() {
        let len = candidates.len();
        let arr = candidates.as_slice();

        for c in confidence[..len].iter_mut() {
            *c = 1;
        }
        for i in 0..len.saturating_sub(1) {
            for j in i + 1..len {
                if arr[j] - arr[i] <= xi {
                    confidence[i] += 1;
                    confidence[j] += 1;
                } else {
                    break;
                }
            }
        }

        // highest confidence wins; ties break toward the lower frequency
        let mut max_index = 0;
        let mut max_confidence = confidence[0];
        for i in 1..len {
            if confidence[i] > max_confidence {
                max_index = i;
                max_confidence = confidence[i];
            }
        }

        if arr[max_index] >= f0_min && arr[max_index] <= f0_max {
            distinct.append(DistinctCandidate {
                frequency: arr[max_index],
                confidence: confidence[max_index],
                cost: 0.0,
                prev_index: -1,
            })?;
        }

        // delete the winner and every candidate within xi of it
        let mut first = max_index;
        for i in (0..max_index).rev() {
            if arr[max_index] - arr[i] <= xi {
                first = i;
            } else {
                break;
            }
        }
        let mut last = max_index;
        for i in max_index + 1..len {
            if arr[i] - arr[max_index] <= xi {
                last = i;
            } else {
                break;
            }
        }
        candidates.delete_range(first, last + 1);
    }
    Ok(distinct)
}

/// Central frequency of every spectrum bin.
pub fn calc_frequencies(bins_per_block: usize, fft_size: usize, samplerate: i32) -> Vec<f32> {
    let ratio = samplerate as f32 / fft_size as f32;
    (0..bins_per_block).map(|i| i as f32 * ratio).collect()
}

/// Zeroes every bin whose central frequency falls outside
/// `[f0_min, p * f0_max]`, for each frame independently.
pub fn preprocess(
    spectrogram: &mut Spectrogram,
    p: usize,
    f0_min: f32,
    f0_max: f32,
    frequencies: &[f32],
) {
    let max_freq = p as f32 * f0_max;
    let bins = spectrogram.bins_per_block;
    let good_start = bisect_left(frequencies, f0_min);
    let mut good_stop = bisect_left(&frequencies[good_start..], max_freq) + good_start;
    if good_stop != bins && frequencies[good_stop] == max_freq {
        good_stop += 1;
    }

    for block in 0..spectrogram.num_blocks {
        let row = spectrogram.block_mut(block);
        for v in &mut row[..good_start] {
            *v = 0.0;
        }
        for v in &mut row[good_stop..] {
            *v = 0.0;
        }
    }
}

/// Finds the distinctive fundamental candidates of every frame.
#[allow(clippy::too_many_arguments)]
pub fn find_candidates(
    spectrogram: &Spectrogram,
    p: usize,
    f0_min: f32,
    f0_max: f32,
    first: bool,
    xi: f32,
    frequencies: &[f32],
    smoothwidth: f32,
) -> Res<Vec<DistinctList>> {
    if p > MAX_PEAKS {
        return Err(Error::TooManyPeaks(MAX_PEAKS));
    }

    let mut window_candidates = Vec::with_capacity(spectrogram.num_blocks);
    for win in 0..spectrogram.num_blocks {
        let magnitudes = spectrogram.block(win);

        // amplitude threshold: 1/15th of the largest magnitude
        let amp_threshold = magnitudes.iter().fold(magnitudes[0], |m, &v| m.max(v)) / 15.0;

        let (peak_freq, _peak_mag, first_freq_peak) = findpeaks(
            frequencies,
            magnitudes,
            0.0,
            amp_threshold,
            smoothwidth,
            5,
            3,
            p,
            first,
        );

        // max candidates from ratio analysis = n(n-1)/2, plus the lowest
        // peak and a cepstral slot
        let max_len = peak_freq.len() * peak_freq.len().saturating_sub(1) / 2 + 2;
        let mut candidates = OrderedList::with_capacity(max_len);
        ratio_analysis_candidates(&peak_freq, &mut candidates)?;
        if let Some(first_peak) = first_freq_peak {
            candidates.insert(first_peak)?;
        }

        let distinct = distinct_candidates(
            &mut candidates,
            p * (p.saturating_sub(1)) / 2 + 2,
            xi,
            f0_min,
            f0_max,
        )?;
        window_candidates.push(distinct);
    }
    Ok(window_candidates)
}

/// Runs the full BaNa candidate stage over `spectrogram` and selects the
/// per-frame fundamentals.
#[allow(clippy::too_many_arguments)]
pub fn bana(
    spectrogram: &mut Spectrogram,
    p: usize,
    f0_min: f32,
    f0_max: f32,
    xi: f32,
    fft_size: usize,
    samplerate: i32,
    first: bool,
) -> Res<Vec<f32>> {
    let frequencies = calc_frequencies(spectrogram.bins_per_block, fft_size, samplerate);

    preprocess(spectrogram, p, f0_min, f0_max, &frequencies);

    // smoothing width equivalent to 50 Hz
    let smoothwidth = 50.0 * fft_size as f32 / samplerate as f32;

    let mut window_candidates = find_candidates(
        spectrogram,
        p,
        f0_min,
        f0_max,
        first,
        xi,
        &frequencies,
        smoothwidth,
    )?;

    Ok(crate::pitch::select::candidate_selection(
        &mut window_candidates,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ratio_table_lookup() {
        // any ratio inside (RATIO_RANGES[i-1], RATIO_RANGES[i]] maps to
        // M_RANGES[i-1]
        for i in 1..15 {
            let ratio = (RATIO_RANGES[i - 1] + RATIO_RANGES[i]) / 2.0;
            assert_eq!(calc_m(100.0, 100.0 * ratio), M_RANGES[i - 1]);
        }
        // exactly on an upper bound belongs to the range it closes
        assert_eq!(calc_m(100.0, 129.0), 3);
        // out of range on both sides
        assert_eq!(calc_m(100.0, 600.0), -1);
        assert_eq!(calc_m(100.0, 101.0), -2);
    }

    #[test]
    fn test_ratio_analysis_on_paper_example() {
        // peaks from the BaNa paper; the pairwise analysis yields these ten
        // candidates
        let peaks = [192.0f32, 391.0, 485.0, 581.0, 760.0];
        let mut candidates = OrderedList::with_capacity(12);
        ratio_analysis_candidates(&peaks, &mut candidates).unwrap();

        let expected = [96.0f32, 98.0, 121.0, 192.0, 192.0, 192.0, 194.0, 196.0, 242.0, 391.0];
        assert_eq!(candidates.len(), expected.len());
        for (got, want) in candidates.as_slice().iter().zip(expected.iter()) {
            assert!(
                (got - want).abs() <= 0.5,
                "candidate {got} expected near {want}"
            );
        }
    }

    #[test]
    fn test_distinct_candidates_consolidation() {
        let values = [
            96.0f32, 98.0, 121.0, 192.0, 192.0, 192.0, 194.0, 196.0, 242.0, 391.0, 190.0, 192.0,
        ];
        let mut candidates = OrderedList::with_capacity(values.len());
        for v in values {
            candidates.insert(v).unwrap();
        }
        let distinct = distinct_candidates(&mut candidates, values.len(), 10.0, 50.0, 600.0)
            .unwrap();

        let got: Vec<(f32, i32)> = distinct
            .as_slice()
            .iter()
            .map(|c| (c.frequency, c.confidence))
            .collect();
        assert_eq!(
            got,
            vec![(190.0, 7), (96.0, 2), (121.0, 1), (242.0, 1), (391.0, 1)]
        );
    }

    #[test]
    fn test_distinct_candidates_filters_f0_range() {
        let mut candidates = OrderedList::with_capacity(3);
        for v in [30.0f32, 100.0, 700.0] {
            candidates.insert(v).unwrap();
        }
        let distinct = distinct_candidates(&mut candidates, 3, 10.0, 50.0, 600.0).unwrap();
        assert_eq!(distinct.len(), 1);
        assert_eq!(distinct.get(0).frequency, 100.0);
        assert!(distinct.get(0).confidence >= 1);
    }

    #[test]
    fn test_preprocess_masks_out_of_band_bins() {
        // 16 bins at 100 Hz spacing
        let mut spec = Spectrogram {
            data: vec![1.0f32; 32],
            num_blocks: 2,
            bins_per_block: 16,
        };
        let frequencies = calc_frequencies(16, 160, 16000);
        preprocess(&mut spec, 5, 150.0, 250.0, &frequencies);
        for block in 0..2 {
            let row = spec.block(block);
            // bins below 150 Hz are zeroed
            assert_eq!(&row[..2], &[0.0, 0.0]);
            // bins in [200, 1200] survive
            assert!(row[2..13].iter().all(|&v| v == 1.0));
            // bins above 5 * 250 = 1250 Hz are zeroed
            assert!(row[13..].iter().all(|&v| v == 0.0));
        }
    }

    #[test]
    fn test_calc_frequencies_spacing() {
        let f = calc_frequencies(4, 4096, 44100);
        let ratio = 44100.0 / 4096.0;
        assert_eq!(f, vec![0.0, ratio, 2.0 * ratio, 3.0 * ratio]);
    }
}
