//! Note assembly: merges transients, optional activity ranges, and the
//! per-frame fundamentals into note ranges with averaged frequencies, then
//! rounds those to MIDI numbers with an optional tuning correction.

use crate::core::base::{AudioInfo, Error, Res};

/// MIDI reference: A4 = 440 Hz sits at fractional note 57.
const TUNING_REFERENCE: f32 = 440.0;

static NOTE_NAMES: [&str; 12] = [
    "C ", "C#", "D ", "D#", "E ", "F ", "F#", "G ", "G#", "A ", "A#", "B ",
];

// ---------------------------------------------------------------------------
// frame <-> sample bookkeeping
//
// STFT frame i starts at i*win_int and spans win_size samples; consecutive
// frames overlap.  Each sample is *represented* by the frame whose centre
// lies closest: the boundary between frames i and i+1 sits midway between
// their centres, and the first/last frames extend to the stream edges.
// ---------------------------------------------------------------------------

#[inline]
fn rep_boundary(win_int: usize, win_size: usize, index: usize) -> i64 {
    (index * win_int + win_int / 2 + win_size / 2) as i64
}

/// First sample represented by frame `index`.
pub fn win_start_rep_sample_index(
    win_int: usize,
    win_size: usize,
    num_samples: i64,
    index: usize,
) -> i64 {
    if index == 0 {
        0
    } else {
        rep_boundary(win_int, win_size, index - 1).min(num_samples)
    }
}

/// One past the last sample represented by frame `index`.
pub fn win_stop_rep_sample_index(
    win_int: usize,
    win_size: usize,
    num_samples: i64,
    index: usize,
    num_frames: usize,
) -> i64 {
    if index + 1 >= num_frames {
        num_samples
    } else {
        rep_boundary(win_int, win_size, index).min(num_samples)
    }
}

/// Index of the frame representing `sample`.
pub fn rep_win_index(
    win_int: usize,
    win_size: usize,
    sample: i64,
    num_frames: usize,
) -> usize {
    let half = (win_int / 2 + win_size / 2) as i64;
    let index = if sample < half {
        0
    } else {
        ((sample - half) / win_int as i64 + 1) as usize
    };
    index.min(num_frames.saturating_sub(1))
}

// ---------------------------------------------------------------------------
// note ranges
// ---------------------------------------------------------------------------

/// Builds note ranges from onsets and activity ranges (flat pairs of
/// start/stop samples).
///
/// Each activity range is split at the onsets falling inside it; an onset
/// within 40 ms of a range boundary is considered part of the same note
/// and does not split (a 32nd note at 144 bpm is 52 ms, so nothing
/// shorter than 40 ms is two different notes).
pub fn calc_note_ranges(
    onsets: &[i64],
    activity_ranges: &[i64],
    samplerate: i32,
) -> Res<Vec<i64>> {
    if activity_ranges.is_empty() {
        return Err(Error::NoActivity);
    }
    let threshold = (40 * samplerate as i64) / 1000;

    let mut note_ranges = Vec::with_capacity(onsets.len() * 2 + activity_ranges.len());
    let mut i_onsets = 0;
    for pair in activity_ranges.chunks_exact(2) {
        let mut range_start = pair[0];
        let range_end = pair[1];

        while i_onsets < onsets.len() {
            let onset = onsets[i_onsets];
            if onset >= range_end {
                break;
            }
            if onset > range_start
                && (onset - range_start) > threshold
                && (range_end - onset) > threshold
            {
                note_ranges.push(range_start);
                note_ranges.push(onset);
                range_start = onset;
            }
            i_onsets += 1;
        }

        note_ranges.push(range_start);
        note_ranges.push(range_end);
    }
    Ok(note_ranges)
}

/// Weighted average of the per-frame fundamentals over a sample interval.
///
/// Each frame contributes with weight equal to the number of samples it
/// represents inside `[start_sample, stop_sample)`; the first and last
/// frames are partial.
pub fn average_freq(
    start_sample: i64,
    stop_sample: i64,
    win_int: usize,
    win_size: usize,
    num_samples: i64,
    freq: &[f32],
) -> f32 {
    if start_sample == stop_sample {
        return 0.0;
    }
    let num_frames = freq.len();
    let start_index = rep_win_index(win_int, win_size, start_sample, num_frames);
    let stop_index = rep_win_index(win_int, win_size, stop_sample, num_frames);

    if stop_index == start_index {
        // the whole note falls inside a single frame
        return freq[start_index];
    }

    let mut n =
        win_stop_rep_sample_index(win_int, win_size, num_samples, start_index, num_frames)
            - start_sample;
    let mut acc = n as f64 * freq[start_index] as f64;

    for i in start_index + 1..stop_index {
        let size = win_stop_rep_sample_index(win_int, win_size, num_samples, i, num_frames)
            - win_start_rep_sample_index(win_int, win_size, num_samples, i);
        acc += size as f64 * freq[i] as f64;
        n += size;
    }

    let final_window_start =
        win_start_rep_sample_index(win_int, win_size, num_samples, stop_index);
    if final_window_start < stop_sample {
        let size = stop_sample - final_window_start;
        acc += size as f64 * freq[stop_index] as f64;
        n += size;
    }

    (acc / n as f64) as f32
}

/// Averaged frequency of each note range.
pub fn assign_note_pitches(
    freq: &[f32],
    note_ranges: &[i64],
    win_int: usize,
    win_size: usize,
    num_samples: i64,
) -> Vec<f32> {
    note_ranges
        .chunks_exact(2)
        .map(|pair| average_freq(pair[0], pair[1], win_int, win_size, num_samples, freq))
        .collect()
}

/// Combines transients, optional activity ranges, and the per-frame
/// fundamentals into `(note_ranges, note_frequencies)`.
///
/// Notes whose averaged frequency is 0 or non-finite are dropped.
pub fn construct_notes(
    pitches: &[f32],
    transients: &[i64],
    activity_ranges: Option<&[i64]>,
    info: AudioInfo,
    win_size: usize,
    win_int: usize,
) -> Res<(Vec<i64>, Vec<f32>)> {
    let mut note_ranges: Vec<i64> = match activity_ranges {
        Some(ranges) => calc_note_ranges(transients, ranges, info.samplerate)?,
        None => transients.to_vec(),
    };
    let mut note_freq =
        assign_note_pitches(pitches, &note_ranges, win_int, win_size, info.frames);

    let mut i = 0;
    while i < note_freq.len() {
        if note_freq[i] == 0.0 || !note_freq[i].is_finite() {
            note_freq.remove(i);
            note_ranges.drain(2 * i..2 * i + 2);
        } else {
            i += 1;
        }
    }
    Ok((note_ranges, note_freq))
}

// ---------------------------------------------------------------------------
// frequency -> MIDI
// ---------------------------------------------------------------------------

/// Fractional MIDI note number: `12 log2(f / 440) + 57`.
pub fn frequency_to_fractional_note(freq: f32) -> f32 {
    12.0 * (freq / TUNING_REFERENCE).log2() + 57.0
}

/// Closest MIDI note number (e.g. 443 Hz -> 57, A4).
pub fn frequency_to_note(freq: f32) -> i32 {
    frequency_to_fractional_note(freq).round() as i32
}

/// Pitch name of a MIDI note number, `----` outside the MIDI range.
pub fn note_to_name(n: i32) -> String {
    if (0..=127).contains(&n) {
        format!("{}{:2}", NOTE_NAMES[n as usize % 12], n / 12)
    } else {
        "----".to_string()
    }
}

#[inline]
fn fract_part(x: f32) -> f32 {
    x - x.trunc()
}

fn mean_weighted(arr: &[f32], weights: &[f32]) -> f32 {
    let weighted: f32 = arr.iter().zip(weights).map(|(&a, &w)| a * w).sum();
    weighted / weights.iter().sum::<f32>()
}

fn square_dist_wrapped_weighted(arr: &[f32], pt: f32, weights: &[f32]) -> f32 {
    arr.iter()
        .zip(weights)
        .map(|(&a, &w)| {
            let mut diff = a - pt;
            if diff > 0.5 {
                diff = 1.0 - diff;
            } else if diff < -0.5 {
                diff = -1.0 - diff;
            }
            diff * diff * w
        })
        .sum()
}

/// Weighted average of the fractional parts of `arr`, treating the parts
/// as wrap-around values (the distance between .9 and .1 is .2).
///
/// Entries are weighted by `1 / (distance to the centre entry + 1)`.  The
/// candidate wrap midpoints are swept until every part has reached 0.5;
/// the weighted mean with the lowest wrapped square distance wins.
/// Returns `(average, distance)`.
fn fractional_average(arr: &[f32], center_ind: usize) -> (f32, f32) {
    debug_assert!(center_ind < arr.len());
    let center = arr[center_ind];
    let weights: Vec<f32> = arr.iter().map(|&v| 1.0 / ((v - center).abs() + 1.0)).collect();
    let mut fract_parts: Vec<f32> = arr.iter().map(|&v| fract_part(v)).collect();

    let mut avg = fract_parts[center_ind];

    // values of .5 and above wrap down (0.5 rounds to 1; -0.5 rounds to 0)
    for f in fract_parts.iter_mut() {
        if *f >= 0.5 {
            *f -= 1.0;
        }
    }

    let mut mi = -1000.0f32;
    let mut lowest_dist = f32::MAX;
    loop {
        for f in fract_parts.iter_mut() {
            if *f <= mi {
                *f += 1.0;
            }
        }
        let cur_avg = mean_weighted(&fract_parts, &weights);
        let cur_dist = square_dist_wrapped_weighted(&fract_parts, cur_avg, &weights);
        if cur_dist < lowest_dist {
            avg = cur_avg;
            lowest_dist = cur_dist;
        }
        mi = fract_parts.iter().cloned().fold(f32::MAX, f32::min);
        if mi >= 0.5 {
            break;
        }
    }
    (avg, lowest_dist)
}

/// Converts note frequencies to MIDI numbers.
///
/// Tuning modes: 0 rounds directly; 1 snaps to the neighbourhood average
/// when the neighbourhood is consistent (accounts for a singer being
/// uniformly sharp or flat); 2 always snaps.
pub fn frequencies_to_notes(freq: &[f32], tuning: i32) -> Res<Vec<i32>> {
    if tuning == 0 {
        return freq
            .iter()
            .map(|&f| {
                let fract = frequency_to_fractional_note(f);
                if !fract.is_finite() {
                    return Err(Error::NonFiniteNote);
                }
                Ok(fract.round() as i32)
            })
            .collect();
    }

    let threshold = if tuning == 2 { f32::MAX } else { 0.0625 };

    let fract_notes: Vec<f32> = freq.iter().map(|&f| frequency_to_fractional_note(f)).collect();
    if fract_notes.iter().any(|f| !f.is_finite()) {
        return Err(Error::NonFiniteNote);
    }

    let num_notes = fract_notes.len();
    let mut melody = Vec::with_capacity(num_notes);
    for i in 0..num_notes {
        // up to 2 neighbours on each side of the centre note
        let start = i.saturating_sub(2);
        let end = (i + 2).min(num_notes - 1);
        let neighbors = &fract_notes[start..=end];

        let (avg, dist) = fractional_average(neighbors, i - start);
        let note = if dist < threshold {
            ((fract_notes[i] - avg).round() + avg).round() as i32
        } else {
            fract_notes[i].round() as i32
        };
        melody.push(note);
    }
    Ok(melody)
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const INFO: AudioInfo = AudioInfo {
        frames: 32,
        samplerate: 44100,
    };

    #[test]
    fn test_rep_ranges_partition_the_stream() {
        // win_int 4, win_size 8: boundary between frames i and i+1 at 4i + 6
        let (h, w, n) = (4usize, 8usize, 32i64);
        let frames = 5;
        assert_eq!(win_start_rep_sample_index(h, w, n, 0), 0);
        assert_eq!(win_stop_rep_sample_index(h, w, n, 0, frames), 6);
        assert_eq!(win_start_rep_sample_index(h, w, n, 1), 6);
        assert_eq!(win_stop_rep_sample_index(h, w, n, 1, frames), 10);
        assert_eq!(win_stop_rep_sample_index(h, w, n, 4, frames), 32);
        // every sample maps to the frame whose range contains it
        for sample in 0..32i64 {
            let i = rep_win_index(h, w, sample, frames);
            assert!(win_start_rep_sample_index(h, w, n, i) <= sample);
            assert!(sample < win_stop_rep_sample_index(h, w, n, i, frames));
        }
    }

    #[test]
    fn test_average_freq_weights_partial_frames() {
        let freq = [100.0f32, 200.0, 300.0, 400.0, 500.0];
        // frames represent [0,6) [6,10) [10,14) [14,18) [18,32)
        let got = average_freq(2, 16, 4, 8, 32, &freq);
        // 4*100 + 4*200 + 4*300 + 2*400 over 14 samples
        let expected = 3200.0 / 14.0;
        assert!((got - expected).abs() < 1e-4, "{got} vs {expected}");
    }

    #[test]
    fn test_average_freq_single_frame_note() {
        let freq = [100.0f32, 200.0, 300.0];
        assert_eq!(average_freq(7, 9, 4, 8, 32, &freq), 200.0);
        assert_eq!(average_freq(9, 9, 4, 8, 32, &freq), 0.0);
    }

    #[test]
    fn test_calc_note_ranges_splits_at_onsets() {
        // activity [0, 44100); onsets at 10000 and 30000 split it in three
        let ranges = calc_note_ranges(&[10_000, 30_000], &[0, 44_100], 44_100).unwrap();
        assert_eq!(ranges, vec![0, 10_000, 10_000, 30_000, 30_000, 44_100]);
    }

    #[test]
    fn test_calc_note_ranges_honours_threshold() {
        // an onset 20 ms (882 samples) into the range does not split
        let ranges = calc_note_ranges(&[882], &[0, 44_100], 44_100).unwrap();
        assert_eq!(ranges, vec![0, 44_100]);
    }

    #[test]
    fn test_calc_note_ranges_requires_activity() {
        assert_eq!(
            calc_note_ranges(&[100], &[], 44_100),
            Err(Error::NoActivity)
        );
    }

    #[test]
    fn test_construct_notes_direct_path_drops_zero_pitch() {
        // two transient pairs; the second lands on frames with zero pitch
        let pitches = [220.0f32, 220.0, 0.0, 0.0, 0.0];
        let transients = [0i64, 8, 16, 24];
        let (ranges, freqs) =
            construct_notes(&pitches, &transients, None, INFO, 8, 4).unwrap();
        assert_eq!(ranges, vec![0, 8]);
        assert_eq!(freqs.len(), 1);
        assert!((freqs[0] - 220.0).abs() < 1e-3);
    }

    #[test]
    fn test_frequency_note_conversions() {
        assert_eq!(frequency_to_note(443.0), 57);
        assert_eq!(frequency_to_note(261.63), 48); // middle C
        assert!((frequency_to_fractional_note(440.0) - 57.0).abs() < 1e-6);
    }

    #[test]
    fn test_note_names() {
        assert_eq!(note_to_name(57), "A  4");
        assert_eq!(note_to_name(48), "C  4");
        assert_eq!(note_to_name(49), "C# 4");
        assert_eq!(note_to_name(-1), "----");
        assert_eq!(note_to_name(128), "----");
    }

    #[test]
    fn test_fractional_average_wraps() {
        // 59.9 and 60.1 straddle the integer: the average fractional part
        // sits near 0, not 0.5
        let (avg, _) = fractional_average(&[59.9, 60.1], 0);
        assert!(avg.abs() < 0.05, "avg {avg}");
    }

    #[test]
    fn test_tuning_mode_zero_rounds() {
        let notes = frequencies_to_notes(&[440.0, 443.0, 466.16], 0).unwrap();
        assert_eq!(notes, vec![57, 57, 58]);
    }

    #[test]
    fn test_tuning_rejects_non_finite() {
        assert_eq!(
            frequencies_to_notes(&[440.0, 0.0], 0),
            Err(Error::NonFiniteNote)
        );
        assert_eq!(
            frequencies_to_notes(&[440.0, 0.0], 1),
            Err(Error::NonFiniteNote)
        );
    }

    #[test]
    fn test_tuning_snaps_outlier_in_sharp_run() {
        // a singer consistently ~40 cents sharp, with one note drifting to
        // +55 cents: plain rounding pushes that note up a semitone, the
        // neighbourhood adjustment pulls it back onto the shared offset
        let fract = [57.4f32, 59.4, 60.55, 62.4, 64.4];
        let freqs: Vec<f32> = fract
            .iter()
            .map(|&n| TUNING_REFERENCE * 2.0f32.powf((n - 57.0) / 12.0))
            .collect();

        let plain = frequencies_to_notes(&freqs, 0).unwrap();
        assert_eq!(plain, vec![57, 59, 61, 62, 64]);

        let adjusted = frequencies_to_notes(&freqs, 1).unwrap();
        assert_eq!(adjusted, vec![57, 59, 60, 62, 64]);

        let always = frequencies_to_notes(&freqs, 2).unwrap();
        assert_eq!(always, vec![57, 59, 60, 62, 64]);
    }
}
