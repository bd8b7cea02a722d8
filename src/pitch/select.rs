//! Cross-frame fundamental selection: a lowest-cost path through each run
//! of frames that have at least one distinctive candidate.

use crate::core::lists::{DistinctCandidate, DistinctList};

/// Transition cost from candidate `from` to candidate `to`.
pub fn cost_function(from: &DistinctCandidate, to: &DistinctCandidate) -> f32 {
    ((from.frequency as f64 / to.frequency as f64).log2().abs()
        + 0.4 / from.confidence as f64) as f32
}

/// Selects the fundamental frequency of every frame.
///
/// Frames with no candidates get fundamental 0.  Maximal runs of non-empty
/// frames are resolved independently: runs of length 1 take their frame's
/// first candidate, longer runs take the lowest-cost path.
pub fn candidate_selection(window_lists: &mut [DistinctList]) -> Vec<f32> {
    let length = window_lists.len();
    let mut fundamentals = vec![0.0f32; length];

    let mut start: Option<usize> = None;
    for i in 0..length {
        let cur_len = window_lists[i].len();

        if cur_len == 0 {
            fundamentals[i] = 0.0;
        }
        if start.is_none() && cur_len != 0 {
            start = Some(i);
        }

        let end = if start.is_some() && i == length - 1 && cur_len != 0 {
            Some(i)
        } else if start.is_some() && cur_len == 0 {
            Some(i - 1)
        } else {
            None
        };

        if let (Some(s), Some(e)) = (start, end) {
            if s == e {
                // run of a single frame: take its first candidate
                fundamentals[s] = window_lists[s].get(0).frequency;
            } else {
                select_segment(&mut fundamentals, window_lists, s, e);
            }
            start = None;
        }
    }
    fundamentals
}

/// Fills `fundamentals[start..=last]` with the frequencies along the
/// lowest-cost path through `window_lists[start..=last]`.
///
/// Every frame in the run must hold at least one candidate.  Candidates
/// are visited from the highest index down and accepted on `<=`, so cost
/// ties resolve toward the candidate appended first (the one with the
/// higher confidence, then the lower frequency).
fn select_segment(
    fundamentals: &mut [f32],
    window_lists: &mut [DistinctList],
    start: usize,
    last: usize,
) {
    let mut final_index: i32 = -1;
    let mut final_cost = f32::MAX;

    for frame in start + 1..=last {
        let (before, after) = window_lists.split_at_mut(frame);
        let prev_list = &before[frame - 1];
        let cur_list = &mut after[0];

        for i in (0..cur_list.len()).rev() {
            let cur_candidate = *cur_list.get(i);

            let mut min_cost = f32::MAX;
            let mut index_lowest_cost: i32 = -1;
            for j in (0..prev_list.len()).rev() {
                let prev = prev_list.get(j);
                let cur_cost = prev.cost + cost_function(prev, &cur_candidate);
                if cur_cost <= min_cost {
                    min_cost = cur_cost;
                    index_lowest_cost = j as i32;
                }
            }
            cur_list.adjust_cost(i, min_cost, index_lowest_cost);
            if frame == last && min_cost <= final_cost {
                final_cost = min_cost;
                final_index = i as i32;
            }
        }
    }

    // trace the lowest-cost path backwards along the predecessor offsets
    let mut index = final_index;
    for frame in (start..=last).rev() {
        let candidate = window_lists[frame].get(index as usize);
        fundamentals[frame] = candidate.frequency;
        index = candidate.prev_index;
    }
}
