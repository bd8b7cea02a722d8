//! Rolling kernel-bandwidth estimation: a centred, shrinking window of
//! rolling variance (Welford-style add/remove, after pandas' `roll_var`)
//! scaled by Silverman's rule of thumb.

use crate::core::base::{Error, Res};

/// Centred variable window over `[0, array_length)`; advances one sample at
/// a time.
struct WindowIndexer {
    size_left: i64,
    size_right: i64,
    cur_location: i64,
    array_length: i64,
}

impl WindowIndexer {
    fn new(win_size: usize, start_index: usize, array_length: usize) -> Self {
        let mut size_left = win_size as i64 / 2;
        let size_right = size_left + 1;
        if win_size % 2 == 0 {
            size_left -= 1;
        }
        Self {
            size_left,
            size_right,
            cur_location: start_index as i64,
            array_length: array_length as i64,
        }
    }

    fn advance(&mut self) {
        self.cur_location += 1;
    }

    fn start(&self) -> usize {
        (self.cur_location - self.size_left).max(0) as usize
    }

    fn stop(&self) -> usize {
        (self.cur_location + self.size_right).min(self.array_length) as usize
    }
}

#[inline]
fn calc_var(nobs: i64, ssqdm_x: f64) -> f64 {
    if nobs <= 1 {
        0.0
    } else {
        (ssqdm_x / (nobs - 1) as f64).max(0.0)
    }
}

#[inline]
fn add_var(val: f64, nobs: &mut i64, mean_x: &mut f64, ssqdm_x: &mut f64) {
    *nobs += 1;
    let delta = val - *mean_x;
    *mean_x += delta / *nobs as f64;
    *ssqdm_x += (*nobs - 1) as f64 * delta * delta / *nobs as f64;
}

#[inline]
fn remove_var(val: f64, nobs: &mut i64, mean_x: &mut f64, ssqdm_x: &mut f64) {
    *nobs -= 1;
    if *nobs > 0 {
        let delta = val - *mean_x;
        *mean_x -= delta / *nobs as f64;
        *ssqdm_x -= (*nobs + 1) as f64 * delta * delta / *nobs as f64;
    } else {
        *mean_x = 0.0;
        *ssqdm_x = 0.0;
    }
}

/// Computes `num_windows` bandwidth estimates over `buffer`, one every
/// `interval` samples starting from `start_index`.
///
/// Estimate `i` is `scale_factor * sqrt(var) / nobs^0.2` where `var` is the
/// sample variance of the centred window (shrunk at the stream edges) and
/// `nobs` the number of in-bounds samples.
pub fn roll_sigma(
    start_index: usize,
    interval: usize,
    scale_factor: f32,
    sig_window_size: usize,
    num_windows: usize,
    buffer: &[f32],
    sigmas: &mut [f32],
) -> Res<()> {
    if sig_window_size == 0 {
        return Err(Error::NonPositiveArg("rolling window size"));
    }
    if interval == 0 {
        return Err(Error::NonPositiveArg("interval"));
    }
    debug_assert!(sigmas.len() >= num_windows);

    let mut w_ind = WindowIndexer::new(sig_window_size, start_index, buffer.len());
    let mut nobs: i64 = 0;
    let mut mean_x = 0.0f64;
    let mut ssqdm_x = 0.0f64;
    let mut prev_start = 0usize;
    let mut prev_stop = 0usize;

    for i in 0..num_windows {
        let win_start = w_ind.start();
        let win_stop = w_ind.stop();
        if i == 0 {
            // over the first window observations can only be added
            for j in win_start..win_stop {
                add_var(buffer[j] as f64, &mut nobs, &mut mean_x, &mut ssqdm_x);
            }
        } else {
            for j in prev_stop..win_stop {
                add_var(buffer[j] as f64, &mut nobs, &mut mean_x, &mut ssqdm_x);
            }
            for j in prev_start..win_start {
                remove_var(buffer[j] as f64, &mut nobs, &mut mean_x, &mut ssqdm_x);
            }
        }
        w_ind.advance();
        prev_start = win_start;
        prev_stop = win_stop;

        let std = calc_var(nobs, ssqdm_x).sqrt() as f32;
        sigmas[i] = scale_factor * std / (nobs as f32).powf(0.2);

        if i == num_windows - 1 {
            break;
        }

        // the indexer steps one sample at a time; walk it up to the next
        // estimate location
        for _ in 1..interval {
            let win_start = w_ind.start();
            let win_stop = w_ind.stop();
            for j in prev_stop..win_stop {
                add_var(buffer[j] as f64, &mut nobs, &mut mean_x, &mut ssqdm_x);
            }
            for j in prev_start..win_start {
                remove_var(buffer[j] as f64, &mut nobs, &mut mean_x, &mut ssqdm_x);
            }
            w_ind.advance();
            prev_start = win_start;
            prev_stop = win_stop;
        }
    }
    Ok(())
}
