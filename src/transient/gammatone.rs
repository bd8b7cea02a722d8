//! Gammatone filtering: Slaney's 4-stage cascaded-biquad approximation and
//! the Direct Form II Transposed second-order-section filter that runs it.

use num_complex::Complex64;

use crate::core::base::{Error, Res};

/// Number of biquad stages in the gammatone approximation.
pub const GAMMATONE_STAGES: usize = 4;

/// Coefficients per biquad stage: `b0, b1, b2, a0, a1, a2`.
pub const COEFS_PER_STAGE: usize = 6;

/// Magnitude of the stage transfer function at `central_freq`.
fn stage_gain(central_freq: f32, samplerate: i32, coef: &[f64]) -> f64 {
    let z1 = Complex64::from_polar(1.0, -2.0 * std::f64::consts::PI * central_freq as f64
        / samplerate as f64);
    let z2 = z1 * z1;
    let numer = Complex64::new(coef[0], 0.0) + Complex64::new(coef[1], 0.0) * z1
        + Complex64::new(coef[2], 0.0) * z2;
    let denom = Complex64::new(coef[3], 0.0) + Complex64::new(coef[4], 0.0) * z1
        + Complex64::new(coef[5], 0.0) * z2;
    (numer / denom).norm()
}

/// Numerically normalizes one stage so its response has 0 dB gain at the
/// central frequency, by dividing the feedforward coefficients by the gain.
fn numerical_normalize(central_freq: f32, samplerate: i32, coef: &mut [f64]) {
    let gain = stage_gain(central_freq, samplerate, coef);
    coef[0] /= gain;
    coef[1] /= gain;
    coef[2] /= gain;
}

/// Computes the 24 second-order-section coefficients implementing a
/// gammatone filter at `central_freq` (Slaney 1993).
///
/// Each stage is normalized to unit gain at the central frequency.
pub fn sos_gammatone_coef(central_freq: f32, samplerate: i32) -> [f64; GAMMATONE_STAGES * COEFS_PER_STAGE] {
    use std::f64::consts::PI;

    let delta_t = 1.0 / samplerate as f64;
    let cf = central_freq as f64;
    let b = 2.0 * PI * 1.019 * 24.7 * (4.37 * cf / 1000.0 + 1.0); // bandwidth

    let cos_term = (2.0 * cf * PI * delta_t).cos();
    let sin_term = (2.0 * cf * PI * delta_t).sin();
    let exp_term = (b * delta_t).exp();

    let mut coef = [0.0f64; GAMMATONE_STAGES * COEFS_PER_STAGE];
    for i in 0..GAMMATONE_STAGES {
        let stage = &mut coef[i * COEFS_PER_STAGE..(i + 1) * COEFS_PER_STAGE];
        let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
        // only b1 changes between stages
        stage[0] = delta_t;
        stage[1] = if i < 2 {
            -((2.0 * delta_t * cos_term / exp_term)
                + (sign * 2.0 * (3.0 + 2.0f64.powf(1.5)).sqrt() * delta_t * sin_term / exp_term))
                / 2.0
        } else {
            -((2.0 * delta_t * cos_term / exp_term)
                + (sign * 2.0 * (3.0 - 2.0f64.powf(1.5)).sqrt() * delta_t * sin_term / exp_term))
                / 2.0
        };
        stage[2] = 0.0;
        stage[3] = 1.0;
        stage[4] = -2.0 * cos_term / exp_term;
        stage[5] = (-2.0 * b * delta_t).exp();

        numerical_normalize(central_freq, samplerate, stage);
    }
    coef
}

/// One sample through the full cascade.
///
/// Difference equations (Direct Form II Transposed):
///   `y[n]  = (b0 * x[n] + d1[n-1]) / a0`
///   `d1[n] = b1 * x[n] - a1 * y[n] + d2[n-1]`
///   `d2[n] = b2 * x[n] - a2 * y[n]`
#[inline]
fn sos_filter_elem(x: f64, coef: &[f64], n_stages: usize, state: &mut [f64]) -> f64 {
    let mut new_val = x;
    for stage in 0..n_stages {
        let cur_x = new_val;
        let c = &coef[stage * COEFS_PER_STAGE..(stage + 1) * COEFS_PER_STAGE];
        let (b0, b1, b2, a0, a1, a2) = (c[0], c[1], c[2], c[3], c[4], c[5]);

        let d1 = 2 * stage;
        let d2 = 2 * stage + 1;

        new_val = (b0 * cur_x + state[d1]) / a0;
        state[d1] = b1 * cur_x - a1 * new_val + state[d2];
        state[d2] = b2 * cur_x - a2 * new_val;
    }
    new_val
}

/// Applies a cascade of biquad stages to `x`, writing into `y`.
///
/// `coef` holds 6 coefficients per stage.  State starts at zero (silence
/// precedes the recording).  Inner arithmetic is `f64`; the store narrows
/// to `f32`.
pub fn sos_filter(coef: &[f64], x: &[f32], y: &mut [f32]) -> Res<()> {
    let n_stages = coef.len() / COEFS_PER_STAGE;
    if n_stages == 0 || coef.len() % COEFS_PER_STAGE != 0 {
        return Err(Error::NonPositiveArg("filter stages"));
    }
    if n_stages > 8 {
        return Err(Error::TooManyStages);
    }
    debug_assert_eq!(x.len(), y.len());

    let mut state = [0.0f64; 16];
    for (n, &xv) in x.iter().enumerate() {
        y[n] = sos_filter_elem(xv as f64, coef, n_stages, &mut state) as f32;
    }
    Ok(())
}

/// Filters `data` through a gammatone filter centred at `central_freq`.
pub fn sos_gammatone(data: &[f32], output: &mut [f32], central_freq: f32, samplerate: i32) -> Res<()> {
    let coef = sos_gammatone_coef(central_freq, samplerate);
    sos_filter(&coef, data, &mut output[..data.len()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_stage_passes_through() {
        let coef = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];
        let x = [1.0f32, -0.5, 0.25, 0.0];
        let mut y = [0.0f32; 4];
        sos_filter(&coef, &x, &mut y).unwrap();
        assert_eq!(y, x);
    }

    #[test]
    fn test_one_pole_impulse_response() {
        // y[n] = x[n] + 0.5 y[n-1]  ->  impulse response 1, 0.5, 0.25, ...
        let coef = [1.0, 0.0, 0.0, 1.0, -0.5, 0.0];
        let mut x = [0.0f32; 8];
        x[0] = 1.0;
        let mut y = [0.0f32; 8];
        sos_filter(&coef, &x, &mut y).unwrap();
        for (n, &v) in y.iter().enumerate() {
            assert!((v - 0.5f32.powi(n as i32)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_stage_count_limits() {
        let x = [0.0f32; 4];
        let mut y = [0.0f32; 4];
        assert_eq!(sos_filter(&[], &x, &mut y), Err(Error::NonPositiveArg("filter stages")));
        let coef = vec![0.0f64; 9 * COEFS_PER_STAGE];
        assert_eq!(sos_filter(&coef, &x, &mut y), Err(Error::TooManyStages));
    }

    #[test]
    fn test_gammatone_unit_gain_at_central_frequency() {
        for cf in [80.0f32, 440.0, 1000.0, 4000.0] {
            let coef = sos_gammatone_coef(cf, 11025);
            let mut total_gain = 1.0f64;
            for stage in 0..GAMMATONE_STAGES {
                total_gain *= stage_gain(cf, 11025, &coef[stage * 6..stage * 6 + 6]);
            }
            assert!(
                (total_gain - 1.0).abs() <= 1e-6,
                "gain at {cf} Hz was {total_gain}"
            );
        }
    }

    #[test]
    fn test_gammatone_attenuates_far_from_centre() {
        // the 80 Hz channel should pass 80 Hz far more readily than 2 kHz
        let coef = sos_gammatone_coef(80.0, 11025);
        let gain_at = |freq: f32| -> f64 {
            (0..GAMMATONE_STAGES)
                .map(|s| stage_gain(freq, 11025, &coef[s * 6..s * 6 + 6]))
                .product()
        };
        assert!(gain_at(2000.0) < 1e-3 * gain_at(80.0));
    }
}
