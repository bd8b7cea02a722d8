//! Pitch detection: per-frame fundamental frequency estimation over the
//! magnitude spectrogram, using the BaNa harmonic-ratio algorithm.

pub mod bana;
pub mod peaks;
pub mod select;

use std::str::FromStr;

use crate::core::base::{Error, Res};
use crate::stft::Spectrogram;

/// Pitch detection strategy.
///
/// `BaNa` searches a speech-sized range and takes the first peaks found;
/// `BaNaMusic` widens the range, tightens the candidate tolerance, and
/// takes the loudest peaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PitchStrategy {
    BaNa,
    #[default]
    BaNaMusic,
}

impl FromStr for PitchStrategy {
    type Err = Error;

    fn from_str(name: &str) -> Res<Self> {
        match name.to_lowercase().as_str() {
            "bana" => Ok(PitchStrategy::BaNa),
            "banamusic" => Ok(PitchStrategy::BaNaMusic),
            _ => Err(Error::Config(
                "pitch_strategy must be \"BaNa\" or \"BaNaMusic\"".into(),
            )),
        }
    }
}

impl PitchStrategy {
    /// `(p, f0_min, f0_max, xi, first)` for this strategy.
    fn params(self) -> (usize, f32, f32, f32, bool) {
        match self {
            PitchStrategy::BaNa => (5, 50.0, 600.0, 10.0, true),
            PitchStrategy::BaNaMusic => (5, 50.0, 3000.0, 3.0, false),
        }
    }
}

/// Estimates the fundamental frequency of every spectrogram frame.
///
/// The spectrogram is band-limited in place as a side effect (frames keep
/// only `[f0_min, p * f0_max]`).  Frames without usable candidates yield 0.
pub fn extract_pitch(
    spectrogram: &mut Spectrogram,
    strategy: PitchStrategy,
    fft_size: usize,
    samplerate: i32,
) -> Res<Vec<f32>> {
    let (p, f0_min, f0_max, xi, first) = strategy.params();
    bana::bana(
        spectrogram,
        p,
        f0_min,
        f0_max,
        xi,
        fft_size,
        samplerate,
        first,
    )
}
