//! End-to-end transcription: validates settings, then runs silence →
//! pitch → transients → note assembly → MIDI emission.

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use crate::core::base::{AudioInfo, Error, Res};
use crate::core::helpers::parse_window_span;
use crate::midi::write_notes_as_midi;
use crate::notes;
use crate::pitch::{extract_pitch, PitchStrategy};
use crate::stft::{stft_magnitudes, Spectrogram};
use crate::transient::detect_transients_from_resampled;

/// Raw, unvalidated settings as they arrive from the CLI.
///
/// Window spans are strings ("4096" or "60ms") because their meaning
/// depends on the input sample rate.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub prefix: Option<String>,
    pub pitch_window: Option<String>,
    pub pitch_padded: Option<String>,
    pub pitch_spacing: Option<String>,
    pub pitch_strategy: Option<String>,
    pub silence_window: Option<String>,
    pub silence_spacing: Option<String>,
    pub silence_strategy: Option<String>,
    pub silence_mode: i32,
    pub tuning: i32,
    pub verbose: bool,
}

impl Settings {
    /// Settings with every default filled in (silence mode 3, tuning 1).
    pub fn new() -> Self {
        Self {
            silence_mode: 3,
            tuning: 1,
            ..Default::default()
        }
    }
}

/// Validated configuration for one run.
#[derive(Debug, Clone)]
pub struct Config {
    pub prefix: Option<String>,
    pub pitch_window: usize,
    pub pitch_padded: usize,
    pub pitch_spacing: usize,
    pub pitch_strategy: PitchStrategy,
    pub silence_window_ms: i32,
    pub silence_spacing_ms: i32,
    pub silence_mode: i32,
    pub tuning: i32,
    pub verbose: bool,
}

const PITCH_WINDOW_DEF: usize = 4096;
const SILENCE_WINDOW_DEF: i32 = 10;

impl Config {
    /// Validates `settings` against the stream being processed.
    pub fn from_settings(settings: &Settings, info: AudioInfo) -> Res<Config> {
        let pitch_window = match &settings.pitch_window {
            None => PITCH_WINDOW_DEF as i64,
            Some(text) => parse_window_span(text, info.samplerate)
                .filter(|&v| v >= 1)
                .ok_or_else(|| Error::Config("pitch_window must be a positive int".into()))?,
        };

        let pitch_padded = match &settings.pitch_padded {
            None => pitch_window,
            Some(text) => parse_window_span(text, info.samplerate)
                .filter(|&v| v >= pitch_window)
                .ok_or_else(|| {
                    Error::Config("pitch_padded cannot be less than pitch_window".into())
                })?,
        };

        let pitch_spacing = match &settings.pitch_spacing {
            None => (pitch_window as f64 / 2.0).ceil() as i64,
            Some(text) => parse_window_span(text, info.samplerate)
                .filter(|&v| v >= 1)
                .ok_or_else(|| Error::Config("pitch_spacing must be a positive int".into()))?,
        };

        let pitch_strategy = match &settings.pitch_strategy {
            None => PitchStrategy::default(),
            Some(name) => name.parse()?,
        };

        let silence_window_ms = match settings.silence_window.as_deref() {
            None => SILENCE_WINDOW_DEF,
            Some("10ms") => 10,
            Some("20ms") => 20,
            Some("30ms") => 30,
            Some(_) => {
                return Err(Error::Config(
                    "silence_window can only be \"10ms\", \"20ms\", or \"30ms\"".into(),
                ))
            }
        };

        let silence_spacing_ms = match &settings.silence_spacing {
            None => silence_window_ms,
            Some(text) => text
                .strip_suffix("ms")
                .and_then(|v| v.parse::<i32>().ok())
                .filter(|&v| v >= 1)
                .ok_or_else(|| {
                    Error::Config("silence_spacing must be a positive number of ms".into())
                })?,
        };

        if let Some(name) = &settings.silence_strategy {
            if !name.eq_ignore_ascii_case("fvad") {
                return Err(Error::Config("silence_strategy must be \"fVAD\"".into()));
            }
        }

        if !(0..=3).contains(&settings.silence_mode) {
            return Err(Error::Config("silence_mode must be 0, 1, 2, or 3".into()));
        }
        if !(0..=2).contains(&settings.tuning) {
            return Err(Error::Config("tuning must be 0, 1, or 2".into()));
        }

        Ok(Config {
            prefix: settings.prefix.clone(),
            pitch_window: pitch_window as usize,
            pitch_padded: pitch_padded as usize,
            pitch_spacing: pitch_spacing as usize,
            pitch_strategy,
            silence_window_ms,
            silence_spacing_ms,
            silence_mode: settings.silence_mode,
            tuning: settings.tuning,
            verbose: settings.verbose,
        })
    }
}

/// Runs the full pipeline over `input` and writes a MIDI file to `out`.
///
/// Voice-activity detection is an external collaborator; when no activity
/// ranges are supplied the transient list alone delimits the notes.
pub fn extract_melody<W: Write + Seek>(
    input: &[f32],
    info: AudioInfo,
    config: &Config,
    activity_ranges: Option<&[i64]>,
    out: &mut W,
) -> Res<()> {
    if config.verbose {
        println!(
            "pitch: window {}, padded {}, spacing {}, strategy {:?}",
            config.pitch_window, config.pitch_padded, config.pitch_spacing, config.pitch_strategy
        );
        println!(
            "silence: window {}ms, spacing {}ms, mode {}; tuning {}",
            config.silence_window_ms, config.silence_spacing_ms, config.silence_mode, config.tuning
        );
    }

    // pitch path
    let mut spectrogram = stft_magnitudes(
        input,
        info,
        config.pitch_window,
        config.pitch_padded,
        config.pitch_spacing,
    )?;
    if config.verbose {
        println!("spectrogram computed ({} blocks)", spectrogram.num_blocks);
    }
    if let Some(prefix) = &config.prefix {
        save_weights_txt(
            &format!("{prefix}_original.txt"),
            &spectrogram,
            info.samplerate,
            config.pitch_window,
            config.pitch_padded,
        )?;
    }

    let fundamentals = extract_pitch(
        &mut spectrogram,
        config.pitch_strategy,
        config.pitch_padded,
        info.samplerate,
    )?;
    if config.verbose {
        println!("pitch detection complete");
        for f in &fundamentals {
            println!("  {f}");
        }
    }
    if let Some(prefix) = &config.prefix {
        save_weights_txt(
            &format!("{prefix}_weighted.txt"),
            &spectrogram,
            info.samplerate,
            config.pitch_window,
            config.pitch_padded,
        )?;
    }

    // transient path
    let transients = detect_transients_from_resampled(input, info.samplerate, config.verbose)?;
    if config.verbose {
        println!("transient detection complete ({} pairs)", transients.len() / 2);
    }

    // merge
    let (note_ranges, note_freq) = notes::construct_notes(
        &fundamentals,
        &transients,
        activity_ranges,
        info,
        config.pitch_window,
        config.pitch_spacing,
    )?;
    if note_freq.is_empty() {
        return Err(Error::NoTransients);
    }

    let melody_midi = notes::frequencies_to_notes(&note_freq, config.tuning)?;

    if let Some(prefix) = &config.prefix {
        save_notes_txt(
            &format!("{prefix}_notes.txt"),
            &note_ranges,
            &melody_midi,
            info.samplerate,
        )?;
    }

    print_detection_summary(info, &note_ranges, &note_freq, &melody_midi);

    write_notes_as_midi(&melody_midi, &note_ranges, info.samplerate, out, config.verbose)
}

/// Prints a human-readable table of the detected notes.
fn print_detection_summary(
    info: AudioInfo,
    note_ranges: &[i64],
    note_freq: &[f32],
    melody_midi: &[i32],
) {
    println!("Detected {} Notes. Printing Summary:", melody_midi.len());
    let hdr = "     Start - Stop |   Start - Stop  |Frequency|Raw MIDI|Final|Pitch";
    let sub = "        (samples) |    (nearest ms) |     (Hz)|   Pitch|Pitch| Name";
    println!("{hdr}");
    println!("{sub}");
    println!("==================+=================+=========+========+=====+=====");

    for i in 0..melody_midi.len() {
        let start = note_ranges[2 * i];
        let stop = note_ranges[2 * i + 1];
        let start_ms = (start as f64 * 1000.0 / info.samplerate as f64 + 0.5) as i64;
        let stop_ms = (stop as f64 * 1000.0 / info.samplerate as f64 + 0.5) as i64;
        println!(
            "{:>7} - {:>7} | {:>6} - {:>6} | {:>7.2} | {:>6.2} | {:>3} | {}",
            start,
            stop,
            start_ms,
            stop_ms,
            note_freq[i],
            notes::frequency_to_fractional_note(note_freq[i]),
            melody_midi[i],
            notes::note_to_name(melody_midi[i]),
        );
    }
}

/// Dumps the spectrogram as tab-separated rows with `#` header lines.
fn save_weights_txt(
    file_name: &str,
    spectrogram: &Spectrogram,
    samplerate: i32,
    unpadded_size: usize,
    win_size: usize,
) -> Res<()> {
    let mut fp = BufWriter::new(File::create(Path::new(file_name))?);
    writeln!(fp, "#Window Size:\t{win_size}")?;
    writeln!(fp, "#Window Size Before Zero Padding:\t{unpadded_size}")?;
    writeln!(fp, "#Sample Rate:\t{samplerate}")?;
    for block in 0..spectrogram.num_blocks {
        for v in spectrogram.block(block) {
            write!(fp, "{v:e}\t")?;
        }
        writeln!(fp)?;
    }
    Ok(())
}

/// Dumps the note ranges and pitches for debugging.
fn save_notes_txt(
    file_name: &str,
    note_ranges: &[i64],
    note_pitches: &[i32],
    samplerate: i32,
) -> Res<()> {
    let mut fp = BufWriter::new(File::create(Path::new(file_name))?);
    writeln!(fp, "#Sample Rate:\t{samplerate}")?;
    writeln!(fp, "#note_start and note_stop are in units of num of samples")?;
    writeln!(fp, "#note_pitch is the midi num associated with the pitch")?;
    write!(fp, "note_start\tnote_stop\tnote_pitch")?;
    for (i, &pitch) in note_pitches.iter().enumerate() {
        write!(fp, "\n{}\t{}\t{}", note_ranges[2 * i], note_ranges[2 * i + 1], pitch)?;
    }
    Ok(())
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const INFO: AudioInfo = AudioInfo {
        frames: 441_000,
        samplerate: 44_100,
    };

    #[test]
    fn test_defaults() {
        let config = Config::from_settings(&Settings::new(), INFO).unwrap();
        assert_eq!(config.pitch_window, 4096);
        assert_eq!(config.pitch_padded, 4096);
        assert_eq!(config.pitch_spacing, 2048);
        assert_eq!(config.pitch_strategy, PitchStrategy::BaNaMusic);
        assert_eq!(config.silence_window_ms, 10);
        assert_eq!(config.silence_spacing_ms, 10);
        assert_eq!(config.silence_mode, 3);
        assert_eq!(config.tuning, 1);
    }

    #[test]
    fn test_window_spans_accept_ms_suffix() {
        let mut settings = Settings::new();
        settings.pitch_window = Some("50ms".into());
        settings.pitch_padded = Some("100ms".into());
        settings.pitch_spacing = Some("25ms".into());
        let config = Config::from_settings(&settings, INFO).unwrap();
        assert_eq!(config.pitch_window, 2205);
        assert_eq!(config.pitch_padded, 4410);
        assert_eq!(config.pitch_spacing, 1102);
    }

    #[test]
    fn test_padded_must_cover_window() {
        let mut settings = Settings::new();
        settings.pitch_window = Some("4096".into());
        settings.pitch_padded = Some("1024".into());
        assert!(matches!(
            Config::from_settings(&settings, INFO),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_silence_window_is_restricted() {
        let mut settings = Settings::new();
        settings.silence_window = Some("20ms".into());
        assert_eq!(
            Config::from_settings(&settings, INFO).unwrap().silence_window_ms,
            20
        );
        settings.silence_window = Some("15ms".into());
        assert!(Config::from_settings(&settings, INFO).is_err());
    }

    #[test]
    fn test_invalid_modes_are_rejected() {
        let mut settings = Settings::new();
        settings.tuning = 3;
        assert!(Config::from_settings(&settings, INFO).is_err());

        let mut settings = Settings::new();
        settings.silence_mode = 4;
        assert!(Config::from_settings(&settings, INFO).is_err());

        let mut settings = Settings::new();
        settings.silence_strategy = Some("webrtc".into());
        assert!(Config::from_settings(&settings, INFO).is_err());

        let mut settings = Settings::new();
        settings.pitch_strategy = Some("HPS".into());
        assert!(Config::from_settings(&settings, INFO).is_err());
    }

    #[test]
    fn test_default_spacing_is_half_window_rounded_up() {
        let mut settings = Settings::new();
        settings.pitch_window = Some("4097".into());
        let config = Config::from_settings(&settings, INFO).unwrap();
        assert_eq!(config.pitch_spacing, 2049);
    }
}
