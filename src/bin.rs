use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use canlib::audio::read_audio_file;
use canlib::extract::{extract_melody, Config, Settings};
use clap::Parser;

/// Transcribes a monophonic singing recording into a MIDI file.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input WAV file.
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Output MIDI file.
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Verbose output.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Tuning adjustment mode: 0 = none, 1 = adjust with threshold,
    /// 2 = always adjust.
    #[arg(short = 't', long = "tuning", default_value_t = 1)]
    tuning: i32,

    /// Prefix for files where spectral debug data is dumped.
    #[arg(short = 'p', long = "prefix")]
    prefix: Option<String>,

    /// STFT window for pitch detection, in frames or with an `ms` suffix
    /// (default 4096).
    #[arg(long = "pitch_window")]
    pitch_window: Option<String>,

    /// Zero-padded FFT size for pitch detection; cannot be smaller than
    /// the window (defaults to the window size).
    #[arg(long = "pitch_padded")]
    pitch_padded: Option<String>,

    /// STFT window spacing for pitch detection (defaults to half the
    /// window).
    #[arg(long = "pitch_spacing")]
    pitch_spacing: Option<String>,

    /// Pitch detection strategy: BaNa or BaNaMusic (default BaNaMusic).
    #[arg(long = "pitch_strategy")]
    pitch_strategy: Option<String>,

    /// Silence-detection frame size: 10ms, 20ms, or 30ms.
    #[arg(long = "silence_window")]
    silence_window: Option<String>,

    /// Spacing between silence-detection frames, in ms.
    #[arg(long = "silence_spacing")]
    silence_spacing: Option<String>,

    /// Silence-detection strategy (only fVAD is recognized).
    #[arg(long = "silence_strategy")]
    silence_strategy: Option<String>,

    /// Voice-activity-detection aggressiveness, 0 through 3.
    #[arg(long = "silence_mode", default_value_t = 3)]
    silence_mode: i32,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let (samples, info) = read_audio_file(&args.input)?;
    if args.verbose {
        println!(
            "read {} frames at {} Hz from {}",
            info.frames,
            info.samplerate,
            args.input.display()
        );
    }

    let settings = Settings {
        prefix: args.prefix,
        pitch_window: args.pitch_window,
        pitch_padded: args.pitch_padded,
        pitch_spacing: args.pitch_spacing,
        pitch_strategy: args.pitch_strategy,
        silence_window: args.silence_window,
        silence_spacing: args.silence_spacing,
        silence_strategy: args.silence_strategy,
        silence_mode: args.silence_mode,
        tuning: args.tuning,
        verbose: args.verbose,
    };
    let config = Config::from_settings(&settings, info)?;

    let mut out = BufWriter::new(File::create(&args.output)?);
    extract_melody(&samples, info, &config, None, &mut out)?;

    if args.verbose {
        println!("midi written to {}", args.output.display());
    }
    Ok(())
}
