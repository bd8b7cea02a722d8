//! Base types: audio descriptor, the error enumeration, result alias.

/// Global result type.
pub type Res<T> = Result<T, Error>;

/// Global void type.
pub type Void = Res<()>;

/// Immutable descriptor of a decoded mono audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioInfo {
    /// Number of sample frames in the stream.
    pub frames: i64,
    /// Sampling rate in Hz.
    pub samplerate: i32,
}

/// Every failure the pipeline can surface.
///
/// Callees return one of these kinds instead of a sentinel value; callers
/// propagate unknown kinds verbatim.  The orchestrator renders the message
/// on exit.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// An argument that must be positive was zero or negative.
    #[error("{0} must be positive")]
    NonPositiveArg(&'static str),

    /// The resampled length does not fit the representable range.
    #[error("resampling ratio produces an unrepresentable length")]
    BadSampleRatio,

    /// The resampler backend reported a failure.
    #[error("resampler error: {0}")]
    ResampleFailed(String),

    /// The input audio holds more than one channel.
    #[error("input audio must be mono (found {0} channels)")]
    FileNotMono(usize),

    /// The input audio could not be decoded.
    #[error("unable to read audio file: {0}")]
    AudioRead(String),

    /// The input audio holds no samples.
    #[error("audio stream is empty")]
    EmptyAudio,

    /// A settings value failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The transient detection function is identically zero.
    #[error("detection function is identically zero")]
    AllNullDetFunc,

    /// No onset/offset kernel fits the detection function at some position.
    #[error("no kernel fits the detection function")]
    BadKernelFit,

    /// Transient segmentation produced no onset/offset pairs.
    #[error("no transients were detected")]
    NoTransients,

    /// Activity ranges were supplied but empty.
    #[error("no activity was detected")]
    NoActivity,

    /// A note frequency mapped to a non-finite MIDI number.
    #[error("note frequency produced a non-finite MIDI number")]
    NonFiniteNote,

    /// MIDI timing parameters must all be nonzero.
    #[error("bpm, division, and samplerate must all be nonzero")]
    BadMidiTiming,

    /// A bounded dynamic list hit its declared maximum capacity.
    #[error("bounded list exceeded its maximum capacity")]
    CapacityExceeded,

    /// The correntropy kernel requires a 16-byte-aligned input buffer.
    #[error("correntropy input buffer must be 16-byte aligned")]
    MisalignedBuffer,

    /// Correntropy window, lag, and hop must be positive multiples of 4.
    #[error("{0} must be a positive multiple of 4")]
    BadStride(&'static str),

    /// The supplied buffer is shorter than the analysis windows require.
    #[error("detection function length mismatch")]
    DetFuncLengthMismatch,

    /// The filter bank supports a limited number of channels.
    #[error("at most {0} filter channels are supported")]
    TooManyChannels(usize),

    /// The cascaded biquad filter supports a limited number of stages.
    #[error("at most 8 biquad stages are supported")]
    TooManyStages,

    /// BaNa supports a limited number of harmonic peaks.
    #[error("at most {0} harmonic peaks are supported")]
    TooManyPeaks(usize),

    /// An I/O failure while reading input or writing output.
    #[error("i/o error: {0}")]
    Io(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
