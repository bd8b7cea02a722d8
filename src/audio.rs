//! Audio input: WAV decoding to mono `f32` and rational-rate resampling.

use std::path::Path;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::core::base::{AudioInfo, Error, Res};

/// Decodes an audio file into mono `f32` samples in `[-1, 1]`.
///
/// Multichannel input is rejected; the pipeline is strictly monophonic.
pub fn read_audio_file(path: &Path) -> Res<(Vec<f32>, AudioInfo)> {
    let file = std::fs::File::open(path).map_err(|e| Error::AudioRead(e.to_string()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::AudioRead(e.to_string()))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| Error::AudioRead("no audio track found".into()))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let samplerate = codec_params
        .sample_rate
        .ok_or_else(|| Error::AudioRead("missing sample rate".into()))? as i32;
    let channels = codec_params.channels.map(|c| c.count()).unwrap_or(1);
    if channels != 1 {
        return Err(Error::FileNotMono(channels));
    }

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| Error::AudioRead(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(Error::AudioRead(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(_) => continue,
        };
        let spec = *decoded.spec();
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    if samples.is_empty() {
        return Err(Error::EmptyAudio);
    }

    let info = AudioInfo {
        frames: samples.len() as i64,
        samplerate,
    };
    Ok((samples, info))
}

/// Length contract of [`resample`]: `ceil(len * ratio - 1)`.
pub fn resampled_length(len: usize, sample_ratio: f64) -> Res<usize> {
    let result = (len as f64 * sample_ratio - 1.0).ceil();
    if result <= 0.0 || result >= i32::MAX as f64 {
        return Err(Error::BadSampleRatio);
    }
    Ok(result as usize)
}

/// Resamples `input` from `from_rate` to `to_rate` with sinc interpolation.
///
/// The output always holds exactly `resampled_length(input.len(), ratio)`
/// samples; the resampler's own latency is skipped and any shortfall at the
/// tail is zero-filled.
pub fn resample(input: &[f32], from_rate: i32, to_rate: i32) -> Res<Vec<f32>> {
    if from_rate <= 0 || to_rate <= 0 {
        return Err(Error::NonPositiveArg("sample rate"));
    }
    let ratio = to_rate as f64 / from_rate as f64;
    let target = resampled_length(input.len(), ratio)?;

    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };
    let chunk_size = 1024;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, chunk_size, 1)
        .map_err(|e| Error::ResampleFailed(e.to_string()))?;
    let delay = resampler.output_delay();

    let mut produced: Vec<f32> = Vec::with_capacity(target + chunk_size);
    let mut pos = 0;
    while pos + chunk_size <= input.len() {
        let chunk = vec![input[pos..pos + chunk_size].to_vec()];
        let out = resampler
            .process(&chunk, None)
            .map_err(|e| Error::ResampleFailed(e.to_string()))?;
        produced.extend_from_slice(&out[0]);
        pos += chunk_size;
    }
    if pos < input.len() {
        let chunk = vec![input[pos..].to_vec()];
        let out = resampler
            .process_partial(Some(&chunk), None)
            .map_err(|e| Error::ResampleFailed(e.to_string()))?;
        produced.extend_from_slice(&out[0]);
    }
    // drain the sinc filter until the delayed tail is covered
    while produced.len() < delay + target {
        let out = resampler
            .process_partial::<Vec<f32>>(None, None)
            .map_err(|e| Error::ResampleFailed(e.to_string()))?;
        if out[0].is_empty() {
            break;
        }
        produced.extend_from_slice(&out[0]);
    }

    let mut output: Vec<f32> = produced.into_iter().skip(delay).take(target).collect();
    output.resize(target, 0.0);
    Ok(output)
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resampled_length_contract() {
        // ceil(len * ratio - 1)
        assert_eq!(resampled_length(44100, 0.25).unwrap(), 11024);
        assert_eq!(resampled_length(100, 2.0).unwrap(), 199);
    }

    #[test]
    fn test_resampled_length_rejects_degenerate_ratio() {
        assert_eq!(resampled_length(10, 0.0), Err(Error::BadSampleRatio));
        assert_eq!(
            resampled_length(usize::MAX / 2, 4.0),
            Err(Error::BadSampleRatio)
        );
    }

    #[test]
    fn test_resample_output_length() {
        let input = vec![0.25f32; 4410];
        let out = resample(&input, 44100, 11025).unwrap();
        assert_eq!(out.len(), resampled_length(4410, 0.25).unwrap());
    }

    #[test]
    fn test_resample_preserves_dc_level() {
        // a constant signal stays (approximately) constant away from the edges
        let input = vec![0.5f32; 8192];
        let out = resample(&input, 44100, 11025).unwrap();
        let mid = &out[out.len() / 4..3 * out.len() / 4];
        for &v in mid {
            assert!((v - 0.5).abs() < 0.05, "sample drifted: {v}");
        }
    }
}
