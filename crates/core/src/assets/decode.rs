use std::io::{Cursor, ErrorKind};

use symphonia::core::{
    audio::SampleBuffer,
    codecs::DecoderOptions,
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};
use symphonia::default::{get_codecs, get_probe};

use super::DecodedAsset;
use crate::{MixerError, Result};

/// Decodes a complete audio file into a mono buffer at `target_rate`.
///
/// `location` only feeds the container hint; the format is detected from
/// the bytes either way.
pub fn decode_audio(bytes: Vec<u8>, location: &str, target_rate: u32) -> Result<DecodedAsset> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = std::path::Path::new(location)
        .extension()
        .and_then(|ext| ext.to_str())
    {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(decode_error)?;
    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| MixerError::Decode("no default track".to_string()))?;
    let track_id = track.id;
    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(decode_error)?;
    let mut source_rate = track.codec_params.sample_rate;

    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut mono = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err)) if err.kind() == ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(err) => return Err(decode_error(err)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(reason)) => {
                tracing::debug!(location, reason, "skipping corrupt packet");
                continue;
            }
            Err(err) => return Err(decode_error(err)),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        source_rate.get_or_insert(spec.rate);
        let capacity = decoded.capacity() as u64;
        let buf = sample_buf.get_or_insert_with(|| SampleBuffer::<f32>::new(capacity, spec));
        buf.copy_interleaved_ref(decoded);

        for frame in buf.samples().chunks(channels) {
            let sum: f32 = frame.iter().copied().sum();
            mono.push(sum / channels as f32);
        }
    }

    if mono.is_empty() {
        return Err(MixerError::Decode("stream contained no audio frames".to_string()));
    }
    let source_rate =
        source_rate.ok_or_else(|| MixerError::Decode("unknown sample rate".to_string()))?;

    Ok(DecodedAsset::new(
        resample_linear(&mono, source_rate, target_rate),
        target_rate,
    ))
}

fn decode_error(err: SymphoniaError) -> MixerError {
    MixerError::Decode(err.to_string())
}

fn resample_linear(input: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || input.is_empty() || src_rate == 0 {
        return input.to_vec();
    }

    let ratio = src_rate as f64 / dst_rate as f64;
    let n_out = ((input.len() as f64) / ratio).round() as usize;
    let mut out = Vec::with_capacity(n_out);
    for i in 0..n_out {
        let pos = i as f64 * ratio;
        let idx = pos.floor() as usize;
        let frac = (pos - idx as f64) as f32;
        let x0 = input[idx.min(input.len() - 1)];
        let x1 = input.get(idx + 1).copied().unwrap_or(x0);
        out.push(x0 + (x1 - x0) * frac);
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a 16-bit PCM WAV file in memory.
    pub(crate) fn wav_bytes(samples: &[f32], channels: u16, sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &sample in samples {
                writer
                    .write_sample((sample * i16::MAX as f32) as i16)
                    .unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn decodes_mono_wav() {
        let bytes = wav_bytes(&[0.5; 4_000], 1, 8_000);
        let asset = decode_audio(bytes, "tone.wav", 8_000).unwrap();

        assert_eq!(asset.sample_rate(), 8_000);
        assert_eq!(asset.frames(), 4_000);
        assert!(asset.samples().iter().all(|s| (s - 0.5).abs() < 1e-3));
    }

    #[test]
    fn downmixes_stereo() {
        let interleaved: Vec<f32> = (0..200).map(|i| if i % 2 == 0 { 0.5 } else { 0.0 }).collect();
        let bytes = wav_bytes(&interleaved, 2, 8_000);
        let asset = decode_audio(bytes, "stereo.wav", 8_000).unwrap();

        assert_eq!(asset.frames(), 100);
        assert!(asset.samples().iter().all(|s| (s - 0.25).abs() < 1e-3));
    }

    #[test]
    fn resamples_to_engine_rate() {
        let bytes = wav_bytes(&[0.25; 4_000], 1, 8_000);
        let asset = decode_audio(bytes, "tone.wav", 16_000).unwrap();

        assert_eq!(asset.sample_rate(), 16_000);
        assert_eq!(asset.frames(), 8_000);
    }

    #[test]
    fn rejects_garbage() {
        let err = decode_audio(b"definitely not audio".to_vec(), "noise.mp3", 8_000).unwrap_err();
        assert!(matches!(err, MixerError::Decode(_)));
    }

    #[test]
    fn linear_resampling_interpolates() {
        let out = resample_linear(&[0.0, 1.0], 1, 2);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], 0.0);
        assert!((out[1] - 0.5).abs() < 1e-6);
        assert_eq!(out[2], 1.0);
    }
}
