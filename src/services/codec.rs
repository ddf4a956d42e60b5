use std::fs::File;
use std::io::{self, Cursor, Seek, Write};
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::models::audio::AudioBuffer;

/// Decode an audio file into planar `f32` samples.
///
/// WAV goes through `hound` directly; every other container is probed with
/// symphonia using the file extension as a hint.
pub fn decode_file(path: &Path) -> Result<AudioBuffer, CodecError> {
    let is_wav = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("wav"))
        .unwrap_or(false);

    let buffer = if is_wav {
        read_wav(path)?
    } else {
        decode_with_symphonia(path)?
    };

    if buffer.is_empty() || buffer.channel_count() == 0 {
        return Err(CodecError::Empty);
    }

    debug!(
        path = %path.display(),
        channels = buffer.channel_count(),
        sample_rate = buffer.sample_rate(),
        frames = buffer.frames(),
        "Decoded audio"
    );
    Ok(buffer)
}

/// Read a WAV file, normalising integer samples to [-1, 1].
pub fn read_wav(path: &Path) -> Result<AudioBuffer, CodecError> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok(AudioBuffer::from_interleaved(
        &samples,
        spec.channels as usize,
        spec.sample_rate,
    ))
}

/// Write a buffer as a 32-bit float WAV file.
pub fn write_wav(path: &Path, audio: &AudioBuffer) -> Result<(), CodecError> {
    let file = io::BufWriter::new(File::create(path)?);
    write_wav_to(file, audio)
}

/// Encode a buffer as 32-bit float WAV bytes.
pub fn encode_wav(audio: &AudioBuffer) -> Result<Vec<u8>, CodecError> {
    let mut bytes = Vec::new();
    write_wav_to(Cursor::new(&mut bytes), audio)?;
    Ok(bytes)
}

fn write_wav_to<W: Write + Seek>(sink: W, audio: &AudioBuffer) -> Result<(), CodecError> {
    let channels = u16::try_from(audio.channel_count()).map_err(|_| CodecError::TooManyChannels)?;
    let spec = hound::WavSpec {
        channels,
        sample_rate: audio.sample_rate(),
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::new(sink, spec)?;
    for sample in audio.interleaved() {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

fn decode_with_symphonia(path: &Path) -> Result<AudioBuffer, CodecError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(CodecError::NoTrack)?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut channels: Vec<Vec<f32>> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(reason)) => {
                warn!(path = %path.display(), reason, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let channel_count = spec.channels.count();
        if channel_count == 0 {
            continue;
        }
        sample_rate.get_or_insert(spec.rate);

        let mut samples = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        samples.copy_interleaved_ref(decoded);
        append_interleaved(&mut channels, samples.samples(), channel_count)?;
    }

    let sample_rate = sample_rate.ok_or(CodecError::UnknownSampleRate)?;
    Ok(AudioBuffer::new(channels, sample_rate))
}

/// Split interleaved samples into per-channel buffers. The layout is fixed by
/// the first packet.
fn append_interleaved(
    channels: &mut Vec<Vec<f32>>,
    samples: &[f32],
    channel_count: usize,
) -> Result<(), CodecError> {
    if channels.is_empty() {
        *channels = vec![Vec::new(); channel_count];
    } else if channels.len() != channel_count {
        return Err(CodecError::ChannelLayoutChanged {
            expected: channels.len(),
            found: channel_count,
        });
    }
    for (i, sample) in samples.iter().enumerate() {
        channels[i % channel_count].push(*sample);
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Unsupported or corrupt audio: {0}")]
    Symphonia(#[from] SymphoniaError),

    #[error("No decodable audio track found")]
    NoTrack,

    #[error("Audio stream does not declare a sample rate")]
    UnknownSampleRate,

    #[error("Audio contains no samples")]
    Empty,

    #[error("Too many channels for WAV output")]
    TooManyChannels,

    #[error("Channel count changed mid-stream from {expected} to {found}")]
    ChannelLayoutChanged { expected: usize, found: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_pcm16(path: &Path, channels: u16, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames * channels as usize {
            writer.write_sample(if i % 2 == 0 { 16_384i16 } else { -16_384 }).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_decode_pcm16_wav_normalises() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mix.WAV");
        write_pcm16(&path, 2, 400);

        let buffer = decode_file(&path).unwrap();
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.frames(), 400);
        assert_eq!(buffer.sample_rate(), 8_000);
        assert!((buffer.channels()[0][0] - 0.5).abs() < 1e-6);
        assert!((buffer.channels()[1][0] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_empty_wav_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silence.wav");
        write_pcm16(&path, 1, 0);
        assert!(matches!(decode_file(&path), Err(CodecError::Empty)));
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-audio.mp3");
        std::fs::write(&path, b"definitely not an mp3 stream").unwrap();
        assert!(decode_file(&path).is_err());
    }

    #[test]
    fn test_encoded_stem_is_float_wav() {
        let buffer = AudioBuffer::new(vec![vec![0.25; 100], vec![-0.25; 100]], 44_100);
        let bytes = encode_wav(&buffer).unwrap();
        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_format, hound::SampleFormat::Float);
        assert_eq!(spec.channels, 2);
        assert_eq!(reader.duration(), 100);
    }

    #[test]
    fn test_channel_count_change_mid_stream_is_an_error() {
        let mut channels = Vec::new();
        append_interleaved(&mut channels, &[0.1, -0.1, 0.2, -0.2], 2).unwrap();
        assert_eq!(channels, vec![vec![0.1, 0.2], vec![-0.1, -0.2]]);

        let err = append_interleaved(&mut channels, &[0.3, 0.4, 0.5, 0.6, 0.7, 0.8], 6)
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::ChannelLayoutChanged {
                expected: 2,
                found: 6
            }
        ));
        assert_eq!(channels[0].len(), 2);
    }
}
