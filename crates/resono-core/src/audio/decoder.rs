//! Per-format audio decoders.

use std::path::Path;

use super::{resample_to_target, AudioFormat};
use crate::error::EngineError;
use crate::spectrogram::SAMPLE_RATE;

/// Decoded audio, already mono at the requested rate when returned from
/// [`decode_audio`].
#[derive(Debug, Clone)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_ms: u32,
}

impl AudioData {
    /// Downmix to mono by averaging interleaved channels.
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }
        let mut mono = Vec::with_capacity(self.samples.len() / self.channels as usize);
        for frame in self.samples.chunks(self.channels as usize) {
            mono.push(frame.iter().sum::<f32>() / frame.len() as f32);
        }
        mono
    }
}

/// Decode an audio file to mono f32 at `target_rate`.
///
/// The default `target_rate` for the pipeline is [`SAMPLE_RATE`]; the
/// parameter exists so the resampler can be exercised independently.
pub fn decode_audio(path: &Path, target_rate: u32) -> Result<AudioData, EngineError> {
    if !path.exists() {
        return Err(EngineError::DecodeFailed(format!(
            "audio file not found: {}",
            path.display()
        )));
    }

    let mut audio = match AudioFormat::from_path(path) {
        AudioFormat::Wav => decode_wav(path)?,
        AudioFormat::Mp3 => decode_mp3(path)?,
        AudioFormat::Flac => decode_flac(path)?,
        AudioFormat::Ogg => decode_ogg(path)?,
        AudioFormat::Unknown => {
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("<none>");
            return Err(EngineError::UnsupportedFormat(ext.to_string()));
        }
    };

    if audio.samples.is_empty() || audio.channels == 0 {
        return Err(EngineError::NoAudioStream);
    }

    if audio.channels > 1 {
        audio.samples = audio.to_mono();
        audio.channels = 1;
    }
    if audio.sample_rate != target_rate {
        audio.samples = resample_to_target(&audio.samples, audio.sample_rate, target_rate);
        audio.sample_rate = target_rate;
    }

    Ok(audio)
}

/// Decode straight to pipeline-rate mono samples.
pub fn decode_pipeline_input(path: &Path) -> Result<AudioData, EngineError> {
    decode_audio(path, SAMPLE_RATE)
}

fn duration_ms(sample_count: usize, sample_rate: u32, channels: u16) -> u32 {
    if sample_rate == 0 || channels == 0 {
        return 0;
    }
    (sample_count as f64 / (sample_rate as f64 * channels as f64) * 1000.0) as u32
}

fn decode_wav(path: &Path) -> Result<AudioData, EngineError> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| EngineError::DecodeFailed(format!("wav: {e}")))?;

    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| EngineError::DecodeFailed(format!("wav: {e}")))?,
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| EngineError::DecodeFailed(format!("wav: {e}")))?
        }
    };

    Ok(AudioData {
        duration_ms: duration_ms(samples.len(), spec.sample_rate, spec.channels),
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

fn decode_mp3(path: &Path) -> Result<AudioData, EngineError> {
    let data = std::fs::read(path).map_err(|e| EngineError::DecodeFailed(format!("mp3: {e}")))?;

    let mut decoder = minimp3::Decoder::new(&data[..]);
    let mut samples = Vec::new();
    let mut sample_rate = 0u32;
    let mut channels = 0u16;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if sample_rate == 0 {
                    sample_rate = frame.sample_rate as u32;
                    channels = frame.channels as u16;
                }
                samples.extend(frame.data.iter().map(|&s| s as f32 / 32768.0));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(EngineError::DecodeFailed(format!("mp3: {e}"))),
        }
    }

    if sample_rate == 0 {
        return Err(EngineError::NoAudioStream);
    }

    Ok(AudioData {
        duration_ms: duration_ms(samples.len(), sample_rate, channels),
        samples,
        sample_rate,
        channels,
    })
}

fn decode_flac(path: &Path) -> Result<AudioData, EngineError> {
    let mut reader = claxon::FlacReader::open(path)
        .map_err(|e| EngineError::DecodeFailed(format!("flac: {e}")))?;

    let info = reader.streaminfo();
    let sample_rate = info.sample_rate;
    let channels = info.channels as u16;
    let max_val = (1i64 << (info.bits_per_sample - 1)) as f32;

    let samples: Vec<f32> = reader
        .samples()
        .map(|s| s.map(|v| v as f32 / max_val))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| EngineError::DecodeFailed(format!("flac: {e}")))?;

    Ok(AudioData {
        duration_ms: duration_ms(samples.len(), sample_rate, channels),
        samples,
        sample_rate,
        channels,
    })
}

fn decode_ogg(path: &Path) -> Result<AudioData, EngineError> {
    let file =
        std::fs::File::open(path).map_err(|e| EngineError::DecodeFailed(format!("ogg: {e}")))?;

    let mut reader = lewton::inside_ogg::OggStreamReader::new(file)
        .map_err(|e| EngineError::DecodeFailed(format!("ogg: {e}")))?;

    let sample_rate = reader.ident_hdr.audio_sample_rate;
    let channels = reader.ident_hdr.audio_channels as u16;

    let mut samples = Vec::new();
    while let Some(packet) = reader
        .read_dec_packet_itl()
        .map_err(|e| EngineError::DecodeFailed(format!("ogg: {e}")))?
    {
        samples.extend(packet.iter().map(|&s| s as f32 / 32768.0));
    }

    Ok(AudioData {
        duration_ms: duration_ms(samples.len(), sample_rate, channels),
        samples,
        sample_rate,
        channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_wav(name: &str, spec: hound::WavSpec, frames: &[(f32, f32)]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for &(l, r) in frames {
            writer.write_sample(l).unwrap();
            if spec.channels == 2 {
                writer.write_sample(r).unwrap();
            }
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn wav_roundtrip_downmixes_to_mono() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22050,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let frames: Vec<(f32, f32)> = (0..2048).map(|i| (i as f32 / 4096.0, 0.0)).collect();
        let path = temp_wav("resono_decode_stereo.wav", spec, &frames);

        let audio = decode_audio(&path, 22050).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(audio.channels, 1);
        assert_eq!(audio.sample_rate, 22050);
        assert_eq!(audio.samples.len(), 2048);
        // Stereo average of (x, 0.0) is x / 2.
        assert!((audio.samples[1000] - 1000.0 / 4096.0 / 2.0).abs() < 1e-6);
    }

    #[test]
    fn wav_is_resampled_to_the_target_rate() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let frames: Vec<(f32, f32)> = (0..44100).map(|i| ((i % 7) as f32 / 7.0, 0.0)).collect();
        let path = temp_wav("resono_decode_44k.wav", spec, &frames);

        let audio = decode_audio(&path, SAMPLE_RATE).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(audio.sample_rate, SAMPLE_RATE);
        assert!((audio.samples.len() as i64 - SAMPLE_RATE as i64).abs() <= 1);
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let path = std::env::temp_dir().join("resono_decode_bogus.xyz");
        std::fs::write(&path, b"not audio").unwrap();
        let result = decode_audio(&path, SAMPLE_RATE);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(EngineError::UnsupportedFormat(_))));
    }

    #[test]
    fn missing_file_is_decode_failed() {
        let result = decode_audio(Path::new("/nonexistent/clip.wav"), SAMPLE_RATE);
        assert!(matches!(result, Err(EngineError::DecodeFailed(_))));
    }
}
