use crate::error::{Error, ErrorType, Result};
use crate::audio::models::AudioData;
use crate::logging::{log_debug, log_warning};
use std::io::Cursor;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};

/// Декодирует аудио данные (WAV и другие форматы symphonia) в моно сэмплы
pub fn decode_audio_bytes(data: Vec<u8>, extension: Option<&str>) -> Result<AudioData> {
    log_debug(&format!("Декодирование аудио данных размером {} байт", data.len()));

    if data.is_empty() {
        return Err(Error::new(ErrorType::AudioProcessingError, "Пустые аудио данные"));
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let format_opts = FormatOptions {
        enable_gapless: true,
        ..Default::default()
    };

    let probe_result = get_probe()
        .format(&hint, mss, &format_opts, &MetadataOptions::default())
        .map_err(|e| Error::AudioProcessing(format!("Ошибка определения формата: {}", e)))?;

    let mut format = probe_result.format;

    let track = format
        .default_track()
        .ok_or_else(|| Error::new(ErrorType::AudioProcessingError, "Не найден аудио поток"))?;

    if track.codec_params.codec == CODEC_TYPE_NULL {
        return Err(Error::new(ErrorType::AudioProcessingError, "Поток не является аудио"));
    }

    let track_id = track.id;
    let declared_rate = track.codec_params.sample_rate;
    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| Error::AudioProcessing(format!("Ошибка создания декодера: {}", e)))?;

    let mut all_samples = Vec::new();
    let mut sample_rate = declared_rate.unwrap_or(0);
    let mut channels = 1usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(_))
            | Err(symphonia::core::errors::Error::ResetRequired) => {
                // Конец потока
                break;
            }
            Err(err) => {
                log_warning(&format!("Ошибка чтения пакета: {}, прекращаем чтение", err));
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count().max(1);

                let mut sample_buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                sample_buffer.copy_interleaved_ref(decoded);
                all_samples.extend_from_slice(sample_buffer.samples());
            }
            Err(symphonia::core::errors::Error::DecodeError(err)) => {
                log_warning(&format!("Ошибка декодирования пакета: {}, пропускаем", err));
                continue;
            }
            Err(err) => {
                return Err(Error::AudioProcessing(format!("Ошибка декодера: {}", err)));
            }
        }
    }

    if all_samples.is_empty() {
        return Err(Error::new(ErrorType::AudioProcessingError, "Не получены аудио сэмплы"));
    }
    if sample_rate == 0 {
        return Err(Error::new(ErrorType::AudioProcessingError, "Неизвестная частота дискретизации"));
    }

    log_debug(&format!(
        "Декодировано {} сэмплов, каналов: {}, частота: {} Гц",
        all_samples.len(), channels, sample_rate
    ));

    Ok(AudioData::new(convert_to_mono(&all_samples, channels), sample_rate))
}

/// Записывает моно сэмплы в WAV (32-bit float)
pub fn encode_wav<P: AsRef<Path>>(samples: &[f32], sample_rate: u32, path: P) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(path.as_ref(), spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    log_debug(&format!(
        "Записано {} сэмплов в WAV файл {}",
        samples.len(),
        path.as_ref().display()
    ));
    Ok(())
}

/// Преобразует многоканальное аудио в моно
pub fn convert_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks(channels)
        .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_to_mono() {
        let stereo = vec![1.0, 0.0, 0.5, 0.5, -1.0, 1.0];
        assert_eq!(convert_to_mono(&stereo, 2), vec![0.5, 0.5, 0.0]);
        assert_eq!(convert_to_mono(&stereo, 1), stereo);
    }

    #[test]
    fn test_decode_rejects_empty_input() {
        assert!(decode_audio_bytes(Vec::new(), Some("wav")).is_err());
    }

    #[test]
    fn test_wav_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<f32> = (0..800).map(|i| (i as f32 * 0.05).sin() * 0.25).collect();

        encode_wav(&samples, 16000, &path).unwrap();
        let decoded = AudioData::read_wav(&path).unwrap();

        assert_eq!(decoded.sample_rate, 16000);
        assert_eq!(decoded.len(), samples.len());
        for (a, b) in samples.iter().zip(decoded.samples.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
