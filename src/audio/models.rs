use crate::error::{Error, ErrorType, Result};
use crate::logging::{log_debug, log_trace};
use rubato::{FftFixedIn, Resampler};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Размер входного блока для FFT-ресемплера
const RESAMPLE_CHUNK: usize = 1024;

/// Качество ресемплинга сегментов к общей частоте
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleQuality {
    /// FFT-ресемплер rubato (высокое качество)
    Fft,
    /// Линейная интерполяция (быстро, для черновой сборки)
    Linear,
}

impl Default for ResampleQuality {
    fn default() -> Self {
        Self::Fft
    }
}

/// Аудио данные (моно)
#[derive(Debug, Clone, PartialEq)]
pub struct AudioData {
    /// Аудио сэмплы
    pub samples: Vec<f32>,
    /// Частота дискретизации
    pub sample_rate: u32,
}

impl AudioData {
    /// Создает новые аудио данные
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Создает тишину заданной длины в сэмплах
    pub fn silence(len: usize, sample_rate: u32) -> Self {
        Self::new(vec![0.0; len], sample_rate)
    }

    /// Возвращает длительность аудио в секундах
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Возвращает количество сэмплов
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Проверяет, пусты ли аудио данные
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Проверяет, что данные пригодны для растяжения
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::new(ErrorType::InvalidStretchInput, "нулевая частота дискретизации"));
        }
        if self.samples.is_empty() {
            return Err(Error::new(ErrorType::InvalidStretchInput, "пустой сигнал"));
        }
        if let Some(pos) = self.samples.iter().position(|s| !s.is_finite()) {
            return Err(Error::InvalidStretchInput(format!(
                "нечисловое значение сэмпла в позиции {}",
                pos
            )));
        }
        Ok(())
    }

    /// Приводит длину к `len` сэмплам: обрезает хвост или дополняет тишиной
    pub fn fit_to_length(mut self, len: usize) -> Self {
        self.samples.resize(len, 0.0);
        self
    }

    /// Изменяет частоту дискретизации аудио
    pub fn resample(&self, new_sample_rate: u32, quality: ResampleQuality) -> Result<Self> {
        if self.sample_rate == new_sample_rate {
            return Ok(self.clone());
        }
        if new_sample_rate == 0 || self.sample_rate == 0 {
            return Err(Error::new(ErrorType::Resampling, "нулевая частота дискретизации"));
        }
        if self.is_empty() {
            return Ok(Self::new(Vec::new(), new_sample_rate));
        }

        let expected = (self.samples.len() as f64 * new_sample_rate as f64 / self.sample_rate as f64)
            .round() as usize;

        log_debug(&format!(
            "Ресемплинг {} сэмплов: {} Гц -> {} Гц ({:?})",
            self.samples.len(), self.sample_rate, new_sample_rate, quality
        ));

        let samples = match quality {
            ResampleQuality::Linear => self.resample_linear(expected),
            ResampleQuality::Fft => self.resample_fft(new_sample_rate, expected)?,
        };

        Ok(Self::new(samples, new_sample_rate))
    }

    fn resample_linear(&self, expected: usize) -> Vec<f32> {
        let step = self.samples.len() as f64 / expected.max(1) as f64;
        let last = self.samples.len() - 1;

        (0..expected)
            .map(|i| {
                let pos = i as f64 * step;
                let index = (pos.floor() as usize).min(last);
                let fraction = (pos - index as f64) as f32;
                if index < last {
                    self.samples[index] * (1.0 - fraction) + self.samples[index + 1] * fraction
                } else {
                    self.samples[last]
                }
            })
            .collect()
    }

    fn resample_fft(&self, new_sample_rate: u32, expected: usize) -> Result<Vec<f32>> {
        let mut resampler = FftFixedIn::<f32>::new(
            self.sample_rate as usize,
            new_sample_rate as usize,
            RESAMPLE_CHUNK,
            2,
            1,
        )
        .map_err(|e| Error::Resampling(format!("не удалось создать ресемплер: {}", e)))?;

        let delay = resampler.output_delay();
        let mut output = Vec::with_capacity(expected + delay + RESAMPLE_CHUNK);
        let mut pos = 0;

        while pos + RESAMPLE_CHUNK <= self.samples.len() {
            let chunk = [&self.samples[pos..pos + RESAMPLE_CHUNK]];
            let out = resampler
                .process(&chunk[..], None)
                .map_err(|e| Error::Resampling(e.to_string()))?;
            output.extend_from_slice(&out[0]);
            pos += RESAMPLE_CHUNK;
        }

        if pos < self.samples.len() {
            let chunk = [&self.samples[pos..]];
            let out = resampler
                .process_partial(Some(&chunk[..]), None)
                .map_err(|e| Error::Resampling(e.to_string()))?;
            output.extend_from_slice(&out[0]);
        }

        // Выталкиваем задержку фильтра
        while output.len() < expected + delay {
            let out = resampler
                .process_partial(None::<&[&[f32]]>, None)
                .map_err(|e| Error::Resampling(e.to_string()))?;
            if out[0].is_empty() {
                break;
            }
            output.extend_from_slice(&out[0]);
        }

        log_trace(&format!("Задержка ресемплера: {} сэмплов", delay));

        output.drain(..delay.min(output.len()));
        output.resize(expected, 0.0);
        Ok(output)
    }

    /// Сохраняет аудио данные в WAV файл (32-bit float)
    pub fn write_wav<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        crate::audio::utils::encode_wav(&self.samples, self.sample_rate, path)
    }

    /// Загружает аудио данные из WAV файла
    pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        crate::audio::utils::decode_audio_bytes(bytes, Some("wav"))
    }
}
