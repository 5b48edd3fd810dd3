use crate::error::{Error, Result};
use crate::audio::models::AudioData;
use rustfft::{num_complex::Complex, FftPlanner};

/// Размер окна для оценки спектрального центроида
const CENTROID_FRAME: usize = 2048;

/// Анализатор аудио
pub struct AudioAnalyzer;

impl AudioAnalyzer {
    /// Анализирует аудио данные и возвращает информацию о них
    pub fn analyze(audio: &AudioData) -> Result<AudioAnalysis> {
        if audio.is_empty() {
            return Err(Error::AudioProcessing("нельзя анализировать пустой сигнал".to_string()));
        }

        Ok(AudioAnalysis {
            duration: audio.duration(),
            rms: Self::rms(&audio.samples),
            peak: Self::peak(&audio.samples),
            spectral_centroid: Self::spectral_centroid(audio),
        })
    }

    /// Вычисляет RMS (Root Mean Square) для аудио сэмплов
    pub fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }

        let sum_squares: f32 = samples.iter().map(|&s| s * s).sum();
        (sum_squares / samples.len() as f32).sqrt()
    }

    /// Находит максимальную амплитуду
    pub fn peak(samples: &[f32]) -> f32 {
        samples.iter().fold(0.0, |max, &s| max.max(s.abs()))
    }

    /// Спектральный центроид в Гц, усредненный по окнам Ханна
    ///
    /// Для тишины возвращает 0.
    pub fn spectral_centroid(audio: &AudioData) -> f32 {
        if audio.is_empty() || audio.sample_rate == 0 {
            return 0.0;
        }

        let frame = CENTROID_FRAME.min(audio.len().next_power_of_two());
        let hop = frame / 2;
        let window: Vec<f32> = (0..frame)
            .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / frame as f32).cos())
            .collect();

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(frame);
        let bin_hz = audio.sample_rate as f32 / frame as f32;

        let mut weighted = 0.0f64;
        let mut total = 0.0f64;
        let mut buffer = vec![Complex::new(0.0f32, 0.0); frame];
        let mut pos = 0;

        loop {
            for (i, slot) in buffer.iter_mut().enumerate() {
                let sample = audio.samples.get(pos + i).copied().unwrap_or(0.0);
                *slot = Complex::new(sample * window[i], 0.0);
            }
            fft.process(&mut buffer);

            for (bin, value) in buffer.iter().take(frame / 2 + 1).enumerate() {
                let magnitude = value.norm() as f64;
                weighted += magnitude * (bin as f32 * bin_hz) as f64;
                total += magnitude;
            }

            pos += hop;
            if pos + frame > audio.len() {
                break;
            }
        }

        if total <= f64::EPSILON {
            0.0
        } else {
            (weighted / total) as f32
        }
    }

    /// Сходство спектральных центроидов двух сигналов (1.0 = совпадают)
    pub fn centroid_similarity(a: &AudioData, b: &AudioData) -> f32 {
        let ca = Self::spectral_centroid(a);
        let cb = Self::spectral_centroid(b);
        let max = ca.max(cb);
        if max <= f32::EPSILON {
            return 1.0;
        }
        ca.min(cb) / max
    }
}

/// Результат анализа аудио
#[derive(Debug, Clone)]
pub struct AudioAnalysis {
    /// Длительность аудио в секундах
    pub duration: f64,
    /// RMS - мера громкости
    pub rms: f32,
    /// Максимальная амплитуда
    pub peak: f32,
    /// Спектральный центроид в Гц
    pub spectral_centroid: f32,
}
