use crate::audio::AudioData;
use crate::error::{Error, Result};
use crate::logging::log_trace;
use crate::progress::CancellationToken;
use crate::stretch::{validate_request, StretchBackend, Stretcher};
use async_trait::async_trait;
use rustfft::{num_complex::Complex, FftPlanner};
use std::f64::consts::PI;

/// Размер окна анализа по умолчанию
pub const DEFAULT_FRAME_SIZE: usize = 2048;

/// Минимально допустимый размер окна
const MIN_FRAME_SIZE: usize = 256;

/// Как часто (в кадрах) проверяется отмена
const CANCEL_CHECK_INTERVAL: usize = 64;

/// Растяжение во времени фазовым вокодером
///
/// STFT с окном Ханна, синтезирующий шаг равен четверти окна,
/// анализирующий шаг равен синтезирующему, деленному на коэффициент.
/// Фаза каждого бина продолжается по мгновенной частоте, поэтому
/// высота тона сохраняется как при растяжении, так и при сжатии.
#[derive(Debug, Clone)]
pub struct PhaseVocoderStretcher {
    frame_size: usize,
}

impl Default for PhaseVocoderStretcher {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_SIZE)
    }
}

impl PhaseVocoderStretcher {
    /// Создает вокодер с заданным размером окна (округляется до степени двойки)
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(MIN_FRAME_SIZE).next_power_of_two();
        Self { frame_size }
    }

    /// Размер окна анализа
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Синхронная версия растяжения для пула блокирующих задач
    pub fn stretch_blocking(
        &self,
        audio: &AudioData,
        target_duration: f64,
        cancel: &CancellationToken,
    ) -> Result<AudioData> {
        let out_len = validate_request(audio, target_duration)?;
        let in_len = audio.len();

        if out_len == in_len {
            return Ok(audio.clone());
        }

        let n = self.frame_size;
        let half = n / 2;
        let hop_s = n / 4;
        let alpha = out_len as f64 / in_len as f64;

        log_trace(&format!(
            "Фазовый вокодер: {} -> {} сэмплов (коэффициент {:.4}, окно {})",
            in_len, out_len, alpha, n
        ));

        // Окно Ханна (периодическое)
        let window: Vec<f64> = (0..n)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos())
            .collect();

        let mut padded = vec![0.0f64; half + in_len + n];
        for (dst, &src) in padded[half..half + in_len].iter_mut().zip(audio.samples.iter()) {
            *dst = src as f64;
        }

        let frames = (out_len + n) / hop_s + 1;
        let out_padded_len = (frames - 1) * hop_s + n;
        let mut output = vec![0.0f64; out_padded_len];
        let mut window_sum = vec![0.0f64; out_padded_len];

        let mut planner = FftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(n);
        let inverse = planner.plan_fft_inverse(n);

        let bins = half + 1;
        let bin_freq: Vec<f64> = (0..bins).map(|b| 2.0 * PI * b as f64 / n as f64).collect();
        let mut prev_phase = vec![0.0f64; bins];
        let mut synth_phase = vec![0.0f64; bins];
        let mut prev_pos = 0usize;
        let mut buffer = vec![Complex::new(0.0f64, 0.0); n];

        for k in 0..frames {
            if k % CANCEL_CHECK_INTERVAL == 0 {
                cancel.check()?;
            }

            let pos = (k as f64 * hop_s as f64 / alpha).round() as usize;

            for (i, slot) in buffer.iter_mut().enumerate() {
                let sample = padded.get(pos + i).copied().unwrap_or(0.0);
                *slot = Complex::new(sample * window[i], 0.0);
            }
            forward.process(&mut buffer);

            let hop_a = pos.saturating_sub(prev_pos);
            for b in 0..bins {
                let (magnitude, phase) = buffer[b].to_polar();

                if k == 0 {
                    synth_phase[b] = phase;
                } else {
                    let inst_freq = if hop_a == 0 {
                        bin_freq[b]
                    } else {
                        let expected = bin_freq[b] * hop_a as f64;
                        let deviation = wrap_phase(phase - prev_phase[b] - expected);
                        bin_freq[b] + deviation / hop_a as f64
                    };
                    synth_phase[b] = wrap_phase(synth_phase[b] + inst_freq * hop_s as f64);
                }
                prev_phase[b] = phase;
                buffer[b] = Complex::from_polar(magnitude, synth_phase[b]);
            }
            // Вещественный сигнал: верхняя половина спектра сопряжена нижней
            for b in bins..n {
                buffer[b] = buffer[n - b].conj();
            }
            prev_pos = pos;

            inverse.process(&mut buffer);

            let offset = k * hop_s;
            for i in 0..n {
                let w = window[i];
                output[offset + i] += buffer[i].re / n as f64 * w;
                window_sum[offset + i] += w * w;
            }
        }

        let samples = output[half..half + out_len]
            .iter()
            .zip(&window_sum[half..half + out_len])
            .map(|(&value, &norm)| if norm > 1e-6 { (value / norm) as f32 } else { 0.0 })
            .collect();

        Ok(AudioData::new(samples, audio.sample_rate))
    }
}

/// Приводит фазу к диапазону [-pi, pi]
fn wrap_phase(phase: f64) -> f64 {
    phase - 2.0 * PI * ((phase + PI) / (2.0 * PI)).floor()
}

#[async_trait]
impl Stretcher for PhaseVocoderStretcher {
    fn backend(&self) -> StretchBackend {
        StretchBackend::PhaseVocoder
    }

    async fn stretch(
        &self,
        audio: &AudioData,
        target_duration: f64,
        cancel: &CancellationToken,
    ) -> Result<AudioData> {
        let out_len = validate_request(audio, target_duration)?;
        if out_len == audio.len() {
            return Ok(audio.clone());
        }

        let vocoder = self.clone();
        let audio = audio.clone();
        let cancel = cancel.clone();

        tokio::task::spawn_blocking(move || vocoder.stretch_blocking(&audio, target_duration, &cancel))
            .await
            .map_err(|e| Error::AudioProcessing(format!("Задача фазового вокодера прервана: {}", e)))?
    }
}
