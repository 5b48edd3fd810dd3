//! Бэкенды изменения длительности аудио с сохранением высоты тона.

mod phase_vocoder;
mod ffmpeg;

pub use phase_vocoder::PhaseVocoderStretcher;
pub use ffmpeg::FfmpegStretcher;

use crate::audio::AudioData;
use crate::error::{Error, Result};
use crate::logging::{log_info, log_warning};
use crate::progress::CancellationToken;
use crate::SyncOptions;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Реализация растяжения, использованная для сегмента
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StretchBackend {
    /// Встроенный фазовый вокодер
    PhaseVocoder,
    /// Внешний инструмент (ffmpeg atempo)
    Ffmpeg,
}

impl StretchBackend {
    /// Короткое имя для отчетов и логов
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PhaseVocoder => "phase-vocoder",
            Self::Ffmpeg => "ffmpeg",
        }
    }
}

impl std::fmt::Display for StretchBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Предпочтительный бэкенд, выбираемый на старте прогона
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendPreference {
    /// Внешний инструмент, если доступен, иначе фазовый вокодер
    Auto,
    /// Всегда фазовый вокодер
    PhaseVocoder,
    /// Внешний инструмент (при недоступности - фазовый вокодер с предупреждением)
    ExternalTool,
}

impl Default for BackendPreference {
    fn default() -> Self {
        Self::Auto
    }
}

/// Общий контракт растяжения
///
/// Результат имеет длину `round(target_duration * sample_rate)` сэмплов,
/// при коэффициенте 1.0 возвращается исходный сигнал без изменений.
#[async_trait]
pub trait Stretcher: Send + Sync {
    /// Какой бэкенд реализует растяжение
    fn backend(&self) -> StretchBackend;

    /// Растягивает или сжимает сигнал до целевой длительности в секундах
    async fn stretch(
        &self,
        audio: &AudioData,
        target_duration: f64,
        cancel: &CancellationToken,
    ) -> Result<AudioData>;
}

/// Проверяет входные данные и возвращает целевую длину в сэмплах
pub(crate) fn validate_request(audio: &AudioData, target_duration: f64) -> Result<usize> {
    if !target_duration.is_finite() || target_duration <= 0.0 {
        return Err(Error::InvalidStretchInput(format!(
            "целевая длительность должна быть положительной, получено {}",
            target_duration
        )));
    }
    audio.validate()?;
    Ok(target_len(target_duration, audio.sample_rate))
}

/// Длина в сэмплах для длительности в секундах (не меньше одного сэмпла)
pub(crate) fn target_len(target_duration: f64, sample_rate: u32) -> usize {
    ((target_duration * sample_rate as f64).round() as usize).max(1)
}

/// Выбирает бэкенд на весь прогон по результату проверки возможностей
pub async fn select_stretcher(options: &SyncOptions) -> Arc<dyn Stretcher> {
    let vocoder = Arc::new(PhaseVocoderStretcher::new(options.frame_size));

    if options.backend == BackendPreference::PhaseVocoder {
        log_info("Выбран бэкенд растяжения: фазовый вокодер");
        return vocoder;
    }

    let timeout = Duration::from_secs(options.ffmpeg_timeout_secs.max(1));
    match FfmpegStretcher::probe(&options.ffmpeg_path, timeout).await {
        Ok(stretcher) => {
            log_info(&format!(
                "Выбран бэкенд растяжения: ffmpeg {}",
                stretcher.version()
            ));
            Arc::new(stretcher)
        }
        Err(e) => {
            log_warning(&format!(
                "ffmpeg недоступен ({}), весь прогон использует фазовый вокодер",
                e
            ));
            vocoder
        }
    }
}
