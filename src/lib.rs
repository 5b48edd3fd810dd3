pub mod error;
pub mod logging;
pub mod cue;
pub mod audio;
pub mod stretch;
pub mod sync;
pub mod report;
pub mod progress;

pub use error::{Error, Result, ErrorType};
pub use logging::{
    setup_logging, setup_test_logging, log_cue, log_error, log_warning, log_info, log_debug, log_trace
};
pub use cue::Cue;
pub use audio::{AudioData, AudioAnalyzer, AudioAnalysis, ResampleQuality};
pub use stretch::{
    select_stretcher, BackendPreference, FfmpegStretcher, PhaseVocoderStretcher,
    StretchBackend, Stretcher
};
pub use sync::{
    AdjustmentKind, AdjustmentPlan, AssemblyResult, AssemblyStatus, AudioAssembler,
    PlanEntry, Placement, RenderStatus, SyncCore, SyncOutcome, TimingCalculator, TimingMode
};
pub use report::{build_report, render_adjusted_srt, CueReport, Report, ReportGenerator, ReportSummary};
pub use progress::{ProgressTracker, ProgressCallback, ChildProgressTracker, CancellationToken};

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

fn default_log_level() -> log::LevelFilter {
    log::LevelFilter::Info
}

/// Настройки синхронизации аудио с субтитрами
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Общая частота дискретизации выходной дорожки
    pub sample_rate: u32,

    /// Минимальный коэффициент растяжения (сильнее сжимать нельзя)
    pub min_stretch_ratio: f64,

    /// Максимальный коэффициент растяжения
    pub max_stretch_ratio: f64,

    /// Коэффициенты ближе к 1.0, чем этот допуск, считаются 1.0
    pub ratio_tolerance: f64,

    /// Предпочтительный бэкенд растяжения
    pub backend: BackendPreference,

    /// Растягивать под окно или дополнять тишиной
    pub timing_mode: TimingMode,

    /// Перекрытие в сэмплах, которое не считается сдвигом
    pub overlap_tolerance_samples: u32,

    /// Качество ресемплинга сегментов
    pub resample_quality: ResampleQuality,

    /// Путь к ffmpeg
    pub ffmpeg_path: String,

    /// Таймаут одного вызова ffmpeg в секундах
    pub ffmpeg_timeout_secs: u64,

    /// Размер окна фазового вокодера
    pub frame_size: usize,

    /// Число параллельных задач растяжения (0 = число ядер)
    pub workers: usize,

    /// Допустимое расхождение конца субтитра в секундах
    pub deviation_tolerance: f64,

    /// Уровень логирования
    #[serde(skip, default = "default_log_level")]
    pub log_level: log::LevelFilter,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            min_stretch_ratio: 0.5,
            max_stretch_ratio: 2.0,
            ratio_tolerance: 0.01,
            backend: BackendPreference::Auto,
            timing_mode: TimingMode::StretchToFit,
            overlap_tolerance_samples: 1,
            resample_quality: ResampleQuality::Fft,
            ffmpeg_path: "ffmpeg".to_string(),
            ffmpeg_timeout_secs: 30,
            frame_size: 2048,
            workers: 0,
            deviation_tolerance: report::DEFAULT_DEVIATION_TOLERANCE,
            log_level: default_log_level(),
        }
    }
}

impl SyncOptions {
    /// Загружает настройки из JSON строки (отсутствующие поля берутся по умолчанию)
    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("не удалось разобрать настройки: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    /// Загружает настройки из JSON файла
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Проверяет согласованность настроек
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::new(ErrorType::Config, "частота дискретизации должна быть больше нуля"));
        }
        if !(self.min_stretch_ratio.is_finite() && self.max_stretch_ratio.is_finite())
            || self.min_stretch_ratio <= 0.0
            || self.min_stretch_ratio > 1.0
            || self.max_stretch_ratio < 1.0
        {
            return Err(Error::Config(format!(
                "границы коэффициента должны удовлетворять 0 < min <= 1 <= max, получено [{}, {}]",
                self.min_stretch_ratio, self.max_stretch_ratio
            )));
        }
        if !(0.0..0.5).contains(&self.ratio_tolerance) {
            return Err(Error::Config(format!(
                "допуск коэффициента вне диапазона [0, 0.5): {}",
                self.ratio_tolerance
            )));
        }
        if !self.deviation_tolerance.is_finite() || self.deviation_tolerance < 0.0 {
            return Err(Error::Config(format!(
                "некорректный допуск расхождения: {}",
                self.deviation_tolerance
            )));
        }
        if self.ffmpeg_timeout_secs == 0 {
            return Err(Error::new(ErrorType::Config, "таймаут ffmpeg должен быть больше нуля"));
        }
        if self.ffmpeg_path.trim().is_empty() && self.backend != BackendPreference::PhaseVocoder {
            return Err(Error::new(ErrorType::Config, "не задан путь к ffmpeg"));
        }
        if !(256..=65536).contains(&self.frame_size) {
            return Err(Error::Config(format!(
                "размер окна вокодера вне диапазона [256, 65536]: {}",
                self.frame_size
            )));
        }
        Ok(())
    }
}

/// Основной интерфейс синхронизации синтезированной речи с субтитрами
pub struct SubtitleSync {
    options: SyncOptions,
    progress_tracker: ProgressTracker,
    stretcher: Option<Arc<dyn Stretcher>>,
}

impl Default for SubtitleSync {
    fn default() -> Self {
        Self::new(SyncOptions::default())
    }
}

impl SubtitleSync {
    /// Создает новый экземпляр SubtitleSync с заданными настройками
    pub fn new(options: SyncOptions) -> Self {
        #[cfg(test)]
        {
            setup_test_logging(options.log_level);
        }
        #[cfg(not(test))]
        {
            setup_logging(options.log_level);
        }

        log_info(&format!("Создан новый экземпляр SubtitleSync с настройками: {:?}", options));

        Self {
            options,
            progress_tracker: ProgressTracker::new(),
            stretcher: None,
        }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Устанавливает функцию обратного вызова для отслеживания прогресса
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        log_debug("Установлена функция обратного вызова для отслеживания прогресса");
        self.progress_tracker = ProgressTracker::with_callback(callback);
        self
    }

    /// Устанавливает предпочтительный бэкенд растяжения
    pub fn with_backend(mut self, backend: BackendPreference) -> Self {
        log_debug(&format!("Установлен бэкенд растяжения: {:?}", backend));
        self.options.backend = backend;
        self
    }

    /// Устанавливает границы коэффициента растяжения
    pub fn with_stretch_bounds(mut self, min_ratio: f64, max_ratio: f64) -> Self {
        log_debug(&format!("Установлены границы коэффициента: [{}, {}]", min_ratio, max_ratio));
        self.options.min_stretch_ratio = min_ratio;
        self.options.max_stretch_ratio = max_ratio;
        self
    }

    /// Устанавливает режим согласования таймингов
    pub fn with_timing_mode(mut self, mode: TimingMode) -> Self {
        log_debug(&format!("Установлен режим таймингов: {}", mode));
        self.options.timing_mode = mode;
        self
    }

    /// Устанавливает частоту дискретизации выходной дорожки
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        log_debug(&format!("Установлена частота дискретизации: {} Гц", sample_rate));
        self.options.sample_rate = sample_rate;
        self
    }

    /// Использует заданный бэкенд растяжения без проверки возможностей
    pub fn with_stretcher(mut self, stretcher: Arc<dyn Stretcher>) -> Self {
        log_debug(&format!("Установлен бэкенд растяжения: {}", stretcher.backend()));
        self.stretcher = Some(stretcher);
        self
    }

    fn core(&self) -> SyncCore {
        let core = SyncCore::new(self.progress_tracker.clone(), self.options.clone());
        match &self.stretcher {
            Some(stretcher) => core.with_stretcher(stretcher.clone()),
            None => core,
        }
    }

    /// Синхронизирует сегменты с субтитрами в памяти
    pub async fn synchronize(&self, cues: &[Cue], segments: &[AudioData]) -> Result<SyncOutcome> {
        self.synchronize_with_cancel(cues, segments, &CancellationToken::new()).await
    }

    /// Синхронизирует с возможностью отмены; отмена дает частичный результат
    pub async fn synchronize_with_cancel(
        &self,
        cues: &[Cue],
        segments: &[AudioData],
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome> {
        match self.core().synchronize(cues, segments, cancel).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let _ = log_error::<(), _>(&e, "Ошибка при синхронизации");
                Err(e)
            }
        }
    }

    /// Синхронизирует и сохраняет дорожку в WAV файл
    pub async fn synchronize_to_file<P: AsRef<Path>>(
        &self,
        cues: &[Cue],
        segments: &[AudioData],
        output_path: P,
    ) -> Result<SyncOutcome> {
        let core = self.core();
        let outcome = core.synchronize(cues, segments, &CancellationToken::new()).await?;

        match core.save_to_file(&outcome.assembly.audio, output_path.as_ref()).await {
            Ok(()) => {
                log_info(&format!(
                    "Аудио успешно сохранено в файл: {}",
                    output_path.as_ref().display()
                ));
                Ok(outcome)
            }
            Err(e) => {
                let _ = log_error::<(), _>(
                    &e,
                    &format!("Ошибка при сохранении аудио в файл: {}", output_path.as_ref().display()),
                );
                Err(e)
            }
        }
    }
}
