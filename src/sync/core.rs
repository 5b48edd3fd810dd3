use crate::audio::AudioData;
use crate::cue::Cue;
use crate::error::{Error, Result};
use crate::logging::{log_debug, log_error, log_info, log_warning};
use crate::progress::{CancellationToken, ProgressTracker};
use crate::report::{render_adjusted_srt, Report, ReportGenerator};
use crate::stretch::{select_stretcher, PhaseVocoderStretcher, Stretcher};
use crate::sync::assembler::{AssemblyResult, AudioAssembler};
use crate::sync::plan::{AdjustmentPlan, TimingCalculator};
use crate::SyncOptions;
use std::path::Path;
use std::sync::Arc;

/// Результат одного прогона синхронизации
#[derive(Debug)]
pub struct SyncOutcome {
    pub plan: AdjustmentPlan,
    pub assembly: AssemblyResult,
    pub report: Report,
}

impl SyncOutcome {
    /// Субтитры с фактическими таймингами
    pub fn adjusted_srt(&self) -> String {
        render_adjusted_srt(&self.plan, &self.assembly.placements)
    }
}

/// Ядро синхронизации: план, сборка, отчет
pub struct SyncCore {
    /// Трекер прогресса
    progress_tracker: ProgressTracker,
    /// Настройки прогона
    options: SyncOptions,
    /// Заранее выбранный бэкенд (иначе выбирается при каждом прогоне)
    stretcher: Option<Arc<dyn Stretcher>>,
}

impl SyncCore {
    /// Создает новое ядро синхронизации
    pub fn new(progress_tracker: ProgressTracker, options: SyncOptions) -> Self {
        Self {
            progress_tracker,
            options,
            stretcher: None,
        }
    }

    /// Использует заданный бэкенд вместо проверки возможностей
    pub fn with_stretcher(mut self, stretcher: Arc<dyn Stretcher>) -> Self {
        self.stretcher = Some(stretcher);
        self
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Синхронизирует сегменты с таймингами субтитров
    ///
    /// При отмене возвращает частичный результат со статусом `Cancelled`.
    pub async fn synchronize(
        &self,
        cues: &[Cue],
        segments: &[AudioData],
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome> {
        self.options.validate()?;
        log_info(&format!(
            "Начало синхронизации: {} субтитров, {} сегментов",
            cues.len(),
            segments.len()
        ));

        self.progress_tracker.update(0.0, "Расчет плана корректировок")?;
        let calculator = TimingCalculator::from_options(&self.options);
        let natural = TimingCalculator::natural_durations(segments);
        let plan = match calculator.compute_plan(cues, &natural) {
            Ok(plan) => plan,
            Err(e) => {
                let _ = log_error::<(), _>(&e, "Ошибка расчета плана");
                return Err(e);
            }
        };
        for error in plan.errors() {
            log_debug(&format!("Обработано без растяжения: {}", error));
        }

        self.progress_tracker.update(5.0, "Выбор бэкенда растяжения")?;
        let stretcher = match &self.stretcher {
            Some(stretcher) => stretcher.clone(),
            None => select_stretcher(&self.options).await,
        };

        self.progress_tracker.update(10.0, "Сборка дорожки")?;
        let assembler = AudioAssembler::new(stretcher, self.options.sample_rate)
            .with_fallback(PhaseVocoderStretcher::new(self.options.frame_size))
            .with_resample_quality(self.options.resample_quality)
            .with_workers(self.options.workers)
            .with_progress(self.progress_tracker.create_child(10.0, 90.0));
        let assembly = assembler.assemble(segments, &plan, cancel).await?;

        self.progress_tracker.update(95.0, "Формирование отчета")?;
        let report = ReportGenerator::new(self.options.deviation_tolerance).build(&plan, &assembly);

        if assembly.is_cancelled() {
            log_warning(&report.generation_info());
            self.progress_tracker.update(
                self.progress_tracker.get_progress(),
                "Синхронизация отменена",
            )?;
        } else {
            log_info(&report.generation_info());
            self.progress_tracker.update(100.0, "Синхронизация завершена")?;
        }

        Ok(SyncOutcome {
            plan,
            assembly,
            report,
        })
    }

    /// Сохраняет дорожку в WAV файл
    pub async fn save_to_file<P: AsRef<Path>>(&self, audio: &AudioData, path: P) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        log_debug(&format!(
            "Сохранение {} сэмплов в {}",
            audio.len(),
            path.display()
        ));

        let audio = audio.clone();
        tokio::task::spawn_blocking(move || audio.write_wav(&path))
            .await
            .map_err(|e| Error::Synchronization(format!("запись файла прервана: {}", e)))?
    }
}
