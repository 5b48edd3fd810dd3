use crate::audio::{AudioData, ResampleQuality};
use crate::error::{Error, Result};
use crate::logging::{log_cue, log_info, log_warning};
use crate::progress::{CancellationToken, ChildProgressTracker};
use crate::stretch::{PhaseVocoderStretcher, StretchBackend, Stretcher};
use crate::sync::plan::{AdjustmentPlan, PlanEntry};
use log::Level;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Как был получен звук сегмента
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum RenderStatus {
    /// Сегмент растянут бэкендом
    Stretched,
    /// Естественное аудио без изменений
    Passthrough,
    /// Окно заполнено тишиной
    Silenced(String),
}

/// Размещение сегмента в выходном буфере
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Placement {
    pub sequence: usize,
    pub cue_index: usize,
    /// Смещение в сэмплах
    pub offset: usize,
    /// Длина в сэмплах
    pub length: usize,
    /// Сколько начальных сэмплов отброшено из-за субсэмплового перекрытия
    pub trimmed_lead: usize,
    /// Сколько сэмплов хвоста не поместилось в участок
    pub trimmed_tail: usize,
    /// Бэкенд растяжения (None для неизмененного аудио и тишины)
    pub backend: Option<StretchBackend>,
    /// Внешний бэкенд отказал и сегмент растянут фазовым вокодером
    pub fallback: bool,
    pub status: RenderStatus,
}

impl Placement {
    /// Был ли звук сегмента укорочен при записи
    pub fn is_trimmed(&self) -> bool {
        self.trimmed_lead > 0 || self.trimmed_tail > 0
    }

    /// Смещение первого сэмпла после сегмента
    pub fn end_offset(&self) -> usize {
        self.offset + self.length
    }

    /// Начало в секундах
    pub fn start_seconds(&self, sample_rate: u32) -> f64 {
        self.offset as f64 / sample_rate as f64
    }

    /// Конец в секундах
    pub fn end_seconds(&self, sample_rate: u32) -> f64 {
        self.end_offset() as f64 / sample_rate as f64
    }
}

/// Завершилась ли сборка полностью
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyStatus {
    Complete,
    Cancelled,
}

/// Результат сборки дорожки
#[derive(Debug)]
pub struct AssemblyResult {
    /// Итоговая дорожка на общей частоте дискретизации
    pub audio: AudioData,
    /// Размещения в порядке субтитров
    pub placements: Vec<Placement>,
    pub status: AssemblyStatus,
    /// Основной бэкенд растяжения прогона
    pub backend: StretchBackend,
    /// Ошибки бэкендов, обработанные без остановки сборки
    pub errors: Vec<Error>,
}

impl AssemblyResult {
    pub fn is_cancelled(&self) -> bool {
        self.status == AssemblyStatus::Cancelled
    }

    /// Превращает отмененную сборку в ошибку `CancellationRequested`
    pub fn into_result(self) -> Result<Self> {
        match self.status {
            AssemblyStatus::Complete => Ok(self),
            AssemblyStatus::Cancelled => Err(Error::CancellationRequested),
        }
    }
}

/// Участок буфера, закрепленный за субтитром
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Slot {
    pub offset: usize,
    pub length: usize,
    pub trimmed_lead: usize,
}

/// Раскладывает план по сэмплам
///
/// Участки не перекрываются: субсэмпловое перекрытие с предыдущим
/// участком срезает начало следующего. Возвращает участки и длину буфера.
pub(crate) fn layout(plan: &AdjustmentPlan, sample_rate: u32) -> (Vec<Slot>, usize) {
    let rate = sample_rate as f64;
    let mut slots = Vec::with_capacity(plan.len());
    let mut cursor = 0usize;

    for entry in &plan.entries {
        let mut offset = (entry.actual_start * rate).round().max(0.0) as usize;
        let mut length = (entry.actual_duration * rate).round().max(0.0) as usize;
        let mut trimmed_lead = 0;

        if offset < cursor {
            trimmed_lead = (cursor - offset).min(length);
            offset = cursor;
            length -= trimmed_lead;
        }
        cursor = cursor.max(offset + length);
        slots.push(Slot {
            offset,
            length,
            trimmed_lead,
        });
    }

    let by_plan = (plan.total_duration() * rate - 1e-6).ceil().max(0.0) as usize;
    (slots, by_plan.max(cursor))
}

/// Отрисованный сегмент до записи в буфер
struct Rendered {
    samples: Vec<f32>,
    backend: Option<StretchBackend>,
    fallback: bool,
    status: RenderStatus,
    errors: Vec<Error>,
}

impl Rendered {
    fn silence(reason: String, errors: Vec<Error>) -> Self {
        Self {
            samples: Vec::new(),
            backend: None,
            fallback: false,
            status: RenderStatus::Silenced(reason),
            errors,
        }
    }
}

/// Сборщик дорожки
///
/// Сегменты растягиваются параллельно ограниченным пулом задач и
/// записываются в общий буфер строго в порядке субтитров.
pub struct AudioAssembler {
    stretcher: Arc<dyn Stretcher>,
    fallback: Arc<PhaseVocoderStretcher>,
    sample_rate: u32,
    resample_quality: ResampleQuality,
    workers: usize,
    progress: Option<ChildProgressTracker>,
}

impl AudioAssembler {
    pub fn new(stretcher: Arc<dyn Stretcher>, sample_rate: u32) -> Self {
        Self {
            stretcher,
            fallback: Arc::new(PhaseVocoderStretcher::default()),
            sample_rate,
            resample_quality: ResampleQuality::default(),
            workers: 0,
            progress: None,
        }
    }

    /// Вокодер, используемый при отказе внешнего бэкенда
    pub fn with_fallback(mut self, fallback: PhaseVocoderStretcher) -> Self {
        self.fallback = Arc::new(fallback);
        self
    }

    pub fn with_resample_quality(mut self, quality: ResampleQuality) -> Self {
        self.resample_quality = quality;
        self
    }

    /// Число параллельных задач (0 = число ядер)
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_progress(mut self, progress: ChildProgressTracker) -> Self {
        self.progress = Some(progress);
        self
    }

    fn worker_count(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.workers
        }
    }

    /// Собирает дорожку по плану
    ///
    /// При отмене возвращает результат со статусом `Cancelled`, содержащий
    /// только уже записанные сегменты.
    pub async fn assemble(
        &self,
        segments: &[AudioData],
        plan: &AdjustmentPlan,
        cancel: &CancellationToken,
    ) -> Result<AssemblyResult> {
        if segments.len() != plan.len() {
            return Err(Error::InvalidParameters(format!(
                "количество сегментов ({}) не совпадает с планом ({})",
                segments.len(),
                plan.len()
            )));
        }
        if self.sample_rate == 0 {
            return Err(Error::InvalidParameters("нулевая частота дискретизации".to_string()));
        }

        let (slots, total_len) = layout(plan, self.sample_rate);
        let workers = self.worker_count();
        log_info(&format!(
            "Сборка {} сегментов: {} сэмплов при {} Гц, бэкенд {}, задач {}",
            plan.len(),
            total_len,
            self.sample_rate,
            self.stretcher.backend(),
            workers
        ));

        let mut buffer = vec![0.0f32; total_len];
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();

        for (entry, segment) in plan.entries.iter().zip(segments) {
            let semaphore = semaphore.clone();
            let stretcher = self.stretcher.clone();
            let fallback = self.fallback.clone();
            let entry = entry.clone();
            let segment = segment.clone();
            let cancel = cancel.clone();
            let sample_rate = self.sample_rate;
            let quality = self.resample_quality;

            tasks.spawn(async move {
                let sequence = entry.sequence;
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return (sequence, Err(Error::Synchronization(e.to_string()))),
                };
                let rendered = render_segment(
                    stretcher.as_ref(),
                    fallback.as_ref(),
                    &entry,
                    segment,
                    sample_rate,
                    quality,
                    &cancel,
                )
                .await;
                (sequence, rendered)
            });
        }

        let mut pending: Vec<Option<Rendered>> = (0..plan.len()).map(|_| None).collect();
        let mut placements = Vec::with_capacity(plan.len());
        let mut errors = Vec::new();
        let mut cancelled = false;

        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                joined = tasks.join_next() => joined,
            };

            match joined {
                None => break,
                Some(Ok((sequence, Ok(rendered)))) => {
                    pending[sequence] = Some(rendered);
                    while let Some(rendered) = pending.get_mut(placements.len()).and_then(Option::take) {
                        let index = placements.len();
                        let placement = commit(&mut buffer, &plan.entries[index], slots[index], rendered, &mut errors);
                        placements.push(placement);
                        if let Some(progress) = &self.progress {
                            progress.step(
                                placements.len(),
                                plan.len(),
                                &format!("Собрано {}/{} сегментов", placements.len(), plan.len()),
                            )?;
                        }
                    }
                }
                Some(Ok((_, Err(e)))) if e.is_cancellation() => {
                    cancelled = true;
                    break;
                }
                Some(Ok((_, Err(e)))) => {
                    tasks.abort_all();
                    return Err(e);
                }
                Some(Err(e)) => {
                    tasks.abort_all();
                    return Err(Error::Synchronization(format!("задача сборки завершилась аварийно: {}", e)));
                }
            }
        }

        let status = if cancelled {
            tasks.abort_all();
            let committed_end = placements.last().map(Placement::end_offset).unwrap_or(0);
            buffer.truncate(committed_end);
            log_warning(&format!(
                "Сборка отменена: записано {} из {} сегментов",
                placements.len(),
                plan.len()
            ));
            AssemblyStatus::Cancelled
        } else {
            log_info(&format!(
                "Сборка завершена: {:.3} с, ошибок бэкенда: {}",
                buffer.len() as f64 / self.sample_rate as f64,
                errors.len()
            ));
            AssemblyStatus::Complete
        };

        Ok(AssemblyResult {
            audio: AudioData::new(buffer, self.sample_rate),
            placements,
            status,
            backend: self.stretcher.backend(),
            errors,
        })
    }
}

/// Записывает сегмент в закрепленный участок буфера
fn commit(
    buffer: &mut [f32],
    entry: &PlanEntry,
    slot: Slot,
    rendered: Rendered,
    errors: &mut Vec<Error>,
) -> Placement {
    let mut samples = rendered.samples;
    let mut trimmed_tail = 0;
    if !samples.is_empty() {
        trimmed_tail = samples.len().saturating_sub(slot.length + slot.trimmed_lead);
        samples.resize(slot.length + slot.trimmed_lead, 0.0);
        buffer[slot.offset..slot.offset + slot.length].copy_from_slice(&samples[slot.trimmed_lead..]);
    }
    errors.extend(rendered.errors);

    log_cue(
        Level::Debug,
        entry.cue_index,
        &format!("записан: смещение {}, длина {}, {:?}", slot.offset, slot.length, rendered.status),
    );

    Placement {
        sequence: entry.sequence,
        cue_index: entry.cue_index,
        offset: slot.offset,
        length: slot.length,
        trimmed_lead: slot.trimmed_lead,
        trimmed_tail,
        backend: rendered.backend,
        fallback: rendered.fallback,
        status: rendered.status,
    }
}

/// Отрисовывает один сегмент с откатом на фазовый вокодер и затем на тишину
async fn render_segment(
    stretcher: &dyn Stretcher,
    fallback: &PhaseVocoderStretcher,
    entry: &PlanEntry,
    segment: AudioData,
    sample_rate: u32,
    quality: ResampleQuality,
    cancel: &CancellationToken,
) -> Result<Rendered> {
    cancel.check()?;

    if segment.is_empty() || entry.actual_duration <= 0.0 {
        return Ok(Rendered::silence("пустой сегмент".to_string(), Vec::new()));
    }

    if let Err(e) = segment.validate() {
        return Ok(unrecoverable(entry, e.to_string(), Vec::new()));
    }

    let segment = if segment.sample_rate != sample_rate {
        match tokio::task::spawn_blocking(move || segment.resample(sample_rate, quality)).await {
            Ok(Ok(resampled)) => resampled,
            Ok(Err(e)) => return Ok(unrecoverable(entry, e.to_string(), Vec::new())),
            Err(e) => return Ok(unrecoverable(entry, e.to_string(), Vec::new())),
        }
    } else {
        segment
    };

    if !entry.needs_stretch() {
        return Ok(Rendered {
            samples: segment.samples,
            backend: None,
            fallback: false,
            status: RenderStatus::Passthrough,
            errors: Vec::new(),
        });
    }

    let primary_error = match stretcher.stretch(&segment, entry.actual_duration, cancel).await {
        Ok(stretched) => {
            return Ok(Rendered {
                samples: stretched.samples,
                backend: Some(stretcher.backend()),
                fallback: false,
                status: RenderStatus::Stretched,
                errors: Vec::new(),
            })
        }
        Err(e) if e.is_cancellation() => return Err(e),
        Err(e) => e,
    };

    if stretcher.backend() == StretchBackend::PhaseVocoder {
        return Ok(unrecoverable(entry, primary_error.to_string(), Vec::new()));
    }

    log_cue(
        Level::Warn,
        entry.cue_index,
        &format!("{}, повтор фазовым вокодером", primary_error),
    );

    match fallback.stretch(&segment, entry.actual_duration, cancel).await {
        Ok(stretched) => Ok(Rendered {
            samples: stretched.samples,
            backend: Some(StretchBackend::PhaseVocoder),
            fallback: true,
            status: RenderStatus::Stretched,
            errors: vec![primary_error],
        }),
        Err(e) if e.is_cancellation() => Err(e),
        Err(e) => Ok(unrecoverable(entry, e.to_string(), vec![primary_error])),
    }
}

fn unrecoverable(entry: &PlanEntry, reason: String, mut errors: Vec<Error>) -> Rendered {
    log_cue(
        Level::Warn,
        entry.cue_index,
        &format!("растяжение невозможно ({}), окно заполнено тишиной", reason),
    );
    errors.push(Error::UnrecoverableStretch {
        index: entry.cue_index,
        reason: reason.clone(),
    });
    Rendered::silence(reason, errors)
}
