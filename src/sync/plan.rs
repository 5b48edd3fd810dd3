use crate::audio::AudioData;
use crate::cue::Cue;
use crate::error::{Error, Result};
use crate::logging::{log_cue, log_info};
use crate::SyncOptions;
use log::Level;
use serde::{Deserialize, Serialize};

/// Способ согласования длительности сегмента с окном субтитра
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingMode {
    /// Растягивать или сжимать аудио под окно субтитра
    StretchToFit,
    /// Оставлять естественную длительность, промежутки заполнять тишиной
    PadWithSilence,
}

impl Default for TimingMode {
    fn default() -> Self {
        Self::StretchToFit
    }
}

impl std::fmt::Display for TimingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StretchToFit => f.write_str("stretch-to-fit"),
            Self::PadWithSilence => f.write_str("pad-with-silence"),
        }
    }
}

/// Классификация корректировки субтитра
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    /// Корректировка не нужна
    None,
    /// Растяжение в пределах границ
    MinorStretch,
    /// Сжатие в пределах границ
    MinorCompress,
    /// Коэффициент обрезан до границы
    ClampedExtreme,
    /// Начало сдвинуто из-за перекрытия с предыдущим субтитром
    OverlapShifted,
    /// Некорректные тайминги, аудио без изменений
    Malformed,
}

impl std::fmt::Display for AdjustmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::None => "none",
            Self::MinorStretch => "minor-stretch",
            Self::MinorCompress => "minor-compress",
            Self::ClampedExtreme => "clamped-extreme",
            Self::OverlapShifted => "overlap-shifted",
            Self::Malformed => "malformed",
        };
        f.write_str(label)
    }
}

/// Решение по одному субтитру
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanEntry {
    /// Позиция в последовательности (0..n)
    pub sequence: usize,
    /// Номер субтитра из исходного файла
    pub cue_index: usize,
    /// Текст субтитра
    pub text: String,
    pub original_start: f64,
    pub original_end: f64,
    /// Естественная длительность синтезированного сегмента
    pub natural_duration: f64,
    /// Длительность окна, заданная автором
    pub requested_duration: f64,
    /// Применяемый коэффициент растяжения (1.0 = без изменений)
    pub ratio: f64,
    pub actual_start: f64,
    pub actual_duration: f64,
    pub kind: AdjustmentKind,
    /// Коэффициент был обрезан до границы
    pub clamped: bool,
    /// Сдвиг начала вперед в секундах
    pub shift: f64,
    /// Субтитр начинается раньше предыдущего
    pub out_of_order: bool,
    /// Сдвиг вытолкнул начало за авторское начало следующего субтитра
    pub pushed_past_next: bool,
    /// Причина, по которой тайминги признаны некорректными
    pub malformed: Option<String>,
}

impl PlanEntry {
    /// Фактический момент окончания
    pub fn actual_end(&self) -> f64 {
        self.actual_start + self.actual_duration
    }

    /// Требует ли сегмент растяжения
    pub fn needs_stretch(&self) -> bool {
        self.kind != AdjustmentKind::Malformed && self.ratio != 1.0
    }

    /// Ошибка некорректного субтитра, если она была
    pub fn error(&self) -> Option<Error> {
        self.malformed.as_ref().map(|reason| Error::MalformedCue {
            index: self.cue_index,
            reason: reason.clone(),
        })
    }
}

/// План корректировок для всей последовательности субтитров
#[derive(Debug, Clone, Serialize)]
pub struct AdjustmentPlan {
    pub entries: Vec<PlanEntry>,
    pub mode: TimingMode,
    pub sample_rate: u32,
}

impl AdjustmentPlan {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter()
    }

    /// Длительность всей дорожки
    ///
    /// Не короче фактического конца любого сегмента и авторского конца любого
    /// корректного субтитра: окно, не заполненное звуком, остается тишиной.
    pub fn total_duration(&self) -> f64 {
        self.entries
            .iter()
            .map(|e| {
                if e.kind == AdjustmentKind::Malformed || !e.original_end.is_finite() {
                    e.actual_end()
                } else {
                    e.actual_end().max(e.original_end)
                }
            })
            .fold(0.0, f64::max)
    }

    /// Количество записей данной классификации
    pub fn count(&self, kind: AdjustmentKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    /// Ошибки некорректных субтитров, обработанных без растяжения
    pub fn errors(&self) -> Vec<Error> {
        self.entries.iter().filter_map(PlanEntry::error).collect()
    }
}

/// Калькулятор корректировок таймингов
#[derive(Debug, Clone)]
pub struct TimingCalculator {
    min_ratio: f64,
    max_ratio: f64,
    ratio_tolerance: f64,
    overlap_tolerance_samples: u32,
    sample_rate: u32,
    mode: TimingMode,
}

impl TimingCalculator {
    /// Создает калькулятор с границами по умолчанию
    pub fn new(sample_rate: u32) -> Self {
        Self::from_options(&SyncOptions {
            sample_rate,
            ..SyncOptions::default()
        })
    }

    pub fn from_options(options: &SyncOptions) -> Self {
        Self {
            min_ratio: options.min_stretch_ratio,
            max_ratio: options.max_stretch_ratio,
            ratio_tolerance: options.ratio_tolerance,
            overlap_tolerance_samples: options.overlap_tolerance_samples,
            sample_rate: options.sample_rate,
            mode: options.timing_mode,
        }
    }

    pub fn with_ratio_bounds(mut self, min_ratio: f64, max_ratio: f64) -> Self {
        self.min_ratio = min_ratio;
        self.max_ratio = max_ratio;
        self
    }

    pub fn with_ratio_tolerance(mut self, tolerance: f64) -> Self {
        self.ratio_tolerance = tolerance;
        self
    }

    pub fn with_overlap_tolerance_samples(mut self, samples: u32) -> Self {
        self.overlap_tolerance_samples = samples;
        self
    }

    pub fn with_mode(mut self, mode: TimingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Допустимое перекрытие в секундах
    pub fn overlap_tolerance(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.overlap_tolerance_samples as f64 / self.sample_rate as f64
    }

    /// Естественные длительности сегментов в секундах
    pub fn natural_durations(segments: &[AudioData]) -> Vec<f64> {
        segments.iter().map(AudioData::duration).collect()
    }

    /// Строит план корректировок
    ///
    /// Перекрытия разрешаются одним проходом вперед: начало субтитра
    /// сдвигается к фактическому концу предыдущего, длительность сохраняется,
    /// порядок не меняется. Ошибка возвращается только при несовпадении
    /// количества субтитров и сегментов.
    pub fn compute_plan(&self, cues: &[Cue], natural_durations: &[f64]) -> Result<AdjustmentPlan> {
        if cues.len() != natural_durations.len() {
            return Err(Error::InvalidParameters(format!(
                "количество субтитров ({}) не совпадает с количеством сегментов ({})",
                cues.len(),
                natural_durations.len()
            )));
        }
        if !(self.min_ratio > 0.0 && self.min_ratio <= 1.0 && self.max_ratio >= 1.0) {
            return Err(Error::InvalidParameters(format!(
                "некорректные границы коэффициента: [{}, {}]",
                self.min_ratio, self.max_ratio
            )));
        }

        log_info(&format!(
            "Расчет плана для {} субтитров (режим {}, границы [{:.2}, {:.2}])",
            cues.len(),
            self.mode,
            self.min_ratio,
            self.max_ratio
        ));

        let tolerance = self.overlap_tolerance();
        let mut entries: Vec<PlanEntry> = Vec::with_capacity(cues.len());
        let mut prev_end: Option<f64> = None;
        let mut prev_start: Option<f64> = None;

        for (sequence, (cue, &natural)) in cues.iter().zip(natural_durations).enumerate() {
            let natural = if natural.is_finite() && natural > 0.0 { natural } else { 0.0 };
            let usable_start = cue.start.is_finite() && cue.start >= 0.0;

            let out_of_order = matches!(prev_start, Some(prev) if usable_start && cue.start < prev);
            if out_of_order {
                log_cue(
                    Level::Warn,
                    cue.index,
                    &format!("начинается раньше предыдущего ({:.3}с)", cue.start),
                );
            }

            let mut entry = match cue.validate() {
                Err(Error::MalformedCue { reason, .. }) => {
                    log_cue(
                        Level::Warn,
                        cue.index,
                        &format!("некорректен ({}), аудио будет вставлено без изменений", reason),
                    );
                    self.malformed_entry(sequence, cue, natural, prev_end, reason)
                }
                Err(other) => return Err(other),
                Ok(()) => self.regular_entry(sequence, cue, natural),
            };
            entry.out_of_order = out_of_order;

            if entry.kind != AdjustmentKind::Malformed {
                if let Some(prev) = prev_end {
                    let overlap = prev - entry.actual_start;
                    if overlap > tolerance {
                        log_cue(
                            Level::Warn,
                            cue.index,
                            &format!("перекрытие {:.3}с, начало сдвинуто на {:.3}с", overlap, prev),
                        );
                        entry.actual_start = prev;
                        entry.shift = overlap;
                        entry.kind = AdjustmentKind::OverlapShifted;
                    } else if overlap > 0.0 {
                        entry.actual_start = prev;
                    }
                }
            }

            if entry.shift > 0.0 {
                if let Some(next) = cues.get(sequence + 1) {
                    if next.start.is_finite() && entry.actual_start > next.start + tolerance {
                        log_cue(
                            Level::Warn,
                            cue.index,
                            &format!(
                                "сдвиг вытолкнул за начало следующего ({:.3}с > {:.3}с)",
                                entry.actual_start, next.start
                            ),
                        );
                        entry.pushed_past_next = true;
                    }
                }
            }

            log_cue(
                Level::Debug,
                cue.index,
                &format!(
                    "{:.3}-{:.3}с -> {:.3}+{:.3}с, коэффициент {:.3} ({})",
                    entry.original_start,
                    entry.original_end,
                    entry.actual_start,
                    entry.actual_duration,
                    entry.ratio,
                    entry.kind
                ),
            );

            prev_end = Some(entry.actual_end());
            if usable_start {
                prev_start = Some(cue.start);
            }
            entries.push(entry);
        }

        Ok(AdjustmentPlan {
            entries,
            mode: self.mode,
            sample_rate: self.sample_rate,
        })
    }

    fn regular_entry(&self, sequence: usize, cue: &Cue, natural: f64) -> PlanEntry {
        let requested = cue.duration();
        let mut entry = base_entry(sequence, cue, natural);
        entry.requested_duration = requested;
        entry.actual_start = cue.start;

        if natural <= 0.0 {
            // Пустой сегмент: окно остается за субтитром, сборщик заполнит его тишиной
            entry.actual_duration = requested;
            return entry;
        }

        if self.mode == TimingMode::PadWithSilence {
            entry.actual_duration = natural;
            return entry;
        }

        let raw = requested / natural;
        if (raw - 1.0).abs() <= self.ratio_tolerance {
            entry.actual_duration = natural;
            return entry;
        }

        let clamped = raw.clamp(self.min_ratio, self.max_ratio);
        entry.ratio = clamped;
        if clamped != raw {
            log_cue(
                Level::Warn,
                cue.index,
                &format!("коэффициент {:.3} обрезан до {:.3}", raw, clamped),
            );
            entry.clamped = true;
            entry.kind = AdjustmentKind::ClampedExtreme;
            entry.actual_duration = natural * clamped;
        } else {
            entry.kind = if raw > 1.0 {
                AdjustmentKind::MinorStretch
            } else {
                AdjustmentKind::MinorCompress
            };
            entry.actual_duration = requested;
        }
        entry
    }

    fn malformed_entry(
        &self,
        sequence: usize,
        cue: &Cue,
        natural: f64,
        prev_end: Option<f64>,
        reason: String,
    ) -> PlanEntry {
        let floor = prev_end.unwrap_or(0.0);
        let usable_start = cue.start.is_finite() && cue.start >= 0.0;
        let actual_start = if usable_start { cue.start.max(floor) } else { floor };

        let mut entry = base_entry(sequence, cue, natural);
        entry.kind = AdjustmentKind::Malformed;
        entry.requested_duration = natural;
        entry.actual_start = actual_start;
        entry.actual_duration = natural;
        entry.shift = if usable_start { actual_start - cue.start } else { 0.0 };
        entry.malformed = Some(reason);
        entry
    }
}

fn base_entry(sequence: usize, cue: &Cue, natural: f64) -> PlanEntry {
    PlanEntry {
        sequence,
        cue_index: cue.index,
        text: cue.text.clone(),
        original_start: cue.start,
        original_end: cue.end,
        natural_duration: natural,
        requested_duration: natural,
        ratio: 1.0,
        actual_start: 0.0,
        actual_duration: natural,
        kind: AdjustmentKind::None,
        clamped: false,
        shift: 0.0,
        out_of_order: false,
        pushed_past_next: false,
        malformed: None,
    }
}
