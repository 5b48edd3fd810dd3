use crate::cue::{format_srt_timestamp, preview_text};
use crate::error::Result;
use crate::stretch::StretchBackend;
use crate::sync::{AdjustmentKind, AdjustmentPlan, AssemblyResult, Placement, RenderStatus, TimingMode};
use serde::Serialize;
use std::fmt::{self, Write as _};

/// Допустимое расхождение конца субтитра по умолчанию, секунды
pub const DEFAULT_DEVIATION_TOLERANCE: f64 = 0.05;

const PREVIEW_CHARS: usize = 40;

/// Отчет по одному субтитру
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CueReport {
    pub sequence: usize,
    pub cue_index: usize,
    pub text: String,
    pub original_start: f64,
    pub original_end: f64,
    /// Длительность аудио до растяжения, секунды
    pub natural_duration: f64,
    /// Длительность авторского окна, секунды
    pub requested_duration: f64,
    /// Фактическое окно (None, если сегмент не был собран)
    pub actual_start: Option<f64>,
    pub actual_end: Option<f64>,
    pub kind: AdjustmentKind,
    pub ratio: f64,
    pub clamped: bool,
    pub backend: Option<StretchBackend>,
    pub fallback: bool,
    pub status: Option<RenderStatus>,
    /// Часть звука не поместилась в участок
    pub trimmed: bool,
    pub shift: f64,
    /// |фактический конец - авторский конец|
    pub deviation: Option<f64>,
    pub within_tolerance: bool,
    pub notes: Vec<String>,
}

impl CueReport {
    pub fn is_placed(&self) -> bool {
        self.actual_start.is_some()
    }
}

/// Субтитр с самым сильным изменением длительности
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WorstRatio {
    pub cue_index: usize,
    pub ratio: f64,
}

/// Сводка по всему прогону
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub total_cues: usize,
    pub placed_cues: usize,
    pub stretched: usize,
    pub compressed: usize,
    pub clamped: usize,
    pub shifted: usize,
    pub malformed: usize,
    pub out_of_order: usize,
    pub pushed_past_next: usize,
    pub fallbacks: usize,
    pub silenced: usize,
    /// Паузы тишины между соседними сегментами
    pub silence_gaps: usize,
    pub total_gap_duration: f64,
    /// Сегменты длиннее своего окна
    pub overruns: usize,
    pub total_overrun_duration: f64,
    /// Сегменты, звук которых был укорочен при записи
    pub trimmed: usize,
    /// Субтитры хотя бы с одним замечанием
    pub warnings: usize,
    pub outside_tolerance: usize,
    /// Расхождение конца последнего собранного субтитра
    pub total_drift: f64,
    /// Сумма расхождений по всем собранным субтитрам
    pub cumulative_deviation: f64,
    pub worst_ratio: Option<WorstRatio>,
    pub average_ratio: f64,
    pub output_duration: f64,
    pub cancelled: bool,
}

/// Отчет о корректировках
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub sample_rate: u32,
    pub mode: TimingMode,
    pub backend: StretchBackend,
    pub deviation_tolerance: f64,
    pub cues: Vec<CueReport>,
    pub summary: ReportSummary,
}

/// Построитель отчетов
#[derive(Debug, Clone)]
pub struct ReportGenerator {
    deviation_tolerance: f64,
}

impl Default for ReportGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_DEVIATION_TOLERANCE)
    }
}

impl ReportGenerator {
    pub fn new(deviation_tolerance: f64) -> Self {
        Self {
            deviation_tolerance: deviation_tolerance.max(0.0),
        }
    }

    /// Строит отчет; не изменяет входные данные, повторный вызов дает тот же результат
    pub fn build(&self, plan: &AdjustmentPlan, assembly: &AssemblyResult) -> Report {
        let sample_rate = assembly.audio.sample_rate.max(1);
        let cues: Vec<CueReport> = plan
            .entries
            .iter()
            .map(|entry| {
                let placement = assembly.placements.get(entry.sequence);
                self.cue_report(entry, placement, sample_rate)
            })
            .collect();

        let summary = summarize(plan, &cues, assembly);

        Report {
            sample_rate,
            mode: plan.mode,
            backend: assembly.backend,
            deviation_tolerance: self.deviation_tolerance,
            cues,
            summary,
        }
    }

    fn cue_report(
        &self,
        entry: &crate::sync::PlanEntry,
        placement: Option<&Placement>,
        sample_rate: u32,
    ) -> CueReport {
        let actual_start = placement.map(|p| p.start_seconds(sample_rate));
        let actual_end = placement.map(|p| p.end_seconds(sample_rate));
        let deviation = match actual_end {
            Some(end) if entry.original_end.is_finite() && entry.malformed.is_none() => {
                Some((end - entry.original_end).abs())
            }
            _ => None,
        };
        let within_tolerance = deviation.map_or(false, |d| d <= self.deviation_tolerance + 1e-9);

        let mut notes = Vec::new();
        if let Some(reason) = &entry.malformed {
            notes.push(format!("некорректные тайминги: {}", reason));
        }
        if entry.clamped {
            notes.push(format!(
                "коэффициент обрезан до {:.3}, нужно {:.3}",
                entry.ratio,
                entry.requested_duration / entry.natural_duration
            ));
        }
        if entry.kind == AdjustmentKind::OverlapShifted {
            notes.push(format!("сдвинут на {:.3} с из-за перекрытия", entry.shift));
        }
        if entry.out_of_order {
            notes.push("начинается раньше предыдущего субтитра".to_string());
        }
        if entry.pushed_past_next {
            notes.push("сдвиг вытолкнул субтитр за начало следующего".to_string());
        }
        match placement {
            None => notes.push("не собран: обработка отменена".to_string()),
            Some(p) => {
                if p.fallback {
                    notes.push("внешний бэкенд отказал, использован фазовый вокодер".to_string());
                }
                if let RenderStatus::Silenced(reason) = &p.status {
                    notes.push(format!("заменен тишиной: {}", reason));
                }
                if p.trimmed_tail > 0 {
                    notes.push(format!("обрезан хвост: {} сэмплов", p.trimmed_tail));
                }
            }
        }
        if deviation.is_some() && !within_tolerance {
            notes.push(format!(
                "расхождение конца {:.3} с превышает допуск {:.3} с",
                deviation.unwrap_or_default(),
                self.deviation_tolerance
            ));
        }

        CueReport {
            sequence: entry.sequence,
            cue_index: entry.cue_index,
            text: preview_text(&entry.text, PREVIEW_CHARS),
            original_start: entry.original_start,
            original_end: entry.original_end,
            natural_duration: entry.natural_duration,
            requested_duration: entry.requested_duration,
            actual_start,
            actual_end,
            kind: entry.kind,
            ratio: entry.ratio,
            clamped: entry.clamped,
            backend: placement.and_then(|p| p.backend),
            fallback: placement.map_or(false, |p| p.fallback),
            status: placement.map(|p| p.status.clone()),
            trimmed: placement.map_or(false, Placement::is_trimmed),
            shift: entry.shift,
            deviation,
            within_tolerance,
            notes,
        }
    }
}

/// Строит отчет с допуском по умолчанию
///
/// Кроме размещений (`assembly.placements`) отчету нужны основной бэкенд
/// прогона, длительность и частота итоговой дорожки и признак отмены,
/// поэтому принимается весь результат сборки.
pub fn build_report(plan: &AdjustmentPlan, assembly: &AssemblyResult) -> Report {
    ReportGenerator::default().build(plan, assembly)
}

fn summarize(plan: &AdjustmentPlan, cues: &[CueReport], assembly: &AssemblyResult) -> ReportSummary {
    let regular: Vec<_> = plan
        .entries
        .iter()
        .filter(|e| e.kind != AdjustmentKind::Malformed)
        .collect();

    let worst_ratio = regular
        .iter()
        .filter(|e| e.ratio > 0.0)
        .max_by(|a, b| a.ratio.ln().abs().total_cmp(&b.ratio.ln().abs()))
        .map(|e| WorstRatio {
            cue_index: e.cue_index,
            ratio: e.ratio,
        });

    let average_ratio = if regular.is_empty() {
        1.0
    } else {
        regular.iter().map(|e| e.ratio).sum::<f64>() / regular.len() as f64
    };

    let total_drift = cues
        .iter()
        .rev()
        .find_map(|c| c.deviation)
        .unwrap_or(0.0);

    let rate = assembly.audio.sample_rate.max(1) as f64;
    let gaps: Vec<f64> = assembly
        .placements
        .windows(2)
        .filter(|pair| pair[1].offset > pair[0].end_offset())
        .map(|pair| (pair[1].offset - pair[0].end_offset()) as f64 / rate)
        .collect();

    let overruns: Vec<f64> = regular
        .iter()
        .map(|e| e.actual_duration - e.requested_duration)
        .filter(|&excess| excess > 1e-9)
        .collect();

    ReportSummary {
        total_cues: plan.len(),
        placed_cues: assembly.placements.len(),
        stretched: regular.iter().filter(|e| e.ratio > 1.0).count(),
        compressed: regular.iter().filter(|e| e.ratio < 1.0).count(),
        clamped: plan.entries.iter().filter(|e| e.clamped).count(),
        shifted: plan.count(AdjustmentKind::OverlapShifted),
        malformed: plan.count(AdjustmentKind::Malformed),
        out_of_order: plan.entries.iter().filter(|e| e.out_of_order).count(),
        pushed_past_next: plan.entries.iter().filter(|e| e.pushed_past_next).count(),
        fallbacks: assembly.placements.iter().filter(|p| p.fallback).count(),
        silenced: assembly
            .placements
            .iter()
            .filter(|p| matches!(p.status, RenderStatus::Silenced(_)))
            .count(),
        silence_gaps: gaps.len(),
        total_gap_duration: gaps.iter().sum(),
        overruns: overruns.len(),
        total_overrun_duration: overruns.iter().sum(),
        trimmed: assembly.placements.iter().filter(|p| p.is_trimmed()).count(),
        warnings: cues.iter().filter(|c| !c.notes.is_empty()).count(),
        outside_tolerance: cues
            .iter()
            .filter(|c| c.deviation.is_some() && !c.within_tolerance)
            .count(),
        total_drift,
        cumulative_deviation: cues.iter().filter_map(|c| c.deviation).sum(),
        worst_ratio,
        average_ratio,
        output_duration: assembly.audio.duration(),
        cancelled: assembly.is_cancelled(),
    }
}

fn format_window(start: Option<f64>, end: Option<f64>) -> String {
    match (start, end) {
        (Some(start), Some(end)) => format!("{} --> {}", format_srt_timestamp(start), format_srt_timestamp(end)),
        _ => "-".to_string(),
    }
}

impl Report {
    /// Однострочная сводка о сгенерированном аудио
    pub fn generation_info(&self) -> String {
        format!(
            "Сгенерировано {:.3} с аудио, субтитров: {}/{}, режим: {}, бэкенд: {}{}",
            self.summary.output_duration,
            self.summary.placed_cues,
            self.summary.total_cues,
            self.mode,
            self.backend,
            if self.summary.cancelled { " (отменено)" } else { "" }
        )
    }

    /// Текстовый отчет для человека
    pub fn render_text(&self) -> String {
        let s = &self.summary;
        let mut out = String::new();

        let _ = writeln!(out, "Отчет о синхронизации");
        let _ = writeln!(out, "{}", self.generation_info());
        let _ = writeln!(out);

        for cue in &self.cues {
            let _ = writeln!(
                out,
                "#{:<4} {:<16} x{:.3} ({:.2} с окно, {:.2} с естественная)  {} -> {}  \"{}\"",
                cue.cue_index,
                cue.kind.to_string(),
                cue.ratio,
                cue.requested_duration,
                cue.natural_duration,
                format_window(
                    Some(cue.original_start).filter(|v| v.is_finite()),
                    Some(cue.original_end).filter(|v| v.is_finite())
                ),
                format_window(cue.actual_start, cue.actual_end),
                cue.text
            );
            for note in &cue.notes {
                let _ = writeln!(out, "      ! {}", note);
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Растянуто: {}, сжато: {}, обрезано: {}, сдвинуто: {}, некорректных: {}",
            s.stretched, s.compressed, s.clamped, s.shifted, s.malformed
        );
        let _ = writeln!(
            out,
            "Откатов на фазовый вокодер: {}, заменено тишиной: {}, с замечаниями: {}",
            s.fallbacks, s.silenced, s.warnings
        );
        let _ = writeln!(
            out,
            "Пауз тишины: {} ({:.2} с), переполнений окна: {} (+{:.2} с), обрезано сегментов: {}",
            s.silence_gaps, s.total_gap_duration, s.overruns, s.total_overrun_duration, s.trimmed
        );
        let _ = writeln!(
            out,
            "Итоговый дрейф: {:.3} с, суммарное расхождение: {:.3} с, вне допуска ({:.3} с): {}",
            s.total_drift, s.cumulative_deviation, self.deviation_tolerance, s.outside_tolerance
        );
        match s.worst_ratio {
            Some(worst) => {
                let _ = writeln!(
                    out,
                    "Худший коэффициент: x{:.3} (#{}), средний: x{:.3}",
                    worst.ratio, worst.cue_index, s.average_ratio
                );
            }
            None => {
                let _ = writeln!(out, "Средний коэффициент: x{:.3}", s.average_ratio);
            }
        }
        if s.cancelled {
            let _ = writeln!(out, "Обработка отменена: собрано {} из {}", s.placed_cues, s.total_cues);
        }
        out
    }

    /// Отчет в JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Подробный отладочный дамп всех полей
    pub fn render_debug(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "[{}] отладочный отчет",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f")
        );
        let _ = writeln!(
            out,
            "sample_rate={} mode={} backend={} tolerance={}",
            self.sample_rate, self.mode, self.backend, self.deviation_tolerance
        );
        for cue in &self.cues {
            let _ = writeln!(out, "{:?}", cue);
        }
        let _ = writeln!(out, "{:?}", self.summary);
        out
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_text())
    }
}
