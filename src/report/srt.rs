use crate::cue::format_srt_timestamp;
use crate::sync::{AdjustmentPlan, Placement};
use std::fmt::Write as _;

/// Формирует SRT с фактическими окнами субтитров
///
/// Номера берутся из исходных субтитров. Для собранных субтитров окно
/// берется из размещения, для не собранных (отмена) - из плана.
pub fn render_adjusted_srt(plan: &AdjustmentPlan, placements: &[Placement]) -> String {
    let sample_rate = plan.sample_rate.max(1);
    let mut out = String::new();

    for (i, entry) in plan.entries.iter().enumerate() {
        let (start, end) = match placements.get(entry.sequence) {
            Some(p) => (p.start_seconds(sample_rate), p.end_seconds(sample_rate)),
            None => (entry.actual_start, entry.actual_end()),
        };
        if i > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "{}", entry.cue_index);
        let _ = writeln!(out, "{} --> {}", format_srt_timestamp(start), format_srt_timestamp(end));
        let _ = writeln!(out, "{}", entry.text.trim_end());
    }
    out
}
