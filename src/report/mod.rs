//! Отчеты о корректировках и скорректированные субтитры.

mod generator;
pub mod srt;

pub use generator::{
    build_report, CueReport, Report, ReportGenerator, ReportSummary, WorstRatio,
    DEFAULT_DEVIATION_TOLERANCE,
};
pub use srt::render_adjusted_srt;
