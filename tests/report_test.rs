use srt_sync::{
    build_report, render_adjusted_srt, AdjustmentKind, AdjustmentPlan, AssemblyResult, AudioAssembler,
    AudioData, CancellationToken, Cue, PhaseVocoderStretcher, ReportGenerator, Result, StretchBackend,
    Stretcher, TimingCalculator, TimingMode,
};
use std::sync::Arc;

const RATE: u32 = 16000;

fn tone(seconds: f64) -> AudioData {
    let len = (RATE as f64 * seconds).round() as usize;
    let samples = (0..len)
        .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / RATE as f32).sin() * 0.5)
        .collect();
    AudioData::new(samples, RATE)
}

async fn run(cues: &[Cue], naturals: &[f64]) -> Result<(AdjustmentPlan, AssemblyResult)> {
    let segments: Vec<AudioData> = naturals.iter().map(|&d| tone(d)).collect();
    let plan = TimingCalculator::new(RATE).compute_plan(cues, &TimingCalculator::natural_durations(&segments))?;
    let assembly = AudioAssembler::new(Arc::new(PhaseVocoderStretcher::default()), RATE)
        .assemble(&segments, &plan, &CancellationToken::new())
        .await?;
    Ok((plan, assembly))
}

#[tokio::test]
async fn test_report_marks_overlap_shift() -> Result<()> {
    let cues = vec![
        Cue::new(1, 0.0, 1.0, "Первая реплика"),
        Cue::new(2, 0.5, 1.5, "Вторая реплика"),
    ];
    let (plan, assembly) = run(&cues, &[1.0, 1.0]).await?;
    let report = build_report(&plan, &assembly);

    assert_eq!(report.cues.len(), 2);
    let shifted = &report.cues[1];
    assert_eq!(shifted.kind, AdjustmentKind::OverlapShifted);
    assert!((shifted.shift - 0.5).abs() < 1e-9);
    assert_eq!(shifted.actual_start, Some(1.0));
    assert_eq!(shifted.actual_end, Some(2.0));
    assert!(!shifted.within_tolerance);
    assert!(!shifted.notes.is_empty());

    let summary = &report.summary;
    assert_eq!(summary.shifted, 1);
    assert_eq!(summary.warnings, 1);
    assert!((summary.total_drift - 0.5).abs() < 1e-9);
    assert!((summary.cumulative_deviation - 0.5).abs() < 1e-9);
    assert_eq!(summary.outside_tolerance, 1);
    assert!(!summary.cancelled);
    Ok(())
}

#[tokio::test]
async fn test_report_aggregates_ratios() -> Result<()> {
    let cues = vec![
        Cue::new(1, 0.0, 1.0, "a"),
        Cue::new(2, 1.0, 2.0, "b"),
        Cue::new(3, 2.0, 3.5, "c"),
    ];
    let (plan, assembly) = run(&cues, &[1.0, 1.5, 1.0]).await?;
    let report = build_report(&plan, &assembly);
    let summary = &report.summary;

    assert_eq!(summary.total_cues, 3);
    assert_eq!(summary.placed_cues, 3);
    assert_eq!(summary.compressed, 1);
    assert_eq!(summary.stretched, 1);
    assert_eq!(summary.clamped, 0);

    // 1.5 и 2/3 одинаково далеки от 1.0 в логарифмической шкале
    let worst = summary.worst_ratio.expect("есть коэффициенты");
    assert!((worst.ratio.ln().abs() - 1.5f64.ln()).abs() < 1e-9);

    let expected_average = (1.0 + 1.0 / 1.5 + 1.5) / 3.0;
    assert!((summary.average_ratio - expected_average).abs() < 1e-9);
    assert!(summary.total_drift < 1e-9);
    assert!(report.cues.iter().all(|c| c.within_tolerance));
    assert_eq!(report.backend, StretchBackend::PhaseVocoder);
    Ok(())
}

#[tokio::test]
async fn test_report_is_idempotent_and_serializable() -> Result<()> {
    let cues = vec![Cue::new(1, 0.0, 1.0, "x"), Cue::new(2, 0.9, 1.2, "y")];
    let (plan, assembly) = run(&cues, &[1.0, 0.3]).await?;

    let first = build_report(&plan, &assembly);
    let second = build_report(&plan, &assembly);
    assert_eq!(first, second);

    let json = first.to_json()?;
    let value: serde_json::Value = serde_json::from_str(&json)?;
    assert_eq!(value["cues"][1]["kind"], "overlap_shifted");
    assert_eq!(value["summary"]["shifted"], 1);

    let text = first.to_string();
    assert!(text.contains("overlap-shifted"));
    assert!(text.contains(&first.generation_info()));
    assert!(first.render_debug().contains("CueReport"));
    Ok(())
}

#[tokio::test]
async fn test_report_durations_gaps_and_overruns() -> Result<()> {
    let cues = vec![
        Cue::new(1, 0.0, 1.0, "раз"),
        Cue::new(2, 1.5, 2.0, "два"),
        Cue::new(3, 2.5, 3.0, "три"),
    ];
    let segments = vec![tone(0.6), tone(0.8), tone(0.3)];
    let plan = TimingCalculator::new(RATE)
        .with_mode(TimingMode::PadWithSilence)
        .compute_plan(&cues, &TimingCalculator::natural_durations(&segments))?;
    let assembly = AudioAssembler::new(Arc::new(PhaseVocoderStretcher::default()), RATE)
        .assemble(&segments, &plan, &CancellationToken::new())
        .await?;
    let report = build_report(&plan, &assembly);

    let second = &report.cues[1];
    assert!((second.natural_duration - 0.8).abs() < 1e-9);
    assert!((second.requested_duration - 0.5).abs() < 1e-9);
    assert!(!second.trimmed);

    let summary = &report.summary;
    // 0.6 -> 1.5 и 2.3 -> 2.5
    assert_eq!(summary.silence_gaps, 2);
    assert!((summary.total_gap_duration - 1.1).abs() < 1e-6);
    assert_eq!(summary.overruns, 1);
    assert!((summary.total_overrun_duration - 0.3).abs() < 1e-9);
    assert_eq!(summary.trimmed, 0);

    let text = report.render_text();
    assert!(text.contains("0.50 с окно, 0.80 с естественная"));
    assert!(text.contains("Пауз тишины: 2"));
    Ok(())
}

#[tokio::test]
async fn test_trimmed_segment_is_counted() -> Result<()> {
    // Внешний бэкенд отдает сигнал длиннее запрошенного
    struct Overlong;

    #[async_trait::async_trait]
    impl Stretcher for Overlong {
        fn backend(&self) -> StretchBackend {
            StretchBackend::Ffmpeg
        }

        async fn stretch(&self, audio: &AudioData, target: f64, _cancel: &CancellationToken) -> Result<AudioData> {
            let len = (target * audio.sample_rate as f64).round() as usize + 160;
            Ok(AudioData::new(vec![0.1; len], audio.sample_rate))
        }
    }

    let cues = vec![Cue::new(1, 0.0, 1.5, "длинно")];
    let segments = vec![tone(1.0)];
    let plan = TimingCalculator::new(RATE).compute_plan(&cues, &TimingCalculator::natural_durations(&segments))?;
    let assembly = AudioAssembler::new(Arc::new(Overlong), RATE)
        .assemble(&segments, &plan, &CancellationToken::new())
        .await?;

    assert_eq!(assembly.placements[0].trimmed_tail, 160);
    assert_eq!(assembly.audio.len(), 24000);

    let report = build_report(&plan, &assembly);
    assert!(report.cues[0].trimmed);
    assert_eq!(report.summary.trimmed, 1);
    assert!(report.cues[0].notes.iter().any(|n| n.contains("обрезан хвост")));
    Ok(())
}

#[tokio::test]
async fn test_malformed_cue_is_reported() -> Result<()> {
    let cues = vec![Cue::new(1, 0.0, 1.0, "ok"), Cue::new(2, 2.0, 2.0, "пустое окно")];
    let (plan, assembly) = run(&cues, &[1.0, 0.5]).await?;
    let report = ReportGenerator::new(0.1).build(&plan, &assembly);

    let malformed = &report.cues[1];
    assert_eq!(malformed.kind, AdjustmentKind::Malformed);
    assert!(malformed.deviation.is_none());
    assert!(malformed.notes.iter().any(|n| n.contains("некорректные")));
    assert_eq!(report.summary.malformed, 1);
    assert_eq!(report.deviation_tolerance, 0.1);
    Ok(())
}

#[tokio::test]
async fn test_adjusted_srt_uses_actual_windows() -> Result<()> {
    let cues = vec![
        Cue::new(7, 0.0, 1.0, "Первая"),
        Cue::new(8, 0.5, 1.5, "Вторая"),
    ];
    let (plan, assembly) = run(&cues, &[1.0, 1.0]).await?;
    let srt = render_adjusted_srt(&plan, &assembly.placements);

    let expected = "7\n00:00:00,000 --> 00:00:01,000\nПервая\n\n8\n00:00:01,000 --> 00:00:02,000\nВторая\n";
    assert_eq!(srt, expected);
    Ok(())
}
