use async_trait::async_trait;
use srt_sync::{
    AssemblyStatus, AudioAssembler, AudioData, CancellationToken, Cue, Error, PhaseVocoderStretcher,
    RenderStatus, ResampleQuality, Result, StretchBackend, Stretcher, TimingCalculator, TimingMode,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const RATE: u32 = 16000;

fn tone(freq: f32, sample_rate: u32, seconds: f64) -> AudioData {
    let len = (sample_rate as f64 * seconds).round() as usize;
    let samples = (0..len)
        .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin() * 0.5)
        .collect();
    AudioData::new(samples, sample_rate)
}

fn cues(windows: &[(f64, f64)]) -> Vec<Cue> {
    windows
        .iter()
        .enumerate()
        .map(|(i, &(start, end))| Cue::new(i + 1, start, end, format!("Реплика {}", i + 1)))
        .collect()
}

// Мок внешнего бэкенда, который всегда завершается ошибкой
struct BrokenExternal;

#[async_trait]
impl Stretcher for BrokenExternal {
    fn backend(&self) -> StretchBackend {
        StretchBackend::Ffmpeg
    }

    async fn stretch(&self, _audio: &AudioData, _target: f64, _cancel: &CancellationToken) -> Result<AudioData> {
        Err(Error::backend("ffmpeg", "процесс упал"))
    }
}

// Мок вокодера, который не может растянуть ни один сегмент
struct BrokenVocoder;

#[async_trait]
impl Stretcher for BrokenVocoder {
    fn backend(&self) -> StretchBackend {
        StretchBackend::PhaseVocoder
    }

    async fn stretch(&self, _audio: &AudioData, _target: f64, _cancel: &CancellationToken) -> Result<AudioData> {
        Err(Error::AudioProcessing("численная ошибка".to_string()))
    }
}

// Первый вызов отрабатывает, следующий запрашивает отмену и ждет ее
struct CancelOnSecondCall {
    calls: AtomicUsize,
}

#[async_trait]
impl Stretcher for CancelOnSecondCall {
    fn backend(&self) -> StretchBackend {
        StretchBackend::PhaseVocoder
    }

    async fn stretch(&self, audio: &AudioData, target: f64, cancel: &CancellationToken) -> Result<AudioData> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            let len = (target * audio.sample_rate as f64).round() as usize;
            return Ok(AudioData::new(vec![0.25; len], audio.sample_rate));
        }
        cancel.cancel();
        cancel.cancelled().await;
        Err(Error::CancellationRequested)
    }
}

fn vocoder_assembler() -> AudioAssembler {
    AudioAssembler::new(Arc::new(PhaseVocoderStretcher::default()), RATE).with_workers(2)
}

#[tokio::test]
async fn test_placements_match_authored_windows() -> Result<()> {
    let segments = vec![tone(440.0, RATE, 1.0), tone(330.0, RATE, 1.5)];
    let plan = TimingCalculator::new(RATE).compute_plan(
        &cues(&[(0.0, 1.0), (1.0, 2.0)]),
        &TimingCalculator::natural_durations(&segments),
    )?;

    let result = vocoder_assembler().assemble(&segments, &plan, &CancellationToken::new()).await?;

    assert_eq!(result.status, AssemblyStatus::Complete);
    assert_eq!(result.audio.len(), 32000);
    let layout: Vec<(usize, usize)> = result.placements.iter().map(|p| (p.offset, p.length)).collect();
    assert_eq!(layout, vec![(0, 16000), (16000, 16000)]);

    assert_eq!(result.placements[0].status, RenderStatus::Passthrough);
    assert_eq!(result.placements[1].status, RenderStatus::Stretched);
    assert_eq!(result.placements[1].backend, Some(StretchBackend::PhaseVocoder));

    // Первый сегмент вставлен без изменений
    assert_eq!(&result.audio.samples[..16000], &segments[0].samples[..]);
    assert!(result.errors.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_overlapping_input_never_overlaps_in_output() -> Result<()> {
    let segments = vec![
        tone(440.0, RATE, 1.0),
        tone(440.0, RATE, 1.0),
        tone(440.0, RATE, 0.3),
        tone(440.0, RATE, 0.7),
    ];
    let plan = TimingCalculator::new(RATE).compute_plan(
        &cues(&[(0.0, 1.0), (0.5, 1.5), (1.4, 1.7), (1.6, 2.3)]),
        &TimingCalculator::natural_durations(&segments),
    )?;

    let result = vocoder_assembler().assemble(&segments, &plan, &CancellationToken::new()).await?;

    assert_eq!(result.placements.len(), 4);
    for pair in result.placements.windows(2) {
        assert!(pair[1].offset >= pair[0].end_offset(), "{:?}", pair);
    }
    assert_eq!(result.placements[1].offset, 16000);
    assert!(result.audio.len() >= result.placements[3].end_offset());
    Ok(())
}

#[tokio::test]
async fn test_gaps_are_filled_with_silence() -> Result<()> {
    let segments = vec![tone(440.0, RATE, 0.5), tone(440.0, RATE, 0.5)];
    let plan = TimingCalculator::new(RATE).compute_plan(
        &cues(&[(0.0, 0.5), (1.0, 1.5)]),
        &TimingCalculator::natural_durations(&segments),
    )?;

    let result = vocoder_assembler().assemble(&segments, &plan, &CancellationToken::new()).await?;

    assert_eq!(result.audio.len(), 24000);
    assert!(result.audio.samples[8000..16000].iter().all(|&s| s == 0.0));
    assert_eq!(result.placements[1].offset, 16000);
    Ok(())
}

#[tokio::test]
async fn test_external_failure_falls_back_to_vocoder() -> Result<()> {
    let segments = vec![tone(440.0, RATE, 1.0)];
    let plan = TimingCalculator::new(RATE).compute_plan(&cues(&[(0.0, 1.5)]), &[1.0])?;

    let result = AudioAssembler::new(Arc::new(BrokenExternal), RATE)
        .assemble(&segments, &plan, &CancellationToken::new())
        .await?;

    let placement = &result.placements[0];
    assert!(placement.fallback);
    assert_eq!(placement.backend, Some(StretchBackend::PhaseVocoder));
    assert_eq!(placement.status, RenderStatus::Stretched);
    assert_eq!(placement.length, 24000);
    assert_eq!(result.backend, StretchBackend::Ffmpeg);
    assert!(matches!(result.errors[0], Error::StretchBackend { .. }));
    Ok(())
}

#[tokio::test]
async fn test_unrecoverable_segment_becomes_silence() -> Result<()> {
    let segments = vec![tone(440.0, RATE, 1.0), tone(440.0, RATE, 1.0)];
    let plan = TimingCalculator::new(RATE).compute_plan(
        &cues(&[(0.0, 1.5), (1.5, 2.5)]),
        &TimingCalculator::natural_durations(&segments),
    )?;

    let result = AudioAssembler::new(Arc::new(BrokenVocoder), RATE)
        .assemble(&segments, &plan, &CancellationToken::new())
        .await?;

    assert_eq!(result.status, AssemblyStatus::Complete);
    assert!(matches!(result.placements[0].status, RenderStatus::Silenced(_)));
    assert!(result.audio.samples[..24000].iter().all(|&s| s == 0.0));
    assert!(matches!(
        result.errors[0],
        Error::UnrecoverableStretch { index: 1, .. }
    ));

    // Трек продолжается: второй сегмент не требует растяжения
    assert_eq!(result.placements[1].status, RenderStatus::Passthrough);
    assert_eq!(&result.audio.samples[24000..40000], &segments[1].samples[..]);
    Ok(())
}

#[tokio::test]
async fn test_non_finite_passthrough_segment_is_silenced() -> Result<()> {
    let mut corrupt = tone(440.0, RATE, 1.0);
    corrupt.samples[100] = f32::NAN;
    corrupt.samples[200] = f32::INFINITY;
    let segments = vec![corrupt, tone(440.0, RATE, 0.5)];
    let plan = TimingCalculator::new(RATE).compute_plan(
        &cues(&[(0.0, 1.0), (1.0, 1.5)]),
        &TimingCalculator::natural_durations(&segments),
    )?;
    assert!(!plan.entries[0].needs_stretch());

    let result = vocoder_assembler().assemble(&segments, &plan, &CancellationToken::new()).await?;

    assert!(result.audio.samples.iter().all(|s| s.is_finite()));
    assert!(matches!(result.placements[0].status, RenderStatus::Silenced(_)));
    assert_eq!(result.placements[0].length, 16000);
    assert!(result.audio.samples[..16000].iter().all(|&s| s == 0.0));
    assert!(matches!(
        result.errors[0],
        Error::UnrecoverableStretch { index: 1, .. }
    ));
    assert_eq!(result.placements[1].status, RenderStatus::Passthrough);
    Ok(())
}

#[tokio::test]
async fn test_pad_mode_keeps_trailing_silence() -> Result<()> {
    let segments = vec![tone(440.0, RATE, 0.6), tone(440.0, RATE, 0.8)];
    let plan = TimingCalculator::new(RATE)
        .with_mode(TimingMode::PadWithSilence)
        .compute_plan(
            &cues(&[(0.0, 1.0), (1.0, 2.0)]),
            &TimingCalculator::natural_durations(&segments),
        )?;

    let result = vocoder_assembler().assemble(&segments, &plan, &CancellationToken::new()).await?;

    assert_eq!(result.audio.len(), 32000);
    assert_eq!(result.placements[1].end_offset(), 28800);
    assert!(result.audio.samples[28800..].iter().all(|&s| s == 0.0));
    Ok(())
}

#[tokio::test]
async fn test_segments_are_resampled_to_common_rate() -> Result<()> {
    let segments = vec![tone(440.0, 22050, 1.0), tone(440.0, 8000, 0.5)];
    let plan = TimingCalculator::new(RATE).compute_plan(
        &cues(&[(0.0, 1.0), (1.0, 1.5)]),
        &TimingCalculator::natural_durations(&segments),
    )?;

    for quality in [ResampleQuality::Fft, ResampleQuality::Linear] {
        let result = vocoder_assembler()
            .with_resample_quality(quality)
            .assemble(&segments, &plan, &CancellationToken::new())
            .await?;

        assert_eq!(result.audio.sample_rate, RATE);
        assert_eq!(result.audio.len(), 24000);
        assert_eq!(result.placements[0].status, RenderStatus::Passthrough);
        assert_eq!(result.placements[1].offset, 16000);
    }
    // Исходные сегменты не изменены
    assert_eq!(segments[0].sample_rate, 22050);
    Ok(())
}

#[tokio::test]
async fn test_empty_segment_keeps_window_silent() -> Result<()> {
    let segments = vec![AudioData::new(Vec::new(), RATE), tone(440.0, RATE, 0.5)];
    let plan = TimingCalculator::new(RATE).compute_plan(
        &cues(&[(0.0, 0.5), (0.5, 1.0)]),
        &TimingCalculator::natural_durations(&segments),
    )?;

    let result = vocoder_assembler().assemble(&segments, &plan, &CancellationToken::new()).await?;

    assert!(matches!(result.placements[0].status, RenderStatus::Silenced(_)));
    assert_eq!(result.placements[0].length, 8000);
    assert!(result.audio.samples[..8000].iter().all(|&s| s == 0.0));
    assert_eq!(result.placements[1].offset, 8000);
    Ok(())
}

#[tokio::test]
async fn test_cancel_before_start_returns_empty_result() -> Result<()> {
    let segments = vec![tone(440.0, RATE, 1.0)];
    let plan = TimingCalculator::new(RATE).compute_plan(&cues(&[(0.0, 1.2)]), &[1.0])?;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = vocoder_assembler().assemble(&segments, &plan, &cancel).await?;

    assert_eq!(result.status, AssemblyStatus::Cancelled);
    assert!(result.placements.is_empty());
    assert!(result.audio.is_empty());
    assert!(matches!(result.into_result(), Err(Error::CancellationRequested)));
    Ok(())
}

#[tokio::test]
async fn test_cancel_mid_run_keeps_only_committed_prefix() -> Result<()> {
    let segments: Vec<AudioData> = (0..4).map(|_| tone(440.0, RATE, 0.5)).collect();
    let plan = TimingCalculator::new(RATE).compute_plan(
        &cues(&[(0.0, 1.0), (1.0, 2.0), (2.0, 3.0), (3.0, 4.0)]),
        &TimingCalculator::natural_durations(&segments),
    )?;
    let stretcher = Arc::new(CancelOnSecondCall {
        calls: AtomicUsize::new(0),
    });
    let cancel = CancellationToken::new();

    let result = AudioAssembler::new(stretcher, RATE)
        .with_workers(1)
        .assemble(&segments, &plan, &cancel)
        .await?;

    assert_eq!(result.status, AssemblyStatus::Cancelled);
    assert!(result.placements.len() <= 1);
    for (i, placement) in result.placements.iter().enumerate() {
        assert_eq!(placement.sequence, i);
    }
    let committed_end = result.placements.last().map(|p| p.end_offset()).unwrap_or(0);
    assert_eq!(result.audio.len(), committed_end);
    Ok(())
}
