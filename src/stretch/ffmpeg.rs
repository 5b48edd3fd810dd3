use crate::audio::{AudioData, ResampleQuality};
use crate::error::{Error, Result};
use crate::logging::{log_debug, log_trace};
use crate::progress::CancellationToken;
use crate::stretch::{validate_request, StretchBackend, Stretcher};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const BACKEND_NAME: &str = "ffmpeg";

/// Допустимый диапазон одного фильтра atempo
const ATEMPO_MIN: f64 = 0.5;
const ATEMPO_MAX: f64 = 2.0;

static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^ffmpeg version (\S+)").expect("корректное регулярное выражение"));

/// Растяжение через внешний ffmpeg (цепочка фильтров `atempo`)
#[derive(Debug, Clone)]
pub struct FfmpegStretcher {
    binary: PathBuf,
    version: String,
    timeout: Duration,
}

impl FfmpegStretcher {
    /// Проверяет наличие ffmpeg и определяет его версию
    pub async fn probe(binary: impl AsRef<Path>, timeout: Duration) -> Result<Self> {
        let binary = binary.as_ref().to_path_buf();
        log_debug(&format!("Проверка ffmpeg: {}", binary.display()));

        let output = tokio::time::timeout(
            timeout,
            Command::new(&binary)
                .arg("-version")
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| Error::backend(BACKEND_NAME, "проверка версии превысила таймаут"))?
        .map_err(|e| Error::backend(BACKEND_NAME, format!("не удалось запустить {}: {}", binary.display(), e)))?;

        if !output.status.success() {
            return Err(Error::backend(
                BACKEND_NAME,
                format!("`-version` завершился с кодом {:?}", output.status.code()),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let version = parse_version(&stdout)
            .ok_or_else(|| Error::backend(BACKEND_NAME, "не удалось определить версию"))?;

        Ok(Self {
            binary,
            version,
            timeout,
        })
    }

    /// Версия, найденная при проверке
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Путь к исполняемому файлу
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    async fn run(&self, args: Vec<String>, cancel: &CancellationToken) -> Result<()> {
        log_trace(&format!("{} {}", self.binary.display(), args.join(" ")));

        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::backend(BACKEND_NAME, format!("не удалось запустить процесс: {}", e)))?;

        // При отмене или таймауте future с дочерним процессом сбрасывается и процесс убивается
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::CancellationRequested),
            waited = tokio::time::timeout(self.timeout, child.wait_with_output()) => match waited {
                Err(_) => {
                    return Err(Error::backend(
                        BACKEND_NAME,
                        format!("превышен таймаут {} с", self.timeout.as_secs()),
                    ))
                }
                Ok(result) => result.map_err(|e| Error::backend(BACKEND_NAME, e.to_string()))?,
            },
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last_line = stderr.lines().last().unwrap_or("").trim().to_string();
            return Err(Error::backend(
                BACKEND_NAME,
                format!("код выхода {:?}: {}", output.status.code(), last_line),
            ));
        }
        Ok(())
    }
}

/// Извлекает версию из вывода `ffmpeg -version`
pub fn parse_version(output: &str) -> Option<String> {
    VERSION_RE
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Раскладывает изменение темпа на фильтры в диапазоне [0.5, 2.0]
pub fn atempo_chain(tempo: f64) -> Vec<f64> {
    let mut chain = Vec::new();
    if !tempo.is_finite() || tempo <= 0.0 {
        return chain;
    }

    let mut rest = tempo;
    while rest > ATEMPO_MAX {
        chain.push(ATEMPO_MAX);
        rest /= ATEMPO_MAX;
    }
    while rest < ATEMPO_MIN {
        chain.push(ATEMPO_MIN);
        rest /= ATEMPO_MIN;
    }
    chain.push(rest);
    chain
}

fn filter_arg(tempo: f64) -> String {
    atempo_chain(tempo)
        .iter()
        .map(|factor| format!("atempo={:.6}", factor))
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl Stretcher for FfmpegStretcher {
    fn backend(&self) -> StretchBackend {
        StretchBackend::Ffmpeg
    }

    async fn stretch(
        &self,
        audio: &AudioData,
        target_duration: f64,
        cancel: &CancellationToken,
    ) -> Result<AudioData> {
        let out_len = validate_request(audio, target_duration)?;
        if out_len == audio.len() {
            return Ok(audio.clone());
        }
        cancel.check()?;

        let tempo = audio.duration() / target_duration;
        let dir = tempfile::tempdir()?;
        let input_path = dir.path().join("input.wav");
        let output_path = dir.path().join("output.wav");

        let source = audio.clone();
        let write_path = input_path.clone();
        tokio::task::spawn_blocking(move || source.write_wav(&write_path))
            .await
            .map_err(|e| Error::backend(BACKEND_NAME, format!("запись WAV прервана: {}", e)))??;

        let args = vec![
            "-hide_banner".to_string(),
            "-v".to_string(),
            "error".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            input_path.to_string_lossy().into_owned(),
            "-filter:a".to_string(),
            filter_arg(tempo),
            "-ac".to_string(),
            "1".to_string(),
            "-ar".to_string(),
            audio.sample_rate.to_string(),
            "-c:a".to_string(),
            "pcm_f32le".to_string(),
            output_path.to_string_lossy().into_owned(),
        ];
        self.run(args, cancel).await?;

        let read_path = output_path.clone();
        let stretched = tokio::task::spawn_blocking(move || AudioData::read_wav(&read_path))
            .await
            .map_err(|e| Error::backend(BACKEND_NAME, format!("чтение WAV прервано: {}", e)))?
            .map_err(|e| Error::backend(BACKEND_NAME, format!("некорректный результат: {}", e)))?;

        let stretched = if stretched.sample_rate != audio.sample_rate {
            stretched.resample(audio.sample_rate, ResampleQuality::Linear)?
        } else {
            stretched
        };

        log_trace(&format!(
            "ffmpeg вернул {} сэмплов, ожидалось {}",
            stretched.len(),
            out_len
        ));

        Ok(stretched.fit_to_length(out_len))
    }
}
