use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Субтитр с заданными автором таймингами
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    /// Порядковый номер субтитра
    pub index: usize,
    /// Время начала в секундах
    pub start: f64,
    /// Время окончания в секундах
    pub end: f64,
    /// Текст субтитра (для движка непрозрачен)
    pub text: String,
}

impl Cue {
    /// Создает новый субтитр
    pub fn new(index: usize, start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            index,
            start,
            end,
            text: text.into(),
        }
    }

    /// Возвращает длительность субтитра в секундах
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Проверяет корректность таймингов
    pub fn validate(&self) -> Result<()> {
        let reason = if !self.start.is_finite() || !self.end.is_finite() {
            Some(format!("нечисловые тайминги {}..{}", self.start, self.end))
        } else if self.start < 0.0 || self.end < 0.0 {
            Some(format!("отрицательное время {:.3}..{:.3}", self.start, self.end))
        } else if self.end <= self.start {
            Some(format!("конец {:.3}с не позже начала {:.3}с", self.end, self.start))
        } else {
            None
        };

        match reason {
            Some(reason) => Err(Error::MalformedCue {
                index: self.index,
                reason,
            }),
            None => Ok(()),
        }
    }
}

/// Обрезает текст до `max_chars` символов, добавляя многоточие
pub fn preview_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

/// Форматирует секунды как SRT-метку `HH:MM:SS,mmm`
pub fn format_srt_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}
