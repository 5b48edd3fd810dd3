use crate::error::{Error, ErrorType, Result};
use std::sync::{Arc, Mutex};

/// Тип для функций обратного вызова прогресса
pub type ProgressCallback = Box<dyn Fn(f32, &str) + Send + Sync + 'static>;

#[derive(Debug, Default)]
struct ProgressState {
    progress: f32,
    status: String,
}

/// Трекер прогресса
///
/// Клонируется дешево: все копии разделяют одно состояние, поэтому его
/// можно передавать в рабочие задачи ассемблера.
#[derive(Clone)]
pub struct ProgressTracker {
    state: Arc<Mutex<ProgressState>>,
    callback: Option<Arc<ProgressCallback>>,
}

impl ProgressTracker {
    /// Создает новый трекер прогресса
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ProgressState::default())),
            callback: None,
        }
    }

    /// Создает новый трекер прогресса с функцией обратного вызова
    pub fn with_callback(callback: ProgressCallback) -> Self {
        Self {
            state: Arc::new(Mutex::new(ProgressState::default())),
            callback: Some(Arc::new(callback)),
        }
    }

    /// Устанавливает функцию обратного вызова
    pub fn set_callback(&mut self, callback: ProgressCallback) {
        self.callback = Some(Arc::new(callback));
    }

    /// Обновляет прогресс
    pub fn update(&self, progress: f32, status: &str) -> Result<()> {
        let clamped_progress = progress.clamp(0.0, 100.0);

        {
            let mut state = self.state.lock().map_err(|e| {
                Error::new(ErrorType::Synchronization, &format!("Состояние прогресса повреждено: {}", e))
            })?;
            state.progress = clamped_progress;
            state.status = status.to_string();
        }

        if let Some(callback) = &self.callback {
            callback(clamped_progress, status);
        }

        Ok(())
    }

    /// Возвращает текущий прогресс
    pub fn get_progress(&self) -> f32 {
        self.state
            .lock()
            .map(|s| s.progress)
            .unwrap_or_else(|poisoned| poisoned.into_inner().progress)
    }

    /// Возвращает текущий статус
    pub fn get_status(&self) -> String {
        self.state
            .lock()
            .map(|s| s.status.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().status.clone())
    }

    /// Создает дочерний трекер прогресса с заданным диапазоном
    pub fn create_child(&self, start: f32, end: f32) -> ChildProgressTracker {
        ChildProgressTracker {
            parent: self.clone(),
            start,
            end,
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Дочерний трекер прогресса
#[derive(Clone)]
pub struct ChildProgressTracker {
    /// Родительский трекер прогресса
    parent: ProgressTracker,
    /// Начальное значение прогресса в родительском трекере
    start: f32,
    /// Конечное значение прогресса в родительском трекере
    end: f32,
}

impl ChildProgressTracker {
    /// Обновляет прогресс
    pub fn update(&self, progress: f32, status: &str) -> Result<()> {
        let clamped_progress = progress.clamp(0.0, 100.0);
        let parent_progress = self.start + (self.end - self.start) * clamped_progress / 100.0;
        self.parent.update(parent_progress, status)
    }

    /// Обновляет прогресс по числу завершенных шагов
    pub fn step(&self, done: usize, total: usize, status: &str) -> Result<()> {
        let progress = if total == 0 {
            100.0
        } else {
            done as f32 * 100.0 / total as f32
        };
        self.update(progress, status)
    }
}
