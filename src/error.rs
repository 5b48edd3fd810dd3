use thiserror::Error;

/// Типы ошибок, которые могут возникнуть при синхронизации
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// Ошибка ввода/вывода
    Io,
    /// Ошибка обработки аудио
    AudioProcessingError,
    /// Ошибка ресемплинга
    Resampling,
    /// Ошибка синхронизации
    Synchronization,
    /// Неверные параметры
    InvalidParameters,
    /// Некорректные входные данные для растяжения
    InvalidStretchInput,
    /// Ошибка конфигурации
    Config,
}

/// Ошибки, которые могут возникнуть при синхронизации
#[derive(Debug, Error)]
pub enum Error {
    #[error("Ошибка ввода/вывода: {0}")]
    Io(#[from] std::io::Error),

    #[error("Некорректный субтитр #{index}: {reason}")]
    MalformedCue { index: usize, reason: String },

    #[error("Сбой бэкенда растяжения {backend}: {reason}")]
    StretchBackend { backend: String, reason: String },

    #[error("Не удалось растянуть сегмент #{index}: {reason}")]
    UnrecoverableStretch { index: usize, reason: String },

    #[error("Некорректные данные для растяжения: {0}")]
    InvalidStretchInput(String),

    #[error("Обработка отменена")]
    CancellationRequested,

    #[error("Ошибка обработки аудио: {0}")]
    AudioProcessing(String),

    #[error("Ошибка ресемплинга: {0}")]
    Resampling(String),

    #[error("Ошибка синхронизации: {0}")]
    Synchronization(String),

    #[error("Неверные параметры: {0}")]
    InvalidParameters(String),

    #[error("Ошибка конфигурации: {0}")]
    Config(String),

    #[error("Ошибка WAV: {0}")]
    Wav(#[from] hound::Error),

    #[error("Ошибка сериализации JSON: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Ошибка логирования: {0}")]
    LoggedError(String),
}

impl Error {
    /// Создает новую ошибку указанного типа с сообщением
    pub fn new(error_type: ErrorType, message: &str) -> Self {
        match error_type {
            ErrorType::Io => Self::Io(std::io::Error::new(std::io::ErrorKind::Other, message)),
            ErrorType::AudioProcessingError => Self::AudioProcessing(message.to_string()),
            ErrorType::Resampling => Self::Resampling(message.to_string()),
            ErrorType::Synchronization => Self::Synchronization(message.to_string()),
            ErrorType::InvalidParameters => Self::InvalidParameters(message.to_string()),
            ErrorType::InvalidStretchInput => Self::InvalidStretchInput(message.to_string()),
            ErrorType::Config => Self::Config(message.to_string()),
        }
    }

    /// Ошибка внешнего бэкенда растяжения
    pub fn backend(backend: &str, reason: impl Into<String>) -> Self {
        Self::StretchBackend {
            backend: backend.to_string(),
            reason: reason.into(),
        }
    }

    /// Является ли ошибка запросом отмены
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::CancellationRequested)
    }
}

/// Результат с обработкой ошибок
pub type Result<T> = std::result::Result<T, Error>;
