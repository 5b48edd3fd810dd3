use log::{debug, error, info, trace, warn, Level, LevelFilter, Log};
use env_logger::Builder;
use std::io::Write;
use std::sync::Once;

/// Цель логирования для сообщений об отдельных субтитрах
pub const CUE_TARGET: &str = "srt_sync::cue";

static INIT: Once = Once::new();

/// Логгер для тестов: пишет в stdout, чтобы вывод перехватывался тестовым раннером
#[derive(Clone)]
struct TestLogger {
    level: LevelFilter,
}

impl Log for TestLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        println!(
            "{} {:<5} {} | {}",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

/// Настраивает логирование для библиотеки
///
/// Уровень из настроек можно переопределить через `RUST_LOG`, например
/// `RUST_LOG=srt_sync::cue=debug` покажет решения по каждому субтитру.
pub fn setup_logging(level: LevelFilter) {
    let mut builder = Builder::new();

    builder.filter_level(level);
    builder.parse_default_env();
    builder.format(|buf, record| {
        let ts = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        if record.target() == CUE_TARGET {
            writeln!(buf, "{} [{}] субтитры: {}", ts, record.level(), record.args())
        } else {
            writeln!(buf, "{} [{}] {}", ts, record.level(), record.args())
        }
    });

    if builder.try_init().is_ok() {
        info!("Логирование синхронизации включено, уровень {}", level);
    }
}

/// Настраивает логирование для тестов (повторные вызовы игнорируются)
pub fn setup_test_logging(level: LevelFilter) {
    INIT.call_once(|| {
        if log::set_boxed_logger(Box::new(TestLogger { level })).is_ok() {
            log::set_max_level(level);
        }
    });
}

/// Логирует ошибку и возвращает её
pub fn log_error<T, E: std::fmt::Display>(err: E, message: &str) -> Result<T, crate::error::Error> {
    let error_message = format!("{}: {}", message, err);
    error!("{}", error_message);
    Err(crate::error::Error::LoggedError(error_message))
}

/// Логирует решение по конкретному субтитру
pub fn log_cue(level: Level, cue_index: usize, message: &str) {
    log::log!(target: CUE_TARGET, level, "#{}: {}", cue_index, message);
}

/// Логирует предупреждение
pub fn log_warning(message: &str) {
    warn!("{}", message);
}

/// Логирует информационное сообщение
pub fn log_info(message: &str) {
    info!("{}", message);
}

/// Логирует отладочное сообщение
pub fn log_debug(message: &str) {
    debug!("{}", message);
}

pub fn log_trace(message: &str) {
    trace!("{}", message);
}
