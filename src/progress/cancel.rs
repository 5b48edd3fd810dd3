use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Флаг кооперативной отмены, общий для вызывающего кода и ассемблера
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<CancelState>,
}

impl CancellationToken {
    /// Создает новый (не отмененный) токен
    pub fn new() -> Self {
        Self::default()
    }

    /// Запрашивает отмену и будит всех ожидающих
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }

    /// Проверяет, была ли запрошена отмена
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Возвращает `CancellationRequested`, если отмена уже запрошена
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::CancellationRequested)
        } else {
            Ok(())
        }
    }

    /// Завершается, когда запрошена отмена
    pub async fn cancelled(&self) {
        loop {
            // Notified создается до проверки флага, чтобы не пропустить notify_waiters
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
