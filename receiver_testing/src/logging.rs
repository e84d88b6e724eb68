use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use logtest::Logger;
use rstest::fixture;

/// Handle to the global logger with exclusive access.
///
/// `logtest` installs a process-wide logger, so captures from concurrent
/// tests would interleave. Holding this guard serialises access.
pub struct LoggerHandle {
    guard: MutexGuard<'static, Logger>,
}

impl LoggerHandle {
    /// Acquire the global [`Logger`] and discard anything already captured.
    pub fn new() -> Self {
        static LOGGER: OnceLock<Mutex<Logger>> = OnceLock::new();

        let logger = LOGGER.get_or_init(|| Mutex::new(Logger::start()));
        // A test that panicked while holding the guard leaves nothing to repair.
        let mut guard = logger.lock().unwrap_or_else(PoisonError::into_inner);
        while guard.pop().is_some() {}

        Self { guard }
    }

    /// Drain captured records and return their rendered messages.
    pub fn messages(&mut self) -> Vec<String> {
        std::iter::from_fn(|| self.guard.pop())
            .map(|record| record.args().to_owned())
            .collect()
    }

    /// Returns `true` if any captured message contains `needle`.
    ///
    /// Drains the capture.
    pub fn contains(&mut self, needle: &str) -> bool {
        self.messages().iter().any(|message| message.contains(needle))
    }
}

impl Default for LoggerHandle {
    fn default() -> Self { Self::new() }
}

impl std::ops::Deref for LoggerHandle {
    type Target = Logger;

    fn deref(&self) -> &Self::Target { &self.guard }
}

impl std::ops::DerefMut for LoggerHandle {
    fn deref_mut(&mut self) -> &mut Self::Target { &mut self.guard }
}

#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn logger() -> LoggerHandle { LoggerHandle::new() }
