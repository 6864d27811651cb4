//! Error-tracking side channel.

use std::error::Error;

/// Receives systemic errors (storage, serialization) for out-of-band
/// tracking. Reporting never fails and never alters control flow.
pub trait ErrorReporter: Send + Sync {
    fn notify(&self, error: &(dyn Error + 'static));
}

/// Default reporter: writes the error and its source chain to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn notify(&self, error: &(dyn Error + 'static)) {
        let mut message = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        tracing::error!("reported: {message}");
    }
}
