//! Shared error-reporting path.
//!
//! Uncaught panics, failed background tasks and failed API calls all end up
//! in [`ErrorReporter::report`], which logs the error, keeps a short history
//! and broadcasts `app:error`.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use crate::events::{Event, EventBus, panic_message};

const HISTORY_LIMIT: usize = 50;

/// Where an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSource {
    Panic,
    Task,
    Api,
    Startup,
    Route,
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorSource::Panic => "panic",
            ErrorSource::Task => "task",
            ErrorSource::Api => "api",
            ErrorSource::Startup => "startup",
            ErrorSource::Route => "route",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: ErrorSource,
    pub message: String,
    pub context: Option<String>,
    pub at: SystemTime,
}

#[derive(Clone)]
pub struct ErrorReporter {
    events: EventBus,
    recent: Arc<Mutex<VecDeque<ErrorReport>>>,
    reporting: Arc<AtomicBool>,
}

impl fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("recent", &self.recent().len())
            .finish()
    }
}

impl ErrorReporter {
    pub fn new(events: EventBus) -> Self {
        Self {
            events,
            recent: Arc::default(),
            reporting: Arc::default(),
        }
    }

    /// Record and broadcast an error. An error raised while a report is
    /// already being broadcast is only logged.
    pub fn report(&self, source: ErrorSource, message: impl Into<String>, context: Option<&str>) {
        let report = ErrorReport {
            source,
            message: message.into(),
            context: context.map(str::to_string),
            at: SystemTime::now(),
        };
        tracing::error!(
            source = %report.source,
            context = report.context.as_deref().unwrap_or(""),
            "{}",
            report.message
        );

        {
            let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
            if recent.len() == HISTORY_LIMIT {
                recent.pop_front();
            }
            recent.push_back(report.clone());
        }

        if self.reporting.swap(true, Ordering::SeqCst) {
            return;
        }
        self.events.emit(Event::AppError(report));
        self.reporting.store(false, Ordering::SeqCst);
    }

    /// Most recent reports, oldest first.
    pub fn recent(&self) -> Vec<ErrorReport> {
        self.recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Route uncaught panics through this reporter, then through the
    /// previously installed hook.
    pub fn install_panic_hook(&self) {
        let reporter = self.clone();
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let location = info
                .location()
                .map(|l| format!("{}:{}", l.file(), l.line()));
            reporter.report(ErrorSource::Panic, panic_message(info.payload()), location.as_deref());
            previous(info);
        }));
    }
}
