//! Request tracing on top of `tracing` spans.

use std::fmt::Display;
use std::time::Instant;
use tracing::{debug, field, info_span, warn, Level, Span};

use crate::errors::SearchError;

/// One traced operation: a span plus lazily built log lines and an error status
#[derive(Debug)]
pub struct Trace {
    span: Span,
    started: Instant,
    error: Option<String>,
}

impl Trace {
    /// Opens a span for `family` titled with `title`
    pub fn new(family: &'static str, title: impl Display) -> Self {
        let span = info_span!(
            "trace",
            family,
            title = %title,
            error = field::Empty,
        );
        Self {
            span,
            started: Instant::now(),
            error: None,
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Logs the line built by `f`, only building it when debug output is on
    pub fn lazy_printf<F>(&self, f: F)
    where
        F: FnOnce() -> String,
    {
        if tracing::enabled!(Level::DEBUG) {
            let _entered = self.span.enter();
            debug!("{}", f());
        }
    }

    pub fn set_error(&mut self, err: &SearchError) {
        let message = err.to_string();
        self.span.record("error", message.as_str());
        self.error = Some(message);
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Closes the span, logging how long it was open
    pub fn finish(self) {
        let _entered = self.span.enter();
        let elapsed = self.started.elapsed();
        match &self.error {
            Some(message) => warn!(?elapsed, "finished with error: {}", message),
            None => debug!(?elapsed, "finished"),
        }
    }
}
