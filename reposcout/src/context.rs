/// This module implements the request context passed through every backend call, and the
/// deadline extension used by full-deadline searches.
///
/// # Rust vs .NET Cancellation
///
/// .NET links a timeout and a manual cancel into one token:
/// ```csharp
/// using var cts = CancellationTokenSource.CreateLinkedTokenSource(callerToken);
/// cts.CancelAfter(TimeSpan.FromMinutes(1));
/// // Once cancelled, you cannot tell a timeout from a user cancel
/// ```
///
/// Here the two stay separate. A `SearchContext` carries a `CancellationToken` for explicit
/// cancellation and an optional deadline, and `done()` reports which of the two ended it:
/// ```rust,ignore
/// match ctx.done().await {
///     DoneReason::Canceled => // Caller went away,
///     DoneReason::DeadlineExceeded => // Time budget spent,
/// }
/// ```
///
/// That distinction is what `extend_deadline` relies on: it forwards cancellation to a
/// derived context but ignores deadline expiry, leaving the time limit to the backend's
/// own `max_wall_time` so results found before the deadline are still returned.
use std::future::Future;
use std::ops::Deref;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

use crate::errors::{SearchError, SearchResult};

/// Why a context ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneReason {
    Canceled,
    DeadlineExceeded,
}

impl From<DoneReason> for SearchError {
    fn from(reason: DoneReason) -> Self {
        match reason {
            DoneReason::Canceled => SearchError::Canceled,
            DoneReason::DeadlineExceeded => SearchError::DeadlineExceeded,
        }
    }
}

/// Cancellation signal plus optional deadline for one request
#[derive(Debug, Clone)]
pub struct SearchContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for SearchContext {
    fn default() -> Self {
        Self::background()
    }
}

impl SearchContext {
    /// A context that is never canceled and has no deadline
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Derives a context canceled together with this one, or on its own `cancel`
    pub fn with_cancel(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derives a context whose deadline is the earlier of `deadline` and this one's
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline, zero once it has passed
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Reports why the context ended, or `None` while it is still live
    pub fn err(&self) -> Option<DoneReason> {
        if self.token.is_cancelled() {
            return Some(DoneReason::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(DoneReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is canceled or its deadline passes
    pub async fn done(&self) -> DoneReason {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => DoneReason::Canceled,
                    _ = sleep_until(deadline) => DoneReason::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                DoneReason::Canceled
            }
        }
    }

    /// Runs `fut` until it completes or the context ends, whichever comes first
    pub async fn run<F, T>(&self, fut: F) -> SearchResult<T>
    where
        F: Future<Output = SearchResult<T>>,
    {
        if let Some(reason) = self.err() {
            return Err(reason.into());
        }
        tokio::select! {
            biased;
            reason = self.done() => Err(reason.into()),
            result = fut => result,
        }
    }
}

/// A derived context that ignores the parent's deadline.
///
/// Dropping it cancels the derived context, which also ends the watcher task.
pub struct ExtendedContext {
    ctx: SearchContext,
    _guard: DropGuard,
}

impl std::fmt::Debug for ExtendedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtendedContext")
            .field("ctx", &self.ctx)
            .finish()
    }
}

impl Deref for ExtendedContext {
    type Target = SearchContext;

    fn deref(&self) -> &SearchContext {
        &self.ctx
    }
}

/// Produces a context with no deadline that is canceled when `parent` ends for any
/// reason other than its deadline passing.
pub fn extend_deadline(parent: &SearchContext) -> ExtendedContext {
    let ctx = SearchContext::background();
    let token = ctx.token.clone();
    let parent = parent.clone();

    tokio::spawn(async move {
        tokio::select! {
            reason = parent.done() => {
                // A deadline is enforced by the backend's max wall time instead
                if reason != DoneReason::DeadlineExceeded {
                    debug!("caller context canceled, canceling extended context");
                    token.cancel();
                }
            }
            _ = token.cancelled() => {}
        }
    });

    ExtendedContext {
        _guard: ctx.token.clone().drop_guard(),
        ctx,
    }
}
