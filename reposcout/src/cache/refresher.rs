//! The background loop that keeps the repository snapshot fresh.
//!
//! Each iteration lists every repository under a bounded timeout, then decides
//! whether readers get to see the outcome. Successes are always published.
//! Failures are hidden until more than `error_threshold` of them happen in a
//! row, so a short backend hiccup keeps serving the last good snapshot.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{CacheEntry, CacheInner, ClientState};
use crate::context::SearchContext;
use crate::errors::SearchError;

/// Whether a refresh outcome replaces the published entry
pub fn should_publish(consecutive_errors: u32, threshold: u32) -> bool {
    consecutive_errors == 0 || consecutive_errors > threshold
}

/// `interval` shifted by a uniform offset in `[-jitter / 2, jitter / 2]`
pub fn jittered_interval(interval: Duration, jitter: Duration) -> Duration {
    let window = jitter.as_nanos() as u64;
    if window == 0 {
        return interval;
    }
    let offset = Duration::from_nanos(rand::rng().random_range(0..=window));
    (interval + offset).saturating_sub(jitter / 2)
}

pub(super) async fn run(inner: Arc<CacheInner>) {
    info!("repository refresher started");
    let mut shutdown = inner.shutdown.subscribe();
    let mut error_count: u32 = 0;

    loop {
        {
            let mut shared = inner.shared.write();
            if shared.state == ClientState::Stopped {
                // Keep the last snapshot for readers that already hold it
                shared.refresher_active = false;
                shared.task = None;
                info!("repository refresher stopped");
                return;
            }
            if shared.disabled {
                // Reset so the next cold list_all starts a fresh refresher
                shared.state = ClientState::Idle;
                shared.entry = CacheEntry::Empty;
                shared.refresher_active = false;
                shared.task = None;
                info!("repository refresher idle: client disabled");
                return;
            }
        }

        let timeout = inner.config.list_timeout;
        let ctx = SearchContext::background().with_timeout(timeout);
        let result = inner.list(&ctx).await.map_err(|e| match e {
            SearchError::DeadlineExceeded => SearchError::Timeout(timeout),
            other => other,
        });

        match &result {
            Ok(set) => {
                error_count = 0;
                debug!("refreshed repository list: {} repositories", set.len());
            }
            Err(err) => {
                error_count += 1;
                warn!(
                    "repository list refresh failed ({} in a row): {}",
                    error_count, err
                );
            }
        }

        let publish = should_publish(error_count, inner.config.error_threshold);
        inner.metrics.record_refresh(result.is_ok(), publish);
        if publish {
            inner.shared.write().entry = CacheEntry::from(result);
        } else {
            debug!("keeping previous repository list after transient failure");
        }

        let delay = jittered_interval(inner.config.refresh_interval, inner.config.refresh_jitter);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {
                debug!("repository refresher woken by close");
            }
        }
    }
}
