//! Time-bounded holder of the latest aggregation result.
//!
//! The cache moves through empty → populated → stale → recomputing. At most
//! one aggregation runs at a time: callers that arrive while one is in flight
//! wait on the same computation and receive the same `Arc`. A failed
//! aggregation leaves any previous result and its expiry untouched.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::aggregator::{Aggregate, AggregateError};
use crate::story::AggregationResult;

type RefreshOutcome = Result<Arc<AggregationResult>, AggregateError>;
type PendingRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

#[derive(Default)]
struct CacheState {
    data: Option<Arc<AggregationResult>>,
    expires_at: Option<Instant>,
    pending: Option<PendingRefresh>,
}

impl CacheState {
    fn fresh(&self, now: Instant) -> Option<Arc<AggregationResult>> {
        match (&self.data, self.expires_at) {
            (Some(data), Some(expires_at)) if now < expires_at => Some(Arc::clone(data)),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct NewsCache {
    aggregator: Arc<dyn Aggregate>,
    ttl: Duration,
    state: Arc<Mutex<CacheState>>,
}

impl NewsCache {
    pub fn new(aggregator: Arc<dyn Aggregate>, ttl: Duration) -> Self {
        Self {
            aggregator,
            ttl,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    /// Returns the cached result while it is fresh, otherwise joins or starts
    /// a refresh. `force_refresh` skips the freshness check but still joins a
    /// refresh that is already running.
    pub async fn get(&self, force_refresh: bool) -> RefreshOutcome {
        let pending = {
            let mut state = self.state.lock().await;

            if !force_refresh {
                if let Some(data) = state.fresh(Instant::now()) {
                    debug!("Serving cached news");
                    return Ok(data);
                }
            }

            match &state.pending {
                Some(pending) => {
                    debug!("Joining in-flight news refresh");
                    pending.clone()
                }
                None => {
                    let pending = self.start_refresh();
                    state.pending = Some(pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    /// Whether an aggregation is currently running.
    pub async fn is_refreshing(&self) -> bool {
        self.state.lock().await.pending.is_some()
    }

    /// Warms the cache once, logging instead of returning a failure.
    pub async fn prefetch(&self) {
        info!("Starting initial news fetch");
        if let Err(e) = self.get(false).await {
            error!("Initial news fetch failed: {}", e);
        }
    }

    // Called with the state lock held, so the spawned task cannot clear
    // `pending` before the caller has registered it.
    fn start_refresh(&self) -> PendingRefresh {
        let aggregator = Arc::clone(&self.aggregator);
        let state = Arc::clone(&self.state);
        let ttl = self.ttl;

        info!("Starting news refresh");
        let task = tokio::spawn(async move {
            let outcome = match AssertUnwindSafe(aggregator.aggregate()).catch_unwind().await {
                Ok(outcome) => outcome.map(Arc::new),
                Err(panic) => Err(AggregateError::Task(panic_message(panic.as_ref()))),
            };

            let mut state = state.lock().await;
            match &outcome {
                Ok(result) => {
                    state.data = Some(Arc::clone(result));
                    state.expires_at = Some(Instant::now() + ttl);
                    info!("News refresh stored {} stories", result.items.len());
                }
                Err(e) => error!("News refresh failed: {}", e),
            }
            state.pending = None;

            outcome
        });

        async move {
            task.await
                .unwrap_or_else(|e| Err(AggregateError::Task(e.to_string())))
        }
        .boxed()
        .shared()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        format!("aggregation panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("aggregation panicked: {}", s)
    } else {
        "aggregation panicked".to_string()
    }
}
