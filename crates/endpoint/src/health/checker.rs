use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::task::JoinHandle;

use crate::health::backoff::Backoff;
use crate::health::context::CheckerContext;

/// One running health probe, stoppable exactly once (§4.6 "Lifecycle",
/// "asynchronous closeable").
#[async_trait]
pub trait HealthChecker: Send + Sync {
    async fn close(&self);
}

/// Starts a [`HealthChecker`] for a candidate endpoint.
pub trait CheckerFactory: Send + Sync {
    fn create(&self, context: Arc<CheckerContext>) -> Arc<dyn HealthChecker>;
}

impl<F> CheckerFactory for F
where
    F: Fn(Arc<CheckerContext>) -> Arc<dyn HealthChecker> + Send + Sync,
{
    fn create(&self, context: Arc<CheckerContext>) -> Arc<dyn HealthChecker> {
        self(context)
    }
}

/// Long-polling HTTP health checker (§6 "Health-check header").
///
/// Sends `If-None-Match: "healthy"|"unhealthy"` paired with
/// `Prefer: wait=<seconds>` against the endpoint's health-check path, and
/// interprets the response: `200` unconditionally reports healthy, `503`
/// reports unhealthy, and `304` means "no change, poll again". When
/// `max_long_poll_wait` is zero, long polling is disabled for this endpoint
/// and the checker falls back to plain backoff-spaced GETs without the
/// `If-None-Match`/`Prefer` headers.
pub struct LongPollingChecker {
    handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl LongPollingChecker {
    pub fn spawn(
        context: Arc<CheckerContext>,
        client: reqwest::Client,
        health_check_path: String,
        backoff: Arc<dyn Backoff>,
        max_long_poll_wait: Duration,
    ) -> Arc<Self> {
        let handle = tokio::spawn(run_loop(context, client, health_check_path, backoff, max_long_poll_wait));
        Arc::new(Self {
            handle: tokio::sync::Mutex::new(Some(handle)),
        })
    }
}

#[async_trait]
impl HealthChecker for LongPollingChecker {
    async fn close(&self) {
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
    }
}

async fn run_loop(
    context: Arc<CheckerContext>,
    client: reqwest::Client,
    health_check_path: String,
    backoff: Arc<dyn Backoff>,
    max_long_poll_wait: Duration,
) {
    let mut last_known = LastKnown::Unknown;

    loop {
        let url = format!("https://{}{}", context.endpoint().authority(), health_check_path);
        let mut request = client.get(&url);
        if max_long_poll_wait > Duration::ZERO {
            request = request
                .header("If-None-Match", last_known.etag())
                .header("Prefer", format!("wait={}", max_long_poll_wait.as_secs()));
        }

        match request.send().await {
            Ok(response) => match response.status() {
                StatusCode::OK => {
                    last_known = LastKnown::Healthy;
                    context.update_health(1.0);
                }
                StatusCode::SERVICE_UNAVAILABLE => {
                    last_known = LastKnown::Unhealthy;
                    context.update_health(0.0);
                }
                StatusCode::NOT_MODIFIED => {
                    // No change: keep reporting the last known value.
                }
                _ => {
                    tracing::warn!(%url, status = %response.status(), "unexpected health check response");
                }
            },
            Err(error) => {
                tracing::warn!(%url, %error, "health check request failed");
                context.update_health(0.0);
                last_known = LastKnown::Unhealthy;
            }
        }

        tokio::time::sleep(backoff.next_delay()).await;
    }
}

#[derive(Clone, Copy)]
enum LastKnown {
    Unknown,
    Healthy,
    Unhealthy,
}

impl LastKnown {
    fn etag(self) -> &'static str {
        match self {
            LastKnown::Unknown => "",
            LastKnown::Healthy => "\"healthy\"",
            LastKnown::Unhealthy => "\"unhealthy\"",
        }
    }
}
