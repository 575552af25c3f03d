//! Guarded HTTP layer shared by every upstream fetch: per-host rate
//! limiting, bounded retry with jittered exponential backoff, hard
//! timeouts and User-Agent rotation.

use super::{HostRateLimiter, UpstreamError, UpstreamResult};
use rand::Rng;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF_MS: u64 = 500;

lazy_static::lazy_static! {
    static ref USER_AGENTS: Vec<&'static str> = vec![
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    ];
}

fn pick_user_agent() -> &'static str {
    let idx = rand::thread_rng().gen_range(0..USER_AGENTS.len());
    USER_AGENTS[idx]
}

/// Backoff for `attempt` (0-based): base 500ms, factor 2, jitter ±25%.
fn backoff_delay(attempt: u32) -> Duration {
    let base = BASE_BACKOFF_MS * 2u64.pow(attempt);
    let jitter = rand::thread_rng().gen_range(0.75..=1.25);
    Duration::from_millis((base as f64 * jitter) as u64)
}

pub struct UpstreamHttp {
    client: Client,
    limiter: Arc<HostRateLimiter>,
    request_timeout: Duration,
}

impl UpstreamHttp {
    pub fn new(limiter: Arc<HostRateLimiter>, request_timeout: Duration) -> UpstreamResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| UpstreamError::unavailable(format!("http client init: {e}")))?;
        Ok(Self {
            client,
            limiter,
            request_timeout,
        })
    }

    /// GET `url` and deserialize the JSON body. Transient failures (network
    /// errors, timeouts, 5xx, 429) are retried up to three attempts; other
    /// 4xx fail permanently.
    pub async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> UpstreamResult<T> {
        let host = url
            .split('/')
            .nth(2)
            .unwrap_or("unknown")
            .to_string();

        let mut last_error = String::new();
        let mut rate_limited = false;

        for attempt in 0..MAX_ATTEMPTS {
            self.limiter.acquire(&host).await;

            let request = self
                .client
                .get(url)
                .header("User-Agent", pick_user_agent())
                .header("Accept", "application/json");

            match timeout(self.request_timeout, request.send()).await {
                Ok(Ok(response)) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<T>()
                            .await
                            .map_err(|e| UpstreamError::Parse(format!("{url}: {e}")));
                    } else if status == StatusCode::TOO_MANY_REQUESTS {
                        rate_limited = true;
                        last_error = format!("429 from {host}");
                        warn!(%host, attempt = attempt + 1, "throttled by upstream");
                    } else if status.is_server_error() {
                        last_error = format!("status {status}");
                        warn!(%host, %status, attempt = attempt + 1, "upstream server error");
                    } else {
                        // Other 4xx is permanent; retrying cannot help.
                        return Err(UpstreamError::unavailable(format!(
                            "status {status} from {url}"
                        )));
                    }
                }
                Ok(Err(e)) => {
                    last_error = e.to_string();
                    warn!(%host, attempt = attempt + 1, error = %e, "request failed");
                }
                Err(_) => {
                    last_error = format!("timeout after {:?}", self.request_timeout);
                    warn!(%host, attempt = attempt + 1, "request timeout");
                }
            }

            if attempt + 1 < MAX_ATTEMPTS {
                let delay = backoff_delay(attempt);
                debug!(%host, delay_ms = delay.as_millis() as u64, "retrying");
                sleep(delay).await;
            }
        }

        if rate_limited {
            Err(UpstreamError::RateLimited)
        } else {
            Err(UpstreamError::unavailable(format!(
                "retries exhausted: {last_error}"
            )))
        }
    }
}
