//! Per-client fixed-window rate limiting.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use detti_cli::RateLimits;

/// Clients tracked before idle ones are pruned.
const PRUNE_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Copy)]
struct Window {
    span: Duration,
    limit: u32,
    unit: &'static str,
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    started: Instant,
    hits: u32,
}

/// A request limit that was hit, e.g. `100 per 1 minute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exceeded {
    pub limit: u32,
    pub unit: &'static str,
}

impl std::fmt::Display for Exceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} per 1 {}", self.limit, self.unit)
    }
}

/// Counts requests per client address in fixed windows.
pub struct RateLimiter {
    windows: Vec<Window>,
    clients: Mutex<HashMap<IpAddr, Vec<Counter>>>,
}

impl RateLimiter {
    /// Builds a limiter from the configured limits. Zero limits are skipped.
    pub fn new(limits: &RateLimits) -> Self {
        const SECOND: u64 = 1;
        const MINUTE: u64 = 60 * SECOND;
        const HOUR: u64 = 60 * MINUTE;
        const DAY: u64 = 24 * HOUR;

        let windows = [
            (limits.per_day, DAY, "day"),
            (limits.per_hour, HOUR, "hour"),
            (limits.per_minute, MINUTE, "minute"),
            (limits.per_second, SECOND, "second"),
        ]
        .into_iter()
        .filter(|(limit, _, _)| *limit > 0)
        .map(|(limit, secs, unit)| Window {
            span: Duration::from_secs(secs),
            limit,
            unit,
        })
        .collect();

        Self {
            windows,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true if no window is configured.
    pub fn is_disabled(&self) -> bool {
        self.windows.is_empty()
    }

    /// Records a request from `ip` at `now`.
    ///
    /// A rejected request is not counted against any window.
    pub fn check(&self, ip: IpAddr, now: Instant) -> Result<(), Exceeded> {
        if self.is_disabled() {
            return Ok(());
        }

        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if clients.len() >= PRUNE_THRESHOLD {
            self.prune(&mut clients, now);
        }

        let counters = clients.entry(ip).or_insert_with(|| {
            vec![
                Counter {
                    started: now,
                    hits: 0,
                };
                self.windows.len()
            ]
        });

        for (window, counter) in self.windows.iter().zip(counters.iter_mut()) {
            if now.duration_since(counter.started) >= window.span {
                *counter = Counter {
                    started: now,
                    hits: 0,
                };
            }
            if counter.hits >= window.limit {
                return Err(Exceeded {
                    limit: window.limit,
                    unit: window.unit,
                });
            }
        }

        for counter in counters.iter_mut() {
            counter.hits += 1;
        }
        Ok(())
    }

    /// Drops clients whose every window has expired.
    fn prune(&self, clients: &mut HashMap<IpAddr, Vec<Counter>>, now: Instant) {
        clients.retain(|_, counters| {
            self.windows
                .iter()
                .zip(counters.iter())
                .any(|(w, c)| now.duration_since(c.started) < w.span)
        });
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Answers 429 once the client address is over any limit.
pub async fn enforce(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    if let Err(exceeded) = limiter.check(ip, Instant::now()) {
        warn!("detti: rate limit {} hit by {}", exceeded, ip);
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "message": exceeded.to_string() })),
        )
            .into_response();
    }

    next.run(req).await
}
