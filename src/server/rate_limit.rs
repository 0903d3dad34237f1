use super::{client_ip, AppState};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dashmap::DashMap;
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};

const MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    second: u64,
    count: u32,
}

/// Fixed one-second window counter per client key.
#[derive(Debug)]
pub(crate) struct RateLimiter {
    limit_per_second: u32,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    /// A limit of 0 disables limiting
    pub(crate) fn new(limit_per_second: u32) -> Self {
        Self {
            limit_per_second,
            windows: DashMap::new(),
        }
    }

    pub(crate) fn check(&self, key: &str) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.check_at(key, now)
    }

    fn check_at(&self, key: &str, second: u64) -> bool {
        if self.limit_per_second == 0 {
            return true;
        }
        if self.windows.len() >= MAX_ENTRIES && !self.windows.contains_key(key) {
            self.evict(second);
        }

        let mut window = self
            .windows
            .entry(key.to_string())
            .or_insert(Window { second, count: 0 });
        if window.second != second {
            *window = Window { second, count: 0 };
        }
        if window.count >= self.limit_per_second {
            return false;
        }
        window.count += 1;
        true
    }

    /// Drop windows from earlier seconds, then arbitrary keys until one slot is free
    fn evict(&self, second: u64) {
        self.windows.retain(|_, w| w.second == second);
        let mut overflow = (self.windows.len() + 1).saturating_sub(MAX_ENTRIES);
        if overflow > 0 {
            self.windows.retain(|_, _| {
                if overflow == 0 {
                    return true;
                }
                overflow -= 1;
                false
            });
        }
    }
}

pub(crate) async fn enforce(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(request.headers(), request.extensions());
    let key = if ip.is_empty() { "unknown" } else { ip.as_str() };

    if state.limiter.check(key) {
        return next.run(request).await;
    }

    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": "too_many_requests",
            "limitPerSecond": state.limiter.limit_per_second,
        })),
    )
        .into_response()
}
