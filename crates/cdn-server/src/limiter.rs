//! Admission pacing
//!
//! A leaky bucket that spaces permits `1/rate` apart. Idle time earns up to
//! `slack` permits that may be taken back to back. Callers are never
//! rejected, only delayed.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

pub struct LeakyBucket {
    per: Duration,
    slack: u32,
    next: Mutex<Instant>,
}

impl LeakyBucket {
    /// `rate` permits per second; a rate of zero is treated as one
    pub fn new(rate: u32, slack: u32) -> Self {
        let per = Duration::from_secs(1) / rate.max(1);
        Self {
            per,
            slack,
            next: Mutex::new(Instant::now() + per),
        }
    }

    pub fn interval(&self) -> Duration {
        self.per
    }

    /// Wait for the next permit and return the instant it was granted for
    pub async fn take(&self) -> Instant {
        let now = Instant::now();
        let permit_at = {
            let mut next = self.next.lock().unwrap_or_else(|e| e.into_inner());
            let earliest = now.checked_sub(self.per * self.slack).unwrap_or(now);
            if *next < earliest {
                *next = earliest;
            }
            let permit_at = *next;
            *next += self.per;
            permit_at
        };

        if permit_at > now {
            tokio::time::sleep_until(permit_at).await;
        }
        permit_at.max(now)
    }
}

/// Middleware that holds every request until the bucket admits it
pub async fn admission(
    State(limiter): State<Arc<LeakyBucket>>,
    request: Request,
    next: Next,
) -> Response {
    limiter.take().await;
    next.run(request).await
}
