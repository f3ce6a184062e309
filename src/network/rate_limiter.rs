//! Per-client rate limiting
//!
//! Fixed window per client address:
//! - `now - window_start >= window`: restart the window with count 1
//! - otherwise increment; over `max_requests` is rejected
//!
//! Loopback clients are not limited unless the exemption is switched off.
//! When the table already tracks
//! `max_clients` addresses, unseen addresses are let through untracked.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::RateLimitConfig;

#[derive(Debug, Clone, Copy)]
struct Window {
    start: Instant,
    count: u32,
}

/// Rate limiter shared by the accept loop
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    max_clients: usize,
    exempt_loopback: bool,
    clients: Mutex<HashMap<IpAddr, Window>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: config.window(),
            max_clients: config.max_clients,
            exempt_loopback: config.exempt_loopback,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request from `addr`; false means reject with 429
    pub fn check(&self, addr: IpAddr) -> bool {
        self.check_at(addr, Instant::now())
    }

    /// `check` against an explicit clock
    pub fn check_at(&self, addr: IpAddr, now: Instant) -> bool {
        if self.exempt_loopback && addr.is_loopback() {
            return true;
        }

        let mut clients = self.clients.lock();

        if !clients.contains_key(&addr) && clients.len() >= self.max_clients {
            // Drop expired windows before giving up on tracking
            let window = self.window;
            clients.retain(|_, w| now.saturating_duration_since(w.start) < window);
            if clients.len() >= self.max_clients {
                return true;
            }
        }

        let entry = clients.entry(addr).or_insert(Window { start: now, count: 0 });
        if now.saturating_duration_since(entry.start) >= self.window {
            entry.start = now;
            entry.count = 1;
            return true;
        }

        entry.count = entry.count.saturating_add(1);
        if entry.count > self.max_requests {
            tracing::debug!("Rate limit exceeded for {} ({} requests)", addr, entry.count);
            return false;
        }
        true
    }

    /// Number of addresses currently tracked
    pub fn tracked(&self) -> usize {
        self.clients.lock().len()
    }
}
