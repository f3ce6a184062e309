//! Tests for the per-client rate limiter

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::{Duration, Instant};

use atlasdb::config::RateLimitConfig;
use atlasdb::network::RateLimiter;

fn limiter(max_requests: u32, window_secs: u64, max_clients: usize) -> RateLimiter {
    RateLimiter::new(&RateLimitConfig {
        max_requests,
        window_secs,
        max_clients,
        exempt_loopback: true,
    })
}

fn remote(last: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(203, 0, 113, last))
}

#[test]
fn test_requests_under_ceiling_pass() {
    let limiter = limiter(5, 60, 100);
    let now = Instant::now();

    for _ in 0..5 {
        assert!(limiter.check_at(remote(1), now));
    }
    assert!(!limiter.check_at(remote(1), now));
    assert!(!limiter.check_at(remote(1), now + Duration::from_secs(59)));
}

#[test]
fn test_window_resets_counter() {
    let limiter = limiter(2, 60, 100);
    let start = Instant::now();

    assert!(limiter.check_at(remote(1), start));
    assert!(limiter.check_at(remote(1), start));
    assert!(!limiter.check_at(remote(1), start));

    let later = start + Duration::from_secs(60);
    assert!(limiter.check_at(remote(1), later));
    assert!(limiter.check_at(remote(1), later));
    assert!(!limiter.check_at(remote(1), later));
}

#[test]
fn test_clients_are_counted_separately() {
    let limiter = limiter(1, 60, 100);
    let now = Instant::now();

    assert!(limiter.check_at(remote(1), now));
    assert!(!limiter.check_at(remote(1), now));
    assert!(limiter.check_at(remote(2), now));
    assert_eq!(limiter.tracked(), 2);
}

#[test]
fn test_loopback_is_exempt() {
    let limiter = limiter(1, 60, 100);
    let now = Instant::now();

    for _ in 0..10 {
        assert!(limiter.check_at(IpAddr::V4(Ipv4Addr::LOCALHOST), now));
        assert!(limiter.check_at(IpAddr::V6(Ipv6Addr::LOCALHOST), now));
    }
    assert_eq!(limiter.tracked(), 0);
}

#[test]
fn test_loopback_exemption_can_be_disabled() {
    let limiter = RateLimiter::new(&RateLimitConfig {
        max_requests: 1,
        window_secs: 60,
        max_clients: 100,
        exempt_loopback: false,
    });
    let now = Instant::now();

    assert!(limiter.check_at(IpAddr::V4(Ipv4Addr::LOCALHOST), now));
    assert!(!limiter.check_at(IpAddr::V4(Ipv4Addr::LOCALHOST), now));
    assert_eq!(limiter.tracked(), 1);
}

#[test]
fn test_full_table_fails_open() {
    let limiter = limiter(1, 60, 2);
    let now = Instant::now();

    assert!(limiter.check_at(remote(1), now));
    assert!(limiter.check_at(remote(2), now));

    // Table full: unseen clients are let through untracked
    for _ in 0..5 {
        assert!(limiter.check_at(remote(3), now));
    }
    assert_eq!(limiter.tracked(), 2);

    // Tracked clients are still limited
    assert!(!limiter.check_at(remote(1), now));

    // Expired windows free up room
    let later = now + Duration::from_secs(61);
    assert!(limiter.check_at(remote(3), later));
    assert!(!limiter.check_at(remote(3), later));
}
